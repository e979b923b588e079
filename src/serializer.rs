//! Request-line and header serialization.
//!
//! Adapted from the teacher's `base_serializer::MessageState`, trimmed
//! to the request side only: this engine never serializes responses,
//! and chunked **request** bodies are explicitly unsupported (§9), so
//! there is exactly one body-framing header to ever write:
//! `Content-Length`.

use std::io::Write;

use md5::{Digest, Md5};
use netbuf::Buf;

use crate::error::Error;
use crate::headers::CaseInsensitiveHeaders;

fn invalid_header(value: &[u8]) -> bool {
    value.iter().any(|&b| b == b'\r' || b == b'\n')
}

/// The body a caller hands to `send_request`.
pub enum RequestBody<'a> {
    None,
    /// An in-line buffer: length and `Content-MD5` are computed
    /// automatically.
    Bytes(&'a [u8]),
    /// The body will follow via `write`/`sendfile`, with a known
    /// length. `expect_continue` requests the 100-continue handshake.
    Following { length: u64, expect_continue: bool },
}

/// Formats the `Host` header value per the supplemented port/IPv6
/// rules: omit the port when it's the scheme default, bracket-quote an
/// IPv6 literal host.
pub fn host_header_value(host: &str, port: u16, default_port: u16) -> String {
    let bracketed = host.contains(':');
    if port == default_port {
        if bracketed {
            format!("[{}]", host)
        } else {
            host.to_string()
        }
    } else if bracketed {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Writes `METHOD request-target HTTP/1.1`, the auto-inserted headers,
/// the caller-supplied headers, and the blank line terminating the
/// header block. Returns whether the caller must still send a body via
/// `write`/`sendfile` (true for `RequestBody::Following`).
pub fn write_request(
    buf: &mut Buf,
    method: &str,
    url: &str,
    host: &str,
    port: u16,
    default_port: u16,
    headers: &CaseInsensitiveHeaders,
    body: &RequestBody,
) -> Result<bool, Error> {
    write!(buf, "{} {} HTTP/1.1\r\n", method, url).unwrap();

    write_header(buf, "Host", host_header_value(host, port, default_port).as_bytes())?;
    if !headers.contains_key("Accept-Encoding") {
        write_header(buf, "Accept-Encoding", b"identity")?;
    }
    if !headers.contains_key("Connection") {
        write_header(buf, "Connection", b"keep-alive")?;
    }

    for (name, value) in headers.iter() {
        if name.eq_ignore_ascii_case("Content-Length")
            || name.eq_ignore_ascii_case("Content-MD5")
        {
            // these are computed below from `body`, never trusted from
            // the caller's header map
            continue;
        }
        write_header(buf, name, value)?;
    }

    let needs_body_write = match *body {
        RequestBody::None => {
            write_header(buf, "Content-Length", b"0")?;
            false
        }
        RequestBody::Bytes(data) => {
            write!(buf, "Content-Length: {}\r\n", data.len()).unwrap();
            if !headers.contains_key("Content-MD5") {
                let digest = Md5::digest(data);
                let encoded = base64::encode(digest);
                write_header(buf, "Content-MD5", encoded.as_bytes())?;
            }
            buf.write_all(b"\r\n").unwrap();
            buf.write_all(data).unwrap();
            return Ok(false);
        }
        RequestBody::Following { length, expect_continue } => {
            write!(buf, "Content-Length: {}\r\n", length).unwrap();
            if expect_continue {
                write_header(buf, "Expect", b"100-continue")?;
            }
            true
        }
    };

    buf.write_all(b"\r\n").unwrap();
    Ok(needs_body_write)
}

fn write_header(buf: &mut Buf, name: &str, value: &[u8])
    -> Result<(), Error>
{
    if invalid_header(name.as_bytes()) || invalid_header(value) {
        return Err(Error::InvalidArgument("header contains CR or LF"));
    }
    buf.write_all(name.as_bytes()).unwrap();
    buf.write_all(b": ").unwrap();
    buf.write_all(value).unwrap();
    buf.write_all(b"\r\n").unwrap();
    Ok(())
}
