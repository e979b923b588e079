//! Inbound state machine: status-line/header parsing, body framing
//! selection, and the body read dispatch (`read`/`readall`/`readinto`/
//! `discard`/`read_raw`).

use std::str::from_utf8;

use crate::body::Framing;
use crate::buffer::Buffer;
use crate::error::Error;
use crate::headers::CaseInsensitiveHeaders;
use crate::version::Version;

/// Number of headers to allocate on the stack before falling back to a
/// heap-allocated vector, mirroring the teacher's parser.
const MIN_HEADERS: usize = 16;
const MAX_HEADERS: usize = 1024;

#[derive(Debug)]
pub enum InState {
    Idle,
    Framing(Framing),
    /// Response has no recognized framing; only `read_raw` works.
    Raw,
    BodyDone,
}

/// A parsed status line and header block, not yet matched against the
/// pipeline or the outbound 100-continue state.
#[derive(Debug)]
pub struct ParsedHead {
    pub version: Version,
    pub code: u16,
    pub reason: String,
    pub headers: CaseInsensitiveHeaders,
    pub connection_close: bool,
}

/// Parses one status line + header block from the front of `buf`, if a
/// complete one is present. Returns `None` if more data is needed.
/// Does not inspect `Content-Length`/`Transfer-Encoding`; framing is
/// chosen separately by `choose_framing` once the caller's context
/// (is this a HEAD response? is continue expected?) is known.
pub fn try_parse_head(buf: &mut Buffer, max_line: usize)
    -> Result<Option<ParsedHead>, Error>
{
    // Cheap bound: refuse to even attempt parsing an obviously truncated
    // head past the line-length budget; httparse itself reports
    // `TooManyHeaders`/`Partial` for genuinely incomplete input, this
    // guards the case of an attacker omitting CRLF entirely.
    if buf.len() > max_line && buf.find_crlf(max_line).is_err() {
        return Err(Error::LineTooLong);
    }

    let mut headers_buf = [httparse::EMPTY_HEADER; MIN_HEADERS];
    let mut vec;
    let (raw_version, raw_code, raw_reason, raw_headers, consumed) = {
        let mut raw = httparse::Response::new(&mut headers_buf);
        let mut result = raw.parse(&buf[..]);
        if matches!(result, Err(httparse::Error::TooManyHeaders)) {
            vec = vec![httparse::EMPTY_HEADER; MAX_HEADERS];
            raw = httparse::Response::new(&mut vec);
            result = raw.parse(&buf[..]);
        }
        match result.map_err(Error::Header)? {
            httparse::Status::Complete(n) => {
                (raw.version, raw.code, raw.reason, raw.headers, n)
            }
            httparse::Status::Partial => return Ok(None),
        }
    };

    let version = match raw_version {
        Some(1) => Version::Http11,
        Some(0) => Version::Http10,
        _ => return Err(Error::InvalidResponse("unsupported HTTP version")),
    };
    let code = raw_code.ok_or(Error::InvalidResponse("missing status code"))?;
    let reason = raw_reason.unwrap_or("").to_string();

    let mut headers = CaseInsensitiveHeaders::new();
    let mut connection_close = version == Version::Http10;
    for h in raw_headers.iter() {
        headers.insert(h.name, h.value.to_vec());
        if h.name.eq_ignore_ascii_case("Connection")
            && h.value.split(|&b| b == b',').any(crate::headers::is_close)
        {
            connection_close = true;
        }
    }

    buf.consume(consumed);
    Ok(Some(ParsedHead { version, code, reason, headers, connection_close }))
}

/// Implements the response body-length algorithm (RFC 7230 §3.3.3,
/// spec §4.4 step 7): HEAD/1xx/204/304 carry no body; `chunked` takes
/// precedence over `Content-Length`; otherwise a present
/// `Content-Length` selects identity framing; absent both, the body has
/// no recognized framing.
pub fn choose_framing(is_head: bool, code: u16, headers: &CaseInsensitiveHeaders)
    -> Result<Framing, Error>
{
    if is_head || (100..200).contains(&code) || code == 204 || code == 304 {
        return Ok(Framing::None);
    }
    if let Some(te) = headers.get("Transfer-Encoding") {
        let last = te.split(|&b| b == b',').last().unwrap_or(te);
        if crate::headers::is_chunked(last) {
            return Ok(Framing::Chunked(crate::chunked::State::new()));
        }
        if !crate::headers::is_identity(last) {
            return Err(Error::InvalidResponse(
                "unsupported Transfer-Encoding",
            ));
        }
        // `identity` is a no-op encoding; fall through to Content-Length.
    }
    if let Some(cl) = headers.get("Content-Length") {
        let s = from_utf8(cl).map_err(|_| {
            Error::InvalidResponse("Content-Length is not valid UTF-8")
        })?;
        let len: u64 = s.trim().parse().map_err(|_| {
            Error::InvalidResponse("Content-Length is not a valid integer")
        })?;
        return Ok(Framing::Identity { remaining: len });
    }
    Ok(Framing::Raw)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_simple_response() {
        let mut buf = Buffer::with_capacity(256);
        buf.extend_for_test(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
        let head = try_parse_head(&mut buf, 65536).unwrap().unwrap();
        assert_eq!(head.code, 200);
        assert_eq!(head.reason, "OK");
        assert_eq!(&buf[..5], b"hello");
    }

    #[test]
    fn partial_returns_none() {
        let mut buf = Buffer::with_capacity(256);
        buf.extend_for_test(b"HTTP/1.1 200 O");
        assert!(try_parse_head(&mut buf, 65536).unwrap().is_none());
    }

    #[test]
    fn framing_prefers_chunked_over_content_length() {
        let mut headers = CaseInsensitiveHeaders::new();
        headers.insert("Content-Length", b"10".to_vec());
        headers.insert("Transfer-Encoding", b"chunked".to_vec());
        let framing = choose_framing(false, 200, &headers).unwrap();
        assert!(matches!(framing, Framing::Chunked(_)));
    }

    #[test]
    fn framing_head_has_no_body() {
        let headers = CaseInsensitiveHeaders::new();
        let framing = choose_framing(true, 200, &headers).unwrap();
        assert!(matches!(framing, Framing::None));
    }

    #[test]
    fn framing_identity_transfer_encoding_falls_back_to_content_length() {
        let mut headers = CaseInsensitiveHeaders::new();
        headers.insert("Transfer-Encoding", b"identity".to_vec());
        headers.insert("Content-Length", b"10".to_vec());
        let framing = choose_framing(false, 200, &headers).unwrap();
        assert!(matches!(framing, Framing::Identity { remaining: 10 }));
    }

    #[test]
    fn framing_unsupported_transfer_encoding_rejected() {
        let mut headers = CaseInsensitiveHeaders::new();
        headers.insert("Transfer-Encoding", b"gzip".to_vec());
        assert!(choose_framing(false, 200, &headers).is_err());
    }

    #[test]
    fn framing_no_length_no_chunked_is_raw() {
        let headers = CaseInsensitiveHeaders::new();
        let framing = choose_framing(false, 200, &headers).unwrap();
        assert!(matches!(framing, Framing::Raw));
    }
}
