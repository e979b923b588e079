//! Transport abstraction.
//!
//! Socket and TLS construction are out of scope for this engine: callers
//! supply an already-connected, non-blocking byte stream through
//! `Transport`, and a `Connector` to produce one on `connect()`/reconnect.

use std::io::{Read, Write};

#[cfg(unix)]
use std::os::unix::io::RawFd;

/// A non-blocking, already-established byte stream.
///
/// Implementations are expected to behave like a non-blocking socket:
/// `read`/`write` return `io::ErrorKind::WouldBlock` rather than blocking
/// the calling thread.
pub trait Transport: Read + Write {
    /// The underlying OS descriptor, for callers that want to register
    /// their own reactor interest directly.
    #[cfg(unix)]
    fn fileno(&self) -> RawFd;

    /// TLS peer certificate, DER-encoded, if this transport is a TLS
    /// session. Plain TCP transports return `None`.
    fn get_ssl_peercert(&self) -> Option<Vec<u8>> {
        None
    }

    /// Negotiated TLS cipher suite name, if this transport is a TLS
    /// session.
    fn get_ssl_cipher(&self) -> Option<String> {
        None
    }
}

/// Where to physically connect: direct to the origin, or through a
/// `CONNECT`-tunneling proxy.
#[derive(Debug, Clone)]
pub enum Endpoint {
    Direct { host: String, port: u16 },
    Proxy { proxy_host: String, proxy_port: u16, host: String, port: u16 },
}

/// Produces a `Transport` for a given endpoint.
///
/// The actual `connect(2)`/TLS handshake happens inside the
/// implementation; the engine only calls `connect` and works with the
/// resulting `Transport`. This is the seam that keeps socket/TLS
/// construction out of the engine proper.
pub trait Connector {
    type Transport: Transport;

    fn connect(&self, endpoint: &Endpoint)
        -> std::io::Result<Self::Transport>;
}
