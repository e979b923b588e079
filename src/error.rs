//! The error taxonomy for the engine.
//!
//! Every fallible operation returns `Result<T, Error>`. Whether a given
//! error poisons the connection's direction is documented on each variant
//! and summarized in the crate-level docs.

use std::io;

use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        /// API misused given the connection's current state, e.g. `write`
        /// with no request body in flight. Does not poison the connection.
        StateError(msg: &'static str) {
            description("invalid operation for the current connection state")
            display("state error: {}", msg)
        }
        /// Caller passed malformed input (unsupported body kind, `Expect`
        /// without a body). Does not poison the connection.
        InvalidArgument(msg: &'static str) {
            description("invalid argument")
            display("invalid argument: {}", msg)
        }
        /// `write` would send more bytes than the announced Content-Length.
        /// Does not poison the connection.
        ExcessBodyData {
            description("write exceeds the announced Content-Length")
        }
        /// The wire violated HTTP/1.x framing rules.
        InvalidResponse(msg: &'static str) {
            description("invalid HTTP response")
            display("invalid response: {}", msg)
        }
        /// The response headers were well-formed but the body has no
        /// usable framing (no Content-Length, no chunked encoding).
        UnsupportedResponse(msg: &'static str) {
            description("response body has no supported framing")
            display("unsupported response: {}", msg)
        }
        /// A status, header, or chunk-size line exceeded the configured
        /// maximum line length.
        LineTooLong {
            description("line exceeds the maximum allowed length")
        }
        /// The peer closed the connection unexpectedly.
        ConnectionClosed {
            description("connection closed by peer")
        }
        /// A per-operation deadline elapsed while waiting for I/O
        /// readiness.
        ConnectionTimedOut {
            description("operation timed out")
        }
        /// The target hostname could not be resolved, and a well-known
        /// control name resolved fine (so DNS itself is up).
        HostnameNotResolvable(host: String) {
            description("hostname does not resolve")
            display("hostname not resolvable: {}", host)
        }
        /// Neither the target hostname nor a well-known control name
        /// resolved; DNS itself looks unavailable.
        DNSUnavailable {
            description("DNS resolution unavailable")
        }
        /// Failure while parsing a status line or header block.
        Header(err: httparse::Error) {
            description("header parse error")
            display("header parse error: {}", err)
            from()
        }
        /// Underlying transport I/O failure.
        Io(err: io::Error) {
            description("I/O error")
            display("I/O error: {}", err)
            from()
        }
    }
}

/// Classifies an I/O error as transient (worth retrying at a higher level)
/// or permanent.
///
/// Transient: timeouts, connection resets, broken pipes, and the
/// `ConnectionClosed`/`ConnectionTimedOut` engine errors themselves.
/// Everything else -- protocol violations, state misuse, DNS failures --
/// is permanent.
pub fn is_temp_network_error(err: &Error) -> bool {
    match *err {
        Error::ConnectionClosed | Error::ConnectionTimedOut => true,
        Error::Io(ref e) => match e.kind() {
            io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted => true,
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn io_errors_classified() {
        let e = Error::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(is_temp_network_error(&e));
        let e = Error::Io(io::Error::new(io::ErrorKind::NotFound, "nope"));
        assert!(!is_temp_network_error(&e));
    }

    #[test]
    fn engine_errors_classified() {
        assert!(is_temp_network_error(&Error::ConnectionClosed));
        assert!(is_temp_network_error(&Error::ConnectionTimedOut));
        assert!(!is_temp_network_error(&Error::StateError("x")));
        assert!(!is_temp_network_error(&Error::ExcessBodyData));
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            format!("{}", Error::ExcessBodyData),
            "write exceeds the announced Content-Length"
        );
    }
}
