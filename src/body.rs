//! Response body framing: dispatches reads through the identity or
//! chunked decoder according to what `read_response` selected.

use crate::buffer::Buffer;
use crate::chunked;
use crate::error::Error;

/// How a response's length was determined, chosen by `read_response`
/// per the body-length algorithm in RFC 7230 §3.3.3.
#[derive(Debug, Clone)]
pub enum Framing {
    /// `Content-Length`-bounded body; `remaining` counts down to zero.
    Identity { remaining: u64 },
    /// `Transfer-Encoding: chunked` body.
    Chunked(chunked::State),
    /// Headers parsed fine, but the body has no recognized framing
    /// (no Content-Length, not chunked, and the connection isn't
    /// guaranteed to signal EOF unambiguously). Structured reads fail;
    /// `read_raw` remains available.
    Raw,
    /// No body at all: HEAD responses, 204, 304, 1xx.
    None,
}

impl Framing {
    /// Bytes currently buffered and ready to hand to the caller, and
    /// whether the body has reached EOF.
    pub fn check_buf(&self, buf: &Buffer) -> (usize, bool) {
        match *self {
            Framing::Identity { remaining } => {
                let avail = buf.len() as u64;
                if remaining <= avail {
                    (remaining as usize, true)
                } else {
                    (buf.len(), false)
                }
            }
            Framing::Chunked(ref s) => (s.buffered(), s.is_done()),
            Framing::Raw => (buf.len(), false),
            Framing::None => (0, true),
        }
    }

    pub fn parse(&mut self, buf: &mut Buffer) -> Result<(), Error> {
        match *self {
            Framing::Chunked(ref mut s) => {
                s.parse(buf).map_err(|_| {
                    Error::InvalidResponse("invalid chunk size")
                })?;
            }
            Framing::Identity { .. } | Framing::Raw | Framing::None => {}
        }
        Ok(())
    }

    /// Consumes `n` bytes the caller has taken from the buffer.
    pub fn consume(&mut self, buf: &mut Buffer, n: usize) {
        buf.consume(n);
        match *self {
            Framing::Identity { ref mut remaining } => {
                *remaining -= n as u64;
            }
            Framing::Chunked(ref mut s) => s.consume(n),
            Framing::Raw | Framing::None => {}
        }
    }

    /// True once a chunked body's terminal chunk-size line has been
    /// parsed; the trailer (if any) still needs consuming.
    pub fn awaiting_trailer(&self) -> bool {
        matches!(self, Framing::Chunked(s) if s.is_done())
    }

    /// Consumes trailer header lines (if any) up to and including the
    /// empty line that terminates the chunked body.
    pub fn consume_trailer(&mut self, buf: &mut Buffer)
        -> Result<bool, Error>
    {
        loop {
            match buf.find_crlf(65_536)? {
                None => return Ok(false),
                Some(n) => {
                    let empty_line = n == 2;
                    buf.consume(n);
                    if empty_line {
                        return Ok(true);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::Framing;
    use crate::buffer::Buffer;
    use crate::chunked;

    #[test]
    fn identity_eof_when_remaining_available() {
        let mut buf = Buffer::with_capacity(64);
        buf.extend_for_test(b"hello");
        let framing = Framing::Identity { remaining: 5 };
        let (n, done) = framing.check_buf(&buf);
        assert_eq!(n, 5);
        assert!(done);
    }

    #[test]
    fn identity_partial() {
        let mut buf = Buffer::with_capacity(64);
        buf.extend_for_test(b"hel");
        let framing = Framing::Identity { remaining: 5 };
        let (n, done) = framing.check_buf(&buf);
        assert_eq!(n, 3);
        assert!(!done);
    }

    #[test]
    fn chunked_trailer_consumed() {
        let mut buf = Buffer::with_capacity(64);
        buf.extend_for_test(b"5\r\nhello\r\n0\r\n\r\n");
        let mut framing = Framing::Chunked(chunked::State::new());
        framing.parse(&mut buf).unwrap();
        let (n, done) = framing.check_buf(&buf);
        assert_eq!(n, 5);
        assert!(done);
        framing.consume(&mut buf, 5);
        assert!(framing.awaiting_trailer());
        assert!(framing.consume_trailer(&mut buf).unwrap());
    }
}
