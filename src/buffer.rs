//! Fixed-capacity byte buffer feeding the response parser from the
//! transport.
//!
//! Wraps `netbuf::Buf`, which already compacts and grows on demand, with
//! an explicit capacity ceiling: once `capacity` bytes are buffered and
//! unconsumed, further `fill_once` calls refuse to read more until the
//! caller consumes some.

use std::io;
use std::ops::Deref;

use netbuf::Buf;

use crate::error::Error;
use crate::transport::Transport;

/// Default cap on a single status/header/chunk-size/trailer line.
pub const DEFAULT_MAX_LINE: usize = 65_536;

pub struct Buffer {
    buf: Buf,
    capacity: usize,
}

impl Buffer {
    pub fn with_capacity(capacity: usize) -> Buffer {
        Buffer { buf: Buf::new(), capacity }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Advances the consumed-bytes mark by `n`.
    pub fn consume(&mut self, n: usize) {
        self.buf.consume(n);
    }

    /// Physically removes `range` from the buffer, shifting later bytes
    /// down. Used by the chunked decoder to splice out chunk-size lines
    /// and trailer lines in place.
    pub fn remove_range(&mut self, range: std::ops::Range<usize>) {
        self.buf.remove_range(range);
    }

    /// A view of up to `n` buffered bytes, without copying. Stable only
    /// until the next `fill_once`/`consume`.
    pub fn peek_slice(&self, n: usize) -> &[u8] {
        let n = n.min(self.buf.len());
        &self.buf[..n]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..]
    }

    /// Test-only: injects bytes directly, bypassing the transport, to
    /// exercise the framing codecs without a real connection.
    #[cfg(test)]
    pub fn extend_for_test(&mut self, data: &[u8]) {
        self.buf.extend(data);
    }

    /// Attempts a single non-blocking read from `transport` into the
    /// buffer. Returns `Ok(0)` on a clean peer close, `Ok(n)` for `n`
    /// bytes actually read, or `Err(WouldBlock)` when the transport has
    /// no data right now (the caller should yield `NeedsIO(Readable)`).
    ///
    /// Fails with `LineTooLong`-adjacent exhaustion only indirectly: the
    /// buffer itself never exceeds `capacity` bytes of unconsumed data;
    /// callers that need more room must `consume` first.
    pub fn fill_once(&mut self, transport: &mut dyn Transport)
        -> io::Result<usize>
    {
        if self.buf.len() >= self.capacity {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "buffer at capacity, awaiting consume",
            ));
        }
        self.buf.read_from(transport)
    }

    /// Searches the currently buffered bytes for a CRLF within the first
    /// `max` bytes, returning the index of the first byte following the
    /// CRLF (i.e. the consumable prefix length) if found.
    pub fn find_crlf(&self, max: usize) -> Result<Option<usize>, Error> {
        let data = &self.buf[..];
        let scan_len = data.len().min(max);
        for i in 1..scan_len {
            if data[i - 1] == b'\r' && data[i] == b'\n' {
                return Ok(Some(i + 1));
            }
        }
        if data.len() >= max {
            return Err(Error::LineTooLong);
        }
        Ok(None)
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf[..]
    }
}

#[cfg(test)]
mod test {
    use super::Buffer;

    #[test]
    fn starts_empty() {
        let b = Buffer::with_capacity(128);
        assert!(b.is_empty());
        assert_eq!(b.len(), 0);
    }

    #[test]
    fn find_crlf_absent() {
        let mut b = Buffer::with_capacity(128);
        b.buf.extend(b"GET / HTTP/1.1");
        assert_eq!(b.find_crlf(128).unwrap(), None);
    }

    #[test]
    fn find_crlf_present() {
        let mut b = Buffer::with_capacity(128);
        b.buf.extend(b"GET / HTTP/1.1\r\nHost: x\r\n");
        let n = b.find_crlf(128).unwrap().unwrap();
        assert_eq!(&b.as_slice()[..n], b"GET / HTTP/1.1\r\n");
    }

    #[test]
    fn find_crlf_too_long() {
        let mut b = Buffer::with_capacity(128);
        b.buf.extend(&vec![b'a'; 64][..]);
        assert!(b.find_crlf(32).is_err());
    }
}
