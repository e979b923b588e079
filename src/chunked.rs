//! Chunked transfer-encoding decoder (response read path only).
//!
//! Chunk-size lines and the trailing CRLF terminating each chunk's data
//! are physically spliced out of the buffer as they're recognized, so
//! `buffered` always measures a contiguous run of pure content bytes the
//! caller can hand straight to a response consumer.

use httparse::InvalidChunkSize;

use crate::buffer::Buffer;

#[derive(Debug, Clone)]
pub struct State {
    /// Content bytes ready for the caller.
    buffered: usize,
    /// Content bytes still expected for the chunk currently in progress.
    pending: usize,
    /// Set once a chunk's content has been fully buffered; the next
    /// `parse` call must strip its terminating CRLF before it can look
    /// for the following chunk-size line.
    awaiting_crlf: bool,
    done: bool,
}

impl State {
    pub fn new() -> State {
        State { buffered: 0, pending: 0, awaiting_crlf: false, done: false }
    }

    pub fn parse(&mut self, buf: &mut Buffer) -> Result<(), InvalidChunkSize> {
        loop {
            if self.done {
                return Ok(());
            }
            if self.awaiting_crlf {
                if buf.len() < self.buffered + 2 {
                    return Ok(());
                }
                buf.remove_range(self.buffered..self.buffered + 2);
                self.awaiting_crlf = false;
            }
            if self.buffered >= buf.len() {
                return Ok(());
            }
            if self.pending == 0 {
                use httparse::Status::*;
                match httparse::parse_chunk_size(&buf[self.buffered..])? {
                    Complete((bytes, 0)) => {
                        buf.remove_range(self.buffered..self.buffered + bytes);
                        self.done = true;
                        return Ok(());
                    }
                    Complete((bytes, chunk_size)) => {
                        buf.remove_range(self.buffered..self.buffered + bytes);
                        self.pending = chunk_size as usize;
                    }
                    Partial => return Ok(()),
                }
            } else {
                let available = buf.len() - self.buffered;
                if self.pending <= available {
                    self.buffered += self.pending;
                    self.pending = 0;
                    self.awaiting_crlf = true;
                } else {
                    self.pending -= available;
                    self.buffered = buf.len();
                }
            }
        }
    }

    /// Content bytes currently buffered and ready for the caller.
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    /// True once the terminal zero-size chunk's size line has been seen.
    /// The trailer (if any) and the final blank line still need to be
    /// consumed separately; see `body::Framing`.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn consume(&mut self, n: usize) {
        assert!(self.buffered >= n);
        self.buffered -= n;
    }
}

#[cfg(test)]
mod test {
    use super::State;
    use crate::buffer::Buffer;

    #[test]
    fn single_chunk() {
        let mut buf = Buffer::with_capacity(256);
        buf.extend_for_test(b"5\r\nhello\r\n0\r\n\r\n");
        let mut st = State::new();
        st.parse(&mut buf).unwrap();
        assert_eq!(st.buffered(), 5);
        assert!(st.is_done());
        assert_eq!(&buf[..5], b"hello");
    }

    #[test]
    fn split_across_fills() {
        let mut buf = Buffer::with_capacity(256);
        buf.extend_for_test(b"5\r\nhel");
        let mut st = State::new();
        st.parse(&mut buf).unwrap();
        assert_eq!(st.buffered(), 3);
        assert!(!st.is_done());
        buf.extend_for_test(b"lo\r\n0\r\n\r\n");
        st.parse(&mut buf).unwrap();
        assert_eq!(st.buffered(), 5);
        assert!(st.is_done());
        assert_eq!(&buf[..5], b"hello");
    }

    #[test]
    fn multiple_small_chunks_match_one_large() {
        let mut a = Buffer::with_capacity(256);
        a.extend_for_test(b"3\r\nfoo\r\n3\r\nbar\r\n0\r\n\r\n");
        let mut sa = State::new();
        sa.parse(&mut a).unwrap();

        let mut b = Buffer::with_capacity(256);
        b.extend_for_test(b"6\r\nfoobar\r\n0\r\n\r\n");
        let mut sb = State::new();
        sb.parse(&mut b).unwrap();

        assert_eq!(sa.buffered(), sb.buffered());
        assert_eq!(&a[..sa.buffered()], &b[..sb.buffered()]);
        assert!(sa.is_done());
        assert!(sb.is_done());
    }

    #[test]
    fn rejects_invalid_hex() {
        let mut buf = Buffer::with_capacity(256);
        buf.extend_for_test(b"zz\r\n");
        let mut st = State::new();
        assert!(st.parse(&mut buf).is_err());
    }

    #[test]
    fn parse_after_done_does_not_touch_trailer() {
        let mut buf = Buffer::with_capacity(256);
        buf.extend_for_test(b"5\r\nhello\r\n0\r\n\r\n");
        let mut st = State::new();
        st.parse(&mut buf).unwrap();
        st.consume(5);
        assert!(st.is_done());
        // a second parse call, as happens on the next `poll_read`
        // iteration, must leave the trailer's blank line untouched.
        st.parse(&mut buf).unwrap();
        assert_eq!(&buf[..], b"\r\n");
    }
}
