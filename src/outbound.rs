//! Outbound state machine: tracks the in-progress request body send.
//!
//! `send_request` transitions `Idle` into either `Idle` (no body),
//! `Sending` (a body with a known length and no 100-continue
//! negotiation), or `AwaitingContinue` (the caller asked for
//! `Expect: 100-continue`). `write` drains `Sending` back to `Idle`;
//! a `100` response promotes `AwaitingContinue` into `Sending`, and a
//! final status collapses it straight back to `Idle` with the body
//! silently discarded (§4.3, §4.4 step 5-6).

use std::io::Write;

use netbuf::Buf;

use crate::error::Error;
use crate::pipeline::{PendingRequest, Pipeline};
use crate::serializer::{self, RequestBody};
use crate::headers::CaseInsensitiveHeaders;
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutState {
    Idle,
    Sending { remaining: u64 },
    AwaitingContinue { body_len: u64 },
}

pub struct Outbound {
    state: OutState,
    /// bytes serialized but not yet accepted by the transport
    wbuf: Buf,
}

impl Outbound {
    pub fn new() -> Outbound {
        Outbound { state: OutState::Idle, wbuf: Buf::new() }
    }

    pub fn state(&self) -> &OutState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, OutState::Idle)
    }

    /// Serializes a request's head (and, for an in-line body, the body
    /// itself) into the write buffer, returning the pipeline entries it
    /// produced. The caller is responsible for flushing `wbuf` to the
    /// transport and for pushing the returned entries onto the
    /// pipeline -- this method only computes what to push, so the
    /// caller can also enforce "reconnect only when pending is empty".
    #[allow(clippy::too_many_arguments)]
    pub fn send_request(
        &mut self,
        method: &str,
        url: &str,
        host: &str,
        port: u16,
        default_port: u16,
        headers: &CaseInsensitiveHeaders,
        body: RequestBody,
    ) -> Result<Vec<PendingRequest>, Error> {
        if self.state != OutState::Idle {
            return Err(Error::StateError(
                "a previous request body has not finished sending",
            ));
        }
        if let RequestBody::Following { expect_continue: true, length: 0 } = body {
            return Err(Error::InvalidArgument(
                "Expect: 100-continue requires a non-empty body",
            ));
        }
        let needs_body_write = serializer::write_request(
            &mut self.wbuf, method, url, host, port, default_port,
            headers, &body,
        )?;

        // Exactly one pipeline entry per request, regardless of body
        // shape: the 100-continue interim response is tracked purely
        // through `self.state`, never through a second pipeline slot,
        // so FIFO matching in `read_response` stays one-to-one with
        // requests actually sent.
        let mut entries = Vec::new();
        match body {
            RequestBody::None | RequestBody::Bytes(_) => {
                entries.push(PendingRequest {
                    method: method.to_string(),
                    url: url.to_string(),
                    body_len_opt: None,
                });
            }
            RequestBody::Following { length, expect_continue } => {
                debug_assert!(needs_body_write);
                entries.push(PendingRequest {
                    method: method.to_string(),
                    url: url.to_string(),
                    body_len_opt: Some(length),
                });
                self.state = if expect_continue {
                    OutState::AwaitingContinue { body_len: length }
                } else {
                    OutState::Sending { remaining: length }
                };
            }
        }
        Ok(entries)
    }

    /// Called when `read_response` observes the `100 Continue` this
    /// connection was waiting for: promotes `AwaitingContinue` into
    /// `Sending` so `write` becomes legal. The pipeline entry for the
    /// eventual final response was already pushed by `send_request`;
    /// this only unblocks the body send.
    pub fn on_continue_received(&mut self) {
        if let OutState::AwaitingContinue { body_len } = self.state {
            self.state = OutState::Sending { remaining: body_len };
        }
    }

    /// Called when `read_response` observes a final status while still
    /// `AwaitingContinue`: the server decided without seeing the body,
    /// so it's discarded and we go straight back to `Idle`.
    pub fn on_final_status_without_continue(&mut self) {
        if matches!(self.state, OutState::AwaitingContinue { .. }) {
            self.state = OutState::Idle;
        }
    }

    /// Sends `data`, which must fit within the remaining announced
    /// Content-Length. `partial`, if true, may accept fewer bytes than
    /// given (returning how many); if false, all bytes are queued for
    /// send (though the transport write may still need multiple
    /// `flush` calls to leave the process).
    pub fn write(&mut self, data: &[u8], partial: bool) -> Result<usize, Error> {
        let remaining = match self.state {
            OutState::Sending { remaining } => remaining,
            OutState::AwaitingContinue { .. } => {
                return Err(Error::StateError(
                    "write called while awaiting 100-continue",
                ));
            }
            OutState::Idle => {
                return Err(Error::StateError("write called with no body in flight"))
            }
        };
        if data.len() as u64 > remaining {
            return Err(Error::ExcessBodyData);
        }
        // Data is queued into `wbuf` and drained to the transport by a
        // separate `flush_once`, so both `partial` and non-`partial`
        // callers always have every byte accepted here; `partial` only
        // changes behavior for a caller who writes directly against a
        // transport with its own backpressure, which this buffering
        // layer absorbs.
        let n = data.len();
        let _ = partial;
        self.wbuf.write_all(data).unwrap();
        let remaining = remaining - n as u64;
        self.state = if remaining == 0 {
            OutState::Idle
        } else {
            OutState::Sending { remaining }
        };
        Ok(n)
    }

    /// True once `write` has driven `Sending` back to `Idle`, i.e. the
    /// in-progress body's last byte has been queued.
    pub fn body_complete(&self) -> bool {
        matches!(self.state, OutState::Idle)
    }

    /// Attempts to flush the write buffer to the transport once,
    /// non-blockingly. Returns the number of bytes actually written.
    pub fn flush_once(&mut self, transport: &mut dyn Transport)
        -> std::io::Result<usize>
    {
        let n = self.wbuf.write_to(transport)?;
        Ok(n)
    }

    pub fn pending_bytes(&self) -> usize {
        self.wbuf.len()
    }

    /// Resets to `Idle` and drops any unsent bytes. Used by
    /// `disconnect`.
    pub fn reset(&mut self) {
        self.state = OutState::Idle;
        self.wbuf = Buf::new();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn headers() -> CaseInsensitiveHeaders {
        CaseInsensitiveHeaders::new()
    }

    #[test]
    fn bodyless_request_queues_one_entry() {
        let mut out = Outbound::new();
        let entries = out.send_request(
            "GET", "/", "example.com", 80, 80, &headers(), RequestBody::None,
        ).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(out.is_idle());
    }

    #[test]
    fn expect_continue_defers_body_entry() {
        let mut out = Outbound::new();
        let entries = out.send_request(
            "PUT", "/x", "example.com", 80, 80, &headers(),
            RequestBody::Following { length: 4, expect_continue: true },
        ).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(matches!(out.state(), OutState::AwaitingContinue { body_len: 4 }));
    }

    #[test]
    fn write_rejects_excess() {
        let mut out = Outbound::new();
        out.send_request(
            "PUT", "/x", "example.com", 80, 80, &headers(),
            RequestBody::Following { length: 4, expect_continue: false },
        ).unwrap();
        assert!(out.write(b"hello", false).is_err());
        // state survives the rejected write, allowing recovery
        assert!(matches!(out.state(), OutState::Sending { remaining: 4 }));
    }

    #[test]
    fn write_drains_to_idle() {
        let mut out = Outbound::new();
        out.send_request(
            "PUT", "/x", "example.com", 80, 80, &headers(),
            RequestBody::Following { length: 4, expect_continue: false },
        ).unwrap();
        out.write(b"abcd", false).unwrap();
        assert!(out.is_idle());
    }

    #[test]
    fn write_before_send_request_is_state_error() {
        let mut out = Outbound::new();
        assert!(out.write(b"x", false).is_err());
    }
}
