//! The `Connection`: ties the buffer, pipeline, outbound and inbound
//! state machines, and a caller-supplied transport into the public
//! engine API described in the external-interfaces section.

use std::io::{Read, Write};
use std::sync::Arc;

#[cfg(unix)]
use std::os::unix::io::RawFd;

use crate::body::Framing;
use crate::buffer::Buffer;
use crate::config::Config;
use crate::error::Error;
use crate::headers::CaseInsensitiveHeaders;
use crate::inbound::{self, InState};
use crate::outbound::Outbound;
use crate::pipeline::Pipeline;
use crate::response::Response;
use crate::serializer::RequestBody;
use crate::suspend::{block_on, Events, Readiness, Resume};
use crate::transport::{Connector, Endpoint, Transport};

/// Default CONNECT-tunnel control name used to distinguish "DNS is
/// down" from "this one hostname doesn't resolve" (§4.7).
const DNS_PROBE_CONTROL_NAME: &str = "connectivity-check.example.";

pub struct Connection<C: Connector> {
    connector: C,
    host: String,
    port: u16,
    default_port: u16,
    proxy: Option<(String, u16)>,
    config: Arc<Config>,

    transport: Option<C::Transport>,
    rbuf: Buffer,
    pipeline: Pipeline,
    outbound: Outbound,
    in_state: InState,

    /// Tracks whether `poll_send_request`'s one-time serialize step has
    /// already run for the request currently being sent; only the
    /// drain-to-transport part of the operation is re-entrant.
    send_started: bool,
    /// `Connection: close` was seen on a response; no further requests
    /// are accepted once the current body (if any) finishes.
    closing: bool,
}

impl<C: Connector> Connection<C> {
    pub fn new(
        connector: C,
        host: impl Into<String>,
        port: u16,
        default_port: u16,
        proxy: Option<(String, u16)>,
        config: Arc<Config>,
    ) -> Connection<C> {
        let rbuf = Buffer::with_capacity(config.get_buffer_capacity());
        Connection {
            connector,
            host: host.into(),
            port,
            default_port,
            proxy,
            config,
            transport: None,
            rbuf,
            pipeline: Pipeline::new(),
            outbound: Outbound::new(),
            in_state: InState::Idle,
            send_started: false,
            closing: false,
        }
    }

    fn endpoint(&self) -> Endpoint {
        match &self.proxy {
            Some((ph, pp)) => Endpoint::Proxy {
                proxy_host: ph.clone(),
                proxy_port: *pp,
                host: self.host.clone(),
                port: self.port,
            },
            None => Endpoint::Direct { host: self.host.clone(), port: self.port },
        }
    }

    /// Opens the transport (direct or CONNECT-tunneled, per `proxy`),
    /// consuming the tunnel's `200`-class response when proxied.
    /// Reinstalls a fresh read buffer; existing pipeline/outbound state
    /// must already be empty/idle (the caller is responsible for that,
    /// per the "reconnect only when pending is empty" invariant).
    pub fn connect(&mut self) -> Result<(), Error> {
        log::debug!("connecting to {}:{}", self.host, self.port);
        let endpoint = self.endpoint();
        let mut transport = self.connector.connect(&endpoint)
            .map_err(|e| self.classify_connect_error(e))?;

        if let Endpoint::Proxy { .. } = endpoint {
            self.consume_connect_tunnel(&mut transport)?;
        }

        self.transport = Some(transport);
        self.rbuf = Buffer::with_capacity(self.config.get_buffer_capacity());
        self.outbound.reset();
        self.in_state = InState::Idle;
        self.pipeline.clear();
        self.closing = false;
        Ok(())
    }

    fn classify_connect_error(&self, e: std::io::Error) -> Error {
        // A real resolver isn't in scope; callers whose `Connector`
        // surfaces resolution failures as `io::ErrorKind::NotFound`
        // style errors get them classified against the DNS control
        // name convention from the original implementation.
        if e.kind() == std::io::ErrorKind::NotFound {
            if self.host == DNS_PROBE_CONTROL_NAME {
                Error::DNSUnavailable
            } else {
                Error::HostnameNotResolvable(self.host.clone())
            }
        } else {
            Error::Io(e)
        }
    }

    fn consume_connect_tunnel(&self, transport: &mut C::Transport)
        -> Result<(), Error>
    {
        let req = format!("CONNECT {}:{} HTTP/1.0\r\n\r\n", self.host, self.port);
        transport.write_all(req.as_bytes())?;
        let mut buf = Buffer::with_capacity(self.config.get_max_line_length());
        loop {
            if let Some(head) = inbound::try_parse_head(
                &mut buf, self.config.get_max_line_length(),
            )? {
                if !(200..300).contains(&head.code) {
                    return Err(Error::InvalidResponse(
                        "CONNECT tunnel rejected",
                    ));
                }
                return Ok(());
            }
            if buf.fill_once(transport)? == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Shuts down and drops the transport; resets all per-connection
    /// state. The next operation transparently reconnects, provided
    /// `pending` was empty (enforced by `ensure_connected`).
    pub fn disconnect(&mut self) {
        log::debug!("disconnecting from {}:{}", self.host, self.port);
        self.transport = None;
        self.rbuf = Buffer::with_capacity(self.config.get_buffer_capacity());
        self.pipeline.clear();
        self.outbound.reset();
        self.in_state = InState::Idle;
        self.send_started = false;
        self.closing = false;
    }

    fn ensure_connected(&mut self) -> Result<(), Error> {
        if self.transport.is_some() {
            return Ok(());
        }
        if !self.pipeline.is_empty() {
            return Err(Error::StateError(
                "cannot reconnect while responses are still pending",
            ));
        }
        self.connect()
    }

    pub fn response_pending(&self) -> bool {
        !self.pipeline.is_empty()
    }

    #[cfg(unix)]
    pub fn fileno(&self) -> Option<RawFd> {
        self.transport.as_ref().map(|t| t.fileno())
    }

    pub fn get_ssl_peercert(&self) -> Option<Vec<u8>> {
        self.transport.as_ref().and_then(|t| t.get_ssl_peercert())
    }

    pub fn get_ssl_cipher(&self) -> Option<String> {
        self.transport.as_ref().and_then(|t| t.get_ssl_cipher())
    }

    // ---- send_request --------------------------------------------

    /// `body` is taken on the first call (`send_started == false`) and
    /// left `None` afterwards; resuming after a `NeedsIO` never
    /// re-serializes or re-queues the request, only drains `wbuf`
    /// further, so a partially-written request head is never
    /// double-sent.
    pub fn poll_send_request(
        &mut self,
        method: &str,
        url: &str,
        headers: &CaseInsensitiveHeaders,
        body: &mut Option<RequestBody<'_>>,
    ) -> Resume<()> {
        if self.closing {
            return Resume::Failed(Error::StateError(
                "connection is closing; reconnect before sending further requests",
            ));
        }
        if let Err(e) = self.ensure_connected() {
            return Resume::Failed(e);
        }
        if !self.send_started {
            let body = body.take().expect(
                "poll_send_request called again after completing",
            );
            let entries = match self.outbound.send_request(
                method, url, &self.host, self.port, self.default_port,
                headers, body,
            ) {
                Ok(e) => e,
                Err(e) => return Resume::Failed(e),
            };
            for entry in entries {
                self.pipeline.push(entry);
            }
            self.send_started = true;
            log::trace!("queued request {} {}", method, url);
        }
        let transport = self.transport.as_mut().expect("connected");
        loop {
            if self.outbound.pending_bytes() == 0 {
                self.send_started = false;
                return Resume::Done(());
            }
            match self.outbound.flush_once(transport) {
                Ok(0) => return Resume::NeedsIO(Readiness {
                    #[cfg(unix)]
                    fd: transport.fileno(),
                    events: Events::writable(),
                }),
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    return Resume::NeedsIO(Readiness {
                        #[cfg(unix)]
                        fd: transport.fileno(),
                        events: Events::writable(),
                    });
                }
                Err(e) => return Resume::Failed(Error::Io(e)),
            }
        }
    }

    pub fn send_request(
        &mut self,
        method: &str,
        url: &str,
        headers: &CaseInsensitiveHeaders,
        body: RequestBody<'_>,
    ) -> Result<(), Error> {
        let timeout = self.config.get_default_timeout();
        let mut body = Some(body);
        block_on(|| self.poll_send_request(method, url, headers, &mut body), timeout)
    }

    // ---- write / sendfile ------------------------------------------

    fn write_started(&mut self, data: &[u8], partial: bool, started: &mut bool)
        -> Result<(), Error>
    {
        if !*started {
            self.outbound.write(data, partial)?;
            *started = true;
        }
        Ok(())
    }

    pub fn poll_write(&mut self, data: &[u8], partial: bool, started: &mut bool)
        -> Resume<usize>
    {
        if self.transport.is_none() {
            return Resume::Failed(Error::StateError(
                "write called on a disconnected connection",
            ));
        }
        let n = data.len();
        if let Err(e) = self.write_started(data, partial, started) {
            return Resume::Failed(e);
        }
        let transport = self.transport.as_mut().expect("connected");
        loop {
            if self.outbound.pending_bytes() == 0 {
                *started = false;
                return Resume::Done(n);
            }
            match self.outbound.flush_once(transport) {
                Ok(0) => return Resume::NeedsIO(Readiness {
                    #[cfg(unix)]
                    fd: transport.fileno(),
                    events: Events::writable(),
                }),
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    return Resume::NeedsIO(Readiness {
                        #[cfg(unix)]
                        fd: transport.fileno(),
                        events: Events::writable(),
                    });
                }
                Err(e) => return Resume::Failed(Error::Io(e)),
            }
        }
    }

    pub fn write(&mut self, data: &[u8], partial: bool) -> Result<usize, Error> {
        let timeout = self.config.get_default_timeout();
        let mut started = false;
        block_on(|| self.poll_write(data, partial, &mut started), timeout)
    }

    /// Suspendable source-to-body copy: repeatedly reads from `src`
    /// into a scratch buffer and writes it, honoring the announced
    /// `Content-Length` (§4.3). Reading `src` itself is assumed to be
    /// a fast local operation (a file, an in-memory buffer); the only
    /// suspension point is transport write-readiness, per the
    /// suspension-point list.
    pub fn poll_sendfile(&mut self, src: &mut dyn Read, total: &mut u64)
        -> Resume<u64>
    {
        if self.transport.is_none() {
            return Resume::Failed(Error::StateError(
                "sendfile called on a disconnected connection",
            ));
        }
        loop {
            if self.outbound.pending_bytes() == 0 {
                let mut scratch = [0u8; 64 * 1024];
                let n = match src.read(&mut scratch) {
                    Ok(n) => n,
                    Err(e) => return Resume::Failed(Error::Io(e)),
                };
                if n == 0 {
                    return Resume::Done(*total);
                }
                if let Err(e) = self.outbound.write(&scratch[..n], false) {
                    return Resume::Failed(e);
                }
                *total += n as u64;
                continue;
            }
            let transport = self.transport.as_mut().expect("connected");
            match self.outbound.flush_once(transport) {
                Ok(0) => return Resume::NeedsIO(Readiness {
                    #[cfg(unix)]
                    fd: transport.fileno(),
                    events: Events::writable(),
                }),
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    return Resume::NeedsIO(Readiness {
                        #[cfg(unix)]
                        fd: transport.fileno(),
                        events: Events::writable(),
                    });
                }
                Err(e) => return Resume::Failed(Error::Io(e)),
            }
        }
    }

    pub fn sendfile(&mut self, src: &mut dyn Read) -> Result<u64, Error> {
        let timeout = self.config.get_default_timeout();
        let mut total = 0u64;
        block_on(|| self.poll_sendfile(src, &mut total), timeout)
    }

    // ---- read_response ------------------------------------------

    pub fn poll_read_response(&mut self) -> Resume<Response> {
        if self.pipeline.is_empty() {
            return Resume::Failed(Error::StateError(
                "read_response called with no request pending",
            ));
        }
        if !matches!(self.in_state, InState::Idle) {
            return Resume::Failed(Error::StateError(
                "a previous response body has not been fully read or discarded",
            ));
        }
        if self.closing {
            return Resume::Failed(Error::ConnectionClosed);
        }
        if self.transport.is_none() {
            return Resume::Failed(Error::ConnectionClosed);
        }
        loop {
            let max_line = self.config.get_max_line_length();
            match inbound::try_parse_head(&mut self.rbuf, max_line) {
                Err(e) => return Resume::Failed(e),
                Ok(None) => {
                    let transport = self.transport.as_mut().expect("connected");
                    match self.rbuf.fill_once(transport) {
                        Ok(0) => return Resume::Failed(Error::ConnectionClosed),
                        Ok(_) => continue,
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            return Resume::NeedsIO(Readiness {
                                #[cfg(unix)]
                                fd: transport.fileno(),
                                events: Events::readable(),
                            });
                        }
                        Err(e) => return Resume::Failed(Error::Io(e)),
                    }
                }
                Ok(Some(head)) => {
                    let front = self.pipeline.front().expect("checked non-empty").clone();
                    let is_head_request = front.method.eq_ignore_ascii_case("HEAD");
                    let awaiting_continue = matches!(
                        self.outbound.state(),
                        crate::outbound::OutState::AwaitingContinue { .. }
                    );

                    if head.code == 100 && awaiting_continue {
                        self.outbound.on_continue_received();
                        return Resume::Done(Response {
                            method: front.method,
                            url: front.url,
                            status: 100,
                            reason: head.reason,
                            headers: head.headers,
                            length: Some(0),
                        });
                    }
                    if (100..200).contains(&head.code) {
                        // Any other interim response is swallowed; keep
                        // scanning for the real status line.
                        log::trace!("swallowing interim {} response", head.code);
                        continue;
                    }

                    if awaiting_continue {
                        self.outbound.on_final_status_without_continue();
                    }

                    let framing = match inbound::choose_framing(
                        is_head_request, head.code, &head.headers,
                    ) {
                        Ok(f) => f,
                        Err(e) => return Resume::Failed(e),
                    };
                    let length = match &framing {
                        Framing::Identity { remaining } => Some(*remaining),
                        _ => None,
                    };
                    let is_done_already = matches!(framing, Framing::None);
                    self.in_state = if is_done_already {
                        self.pipeline.pop_front();
                        InState::Idle
                    } else if matches!(framing, Framing::Raw) {
                        InState::Raw
                    } else {
                        InState::Framing(framing)
                    };
                    if head.connection_close {
                        self.closing = true;
                    }
                    return Resume::Done(Response {
                        method: front.method,
                        url: front.url,
                        status: head.code,
                        reason: head.reason,
                        headers: head.headers,
                        length,
                    });
                }
            }
        }
    }

    pub fn read_response(&mut self) -> Result<Response, Error> {
        let timeout = self.config.get_default_timeout();
        block_on(|| self.poll_read_response(), timeout)
    }

    // ---- body reads ------------------------------------------------

    pub fn poll_read(&mut self, n: usize) -> Resume<Vec<u8>> {
        match &self.in_state {
            InState::Framing(_) => {}
            InState::Raw => {
                return Resume::Failed(Error::UnsupportedResponse(
                    "response body has no supported framing; use read_raw",
                ));
            }
            InState::Idle | InState::BodyDone => {
                return Resume::Failed(Error::StateError(
                    "read called with no response body active",
                ));
            }
        }
        loop {
            let framing = match &mut self.in_state {
                InState::Framing(f) => f,
                _ => unreachable!("checked above"),
            };
            if let Err(e) = framing.parse(&mut self.rbuf) {
                return Resume::Failed(e);
            }
            let (available, done) = framing.check_buf(&self.rbuf);
            let want = n.min(available);
            if want > 0 {
                let data = self.rbuf[..want].to_vec();
                let framing = match &mut self.in_state {
                    InState::Framing(f) => f,
                    _ => unreachable!(),
                };
                framing.consume(&mut self.rbuf, want);
                return Resume::Done(data);
            }
            if done {
                return match self.poll_finish_body() {
                    Resume::Done(()) => Resume::Done(Vec::new()),
                    Resume::NeedsIO(r) => Resume::NeedsIO(r),
                    Resume::Failed(e) => Resume::Failed(e),
                };
            }
            if self.transport.is_none() {
                return Resume::Failed(Error::ConnectionClosed);
            }
            let transport = self.transport.as_mut().expect("connected");
            match self.rbuf.fill_once(transport) {
                Ok(0) => return Resume::Failed(Error::ConnectionClosed),
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    return Resume::NeedsIO(Readiness {
                        #[cfg(unix)]
                        fd: transport.fileno(),
                        events: Events::readable(),
                    });
                }
                Err(e) => return Resume::Failed(Error::Io(e)),
            }
        }
    }

    /// Drains a chunked body's trailer (if any), then retires the
    /// pipeline entry. The trailer read is its own suspension point
    /// (§4.6/§5): a trailer split across packets yields `NeedsIO`
    /// rather than blocking or misreading a not-yet-arrived trailer as
    /// peer close.
    fn poll_finish_body(&mut self) -> Resume<()> {
        loop {
            let needs_trailer = match &mut self.in_state {
                InState::Framing(f) => f.awaiting_trailer(),
                _ => false,
            };
            if needs_trailer {
                let trailer_done = match &mut self.in_state {
                    InState::Framing(f) => match f.consume_trailer(&mut self.rbuf) {
                        Ok(d) => d,
                        Err(e) => return Resume::Failed(e),
                    },
                    _ => true,
                };
                if !trailer_done {
                    if self.transport.is_none() {
                        return Resume::Failed(Error::ConnectionClosed);
                    }
                    let transport = self.transport.as_mut().expect("connected");
                    match self.rbuf.fill_once(transport) {
                        Ok(0) => return Resume::Failed(Error::ConnectionClosed),
                        Ok(_) => continue,
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            return Resume::NeedsIO(Readiness {
                                #[cfg(unix)]
                                fd: transport.fileno(),
                                events: Events::readable(),
                            });
                        }
                        Err(e) => return Resume::Failed(Error::Io(e)),
                    }
                }
            }
            self.in_state = InState::Idle;
            self.pipeline.pop_front();
            return Resume::Done(());
        }
    }

    pub fn read(&mut self, n: usize) -> Result<Vec<u8>, Error> {
        let timeout = self.config.get_default_timeout();
        block_on(|| self.poll_read(n), timeout)
    }

    pub fn readall(&mut self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        loop {
            let chunk = self.read(64 * 1024)?;
            if chunk.is_empty() {
                return Ok(out);
            }
            out.extend_from_slice(&chunk);
        }
    }

    pub fn readinto(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let chunk = self.read(buf.len())?;
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }

    pub fn discard(&mut self) -> Result<(), Error> {
        loop {
            let chunk = self.read(64 * 1024)?;
            if chunk.is_empty() {
                return Ok(());
            }
        }
    }

    pub fn poll_read_raw(&mut self, n: usize) -> Resume<Vec<u8>> {
        if !matches!(self.in_state, InState::Raw) {
            return Resume::Failed(Error::StateError(
                "read_raw called outside Raw framing",
            ));
        }
        loop {
            if self.rbuf.len() >= n {
                let data = self.rbuf[..n].to_vec();
                self.rbuf.consume(n);
                return Resume::Done(data);
            }
            if self.transport.is_none() {
                return Resume::Failed(Error::ConnectionClosed);
            }
            let transport = self.transport.as_mut().expect("connected");
            match self.rbuf.fill_once(transport) {
                Ok(0) => {
                    let data = self.rbuf[..].to_vec();
                    self.rbuf.consume(data.len());
                    return Resume::Done(data);
                }
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    return Resume::NeedsIO(Readiness {
                        #[cfg(unix)]
                        fd: transport.fileno(),
                        events: Events::readable(),
                    });
                }
                Err(e) => return Resume::Failed(Error::Io(e)),
            }
        }
    }

    /// Raw pass-through read, for responses with unrecognized framing.
    /// Ends at peer close (returns fewer than `n` bytes, possibly
    /// zero, once the transport is exhausted).
    pub fn read_raw(&mut self, n: usize) -> Result<Vec<u8>, Error> {
        let timeout = self.config.get_default_timeout();
        block_on(|| self.poll_read_raw(n), timeout)
    }
}
