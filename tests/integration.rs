//! End-to-end scenarios and cross-module invariants, driven against an
//! in-memory mock transport instead of a real socket.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::sync::Arc;

use pipehttp::{
    CaseInsensitiveHeaders, Config, Connection, Connector, Endpoint, RequestBody, Transport,
};

struct MockState {
    written: Vec<u8>,
    to_read: VecDeque<u8>,
}

/// A transport that never blocks: reads are satisfied immediately from
/// a pre-scripted byte queue (`Ok(0)` once it's drained, modeling peer
/// close), and writes are appended to a buffer for inspection. Good
/// enough to drive the engine's state machines without a real fd;
/// `Readiness::poll` is therefore never exercised by these tests
/// (covered instead by `suspend.rs`'s own unit tests).
#[derive(Clone)]
struct MockTransport(Rc<RefCell<MockState>>);

impl MockTransport {
    fn new() -> MockTransport {
        MockTransport(Rc::new(RefCell::new(MockState {
            written: Vec::new(),
            to_read: VecDeque::new(),
        })))
    }

    fn feed(&self, data: &[u8]) {
        self.0.borrow_mut().to_read.extend(data.iter().copied());
    }

    fn written(&self) -> Vec<u8> {
        self.0.borrow().written.clone()
    }
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.0.borrow_mut();
        let n = buf.len().min(state.to_read.len());
        for slot in buf.iter_mut().take(n) {
            *slot = state.to_read.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MockTransport {
    #[cfg(unix)]
    fn fileno(&self) -> std::os::unix::io::RawFd {
        0
    }
}

struct MockConnector(MockTransport);

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn connect(&self, _endpoint: &Endpoint) -> io::Result<MockTransport> {
        Ok(self.0.clone())
    }
}

fn connection(transport: &MockTransport) -> Connection<MockConnector> {
    Connection::new(
        MockConnector(transport.clone()),
        "example.com",
        80,
        80,
        None,
        Arc::new(Config::new()),
    )
}

fn headers() -> CaseInsensitiveHeaders {
    CaseInsensitiveHeaders::new()
}

// S1: a small GET with an identity body.
#[test]
fn s1_small_get() {
    let t = MockTransport::new();
    t.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
    let mut conn = connection(&t);

    conn.send_request("GET", "/", &headers(), RequestBody::None).unwrap();
    let resp = conn.read_response().unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.length, Some(5));

    let body = conn.read(5).unwrap();
    assert_eq!(body, b"hello");
    let eof = conn.read(5).unwrap();
    assert!(eof.is_empty());
    assert!(!conn.response_pending());
}

// S2: a chunked response body.
#[test]
fn s2_chunked_response() {
    let t = MockTransport::new();
    t.feed(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n");
    let mut conn = connection(&t);

    conn.send_request("GET", "/", &headers(), RequestBody::None).unwrap();
    let resp = conn.read_response().unwrap();
    assert_eq!(resp.length, None);

    let body = conn.readall().unwrap();
    assert_eq!(body, b"hello");
    assert!(!conn.response_pending());
}

// A chunked body followed by a trailer header must not be misread as a
// phantom extra chunk, and a further pipelined response must still be
// reachable afterwards.
#[test]
fn chunked_response_with_trailer_then_next_response() {
    let t = MockTransport::new();
    t.feed(
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
          5\r\nhello\r\n0\r\nX-Trailer: value\r\n\r\n",
    );
    t.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nz");
    let mut conn = connection(&t);

    conn.send_request("GET", "/a", &headers(), RequestBody::None).unwrap();
    conn.send_request("GET", "/b", &headers(), RequestBody::None).unwrap();

    conn.read_response().unwrap();
    assert_eq!(conn.readall().unwrap(), b"hello");

    let resp = conn.read_response().unwrap();
    assert_eq!(resp.url, "/b");
    assert_eq!(conn.readall().unwrap(), b"z");
    assert!(!conn.response_pending());
}

// Transfer-Encoding: identity is a no-op encoding, not an error; the
// body still frames on Content-Length.
#[test]
fn transfer_encoding_identity_falls_back_to_content_length() {
    let t = MockTransport::new();
    t.feed(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: identity\r\nContent-Length: 5\r\n\r\nhello");
    let mut conn = connection(&t);

    conn.send_request("GET", "/", &headers(), RequestBody::None).unwrap();
    let resp = conn.read_response().unwrap();
    assert_eq!(resp.length, Some(5));
    assert_eq!(conn.readall().unwrap(), b"hello");
}

// S3: three pipelined requests, responses read back in FIFO order.
#[test]
fn s3_pipeline_three() {
    let t = MockTransport::new();
    t.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\na");
    t.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nb");
    t.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 1\r\n\r\nc");
    let mut conn = connection(&t);

    conn.send_request("GET", "/a", &headers(), RequestBody::None).unwrap();
    conn.send_request("GET", "/b", &headers(), RequestBody::None).unwrap();
    conn.send_request("GET", "/c", &headers(), RequestBody::None).unwrap();

    for expect_url in ["/a", "/b", "/c"] {
        let resp = conn.read_response().unwrap();
        assert_eq!(resp.url, expect_url);
        let body = conn.readall().unwrap();
        assert_eq!(body.len(), 1);
    }
    assert!(!conn.response_pending());

    let sent = t.written();
    let sent = String::from_utf8(sent).unwrap();
    assert!(sent.find("/a").unwrap() < sent.find("/b").unwrap());
    assert!(sent.find("/b").unwrap() < sent.find("/c").unwrap());
}

// S4: Expect: 100-continue, server agrees.
#[test]
fn s4_continue_happy_path() {
    let t = MockTransport::new();
    t.feed(b"HTTP/1.1 100 Continue\r\n\r\n");
    t.feed(b"HTTP/1.1 201 Created\r\n\r\n");
    let mut conn = connection(&t);

    conn.send_request(
        "PUT", "/x", &headers(),
        RequestBody::Following { length: 4, expect_continue: true },
    ).unwrap();

    let interim = conn.read_response().unwrap();
    assert_eq!(interim.status, 100);

    conn.write(b"abcd", false).unwrap();

    let final_resp = conn.read_response().unwrap();
    assert_eq!(final_resp.status, 201);
    assert!(t.written().windows(4).any(|w| w == b"abcd"));
}

// S5: Expect: 100-continue, server answers final status without a 100.
#[test]
fn s5_continue_rejected() {
    let t = MockTransport::new();
    t.feed(b"HTTP/1.1 417 Expectation Failed\r\nContent-Length: 0\r\n\r\n");
    let mut conn = connection(&t);

    conn.send_request(
        "PUT", "/x", &headers(),
        RequestBody::Following { length: 4, expect_continue: true },
    ).unwrap();

    let resp = conn.read_response().unwrap();
    assert_eq!(resp.status, 417);

    // the body obligation was discarded; a further write is now illegal
    assert!(conn.write(b"abcd", false).is_err());
}

// S6: writing more than the announced Content-Length is rejected, and
// the connection recovers (state is preserved, not poisoned).
#[test]
fn s6_excess_body_data_preserves_state() {
    let t = MockTransport::new();
    t.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    let mut conn = connection(&t);

    conn.send_request(
        "PUT", "/x", &headers(),
        RequestBody::Following { length: 4, expect_continue: false },
    ).unwrap();

    assert!(conn.write(b"hello", false).is_err());
    // the announced length is still intact; a correctly-sized write
    // still succeeds afterwards.
    conn.write(b"abcd", false).unwrap();

    let resp = conn.read_response().unwrap();
    assert_eq!(resp.status, 200);
}

// HEAD/204/304/1xx responses carry no body regardless of headers.
#[test]
fn head_response_has_no_body_even_with_content_length() {
    let t = MockTransport::new();
    t.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n");
    let mut conn = connection(&t);

    conn.send_request("HEAD", "/", &headers(), RequestBody::None).unwrap();
    let resp = conn.read_response().unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.length, None);
    // the pipeline entry was popped immediately; no body read is needed
    assert!(!conn.response_pending());
}

#[test]
fn no_content_response_has_no_body() {
    let t = MockTransport::new();
    t.feed(b"HTTP/1.1 204 No Content\r\n\r\n");
    let mut conn = connection(&t);

    conn.send_request("DELETE", "/x", &headers(), RequestBody::None).unwrap();
    let resp = conn.read_response().unwrap();
    assert_eq!(resp.status, 204);
    assert!(!conn.response_pending());
}

// A connection can be torn down and transparently reconnected for a
// fresh request once no response is pending.
#[test]
fn reconnect_after_disconnect() {
    let t = MockTransport::new();
    t.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    let mut conn = connection(&t);

    conn.send_request("GET", "/first", &headers(), RequestBody::None).unwrap();
    conn.read_response().unwrap();
    conn.readall().unwrap();
    assert!(!conn.response_pending());

    conn.disconnect();

    t.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    conn.send_request("GET", "/second", &headers(), RequestBody::None).unwrap();
    let resp = conn.read_response().unwrap();
    assert_eq!(resp.status, 200);

    let sent = String::from_utf8(t.written()).unwrap();
    assert!(sent.contains("/first"));
    assert!(sent.contains("/second"));
}

// sendfile streams an in-memory source as the request body.
#[test]
fn sendfile_streams_source_as_body() {
    let t = MockTransport::new();
    t.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    let mut conn = connection(&t);

    conn.send_request(
        "PUT", "/x", &headers(),
        RequestBody::Following { length: 4, expect_continue: false },
    ).unwrap();
    let mut src: &[u8] = b"abcd";
    let n = conn.sendfile(&mut src).unwrap();
    assert_eq!(n, 4);

    let resp = conn.read_response().unwrap();
    assert_eq!(resp.status, 200);
}

// Connection: close on a response is honored: a further send_request
// is rejected until a fresh Connection (or reconnect) is used.
#[test]
fn connection_close_blocks_further_requests() {
    let t = MockTransport::new();
    t.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
    let mut conn = connection(&t);

    conn.send_request("GET", "/x", &headers(), RequestBody::None).unwrap();
    conn.read_response().unwrap();

    let err = conn.send_request("GET", "/y", &headers(), RequestBody::None);
    assert!(err.is_err());
}
