//! Suspendable I/O primitives.
//!
//! Every operation that touches the transport is expressed as a step
//! function returning `Resume<T>`: either it finished, it needs the
//! transport to become readable/writable before it can make progress, or
//! it failed outright. This is deliberately independent of any futures
//! or async runtime -- integrating with a host scheduler is out of scope
//! here; `block_on` is provided for callers that don't have one.

use std::time::{Duration, Instant};

use crate::error::Error;

#[cfg(unix)]
use std::os::unix::io::RawFd;

/// The set of I/O events an operation is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Events {
    pub readable: bool,
    pub writable: bool,
}

impl Events {
    pub fn readable() -> Events {
        Events { readable: true, writable: false }
    }

    pub fn writable() -> Events {
        Events { readable: false, writable: true }
    }

    pub fn both() -> Events {
        Events { readable: true, writable: true }
    }
}

/// A readiness request yielded by a suspended operation.
#[derive(Debug, Clone, Copy)]
pub struct Readiness {
    #[cfg(unix)]
    pub fd: RawFd,
    pub events: Events,
}

impl Readiness {
    /// Blocks the calling thread until either the requested event fires
    /// or `timeout` elapses, using a single `poll(2)` call on the
    /// transport's descriptor. Returns `true` if the event fired,
    /// `false` on timeout.
    ///
    /// This is a courtesy helper for callers without an external
    /// reactor; real integrations should register `fd`/`events` with
    /// their own scheduler instead of calling this in a loop.
    #[cfg(unix)]
    pub fn poll(&self, timeout: Option<Duration>) -> bool {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: {
                let mut e = 0;
                if self.events.readable {
                    e |= libc::POLLIN;
                }
                if self.events.writable {
                    e |= libc::POLLOUT;
                }
                e
            },
            revents: 0,
        };
        let timeout_ms = match timeout {
            Some(d) => d.as_millis().min(i32::MAX as u128) as libc::c_int,
            None => -1,
        };
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        rc > 0
    }
}

/// The outcome of resuming a suspendable operation.
#[derive(Debug)]
pub enum Resume<T> {
    Done(T),
    NeedsIO(Readiness),
    Failed(Error),
}

impl<T> Resume<T> {
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Resume<U> {
        match self {
            Resume::Done(v) => Resume::Done(f(v)),
            Resume::NeedsIO(r) => Resume::NeedsIO(r),
            Resume::Failed(e) => Resume::Failed(e),
        }
    }
}

/// Drives a resumable operation to completion synchronously, using
/// `Readiness::poll` between attempts. `step` is called once per
/// iteration and should make one unit of non-blocking progress.
pub fn block_on<T, F>(mut step: F, timeout: Option<Duration>) -> Result<T, Error>
    where F: FnMut() -> Resume<T>
{
    let deadline = timeout.map(|d| Instant::now() + d);
    loop {
        match step() {
            Resume::Done(v) => return Ok(v),
            Resume::Failed(e) => return Err(e),
            Resume::NeedsIO(r) => {
                let remaining = match deadline {
                    Some(deadline) => {
                        let now = Instant::now();
                        if now >= deadline {
                            return Err(Error::ConnectionTimedOut);
                        }
                        Some(deadline - now)
                    }
                    None => None,
                };
                if !r.poll(remaining) {
                    return Err(Error::ConnectionTimedOut);
                }
            }
        }
    }
}
