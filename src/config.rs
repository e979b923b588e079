//! Connection configuration.
//!
//! A builder over the tunable knobs implied by the design: read-buffer
//! capacity, the max line length for status/header/chunk-size/trailer
//! lines, a default per-operation timeout, and how many requests may be
//! pipelined ahead of their responses. Adapted from the teacher's
//! `client::Config` builder shape.

use std::sync::Arc;
use std::time::Duration;

use crate::buffer::DEFAULT_MAX_LINE;

#[derive(Debug, Clone)]
pub struct Config {
    buffer_capacity: usize,
    max_line_length: usize,
    default_timeout: Option<Duration>,
    inflight_limit: usize,
}

impl Config {
    /// Creates a config with defaults: an 8 KiB read buffer, a 64 KiB
    /// line cap, no default timeout (callers block indefinitely unless
    /// they pass one explicitly), and up to 8 pipelined requests.
    pub fn new() -> Config {
        Config {
            buffer_capacity: 8 * 1024,
            max_line_length: DEFAULT_MAX_LINE,
            default_timeout: None,
            inflight_limit: 8,
        }
    }

    /// Capacity, in bytes, of the connection's read buffer. Overridable
    /// per the original implementation's `BUFSIZE` constant, which this
    /// mirrors (see property test I-7).
    pub fn buffer_capacity(&mut self, value: usize) -> &mut Self {
        self.buffer_capacity = value;
        self
    }

    /// Maximum length, in bytes, of any single status/header/chunk-size/
    /// trailer line before `LineTooLong` is raised.
    pub fn max_line_length(&mut self, value: usize) -> &mut Self {
        self.max_line_length = value;
        self
    }

    /// Default deadline applied to any single suspendable operation
    /// driven through `block_on`. `None` means wait indefinitely.
    pub fn default_timeout(&mut self, value: Duration) -> &mut Self {
        self.default_timeout = Some(value);
        self
    }

    /// How many requests may have their headers on the wire with
    /// responses not yet fully read, before `send_request` should be
    /// held back by the caller.
    pub fn inflight_limit(&mut self, value: usize) -> &mut Self {
        self.inflight_limit = value;
        self
    }

    pub fn get_buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    pub fn get_max_line_length(&self) -> usize {
        self.max_line_length
    }

    pub fn get_default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn get_inflight_limit(&self) -> usize {
        self.inflight_limit
    }

    /// Convenience method mirroring the teacher's `done()`: wraps the
    /// built config in an `Arc` ready to hand to `Connection::new`.
    pub fn done(&mut self) -> Arc<Config> {
        Arc::new(self.clone())
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}
