//! A client-side HTTP/1.1 engine for RESTful workloads against a single
//! origin.
//!
//! Covers request pipelining, `Expect: 100-continue` body negotiation,
//! and chunked response framing, on top of a suspendable I/O model:
//! every operation that touches the transport is a step function
//! returning [`suspend::Resume`] rather than blocking or assuming an
//! async runtime. Socket/TLS construction, URL parsing and an outer
//! event loop are supplied by the caller through the [`transport`]
//! traits.

mod body;
mod buffer;
mod chunked;
pub mod config;
pub mod connection;
pub mod error;
pub mod headers;
mod inbound;
mod outbound;
mod pipeline;
pub mod response;
pub mod serializer;
pub mod suspend;
pub mod transport;
pub mod version;

pub use config::Config;
pub use connection::Connection;
pub use error::{is_temp_network_error, Error};
pub use headers::CaseInsensitiveHeaders;
pub use response::Response;
pub use serializer::RequestBody;
pub use suspend::{Events, Readiness, Resume};
pub use transport::{Connector, Endpoint, Transport};
pub use version::Version;
