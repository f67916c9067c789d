//! Transport collaborator.
//!
//! # Data Flow
//! ```text
//! SmartClient / HealthChecker / HostListProvider
//!     → Endpoint (host + protocol/port → absolute URI)
//!     → signer.rs (optional: authenticate management queries)
//!     → Transport::issue (http_client.rs by default, or a caller-supplied impl)
//!     → buffered Response<Bytes>
//! ```
//!
//! # Design Decisions
//! - The core never opens sockets itself; it is handed a `Transport`
//! - Bodies are fully buffered (`Bytes`): probes and topology documents
//!   are small, and callers wanting streaming plug their own transport
//! - Connection pooling and proxy settings belong to the transport

pub mod http_client;
pub mod signer;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use hyper::{Request, Response};

use crate::error::TransportError;
use crate::load_balancer::host::Host;

pub use http_client::HyperTransport;
pub use signer::{RequestSigner, S3V2Signer};

/// Default ECS data port for plain HTTP.
pub const DEFAULT_HTTP_PORT: u16 = 9020;
/// Default ECS data port for HTTPS.
pub const DEFAULT_HTTPS_PORT: u16 = 9021;

pub type TransportFuture<'a> = BoxFuture<'a, Result<Response<Bytes>, TransportError>>;

/// Abstract HTTP client capability.
pub trait Transport: Send + Sync {
    /// Issue a request with an absolute URI and return the buffered response.
    fn issue(&self, request: Request<Bytes>) -> TransportFuture<'_>;
}

/// Protocol and default port used to address hosts without a port override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub protocol: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(protocol: impl Into<String>, port: Option<u16>) -> Self {
        let protocol = protocol.into();
        let port = port.unwrap_or_else(|| default_port(&protocol));
        Self { protocol, port }
    }

    pub fn authority(&self, host: &Host) -> String {
        format!("{}:{}", host.name(), host.port().unwrap_or(self.port))
    }

    /// Absolute URI for `path_and_query` on `host`.
    pub fn uri(&self, host: &Host, path_and_query: &str) -> String {
        format!("{}://{}{}", self.protocol, self.authority(host), path_and_query)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new("http", None)
    }
}

pub fn default_port(protocol: &str) -> u16 {
    if protocol.eq_ignore_ascii_case("https") {
        DEFAULT_HTTPS_PORT
    } else {
        DEFAULT_HTTP_PORT
    }
}
