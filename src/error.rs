//! Error taxonomy for the smart client.
//!
//! Callers of the request API only ever see [`SmartClientError`]. Probe and
//! topology errors are surfaced to whoever invokes those operations
//! explicitly; the background cycle logs them and carries on.

use std::time::Duration;
use thiserror::Error;

use crate::config::loader::ConfigError;

/// Errors raised by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be built (bad URI, header, ...).
    #[error("invalid request: {0}")]
    Http(#[from] hyper::http::Error),

    /// Connection refused, reset, DNS failure and the like.
    #[error("connection error: {0}")]
    Client(String),

    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(String),

    /// The transport does not speak this scheme.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("failed to sign request: {0}")]
    Signing(String),
}

/// A health probe that could not complete.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe of {host} failed: {source}")]
    Transport {
        host: String,
        #[source]
        source: TransportError,
    },

    #[error("probe of {host} timed out after {timeout:?}")]
    Timeout { host: String, timeout: Duration },

    #[error("probe of {host} returned status {status}")]
    Status { host: String, status: u16 },

    #[error("probe of {host} returned an unreadable ping response: {reason}")]
    Parse { host: String, reason: String },
}

/// A topology query against one site that could not complete.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// Every seed of the site was unhealthy or failed to answer.
    #[error("no reachable host in VDC {0}")]
    NoReachableSeed(String),

    #[error("topology query to {host} failed: {source}")]
    Transport {
        host: String,
        #[source]
        source: TransportError,
    },

    #[error("topology query to {host} timed out after {timeout:?}")]
    Timeout { host: String, timeout: Duration },

    #[error("topology query to {host} returned status {status}")]
    Status { host: String, status: u16 },

    #[error("unreadable topology response from {host}: {reason}")]
    Parse { host: String, reason: String },
}

/// Errors returned by the caller-facing client.
#[derive(Debug, Error)]
pub enum SmartClientError {
    /// No registered host is currently healthy and eligible.
    #[error("no healthy hosts available")]
    NoHealthyHosts,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Background polling was requested outside a Tokio runtime.
    #[error("background polling requires a Tokio runtime")]
    NoRuntime,
}

/// Failure to decode an XML payload returned by a node.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct XmlError(pub String);

impl From<quick_xml::Error> for XmlError {
    fn from(err: quick_xml::Error) -> Self {
        XmlError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SmartClientError>;
