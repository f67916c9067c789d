//! ECS smart client library.
//!
//! Client-side load balancing and failover over a multi-node, optionally
//! multi-VDC, storage cluster.

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod transport;

pub use client::{create_client, SmartClient};
pub use config::schema::SmartConfig;
pub use discovery::{HostListProvider, PollingDaemon, Vdc};
pub use error::{ProbeError, SmartClientError, TopologyError, TransportError};
pub use health::HealthChecker;
pub use load_balancer::host::{Host, HostKey};
pub use load_balancer::{HostStats, LoadBalancer};
pub use transport::{HyperTransport, Transport};
