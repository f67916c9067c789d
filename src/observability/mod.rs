//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! LoadBalancer, HealthChecker, HostListProvider, PollingDaemon produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges via the `metrics` facade)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → Prometheus scrape endpoint (installed by the binary)
//! ```
//!
//! # Design Decisions
//! - The library only emits; installing subscribers/exporters is left to
//!   the embedding application (or the bundled binary)
//! - Metric updates are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
