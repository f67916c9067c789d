//! Topology discovery subsystem.
//!
//! # Data Flow
//! ```text
//! daemon.rs (every interval, or poll_once on demand)
//!     → provider.rs refreshes each Vdc concurrently
//!         → GET /?endpoint (signed) → topology.rs parses ListDataNode
//!         → vdc.rs merges names into its host set
//!     → LoadBalancer reconciled with the merged sets
//!     → every known host probed (health::checker), eviction applied
//! ```
//!
//! # Design Decisions
//! - Sites are independent: one failing site never blocks or clears another
//! - Host objects survive refreshes, so health flags and request stats do too
//! - Removal is debounced: a host must be missing from several consecutive
//!   answers before it is dropped

pub mod daemon;
pub mod provider;
pub mod topology;
pub mod vdc;

pub use daemon::{PollSummary, PollingDaemon};
pub use provider::HostListProvider;
pub use topology::ListDataNode;
pub use vdc::{RefreshState, TopologyChange, Vdc};
