//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Explicit call or background cycle (discovery::daemon)
//!     → checker.rs issues GET /?ping against the host
//!     → ping.rs parses the PingList document
//!     → Host flags updated: healthy, and maintenance for VDC hosts
//! ```
//!
//! # Design Decisions
//! - A probe that fails for any reason (refused, timeout, bad status,
//!   unparseable body) marks the host unhealthy and returns the error
//! - The checker never swallows errors; the background cycle decides
//!   whether to log and continue
//! - Maintenance items are ignored for standalone hosts

pub mod checker;
pub mod ping;

pub use checker::HealthChecker;
pub use ping::{PingItem, PingResponse, PingStatus};
