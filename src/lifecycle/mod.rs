//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! SmartClient::new
//!     → PollingDaemon spawned with a StopSignal receiver
//!
//! SmartClient::shutdown / Ctrl-C in the binary
//!     → StopSignal::trigger
//!     → daemon abandons any in-progress cycle and exits
//!     → JoinHandle awaited for deterministic teardown
//! ```

pub mod shutdown;

pub use shutdown::{StopListener, StopSignal};
