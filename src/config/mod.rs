//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or SmartConfig built in code
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → SmartConfig (validated, immutable)
//!     → SmartClient splits it into LoadBalancer seeds, provider settings,
//!       polling settings and transport settings
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the client is built
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CredentialsConfig, ObservabilityConfig, PollingConfig, SmartConfig, TransportConfig, VdcConfig,
};
