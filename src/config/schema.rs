//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files and
//! default every field, so a minimal config only lists hosts.

use serde::{Deserialize, Serialize};

/// Root configuration for the smart client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SmartConfig {
    /// Hosts known before any discovery (`name` or `name:port`).
    pub initial_hosts: Vec<String>,

    /// Sites to discover and union. Empty means a single standalone site
    /// seeded from `initial_hosts`.
    pub vdcs: Vec<VdcConfig>,

    /// Protocol used to reach nodes (`http` or `https`).
    pub protocol: String,

    /// Port for hosts without an explicit one. Defaults by protocol.
    pub port: Option<u16>,

    /// Credentials for the topology endpoint.
    pub credentials: Option<CredentialsConfig>,

    /// Background refresh settings.
    pub polling: PollingConfig,

    /// Settings handed to the transport.
    pub transport: TransportConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for SmartConfig {
    fn default() -> Self {
        Self {
            initial_hosts: Vec::new(),
            vdcs: Vec::new(),
            protocol: "http".to_string(),
            port: None,
            credentials: None,
            polling: PollingConfig::default(),
            transport: TransportConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl SmartConfig {
    /// Config with the given initial hosts and defaults elsewhere.
    pub fn with_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            initial_hosts: hosts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// One VDC (site) to discover.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VdcConfig {
    /// Site name. Defaults to the first seed host.
    #[serde(default)]
    pub name: Option<String>,

    /// Seed hosts used to query the site's topology.
    pub hosts: Vec<String>,
}

/// Credentials for the management endpoint.
#[derive(Clone, Deserialize, Serialize)]
pub struct CredentialsConfig {
    pub user: String,
    pub secret: String,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Background refresh configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Re-query the topology endpoint each cycle.
    pub host_update_enabled: bool,

    /// Probe every known host each cycle.
    pub health_check_enabled: bool,

    /// Interval between cycles in seconds.
    pub interval_secs: u64,

    /// Deadline for one probe or topology query in seconds.
    pub probe_timeout_secs: u64,

    /// Consecutive failed probes before a host is taken out of rotation.
    pub eviction_threshold: u32,

    /// Consecutive refreshes a host may be missing from the topology
    /// before it is dropped.
    pub absence_threshold: u32,

    /// Upper bound on concurrent probes within a cycle.
    pub max_concurrent_checks: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            host_update_enabled: true,
            health_check_enabled: true,
            interval_secs: 120,
            probe_timeout_secs: 5,
            eviction_threshold: 3,
            absence_threshold: 2,
            max_concurrent_checks: 8,
        }
    }
}

/// Transport configuration. Interpreted only by the transport.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Idle connections kept per host.
    pub pool_max_idle_per_host: usize,

    /// Idle connection timeout in seconds.
    pub pool_idle_timeout_secs: u64,

    /// Outbound proxy, for transports that support one.
    pub proxy_uri: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            pool_max_idle_per_host: 32,
            pool_idle_timeout_secs: 90,
            proxy_uri: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Expose a Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9464".to_string(),
        }
    }
}
