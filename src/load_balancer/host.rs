//! Host abstraction.
//!
//! # Responsibilities
//! - Represent a single cluster node (identity + health flags)
//! - Carry maintenance semantics for hosts discovered under a VDC
//! - Count consecutive failed probes (for the eviction policy)

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Stable identity of a host: hostname plus optional explicit port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostKey {
    pub name: String,
    pub port: Option<u16>,
}

impl HostKey {
    pub fn new(name: impl Into<String>, port: Option<u16>) -> Self {
        Self { name: name.into(), port }
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.name, port),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for HostKey {
    type Err = String;

    /// Parses `name` or `name:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty host name".to_string());
        }
        match s.rsplit_once(':') {
            Some((name, port)) if !name.is_empty() && !name.contains(':') => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port in host {:?}", s))?;
                Ok(HostKey::new(name, Some(port)))
            }
            Some(_) => Err(format!("invalid host {:?}", s)),
            None => Ok(HostKey::new(s, None)),
        }
    }
}

/// What kind of node this is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKind {
    /// Plain host: no maintenance semantics.
    Standalone,
    /// Host discovered under the named VDC.
    Vdc(String),
}

/// A single cluster node.
///
/// Shared as `Arc<Host>` between the site that discovered it and the load
/// balancer, so flag changes made by the health-check cycle are seen by the
/// very next selection.
#[derive(Debug)]
pub struct Host {
    key: HostKey,
    kind: HostKind,
    /// Last known reachability.
    healthy: AtomicBool,
    /// Operator-declared maintenance (VDC hosts only).
    maintenance_mode: AtomicBool,
    /// Consecutive failed probes.
    probe_failures: AtomicU32,
}

impl Host {
    /// Create a standalone host without a port override.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_key(HostKey::new(name, None), HostKind::Standalone)
    }

    /// Create a standalone host with an explicit port.
    pub fn with_port(name: impl Into<String>, port: u16) -> Self {
        Self::from_key(HostKey::new(name, Some(port)), HostKind::Standalone)
    }

    /// Create a host belonging to the named VDC.
    pub fn vdc_host(vdc: impl Into<String>, key: HostKey) -> Self {
        Self::from_key(key, HostKind::Vdc(vdc.into()))
    }

    pub fn from_key(key: HostKey, kind: HostKind) -> Self {
        Self {
            key,
            kind,
            healthy: AtomicBool::new(true),
            maintenance_mode: AtomicBool::new(false),
            probe_failures: AtomicU32::new(0),
        }
    }

    pub fn key(&self) -> &HostKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn port(&self) -> Option<u16> {
        self.key.port
    }

    pub fn kind(&self) -> &HostKind {
        &self.kind
    }

    /// Name of the owning VDC, if any.
    pub fn vdc_name(&self) -> Option<&str> {
        match &self.kind {
            HostKind::Vdc(name) => Some(name),
            HostKind::Standalone => None,
        }
    }

    pub fn is_vdc_host(&self) -> bool {
        matches!(self.kind, HostKind::Vdc(_))
    }

    // --- Health Logic ---

    /// True when the host may receive traffic.
    ///
    /// For VDC hosts this additionally requires maintenance mode to be off.
    pub fn is_healthy(&self) -> bool {
        self.is_reachable() && !self.is_maintenance_mode()
    }

    /// Raw reachability flag, ignoring maintenance.
    pub fn is_reachable(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn set_healthy(&self, healthy: bool) {
        let previous = self.healthy.swap(healthy, Ordering::AcqRel);
        if previous != healthy {
            tracing::info!(host = %self.key, healthy, "Host health changed");
        }
    }

    /// Maintenance mode; always false for standalone hosts.
    pub fn is_maintenance_mode(&self) -> bool {
        self.is_vdc_host() && self.maintenance_mode.load(Ordering::Acquire)
    }

    /// Set maintenance mode. Ignored for standalone hosts.
    pub fn set_maintenance_mode(&self, maintenance: bool) {
        if !self.is_vdc_host() {
            return;
        }
        let previous = self.maintenance_mode.swap(maintenance, Ordering::AcqRel);
        if previous != maintenance {
            tracing::info!(host = %self.key, maintenance, "Host maintenance mode changed");
        }
    }

    pub fn probe_failures(&self) -> u32 {
        self.probe_failures.load(Ordering::Relaxed)
    }

    /// Record a failed probe, returning the new consecutive count.
    pub fn record_probe_failure(&self) -> u32 {
        self.probe_failures.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }

    /// Reset the consecutive failure count after a good probe.
    pub fn reset_probe_failures(&self) {
        self.probe_failures.store(0, Ordering::Relaxed);
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Host {}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.key.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_key() {
        assert_eq!("10.0.0.1".parse::<HostKey>().unwrap(), HostKey::new("10.0.0.1", None));
        assert_eq!(
            "node1.example.com:9020".parse::<HostKey>().unwrap(),
            HostKey::new("node1.example.com", Some(9020))
        );
        assert!("".parse::<HostKey>().is_err());
        assert!("node:notaport".parse::<HostKey>().is_err());
        assert!(":9020".parse::<HostKey>().is_err());
    }

    #[test]
    fn test_identity_ignores_state() {
        let a = Host::new("foo.com");
        let b = Host::new("foo.com");
        b.set_healthy(false);
        assert_eq!(a, b);
        assert_ne!(a, Host::with_port("foo.com", 9021));
    }

    #[test]
    fn test_maintenance_mode() {
        let host = Host::vdc_host("vdc1", HostKey::new("foo.com", None));
        assert!(host.is_healthy());

        host.set_maintenance_mode(true);
        assert!(!host.is_healthy());
        assert!(host.is_reachable());

        // setting the same flag twice changes nothing
        host.set_maintenance_mode(true);
        assert!(!host.is_healthy());

        host.set_maintenance_mode(false);
        assert!(host.is_healthy());
    }

    #[test]
    fn test_standalone_has_no_maintenance() {
        let host = Host::new("foo.com");
        host.set_maintenance_mode(true);
        assert!(!host.is_maintenance_mode());
        assert!(host.is_healthy());

        host.set_healthy(false);
        assert!(!host.is_healthy());
    }

    #[test]
    fn test_probe_failure_counter() {
        let host = Host::new("foo.com");
        assert_eq!(host.record_probe_failure(), 1);
        assert_eq!(host.record_probe_failure(), 2);
        host.reset_probe_failures();
        assert_eq!(host.probe_failures(), 0);
    }
}
