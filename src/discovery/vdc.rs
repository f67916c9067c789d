//! A site (VDC) and its current host set.
//!
//! # Responsibilities
//! - Own the hosts discovered for one site
//! - Merge topology answers into that set without losing host state
//! - Track refresh progress so callers can see why a site looks stale

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::schema::VdcConfig;
use crate::load_balancer::host::{Host, HostKey, HostKind};

/// Progress of the most recent topology refresh of a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshState {
    /// No refresh has run yet; the site holds its seeds.
    Unrefreshed,
    Refreshing,
    Refreshed { hosts: usize },
    /// The last refresh failed; the previous host set was kept.
    RefreshFailed { error: String },
}

/// Hosts gained and lost by one merge.
#[derive(Debug, Default)]
pub struct TopologyChange {
    pub added: Vec<Arc<Host>>,
    pub removed: Vec<Arc<Host>>,
}

impl TopologyChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// A named group of hosts belonging to one site.
///
/// The host list is replaced wholesale on every refresh, so readers holding
/// the previous snapshot never see a half-merged list.
pub struct Vdc {
    name: String,
    standalone: bool,
    hosts: ArcSwap<Vec<Arc<Host>>>,
    state: ArcSwap<RefreshState>,
    /// Consecutive refreshes each known host was missing from.
    absences: DashMap<HostKey, u32>,
    refresh_lock: Mutex<()>,
}

impl Vdc {
    /// Create a site from seed hosts (`name` or `name:port`).
    ///
    /// The site is named after its first seed.
    pub fn new<I, S>(seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys: Vec<HostKey> = seeds.into_iter().map(|s| parse_seed(s.as_ref())).collect();
        let name = keys.first().map(|k| k.name.clone()).unwrap_or_default();
        Self::build(name, false, keys)
    }

    /// Rename the site. Hosts are re-tagged with the new name.
    pub fn with_name(self, name: impl Into<String>) -> Self {
        let keys = self.hosts.load().iter().map(|h| h.key().clone()).collect();
        Self::build(name.into(), self.standalone, keys)
    }

    /// Wrap plain hosts as a single implicit site.
    ///
    /// The given `Arc`s are kept, so hosts already registered with a load
    /// balancer stay shared with it.
    pub fn standalone(name: impl Into<String>, hosts: Vec<Arc<Host>>) -> Self {
        Self {
            name: name.into(),
            standalone: true,
            hosts: ArcSwap::from_pointee(hosts),
            state: ArcSwap::from_pointee(RefreshState::Unrefreshed),
            absences: DashMap::new(),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &VdcConfig) -> Self {
        let vdc = Self::new(&config.hosts);
        match &config.name {
            Some(name) => vdc.with_name(name.clone()),
            None => vdc,
        }
    }

    fn build(name: String, standalone: bool, keys: Vec<HostKey>) -> Self {
        let mut seen = HashSet::new();
        let hosts = keys
            .into_iter()
            .filter(|k| seen.insert(k.clone()))
            .map(|k| Arc::new(Self::make_host(&name, standalone, k)))
            .collect();
        Self {
            standalone,
            hosts: ArcSwap::from_pointee(hosts),
            state: ArcSwap::from_pointee(RefreshState::Unrefreshed),
            absences: DashMap::new(),
            refresh_lock: Mutex::new(()),
            name,
        }
    }

    fn make_host(vdc: &str, standalone: bool, key: HostKey) -> Host {
        if standalone {
            Host::from_key(key, HostKind::Standalone)
        } else {
            Host::vdc_host(vdc, key)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_standalone(&self) -> bool {
        self.standalone
    }

    /// Current host snapshot.
    pub fn hosts(&self) -> Arc<Vec<Arc<Host>>> {
        self.hosts.load_full()
    }

    /// True when the site has hosts and every one of them is healthy.
    pub fn is_healthy(&self) -> bool {
        let hosts = self.hosts.load();
        !hosts.is_empty() && hosts.iter().all(|h| h.is_healthy())
    }

    pub fn state(&self) -> RefreshState {
        RefreshState::clone(&self.state.load())
    }

    pub(crate) fn set_state(&self, state: RefreshState) {
        self.state.store(Arc::new(state));
    }

    /// Serialize refreshes of this site.
    pub(crate) async fn lock_refresh(&self) -> MutexGuard<'_, ()> {
        self.refresh_lock.lock().await
    }

    /// Merge the hostnames a topology query returned.
    ///
    /// Hosts already known by name keep their `Arc` (and so their health
    /// flags and any explicit port). Unknown names become new hosts. A known
    /// host missing from `names` is dropped only once it has been missing
    /// for `absence_threshold` consecutive merges.
    pub fn merge_topology(&self, names: &[String], absence_threshold: u32) -> TopologyChange {
        let current = self.hosts.load_full();
        let mut change = TopologyChange::default();
        let mut next = Vec::with_capacity(names.len());
        let mut listed = HashSet::new();

        for name in names {
            if !listed.insert(name.as_str()) {
                continue;
            }
            match current.iter().find(|h| h.name() == name) {
                Some(host) => {
                    self.absences.remove(host.key());
                    next.push(host.clone());
                }
                None => {
                    let host = Arc::new(Self::make_host(
                        &self.name,
                        self.standalone,
                        HostKey::new(name.clone(), None),
                    ));
                    change.added.push(host.clone());
                    next.push(host);
                }
            }
        }

        for host in current.iter().filter(|h| !listed.contains(h.name())) {
            let misses = {
                let mut count = self.absences.entry(host.key().clone()).or_insert(0);
                *count += 1;
                *count
            };
            if misses >= absence_threshold {
                self.absences.remove(host.key());
                change.removed.push(host.clone());
            } else {
                tracing::debug!(
                    vdc = %self.name,
                    host = %host,
                    misses,
                    "Host missing from topology"
                );
                next.push(host.clone());
            }
        }

        self.hosts.store(Arc::new(next));
        change
    }
}

fn parse_seed(seed: &str) -> HostKey {
    seed.parse()
        .unwrap_or_else(|_| HostKey::new(seed.trim(), None))
}

impl fmt::Debug for Vdc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vdc")
            .field("name", &self.name)
            .field("standalone", &self.standalone)
            .field("hosts", &self.hosts.load().len())
            .field("state", &self.state())
            .finish()
    }
}

impl fmt::Display for Vdc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(vdc: &Vdc) -> Vec<String> {
        vdc.hosts().iter().map(|h| h.key().to_string()).collect()
    }

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_named_after_first_seed() {
        let vdc = Vdc::new(["10.0.0.1:9020", "10.0.0.2"]);
        assert_eq!(vdc.name(), "10.0.0.1");
        assert_eq!(names(&vdc), vec!["10.0.0.1:9020", "10.0.0.2"]);
        assert_eq!(vdc.state(), RefreshState::Unrefreshed);

        let vdc = vdc.with_name("vdc1");
        assert_eq!(vdc.name(), "vdc1");
        assert!(vdc.hosts().iter().all(|h| h.vdc_name() == Some("vdc1")));
    }

    #[test]
    fn test_is_healthy() {
        let vdc = Vdc::new(["a", "b"]);
        assert!(vdc.is_healthy());

        vdc.hosts()[1].set_healthy(false);
        assert!(!vdc.is_healthy());

        vdc.hosts()[1].set_healthy(true);
        vdc.hosts()[0].set_maintenance_mode(true);
        assert!(!vdc.is_healthy());

        assert!(!Vdc::new(Vec::<String>::new()).is_healthy());
    }

    #[test]
    fn test_merge_keeps_existing_hosts() {
        let vdc = Vdc::new(["a"]);
        let a = vdc.hosts()[0].clone();
        a.set_healthy(false);

        let change = vdc.merge_topology(&list(&["a", "b", "b"]), 2);
        assert_eq!(change.added.len(), 1);
        assert!(change.removed.is_empty());
        assert_eq!(names(&vdc), vec!["a", "b"]);
        assert!(Arc::ptr_eq(&vdc.hosts()[0], &a));
        assert!(!vdc.hosts()[0].is_healthy());
        assert_eq!(vdc.hosts()[1].vdc_name(), Some("a"));
    }

    #[test]
    fn test_merge_matches_seed_with_explicit_port() {
        let vdc = Vdc::new(["127.0.0.1:8080"]);
        let change = vdc.merge_topology(&list(&["127.0.0.1"]), 1);
        assert!(change.is_empty());
        assert_eq!(names(&vdc), vec!["127.0.0.1:8080"]);
    }

    #[test]
    fn test_absent_hosts_dropped_after_threshold() {
        let vdc = Vdc::new(["a", "b"]);

        let change = vdc.merge_topology(&list(&["a"]), 2);
        assert!(change.removed.is_empty());
        assert_eq!(names(&vdc), vec!["a", "b"]);

        // reappearing resets the count
        vdc.merge_topology(&list(&["a", "b"]), 2);
        vdc.merge_topology(&list(&["a"]), 2);
        assert_eq!(names(&vdc), vec!["a", "b"]);

        let change = vdc.merge_topology(&list(&["a"]), 2);
        assert_eq!(change.removed.len(), 1);
        assert_eq!(change.removed[0].name(), "b");
        assert_eq!(names(&vdc), vec!["a"]);
    }

    #[test]
    fn test_standalone_hosts_stay_plain() {
        let host = Arc::new(Host::new("a"));
        let vdc = Vdc::standalone("default", vec![host.clone()]);
        assert!(vdc.is_standalone());
        assert!(Arc::ptr_eq(&vdc.hosts()[0], &host));

        vdc.merge_topology(&list(&["a", "b"]), 1);
        assert!(vdc.hosts().iter().all(|h| !h.is_vdc_host()));
    }
}
