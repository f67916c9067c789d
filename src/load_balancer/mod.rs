//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! HostListProvider discovers hosts
//!     → register_hosts / remove_hosts (copy-on-write registry swap)
//!
//! Outgoing request
//!     → begin_request (least_outstanding.rs picks a candidate,
//!       compare-and-swap claims it)
//!     → RequestGuard held for the duration of the call
//!     → guard.complete(success) updates outstanding/error counters
//! ```
//!
//! # Design Decisions
//! - The registry is the single source of truth for known hosts
//! - Reads never lock: selection works on an `ArcSwap` snapshot
//! - Counters are per-host atomics; removal of a host does not disturb
//!   requests already holding its entry
//! - Health is owned by the probe cycle; request outcomes only feed stats

pub mod host;
pub mod least_outstanding;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::error::SmartClientError;
use crate::observability::metrics;
use host::{Host, HostKey};

/// Per-host request statistics.
#[derive(Debug, Default)]
pub struct HostCounters {
    outstanding: AtomicUsize,
    total_requests: AtomicU64,
    total_errors: AtomicU64,
}

impl HostCounters {
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }

    pub(crate) fn start(&self) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Claim a request slot only if the outstanding count is still `seen`.
    pub(crate) fn try_claim(&self, seen: usize) -> bool {
        let claimed = self
            .outstanding
            .compare_exchange(seen, seen + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if claimed {
            self.total_requests.fetch_add(1, Ordering::Relaxed);
        }
        claimed
    }

    pub(crate) fn complete(&self, success: bool) {
        let _ = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if !success {
            self.total_errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A registered host and its statistics.
#[derive(Debug)]
pub struct HostEntry {
    pub host: Arc<Host>,
    /// Shared with any entry that replaces this one for the same key.
    pub counters: Arc<HostCounters>,
}

impl HostEntry {
    pub fn new(host: Arc<Host>) -> Self {
        Self {
            host,
            counters: Arc::new(HostCounters::default()),
        }
    }

    fn stats(&self) -> HostStats {
        HostStats {
            host: self.host.key().to_string(),
            vdc: self.host.vdc_name().map(str::to_string),
            healthy: self.host.is_healthy(),
            maintenance_mode: self.host.is_maintenance_mode(),
            outstanding: self.counters.outstanding(),
            total_requests: self.counters.total_requests(),
            total_errors: self.counters.errors(),
        }
    }
}

/// Point-in-time copy of one host's statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostStats {
    pub host: String,
    pub vdc: Option<String>,
    pub healthy: bool,
    pub maintenance_mode: bool,
    pub outstanding: usize,
    pub total_requests: u64,
    pub total_errors: u64,
}

/// Immutable registry snapshot: entries in registration order plus an index.
#[derive(Debug, Default)]
struct Registry {
    entries: Vec<Arc<HostEntry>>,
    index: HashMap<HostKey, usize>,
}

impl Registry {
    fn from_entries(entries: Vec<Arc<HostEntry>>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.host.key().clone(), i))
            .collect();
        Self { entries, index }
    }

    fn get(&self, key: &HostKey) -> Option<&Arc<HostEntry>> {
        self.index.get(key).map(|&i| &self.entries[i])
    }
}

/// Holds the current host set and selects a host per request.
#[derive(Debug, Default)]
pub struct LoadBalancer {
    registry: ArcSwap<Registry>,
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a load balancer with an initial host set.
    pub fn with_hosts(hosts: &[Arc<Host>]) -> Self {
        let lb = Self::new();
        lb.register_hosts(hosts);
        lb
    }

    /// Add unseen hosts with zero statistics. Known hosts keep their stats.
    ///
    /// Returns the number of hosts actually added.
    pub fn register_hosts(&self, hosts: &[Arc<Host>]) -> usize {
        let mut added = 0;
        self.registry.rcu(|current| {
            let mut entries = current.entries.clone();
            let mut seen: HashSet<&HostKey> = current.index.keys().collect();
            added = 0;
            for host in hosts {
                if seen.insert(host.key()) {
                    entries.push(Arc::new(HostEntry::new(host.clone())));
                    added += 1;
                }
            }
            Registry::from_entries(entries)
        });
        if added > 0 {
            tracing::debug!(added, "Registered hosts with load balancer");
        }
        added
    }

    /// Drop hosts and their statistics.
    ///
    /// Requests already in flight against a removed host keep their own
    /// entry and complete normally.
    pub fn remove_hosts(&self, hosts: &[Arc<Host>]) -> usize {
        let doomed: HashSet<&HostKey> = hosts.iter().map(|h| h.key()).collect();
        let mut removed = 0;
        self.registry.rcu(|current| {
            let before = current.entries.len();
            let entries: Vec<_> = current
                .entries
                .iter()
                .filter(|e| !doomed.contains(e.host.key()))
                .cloned()
                .collect();
            removed = before - entries.len();
            Registry::from_entries(entries)
        });
        if removed > 0 {
            tracing::debug!(removed, "Removed hosts from load balancer");
        }
        removed
    }

    /// Point the entry for `host`'s key at this `host` object, keeping the
    /// entry's statistics and position.
    ///
    /// Returns false if the key is not registered or already maps to `host`.
    pub fn replace_host(&self, host: &Arc<Host>) -> bool {
        let mut replaced = false;
        self.registry.rcu(|current| {
            replaced = false;
            let entries = current
                .entries
                .iter()
                .map(|e| {
                    if e.host.key() == host.key() && !Arc::ptr_eq(&e.host, host) {
                        replaced = true;
                        Arc::new(HostEntry {
                            host: host.clone(),
                            counters: e.counters.clone(),
                        })
                    } else {
                        e.clone()
                    }
                })
                .collect();
            Registry::from_entries(entries)
        });
        if replaced {
            tracing::debug!(host = %host, "Replaced host object in load balancer");
        }
        replaced
    }

    /// Choose a host without claiming it.
    pub fn select_host(&self, excluded: &HashSet<HostKey>) -> Result<Arc<Host>, SmartClientError> {
        let registry = self.registry.load();
        match least_outstanding::pick(&registry.entries, excluded) {
            Some(candidate) => Ok(candidate.entry.host.clone()),
            None => {
                self.log_no_healthy(&registry);
                Err(SmartClientError::NoHealthyHosts)
            }
        }
    }

    /// Select a host and record a request start on it in one step.
    ///
    /// The candidate is claimed with a compare-and-swap on the outstanding
    /// count it was selected on; if another caller got there first the
    /// selection is redone.
    pub fn begin_request(&self, excluded: &HashSet<HostKey>) -> Result<RequestGuard, SmartClientError> {
        loop {
            let registry = self.registry.load();
            let Some(candidate) = least_outstanding::pick(&registry.entries, excluded) else {
                self.log_no_healthy(&registry);
                return Err(SmartClientError::NoHealthyHosts);
            };
            if candidate.entry.counters.try_claim(candidate.outstanding) {
                return Ok(RequestGuard {
                    entry: candidate.entry.clone(),
                    completed: false,
                });
            }
        }
    }

    /// Record the start of a request on `host`. Unknown hosts are ignored.
    pub fn request_started(&self, host: &Host) {
        match self.registry.load().get(host.key()) {
            Some(entry) => entry.counters.start(),
            None => tracing::debug!(host = %host, "Request started on unregistered host"),
        }
    }

    /// Record the outcome of a request on `host`. Unknown hosts are ignored.
    pub fn request_completed(&self, host: &Host, success: bool) {
        match self.registry.load().get(host.key()) {
            Some(entry) => {
                entry.counters.complete(success);
                metrics::record_request(&host.key().to_string(), success);
            }
            None => tracing::debug!(host = %host, "Request completed on unregistered host"),
        }
    }

    /// Snapshot of every registered host's counters, in registration order.
    pub fn get_host_stats(&self) -> Vec<HostStats> {
        self.registry.load().entries.iter().map(|e| e.stats()).collect()
    }

    pub fn contains(&self, key: &HostKey) -> bool {
        self.registry.load().index.contains_key(key)
    }

    /// All registered hosts, in registration order.
    pub fn hosts(&self) -> Vec<Arc<Host>> {
        self.registry.load().entries.iter().map(|e| e.host.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.registry.load().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn log_no_healthy(&self, registry: &Registry) {
        tracing::debug!(host_count = registry.entries.len(), "No healthy hosts found");
        for e in &registry.entries {
            tracing::debug!(
                host = %e.host,
                reachable = e.host.is_reachable(),
                maintenance = e.host.is_maintenance_mode(),
                "Host status"
            );
        }
    }
}

/// A claimed request slot on one host.
///
/// Dropping the guard without calling [`complete`](Self::complete) counts
/// the request as failed (it was cancelled or panicked mid-flight).
#[derive(Debug)]
pub struct RequestGuard {
    entry: Arc<HostEntry>,
    completed: bool,
}

impl RequestGuard {
    pub fn host(&self) -> &Arc<Host> {
        &self.entry.host
    }

    pub fn complete(mut self, success: bool) {
        self.finish(success);
    }

    fn finish(&mut self, success: bool) {
        if self.completed {
            return;
        }
        self.completed = true;
        self.entry.counters.complete(success);
        metrics::record_request(&self.entry.host.key().to_string(), success);
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.finish(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::host::HostKind;

    fn hosts(names: &[&str]) -> Vec<Arc<Host>> {
        names.iter().map(|n| Arc::new(Host::new(*n))).collect()
    }

    fn none() -> HashSet<HostKey> {
        HashSet::new()
    }

    #[test]
    fn test_register_is_idempotent() {
        let lb = LoadBalancer::with_hosts(&hosts(&["a", "b"]));
        lb.request_started(&Host::new("a"));

        // re-registering a known host (even a distinct Arc) keeps its stats
        assert_eq!(lb.register_hosts(&hosts(&["a", "c"])), 1);
        let stats = lb.get_host_stats();
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].host, "a");
        assert_eq!(stats[0].total_requests, 1);
        assert_eq!(stats[2].host, "c");
    }

    #[test]
    fn test_remove_hosts() {
        let all = hosts(&["a", "b", "c"]);
        let lb = LoadBalancer::with_hosts(&all);
        assert_eq!(lb.remove_hosts(&all[1..2]), 1);
        assert!(!lb.contains(all[1].key()));
        assert_eq!(
            lb.hosts().iter().map(|h| h.name().to_string()).collect::<Vec<_>>(),
            vec!["a", "c"]
        );
        // removing again is a no-op
        assert_eq!(lb.remove_hosts(&all[1..2]), 0);
    }

    #[test]
    fn test_no_healthy_hosts() {
        let lb = LoadBalancer::new();
        assert!(matches!(lb.select_host(&none()), Err(SmartClientError::NoHealthyHosts)));

        let all = hosts(&["a"]);
        lb.register_hosts(&all);
        all[0].set_healthy(false);
        assert!(matches!(lb.begin_request(&none()), Err(SmartClientError::NoHealthyHosts)));
    }

    #[test]
    fn test_maintenance_host_never_selected() {
        let vdc_host = Arc::new(Host::from_key(HostKey::new("m", None), HostKind::Vdc("vdc1".into())));
        let other = Arc::new(Host::from_key(HostKey::new("n", None), HostKind::Vdc("vdc1".into())));
        let lb = LoadBalancer::with_hosts(&[vdc_host.clone(), other.clone()]);

        vdc_host.set_maintenance_mode(true);
        for _ in 0..10 {
            let guard = lb.begin_request(&none()).unwrap();
            assert_eq!(guard.host().name(), "n");
            guard.complete(true);
        }

        other.set_maintenance_mode(true);
        assert!(lb.select_host(&none()).is_err());

        vdc_host.set_maintenance_mode(false);
        assert_eq!(lb.select_host(&none()).unwrap().name(), "m");
    }

    #[test]
    fn test_fair_distribution() {
        let lb = LoadBalancer::with_hosts(&hosts(&["a", "b", "c"]));
        let mut guards = Vec::new();
        for _ in 0..10 {
            guards.push(lb.begin_request(&none()).unwrap());
            let stats = lb.get_host_stats();
            let max = stats.iter().map(|s| s.outstanding).max().unwrap();
            let min = stats.iter().map(|s| s.outstanding).min().unwrap();
            assert!(max - min <= 1, "outstanding spread too wide: {:?}", stats);
        }
        drop(guards);
        assert!(lb.get_host_stats().iter().all(|s| s.outstanding == 0));
    }

    #[test]
    fn test_exclusion() {
        let all = hosts(&["a", "b"]);
        let lb = LoadBalancer::with_hosts(&all);
        let excluded: HashSet<HostKey> = [all[0].key().clone()].into_iter().collect();
        assert_eq!(lb.select_host(&excluded).unwrap().name(), "b");
    }

    #[test]
    fn test_guard_outcomes() {
        let lb = LoadBalancer::with_hosts(&hosts(&["a"]));

        lb.begin_request(&none()).unwrap().complete(true);
        lb.begin_request(&none()).unwrap().complete(false);
        drop(lb.begin_request(&none()).unwrap()); // cancelled

        let stats = &lb.get_host_stats()[0];
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.total_errors, 2);
        assert_eq!(stats.outstanding, 0);
    }

    #[test]
    fn test_errors_do_not_flip_health() {
        let all = hosts(&["a"]);
        let lb = LoadBalancer::with_hosts(&all);
        for _ in 0..5 {
            lb.request_started(&all[0]);
            lb.request_completed(&all[0], false);
        }
        assert!(all[0].is_healthy());
        assert_eq!(lb.get_host_stats()[0].total_errors, 5);
    }

    #[test]
    fn test_guard_survives_removal() {
        let all = hosts(&["a", "b"]);
        let lb = LoadBalancer::with_hosts(&all);
        let guard = lb.begin_request(&none()).unwrap();
        assert_eq!(guard.host().name(), "a");

        lb.remove_hosts(&all[0..1]);
        guard.complete(false);
        assert_eq!(lb.get_host_stats().len(), 1);
        assert_eq!(lb.get_host_stats()[0].total_errors, 0);
    }

    #[test]
    fn test_concurrent_accounting() {
        let lb = Arc::new(LoadBalancer::with_hosts(&hosts(&["a", "b", "c"])));
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let lb = lb.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        let guard = lb.begin_request(&HashSet::new()).unwrap();
                        guard.complete(i % 10 != 0);
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let stats = lb.get_host_stats();
        assert_eq!(stats.iter().map(|s| s.total_requests).sum::<u64>(), 2000);
        assert_eq!(stats.iter().map(|s| s.total_errors).sum::<u64>(), 200);
        assert!(stats.iter().all(|s| s.outstanding == 0));
    }

    #[test]
    fn test_replace_host_keeps_stats() {
        let lb = LoadBalancer::with_hosts(&hosts(&["a", "b"]));
        let guard = lb.begin_request(&HashSet::new()).unwrap();
        assert_eq!(guard.host().name(), "a");

        let copy = Arc::new(Host::vdc_host("vdc2", HostKey::new("a", None)));
        assert!(lb.replace_host(&copy));
        assert!(!lb.replace_host(&copy));
        assert!(!lb.replace_host(&Arc::new(Host::new("z"))));

        assert!(Arc::ptr_eq(&lb.hosts()[0], &copy));
        assert_eq!(lb.get_host_stats()[0].outstanding, 1);
        assert_eq!(lb.get_host_stats()[0].vdc.as_deref(), Some("vdc2"));

        // the request started on the old object completes on the shared counters
        guard.complete(true);
        let stats = lb.get_host_stats();
        assert_eq!(stats[0].outstanding, 0);
        assert_eq!(stats[0].total_requests, 1);

        // flags of the new object now gate selection
        copy.set_maintenance_mode(true);
        assert_eq!(lb.select_host(&HashSet::new()).unwrap().name(), "b");
    }
}
