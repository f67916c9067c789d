//! Background refresh cycle.
//!
//! # Responsibilities
//! - Periodically refresh every site's topology
//! - Probe every known host and apply the eviction policy
//! - Stop promptly when asked, abandoning an in-progress cycle

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use indexmap::IndexMap;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::config::schema::PollingConfig;
use crate::discovery::provider::HostListProvider;
use crate::health::checker::apply_outcome;
use crate::lifecycle::StopListener;
use crate::load_balancer::host::{Host, HostKey};
use crate::observability::metrics;

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Hosts known after the topology refresh.
    pub hosts: usize,
    /// Hosts probed.
    pub probed: usize,
    /// Probes that failed.
    pub failures: usize,
    /// Hosts taken out of rotation this cycle.
    pub evicted: usize,
    /// Hosts put back into rotation this cycle.
    pub readmitted: usize,
}

pub struct PollingDaemon {
    provider: Arc<HostListProvider>,
    config: PollingConfig,
}

impl PollingDaemon {
    pub fn new(provider: Arc<HostListProvider>, config: PollingConfig) -> Self {
        Self { provider, config }
    }

    pub fn spawn(self, stop: StopListener) -> JoinHandle<()> {
        tokio::spawn(self.run(stop))
    }

    /// Run cycles every `interval_secs` until `stop` fires. The first
    /// cycle starts immediately.
    pub async fn run(self, mut stop: StopListener) {
        if !self.config.host_update_enabled && !self.config.health_check_enabled {
            tracing::info!("Polling disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            host_update = self.config.host_update_enabled,
            health_check = self.config.health_check_enabled,
            "Polling daemon starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.stopped() => break,
            }
            tokio::select! {
                summary = self.poll_once() => {
                    tracing::debug!(
                        hosts = summary.hosts,
                        failures = summary.failures,
                        evicted = summary.evicted,
                        readmitted = summary.readmitted,
                        "Polling cycle complete"
                    );
                }
                _ = stop.stopped() => break,
            }
        }
        tracing::info!("Polling daemon stopped");
    }

    /// Run one cycle: refresh topology, then probe every known host.
    ///
    /// Each host key is pinged once; the outcome is applied to every
    /// object for that key (one per site listing it, plus the load
    /// balancer's).
    pub async fn poll_once(&self) -> PollSummary {
        let mut summary = PollSummary::default();

        let hosts = if self.config.host_update_enabled {
            self.provider.get_host_list().await
        } else {
            self.provider.known_hosts()
        };
        summary.hosts = hosts.len();

        if !self.config.health_check_enabled {
            return summary;
        }

        let lb = self.provider.load_balancer();
        let mut by_key: IndexMap<HostKey, Vec<Arc<Host>>> = IndexMap::new();
        for host in hosts.into_iter().chain(lb.hosts()) {
            let copies = by_key.entry(host.key().clone()).or_default();
            if !copies.iter().any(|c| Arc::ptr_eq(c, &host)) {
                copies.push(host);
            }
        }

        let provider = &self.provider;
        let results: Vec<_> = stream::iter(by_key.into_values())
            .map(|copies| async move {
                let result = provider.run_health_check(&copies[0]).await;
                (copies, result)
            })
            .buffer_unordered(self.config.max_concurrent_checks.max(1))
            .collect()
            .await;

        let threshold = self.provider.eviction_threshold();
        for (copies, result) in results {
            summary.probed += 1;
            for copy in &copies[1..] {
                apply_outcome(copy, &result);
            }
            let host = &copies[0];
            match result {
                Ok(_) => {
                    copies.iter().for_each(|c| c.reset_probe_failures());
                    if !lb.contains(host.key()) {
                        if let Some(site_host) = self.provider.find_host(host.key()) {
                            lb.register_hosts(&[site_host]);
                            summary.readmitted += 1;
                            tracing::info!(host = %host, "Host readmitted to rotation");
                        }
                    }
                }
                Err(e) => {
                    summary.failures += 1;
                    let failures = copies
                        .iter()
                        .map(|c| c.record_probe_failure())
                        .max()
                        .unwrap_or_default();
                    tracing::warn!(host = %host, failures, error = %e, "Health check failed");
                    if failures >= threshold && lb.remove_hosts(&[host.clone()]) > 0 {
                        summary.evicted += 1;
                        metrics::record_eviction(&host.key().to_string());
                        tracing::warn!(host = %host, failures, "Host evicted after repeated probe failures");
                    }
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::discovery::vdc::Vdc;
    use crate::health::ping::{PingItem, PingResponse, PingStatus, MAINTENANCE_MODE};
    use crate::lifecycle::StopSignal;
    use crate::load_balancer::LoadBalancer;
    use crate::transport::{Transport, TransportFuture};
    use bytes::Bytes;
    use hyper::{Request, Response};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Answers pings from hosts marked up; everything else is refused.
    #[derive(Default)]
    struct PingTransport {
        up: Mutex<HashMap<String, bool>>,
        maintenance: Mutex<HashSet<String>>,
        calls: AtomicUsize,
    }

    impl PingTransport {
        fn set(&self, authority: &str, up: bool) {
            self.up.lock().unwrap().insert(authority.to_string(), up);
        }

        fn set_maintenance(&self, authority: &str) {
            self.maintenance.lock().unwrap().insert(authority.to_string());
        }
    }

    impl Transport for PingTransport {
        fn issue(&self, request: Request<Bytes>) -> TransportFuture<'_> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let authority = request.uri().authority().unwrap().to_string();
                let up = self.up.lock().unwrap().get(&authority).copied().unwrap_or(false);
                if up {
                    let mut ping = PingResponse::new();
                    if self.maintenance.lock().unwrap().contains(&authority) {
                        ping.insert(PingItem::new(MAINTENANCE_MODE, Some(PingStatus::On), None, None));
                    }
                    Ok(Response::new(Bytes::from(ping.to_xml())))
                } else {
                    Err(TransportError::Client("connection refused".into()))
                }
            })
        }
    }

    fn probe_only() -> PollingConfig {
        PollingConfig {
            host_update_enabled: false,
            ..PollingConfig::default()
        }
    }

    fn setup(transport: Arc<PingTransport>) -> (Arc<LoadBalancer>, PollingDaemon) {
        let lb = Arc::new(LoadBalancer::with_hosts(&[
            Arc::new(Host::new("a")),
            Arc::new(Host::new("b")),
        ]));
        let provider = Arc::new(HostListProvider::new(transport, lb.clone()).with_thresholds(2, 2));
        (lb, PollingDaemon::new(provider, probe_only()))
    }

    #[tokio::test]
    async fn test_eviction_and_readmission() {
        let transport = Arc::new(PingTransport::default());
        transport.set("a:9020", true);
        let (lb, daemon) = setup(transport.clone());

        let summary = daemon.poll_once().await;
        assert_eq!(summary.probed, 2);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.evicted, 0);
        assert_eq!(lb.len(), 2);

        let summary = daemon.poll_once().await;
        assert_eq!(summary.evicted, 1);
        assert_eq!(lb.hosts().len(), 1);
        assert_eq!(lb.hosts()[0].name(), "a");

        // evicted hosts are still probed
        transport.set("b:9020", true);
        let summary = daemon.poll_once().await;
        assert_eq!(summary.probed, 2);
        assert_eq!(summary.readmitted, 1);
        assert_eq!(lb.len(), 2);
        assert!(lb.hosts().iter().all(|h| h.is_healthy() && h.probe_failures() == 0));
    }

    #[tokio::test]
    async fn test_health_checks_disabled() {
        let transport = Arc::new(PingTransport::default());
        let (_, daemon) = setup(transport.clone());
        let daemon = PollingDaemon::new(
            daemon.provider.clone(),
            PollingConfig {
                host_update_enabled: false,
                health_check_enabled: false,
                ..PollingConfig::default()
            },
        );

        let summary = daemon.poll_once().await;
        assert_eq!(summary.hosts, 2);
        assert_eq!(summary.probed, 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stops_on_signal() {
        let transport = Arc::new(PingTransport::default());
        let (_, daemon) = setup(transport.clone());

        let stop = StopSignal::new();
        let handle = daemon.spawn(stop.listener());
        time::sleep(Duration::from_millis(50)).await;
        stop.trigger();

        time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        // the immediate first cycle ran, the next is two minutes away
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cycle_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}
        let (_, daemon) = setup(Arc::new(PingTransport::default()));
        assert_send(&daemon.poll_once());
        assert_send(&daemon.run(StopSignal::new().listener()));
    }

    #[tokio::test]
    async fn test_shared_key_pinged_once_per_cycle() {
        let transport = Arc::new(PingTransport::default());
        transport.set("a:9020", true);
        transport.set_maintenance("a:9020");

        let vdc1 = Arc::new(Vdc::new(["a"]).with_name("vdc1"));
        let vdc2 = Arc::new(Vdc::new(["a"]).with_name("vdc2"));
        let lb = Arc::new(LoadBalancer::with_hosts(&vdc1.hosts()));
        let provider = Arc::new(
            HostListProvider::new(transport.clone(), lb.clone()).with_vdcs([vdc1.clone(), vdc2.clone()]),
        );
        let daemon = PollingDaemon::new(provider, probe_only());

        let summary = daemon.poll_once().await;
        assert_eq!(summary.hosts, 2);
        assert_eq!(summary.probed, 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert!(vdc1.hosts()[0].is_maintenance_mode());
        assert!(vdc2.hosts()[0].is_maintenance_mode());
        assert!(lb.select_host(&HashSet::new()).is_err());

        transport.set("a:9020", false);
        daemon.poll_once().await;
        assert!(!vdc1.hosts()[0].is_reachable());
        assert!(!vdc2.hosts()[0].is_reachable());
        assert_eq!(vdc2.hosts()[0].probe_failures(), 1);
    }

    #[tokio::test]
    async fn test_balanced_hosts_outside_sites_are_checked() {
        let transport = Arc::new(PingTransport::default());

        let orphan = Arc::new(Host::new("a"));
        let lb = Arc::new(LoadBalancer::with_hosts(&[orphan.clone()]));
        let provider = Arc::new(
            HostListProvider::new(transport.clone(), lb.clone()).with_vdcs([Arc::new(Vdc::new(["b"]))]),
        );
        let daemon = PollingDaemon::new(provider, probe_only());

        let summary = daemon.poll_once().await;
        assert_eq!(summary.probed, 2);
        assert!(!orphan.is_healthy());
        assert!(lb.select_host(&HashSet::new()).is_err());
    }
}
