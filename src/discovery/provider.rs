//! Host list provider.
//!
//! # Data Flow
//! ```text
//! get_host_list()
//!     → every site refreshed concurrently (one refresh per site at a time)
//!         → first healthy host answering GET /?endpoint wins
//!         → Vdc::merge_topology (keep known hosts, add new, age out absent)
//!     → LoadBalancer: register new hosts, remove dropped ones
//!     → flattened host list of every site
//! ```
//!
//! # Design Decisions
//! - A failed site keeps its previous host list; other sites are unaffected
//! - Hosts evicted for failed probes are not re-registered by a refresh;
//!   readmission is the health-check cycle's call

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::join_all;
use hyper::Request;
use tokio::time;

use crate::config::schema::SmartConfig;
use crate::discovery::topology::{ListDataNode, ENDPOINT_PATH};
use crate::discovery::vdc::{RefreshState, TopologyChange, Vdc};
use crate::error::{ProbeError, TopologyError, TransportError};
use crate::health::checker::HealthChecker;
use crate::health::ping::PingResponse;
use crate::load_balancer::host::{Host, HostKey, HostKind};
use crate::load_balancer::LoadBalancer;
use crate::observability::metrics;
use crate::transport::{Endpoint, RequestSigner, S3V2Signer, Transport};

/// Name of the implicit site used when no VDCs are configured.
pub const STANDALONE_SITE: &str = "default";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_ABSENCE_THRESHOLD: u32 = 2;
const DEFAULT_EVICTION_THRESHOLD: u32 = 3;

/// Discovers cluster nodes for every configured site.
pub struct HostListProvider {
    transport: Arc<dyn Transport>,
    load_balancer: Arc<LoadBalancer>,
    signer: Option<Arc<dyn RequestSigner>>,
    endpoint: Endpoint,
    /// Port set through `with_port`; survives protocol changes.
    port: Option<u16>,
    timeout: Duration,
    absence_threshold: u32,
    eviction_threshold: u32,
    vdcs: Vec<Arc<Vdc>>,
}

impl HostListProvider {
    /// Create a provider over the hosts already registered with
    /// `load_balancer`, treated as one standalone site.
    pub fn new(transport: Arc<dyn Transport>, load_balancer: Arc<LoadBalancer>) -> Self {
        let seeds = load_balancer.hosts();
        Self {
            transport,
            load_balancer,
            signer: None,
            endpoint: Endpoint::default(),
            port: None,
            timeout: DEFAULT_TIMEOUT,
            absence_threshold: DEFAULT_ABSENCE_THRESHOLD,
            eviction_threshold: DEFAULT_EVICTION_THRESHOLD,
            vdcs: vec![Arc::new(Vdc::standalone(STANDALONE_SITE, seeds))],
        }
    }

    /// Build a provider from a validated config.
    ///
    /// Seed hosts of every site are registered with `load_balancer` so
    /// requests can be routed before the first refresh completes.
    pub fn from_config(
        config: &SmartConfig,
        transport: Arc<dyn Transport>,
        load_balancer: Arc<LoadBalancer>,
    ) -> Self {
        let vdcs: Vec<Arc<Vdc>> = if config.vdcs.is_empty() {
            let seeds = config
                .initial_hosts
                .iter()
                .map(|h| Arc::new(Host::from_key(parse_host(h), HostKind::Standalone)))
                .collect();
            vec![Arc::new(Vdc::standalone(STANDALONE_SITE, seeds))]
        } else {
            if !config.initial_hosts.is_empty() {
                tracing::warn!("initial_hosts ignored: VDC seed hosts are used instead");
            }
            config.vdcs.iter().map(|c| Arc::new(Vdc::from_config(c))).collect()
        };
        for vdc in &vdcs {
            load_balancer.register_hosts(&vdc.hosts());
        }

        let mut provider = Self::new(transport, load_balancer)
            .with_protocol(&config.protocol)
            .with_timeout(Duration::from_secs(config.polling.probe_timeout_secs))
            .with_thresholds(config.polling.absence_threshold, config.polling.eviction_threshold)
            .with_vdcs(vdcs);
        if let Some(port) = config.port {
            provider = provider.with_port(port);
        }
        if let Some(credentials) = &config.credentials {
            provider = provider.with_signer(Arc::new(S3V2Signer::new(
                credentials.user.clone(),
                credentials.secret.clone(),
            )));
        }
        provider
    }

    /// Set the protocol. The port follows unless one was set explicitly.
    pub fn with_protocol(mut self, protocol: &str) -> Self {
        self.endpoint = Endpoint::new(protocol, self.port);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self.endpoint.port = port;
        self
    }

    /// Replace the sites to discover.
    pub fn with_vdcs<I>(mut self, vdcs: I) -> Self
    where
        I: IntoIterator<Item = Arc<Vdc>>,
    {
        self.vdcs = vdcs.into_iter().collect();
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Deadline for each probe and each topology query.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_thresholds(mut self, absence: u32, eviction: u32) -> Self {
        self.absence_threshold = absence.max(1);
        self.eviction_threshold = eviction.max(1);
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn vdcs(&self) -> &[Arc<Vdc>] {
        &self.vdcs
    }

    pub fn load_balancer(&self) -> &Arc<LoadBalancer> {
        &self.load_balancer
    }

    pub fn eviction_threshold(&self) -> u32 {
        self.eviction_threshold
    }

    pub fn health_checker(&self) -> HealthChecker {
        HealthChecker::new(self.transport.clone(), self.endpoint.clone(), self.timeout)
    }

    /// Every host of every site, in site order. Not deduplicated.
    pub fn known_hosts(&self) -> Vec<Arc<Host>> {
        self.vdcs.iter().flat_map(|vdc| vdc.hosts().iter().cloned().collect::<Vec<_>>()).collect()
    }

    /// True if `key` still belongs to one of the sites.
    pub fn is_known(&self, key: &HostKey) -> bool {
        self.find_host(key).is_some()
    }

    /// The first site's host object for `key`, in site order.
    pub fn find_host(&self, key: &HostKey) -> Option<Arc<Host>> {
        self.vdcs
            .iter()
            .find_map(|vdc| vdc.hosts().iter().find(|h| h.key() == key).cloned())
    }

    /// Refresh every site and return the union of their hosts.
    ///
    /// Never fails: a site whose refresh fails keeps its previous hosts and
    /// the failure is logged.
    pub async fn get_host_list(&self) -> Vec<Arc<Host>> {
        let results = join_all(self.vdcs.iter().map(|vdc| self.refresh_vdc(vdc))).await;
        for (vdc, result) in self.vdcs.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(vdc = %vdc, error = %e, "Topology refresh failed, keeping previous hosts");
            }
        }
        self.known_hosts()
    }

    /// Probe a single host, updating its health flags.
    pub async fn run_health_check(&self, host: &Host) -> Result<PingResponse, ProbeError> {
        self.health_checker().run_health_check(host).await
    }

    /// Refresh one site and reconcile the load balancer with the result.
    pub async fn refresh_vdc(&self, vdc: &Vdc) -> Result<TopologyChange, TopologyError> {
        let _guard = vdc.lock_refresh().await;
        vdc.set_state(RefreshState::Refreshing);

        let names = match self.query_site(vdc).await {
            Ok(names) => names,
            Err(e) => {
                vdc.set_state(RefreshState::RefreshFailed { error: e.to_string() });
                metrics::record_topology_refresh(vdc.name(), false);
                return Err(e);
            }
        };

        let change = vdc.merge_topology(&names, self.absence_threshold);
        let hosts = vdc.hosts();

        let eligible: Vec<_> = hosts
            .iter()
            .filter(|h| h.probe_failures() < self.eviction_threshold)
            .cloned()
            .collect();
        self.load_balancer.register_hosts(&eligible);

        if !change.removed.is_empty() {
            // a key still listed by another site stays balanced, but on
            // that site's object so it keeps being probed
            let mut gone = Vec::new();
            for host in &change.removed {
                match self.find_host(host.key()) {
                    Some(other) => {
                        self.load_balancer.replace_host(&other);
                    }
                    None => gone.push(host.clone()),
                }
            }
            self.load_balancer.remove_hosts(&gone);
        }

        if !change.is_empty() {
            tracing::info!(
                vdc = %vdc,
                added = change.added.len(),
                removed = change.removed.len(),
                hosts = hosts.len(),
                "Topology changed"
            );
        }
        vdc.set_state(RefreshState::Refreshed { hosts: hosts.len() });
        metrics::record_topology_refresh(vdc.name(), true);
        Ok(change)
    }

    /// Ask the site's healthy hosts, in order, until one answers.
    async fn query_site(&self, vdc: &Vdc) -> Result<Vec<String>, TopologyError> {
        let hosts = vdc.hosts();
        let mut last_error = None;
        for host in hosts.iter().filter(|h| h.is_healthy()) {
            match self.query_topology(host).await {
                Ok(list) if list.data_nodes.is_empty() => {
                    last_error = Some(TopologyError::Parse {
                        host: host.key().to_string(),
                        reason: "no data nodes listed".to_string(),
                    });
                }
                Ok(list) => return Ok(list.data_nodes),
                Err(e) => {
                    tracing::debug!(vdc = %vdc, host = %host, error = %e, "Topology query failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| TopologyError::NoReachableSeed(vdc.name().to_string())))
    }

    /// Query the topology endpoint of a single host.
    pub async fn query_topology(&self, host: &Host) -> Result<ListDataNode, TopologyError> {
        let name = host.key().to_string();
        let transport_error = |source: TransportError| TopologyError::Transport {
            host: name.clone(),
            source,
        };

        let mut request = Request::get(self.endpoint.uri(host, ENDPOINT_PATH))
            .body(Bytes::new())
            .map_err(|e| transport_error(e.into()))?;
        if let Some(signer) = &self.signer {
            signer.sign(&mut request).map_err(transport_error)?;
        }

        let response = match time::timeout(self.timeout, self.transport.issue(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => return Err(transport_error(source)),
            Err(_) => {
                return Err(TopologyError::Timeout {
                    host: name,
                    timeout: self.timeout,
                })
            }
        };

        if !response.status().is_success() {
            return Err(TopologyError::Status {
                host: name,
                status: response.status().as_u16(),
            });
        }

        let body = std::str::from_utf8(response.body()).map_err(|e| TopologyError::Parse {
            host: name.clone(),
            reason: e.to_string(),
        })?;
        ListDataNode::from_xml(body).map_err(|e| TopologyError::Parse {
            host: name.clone(),
            reason: e.to_string(),
        })
    }
}

fn parse_host(host: &str) -> HostKey {
    host.parse().unwrap_or_else(|_| HostKey::new(host.trim(), None))
}
