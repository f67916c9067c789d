//! Caller-facing client.
//!
//! # Data Flow
//! ```text
//! SmartConfig
//!     → validate, seed LoadBalancer through HostListProvider::from_config
//!     → PollingDaemon spawned (unless polling is fully disabled)
//!
//! execute(request)
//!     → LoadBalancer::begin_request picks and claims a host
//!     → request URI rewritten to that host (protocol/port from config)
//!     → Transport::issue
//!     → guard completed: 5xx and transport errors count as failures
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use hyper::header::HOST;
use hyper::{Method, Request, Response, Uri};
use tokio::task::JoinHandle;

use crate::config::loader::ConfigError;
use crate::config::schema::SmartConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::discovery::{HostListProvider, PollingDaemon};
use crate::error::{Result, SmartClientError};
use crate::lifecycle::StopSignal;
use crate::load_balancer::{HostStats, LoadBalancer};
use crate::transport::{Endpoint, HyperTransport, Transport};

/// Build a client over the built-in HTTP transport.
///
/// The built-in transport speaks plain HTTP only; `https` configs are
/// rejected here and need [`SmartClient::new`] with a TLS-capable
/// transport.
pub fn create_client(config: SmartConfig) -> Result<SmartClient> {
    if !config.protocol.eq_ignore_ascii_case("http") {
        return Err(ConfigError::Validation(vec![ValidationError::new(
            "protocol",
            format!(
                "{:?} is not supported by the built-in transport; supply a transport to SmartClient::new",
                config.protocol
            ),
        )])
        .into());
    }
    let transport = Arc::new(HyperTransport::new(&config.transport));
    SmartClient::new(config, transport)
}

/// Load-balancing client over a cluster of nodes.
///
/// Dropping the client stops the background cycle; [`shutdown`](Self::shutdown)
/// additionally waits for it to exit.
pub struct SmartClient {
    config: SmartConfig,
    transport: Arc<dyn Transport>,
    endpoint: Endpoint,
    load_balancer: Arc<LoadBalancer>,
    provider: Arc<HostListProvider>,
    stop: StopSignal,
    daemon: Mutex<Option<JoinHandle<()>>>,
}

impl SmartClient {
    /// Fails with [`SmartClientError::NoRuntime`] if polling is enabled and
    /// no Tokio runtime is running.
    pub fn new(config: SmartConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let polling = &config.polling;
        let poll = polling.host_update_enabled || polling.health_check_enabled;
        if poll && tokio::runtime::Handle::try_current().is_err() {
            return Err(SmartClientError::NoRuntime);
        }

        let load_balancer = Arc::new(LoadBalancer::new());
        let provider = Arc::new(HostListProvider::from_config(
            &config,
            transport.clone(),
            load_balancer.clone(),
        ));
        let endpoint = provider.endpoint().clone();

        let stop = StopSignal::new();
        let daemon = if poll {
            let daemon = PollingDaemon::new(provider.clone(), config.polling.clone());
            Some(daemon.spawn(stop.listener()))
        } else {
            None
        };

        tracing::info!(
            hosts = load_balancer.len(),
            vdcs = provider.vdcs().len(),
            protocol = %endpoint.protocol,
            port = endpoint.port,
            "Smart client created"
        );

        Ok(Self {
            config,
            transport,
            endpoint,
            load_balancer,
            provider,
            stop,
            daemon: Mutex::new(daemon),
        })
    }

    /// Route `request` to the least-loaded healthy host.
    ///
    /// Only the path and query of the request URI are used; scheme and
    /// authority come from the selected host. Responses with any status are
    /// returned as-is; a 5xx still counts against the host's statistics.
    pub async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let (mut parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        if !path_and_query.starts_with('/') {
            return Err(SmartClientError::InvalidRequest(format!(
                "path must be absolute: {:?}",
                path_and_query
            )));
        }

        let guard = self.load_balancer.begin_request(&HashSet::new())?;
        let host = guard.host().clone();

        parts.uri = self
            .endpoint
            .uri(&host, &path_and_query)
            .parse::<Uri>()
            .map_err(|e| SmartClientError::InvalidRequest(e.to_string()))?;
        parts.headers.remove(HOST);

        tracing::trace!(host = %host, method = %parts.method, path = %path_and_query, "Dispatching request");
        match self.transport.issue(Request::from_parts(parts, body)).await {
            Ok(response) => {
                guard.complete(!response.status().is_server_error());
                Ok(response)
            }
            Err(e) => {
                tracing::debug!(host = %host, error = %e, "Request failed");
                guard.complete(false);
                Err(e.into())
            }
        }
    }

    /// `GET path_and_query` against the cluster.
    pub async fn get(&self, path_and_query: &str) -> Result<Response<Bytes>> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path_and_query)
            .body(Bytes::new())
            .map_err(|e| SmartClientError::InvalidRequest(e.to_string()))?;
        self.execute(request).await
    }

    pub fn config(&self) -> &SmartConfig {
        &self.config
    }

    pub fn load_balancer(&self) -> &Arc<LoadBalancer> {
        &self.load_balancer
    }

    pub fn host_list_provider(&self) -> &Arc<HostListProvider> {
        &self.provider
    }

    pub fn host_stats(&self) -> Vec<HostStats> {
        self.load_balancer.get_host_stats()
    }

    /// Stop the background cycle and wait for it to exit.
    pub async fn shutdown(&self) {
        self.stop.trigger();
        let handle = self
            .daemon
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Polling daemon exited abnormally");
            }
        }
        tracing::info!("Smart client shut down");
    }
}

impl Drop for SmartClient {
    fn drop(&mut self) {
        self.stop.trigger();
    }
}
