//! Active health probe.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hyper::Request;
use tokio::time;

use crate::error::{ProbeError, TransportError};
use crate::health::ping::PingResponse;
use crate::load_balancer::host::Host;
use crate::observability::metrics;
use crate::transport::{Endpoint, Transport};

/// Diagnostic path answered by every data node.
pub const PING_PATH: &str = "/?ping";
/// Namespace header required by the ping endpoint (any value is accepted).
pub const NAMESPACE_HEADER: &str = "x-emc-namespace";

/// Probes hosts and updates their health flags.
#[derive(Clone)]
pub struct HealthChecker {
    transport: Arc<dyn Transport>,
    endpoint: Endpoint,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(transport: Arc<dyn Transport>, endpoint: Endpoint, timeout: Duration) -> Self {
        Self {
            transport,
            endpoint,
            timeout,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe `host` and update its flags.
    ///
    /// On success the host is marked healthy and, for VDC hosts, maintenance
    /// mode follows the `MAINTENANCE_MODE` item. On failure the host is
    /// marked unhealthy and the error is returned.
    pub async fn run_health_check(&self, host: &Host) -> Result<PingResponse, ProbeError> {
        let result = self.probe(host).await;
        apply_outcome(host, &result);
        match &result {
            Ok(response) => {
                tracing::debug!(host = %host, items = response.len(), "Health check passed");
            }
            Err(e) => {
                tracing::debug!(host = %host, error = %e, "Health check failed");
                metrics::record_probe_failure(&host.key().to_string());
            }
        }
        metrics::record_host_health(&host.key().to_string(), host.is_healthy());
        result
    }

    async fn probe(&self, host: &Host) -> Result<PingResponse, ProbeError> {
        let name = host.key().to_string();
        let request = Request::get(self.endpoint.uri(host, PING_PATH))
            .header(NAMESPACE_HEADER, "x")
            .header("user-agent", "ecs-smart-client-health-check")
            .body(Bytes::new())
            .map_err(|e| ProbeError::Transport {
                host: name.clone(),
                source: TransportError::from(e),
            })?;

        let response = match time::timeout(self.timeout, self.transport.issue(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => return Err(ProbeError::Transport { host: name, source }),
            Err(_) => {
                return Err(ProbeError::Timeout {
                    host: name,
                    timeout: self.timeout,
                })
            }
        };

        if !response.status().is_success() {
            return Err(ProbeError::Status {
                host: name,
                status: response.status().as_u16(),
            });
        }

        let body = std::str::from_utf8(response.body()).map_err(|e| ProbeError::Parse {
            host: name.clone(),
            reason: e.to_string(),
        })?;
        PingResponse::from_xml(body).map_err(|e| ProbeError::Parse {
            host: name,
            reason: e.to_string(),
        })
    }
}

/// Apply a probe outcome to `host`'s flags.
///
/// Also used to carry one probe's result over to other objects for the
/// same host key. Maintenance is ignored for standalone hosts.
pub(crate) fn apply_outcome(host: &Host, result: &Result<PingResponse, ProbeError>) {
    match result {
        Ok(response) => {
            host.set_healthy(true);
            host.set_maintenance_mode(response.maintenance_mode());
        }
        Err(_) => host.set_healthy(false),
    }
}
