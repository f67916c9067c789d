//! Default transport on top of the `hyper-util` pooled client.

use std::error::Error as StdError;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::transport::{Transport, TransportFuture};

/// Plain-HTTP transport with a shared connection pool.
///
/// Clone is cheap; the pool is shared.
#[derive(Clone, Debug)]
pub struct HyperTransport {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HyperTransport {
    pub fn new(config: &TransportConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build(connector);

        if let Some(proxy) = &config.proxy_uri {
            tracing::warn!(proxy = %proxy, "Proxy settings are not applied by the built-in transport");
        }

        Self { client }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new(&TransportConfig::default())
    }
}

impl Transport for HyperTransport {
    fn issue(&self, request: Request<Bytes>) -> TransportFuture<'_> {
        Box::pin(async move {
            if let Some(scheme) = request.uri().scheme_str() {
                if !scheme.eq_ignore_ascii_case("http") {
                    return Err(TransportError::UnsupportedScheme(scheme.to_string()));
                }
            }

            let (parts, body) = request.into_parts();
            let response = self
                .client
                .request(Request::from_parts(parts, Full::new(body)))
                .await
                .map_err(|e| TransportError::Client(error_chain(&e)))?;

            let (parts, body) = response.into_parts();
            let bytes = body
                .collect()
                .await
                .map_err(|e| TransportError::Body(error_chain(&e)))?
                .to_bytes();
            Ok(Response::from_parts(parts, bytes))
        })
    }
}

/// Render an error with its source chain ("client error (Connect): tcp connect error: ...").
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
