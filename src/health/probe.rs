//! Probe transport.
//!
//! # Responsibilities
//! - Define the black-box probe contract the monitor depends on
//! - Provide the HTTP implementation (models listing, optionally via proxy)
//!
//! # Design Decisions
//! - Failure causes are not distinguished: network error, timeout,
//!   non-success status and malformed payload are all `ok = false`
//! - The transport measures elapsed time itself; the monitor only reads it

use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tokio::time::Instant;

use crate::config::ProbeConfig;

/// Raw outcome reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeOutcome {
    pub ok: bool,
    pub elapsed: Duration,
}

impl ProbeOutcome {
    pub fn success(elapsed: Duration) -> Self {
        Self { ok: true, elapsed }
    }

    pub fn failure(elapsed: Duration) -> Self {
        Self { ok: false, elapsed }
    }
}

/// Completed probe as handed to every caller that waited on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub endpoint: String,
    pub success: bool,
    pub elapsed_ms: u64,
    /// Set when the executor aborted the probe at its deadline.
    pub timed_out: bool,
}

/// A single liveness check against an endpoint.
///
/// Implementations must be cheap to call concurrently; the executor guarantees
/// at most one outstanding call per endpoint string.
pub trait ProbeTransport: Send + Sync + 'static {
    fn probe(&self, endpoint: &str, timeout: Duration) -> BoxFuture<'static, ProbeOutcome>;
}

/// Where HTTP probes are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeTarget {
    /// `GET {endpoint}{models_path}`.
    Direct { models_path: String },
    /// `GET {proxy_url}{models_path}` with the endpoint in `header`.
    Proxy {
        proxy_url: String,
        models_path: String,
        header: String,
    },
}

/// HTTP probe against a models listing route.
pub struct HttpProbe {
    client: reqwest::Client,
    target: ProbeTarget,
}

impl HttpProbe {
    pub fn new(client: reqwest::Client, target: ProbeTarget) -> Self {
        Self { client, target }
    }

    /// Build from the `[probe]` config section.
    pub fn from_config(config: &ProbeConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;

        let target = match &config.proxy_url {
            Some(proxy_url) => ProbeTarget::Proxy {
                proxy_url: proxy_url.trim_end_matches('/').to_string(),
                models_path: config.proxy_models_path.clone(),
                header: config.endpoint_header.clone(),
            },
            None => ProbeTarget::Direct {
                models_path: config.direct_models_path.clone(),
            },
        };

        Ok(Self::new(client, target))
    }

    pub fn target(&self) -> &ProbeTarget {
        &self.target
    }

    fn build_request(&self, endpoint: &str, timeout: Duration) -> reqwest::RequestBuilder {
        let request = match &self.target {
            ProbeTarget::Direct { models_path } => self
                .client
                .get(format!("{}{}", endpoint.trim_end_matches('/'), models_path)),
            ProbeTarget::Proxy {
                proxy_url,
                models_path,
                header,
            } => self
                .client
                .get(format!("{}{}", proxy_url, models_path))
                .header(header.as_str(), endpoint),
        };

        request
            .header("accept", "application/json")
            .timeout(timeout)
    }
}

impl ProbeTransport for HttpProbe {
    fn probe(&self, endpoint: &str, timeout: Duration) -> BoxFuture<'static, ProbeOutcome> {
        let request = self.build_request(endpoint, timeout);
        let endpoint = endpoint.to_string();

        async move {
            let start = Instant::now();

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint, error = %e, "Probe failed: request error");
                    return ProbeOutcome::failure(start.elapsed());
                }
            };

            let status = response.status();
            if !status.is_success() {
                tracing::debug!(endpoint = %endpoint, status = %status, "Probe failed: non-success status");
                return ProbeOutcome::failure(start.elapsed());
            }

            match response.json::<serde_json::Value>().await {
                Ok(body) if is_models_listing(&body) => ProbeOutcome::success(start.elapsed()),
                Ok(_) => {
                    tracing::debug!(endpoint = %endpoint, "Probe failed: payload is not a models listing");
                    ProbeOutcome::failure(start.elapsed())
                }
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint, error = %e, "Probe failed: malformed payload");
                    ProbeOutcome::failure(start.elapsed())
                }
            }
        }
        .boxed()
    }
}

/// A listing is an object whose `models` field, when present, is an array.
fn is_models_listing(body: &serde_json::Value) -> bool {
    match body.as_object() {
        Some(object) => object.get("models").map_or(true, |models| models.is_array()),
        None => false,
    }
}
