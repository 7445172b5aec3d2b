//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the monitor from a validated configuration
//! - Register the configured endpoints
//! - Reconcile the endpoint list when the config file changes
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The config holds exactly one reference per listed endpoint; reloads add
//!   or release only that reference, so admin-added references survive

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EndpointConfig, MonitorConfig};
use crate::health::{EndpointMonitor, HttpProbe, MonitorError, Subscription, WebhookReporter};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

/// Build the monitor with the HTTP probe and, when configured, the webhook
/// reporter. Must run inside the Tokio runtime.
pub fn build_monitor(config: &MonitorConfig) -> Result<EndpointMonitor, StartupError> {
    let transport = HttpProbe::from_config(&config.probe)?;
    tracing::info!(target_kind = ?transport.target(), "Probe transport ready");

    let mut builder =
        EndpointMonitor::builder(Arc::new(transport)).settings(config.monitor.settings());

    if let Some(url) = &config.reporting.webhook_url {
        let reporter =
            WebhookReporter::new(url.clone(), Duration::from_millis(config.reporting.timeout_ms))?;
        builder = builder.reporter(Arc::new(reporter));
        tracing::info!(webhook = %url, "Trip reporting enabled");
    }

    Ok(builder.build()?)
}

pub fn register_endpoints(monitor: &EndpointMonitor, endpoints: &[EndpointConfig]) {
    for endpoint in endpoints {
        monitor.start_monitoring(&endpoint.url, endpoint.start_options());
    }
    tracing::info!(count = endpoints.len(), "Configured endpoints registered");
}

/// Endpoints touched by a reload.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReloadSummary {
    pub started: Vec<String>,
    pub stopped: Vec<String>,
}

/// Apply the endpoint list of `new` on top of `old`.
pub fn reconcile_endpoints(
    monitor: &EndpointMonitor,
    old: &MonitorConfig,
    new: &MonitorConfig,
) -> ReloadSummary {
    let previous: HashMap<&str, &EndpointConfig> =
        old.endpoints.iter().map(|e| (e.url.as_str(), e)).collect();
    let next: HashMap<&str, &EndpointConfig> =
        new.endpoints.iter().map(|e| (e.url.as_str(), e)).collect();

    let mut summary = ReloadSummary::default();

    for endpoint in &old.endpoints {
        if !next.contains_key(endpoint.url.as_str()) {
            monitor.stop_monitoring(&endpoint.url);
            summary.stopped.push(endpoint.url.clone());
        }
    }

    for endpoint in &new.endpoints {
        if !previous.contains_key(endpoint.url.as_str()) {
            monitor.start_monitoring(&endpoint.url, endpoint.start_options());
            summary.started.push(endpoint.url.clone());
        }
    }

    if old.monitor != new.monitor {
        tracing::warn!("Changed [monitor] settings take effect after a restart");
    }

    tracing::info!(
        started = summary.started.len(),
        stopped = summary.stopped.len(),
        "Configuration reloaded"
    );
    summary
}

/// Subscribe a listener that logs each settled batch of health changes.
pub fn attach_change_logger(monitor: &EndpointMonitor) -> Subscription {
    let weak = monitor.downgrade();
    monitor.subscribe(move || {
        let Some(monitor) = weak.upgrade() else {
            return;
        };
        let endpoints = monitor.endpoints();
        let connected = endpoints
            .iter()
            .filter(|status| status.health.as_ref().is_some_and(|h| h.connected))
            .count();
        tracing::debug!(
            monitored = endpoints.len(),
            connected,
            paused = monitor.is_paused(),
            "Endpoint health changed"
        );
    })
}
