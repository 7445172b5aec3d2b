//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the monitor.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::health::{MonitorSettings, StartOptions};

/// Root configuration for the endpoint monitor.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MonitorConfig {
    /// Timing and threshold policy.
    pub monitor: MonitorSection,

    /// How endpoints are probed.
    pub probe: ProbeConfig,

    /// Endpoints registered at startup.
    pub endpoints: Vec<EndpointConfig>,

    /// Where tripped endpoints are reported.
    pub reporting: ReportingConfig,

    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// `[monitor]` section, all durations in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorSection {
    /// Interval between recurring probes.
    pub probe_interval_ms: u64,

    /// A probe still running after this long counts as failed.
    pub probe_timeout_ms: u64,

    /// Consecutive failures that trip the circuit.
    pub failure_threshold: u32,

    /// Grace window opened for newly provisioned endpoints.
    pub grace_period_ms: u64,

    /// Delay before the first probe of a deferred start.
    pub dns_wait_ms: u64,

    /// Change notification coalescing window.
    pub notify_window_ms: u64,

    /// Idle time after which an endpoint counts as retired.
    pub inactivity_threshold_ms: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            probe_interval_ms: 3000,
            probe_timeout_ms: 1000,
            failure_threshold: 5,
            grace_period_ms: 120_000,
            dns_wait_ms: 5000,
            notify_window_ms: 100,
            inactivity_threshold_ms: 300_000,
        }
    }
}

impl MonitorSection {
    pub fn settings(&self) -> MonitorSettings {
        MonitorSettings {
            probe_interval: Duration::from_millis(self.probe_interval_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            failure_threshold: self.failure_threshold,
            grace_period: Duration::from_millis(self.grace_period_ms),
            dns_wait: Duration::from_millis(self.dns_wait_ms),
            notify_window: Duration::from_millis(self.notify_window_ms),
            inactivity_threshold: Duration::from_millis(self.inactivity_threshold_ms),
        }
    }
}

/// `[probe]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Probe through this proxy instead of contacting endpoints directly.
    pub proxy_url: Option<String>,

    /// Header carrying the endpoint when probing through the proxy.
    pub endpoint_header: String,

    /// Models route on the proxy.
    pub proxy_models_path: String,

    /// Models route on the endpoint itself.
    pub direct_models_path: String,

    pub user_agent: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            proxy_url: None,
            endpoint_header: "x-ollama-endpoint".to_string(),
            proxy_models_path: "/api/proxy/models".to_string(),
            direct_models_path: "/api/tags".to_string(),
            user_agent: "endpoint-monitor".to_string(),
        }
    }
}

/// One `[[endpoints]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// Endpoint identity; compared as an exact string.
    pub url: String,

    /// Freshly provisioned: opens the grace window.
    #[serde(default)]
    pub new: bool,

    /// Wait out the DNS delay before probing.
    #[serde(default)]
    pub deferred: bool,
}

impl EndpointConfig {
    pub fn start_options(&self) -> StartOptions {
        StartOptions {
            is_new: self.new,
            deferred: self.deferred,
        }
    }
}

/// `[reporting]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Webhook receiving trip reports; reporting is off when unset.
    pub webhook_url: Option<String>,

    pub timeout_ms: u64,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_ms: 5000,
        }
    }
}

/// `[admin]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// Bearer token required by every admin route.
    pub api_key: String,

    /// Bind address for the admin API.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// `[observability]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
