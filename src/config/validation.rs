//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (durations > 0, threshold > 0)
//! - Check URLs and bind addresses parse
//! - Detect duplicate endpoints
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MonitorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::MonitorConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("monitor.{0} must be greater than zero")]
    ZeroValue(&'static str),
    #[error("endpoint '{url}' is not a valid URL: {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error("endpoint '{0}' is listed more than once")]
    DuplicateEndpoint(String),
    #[error("{field} '{value}' is not a valid URL")]
    InvalidUrl { field: &'static str, value: String },
    #[error("{field} '{value}' is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },
    #[error("admin.api_key must be set when the admin API is enabled")]
    MissingApiKey,
}

pub fn validate_config(config: &MonitorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let monitor = &config.monitor;
    for (field, value) in [
        ("probe_interval_ms", monitor.probe_interval_ms),
        ("probe_timeout_ms", monitor.probe_timeout_ms),
        ("dns_wait_ms", monitor.dns_wait_ms),
        ("notify_window_ms", monitor.notify_window_ms),
        ("failure_threshold", u64::from(monitor.failure_threshold)),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroValue(field));
        }
    }

    let mut seen = HashSet::new();
    for endpoint in &config.endpoints {
        if let Err(e) = url::Url::parse(&endpoint.url) {
            errors.push(ValidationError::InvalidEndpoint {
                url: endpoint.url.clone(),
                reason: e.to_string(),
            });
        }
        if !seen.insert(endpoint.url.as_str()) {
            errors.push(ValidationError::DuplicateEndpoint(endpoint.url.clone()));
        }
    }

    check_url(&mut errors, "probe.proxy_url", config.probe.proxy_url.as_deref());
    check_url(&mut errors, "reporting.webhook_url", config.reporting.webhook_url.as_deref());

    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::MissingApiKey);
        }
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &'static str, value: Option<&str>) {
    if let Some(value) = value {
        if url::Url::parse(value).is_err() {
            errors.push(ValidationError::InvalidUrl {
                field,
                value: value.to_string(),
            });
        }
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
