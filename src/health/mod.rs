//! Endpoint health monitoring subsystem.
//!
//! # Data Flow
//! ```text
//! Scheduling (scheduler.rs):
//!     start_monitoring → deferred DNS wait (optional)
//!     → recurring timer, first tick immediate
//!
//! Probing (executor.rs, probe.rs):
//!     tick or check_now
//!     → at most one probe in flight per endpoint
//!     → ProbeTransport (HTTP model listing) under a hard timeout
//!
//! Classification (classifier.rs):
//!     probe result → consecutive failure count
//!     → threshold reached outside grace → circuit trips
//!     → all monitoring paused, trip reported (reporter.rs)
//!
//! State (state.rs, notifier.rs):
//!     snapshot + cumulative metrics written per endpoint
//!     → coalesced change notification to subscribers
//! ```
//!
//! # Design Decisions
//! - `monitor.rs` owns all per-endpoint state in one registry
//! - The transport and the status reporter are traits so tests script them
//! - Nothing here returns errors to callers; failures are health data

pub mod classifier;
pub mod executor;
pub mod monitor;
pub mod notifier;
pub mod probe;
pub mod reporter;
pub mod scheduler;
pub mod state;

pub use monitor::{EndpointMonitor, EndpointStatus, MonitorError, MonitorSettings, StartOptions};
pub use notifier::Subscription;
pub use probe::{HttpProbe, ProbeOutcome, ProbeResult, ProbeTransport};
pub use reporter::{StatusReporter, WebhookReporter};
pub use state::{HealthSnapshot, MetricsSummary};
