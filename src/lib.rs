//! Endpoint health monitor.
//!
//! Tracks the reachability of a dynamic set of inference endpoints, trips a
//! circuit after repeated failures, and publishes coalesced health snapshots.
//!
//! # Architecture Overview
//!
//! ```text
//!   config ──▶ lifecycle::startup ──▶ health::EndpointMonitor ◀── admin API
//!                                          │
//!                  ┌───────────────────────┼───────────────────────┐
//!                  ▼                       ▼                       ▼
//!             scheduler              executor + probe         notifier
//!          (timers, phases)      (deduplicated, bounded)   (coalesced fan-out)
//!                                          │
//!                                          ▼
//!                                classifier ──▶ reporter
//!                              (threshold, trip)   (webhook)
//! ```

pub mod admin;
pub mod config;
pub mod health;
pub mod lifecycle;
pub mod observability;

pub use config::schema::MonitorConfig;
pub use health::EndpointMonitor;
pub use lifecycle::shutdown::Shutdown;
