//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build monitor → Register endpoints
//!     → Start admin API and config watcher
//!
//! Reload (startup.rs):
//!     Validated config from watcher → reconcile endpoint list
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → broadcast shutdown → stop admin API → cleanup()
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then monitor, then outer surfaces
//! - Ordered shutdown: outer surfaces first, monitor last

pub mod shutdown;
pub mod signals;
pub mod startup;
