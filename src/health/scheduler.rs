//! Probe scheduling.
//!
//! # Responsibilities
//! - Own the recurring probe timer of every active endpoint
//! - Own the single-shot deferred-start timer of new endpoints
//!
//! # Per-endpoint Phases
//! ```text
//! unmonitored → Deferred ──(dns wait elapsed)──→ Active
//!      │            └──(elapsed while paused)──→ Idle ──(resume)──→ Active
//!      └──────────────────────────────────────→ Active ──(pause)──→ Idle
//! Active ──(circuit trips)──→ Tripped
//! any ──(last reference stops)──→ unmonitored
//! ```
//!
//! # Design Decisions
//! - The first tick of a recurring timer fires immediately
//! - Missed ticks are delayed, not bunched
//! - A panicking tick is logged and the timer keeps running
//! - Deferred timers are single-shot and never re-armed

use std::ops::ControlFlow;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Scheduler state of one registered endpoint.
#[derive(Debug)]
pub enum Phase {
    /// Waiting out the DNS delay before the first probe.
    Deferred(JoinHandle<()>),
    /// Recurring probe timer running.
    Active(JoinHandle<()>),
    /// Registered, no timer; `resume()` activates it.
    Idle,
    /// Circuit tripped; stays put until explicitly restarted.
    Tripped,
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::Deferred(_) => PhaseKind::Deferred,
            Phase::Active(_) => PhaseKind::Active,
            Phase::Idle => PhaseKind::Idle,
            Phase::Tripped => PhaseKind::Tripped,
        }
    }

    /// Abort whatever timer this phase owns.
    pub fn cancel(&self) {
        match self {
            Phase::Deferred(timer) | Phase::Active(timer) => timer.abort(),
            Phase::Idle | Phase::Tripped => {}
        }
    }

    /// Cancel the timer and move to `next`.
    pub fn replace(&mut self, next: Phase) {
        self.cancel();
        *self = next;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Deferred,
    Active,
    Idle,
    Tripped,
}

/// Run `on_tick` now and then every `period` until it breaks or is aborted.
pub fn spawn_recurring<F>(handle: &Handle, period: Duration, mut on_tick: F) -> JoinHandle<()>
where
    F: FnMut() -> ControlFlow<()> + Send + 'static,
{
    handle.spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match catch_unwind(AssertUnwindSafe(&mut on_tick)) {
                Ok(ControlFlow::Continue(())) => {}
                Ok(ControlFlow::Break(())) => break,
                Err(_) => tracing::error!("Scheduled probe tick panicked; timer kept running"),
            }
        }
    })
}

/// Run `on_elapsed` once after `delay` unless aborted first.
pub fn spawn_deferred<F>(handle: &Handle, delay: Duration, on_elapsed: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    handle.spawn(async move {
        time::sleep(delay).await;
        if catch_unwind(AssertUnwindSafe(on_elapsed)).is_err() {
            tracing::error!("Deferred start callback panicked");
        }
    })
}
