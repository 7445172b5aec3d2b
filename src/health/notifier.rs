//! Coalesced change notification.
//!
//! # Responsibilities
//! - Hold subscriber callbacks
//! - Turn bursts of state writes into a single notification
//!
//! # Design Decisions
//! - Notifications carry no payload; subscribers re-query the monitor
//! - Each write pushes the flush deadline to `now + window`; one flush task
//!   per burst sleeps until the deadline stops moving
//! - Only the flush that takes the deadline delivers, so a task left over
//!   from before `clear` cannot repeat a delivery
//! - A panicking subscriber is logged and skipped; the others still run

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::Instant;

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct NotifierState {
    listeners: Vec<(u64, Listener)>,
    next_id: u64,
    /// Pending flush time; `Some` while a flush task is scheduled.
    deadline: Option<Instant>,
}

fn lock(state: &Mutex<NotifierState>) -> MutexGuard<'_, NotifierState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Notifier {
    state: Arc<Mutex<NotifierState>>,
    window: Duration,
    handle: Handle,
}

impl Notifier {
    pub fn new(window: Duration, handle: Handle) -> Self {
        Self {
            state: Arc::new(Mutex::new(NotifierState::default())),
            window,
            handle,
        }
    }

    /// Register a callback. It stays registered until the returned
    /// `Subscription` is dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.push((id, Arc::new(listener)));

        Subscription {
            state: Arc::downgrade(&self.state),
            id,
        }
    }

    /// Record a state change; subscribers hear about it once the burst settles.
    pub fn notify(&self) {
        let schedule = {
            let mut state = lock(&self.state);
            let idle = state.deadline.is_none();
            state.deadline = Some(Instant::now() + self.window);
            idle
        };

        if schedule {
            self.handle.spawn(flush(self.state.clone()));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).listeners.len()
    }

    /// Drop every subscriber and any pending flush.
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.listeners.clear();
        state.deadline = None;
    }
}

async fn flush(state: Arc<Mutex<NotifierState>>) {
    loop {
        let deadline = match lock(&state).deadline {
            Some(deadline) => deadline,
            None => return,
        };

        tokio::time::sleep_until(deadline).await;

        let due = {
            let mut guard = lock(&state);
            match guard.deadline {
                // Cleared, or another flush already delivered this burst.
                None => return,
                Some(deadline) if deadline > Instant::now() => None,
                Some(_) => {
                    guard.deadline = None;
                    Some(
                        guard
                            .listeners
                            .iter()
                            .map(|(_, listener)| listener.clone())
                            .collect::<Vec<_>>(),
                    )
                }
            }
        };

        if let Some(listeners) = due {
            deliver(&listeners);
            return;
        }
    }
}

fn deliver(listeners: &[Listener]) {
    for listener in listeners {
        if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
            tracing::error!("Health subscriber panicked during notification");
        }
    }
}

/// Keeps a subscriber registered; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    state: Weak<Mutex<NotifierState>>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            lock(&state).listeners.retain(|(id, _)| *id != self.id);
        }
    }
}
