//! Endpoint monitor coordinator.
//!
//! # Data Flow
//! ```text
//! scheduler tick / check_now
//!     → executor (one in-flight probe per endpoint)
//!     → apply_result: classifier + metrics + snapshot, under the entry lock
//!     → trip? → pause everything, queue status report
//!     → notifier (coalesced)
//!     → subscribers re-read get_health
//! ```
//!
//! # Design Decisions
//! - One registry keyed by the exact endpoint string; each entry holds the
//!   reference count, scheduler phase, failure tracker, metrics and snapshot,
//!   so every update to an endpoint is serialized by its entry lock
//! - Registrations carry a generation; results from a torn-down registration
//!   are discarded instead of resurrecting state
//! - A `check_now` issued before registration is joined by the first tick,
//!   and its result lands in the new registration
//! - Timer tasks hold a weak handle and stop once the monitor is gone
//! - No operation surfaces an error; failures show up in snapshots and logs

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::runtime::{Handle, TryCurrentError};
use tokio::time::Instant;

use crate::health::classifier::{FailureTracker, Verdict};
use crate::health::executor::{ProbeExecutor, SharedProbe};
use crate::health::notifier::{Notifier, Subscription};
use crate::health::probe::{ProbeResult, ProbeTransport};
use crate::health::reporter::{ReportQueue, StatusReporter, TripNotice};
use crate::health::scheduler::{self, Phase, PhaseKind};
use crate::health::state::{self, GraceWindow, HealthSnapshot, RequestMetrics};
use crate::observability::metrics;

/// Timing and threshold policy of the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
    pub failure_threshold: u32,
    pub grace_period: Duration,
    pub dns_wait: Duration,
    pub notify_window: Duration,
    pub inactivity_threshold: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_millis(3000),
            probe_timeout: Duration::from_millis(1000),
            failure_threshold: 5,
            grace_period: Duration::from_secs(2 * 60),
            dns_wait: Duration::from_millis(5000),
            notify_window: Duration::from_millis(100),
            inactivity_threshold: Duration::from_secs(5 * 60),
        }
    }
}

/// How a registration should begin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartOptions {
    /// Freshly provisioned endpoint: opens the grace window.
    #[serde(rename = "new")]
    pub is_new: bool,
    /// Wait out the DNS delay before the first probe.
    pub deferred: bool,
}

impl StartOptions {
    pub fn new_endpoint() -> Self {
        Self {
            is_new: true,
            deferred: false,
        }
    }

    pub fn with_deferred_start(mut self) -> Self {
        self.deferred = true;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("endpoint monitor must be built inside a Tokio runtime: {0}")]
    NoRuntime(#[from] TryCurrentError),
}

/// One registered endpoint, as listed by [`EndpointMonitor::endpoints`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStatus {
    pub endpoint: String,
    pub references: usize,
    pub phase: PhaseKind,
    pub health: Option<HealthSnapshot>,
}

struct Registration {
    references: usize,
    generation: u64,
    phase: Phase,
    failures: FailureTracker,
    metrics: Option<RequestMetrics>,
    snapshot: Option<HealthSnapshot>,
    grace: Option<GraceWindow>,
}

struct Inner {
    settings: MonitorSettings,
    executor: ProbeExecutor,
    notifier: Notifier,
    registry: DashMap<String, Registration>,
    paused: AtomicBool,
    next_generation: AtomicU64,
    reports: Option<ReportQueue>,
    handle: Handle,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for registration in self.registry.iter() {
            registration.phase.cancel();
        }
    }
}

pub struct MonitorBuilder {
    transport: Arc<dyn ProbeTransport>,
    settings: MonitorSettings,
    reporter: Option<Arc<dyn StatusReporter>>,
}

impl MonitorBuilder {
    pub fn settings(mut self, settings: MonitorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Bind the monitor to the current Tokio runtime.
    pub fn build(self) -> Result<EndpointMonitor, MonitorError> {
        let handle = Handle::try_current()?;
        let settings = self.settings;

        let inner = Inner {
            executor: ProbeExecutor::new(self.transport, settings.probe_timeout, handle.clone()),
            notifier: Notifier::new(settings.notify_window, handle.clone()),
            registry: DashMap::new(),
            paused: AtomicBool::new(false),
            next_generation: AtomicU64::new(1),
            reports: self.reporter.map(|reporter| ReportQueue::spawn(reporter, &handle)),
            settings,
            handle,
        };

        Ok(EndpointMonitor {
            inner: Arc::new(inner),
        })
    }
}

/// Process-wide health coordinator for externally supplied endpoints.
///
/// Cheap to clone; all clones share one registry. Operations may be called
/// from any thread, while timers and probes run on the runtime the monitor
/// was built in.
#[derive(Clone)]
pub struct EndpointMonitor {
    inner: Arc<Inner>,
}

/// Non-owning handle, for callbacks stored inside the monitor itself.
#[derive(Clone)]
pub struct WeakEndpointMonitor {
    inner: Weak<Inner>,
}

impl WeakEndpointMonitor {
    pub fn upgrade(&self) -> Option<EndpointMonitor> {
        self.inner.upgrade().map(|inner| EndpointMonitor { inner })
    }
}

impl EndpointMonitor {
    pub fn builder(transport: Arc<dyn ProbeTransport>) -> MonitorBuilder {
        MonitorBuilder {
            transport,
            settings: MonitorSettings::default(),
            reporter: None,
        }
    }

    pub fn downgrade(&self) -> WeakEndpointMonitor {
        WeakEndpointMonitor {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.inner.settings
    }

    /// Add a reference to `endpoint`, starting monitoring on the first one.
    ///
    /// Later references are no-ops, except that a tripped endpoint is
    /// re-armed. While paused, timers are left for `resume()` to start.
    pub fn start_monitoring(&self, endpoint: &str, options: StartOptions) {
        if endpoint.is_empty() {
            tracing::warn!("Ignoring request to monitor an empty endpoint");
            return;
        }

        let paused = self.is_paused();
        let mut recorded = false;

        match self.inner.registry.entry(endpoint.to_string()) {
            Entry::Occupied(mut occupied) => {
                let registration = occupied.get_mut();
                registration.references += 1;
                tracing::debug!(
                    endpoint = %endpoint,
                    references = registration.references,
                    "Endpoint already monitored"
                );

                if registration.failures.is_tripped() {
                    registration.failures.reset();
                    let next = if paused {
                        Phase::Idle
                    } else {
                        self.spawn_active(endpoint, registration.generation)
                    };
                    registration.phase.replace(next);
                    tracing::info!(endpoint = %endpoint, "Re-armed tripped endpoint");
                }
            }
            Entry::Vacant(vacant) => {
                let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                let grace = options
                    .is_new
                    .then(|| GraceWindow::starting_now(self.inner.settings.grace_period));
                let snapshot = (options.is_new || options.deferred)
                    .then(|| HealthSnapshot::pending(grace.as_ref()));
                recorded = snapshot.is_some();

                let phase = if options.deferred {
                    Phase::Deferred(self.spawn_deferred(endpoint, generation))
                } else if paused {
                    Phase::Idle
                } else {
                    self.spawn_active(endpoint, generation)
                };

                tracing::info!(
                    endpoint = %endpoint,
                    is_new = options.is_new,
                    deferred = options.deferred,
                    phase = ?phase.kind(),
                    "Monitoring started"
                );

                vacant.insert(Registration {
                    references: 1,
                    generation,
                    phase,
                    failures: FailureTracker::new(),
                    metrics: None,
                    snapshot,
                    grace,
                });
            }
        }

        metrics::set_monitored_endpoints(self.inner.registry.len());
        if recorded {
            self.inner.notifier.notify();
        }
    }

    /// Drop a reference to `endpoint`; the last one tears everything down.
    pub fn stop_monitoring(&self, endpoint: &str) {
        match self.inner.registry.entry(endpoint.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().references > 1 {
                    let registration = occupied.get_mut();
                    registration.references -= 1;
                    tracing::debug!(
                        endpoint = %endpoint,
                        references = registration.references,
                        "Endpoint reference released"
                    );
                    return;
                }

                let (_, registration) = occupied.remove_entry();
                registration.phase.cancel();
            }
            Entry::Vacant(_) => {
                tracing::debug!(endpoint = %endpoint, "Stop requested for unmonitored endpoint");
                return;
            }
        }

        self.inner.executor.forget(endpoint);
        metrics::clear_endpoint(endpoint);
        metrics::set_monitored_endpoints(self.inner.registry.len());
        tracing::info!(endpoint = %endpoint, "Monitoring stopped");
        self.inner.notifier.notify();
    }

    pub fn get_health(&self, endpoint: &str) -> Option<HealthSnapshot> {
        let registration = self.inner.registry.get(endpoint)?;
        let snapshot = registration.snapshot.clone()?;
        Some(snapshot.with_grace(registration.grace.as_ref(), Instant::now()))
    }

    /// Stop every recurring timer until `resume()`.
    ///
    /// Deferred starts keep counting down but will not activate. Snapshots,
    /// counters and in-flight probes are untouched.
    pub fn pause(&self) {
        let was_paused = self.inner.paused.swap(true, Ordering::SeqCst);

        for mut registration in self.inner.registry.iter_mut() {
            if registration.phase.kind() == PhaseKind::Active {
                registration.phase.replace(Phase::Idle);
            }
        }

        metrics::set_paused(true);
        if !was_paused {
            tracing::info!("Endpoint monitoring paused");
        }
        self.inner.notifier.notify();
    }

    /// Restart timers for every idle registration.
    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);

        let mut resumed = 0usize;
        for mut entry in self.inner.registry.iter_mut() {
            if entry.phase.kind() != PhaseKind::Idle {
                continue;
            }
            let endpoint = entry.key().clone();
            let registration = entry.value_mut();
            registration.phase = self.spawn_active(&endpoint, registration.generation);
            resumed += 1;
        }

        metrics::set_paused(false);
        tracing::info!(resumed, "Endpoint monitoring resumed");
        self.inner.notifier.notify();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Register a change callback. Callbacks take no arguments; read the
    /// current state with `get_health`.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.notifier.subscribe(listener)
    }

    /// Probe `endpoint` now, or join the probe already in flight.
    ///
    /// Results for endpoints without a registration are returned, not stored.
    pub async fn check_now(&self, endpoint: &str) -> Arc<ProbeResult> {
        let generation = self
            .inner
            .registry
            .get(endpoint)
            .map(|registration| registration.generation);
        self.launch_probe(endpoint, generation).await
    }

    /// Every registered endpoint, sorted by endpoint string.
    pub fn endpoints(&self) -> Vec<EndpointStatus> {
        let now = Instant::now();
        let mut statuses: Vec<_> = self
            .inner
            .registry
            .iter()
            .map(|entry| EndpointStatus {
                endpoint: entry.key().clone(),
                references: entry.references,
                phase: entry.phase.kind(),
                health: entry
                    .snapshot
                    .clone()
                    .map(|snapshot| snapshot.with_grace(entry.grace.as_ref(), now)),
            })
            .collect();
        statuses.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        statuses
    }

    pub fn is_retired(&self, last_active: SystemTime) -> bool {
        state::is_retired(last_active, SystemTime::now(), self.inner.settings.inactivity_threshold)
    }

    /// Reset all state: timers, registrations, in-flight bookkeeping,
    /// subscribers and the pause flag.
    pub fn cleanup(&self) {
        for registration in self.inner.registry.iter() {
            registration.phase.cancel();
        }
        self.inner.registry.clear();
        self.inner.executor.clear();
        self.inner.notifier.clear();
        self.inner.paused.store(false, Ordering::SeqCst);

        metrics::set_monitored_endpoints(0);
        metrics::set_paused(false);
        tracing::info!("Endpoint monitor reset");
    }

    fn launch_probe(&self, endpoint: &str, generation: Option<u64>) -> SharedProbe {
        let monitor = self.downgrade();
        let owned = endpoint.to_string();

        self.inner.executor.probe(endpoint, move |result, current| {
            let Some(monitor) = monitor.upgrade() else {
                return;
            };
            // A check issued before registration is adopted unless it was
            // forgotten: the new registration's first tick joined it.
            if generation.is_some() || current {
                monitor.apply_result(&owned, generation, result);
            }
        })
    }

    /// Store `result` against the registration of `endpoint`.
    ///
    /// `generation` is the registration the probe was issued for; `None`
    /// adopts the result into whichever registration exists now.
    fn apply_result(&self, endpoint: &str, generation: Option<u64>, result: &ProbeResult) {
        let now = Instant::now();
        let threshold = self.inner.settings.failure_threshold;

        let verdict = {
            let Some(mut guard) = self.inner.registry.get_mut(endpoint) else {
                tracing::debug!(endpoint = %endpoint, "Discarding probe result for unmonitored endpoint");
                return;
            };
            let registration = &mut *guard;
            if generation.is_some_and(|generation| generation != registration.generation) {
                tracing::debug!(endpoint = %endpoint, "Discarding probe result from an earlier registration");
                return;
            }

            let in_grace = registration.grace.is_some_and(|grace| grace.is_active(now));
            let verdict = registration.failures.record(result.success, threshold, in_grace);

            let summary = {
                let counters = registration.metrics.get_or_insert_with(RequestMetrics::default);
                counters.record(result.success, result.elapsed_ms);
                counters.summary()
            };

            registration.snapshot = Some(HealthSnapshot::from_probe(
                result.success,
                Some(result.elapsed_ms),
                registration.failures.consecutive_failures(),
                Some(summary),
                registration.grace.as_ref(),
            ));

            if matches!(verdict, Verdict::Tripped { .. }) {
                registration.phase.replace(Phase::Tripped);
            }
            verdict
        };

        metrics::record_probe(endpoint, result.success, result.elapsed_ms);

        match verdict {
            Verdict::Healthy => {}
            Verdict::Failing { consecutive } => {
                tracing::debug!(
                    endpoint = %endpoint,
                    consecutive_failures = consecutive,
                    timed_out = result.timed_out,
                    "Endpoint unhealthy"
                );
            }
            Verdict::Tripped { consecutive } => self.trip(endpoint, consecutive),
        }

        self.inner.notifier.notify();
    }

    fn trip(&self, endpoint: &str, consecutive: u32) {
        tracing::warn!(
            endpoint = %endpoint,
            consecutive_failures = consecutive,
            "Circuit tripped; pausing all endpoint monitoring"
        );
        metrics::record_circuit_trip(endpoint);

        self.pause();

        if let Some(reports) = &self.inner.reports {
            reports.submit(TripNotice {
                endpoint: endpoint.to_string(),
                message: format!(
                    "Endpoint unreachable after {} consecutive failed health checks",
                    consecutive
                ),
            });
        }
    }

    fn spawn_active(&self, endpoint: &str, generation: u64) -> Phase {
        let monitor = self.downgrade();
        let endpoint = endpoint.to_string();

        Phase::Active(scheduler::spawn_recurring(
            &self.inner.handle,
            self.inner.settings.probe_interval,
            move || {
                let Some(monitor) = monitor.upgrade() else {
                    return ControlFlow::Break(());
                };
                if !monitor.is_paused() && !monitor.inner.executor.is_in_flight(&endpoint) {
                    drop(monitor.launch_probe(&endpoint, Some(generation)));
                }
                ControlFlow::Continue(())
            },
        ))
    }

    fn spawn_deferred(&self, endpoint: &str, generation: u64) -> tokio::task::JoinHandle<()> {
        let monitor = self.downgrade();
        let endpoint = endpoint.to_string();

        scheduler::spawn_deferred(&self.inner.handle, self.inner.settings.dns_wait, move || {
            if let Some(monitor) = monitor.upgrade() {
                monitor.finish_deferred(&endpoint, generation);
            }
        })
    }

    fn finish_deferred(&self, endpoint: &str, generation: u64) {
        let paused = self.is_paused();
        let Some(mut registration) = self.inner.registry.get_mut(endpoint) else {
            return;
        };
        if registration.generation != generation || registration.phase.kind() != PhaseKind::Deferred {
            return;
        }

        // Plain assignment: this runs on the deferred timer's own task.
        registration.phase = if paused {
            Phase::Idle
        } else {
            self.spawn_active(endpoint, generation)
        };

        tracing::info!(
            endpoint = %endpoint,
            paused,
            "DNS wait elapsed"
        );
    }
}
