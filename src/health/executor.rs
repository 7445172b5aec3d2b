//! Probe executor.
//!
//! # Responsibilities
//! - Issue one probe per endpoint, bounded by the probe timeout
//! - Deduplicate concurrent probes for the same endpoint
//! - Run the completion hook exactly once per issued probe
//!
//! # Design Decisions
//! - Every probe runs as its own task, so dropping a waiting caller never
//!   cancels the network call or its bookkeeping
//! - Callers share one `Arc<ProbeResult>`; joiners get the identical object
//! - In-flight entries carry an id so a forgotten probe finishing late cannot
//!   remove the entry of a newer probe

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::health::probe::{ProbeResult, ProbeTransport};

/// Handle on a probe that may be awaited by any number of callers.
pub type SharedProbe = Shared<BoxFuture<'static, Arc<ProbeResult>>>;

struct InFlight {
    id: u64,
    future: SharedProbe,
}

/// Removes the in-flight entry when the probe task ends, even on panic.
struct InFlightGuard {
    in_flight: Arc<DashMap<String, InFlight>>,
    endpoint: String,
    id: u64,
}

impl InFlightGuard {
    /// Whether the entry still belongs to this call.
    fn is_current(&self) -> bool {
        self.in_flight
            .get(&self.endpoint)
            .is_some_and(|entry| entry.id == self.id)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove_if(&self.endpoint, |_, entry| entry.id == self.id);
    }
}

pub struct ProbeExecutor {
    transport: Arc<dyn ProbeTransport>,
    timeout: Duration,
    in_flight: Arc<DashMap<String, InFlight>>,
    next_id: AtomicU64,
    handle: Handle,
}

impl ProbeExecutor {
    pub fn new(transport: Arc<dyn ProbeTransport>, timeout: Duration, handle: Handle) -> Self {
        Self {
            transport,
            timeout,
            in_flight: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            handle,
        }
    }

    /// Probe `endpoint`, or join the probe already running for it.
    ///
    /// `on_complete` runs only when this call starts a new probe; a joining
    /// caller's hook is dropped unused. Its second argument is `false` when
    /// the entry was forgotten before the call finished.
    ///
    /// The map shard is held only to claim the entry. The transport is
    /// called and the task spawned after it is released.
    pub fn probe<F>(&self, endpoint: &str, on_complete: F) -> SharedProbe
    where
        F: FnOnce(&ProbeResult, bool) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel::<Arc<ProbeResult>>();

        let future = match self.in_flight.entry(endpoint.to_string()) {
            Entry::Occupied(occupied) => {
                tracing::trace!(endpoint = %endpoint, "Joining in-flight probe");
                return occupied.get().future.clone();
            }
            Entry::Vacant(vacant) => {
                let endpoint = endpoint.to_string();
                let future = async move {
                    match rx.await {
                        Ok(result) => result,
                        Err(_) => {
                            tracing::error!(endpoint = %endpoint, "Probe task did not complete");
                            Arc::new(ProbeResult {
                                endpoint,
                                success: false,
                                elapsed_ms: 0,
                                timed_out: false,
                            })
                        }
                    }
                }
                .boxed()
                .shared();
                vacant.insert(InFlight {
                    id,
                    future: future.clone(),
                });
                future
            }
        };

        let timeout = self.timeout;
        let guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
            endpoint: endpoint.to_string(),
            id,
        };
        let transport = self.transport.clone();

        self.handle.spawn(async move {
            let probe = transport.probe(&guard.endpoint, timeout);
            let result = match tokio::time::timeout(timeout, probe).await {
                Ok(outcome) => ProbeResult {
                    endpoint: guard.endpoint.clone(),
                    success: outcome.ok,
                    elapsed_ms: outcome.elapsed.as_millis() as u64,
                    timed_out: false,
                },
                Err(_) => {
                    tracing::debug!(
                        endpoint = %guard.endpoint,
                        timeout_ms = timeout.as_millis() as u64,
                        "Probe timed out"
                    );
                    ProbeResult {
                        endpoint: guard.endpoint.clone(),
                        success: false,
                        elapsed_ms: timeout.as_millis() as u64,
                        timed_out: true,
                    }
                }
            };

            let result = Arc::new(result);
            on_complete(&result, guard.is_current());
            drop(guard);
            // Every caller may have gone away.
            let _ = tx.send(result);
        });

        future
    }

    pub fn is_in_flight(&self, endpoint: &str) -> bool {
        self.in_flight.contains_key(endpoint)
    }

    /// Drop the bookkeeping for an endpoint's running probe.
    ///
    /// The network call is left to finish; its result is no longer joinable.
    pub fn forget(&self, endpoint: &str) {
        self.in_flight.remove(endpoint);
    }

    pub fn clear(&self) {
        self.in_flight.clear();
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::probe::ProbeOutcome;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::{Mutex, OnceLock, Weak};

    struct SlowProbe {
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ProbeTransport for SlowProbe {
        fn probe(&self, _endpoint: &str, _timeout: Duration) -> BoxFuture<'static, ProbeOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delay;
            async move {
                tokio::time::sleep(delay).await;
                ProbeOutcome::success(delay)
            }
            .boxed()
        }
    }

    fn executor(delay: Duration) -> (ProbeExecutor, Arc<SlowProbe>) {
        let transport = Arc::new(SlowProbe {
            delay,
            calls: AtomicUsize::new(0),
        });
        let executor = ProbeExecutor::new(
            transport.clone(),
            Duration::from_millis(1000),
            Handle::current(),
        );
        (executor, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_probes_share_result() {
        let (executor, transport) = executor(Duration::from_millis(200));
        let completions = Arc::new(AtomicUsize::new(0));

        let c1 = completions.clone();
        let first = executor.probe("http://a", move |_, _| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = completions.clone();
        let second = executor.probe("http://a", move |_, _| {
            c2.fetch_add(1, Ordering::SeqCst);
        });
        assert!(executor.is_in_flight("http://a"));

        let (a, b) = tokio::join!(first, second);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.success);
        assert_eq!(a.elapsed_ms, 200);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert!(!executor.is_in_flight("http://a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_endpoints_probe_independently() {
        let (executor, transport) = executor(Duration::from_millis(10));
        let a = executor.probe("http://a", |_, _| {});
        let b = executor.probe("http://a/", |_, _| {});
        let (a, b) = tokio::join!(a, b);
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let (executor, _transport) = executor(Duration::from_secs(5));
        let result = executor.probe("http://slow", |_, _| {}).await;
        assert!(!result.success);
        assert!(result.timed_out);
        assert_eq!(result.elapsed_ms, 1000);
        assert!(!executor.is_in_flight("http://slow"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forgotten_probe_does_not_clear_newer_entry() {
        let (executor, transport) = executor(Duration::from_millis(300));
        let tracked = Arc::new(Mutex::new(Vec::new()));

        let t = tracked.clone();
        let old = executor.probe("http://a", move |_, current| t.lock().unwrap().push(current));
        executor.forget("http://a");
        assert!(!executor.is_in_flight("http://a"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        let t = tracked.clone();
        let newer = executor.probe("http://a", move |_, current| t.lock().unwrap().push(current));

        old.await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert!(executor.is_in_flight("http://a"));
        newer.await;
        assert!(!executor.is_in_flight("http://a"));
        assert_eq!(*tracked.lock().unwrap(), vec![false, true]);
    }

    /// Transport that looks back into the executor while starting a call.
    struct Reentrant {
        executor: OnceLock<Weak<ProbeExecutor>>,
        saw_in_flight: AtomicBool,
    }

    impl ProbeTransport for Reentrant {
        fn probe(&self, endpoint: &str, _timeout: Duration) -> BoxFuture<'static, ProbeOutcome> {
            if let Some(executor) = self.executor.get().and_then(Weak::upgrade) {
                self.saw_in_flight
                    .store(executor.is_in_flight(endpoint), Ordering::SeqCst);
            }
            async { ProbeOutcome::success(Duration::ZERO) }.boxed()
        }
    }

    #[tokio::test]
    async fn test_transport_may_reenter_executor() {
        let transport = Arc::new(Reentrant {
            executor: OnceLock::new(),
            saw_in_flight: AtomicBool::new(false),
        });
        let executor = Arc::new(ProbeExecutor::new(
            transport.clone(),
            Duration::from_millis(1000),
            Handle::current(),
        ));
        let _ = transport.executor.set(Arc::downgrade(&executor));

        let result = executor.probe("http://a", |_, _| {}).await;
        assert!(result.success);
        assert!(transport.saw_in_flight.load(Ordering::SeqCst));
        assert!(!executor.is_in_flight("http://a"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_instant_completions_across_workers() {
        let (executor, transport) = executor(Duration::ZERO);
        let endpoints: Vec<String> = (0..64).map(|i| format!("http://10.0.0.{}", i % 8)).collect();

        let results = futures_util::future::join_all(
            endpoints.iter().map(|endpoint| executor.probe(endpoint, |_, _| {})),
        )
        .await;

        assert!(results.iter().all(|result| result.success));
        assert!(transport.calls.load(Ordering::SeqCst) >= 8);
        for endpoint in &endpoints {
            assert!(!executor.is_in_flight(endpoint));
        }
    }
}
