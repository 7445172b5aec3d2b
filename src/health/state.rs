//! Endpoint health state.
//!
//! # Contents
//! - `HealthSnapshot`: the latest view of one endpoint, as read by observers
//! - `RequestMetrics`: cumulative probe counters for one registration
//! - `GraceWindow`: the new-endpoint grace period
//!
//! # Design Decisions
//! - Snapshots are values; every probe completion writes a fresh one
//! - Grace fields are recomputed whenever a snapshot is read, so they reach
//!   zero without another probe
//! - Average latency sums successful probes only but divides by all probes

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};
use tokio::time::Instant;

/// Latest health view of one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    /// True only if the most recent completed probe succeeded.
    pub connected: bool,
    #[serde(serialize_with = "serialize_epoch_ms")]
    pub last_checked_at: SystemTime,
    /// Present only on success.
    pub response_time_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub in_grace_period: bool,
    pub grace_period_remaining_ms: u64,
    pub metrics: Option<MetricsSummary>,
}

impl HealthSnapshot {
    /// Snapshot written after a probe completes.
    pub fn from_probe(
        connected: bool,
        response_time_ms: Option<u64>,
        consecutive_failures: u32,
        metrics: Option<MetricsSummary>,
        grace: Option<&GraceWindow>,
    ) -> Self {
        let snapshot = Self {
            connected,
            last_checked_at: SystemTime::now(),
            response_time_ms: if connected { response_time_ms } else { None },
            consecutive_failures,
            in_grace_period: false,
            grace_period_remaining_ms: 0,
            metrics,
        };
        snapshot.with_grace(grace, Instant::now())
    }

    /// Disconnected placeholder recorded before the first probe.
    pub fn pending(grace: Option<&GraceWindow>) -> Self {
        Self::from_probe(false, None, 0, None, grace)
    }

    pub fn with_grace(mut self, grace: Option<&GraceWindow>, now: Instant) -> Self {
        let remaining = grace.map(|g| g.remaining(now)).unwrap_or_default();
        self.in_grace_period = !remaining.is_zero();
        self.grace_period_remaining_ms = remaining.as_millis() as u64;
        self
    }
}

/// Cumulative probe metrics reported in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub average_response_time_ms: f64,
}

/// Probe counters accumulated for the lifetime of a registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetrics {
    total: u64,
    failed: u64,
    success_time_ms: u64,
}

impl RequestMetrics {
    pub fn record(&mut self, success: bool, elapsed_ms: u64) {
        self.total += 1;
        if success {
            self.success_time_ms += elapsed_ms;
        } else {
            self.failed += 1;
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let average_response_time_ms = if self.total > 0 {
            self.success_time_ms as f64 / self.total as f64
        } else {
            0.0
        };

        MetricsSummary {
            total_requests: self.total,
            failed_requests: self.failed,
            average_response_time_ms,
        }
    }
}

/// Window after registering a new endpoint in which disconnection is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraceWindow {
    started: Instant,
    duration: Duration,
}

impl GraceWindow {
    pub fn starting_now(duration: Duration) -> Self {
        Self {
            started: Instant::now(),
            duration,
        }
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.duration
            .saturating_sub(now.saturating_duration_since(self.started))
    }

    pub fn is_active(&self, now: Instant) -> bool {
        !self.remaining(now).is_zero()
    }
}

/// Whether an endpoint idle since `last_active` should be considered retired.
///
/// Timestamps in the future count as active.
pub fn is_retired(last_active: SystemTime, now: SystemTime, threshold: Duration) -> bool {
    match now.duration_since(last_active) {
        Ok(idle) => idle > threshold,
        Err(_) => false,
    }
}

fn serialize_epoch_ms<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    let ms = time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    serializer.serialize_u64(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_divides_by_total_requests() {
        let mut metrics = RequestMetrics::default();
        metrics.record(true, 100);
        metrics.record(true, 200);
        metrics.record(false, 0);

        let summary = metrics.summary();
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.failed_requests, 1);
        assert_eq!(summary.average_response_time_ms, 100.0);
    }

    #[test]
    fn test_failed_elapsed_not_summed() {
        let mut metrics = RequestMetrics::default();
        metrics.record(false, 1000);
        metrics.record(true, 50);
        assert_eq!(metrics.summary().average_response_time_ms, 25.0);
        assert!(metrics.summary().failed_requests <= metrics.summary().total_requests);
    }

    #[test]
    fn test_empty_metrics_average_zero() {
        assert_eq!(RequestMetrics::default().summary().average_response_time_ms, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_window_elapses() {
        let grace = GraceWindow::starting_now(Duration::from_secs(120));
        let pending = HealthSnapshot::pending(Some(&grace));
        assert!(!pending.connected);
        assert!(pending.in_grace_period);
        assert_eq!(pending.grace_period_remaining_ms, 120_000);

        tokio::time::advance(Duration::from_secs(30)).await;
        let refreshed = pending.clone().with_grace(Some(&grace), Instant::now());
        assert_eq!(refreshed.grace_period_remaining_ms, 90_000);

        tokio::time::advance(Duration::from_secs(90)).await;
        assert!(!grace.is_active(Instant::now()));
        let expired = pending.with_grace(Some(&grace), Instant::now());
        assert!(!expired.in_grace_period);
        assert_eq!(expired.grace_period_remaining_ms, 0);
    }

    #[test]
    fn test_failed_probe_has_no_response_time() {
        let snapshot = HealthSnapshot::from_probe(false, Some(40), 2, None, None);
        assert_eq!(snapshot.response_time_ms, None);
        assert!(!snapshot.in_grace_period);
    }

    #[test]
    fn test_retirement_threshold() {
        let now = SystemTime::now();
        let threshold = Duration::from_secs(300);
        assert!(!is_retired(now - Duration::from_secs(10), now, threshold));
        assert!(is_retired(now - Duration::from_secs(301), now, threshold));
        assert!(!is_retired(now + Duration::from_secs(60), now, threshold));
    }

    #[test]
    fn test_snapshot_serializes_epoch_millis() {
        let mut snapshot = HealthSnapshot::from_probe(true, Some(12), 0, None, None);
        snapshot.last_checked_at = UNIX_EPOCH + Duration::from_millis(1_500);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["last_checked_at"], 1500);
        assert_eq!(json["response_time_ms"], 12);
    }
}
