//! Failure classification.
//!
//! # Responsibilities
//! - Track consecutive probe failures per endpoint
//! - Decide when an endpoint's circuit trips
//!
//! # State Transitions
//! ```text
//! success            → consecutive = 0
//! failure            → consecutive += 1
//! consecutive >= threshold (outside grace, not yet tripped) → Tripped
//! ```
//!
//! # Design Decisions
//! - Trip is edge-triggered: it fires once until the tracker is reset
//! - A success does not clear the trip flag; only a restart does
//! - Failures inside a grace window are counted but never trip

/// Outcome of recording one probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Healthy,
    Failing { consecutive: u32 },
    /// The circuit tripped on this result.
    Tripped { consecutive: u32 },
}

/// Consecutive-failure counter with a one-shot trip flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureTracker {
    consecutive: u32,
    tripped: bool,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, success: bool, threshold: u32, in_grace: bool) -> Verdict {
        if success {
            self.consecutive = 0;
            return Verdict::Healthy;
        }

        self.consecutive = self.consecutive.saturating_add(1);

        if !self.tripped && !in_grace && self.consecutive >= threshold {
            self.tripped = true;
            return Verdict::Tripped {
                consecutive: self.consecutive,
            };
        }

        Verdict::Failing {
            consecutive: self.consecutive,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
