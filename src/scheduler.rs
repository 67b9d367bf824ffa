//! Clock & Scheduler (C1, spec.md §4.1). Drives two independent periodic
//! tasks — the control tick and the slower weight-update task — and owns
//! cancellation/shutdown. Tick invocations are serialized per kind; a tick
//! that overruns its period causes the next fire to be skipped, with the
//! lag recorded as an event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::events;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    Control,
    WeightUpdate,
}

impl TickKind {
    fn as_str(&self) -> &'static str {
        match self {
            TickKind::Control => "control",
            TickKind::WeightUpdate => "weight_update",
        }
    }
}

/// Monotonic tick counter, shared across the (single) control-tick task.
/// `tokio::time::interval` with `MissedTickBehavior::Skip` already gives us
/// "a tick that exceeds its period is allowed to finish; the next fire is
/// skipped" for free — this struct only tracks tick identity and lag.
pub struct Scheduler {
    next_tick_id: AtomicU64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { next_tick_id: AtomicU64::new(0) }
    }

    pub fn next_tick_id(&self) -> u64 {
        self.next_tick_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Builds a `tokio::time::interval` for the given kind, configured to
    /// skip missed ticks rather than burst-fire a backlog (spec.md §4.1).
    pub fn interval_for(&self, period: Duration) -> tokio::time::Interval {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    }

    /// Records observed scheduling lag (actual fire time minus expected),
    /// as a scheduler-lag event (spec.md §4.1: "recorded lag metric").
    pub fn record_lag(&self, kind: TickKind, expected: Duration, actual: Duration) {
        if actual > expected {
            events::scheduler_lag(kind.as_str(), (actual - expected).as_millis());
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounds the tick interval to the spec's allowed range (spec.md §4.1:
/// "configurable in [1 min, 24h]"); config validation already enforces this,
/// this is a final defensive clamp at the scheduling boundary.
pub fn clamp_tick_interval(seconds: u64) -> Duration {
    Duration::from_secs(seconds.clamp(60, 86_400))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_ids_are_monotonic() {
        let s = Scheduler::new();
        assert_eq!(s.next_tick_id(), 0);
        assert_eq!(s.next_tick_id(), 1);
        assert_eq!(s.next_tick_id(), 2);
    }

    #[test]
    fn clamp_tick_interval_respects_bounds() {
        assert_eq!(clamp_tick_interval(10), Duration::from_secs(60));
        assert_eq!(clamp_tick_interval(900), Duration::from_secs(900));
        assert_eq!(clamp_tick_interval(999_999), Duration::from_secs(86_400));
    }
}
