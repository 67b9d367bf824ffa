//! Metric Store (C2, spec.md §4.2). Keeps the latest `ChannelMetrics` per
//! channel plus a short ring buffer for trend computation. Reads are
//! lock-free snapshots; writes coalesce by channel_id.

use log::warn;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::model::ChannelId;
use crate::model::ChannelMetrics;

/// Ring buffer capacity per channel (spec.md §4.2: "last N=96 observations").
const RING_CAPACITY: usize = 96;

struct ChannelSlot {
    latest: ChannelMetrics,
    ring: Vec<ChannelMetrics>,
}

impl ChannelSlot {
    fn push(&mut self, m: ChannelMetrics) {
        if self.ring.len() >= RING_CAPACITY {
            self.ring.remove(0);
        }
        self.ring.push(m.clone());
        self.latest = m;
    }

    /// Invariant check: ring must be non-decreasing in observed_at and never
    /// exceed capacity. A violation means the buffer is corrupted.
    fn ring_is_sane(&self) -> bool {
        if self.ring.len() > RING_CAPACITY {
            return false;
        }
        self.ring.windows(2).all(|w| w[0].observed_at <= w[1].observed_at)
    }
}

/// In-memory store of per-channel metrics. Cheap to clone via `Arc` at the
/// call site; internally guarded by a single `RwLock` over a hash map, which
/// is sufficient because writes coalesce by channel_id and never block a
/// concurrent snapshot read for long.
pub struct MetricStore {
    inner: RwLock<HashMap<ChannelId, ChannelSlot>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self { inner: RwLock::new(HashMap::new()) }
    }

    /// Rejects metrics older than what is already stored for this channel
    /// (spec.md §4.2: "rejected if observed_at is older than the stored
    /// one"). Returns `true` if the write was accepted.
    pub fn upsert(&self, metrics: ChannelMetrics) -> bool {
        if let Err(e) = metrics.check_invariants() {
            warn!("dropping metrics for {}: {}", metrics.channel_id, e);
            return false;
        }

        let mut guard = self.inner.write().unwrap();
        match guard.get_mut(&metrics.channel_id) {
            Some(slot) => {
                if metrics.observed_at < slot.latest.observed_at {
                    return false;
                }
                slot.push(metrics);
                if !slot.ring_is_sane() {
                    warn!("ring buffer corrupted for channel, resetting (latest preserved)");
                    let latest = slot.latest.clone();
                    slot.ring = vec![latest];
                }
                true
            }
            None => {
                guard.insert(
                    metrics.channel_id.clone(),
                    ChannelSlot { ring: vec![metrics.clone()], latest: metrics },
                );
                true
            }
        }
    }

    /// Returns the metrics for `channel_id` only if fresh enough, along with
    /// a staleness flag (spec.md §4.2).
    pub fn get_fresh(&self, channel_id: &str, max_age: f64, now: f64) -> Option<(ChannelMetrics, bool)> {
        let guard = self.inner.read().unwrap();
        let slot = guard.get(channel_id)?;
        let stale = now - slot.latest.observed_at > max_age;
        Some((slot.latest.clone(), stale))
    }

    /// An immutable, point-in-time map used for the entire tick so that
    /// scoring is consistent regardless of concurrent provider writes
    /// (spec.md §4.2, §5).
    pub fn snapshot_for_tick(&self) -> HashMap<ChannelId, ChannelMetrics> {
        let guard = self.inner.read().unwrap();
        guard.iter().map(|(k, v)| (k.clone(), v.latest.clone())).collect()
    }

    /// Ring buffer entries for a channel, oldest first; used for trend
    /// computations such as sustained-low-performance detection.
    pub fn history(&self, channel_id: &str) -> Vec<ChannelMetrics> {
        let guard = self.inner.read().unwrap();
        guard.get(channel_id).map(|s| s.ring.clone()).unwrap_or_default()
    }

    pub fn channel_count(&self) -> usize {
        self.inner.read().unwrap().len()
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new()
    }
}
