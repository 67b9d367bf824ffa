//! Bridges the Node API Adapter (C3) into the Metric Store (C2) each tick:
//! lists channels for capacity/balance/status and pulls the trailing 7-day
//! forward window for success-rate and revenue (spec.md §4.3, §6).
//! External liquidity-scan scrapers push their own fields via the same
//! `MetricStore::upsert` path; this module only supplies what the Node API
//! itself can answer.

use log::{debug, warn};
use std::collections::{BTreeSet, HashMap};

use crate::client::{NodeClient, RemoteChannel};
use crate::db::Database;
use crate::metrics::MetricStore;
use crate::model::{ChannelMetrics, ChannelStatus};

const SEVEN_DAYS_SECS: f64 = 7.0 * 86_400.0;
const SOURCE_NODE_API: &str = "node_api";

struct ForwardAgg {
    count: u64,
    volume_sat: u64,
    success: u64,
    fee_msat: u64,
}

impl Default for ForwardAgg {
    fn default() -> Self {
        Self { count: 0, volume_sat: 0, success: 0, fee_msat: 0 }
    }
}

/// Pulls fresh channel + forward data from the node and upserts derived
/// `ChannelMetrics` into the Metric Store, plus the durable crash-recovery
/// snapshot in `db` (spec.md §4.9: "ChannelMetrics durable snapshots").
/// Returns the number of channels refreshed.
pub async fn refresh_metrics(client: &dyn NodeClient, store: &MetricStore, db: &Database, now: f64) -> anyhow::Result<usize> {
    let channels = client.list_channels().await?;
    let forwards = client.get_forwards_since(now - SEVEN_DAYS_SECS).await?;

    let mut agg: HashMap<String, ForwardAgg> = HashMap::new();
    for fwd in &forwards {
        let entry = agg.entry(fwd.channel_id.clone()).or_default();
        entry.count += 1;
        entry.volume_sat += fwd.amount_sat;
        entry.fee_msat += fwd.fee_msat;
        if fwd.success {
            entry.success += 1;
        }
    }

    let mut refreshed = 0;
    for ch in &channels {
        if let Err(e) = db.record_first_seen(&ch.channel_id, now) {
            warn!("channel {}: failed to record first-seen time: {}", ch.channel_id, e);
        }
        let age_days = match db.first_seen_at(&ch.channel_id) {
            Ok(Some(first_seen)) => (now - first_seen).max(0.0) / 86_400.0,
            _ => 0.0,
        };

        let metrics = build_metrics(ch, agg.get(&ch.channel_id), now, age_days);
        if store.upsert(metrics.clone()) {
            refreshed += 1;
        }
        if let Err(e) = db.upsert_metrics_latest(&metrics) {
            warn!("channel {}: failed to persist durable metrics snapshot: {}", ch.channel_id, e);
        }
    }

    debug!("ingest: refreshed {} of {} channels from node API", refreshed, channels.len());
    Ok(refreshed)
}

fn build_metrics(ch: &RemoteChannel, agg: Option<&ForwardAgg>, observed_at: f64, age_days: f64) -> ChannelMetrics {
    let (count, volume, success_rate, revenue_msat) = match agg {
        Some(a) if a.count > 0 => (a.count, a.volume_sat, a.success as f64 / a.count as f64, a.fee_msat),
        _ => (0, 0, 0.0, 0),
    };

    let mut source_set = BTreeSet::new();
    source_set.insert(SOURCE_NODE_API.to_string());

    ChannelMetrics {
        channel_id: ch.channel_id.clone(),
        peer_node_id: ch.peer_node_id.clone(),
        capacity_sat: ch.capacity_sat,
        local_balance_sat: ch.local_balance_sat,
        remote_balance_sat: ch.remote_balance_sat,
        status: ch.status.into(),
        age_days,
        forwards_7d_count: count,
        forwards_7d_volume_sat: volume,
        success_rate_7d: success_rate,
        revenue_7d_msat: revenue_msat,
        htlc_response_time_ms: None,
        uptime_7d: if ch.status.into() == ChannelStatus::Active { 1.0 } else { 0.0 },
        observed_at,
        source_set,
        liquidity_scan_score: None,
        bidirectional_channels_ratio: 0.5,
        liquid_channels_ratio: 0.5,
    }
}
