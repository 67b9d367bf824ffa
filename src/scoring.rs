//! Scoring Engine (C4, spec.md §4.4). A pure function of
//! `(ChannelMetrics, Weights, policy)` to `ChannelScore`. No I/O, no
//! mutable state: every sub-score formula is computed directly from the
//! tick's metric snapshot.

use crate::model::{ChannelPolicy, ChannelScore, SubScores, Weights};
use crate::model::channel::ChannelMetrics;

/// response_time: 300ms -> 100, >=2000ms -> 0, linear in between.
const RESPONSE_TIME_BEST_MS: f64 = 300.0;
const RESPONSE_TIME_WORST_MS: f64 = 2000.0;

const LIQUID_CHANNELS_RATIO_TARGET: f64 = 0.66;
const REVENUE_PER_SAT_LOCKED_TARGET: f64 = 1e-4;
const AVG_FEE_EARNED_PER_FORWARD_TARGET: f64 = 100.0;

const PENALTY_RESPONSE_TIME_MS: f64 = 8000.0;
const PENALTY_RESPONSE_TIME_FACTOR: f64 = 0.7;
const PENALTY_BALANCE_QUALITY_THRESHOLD: f64 = 0.3;
const PENALTY_BALANCE_QUALITY_FACTOR: f64 = 0.8;
const PENALTY_BIDIRECTIONAL_THRESHOLD: f64 = 0.5;
const PENALTY_BIDIRECTIONAL_FACTOR: f64 = 0.9;

const LIQUIDITY_SCAN_BONUS_THRESHOLD: f64 = 0.8;
const LIQUIDITY_SCAN_BONUS_FACTOR: f64 = 1.2;

fn response_time_score(ms: Option<u64>) -> f64 {
    match ms {
        None => 0.0,
        Some(ms) => {
            let ms = ms as f64;
            if ms <= RESPONSE_TIME_BEST_MS {
                100.0
            } else if ms >= RESPONSE_TIME_WORST_MS {
                0.0
            } else {
                100.0 * (RESPONSE_TIME_WORST_MS - ms) / (RESPONSE_TIME_WORST_MS - RESPONSE_TIME_BEST_MS)
            }
        }
    }
}

fn channel_balance_quality(local_balance_sat: u64, capacity_sat: u64) -> f64 {
    if capacity_sat == 0 {
        return 0.0;
    }
    let local_ratio = local_balance_sat as f64 / capacity_sat as f64;
    1.0 - (0.5 - local_ratio).abs() * 2.0
}

fn liquidity_balance_score(m: &ChannelMetrics) -> f64 {
    let quality = channel_balance_quality(m.local_balance_sat, m.capacity_sat);
    60.0 * quality + 40.0 * (m.liquid_channels_ratio / LIQUID_CHANNELS_RATIO_TARGET).min(1.0)
}

fn routing_success_score(m: &ChannelMetrics) -> f64 {
    m.success_rate_7d * 100.0
}

/// Revenue per sat locked, over the 7-day window. 0 when capacity is 0.
fn revenue_per_sat_locked(m: &ChannelMetrics) -> f64 {
    if m.capacity_sat == 0 {
        return 0.0;
    }
    (m.revenue_7d_msat as f64 / 1000.0) / m.capacity_sat as f64
}

fn avg_fee_earned_per_forward(m: &ChannelMetrics) -> f64 {
    if m.forwards_7d_count == 0 {
        return 0.0;
    }
    (m.revenue_7d_msat as f64 / 1000.0) / m.forwards_7d_count as f64
}

fn revenue_efficiency_score(m: &ChannelMetrics) -> f64 {
    50.0 * (revenue_per_sat_locked(m) / REVENUE_PER_SAT_LOCKED_TARGET).min(1.0)
        + 50.0 * (avg_fee_earned_per_forward(m) / AVG_FEE_EARNED_PER_FORWARD_TARGET).min(1.0)
}

fn liquidity_scan_score(m: &ChannelMetrics) -> f64 {
    let base = m.liquidity_scan_score.unwrap_or(0.0);
    if m.bidirectional_channels_ratio > LIQUIDITY_SCAN_BONUS_THRESHOLD {
        (base * LIQUIDITY_SCAN_BONUS_FACTOR).min(100.0)
    } else {
        base
    }
}

/// Computes the five sub-scores and the penalized, rounded total for one
/// channel at one tick. `stale` forces every affected sub-score to 0 and the
/// returned `ChannelScore.stale_inputs` to `true` (spec.md §4.4).
pub fn score_channel(
    channel_id: &str,
    tick_id: u64,
    metrics: Option<&ChannelMetrics>,
    _policy: Option<&ChannelPolicy>,
    weights: &Weights,
    now: f64,
    stale: bool,
) -> ChannelScore {
    let metrics = match metrics {
        Some(m) if !stale => m,
        _ => {
            return ChannelScore {
                channel_id: channel_id.to_string(),
                tick_id,
                sub_scores: SubScores::default(),
                total: 0.0,
                weights_used: *weights,
                computed_at: now,
                stale_inputs: true,
            };
        }
    };

    let sub_scores = SubScores {
        response_time: response_time_score(metrics.htlc_response_time_ms),
        liquidity_balance: liquidity_balance_score(metrics),
        routing_success: routing_success_score(metrics),
        revenue_efficiency: revenue_efficiency_score(metrics),
        liquidity_scan: liquidity_scan_score(metrics),
    };

    let mut total = sub_scores.weighted_total(weights);

    let response_time_ms = metrics.htlc_response_time_ms.unwrap_or(0);
    if response_time_ms as f64 > PENALTY_RESPONSE_TIME_MS {
        total *= PENALTY_RESPONSE_TIME_FACTOR;
    }
    if channel_balance_quality(metrics.local_balance_sat, metrics.capacity_sat) < PENALTY_BALANCE_QUALITY_THRESHOLD {
        total *= PENALTY_BALANCE_QUALITY_FACTOR;
    }
    if metrics.bidirectional_channels_ratio < PENALTY_BIDIRECTIONAL_THRESHOLD {
        total *= PENALTY_BIDIRECTIONAL_FACTOR;
    }

    ChannelScore {
        channel_id: channel_id.to_string(),
        tick_id,
        sub_scores,
        total: (total * 100.0).round() / 100.0,
        weights_used: *weights,
        computed_at: now,
        stale_inputs: false,
    }
}
