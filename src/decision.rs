//! Decision Engine (C5, spec.md §4.5). Maps a `ChannelScore` plus the
//! current policy, safety envelope, and decision history to a `Decision`.
//! Pure: every lookup (cooldown, oscillation history) is passed in rather
//! than fetched, so the engine itself performs no I/O.

use crate::events;
use crate::model::{
    ChannelPolicy, ChannelScore, ChannelStatus, Decision, DecisionKind, DecisionReason, SafetyEnvelope,
};

pub struct DecisionThresholds {
    pub close_threshold: f64,
    pub low_perf_threshold: f64,
    pub min_age_days_for_close: f64,
    pub low_perf_sustain_hours: f64,
}

const LOCAL_HEAVY_RATIO: f64 = 0.8;
const LOCAL_LIGHT_RATIO: f64 = 0.2;
const INCREASE_FEES_LOCAL_HEAVY_PCT: f64 = 0.30;
const DECREASE_FEES_LOCAL_LIGHT_PCT: f64 = 0.20;
const INCREASE_FEES_LOW_PERF_PCT: f64 = 0.20;
const OSCILLATION_WINDOW_SECS: f64 = 24.0 * 3600.0;
const OSCILLATION_PENALTY: f64 = 0.5;

/// Minimal view of a prior decision needed for cooldown/oscillation
/// evaluation, so the engine doesn't depend on the persistence layer.
pub struct DecisionHistoryEntry {
    pub kind: DecisionKind,
    pub created_at: f64,
    pub status_is_executed_or_rolled_back: bool,
}

/// One channel's full evaluation context for a tick.
pub struct ChannelContext<'a> {
    pub score: &'a ChannelScore,
    pub status: ChannelStatus,
    pub current_policy: &'a ChannelPolicy,
    pub age_days: f64,
    pub forwards_7d_count: u64,
    pub local_ratio: f64,
    pub low_perf_sustained: bool,
    pub recent_history: &'a [DecisionHistoryEntry],
}

fn cooldown_remaining(history: &[DecisionHistoryEntry], now: f64, cooldown_minutes: u64) -> f64 {
    let cooldown_secs = cooldown_minutes as f64 * 60.0;
    let last_mutation = history
        .iter()
        .filter(|h| h.status_is_executed_or_rolled_back)
        .map(|h| h.created_at)
        .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a: f64| a.max(t))));

    match last_mutation {
        Some(t) => (cooldown_secs - (now - t)).max(0.0),
        None => 0.0,
    }
}

/// Number of opposing mutation pairs within the oscillation window
/// (spec.md §4.5: "two opposing mutations... within the last 24h").
fn oscillation_pairs(history: &[DecisionHistoryEntry], now: f64, proposed_kind: DecisionKind) -> u32 {
    history
        .iter()
        .filter(|h| now - h.created_at <= OSCILLATION_WINDOW_SECS && proposed_kind.opposes(&h.kind))
        .count() as u32
}

/// Safety-clamp a proposed fee pair against the envelope and the prior
/// policy's relative-change bound. Returns `None` if the clamped proposal
/// equals the current policy (spec.md §4.5: "becomes NO_ACTION").
fn clamp_fee_proposal(
    current: &ChannelPolicy,
    proposed_base_fee_msat: u64,
    proposed_fee_rate_ppm: u32,
    envelope: &SafetyEnvelope,
) -> Option<ChannelPolicy> {
    let clamped_base_fee = proposed_base_fee_msat.clamp(envelope.base_fee_msat_min, envelope.base_fee_msat_max);
    let clamped_rate = proposed_fee_rate_ppm.clamp(envelope.fee_rate_ppm_min, envelope.fee_rate_ppm_max);

    let max_rate_delta =
        ((current.fee_rate_ppm as f64).max(1.0) * envelope.max_fee_change_pct / 100.0).floor() as u32;
    let rate_floor = current.fee_rate_ppm.saturating_sub(max_rate_delta);
    let rate_ceiling = current.fee_rate_ppm.saturating_add(max_rate_delta);
    let clamped_rate = clamped_rate.clamp(rate_floor, rate_ceiling);

    let max_base_fee_delta =
        ((current.base_fee_msat as f64).max(1.0) * envelope.max_fee_change_pct / 100.0).floor() as u64;
    let base_fee_floor = current.base_fee_msat.saturating_sub(max_base_fee_delta);
    let base_fee_ceiling = current.base_fee_msat.saturating_add(max_base_fee_delta);
    let clamped_base_fee = clamped_base_fee.clamp(base_fee_floor, base_fee_ceiling);

    if clamped_base_fee == current.base_fee_msat && clamped_rate == current.fee_rate_ppm {
        return None;
    }

    Some(current.with_fees(clamped_base_fee, clamped_rate))
}

/// Evaluates the seven ordered rules for one channel and returns its
/// Decision. `tick_id` and `now` are supplied by the caller to keep this
/// function free of wall-clock access.
pub fn decide(
    tick_id: u64,
    channel_id: &str,
    ctx: &ChannelContext,
    envelope: &SafetyEnvelope,
    thresholds: &DecisionThresholds,
    now: f64,
) -> Decision {
    // Rule 1: stale inputs or non-active status.
    if ctx.score.stale_inputs || ctx.status != ChannelStatus::Active {
        return Decision::new(
            tick_id,
            channel_id.to_string(),
            DecisionKind::NoAction,
            0.2,
            None,
            ctx.current_policy.version,
            DecisionReason::new("stale_or_inactive", "stale_inputs or channel not active"),
            now,
        );
    }

    // Rule 2: cooldown.
    let remaining = cooldown_remaining(ctx.recent_history, now, envelope.cooldown_minutes);
    if remaining > 0.0 {
        return Decision::new(
            tick_id,
            channel_id.to_string(),
            DecisionKind::NoAction,
            0.3,
            None,
            ctx.current_policy.version,
            DecisionReason::new("cooldown", format!("{:.0}s remaining", remaining)),
            now,
        );
    }

    // Rule 3: underperforming + aged + never used -> close.
    if ctx.score.total < thresholds.close_threshold
        && ctx.age_days > thresholds.min_age_days_for_close
        && ctx.forwards_7d_count == 0
    {
        let base_confidence = ((thresholds.close_threshold - ctx.score.total) / thresholds.close_threshold).clamp(0.0, 1.0);
        let confidence = apply_oscillation_penalty(base_confidence, ctx.recent_history, now, DecisionKind::CloseChannel);
        return Decision::new(
            tick_id,
            channel_id.to_string(),
            DecisionKind::CloseChannel,
            confidence,
            None,
            ctx.current_policy.version,
            DecisionReason::new(
                "close_underperforming",
                format!("total={:.2} age_days={:.1} forwards_7d=0", ctx.score.total, ctx.age_days),
            ),
            now,
        );
    }

    // Rule 4: local-heavy -> increase fees.
    if ctx.local_ratio > LOCAL_HEAVY_RATIO {
        let proposed_rate = (ctx.current_policy.fee_rate_ppm as f64 * (1.0 + INCREASE_FEES_LOCAL_HEAVY_PCT)) as u32;
        return clamp_and_finalize(
            tick_id,
            channel_id,
            ctx,
            envelope,
            now,
            DecisionKind::IncreaseFees,
            ctx.current_policy.base_fee_msat,
            proposed_rate,
            0.8,
            "increase_local_heavy",
            format!("local_ratio={:.3}", ctx.local_ratio),
        );
    }

    // Rule 5: remote-heavy -> decrease fees.
    if ctx.local_ratio < LOCAL_LIGHT_RATIO {
        let proposed_rate =
            (ctx.current_policy.fee_rate_ppm as f64 * (1.0 - DECREASE_FEES_LOCAL_LIGHT_PCT)) as u32;
        return clamp_and_finalize(
            tick_id,
            channel_id,
            ctx,
            envelope,
            now,
            DecisionKind::DecreaseFees,
            ctx.current_policy.base_fee_msat,
            proposed_rate,
            0.8,
            "decrease_remote_heavy",
            format!("local_ratio={:.3}", ctx.local_ratio),
        );
    }

    // Rule 6: sustained low performance -> increase fees moderately.
    if ctx.score.total < thresholds.low_perf_threshold && ctx.low_perf_sustained {
        let proposed_rate = (ctx.current_policy.fee_rate_ppm as f64 * (1.0 + INCREASE_FEES_LOW_PERF_PCT)) as u32;
        return clamp_and_finalize(
            tick_id,
            channel_id,
            ctx,
            envelope,
            now,
            DecisionKind::IncreaseFees,
            ctx.current_policy.base_fee_msat,
            proposed_rate,
            0.6,
            "increase_sustained_low_perf",
            format!(
                "total={:.2} sustained>={}h",
                ctx.score.total, thresholds.low_perf_sustain_hours
            ),
        );
    }

    // Rule 7: no matching rule.
    Decision::new(
        tick_id,
        channel_id.to_string(),
        DecisionKind::NoAction,
        1.0,
        None,
        ctx.current_policy.version,
        DecisionReason::new("no_action", "no rule matched"),
        now,
    )
}

#[allow(clippy::too_many_arguments)]
fn clamp_and_finalize(
    tick_id: u64,
    channel_id: &str,
    ctx: &ChannelContext,
    envelope: &SafetyEnvelope,
    now: f64,
    kind: DecisionKind,
    proposed_base_fee_msat: u64,
    proposed_fee_rate_ppm: u32,
    base_confidence: f64,
    rule_id: &'static str,
    detail: String,
) -> Decision {
    match clamp_fee_proposal(ctx.current_policy, proposed_base_fee_msat, proposed_fee_rate_ppm, envelope) {
        Some(clamped) => {
            if clamped.fee_rate_ppm != proposed_fee_rate_ppm {
                events::envelope_clamp(
                    channel_id,
                    "fee_rate_ppm",
                    &proposed_fee_rate_ppm.to_string(),
                    &clamped.fee_rate_ppm.to_string(),
                );
            }
            let confidence = apply_oscillation_penalty(base_confidence, ctx.recent_history, now, kind);
            Decision::new(
                tick_id,
                channel_id.to_string(),
                kind,
                confidence,
                Some(clamped),
                ctx.current_policy.version,
                DecisionReason::new(rule_id, detail),
                now,
            )
        }
        None => Decision::new(
            tick_id,
            channel_id.to_string(),
            DecisionKind::NoAction,
            0.0,
            None,
            ctx.current_policy.version,
            DecisionReason::new("clamped_to_identity", "clamped proposal equals current policy"),
            now,
        ),
    }
}

fn apply_oscillation_penalty(
    base_confidence: f64,
    history: &[DecisionHistoryEntry],
    now: f64,
    kind: DecisionKind,
) -> f64 {
    let pairs = oscillation_pairs(history, now, kind);
    let mut confidence = base_confidence;
    for _ in 0..pairs {
        confidence *= 1.0 - OSCILLATION_PENALTY;
    }
    confidence.clamp(0.0, 1.0)
}

/// Selects at most `max_channels_per_tick` mutating decisions when the tick
/// produced more than the budget allows (spec.md §4.5): ranked by distance
/// from the mid-band score (50) descending, then by oldest since last
/// mutation.
pub fn select_within_budget(
    mut decisions: Vec<Decision>,
    max_channels_per_tick: usize,
    score_of: impl Fn(&str) -> f64,
    last_mutation_at: impl Fn(&str) -> Option<f64>,
) -> Vec<Decision> {
    let mutating_count = decisions.iter().filter(|d| d.kind.is_mutating()).count();
    if mutating_count <= max_channels_per_tick {
        return decisions;
    }

    const MID_BAND: f64 = 50.0;
    let mut mutating_indices: Vec<usize> = decisions
        .iter()
        .enumerate()
        .filter(|(_, d)| d.kind.is_mutating())
        .map(|(i, _)| i)
        .collect();

    mutating_indices.sort_by(|&a, &b| {
        let dist_a = (score_of(&decisions[a].channel_id) - MID_BAND).abs();
        let dist_b = (score_of(&decisions[b].channel_id) - MID_BAND).abs();
        dist_b
            .partial_cmp(&dist_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let last_a = last_mutation_at(&decisions[a].channel_id).unwrap_or(0.0);
                let last_b = last_mutation_at(&decisions[b].channel_id).unwrap_or(0.0);
                last_a.partial_cmp(&last_b).unwrap_or(std::cmp::Ordering::Equal)
            })
    });

    let demote: std::collections::HashSet<usize> =
        mutating_indices.into_iter().skip(max_channels_per_tick).collect();

    for (i, d) in decisions.iter_mut().enumerate() {
        if demote.contains(&i) {
            d.kind = DecisionKind::NoAction;
            d.proposed_policy = None;
            d.reason = DecisionReason::new("no_action", "deferred by max_channels_per_tick budget");
        }
    }

    decisions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Direction, SafetyMode, SubScores};

    fn policy() -> ChannelPolicy {
        ChannelPolicy {
            channel_id: "ch1".to_string(),
            direction: Direction::Outgoing,
            base_fee_msat: 1000,
            fee_rate_ppm: 200,
            min_htlc_msat: 1000,
            max_htlc_msat: 900_000_000,
            time_lock_delta: 40,
            disabled: false,
            version: 3,
        }
    }

    fn envelope() -> SafetyEnvelope {
        SafetyEnvelope {
            base_fee_msat_min: 0,
            base_fee_msat_max: 10_000,
            fee_rate_ppm_min: 0,
            fee_rate_ppm_max: 5000,
            max_fee_change_pct: 50.0,
            cooldown_minutes: 60,
            max_channels_per_tick: 10,
            mode: SafetyMode::Active,
            canary_channel_whitelist: Vec::new(),
            dry_run_override: false,
            require_close_confirmation: true,
        }
    }

    fn thresholds() -> DecisionThresholds {
        DecisionThresholds {
            close_threshold: 20.0,
            low_perf_threshold: 40.0,
            min_age_days_for_close: 30.0,
            low_perf_sustain_hours: 48.0,
        }
    }

    fn score(total: f64, stale: bool) -> ChannelScore {
        ChannelScore {
            channel_id: "ch1".to_string(),
            tick_id: 1,
            sub_scores: SubScores::default(),
            total,
            weights_used: crate::model::Weights::default_weights(),
            computed_at: 0.0,
            stale_inputs: stale,
        }
    }

    fn ctx<'a>(score: &'a ChannelScore, policy: &'a ChannelPolicy, history: &'a [DecisionHistoryEntry]) -> ChannelContext<'a> {
        ChannelContext {
            score,
            status: ChannelStatus::Active,
            current_policy: policy,
            age_days: 10.0,
            forwards_7d_count: 5,
            local_ratio: 0.5,
            low_perf_sustained: false,
            recent_history: history,
        }
    }

    #[test]
    fn stale_inputs_forces_no_action() {
        let s = score(90.0, true);
        let p = policy();
        let c = ctx(&s, &p, &[]);
        let d = decide(1, "ch1", &c, &envelope(), &thresholds(), 0.0);
        assert_eq!(d.kind, DecisionKind::NoAction);
        assert_eq!(d.reason.rule_id, "stale_or_inactive");
        assert!((d.confidence - 0.2).abs() < 1e-9);
    }

    #[test]
    fn cooldown_blocks_mutation() {
        let s = score(90.0, false);
        let p = policy();
        let history = vec![DecisionHistoryEntry {
            kind: DecisionKind::IncreaseFees,
            created_at: 100.0,
            status_is_executed_or_rolled_back: true,
        }];
        let mut c = ctx(&s, &p, &history);
        c.local_ratio = 0.9; // would otherwise trigger rule 4
        let d = decide(1, "ch1", &c, &envelope(), &thresholds(), 200.0);
        assert_eq!(d.kind, DecisionKind::NoAction);
        assert_eq!(d.reason.rule_id, "cooldown");
    }

    #[test]
    fn close_underperforming_channel() {
        let s = score(10.0, false);
        let p = policy();
        let mut c = ctx(&s, &p, &[]);
        c.age_days = 40.0;
        c.forwards_7d_count = 0;
        let d = decide(1, "ch1", &c, &envelope(), &thresholds(), 1_000_000.0);
        assert_eq!(d.kind, DecisionKind::CloseChannel);
        assert!(d.confidence > 0.0);
    }

    #[test]
    fn local_heavy_increases_fees_by_30_pct() {
        let s = score(90.0, false);
        let p = policy();
        let mut c = ctx(&s, &p, &[]);
        c.local_ratio = 0.9;
        let d = decide(1, "ch1", &c, &envelope(), &thresholds(), 1_000_000.0);
        assert_eq!(d.kind, DecisionKind::IncreaseFees);
        assert_eq!(d.proposed_policy.unwrap().fee_rate_ppm, 260); // 200 * 1.3
    }

    #[test]
    fn local_ratio_exactly_80_pct_does_not_fire_rule_4() {
        let s = score(90.0, false);
        let p = policy();
        let mut c = ctx(&s, &p, &[]);
        c.local_ratio = 0.8;
        let d = decide(1, "ch1", &c, &envelope(), &thresholds(), 1_000_000.0);
        assert_ne!(d.reason.rule_id, "increase_local_heavy");
    }

    #[test]
    fn remote_heavy_decreases_fees_by_20_pct() {
        let s = score(90.0, false);
        let p = policy();
        let mut c = ctx(&s, &p, &[]);
        c.local_ratio = 0.1;
        let d = decide(1, "ch1", &c, &envelope(), &thresholds(), 1_000_000.0);
        assert_eq!(d.kind, DecisionKind::DecreaseFees);
        assert_eq!(d.proposed_policy.unwrap().fee_rate_ppm, 160); // 200 * 0.8
    }

    #[test]
    fn sustained_low_perf_increases_fees_by_20_pct() {
        let s = score(30.0, false);
        let p = policy();
        let mut c = ctx(&s, &p, &[]);
        c.low_perf_sustained = true;
        let d = decide(1, "ch1", &c, &envelope(), &thresholds(), 1_000_000.0);
        assert_eq!(d.kind, DecisionKind::IncreaseFees);
        assert_eq!(d.proposed_policy.unwrap().fee_rate_ppm, 240); // 200 * 1.2
    }

    #[test]
    fn no_matching_rule_is_no_action() {
        let s = score(90.0, false);
        let p = policy();
        let c = ctx(&s, &p, &[]);
        let d = decide(1, "ch1", &c, &envelope(), &thresholds(), 1_000_000.0);
        assert_eq!(d.kind, DecisionKind::NoAction);
        assert_eq!(d.reason.rule_id, "no_action");
    }

    #[test]
    fn clamp_to_current_max_produces_no_action() {
        // current=5000 (envelope max), rule 4 would set 6500; max_fee_change_pct=50 => clamp to 5000 = current.
        let mut p = policy();
        p.fee_rate_ppm = 5000;
        let mut env = envelope();
        env.fee_rate_ppm_max = 5000;
        let s = score(90.0, false);
        let mut c = ctx(&s, &p, &[]);
        c.local_ratio = 0.9;
        let d = decide(1, "ch1", &c, &env, &thresholds(), 1_000_000.0);
        assert_eq!(d.kind, DecisionKind::NoAction);
        assert_eq!(d.reason.rule_id, "clamped_to_identity");
    }

    #[test]
    fn max_fee_change_pct_clamp_scenario() {
        // current=200 ppm, proposal=350 ppm, max_fee_change_pct=50 => clamped to 300 ppm.
        let mut p = policy();
        p.fee_rate_ppm = 200;
        let mut env = envelope();
        env.fee_rate_ppm_max = 5000;
        let clamped = clamp_fee_proposal(&p, p.base_fee_msat, 350, &env).unwrap();
        assert_eq!(clamped.fee_rate_ppm, 300);
    }

    #[test]
    fn oscillation_penalty_halves_confidence_per_pair() {
        let s = score(90.0, false);
        let p = policy();
        let history = vec![DecisionHistoryEntry {
            kind: DecisionKind::DecreaseFees,
            created_at: 996_000.0,
            status_is_executed_or_rolled_back: true,
        }];
        let mut c = ctx(&s, &p, &history);
        c.local_ratio = 0.9;
        let d = decide(1, "ch1", &c, &envelope(), &thresholds(), 1_000_000.0);
        assert_eq!(d.kind, DecisionKind::IncreaseFees);
        assert!((d.confidence - 0.4).abs() < 1e-9); // 0.8 * 0.5
    }

    #[test]
    fn budget_defers_excess_mutations_oldest_last() {
        let d1 = Decision::new(1, "ch1".into(), DecisionKind::IncreaseFees, 0.8, None, 1, DecisionReason::new("x", ""), 0.0);
        let d2 = Decision::new(1, "ch2".into(), DecisionKind::IncreaseFees, 0.8, None, 1, DecisionReason::new("x", ""), 0.0);
        let decisions = vec![d1, d2];
        let score_of = |_: &str| 50.0;
        let last_mutation_at = |id: &str| if id == "ch1" { Some(100.0) } else { Some(50.0) };
        let result = select_within_budget(decisions, 1, score_of, last_mutation_at);
        let ch1 = result.iter().find(|d| d.channel_id == "ch1").unwrap();
        let ch2 = result.iter().find(|d| d.channel_id == "ch2").unwrap();
        assert_eq!(ch2.kind, DecisionKind::IncreaseFees); // older mutation kept
        assert_eq!(ch1.kind, DecisionKind::NoAction); // newer mutation deferred
    }

    #[test]
    fn budget_prefers_largest_score_distance_over_recency() {
        let d1 = Decision::new(1, "ch1".into(), DecisionKind::IncreaseFees, 0.8, None, 1, DecisionReason::new("x", ""), 0.0);
        let d2 = Decision::new(1, "ch2".into(), DecisionKind::IncreaseFees, 0.8, None, 1, DecisionReason::new("x", ""), 0.0);
        let decisions = vec![d1, d2];
        // ch1 is far from the mid-band (90) but was mutated more recently;
        // ch2 sits near mid-band (55) but hasn't been touched in a while.
        // Score distance must win over recency.
        let score_of = |id: &str| if id == "ch1" { 90.0 } else { 55.0 };
        let last_mutation_at = |id: &str| if id == "ch1" { Some(100.0) } else { Some(0.0) };
        let result = select_within_budget(decisions, 1, score_of, last_mutation_at);
        let ch1 = result.iter().find(|d| d.channel_id == "ch1").unwrap();
        let ch2 = result.iter().find(|d| d.channel_id == "ch2").unwrap();
        assert_eq!(ch1.kind, DecisionKind::IncreaseFees); // larger |score-50| kept
        assert_eq!(ch2.kind, DecisionKind::NoAction);
    }
}
