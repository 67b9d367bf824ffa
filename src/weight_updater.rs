//! Adaptive Weight Updater (C8, spec.md §4.8). Runs on the slower cadence,
//! consuming a window of executed decisions and subsequent metric deltas to
//! compute new per-sub-score weights from their Pearson correlation with
//! forwarding-volume change.

use crate::model::Weights;

/// One executed decision's attributable sub-score and the volume delta
/// observed in the 24h after it (spec.md §4.8).
pub struct WeightSample {
    pub dominant_sub_score: SubScoreKind,
    pub sub_score_value: f64,
    pub volume_delta_sat: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubScoreKind {
    ResponseTime,
    LiquidityBalance,
    RoutingSuccess,
    RevenueEfficiency,
    LiquidityScan,
}

const WEIGHT_MIN: f64 = 0.1;
const WEIGHT_MAX: f64 = 0.5;

/// Pearson correlation coefficient between two equal-length samples. `0.0`
/// if either series has zero variance (undefined correlation).
fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len();
    if n < 2 {
        return 0.0;
    }
    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..n {
        let dx = xs[i] - mean_x;
        let dy = ys[i] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return 0.0;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

fn kinds() -> [SubScoreKind; 5] {
    [
        SubScoreKind::ResponseTime,
        SubScoreKind::LiquidityBalance,
        SubScoreKind::RoutingSuccess,
        SubScoreKind::RevenueEfficiency,
        SubScoreKind::LiquidityScan,
    ]
}

/// Computes proposed new weights from a window of samples, per spec.md
/// §4.8: `w_i ∝ |corr_i| / Σ|corr_j|`, clipped to [0.1, 0.5] then
/// renormalized. Returns `None` if the total correlation signal is weak
/// (below `weak_signal_threshold`), meaning the caller should keep the
/// previous weights.
pub fn compute_weight_correlations(samples: &[WeightSample], weak_signal_threshold: f64) -> Option<[f64; 5]> {
    let mut correlations = [0.0; 5];
    for (i, kind) in kinds().iter().enumerate() {
        let subset: Vec<&WeightSample> = samples.iter().filter(|s| s.dominant_sub_score == *kind).collect();
        if subset.len() < 2 {
            continue;
        }
        let xs: Vec<f64> = subset.iter().map(|s| s.sub_score_value).collect();
        let ys: Vec<f64> = subset.iter().map(|s| s.volume_delta_sat).collect();
        correlations[i] = pearson(&xs, &ys);
    }

    let total_signal: f64 = correlations.iter().map(|c| c.abs()).sum();
    if total_signal < weak_signal_threshold {
        return None;
    }

    let mut raw: Vec<f64> = correlations.iter().map(|c| (c.abs() / total_signal).clamp(WEIGHT_MIN, WEIGHT_MAX)).collect();
    let sum: f64 = raw.iter().sum();
    for w in raw.iter_mut() {
        *w /= sum;
    }

    Some([raw[0], raw[1], raw[2], raw[3], raw[4]])
}

/// Guards against policy thrash: caps the L1-distance step between the
/// previous and newly-computed weights to `max_step` (spec.md §4.8).
pub fn step_towards(previous: &Weights, target: [f64; 5], max_step: f64, new_version: u64, activated_at: f64) -> Weights {
    let prev = previous.as_array();
    let l1: f64 = prev.iter().zip(target.iter()).map(|(a, b)| (a - b).abs()).sum();

    if l1 <= max_step {
        return Weights::from_array(target, new_version, activated_at);
    }

    let scale = max_step / l1;
    let mut stepped = [0.0; 5];
    for i in 0..5 {
        stepped[i] = prev[i] + (target[i] - prev[i]) * scale;
    }

    // Renormalize after stepping so the weights still sum to 1.0.
    let sum: f64 = stepped.iter().sum();
    for w in stepped.iter_mut() {
        *w /= sum;
    }

    Weights::from_array(stepped, new_version, activated_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: SubScoreKind, score: f64, delta: f64) -> WeightSample {
        WeightSample { dominant_sub_score: kind, sub_score_value: score, volume_delta_sat: delta }
    }

    #[test]
    fn perfectly_correlated_series_has_corr_1() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [10.0, 20.0, 30.0, 40.0];
        assert!((pearson(&xs, &ys) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_variance_series_has_corr_0() {
        let xs = [5.0, 5.0, 5.0];
        let ys = [1.0, 2.0, 3.0];
        assert_eq!(pearson(&xs, &ys), 0.0);
    }

    #[test]
    fn weak_signal_returns_none() {
        let samples = vec![
            sample(SubScoreKind::ResponseTime, 10.0, 1.0),
            sample(SubScoreKind::ResponseTime, 10.0, 1.0),
        ];
        assert!(compute_weight_correlations(&samples, 0.05).is_none());
    }

    #[test]
    fn strong_signal_produces_valid_weights() {
        let samples = vec![
            sample(SubScoreKind::ResponseTime, 10.0, 100.0),
            sample(SubScoreKind::ResponseTime, 90.0, 900.0),
            sample(SubScoreKind::LiquidityBalance, 10.0, 900.0),
            sample(SubScoreKind::LiquidityBalance, 90.0, 100.0),
        ];
        let weights = compute_weight_correlations(&samples, 0.05).unwrap();
        let sum: f64 = weights.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(weights.iter().all(|w| w.is_finite() && *w > 0.0));
    }

    #[test]
    fn step_towards_caps_l1_distance_to_max_step() {
        let previous = Weights::default_weights();
        let target = [0.5, 0.1, 0.1, 0.1, 0.2];
        let stepped = step_towards(&previous, target, 0.3, 2, 1000.0);
        assert!(previous.l1_distance(&stepped) <= 0.3 + 1e-6);
        assert_eq!(stepped.version, 2);
    }

    #[test]
    fn step_towards_applies_directly_when_within_budget() {
        let previous = Weights::default_weights();
        let target = [0.31, 0.29, 0.2, 0.1, 0.1];
        let stepped = step_towards(&previous, target, 0.3, 2, 1000.0);
        assert!((stepped.response_time - 0.31).abs() < 1e-9);
    }
}
