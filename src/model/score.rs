use super::channel::ChannelId;
use super::weights::Weights;

/// The five sub-scores computed by the Scoring Engine, each in [0, 100].
#[derive(Debug, Clone, Copy, Default)]
pub struct SubScores {
    pub response_time: f64,
    pub liquidity_balance: f64,
    pub routing_success: f64,
    pub revenue_efficiency: f64,
    pub liquidity_scan: f64,
}

impl SubScores {
    /// Weighted sum, without penalties.
    pub fn weighted_total(&self, w: &Weights) -> f64 {
        self.response_time * w.response_time
            + self.liquidity_balance * w.liquidity_balance
            + self.routing_success * w.routing_success
            + self.revenue_efficiency * w.revenue_efficiency
            + self.liquidity_scan * w.liquidity_scan
    }
}

/// Output of the Scoring Engine for one channel at one tick (spec.md §3).
#[derive(Debug, Clone)]
pub struct ChannelScore {
    pub channel_id: ChannelId,
    pub tick_id: u64,
    pub sub_scores: SubScores,
    pub total: f64,
    pub weights_used: Weights,
    pub computed_at: f64,
    pub stale_inputs: bool,
}
