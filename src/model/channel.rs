use std::collections::BTreeSet;

/// Opaque channel identifier, unique across the controlled node.
pub type ChannelId = String;

/// Opaque public-key identifier for a peer node.
pub type NodeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChannelStatus {
    Active,
    Inactive,
    Closing,
    Closed,
}

/// Most recent observed state for one channel, as pushed by metric sources.
///
/// `source_set` records which providers contributed to this observation; no
/// ordering is assumed between providers (spec.md §6).
#[derive(Debug, Clone)]
pub struct ChannelMetrics {
    pub channel_id: ChannelId,
    pub peer_node_id: NodeId,
    pub capacity_sat: u64,
    pub local_balance_sat: u64,
    pub remote_balance_sat: u64,
    pub status: ChannelStatus,
    pub age_days: f64,
    pub forwards_7d_count: u64,
    pub forwards_7d_volume_sat: u64,
    pub success_rate_7d: f64,
    pub revenue_7d_msat: u64,
    pub htlc_response_time_ms: Option<u64>,
    pub uptime_7d: f64,
    pub observed_at: f64,
    pub source_set: BTreeSet<String>,
    /// External liquidity-scan score in [0, 100]; `None` if unavailable.
    pub liquidity_scan_score: Option<f64>,
    pub bidirectional_channels_ratio: f64,
    pub liquid_channels_ratio: f64,
}

#[derive(Debug)]
pub enum MetricsInvariantError {
    BalanceExceedsCapacity { channel_id: ChannelId },
    RateOutOfRange { channel_id: ChannelId, field: &'static str, value: f64 },
}

impl std::fmt::Display for MetricsInvariantError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricsInvariantError::BalanceExceedsCapacity { channel_id } => write!(
                f,
                "channel {}: local_balance_sat + remote_balance_sat > capacity_sat",
                channel_id
            ),
            MetricsInvariantError::RateOutOfRange { channel_id, field, value } => write!(
                f,
                "channel {}: {} = {} is outside [0, 1]",
                channel_id, field, value
            ),
        }
    }
}

impl std::error::Error for MetricsInvariantError {}

impl ChannelMetrics {
    /// Validate the data-invariants from spec.md §3. A violation means the
    /// observation must be dropped rather than stored (spec.md §7: "Data
    /// invariant violation").
    pub fn check_invariants(&self) -> Result<(), MetricsInvariantError> {
        if self.local_balance_sat.saturating_add(self.remote_balance_sat) > self.capacity_sat {
            return Err(MetricsInvariantError::BalanceExceedsCapacity {
                channel_id: self.channel_id.clone(),
            });
        }
        if !(0.0..=1.0).contains(&self.success_rate_7d) {
            return Err(MetricsInvariantError::RateOutOfRange {
                channel_id: self.channel_id.clone(),
                field: "success_rate_7d",
                value: self.success_rate_7d,
            });
        }
        if !(0.0..=1.0).contains(&self.uptime_7d) {
            return Err(MetricsInvariantError::RateOutOfRange {
                channel_id: self.channel_id.clone(),
                field: "uptime_7d",
                value: self.uptime_7d,
            });
        }
        Ok(())
    }

    /// Our outbound balance as a fraction of total channel capacity.
    pub fn local_ratio(&self) -> f64 {
        if self.capacity_sat == 0 {
            return 0.0;
        }
        self.local_balance_sat as f64 / self.capacity_sat as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_metrics() -> ChannelMetrics {
        ChannelMetrics {
            channel_id: "ch1".into(),
            peer_node_id: "peer1".into(),
            capacity_sat: 1_000_000,
            local_balance_sat: 500_000,
            remote_balance_sat: 500_000,
            status: ChannelStatus::Active,
            age_days: 10.0,
            forwards_7d_count: 5,
            forwards_7d_volume_sat: 10_000,
            success_rate_7d: 0.9,
            revenue_7d_msat: 1000,
            htlc_response_time_ms: Some(400),
            uptime_7d: 0.99,
            observed_at: 1000.0,
            source_set: BTreeSet::new(),
            liquidity_scan_score: None,
            bidirectional_channels_ratio: 0.5,
            liquid_channels_ratio: 0.5,
        }
    }

    #[test]
    fn balance_over_capacity_is_rejected() {
        let mut m = base_metrics();
        m.local_balance_sat = 900_000;
        m.remote_balance_sat = 200_000;
        assert!(m.check_invariants().is_err());
    }

    #[test]
    fn rate_out_of_range_is_rejected() {
        let mut m = base_metrics();
        m.success_rate_7d = 1.5;
        assert!(m.check_invariants().is_err());
    }

    #[test]
    fn valid_metrics_pass() {
        assert!(base_metrics().check_invariants().is_ok());
    }

    #[test]
    fn local_ratio_zero_capacity_is_zero() {
        let mut m = base_metrics();
        m.capacity_sat = 0;
        assert_eq!(m.local_ratio(), 0.0);
    }
}
