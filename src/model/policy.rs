use super::channel::ChannelId;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// The mutable surface the autopilot controls. Created on first observation
/// of a channel; mutated only by the Policy Executor (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPolicy {
    pub channel_id: ChannelId,
    pub direction: Direction,
    pub base_fee_msat: u64,
    pub fee_rate_ppm: u32,
    pub min_htlc_msat: u64,
    pub max_htlc_msat: u64,
    pub time_lock_delta: u32,
    pub disabled: bool,
    /// Monotonic per channel_id; incremented by every Policy Executor mutation.
    pub version: u64,
}

impl ChannelPolicy {
    /// A copy with only the fee fields the Decision Engine is allowed to set,
    /// useful for building proposed policies without fabricating the rest.
    pub fn with_fees(&self, base_fee_msat: u64, fee_rate_ppm: u32) -> ChannelPolicy {
        ChannelPolicy {
            base_fee_msat,
            fee_rate_ppm,
            ..self.clone()
        }
    }
}

/// The pre-mutation ChannelPolicy captured before a Policy Executor write,
/// retained to enable rollback (spec.md §3, §4.6).
#[derive(Debug, Clone)]
pub struct PolicyBackup {
    pub backup_id: Uuid,
    pub channel_id: ChannelId,
    pub policy: ChannelPolicy,
    pub created_at: f64,
    pub expires_at: f64,
    pub transaction_id: Uuid,
}

pub const POLICY_BACKUP_TTL_SECS: f64 = 30.0 * 86_400.0;

impl PolicyBackup {
    pub fn new(policy: ChannelPolicy, transaction_id: Uuid, now: f64) -> Self {
        Self {
            backup_id: Uuid::new_v4(),
            channel_id: policy.channel_id.clone(),
            policy,
            created_at: now,
            expires_at: now + POLICY_BACKUP_TTL_SECS,
            transaction_id,
        }
    }

    pub fn is_expired(&self, now: f64) -> bool {
        now >= self.expires_at
    }
}
