use super::channel::ChannelId;
use super::policy::ChannelPolicy;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionKind {
    NoAction,
    IncreaseFees,
    DecreaseFees,
    CloseChannel,
    Rebalance,
}

impl DecisionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::NoAction => "NO_ACTION",
            DecisionKind::IncreaseFees => "INCREASE_FEES",
            DecisionKind::DecreaseFees => "DECREASE_FEES",
            DecisionKind::CloseChannel => "CLOSE_CHANNEL",
            DecisionKind::Rebalance => "REBALANCE",
        }
    }

    /// Opposing mutation kinds used to detect oscillation (spec.md §4.5).
    pub fn opposes(&self, other: &DecisionKind) -> bool {
        matches!(
            (self, other),
            (DecisionKind::IncreaseFees, DecisionKind::DecreaseFees)
                | (DecisionKind::DecreaseFees, DecisionKind::IncreaseFees)
        )
    }

    pub fn is_mutating(&self) -> bool {
        !matches!(self, DecisionKind::NoAction)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
    Failed,
    RolledBack,
    Shadowed,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Pending => "pending",
            DecisionStatus::Approved => "approved",
            DecisionStatus::Rejected => "rejected",
            DecisionStatus::Executed => "executed",
            DecisionStatus::Failed => "failed",
            DecisionStatus::RolledBack => "rolled_back",
            DecisionStatus::Shadowed => "shadowed",
        }
    }
}

/// Structured justification: the rule that fired plus the sub-scores that
/// contributed (spec.md §3: "reason: structured").
#[derive(Debug, Clone)]
pub struct DecisionReason {
    pub rule_id: &'static str,
    pub detail: String,
}

impl DecisionReason {
    pub fn new(rule_id: &'static str, detail: impl Into<String>) -> Self {
        Self { rule_id, detail: detail.into() }
    }
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub decision_id: Uuid,
    pub tick_id: u64,
    pub channel_id: ChannelId,
    pub kind: DecisionKind,
    pub confidence: f64,
    /// Partial: only the fields this decision proposes to change.
    pub proposed_policy: Option<ChannelPolicy>,
    pub prior_policy_version: u64,
    pub reason: DecisionReason,
    pub created_at: f64,
    pub status: DecisionStatus,
    pub execution_result: Option<String>,
    pub transaction_id: Option<Uuid>,
}

impl Decision {
    pub fn new(
        tick_id: u64,
        channel_id: ChannelId,
        kind: DecisionKind,
        confidence: f64,
        proposed_policy: Option<ChannelPolicy>,
        prior_policy_version: u64,
        reason: DecisionReason,
        created_at: f64,
    ) -> Self {
        Self {
            decision_id: Uuid::new_v4(),
            tick_id,
            channel_id,
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            proposed_policy,
            prior_policy_version,
            reason,
            created_at,
            status: DecisionStatus::Pending,
            execution_result: None,
            transaction_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposing_kinds_detected() {
        assert!(DecisionKind::IncreaseFees.opposes(&DecisionKind::DecreaseFees));
        assert!(DecisionKind::DecreaseFees.opposes(&DecisionKind::IncreaseFees));
        assert!(!DecisionKind::IncreaseFees.opposes(&DecisionKind::IncreaseFees));
        assert!(!DecisionKind::NoAction.opposes(&DecisionKind::CloseChannel));
    }

    #[test]
    fn confidence_is_clamped() {
        let d = Decision::new(
            1,
            "ch1".into(),
            DecisionKind::NoAction,
            1.5,
            None,
            1,
            DecisionReason::new("test", "x"),
            0.0,
        );
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn no_action_is_not_mutating() {
        assert!(!DecisionKind::NoAction.is_mutating());
        assert!(DecisionKind::IncreaseFees.is_mutating());
    }
}
