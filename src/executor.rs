//! Policy Executor (C6, spec.md §4.6) and Shadow Recorder (C7, spec.md
//! §4.7). The sole mutator of `ChannelPolicy`: applies, backs up, and rolls
//! back under a per-channel advisory lock, or — in shadow/canary mode —
//! records the counterfactual decision without touching the node.

use log::{error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::client::{NodeApiError, NodeClient, RemotePolicy};
use crate::db::Database;
use crate::events::{self, Severity};
use crate::model::{ChannelId, ChannelPolicy, Decision, DecisionKind, DecisionStatus, PolicyBackup, SafetyEnvelope};

/// Fatal outcome that must stop the rest of the tick's Execution phase
/// (spec.md §7: "Authorization failure... fatal for the tick's Execution
/// phase; all remaining mutations in the tick are skipped").
pub struct ExecutionAborted;

/// Per-channel advisory locks, generalizing the node-client's own global
/// rate limiter into a keyed lock table (spec.md §5: "Execution fans out
/// per-channel mutations... each holding a per-channel lock").
#[derive(Default)]
pub struct ChannelLocks {
    locks: Mutex<HashMap<ChannelId, Arc<Mutex<()>>>>,
}

impl ChannelLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get(&self, channel_id: &str) -> Arc<Mutex<()>> {
        let mut map = self.locks.lock().await;
        map.entry(channel_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

pub struct PolicyExecutor<'a> {
    pub client: &'a dyn NodeClient,
    pub db: &'a Database,
    pub locks: &'a ChannelLocks,
}

impl<'a> PolicyExecutor<'a> {
    /// Routes a pending Decision to either the Shadow Recorder or a real
    /// mutation attempt, and persists the outcome. Returns `Err` only when
    /// the failure must abort the rest of the tick (auth failure).
    pub async fn process(
        &self,
        mut decision: Decision,
        envelope: &SafetyEnvelope,
        now: f64,
    ) -> Result<Decision, ExecutionAborted> {
        // P5 (spec.md §8): at most one Decision per (channel_id, tick_id).
        // The `decisions` table also enforces this with a unique index, but
        // checking here first means a re-delivered or re-decided tick
        // returns the existing outcome instead of silently dropping a
        // duplicate insert and proceeding to mutate without a persisted
        // record of having done so.
        if let Ok(Some(existing)) = self.db.decision_for_tick(&decision.channel_id, decision.tick_id) {
            return Ok(existing);
        }

        if !decision.kind.is_mutating() {
            let _ = self.db.insert_decision(&decision);
            return Ok(decision);
        }

        let shadow = envelope.effective_shadow(&decision.channel_id)
            || (decision.kind == DecisionKind::CloseChannel && envelope.require_close_confirmation);

        if shadow {
            decision.status = DecisionStatus::Shadowed;
            let _ = self.db.insert_decision(&decision);
            events::decision_transition(
                decision.decision_id,
                &decision.channel_id,
                decision.kind.as_str(),
                decision.status.as_str(),
                Severity::Info,
            );
            return Ok(decision);
        }

        let _ = self.db.insert_decision(&decision);
        self.mutate(decision, envelope, now).await
    }

    async fn mutate(
        &self,
        mut decision: Decision,
        _envelope: &SafetyEnvelope,
        now: f64,
    ) -> Result<Decision, ExecutionAborted> {
        let channel_id = decision.channel_id.clone();
        let lock = self.locks.get(&channel_id).await;
        let Ok(_guard) = lock.try_lock() else {
            decision.status = DecisionStatus::Rejected;
            decision.execution_result = Some("concurrent".to_string());
            let _ = self.db.update_decision_status(decision.decision_id, decision.status, decision.execution_result.as_deref(), None);
            return Ok(decision);
        };

        if decision.kind == DecisionKind::CloseChannel {
            return self.close_channel(decision, now).await;
        }

        let Some(proposed) = decision.proposed_policy.clone() else {
            decision.status = DecisionStatus::Rejected;
            decision.execution_result = Some("no_proposed_policy".to_string());
            let _ = self.db.update_decision_status(decision.decision_id, decision.status, decision.execution_result.as_deref(), None);
            return Ok(decision);
        };

        let current = match self.client.get_policy(&channel_id).await {
            Ok(p) => p,
            Err(NodeApiError::AuthFailure) => {
                self.fail(&mut decision, "auth_failure_on_refetch");
                return Err(ExecutionAborted);
            }
            Err(e) => {
                decision.status = DecisionStatus::Rejected;
                decision.execution_result = Some(format!("refetch_failed: {}", e));
                let _ = self.db.update_decision_status(decision.decision_id, decision.status, decision.execution_result.as_deref(), None);
                return Ok(decision);
            }
        };

        if current.version != decision.prior_policy_version {
            decision.status = DecisionStatus::Rejected;
            decision.execution_result = Some("version_stale".to_string());
            let _ = self.db.update_decision_status(decision.decision_id, decision.status, decision.execution_result.as_deref(), None);
            return Ok(decision);
        }

        let transaction_id = Uuid::new_v4();
        // Record the correlator on the still-pending row before the backup
        // write, so a crash between here and the apply call leaves a
        // reconcilable orphan (spec.md §7, Scenario F) rather than a
        // Decision with no way to find its PolicyBackup.
        let _ = self.db.set_decision_transaction(decision.decision_id, transaction_id);
        let current_policy = remote_to_policy(&current);
        let backup = PolicyBackup::new(current_policy.clone(), transaction_id, now);
        if self.db.insert_policy_backup(&backup).is_err() {
            decision.status = DecisionStatus::Rejected;
            decision.execution_result = Some("backup_write_failed".to_string());
            let _ = self.db.update_decision_status(decision.decision_id, decision.status, decision.execution_result.as_deref(), Some(transaction_id));
            return Ok(decision);
        }

        let new_remote = RemotePolicy {
            channel_id: channel_id.clone(),
            base_fee_msat: proposed.base_fee_msat,
            fee_rate_ppm: proposed.fee_rate_ppm,
            min_htlc_msat: proposed.min_htlc_msat,
            max_htlc_msat: proposed.max_htlc_msat,
            time_lock_delta: proposed.time_lock_delta,
            disabled: proposed.disabled,
            version: current.version,
        };

        match self.client.apply_policy(&new_remote, current.version).await {
            Ok(result) => {
                decision.status = DecisionStatus::Executed;
                decision.execution_result = Some(format!("applied version {}", result.new_version));
                decision.transaction_id = Some(transaction_id);
                let _ = self.db.update_decision_status(decision.decision_id, decision.status, decision.execution_result.as_deref(), Some(transaction_id));
                events::apply_outcome(transaction_id, &channel_id, "executed", Severity::Info);
                Ok(decision)
            }
            Err(NodeApiError::AuthFailure) => {
                decision.transaction_id = Some(transaction_id);
                self.fail(&mut decision, "auth_failure_on_apply");
                Err(ExecutionAborted)
            }
            Err(e) => {
                decision.transaction_id = Some(transaction_id);
                self.rollback_after_failure(decision, &backup, &channel_id, transaction_id, &e).await
            }
        }
    }

    async fn close_channel(&self, mut decision: Decision, now: f64) -> Result<Decision, ExecutionAborted> {
        let channel_id = decision.channel_id.clone();
        match self.client.close_channel(&channel_id, false).await {
            Ok(result) => {
                decision.status = DecisionStatus::Executed;
                decision.execution_result = result.closing_txid.clone();
                let _ = self.db.update_decision_status(decision.decision_id, decision.status, decision.execution_result.as_deref(), None);
                events::apply_outcome(Uuid::new_v4(), &channel_id, "close_executed", Severity::Info);
                Ok(decision)
            }
            Err(NodeApiError::AuthFailure) => {
                self.fail(&mut decision, "auth_failure_on_close");
                Err(ExecutionAborted)
            }
            Err(e) => {
                decision.status = DecisionStatus::Failed;
                decision.execution_result = Some(format!("close_failed: {}", e));
                let _ = self.db.update_decision_status(decision.decision_id, decision.status, decision.execution_result.as_deref(), None);
                error!("channel {}: close failed: {}", channel_id, e);
                let _ = now;
                Ok(decision)
            }
        }
    }

    async fn rollback_after_failure(
        &self,
        mut decision: Decision,
        backup: &PolicyBackup,
        channel_id: &str,
        transaction_id: Uuid,
        failure: &NodeApiError,
    ) -> Result<Decision, ExecutionAborted> {
        let current_version = match self.client.get_policy(channel_id).await {
            Ok(p) => p.version,
            Err(_) => backup.policy.version,
        };

        let restore = RemotePolicy {
            channel_id: channel_id.to_string(),
            base_fee_msat: backup.policy.base_fee_msat,
            fee_rate_ppm: backup.policy.fee_rate_ppm,
            min_htlc_msat: backup.policy.min_htlc_msat,
            max_htlc_msat: backup.policy.max_htlc_msat,
            time_lock_delta: backup.policy.time_lock_delta,
            disabled: backup.policy.disabled,
            version: current_version,
        };

        match self.client.apply_policy(&restore, current_version).await {
            Ok(_) => {
                decision.status = DecisionStatus::RolledBack;
                decision.execution_result = Some(format!("apply failed ({}), rolled back", failure));
                let _ = self.db.update_decision_status(decision.decision_id, decision.status, decision.execution_result.as_deref(), Some(transaction_id));
                events::rollback_outcome(transaction_id, channel_id, "rolled_back", Severity::Warning);
                info!("channel {}: apply failed, rolled back successfully", channel_id);
                Ok(decision)
            }
            Err(rollback_err) => {
                decision.status = DecisionStatus::Failed;
                decision.execution_result = Some(format!("apply failed ({}), rollback failed ({})", failure, rollback_err));
                let _ = self.db.update_decision_status(decision.decision_id, decision.status, decision.execution_result.as_deref(), Some(transaction_id));
                let _ = self.db.mark_do_not_touch(channel_id, "rollback failed", backup.created_at);
                events::rollback_outcome(transaction_id, channel_id, "rollback_failed", Severity::Critical);
                error!("channel {}: rollback failed ({}); marked do-not-touch", channel_id, rollback_err);
                Ok(decision)
            }
        }
    }

    fn fail(&self, decision: &mut Decision, reason: &str) {
        decision.status = DecisionStatus::Failed;
        decision.execution_result = Some(reason.to_string());
        let _ = self.db.update_decision_status(decision.decision_id, decision.status, decision.execution_result.as_deref(), decision.transaction_id);
        error!("channel {}: {}", decision.channel_id, reason);
    }

    /// External `rollback(transaction_id)` (spec.md §4.6, CLI `rollback`).
    /// Succeeds only if the node's current version is the one this crate
    /// produced; otherwise returns a conflict message.
    pub async fn rollback(&self, transaction_id: Uuid) -> anyhow::Result<String> {
        let decision = self
            .db
            .decision_by_transaction(transaction_id)?
            .ok_or_else(|| anyhow::anyhow!("no decision for transaction_id {}", transaction_id))?;

        if decision.status == DecisionStatus::RolledBack {
            return Ok("already_rolled_back".to_string());
        }

        let backup = self
            .db
            .policy_backup_by_transaction(transaction_id)?
            .ok_or_else(|| anyhow::anyhow!("backup_expired_or_missing"))?;

        if backup.is_expired(now_unix()) {
            anyhow::bail!("backup_expired_or_missing");
        }

        let current = self.client.get_policy(&decision.channel_id).await?;
        let restore = RemotePolicy {
            channel_id: decision.channel_id.clone(),
            base_fee_msat: backup.policy.base_fee_msat,
            fee_rate_ppm: backup.policy.fee_rate_ppm,
            min_htlc_msat: backup.policy.min_htlc_msat,
            max_htlc_msat: backup.policy.max_htlc_msat,
            time_lock_delta: backup.policy.time_lock_delta,
            disabled: backup.policy.disabled,
            version: current.version,
        };

        match self.client.apply_policy(&restore, current.version).await {
            Ok(_) => {
                self.db.update_decision_status(decision.decision_id, DecisionStatus::RolledBack, Some("manual_rollback"), Some(transaction_id))?;
                Ok("rolled_back".to_string())
            }
            Err(NodeApiError::VersionConflict) => Ok("conflict".to_string()),
            Err(e) => Err(e.into()),
        }
    }

    /// Runs once at startup to reconcile Decisions left `pending` by a crash
    /// mid-tick (spec.md §7, Scenario F: "Process crashes after writing
    /// Decision(status=pending) and PolicyBackup but before confirming the
    /// apply call's result"). For each orphan with a recorded
    /// transaction_id, compares the node's current policy against the
    /// backup (prior) and the decision's proposed policy to tell which side
    /// of the apply call the crash landed on, rather than guessing.
    pub async fn recover_pending(&self) -> anyhow::Result<usize> {
        let orphans = self.db.pending_orphans()?;
        let mut reconciled = 0;

        for decision in orphans {
            let Some(transaction_id) = decision.transaction_id else { continue };
            let Some(backup) = self.db.policy_backup_by_transaction(transaction_id)? else { continue };

            let current = match self.client.get_policy(&decision.channel_id).await {
                Ok(p) => p,
                Err(e) => {
                    warn!("channel {}: recovery could not refetch policy ({}), leaving pending", decision.channel_id, e);
                    continue;
                }
            };

            if fee_fields_match(&current, &backup.policy) {
                self.db.update_decision_status(decision.decision_id, DecisionStatus::Rejected, Some("recovered_pre_apply"), Some(transaction_id))?;
                events::rollback_outcome(transaction_id, &decision.channel_id, "recovered_pre_apply", Severity::Warning);
                reconciled += 1;
                continue;
            }

            let proposed_matches = decision
                .proposed_policy
                .as_ref()
                .map(|p| fee_fields_match(&current, p))
                .unwrap_or(false);

            if proposed_matches {
                self.db.update_decision_status(decision.decision_id, DecisionStatus::Executed, Some("recovered_post_apply"), Some(transaction_id))?;
                events::apply_outcome(transaction_id, &decision.channel_id, "recovered_post_apply", Severity::Info);
                reconciled += 1;
                continue;
            }

            // Neither prior nor proposed: the node has since moved under a
            // different writer, or the crash landed mid-apply with a partial
            // result. One rollback attempt, same as a normal apply failure.
            let restore = RemotePolicy {
                channel_id: decision.channel_id.clone(),
                base_fee_msat: backup.policy.base_fee_msat,
                fee_rate_ppm: backup.policy.fee_rate_ppm,
                min_htlc_msat: backup.policy.min_htlc_msat,
                max_htlc_msat: backup.policy.max_htlc_msat,
                time_lock_delta: backup.policy.time_lock_delta,
                disabled: backup.policy.disabled,
                version: current.version,
            };

            match self.client.apply_policy(&restore, current.version).await {
                Ok(_) => {
                    self.db.update_decision_status(decision.decision_id, DecisionStatus::RolledBack, Some("recovered_ambiguous_rolled_back"), Some(transaction_id))?;
                    events::rollback_outcome(transaction_id, &decision.channel_id, "recovered_ambiguous_rolled_back", Severity::Warning);
                }
                Err(e) => {
                    self.db.update_decision_status(decision.decision_id, DecisionStatus::Failed, Some("recovered_ambiguous_rollback_failed"), Some(transaction_id))?;
                    let _ = self.db.mark_do_not_touch(&decision.channel_id, "recovery rollback failed", backup.created_at);
                    events::rollback_outcome(transaction_id, &decision.channel_id, "recovered_ambiguous_rollback_failed", Severity::Critical);
                    error!("channel {}: recovery rollback failed ({}); marked do-not-touch", decision.channel_id, e);
                }
            }
            reconciled += 1;
        }

        Ok(reconciled)
    }
}

fn now_unix() -> f64 {
    chrono::Utc::now().timestamp() as f64
}

fn remote_to_policy(r: &RemotePolicy) -> ChannelPolicy {
    ChannelPolicy {
        channel_id: r.channel_id.clone(),
        direction: crate::model::Direction::Outgoing,
        base_fee_msat: r.base_fee_msat,
        fee_rate_ppm: r.fee_rate_ppm,
        min_htlc_msat: r.min_htlc_msat,
        max_htlc_msat: r.max_htlc_msat,
        time_lock_delta: r.time_lock_delta,
        disabled: r.disabled,
        version: r.version,
    }
}

/// Field-wise comparison ignoring `version`/`channel_id`/`direction`, used
/// by restart recovery to tell which side of an apply call a crash landed
/// on (spec.md §7, Scenario F) without relying on the optimistic-concurrency
/// version, which a recovered process cannot trust to still be the one it
/// last saw.
fn fee_fields_match(remote: &RemotePolicy, policy: &ChannelPolicy) -> bool {
    remote.base_fee_msat == policy.base_fee_msat
        && remote.fee_rate_ppm == policy.fee_rate_ppm
        && remote.min_htlc_msat == policy.min_htlc_msat
        && remote.max_htlc_msat == policy.max_htlc_msat
        && remote.time_lock_delta == policy.time_lock_delta
        && remote.disabled == policy.disabled
}

impl std::convert::From<NodeApiError> for anyhow::Error {
    fn from(e: NodeApiError) -> Self {
        anyhow::anyhow!(e.to_string())
    }
}
