//! Persistence Layer (C9, spec.md §4.9). Durable store for decisions, policy
//! backups, weights versions, and metrics snapshots. Writes are
//! write-ahead: Decision and Backup are written before the mutation call;
//! `execution_result` is updated after (spec.md §4.9, §5).

use anyhow::Context;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

use crate::model::{
    ChannelId, ChannelMetrics, ChannelPolicy, ChannelStatus, Decision, DecisionKind,
    DecisionReason, DecisionStatus, Direction, PolicyBackup, Weights,
};

pub struct Database {
    conn: rusqlite::Connection,
}

impl Database {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = rusqlite::Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn conn(&self) -> &rusqlite::Connection {
        &self.conn
    }

    fn migrate(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ---- Decisions -----------------------------------------------------

    /// Write-ahead insert; called before any mutation is attempted.
    pub fn insert_decision(&self, d: &Decision) -> anyhow::Result<()> {
        let (base_fee, fee_rate, min_htlc, max_htlc, tld, disabled) = match &d.proposed_policy {
            Some(p) => (
                Some(p.base_fee_msat as i64),
                Some(p.fee_rate_ppm as i64),
                Some(p.min_htlc_msat as i64),
                Some(p.max_htlc_msat as i64),
                Some(p.time_lock_delta as i64),
                Some(p.disabled),
            ),
            None => (None, None, None, None, None, None),
        };
        self.conn.execute(
            "INSERT INTO decisions (
                decision_id, tick_id, channel_id, kind, confidence,
                proposed_base_fee_msat, proposed_fee_rate_ppm, proposed_min_htlc_msat,
                proposed_max_htlc_msat, proposed_time_lock_delta, proposed_disabled,
                prior_policy_version, rule_id, reason_detail, created_at, status,
                execution_result, transaction_id
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)",
            params![
                d.decision_id.to_string(),
                d.tick_id as i64,
                d.channel_id,
                d.kind.as_str(),
                d.confidence,
                base_fee,
                fee_rate,
                min_htlc,
                max_htlc,
                tld,
                disabled,
                d.prior_policy_version as i64,
                d.reason.rule_id,
                d.reason.detail,
                d.created_at,
                d.status.as_str(),
                d.execution_result,
                d.transaction_id.map(|t| t.to_string()),
            ],
        )?;
        Ok(())
    }

    pub fn update_decision_status(
        &self,
        decision_id: Uuid,
        status: DecisionStatus,
        execution_result: Option<&str>,
        transaction_id: Option<Uuid>,
    ) -> anyhow::Result<()> {
        self.conn.execute(
            "UPDATE decisions SET status=?1, execution_result=?2, transaction_id=?3 WHERE decision_id=?4",
            params![
                status.as_str(),
                execution_result,
                transaction_id.map(|t| t.to_string()),
                decision_id.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Records the transaction_id for a still-`pending` decision *before* the
    /// backup/apply sequence runs, so a crash between backup-write and
    /// apply leaves a reconcilable orphan rather than an untraceable one
    /// (spec.md §7, §9: "shared transaction_id correlator").
    pub fn set_decision_transaction(&self, decision_id: Uuid, transaction_id: Uuid) -> anyhow::Result<()> {
        self.conn.execute(
            "UPDATE decisions SET transaction_id=?1 WHERE decision_id=?2",
            params![transaction_id.to_string(), decision_id.to_string()],
        )?;
        Ok(())
    }

    /// Enforces P5 (one Decision per channel/tick): `None` means no existing
    /// decision, so the caller may insert a new one.
    pub fn decision_for_tick(&self, channel_id: &str, tick_id: u64) -> anyhow::Result<Option<Decision>> {
        self.conn
            .query_row(
                "SELECT * FROM decisions WHERE channel_id=?1 AND tick_id=?2",
                params![channel_id, tick_id as i64],
                row_to_decision,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn get_decision(&self, decision_id: Uuid) -> anyhow::Result<Option<Decision>> {
        self.conn
            .query_row(
                "SELECT * FROM decisions WHERE decision_id=?1",
                params![decision_id.to_string()],
                row_to_decision,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn decision_by_transaction(&self, transaction_id: Uuid) -> anyhow::Result<Option<Decision>> {
        self.conn
            .query_row(
                "SELECT * FROM decisions WHERE transaction_id=?1",
                params![transaction_id.to_string()],
                row_to_decision,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Decisions on a channel created at or after `since`, newest first; used
    /// for cooldown and oscillation-penalty lookups (spec.md §4.5).
    pub fn recent_decisions_for_channel(&self, channel_id: &str, since: f64) -> anyhow::Result<Vec<Decision>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM decisions WHERE channel_id=?1 AND created_at>=?2 ORDER BY created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![channel_id, since], row_to_decision)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn last_executed_at(&self, channel_id: &str) -> anyhow::Result<Option<f64>> {
        self.conn
            .query_row(
                "SELECT MAX(created_at) FROM decisions WHERE channel_id=?1 AND status IN ('executed','rolled_back')",
                params![channel_id],
                |row| row.get::<_, Option<f64>>(0),
            )
            .map_err(Into::into)
    }

    /// Decisions left `pending` by a crash mid-tick (spec.md §7: "Persistence
    /// failure mid-write"). Only rows with a `transaction_id` already
    /// recorded are candidates for reconciliation; a pending row with no
    /// transaction_id never got past the refetch/version-check step and
    /// carries no side effect to reconcile.
    pub fn pending_orphans(&self) -> anyhow::Result<Vec<Decision>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM decisions WHERE status='pending' AND transaction_id IS NOT NULL",
        )?;
        let rows = stmt.query_map([], row_to_decision)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn decisions_since(&self, since: f64) -> anyhow::Result<Vec<Decision>> {
        let mut stmt = self.conn.prepare("SELECT * FROM decisions WHERE created_at>=?1 ORDER BY created_at ASC")?;
        let rows = stmt.query_map(params![since], row_to_decision)?.collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn shadowed_counts_since(&self, since: f64) -> anyhow::Result<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, COUNT(*) FROM decisions WHERE status='shadowed' AND created_at>=?1 GROUP BY kind",
        )?;
        let rows = stmt
            .query_map(params![since], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ---- Policy backups --------------------------------------------------

    pub fn insert_policy_backup(&self, b: &PolicyBackup) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO policy_backups (
                backup_id, channel_id, direction, base_fee_msat, fee_rate_ppm,
                min_htlc_msat, max_htlc_msat, time_lock_delta, disabled, version,
                created_at, expires_at, transaction_id
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
            params![
                b.backup_id.to_string(),
                b.channel_id,
                direction_str(b.policy.direction),
                b.policy.base_fee_msat as i64,
                b.policy.fee_rate_ppm as i64,
                b.policy.min_htlc_msat as i64,
                b.policy.max_htlc_msat as i64,
                b.policy.time_lock_delta as i64,
                b.policy.disabled,
                b.policy.version as i64,
                b.created_at,
                b.expires_at,
                b.transaction_id.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn policy_backup_by_transaction(&self, transaction_id: Uuid) -> anyhow::Result<Option<PolicyBackup>> {
        self.conn
            .query_row(
                "SELECT * FROM policy_backups WHERE transaction_id=?1",
                params![transaction_id.to_string()],
                row_to_backup,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn mark_do_not_touch(&self, channel_id: &str, reason: &str, since: f64) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO do_not_touch (channel_id, reason, set_at) VALUES (?1,?2,?3)
             ON CONFLICT(channel_id) DO UPDATE SET reason=excluded.reason, set_at=excluded.set_at",
            params![channel_id, reason, since],
        )?;
        Ok(())
    }

    pub fn is_do_not_touch(&self, channel_id: &str) -> anyhow::Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM do_not_touch WHERE channel_id=?1",
            params![channel_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn clear_do_not_touch(&self, channel_id: &str) -> anyhow::Result<()> {
        self.conn.execute("DELETE FROM do_not_touch WHERE channel_id=?1", params![channel_id])?;
        Ok(())
    }

    // ---- Weights ----------------------------------------------------------

    pub fn insert_weights_version(&self, w: &Weights) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO weights_versions (
                version, response_time, liquidity_balance, routing_success,
                revenue_efficiency, liquidity_scan, activated_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7)",
            params![
                w.version as i64,
                w.response_time,
                w.liquidity_balance,
                w.routing_success,
                w.revenue_efficiency,
                w.liquidity_scan,
                w.activated_at,
            ],
        )?;
        Ok(())
    }

    pub fn active_weights(&self) -> anyhow::Result<Option<Weights>> {
        self.conn
            .query_row(
                "SELECT version, response_time, liquidity_balance, routing_success,
                        revenue_efficiency, liquidity_scan, activated_at
                 FROM weights_versions ORDER BY version DESC LIMIT 1",
                [],
                |row| {
                    Ok(Weights {
                        response_time: row.get(1)?,
                        liquidity_balance: row.get(2)?,
                        routing_success: row.get(3)?,
                        revenue_efficiency: row.get(4)?,
                        liquidity_scan: row.get(5)?,
                        version: row.get::<_, i64>(0)? as u64,
                        activated_at: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    // ---- Safety mode --------------------------------------------------------

    /// Persists an operator-issued `set-mode` change (spec.md §6: "persisted
    /// mode change"); overrides `safety.mode` from the TOML config at the
    /// next startup. Single row, last writer wins.
    pub fn set_safety_mode(&self, mode: &str, set_at: f64) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO safety_mode (id, mode, set_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET mode=excluded.mode, set_at=excluded.set_at",
            params![mode, set_at],
        )?;
        Ok(())
    }

    pub fn get_safety_mode(&self) -> anyhow::Result<Option<String>> {
        self.conn
            .query_row("SELECT mode FROM safety_mode WHERE id=1", [], |row| row.get(0))
            .optional()
            .map_err(Into::into)
    }

    // ---- Channel first-seen tracking ----------------------------------------

    /// Records `observed_at` as the channel's first-seen time if none is
    /// recorded yet; a no-op on every subsequent observation (first write
    /// wins, so age_days keeps advancing from the channel's true discovery
    /// rather than the process's most recent restart).
    pub fn record_first_seen(&self, channel_id: &str, observed_at: f64) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO channel_first_seen (channel_id, first_seen_at) VALUES (?1,?2)",
            params![channel_id, observed_at],
        )?;
        Ok(())
    }

    pub fn first_seen_at(&self, channel_id: &str) -> anyhow::Result<Option<f64>> {
        self.conn
            .query_row(
                "SELECT first_seen_at FROM channel_first_seen WHERE channel_id=?1",
                params![channel_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    // ---- Metrics durable snapshots -----------------------------------------

    /// Latest durable snapshot per channel (spec.md §4.9). The in-memory
    /// Metric Store is the hot path; this is the crash-recovery copy.
    pub fn upsert_metrics_latest(&self, m: &ChannelMetrics) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO metrics_latest (
                channel_id, peer_node_id, capacity_sat, local_balance_sat,
                remote_balance_sat, status, age_days, forwards_7d_count,
                forwards_7d_volume_sat, success_rate_7d, revenue_7d_msat,
                htlc_response_time_ms, uptime_7d, observed_at, liquidity_scan_score,
                bidirectional_channels_ratio, liquid_channels_ratio
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)
            ON CONFLICT(channel_id) DO UPDATE SET
                peer_node_id=excluded.peer_node_id,
                capacity_sat=excluded.capacity_sat,
                local_balance_sat=excluded.local_balance_sat,
                remote_balance_sat=excluded.remote_balance_sat,
                status=excluded.status,
                age_days=excluded.age_days,
                forwards_7d_count=excluded.forwards_7d_count,
                forwards_7d_volume_sat=excluded.forwards_7d_volume_sat,
                success_rate_7d=excluded.success_rate_7d,
                revenue_7d_msat=excluded.revenue_7d_msat,
                htlc_response_time_ms=excluded.htlc_response_time_ms,
                uptime_7d=excluded.uptime_7d,
                observed_at=excluded.observed_at,
                liquidity_scan_score=excluded.liquidity_scan_score,
                bidirectional_channels_ratio=excluded.bidirectional_channels_ratio,
                liquid_channels_ratio=excluded.liquid_channels_ratio
            WHERE excluded.observed_at > metrics_latest.observed_at",
            params![
                m.channel_id,
                m.peer_node_id,
                m.capacity_sat as i64,
                m.local_balance_sat as i64,
                m.remote_balance_sat as i64,
                status_str(m.status),
                m.age_days,
                m.forwards_7d_count as i64,
                m.forwards_7d_volume_sat as i64,
                m.success_rate_7d,
                m.revenue_7d_msat as i64,
                m.htlc_response_time_ms.map(|v| v as i64),
                m.uptime_7d,
                m.observed_at,
                m.liquidity_scan_score,
                m.bidirectional_channels_ratio,
                m.liquid_channels_ratio,
            ],
        )?;
        Ok(())
    }
}

fn direction_str(d: Direction) -> &'static str {
    match d {
        Direction::Outgoing => "outgoing",
        Direction::Incoming => "incoming",
    }
}

fn status_str(s: ChannelStatus) -> &'static str {
    match s {
        ChannelStatus::Active => "active",
        ChannelStatus::Inactive => "inactive",
        ChannelStatus::Closing => "closing",
        ChannelStatus::Closed => "closed",
    }
}

fn parse_kind(s: &str) -> DecisionKind {
    match s {
        "INCREASE_FEES" => DecisionKind::IncreaseFees,
        "DECREASE_FEES" => DecisionKind::DecreaseFees,
        "CLOSE_CHANNEL" => DecisionKind::CloseChannel,
        "REBALANCE" => DecisionKind::Rebalance,
        _ => DecisionKind::NoAction,
    }
}

fn parse_status(s: &str) -> DecisionStatus {
    match s {
        "approved" => DecisionStatus::Approved,
        "rejected" => DecisionStatus::Rejected,
        "executed" => DecisionStatus::Executed,
        "failed" => DecisionStatus::Failed,
        "rolled_back" => DecisionStatus::RolledBack,
        "shadowed" => DecisionStatus::Shadowed,
        _ => DecisionStatus::Pending,
    }
}

fn row_to_decision(row: &rusqlite::Row) -> rusqlite::Result<Decision> {
    let proposed_policy = match row.get::<_, Option<i64>>("proposed_base_fee_msat")? {
        Some(base_fee) => Some(ChannelPolicy {
            channel_id: row.get("channel_id")?,
            direction: Direction::Outgoing,
            base_fee_msat: base_fee as u64,
            fee_rate_ppm: row.get::<_, i64>("proposed_fee_rate_ppm")? as u32,
            min_htlc_msat: row.get::<_, i64>("proposed_min_htlc_msat")? as u64,
            max_htlc_msat: row.get::<_, i64>("proposed_max_htlc_msat")? as u64,
            time_lock_delta: row.get::<_, i64>("proposed_time_lock_delta")? as u32,
            disabled: row.get("proposed_disabled")?,
            version: 0,
        }),
        None => None,
    };

    let transaction_id: Option<String> = row.get("transaction_id")?;
    let decision_id: String = row.get("decision_id")?;

    Ok(Decision {
        decision_id: Uuid::parse_str(&decision_id).unwrap_or_else(|_| Uuid::nil()),
        tick_id: row.get::<_, i64>("tick_id")? as u64,
        channel_id: row.get("channel_id")?,
        kind: parse_kind(&row.get::<_, String>("kind")?),
        confidence: row.get("confidence")?,
        proposed_policy,
        prior_policy_version: row.get::<_, i64>("prior_policy_version")? as u64,
        reason: DecisionReason {
            rule_id: leak_rule_id(row.get::<_, String>("rule_id")?),
            detail: row.get("reason_detail")?,
        },
        created_at: row.get("created_at")?,
        status: parse_status(&row.get::<_, String>("status")?),
        execution_result: row.get("execution_result")?,
        transaction_id: transaction_id.and_then(|t| Uuid::parse_str(&t).ok()),
    })
}

/// `DecisionReason.rule_id` is `&'static str` in memory; rows read back from
/// storage are matched against the known rule identifiers instead of leaking
/// arbitrary strings.
fn leak_rule_id(s: String) -> &'static str {
    const KNOWN: &[&str] = &[
        "stale_or_inactive",
        "cooldown",
        "close_underperforming",
        "increase_local_heavy",
        "decrease_remote_heavy",
        "increase_sustained_low_perf",
        "no_action",
        "clamped_to_identity",
    ];
    KNOWN.iter().find(|k| **k == s).copied().unwrap_or("unknown")
}

fn row_to_backup(row: &rusqlite::Row) -> rusqlite::Result<PolicyBackup> {
    let direction = match row.get::<_, String>("direction")?.as_str() {
        "incoming" => Direction::Incoming,
        _ => Direction::Outgoing,
    };
    let policy = ChannelPolicy {
        channel_id: row.get("channel_id")?,
        direction,
        base_fee_msat: row.get::<_, i64>("base_fee_msat")? as u64,
        fee_rate_ppm: row.get::<_, i64>("fee_rate_ppm")? as u32,
        min_htlc_msat: row.get::<_, i64>("min_htlc_msat")? as u64,
        max_htlc_msat: row.get::<_, i64>("max_htlc_msat")? as u64,
        time_lock_delta: row.get::<_, i64>("time_lock_delta")? as u32,
        disabled: row.get("disabled")?,
        version: row.get::<_, i64>("version")? as u64,
    };
    Ok(PolicyBackup {
        backup_id: Uuid::parse_str(&row.get::<_, String>("backup_id")?).unwrap_or_else(|_| Uuid::nil()),
        channel_id: policy.channel_id.clone(),
        policy,
        created_at: row.get("created_at")?,
        expires_at: row.get("expires_at")?,
        transaction_id: Uuid::parse_str(&row.get::<_, String>("transaction_id")?).unwrap_or_else(|_| Uuid::nil()),
    })
}

const SCHEMA: &str = r#"
-- Full decision history, indexed by (channel_id, created_at) and by status.
CREATE TABLE IF NOT EXISTS decisions (
    decision_id TEXT NOT NULL PRIMARY KEY,
    tick_id INTEGER NOT NULL,
    channel_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    confidence REAL NOT NULL,
    proposed_base_fee_msat INTEGER,
    proposed_fee_rate_ppm INTEGER,
    proposed_min_htlc_msat INTEGER,
    proposed_max_htlc_msat INTEGER,
    proposed_time_lock_delta INTEGER,
    proposed_disabled INTEGER,
    prior_policy_version INTEGER NOT NULL,
    rule_id TEXT NOT NULL,
    reason_detail TEXT NOT NULL,
    created_at REAL NOT NULL,
    status TEXT NOT NULL,
    execution_result TEXT,
    transaction_id TEXT
);
CREATE INDEX IF NOT EXISTS idx_decisions_channel_created
    ON decisions(channel_id, created_at);
CREATE INDEX IF NOT EXISTS idx_decisions_status
    ON decisions(status);
CREATE UNIQUE INDEX IF NOT EXISTS idx_decisions_channel_tick
    ON decisions(channel_id, tick_id);

-- Policy backups, indexed by transaction_id and channel_id; TTL-expired.
CREATE TABLE IF NOT EXISTS policy_backups (
    backup_id TEXT NOT NULL PRIMARY KEY,
    channel_id TEXT NOT NULL,
    direction TEXT NOT NULL,
    base_fee_msat INTEGER NOT NULL,
    fee_rate_ppm INTEGER NOT NULL,
    min_htlc_msat INTEGER NOT NULL,
    max_htlc_msat INTEGER NOT NULL,
    time_lock_delta INTEGER NOT NULL,
    disabled INTEGER NOT NULL,
    version INTEGER NOT NULL,
    created_at REAL NOT NULL,
    expires_at REAL NOT NULL,
    transaction_id TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_backups_channel
    ON policy_backups(channel_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_backups_transaction
    ON policy_backups(transaction_id);

-- Channels the Policy Executor has marked do-not-touch after an
-- unrecoverable rollback failure (spec.md §4.6).
CREATE TABLE IF NOT EXISTS do_not_touch (
    channel_id TEXT NOT NULL PRIMARY KEY,
    reason TEXT NOT NULL,
    set_at REAL NOT NULL
);

-- Weights versions, newest wins (spec.md §4.8).
CREATE TABLE IF NOT EXISTS weights_versions (
    version INTEGER NOT NULL PRIMARY KEY,
    response_time REAL NOT NULL,
    liquidity_balance REAL NOT NULL,
    routing_success REAL NOT NULL,
    revenue_efficiency REAL NOT NULL,
    liquidity_scan REAL NOT NULL,
    activated_at REAL NOT NULL
);

-- Operator-issued `set-mode` override (spec.md §6); read once at startup.
CREATE TABLE IF NOT EXISTS safety_mode (
    id INTEGER NOT NULL PRIMARY KEY,
    mode TEXT NOT NULL,
    set_at REAL NOT NULL
);

-- First-observed timestamp per channel, for deriving age_days on ingest
-- (spec.md §3: "age_days"; self-observable, not an external-scraper field).
CREATE TABLE IF NOT EXISTS channel_first_seen (
    channel_id TEXT NOT NULL PRIMARY KEY,
    first_seen_at REAL NOT NULL
);

-- Durable snapshot of the latest ChannelMetrics per channel, for crash
-- recovery (the in-memory Metric Store is the hot path).
CREATE TABLE IF NOT EXISTS metrics_latest (
    channel_id TEXT NOT NULL PRIMARY KEY,
    peer_node_id TEXT NOT NULL,
    capacity_sat INTEGER NOT NULL,
    local_balance_sat INTEGER NOT NULL,
    remote_balance_sat INTEGER NOT NULL,
    status TEXT NOT NULL,
    age_days REAL NOT NULL,
    forwards_7d_count INTEGER NOT NULL,
    forwards_7d_volume_sat INTEGER NOT NULL,
    success_rate_7d REAL NOT NULL,
    revenue_7d_msat INTEGER NOT NULL,
    htlc_response_time_ms INTEGER,
    uptime_7d REAL NOT NULL,
    observed_at REAL NOT NULL,
    liquidity_scan_score REAL,
    bidirectional_channels_ratio REAL NOT NULL,
    liquid_channels_ratio REAL NOT NULL
);
"#;
