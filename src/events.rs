//! Structured event stream (spec.md §6: "per Decision state transition, per
//! apply/rollback outcome, per safety-envelope clamp, per scheduler lag").
//! Emitted through `log` with a stable set of fields so an operator can wire
//! up a structured-log sink without touching this crate.

use log::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

pub fn decision_transition(decision_id: Uuid, channel_id: &str, kind: &str, status: &str, severity: Severity) {
    let line = format!(
        "decision_id={} channel_id={} kind={} status={}",
        decision_id, channel_id, kind, status
    );
    emit(severity, &line);
}

pub fn apply_outcome(transaction_id: Uuid, channel_id: &str, outcome: &str, severity: Severity) {
    let line = format!("transaction_id={} channel_id={} apply_outcome={}", transaction_id, channel_id, outcome);
    emit(severity, &line);
}

pub fn rollback_outcome(transaction_id: Uuid, channel_id: &str, outcome: &str, severity: Severity) {
    let line = format!("transaction_id={} channel_id={} rollback_outcome={}", transaction_id, channel_id, outcome);
    emit(severity, &line);
}

pub fn envelope_clamp(channel_id: &str, field: &str, requested: &str, clamped: &str) {
    let line = format!("channel_id={} envelope_clamp field={} requested={} clamped={}", channel_id, field, requested, clamped);
    emit(Severity::Info, &line);
}

pub fn scheduler_lag(kind: &str, lag_ms: u128) {
    let line = format!("scheduler_lag kind={} lag_ms={}", kind, lag_ms);
    emit(Severity::Warning, &line);
}

fn emit(severity: Severity, line: &str) {
    match severity {
        Severity::Info => info!("{}", line),
        Severity::Warning => warn!("{}", line),
        Severity::Critical => error!("{}", line),
    }
}
