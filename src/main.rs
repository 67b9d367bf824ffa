#![allow(dead_code)]

mod client;
mod config;
mod db;
mod decision;
mod events;
mod executor;
mod ingest;
mod metrics;
mod model;
mod scheduler;
mod scoring;
mod weight_updater;

use clap::{Parser, Subcommand};
use config::Config;
use futures::stream::{self, StreamExt};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use uuid::Uuid;

use client::{HttpNodeClient, NodeClient};
use db::Database;
use decision::{ChannelContext, DecisionHistoryEntry, DecisionThresholds};
use executor::{ChannelLocks, ExecutionAborted, PolicyExecutor};
use model::{ChannelPolicy, Direction, SafetyMode};
use scheduler::{Scheduler, TickKind};
use weight_updater::{SubScoreKind, WeightSample};

#[derive(Parser)]
#[command(name = "lnopt", about = "Fee and liquidity autopilot for a Lightning node")]
struct Cli {
    /// Path to lnopt.toml config file
    #[arg(short, long, default_value = "lnopt.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as a background daemon (default)
    Run,
    /// Reverse a previously applied mutation by its transaction id
    Rollback {
        #[arg(long)]
        transaction_id: Uuid,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Print shadowed decisions since a given unix timestamp
    ShadowReport {
        #[arg(long, default_value_t = 0.0)]
        since: f64,
    },
    /// Change the safety mode; moving to `active` requires --confirm
    SetMode {
        mode: String,
        #[arg(long)]
        confirm: bool,
    },
    /// Operator clears a channel marked do-not-touch after a failed rollback
    /// (spec.md §4.6: "do-not-touch until operator clears")
    ClearDoNotTouch {
        channel_id: String,
    },
}

fn now_unix() -> f64 {
    chrono::Utc::now().timestamp() as f64
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {:#}", e);
            std::process::exit(1);
        }
    };

    env_logger::Builder::new()
        .filter_level(config.general.log_level.parse().unwrap_or(log::LevelFilter::Info))
        .format_timestamp_secs()
        .init();

    info!("lnopt v{} starting", env!("CARGO_PKG_VERSION"));

    if !config.general.enabled {
        warn!("general.enabled is false -- exiting");
        return Ok(());
    }

    let mut config = config;
    let db = match Database::open(&config.general.database_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("persistence error: {:#}", e);
            std::process::exit(2);
        }
    };

    // An operator-issued `set-mode` (spec.md §6) overrides the TOML default
    // from here on; the config file on disk is left untouched.
    match db.get_safety_mode() {
        Ok(Some(persisted)) if SafetyMode::parse(&persisted).is_some() => {
            info!("safety mode overridden by persisted operator setting: {}", persisted);
            config.safety.mode = persisted;
        }
        Ok(Some(unknown)) => warn!("ignoring unrecognized persisted safety mode: {}", unknown),
        Ok(None) => {}
        Err(e) => warn!("failed to read persisted safety mode: {:#}", e),
    }

    let config = Arc::new(config);
    let client = HttpNodeClient::new(&config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config, client, db).await,
        Commands::Rollback { transaction_id, reason } => cmd_rollback(&client, &db, transaction_id, reason).await,
        Commands::ShadowReport { since } => cmd_shadow_report(&db, since),
        Commands::SetMode { mode, confirm } => cmd_set_mode(&db, &mode, confirm),
        Commands::ClearDoNotTouch { channel_id } => cmd_clear_do_not_touch(&db, &channel_id),
    }
}

async fn run_daemon(config: Arc<Config>, client: impl NodeClient + 'static, db: Database) -> anyhow::Result<()> {
    info!("verifying node connectivity...");
    if let Err(e) = client.list_channels().await {
        error!("cannot reach node API: {}. aborting.", e);
        std::process::exit(3);
    }

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        info!("received shutdown signal, finishing in-flight work...");
        let _ = shutdown_tx.send(true);
    });

    let store = Arc::new(metrics::MetricStore::new());
    let locks = Arc::new(ChannelLocks::new());
    let scheduler = Arc::new(Scheduler::new());
    let client = Arc::new(client);
    let db = Arc::new(db);

    if db.active_weights()?.is_none() {
        db.insert_weights_version(&model::Weights::default_weights())?;
    }

    // Reconcile any Decisions left `pending` by a crash mid-tick before the
    // scheduler starts producing new ones (spec.md §7, Scenario F).
    let recovery_executor = PolicyExecutor { client: client.as_ref(), db: db.as_ref(), locks: locks.as_ref() };
    match recovery_executor.recover_pending().await {
        Ok(0) => {}
        Ok(n) => info!("startup recovery: reconciled {} orphaned decision(s)", n),
        Err(e) => error!("startup recovery failed: {:#}", e),
    }

    let control_period = scheduler::clamp_tick_interval(config.general.tick_interval_seconds);
    let weight_period = scheduler::clamp_tick_interval(config.general.weight_update_interval_seconds);

    let mut control_rx = shutdown_rx.clone();
    let control_task = {
        let config = config.clone();
        let client = client.clone();
        let db = db.clone();
        let store = store.clone();
        let locks = locks.clone();
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            let mut interval = scheduler.interval_for(control_period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let expected = now_unix();
                        if let Err(e) = run_control_tick(&config, client.as_ref(), &db, &store, &locks, &scheduler).await {
                            error!("control tick error: {:#}", e);
                        }
                        scheduler.record_lag(TickKind::Control, control_period, std::time::Duration::from_secs_f64((now_unix() - expected).max(0.0)));
                    }
                    _ = control_rx.changed() => {
                        if *control_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    };

    let mut weight_rx = shutdown_rx.clone();
    let weight_task = {
        let config = config.clone();
        let db = db.clone();
        let store = store.clone();
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            let mut interval = scheduler.interval_for(weight_period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = run_weight_update(&config, &db, &store).await {
                            error!("weight update error: {:#}", e);
                        }
                    }
                    _ = weight_rx.changed() => {
                        if *weight_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    };

    shutdown_rx.changed().await.ok();
    let grace = std::time::Duration::from_secs(config.general.shutdown_grace_seconds);
    let _ = tokio::time::timeout(grace, async {
        let _ = control_task.await;
        let _ = weight_task.await;
    })
    .await;

    info!("shutdown complete");
    Ok(())
}

/// Ingest -> score -> decide -> execute, for every channel the Metric Store
/// knows about (spec.md §5, the control loop's Execution phase).
async fn run_control_tick(
    config: &Config,
    client: &dyn NodeClient,
    db: &Database,
    store: &metrics::MetricStore,
    locks: &ChannelLocks,
    scheduler: &Scheduler,
) -> anyhow::Result<()> {
    let now = now_unix();
    let tick_id = scheduler.next_tick_id();

    if let Err(e) = ingest::refresh_metrics(client, store, db, now).await {
        warn!("metrics ingest failed this tick: {}", e);
    }

    let envelope = config.safety.to_envelope()?;
    let thresholds = DecisionThresholds {
        close_threshold: config.scoring.close_threshold,
        low_perf_threshold: config.scoring.low_perf_threshold,
        min_age_days_for_close: config.decision.min_age_days_for_close,
        low_perf_sustain_hours: config.decision.low_perf_sustain_hours,
    };
    let weights = db.active_weights()?.unwrap_or_else(model::Weights::default_weights);
    let snapshot = store.snapshot_for_tick();

    let mut decisions = Vec::with_capacity(snapshot.len());
    let mut scores_by_channel: std::collections::HashMap<String, f64> = std::collections::HashMap::with_capacity(snapshot.len());
    for (channel_id, m) in &snapshot {
        if db.is_do_not_touch(channel_id).unwrap_or(false) {
            continue;
        }

        let current_policy = match client.get_policy(channel_id).await {
            Ok(p) => ChannelPolicy {
                channel_id: channel_id.clone(),
                direction: Direction::Outgoing,
                base_fee_msat: p.base_fee_msat,
                fee_rate_ppm: p.fee_rate_ppm,
                min_htlc_msat: p.min_htlc_msat,
                max_htlc_msat: p.max_htlc_msat,
                time_lock_delta: p.time_lock_delta,
                disabled: p.disabled,
                version: p.version,
            },
            Err(e) => {
                warn!("channel {}: skipping tick, policy fetch failed: {}", channel_id, e);
                continue;
            }
        };

        let (fresh, stale) = store.get_fresh(channel_id, config.general.metric_max_age_seconds as f64, now).unwrap_or((m.clone(), true));
        let score = scoring::score_channel(channel_id, tick_id, Some(&fresh), Some(&current_policy), &weights, now, stale);

        let since = now - 30.0 * 86400.0;
        let history_rows = db.recent_decisions_for_channel(channel_id, since)?;
        let history: Vec<DecisionHistoryEntry> = history_rows
            .iter()
            .map(|d| DecisionHistoryEntry {
                kind: d.kind,
                created_at: d.created_at,
                status_is_executed_or_rolled_back: matches!(
                    d.status,
                    model::DecisionStatus::Executed | model::DecisionStatus::RolledBack
                ),
            })
            .collect();

        let ring = store.history(channel_id);
        let low_perf_sustained = sustained_low_performance(&ring, &thresholds, &weights);

        let ctx = ChannelContext {
            score: &score,
            status: fresh.status,
            current_policy: &current_policy,
            age_days: fresh.age_days,
            forwards_7d_count: fresh.forwards_7d_count,
            local_ratio: fresh.local_ratio(),
            low_perf_sustained,
            recent_history: &history,
        };

        scores_by_channel.insert(channel_id.clone(), score.total);
        decisions.push(decision::decide(tick_id, channel_id, &ctx, &envelope, &thresholds, now));
    }

    let db_ref = db;
    let decisions = decision::select_within_budget(
        decisions,
        envelope.max_channels_per_tick,
        |channel_id| scores_by_channel.get(channel_id).copied().unwrap_or(0.0),
        |channel_id| db_ref.last_executed_at(channel_id).ok().flatten(),
    );

    // Execution fans out per-channel mutations over a bounded worker pool
    // (spec.md §5, default 4); each mutation still serializes on its own
    // channel via `ChannelLocks` inside the executor. An authorization
    // failure anywhere aborts the rest of the tick's *new* mutations, while
    // mutations already in flight run to completion (spec.md §7).
    let executor = PolicyExecutor { client, db, locks };
    let aborted = Arc::new(AtomicBool::new(false));
    let workers = config.general.execution_workers.max(1);

    stream::iter(decisions)
        .map(|d| {
            let executor = &executor;
            let envelope = &envelope;
            let aborted = aborted.clone();
            async move {
                if aborted.load(Ordering::SeqCst) {
                    return;
                }
                if let Err(ExecutionAborted) = executor.process(d, envelope, now).await {
                    aborted.store(true, Ordering::SeqCst);
                }
            }
        })
        .buffer_unordered(workers)
        .collect::<Vec<()>>()
        .await;

    if aborted.load(Ordering::SeqCst) {
        error!("tick {}: execution aborted on authorization failure, remaining mutations were skipped", tick_id);
    }

    Ok(())
}

/// Watches if the last up-to-3 ring entries are all below the low-perf
/// threshold for long enough (spec.md §4.5, "low_perf_sustain_hours").
fn sustained_low_performance(ring: &[model::ChannelMetrics], thresholds: &DecisionThresholds, weights: &model::Weights) -> bool {
    if ring.len() < 2 {
        return false;
    }
    let window_start = ring.last().unwrap().observed_at - thresholds.low_perf_sustain_hours * 3600.0;
    let relevant: Vec<&model::ChannelMetrics> = ring.iter().filter(|m| m.observed_at >= window_start).collect();
    if relevant.is_empty() {
        return false;
    }
    relevant.iter().all(|m| {
        let score = scoring::score_channel(&m.channel_id, 0, Some(m), None, weights, m.observed_at, false);
        score.total < thresholds.low_perf_threshold
    }) && (relevant.last().unwrap().observed_at - relevant.first().unwrap().observed_at) >= thresholds.low_perf_sustain_hours * 3600.0 * 0.5
}

/// The ring-buffer entry in effect at or immediately before `decision_at`,
/// paired with the first entry at least 24h after it; `None` if the buffer
/// doesn't yet bracket that window (spec.md §4.8: "subsequent 24-h metric
/// deltas").
fn volume_delta_after(ring: &[model::ChannelMetrics], decision_at: f64) -> Option<f64> {
    let baseline = ring
        .iter()
        .filter(|m| m.observed_at <= decision_at)
        .max_by(|a, b| a.observed_at.partial_cmp(&b.observed_at).unwrap())?;
    let later = ring
        .iter()
        .filter(|m| m.observed_at >= decision_at + 86_400.0)
        .min_by(|a, b| a.observed_at.partial_cmp(&b.observed_at).unwrap())?;
    Some(later.forwards_7d_volume_sat as f64 - baseline.forwards_7d_volume_sat as f64)
}

/// Builds a window of executed-decision samples and recomputes weights on
/// the slower cadence (spec.md §4.8). The observed effect of each decision is
/// the change in `forwards_7d_volume_sat` between the metrics snapshot in
/// effect at decision time and the first snapshot at least 24h later, read
/// from the Metric Store's per-channel ring buffer.
async fn run_weight_update(config: &Config, db: &Database, store: &metrics::MetricStore) -> anyhow::Result<()> {
    let since = now_unix() - config.weights.update_window_days as f64 * 86400.0;
    let executed = db.decisions_since(since)?;

    let mut samples = Vec::new();
    for d in executed.iter().filter(|d| matches!(d.status, model::DecisionStatus::Executed)) {
        let kind = match d.reason.rule_id {
            "increase_local_heavy" | "decrease_remote_heavy" => SubScoreKind::LiquidityBalance,
            "increase_sustained_low_perf" => SubScoreKind::RevenueEfficiency,
            "close_underperforming" => SubScoreKind::RoutingSuccess,
            _ => continue,
        };
        let ring = store.history(&d.channel_id);
        let Some(volume_delta_sat) = volume_delta_after(&ring, d.created_at) else {
            continue;
        };
        samples.push(WeightSample {
            dominant_sub_score: kind,
            sub_score_value: d.confidence * 100.0,
            volume_delta_sat,
        });
    }

    let previous = db.active_weights()?.unwrap_or_else(model::Weights::default_weights);
    match weight_updater::compute_weight_correlations(&samples, config.weights.weak_signal_threshold) {
        Some(target) => {
            let now = now_unix();
            let updated = weight_updater::step_towards(&previous, target, config.weights.max_step, previous.version + 1, now);
            db.insert_weights_version(&updated)?;
            info!("weights updated to version {}", updated.version);
        }
        None => {
            info!("weight update skipped: correlation signal below weak_signal_threshold");
        }
    }

    Ok(())
}

async fn cmd_rollback(client: &impl NodeClient, db: &Database, transaction_id: Uuid, reason: Option<String>) -> anyhow::Result<()> {
    let locks = ChannelLocks::new();
    let executor = PolicyExecutor { client, db, locks: &locks };
    let outcome = executor.rollback(transaction_id).await?;
    info!("rollback {}: {} ({})", transaction_id, outcome, reason.unwrap_or_default());
    println!("{}", outcome);
    Ok(())
}

fn cmd_shadow_report(db: &Database, since: f64) -> anyhow::Result<()> {
    let counts = db.shadowed_counts_since(since)?;
    println!("Shadow report since {:.0}", since);
    println!("=========================");
    if counts.is_empty() {
        println!("no shadowed decisions in this window");
    }
    for (kind, count) in counts {
        println!("{:<20} {}", kind, count);
    }
    Ok(())
}

fn cmd_set_mode(db: &Database, mode: &str, confirm: bool) -> anyhow::Result<()> {
    let parsed = SafetyMode::parse(mode).ok_or_else(|| anyhow::anyhow!("unknown mode: {}", mode))?;
    if parsed == SafetyMode::Active && !confirm {
        anyhow::bail!("moving to active mode requires --confirm (spec.md §6: explicit operator confirmation)");
    }
    db.set_safety_mode(parsed.as_str(), now_unix())?;
    info!("safety mode persisted: {}", parsed.as_str());
    println!("mode set to {} (takes effect on next restart)", parsed.as_str());
    Ok(())
}

fn cmd_clear_do_not_touch(db: &Database, channel_id: &str) -> anyhow::Result<()> {
    db.clear_do_not_touch(channel_id)?;
    info!("channel {}: do-not-touch cleared by operator", channel_id);
    println!("cleared do-not-touch for channel {}", channel_id);
    Ok(())
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use client::mock::MockNodeClient;
    use client::RemotePolicy;

    fn test_config() -> Config {
        let mut config = Config::test_default();
        config.safety.mode = "active".to_string();
        config.safety.cooldown_minutes = 0;
        config
    }

    fn seed_policy(mock: MockNodeClient, channel_id: &str, fee_rate_ppm: u32) -> MockNodeClient {
        mock.with_policy(RemotePolicy {
            channel_id: channel_id.to_string(),
            base_fee_msat: 1000,
            fee_rate_ppm,
            min_htlc_msat: 1000,
            max_htlc_msat: 900_000_000,
            time_lock_delta: 40,
            disabled: false,
            version: 1,
        })
    }

    #[tokio::test]
    async fn shadow_mode_records_without_mutating() {
        let db = Database::open_in_memory().unwrap();
        let store = metrics::MetricStore::new();
        let locks = ChannelLocks::new();
        let scheduler = Scheduler::new();
        db.insert_weights_version(&model::Weights::default_weights()).unwrap();

        let mut config = test_config();
        config.safety.mode = "shadow".to_string();

        let mut mock = seed_policy(MockNodeClient::new(), "ch1", 200);
        mock.channels = vec![client::RemoteChannel {
            channel_id: "ch1".to_string(),
            peer_node_id: "peer1".to_string(),
            capacity_sat: 1_000_000,
            local_balance_sat: 950_000,
            remote_balance_sat: 50_000,
            status: client::RemoteChannelStatus::Active,
        }];

        run_control_tick(&config, &mock, &db, &store, &locks, &scheduler).await.unwrap();
        assert!(mock.apply_calls.lock().unwrap().is_empty());

        let since = now_unix() - 60.0;
        let decisions = db.decisions_since(since).unwrap();
        assert!(!decisions.is_empty());
    }

    #[tokio::test]
    async fn active_mode_applies_fee_increase_for_local_heavy_channel() {
        let db = Database::open_in_memory().unwrap();
        let store = metrics::MetricStore::new();
        let locks = ChannelLocks::new();
        let scheduler = Scheduler::new();
        db.insert_weights_version(&model::Weights::default_weights()).unwrap();

        let config = test_config();

        let mut mock = seed_policy(MockNodeClient::new(), "ch1", 200);
        mock.channels = vec![client::RemoteChannel {
            channel_id: "ch1".to_string(),
            peer_node_id: "peer1".to_string(),
            capacity_sat: 1_000_000,
            local_balance_sat: 950_000,
            remote_balance_sat: 50_000,
            status: client::RemoteChannelStatus::Active,
        }];

        run_control_tick(&config, &mock, &db, &store, &locks, &scheduler).await.unwrap();
        assert_eq!(mock.apply_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn do_not_touch_channel_is_skipped_entirely() {
        let db = Database::open_in_memory().unwrap();
        let store = metrics::MetricStore::new();
        let locks = ChannelLocks::new();
        let scheduler = Scheduler::new();
        db.insert_weights_version(&model::Weights::default_weights()).unwrap();
        db.mark_do_not_touch("ch1", "rollback failed", now_unix()).unwrap();

        let config = test_config();
        let mut mock = seed_policy(MockNodeClient::new(), "ch1", 200);
        mock.channels = vec![client::RemoteChannel {
            channel_id: "ch1".to_string(),
            peer_node_id: "peer1".to_string(),
            capacity_sat: 1_000_000,
            local_balance_sat: 950_000,
            remote_balance_sat: 50_000,
            status: client::RemoteChannelStatus::Active,
        }];

        run_control_tick(&config, &mock, &db, &store, &locks, &scheduler).await.unwrap();
        assert!(mock.apply_calls.lock().unwrap().is_empty());
        assert!(mock.get_policy("ch1").await.is_ok());
    }

    #[tokio::test]
    async fn no_channels_is_a_clean_noop_tick() {
        let db = Database::open_in_memory().unwrap();
        let store = metrics::MetricStore::new();
        let locks = ChannelLocks::new();
        let scheduler = Scheduler::new();
        db.insert_weights_version(&model::Weights::default_weights()).unwrap();

        let config = test_config();
        let mock = MockNodeClient::new();

        let result = run_control_tick(&config, &mock, &db, &store, &locks, &scheduler).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn rollback_restores_prior_policy_after_manual_invocation() {
        let db = Database::open_in_memory().unwrap();
        let store = metrics::MetricStore::new();
        let locks = ChannelLocks::new();
        let scheduler = Scheduler::new();
        db.insert_weights_version(&model::Weights::default_weights()).unwrap();

        let config = test_config();
        let mut mock = seed_policy(MockNodeClient::new(), "ch1", 200);
        mock.channels = vec![client::RemoteChannel {
            channel_id: "ch1".to_string(),
            peer_node_id: "peer1".to_string(),
            capacity_sat: 1_000_000,
            local_balance_sat: 950_000,
            remote_balance_sat: 50_000,
            status: client::RemoteChannelStatus::Active,
        }];

        run_control_tick(&config, &mock, &db, &store, &locks, &scheduler).await.unwrap();
        let applied = mock.apply_calls.lock().unwrap().clone();
        assert_eq!(applied.len(), 1);

        let since = now_unix() - 60.0;
        let executed = db
            .decisions_since(since)
            .unwrap()
            .into_iter()
            .find(|d| d.status == model::DecisionStatus::Executed)
            .unwrap();
        let txn = executed.transaction_id.unwrap();

        let executor = PolicyExecutor { client: &mock, db: &db, locks: &locks };
        let outcome = executor.rollback(txn).await.unwrap();
        assert_eq!(outcome, "rolled_back");

        let restored = mock.get_policy("ch1").await.unwrap();
        assert_eq!(restored.fee_rate_ppm, 200);
    }

    #[test]
    fn cmd_set_mode_persists_and_rejects_active_without_confirm() {
        let db = Database::open_in_memory().unwrap();
        assert!(cmd_set_mode(&db, "active", false).is_err());
        assert_eq!(db.get_safety_mode().unwrap(), None);

        cmd_set_mode(&db, "canary", false).unwrap();
        assert_eq!(db.get_safety_mode().unwrap(), Some("canary".to_string()));

        cmd_set_mode(&db, "active", true).unwrap();
        assert_eq!(db.get_safety_mode().unwrap(), Some("active".to_string()));
    }

    fn ring_metric(channel_id: &str, observed_at: f64, volume: u64) -> model::ChannelMetrics {
        model::ChannelMetrics {
            channel_id: channel_id.to_string(),
            peer_node_id: "peer".to_string(),
            capacity_sat: 1_000_000,
            local_balance_sat: 900_000,
            remote_balance_sat: 100_000,
            status: model::ChannelStatus::Active,
            age_days: 10.0,
            forwards_7d_count: 5,
            forwards_7d_volume_sat: volume,
            success_rate_7d: 0.9,
            revenue_7d_msat: 1000,
            htlc_response_time_ms: Some(400),
            uptime_7d: 0.99,
            observed_at,
            source_set: Default::default(),
            liquidity_scan_score: None,
            bidirectional_channels_ratio: 0.5,
            liquid_channels_ratio: 0.5,
        }
    }

    #[tokio::test]
    async fn weight_update_derives_volume_delta_from_metric_store_history() {
        let db = Database::open_in_memory().unwrap();
        let store = metrics::MetricStore::new();
        db.insert_weights_version(&model::Weights::default_weights()).unwrap();

        let decided_at = 1000.0;
        for (channel_id, confidence, before_volume, after_volume) in
            [("ch1", 0.9, 1000u64, 1500u64), ("ch2", 0.5, 1000u64, 100u64)]
        {
            let decision = model::Decision::new(
                1,
                channel_id.to_string(),
                model::DecisionKind::IncreaseFees,
                confidence,
                None,
                1,
                model::DecisionReason::new("increase_local_heavy", "local ratio high"),
                decided_at,
            );
            let mut executed = decision;
            executed.status = model::DecisionStatus::Executed;
            db.insert_decision(&executed).unwrap();

            store.upsert(ring_metric(channel_id, decided_at - 100.0, before_volume));
            store.upsert(ring_metric(channel_id, decided_at + 86_400.0 + 10.0, after_volume));
        }

        let config = test_config();
        run_weight_update(&config, &db, &store).await.unwrap();

        let updated = db.active_weights().unwrap().unwrap();
        assert_eq!(updated.version, 2);
    }
}
