use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::model::{SafetyEnvelope, SafetyMode};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub weights: WeightsConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Node API endpoint (scheme + host:port).
    pub base_url: String,
    /// Bearer credential for the node API, read once at startup.
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Control tick interval, in [60, 86400] seconds (spec.md §4.1).
    #[serde(default = "default_tick_interval")]
    pub tick_interval_seconds: u64,
    /// Weight update cadence, default 24h (spec.md §4.1).
    #[serde(default = "default_weight_update_interval")]
    pub weight_update_interval_seconds: u64,
    /// Metric freshness TTL for get_fresh (spec.md §4.2).
    #[serde(default = "default_metric_max_age_seconds")]
    pub metric_max_age_seconds: u64,
    /// Bounded worker pool for per-channel execution fan-out (spec.md §5).
    #[serde(default = "default_execution_workers")]
    pub execution_workers: usize,
    /// Grace period for hard kill on shutdown (spec.md §5).
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
}

#[derive(Debug, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_base_fee_min")]
    pub base_fee_msat_min: u64,
    #[serde(default = "default_base_fee_max")]
    pub base_fee_msat_max: u64,
    #[serde(default = "default_fee_rate_min")]
    pub fee_rate_ppm_min: u32,
    #[serde(default = "default_fee_rate_max")]
    pub fee_rate_ppm_max: u32,
    #[serde(default = "default_max_fee_change_pct")]
    pub max_fee_change_pct: f64,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u64,
    #[serde(default = "default_max_channels_per_tick")]
    pub max_channels_per_tick: usize,
    /// shadow | canary | active
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub canary_channel_whitelist: Vec<String>,
    #[serde(default)]
    pub dry_run_override: bool,
    #[serde(default = "default_true")]
    pub require_close_confirmation: bool,
}

#[derive(Debug, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_close_threshold")]
    pub close_threshold: f64,
    #[serde(default = "default_low_perf_threshold")]
    pub low_perf_threshold: f64,
}

#[derive(Debug, Deserialize)]
pub struct DecisionConfig {
    #[serde(default = "default_min_age_days_for_close")]
    pub min_age_days_for_close: f64,
    #[serde(default = "default_low_perf_sustain_hours")]
    pub low_perf_sustain_hours: f64,
}

#[derive(Debug, Deserialize)]
pub struct WeightsConfig {
    #[serde(default = "default_weight_update_window_days")]
    pub update_window_days: u64,
    #[serde(default = "default_weak_signal_threshold")]
    pub weak_signal_threshold: f64,
    #[serde(default = "default_max_step")]
    pub max_step: f64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("lnopt.db")
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_tick_interval() -> u64 {
    900 // 15 minutes
}
fn default_weight_update_interval() -> u64 {
    86_400 // 24 hours
}
fn default_metric_max_age_seconds() -> u64 {
    1800 // 30 minutes
}
fn default_execution_workers() -> usize {
    4
}
fn default_shutdown_grace_seconds() -> u64 {
    60
}
fn default_base_fee_min() -> u64 {
    0
}
fn default_base_fee_max() -> u64 {
    5000
}
fn default_fee_rate_min() -> u32 {
    0
}
fn default_fee_rate_max() -> u32 {
    5000
}
fn default_max_fee_change_pct() -> f64 {
    50.0
}
fn default_cooldown_minutes() -> u64 {
    60
}
fn default_max_channels_per_tick() -> usize {
    10
}
fn default_mode() -> String {
    "shadow".to_string()
}
fn default_close_threshold() -> f64 {
    20.0
}
fn default_low_perf_threshold() -> f64 {
    40.0
}
fn default_min_age_days_for_close() -> f64 {
    30.0
}
fn default_low_perf_sustain_hours() -> f64 {
    48.0
}
fn default_weight_update_window_days() -> u64 {
    14
}
fn default_weak_signal_threshold() -> f64 {
    0.05
}
fn default_max_step() -> f64 {
    0.3
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            log_level: default_log_level(),
            enabled: true,
            tick_interval_seconds: default_tick_interval(),
            weight_update_interval_seconds: default_weight_update_interval(),
            metric_max_age_seconds: default_metric_max_age_seconds(),
            execution_workers: default_execution_workers(),
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
        }
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            base_fee_msat_min: default_base_fee_min(),
            base_fee_msat_max: default_base_fee_max(),
            fee_rate_ppm_min: default_fee_rate_min(),
            fee_rate_ppm_max: default_fee_rate_max(),
            max_fee_change_pct: default_max_fee_change_pct(),
            cooldown_minutes: default_cooldown_minutes(),
            max_channels_per_tick: default_max_channels_per_tick(),
            mode: default_mode(),
            canary_channel_whitelist: Vec::new(),
            dry_run_override: false,
            require_close_confirmation: true,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            close_threshold: default_close_threshold(),
            low_perf_threshold: default_low_perf_threshold(),
        }
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            min_age_days_for_close: default_min_age_days_for_close(),
            low_perf_sustain_hours: default_low_perf_sustain_hours(),
        }
    }
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            update_window_days: default_weight_update_window_days(),
            weak_signal_threshold: default_weak_signal_threshold(),
            max_step: default_max_step(),
        }
    }
}

impl SafetyConfig {
    pub fn to_envelope(&self) -> anyhow::Result<SafetyEnvelope> {
        let mode = SafetyMode::parse(&self.mode)
            .ok_or_else(|| anyhow::anyhow!("unknown safety mode: {}", self.mode))?;
        Ok(SafetyEnvelope {
            base_fee_msat_min: self.base_fee_msat_min,
            base_fee_msat_max: self.base_fee_msat_max,
            fee_rate_ppm_min: self.fee_rate_ppm_min,
            fee_rate_ppm_max: self.fee_rate_ppm_max,
            max_fee_change_pct: self.max_fee_change_pct,
            cooldown_minutes: self.cooldown_minutes,
            max_channels_per_tick: self.max_channels_per_tick,
            mode,
            canary_channel_whitelist: self.canary_channel_whitelist.clone(),
            dry_run_override: self.dry_run_override,
            require_close_confirmation: self.require_close_confirmation,
        })
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config at {}: {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        const ABS_MIN_TICK_SECS: u64 = 60;
        const ABS_MAX_TICK_SECS: u64 = 86_400;
        const ABS_MAX_FEE_PPM: u32 = 100_000;
        const ABS_MAX_CHANNELS_PER_TICK: usize = 500;

        if self.general.tick_interval_seconds < ABS_MIN_TICK_SECS
            || self.general.tick_interval_seconds > ABS_MAX_TICK_SECS
        {
            anyhow::bail!(
                "tick_interval_seconds ({}) must be within [{}, {}]",
                self.general.tick_interval_seconds,
                ABS_MIN_TICK_SECS,
                ABS_MAX_TICK_SECS
            );
        }
        if self.safety.fee_rate_ppm_max > ABS_MAX_FEE_PPM {
            anyhow::bail!(
                "fee_rate_ppm_max ({}) above absolute maximum ({})",
                self.safety.fee_rate_ppm_max,
                ABS_MAX_FEE_PPM
            );
        }
        if self.safety.fee_rate_ppm_min > self.safety.fee_rate_ppm_max {
            anyhow::bail!("fee_rate_ppm_min > fee_rate_ppm_max");
        }
        if self.safety.base_fee_msat_min > self.safety.base_fee_msat_max {
            anyhow::bail!("base_fee_msat_min > base_fee_msat_max");
        }
        if self.safety.max_channels_per_tick > ABS_MAX_CHANNELS_PER_TICK {
            anyhow::bail!(
                "max_channels_per_tick ({}) above absolute maximum ({})",
                self.safety.max_channels_per_tick,
                ABS_MAX_CHANNELS_PER_TICK
            );
        }
        if self.safety.max_fee_change_pct <= 0.0 {
            anyhow::bail!("max_fee_change_pct must be positive");
        }
        if SafetyMode::parse(&self.safety.mode).is_none() {
            anyhow::bail!("safety.mode must be one of shadow, canary, active");
        }
        if self.weights.max_step <= 0.0 || self.weights.max_step > 1.0 {
            anyhow::bail!("weights.max_step must be in (0, 1]");
        }

        Ok(())
    }

    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            server: ServerConfig {
                base_url: "http://localhost:9999".to_string(),
                api_key: "deadbeef".to_string(),
            },
            general: GeneralConfig::default(),
            safety: SafetyConfig::default(),
            scoring: ScoringConfig::default(),
            decision: DecisionConfig::default(),
            weights: WeightsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_defaults_pass() {
        let config = Config::test_default();
        assert!(config.validate().is_ok(), "{}", config.validate().unwrap_err());
    }

    #[test]
    fn test_validate_tick_interval_out_of_range() {
        let mut config = Config::test_default();
        config.general.tick_interval_seconds = 10;
        assert!(config.validate().is_err());
        config.general.tick_interval_seconds = 100_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_fee_rate_ppm_too_high() {
        let mut config = Config::test_default();
        config.safety.fee_rate_ppm_max = 200_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fee_rate_ppm_max"));
    }

    #[test]
    fn test_validate_fee_range_inverted() {
        let mut config = Config::test_default();
        config.safety.fee_rate_ppm_min = 1000;
        config.safety.fee_rate_ppm_max = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_unknown_mode() {
        let mut config = Config::test_default();
        config.safety.mode = "bogus".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_envelope() {
        let config = Config::test_default();
        let env = config.safety.to_envelope().unwrap();
        assert_eq!(env.cooldown_minutes, 60);
    }

    #[test]
    fn test_toml_deserialize_minimal() {
        let toml_str = r#"
[server]
base_url = "http://localhost:9999"
api_key = "deadbeef"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.base_url, "http://localhost:9999");
        assert_eq!(config.safety.mode, "shadow");
        assert_eq!(config.general.tick_interval_seconds, 900);
        assert_eq!(config.safety.cooldown_minutes, 60);
    }
}
