//! Bot configuration: a YAML file for strategy/risk/ops settings and
//! environment variables for exchange credentials.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use strum::{Display, EnumString};

use crate::error::ConfigError;

/// Top-level bot configuration loaded from YAML.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Operational settings shared by every bot.
    #[serde(default)]
    pub ops: OpsConfig,
    /// Ladder parameters (quoting bot only).
    #[serde(default)]
    pub quoting: Option<QuotingConfig>,
    /// Inventory limits (quoting bot only).
    #[serde(default)]
    pub inventory: Option<InventoryConfig>,
    /// EV caps (risk bot only).
    #[serde(default)]
    pub risk: Option<RiskConfig>,
}

/// Operational settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OpsConfig {
    /// Record orders without sending them.
    #[serde(default = "default_true")]
    pub dry_run: bool,
    /// Directory holding `orders/` and `open_orders.json`.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Optional JSON log file.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// Seconds between ticks.
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
    /// Routed market selection consumed by the quoting bot.
    #[serde(default)]
    pub selected_markets_path: Option<PathBuf>,
    /// Risk snapshot consumed by the quoting bot.
    #[serde(default)]
    pub risk_actions_path: Option<PathBuf>,
    /// Where the risk bot writes its snapshot.
    #[serde(default)]
    pub actions_dir: Option<PathBuf>,
    /// Bot directories (under `local_state_root`) the risk bot watches.
    #[serde(default = "default_monitor_bots")]
    pub monitor_bots: Vec<String>,
    /// Root of per-bot state directories.
    #[serde(default = "default_local_state_root")]
    pub local_state_root: PathBuf,
    /// Exchange pacing.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Exchange retry budget.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Price band relative to exchange fair value.
    #[serde(default)]
    pub price_band: PriceBandConfig,
    /// Granularity of the idempotency bucket.
    #[serde(default)]
    pub time_bucket: TimeBucket,
    /// Extra attempts for a tick that fails as a whole.
    #[serde(default)]
    pub max_tick_retries: u32,
    /// How long `stop` waits for an in-flight tick.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_seconds: u64,
    /// Port for the health/metrics API. Disabled when unset.
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            state_dir: default_state_dir(),
            log_path: None,
            tick_seconds: default_tick_seconds(),
            selected_markets_path: None,
            risk_actions_path: None,
            actions_dir: None,
            monitor_bots: default_monitor_bots(),
            local_state_root: default_local_state_root(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            price_band: PriceBandConfig::default(),
            time_bucket: TimeBucket::default(),
            max_tick_retries: 0,
            stop_timeout_seconds: default_stop_timeout(),
            metrics_port: None,
        }
    }
}

impl OpsConfig {
    /// Interval between ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_seconds)
    }

    /// Snapshot directory for the risk bot.
    pub fn actions_dir(&self) -> PathBuf {
        self.actions_dir
            .clone()
            .unwrap_or_else(|| self.state_dir.join("actions"))
    }
}

/// Minimum spacing between exchange calls.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum seconds between two exchange submissions.
    #[serde(default)]
    pub min_interval_seconds: f64,
    /// Upper bound of random extra delay.
    #[serde(default)]
    pub jitter_ms: u64,
}

/// Retry budget for exchange calls.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff base; attempt n sleeps `base * 2^(n-1)`.
    #[serde(default)]
    pub base_sleep_seconds: f64,
    /// Upper bound of random extra delay.
    #[serde(default)]
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_sleep_seconds: 0.0,
            jitter_ms: 0,
        }
    }
}

/// Price band settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceBandConfig {
    /// Maximum distance from the exchange fair value. No check when unset.
    #[serde(default)]
    pub max_bps_from_mid: Option<Decimal>,
}

/// Granularity of the client-order-id time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TimeBucket {
    /// One id per minute.
    #[default]
    Minute,
    /// One id per hour.
    Hour,
}

impl TimeBucket {
    /// Format a timestamp into its bucket key.
    pub fn key(&self, at: chrono::DateTime<chrono::Utc>) -> String {
        match self {
            TimeBucket::Minute => at.format("%Y%m%d%H%M").to_string(),
            TimeBucket::Hour => at.format("%Y%m%d%H").to_string(),
        }
    }
}

/// Ladder construction parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct QuotingConfig {
    /// Levels on each side of fair value.
    pub levels_per_side: usize,
    /// Distance between consecutive levels.
    pub level_spacing_cents: u32,
    /// Target half-spread of the top level.
    pub base_spread_cents: u32,
    /// Floor on the top-level half-spread.
    pub min_spread_cents: u32,
    /// Fair value shift per unit of inventory ratio.
    #[serde(default)]
    pub skew_k: Decimal,
    /// Size of each side's best level.
    pub clip_usdc_top: Decimal,
    /// Size of deeper levels.
    pub clip_usdc_deep: Decimal,
    /// Extra distance applied on a WIDEN verdict.
    #[serde(default = "default_widen_addon")]
    pub widen_addon_cents: u32,
    /// Requote live orders older than this.
    #[serde(default)]
    pub refresh_ttl_seconds: Option<u64>,
}

/// Inventory limits for the quoting bot.
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryConfig {
    /// Cap on planned notional per market.
    pub per_market_ev_cap: Decimal,
}

/// Risk caps for the risk bot.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Per-market absolute EV cap.
    pub per_market_ev_cap: Decimal,
    /// Aggregate absolute EV cap.
    pub global_ev_cap: Decimal,
    /// Adverse fair-value move that triggers WIDEN.
    pub fast_move_cents: Decimal,
}

fn default_true() -> bool {
    true
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("local_state/market_maker")
}

fn default_tick_seconds() -> u64 {
    60
}

fn default_monitor_bots() -> Vec<String> {
    vec!["market_maker".to_string()]
}

fn default_local_state_root() -> PathBuf {
    PathBuf::from("local_state")
}

fn default_max_attempts() -> u32 {
    1
}

fn default_stop_timeout() -> u64 {
    5
}

fn default_widen_addon() -> u32 {
    1
}

impl BotConfig {
    /// Read and parse a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse a YAML document.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Quoting parameters, required by the quoting bot.
    pub fn quoting(&self) -> Result<&QuotingConfig, ConfigError> {
        self.quoting.as_ref().ok_or(ConfigError::Missing("quoting"))
    }

    /// Inventory limits, required by the quoting bot.
    pub fn inventory(&self) -> Result<&InventoryConfig, ConfigError> {
        self.inventory.as_ref().ok_or(ConfigError::Missing("inventory"))
    }

    /// Risk caps, required by the risk bot.
    pub fn risk(&self) -> Result<&RiskConfig, ConfigError> {
        self.risk.as_ref().ok_or(ConfigError::Missing("risk"))
    }

    /// Check the settings every bot relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ops = &self.ops;
        if ops.tick_seconds == 0 {
            return invalid("ops.tick_seconds", "must be at least 1");
        }
        non_negative_secs("ops.rate_limit.min_interval_seconds", ops.rate_limit.min_interval_seconds)?;
        non_negative_secs("ops.retry.base_sleep_seconds", ops.retry.base_sleep_seconds)?;
        if ops.retry.max_attempts == 0 {
            return invalid("ops.retry.max_attempts", "must be at least 1");
        }
        if let Some(max_bps) = ops.price_band.max_bps_from_mid {
            if max_bps < Decimal::ZERO {
                return invalid("ops.price_band.max_bps_from_mid", "must be non-negative");
            }
        }
        Ok(())
    }

    /// Validate the sections the quoting bot needs.
    pub fn validate_quoting(&self) -> Result<(), ConfigError> {
        self.validate()?;
        let quoting = self.quoting()?;
        if quoting.clip_usdc_top < Decimal::ZERO || quoting.clip_usdc_deep < Decimal::ZERO {
            return invalid("quoting.clip_usdc_*", "sizes must be non-negative");
        }
        let inventory = self.inventory()?;
        if inventory.per_market_ev_cap <= Decimal::ZERO {
            return invalid("inventory.per_market_ev_cap", "must be positive");
        }
        Ok(())
    }

    /// Validate the sections the risk bot needs.
    pub fn validate_risk(&self) -> Result<(), ConfigError> {
        self.validate()?;
        let risk = self.risk()?;
        if risk.per_market_ev_cap <= Decimal::ZERO {
            return invalid("risk.per_market_ev_cap", "must be positive");
        }
        if risk.global_ev_cap <= Decimal::ZERO {
            return invalid("risk.global_ev_cap", "must be positive");
        }
        Ok(())
    }
}

fn invalid<T>(key: &'static str, reason: &str) -> Result<T, ConfigError> {
    Err(ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    })
}

fn non_negative_secs(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return invalid(key, "must be a non-negative number of seconds");
    }
    Ok(())
}

/// Exchange credentials loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeEnv {
    /// Wallet private key (hex, starts with 0x). Live mode only.
    #[serde(default)]
    pub polymarket_private_key: Option<String>,

    /// Signature type: 0=EOA, 1=Magic.link, 2=Gnosis Safe.
    #[serde(default)]
    pub polymarket_signature_type: u8,

    /// CLOB API base URL.
    #[serde(default = "default_clob_url")]
    pub polymarket_clob_url: String,

    /// HTTP request timeout.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}

fn default_http_timeout_ms() -> u64 {
    5_000
}

impl ExchangeEnv {
    /// Load from environment, reading .env file first.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Ok(envy::from_env()?)
    }

    /// Private key, required for live trading.
    pub fn private_key(&self) -> Result<&str, ConfigError> {
        let key = self
            .polymarket_private_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::Missing("POLYMARKET_PRIVATE_KEY"))?;
        if !key.starts_with("0x") {
            return invalid("POLYMARKET_PRIVATE_KEY", "must start with 0x");
        }
        Ok(key)
    }
}
