//! File-driven risk monitor.
//!
//! Each tick reads every monitored bot's routed markets and order ledger,
//! nets BUY minus SELL size on each market's YES token, prices that position
//! at the market's fair value, and writes a [`RiskSnapshot`] for quoting bots
//! to act on.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::exposure::{compute_market_ev, decide_action, escalate_global, sum_global_ev, Action};
use super::snapshot::RiskSnapshot;
use crate::config::{BotConfig, RiskConfig};
use crate::error::{BotError, ConfigError, RiskError};
use crate::market::load_market_file;
use crate::metrics;
use crate::trading::Ledger;

/// Caps the monitor enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskLimits {
    /// Per-market absolute EV cap.
    pub per_market_ev_cap: Decimal,
    /// Aggregate absolute EV cap.
    pub global_ev_cap: Decimal,
    /// Adverse fair-value move, in cents, that triggers WIDEN.
    pub adverse_threshold_cents: Decimal,
}

impl TryFrom<&RiskConfig> for RiskLimits {
    type Error = RiskError;

    fn try_from(config: &RiskConfig) -> Result<Self, Self::Error> {
        if config.per_market_ev_cap <= Decimal::ZERO || config.global_ev_cap <= Decimal::ZERO {
            return Err(RiskError::Validation("limits must be positive".to_string()));
        }
        Ok(Self {
            per_market_ev_cap: config.per_market_ev_cap,
            global_ev_cap: config.global_ev_cap,
            adverse_threshold_cents: config.fast_move_cents,
        })
    }
}

/// Net YES position of one market, summed across monitored bots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketExposure {
    /// Market id.
    pub market_id: String,
    /// Fair value of the YES token.
    pub fair_value: Decimal,
    /// BUY minus SELL size on the YES token.
    pub position_yes: Decimal,
}

/// Adverse fair-value move in cents since `previous`.
///
/// Long positions are hurt by falls, short ones by rises. A flat book
/// treats a move in either direction as adverse.
pub fn adverse_move_cents(previous: Option<Decimal>, current: Decimal, position_yes: Decimal) -> Decimal {
    let Some(previous) = previous else {
        return Decimal::ZERO;
    };
    let delta = (current - previous) * dec!(100);
    let adverse = if position_yes > Decimal::ZERO {
        -delta
    } else if position_yes < Decimal::ZERO {
        delta
    } else {
        delta.abs()
    };
    adverse.max(Decimal::ZERO)
}

/// Compute a fresh snapshot from exposures.
///
/// Each market is judged against its own cap first (with global exposure
/// still unknown); once the aggregate is known, a global breach escalates
/// every market to FLATTEN.
pub fn evaluate(
    exposures: &[MarketExposure],
    limits: &RiskLimits,
    previous: Option<&RiskSnapshot>,
) -> Result<RiskSnapshot, RiskError> {
    let mut snapshot = RiskSnapshot {
        global_cap: limits.global_ev_cap,
        generated_at: Some(Utc::now()),
        ..Default::default()
    };

    let mut evs = Vec::with_capacity(exposures.len());
    for exposure in exposures {
        let ev = match compute_market_ev(Some(exposure.position_yes), Some(Decimal::ZERO), exposure.fair_value) {
            Ok(ev) => ev,
            Err(e) => {
                warn!(market_id = %exposure.market_id, error = %e, "Skipping market with invalid exposure inputs");
                continue;
            }
        };
        let previous_fv = previous.and_then(|s| s.fair_values.get(&exposure.market_id).copied());
        let adverse = adverse_move_cents(previous_fv, exposure.fair_value, exposure.position_yes);

        let action = decide_action(
            ev.abs(),
            limits.per_market_ev_cap,
            Decimal::ZERO,
            limits.global_ev_cap,
            adverse,
            limits.adverse_threshold_cents,
        )?;

        debug!(
            market_id = %exposure.market_id,
            position_yes = %exposure.position_yes,
            ev = %ev,
            adverse_cents = %adverse,
            action = %action,
            "Market evaluated"
        );

        evs.push(ev);
        snapshot.per_market.insert(exposure.market_id.clone(), action);
        snapshot.per_market_ev.insert(exposure.market_id.clone(), ev);
        snapshot.fair_values.insert(exposure.market_id.clone(), exposure.fair_value);
    }

    snapshot.global_ev_abs = sum_global_ev(&evs);
    if escalate_global(&mut snapshot.per_market, snapshot.global_ev_abs, limits.global_ev_cap) {
        warn!(
            global_ev_abs = %snapshot.global_ev_abs,
            global_cap = %limits.global_ev_cap,
            "Global EV cap breached, flattening all markets"
        );
    }
    Ok(snapshot)
}

/// The risk bot.
#[derive(Debug, Clone)]
pub struct RiskMonitor {
    limits: RiskLimits,
    local_state_root: PathBuf,
    monitor_bots: Vec<String>,
    snapshot_path: PathBuf,
}

impl RiskMonitor {
    /// Create a monitor.
    pub fn new(
        limits: RiskLimits,
        local_state_root: impl Into<PathBuf>,
        monitor_bots: Vec<String>,
        snapshot_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            limits,
            local_state_root: local_state_root.into(),
            monitor_bots,
            snapshot_path: snapshot_path.into(),
        }
    }

    /// Build from a validated config. The snapshot lands in
    /// `<actions_dir>/risk_actions.json`.
    pub fn from_config(config: &BotConfig) -> Result<Self, ConfigError> {
        let risk = config.risk()?;
        let limits = RiskLimits::try_from(risk).map_err(|e| ConfigError::Invalid {
            key: "risk",
            reason: e.to_string(),
        })?;
        Ok(Self::new(
            limits,
            &config.ops.local_state_root,
            config.ops.monitor_bots.clone(),
            config.ops.actions_dir().join("risk_actions.json"),
        ))
    }

    /// Where snapshots are written.
    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Limits in force.
    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Collect per-market exposure across all monitored bots.
    pub fn gather(&self) -> Vec<MarketExposure> {
        let mut by_market: BTreeMap<String, MarketExposure> = BTreeMap::new();

        for bot in &self.monitor_bots {
            let bot_dir = self.local_state_root.join(bot);
            let markets = match load_market_file(&bot_dir.join("selected_markets.json")) {
                Ok(markets) => markets,
                Err(e) => {
                    warn!(bot = %bot, error = %e, "Failed to load routed markets");
                    Vec::new()
                }
            };
            let orders = Ledger::load(&bot_dir.join("open_orders.json")).exposure_orders();
            info!(bot = %bot, markets = markets.len(), orders = orders.len(), "Loaded bot state");

            for market in markets {
                let (Some(token), Some(fair_value)) = (market.yes_token(), market.fair_value) else {
                    debug!(market_id = %market.id, "Skipping market without token or fair value");
                    continue;
                };
                let position: Decimal = orders
                    .iter()
                    .filter(|o| o.instrument == token)
                    .map(|o| o.signed_size())
                    .sum();

                by_market
                    .entry(market.id.clone())
                    .and_modify(|e| {
                        e.position_yes += position;
                        e.fair_value = fair_value;
                    })
                    .or_insert(MarketExposure {
                        market_id: market.id.clone(),
                        fair_value,
                        position_yes: position,
                    });
            }
        }

        by_market.into_values().collect()
    }

    /// Run one risk tick and persist the snapshot.
    #[instrument(skip(self), fields(path = %self.snapshot_path.display()))]
    pub async fn tick(&self) -> Result<RiskSnapshot, BotError> {
        info!(event = "risk_tick_start", "Risk tick starting");

        let previous = match RiskSnapshot::load(&self.snapshot_path) {
            Ok(previous) => previous,
            Err(e) => {
                warn!(error = %e, "Previous snapshot unreadable, ignoring");
                None
            }
        };

        let exposures = self.gather();
        let snapshot = evaluate(&exposures, &self.limits, previous.as_ref())?;
        snapshot.save(&self.snapshot_path)?;

        metrics::set_global_ev(snapshot.global_ev_abs);
        info!(
            event = "risk_tick_complete",
            global_ev_abs = %snapshot.global_ev_abs,
            global_cap = %snapshot.global_cap,
            markets = snapshot.per_market.len(),
            flattened = snapshot.per_market.values().filter(|a| **a == Action::Flatten).count(),
            "Risk tick complete"
        );
        Ok(snapshot)
    }
}
