//! One quoting tick: markets in, ladders out, orders through the engine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::config::BotConfig;
use crate::error::{BotError, ConfigError};
use crate::market::{Market, MarketSource};
use crate::metrics;
use crate::quoting::{
    build_grid, plan_orders, total_notional, trim_to_cap, ClipSizes, GridParams, PlannedOrder,
    MAX_PRICE, MIN_PRICE,
};
use crate::risk::{Action, RiskSnapshot};
use crate::trading::{OrderEngine, RefreshReport};

/// Source of a market's inventory ratio used to skew fair value.
pub trait InventoryFeed: Send + Sync {
    /// Signed inventory ratio for `market`; zero when flat.
    fn inventory_ratio(&self, market: &Market) -> Decimal;
}

/// Always flat. Used when no live position feed is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatInventory;

impl InventoryFeed for FlatInventory {
    fn inventory_ratio(&self, _market: &Market) -> Decimal {
        Decimal::ZERO
    }
}

/// Shift fair value by `skew_k * inventory_ratio`, clamped to the quotable range.
pub fn skew_fair_value(fair_value: Decimal, skew_k: Decimal, inventory_ratio: Decimal) -> Decimal {
    (fair_value + skew_k * inventory_ratio).clamp(MIN_PRICE, MAX_PRICE)
}

/// Strategy parameters for [`QuotingCycle`], resolved from config.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotingSettings {
    /// Ladder spacing.
    pub grid: GridParams,
    /// Clip sizes.
    pub clips: ClipSizes,
    /// Fair value shift per unit of inventory ratio.
    pub skew_k: Decimal,
    /// Cap on planned notional per market.
    pub per_market_ev_cap: Decimal,
    /// Extra distance on a WIDEN verdict, in cents.
    pub widen_addon_cents: u32,
    /// Requote live orders older than this.
    pub refresh_ttl: Option<Duration>,
}

impl QuotingSettings {
    /// Resolve from a config validated with [`BotConfig::validate_quoting`].
    pub fn from_config(config: &BotConfig) -> Result<Self, ConfigError> {
        let quoting = config.quoting()?;
        let inventory = config.inventory()?;
        Ok(Self {
            grid: GridParams::from(quoting),
            clips: ClipSizes::from(quoting),
            skew_k: quoting.skew_k,
            per_market_ev_cap: inventory.per_market_ev_cap,
            widen_addon_cents: quoting.widen_addon_cents,
            refresh_ttl: quoting.refresh_ttl_seconds.map(Duration::from_secs),
        })
    }
}

/// Counters from one quoting tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuotingSummary {
    /// Markets returned by the source.
    pub markets_seen: usize,
    /// Markets that reached order submission.
    pub quoted: usize,
    /// Markets skipped before submission.
    pub skipped: usize,
    /// Orders the engine accepted (including dry-run records).
    pub orders_placed: usize,
    /// Orders the engine failed.
    pub orders_failed: usize,
    /// Planned orders dropped by the EV cap.
    pub orders_trimmed: usize,
    /// TTL refresh pass, when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<RefreshReport>,
}

enum MarketOutcome {
    Skipped(&'static str),
    Quoted { placed: usize, failed: usize, trimmed: usize },
}

/// The quoting bot's tick.
pub struct QuotingCycle {
    source: Arc<dyn MarketSource>,
    engine: Arc<OrderEngine>,
    settings: QuotingSettings,
    inventory: Arc<dyn InventoryFeed>,
    risk_actions_path: Option<PathBuf>,
}

impl QuotingCycle {
    /// Create a cycle with a flat inventory and no risk feedback.
    pub fn new(source: Arc<dyn MarketSource>, engine: Arc<OrderEngine>, settings: QuotingSettings) -> Self {
        Self {
            source,
            engine,
            settings,
            inventory: Arc::new(FlatInventory),
            risk_actions_path: None,
        }
    }

    /// Use `feed` for inventory skew.
    pub fn with_inventory(mut self, feed: Arc<dyn InventoryFeed>) -> Self {
        self.inventory = feed;
        self
    }

    /// Honour the risk snapshot at `path`.
    pub fn with_risk_actions(mut self, path: impl Into<PathBuf>) -> Self {
        self.risk_actions_path = Some(path.into());
        self
    }

    /// Strategy parameters in force.
    pub fn settings(&self) -> &QuotingSettings {
        &self.settings
    }

    /// Order engine driven by this cycle.
    pub fn engine(&self) -> &Arc<OrderEngine> {
        &self.engine
    }

    /// Run one tick. Failures of individual markets or orders are logged and
    /// counted, never propagated; only a market source error fails the tick.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<QuotingSummary, BotError> {
        info!(event = "market_maker_tick_start", "Quoting tick starting");
        let mut summary = QuotingSummary::default();

        if let Some(ttl) = self.settings.refresh_ttl {
            let open = self.engine.store().load_ledger().open_orders();
            summary.refresh = Some(self.engine.refresh(&open, ttl).await);
        }

        let markets = self.source.markets().await?;
        summary.markets_seen = markets.len();
        if markets.is_empty() {
            info!(event = "market_maker_tick_complete", "No markets routed, nothing to quote");
            return Ok(summary);
        }

        let snapshot = self.load_risk_snapshot();

        for market in &markets {
            match self.quote_market(market, snapshot.as_ref()).await {
                MarketOutcome::Skipped(reason) => {
                    debug!(market_id = %market.id, reason, "Market skipped");
                    metrics::inc_markets_skipped(reason);
                    summary.skipped += 1;
                }
                MarketOutcome::Quoted { placed, failed, trimmed } => {
                    summary.quoted += 1;
                    summary.orders_placed += placed;
                    summary.orders_failed += failed;
                    summary.orders_trimmed += trimmed;
                }
            }
        }

        info!(
            event = "market_maker_tick_complete",
            markets = summary.markets_seen,
            quoted = summary.quoted,
            skipped = summary.skipped,
            orders_placed = summary.orders_placed,
            orders_failed = summary.orders_failed,
            orders_trimmed = summary.orders_trimmed,
            "Quoting tick complete"
        );
        Ok(summary)
    }

    fn load_risk_snapshot(&self) -> Option<RiskSnapshot> {
        let path = self.risk_actions_path.as_deref()?;
        match RiskSnapshot::load(path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Risk snapshot unreadable, quoting without it");
                None
            }
        }
    }

    async fn resolve_fair_value(&self, market: &Market, token_id: &str) -> Option<Decimal> {
        let in_unit = |p: &Decimal| (Decimal::ZERO..=Decimal::ONE).contains(p);
        match market.fair_value {
            Some(fv) if in_unit(&fv) => return Some(fv),
            Some(fv) => warn!(market_id = %market.id, fair_value = %fv, "Embedded fair value out of range"),
            None => {}
        }
        match self.engine.exchange().get_orderbook_price(token_id).await {
            Ok(price) if in_unit(&price) => Some(price),
            Ok(price) => {
                warn!(market_id = %market.id, price = %price, "Exchange price out of range");
                None
            }
            Err(e) => {
                warn!(market_id = %market.id, error = %e, "Failed to fetch exchange price");
                None
            }
        }
    }

    async fn quote_market(&self, market: &Market, snapshot: Option<&RiskSnapshot>) -> MarketOutcome {
        let Some(token_id) = market.yes_token() else {
            return MarketOutcome::Skipped("no_token_ids");
        };

        let action = snapshot.map(|s| s.action_for(&market.id)).unwrap_or_default();
        if action.blocks_quoting() {
            info!(market_id = %market.id, action = %action, "Risk action blocks quoting");
            return MarketOutcome::Skipped("risk_action");
        }

        let Some(fair_value) = self.resolve_fair_value(market, token_id).await else {
            return MarketOutcome::Skipped("no_fair_value");
        };

        let ratio = self.inventory.inventory_ratio(market);
        let skewed = skew_fair_value(fair_value, self.settings.skew_k, ratio);

        let mut grid = build_grid(skewed, &self.settings.grid);
        if action == Action::Widen {
            grid = grid.widen(self.settings.widen_addon_cents);
        }
        if grid.is_empty() {
            return MarketOutcome::Skipped("empty_grid");
        }

        let planned: Vec<PlannedOrder> = plan_orders(&grid, self.settings.clips)
            .into_iter()
            .filter(|o| o.size > Decimal::ZERO)
            .collect();
        if planned.is_empty() {
            return MarketOutcome::Skipped("zero_size");
        }

        let planned_total = total_notional(&planned);
        let planned_count = planned.len();
        let kept = trim_to_cap(planned, self.settings.per_market_ev_cap);
        let trimmed = planned_count - kept.len();
        if trimmed > 0 {
            info!(
                market_id = %market.id,
                planned_total = %planned_total,
                cap = %self.settings.per_market_ev_cap,
                kept = kept.len(),
                dropped = trimmed,
                "Plan trimmed to EV cap"
            );
        }

        debug!(
            market_id = %market.id,
            fair_value = %fair_value,
            skewed = %skewed,
            action = %action,
            bids = grid.bids.len(),
            asks = grid.asks.len(),
            "Quoting market"
        );

        let mut placed = 0;
        let mut failed = 0;
        for order in &kept {
            match self
                .engine
                .place_limit(order.price, order.size, order.side, token_id)
                .await
            {
                Ok(_) => placed += 1,
                Err(e) => {
                    error!(
                        event = "market_maker_order_error",
                        market_id = %market.id,
                        side = %order.side,
                        price = %order.price,
                        size = %order.size,
                        error = %e,
                        "Order failed"
                    );
                    failed += 1;
                }
            }
        }

        MarketOutcome::Quoted { placed, failed, trimmed }
    }
}
