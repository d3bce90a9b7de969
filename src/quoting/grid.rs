//! Price ladder generation around a fair value.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::config::QuotingConfig;

/// Minimum price increment.
pub const TICK: Decimal = dec!(0.01);
/// Lowest quotable price.
pub const MIN_PRICE: Decimal = dec!(0.01);
/// Highest quotable price.
pub const MAX_PRICE: Decimal = dec!(0.99);

/// Which side of the ladder a price belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderSide {
    /// Below fair value.
    Bid,
    /// Above fair value.
    Ask,
}

/// Spacing parameters for [`build_grid`], in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridParams {
    /// Levels on each side. Zero yields an empty grid.
    pub levels_per_side: usize,
    /// Distance between consecutive levels.
    pub level_spacing_cents: u32,
    /// Target half-spread of the top level.
    pub base_spread_cents: u32,
    /// Floor on the top-level half-spread.
    pub min_spread_cents: u32,
}

impl From<&QuotingConfig> for GridParams {
    fn from(config: &QuotingConfig) -> Self {
        Self {
            levels_per_side: config.levels_per_side,
            level_spacing_cents: config.level_spacing_cents,
            base_spread_cents: config.base_spread_cents,
            min_spread_cents: config.min_spread_cents,
        }
    }
}

/// Bid and ask ladders, best price first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuoteGrid {
    /// Descending.
    pub bids: Vec<Decimal>,
    /// Ascending.
    pub asks: Vec<Decimal>,
}

impl QuoteGrid {
    /// True when neither side has a level.
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Push both sides `addon_cents` further from fair value.
    pub fn widen(&self, addon_cents: u32) -> Self {
        Self {
            bids: apply_widen(&self.bids, addon_cents, LadderSide::Bid),
            asks: apply_widen(&self.asks, addon_cents, LadderSide::Ask),
        }
    }
}

fn cents(value: u32) -> Decimal {
    Decimal::from(value) * TICK
}

/// Round to the nearest tick (ties to even).
pub fn snap_to_tick(price: Decimal) -> Decimal {
    (price / TICK).round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven) * TICK
}

fn in_range(price: Decimal) -> bool {
    price >= MIN_PRICE && price <= MAX_PRICE
}

/// Build bid/ask ladders around `fair_value`.
///
/// Level `i` sits `max(min_spread, base_spread) + i * spacing` away from fair
/// value on each side. Prices are snapped to the tick; a level whose snapped
/// price falls outside `[0.01, 0.99]` is dropped rather than clamped, so the
/// ladder never carries zero-edge quotes at the bounds. Duplicate prices
/// collapse to one level.
pub fn build_grid(fair_value: Decimal, params: &GridParams) -> QuoteGrid {
    if params.levels_per_side == 0 {
        return QuoteGrid::default();
    }

    let spacing = cents(params.level_spacing_cents);
    let half = cents(params.min_spread_cents.max(params.base_spread_cents));

    let mut bids = Vec::with_capacity(params.levels_per_side);
    let mut asks = Vec::with_capacity(params.levels_per_side);

    for i in 0..params.levels_per_side {
        let offset = half + Decimal::from(i) * spacing;
        let bid = snap_to_tick(fair_value - offset);
        let ask = snap_to_tick(fair_value + offset);
        if in_range(bid) {
            bids.push(bid);
        }
        if in_range(ask) {
            asks.push(ask);
        }
    }

    bids.sort_by(|a, b| b.cmp(a));
    bids.dedup();
    asks.sort();
    asks.dedup();

    QuoteGrid { bids, asks }
}

/// Shift an existing ladder `addon_cents` away from fair value.
///
/// Bids move down, asks move up. Levels pushed outside the valid range are
/// dropped.
pub fn apply_widen(levels: &[Decimal], addon_cents: u32, side: LadderSide) -> Vec<Decimal> {
    let addon = cents(addon_cents);
    let mut widened: Vec<Decimal> = levels
        .iter()
        .map(|p| match side {
            LadderSide::Bid => snap_to_tick(p - addon),
            LadderSide::Ask => snap_to_tick(p + addon),
        })
        .filter(|p| in_range(*p))
        .collect();
    widened.dedup();
    widened
}
