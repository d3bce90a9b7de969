//! Sizing a ladder into orders and admission control against an EV cap.

use rust_decimal::Decimal;
use serde::Serialize;

use super::grid::QuoteGrid;
use crate::config::QuotingConfig;
use crate::trading::Side;

/// Clip sizes per ladder position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipSizes {
    /// Size of each side's best level.
    pub top: Decimal,
    /// Size of every deeper level.
    pub deep: Decimal,
}

impl From<&QuotingConfig> for ClipSizes {
    fn from(config: &QuotingConfig) -> Self {
        Self {
            top: config.clip_usdc_top,
            deep: config.clip_usdc_deep,
        }
    }
}

/// An order the strategy intends to place this tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedOrder {
    /// BUY for bid levels, SELL for ask levels.
    pub side: Side,
    /// Limit price.
    pub price: Decimal,
    /// Notional size.
    pub size: Decimal,
}

/// Convert a ladder into planned orders: all bids (best first), then all asks.
pub fn plan_orders(grid: &QuoteGrid, clips: ClipSizes) -> Vec<PlannedOrder> {
    let size_for = |i: usize| if i == 0 { clips.top } else { clips.deep };

    let bids = grid.bids.iter().enumerate().map(|(i, &price)| PlannedOrder {
        side: Side::Buy,
        price,
        size: size_for(i),
    });
    let asks = grid.asks.iter().enumerate().map(|(i, &price)| PlannedOrder {
        side: Side::Sell,
        price,
        size: size_for(i),
    });

    bids.chain(asks).collect()
}

/// Sum of planned sizes.
pub fn total_notional(planned: &[PlannedOrder]) -> Decimal {
    planned.iter().map(|o| o.size).sum()
}

/// Keep the longest prefix of `planned` whose cumulative size stays within
/// `cap`. Everything after the first order that would overflow is dropped,
/// even if a later, smaller order would still fit.
pub fn trim_to_cap(planned: Vec<PlannedOrder>, cap: Decimal) -> Vec<PlannedOrder> {
    if total_notional(&planned) <= cap {
        return planned;
    }

    let mut running = Decimal::ZERO;
    planned
        .into_iter()
        .take_while(|order| {
            if running + order.size <= cap {
                running += order.size;
                true
            } else {
                false
            }
        })
        .collect()
}
