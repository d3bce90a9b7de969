//! Quote ladder construction.
//!
//! This module handles:
//! - Grid prices around a fair value, snapped to the 0.01 tick
//! - Widening an existing ladder on a risk verdict
//! - Turning a ladder into sized orders and trimming it to an EV cap

pub mod grid;
pub mod plan;

pub use grid::{apply_widen, build_grid, snap_to_tick, GridParams, LadderSide, QuoteGrid};
pub use grid::{MAX_PRICE, MIN_PRICE, TICK};
pub use plan::{plan_orders, total_notional, trim_to_cap, ClipSizes, PlannedOrder};
