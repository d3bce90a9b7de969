//! Risk module.
//!
//! This module handles:
//! - EV exposure per market and in aggregate
//! - Mapping exposure against caps to NONE / WIDEN / PAUSE / FLATTEN
//! - The risk snapshot file consumed by quoting bots
//! - The file-driven risk monitor bot

pub mod exposure;
pub mod monitor;
pub mod snapshot;

pub use exposure::{compute_market_ev, decide_action, escalate_global, sum_global_ev, Action};
pub use monitor::{adverse_move_cents, evaluate, MarketExposure, RiskLimits, RiskMonitor};
pub use snapshot::RiskSnapshot;
