//! Grid market maker for Polymarket binary markets.
//!
//! Each tick the quoting bot reads its routed markets, builds a symmetric
//! price ladder around every market's fair value, trims the plan to a
//! per-market EV cap, and places the orders through an idempotent, paced,
//! retrying order engine. A separate risk bot nets each quoting bot's order
//! ledger into per-market EV and publishes NONE / WIDEN / PAUSE / FLATTEN
//! verdicts that the quoting bot honours on its next tick.
//!
//! # Ladder
//!
//! ```text
//! fair value 0.50, 3 levels, spacing 1c, half-spread 2c
//! bids: 0.48 0.47 0.46
//! asks: 0.52 0.53 0.54
//! ```
//!
//! # Modules
//!
//! - [`config`]: YAML bot config and exchange environment
//! - [`error`]: Unified error types
//! - [`quoting`]: Ladder construction and order planning
//! - [`risk`]: EV exposure, action ladder, risk snapshot and monitor
//! - [`trading`]: Order records, store, retry/pacing, order engine
//! - [`exchange`]: Exchange client trait, CLOB adapter, mock
//! - [`market`]: Market records and market sources
//! - [`strategy`]: Quoting tick and the periodic bot runner
//! - [`api`]: HTTP API for health/status/metrics
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod config;
pub mod error;
pub mod exchange;
pub mod market;
pub mod metrics;
pub mod quoting;
pub mod risk;
pub mod strategy;
pub mod trading;
pub mod utils;

pub use config::BotConfig;
pub use error::{BotError, Result};
