//! Market module.
//!
//! This module handles:
//! - Market records and validation of raw market JSON
//! - Market sources (routed selection file, fixed lists)

pub mod source;
pub mod types;

pub use source::{load_market_file, FileMarketSource, MarketSource, StaticMarketSource};
pub use types::{compute_mid_price, parse_token_ids, Market};
