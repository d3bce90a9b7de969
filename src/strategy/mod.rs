//! Strategy module.
//!
//! This module handles:
//! - The quoting tick (markets to ladders to orders)
//! - Risk feedback and inventory skew applied to each ladder
//! - The periodic bot loop with bounded tick retries

pub mod cycle;
pub mod runner;

pub use cycle::{skew_fair_value, FlatInventory, InventoryFeed, QuotingCycle, QuotingSettings, QuotingSummary};
pub use runner::{Bot, BotRunner, RunnerSettings, TickReport};
