//! Risk snapshot file shared between the risk monitor and quoting bots.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::exposure::Action;
use crate::error::StoreError;
use crate::utils::{read_json_opt, write_json_atomic};

/// Exposure verdicts from one risk tick. Always rewritten whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    /// Sum of absolute per-market EV.
    pub global_ev_abs: Decimal,
    /// Global cap in force.
    pub global_cap: Decimal,
    /// Action per market id.
    #[serde(default)]
    pub per_market: BTreeMap<String, Action>,
    /// Signed EV per market id.
    #[serde(default)]
    pub per_market_ev: BTreeMap<String, Decimal>,
    /// Fair value per market id, used to measure the next tick's move.
    #[serde(default)]
    pub fair_values: BTreeMap<String, Decimal>,
    /// When the snapshot was produced.
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
}

impl RiskSnapshot {
    /// Load a snapshot; `None` if the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, StoreError> {
        read_json_opt(path)
    }

    /// Write the snapshot atomically.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        write_json_atomic(path, self)
    }

    /// Action for `market_id`, NONE when unlisted.
    pub fn action_for(&self, market_id: &str) -> Action {
        self.per_market.get(market_id).copied().unwrap_or_default()
    }

    /// Whether the global cap was breached.
    pub fn is_global_breach(&self) -> bool {
        self.global_ev_abs >= self.global_cap
    }
}
