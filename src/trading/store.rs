//! Durable order records and the open-orders ledger.
//!
//! Layout under the bot's state directory:
//!
//! ```text
//! <state_dir>/orders/<client_order_id>.json   one record per order
//! <state_dir>/open_orders.json                {"orders": [...]} append-only
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::order::{OrderRecord, OrderStatus};
use crate::error::StoreError;
use crate::utils::{read_json_opt, write_json_atomic};

/// Append-only log of every record a bot emitted.
///
/// A client id may appear more than once (a cancel appends a tombstoned
/// copy); the latest entry for an id is authoritative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    /// Records in append order.
    #[serde(default)]
    pub orders: Vec<OrderRecord>,
}

impl Ledger {
    /// Load a ledger file. Missing or unreadable files yield an empty ledger.
    pub fn load(path: &Path) -> Self {
        match read_json_opt::<Ledger>(path) {
            Ok(Some(ledger)) => ledger,
            Ok(None) => Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ledger unreadable, treating as empty");
                Self::default()
            }
        }
    }

    /// Latest entry per client id, in first-appearance order.
    pub fn current(&self) -> Vec<OrderRecord> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut latest: Vec<OrderRecord> = Vec::new();
        for record in &self.orders {
            match index.get(record.client_order_id.as_str()) {
                Some(&i) => latest[i] = record.clone(),
                None => {
                    index.insert(record.client_order_id.as_str(), latest.len());
                    latest.push(record.clone());
                }
            }
        }
        latest
    }

    /// Orders resting on the exchange.
    pub fn open_orders(&self) -> Vec<OrderRecord> {
        self.current().into_iter().filter(|r| r.is_open()).collect()
    }

    /// Orders that count towards exposure: not failed, not cancelled.
    pub fn exposure_orders(&self) -> Vec<OrderRecord> {
        self.current()
            .into_iter()
            .filter(|r| r.status != OrderStatus::Failed && r.cancelled_at.is_none())
            .collect()
    }
}

/// File-backed store of order records for one bot instance.
#[derive(Debug, Clone)]
pub struct OrderStore {
    root: PathBuf,
}

impl OrderStore {
    /// Open (and create) the store under `state_dir`.
    pub fn open(state_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = state_dir.into();
        let orders = root.join("orders");
        std::fs::create_dir_all(&orders).map_err(|source| StoreError::Io {
            path: orders.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    /// State directory this store writes under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the ledger file.
    pub fn ledger_path(&self) -> PathBuf {
        self.root.join("open_orders.json")
    }

    /// Path of the record file for `client_order_id`.
    pub fn record_path(&self, client_order_id: &str) -> PathBuf {
        self.root
            .join("orders")
            .join(format!("{}.json", client_order_id))
    }

    /// Load the record for `client_order_id`, if any.
    pub fn load(&self, client_order_id: &str) -> Result<Option<OrderRecord>, StoreError> {
        read_json_opt(&self.record_path(client_order_id))
    }

    /// Persist `record`, returning whatever is on disk afterwards.
    ///
    /// - A record never changes between dry-run and live/failed status.
    /// - An existing dry-run record, or a live one still resting on the
    ///   exchange, is kept and returned unchanged.
    /// - A failed or cancelled record may be superseded by a later attempt.
    pub fn save(&self, record: &OrderRecord) -> Result<OrderRecord, StoreError> {
        if let Some(existing) = self.load(&record.client_order_id)? {
            let existing_dry = existing.status == OrderStatus::DryRun;
            let attempted_dry = record.status == OrderStatus::DryRun;
            if existing_dry != attempted_dry {
                return Err(StoreError::StatusConflict {
                    client_order_id: record.client_order_id.clone(),
                    existing: existing.status.to_string(),
                    attempted: record.status.to_string(),
                });
            }

            if existing_dry || existing.is_open() {
                debug!(
                    client_order_id = %record.client_order_id,
                    "Record already persisted, keeping first write"
                );
                return Ok(existing);
            }
        }

        write_json_atomic(&self.record_path(&record.client_order_id), record)?;
        Ok(record.clone())
    }

    /// Load this store's ledger.
    pub fn load_ledger(&self) -> Ledger {
        Ledger::load(&self.ledger_path())
    }

    /// Append `record` to the ledger. An unparsable ledger is left untouched.
    pub fn append_ledger(&self, record: &OrderRecord) -> Result<(), StoreError> {
        let path = self.ledger_path();
        let mut ledger = match read_json_opt::<Ledger>(&path) {
            Ok(ledger) => ledger.unwrap_or_default(),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Ledger unparsable, refusing to overwrite");
                return Err(e);
            }
        };
        ledger.orders.push(record.clone());
        write_json_atomic(&path, &ledger)
    }

    /// Tombstone `record` as cancelled in both its record file and the ledger.
    pub fn mark_cancelled(
        &self,
        record: &OrderRecord,
        at: DateTime<Utc>,
    ) -> Result<OrderRecord, StoreError> {
        let mut cancelled = record.clone();
        cancelled.cancelled_at = Some(at);
        write_json_atomic(&self.record_path(&cancelled.client_order_id), &cancelled)?;
        self.append_ledger(&cancelled)?;
        Ok(cancelled)
    }
}
