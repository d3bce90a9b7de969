//! Market sources consumed by the quoting cycle and the risk monitor.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::types::Market;
use crate::error::MarketError;

/// Supplies the markets to quote on each tick.
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Markets for this tick. An empty list ends the tick.
    async fn markets(&self) -> Result<Vec<Market>, MarketError>;
}

/// Read a routed selection file (a JSON array of raw market objects).
///
/// A missing or unparsable file yields no markets; entries that fail
/// boundary validation are skipped. Only an unreadable file is an error.
pub fn load_market_file(path: &Path) -> Result<Vec<Market>, MarketError> {
    let body = match std::fs::read(path) {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No market selection file");
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(MarketError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        }
    };

    let entries: Vec<Value> = match serde_json::from_slice::<Option<Vec<Value>>>(&body) {
        Ok(entries) => entries.unwrap_or_default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Market selection unparsable, ignoring");
            return Ok(Vec::new());
        }
    };

    let markets = entries
        .iter()
        .filter_map(|raw| match Market::from_value(raw) {
            Ok(market) => Some(market),
            Err(e) => {
                warn!(error = %e, "Skipping malformed market entry");
                None
            }
        })
        .collect();
    Ok(markets)
}

/// Markets routed into a JSON file by an upstream selector.
#[derive(Debug, Clone)]
pub struct FileMarketSource {
    path: PathBuf,
}

impl FileMarketSource {
    /// Read markets from `path` on every tick.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Selection file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MarketSource for FileMarketSource {
    async fn markets(&self) -> Result<Vec<Market>, MarketError> {
        let markets = load_market_file(&self.path)?;
        info!(path = %self.path.display(), count = markets.len(), "Loaded routed markets");
        Ok(markets)
    }
}

/// A fixed market list.
#[derive(Debug, Clone, Default)]
pub struct StaticMarketSource {
    markets: Vec<Market>,
}

impl StaticMarketSource {
    /// Serve `markets` on every tick.
    pub fn new(markets: Vec<Market>) -> Self {
        Self { markets }
    }
}

#[async_trait]
impl MarketSource for StaticMarketSource {
    async fn markets(&self) -> Result<Vec<Market>, MarketError> {
        Ok(self.markets.clone())
    }
}
