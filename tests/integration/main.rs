//! Integration tests for the order engine, quoting cycle, and risk monitor.
//!
//! Everything runs against `MockExchange` and a scratch state directory
//! under the system temp dir.

mod cycle;
mod engine;
mod risk;

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use polymarket_mm::exchange::MockExchange;
use polymarket_mm::trading::{EngineSettings, OrderEngine, OrderStore};

/// Fresh directory for one test, removed when dropped.
pub struct ScratchDir(PathBuf);

impl Deref for ScratchDir {
    type Target = Path;

    fn deref(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

pub fn scratch_dir(name: &str) -> ScratchDir {
    let dir = std::env::temp_dir().join(format!("pmm-it-{}-{}", name, rand::random::<u64>()));
    std::fs::create_dir_all(&dir).unwrap();
    ScratchDir(dir)
}

/// Engine over `mock` writing to `dir`.
pub fn engine(mock: &Arc<MockExchange>, dir: &Path, settings: EngineSettings) -> OrderEngine {
    let store = OrderStore::open(dir).unwrap();
    OrderEngine::new(mock.clone(), store, settings)
}

/// Live settings with no pacing, one attempt, and no price band.
pub fn live() -> EngineSettings {
    EngineSettings {
        dry_run: false,
        ..Default::default()
    }
}
