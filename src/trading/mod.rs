//! Trading module for order records and execution.
//!
//! This module handles:
//! - Order types and deterministic client-side ids
//! - Durable order records and the open-orders ledger
//! - Pacing and retry with backoff
//! - Idempotent placement, cancellation, and TTL refresh

pub mod engine;
pub mod order;
pub mod retry;
pub mod store;

pub use engine::{EngineSettings, OrderEngine, RefreshReport};
pub use order::{client_order_id, dry_run_order_id, OrderPhase, OrderRecord, OrderStatus, Side};
pub use retry::{with_retry, Attempted, Pacer, RetryPolicy};
pub use store::{Ledger, OrderStore};
