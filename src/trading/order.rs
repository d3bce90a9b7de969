//! Order types and persisted order records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Side {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

/// Status of a persisted order record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Recorded only; never sent.
    DryRun,
    /// Accepted by the exchange.
    Live,
    /// Retry budget exhausted without acceptance.
    Failed,
}

/// Phases of a single placement, used to tag structured log events.
///
/// `REQUESTED -> DRY_RUN` in dry-run mode, otherwise
/// `REQUESTED -> SUBMITTING -> {ACCEPTED, REJECTED, FAILED}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPhase {
    /// Request received.
    Requested,
    /// Recorded without submission.
    DryRun,
    /// An attempt is in flight.
    Submitting,
    /// Exchange returned an order id.
    Accepted,
    /// Refused by the price band or the exchange.
    Rejected,
    /// Retry budget exhausted.
    Failed,
}

/// Durable record of one order, keyed by its client-side id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Token id the order trades.
    #[serde(alias = "token_id")]
    pub instrument: String,
    /// BUY or SELL.
    pub side: Side,
    /// Limit price.
    pub price: Decimal,
    /// Notional size.
    pub size: Decimal,
    /// Deterministic id derived from the order parameters and time bucket.
    pub client_order_id: String,
    /// Id assigned by the exchange once accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_order_id: Option<String>,
    /// Record status.
    pub status: OrderStatus,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// Attempt that produced this record (0 for dry-run).
    #[serde(default)]
    pub attempt: u32,
    /// Exchange round-trip of the successful attempt.
    #[serde(default)]
    pub latency_ms: u64,
    /// Set once the order has been cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl OrderRecord {
    /// Id callers should use to refer to this order.
    pub fn order_id(&self) -> String {
        match &self.exchange_order_id {
            Some(id) => id.clone(),
            None => dry_run_order_id(&self.client_order_id),
        }
    }

    /// Age of the record at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }

    /// Live on the exchange and not cancelled.
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Live
            && self.exchange_order_id.is_some()
            && self.cancelled_at.is_none()
    }

    /// Signed size contribution to a YES position.
    pub fn signed_size(&self) -> Decimal {
        match self.side {
            Side::Buy => self.size,
            Side::Sell => -self.size,
        }
    }
}

/// Synthetic id returned for dry-run orders.
pub fn dry_run_order_id(client_order_id: &str) -> String {
    format!("stub_{}", client_order_id)
}

/// Deterministic client-side id: the first 32 hex chars of
/// `sha256("{token}|{side}|{price}|{size}|{bucket}")`.
///
/// Prices and sizes are normalized so `0.50` and `0.5` map to the same id.
pub fn client_order_id(
    token_id: &str,
    side: Side,
    price: Decimal,
    size: Decimal,
    bucket: &str,
) -> String {
    let payload = format!(
        "{}|{}|{}|{}|{}",
        token_id,
        side,
        price.normalize(),
        size.normalize(),
        bucket
    );
    let digest = Sha256::digest(payload.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(32);
    id
}
