//! Idempotent, paced, retried order placement with cancel and TTL refresh.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use super::order::{
    client_order_id, dry_run_order_id, OrderPhase, OrderRecord, OrderStatus, Side,
};
use super::retry::{with_retry, Pacer, RetryPolicy};
use super::store::OrderStore;
use crate::config::{OpsConfig, TimeBucket};
use crate::error::{ExchangeError, ExecutionError, StoreError};
use crate::exchange::ExchangeClient;
use crate::metrics;
use crate::quoting::{MAX_PRICE, MIN_PRICE};

/// Floor on the fair value used as the band denominator.
const MIN_BAND_REFERENCE: Decimal = dec!(0.000000001);

/// Knobs for [`OrderEngine`].
#[derive(Debug)]
pub struct EngineSettings {
    /// Record orders without sending them.
    pub dry_run: bool,
    /// Retry budget for exchange calls.
    pub retry: RetryPolicy,
    /// Pacing between submissions.
    pub pacer: Pacer,
    /// Maximum distance from the exchange price, in basis points.
    pub max_bps_from_mid: Option<Decimal>,
    /// Idempotency bucket granularity.
    pub time_bucket: TimeBucket,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dry_run: true,
            retry: RetryPolicy::default(),
            pacer: Pacer::disabled(),
            max_bps_from_mid: None,
            time_bucket: TimeBucket::Minute,
        }
    }
}

impl From<&OpsConfig> for EngineSettings {
    fn from(ops: &OpsConfig) -> Self {
        Self {
            dry_run: ops.dry_run,
            retry: RetryPolicy::from(&ops.retry),
            pacer: Pacer::from(&ops.rate_limit),
            max_bps_from_mid: ops.price_band.max_bps_from_mid,
            time_bucket: ops.time_bucket,
        }
    }
}

/// Outcome of one [`OrderEngine::refresh`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Orders cancelled and re-placed.
    pub refreshed: usize,
    /// Orders left alone (young, no exchange id, or dry-run).
    pub skipped: usize,
    /// Orders whose cancel or re-place failed.
    pub failed: usize,
}

/// Distance of `price` from `reference` in basis points.
pub fn distance_bps(price: Decimal, reference: Decimal) -> Decimal {
    (price - reference).abs() / reference.max(MIN_BAND_REFERENCE) * dec!(10000)
}

/// Turns order requests into durable records and exchange submissions.
pub struct OrderEngine {
    exchange: Arc<dyn ExchangeClient>,
    store: OrderStore,
    settings: EngineSettings,
}

impl OrderEngine {
    /// Create an engine.
    pub fn new(exchange: Arc<dyn ExchangeClient>, store: OrderStore, settings: EngineSettings) -> Self {
        Self {
            exchange,
            store,
            settings,
        }
    }

    /// Create an engine writing under `ops.state_dir`.
    pub fn from_ops(exchange: Arc<dyn ExchangeClient>, ops: &OpsConfig) -> Result<Self, StoreError> {
        let store = OrderStore::open(&ops.state_dir)?;
        Ok(Self::new(exchange, store, EngineSettings::from(ops)))
    }

    /// Whether orders are recorded without submission.
    pub fn is_dry_run(&self) -> bool {
        self.settings.dry_run
    }

    /// Underlying record store.
    pub fn store(&self) -> &OrderStore {
        &self.store
    }

    /// Exchange client in use.
    pub fn exchange(&self) -> &Arc<dyn ExchangeClient> {
        &self.exchange
    }

    /// Place a limit order, returning the exchange (or synthetic) order id.
    pub async fn place_limit(
        &self,
        price: Decimal,
        size: Decimal,
        side: Side,
        token_id: &str,
    ) -> Result<String, ExecutionError> {
        self.place_limit_at(price, size, side, token_id, Utc::now()).await
    }

    /// [`OrderEngine::place_limit`] with an explicit clock, which selects the
    /// idempotency bucket and the record timestamp.
    #[instrument(skip_all, fields(token_id = %token_id, side = %side, price = %price, size = %size))]
    pub async fn place_limit_at(
        &self,
        price: Decimal,
        size: Decimal,
        side: Side,
        token_id: &str,
        now: DateTime<Utc>,
    ) -> Result<String, ExecutionError> {
        validate_order(price, size, token_id)?;

        let bucket = self.settings.time_bucket.key(now);
        let cid = client_order_id(token_id, side, price, size, &bucket);
        debug!(client_order_id = %cid, phase = %OrderPhase::Requested, "Order requested");

        if self.settings.dry_run {
            return self.record_dry_run(cid, price, size, side, token_id, now);
        }

        self.check_price_band(price, token_id).await?;
        self.settings.pacer.pace().await;

        match self.store.load(&cid)? {
            Some(existing) if existing.is_open() => {
                let order_id = existing.order_id();
                info!(
                    event = "order_place_idempotent_hit",
                    client_order_id = %cid,
                    exchange_order_id = %order_id,
                    phase = %OrderPhase::Accepted,
                    "Order already placed, returning existing id"
                );
                metrics::inc_idempotent_hits();
                return Ok(order_id);
            }
            Some(existing) if existing.status == OrderStatus::DryRun => {
                return Err(StoreError::StatusConflict {
                    client_order_id: cid,
                    existing: existing.status.to_string(),
                    attempted: OrderStatus::Live.to_string(),
                }
                .into());
            }
            _ => {}
        }

        let exchange = &self.exchange;
        let submitted = with_retry(
            &self.settings.retry,
            "order placement",
            "order_place_error",
            move |_| exchange.execute_order(price, size, side, token_id),
        )
        .await;

        let attempted = match submitted {
            Ok(attempted) => attempted,
            Err(e) => return Err(self.record_failure(e, &cid, price, size, side, token_id, now)),
        };

        let latency_ms = attempted.latency.as_millis() as u64;
        let record = OrderRecord {
            instrument: token_id.to_string(),
            side,
            price,
            size,
            client_order_id: cid.clone(),
            exchange_order_id: Some(attempted.value.clone()),
            status: OrderStatus::Live,
            created_at: now,
            attempt: attempted.attempt,
            latency_ms,
            cancelled_at: None,
        };

        metrics::inc_orders_placed();
        metrics::record_order_submit_latency(attempted.latency);

        match self.store.save(&record) {
            Ok(persisted) if persisted.exchange_order_id == record.exchange_order_id => {
                if let Err(e) = self.store.append_ledger(&persisted) {
                    error!(client_order_id = %cid, error = %e, "Failed to append order to ledger");
                }
            }
            Ok(persisted) => {
                warn!(
                    client_order_id = %cid,
                    persisted = ?persisted.exchange_order_id,
                    submitted = %attempted.value,
                    "Another writer persisted this order first"
                );
                return Ok(persisted.order_id());
            }
            Err(e) => {
                error!(
                    client_order_id = %cid,
                    exchange_order_id = %attempted.value,
                    error = %e,
                    "Order accepted but record could not be persisted"
                );
            }
        }

        info!(
            event = "order_place_success",
            client_order_id = %cid,
            exchange_order_id = %attempted.value,
            attempt = attempted.attempt,
            latency_ms,
            phase = %OrderPhase::Accepted,
            "Order placed"
        );
        Ok(attempted.value)
    }

    fn record_dry_run(
        &self,
        cid: String,
        price: Decimal,
        size: Decimal,
        side: Side,
        token_id: &str,
        now: DateTime<Utc>,
    ) -> Result<String, ExecutionError> {
        if let Some(existing) = self.store.load(&cid)? {
            if existing.status == OrderStatus::DryRun {
                info!(
                    event = "order_place_idempotent_hit",
                    client_order_id = %cid,
                    phase = %OrderPhase::DryRun,
                    "Dry-run order already recorded"
                );
                metrics::inc_idempotent_hits();
                return Ok(dry_run_order_id(&cid));
            }
        }

        let record = OrderRecord {
            instrument: token_id.to_string(),
            side,
            price,
            size,
            client_order_id: cid.clone(),
            exchange_order_id: None,
            status: OrderStatus::DryRun,
            created_at: now,
            attempt: 0,
            latency_ms: 0,
            cancelled_at: None,
        };
        let persisted = self.store.save(&record)?;
        self.store.append_ledger(&persisted)?;

        info!(
            event = "order_place_dry_run",
            client_order_id = %cid,
            phase = %OrderPhase::DryRun,
            "Dry-run order recorded"
        );
        metrics::inc_orders_dry_run();
        Ok(dry_run_order_id(&cid))
    }

    #[allow(clippy::too_many_arguments)]
    fn record_failure(
        &self,
        err: ExecutionError,
        cid: &str,
        price: Decimal,
        size: Decimal,
        side: Side,
        token_id: &str,
        now: DateTime<Utc>,
    ) -> ExecutionError {
        let attempts = match &err {
            ExecutionError::Exhausted { attempts, .. } => *attempts,
            _ => {
                error!(
                    event = "order_place_error",
                    client_order_id = %cid,
                    error = %err,
                    phase = %OrderPhase::Rejected,
                    "Order rejected by exchange"
                );
                metrics::inc_orders_rejected("exchange");
                return err;
            }
        };

        error!(
            event = "order_place_error",
            client_order_id = %cid,
            attempts,
            error = %err,
            phase = %OrderPhase::Failed,
            "Order failed after retries"
        );
        metrics::inc_orders_failed();

        let record = OrderRecord {
            instrument: token_id.to_string(),
            side,
            price,
            size,
            client_order_id: cid.to_string(),
            exchange_order_id: None,
            status: OrderStatus::Failed,
            created_at: now,
            attempt: attempts,
            latency_ms: 0,
            cancelled_at: None,
        };
        if let Err(e) = self.store.save(&record) {
            warn!(client_order_id = %cid, error = %e, "Failed to persist failed order record");
        }
        err
    }

    async fn check_price_band(&self, price: Decimal, token_id: &str) -> Result<(), ExecutionError> {
        let Some(max_bps) = self.settings.max_bps_from_mid else {
            return Ok(());
        };

        let fair_value = match self.exchange.get_orderbook_price(token_id).await {
            Ok(p) => p,
            Err(source) => {
                warn!(
                    event = "order_rejected_price_band",
                    error = %source,
                    phase = %OrderPhase::Rejected,
                    "Price band reference unavailable"
                );
                metrics::inc_orders_rejected("price_band");
                return Err(ExecutionError::PriceBandUnavailable {
                    token_id: token_id.to_string(),
                    source,
                });
            }
        };

        let distance = distance_bps(price, fair_value);
        if distance > max_bps {
            warn!(
                event = "order_rejected_price_band",
                fair_value = %fair_value,
                distance_bps = %distance.round_dp(2),
                max_bps = %max_bps,
                phase = %OrderPhase::Rejected,
                "Price outside band"
            );
            metrics::inc_orders_rejected("price_band");
            return Err(ExecutionError::PriceBand {
                price,
                fair_value,
                distance_bps: distance.round_dp(2),
                max_bps,
            });
        }
        Ok(())
    }

    /// Cancel a resting order by exchange id.
    #[instrument(skip_all, fields(order_id = %order_id))]
    pub async fn cancel(&self, order_id: &str) -> Result<(), ExecutionError> {
        if self.settings.dry_run {
            info!(event = "order_cancel_dry_run", "Dry-run, cancel skipped");
            return Ok(());
        }
        if !self.exchange.supports_cancel() {
            warn!(event = "order_cancel_unsupported", "Exchange client cannot cancel");
            return Err(ExecutionError::CancelUnsupported);
        }

        let exchange = &self.exchange;
        let result = with_retry(&self.settings.retry, "order cancel", "order_cancel_error", move |_| {
            exchange.cancel_order(order_id)
        })
        .await;

        match result {
            Ok(_) => {}
            Err(ExecutionError::Rejected(ExchangeError::Unsupported(_))) => {
                return Err(ExecutionError::CancelUnsupported)
            }
            Err(e) => {
                error!(event = "order_cancel_error", error = %e, "Cancel failed");
                return Err(e);
            }
        }

        info!(event = "order_cancel_success", "Order cancelled");
        metrics::inc_orders_cancelled();

        let ledger = self.store.load_ledger();
        let tracked = ledger
            .open_orders()
            .into_iter()
            .find(|r| r.exchange_order_id.as_deref() == Some(order_id));
        if let Some(record) = tracked {
            if let Err(e) = self.store.mark_cancelled(&record, Utc::now()) {
                warn!(error = %e, "Failed to record cancellation");
            }
        }
        Ok(())
    }

    /// Cancel and re-place every open order older than `ttl`.
    pub async fn refresh(&self, open_orders: &[OrderRecord], ttl: Duration) -> RefreshReport {
        self.refresh_at(open_orders, ttl, Utc::now()).await
    }

    /// [`OrderEngine::refresh`] with an explicit clock.
    #[instrument(skip_all, fields(count = open_orders.len(), ttl_secs = ttl.as_secs()))]
    pub async fn refresh_at(
        &self,
        open_orders: &[OrderRecord],
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> RefreshReport {
        let mut report = RefreshReport::default();

        if self.settings.dry_run {
            info!(event = "order_refresh_skipped", reason = "dry_run", "Refresh skipped");
            report.skipped = open_orders.len();
            return report;
        }

        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);

        for record in open_orders {
            let Some(order_id) = record.exchange_order_id.as_deref() else {
                report.skipped += 1;
                continue;
            };
            if record.cancelled_at.is_some() || record.age(now) <= ttl {
                report.skipped += 1;
                continue;
            }

            if let Err(e) = self.cancel(order_id).await {
                error!(
                    event = "order_refresh_error",
                    exchange_order_id = %order_id,
                    error = %e,
                    "Refresh cancel failed"
                );
                report.failed += 1;
                continue;
            }

            match self
                .place_limit_at(record.price, record.size, record.side, &record.instrument, now)
                .await
            {
                Ok(new_id) => {
                    info!(
                        event = "order_refresh_success",
                        old_order_id = %order_id,
                        new_order_id = %new_id,
                        "Order refreshed"
                    );
                    metrics::inc_orders_refreshed();
                    report.refreshed += 1;
                }
                Err(e) => {
                    error!(
                        event = "order_refresh_error",
                        exchange_order_id = %order_id,
                        error = %e,
                        "Refresh re-place failed"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            event = "order_refresh_complete",
            refreshed = report.refreshed,
            skipped = report.skipped,
            failed = report.failed,
            "Refresh pass complete"
        );
        report
    }
}

fn validate_order(price: Decimal, size: Decimal, token_id: &str) -> Result<(), ExecutionError> {
    if token_id.is_empty() {
        return Err(ExecutionError::InvalidOrder("empty token id".to_string()));
    }
    if price < MIN_PRICE || price > MAX_PRICE {
        return Err(ExecutionError::InvalidOrder(format!(
            "price {} outside [{}, {}]",
            price, MIN_PRICE, MAX_PRICE
        )));
    }
    if size <= Decimal::ZERO {
        return Err(ExecutionError::InvalidOrder(format!("size {} must be positive", size)));
    }
    Ok(())
}
