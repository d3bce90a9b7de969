use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

use polymarket_mm::config::TimeBucket;
use polymarket_mm::error::{ExchangeError, ExecutionError, StoreError};
use polymarket_mm::exchange::MockExchange;
use polymarket_mm::trading::{
    client_order_id, dry_run_order_id, EngineSettings, OrderRecord, OrderStatus, RetryPolicy, Side,
};

use super::{engine, live, scratch_dir};

#[tokio::test]
async fn repeated_placement_in_one_bucket_submits_once() {
    let dir = scratch_dir("idempotent");
    let mock = Arc::new(MockExchange::new());
    let engine = engine(&mock, &dir, live());
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap();

    let first = engine.place_limit_at(dec!(0.48), dec!(100), Side::Buy, "yes", now).await.unwrap();
    let second = engine
        .place_limit_at(dec!(0.48), dec!(100), Side::Buy, "yes", now + ChronoDuration::seconds(20))
        .await
        .unwrap();

    assert_eq!(first, "mock-1");
    assert_eq!(second, first);
    assert_eq!(mock.submission_count(), 1);

    let open = engine.store().load_ledger().open_orders();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].exchange_order_id.as_deref(), Some("mock-1"));
}

#[tokio::test]
async fn equal_decimals_share_an_id() {
    let dir = scratch_dir("normalized");
    let mock = Arc::new(MockExchange::new());
    let engine = engine(&mock, &dir, live());
    let now = Utc::now();

    let a = engine.place_limit_at(dec!(0.50), dec!(10), Side::Sell, "yes", now).await.unwrap();
    let b = engine.place_limit_at(dec!(0.5), dec!(10.0), Side::Sell, "yes", now).await.unwrap();
    assert_eq!(a, b);
    assert_eq!(mock.submission_count(), 1);
}

#[tokio::test]
async fn next_bucket_submits_again() {
    let dir = scratch_dir("bucket");
    let mock = Arc::new(MockExchange::new());
    let engine = engine(
        &mock,
        &dir,
        EngineSettings {
            time_bucket: TimeBucket::Minute,
            ..live()
        },
    );
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 50).unwrap();

    engine.place_limit_at(dec!(0.48), dec!(100), Side::Buy, "yes", now).await.unwrap();
    engine
        .place_limit_at(dec!(0.48), dec!(100), Side::Buy, "yes", now + ChronoDuration::seconds(15))
        .await
        .unwrap();
    assert_eq!(mock.submission_count(), 2);
}

#[tokio::test]
async fn dry_run_records_without_submitting() {
    let dir = scratch_dir("dry-run");
    let mock = Arc::new(MockExchange::new());
    let engine = engine(&mock, &dir, EngineSettings::default());
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

    let id = engine.place_limit_at(dec!(0.52), dec!(50), Side::Sell, "yes", now).await.unwrap();
    let again = engine.place_limit_at(dec!(0.52), dec!(50), Side::Sell, "yes", now).await.unwrap();

    let cid = client_order_id("yes", Side::Sell, dec!(0.52), dec!(50), "202405010900");
    assert_eq!(id, dry_run_order_id(&cid));
    assert!(id.starts_with("stub_"));
    assert_eq!(again, id);
    assert_eq!(mock.attempt_count(), 0);

    let record = engine.store().load(&cid).unwrap().unwrap();
    assert_eq!(record.status, OrderStatus::DryRun);
    assert_eq!(record.exchange_order_id, None);
    assert_eq!(engine.store().load_ledger().orders.len(), 1);
}

#[tokio::test]
async fn live_placement_over_dry_run_record_conflicts() {
    let dir = scratch_dir("conflict");
    let mock = Arc::new(MockExchange::new());
    let now = Utc::now();

    let dry = engine(&mock, &dir, EngineSettings::default());
    dry.place_limit_at(dec!(0.40), dec!(10), Side::Buy, "yes", now).await.unwrap();

    let live_engine = engine(&mock, &dir, live());
    let err = live_engine
        .place_limit_at(dec!(0.40), dec!(10), Side::Buy, "yes", now)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExecutionError::Store(StoreError::StatusConflict { .. })
    ));
    assert_eq!(mock.attempt_count(), 0);
}

#[tokio::test]
async fn price_band_rejects_far_quotes_before_submission() {
    let dir = scratch_dir("band");
    let mock = Arc::new(MockExchange::new());
    mock.set_price("yes", dec!(0.50));
    let engine = engine(
        &mock,
        &dir,
        EngineSettings {
            max_bps_from_mid: Some(dec!(500)),
            ..live()
        },
    );

    let err = engine.place_limit(dec!(0.60), dec!(10), Side::Sell, "yes").await.unwrap_err();
    match err {
        ExecutionError::PriceBand {
            fair_value,
            distance_bps,
            max_bps,
            ..
        } => {
            assert_eq!(fair_value, dec!(0.50));
            assert_eq!(distance_bps, dec!(2000));
            assert_eq!(max_bps, dec!(500));
        }
        other => panic!("expected price band error, got {other:?}"),
    }
    assert_eq!(mock.attempt_count(), 0);

    engine.place_limit(dec!(0.52), dec!(10), Side::Sell, "yes").await.unwrap();
    assert_eq!(mock.submission_count(), 1);
}

#[tokio::test]
async fn price_band_needs_a_reference() {
    let dir = scratch_dir("band-missing");
    let mock = Arc::new(MockExchange::new());
    mock.break_price("yes");
    let engine = engine(
        &mock,
        &dir,
        EngineSettings {
            max_bps_from_mid: Some(dec!(500)),
            ..live()
        },
    );

    let err = engine.place_limit(dec!(0.50), dec!(10), Side::Buy, "yes").await.unwrap_err();
    assert!(matches!(err, ExecutionError::PriceBandUnavailable { .. }));
    assert_eq!(mock.attempt_count(), 0);
}

#[tokio::test]
async fn transient_failure_is_retried() {
    let dir = scratch_dir("retry");
    let mock = Arc::new(MockExchange::new());
    mock.fail_next_order(ExchangeError::Transient("timeout".into()));
    let engine = engine(
        &mock,
        &dir,
        EngineSettings {
            retry: RetryPolicy {
                max_attempts: 3,
                base_sleep: Duration::from_millis(1),
                jitter: Duration::ZERO,
            },
            ..live()
        },
    );
    let now = Utc::now();

    let id = engine.place_limit_at(dec!(0.45), dec!(20), Side::Buy, "yes", now).await.unwrap();
    assert_eq!(id, "mock-1");
    assert_eq!(mock.attempt_count(), 2);

    let record = &engine.store().load_ledger().open_orders()[0];
    assert_eq!(record.attempt, 2);
    assert_eq!(record.status, OrderStatus::Live);
}

#[tokio::test]
async fn exhausted_retries_leave_a_failed_record() {
    let dir = scratch_dir("exhausted");
    let mock = Arc::new(MockExchange::new());
    for _ in 0..3 {
        mock.fail_next_order(ExchangeError::Transient("502 bad gateway".into()));
    }
    let engine = engine(
        &mock,
        &dir,
        EngineSettings {
            retry: RetryPolicy {
                max_attempts: 3,
                base_sleep: Duration::from_millis(1),
                jitter: Duration::ZERO,
            },
            ..live()
        },
    );
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

    let err = engine.place_limit_at(dec!(0.45), dec!(20), Side::Buy, "yes", now).await.unwrap_err();
    match err {
        ExecutionError::Exhausted { attempts, last, .. } => {
            assert_eq!(attempts, 3);
            assert_eq!(last, ExchangeError::Transient("502 bad gateway".into()));
        }
        other => panic!("expected exhausted retries, got {other:?}"),
    }
    assert_eq!(mock.attempt_count(), 3);
    assert_eq!(mock.submission_count(), 0);

    let cid = client_order_id("yes", Side::Buy, dec!(0.45), dec!(20), "202405011000");
    let record = engine.store().load(&cid).unwrap().unwrap();
    assert_eq!(record.status, OrderStatus::Failed);
    assert_eq!(record.attempt, 3);
    assert!(engine.store().load_ledger().orders.is_empty());
}

#[tokio::test]
async fn rejection_is_not_retried() {
    let dir = scratch_dir("rejected");
    let mock = Arc::new(MockExchange::new());
    mock.fail_next_order(ExchangeError::Rejected("insufficient balance".into()));
    let engine = engine(
        &mock,
        &dir,
        EngineSettings {
            retry: RetryPolicy {
                max_attempts: 5,
                base_sleep: Duration::from_millis(1),
                jitter: Duration::ZERO,
            },
            ..live()
        },
    );

    let err = engine.place_limit(dec!(0.45), dec!(20), Side::Buy, "yes").await.unwrap_err();
    assert!(matches!(err, ExecutionError::Rejected(ExchangeError::Rejected(_))));
    assert_eq!(mock.attempt_count(), 1);
}

#[tokio::test]
async fn invalid_orders_never_reach_the_exchange() {
    let dir = scratch_dir("invalid");
    let mock = Arc::new(MockExchange::new());
    let engine = engine(&mock, &dir, live());

    for (price, size) in [(dec!(0), dec!(10)), (dec!(1), dec!(10)), (dec!(0.5), dec!(0))] {
        let err = engine.place_limit(price, size, Side::Buy, "yes").await.unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidOrder(_)));
    }
    assert_eq!(mock.attempt_count(), 0);
}

#[tokio::test]
async fn cancel_without_client_support() {
    let dir = scratch_dir("cancel-unsupported");
    let mock = Arc::new(MockExchange::without_cancel());
    let engine = engine(&mock, &dir, live());

    let err = engine.cancel("mock-1").await.unwrap_err();
    assert!(matches!(err, ExecutionError::CancelUnsupported));
}

#[tokio::test]
async fn cancel_in_dry_run_is_a_no_op() {
    let dir = scratch_dir("cancel-dry");
    let mock = Arc::new(MockExchange::new());
    let engine = engine(&mock, &dir, EngineSettings::default());

    engine.cancel("mock-1").await.unwrap();
    assert!(mock.cancelled().is_empty());
}

#[tokio::test]
async fn cancel_closes_the_ledger_entry() {
    let dir = scratch_dir("cancel");
    let mock = Arc::new(MockExchange::new());
    let engine = engine(&mock, &dir, live());

    let id = engine.place_limit(dec!(0.47), dec!(50), Side::Buy, "yes").await.unwrap();
    engine.cancel(&id).await.unwrap();

    assert_eq!(mock.cancelled(), vec![id]);
    assert!(engine.store().load_ledger().open_orders().is_empty());
}

#[tokio::test]
async fn refresh_requotes_only_stale_orders() {
    let dir = scratch_dir("refresh");
    let mock = Arc::new(MockExchange::new());
    let engine = engine(&mock, &dir, live());
    let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    engine
        .place_limit_at(dec!(0.48), dec!(100), Side::Buy, "yes", now - ChronoDuration::seconds(120))
        .await
        .unwrap();
    engine
        .place_limit_at(dec!(0.52), dec!(100), Side::Sell, "yes", now - ChronoDuration::seconds(10))
        .await
        .unwrap();

    let open = engine.store().load_ledger().open_orders();
    let report = engine.refresh_at(&open, Duration::from_secs(60), now).await;

    assert_eq!(report.refreshed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(mock.cancelled(), vec!["mock-1".to_string()]);

    let mut ids: Vec<String> = engine
        .store()
        .load_ledger()
        .open_orders()
        .into_iter()
        .filter_map(|r| r.exchange_order_id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["mock-2".to_string(), "mock-3".to_string()]);
}

#[tokio::test]
async fn refresh_counts_failed_cancels() {
    let dir = scratch_dir("refresh-fail");
    let mock = Arc::new(MockExchange::new());
    let engine = engine(&mock, &dir, live());
    let now = Utc::now();

    engine
        .place_limit_at(dec!(0.48), dec!(100), Side::Buy, "yes", now - ChronoDuration::seconds(300))
        .await
        .unwrap();
    mock.fail_next_cancel(ExchangeError::Rejected("unknown order".into()));

    let open = engine.store().load_ledger().open_orders();
    let report = engine.refresh_at(&open, Duration::from_secs(60), now).await;

    assert_eq!(report.failed, 1);
    assert_eq!(mock.submission_count(), 1);
    assert_eq!(engine.store().load_ledger().open_orders().len(), 1);
}

#[tokio::test]
async fn refresh_is_skipped_in_dry_run() {
    let dir = scratch_dir("refresh-dry");
    let mock = Arc::new(MockExchange::new());
    let engine = engine(&mock, &dir, EngineSettings::default());
    let now = Utc::now();

    let stale: Vec<OrderRecord> = ["ex-1", "ex-2"]
        .iter()
        .map(|id| OrderRecord {
            instrument: "yes".to_string(),
            side: Side::Buy,
            price: dec!(0.48),
            size: dec!(100),
            client_order_id: format!("cid-{}", id),
            exchange_order_id: Some(id.to_string()),
            status: OrderStatus::Live,
            created_at: now - ChronoDuration::seconds(300),
            attempt: 1,
            latency_ms: 5,
            cancelled_at: None,
        })
        .collect();

    let report = engine.refresh_at(&stale, Duration::from_secs(1), now).await;
    assert_eq!(report.refreshed, 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.failed, 0);
    assert!(mock.cancelled().is_empty());
    assert_eq!(mock.submission_count(), 0);
}
