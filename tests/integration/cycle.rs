use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use polymarket_mm::error::ExchangeError;
use polymarket_mm::exchange::MockExchange;
use polymarket_mm::market::{Market, StaticMarketSource};
use polymarket_mm::quoting::{ClipSizes, GridParams};
use polymarket_mm::risk::{Action, RiskSnapshot};
use polymarket_mm::strategy::{InventoryFeed, QuotingCycle, QuotingSettings};
use polymarket_mm::trading::{EngineSettings, OrderStatus, Side};

use super::{engine, live, scratch_dir};

fn market(id: &str, token: Option<&str>, fair_value: Option<Decimal>) -> Market {
    Market {
        id: id.to_string(),
        question: None,
        token_ids: token.map(|t| vec![t.to_string(), format!("{t}-no")]).unwrap_or_default(),
        fair_value,
        volume: Decimal::ZERO,
        spread_cents: None,
    }
}

fn settings(top: Decimal, deep: Decimal) -> QuotingSettings {
    QuotingSettings {
        grid: GridParams {
            levels_per_side: 3,
            level_spacing_cents: 1,
            base_spread_cents: 2,
            min_spread_cents: 1,
        },
        clips: ClipSizes { top, deep },
        skew_k: Decimal::ZERO,
        per_market_ev_cap: dec!(1000),
        widen_addon_cents: 1,
        refresh_ttl: None,
    }
}

fn cycle(
    mock: &Arc<MockExchange>,
    dir: &std::path::Path,
    engine_settings: EngineSettings,
    markets: Vec<Market>,
    quoting: QuotingSettings,
) -> QuotingCycle {
    let engine = Arc::new(engine(mock, dir, engine_settings));
    QuotingCycle::new(Arc::new(StaticMarketSource::new(markets)), engine, quoting)
}

fn quotes(mock: &MockExchange) -> Vec<(Side, Decimal, Decimal)> {
    mock.submissions()
        .into_iter()
        .map(|s| (s.side, s.price, s.size))
        .collect()
}

#[tokio::test]
async fn ladder_within_cap_is_placed_untouched() {
    let dir = scratch_dir("cycle-pass");
    let mock = Arc::new(MockExchange::new());
    let cycle = cycle(
        &mock,
        &dir,
        live(),
        vec![market("m1", Some("yes"), Some(dec!(0.5)))],
        settings(dec!(100), dec!(50)),
    );

    let summary = cycle.tick().await.unwrap();
    assert_eq!(summary.markets_seen, 1);
    assert_eq!(summary.quoted, 1);
    assert_eq!(summary.orders_placed, 6);
    assert_eq!(summary.orders_trimmed, 0);

    assert_eq!(
        quotes(&mock),
        vec![
            (Side::Buy, dec!(0.48), dec!(100)),
            (Side::Buy, dec!(0.47), dec!(50)),
            (Side::Buy, dec!(0.46), dec!(50)),
            (Side::Sell, dec!(0.52), dec!(100)),
            (Side::Sell, dec!(0.53), dec!(50)),
            (Side::Sell, dec!(0.54), dec!(50)),
        ]
    );
    assert!(mock.submissions().iter().all(|s| s.token_id == "yes"));
}

#[tokio::test]
async fn oversized_ladder_is_trimmed_to_a_prefix() {
    let dir = scratch_dir("cycle-trim");
    let mock = Arc::new(MockExchange::new());
    let cycle = cycle(
        &mock,
        &dir,
        live(),
        vec![market("m1", Some("yes"), Some(dec!(0.5)))],
        settings(dec!(300), dec!(200)),
    );

    let summary = cycle.tick().await.unwrap();
    assert_eq!(summary.orders_placed, 4);
    assert_eq!(summary.orders_trimmed, 2);

    let placed = quotes(&mock);
    assert_eq!(
        placed,
        vec![
            (Side::Buy, dec!(0.48), dec!(300)),
            (Side::Buy, dec!(0.47), dec!(200)),
            (Side::Buy, dec!(0.46), dec!(200)),
            (Side::Sell, dec!(0.52), dec!(300)),
        ]
    );
    let total: Decimal = placed.iter().map(|(_, _, size)| *size).sum();
    assert!(total <= dec!(1000));
}

#[tokio::test]
async fn dry_run_tick_fills_the_ledger() {
    let dir = scratch_dir("cycle-dry");
    let mock = Arc::new(MockExchange::new());
    let cycle = cycle(
        &mock,
        &dir,
        EngineSettings::default(),
        vec![market("m1", Some("yes"), Some(dec!(0.5)))],
        settings(dec!(100), dec!(50)),
    );

    let summary = cycle.tick().await.unwrap();
    assert_eq!(summary.orders_placed, 6);
    assert_eq!(mock.attempt_count(), 0);

    let ledger = cycle.engine().store().load_ledger();
    assert_eq!(ledger.orders.len(), 6);
    assert!(ledger.orders.iter().all(|r| r.status == OrderStatus::DryRun));
}

#[tokio::test]
async fn missing_fair_value_falls_back_to_exchange() {
    let dir = scratch_dir("cycle-fallback");
    let mock = Arc::new(MockExchange::new());
    mock.set_price("priced", dec!(0.30));
    mock.break_price("broken");
    let cycle = cycle(
        &mock,
        &dir,
        live(),
        vec![
            market("no-tokens", None, Some(dec!(0.5))),
            market("broken", Some("broken"), None),
            market("priced", Some("priced"), None),
        ],
        settings(dec!(100), dec!(50)),
    );

    let summary = cycle.tick().await.unwrap();
    assert_eq!(summary.markets_seen, 3);
    assert_eq!(summary.quoted, 1);
    assert_eq!(summary.skipped, 2);

    let placed = quotes(&mock);
    assert_eq!(placed.len(), 6);
    assert_eq!(placed[0], (Side::Buy, dec!(0.28), dec!(100)));
    assert_eq!(placed[3], (Side::Sell, dec!(0.32), dec!(100)));
}

#[tokio::test]
async fn out_of_range_fair_value_is_not_quoted() {
    let dir = scratch_dir("cycle-bad-fv");
    let mock = Arc::new(MockExchange::new());
    mock.break_price("bad");
    let cycle = cycle(
        &mock,
        &dir,
        live(),
        vec![market("bad", Some("bad"), Some(dec!(1.6)))],
        settings(dec!(100), dec!(50)),
    );

    let summary = cycle.tick().await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(mock.submission_count(), 0);
}

#[tokio::test]
async fn empty_market_list_ends_the_tick() {
    let dir = scratch_dir("cycle-empty");
    let mock = Arc::new(MockExchange::new());
    let cycle = cycle(&mock, &dir, live(), Vec::new(), settings(dec!(100), dec!(50)));

    let summary = cycle.tick().await.unwrap();
    assert_eq!(summary.markets_seen, 0);
    assert_eq!(mock.attempt_count(), 0);
}

#[tokio::test]
async fn one_failed_order_does_not_stop_the_rest() {
    let dir = scratch_dir("cycle-isolation");
    let mock = Arc::new(MockExchange::new());
    mock.fail_next_order(ExchangeError::Rejected("post-only would cross".into()));
    let cycle = cycle(
        &mock,
        &dir,
        live(),
        vec![
            market("m1", Some("a"), Some(dec!(0.5))),
            market("m2", Some("b"), Some(dec!(0.6))),
        ],
        settings(dec!(100), dec!(50)),
    );

    let summary = cycle.tick().await.unwrap();
    assert_eq!(summary.quoted, 2);
    assert_eq!(summary.orders_failed, 1);
    assert_eq!(summary.orders_placed, 11);
    assert_eq!(mock.submission_count(), 11);
}

#[tokio::test]
async fn risk_actions_gate_and_widen_quotes() {
    let dir = scratch_dir("cycle-risk");
    let snapshot_path = dir.join("actions").join("risk_actions.json");
    let mut snapshot = RiskSnapshot {
        global_ev_abs: dec!(10),
        global_cap: dec!(5000),
        ..Default::default()
    };
    snapshot.per_market.insert("flat".to_string(), Action::Flatten);
    snapshot.per_market.insert("paused".to_string(), Action::Pause);
    snapshot.per_market.insert("wide".to_string(), Action::Widen);
    snapshot.save(&snapshot_path).unwrap();

    let mock = Arc::new(MockExchange::new());
    let cycle = cycle(
        &mock,
        &dir,
        live(),
        vec![
            market("flat", Some("f"), Some(dec!(0.5))),
            market("paused", Some("p"), Some(dec!(0.5))),
            market("wide", Some("w"), Some(dec!(0.5))),
        ],
        settings(dec!(100), dec!(50)),
    )
    .with_risk_actions(&snapshot_path);

    let summary = cycle.tick().await.unwrap();
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.quoted, 1);

    let prices: Vec<Decimal> = quotes(&mock).into_iter().map(|(_, price, _)| price).collect();
    assert_eq!(
        prices,
        vec![dec!(0.47), dec!(0.46), dec!(0.45), dec!(0.53), dec!(0.54), dec!(0.55)]
    );
}

struct LongInventory;

impl InventoryFeed for LongInventory {
    fn inventory_ratio(&self, _market: &Market) -> Decimal {
        dec!(-0.5)
    }
}

#[tokio::test]
async fn inventory_skews_the_ladder() {
    let dir = scratch_dir("cycle-skew");
    let mock = Arc::new(MockExchange::new());
    let mut quoting = settings(dec!(100), dec!(50));
    quoting.skew_k = dec!(0.04);
    let cycle = cycle(
        &mock,
        &dir,
        live(),
        vec![market("m1", Some("yes"), Some(dec!(0.5)))],
        quoting,
    )
    .with_inventory(Arc::new(LongInventory));

    cycle.tick().await.unwrap();
    let placed = quotes(&mock);
    assert_eq!(placed[0].1, dec!(0.46));
    assert_eq!(placed[3].1, dec!(0.50));
}

#[tokio::test]
async fn tick_refreshes_stale_orders_first() {
    let dir = scratch_dir("cycle-refresh");
    let mock = Arc::new(MockExchange::new());
    let mut quoting = settings(dec!(100), dec!(50));
    quoting.refresh_ttl = Some(Duration::from_secs(3600));
    let cycle = cycle(
        &mock,
        &dir,
        live(),
        vec![market("m1", Some("yes"), Some(dec!(0.5)))],
        quoting,
    );

    let first = cycle.tick().await.unwrap();
    let refresh = first.refresh.unwrap();
    assert_eq!(refresh.refreshed, 0);
    assert_eq!(refresh.skipped, 0);

    let second = cycle.tick().await.unwrap();
    assert_eq!(second.refresh.unwrap().skipped, 6);
    assert!(mock.cancelled().is_empty());
}
