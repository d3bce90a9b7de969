use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use serde_json::json;

use polymarket_mm::config::BotConfig;
use polymarket_mm::exchange::MockExchange;
use polymarket_mm::market::FileMarketSource;
use polymarket_mm::quoting::{ClipSizes, GridParams};
use polymarket_mm::risk::{Action, RiskLimits, RiskMonitor, RiskSnapshot};
use polymarket_mm::strategy::{QuotingCycle, QuotingSettings};
use polymarket_mm::trading::{EngineSettings, OrderEngine, OrderStore, Side};

use super::scratch_dir;

fn write_markets(bot_dir: &Path) {
    let markets = json!([
        {"id": "m1", "clobTokenIds": "[\"yes-1\", \"no-1\"]", "mid": 0.5},
        {"id": "m2", "clobTokenIds": ["yes-2", "no-2"], "outcomePrices": "[\"0.25\", \"0.75\"]"},
        {"id": "m3", "clobTokenIds": []}
    ]);
    std::fs::create_dir_all(bot_dir).unwrap();
    std::fs::write(
        bot_dir.join("selected_markets.json"),
        serde_json::to_vec(&markets).unwrap(),
    )
    .unwrap();
}

fn dry_run_engine(bot_dir: &Path) -> OrderEngine {
    OrderEngine::new(
        Arc::new(MockExchange::new()),
        OrderStore::open(bot_dir).unwrap(),
        EngineSettings::default(),
    )
}

fn limits(global_ev_cap: rust_decimal::Decimal) -> RiskLimits {
    RiskLimits {
        per_market_ev_cap: dec!(1000),
        global_ev_cap,
        adverse_threshold_cents: dec!(10),
    }
}

#[tokio::test]
async fn snapshot_nets_ledger_positions() {
    let root = scratch_dir("risk-net");
    let bot_dir = root.join("market_maker");
    write_markets(&bot_dir);

    let engine = dry_run_engine(&bot_dir);
    engine.place_limit(dec!(0.48), dec!(100), Side::Buy, "yes-1").await.unwrap();
    engine.place_limit(dec!(0.52), dec!(40), Side::Sell, "yes-1").await.unwrap();
    engine.place_limit(dec!(0.23), dec!(200), Side::Buy, "yes-2").await.unwrap();
    engine.place_limit(dec!(0.52), dec!(500), Side::Buy, "no-1").await.unwrap();

    let snapshot_path = root.join("actions").join("risk_actions.json");
    let monitor = RiskMonitor::new(limits(dec!(5000)), root.to_path_buf(), vec!["market_maker".to_string()], &snapshot_path);
    let snapshot = monitor.tick().await.unwrap();

    assert_eq!(snapshot.per_market_ev["m1"], dec!(30.0));
    assert_eq!(snapshot.per_market_ev["m2"], dec!(50.00));
    assert_eq!(snapshot.global_ev_abs, dec!(80.00));
    assert_eq!(snapshot.action_for("m1"), Action::None);
    assert!(!snapshot.per_market.contains_key("m3"));

    let on_disk = RiskSnapshot::load(&snapshot_path).unwrap().unwrap();
    assert_eq!(on_disk, snapshot);
}

#[tokio::test]
async fn global_breach_flattens_every_market() {
    let root = scratch_dir("risk-global");
    let bot_dir = root.join("market_maker");
    write_markets(&bot_dir);

    let engine = dry_run_engine(&bot_dir);
    engine.place_limit(dec!(0.48), dec!(100), Side::Buy, "yes-1").await.unwrap();
    engine.place_limit(dec!(0.23), dec!(100), Side::Buy, "yes-2").await.unwrap();

    let monitor = RiskMonitor::new(
        limits(dec!(60)),
        root.to_path_buf(),
        vec!["market_maker".to_string()],
        root.join("risk_actions.json"),
    );
    let snapshot = monitor.tick().await.unwrap();

    assert_eq!(snapshot.global_ev_abs, dec!(75.00));
    assert!(snapshot.is_global_breach());
    assert_eq!(snapshot.action_for("m1"), Action::Flatten);
    assert_eq!(snapshot.action_for("m2"), Action::Flatten);
}

#[tokio::test]
async fn bad_outcome_prices_do_not_abort_the_tick() {
    let root = scratch_dir("risk-bad-prices");
    let bot_dir = root.join("market_maker");
    std::fs::create_dir_all(&bot_dir).unwrap();
    let markets = json!([
        {"id": "good", "clobTokenIds": ["yes-g", "no-g"], "mid": 0.5},
        {"id": "bad", "clobTokenIds": ["yes-b", "no-b"], "outcomePrices": ["1.5", "1.7"]}
    ]);
    std::fs::write(
        bot_dir.join("selected_markets.json"),
        serde_json::to_vec(&markets).unwrap(),
    )
    .unwrap();

    let engine = dry_run_engine(&bot_dir);
    engine.place_limit(dec!(0.48), dec!(100), Side::Buy, "yes-g").await.unwrap();
    engine.place_limit(dec!(0.48), dec!(100), Side::Buy, "yes-b").await.unwrap();

    let snapshot_path = root.join("risk_actions.json");
    let monitor = RiskMonitor::new(limits(dec!(5000)), root.to_path_buf(), vec!["market_maker".to_string()], &snapshot_path);
    let snapshot = monitor.tick().await.unwrap();

    assert_eq!(snapshot.per_market_ev["good"], dec!(50.0));
    assert!(!snapshot.per_market.contains_key("bad"));
    assert!(snapshot_path.exists());
}

#[tokio::test]
async fn missing_bot_state_gives_an_empty_snapshot() {
    let root = scratch_dir("risk-empty");
    let monitor = RiskMonitor::new(
        limits(dec!(5000)),
        root.to_path_buf(),
        vec!["nobody".to_string()],
        root.join("risk_actions.json"),
    );

    let snapshot = monitor.tick().await.unwrap();
    assert!(snapshot.per_market.is_empty());
    assert_eq!(snapshot.global_ev_abs, dec!(0));
    assert_eq!(snapshot.global_cap, dec!(5000));
}

#[tokio::test]
async fn monitor_from_config_writes_to_actions_dir() {
    let root = scratch_dir("risk-config");
    let yaml = format!(
        r#"
ops:
  local_state_root: {root}
  actions_dir: {root}/actions
  monitor_bots: [market_maker]
risk:
  per_market_ev_cap: 1000
  global_ev_cap: 5000
  fast_move_cents: 10
"#,
        root = root.display()
    );
    let config = BotConfig::from_yaml(&yaml).unwrap();
    config.validate_risk().unwrap();

    let monitor = RiskMonitor::from_config(&config).unwrap();
    assert_eq!(monitor.snapshot_path(), root.join("actions").join("risk_actions.json"));
    monitor.tick().await.unwrap();
    assert!(monitor.snapshot_path().exists());
}

#[tokio::test]
async fn quoting_stops_on_flattened_markets() {
    let root = scratch_dir("risk-feedback");
    let bot_dir = root.join("market_maker");
    write_markets(&bot_dir);

    let engine = Arc::new(dry_run_engine(&bot_dir));
    engine.place_limit(dec!(0.48), dec!(2500), Side::Buy, "yes-1").await.unwrap();

    let snapshot_path = root.join("risk_actions.json");
    let monitor = RiskMonitor::new(
        limits(dec!(5000)),
        root.to_path_buf(),
        vec!["market_maker".to_string()],
        &snapshot_path,
    );
    let snapshot = monitor.tick().await.unwrap();
    assert_eq!(snapshot.action_for("m1"), Action::Flatten);
    assert_eq!(snapshot.action_for("m2"), Action::None);

    let settings = QuotingSettings {
        grid: GridParams {
            levels_per_side: 1,
            level_spacing_cents: 1,
            base_spread_cents: 2,
            min_spread_cents: 1,
        },
        clips: ClipSizes {
            top: dec!(10),
            deep: dec!(10),
        },
        skew_k: dec!(0),
        per_market_ev_cap: dec!(1000),
        widen_addon_cents: 1,
        refresh_ttl: None,
    };
    let cycle = QuotingCycle::new(
        Arc::new(FileMarketSource::new(bot_dir.join("selected_markets.json"))),
        engine,
        settings,
    )
    .with_risk_actions(&snapshot_path);

    let summary = cycle.tick().await.unwrap();
    assert_eq!(summary.markets_seen, 3);
    assert_eq!(summary.quoted, 1);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.orders_placed, 2);
}
