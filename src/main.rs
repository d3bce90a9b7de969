//! Polymarket grid market maker entry point.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use polymarket_mm::api::{create_router, AppState};
use polymarket_mm::config::{BotConfig, ExchangeEnv};
use polymarket_mm::exchange::{ClobClient, ExchangeClient, MockExchange};
use polymarket_mm::market::FileMarketSource;
use polymarket_mm::metrics;
use polymarket_mm::risk::RiskMonitor;
use polymarket_mm::strategy::{BotRunner, QuotingCycle, QuotingSettings, RunnerSettings};
use polymarket_mm::trading::{OrderEngine, Side};
use polymarket_mm::utils::shutdown_signal;

/// Grid market maker for Polymarket binary markets.
#[derive(Parser, Debug)]
#[command(name = "polymarket-mm")]
#[command(about = "Grid quoting and EV risk bots for Polymarket")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Bot config file.
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Override `ops.dry_run`.
    #[arg(long, global = true)]
    dry_run: Option<bool>,

    /// Use the in-process mock exchange instead of the CLOB.
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the quoting loop (default).
    Run,

    /// Run the risk monitor loop.
    Risk,

    /// Place one limit order through the order engine.
    Place {
        /// CLOB token id.
        #[arg(long)]
        token: String,
        /// BUY or SELL.
        #[arg(long)]
        side: Side,
        /// Limit price in [0.01, 0.99].
        #[arg(long)]
        price: Decimal,
        /// Order size.
        #[arg(long)]
        size: Decimal,
    },

    /// Cancel one order by exchange id.
    Cancel {
        /// Exchange order id.
        order_id: String,
    },

    /// Cancel and re-place ledger orders older than the TTL.
    Refresh {
        /// TTL in seconds; defaults to `quoting.refresh_ttl_seconds`.
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Check configuration validity.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    let loaded = BotConfig::load(&args.config);
    let log_path = loaded.as_ref().ok().and_then(|c| c.ops.log_path.clone());
    init_tracing(args.verbose, log_path.as_deref())?;

    if let Some(Command::CheckConfig) = args.command {
        return cmd_check_config(&args.config, loaded, args.offline);
    }

    let mut config = loaded.with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(dry_run) = args.dry_run {
        config.ops.dry_run = dry_run;
    }

    match args.command {
        Some(Command::Run) | None => cmd_run(config, args.offline).await,
        Some(Command::Risk) => cmd_risk(config).await,
        Some(Command::Place {
            token,
            side,
            price,
            size,
        }) => cmd_place(config, args.offline, token, side, price, size).await,
        Some(Command::Cancel { order_id }) => cmd_cancel(config, args.offline, order_id).await,
        Some(Command::Refresh { ttl }) => cmd_refresh(config, args.offline, ttl).await,
        Some(Command::CheckConfig) => Ok(()),
    }
}

/// Stdout logging, plus a JSON file sink when `ops.log_path` is set.
fn init_tracing(verbose: bool, log_path: Option<&Path>) -> anyhow::Result<()> {
    let filter = if verbose {
        EnvFilter::new("polymarket_mm=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let file_layer = match log_path {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow!("log path {} has no file name", path.display()))?;
            std::fs::create_dir_all(dir)?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            // Keep the writer flushing for the life of the process.
            Box::leak(Box::new(guard));
            Some(fmt::layer().json().with_writer(writer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(file_layer)
        .with(filter)
        .init();
    Ok(())
}

fn build_exchange(offline: bool) -> anyhow::Result<Arc<dyn ExchangeClient>> {
    if offline {
        let mock = MockExchange::new();
        mock.set_default_price(dec!(0.5));
        info!("Using offline mock exchange");
        return Ok(Arc::new(mock));
    }
    let env = ExchangeEnv::load()?;
    Ok(Arc::new(ClobClient::new(&env)?))
}

fn build_engine(config: &BotConfig, offline: bool) -> anyhow::Result<Arc<OrderEngine>> {
    if !config.ops.dry_run && !offline {
        ExchangeEnv::load()?.private_key()?;
    }
    let exchange = build_exchange(offline)?;
    let engine = OrderEngine::from_ops(exchange, &config.ops)?;
    info!(
        mode = if engine.is_dry_run() { "DRY RUN" } else { "LIVE" },
        state_dir = %config.ops.state_dir.display(),
        "Order engine ready"
    );
    Ok(Arc::new(engine))
}

/// Serve the health/status/metrics API if `ops.metrics_port` is set.
async fn start_api(config: &BotConfig) -> anyhow::Result<AppState> {
    let mut state = AppState::new();

    let Some(port) = config.ops.metrics_port else {
        metrics::init_metrics();
        return Ok(state);
    };

    match metrics::install_recorder() {
        Ok(handle) => state = state.with_prometheus(handle),
        Err(e) => warn!(error = %e, "Failed to install Prometheus recorder"),
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(state.clone());

    // Spawn HTTP server
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
        {
            error!(error = %e, "HTTP server failed");
        }
    });

    Ok(state)
}

async fn run_bot(mut runner: BotRunner, name: &str) -> anyhow::Result<()> {
    info!("========================================");
    info!("{} STARTED", name);
    info!("========================================");

    if !runner.run_until(shutdown_signal()).await {
        warn!("{} tick still in flight at exit", name);
    }
    info!("{} stopped", name);
    Ok(())
}

/// Run the quoting loop.
async fn cmd_run(config: BotConfig, offline: bool) -> anyhow::Result<()> {
    config.validate_quoting()?;
    let settings = QuotingSettings::from_config(&config)?;
    let engine = build_engine(&config, offline)?;

    let markets_path = config
        .ops
        .selected_markets_path
        .clone()
        .unwrap_or_else(|| config.ops.state_dir.join("selected_markets.json"));
    info!(path = %markets_path.display(), "Reading routed markets");

    let mut cycle = QuotingCycle::new(Arc::new(FileMarketSource::new(markets_path)), engine, settings);
    if let Some(path) = &config.ops.risk_actions_path {
        info!(path = %path.display(), "Honouring risk snapshot");
        cycle = cycle.with_risk_actions(path);
    }

    let state = start_api(&config).await?;
    let runner = BotRunner::new(Arc::new(cycle), RunnerSettings::from(&config.ops)).with_state(state);
    run_bot(runner, "MARKET MAKER").await
}

/// Run the risk monitor loop.
async fn cmd_risk(config: BotConfig) -> anyhow::Result<()> {
    config.validate_risk()?;
    let monitor = RiskMonitor::from_config(&config)?;
    info!(
        snapshot = %monitor.snapshot_path().display(),
        bots = ?config.ops.monitor_bots,
        "Risk monitor configured"
    );

    let state = start_api(&config).await?;
    let runner = BotRunner::new(Arc::new(monitor), RunnerSettings::from(&config.ops)).with_state(state);
    run_bot(runner, "RISK MONITOR").await
}

/// Place one order.
async fn cmd_place(
    config: BotConfig,
    offline: bool,
    token: String,
    side: Side,
    price: Decimal,
    size: Decimal,
) -> anyhow::Result<()> {
    config.validate()?;
    metrics::init_metrics();
    let engine = build_engine(&config, offline)?;

    let order_id = engine.place_limit(price, size, side, &token).await?;
    println!("{}", order_id);
    Ok(())
}

/// Cancel one order.
async fn cmd_cancel(config: BotConfig, offline: bool, order_id: String) -> anyhow::Result<()> {
    config.validate()?;
    metrics::init_metrics();
    let engine = build_engine(&config, offline)?;

    engine.cancel(&order_id).await?;
    println!("cancelled {}", order_id);
    Ok(())
}

/// One TTL refresh pass over the ledger.
async fn cmd_refresh(config: BotConfig, offline: bool, ttl: Option<u64>) -> anyhow::Result<()> {
    config.validate()?;
    metrics::init_metrics();
    let ttl = ttl
        .or_else(|| config.quoting.as_ref().and_then(|q| q.refresh_ttl_seconds))
        .ok_or_else(|| anyhow!("no --ttl given and quoting.refresh_ttl_seconds is unset"))?;
    let engine = build_engine(&config, offline)?;

    let open = engine.store().load_ledger().open_orders();
    let report = engine.refresh(&open, Duration::from_secs(ttl)).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Check configuration validity.
fn cmd_check_config(
    path: &Path,
    loaded: Result<BotConfig, polymarket_mm::error::ConfigError>,
    offline: bool,
) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("POLYMARKET MM - CONFIGURATION CHECK");
    println!("======================================================================");

    // Load configuration
    print!("Loading {}... ", path.display());
    let config = match loaded {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow!("Configuration load failed"));
        }
    };

    // Validate configuration
    print!("Validating ops... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow!("Configuration validation failed"));
        }
    }

    let quoting = config.quoting.is_some().then(|| config.validate_quoting());
    let risk = config.risk.is_some().then(|| config.validate_risk());
    for (section, result) in [("quoting", quoting), ("risk", risk)] {
        match result {
            None => println!("Validating {}... SKIPPED (section absent)", section),
            Some(Ok(())) => println!("Validating {}... OK", section),
            Some(Err(e)) => {
                println!("Validating {}... FAILED", section);
                println!("  Error: {}", e);
                return Err(anyhow!("Configuration validation failed"));
            }
        }
    }

    // Check exchange credentials
    if !offline {
        print!("Checking exchange credentials... ");
        let client = ExchangeEnv::load().and_then(|env| ClobClient::new(&env));
        match client {
            Ok(client) => {
                println!("OK");
                match client.address() {
                    Some(addr) => println!("  Wallet address: {}", addr),
                    None if config.ops.dry_run => println!("  No private key (dry run only)"),
                    None => {
                        println!("  ERROR: live mode requires POLYMARKET_PRIVATE_KEY");
                        return Err(anyhow!("Private key missing"));
                    }
                }
            }
            Err(e) => {
                println!("FAILED");
                println!("  Error: {}", e);
                return Err(anyhow!("Exchange credentials invalid"));
            }
        }
    }

    // Show configuration summary
    let ops = &config.ops;
    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Dry Run: {}", ops.dry_run);
    println!("  State Dir: {}", ops.state_dir.display());
    println!("  Tick: {}s (max tick retries {})", ops.tick_seconds, ops.max_tick_retries);
    println!(
        "  Retry: {} attempts, base {}s, jitter {}ms",
        ops.retry.max_attempts, ops.retry.base_sleep_seconds, ops.retry.jitter_ms
    );
    println!(
        "  Rate Limit: {}s min interval, jitter {}ms",
        ops.rate_limit.min_interval_seconds, ops.rate_limit.jitter_ms
    );
    match ops.price_band.max_bps_from_mid {
        Some(bps) => println!("  Price Band: {} bps", bps),
        None => println!("  Price Band: disabled"),
    }
    println!("  Time Bucket: {}", ops.time_bucket);
    if let Some(q) = &config.quoting {
        println!(
            "  Ladder: {} levels/side, spacing {}c, half-spread {}c (min {}c)",
            q.levels_per_side, q.level_spacing_cents, q.base_spread_cents, q.min_spread_cents
        );
        println!("  Clips: top {} / deep {}", q.clip_usdc_top, q.clip_usdc_deep);
    }
    if let Some(inv) = &config.inventory {
        println!("  Per-Market EV Cap: {}", inv.per_market_ev_cap);
    }
    if let Some(r) = &config.risk {
        println!(
            "  Risk Caps: per-market {}, global {}, fast move {}c",
            r.per_market_ev_cap, r.global_ev_cap, r.fast_move_cents
        );
    }
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}
