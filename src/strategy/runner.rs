//! Periodic bot loop with explicit start/stop and bounded tick retries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{error, info, warn};

use super::cycle::{QuotingCycle, QuotingSummary};
use crate::api::AppState;
use crate::config::OpsConfig;
use crate::error::BotError;
use crate::metrics;
use crate::risk::{RiskMonitor, RiskSnapshot};
use crate::trading::RetryPolicy;

/// What a tick produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TickReport {
    /// Quoting bot summary.
    Quoting(QuotingSummary),
    /// Risk bot snapshot.
    Risk(RiskSnapshot),
}

/// A unit of periodic work.
#[async_trait]
pub trait Bot: Send + Sync {
    /// Name used in logs and metrics.
    fn name(&self) -> &str;

    /// Run one tick.
    async fn tick(&self) -> Result<TickReport, BotError>;
}

#[async_trait]
impl Bot for QuotingCycle {
    fn name(&self) -> &str {
        "market_maker"
    }

    async fn tick(&self) -> Result<TickReport, BotError> {
        QuotingCycle::tick(self).await.map(TickReport::Quoting)
    }
}

#[async_trait]
impl Bot for RiskMonitor {
    fn name(&self) -> &str {
        "risk"
    }

    async fn tick(&self) -> Result<TickReport, BotError> {
        RiskMonitor::tick(self).await.map(TickReport::Risk)
    }
}

/// Loop timing for [`BotRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Time between tick starts.
    pub interval: Duration,
    /// Extra attempts for a failing tick before waiting for the next interval.
    pub max_tick_retries: u32,
    /// Backoff between attempts of the same tick.
    pub backoff: RetryPolicy,
    /// How long `stop` waits for the loop to exit.
    pub stop_timeout: Duration,
}

impl From<&OpsConfig> for RunnerSettings {
    fn from(ops: &OpsConfig) -> Self {
        Self {
            interval: ops.tick_interval(),
            max_tick_retries: ops.max_tick_retries,
            backoff: RetryPolicy::from(&ops.retry),
            stop_timeout: Duration::from_secs(ops.stop_timeout_seconds),
        }
    }
}

/// Drives a [`Bot`] on a timer until stopped.
pub struct BotRunner {
    bot: Arc<dyn Bot>,
    settings: Arc<RunnerSettings>,
    state: Option<AppState>,
    running: Arc<AtomicBool>,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl BotRunner {
    /// Create a stopped runner.
    pub fn new(bot: Arc<dyn Bot>, settings: RunnerSettings) -> Self {
        Self {
            bot,
            settings: Arc::new(settings),
            state: None,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: None,
            handle: None,
        }
    }

    /// Publish tick results to the status API.
    pub fn with_state(mut self, state: AppState) -> Self {
        self.state = Some(state);
        self
    }

    /// Whether the loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run a single tick with retries, outside the loop.
    pub async fn run_once(&self) -> Result<TickReport, BotError> {
        tick_with_retries(self.bot.as_ref(), &self.settings, self.state.as_ref(), None).await
    }

    /// Spawn the loop. Returns false if it is already running.
    pub fn start(&mut self) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(bot = %self.bot.name(), "Runner already started");
            return false;
        }

        let (tx, rx) = watch::channel(false);
        let bot = Arc::clone(&self.bot);
        let settings = Arc::clone(&self.settings);
        let state = self.state.clone();
        let running = Arc::clone(&self.running);

        if let Some(state) = &state {
            state.set_ready(true);
        }
        info!(bot = %bot.name(), interval_secs = settings.interval.as_secs(), "Bot loop starting");

        self.shutdown = Some(tx);
        self.handle = Some(tokio::spawn(async move {
            run_loop(bot.as_ref(), &settings, state.as_ref(), rx).await;
            running.store(false, Ordering::SeqCst);
            if let Some(state) = &state {
                state.set_ready(false);
            }
        }));
        true
    }

    /// Signal the loop to exit and wait up to the stop timeout for it.
    ///
    /// Returns false when the in-flight tick outlives the timeout; the task
    /// is left to finish on its own.
    pub async fn stop(&mut self) -> bool {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        let Some(handle) = self.handle.take() else {
            return true;
        };

        match tokio::time::timeout(self.settings.stop_timeout, handle).await {
            Ok(Ok(())) => {
                info!(bot = %self.bot.name(), "Bot loop stopped");
                true
            }
            Ok(Err(e)) => {
                error!(bot = %self.bot.name(), error = %e, "Bot loop task failed");
                self.running.store(false, Ordering::SeqCst);
                true
            }
            Err(_) => {
                warn!(
                    bot = %self.bot.name(),
                    timeout_secs = self.settings.stop_timeout.as_secs(),
                    "Bot loop did not stop in time"
                );
                false
            }
        }
    }

    /// Run until `signal` resolves, then stop.
    pub async fn run_until<F>(&mut self, signal: F) -> bool
    where
        F: std::future::Future<Output = ()>,
    {
        self.start();
        signal.await;
        self.stop().await
    }
}

async fn run_loop(
    bot: &dyn Bot,
    settings: &RunnerSettings,
    state: Option<&AppState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }

        // Errors are already logged and counted.
        let _ = tick_with_retries(bot, settings, state, Some(&mut shutdown)).await;
    }
}

async fn tick_with_retries(
    bot: &dyn Bot,
    settings: &RunnerSettings,
    state: Option<&AppState>,
    mut shutdown: Option<&mut watch::Receiver<bool>>,
) -> Result<TickReport, BotError> {
    let attempts = settings.max_tick_retries.saturating_add(1);
    let mut attempt = 1;

    loop {
        metrics::inc_ticks(bot.name());
        let err = match bot.tick().await {
            Ok(report) => {
                if let Some(state) = state {
                    state.record_tick(bot.name(), &report).await;
                }
                return Ok(report);
            }
            Err(e) => e,
        };

        metrics::inc_tick_failures(bot.name());
        if attempt >= attempts {
            error!(bot = %bot.name(), attempt, error = %err, "Tick failed, giving up until next interval");
            if let Some(state) = state {
                state.record_failure(bot.name(), err.to_string()).await;
            }
            return Err(err);
        }

        let delay = settings.backoff.delay_after(attempt);
        warn!(
            bot = %bot.name(),
            attempt,
            max_attempts = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Tick failed, retrying"
        );

        match shutdown.as_deref_mut() {
            Some(rx) => {
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = rx.changed() => return Err(err),
                }
            }
            None => sleep(delay).await,
        }
        attempt += 1;
    }
}
