//! Trading cycle driver
//!
//! One cycle: gate on exchange hours, pick the tradable universe, snapshot
//! it, ask the model for decisions, execute them and record the outcome.
//! Cycles never overlap; the driver loop awaits each one before the next tick.

pub mod hours;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::{news_for_tickers, MarketData, MarketDataError};
use crate::broker::{Broker, BrokerError};
use crate::config::AppConfig;
use crate::db::Ledger;
use crate::execution::{fetch_snapshots, panic_message, ExecutionOutcome, Executor, ExecutorSettings};
use crate::llm::{AnalysisError, AnalysisRequest, DecisionService};
use crate::models::{decisions_to_json, AnalysisLog, PortfolioSnapshot};
use crate::notify::Notifier;

pub use hours::{is_within_trading_hours, local_midnight};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Gated,
    Fetching,
    Analyzing,
    Executing,
    Persisting,
}

/// A step failure that aborted the cycle
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("fetch top tickers: {0}")]
    TopTickers(#[source] MarketDataError),
    #[error("filter tradable: {0}")]
    FilterTradable(#[source] BrokerError),
    #[error("portfolio: {0}")]
    Portfolio(#[source] BrokerError),
    #[error("AI analysis: {0}")]
    Analysis(#[source] AnalysisError),
}

impl CycleError {
    pub fn step(&self) -> &'static str {
        match self {
            CycleError::TopTickers(_) => "top_tickers",
            CycleError::FilterTradable(_) => "filter_tradable",
            CycleError::Portfolio(_) => "portfolio",
            CycleError::Analysis(_) => "analysis",
        }
    }

    fn raw_response(&self) -> &str {
        match self {
            CycleError::Analysis(e) => e.raw_response().unwrap_or_default(),
            _ => "",
        }
    }
}

/// What a single cycle attempt ended with
#[derive(Debug)]
pub enum CycleReport {
    Gated,
    NoTradable,
    Completed {
        instruments: usize,
        outcomes: Vec<ExecutionOutcome>,
    },
    Failed {
        instruments: usize,
        error: CycleError,
    },
    Panicked(String),
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub top_tickers: usize,
    pub candle_concurrency: i64,
    pub tz: Tz,
    pub executor: ExecutorSettings,
}

impl SchedulerSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            interval: cfg.trading_interval(),
            top_tickers: cfg.trading.top_tickers,
            candle_concurrency: cfg.trading.candle_concurrency,
            tz: cfg.exchange_tz(),
            executor: ExecutorSettings::from(&cfg.trading),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            top_tickers: 50,
            candle_concurrency: 10,
            tz: chrono_tz::Europe::Moscow,
            executor: ExecutorSettings::default(),
        }
    }
}

/// External collaborators of the pipeline
#[derive(Clone)]
pub struct Services {
    pub broker: Arc<dyn Broker>,
    pub market: Arc<dyn MarketData>,
    pub ai: Arc<dyn DecisionService>,
    pub ledger: Arc<dyn Ledger>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct Scheduler {
    services: Services,
    executor: Executor,
    settings: SchedulerSettings,
    state: Mutex<CycleState>,
}

impl Scheduler {
    pub fn new(services: Services, settings: SchedulerSettings) -> Self {
        let executor = Executor::new(
            services.broker.clone(),
            services.ledger.clone(),
            services.notifier.clone(),
            settings.executor.clone(),
        );

        Self {
            services,
            executor,
            settings,
            state: Mutex::new(CycleState::Idle),
        }
    }

    pub fn state(&self) -> CycleState {
        self.state.lock().map(|s| *s).unwrap_or(CycleState::Idle)
    }

    fn set_state(&self, next: CycleState) {
        if let Ok(mut state) = self.state.lock() {
            debug!("Cycle state {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    /// Drive cycles until `shutdown` flips to true or its sender is dropped
    ///
    /// The first cycle starts immediately. A cycle in progress always runs
    /// to completion before the loop checks for shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("⏱️  Scheduler started, interval {:?}", self.settings.interval);

        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            self.run_cycle_at(Utc::now()).await;
        }

        info!("Scheduler stopped");
    }

    /// Run one cycle as if the clock read `now`
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleReport {
        let report = match AssertUnwindSafe(self.cycle(now)).catch_unwind().await {
            Ok(report) => report,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("💥 Panic in trading cycle: {}", message);
                self.services
                    .notifier
                    .notify_error("cycle panic", &message)
                    .await;
                CycleReport::Panicked(message)
            }
        };

        self.set_state(CycleState::Idle);
        report
    }

    async fn cycle(&self, now: DateTime<Utc>) -> CycleReport {
        if !is_within_trading_hours(now, self.settings.tz) {
            self.set_state(CycleState::Gated);
            info!("Outside trading hours, skipping cycle");
            return CycleReport::Gated;
        }

        info!("🔄 Starting analysis cycle");
        self.set_state(CycleState::Fetching);

        let mut instruments = 0;
        match self.fetch_and_execute(now, &mut instruments).await {
            Ok(report) => report,
            Err(error) => {
                error!(step = error.step(), "❌ Cycle failed: {}", error);
                self.record_outcome(AnalysisLog {
                    instruments_count: instruments,
                    ai_response: error.raw_response().to_string(),
                    decisions_json: String::new(),
                    error: Some(error.to_string()),
                })
                .await;
                self.services
                    .notifier
                    .notify_error(&format!("cycle step {}", error.step()), &error.to_string())
                    .await;
                CycleReport::Failed { instruments, error }
            }
        }
    }

    /// Steps up to execution; `instruments` tracks the universe size so far
    async fn fetch_and_execute(
        &self,
        now: DateTime<Utc>,
        instruments: &mut usize,
    ) -> Result<CycleReport, CycleError> {
        let s = &self.services;

        let top = s
            .market
            .top_tickers(self.settings.top_tickers)
            .await
            .map_err(CycleError::TopTickers)?;
        *instruments = top.len();
        info!("Fetched {} top tickers", top.len());

        let mut ids = Vec::with_capacity(top.len());
        let mut ticker_by_id = HashMap::with_capacity(top.len());
        for row in &top {
            match s.broker.resolve_instrument(&row.ticker).await {
                Ok(id) => {
                    ticker_by_id.insert(id.clone(), row.ticker.clone());
                    ids.push(id);
                }
                Err(e) => debug!(ticker = %row.ticker, "Skipping unresolved ticker: {}", e),
            }
        }

        let tradable_ids = s
            .broker
            .filter_tradable(&ids)
            .await
            .map_err(CycleError::FilterTradable)?;
        let tradable: Vec<String> = ids
            .iter()
            .filter(|id| tradable_ids.contains(*id))
            .filter_map(|id| ticker_by_id.get(id).cloned())
            .collect();
        info!("{} tradable tickers", tradable.len());

        if tradable.is_empty() {
            info!("No tradable tickers, ending cycle early");
            return Ok(CycleReport::NoTradable);
        }
        *instruments = tradable.len();

        let snapshots = fetch_snapshots(
            s.broker.clone(),
            &tradable,
            self.settings.candle_concurrency,
            now,
        )
        .await;
        info!("Collected {} snapshots", snapshots.len());

        let news = match s.market.recent_news().await {
            Ok(news) => news,
            Err(e) => {
                warn!("News unavailable, continuing without: {}", e);
                Vec::new()
            }
        };
        let news_by_ticker = news_for_tickers(&news, &tradable);

        let portfolio = s.broker.portfolio().await.map_err(CycleError::Portfolio)?;

        self.set_state(CycleState::Analyzing);
        let request = AnalysisRequest::build(&snapshots, &news_by_ticker, &portfolio);
        let analysis = s.ai.analyze(&request).await.map_err(CycleError::Analysis)?;
        info!("🤖 AI returned {} decisions", analysis.decisions.len());
        for d in &analysis.decisions {
            debug!(
                ticker = %d.ticker,
                action = ?d.action,
                confidence = d.confidence,
                stop_loss = ?d.stop_loss,
                take_profit = ?d.take_profit,
                "Decision: {}",
                d.reasoning
            );
        }

        self.set_state(CycleState::Executing);
        let outcomes = self.executor.execute(&analysis.decisions).await;
        for (d, outcome) in analysis.decisions.iter().zip(&outcomes) {
            debug!(ticker = %d.ticker, "Outcome: {:?}", outcome);
        }

        self.set_state(CycleState::Persisting);
        self.record_outcome(AnalysisLog {
            instruments_count: tradable.len(),
            ai_response: analysis.raw_response.clone(),
            decisions_json: decisions_to_json(&analysis.decisions),
            error: None,
        })
        .await;
        if let Err(e) = s
            .ledger
            .save_portfolio_snapshot(&PortfolioSnapshot::from_portfolio(&portfolio))
            .await
        {
            error!("Failed to save portfolio snapshot: {}", e);
        }
        self.log_realized_pnl(now).await;

        let executed = outcomes.iter().filter(|o| o.is_executed()).count();
        info!("✅ Cycle complete: {} of {} decisions executed", executed, outcomes.len());

        Ok(CycleReport::Completed {
            instruments: tradable.len(),
            outcomes,
        })
    }

    async fn record_outcome(&self, log: AnalysisLog) {
        if let Err(e) = self.services.ledger.save_analysis_log(&log).await {
            error!("Failed to save analysis log: {}", e);
        }
    }

    async fn log_realized_pnl(&self, now: DateTime<Utc>) {
        let ledger = &self.services.ledger;
        let today = ledger.pnl_since(local_midnight(now, self.settings.tz)).await;
        let total = ledger.total_pnl().await;
        match (today, total) {
            (Ok(today), Ok(total)) => {
                info!("📊 Realized P&L today {:.2} ₽, total {:.2} ₽", today, total)
            }
            (Err(e), _) | (_, Err(e)) => warn!("Failed to read realized P&L: {}", e),
        }
    }
}
