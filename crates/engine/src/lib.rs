// In crates/engine/src/lib.rs

use std::collections::HashMap;
use std::sync::Arc;

use analytics::{OpenPositionRow, TradeJournal, open_positions_table};
use app_config::Settings;
use core_types::Symbol;
use execution::{MarketDataSource, OrderGateway};
use futures::future;
use notifier::{Notifier, messages};
use risk::{FixedPercentRisk, RiskParams};
use rust_decimal::Decimal;
use strategies::{FeatureBuilder, ForestPredictor, SignalPredictor};
use tokio::sync::{Mutex, watch};

pub mod error;
pub mod lifecycle;
pub mod reconciler;
pub mod retry;
pub mod store;
pub mod task;

pub use error::{Error, Result};
pub use lifecycle::{LifecycleManager, Outcome, TickContext};
pub use reconciler::ReconcileOutcome;
pub use retry::RetryPolicy;
pub use store::PositionStore;
pub use task::{CycleReport, SymbolTask};

/// The portfolio-level orchestrator.
///
/// Owns one `SymbolTask` per configured symbol and a single `LifecycleManager`
/// shared by all of them. Each tick runs every symbol's cycle concurrently.
pub struct Engine {
    settings: Settings,
    market: Arc<dyn MarketDataSource>,
    manager: Arc<LifecycleManager>,
    notifier: Arc<dyn Notifier>,
    tasks: Vec<(Symbol, Arc<Mutex<SymbolTask>>)>,
    tick: u64,
    last_prices: HashMap<Symbol, Decimal>,
}

impl Engine {
    /// Wires the engine from settings. Loads the position snapshot and opens the trade journal.
    pub fn new(
        settings: Settings,
        market: Arc<dyn MarketDataSource>,
        gateway: Arc<dyn OrderGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let store = PositionStore::open(&settings.storage.positions_path)?;
        let journal = TradeJournal::open(&settings.storage.trade_log_path)?;
        let risk = FixedPercentRisk::new(RiskParams::from_settings(&settings)?);

        let manager = LifecycleManager::new(
            gateway,
            Arc::new(risk),
            notifier.clone(),
            store,
            Some(journal),
            RetryPolicy::from_settings(&settings.gateway),
        );

        let mut tasks = Vec::new();
        for symbol in settings.symbols()? {
            let builder = FeatureBuilder::new(
                settings.model.short_window,
                settings.model.long_window,
                settings.trading.history_bars,
            )?;
            let predictor = Box::new(ForestPredictor::new(settings.model.clone()));
            tracing::info!(symbol = %symbol, predictor = predictor.name(), "Setting up trading task.");
            let task = SymbolTask::new(
                symbol.clone(),
                settings.trading.interval.clone(),
                settings.trading.period.clone(),
                builder,
                predictor,
            );
            tasks.push((symbol, Arc::new(Mutex::new(task))));
        }

        Ok(Self {
            settings,
            market,
            manager: Arc::new(manager),
            notifier,
            tasks,
            tick: 0,
            last_prices: HashMap::new(),
        })
    }

    pub fn manager(&self) -> &Arc<LifecycleManager> {
        &self.manager
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.tasks.iter().map(|(symbol, _)| symbol)
    }

    /// Swaps the predictor for `symbol`. Returns `false` for an unknown symbol.
    pub async fn set_predictor(&self, symbol: &Symbol, predictor: Box<dyn SignalPredictor>) -> bool {
        match self.tasks.iter().find(|(s, _)| s == symbol) {
            Some((_, task)) => {
                task.lock().await.set_predictor(predictor);
                true
            }
            None => false,
        }
    }

    /// Reconciles every symbol against the exchange before any decision is made.
    ///
    /// Non-fatal failures are reported and the symbol is retried at the start of its next cycle.
    pub async fn startup_reconcile(&self) -> Result<()> {
        for symbol in self.symbols() {
            match self.manager.reconcile(symbol).await {
                Ok(outcome) => tracing::info!(symbol = %symbol, ?outcome, "Startup reconciliation complete."),
                Err(e) if e.is_fatal() => {
                    tracing::error!(symbol = %symbol, error = %e, "Fatal error during reconciliation.");
                    self.notifier.send(&messages::fatal(&e)).await;
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(symbol = %symbol, error = %e, "Startup reconciliation failed; will retry next cycle.");
                    self.notifier
                        .send(&messages::failure(symbol, "reconciliation", &e))
                        .await;
                    self.manager.flag_reconcile(symbol);
                }
            }
        }
        Ok(())
    }

    /// Runs one cycle for every symbol concurrently.
    ///
    /// Each failed cycle is logged and notified once. A fatal failure halts trading
    /// and is returned after the other cycles of the tick have finished.
    pub async fn run_tick(&mut self) -> Result<Vec<CycleReport>> {
        self.tick += 1;
        let tick = self.tick;
        tracing::debug!(tick, "Starting tick.");

        let cycles = self.tasks.iter().map(|(symbol, task)| {
            let market = self.market.as_ref();
            let manager = self.manager.as_ref();
            async move {
                let mut task = task.lock().await;
                let result = task.run_cycle(market, manager, tick).await;
                (symbol.clone(), result)
            }
        });
        let results = future::join_all(cycles).await;

        let mut reports = Vec::new();
        let mut fatal = None;
        for (symbol, result) in results {
            match result {
                Ok(report) => {
                    self.last_prices.insert(symbol, report.price);
                    reports.push(report);
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(symbol = %symbol, error = %e, "Fatal error; halting all trading.");
                    if fatal.is_none() {
                        fatal = Some(e);
                    }
                }
                Err(e) => {
                    tracing::error!(symbol = %symbol, stage = e.stage(), error = %e, "Cycle failed.");
                    self.notifier
                        .send(&messages::failure(&symbol, e.stage(), &e))
                        .await;
                }
            }
        }

        if let Some(e) = fatal {
            self.notifier.send(&messages::fatal(&e)).await;
            return Err(e);
        }

        self.log_summary().await;
        Ok(reports)
    }

    /// Reads the latest price of every symbol for the summary. Failures keep the previous price.
    pub async fn refresh_prices(&mut self) {
        for (symbol, _) in &self.tasks {
            match self.market.latest_price(symbol).await {
                Ok(price) => {
                    self.last_prices.insert(symbol.clone(), price);
                }
                Err(e) => tracing::warn!(symbol = %symbol, error = %e, "Could not read latest price."),
            }
        }
    }

    /// The open-positions table with the latest known prices.
    pub async fn summary(&self) -> Option<String> {
        let store = self.manager.store().lock().await;
        let mut rows: Vec<OpenPositionRow> = store
            .live_positions()
            .filter(|p| p.is_open())
            .map(|p| OpenPositionRow {
                position: p.clone(),
                current_price: self.last_prices.get(&p.symbol).copied(),
            })
            .collect();
        rows.sort_by(|a, b| a.position.symbol.cmp(&b.position.symbol));
        open_positions_table(&rows)
    }

    async fn log_summary(&self) {
        match self.summary().await {
            Some(table) => tracing::info!("Open positions:\n{}", table),
            None => tracing::info!("No open positions."),
        }
    }

    /// Reconciles on startup, then runs ticks until `shutdown` flips to `true`.
    ///
    /// Shutdown is only observed between ticks, so in-flight cycles always finish.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!(
            symbols = self.tasks.len(),
            poll_secs = self.settings.trading.poll_interval_secs,
            "Starting trading engine."
        );
        self.startup_reconcile().await?;

        let poll = self.settings.poll_interval();
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.run_tick().await?;

            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Trading engine stopped.");
        Ok(())
    }
}
