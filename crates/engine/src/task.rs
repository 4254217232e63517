// In crates/engine/src/task.rs

use core_types::Symbol;
use execution::MarketDataSource;
use notifier::messages;
use risk::Action;
use rust_decimal::Decimal;
use strategies::{FeatureBuilder, SignalPredictor};

use crate::Result;
use crate::lifecycle::{LifecycleManager, Outcome, TickContext};

/// Where a cycle for one symbol ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub symbol: Symbol,
    pub price: Decimal,
    pub action: Action,
    pub outcome: Outcome,
}

/// Everything that belongs to one symbol's pipeline.
///
/// The task is held behind its own lock, so at most one cycle per symbol is in
/// flight; cycles for different symbols run concurrently.
pub struct SymbolTask {
    symbol: Symbol,
    interval: String,
    period: String,
    builder: FeatureBuilder,
    predictor: Box<dyn SignalPredictor>,
}

impl SymbolTask {
    pub fn new(
        symbol: Symbol,
        interval: String,
        period: String,
        builder: FeatureBuilder,
        predictor: Box<dyn SignalPredictor>,
    ) -> Self {
        Self {
            symbol,
            interval,
            period,
            builder,
            predictor,
        }
    }

    pub fn set_predictor(&mut self, predictor: Box<dyn SignalPredictor>) {
        self.predictor = predictor;
    }

    /// One pass of the trading pipeline: price, stop check, data, features, signal,
    /// decision, execution.
    ///
    /// Stop levels are enforced before, and independently of, the signal pipeline.
    /// Errors are returned to the caller, which reports them once. The position store is only touched
    /// through the lifecycle manager.
    pub async fn run_cycle(
        &mut self,
        market: &dyn MarketDataSource,
        manager: &LifecycleManager,
        tick: u64,
    ) -> Result<CycleReport> {
        let symbol = self.symbol.clone();

        if manager.take_reconcile_flag(&symbol) {
            if let Err(e) = manager.reconcile(&symbol).await {
                manager.flag_reconcile(&symbol);
                return Err(e);
            }
        }

        let price = manager
            .retry()
            .call("latest_price", &symbol, || market.latest_price(&symbol))
            .await?;
        let ctx = TickContext {
            symbol: symbol.clone(),
            price,
            tick,
        };

        if let Some(position) = manager.open_position(&symbol).await {
            let action = manager.stop_check(&position, price);
            if action == Action::CloseOnly {
                tracing::warn!(
                    symbol = %symbol,
                    %price,
                    sl = %position.sl_price,
                    tp = %position.tp_price,
                    "Stop level reached; closing before signal evaluation."
                );
                let outcome = manager.execute(action, &ctx).await?;
                return Ok(CycleReport {
                    symbol,
                    price,
                    action,
                    outcome,
                });
            }
        }

        let bars = manager
            .retry()
            .call("fetch_bars", &symbol, || market.fetch_bars(&symbol, &self.interval, &self.period))
            .await?;
        tracing::debug!(symbol = %symbol, bars = bars.len(), "Fetched historical bars.");

        let frame = self.builder.build(&bars)?;
        let prediction = self.predictor.predict(&symbol, &frame)?;
        tracing::info!(
            symbol = %symbol,
            predictor = self.predictor.name(),
            signal = %prediction.signal.direction,
            "Signal generated."
        );

        let close = frame.last().map(|r| r.close).unwrap_or_default();
        manager
            .notifier()
            .send(&messages::signal_alert(
                &prediction.signal,
                close,
                &prediction.indicator_summary(),
                &prediction.explanation,
            ))
            .await;

        let position = manager.open_position(&symbol).await;
        let action = manager.evaluate(&symbol, &prediction.signal, position.as_ref(), price);
        tracing::info!(
            symbol = %symbol,
            %action,
            %price,
            has_position = position.is_some(),
            "Risk decision."
        );

        let outcome = manager.execute(action, &ctx).await?;
        Ok(CycleReport {
            symbol,
            price,
            action,
            outcome,
        })
    }
}
