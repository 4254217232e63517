// In crates/engine/src/lifecycle.rs

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

use analytics::{TradeJournal, TradeRecord};
use chrono::Utc;
use core_types::{Direction, OrderRequest, OrderResult, OrderStatus, Position, PositionStatus, Side, Signal, Symbol};
use execution::OrderGateway;
use notifier::{Notifier, messages};
use risk::{Action, RiskManager};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::retry::RetryPolicy;
use crate::store::PositionStore;
use crate::{Error, Result};

/// Everything `execute` needs to know about the tick it runs in.
#[derive(Debug, Clone)]
pub struct TickContext {
    pub symbol: Symbol,
    pub price: Decimal,
    /// Monotonic tick number; part of every client order id.
    pub tick: u64,
}

/// What a successful `execute` changed.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    NoOp,
    Opened(Position),
    Closed(Position),
    Reversed { closed: Position, opened: Position },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leg {
    Open,
    Close,
}

impl Leg {
    fn tag(self) -> &'static str {
        match self {
            Leg::Open => "o",
            Leg::Close => "c",
        }
    }
}

/// The single authority over position state.
///
/// Decides actions through the `RiskManager`, carries them out through the
/// `OrderGateway`, and records a transition only once the gateway confirms a fill.
pub struct LifecycleManager {
    gateway: Arc<dyn OrderGateway>,
    risk: Arc<dyn RiskManager>,
    notifier: Arc<dyn Notifier>,
    store: Arc<Mutex<PositionStore>>,
    journal: Option<TradeJournal>,
    retry: RetryPolicy,
    run_id: String,
    needs_reconcile: StdMutex<HashSet<Symbol>>,
}

impl LifecycleManager {
    pub fn new(
        gateway: Arc<dyn OrderGateway>,
        risk: Arc<dyn RiskManager>,
        notifier: Arc<dyn Notifier>,
        store: PositionStore,
        journal: Option<TradeJournal>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            gateway,
            risk,
            notifier,
            store: Arc::new(Mutex::new(store)),
            journal,
            retry,
            // Distinguishes this run's client order ids from those of earlier runs.
            run_id: format!("{:x}", Utc::now().timestamp()),
            needs_reconcile: StdMutex::new(HashSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<Mutex<PositionStore>> {
        &self.store
    }

    pub(crate) fn gateway(&self) -> &Arc<dyn OrderGateway> {
        &self.gateway
    }

    pub(crate) fn risk(&self) -> &Arc<dyn RiskManager> {
        &self.risk
    }

    pub(crate) fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub(crate) fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The confirmed open position for `symbol`, if any.
    pub async fn open_position(&self, symbol: &Symbol) -> Option<Position> {
        self.store.lock().await.open_position(symbol).cloned()
    }

    pub fn flag_reconcile(&self, symbol: &Symbol) {
        if let Ok(mut set) = self.needs_reconcile.lock() {
            set.insert(symbol.clone());
        }
    }

    /// Clears and returns the reconciliation flag for `symbol`.
    pub fn take_reconcile_flag(&self, symbol: &Symbol) -> bool {
        self.needs_reconcile
            .lock()
            .map(|mut set| set.remove(symbol))
            .unwrap_or(false)
    }

    fn order_id_for(&self, symbol: &Symbol, tick: u64, leg: Leg) -> String {
        format!("{}-{}-{}-{}", self.run_id, symbol, tick, leg.tag())
    }

    /// Pure decision for this tick; see `RiskManager::evaluate`.
    pub fn evaluate(&self, symbol: &Symbol, signal: &Signal, position: Option<&Position>, price: Decimal) -> Action {
        self.risk.evaluate(symbol, signal, position, price)
    }

    /// `CloseOnly` when `price` has reached a stop level of `position`, `Hold` otherwise.
    pub fn stop_check(&self, position: &Position, price: Decimal) -> Action {
        let hold = Signal::new(position.symbol.clone(), Direction::Hold);
        self.risk.evaluate(&position.symbol, &hold, Some(position), price)
    }

    /// Carries out `action`. On failure the position is left in its last confirmed
    /// state and the symbol is flagged for reconciliation.
    pub async fn execute(&self, action: Action, ctx: &TickContext) -> Result<Outcome> {
        if action != Action::Hold {
            tracing::info!(symbol = %ctx.symbol, %action, price = %ctx.price, tick = ctx.tick, "Executing action.");
        }
        match action {
            Action::Hold => Ok(Outcome::NoOp),
            Action::OpenLong => self.open(ctx, Side::Long).await.map(Outcome::Opened),
            Action::OpenShort => self.open(ctx, Side::Short).await.map(Outcome::Opened),
            Action::CloseOnly => {
                let Some(position) = self.open_position(&ctx.symbol).await else {
                    return Ok(self.nothing_to_close(ctx));
                };
                let reason = if position.pnl_at(ctx.price) < Decimal::ZERO {
                    "stop-loss"
                } else {
                    "take-profit"
                };
                self.close(ctx, position, reason).await.map(Outcome::Closed)
            }
            Action::CloseAndReverse => {
                let Some(position) = self.open_position(&ctx.symbol).await else {
                    return Ok(self.nothing_to_close(ctx));
                };
                let side = position.side.opposite();
                let closed = self.close(ctx, position, "reversal").await?;
                let opened = self.open(ctx, side).await?;
                Ok(Outcome::Reversed { closed, opened })
            }
        }
    }

    fn nothing_to_close(&self, ctx: &TickContext) -> Outcome {
        tracing::warn!(symbol = %ctx.symbol, "No confirmed position to close; flagging for reconciliation.");
        self.flag_reconcile(&ctx.symbol);
        Outcome::NoOp
    }

    async fn submit(&self, order: &OrderRequest) -> Result<OrderResult> {
        let gateway = &self.gateway;
        let result = self
            .retry
            .call("place_order", &order.symbol, || gateway.place_order(order))
            .await?;
        Ok(result)
    }

    /// Cancels whatever is left of an order that did not (fully) fill.
    async fn cancel_rest(&self, symbol: &Symbol, client_order_id: &str) {
        let gateway = &self.gateway;
        match self
            .retry
            .call("cancel_order", symbol, || gateway.cancel_order(symbol, client_order_id))
            .await
        {
            Ok(canceled) => tracing::info!(symbol = %symbol, client_order_id, canceled, "Cancel requested for unfilled order."),
            Err(e) => tracing::error!(symbol = %symbol, client_order_id, error = %e, "Failed to cancel unfilled order."),
        }
    }

    async fn save(&self, store: &PositionStore) {
        if let Err(e) = store.persist() {
            tracing::error!(error = %e, "Failed to persist position snapshot.");
        }
    }

    /// NONE -> PENDING_OPEN -> OPEN.
    async fn open(&self, ctx: &TickContext, side: Side) -> Result<Position> {
        let quantity = self.risk.position_size(&ctx.symbol, ctx.price)?;
        let leverage = self.risk.leverage();
        let client_order_id = self.order_id_for(&ctx.symbol, ctx.tick, Leg::Open);
        let order = OrderRequest::market(ctx.symbol.clone(), side, quantity, leverage, client_order_id.clone());

        let (sl_price, tp_price) = self.risk.stop_levels(side, ctx.price);
        {
            let mut store = self.store.lock().await;
            store.upsert(Position {
                symbol: ctx.symbol.clone(),
                side,
                entry_price: ctx.price,
                quantity,
                leverage,
                sl_price,
                tp_price,
                status: PositionStatus::PendingOpen,
                opened_at: None,
                closed_at: None,
                exit_price: None,
            });
        }

        let result = self.submit(&order).await;
        let mut store = self.store.lock().await;
        match result {
            Ok(fill) if fill.has_fill() => {
                let (sl_price, tp_price) = self.risk.stop_levels(side, fill.fill_price);
                let position = Position {
                    symbol: ctx.symbol.clone(),
                    side,
                    entry_price: fill.fill_price,
                    quantity: fill.fill_quantity,
                    leverage,
                    sl_price,
                    tp_price,
                    status: PositionStatus::Open,
                    opened_at: Some(Utc::now()),
                    closed_at: None,
                    exit_price: None,
                };
                store.upsert(position.clone());
                self.save(&store).await;
                drop(store);

                if fill.status == OrderStatus::PartiallyFilled {
                    tracing::warn!(
                        symbol = %ctx.symbol,
                        filled = %fill.fill_quantity,
                        requested = %quantity,
                        "Open order partially filled; keeping the filled size."
                    );
                    self.cancel_rest(&ctx.symbol, &client_order_id).await;
                }

                tracing::info!(
                    symbol = %position.symbol,
                    side = %position.side,
                    quantity = %position.quantity,
                    entry = %position.entry_price,
                    sl = %position.sl_price,
                    tp = %position.tp_price,
                    "Position opened."
                );
                self.notifier.send(&messages::position_opened(&position)).await;
                Ok(position)
            }
            Ok(unfilled) => {
                store.remove(&ctx.symbol);
                drop(store);
                self.cancel_rest(&ctx.symbol, &client_order_id).await;
                self.flag_reconcile(&ctx.symbol);
                Err(Error::Unfilled {
                    client_order_id,
                    status: unfilled.status,
                })
            }
            Err(e) => {
                store.remove(&ctx.symbol);
                drop(store);
                self.flag_reconcile(&ctx.symbol);
                tracing::error!(symbol = %ctx.symbol, error = %e, "Open order failed; pending entry rolled back.");
                Err(e)
            }
        }
    }

    /// OPEN -> PENDING_CLOSE -> CLOSED, with a reduce-only order for the full size.
    async fn close(&self, ctx: &TickContext, position: Position, reason: &str) -> Result<Position> {
        let client_order_id = self.order_id_for(&ctx.symbol, ctx.tick, Leg::Close);
        let order = OrderRequest::market(
            ctx.symbol.clone(),
            position.side.opposite(),
            position.quantity,
            position.leverage,
            client_order_id.clone(),
        )
        .reduce_only();

        {
            let mut store = self.store.lock().await;
            store.upsert(Position {
                status: PositionStatus::PendingClose,
                ..position.clone()
            });
        }

        let result = self.submit(&order).await;
        let mut store = self.store.lock().await;
        match result {
            Ok(fill) if fill.has_fill() && fill.fill_quantity >= position.quantity => {
                let closed = Position {
                    status: PositionStatus::Closed,
                    closed_at: Some(Utc::now()),
                    exit_price: Some(fill.fill_price),
                    ..position
                };
                store.archive(closed.clone());
                self.save(&store).await;
                drop(store);

                let pnl = closed.pnl_at(fill.fill_price);
                tracing::info!(
                    symbol = %closed.symbol,
                    side = %closed.side,
                    exit = %fill.fill_price,
                    pnl = %pnl,
                    reason,
                    "Position closed."
                );
                self.record_trade(&closed);
                self.notifier
                    .send(&messages::position_closed(&closed, fill.fill_price, reason))
                    .await;
                Ok(closed)
            }
            Ok(fill) if fill.has_fill() => {
                // Part of the position is gone; the exchange will tell us the rest.
                store.upsert(Position {
                    quantity: position.quantity - fill.fill_quantity,
                    status: PositionStatus::Open,
                    ..position.clone()
                });
                self.save(&store).await;
                drop(store);
                self.cancel_rest(&ctx.symbol, &client_order_id).await;
                self.flag_reconcile(&ctx.symbol);
                Err(Error::PartialClose {
                    client_order_id,
                    filled: fill.fill_quantity,
                    requested: position.quantity,
                })
            }
            Ok(unfilled) => {
                store.upsert(position);
                drop(store);
                self.cancel_rest(&ctx.symbol, &client_order_id).await;
                self.flag_reconcile(&ctx.symbol);
                Err(Error::Unfilled {
                    client_order_id,
                    status: unfilled.status,
                })
            }
            Err(e) => {
                store.upsert(position);
                drop(store);
                self.flag_reconcile(&ctx.symbol);
                tracing::error!(symbol = %ctx.symbol, error = %e, "Close order failed; position left open.");
                Err(e)
            }
        }
    }

    pub(crate) fn record_trade(&self, closed: &Position) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(&TradeRecord::from_closed(closed)) {
                tracing::error!(symbol = %closed.symbol, error = %e, "Failed to write trade journal.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use execution::SimulationSettings;
    use execution::simulated::{FaultKind, SimulatedExchange};
    use execution::types::GatewayCall;
    use notifier::RecordingNotifier;
    use risk::{FixedPercentRisk, RiskParams};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::time::Duration;

    fn btc() -> Symbol {
        Symbol("BTCUSDT".into())
    }

    fn setup() -> (Arc<SimulatedExchange>, Arc<RecordingNotifier>, LifecycleManager) {
        let exchange = Arc::new(SimulatedExchange::new(SimulationSettings::default()));
        exchange.set_price(&btc(), dec!(100));
        let notifier = Arc::new(RecordingNotifier::new());
        let risk = FixedPercentRisk::new(RiskParams {
            stop_loss_pct: dec!(0.05),
            take_profit_pct: dec!(0.10),
            leverage: 5,
            investment_amount: dec!(100),
            default_lot_size: dec!(0.001),
            lot_sizes: HashMap::new(),
        });
        let manager = LifecycleManager::new(
            exchange.clone(),
            Arc::new(risk),
            notifier.clone(),
            PositionStore::in_memory(),
            None,
            RetryPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(1),
                timeout: Duration::from_secs(1),
            },
        );
        (exchange, notifier, manager)
    }

    fn ctx(tick: u64, price: Decimal) -> TickContext {
        TickContext {
            symbol: btc(),
            price,
            tick,
        }
    }

    #[tokio::test]
    async fn open_records_fill_and_stop_levels() {
        let (_, notifier, manager) = setup();
        let outcome = manager.execute(Action::OpenLong, &ctx(1, dec!(100))).await.unwrap();
        let Outcome::Opened(position) = outcome else {
            panic!("expected an open, got {outcome:?}");
        };
        assert_eq!(position.quantity, dec!(5));
        assert_eq!(position.sl_price, dec!(95));
        assert_eq!(position.tp_price, dec!(110));
        assert!(manager.open_position(&btc()).await.is_some());
        assert_eq!(notifier.matching("Position opened").len(), 1);
    }

    #[tokio::test]
    async fn hold_makes_no_gateway_call() {
        let (exchange, _, manager) = setup();
        assert_eq!(manager.execute(Action::Hold, &ctx(1, dec!(100))).await.unwrap(), Outcome::NoOp);
        assert!(exchange.calls().is_empty());
    }

    #[tokio::test]
    async fn reversal_closes_before_opening() {
        let (exchange, _, manager) = setup();
        manager.execute(Action::OpenLong, &ctx(1, dec!(100))).await.unwrap();
        let outcome = manager.execute(Action::CloseAndReverse, &ctx(2, dec!(100))).await.unwrap();
        assert!(matches!(outcome, Outcome::Reversed { .. }));

        let orders = exchange.placed_orders();
        assert_eq!(orders.len(), 3);
        assert!(orders[1].reduce_only && orders[1].side == Side::Short);
        assert!(!orders[2].reduce_only && orders[2].side == Side::Short);
        assert_eq!(manager.open_position(&btc()).await.unwrap().side, Side::Short);
    }

    #[tokio::test]
    async fn retries_reuse_the_client_order_id() {
        let (exchange, _, manager) = setup();
        exchange.inject_fault(FaultKind::Network, 1);
        manager.execute(Action::OpenShort, &ctx(7, dec!(100))).await.unwrap();

        let orders = exchange.placed_orders();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].client_order_id, orders[1].client_order_id);
        assert!(orders[0].client_order_id.ends_with("-BTCUSDT-7-o"));
        assert_eq!(exchange.position(&btc()).unwrap().quantity, dec!(5));
    }

    #[tokio::test]
    async fn exhausted_retries_roll_back_and_flag() {
        let (exchange, _, manager) = setup();
        exchange.fail_always(Some(FaultKind::Network));
        let err = manager.execute(Action::OpenLong, &ctx(1, dec!(100))).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(exchange.placed_orders().len(), 3);
        assert!(manager.store().lock().await.get(&btc()).is_none());
        assert!(manager.take_reconcile_flag(&btc()));
        assert!(!manager.take_reconcile_flag(&btc()));
    }

    #[tokio::test]
    async fn failed_close_keeps_position_open() {
        let (exchange, _, manager) = setup();
        manager.execute(Action::OpenLong, &ctx(1, dec!(100))).await.unwrap();
        exchange.inject_fault(FaultKind::Rejected, 1);
        let err = manager.execute(Action::CloseOnly, &ctx(2, dec!(94))).await.unwrap_err();
        assert!(matches!(err, Error::Exchange(execution::Error::Rejected { .. })));
        let position = manager.open_position(&btc()).await.unwrap();
        assert_eq!(position.status, PositionStatus::Open);
    }

    #[tokio::test]
    async fn unfilled_open_is_canceled_and_rolled_back() {
        let (exchange, _, manager) = setup();
        exchange.leave_orders_unfilled(true);
        let err = manager.execute(Action::OpenLong, &ctx(3, dec!(100))).await.unwrap_err();
        assert!(matches!(err, Error::Unfilled { status: OrderStatus::New, .. }));
        assert!(exchange
            .calls()
            .iter()
            .any(|c| matches!(c, GatewayCall::CancelOrder { .. })));
        assert!(manager.store().lock().await.get(&btc()).is_none());
    }

    #[tokio::test]
    async fn partial_open_keeps_filled_size_and_cancels_the_rest() {
        let (exchange, _, manager) = setup();
        exchange.fill_partially(Some(dec!(0.4)));
        let outcome = manager.execute(Action::OpenLong, &ctx(1, dec!(100))).await.unwrap();
        let Outcome::Opened(position) = outcome else {
            panic!("expected an open, got {outcome:?}");
        };
        assert_eq!(position.quantity, dec!(2));
        assert_eq!(position.status, PositionStatus::Open);
        assert_eq!(manager.open_position(&btc()).await.unwrap().quantity, dec!(2));
        assert!(exchange.calls().iter().any(|c| matches!(
            c,
            GatewayCall::CancelOrder { client_order_id, .. } if client_order_id.ends_with("-BTCUSDT-1-o")
        )));
        assert_eq!(exchange.position(&btc()).unwrap().quantity, dec!(2));
    }

    #[tokio::test]
    async fn partial_close_leaves_remainder_open_and_flags() {
        let (exchange, notifier, manager) = setup();
        manager.execute(Action::OpenLong, &ctx(1, dec!(100))).await.unwrap();
        exchange.fill_partially(Some(dec!(0.4)));

        let err = manager.execute(Action::CloseOnly, &ctx(2, dec!(94))).await.unwrap_err();
        let Error::PartialClose { filled, requested, .. } = err else {
            panic!("expected a partial close, got {err:?}");
        };
        assert_eq!(filled, dec!(2));
        assert_eq!(requested, dec!(5));

        let position = manager.open_position(&btc()).await.unwrap();
        assert_eq!(position.status, PositionStatus::Open);
        assert_eq!(position.quantity, dec!(3));
        assert_eq!(exchange.position(&btc()).unwrap().quantity, dec!(3));
        assert!(manager.take_reconcile_flag(&btc()));
        assert!(manager.store().lock().await.closed_positions().is_empty());
        assert!(notifier.matching("stop-loss").is_empty());
    }

    #[tokio::test]
    async fn zero_size_is_rejected_without_an_order() {
        let (exchange, _, manager) = setup();
        let err = manager.execute(Action::OpenLong, &ctx(1, dec!(10000000))).await.unwrap_err();
        assert!(matches!(err, Error::Risk(risk::Error::InvalidSize { .. })));
        assert!(exchange.placed_orders().is_empty());
    }

    #[tokio::test]
    async fn stop_close_is_archived() {
        let (exchange, notifier, manager) = setup();
        manager.execute(Action::OpenLong, &ctx(1, dec!(100))).await.unwrap();
        exchange.set_price(&btc(), dec!(94));
        let outcome = manager.execute(Action::CloseOnly, &ctx(2, dec!(94))).await.unwrap();
        let Outcome::Closed(closed) = outcome else {
            panic!("expected a close, got {outcome:?}");
        };
        assert_eq!(closed.exit_price, Some(dec!(94)));
        assert_eq!(manager.store().lock().await.closed_positions().len(), 1);
        assert_eq!(notifier.matching("stop-loss").len(), 1);
        assert!(exchange.position(&btc()).is_none());
    }
}
