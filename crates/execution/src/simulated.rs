// In crates/execution/src/simulated.rs

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use core_types::{Kline, OrderRequest, OrderResult, OrderStatus, Side, Symbol};
use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::market::parse_period;
use crate::types::{ExchangePosition, GatewayCall, SimulationSettings};
use crate::{Error, MarketDataSource, OrderGateway, Result};

/// Prices the simulated feed walks through, one step per price read.
pub const DEFAULT_PRICE_PATH: [Decimal; 10] = [
    dec!(2000),
    dec!(2025),
    dec!(2050),
    dec!(2100),
    dec!(2175),
    dec!(2150),
    dec!(2080),
    dec!(2030),
    dec!(2000),
    dec!(1950),
];

const MAX_SYNTHETIC_BARS: i64 = 1000;

/// A failure the simulated exchange can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Network,
    Rejected,
    Auth,
}

impl FaultKind {
    fn into_error(self) -> Error {
        match self {
            FaultKind::Network => Error::Network("simulated connection reset".into()),
            FaultKind::Rejected => Error::Rejected {
                reason: "simulated rejection".into(),
            },
            FaultKind::Auth => Error::Auth("simulated invalid API key".into()),
        }
    }
}

#[derive(Debug)]
struct Feed {
    path: Vec<Decimal>,
    cursor: usize,
    last: Decimal,
}

impl Feed {
    fn new(path: Vec<Decimal>) -> Self {
        let last = path.first().copied().unwrap_or(Decimal::ZERO);
        Self { path, cursor: 0, last }
    }

    fn advance(&mut self) -> Decimal {
        if !self.path.is_empty() {
            self.last = self.path[self.cursor % self.path.len()];
            self.cursor += 1;
        }
        self.last
    }
}

#[derive(Debug, Default)]
struct State {
    feeds: HashMap<Symbol, Feed>,
    positions: HashMap<Symbol, ExchangePosition>,
    orders: HashMap<String, OrderResult>,
    resting: HashSet<String>,
    next_order_id: u64,
    queued_faults: VecDeque<FaultKind>,
    persistent_fault: Option<FaultKind>,
    market_data_down: bool,
    leave_unfilled: bool,
    fill_ratio: Option<Decimal>,
    calls: Vec<GatewayCall>,
}

impl State {
    fn take_fault(&mut self) -> Result<()> {
        if let Some(kind) = self.queued_faults.pop_front().or(self.persistent_fault) {
            return Err(kind.into_error());
        }
        Ok(())
    }
}

/// An in-process exchange: scripted prices, immediate fills and net positions.
///
/// It serves both market data and order flow, so a full trading cycle can run
/// without network access. Faults can be injected to exercise failure paths.
#[derive(Debug)]
pub struct SimulatedExchange {
    settings: SimulationSettings,
    default_path: Vec<Decimal>,
    state: Mutex<State>,
}

impl SimulatedExchange {
    pub fn new(settings: SimulationSettings) -> Self {
        Self {
            settings,
            default_path: DEFAULT_PRICE_PATH.to_vec(),
            state: Mutex::new(State::default()),
        }
    }

    /// Replaces the price path used for symbols without an explicit feed.
    pub fn with_price_path(mut self, path: Vec<Decimal>) -> Self {
        self.default_path = path;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn feed<'a>(&self, state: &'a mut State, symbol: &Symbol) -> &'a mut Feed {
        state
            .feeds
            .entry(symbol.clone())
            .or_insert_with(|| Feed::new(self.default_path.clone()))
    }

    /// Pins `symbol` to a constant price.
    pub fn set_price(&self, symbol: &Symbol, price: Decimal) {
        let mut state = self.state();
        state.feeds.insert(symbol.clone(), Feed::new(vec![price]));
    }

    /// Places a position on the books as if it had been opened elsewhere.
    pub fn seed_position(&self, position: ExchangePosition) {
        let mut state = self.state();
        state.positions.insert(position.symbol.clone(), position);
    }

    /// Removes the position for `symbol`, as a manual close on the exchange would.
    pub fn clear_position(&self, symbol: &Symbol) {
        self.state().positions.remove(symbol);
    }

    pub fn position(&self, symbol: &Symbol) -> Option<ExchangePosition> {
        self.state().positions.get(symbol).cloned()
    }

    /// The next `times` gateway calls fail with `kind`.
    pub fn inject_fault(&self, kind: FaultKind, times: usize) {
        let mut state = self.state();
        state.queued_faults.extend(std::iter::repeat_n(kind, times));
    }

    /// Every gateway call fails with `kind` until cleared with `None`.
    pub fn fail_always(&self, kind: Option<FaultKind>) {
        self.state().persistent_fault = kind;
    }

    pub fn fail_market_data(&self, down: bool) {
        self.state().market_data_down = down;
    }

    /// Orders are acknowledged but left resting without a fill.
    pub fn leave_orders_unfilled(&self, unfilled: bool) {
        self.state().leave_unfilled = unfilled;
    }

    /// Orders fill only `ratio` of their quantity and leave the rest resting.
    /// `None` restores full fills.
    pub fn fill_partially(&self, ratio: Option<Decimal>) {
        self.state().fill_ratio = ratio;
    }

    /// Every gateway call received so far, in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().calls.clone()
    }

    /// Order submissions received so far, including retries and rejected ones.
    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                GatewayCall::PlaceOrder(order) => Some(order.clone()),
                _ => None,
            })
            .collect()
    }

    fn fill_price(&self, reference: Decimal, side: Side) -> Decimal {
        let slippage = Decimal::from_f64(self.settings.slippage_percent).unwrap_or(Decimal::ZERO);
        // Slippage always moves the fill against the taker.
        match side {
            Side::Long => reference * (Decimal::ONE + slippage),
            Side::Short => reference * (Decimal::ONE - slippage),
        }
    }
}

/// Applies a fill of `quantity` on `side` at `price` to a net position.
fn apply_fill(
    current: Option<ExchangePosition>,
    symbol: &Symbol,
    side: Side,
    quantity: Decimal,
    price: Decimal,
    leverage: u8,
) -> Option<ExchangePosition> {
    let Some(mut pos) = current else {
        return Some(ExchangePosition {
            symbol: symbol.clone(),
            side,
            quantity,
            entry_price: price,
            leverage,
        });
    };

    if pos.side == side {
        let total = pos.quantity + quantity;
        pos.entry_price = (pos.entry_price * pos.quantity + price * quantity) / total;
        pos.quantity = total;
        return Some(pos);
    }

    if quantity < pos.quantity {
        pos.quantity -= quantity;
        Some(pos)
    } else if quantity == pos.quantity {
        None
    } else {
        Some(ExchangePosition {
            symbol: symbol.clone(),
            side,
            quantity: quantity - pos.quantity,
            entry_price: price,
            leverage,
        })
    }
}

#[async_trait]
impl OrderGateway for SimulatedExchange {
    fn name(&self) -> &'static str {
        "Simulated"
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResult> {
        let mut state = self.state();
        state.calls.push(GatewayCall::PlaceOrder(order.clone()));
        state.take_fault()?;

        if let Some(existing) = state.orders.get(&order.client_order_id) {
            tracing::debug!(client_order_id = %order.client_order_id, "Duplicate submission; returning original order.");
            return Ok(existing.clone());
        }
        if order.quantity <= Decimal::ZERO {
            return Err(Error::Rejected {
                reason: format!("invalid quantity {}", order.quantity),
            });
        }

        let current = state.positions.get(&order.symbol).cloned();
        let mut quantity = order.quantity;
        if order.reduce_only {
            match &current {
                Some(pos) if pos.side == order.side.opposite() => quantity = quantity.min(pos.quantity),
                _ => {
                    return Err(Error::Rejected {
                        reason: "reduce-only order would increase the position".into(),
                    });
                }
            }
        }

        state.next_order_id += 1;
        let order_id = state.next_order_id.to_string();

        if state.leave_unfilled {
            let result = OrderResult {
                symbol: order.symbol.clone(),
                side: order.side,
                order_id,
                client_order_id: order.client_order_id.clone(),
                status: OrderStatus::New,
                fill_price: Decimal::ZERO,
                fill_quantity: Decimal::ZERO,
            };
            state.resting.insert(order.client_order_id.clone());
            state.orders.insert(order.client_order_id.clone(), result.clone());
            return Ok(result);
        }

        let reference = match order.price {
            Some(limit) if order.order_type == core_types::OrderType::Limit => limit,
            _ => self.feed(&mut state, &order.symbol).last,
        };
        let price = self.fill_price(reference, order.side);

        let mut status = OrderStatus::Filled;
        if let Some(ratio) = state.fill_ratio {
            let filled = (quantity * ratio).normalize();
            if filled < quantity {
                quantity = filled;
                status = OrderStatus::PartiallyFilled;
                state.resting.insert(order.client_order_id.clone());
            }
        }

        let updated = apply_fill(current, &order.symbol, order.side, quantity, price, order.leverage);
        match updated {
            Some(pos) => state.positions.insert(order.symbol.clone(), pos),
            None => state.positions.remove(&order.symbol),
        };

        let result = OrderResult {
            symbol: order.symbol.clone(),
            side: order.side,
            order_id,
            client_order_id: order.client_order_id.clone(),
            status,
            fill_price: price,
            fill_quantity: quantity,
        };
        state.orders.insert(order.client_order_id.clone(), result.clone());
        tracing::info!(symbol = %order.symbol, side = %order.side, %quantity, %price, "Simulated fill.");
        Ok(result)
    }

    async fn get_position(&self, symbol: &Symbol) -> Result<Option<ExchangePosition>> {
        let mut state = self.state();
        state.calls.push(GatewayCall::GetPosition(symbol.clone()));
        state.take_fault()?;
        Ok(state.positions.get(symbol).cloned())
    }

    async fn cancel_order(&self, symbol: &Symbol, client_order_id: &str) -> Result<bool> {
        let mut state = self.state();
        state.calls.push(GatewayCall::CancelOrder {
            symbol: symbol.clone(),
            client_order_id: client_order_id.to_string(),
        });
        state.take_fault()?;

        if !state.resting.remove(client_order_id) {
            return Ok(false);
        }
        if let Some(order) = state.orders.get_mut(client_order_id) {
            order.status = OrderStatus::Canceled;
        }
        Ok(true)
    }
}

#[async_trait]
impl MarketDataSource for SimulatedExchange {
    async fn fetch_bars(&self, symbol: &Symbol, interval: &str, period: &str) -> Result<Vec<Kline>> {
        let mut state = self.state();
        if state.market_data_down {
            return Err(Error::DataUnavailable {
                symbol: symbol.0.clone(),
                reason: "simulated outage".into(),
            });
        }
        let (Some(step), Some(lookback)) = (parse_period(interval), parse_period(period)) else {
            return Err(Error::DataUnavailable {
                symbol: symbol.0.clone(),
                reason: format!("unsupported interval '{interval}' or period '{period}'"),
            });
        };

        let anchor = self.feed(&mut state, symbol).last;
        let step_ms = step.num_milliseconds();
        let count = (lookback.num_milliseconds() / step_ms).clamp(1, MAX_SYNTHETIC_BARS);
        let end = Utc::now().timestamp_millis();

        Ok(synthetic_bars(anchor, count, step_ms, end))
    }

    async fn latest_price(&self, symbol: &Symbol) -> Result<Decimal> {
        let mut state = self.state();
        if state.market_data_down {
            return Err(Error::DataUnavailable {
                symbol: symbol.0.clone(),
                reason: "simulated outage".into(),
            });
        }
        Ok(self.feed(&mut state, symbol).advance())
    }
}

/// Deterministic bars oscillating around `anchor`, ending just before `end_ms`.
fn synthetic_bars(anchor: Decimal, count: i64, step_ms: i64, end_ms: i64) -> Vec<Kline> {
    let mut bars = Vec::with_capacity(count as usize);
    let mut open = anchor;
    for i in 0..count {
        let t = i as f64;
        let wave = 0.03 * (t / 9.0).sin() + 0.01 * (t / 2.5).sin();
        let factor = Decimal::from_f64(1.0 + wave).unwrap_or(Decimal::ONE);
        let close = (anchor * factor).round_dp(2);
        let high = (open.max(close) * dec!(1.001)).round_dp(2);
        let low = (open.min(close) * dec!(0.999)).round_dp(2);
        let open_time = end_ms - (count - i) * step_ms;
        bars.push(Kline {
            open_time,
            open,
            high,
            low,
            close,
            volume: dec!(100) + Decimal::from(i % 17),
            close_time: open_time + step_ms - 1,
        });
        open = close;
    }
    bars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn btc() -> Symbol {
        Symbol("BTCUSDT".into())
    }

    fn exchange() -> SimulatedExchange {
        SimulatedExchange::new(SimulationSettings::default())
    }

    #[tokio::test]
    async fn price_feed_walks_the_default_path() {
        let ex = exchange();
        let mut seen = Vec::new();
        for _ in 0..11 {
            seen.push(ex.latest_price(&btc()).await.unwrap());
        }
        assert_eq!(&seen[..3], &[dec!(2000), dec!(2025), dec!(2050)]);
        assert_eq!(seen[9], dec!(1950));
        assert_eq!(seen[10], dec!(2000));
    }

    #[tokio::test]
    async fn market_order_fills_at_last_price_and_opens_position() {
        let ex = exchange();
        ex.set_price(&btc(), dec!(100));
        let order = OrderRequest::market(btc(), Side::Long, dec!(2), 5, "a".into());
        let result = ex.place_order(&order).await.unwrap();
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(result.fill_price, dec!(100));

        let pos = ex.get_position(&btc()).await.unwrap().unwrap();
        assert_eq!(pos.side, Side::Long);
        assert_eq!(pos.quantity, dec!(2));
    }

    #[tokio::test]
    async fn same_client_id_is_not_filled_twice() {
        let ex = exchange();
        ex.set_price(&btc(), dec!(100));
        let order = OrderRequest::market(btc(), Side::Long, dec!(1), 5, "dup".into());
        let first = ex.place_order(&order).await.unwrap();
        let second = ex.place_order(&order).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(ex.position(&btc()).unwrap().quantity, dec!(1));
    }

    #[tokio::test]
    async fn reduce_only_closes_and_never_flips() {
        let ex = exchange();
        ex.set_price(&btc(), dec!(100));
        ex.place_order(&OrderRequest::market(btc(), Side::Long, dec!(1), 5, "o".into()))
            .await
            .unwrap();

        let close = OrderRequest::market(btc(), Side::Short, dec!(3), 5, "c".into()).reduce_only();
        let result = ex.place_order(&close).await.unwrap();
        assert_eq!(result.fill_quantity, dec!(1));
        assert!(ex.position(&btc()).is_none());

        let again = OrderRequest::market(btc(), Side::Short, dec!(1), 5, "c2".into()).reduce_only();
        assert!(matches!(ex.place_order(&again).await, Err(Error::Rejected { .. })));
    }

    #[tokio::test]
    async fn injected_faults_are_consumed_in_order() {
        let ex = exchange();
        ex.inject_fault(FaultKind::Network, 1);
        ex.inject_fault(FaultKind::Auth, 1);
        assert!(ex.get_position(&btc()).await.unwrap_err().is_transient());
        assert!(ex.get_position(&btc()).await.unwrap_err().is_fatal());
        assert!(ex.get_position(&btc()).await.unwrap().is_none());
        assert_eq!(ex.calls().len(), 3);
    }

    #[tokio::test]
    async fn resting_orders_can_be_canceled_once() {
        let ex = exchange();
        ex.leave_orders_unfilled(true);
        let order = OrderRequest::market(btc(), Side::Long, dec!(1), 5, "r".into());
        let result = ex.place_order(&order).await.unwrap();
        assert!(!result.has_fill());
        assert!(ex.cancel_order(&btc(), "r").await.unwrap());
        assert!(!ex.cancel_order(&btc(), "r").await.unwrap());
        assert!(ex.position(&btc()).is_none());
    }

    #[tokio::test]
    async fn partial_fill_leaves_the_rest_resting() {
        let ex = exchange();
        ex.set_price(&btc(), dec!(100));
        ex.fill_partially(Some(dec!(0.4)));
        let order = OrderRequest::market(btc(), Side::Long, dec!(5), 5, "p".into());
        let result = ex.place_order(&order).await.unwrap();
        assert_eq!(result.status, OrderStatus::PartiallyFilled);
        assert_eq!(result.fill_quantity, dec!(2));
        assert_eq!(ex.position(&btc()).unwrap().quantity, dec!(2));
        assert!(ex.cancel_order(&btc(), "p").await.unwrap());
    }

    #[tokio::test]
    async fn synthetic_bars_are_ordered_and_sized() {
        let ex = exchange();
        let bars = ex.fetch_bars(&btc(), "15m", "1d").await.unwrap();
        assert_eq!(bars.len(), 96);
        assert!(bars.windows(2).all(|w| w[0].open_time < w[1].open_time));
        assert!(bars.iter().all(|b| b.low <= b.close && b.close <= b.high));

        ex.fail_market_data(true);
        assert!(matches!(
            ex.fetch_bars(&btc(), "15m", "1d").await,
            Err(Error::DataUnavailable { .. })
        ));
    }

    #[test]
    fn opposite_fill_larger_than_position_flips_it() {
        let long = ExchangePosition {
            symbol: btc(),
            side: Side::Long,
            quantity: dec!(1),
            entry_price: dec!(100),
            leverage: 5,
        };
        let flipped = apply_fill(Some(long), &btc(), Side::Short, dec!(3), dec!(90), 5).unwrap();
        assert_eq!(flipped.side, Side::Short);
        assert_eq!(flipped.quantity, dec!(2));
        assert_eq!(flipped.entry_price, dec!(90));
    }
}
