// In crates/execution/src/lib.rs

use async_trait::async_trait;
use core_types::{Kline, OrderRequest, OrderResult, Symbol};
use rust_decimal::Decimal;

pub mod error;
pub mod live;
pub mod market;
pub mod simulated;
pub mod types;

// Re-export public types
pub use error::{Error, Result};
pub use types::{ExchangePosition, SimulationSettings};

/// The universal interface for an order gateway.
///
/// An `OrderGateway` submits orders to a target, which could be a live exchange
/// or a simulation engine, and reports the target's authoritative position state.
/// Implementations take `&self` so one gateway can serve every symbol's cycle.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// The name of the gateway (e.g., "BinanceFutures", "Simulated").
    fn name(&self) -> &'static str;

    /// Submits an order and reports its state, including any fill.
    ///
    /// Submitting twice with the same `client_order_id` must not create a second
    /// order; the second call reports the first order.
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResult>;

    /// The exchange's current net position for `symbol`, if any.
    async fn get_position(&self, symbol: &Symbol) -> Result<Option<ExchangePosition>>;

    /// Cancels a resting order. Returns `false` when there was nothing to cancel.
    async fn cancel_order(&self, symbol: &Symbol, client_order_id: &str) -> Result<bool>;
}

/// Supplies bars and prices for a symbol.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Time-ordered bars covering `period` (e.g., "30d") at `interval` (e.g., "15m").
    async fn fetch_bars(&self, symbol: &Symbol, interval: &str, period: &str) -> Result<Vec<Kline>>;

    /// The latest traded price.
    async fn latest_price(&self, symbol: &Symbol) -> Result<Decimal>;
}
