// In crates/execution/src/types.rs

use core_types::{OrderRequest, Side, Symbol};
use rust_decimal::Decimal;
use serde::Deserialize;

/// The exchange's own view of an open position. Stop levels are not part of it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangePosition {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub leverage: u8,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SimulationSettings {
    /// The simulated slippage percentage for market orders (e.g., 0.0005 for 0.05%).
    #[serde(default)]
    pub slippage_percent: f64,
}

/// A record of one call made against the simulated exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    PlaceOrder(OrderRequest),
    GetPosition(Symbol),
    CancelOrder { symbol: Symbol, client_order_id: String },
}
