// In crates/core-types/src/types.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// A trading pair in the exchange's wire form (e.g., "BTCUSDT").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    /// Normalises a user-facing symbol into the exchange form.
    ///
    /// Accepts `BTC-USD`, `BTC/USDT`, `BTC/USDT:USDT` and `btcusdt`; all of them
    /// become `BTCUSDT`. A bare `USD` quote is settled in USDT on the futures venue.
    pub fn parse(raw: &str) -> Result<Self> {
        let upper = raw.trim().to_uppercase();
        let without_settle = upper.split(':').next().unwrap_or_default();
        let mut compact: String = without_settle
            .chars()
            .filter(|c| *c != '-' && *c != '/' && *c != '_')
            .collect();

        if compact.is_empty() || !compact.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidSymbol(raw.to_string()));
        }
        if compact.ends_with("USD") {
            compact.push('T');
        }
        if compact.len() <= 4 {
            return Err(Error::InvalidSymbol(raw.to_string()));
        }
        Ok(Symbol(compact))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Direction of a position, and of an order (Long = BUY, Short = SELL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// The exchange's order side string.
    pub fn as_order_side(self) -> &'static str {
        match self {
            Side::Long => "BUY",
            Side::Short => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => f.write_str("long"),
            Side::Short => f.write_str("short"),
        }
    }
}

/// The discrete recommendation carried by a `Signal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => f.write_str("BUY"),
            Direction::Sell => f.write_str("SELL"),
            Direction::Hold => f.write_str("HOLD"),
        }
    }
}

/// A trading recommendation for one symbol at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: Symbol,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    /// Share of the model's vote behind `direction`, in `[0, 1]`.
    pub confidence: Option<f64>,
}

impl Signal {
    pub fn new(symbol: Symbol, direction: Direction) -> Self {
        Self {
            symbol,
            direction,
            timestamp: Utc::now(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// One OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: i64,
}

/// Lifecycle state of a position. `NONE` is the absence of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    PendingOpen,
    Open,
    PendingClose,
    Closed,
}

impl PositionStatus {
    pub fn is_pending(self) -> bool {
        matches!(self, PositionStatus::PendingOpen | PositionStatus::PendingClose)
    }
}

/// A position on one symbol, as tracked by the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: Side,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub leverage: u8,
    pub sl_price: Decimal,
    pub tp_price: Decimal,
    pub status: PositionStatus,
    pub opened_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Fill price of the closing order, when the close was ours.
    #[serde(default)]
    pub exit_price: Option<Decimal>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Realised (or mark-to-market) PnL in quote currency at `price`.
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        let diff = match self.side {
            Side::Long => price - self.entry_price,
            Side::Short => self.entry_price - price,
        };
        diff * self.quantity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        }
    }
}

/// An order to be submitted to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    pub order_type: OrderType,
    /// Limit price; ignored for market orders.
    pub price: Option<Decimal>,
    pub leverage: u8,
    pub reduce_only: bool,
    /// Stable across retries of the same order so the exchange can de-duplicate.
    pub client_order_id: String,
}

impl OrderRequest {
    pub fn market(
        symbol: Symbol,
        side: Side,
        quantity: Decimal,
        leverage: u8,
        client_order_id: String,
    ) -> Self {
        Self {
            symbol,
            side,
            quantity,
            order_type: OrderType::Market,
            price: None,
            leverage,
            reduce_only: false,
            client_order_id,
        }
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl FromStr for OrderStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "PARTIALLY_FILLED" => Ok(OrderStatus::PartiallyFilled),
            "FILLED" => Ok(OrderStatus::Filled),
            "CANCELED" => Ok(OrderStatus::Canceled),
            "REJECTED" => Ok(OrderStatus::Rejected),
            "EXPIRED" | "EXPIRED_IN_MATCH" => Ok(OrderStatus::Expired),
            other => Err(Error::UnknownOrderStatus(other.to_string())),
        }
    }
}

/// The gateway's report for a submitted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub symbol: Symbol,
    pub side: Side,
    pub order_id: String,
    pub client_order_id: String,
    pub status: OrderStatus,
    pub fill_price: Decimal,
    pub fill_quantity: Decimal,
}

impl OrderResult {
    /// True when some quantity actually traded.
    pub fn has_fill(&self) -> bool {
        matches!(self.status, OrderStatus::Filled | OrderStatus::PartiallyFilled)
            && self.fill_quantity > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn symbol_parse_normalises_common_spellings() {
        for raw in ["BTC-USD", "BTC/USDT", "BTC/USDT:USDT", "btcusdt", " BTCUSDT "] {
            assert_eq!(Symbol::parse(raw).unwrap(), Symbol("BTCUSDT".into()), "{raw}");
        }
        assert_eq!(Symbol::parse("ETH-USDC").unwrap().0, "ETHUSDC");
    }

    #[test]
    fn symbol_parse_rejects_garbage() {
        assert!(Symbol::parse("").is_err());
        assert!(Symbol::parse("BTC$USDT").is_err());
        assert!(Symbol::parse("BTC").is_err());
    }

    #[test]
    fn order_status_parses_exchange_strings() {
        assert_eq!("FILLED".parse::<OrderStatus>().unwrap(), OrderStatus::Filled);
        assert_eq!("EXPIRED_IN_MATCH".parse::<OrderStatus>().unwrap(), OrderStatus::Expired);
        assert!("WEIRD".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn pnl_is_signed_by_side() {
        let mut pos = Position {
            symbol: Symbol("BTCUSDT".into()),
            side: Side::Long,
            entry_price: dec!(100),
            quantity: dec!(2),
            leverage: 5,
            sl_price: dec!(95),
            tp_price: dec!(110),
            status: PositionStatus::Open,
            opened_at: None,
            closed_at: None,
            exit_price: None,
        };
        assert_eq!(pos.pnl_at(dec!(105)), dec!(10));
        pos.side = Side::Short;
        assert_eq!(pos.pnl_at(dec!(105)), dec!(-10));
    }

    #[test]
    fn unfilled_result_has_no_fill() {
        let result = OrderResult {
            symbol: Symbol("BTCUSDT".into()),
            side: Side::Long,
            order_id: "1".into(),
            client_order_id: "c".into(),
            status: OrderStatus::New,
            fill_price: dec!(0),
            fill_quantity: dec!(0),
        };
        assert!(!result.has_fill());
    }
}
