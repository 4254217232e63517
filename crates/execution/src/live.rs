// In crates/execution/src/live.rs

use std::collections::HashMap;

use api_client::{ApiClient, ErrorKind, OrderResponse, PositionRisk};
use async_trait::async_trait;
use core_types::{OrderRequest, OrderResult, OrderStatus, Side, Symbol};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::{Error, ExchangePosition, OrderGateway, Result};

/// A gateway that places real orders on the Binance futures exchange.
///
/// This gateway interacts directly with the `ApiClient` to send signed
/// requests for setting leverage and placing orders.
#[derive(Debug)]
pub struct LiveGateway {
    /// The API client for communicating with the exchange.
    api_client: ApiClient,

    /// Leverage last confirmed per symbol, so it is only set when it changes.
    leverage_set: Mutex<HashMap<Symbol, u8>>,
}

impl LiveGateway {
    pub fn new(api_client: ApiClient) -> Self {
        Self {
            api_client,
            leverage_set: Mutex::new(HashMap::new()),
        }
    }

    async fn ensure_leverage(&self, symbol: &Symbol, leverage: u8) -> Result<()> {
        let mut cache = self.leverage_set.lock().await;
        if cache.get(symbol) == Some(&leverage) {
            return Ok(());
        }
        self.api_client.set_leverage(symbol, leverage).await?;
        tracing::info!(symbol = %symbol, leverage, "Leverage set successfully.");
        cache.insert(symbol.clone(), leverage);
        Ok(())
    }
}

#[async_trait]
impl OrderGateway for LiveGateway {
    fn name(&self) -> &'static str {
        "BinanceFutures"
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResult> {
        tracing::info!(?order, "Submitting live order request...");

        if !order.reduce_only {
            self.ensure_leverage(&order.symbol, order.leverage).await?;
        }

        let response = match self.api_client.place_order(order).await {
            Ok(resp) => resp,
            Err(e) if e.kind() == ErrorKind::DuplicateOrder => {
                // An earlier attempt reached the exchange; report that order instead.
                tracing::warn!(
                    client_order_id = %order.client_order_id,
                    "Duplicate client order id. Querying the original order."
                );
                self.api_client
                    .query_order(&order.symbol, &order.client_order_id)
                    .await?
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to place order.");
                return Err(e.into());
            }
        };
        tracing::info!(?response, "Order acknowledged by the exchange.");

        to_order_result(order, response)
    }

    async fn get_position(&self, symbol: &Symbol) -> Result<Option<ExchangePosition>> {
        let entries = self.api_client.get_position_risk(symbol).await?;
        let known_leverage = self.leverage_set.lock().await.get(symbol).copied();
        Ok(net_position(symbol, &entries, known_leverage))
    }

    async fn cancel_order(&self, symbol: &Symbol, client_order_id: &str) -> Result<bool> {
        match self.api_client.cancel_order(symbol, client_order_id).await {
            Ok(resp) => Ok(resp.status == "CANCELED"),
            // Unknown or already finished orders cannot be canceled.
            Err(e) if e.kind() == ErrorKind::Rejected => {
                tracing::warn!(error = %e, client_order_id, "Nothing to cancel.");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn to_order_result(order: &OrderRequest, response: OrderResponse) -> Result<OrderResult> {
    let status: OrderStatus = response
        .status
        .parse()
        .map_err(|e: core_types::Error| Error::Network(e.to_string()))?;
    Ok(OrderResult {
        symbol: order.symbol.clone(),
        side: order.side,
        order_id: response.order_id.to_string(),
        client_order_id: response.client_order_id,
        status,
        fill_price: response.avg_price,
        fill_quantity: response.executed_qty,
    })
}

/// Collapses position-risk entries into one net position (one-way mode).
///
/// An unreadable leverage falls back to the last leverage this gateway set for the symbol.
fn net_position(symbol: &Symbol, entries: &[PositionRisk], known_leverage: Option<u8>) -> Option<ExchangePosition> {
    let entry = entries
        .iter()
        .find(|p| p.symbol == symbol.0 && p.position_amt != Decimal::ZERO)?;
    let leverage = match entry.leverage.parse::<u8>() {
        Ok(leverage) => leverage,
        Err(e) => {
            let fallback = known_leverage.unwrap_or(1);
            tracing::warn!(
                symbol = %symbol,
                raw = %entry.leverage,
                error = %e,
                fallback,
                "Unreadable leverage in position risk; using fallback."
            );
            fallback
        }
    };
    Some(ExchangePosition {
        symbol: symbol.clone(),
        side: if entry.position_amt > Decimal::ZERO { Side::Long } else { Side::Short },
        quantity: entry.position_amt.abs(),
        entry_price: entry.entry_price,
        leverage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn risk(symbol: &str, amt: Decimal) -> PositionRisk {
        PositionRisk {
            symbol: symbol.into(),
            position_amt: amt,
            entry_price: dec!(100),
            mark_price: dec!(101),
            unrealized_profit: dec!(0),
            leverage: "7".into(),
            position_side: "BOTH".into(),
        }
    }

    #[test]
    fn net_position_reads_side_from_sign() {
        let symbol = Symbol("BTCUSDT".into());
        let short = net_position(&symbol, &[risk("BTCUSDT", dec!(-0.5))], None).unwrap();
        assert_eq!(short.side, Side::Short);
        assert_eq!(short.quantity, dec!(0.5));
        assert_eq!(short.leverage, 7);

        assert!(net_position(&symbol, &[risk("BTCUSDT", dec!(0))], None).is_none());
        assert!(net_position(&symbol, &[risk("ETHUSDT", dec!(1))], None).is_none());
    }

    #[test]
    fn unreadable_leverage_falls_back_to_the_last_one_set() {
        let symbol = Symbol("BTCUSDT".into());
        let mut entry = risk("BTCUSDT", dec!(1));
        entry.leverage = "n/a".into();

        let known = net_position(&symbol, std::slice::from_ref(&entry), Some(5)).unwrap();
        assert_eq!(known.leverage, 5);
        let unknown = net_position(&symbol, &[entry], None).unwrap();
        assert_eq!(unknown.leverage, 1);
    }

    #[test]
    fn order_response_maps_to_result() {
        let order = OrderRequest::market(Symbol("BTCUSDT".into()), Side::Long, dec!(1), 5, "c-1".into());
        let response = OrderResponse {
            order_id: 42,
            client_order_id: "c-1".into(),
            symbol: "BTCUSDT".into(),
            status: "FILLED".into(),
            side: "BUY".into(),
            r#type: "MARKET".into(),
            avg_price: dec!(101.5),
            executed_qty: dec!(1),
            cum_quote: dec!(101.5),
            reduce_only: false,
        };
        let result = to_order_result(&order, response).unwrap();
        assert_eq!(result.order_id, "42");
        assert!(result.has_fill());
        assert_eq!(result.fill_price, dec!(101.5));
    }
}
