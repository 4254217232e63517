// In crates/api-client/src/types.rs

use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;

/// The main client for interacting with the Binance Futures API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// The persistent HTTP client.
    pub http_client: Client,
    /// The user's API key.
    pub api_key: String,
    /// The user's secret key.
    pub secret_key: String,
    /// The base URL for the Futures API.
    pub base_url: String,
    /// `recvWindow` sent with every signed request.
    pub recv_window_ms: u64,
}

/// Represents a single asset's balance in the futures account.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FuturesAsset {
    /// The asset's symbol (e.g., "USDT").
    pub asset: String,
    /// The wallet balance of the asset.
    pub wallet_balance: Decimal,
    /// The available balance for new positions.
    pub available_balance: Decimal,
}

/// Represents the overall futures account state.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AccountState {
    /// A list of assets in the futures account.
    pub assets: Vec<FuturesAsset>,
    /// The total wallet balance in USDT.
    pub total_wallet_balance: Decimal,
    /// The total unrealized profit and loss in USDT.
    pub total_unrealized_profit: Decimal,
    /// The total available balance for new positions in USDT.
    pub available_balance: Option<Decimal>,
}

impl AccountState {
    pub fn asset_balance(&self, asset: &str) -> Option<Decimal> {
        self.assets
            .iter()
            .find(|a| a.asset == asset)
            .map(|a| a.wallet_balance)
    }
}

/// One entry of `GET /fapi/v2/positionRisk`.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PositionRisk {
    /// The trading pair symbol (e.g., "BTCUSDT").
    pub symbol: String,
    /// The quantity of the position (positive for long, negative for short).
    pub position_amt: Decimal,
    /// The average entry price of the position.
    pub entry_price: Decimal,
    /// The current mark price of the position.
    pub mark_price: Decimal,
    #[serde(rename = "unRealizedProfit")]
    pub unrealized_profit: Decimal,
    /// The leverage used for the position, as a string (e.g., "10").
    pub leverage: String,
    /// The side of the position ("LONG", "SHORT", or "BOTH").
    pub position_side: String,
}

/// Temporary struct to deserialize the kline response from Binance,
/// which is a JSON array of mixed types.
#[derive(Debug, Deserialize)]
pub struct RawKline(
    pub i64,         // 0: Open time
    pub String,      // 1: Open
    pub String,      // 2: High
    pub String,      // 3: Low
    pub String,      // 4: Close
    pub String,      // 5: Volume
    pub i64,         // 6: Close time
    pub String,      // 7: Quote asset volume
    pub i64,         // 8: Number of trades
    pub String,      // 9: Taker buy base asset volume
    pub String,      // 10: Taker buy quote asset volume
    pub String,      // 11: Ignore
);

#[derive(Debug, Deserialize, Clone)]
pub struct TickerPrice {
    pub symbol: String,
    pub price: Decimal,
}

/// Order state as returned by place, query and cancel endpoints.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: i64,
    pub client_order_id: String,
    pub symbol: String,
    pub status: String,
    pub side: String, // "BUY" or "SELL"
    pub r#type: String, // "MARKET", "LIMIT", etc.
    pub avg_price: Decimal, // The actual average fill price
    pub executed_qty: Decimal, // The actual filled quantity
    #[serde(default)]
    pub cum_quote: Decimal, // The cumulative quote asset transacted
    #[serde(default)]
    pub reduce_only: bool,
}
