// In crates/api-client/src/lib.rs

use std::time::Duration;

use app_config::ExchangeSettings;
use chrono::Utc;
use core_types::{Kline, OrderRequest, OrderType, Symbol};
use hmac::{Hmac, Mac};
use reqwest::{Method, RequestBuilder};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::Sha256;

// Create a type alias for the HMAC-SHA256 implementation.
type HmacSha256 = Hmac<Sha256>;

pub mod error;
pub mod types;

// Re-export public types
pub use error::{Error, ErrorKind, Result};
pub use types::*;

/// Maximum number of klines the exchange returns per request.
pub const MAX_KLINES_PER_REQUEST: u16 = 1500;

impl ApiClient {
    /// Constructs a new ApiClient from the exchange settings.
    ///
    /// `timeout` bounds every HTTP round trip made through this client.
    pub fn new(settings: &ExchangeSettings, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::ClientBuildError(e.to_string()))?;

        Ok(ApiClient {
            http_client,
            api_key: settings.api_key.clone(),
            secret_key: settings.secret_key.clone(),
            base_url: settings.rest_base_url.trim_end_matches('/').to_string(),
            recv_window_ms: settings.recv_window_ms,
        })
    }

    /// Generates an HMAC-SHA256 signature for a given query string.
    ///
    /// # Returns
    ///
    /// A hexadecimal string representation of the signature.
    fn sign(&self, query_string: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(query_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Appends `recvWindow`, `timestamp` and the signature to `params`.
    fn create_signed_query(&self, params: &mut String) {
        let timestamp = Utc::now().timestamp_millis();

        if !params.is_empty() {
            params.push('&');
        }
        params.push_str(&format!(
            "recvWindow={}&timestamp={}",
            self.recv_window_ms, timestamp
        ));

        let signature = self.sign(params);
        params.push_str(&format!("&signature={}", signature));
    }

    fn signed_request(&self, method: Method, path: &str, mut params: String) -> RequestBuilder {
        self.create_signed_query(&mut params);
        let url = format!("{}{}?{}", self.base_url, path, params);
        self.http_client
            .request(method, url)
            .header("X-MBX-APIKEY", &self.api_key)
    }

    /// Sends the request and decodes the body, surfacing exchange error objects first.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(Error::RequestFailed)?;
        let status = response.status();
        let text = response.text().await.map_err(Error::RequestFailed)?;

        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(_) if !status.is_success() => {
                return Err(Error::HttpStatus { status: status.as_u16(), body: text });
            }
            Err(e) => return Err(Error::DeserializationFailed(e)),
        };

        // Binance returns an error object on failure, so we check for that first.
        if let Some(code) = value.get("code").and_then(Value::as_i64) {
            if code != 0 && code != 200 {
                let msg = value
                    .get("msg")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error")
                    .to_string();
                return Err(Error::ApiError { code, msg });
            }
        }
        if !status.is_success() {
            return Err(Error::HttpStatus { status: status.as_u16(), body: text });
        }

        serde_json::from_value(value).map_err(Error::DeserializationFailed)
    }

    /// Fetches the futures account balance and asset information.
    ///
    /// This corresponds to the `GET /fapi/v2/account` endpoint.
    pub async fn get_account_balance(&self) -> Result<AccountState> {
        let request = self.signed_request(Method::GET, "/fapi/v2/account", String::new());
        self.send(request).await
    }

    /// Fetches historical kline (candlestick) data.
    ///
    /// This corresponds to the `GET /fapi/v1/klines` endpoint.
    ///
    /// # Arguments
    ///
    /// * `symbol`: The symbol to fetch klines for.
    /// * `interval`: The kline interval (e.g., "1m", "5m", "1h").
    /// * `start_time`: Optional start time in milliseconds.
    /// * `limit`: Optional number of klines to return (max 1500, default 500).
    pub async fn get_historical_klines(
        &self,
        symbol: &Symbol,
        interval: &str,
        start_time: Option<i64>,
        limit: Option<u16>,
    ) -> Result<Vec<Kline>> {
        let mut params = format!("symbol={}&interval={}", symbol.0, interval);

        if let Some(st) = start_time {
            params.push_str(&format!("&startTime={}", st));
        }
        if let Some(l) = limit {
            params.push_str(&format!("&limit={}", l.min(MAX_KLINES_PER_REQUEST)));
        }

        let url = format!("{}/fapi/v1/klines?{}", self.base_url, params);
        let raw_klines: Vec<RawKline> = self.send(self.http_client.get(&url)).await?;

        // Convert the RawKlines into our clean, internal Kline type.
        raw_klines
            .into_iter()
            .map(|raw| {
                Ok(Kline {
                    open_time: raw.0,
                    open: parse_decimal(&raw.1)?,
                    high: parse_decimal(&raw.2)?,
                    low: parse_decimal(&raw.3)?,
                    close: parse_decimal(&raw.4)?,
                    volume: parse_decimal(&raw.5)?,
                    close_time: raw.6,
                })
            })
            .collect()
    }

    /// Latest traded price. Corresponds to `GET /fapi/v1/ticker/price`.
    pub async fn get_ticker_price(&self, symbol: &Symbol) -> Result<Decimal> {
        let url = format!("{}/fapi/v1/ticker/price?symbol={}", self.base_url, symbol.0);
        let ticker: TickerPrice = self.send(self.http_client.get(&url)).await?;
        Ok(ticker.price)
    }

    pub async fn set_leverage(&self, symbol: &Symbol, leverage: u8) -> Result<()> {
        let params = format!("symbol={}&leverage={}", symbol.0, leverage);
        let request = self.signed_request(Method::POST, "/fapi/v1/leverage", params);
        let _: Value = self.send(request).await?;
        Ok(())
    }

    /// Places a new order. Corresponds to `POST /fapi/v1/order`.
    ///
    /// `newOrderRespType=RESULT` makes the exchange answer with the fill, so a
    /// filled market order carries its `avgPrice` and `executedQty`.
    pub async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse> {
        let mut params = format!(
            "symbol={}&side={}&type={}&quantity={}&newClientOrderId={}&newOrderRespType=RESULT",
            order.symbol.0,
            order.side.as_order_side(),
            order.order_type.as_str(),
            order.quantity.normalize(),
            order.client_order_id,
        );
        if order.order_type == OrderType::Limit {
            let price = order
                .price
                .ok_or_else(|| Error::Malformed("limit order without a price".into()))?;
            params.push_str(&format!("&price={}&timeInForce=GTC", price.normalize()));
        }
        if order.reduce_only {
            params.push_str("&reduceOnly=true");
        }

        let request = self.signed_request(Method::POST, "/fapi/v1/order", params);
        self.send(request).await
    }

    /// Looks an order up by the client order id it was submitted with.
    pub async fn query_order(&self, symbol: &Symbol, client_order_id: &str) -> Result<OrderResponse> {
        let params = format!("symbol={}&origClientOrderId={}", symbol.0, client_order_id);
        let request = self.signed_request(Method::GET, "/fapi/v1/order", params);
        self.send(request).await
    }

    pub async fn cancel_order(&self, symbol: &Symbol, client_order_id: &str) -> Result<OrderResponse> {
        let params = format!("symbol={}&origClientOrderId={}", symbol.0, client_order_id);
        let request = self.signed_request(Method::DELETE, "/fapi/v1/order", params);
        self.send(request).await
    }

    /// Current position entries for `symbol`. Corresponds to `GET /fapi/v2/positionRisk`.
    pub async fn get_position_risk(&self, symbol: &Symbol) -> Result<Vec<PositionRisk>> {
        let params = format!("symbol={}", symbol.0);
        let request = self.signed_request(Method::GET, "/fapi/v2/positionRisk", params);
        self.send(request).await
    }
}

fn parse_decimal(raw: &str) -> Result<Decimal> {
    raw.parse()
        .map_err(|_| Error::Malformed(format!("'{}' is not a decimal", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ApiClient {
        let settings = ExchangeSettings {
            api_key: "key".into(),
            secret_key: "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j".into(),
            rest_base_url: "https://fapi.binance.com/".into(),
            recv_window_ms: 5000,
        };
        ApiClient::new(&settings, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn signature_matches_exchange_reference() {
        // Reference vector from the exchange's signed-endpoint documentation.
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            client().sign(query),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn signed_query_appends_timestamp_and_signature() {
        let mut params = String::from("symbol=BTCUSDT");
        client().create_signed_query(&mut params);
        assert!(params.starts_with("symbol=BTCUSDT&recvWindow=5000&timestamp="));
        let signature = params.rsplit("&signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
    }

    #[test]
    fn base_url_is_trimmed() {
        assert_eq!(client().base_url, "https://fapi.binance.com");
    }

    #[test]
    fn parse_decimal_rejects_garbage() {
        assert!(parse_decimal("12.5").is_ok());
        assert!(matches!(parse_decimal("abc"), Err(Error::Malformed(_))));
    }
}
