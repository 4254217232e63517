// In crates/execution/src/market.rs

use std::collections::BTreeMap;

use api_client::ApiClient;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use core_types::{Kline, Symbol};
use rust_decimal::Decimal;

use crate::{Error, MarketDataSource, Result};

/// Bars requested per page.
const PAGE_SIZE: u16 = 1000;
/// Hard stop for a single fetch, in pages.
const MAX_PAGES: usize = 500;

/// Market data served by the exchange's public kline and ticker endpoints.
#[derive(Debug, Clone)]
pub struct ExchangeMarketData {
    api_client: ApiClient,
}

impl ExchangeMarketData {
    pub fn new(api_client: ApiClient) -> Self {
        Self { api_client }
    }
}

/// Parses a lookback such as "30d", "12h", "90m" or "2w".
pub fn parse_period(period: &str) -> Option<Duration> {
    let period = period.trim();
    if period.len() < 2 || !period.is_ascii() {
        return None;
    }
    let (amount, unit) = period.split_at(period.len() - 1);
    let amount: i64 = amount.parse().ok().filter(|n| *n > 0)?;
    match unit {
        "m" => Some(Duration::minutes(amount)),
        "h" => Some(Duration::hours(amount)),
        "d" => Some(Duration::days(amount)),
        "w" => Some(Duration::weeks(amount)),
        _ => None,
    }
}

fn unavailable(symbol: &Symbol, reason: impl Into<String>) -> Error {
    Error::DataUnavailable {
        symbol: symbol.0.clone(),
        reason: reason.into(),
    }
}

#[async_trait]
impl MarketDataSource for ExchangeMarketData {
    async fn fetch_bars(&self, symbol: &Symbol, interval: &str, period: &str) -> Result<Vec<Kline>> {
        let lookback = parse_period(period)
            .ok_or_else(|| unavailable(symbol, format!("unrecognised period '{period}'")))?;
        let now = Utc::now().timestamp_millis();
        let mut start_time = now - lookback.num_milliseconds();

        // Keyed by open time, which both orders and de-duplicates the pages.
        let mut bars: BTreeMap<i64, Kline> = BTreeMap::new();
        for page in 0..MAX_PAGES {
            let batch = self
                .api_client
                .get_historical_klines(symbol, interval, Some(start_time), Some(PAGE_SIZE))
                .await
                .map_err(|e| unavailable(symbol, e.to_string()))?;

            let Some(last) = batch.last() else { break };
            let next_start = last.close_time + 1;
            let batch_len = batch.len();
            for kline in batch {
                bars.insert(kline.open_time, kline);
            }

            tracing::debug!(symbol = %symbol, page, batch_len, total = bars.len(), "Fetched kline page.");

            // A page that does not move forward, or reaches the present, ends the fetch.
            if next_start <= start_time || next_start >= now || batch_len < PAGE_SIZE as usize {
                break;
            }
            start_time = next_start;
        }

        if bars.is_empty() {
            return Err(unavailable(symbol, "no bars returned"));
        }
        Ok(bars.into_values().collect())
    }

    async fn latest_price(&self, symbol: &Symbol) -> Result<Decimal> {
        self.api_client
            .get_ticker_price(symbol)
            .await
            .map_err(|e| unavailable(symbol, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_units() {
        assert_eq!(parse_period("30d"), Some(Duration::days(30)));
        assert_eq!(parse_period("12h"), Some(Duration::hours(12)));
        assert_eq!(parse_period("90m"), Some(Duration::minutes(90)));
        assert_eq!(parse_period(" 2w "), Some(Duration::weeks(2)));
    }

    #[test]
    fn rejects_malformed_periods() {
        for bad in ["", "d", "30", "30y", "-5d", "0d", "1.5h"] {
            assert_eq!(parse_period(bad), None, "{bad}");
        }
    }
}
