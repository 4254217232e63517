// In crates/app-config/src/types.rs

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use core_types::Symbol;

use crate::{Error, Result};

#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    /// The application's general settings.
    pub app: AppSettings,
    /// Credentials and endpoints for the futures exchange.
    pub exchange: ExchangeSettings,
    /// What to trade and how much.
    pub trading: TradingSettings,
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub model: ModelSettings,
    /// Telegram delivery; when absent, notifications only go to the log.
    pub telegram: Option<TelegramSettings>,
    #[serde(default)]
    pub storage: StorageSettings,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    /// The environment the application is running in (e.g., "development", "production").
    pub environment: String,
    /// The log level for the application.
    pub log_level: String,
    /// Trade against the in-process simulated exchange instead of the real one.
    #[serde(default)]
    pub simulation: bool,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ExchangeSettings {
    /// The API key for the exchange.
    pub api_key: String,
    /// The secret key for the exchange.
    pub secret_key: String,
    /// The REST API base URL (e.g., "https://fapi.binance.com").
    #[serde(default = "default_rest_base_url")]
    pub rest_base_url: String,
    /// Validity window for signed requests, in milliseconds.
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TradingSettings {
    /// Symbols to trade; any of `BTC-USD`, `BTC/USDT`, `BTCUSDT`.
    pub symbols: Vec<String>,
    /// Bar interval (e.g., "15m", "1h").
    pub interval: String,
    /// Lookback for historical bars (e.g., "30d").
    pub period: String,
    /// Number of most recent bars fed to the feature pipeline.
    #[serde(default = "default_history_bars")]
    pub history_bars: usize,
    pub leverage: u8,
    /// Margin committed per position, in quote currency.
    pub investment_amount: f64,
    /// Stop-loss distance as a fraction of entry (0.05 = 5%).
    pub stop_loss_percent: f64,
    /// Take-profit distance as a fraction of entry (0.10 = 10%).
    pub take_profit_percent: f64,
    #[serde(default = "default_lot_size")]
    pub default_lot_size: f64,
    /// Per-symbol lot size overrides, keyed by any accepted symbol spelling.
    #[serde(default)]
    pub lot_sizes: HashMap<String, f64>,
    pub poll_interval_secs: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct GatewaySettings {
    /// Upper bound for a single exchange call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries after the first attempt for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ModelSettings {
    pub short_window: usize,
    pub long_window: usize,
    pub n_trees: usize,
    pub max_depth: usize,
    /// Below this vote share the predictor answers Hold.
    pub min_confidence: f64,
    /// Retrain after this many predictions; 0 trains once.
    pub retrain_every: u32,
    pub seed: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            short_window: 10,
            long_window: 30,
            n_trees: 50,
            max_depth: 8,
            min_confidence: 0.0,
            retrain_every: 0,
            seed: 42,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct TelegramSettings {
    pub token: String,
    pub chat_id: String,
    #[serde(default = "default_telegram_url")]
    pub api_base_url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StorageSettings {
    /// JSON snapshot of the position store; reconciled against the exchange on startup.
    pub positions_path: String,
    /// CSV journal of closed trades.
    pub trade_log_path: String,
    pub log_dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            positions_path: "data/positions.json".into(),
            trade_log_path: "data/trade_log.csv".into(),
            log_dir: "logs".into(),
        }
    }
}

/// Helper functions for serde defaults
fn default_rest_base_url() -> String { "https://fapi.binance.com".into() }
fn default_recv_window() -> u64 { 5_000 }
fn default_history_bars() -> usize { 100 }
fn default_lot_size() -> f64 { 0.001 }
fn default_timeout_secs() -> u64 { 10 }
fn default_max_retries() -> u32 { 3 }
fn default_retry_base_delay_ms() -> u64 { 500 }
fn default_telegram_url() -> String { "https://api.telegram.org".into() }

impl Settings {
    /// Rejects configurations the bot cannot trade with.
    pub fn validate(&self) -> Result<()> {
        let t = &self.trading;
        if t.symbols.is_empty() {
            return Err(Error::Invalid("trading.symbols must not be empty".into()));
        }
        self.symbols()?;
        if t.interval.trim().is_empty() || t.period.trim().is_empty() {
            return Err(Error::Invalid("trading.interval and trading.period are required".into()));
        }
        if t.leverage == 0 || t.leverage > 125 {
            return Err(Error::Invalid(format!("leverage {} is outside 1..=125", t.leverage)));
        }
        if !(t.investment_amount > 0.0) {
            return Err(Error::Invalid("investment_amount must be positive".into()));
        }
        for (name, pct) in [
            ("stop_loss_percent", t.stop_loss_percent),
            ("take_profit_percent", t.take_profit_percent),
        ] {
            if !(pct > 0.0 && pct < 1.0) {
                return Err(Error::Invalid(format!("{name} must be a fraction in (0, 1), got {pct}")));
            }
        }
        if !(t.default_lot_size > 0.0) || t.lot_sizes.values().any(|v| !(*v > 0.0)) {
            return Err(Error::Invalid("lot sizes must be positive".into()));
        }
        for key in t.lot_sizes.keys() {
            Symbol::parse(key)?;
        }
        if t.poll_interval_secs == 0 {
            return Err(Error::Invalid("poll_interval_secs must be at least 1".into()));
        }
        if t.history_bars == 0 {
            return Err(Error::Invalid("history_bars must be at least 1".into()));
        }
        if self.gateway.timeout_secs == 0 {
            return Err(Error::Invalid("gateway.timeout_secs must be at least 1".into()));
        }
        let m = &self.model;
        if m.short_window == 0 || m.short_window >= m.long_window {
            return Err(Error::Invalid(format!(
                "model.short_window ({}) must be positive and below long_window ({})",
                m.short_window, m.long_window
            )));
        }
        if m.n_trees == 0 || m.max_depth == 0 {
            return Err(Error::Invalid("model.n_trees and model.max_depth must be positive".into()));
        }
        if !(0.0..=1.0).contains(&m.min_confidence) {
            return Err(Error::Invalid("model.min_confidence must be within [0, 1]".into()));
        }
        Ok(())
    }

    /// The configured symbols in exchange form, deduplicated, in configuration order.
    pub fn symbols(&self) -> Result<Vec<Symbol>> {
        let mut out: Vec<Symbol> = Vec::with_capacity(self.trading.symbols.len());
        for raw in &self.trading.symbols {
            let symbol = Symbol::parse(raw)?;
            if !out.contains(&symbol) {
                out.push(symbol);
            }
        }
        Ok(out)
    }

    /// Lot size for `symbol`, falling back to `default_lot_size`.
    ///
    /// Keys are compared after normalisation since environment overrides arrive lower-cased.
    pub fn lot_size_for(&self, symbol: &Symbol) -> f64 {
        self.trading
            .lot_sizes
            .iter()
            .find(|(key, _)| Symbol::parse(key).is_ok_and(|s| &s == symbol))
            .map(|(_, size)| *size)
            .unwrap_or(self.trading.default_lot_size)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.trading.poll_interval_secs)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use crate::settings_from_toml;

    const BASE: &str = r#"
        [app]
        environment = "test"
        log_level = "info"

        [exchange]
        api_key = "key"
        secret_key = "secret"

        [trading]
        symbols = ["BTC-USD", "ETHUSDT", "BTC/USDT"]
        interval = "15m"
        period = "30d"
        leverage = 5
        investment_amount = 100.0
        stop_loss_percent = 0.05
        take_profit_percent = 0.10
        poll_interval_secs = 60

        [trading.lot_sizes]
        ETHUSDT = 0.01
    "#;

    #[test]
    fn loads_defaults_and_dedupes_symbols() {
        let settings = settings_from_toml(BASE).unwrap();
        let symbols = settings.symbols().unwrap();
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].0, "BTCUSDT");
        assert_eq!(settings.gateway.max_retries, 3);
        assert_eq!(settings.model.long_window, 30);
        assert_eq!(settings.exchange.rest_base_url, "https://fapi.binance.com");
        assert!(settings.telegram.is_none());
        assert!(!settings.app.simulation);
    }

    #[test]
    fn lot_size_override_matches_any_spelling() {
        let settings = settings_from_toml(BASE).unwrap();
        let eth = core_types::Symbol::parse("eth-usd").unwrap();
        let btc = core_types::Symbol::parse("BTCUSDT").unwrap();
        assert_eq!(settings.lot_size_for(&eth), 0.01);
        assert_eq!(settings.lot_size_for(&btc), 0.001);
    }

    #[test]
    fn rejects_percent_written_as_whole_number() {
        let bad = BASE.replace("stop_loss_percent = 0.05", "stop_loss_percent = 5.0");
        assert!(settings_from_toml(&bad).is_err());
    }

    #[test]
    fn rejects_empty_symbols_and_inverted_windows() {
        let no_symbols = BASE.replace(r#"symbols = ["BTC-USD", "ETHUSDT", "BTC/USDT"]"#, "symbols = []");
        assert!(settings_from_toml(&no_symbols).is_err());

        let inverted = format!("{BASE}\n[model]\nshort_window = 40\nlong_window = 20\nn_trees = 5\nmax_depth = 3\nmin_confidence = 0.0\nretrain_every = 0\nseed = 1\n");
        assert!(settings_from_toml(&inverted).is_err());
    }
}
