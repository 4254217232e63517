// In crates/strategies/src/features.rs

use core_types::Kline;
use num_traits::ToPrimitive;
use ta::Next;
use ta::indicators::{
    BollingerBands, MovingAverageConvergenceDivergence as Macd, RateOfChange,
    RelativeStrengthIndex as Rsi, SimpleMovingAverage as Sma,
};

use crate::{Error, Result};

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_MULTIPLIER: f64 = 2.0;
pub const MOMENTUM_PERIOD: usize = 10;

const RSI_OVERBOUGHT: f64 = 70.0;

/// Column order of every feature row.
pub const FEATURE_NAMES: [&str; 10] = [
    "short_ma",
    "long_ma",
    "rsi",
    "macd",
    "macd_signal",
    "bollinger_middle",
    "bollinger_upper",
    "bollinger_lower",
    "momentum",
    "roc",
];

/// Indicator values for one bar, named.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRow {
    pub open_time: i64,
    pub close: f64,
    pub short_ma: f64,
    pub long_ma: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub bollinger_middle: f64,
    pub bollinger_upper: f64,
    pub bollinger_lower: f64,
    pub momentum: f64,
    pub roc: f64,
}

impl FeatureRow {
    /// Values in `FEATURE_NAMES` order.
    pub fn values(&self) -> Vec<f64> {
        vec![
            self.short_ma,
            self.long_ma,
            self.rsi,
            self.macd,
            self.macd_signal,
            self.bollinger_middle,
            self.bollinger_upper,
            self.bollinger_lower,
            self.momentum,
            self.roc,
        ]
    }

    /// Training label: 1 in an uptrend that is not overbought.
    pub fn label(&self) -> u8 {
        u8::from(self.short_ma > self.long_ma && self.rsi < RSI_OVERBOUGHT)
    }
}

/// Warmed-up indicator rows for a bar series, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    pub rows: Vec<FeatureRow>,
}

impl FeatureFrame {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        FEATURE_NAMES.len()
    }

    pub fn last(&self) -> Option<&FeatureRow> {
        self.rows.last()
    }

    pub fn matrix(&self) -> Vec<Vec<f64>> {
        self.rows.iter().map(FeatureRow::values).collect()
    }

    pub fn labels(&self) -> Vec<u8> {
        self.rows.iter().map(FeatureRow::label).collect()
    }
}

/// Computes the indicator set over the most recent `history_bars` bars.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    short_window: usize,
    long_window: usize,
    history_bars: usize,
}

impl FeatureBuilder {
    pub fn new(short_window: usize, long_window: usize, history_bars: usize) -> Result<Self> {
        if short_window == 0 || long_window == 0 {
            return Err(Error::InvalidSettings("moving average windows must be positive".into()));
        }
        Ok(Self {
            short_window,
            long_window,
            history_bars,
        })
    }

    /// Bars needed before the first row has every indicator warmed up.
    pub fn min_bars(&self) -> usize {
        [
            self.short_window,
            self.long_window,
            MACD_SLOW + MACD_SIGNAL,
            BOLLINGER_PERIOD,
            RSI_PERIOD,
            MOMENTUM_PERIOD,
        ]
        .into_iter()
        .max()
        .unwrap_or(MACD_SLOW + MACD_SIGNAL)
    }

    pub fn build(&self, bars: &[Kline]) -> Result<FeatureFrame> {
        let start = bars.len().saturating_sub(self.history_bars);
        let bars = &bars[start..];
        let needed = self.min_bars();
        if bars.len() < needed {
            return Err(Error::InsufficientData {
                needed,
                got: bars.len(),
            });
        }

        let ta_err = |e: ta::errors::TaError| Error::InvalidSettings(format!("{e:?}"));
        let mut short_ma = Sma::new(self.short_window).map_err(ta_err)?;
        let mut long_ma = Sma::new(self.long_window).map_err(ta_err)?;
        let mut rsi = Rsi::new(RSI_PERIOD).map_err(ta_err)?;
        let mut macd = Macd::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL).map_err(ta_err)?;
        let mut bollinger = BollingerBands::new(BOLLINGER_PERIOD, BOLLINGER_MULTIPLIER).map_err(ta_err)?;
        let mut roc = RateOfChange::new(MOMENTUM_PERIOD).map_err(ta_err)?;

        let closes: Vec<f64> = bars
            .iter()
            .map(|b| b.close.to_f64().unwrap_or(f64::NAN))
            .collect();

        let mut rows = Vec::with_capacity(bars.len() + 1 - needed);
        for (i, (bar, &close)) in bars.iter().zip(&closes).enumerate() {
            let short = short_ma.next(close);
            let long = long_ma.next(close);
            let rsi_value = rsi.next(close);
            let macd_out = macd.next(close);
            let bands = bollinger.next(close);
            let roc_value = roc.next(close);

            if i + 1 < needed {
                continue;
            }
            let row = FeatureRow {
                open_time: bar.open_time,
                close,
                short_ma: short,
                long_ma: long,
                rsi: rsi_value,
                macd: macd_out.macd,
                macd_signal: macd_out.signal,
                bollinger_middle: bands.average,
                bollinger_upper: bands.upper,
                bollinger_lower: bands.lower,
                momentum: close - closes[i - MOMENTUM_PERIOD],
                roc: roc_value,
            };
            if row.values().iter().all(|v| v.is_finite()) {
                rows.push(row);
            }
        }

        if rows.is_empty() {
            return Err(Error::InsufficientData {
                needed,
                got: bars.len(),
            });
        }
        tracing::debug!(bars = bars.len(), rows = rows.len(), "Computed feature frame.");
        Ok(FeatureFrame { rows })
    }
}

/// Plain-language reading of the indicators behind a decision.
pub fn explain(row: &FeatureRow, buy: bool) -> String {
    let mut parts = Vec::new();

    if row.rsi > RSI_OVERBOUGHT {
        parts.push(format!("RSI indicates overbought (RSI = {:.2}).", row.rsi));
    } else if row.rsi < 30.0 {
        parts.push(format!("RSI indicates oversold (RSI = {:.2}).", row.rsi));
    }

    if row.short_ma > row.long_ma {
        parts.push("Short-term moving average is above the long-term one (bullish).".to_string());
    } else {
        parts.push("Short-term moving average is below the long-term one (bearish).".to_string());
    }

    if row.macd > row.macd_signal {
        parts.push("MACD is above its signal line (bullish).".to_string());
    } else {
        parts.push("MACD is below its signal line (bearish).".to_string());
    }

    if row.close > row.bollinger_upper {
        parts.push("Price is above the upper Bollinger band (overbought).".to_string());
    } else if row.close < row.bollinger_lower {
        parts.push("Price is below the lower Bollinger band (oversold).".to_string());
    }

    parts.push(format!("Decision: {} based on the above.", if buy { "BUY" } else { "SELL" }));
    parts.join(" ")
}
