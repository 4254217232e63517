// In crates/analytics/src/journal.rs

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use core_types::{Position, Side, Symbol};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::Result;

pub const JOURNAL_HEADER: [&str; 9] = [
    "timestamp",
    "symbol",
    "direction",
    "order_size",
    "entry_price",
    "exit_price",
    "stop_loss",
    "take_profit",
    "pnl",
];

/// One closed trade as it appears in the journal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub symbol: Symbol,
    pub direction: Side,
    pub order_size: Decimal,
    pub entry_price: Decimal,
    /// Missing when the position was closed outside the bot.
    pub exit_price: Option<Decimal>,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub pnl: Option<Decimal>,
}

impl TradeRecord {
    pub fn from_closed(position: &Position) -> Self {
        Self {
            timestamp: position.closed_at.unwrap_or_else(Utc::now),
            symbol: position.symbol.clone(),
            direction: position.side,
            order_size: position.quantity,
            entry_price: position.entry_price,
            exit_price: position.exit_price,
            stop_loss: position.sl_price,
            take_profit: position.tp_price,
            pnl: position.exit_price.map(|exit| position.pnl_at(exit)),
        }
    }

    fn to_fields(&self) -> [String; 9] {
        let opt = |v: Option<Decimal>| v.map(|d| d.normalize().to_string()).unwrap_or_default();
        [
            self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            self.symbol.to_string(),
            self.direction.to_string(),
            self.order_size.normalize().to_string(),
            self.entry_price.normalize().to_string(),
            opt(self.exit_price),
            self.stop_loss.round_dp(8).normalize().to_string(),
            self.take_profit.round_dp(8).normalize().to_string(),
            opt(self.pnl.map(|p| p.round_dp(8))),
        ]
    }
}

/// Append-only CSV journal of closed trades.
#[derive(Debug, Clone)]
pub struct TradeJournal {
    path: PathBuf,
}

impl TradeJournal {
    /// Opens the journal, creating its directory and header when missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
                tracing::info!(dir = %dir.display(), "Created trade journal directory.");
            }
        }

        let is_new = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        if is_new {
            let mut writer = csv::Writer::from_path(&path)?;
            writer.write_record(JOURNAL_HEADER)?;
            writer.flush()?;
            tracing::info!(path = %path.display(), "Trade journal initialized.");
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &TradeRecord) -> Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(record.to_fields())?;
        writer.flush()?;
        tracing::info!(symbol = %record.symbol, "Trade logged.");
        Ok(())
    }
}
