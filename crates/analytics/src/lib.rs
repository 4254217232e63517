// In crates/analytics/src/lib.rs

pub mod error;
pub mod journal;
pub mod summary;

// Re-export public types
pub use error::{Error, Result};
pub use journal::{TradeJournal, TradeRecord};
pub use summary::{OpenPositionRow, open_positions_table, profit_percentage};
