// In crates/analytics/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Trade journal I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Trade journal write failed: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
