// In crates/execution/src/error.rs

use std::time::Duration;

use api_client::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Gateway call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Order rejected: {reason}")]
    Rejected { reason: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Market data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },
}

impl Error {
    /// Failures that may succeed if the same call is simply repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Auth(_))
    }
}

impl From<api_client::Error> for Error {
    fn from(e: api_client::Error) -> Self {
        match e.kind() {
            ErrorKind::Transient => Error::Network(e.to_string()),
            ErrorKind::Auth => Error::Auth(e.to_string()),
            ErrorKind::Rejected | ErrorKind::DuplicateOrder => Error::Rejected { reason: e.to_string() },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
