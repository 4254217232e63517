// In crates/engine/src/error.rs

use core_types::OrderStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Exchange(#[from] execution::Error),

    #[error("Model error: {0}")]
    Model(#[from] strategies::Error),

    #[error(transparent)]
    Risk(#[from] risk::Error),

    #[error("Order {client_order_id} ended {status:?} without a fill")]
    Unfilled {
        client_order_id: String,
        status: OrderStatus,
    },

    #[error("Close order {client_order_id} filled {filled} of {requested}")]
    PartialClose {
        client_order_id: String,
        filled: rust_decimal::Decimal,
        requested: rust_decimal::Decimal,
    },

    #[error("Position snapshot I/O failed: {0}")]
    StoreIo(#[from] std::io::Error),

    #[error("Position snapshot is malformed: {0}")]
    StoreFormat(#[from] serde_json::Error),

    #[error(transparent)]
    Journal(#[from] analytics::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Failures that must stop all trading until an operator steps in.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Exchange(e) if e.is_fatal())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Exchange(e) if e.is_transient())
    }

    /// Short label for the part of the cycle that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Exchange(execution::Error::DataUnavailable { .. }) => "market data",
            Error::Exchange(_) | Error::Unfilled { .. } | Error::PartialClose { .. } => "order",
            Error::Model(_) => "model",
            Error::Risk(_) => "sizing",
            Error::StoreIo(_) | Error::StoreFormat(_) | Error::Journal(_) => "storage",
            Error::Config(_) => "configuration",
        }
    }
}

impl From<app_config::Error> for Error {
    fn from(e: app_config::Error) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn classification_follows_exchange_error() {
        let auth = Error::from(execution::Error::Auth("bad key".into()));
        assert!(auth.is_fatal());
        assert!(!auth.is_transient());

        let timeout = Error::from(execution::Error::Timeout(Duration::from_secs(1)));
        assert!(timeout.is_transient());
        assert_eq!(timeout.stage(), "order");

        let data = Error::from(execution::Error::DataUnavailable {
            symbol: "BTCUSDT".into(),
            reason: "down".into(),
        });
        assert_eq!(data.stage(), "market data");
        assert!(!data.is_fatal());
    }
}
