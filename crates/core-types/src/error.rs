// In crates/core-types/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid symbol: '{0}'")]
    InvalidSymbol(String),

    #[error("Unknown order status: '{0}'")]
    UnknownOrderStatus(String),
}

pub type Result<T> = std::result::Result<T, Error>;
