// In crates/risk/src/error.rs

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Order size rounds to zero: {amount} x{leverage} at {price} with lot size {lot_size}")]
    InvalidSize {
        amount: Decimal,
        leverage: u8,
        price: Decimal,
        lot_size: Decimal,
    },

    #[error("Invalid risk parameters: {0}")]
    InvalidParameters(String),
}

pub type Result<T> = std::result::Result<T, Error>;
