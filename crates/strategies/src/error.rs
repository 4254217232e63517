// In crates/strategies/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Insufficient data: need at least {needed} bars, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Model cannot be trained: {0}")]
    Untrainable(String),

    #[error("Feature frame has {got} columns but the model was trained on {expected}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("Invalid model settings: {0}")]
    InvalidSettings(String),
}

pub type Result<T> = std::result::Result<T, Error>;
