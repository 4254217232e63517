// In crates/notifier/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuildError(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Telegram answered {status}: {body}")]
    Delivery { status: u16, body: String },
}

pub type Result<T> = std::result::Result<T, Error>;
