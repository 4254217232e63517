// In crates/api-client/src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to build the API client: {0}")]
    ClientBuildError(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(#[from] serde_json::Error),
    #[error("API error: code {code}, msg: {msg}")]
    ApiError { code: i64, msg: String },
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
}

/// How a caller should react to an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Worth retrying: transport failures, overload, clock skew.
    Transient,
    /// Credentials or permissions are wrong; nothing will succeed until an operator steps in.
    Auth,
    /// The exchange refused this specific request.
    Rejected,
    /// An order with the same client order id already exists.
    DuplicateOrder,
}

/// Binance codes for missing or invalid credentials.
const AUTH_CODES: [i64; 5] = [-1002, -1022, -2008, -2014, -2015];
/// Binance codes that clear up on their own.
const TRANSIENT_CODES: [i64; 4] = [-1001, -1003, -1007, -1021];
const DUPLICATE_CLIENT_ORDER_ID: i64 = -4116;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::RequestFailed(_) | Error::DeserializationFailed(_) | Error::Malformed(_) => {
                ErrorKind::Transient
            }
            Error::ClientBuildError(_) => ErrorKind::Rejected,
            Error::ApiError { code, .. } if AUTH_CODES.contains(code) => ErrorKind::Auth,
            Error::ApiError { code, .. } if TRANSIENT_CODES.contains(code) => ErrorKind::Transient,
            Error::ApiError { code, .. } if *code == DUPLICATE_CLIENT_ORDER_ID => {
                ErrorKind::DuplicateOrder
            }
            Error::ApiError { .. } => ErrorKind::Rejected,
            Error::HttpStatus { status, .. } => match status {
                401 | 403 => ErrorKind::Auth,
                418 | 429 | 500..=599 => ErrorKind::Transient,
                _ => ErrorKind::Rejected,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn api(code: i64) -> Error {
        Error::ApiError { code, msg: String::new() }
    }

    #[test]
    fn classifies_binance_codes() {
        assert_eq!(api(-2015).kind(), ErrorKind::Auth);
        assert_eq!(api(-1003).kind(), ErrorKind::Transient);
        assert_eq!(api(-2019).kind(), ErrorKind::Rejected); // margin is insufficient
        assert_eq!(api(-4116).kind(), ErrorKind::DuplicateOrder);
    }

    #[test]
    fn classifies_http_statuses() {
        let status = |s| Error::HttpStatus { status: s, body: String::new() };
        assert_eq!(status(401).kind(), ErrorKind::Auth);
        assert_eq!(status(429).kind(), ErrorKind::Transient);
        assert_eq!(status(503).kind(), ErrorKind::Transient);
        assert_eq!(status(400).kind(), ErrorKind::Rejected);
    }
}
