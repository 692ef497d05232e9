use gateway_core_types::GatewayError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaginationError {
    #[error("pagination key is malformed")]
    Malformed,
    #[error("pagination key signature mismatch")]
    BadSignature,
    #[error("pagination key expired")]
    Expired,
    #[error("pagination key not valid for this request: {0}")]
    ScopeMismatch(&'static str),
    #[error("failed to encode pagination key: {0}")]
    Encode(String),
    #[error("invalid link base url: {0}")]
    InvalidBaseUrl(String),
}

impl From<PaginationError> for GatewayError {
    fn from(value: PaginationError) -> Self {
        GatewayError::new(value.to_string())
    }
}
