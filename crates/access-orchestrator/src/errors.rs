use gateway_core_types::GatewayError;
use serde::Serialize;
use thiserror::Error;

/// Terminal failures of one orchestration run. None are retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),
    #[error("invalid consent: {0}")]
    InvalidConsent(String),
    #[error("consent expired: {0}")]
    ConsentExpired(String),
    #[error("insufficient permissions: {reason}")]
    InsufficientPermissions { reason: String, removed: Vec<String> },
    #[error("consent validation failed: {0}")]
    ConsentValidationError(String),
    #[error("operational limit exceeded: {0}")]
    OperationalLimitExceeded(String),
    #[error("external fetch failed: {0}")]
    ExternalFetchFailed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AccessError {
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::InvalidRequest(_) => "INVALID_REQUEST",
            AccessError::RateLimitExceeded(_) => "RATE_LIMIT_EXCEEDED",
            AccessError::InvalidConsent(_) => "INVALID_CONSENT",
            AccessError::ConsentExpired(_) => "CONSENT_EXPIRED",
            AccessError::InsufficientPermissions { .. } => "INSUFFICIENT_PERMISSIONS",
            AccessError::ConsentValidationError(_) => "CONSENT_VALIDATION_ERROR",
            AccessError::OperationalLimitExceeded(_) => "OPERATIONAL_LIMIT_EXCEEDED",
            AccessError::ExternalFetchFailed(_) => "EXTERNAL_FETCH_FAILED",
            AccessError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            AccessError::InvalidRequest(_) => 400,
            AccessError::InvalidConsent(_) | AccessError::ConsentExpired(_) => 401,
            AccessError::InsufficientPermissions { .. } => 403,
            AccessError::OperationalLimitExceeded(_) => 423,
            AccessError::RateLimitExceeded(_) => 429,
            AccessError::ConsentValidationError(_) | AccessError::Internal(_) => 500,
            AccessError::ExternalFetchFailed(_) => 502,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            status: self.http_status(),
            detail: self.to_string(),
        }
    }
}

/// Transport-neutral error payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub status: u16,
    pub detail: String,
}

impl From<AccessError> for GatewayError {
    fn from(value: AccessError) -> Self {
        GatewayError::new(value.to_string())
    }
}
