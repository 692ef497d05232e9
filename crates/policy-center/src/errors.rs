use gateway_core_types::GatewayError;
use thiserror::Error;

/// Failures while loading or changing the gateway policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("cannot read policy source {0}")]
    Io(String),
    #[error("malformed policy document {0}")]
    Invalid(String),
    #[error("no policy setting named `{0}`")]
    UnsupportedPath(String),
    #[error("rejected policy value: {0}")]
    InvalidValue(String),
    #[error("unsupported policy operation: {0}")]
    NotImplemented(String),
}

impl From<PolicyError> for GatewayError {
    fn from(err: PolicyError) -> Self {
        GatewayError::new(format!("policy: {err}"))
    }
}
