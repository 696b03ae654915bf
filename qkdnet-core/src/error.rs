use qkdnet_entropy::EntropyError;
use thiserror::Error;

/// Errors raised by the simulation and extraction pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QkdError {
    /// Caller supplied an out-of-range parameter; not retryable.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// The randomness source failed; the whole call may be retried later.
    #[error("randomness unavailable: {0}")]
    RandomnessUnavailable(#[from] EntropyError),
}

pub type QkdResult<T> = Result<T, QkdError>;

pub(crate) fn invalid(msg: impl Into<String>) -> QkdError {
    QkdError::InvalidParameter(msg.into())
}
