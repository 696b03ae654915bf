use qkdnet_entropy::EntropyError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Envelope parsing or tag verification failed. The reason is static so
    /// callers cannot leak attacker-controlled bytes into logs.
    #[error("authentication failed: {0}")]
    AuthenticationFailure(&'static str),
    #[error("randomness unavailable: {0}")]
    RandomnessUnavailable(#[from] EntropyError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;

pub(crate) fn invalid(msg: impl Into<String>) -> CryptoError {
    CryptoError::InvalidParameter(msg.into())
}
