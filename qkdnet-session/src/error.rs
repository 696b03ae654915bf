use qkdnet_core::QkdError;
use qkdnet_crypto::CryptoError;
use qkdnet_entropy::EntropyError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::registry::KeyId;

/// Coarse classification callers branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidParameter,
    RandomnessUnavailable,
    AuthenticationFailure,
    KeyDistributionRejected,
    Configuration,
    UnknownKey,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("randomness unavailable: {0}")]
    RandomnessUnavailable(#[source] EntropyError),
    #[error("authentication failed: {0}")]
    AuthenticationFailure(&'static str),
    #[error("key distribution rejected: error rate {error_rate:.4} >= threshold {threshold}")]
    KeyDistributionRejected { error_rate: f64, threshold: f64 },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown session key {0}")]
    UnknownKey(KeyId),
    #[error("session key {0} expired; rotate the channel")]
    KeyExpired(KeyId),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            SessionError::RandomnessUnavailable(_) => ErrorKind::RandomnessUnavailable,
            SessionError::AuthenticationFailure(_) => ErrorKind::AuthenticationFailure,
            SessionError::KeyDistributionRejected { .. } => ErrorKind::KeyDistributionRejected,
            SessionError::Config(_) => ErrorKind::Configuration,
            SessionError::UnknownKey(_) | SessionError::KeyExpired(_) => ErrorKind::UnknownKey,
        }
    }

    /// Only entropy outages are transient; everything else fails the same way again.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::RandomnessUnavailable
    }
}

impl From<EntropyError> for SessionError {
    fn from(err: EntropyError) -> Self {
        SessionError::RandomnessUnavailable(err)
    }
}

impl From<QkdError> for SessionError {
    fn from(err: QkdError) -> Self {
        match err {
            QkdError::InvalidParameter(msg) => SessionError::InvalidParameter(msg),
            QkdError::RandomnessUnavailable(source) => SessionError::RandomnessUnavailable(source),
        }
    }
}

impl From<CryptoError> for SessionError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidParameter(msg) => SessionError::InvalidParameter(msg),
            CryptoError::AuthenticationFailure(reason) => {
                SessionError::AuthenticationFailure(reason)
            }
            CryptoError::RandomnessUnavailable(source) => {
                SessionError::RandomnessUnavailable(source)
            }
        }
    }
}
