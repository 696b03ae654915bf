//! Session layer for qkdnet: wires channel simulation, QBER gating and key
//! extraction from `qkdnet-core` into PBKDF2 derivation and AES-256-GCM
//! envelopes from `qkdnet-crypto`, and keeps derived keys in a
//! [`KeyRegistry`].

#[cfg(any(
    all(feature = "dev", feature = "test"),
    all(feature = "dev", feature = "prod"),
    all(feature = "test", feature = "prod")
))]
compile_error!(
    "Only one of the `dev`, `test`, or `prod` features may be enabled for qkdnet-session."
);

pub mod config;
pub mod error;
pub mod registry;
pub mod session;

pub use config::{load_config, Config, ConfigError, ConfigFormat};
pub use error::{ErrorKind, SessionError};
pub use registry::{KeyId, KeyRegistry, SessionKeyRecord, UnixSeconds, MAX_ID_ATTEMPTS};
pub use session::{
    Clock, DistributionRequest, EstablishedChannel, QkdSession, RejectionPolicy, SealedMessage,
    EVENT_DECRYPTION, EVENT_ENCRYPTION, EVENT_KEY_DISTRIBUTION,
};
