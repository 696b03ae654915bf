//! Symmetric stages applied to QKD output: PBKDF2-HMAC-SHA256 derivation
//! ([`kdf`]) and AES-256-GCM envelopes ([`aead`]).
//!
//! # Quickstart
//! ```
//! use qkdnet_core::SecretKey;
//! use qkdnet_crypto::{derive, generate_salt, open, seal, KdfParams};
//! use qkdnet_entropy::HostEntropySource;
//!
//! let mut entropy = HostEntropySource::new();
//! let params = KdfParams { iterations: 1_000, ..KdfParams::default() };
//! let raw = SecretKey::from_slice(&[7u8; 32]);
//! let salt = generate_salt(&params, &mut entropy).unwrap();
//! let key = derive(&raw, &salt, &params).unwrap();
//! let envelope = seal(b"doc-test", &key, &mut entropy).unwrap();
//! assert_eq!(open(&envelope.to_bytes(), &key).unwrap(), b"doc-test");
//! ```

pub mod aead;
pub mod error;
pub mod kdf;

pub use aead::{open, open_with_ttl, open_with_ttl_at, seal, seal_at, Envelope};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{derive, generate_salt, KdfParams, Salt};
