//! AES-256-GCM envelopes.
//!
//! Layout: `"QKE" | version u8 | issued_at u64 BE | nonce 12 | ciphertext || tag 16`.
//! The first 12 bytes are authenticated as associated data.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use qkdnet_core::SecretKey;
use qkdnet_entropy::EntropySource;
use tracing::debug;

use crate::error::{invalid, CryptoError, CryptoResult};

pub const MAGIC: &[u8; 3] = b"QKE";
pub const VERSION: u8 = 1;
pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const HEADER_LEN: usize = 3 + 1 + 8;

/// Envelopes issued further than this in the future fail TTL checks.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    issued_at: u64,
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl Envelope {
    /// Seconds since the Unix epoch at sealing time.
    pub fn issued_at(&self) -> u64 {
        self.issued_at
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    /// Ciphertext with the trailing GCM tag.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    fn header(&self) -> [u8; HEADER_LEN] {
        header_for(self.issued_at)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.header());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse without verifying the tag.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < HEADER_LEN + NONCE_LEN + TAG_LEN {
            return Err(CryptoError::AuthenticationFailure("envelope truncated"));
        }
        if &bytes[..MAGIC.len()] != MAGIC {
            return Err(CryptoError::AuthenticationFailure("bad envelope magic"));
        }
        if bytes[MAGIC.len()] != VERSION {
            return Err(CryptoError::AuthenticationFailure("unsupported envelope version"));
        }
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&bytes[MAGIC.len() + 1..HEADER_LEN]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[HEADER_LEN..HEADER_LEN + NONCE_LEN]);
        Ok(Self {
            issued_at: u64::from_be_bytes(ts),
            nonce,
            ciphertext: bytes[HEADER_LEN + NONCE_LEN..].to_vec(),
        })
    }
}

fn header_for(issued_at: u64) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[..MAGIC.len()].copy_from_slice(MAGIC);
    header[MAGIC.len()] = VERSION;
    header[MAGIC.len() + 1..].copy_from_slice(&issued_at.to_be_bytes());
    header
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

fn cipher(key: &SecretKey) -> CryptoResult<Aes256Gcm> {
    if key.len() != KEY_LEN {
        return Err(invalid(format!(
            "encryption key must be {KEY_LEN} bytes, got {}",
            key.len()
        )));
    }
    Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|_| invalid("aes-256-gcm rejected key length"))
}

/// Encrypt under a fresh random nonce.
pub fn seal(
    plaintext: &[u8],
    key: &SecretKey,
    entropy: &mut dyn EntropySource,
) -> CryptoResult<Envelope> {
    seal_at(plaintext, key, entropy, unix_now())
}

/// [`seal`] with an explicit issue timestamp (seconds since the epoch).
pub fn seal_at(
    plaintext: &[u8],
    key: &SecretKey,
    entropy: &mut dyn EntropySource,
    issued_at: u64,
) -> CryptoResult<Envelope> {
    let cipher = cipher(key)?;
    let mut nonce = [0u8; NONCE_LEN];
    entropy.try_fill_bytes(&mut nonce)?;
    let header = header_for(issued_at);
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &header,
            },
        )
        .map_err(|_| invalid("aes-256-gcm encryption failed"))?;
    debug!(len = plaintext.len(), issued_at, "sealed envelope");
    Ok(Envelope {
        issued_at,
        nonce,
        ciphertext,
    })
}

/// Parse and authenticate an envelope.
pub fn open(envelope: &[u8], key: &SecretKey) -> CryptoResult<Vec<u8>> {
    let cipher = cipher(key)?;
    let parsed = Envelope::from_bytes(envelope)?;
    decrypt(&cipher, &parsed)
}

/// [`open`] that also refuses envelopes older than `max_age`.
pub fn open_with_ttl(envelope: &[u8], key: &SecretKey, max_age: Duration) -> CryptoResult<Vec<u8>> {
    open_with_ttl_at(envelope, key, max_age, unix_now())
}

/// [`open_with_ttl`] evaluated at `now` (seconds since the epoch).
pub fn open_with_ttl_at(
    envelope: &[u8],
    key: &SecretKey,
    max_age: Duration,
    now: u64,
) -> CryptoResult<Vec<u8>> {
    let cipher = cipher(key)?;
    let parsed = Envelope::from_bytes(envelope)?;
    // Authenticate first so the timestamp is trusted before it is checked.
    let plaintext = decrypt(&cipher, &parsed)?;
    if parsed.issued_at > now.saturating_add(MAX_CLOCK_SKEW.as_secs()) {
        return Err(CryptoError::AuthenticationFailure("envelope issued in the future"));
    }
    if now.saturating_sub(parsed.issued_at) > max_age.as_secs() {
        return Err(CryptoError::AuthenticationFailure("envelope expired"));
    }
    Ok(plaintext)
}

fn decrypt(cipher: &Aes256Gcm, envelope: &Envelope) -> CryptoResult<Vec<u8>> {
    let header = envelope.header();
    cipher
        .decrypt(
            Nonce::from_slice(&envelope.nonce),
            Payload {
                msg: &envelope.ciphertext,
                aad: &header,
            },
        )
        .map_err(|_| CryptoError::AuthenticationFailure("tag mismatch"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use qkdnet_entropy::SeededEntropySource;

    fn key() -> SecretKey {
        SecretKey::from_slice(&[0x11; KEY_LEN])
    }

    #[test]
    fn layout_is_stable() {
        let mut entropy = SeededEntropySource::with_seed(1);
        let env = seal_at(b"abc", &key(), &mut entropy, 0x0102_0304).unwrap();
        let bytes = env.to_bytes();
        assert_eq!(&bytes[..3], b"QKE");
        assert_eq!(bytes[3], VERSION);
        assert_eq!(&bytes[4..12], &0x0102_0304u64.to_be_bytes());
        assert_eq!(bytes.len(), HEADER_LEN + NONCE_LEN + 3 + TAG_LEN);
        assert_eq!(Envelope::from_bytes(&bytes).unwrap(), env);
    }

    #[test]
    fn nonces_are_fresh() {
        let mut entropy = SeededEntropySource::with_seed(2);
        let a = seal(b"same", &key(), &mut entropy).unwrap();
        let b = seal(b"same", &key(), &mut entropy).unwrap();
        assert_ne!(a.nonce(), b.nonce());
        assert_ne!(a.ciphertext(), b.ciphertext());
    }

    #[test]
    fn wrong_key_length_is_a_parameter_error() {
        let mut entropy = SeededEntropySource::with_seed(3);
        let short = SecretKey::from_slice(&[1; 16]);
        assert!(matches!(
            seal(b"x", &short, &mut entropy),
            Err(CryptoError::InvalidParameter(_))
        ));
        assert!(matches!(
            open(&[0; 64], &short),
            Err(CryptoError::InvalidParameter(_))
        ));
    }

    #[test]
    fn malformed_envelopes_fail_authentication() {
        let mut entropy = SeededEntropySource::with_seed(4);
        let bytes = seal(b"payload", &key(), &mut entropy).unwrap().to_bytes();

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        let mut bad_version = bytes.clone();
        bad_version[3] = 9;
        for candidate in [&bytes[..10], &bad_magic[..], &bad_version[..], &[0u8; 0][..]] {
            assert!(matches!(
                open(candidate, &key()),
                Err(CryptoError::AuthenticationFailure(_))
            ));
        }
    }

    #[test]
    fn ttl_rejects_old_and_future_envelopes() {
        let mut entropy = SeededEntropySource::with_seed(5);
        let bytes = seal_at(b"ttl", &key(), &mut entropy, 1_000).unwrap().to_bytes();
        let ttl = Duration::from_secs(30);

        assert_eq!(open_with_ttl_at(&bytes, &key(), ttl, 1_030).unwrap(), b"ttl");
        assert_eq!(
            open_with_ttl_at(&bytes, &key(), ttl, 1_031),
            Err(CryptoError::AuthenticationFailure("envelope expired"))
        );
        assert_eq!(
            open_with_ttl_at(&bytes, &key(), ttl, 900),
            Err(CryptoError::AuthenticationFailure("envelope issued in the future"))
        );
        assert_eq!(open_with_ttl_at(&bytes, &key(), ttl, 950).unwrap(), b"ttl");
    }
}
