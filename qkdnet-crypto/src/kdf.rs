//! PBKDF2-HMAC-SHA256 stage turning an extracted QKD key into an
//! encryption key.

use std::fmt;

use qkdnet_core::SecretKey;
use qkdnet_entropy::EntropySource;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{invalid, CryptoResult};

pub const DEFAULT_ITERATIONS: u32 = 100_000;
pub const DEFAULT_OUTPUT_LENGTH: usize = 32;
pub const MAX_OUTPUT_LENGTH: usize = 1_024;
pub const MIN_SALT_LENGTH: usize = 16;

fn default_iterations() -> u32 {
    DEFAULT_ITERATIONS
}

fn default_output_length() -> usize {
    DEFAULT_OUTPUT_LENGTH
}

fn default_salt_length() -> usize {
    MIN_SALT_LENGTH
}

/// KDF section.
///
/// # TOML
/// ```text
/// [kdf]
/// iterations = 100000
/// output-length = 32
/// salt-length = 16
/// ```
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct KdfParams {
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_output_length")]
    pub output_length: usize,
    #[serde(default = "default_salt_length")]
    pub salt_length: usize,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            output_length: default_output_length(),
            salt_length: default_salt_length(),
        }
    }
}

impl KdfParams {
    pub fn validate(&self) -> CryptoResult<()> {
        if self.iterations == 0 {
            return Err(invalid("iterations must be at least 1"));
        }
        if self.output_length == 0 || self.output_length > MAX_OUTPUT_LENGTH {
            return Err(invalid(format!(
                "output_length must be within 1..={MAX_OUTPUT_LENGTH}, got {}",
                self.output_length
            )));
        }
        if self.salt_length < MIN_SALT_LENGTH {
            return Err(invalid(format!(
                "salt_length must be at least {MIN_SALT_LENGTH}, got {}",
                self.salt_length
            )));
        }
        Ok(())
    }
}

/// Public KDF salt, shown as hex.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Salt(Vec<u8>);

impl Salt {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_hex(encoded: &str) -> CryptoResult<Self> {
        hex::decode(encoded)
            .map(Self)
            .map_err(|err| invalid(format!("salt is not valid hex: {err}")))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Salt({})", self.to_hex())
    }
}

impl fmt::Display for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<Salt> for String {
    fn from(salt: Salt) -> Self {
        salt.to_hex()
    }
}

impl TryFrom<String> for Salt {
    type Error = crate::CryptoError;

    fn try_from(encoded: String) -> Result<Self, Self::Error> {
        Self::from_hex(&encoded)
    }
}

/// Draw a fresh salt of `params.salt_length` bytes.
pub fn generate_salt(params: &KdfParams, entropy: &mut dyn EntropySource) -> CryptoResult<Salt> {
    params.validate()?;
    Ok(Salt(entropy.next_bytes(params.salt_length)?))
}

/// Derive an encryption key. Pure in its inputs.
pub fn derive(input_key: &SecretKey, salt: &Salt, params: &KdfParams) -> CryptoResult<SecretKey> {
    params.validate()?;
    if input_key.is_empty() {
        return Err(invalid("input key is empty"));
    }
    if salt.len() < MIN_SALT_LENGTH {
        return Err(invalid(format!(
            "salt must be at least {MIN_SALT_LENGTH} bytes, got {}",
            salt.len()
        )));
    }

    let mut out = Zeroizing::new(vec![0u8; params.output_length]);
    pbkdf2::pbkdf2_hmac::<Sha256>(
        input_key.as_bytes(),
        salt.as_bytes(),
        params.iterations,
        &mut out,
    );
    Ok(SecretKey::from_slice(&out))
}
