//! Key extraction from a measurement run.
//!
//! The input keying material always comes from the entropy source. The
//! distribution only contributes its fingerprint as the HKDF salt, which
//! binds the key to the run that produced it.

use hkdf::Hkdf;
use qkdnet_entropy::EntropySource;
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use crate::distribution::MeasurementDistribution;
use crate::error::{invalid, QkdResult};
use crate::key::SecretKey;

pub const DEFAULT_KEY_LENGTH: usize = 32;

/// HKDF-SHA256 expand limit (255 blocks).
pub const MAX_KEY_LENGTH: usize = 255 * 32;

const EXTRACT_INFO: &[u8] = b"qkdnet/key-extract/v1";
const MIN_IKM_LEN: usize = 32;

pub fn extract(
    distribution: &MeasurementDistribution,
    output_length: usize,
    entropy: &mut dyn EntropySource,
) -> QkdResult<SecretKey> {
    if output_length == 0 || output_length > MAX_KEY_LENGTH {
        return Err(invalid(format!(
            "key length must be within 1..={MAX_KEY_LENGTH}, got {output_length}"
        )));
    }

    let ikm = Zeroizing::new(entropy.next_bytes(output_length.max(MIN_IKM_LEN))?);
    let salt = distribution.fingerprint();
    let mut info = Vec::with_capacity(EXTRACT_INFO.len() + 8);
    info.extend_from_slice(EXTRACT_INFO);
    info.extend_from_slice(&(output_length as u64).to_be_bytes());

    let hk = Hkdf::<Sha256>::new(Some(&salt[..]), &ikm);
    let mut okm = Zeroizing::new(vec![0u8; output_length]);
    hk.expand(&info, &mut okm)
        .map_err(|_| invalid("hkdf output length rejected"))?;

    debug!(len = output_length, "extracted key material");
    Ok(SecretKey::from_slice(&okm))
}
