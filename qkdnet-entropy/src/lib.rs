//! Randomness sources shared by the qkdnet crates.
//!
//! Every consumer of key material (key extraction, salts, nonces, registry
//! identifiers) draws bytes through [`EntropySource`]. Backends must fail
//! explicitly with [`EntropyError`] rather than hand back low-entropy
//! fallback data.

use thiserror::Error;

pub mod external;

pub use external::{ExternalEntropyConfig, ExternalEntropySource};

/// Errors returned by entropy backends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntropyError {
    /// The operating system RNG could not fulfill the request.
    #[error("os rng unavailable: {0}")]
    Platform(String),
    /// An external service did not answer within its deadline.
    #[error("entropy service timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    /// An external service answered with the wrong number of bytes.
    #[error("entropy service returned {got} bytes, expected {expected}")]
    ShortRead { expected: usize, got: usize },
    /// An external service reported a failure of its own.
    #[error("entropy service failed: {0}")]
    Service(String),
    /// Every retry against an external service failed.
    #[error("entropy service unavailable after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<EntropyError>,
    },
}

/// Minimal trait implemented by all entropy sources.
pub trait EntropySource: Send {
    /// Try to fill `dest` with fresh entropy.
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), EntropyError>;

    /// Draw `len` fresh bytes.
    fn next_bytes(&mut self, len: usize) -> Result<Vec<u8>, EntropyError> {
        let mut buf = vec![0u8; len];
        self.try_fill_bytes(&mut buf)?;
        Ok(buf)
    }
}

impl<S: EntropySource + ?Sized> EntropySource for &mut S {
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), EntropyError> {
        (**self).try_fill_bytes(dest)
    }
}

impl<S: EntropySource + ?Sized> EntropySource for Box<S> {
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), EntropyError> {
        (**self).try_fill_bytes(dest)
    }
}

/// Production entropy backed by the OS CSPRNG. Non-blocking once the OS
/// pool is initialised.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostEntropySource;

impl HostEntropySource {
    pub const fn new() -> Self {
        Self
    }
}

impl EntropySource for HostEntropySource {
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), EntropyError> {
        if dest.is_empty() {
            return Ok(());
        }
        getrandom::getrandom(dest).map_err(|err| EntropyError::Platform(err.to_string()))
    }
}

/// Deterministic ChaCha20 stream for simulations and tests. Never compiled
/// into builds without the `sim` feature.
#[cfg(feature = "sim")]
#[derive(Clone, Debug)]
pub struct SeededEntropySource {
    rng: rand_chacha::ChaCha20Rng,
}

#[cfg(feature = "sim")]
impl SeededEntropySource {
    pub fn with_seed(seed: u64) -> Self {
        use rand_chacha::rand_core::SeedableRng;
        Self {
            rng: rand_chacha::ChaCha20Rng::seed_from_u64(seed),
        }
    }

    pub fn reseed(&mut self, seed: u64) {
        *self = Self::with_seed(seed);
    }
}

#[cfg(feature = "sim")]
impl EntropySource for SeededEntropySource {
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), EntropyError> {
        use rand_chacha::rand_core::RngCore;
        self.rng.fill_bytes(dest);
        Ok(())
    }
}
