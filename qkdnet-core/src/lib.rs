//! Simulated quantum key distribution for qkdnet.
//!
//! A run goes through three stages:
//!
//! 1. a [`ChannelSimulator`] measures a noisy entangled register and reduces
//!    the shots to a [`MeasurementDistribution`];
//! 2. [`qber::estimate`] turns the distribution into an error rate and an
//!    accept/reject decision with a [`SecurityLevel`];
//! 3. [`extractor::extract`] expands fresh entropy into a [`SecretKey`],
//!    salted with the distribution fingerprint.
//!
//! ```no_run
//! use qkdnet_core::{estimate, extract, ChannelParams, ChannelSimulator, DepolarizingChannel};
//! use qkdnet_entropy::HostEntropySource;
//!
//! # fn main() -> Result<(), qkdnet_core::QkdError> {
//! let mut rng = rand::thread_rng();
//! let dist = DepolarizingChannel.simulate(&ChannelParams::default(), &mut rng)?;
//! let qber = estimate(&dist, 0.11)?;
//! let key = extract(&dist, 32, &mut HostEntropySource)?;
//! println!("{} {}", qber.security_level, key.fingerprint());
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod distribution;
pub mod error;
pub mod extractor;
pub mod key;
pub mod qber;
pub mod report;

pub use channel::{ChannelParams, ChannelSimulator, DepolarizingChannel};
pub use distribution::{
    MeasurementDistribution, QubitRegister, MAX_QUBITS, MIN_CORRELATED_FRACTION,
};
pub use error::{QkdError, QkdResult};
pub use extractor::{extract, DEFAULT_KEY_LENGTH, MAX_KEY_LENGTH};
pub use key::SecretKey;
pub use qber::{
    estimate, estimate_counts, QberEstimate, SecurityLevel, DEFAULT_ERROR_THRESHOLD,
    HIGH_SECURITY_BOUND,
};
pub use report::{QkdReport, ReportSummary};
