//! Noisy entangled-channel simulation.

use std::collections::BTreeMap;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distribution::{MeasurementDistribution, QubitRegister, MAX_QUBITS};
use crate::error::{invalid, QkdResult};

fn default_qubit_count() -> usize {
    8
}

fn default_shots() -> u64 {
    1_024
}

fn default_noise_probability() -> f64 {
    0.01
}

/// Per-run channel parameters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ChannelParams {
    #[serde(default = "default_qubit_count")]
    pub qubit_count: usize,
    #[serde(default = "default_shots")]
    pub shots: u64,
    /// Probability that a shot is depolarized.
    #[serde(default = "default_noise_probability")]
    pub noise_probability: f64,
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self {
            qubit_count: default_qubit_count(),
            shots: default_shots(),
            noise_probability: default_noise_probability(),
        }
    }
}

impl ChannelParams {
    pub fn new(qubit_count: usize, shots: u64, noise_probability: f64) -> Self {
        Self {
            qubit_count,
            shots,
            noise_probability,
        }
    }

    pub fn validate(&self) -> QkdResult<()> {
        if self.qubit_count == 0 || self.qubit_count > MAX_QUBITS {
            return Err(invalid(format!(
                "qubit_count must be within 1..={MAX_QUBITS}, got {}",
                self.qubit_count
            )));
        }
        if self.shots == 0 {
            return Err(invalid("shots must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.noise_probability) {
            return Err(invalid(format!(
                "noise_probability must be within [0, 1], got {}",
                self.noise_probability
            )));
        }
        Ok(())
    }
}

/// Produces a measurement distribution for a channel run.
///
/// Implementations must be deterministic for a given rng state so seeded
/// runs are reproducible.
pub trait ChannelSimulator: Send + Sync {
    fn label(&self) -> &'static str;

    fn simulate(
        &self,
        params: &ChannelParams,
        rng: &mut dyn RngCore,
    ) -> QkdResult<MeasurementDistribution>;
}

/// Fully correlated register under a depolarizing channel.
///
/// The global parity is drawn once per run, so without noise every shot
/// measures the same all-equal outcome. Each shot is depolarized with the
/// configured probability, which XORs its register with a uniformly random
/// flip mask.
#[derive(Clone, Copy, Debug, Default)]
pub struct DepolarizingChannel;

impl DepolarizingChannel {
    pub const fn new() -> Self {
        Self
    }

    /// Expected share of shots on the dominant outcome: `(1 - p) + p / 2^n`.
    pub fn expected_dominant_fraction(params: &ChannelParams) -> f64 {
        let p = params.noise_probability;
        (1.0 - p) + p * 0.5f64.powi(params.qubit_count.min(MAX_QUBITS) as i32)
    }
}

fn width_mask(width: usize) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

impl ChannelSimulator for DepolarizingChannel {
    fn label(&self) -> &'static str {
        "depolarizing"
    }

    fn simulate(
        &self,
        params: &ChannelParams,
        rng: &mut dyn RngCore,
    ) -> QkdResult<MeasurementDistribution> {
        params.validate()?;
        let width = params.qubit_count;
        let mask_bits = width_mask(width);
        let parity = rng.gen::<bool>();

        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        let mut depolarized = 0u64;
        for _ in 0..params.shots {
            let mut register = QubitRegister::uniform(width, parity);
            if rng.gen_bool(params.noise_probability) {
                register.apply_flip_mask(rng.next_u64() & mask_bits);
                depolarized += 1;
            }
            *counts.entry(register.to_bitstring()).or_default() += 1;
        }

        debug!(
            channel = self.label(),
            qubits = width,
            shots = params.shots,
            noise = params.noise_probability,
            depolarized,
            outcomes = counts.len(),
            "channel run complete"
        );
        Ok(MeasurementDistribution::from_simulation(
            width,
            params.shots,
            counts,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn noiseless_run_collapses_to_one_outcome() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let dist = DepolarizingChannel
            .simulate(&ChannelParams::new(5, 256, 0.0), &mut rng)
            .unwrap();
        assert_eq!(dist.outcomes(), 1);
        assert_eq!(dist.shots(), 256);
        let (outcome, count) = dist.dominant().unwrap();
        assert!(outcome == "00000" || outcome == "11111");
        assert_eq!(count, 256);
    }

    #[test]
    fn every_outcome_has_register_width() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let dist = DepolarizingChannel
            .simulate(&ChannelParams::new(3, 2_000, 1.0), &mut rng)
            .unwrap();
        assert!(dist.counts().keys().all(|k| k.len() == 3));
        assert_eq!(dist.counts().values().sum::<u64>(), 2_000);
        // Full depolarization spreads shots over all 8 outcomes.
        assert_eq!(dist.outcomes(), 8);
    }

    #[test]
    fn full_width_register_is_supported() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let dist = DepolarizingChannel
            .simulate(&ChannelParams::new(64, 16, 0.5), &mut rng)
            .unwrap();
        assert_eq!(dist.width(), 64);
    }

    #[test]
    fn rejects_invalid_parameters() {
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        for params in [
            ChannelParams::new(0, 10, 0.1),
            ChannelParams::new(65, 10, 0.1),
            ChannelParams::new(4, 0, 0.1),
            ChannelParams::new(4, 10, -0.01),
            ChannelParams::new(4, 10, 1.5),
            ChannelParams::new(4, 10, f64::NAN),
        ] {
            assert!(DepolarizingChannel.simulate(&params, &mut rng).is_err());
        }
    }

    #[test]
    fn expected_fraction_matches_closed_form() {
        let params = ChannelParams::new(2, 1, 0.4);
        let expected = DepolarizingChannel::expected_dominant_fraction(&params);
        assert!((expected - 0.7).abs() < 1e-12);
    }

    #[test]
    fn params_parse_with_defaults() {
        let parsed: ChannelParams = serde_json::from_str(r#"{"shots":64}"#).unwrap();
        assert_eq!(parsed, ChannelParams::new(8, 64, 0.01));
    }
}
