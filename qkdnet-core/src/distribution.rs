//! Qubit registers and the measurement distributions they reduce to.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::error::{invalid, QkdError, QkdResult};

/// Widest register the simulator supports; flip masks are packed into a `u64`.
pub const MAX_QUBITS: usize = 64;

/// Dominant share a measurement must exceed to count as correlated.
pub const MIN_CORRELATED_FRACTION: f64 = 0.8;

/// Outcome of measuring every qubit of a register once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QubitRegister {
    bits: Vec<bool>,
}

impl QubitRegister {
    /// Register with every qubit collapsed to `value`.
    pub fn uniform(width: usize, value: bool) -> Self {
        Self {
            bits: vec![value; width],
        }
    }

    pub fn width(&self) -> usize {
        self.bits.len()
    }

    pub fn bit(&self, qubit: usize) -> Option<bool> {
        self.bits.get(qubit).copied()
    }

    /// XOR the register with `mask`; bit `i` of the mask targets qubit `i`.
    pub fn apply_flip_mask(&mut self, mask: u64) {
        for (qubit, bit) in self.bits.iter_mut().enumerate().take(MAX_QUBITS) {
            if (mask >> qubit) & 1 == 1 {
                *bit = !*bit;
            }
        }
    }

    /// Bit-string with qubit 0 as the rightmost character.
    pub fn to_bitstring(&self) -> String {
        self.bits
            .iter()
            .rev()
            .map(|&bit| if bit { '1' } else { '0' })
            .collect()
    }
}

/// Outcome → occurrence count for one simulation run.
///
/// Every key is a bit-string of the same width and the counts sum to the
/// shot count. Zero counts are dropped on construction, so iteration only
/// yields observed outcomes. There are no mutating accessors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, u64>", into = "BTreeMap<String, u64>")]
pub struct MeasurementDistribution {
    width: usize,
    shots: u64,
    counts: BTreeMap<String, u64>,
}

impl MeasurementDistribution {
    /// Validate raw counts (as a backend would report them).
    pub fn from_counts<I, K>(counts: I) -> QkdResult<Self>
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<String>,
    {
        let mut merged: BTreeMap<String, u64> = BTreeMap::new();
        for (outcome, count) in counts {
            let entry = merged.entry(outcome.into()).or_default();
            *entry = entry
                .checked_add(count)
                .ok_or_else(|| invalid("outcome count overflows u64"))?;
        }
        merged.retain(|_, count| *count > 0);

        let width = match merged.keys().next() {
            Some(first) => first.len(),
            None => return Err(invalid("distribution has no shots")),
        };
        if width == 0 || width > MAX_QUBITS {
            return Err(invalid(format!(
                "outcome width must be within 1..={MAX_QUBITS}, got {width}"
            )));
        }
        for outcome in merged.keys() {
            if outcome.len() != width {
                return Err(invalid(format!(
                    "outcome {outcome:?} does not match register width {width}"
                )));
            }
            if !outcome.bytes().all(|b| b == b'0' || b == b'1') {
                return Err(invalid(format!("outcome {outcome:?} is not a bit-string")));
            }
        }
        let shots = merged
            .values()
            .try_fold(0u64, |acc, count| acc.checked_add(*count))
            .ok_or_else(|| invalid("total shot count overflows u64"))?;

        Ok(Self {
            width,
            shots,
            counts: merged,
        })
    }

    /// Counts produced by a simulator that already upholds the invariants.
    pub(crate) fn from_simulation(width: usize, shots: u64, counts: BTreeMap<String, u64>) -> Self {
        debug_assert_eq!(counts.values().sum::<u64>(), shots);
        Self {
            width,
            shots,
            counts,
        }
    }

    /// Register width (number of qubits).
    pub fn width(&self) -> usize {
        self.width
    }

    /// Total shots; always equal to the sum of all counts.
    pub fn shots(&self) -> u64 {
        self.shots
    }

    pub fn counts(&self) -> &BTreeMap<String, u64> {
        &self.counts
    }

    pub fn count(&self, outcome: &str) -> u64 {
        self.counts.get(outcome).copied().unwrap_or_default()
    }

    /// Number of distinct outcomes observed.
    pub fn outcomes(&self) -> usize {
        self.counts.len()
    }

    /// Most frequent outcome; ties resolve to the lexicographically smallest.
    pub fn dominant(&self) -> Option<(&str, u64)> {
        self.counts
            .iter()
            .fold(None, |best: Option<(&str, u64)>, (outcome, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((outcome.as_str(), count)),
            })
    }

    /// Share of shots that landed on the dominant outcome.
    pub fn dominant_fraction(&self) -> f64 {
        match self.dominant() {
            Some((_, count)) if self.shots > 0 => count as f64 / self.shots as f64,
            _ => 0.0,
        }
    }

    /// Whether the dominant outcome holds more than
    /// [`MIN_CORRELATED_FRACTION`] of the shots. Advisory; acceptance is
    /// decided by the QBER gate.
    pub fn is_correlated(&self) -> bool {
        self.dominant_fraction() > MIN_CORRELATED_FRACTION
    }

    /// SHA3-256 over a canonical encoding (width, shots, sorted counts).
    /// Public, non-secret binding context.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha3_256::new();
        hasher.update(b"qkdnet/distribution/v1");
        hasher.update((self.width as u64).to_be_bytes());
        hasher.update(self.shots.to_be_bytes());
        for (outcome, count) in &self.counts {
            hasher.update((outcome.len() as u64).to_be_bytes());
            hasher.update(outcome.as_bytes());
            hasher.update(count.to_be_bytes());
        }
        hasher.finalize().into()
    }
}

impl TryFrom<BTreeMap<String, u64>> for MeasurementDistribution {
    type Error = QkdError;

    fn try_from(counts: BTreeMap<String, u64>) -> Result<Self, Self::Error> {
        Self::from_counts(counts)
    }
}

impl From<MeasurementDistribution> for BTreeMap<String, u64> {
    fn from(distribution: MeasurementDistribution) -> Self {
        distribution.counts
    }
}
