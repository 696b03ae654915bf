//! Quantum bit error rate estimation and key acceptance.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::distribution::MeasurementDistribution;
use crate::error::{invalid, QkdResult};

/// Error rate at or above which a key is rejected.
pub const DEFAULT_ERROR_THRESHOLD: f64 = 0.11;

/// Accepted keys strictly below this error rate are rated `High`.
pub const HIGH_SECURITY_BOUND: f64 = 0.05;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityLevel {
    Rejected,
    Medium,
    High,
}

impl SecurityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityLevel::Rejected => "REJECTED",
            SecurityLevel::Medium => "MEDIUM",
            SecurityLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QberEstimate {
    pub error_rate: f64,
    pub accepted: bool,
    pub security_level: SecurityLevel,
    pub threshold: f64,
}

/// Estimate the error rate of `distribution` against `error_threshold`.
pub fn estimate(
    distribution: &MeasurementDistribution,
    error_threshold: f64,
) -> QkdResult<QberEstimate> {
    let max_count = distribution
        .dominant()
        .map(|(_, count)| count)
        .unwrap_or_default();
    estimate_counts(max_count, distribution.shots(), error_threshold)
}

/// Same rule as [`estimate`] over raw dominant/total counts.
pub fn estimate_counts(
    max_count: u64,
    total_shots: u64,
    error_threshold: f64,
) -> QkdResult<QberEstimate> {
    if !error_threshold.is_finite() || error_threshold <= 0.0 || error_threshold > 1.0 {
        return Err(invalid(format!(
            "error_threshold must be within (0, 1], got {error_threshold}"
        )));
    }
    if total_shots == 0 {
        return Err(invalid("distribution has no shots"));
    }
    if max_count > total_shots {
        return Err(invalid(format!(
            "dominant count {max_count} exceeds total shots {total_shots}"
        )));
    }

    // Divide once so boundary rates such as 11/100 equal their literals.
    let error_rate = (total_shots - max_count) as f64 / total_shots as f64;
    let accepted = error_rate < error_threshold;
    let security_level = if !accepted {
        SecurityLevel::Rejected
    } else if error_rate < HIGH_SECURITY_BOUND {
        SecurityLevel::High
    } else {
        SecurityLevel::Medium
    };
    Ok(QberEstimate {
        error_rate,
        accepted,
        security_level,
        threshold: error_threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(SecurityLevel::Rejected < SecurityLevel::Medium);
        assert!(SecurityLevel::Medium < SecurityLevel::High);
        assert_eq!(SecurityLevel::Medium.to_string(), "MEDIUM");
    }

    #[test]
    fn clean_distribution_is_high() {
        let est = estimate_counts(100, 100, DEFAULT_ERROR_THRESHOLD).unwrap();
        assert_eq!(est.error_rate, 0.0);
        assert!(est.accepted);
        assert_eq!(est.security_level, SecurityLevel::High);
    }

    #[test]
    fn threshold_is_exclusive() {
        let est = estimate_counts(75, 100, 0.25).unwrap();
        assert!(!est.accepted);
        assert_eq!(est.security_level, SecurityLevel::Rejected);
    }

    #[test]
    fn decimal_boundaries_are_exact() {
        let at_threshold = estimate_counts(89, 100, DEFAULT_ERROR_THRESHOLD).unwrap();
        assert_eq!(at_threshold.error_rate, 0.11);
        assert!(!at_threshold.accepted);
        assert_eq!(at_threshold.security_level, SecurityLevel::Rejected);

        let at_high_bound = estimate_counts(95, 100, DEFAULT_ERROR_THRESHOLD).unwrap();
        assert_eq!(at_high_bound.error_rate, HIGH_SECURITY_BOUND);
        assert!(at_high_bound.accepted);
        assert_eq!(at_high_bound.security_level, SecurityLevel::Medium);

        let below = estimate_counts(90, 100, DEFAULT_ERROR_THRESHOLD).unwrap();
        assert!(below.accepted);
        assert_eq!(below.security_level, SecurityLevel::Medium);
    }

    #[test]
    fn rejects_bad_inputs() {
        for threshold in [0.0, -0.1, 1.5, f64::NAN, f64::INFINITY] {
            assert!(estimate_counts(1, 1, threshold).is_err());
        }
        assert!(estimate_counts(0, 0, 0.11).is_err());
        assert!(estimate_counts(5, 4, 0.11).is_err());
    }
}
