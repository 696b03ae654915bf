use serde::{Deserialize, Serialize};

use crate::distribution::MeasurementDistribution;
use crate::key::SecretKey;
use crate::qber::{QberEstimate, SecurityLevel};

/// Outcome of one key distribution run. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct QkdReport {
    key: SecretKey,
    distribution: MeasurementDistribution,
    estimate: QberEstimate,
}

impl QkdReport {
    pub fn new(key: SecretKey, distribution: MeasurementDistribution, estimate: QberEstimate) -> Self {
        Self {
            key,
            distribution,
            estimate,
        }
    }

    pub fn key(&self) -> &SecretKey {
        &self.key
    }

    pub fn distribution(&self) -> &MeasurementDistribution {
        &self.distribution
    }

    pub fn error_rate(&self) -> f64 {
        self.estimate.error_rate
    }

    pub fn accepted(&self) -> bool {
        self.estimate.accepted
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.estimate.security_level
    }

    pub fn estimate(&self) -> &QberEstimate {
        &self.estimate
    }

    /// Non-secret view suitable for logs and JSON output.
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            key_fingerprint: self.key.fingerprint(),
            key_length: self.key.len(),
            qubit_count: self.distribution.width(),
            shots: self.distribution.shots(),
            distinct_outcomes: self.distribution.outcomes(),
            dominant_outcome: self
                .distribution
                .dominant()
                .map(|(outcome, _)| outcome.to_owned())
                .unwrap_or_default(),
            correlated: self.distribution.is_correlated(),
            error_rate: self.estimate.error_rate,
            threshold: self.estimate.threshold,
            accepted: self.estimate.accepted,
            security_level: self.estimate.security_level,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReportSummary {
    pub key_fingerprint: String,
    pub key_length: usize,
    pub qubit_count: usize,
    pub shots: u64,
    pub distinct_outcomes: usize,
    pub dominant_outcome: String,
    pub correlated: bool,
    pub error_rate: f64,
    pub threshold: f64,
    pub accepted: bool,
    pub security_level: SecurityLevel,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qber::estimate;

    #[test]
    fn summary_hides_key_bytes() {
        let dist = MeasurementDistribution::from_counts([("111", 96u64), ("101", 4)]).unwrap();
        let est = estimate(&dist, 0.11).unwrap();
        let report = QkdReport::new(SecretKey::from_slice(&[0xEE; 32]), dist, est);

        let summary = report.summary();
        assert_eq!(summary.dominant_outcome, "111");
        assert_eq!(summary.security_level, SecurityLevel::High);
        assert_eq!(summary.key_length, 32);
        assert!(summary.correlated);

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"security-level\":\"HIGH\""));
        assert!(!json.contains(&hex::encode([0xEE; 32])));
        let back: ReportSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
    }
}
