//! Lightweight telemetry facade for qkdnet sessions. Counters and latencies
//! are kept in memory so tests can assert instrumentation behaviour without
//! an exporter; security events go through [`events::SecurityEventLogger`].

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::SystemTime,
};
use thiserror::Error;

pub mod events;

pub use events::{
    CompositeEventLogger, EventStatus, NoopEventLogger, RecordingEventLogger, SecurityEvent,
    SecurityEventLogger, TelemetryEventLogger, TracingEventLogger,
};

#[cfg(any(
    all(feature = "dev", feature = "test"),
    all(feature = "dev", feature = "prod"),
    all(feature = "test", feature = "prod")
))]
compile_error!(
    "Only one of the `dev`, `test`, or `prod` features may be enabled for qkdnet-telemetry."
);

#[cfg(feature = "dev")]
const DEFAULT_FLUSH_MS: u64 = 1_000;
#[cfg(feature = "test")]
const DEFAULT_FLUSH_MS: u64 = 500;
#[cfg(not(any(feature = "dev", feature = "test")))]
const DEFAULT_FLUSH_MS: u64 = 5_000;

fn default_flush_interval_ms() -> u64 {
    DEFAULT_FLUSH_MS
}

fn default_max_latency_samples() -> usize {
    1_024
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct TelemetryConfig {
    /// Endpoint where snapshots would be shipped (unused by the in-memory facade).
    pub endpoint: String,
    /// Flush cadence in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Latency samples kept per metric between flushes; the oldest is
    /// evicted first.
    #[serde(default = "default_max_latency_samples")]
    pub max_latency_samples: usize,
    /// Global labels appended to every snapshot.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl TelemetryConfig {
    pub fn sample(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_owned(),
            flush_interval_ms: default_flush_interval_ms(),
            max_latency_samples: default_max_latency_samples(),
            labels: BTreeMap::from([("component".into(), "qkd-session".into())]),
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("counter overflow for metric {0}")]
    CounterOverflow(String),
    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    pub timestamp: SystemTime,
    pub labels: BTreeMap<String, String>,
    pub counters: BTreeMap<String, u64>,
    pub latencies_ms: BTreeMap<String, Vec<u64>>,
}

impl TelemetrySnapshot {
    pub fn to_json(&self) -> Result<String, TelemetryError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Default)]
struct TelemetryState {
    counters: BTreeMap<String, u64>,
    latencies_ms: BTreeMap<String, VecDeque<u64>>,
}

#[derive(Clone)]
pub struct TelemetryHandle {
    config: TelemetryConfig,
    state: Arc<Mutex<TelemetryState>>,
}

impl TelemetryHandle {
    pub fn from_config(config: TelemetryConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(TelemetryState::default())),
        }
    }

    pub fn record_counter(&self, name: &str, delta: u64) -> Result<(), TelemetryError> {
        let mut guard = self.lock();
        let entry = guard.counters.entry(name.to_owned()).or_default();
        *entry = entry
            .checked_add(delta)
            .ok_or_else(|| TelemetryError::CounterOverflow(name.to_owned()))?;
        Ok(())
    }

    /// Long-lived handles that never flush keep at most
    /// `max_latency_samples` recent values per metric.
    pub fn record_latency_ms(&self, name: &str, value: u64) {
        let cap = self.config.max_latency_samples.max(1);
        let mut guard = self.lock();
        let samples = guard.latencies_ms.entry(name.to_owned()).or_default();
        while samples.len() >= cap {
            samples.pop_front();
        }
        samples.push_back(value);
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.lock().counters.get(name).copied().unwrap_or_default()
    }

    pub fn flush(&self) -> TelemetrySnapshot {
        let mut guard = self.lock();
        TelemetrySnapshot {
            timestamp: SystemTime::now(),
            labels: self.config.labels.clone(),
            counters: std::mem::take(&mut guard.counters),
            latencies_ms: std::mem::take(&mut guard.latencies_ms)
                .into_iter()
                .map(|(name, samples)| (name, Vec::from(samples)))
                .collect(),
        }
    }

    pub fn flush_interval(&self) -> u64 {
        self.config.flush_interval_ms
    }

    // A panic while holding the lock leaves plain maps behind; keep recording.
    fn lock(&self) -> MutexGuard<'_, TelemetryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
