//! Bounded bridge to an external randomness service (hardware QRNG, vendor
//! HTTP API, ...).
//!
//! The service call is supplied as a closure and executed on a worker thread
//! so every attempt has a hard deadline. Attempts are retried with linear
//! backoff and the source fails closed once they are exhausted.

use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{EntropyError, EntropySource};

fn default_timeout_ms() -> u64 {
    2_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    100
}

/// External entropy section.
///
/// # TOML
/// ```text
/// [entropy]
/// label = "lab-qrng"
/// timeout-ms = 2000
/// max-attempts = 3
/// backoff-ms = 100
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ExternalEntropyConfig {
    /// Label attached to log events.
    pub label: String,
    /// Deadline for a single fetch.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Attempts before the source reports [`EntropyError::Exhausted`].
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff unit; attempt `n` waits `n * backoff_ms` before retrying.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl ExternalEntropyConfig {
    pub fn sample(label: &str) -> Self {
        Self {
            label: label.to_owned(),
            timeout_ms: default_timeout_ms(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

type FetchFn = dyn Fn(usize) -> Result<Vec<u8>, EntropyError> + Send + Sync;

pub struct ExternalEntropySource {
    config: ExternalEntropyConfig,
    fetch: Arc<FetchFn>,
}

impl ExternalEntropySource {
    pub fn new<F>(config: ExternalEntropyConfig, fetch: F) -> Self
    where
        F: Fn(usize) -> Result<Vec<u8>, EntropyError> + Send + Sync + 'static,
    {
        Self {
            config,
            fetch: Arc::new(fetch),
        }
    }

    pub fn config(&self) -> &ExternalEntropyConfig {
        &self.config
    }

    fn fetch_once(&self, len: usize) -> Result<Vec<u8>, EntropyError> {
        let (tx, rx) = mpsc::channel();
        let fetch = Arc::clone(&self.fetch);
        thread::Builder::new()
            .name("qkdnet-entropy-fetch".into())
            .spawn(move || {
                // The receiver is gone when the deadline already fired.
                let _ = tx.send((*fetch)(len));
            })
            .map_err(|err| EntropyError::Service(err.to_string()))?;

        let timeout_ms = self.config.timeout_ms;
        let bytes = match rx.recv_timeout(Duration::from_millis(timeout_ms)) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => return Err(EntropyError::Timeout { timeout_ms }),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(EntropyError::Service(
                    "fetch worker exited without a response".into(),
                ))
            }
        };
        if bytes.len() != len {
            return Err(EntropyError::ShortRead {
                expected: len,
                got: bytes.len(),
            });
        }
        Ok(bytes)
    }
}

impl fmt::Debug for ExternalEntropySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalEntropySource")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EntropySource for ExternalEntropySource {
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), EntropyError> {
        if dest.is_empty() {
            return Ok(());
        }
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.fetch_once(dest.len()) {
                Ok(bytes) => {
                    dest.copy_from_slice(&bytes);
                    debug!(source = %self.config.label, attempt, len = dest.len(), "external entropy fetched");
                    return Ok(());
                }
                Err(err) if attempt >= attempts => {
                    warn!(source = %self.config.label, attempts, error = %err, "external entropy exhausted");
                    return Err(EntropyError::Exhausted {
                        attempts,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    warn!(source = %self.config.label, attempt, error = %err, "external entropy attempt failed");
                    thread::sleep(Duration::from_millis(
                        self.config.backoff_ms.saturating_mul(u64::from(attempt)),
                    ));
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(timeout_ms: u64, max_attempts: u32) -> ExternalEntropyConfig {
        ExternalEntropyConfig {
            label: "test-qrng".into(),
            timeout_ms,
            max_attempts,
            backoff_ms: 1,
        }
    }

    #[test]
    fn returns_service_bytes() {
        let mut source = ExternalEntropySource::new(config(500, 1), |len| Ok(vec![0xAB; len]));
        assert_eq!(source.next_bytes(4).unwrap(), vec![0xAB; 4]);
    }

    #[test]
    fn slow_service_times_out_and_fails_closed() {
        let mut source = ExternalEntropySource::new(config(20, 2), |len| {
            thread::sleep(Duration::from_millis(300));
            Ok(vec![1; len])
        });
        let err = source.next_bytes(16).unwrap_err();
        assert_eq!(
            err,
            EntropyError::Exhausted {
                attempts: 2,
                last: Box::new(EntropyError::Timeout { timeout_ms: 20 }),
            }
        );
    }

    #[test]
    fn short_reads_are_rejected() {
        let mut source = ExternalEntropySource::new(config(500, 1), |len| Ok(vec![7; len / 2]));
        let err = source.next_bytes(32).unwrap_err();
        match err {
            EntropyError::Exhausted { last, .. } => assert_eq!(
                *last,
                EntropyError::ShortRead {
                    expected: 32,
                    got: 16
                }
            ),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn transient_failures_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let mut source = ExternalEntropySource::new(config(500, 3), move |len| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(EntropyError::Service("503 service unavailable".into()))
            } else {
                Ok(vec![9; len])
            }
        });
        assert_eq!(source.next_bytes(8).unwrap(), vec![9; 8]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn config_defaults_apply() {
        let parsed: ExternalEntropyConfig = serde_json::from_str(r#"{"label":"lab"}"#).unwrap();
        assert_eq!(parsed, ExternalEntropyConfig::sample("lab"));
    }
}
