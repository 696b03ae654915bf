//! Security event sinks.
//!
//! Logging is best-effort: [`SecurityEventLogger::log_event`] has no error
//! channel, so a broken sink can never fail the key-distribution or
//! encryption call that reported the event.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::TelemetryHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Success,
    Failure,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Success => "SUCCESS",
            EventStatus::Failure => "FAILURE",
        }
    }

    pub fn from_outcome(ok: bool) -> Self {
        if ok {
            EventStatus::Success
        } else {
            EventStatus::Failure
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub name: String,
    pub status: EventStatus,
    pub at: SystemTime,
}

pub trait SecurityEventLogger: Send + Sync {
    fn log_event(&self, event: &str, status: EventStatus);
}

/// Emits events through `tracing` under the `qkdnet::security` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventLogger;

impl SecurityEventLogger for TracingEventLogger {
    fn log_event(&self, event: &str, status: EventStatus) {
        match status {
            EventStatus::Success => {
                info!(target: "qkdnet::security", event, status = %status, "security event")
            }
            EventStatus::Failure => {
                warn!(target: "qkdnet::security", event, status = %status, "security event")
            }
        }
    }
}

/// Counts events as `security.<event>.<status>` counters.
#[derive(Clone)]
pub struct TelemetryEventLogger {
    handle: TelemetryHandle,
}

impl TelemetryEventLogger {
    pub fn new(handle: TelemetryHandle) -> Self {
        Self { handle }
    }

    pub fn counter_name(event: &str, status: EventStatus) -> String {
        let slug: String = event
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("security.{slug}.{}", status.as_str().to_ascii_lowercase())
    }
}

impl SecurityEventLogger for TelemetryEventLogger {
    fn log_event(&self, event: &str, status: EventStatus) {
        let name = Self::counter_name(event, status);
        if let Err(err) = self.handle.record_counter(&name, 1) {
            debug!(error = %err, counter = %name, "dropping security event counter");
        }
    }
}

/// Keeps every event in memory, oldest first.
#[derive(Debug, Default)]
pub struct RecordingEventLogger {
    events: Mutex<Vec<SecurityEvent>>,
}

impl RecordingEventLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SecurityEventLogger for RecordingEventLogger {
    fn log_event(&self, event: &str, status: EventStatus) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SecurityEvent {
                name: event.to_owned(),
                status,
                at: SystemTime::now(),
            });
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventLogger;

impl SecurityEventLogger for NoopEventLogger {
    fn log_event(&self, _event: &str, _status: EventStatus) {}
}

/// Fan-out to several sinks.
#[derive(Clone, Default)]
pub struct CompositeEventLogger {
    sinks: Vec<Arc<dyn SecurityEventLogger>>,
}

impl CompositeEventLogger {
    pub fn new(sinks: Vec<Arc<dyn SecurityEventLogger>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn SecurityEventLogger>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl SecurityEventLogger for CompositeEventLogger {
    fn log_event(&self, event: &str, status: EventStatus) {
        for sink in &self.sinks {
            sink.log_event(event, status);
        }
    }
}
