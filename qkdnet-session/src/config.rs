use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use qkdnet_core::{DEFAULT_ERROR_THRESHOLD, DEFAULT_KEY_LENGTH};
use qkdnet_crypto::aead::KEY_LEN;
use qkdnet_crypto::KdfParams;
use qkdnet_entropy::ExternalEntropyConfig;
use qkdnet_telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{DistributionRequest, RejectionPolicy};

#[cfg(feature = "dev")]
const KEY_TTL_SECS: u64 = 30;
#[cfg(feature = "test")]
const KEY_TTL_SECS: u64 = 5 * 60;
#[cfg(not(any(feature = "dev", feature = "test")))]
const KEY_TTL_SECS: u64 = 60 * 60;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ConfigFormat {
    Auto,
    Toml,
    Yaml,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {format:?} config: {details}")]
    Parse {
        format: ConfigFormat,
        details: String,
    },
    #[error("configuration invalid: {0}")]
    Validation(String),
}

/// Top-level session configuration.
///
/// # TOML
/// ```text
/// [qkd]
/// qubit-count = 8
/// shots = 1024
/// noise-probability = 0.01
/// error-threshold = 0.11
/// rejection-policy = "strict"
///
/// [kdf]
/// iterations = 100000
///
/// [session]
/// key-ttl-secs = 3600
/// envelope-ttl-secs = 300
///
/// [telemetry]
/// endpoint = "http://localhost:4318"
///
/// [entropy]
/// label = "lab-qrng"
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub qkd: QkdSection,
    #[serde(default)]
    pub kdf: KdfParams,
    #[serde(default)]
    pub session: SessionSection,
    pub telemetry: TelemetryConfig,
    /// External randomness service; the OS RNG is used when absent.
    #[serde(default)]
    pub entropy: Option<ExternalEntropyConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct QkdSection {
    #[serde(default = "default_qubit_count")]
    pub qubit_count: usize,
    #[serde(default = "default_shots")]
    pub shots: u64,
    #[serde(default = "default_noise_probability")]
    pub noise_probability: f64,
    #[serde(default = "default_error_threshold")]
    pub error_threshold: f64,
    #[serde(default = "default_key_length")]
    pub key_length: usize,
    /// Fixed channel seed for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub rejection_policy: RejectionPolicy,
}

fn default_qubit_count() -> usize {
    DistributionRequest::default().qubit_count
}

fn default_shots() -> u64 {
    DistributionRequest::default().shots
}

fn default_noise_probability() -> f64 {
    DistributionRequest::default().noise_probability
}

const fn default_error_threshold() -> f64 {
    DEFAULT_ERROR_THRESHOLD
}

const fn default_key_length() -> usize {
    DEFAULT_KEY_LENGTH
}

impl Default for QkdSection {
    fn default() -> Self {
        Self {
            qubit_count: default_qubit_count(),
            shots: default_shots(),
            noise_probability: default_noise_probability(),
            error_threshold: default_error_threshold(),
            key_length: default_key_length(),
            seed: None,
            rejection_policy: RejectionPolicy::default(),
        }
    }
}

impl QkdSection {
    pub fn request(&self) -> DistributionRequest {
        DistributionRequest {
            qubit_count: self.qubit_count,
            shots: self.shots,
            noise_probability: self.noise_probability,
            error_threshold: self.error_threshold,
            key_length: self.key_length,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct SessionSection {
    /// Lifetime of registry records before the channel must rotate.
    #[serde(default = "default_key_ttl_secs")]
    pub key_ttl_secs: u64,
    /// Reject envelopes older than this when opening; unlimited when unset.
    #[serde(default)]
    pub envelope_ttl_secs: Option<u64>,
}

const fn default_key_ttl_secs() -> u64 {
    KEY_TTL_SECS
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            key_ttl_secs: default_key_ttl_secs(),
            envelope_ttl_secs: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.qkd
            .request()
            .validate()
            .map_err(|err| ConfigError::Validation(format!("[qkd] {err}")))?;
        self.kdf
            .validate()
            .map_err(|err| ConfigError::Validation(format!("[kdf] {err}")))?;
        if self.kdf.output_length != KEY_LEN {
            return Err(ConfigError::Validation(format!(
                "[kdf] output-length must be {KEY_LEN} for AES-256-GCM, got {}",
                self.kdf.output_length
            )));
        }
        if self.session.key_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "[session] key-ttl-secs must be greater than zero".into(),
            ));
        }
        if self.session.envelope_ttl_secs == Some(0) {
            return Err(ConfigError::Validation(
                "[session] envelope-ttl-secs must be greater than zero".into(),
            ));
        }
        if let Some(entropy) = &self.entropy {
            if entropy.timeout_ms == 0 || entropy.max_attempts == 0 {
                return Err(ConfigError::Validation(
                    "[entropy] timeout-ms and max-attempts must be greater than zero".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn sample() -> Self {
        Self {
            qkd: QkdSection::default(),
            kdf: KdfParams::default(),
            session: SessionSection::default(),
            telemetry: TelemetryConfig::sample("http://localhost:4318"),
            entropy: None,
        }
    }
}

pub fn load_config(path: &Path, format: ConfigFormat) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&contents, resolve_format(path, format))?;
    config.validate()?;
    Ok(config)
}

fn parse_config(contents: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
    match format {
        ConfigFormat::Yaml => serde_yaml::from_str(contents).map_err(|err| ConfigError::Parse {
            format,
            details: err.to_string(),
        }),
        ConfigFormat::Toml | ConfigFormat::Auto => {
            toml::from_str(contents).map_err(|err| ConfigError::Parse {
                format: ConfigFormat::Toml,
                details: err.to_string(),
            })
        }
    }
}

fn resolve_format(path: &Path, format: ConfigFormat) -> ConfigFormat {
    match format {
        ConfigFormat::Auto => match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Toml,
        },
        _ => format,
    }
}
