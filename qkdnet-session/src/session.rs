//! Session orchestration: channel simulation, QBER gating, key extraction,
//! PBKDF2 derivation and envelope sealing, with security events and
//! counters recorded along the way.
//!
//! # Example
//! ```
//! use qkdnet_entropy::HostEntropySource;
//! use qkdnet_session::{Config, QkdSession};
//!
//! let mut config = Config::sample();
//! config.kdf.iterations = 1_000;
//! let mut session = QkdSession::new(&config, HostEntropySource::new());
//! let sealed = session.encrypt_message(b"doc-test").unwrap();
//! let clear = session
//!     .decrypt_message(&sealed.envelope.to_bytes(), &sealed.salt, sealed.report.key())
//!     .unwrap();
//! assert_eq!(clear, b"doc-test");
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use qkdnet_core::{
    estimate, extract, ChannelParams, ChannelSimulator, DepolarizingChannel, QkdError, QkdReport,
    SecretKey, DEFAULT_ERROR_THRESHOLD, DEFAULT_KEY_LENGTH, MAX_KEY_LENGTH,
};
use qkdnet_crypto::{
    derive, generate_salt, open, open_with_ttl_at, seal_at, Envelope, KdfParams, Salt,
};
use qkdnet_entropy::EntropySource;
use qkdnet_telemetry::{EventStatus, SecurityEventLogger, TelemetryHandle, TracingEventLogger};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{Config, QkdSection, SessionSection};
use crate::error::SessionError;
use crate::registry::{KeyId, KeyRegistry, SessionKeyRecord, UnixSeconds};

pub const EVENT_KEY_DISTRIBUTION: &str = "Quantum Key Distribution";
pub const EVENT_ENCRYPTION: &str = "Message Encryption";
pub const EVENT_DECRYPTION: &str = "Message Decryption";

/// What to do with a run whose error rate fails the threshold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionPolicy {
    /// Return the report (with `accepted = false`) and its key.
    #[default]
    Permissive,
    /// Fail with [`SessionError::KeyDistributionRejected`]; no key is extracted.
    Strict,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DistributionRequest {
    pub qubit_count: usize,
    pub shots: u64,
    pub noise_probability: f64,
    pub error_threshold: f64,
    pub key_length: usize,
}

impl Default for DistributionRequest {
    fn default() -> Self {
        let channel = ChannelParams::default();
        Self {
            qubit_count: channel.qubit_count,
            shots: channel.shots,
            noise_probability: channel.noise_probability,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            key_length: DEFAULT_KEY_LENGTH,
        }
    }
}

impl DistributionRequest {
    pub fn channel_params(&self) -> ChannelParams {
        ChannelParams::new(self.qubit_count, self.shots, self.noise_probability)
    }

    pub fn validate(&self) -> Result<(), QkdError> {
        self.channel_params().validate()?;
        if !self.error_threshold.is_finite()
            || self.error_threshold <= 0.0
            || self.error_threshold > 1.0
        {
            return Err(QkdError::InvalidParameter(format!(
                "error_threshold must be within (0, 1], got {}",
                self.error_threshold
            )));
        }
        if self.key_length == 0 || self.key_length > MAX_KEY_LENGTH {
            return Err(QkdError::InvalidParameter(format!(
                "key_length must be within 1..={MAX_KEY_LENGTH}, got {}",
                self.key_length
            )));
        }
        Ok(())
    }
}

/// Output of [`QkdSession::encrypt_message`]. The raw key inside `report`
/// is what the peer needs, together with `salt`, to decrypt.
#[derive(Clone, Debug)]
pub struct SealedMessage {
    pub report: QkdReport,
    pub envelope: Envelope,
    pub salt: Salt,
}

/// Output of [`QkdSession::establish_channel`] and
/// [`QkdSession::rotate_channel`].
#[derive(Clone, Debug)]
pub struct EstablishedChannel {
    pub id: KeyId,
    pub report: QkdReport,
    pub salt: Salt,
}

pub type Clock = Arc<dyn Fn() -> UnixSeconds + Send + Sync>;

fn system_clock() -> UnixSeconds {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

pub struct QkdSession<S: EntropySource> {
    qkd: QkdSection,
    kdf: KdfParams,
    settings: SessionSection,
    channel: Box<dyn ChannelSimulator>,
    entropy: S,
    events: Arc<dyn SecurityEventLogger>,
    telemetry: TelemetryHandle,
    clock: Clock,
}

impl<S: EntropySource> QkdSession<S> {
    /// Build a session from `config` with a depolarizing channel, tracing
    /// security events and the system clock.
    pub fn new(config: &Config, entropy: S) -> Self {
        Self {
            qkd: config.qkd.clone(),
            kdf: config.kdf,
            settings: config.session.clone(),
            channel: Box::new(DepolarizingChannel::new()),
            entropy,
            events: Arc::new(TracingEventLogger),
            telemetry: TelemetryHandle::from_config(config.telemetry.clone()),
            clock: Arc::new(system_clock),
        }
    }

    pub fn with_channel(mut self, channel: Box<dyn ChannelSimulator>) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_event_logger(mut self, events: Arc<dyn SecurityEventLogger>) -> Self {
        self.events = events;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryHandle) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_rejection_policy(mut self, policy: RejectionPolicy) -> Self {
        self.qkd.rejection_policy = policy;
        self
    }

    pub fn telemetry(&self) -> &TelemetryHandle {
        &self.telemetry
    }

    pub fn rejection_policy(&self) -> RejectionPolicy {
        self.qkd.rejection_policy
    }

    /// The request built from the `[qkd]` section.
    pub fn default_request(&self) -> DistributionRequest {
        self.qkd.request()
    }

    /// Simulate, estimate and extract. Logs one `Quantum Key Distribution`
    /// event: SUCCESS only when the key was accepted.
    pub fn distribute_key(
        &mut self,
        request: &DistributionRequest,
    ) -> Result<QkdReport, SessionError> {
        let started = Instant::now();
        let result = self.run_distribution(request);
        let accepted = matches!(&result, Ok(report) if report.accepted());

        self.events
            .log_event(EVENT_KEY_DISTRIBUTION, EventStatus::from_outcome(accepted));
        self.count(if accepted {
            "qkd.distribute.success"
        } else {
            "qkd.distribute.failure"
        });
        self.telemetry.record_latency_ms(
            "qkd.distribute",
            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        );

        match &result {
            Ok(report) => info!(
                channel = self.channel.label(),
                error_rate = report.error_rate(),
                correlated = report.distribution().is_correlated(),
                accepted = report.accepted(),
                level = %report.security_level(),
                key = %report.key().fingerprint(),
                "key distribution complete"
            ),
            Err(err) => warn!(error = %err, "key distribution failed"),
        }
        result
    }

    fn run_distribution(
        &mut self,
        request: &DistributionRequest,
    ) -> Result<QkdReport, SessionError> {
        request.validate()?;
        let mut rng = self.channel_rng()?;
        let distribution = self.channel.simulate(&request.channel_params(), &mut rng)?;
        let qber = estimate(&distribution, request.error_threshold)?;

        if !qber.accepted && self.qkd.rejection_policy == RejectionPolicy::Strict {
            return Err(SessionError::KeyDistributionRejected {
                error_rate: qber.error_rate,
                threshold: qber.threshold,
            });
        }

        let key = extract(&distribution, request.key_length, &mut self.entropy)?;
        Ok(QkdReport::new(key, distribution, qber))
    }

    fn channel_rng(&mut self) -> Result<ChaCha20Rng, SessionError> {
        if let Some(seed) = self.qkd.seed {
            return Ok(ChaCha20Rng::seed_from_u64(seed));
        }
        let mut seed = [0u8; 32];
        self.entropy.try_fill_bytes(&mut seed)?;
        Ok(ChaCha20Rng::from_seed(seed))
    }

    /// Distribute a fresh key, derive an encryption key under a new salt and
    /// seal `plaintext`.
    pub fn encrypt_message(&mut self, plaintext: &[u8]) -> Result<SealedMessage, SessionError> {
        let request = self.default_request();
        let report = self.distribute_key(&request)?;
        let result = self.seal_with_fresh_salt(report.key(), plaintext);
        self.record_outcome(EVENT_ENCRYPTION, "qkd.encrypt", &result);
        let (envelope, salt) = result?;
        Ok(SealedMessage {
            report,
            envelope,
            salt,
        })
    }

    fn seal_with_fresh_salt(
        &mut self,
        raw_key: &SecretKey,
        plaintext: &[u8],
    ) -> Result<(Envelope, Salt), SessionError> {
        let salt = generate_salt(&self.kdf, &mut self.entropy)?;
        let derived = derive(raw_key, &salt, &self.kdf)?;
        let now = self.now();
        let envelope = seal_at(plaintext, &derived, &mut self.entropy, now)?;
        Ok((envelope, salt))
    }

    /// Re-derive the encryption key from `salt` and `raw_key`, then
    /// authenticate and decrypt `envelope`.
    pub fn decrypt_message(
        &self,
        envelope: &[u8],
        salt: &Salt,
        raw_key: &SecretKey,
    ) -> Result<Vec<u8>, SessionError> {
        let result = derive(raw_key, salt, &self.kdf)
            .map_err(SessionError::from)
            .and_then(|derived| self.open_envelope(envelope, &derived));
        self.record_outcome(EVENT_DECRYPTION, "qkd.decrypt", &result);
        result
    }

    fn open_envelope(&self, envelope: &[u8], key: &SecretKey) -> Result<Vec<u8>, SessionError> {
        let plaintext = match self.settings.envelope_ttl_secs {
            Some(ttl) => open_with_ttl_at(envelope, key, Duration::from_secs(ttl), self.now())?,
            None => open(envelope, key)?,
        };
        Ok(plaintext)
    }

    /// Distribute and derive a key, then store it in `registry`.
    pub fn establish_channel(
        &mut self,
        registry: &mut KeyRegistry,
    ) -> Result<EstablishedChannel, SessionError> {
        let (record, report) = self.fresh_record()?;
        let salt = record.salt.clone();
        let id = registry.insert(record, &mut self.entropy)?;
        info!(key_id = %id, "channel established");
        Ok(EstablishedChannel { id, report, salt })
    }

    /// Replace the key behind `id` with a freshly distributed one.
    pub fn rotate_channel(
        &mut self,
        registry: &mut KeyRegistry,
        id: &KeyId,
    ) -> Result<EstablishedChannel, SessionError> {
        if !registry.contains(id) {
            return Err(SessionError::UnknownKey(*id));
        }
        let (record, report) = self.fresh_record()?;
        let salt = record.salt.clone();
        registry.rotate(id, record)?;
        Ok(EstablishedChannel {
            id: *id,
            report,
            salt,
        })
    }

    fn fresh_record(&mut self) -> Result<(SessionKeyRecord, QkdReport), SessionError> {
        let request = self.default_request();
        let report = self.distribute_key(&request)?;
        let salt = generate_salt(&self.kdf, &mut self.entropy)?;
        let derived_key = derive(report.key(), &salt, &self.kdf)?;
        let created_at = self.now();
        let record = SessionKeyRecord {
            derived_key,
            salt,
            created_at,
            expires_at: created_at.saturating_add(self.settings.key_ttl_secs),
        };
        Ok((record, report))
    }

    /// Seal `plaintext` under the live key stored as `id`.
    pub fn seal_for(
        &mut self,
        registry: &KeyRegistry,
        id: &KeyId,
        plaintext: &[u8],
    ) -> Result<Envelope, SessionError> {
        let now = self.now();
        let result = match registry.lookup(id, now) {
            Ok(record) => seal_at(plaintext, &record.derived_key, &mut self.entropy, now)
                .map_err(SessionError::from),
            Err(err) => Err(err),
        };
        self.record_outcome(EVENT_ENCRYPTION, "qkd.encrypt", &result);
        result
    }

    /// Open an envelope sealed under the live key stored as `id`.
    pub fn open_for(
        &self,
        registry: &KeyRegistry,
        id: &KeyId,
        envelope: &[u8],
    ) -> Result<Vec<u8>, SessionError> {
        let result = registry
            .lookup(id, self.now())
            .and_then(|record| self.open_envelope(envelope, &record.derived_key));
        self.record_outcome(EVENT_DECRYPTION, "qkd.decrypt", &result);
        result
    }

    fn now(&self) -> UnixSeconds {
        (self.clock)()
    }

    fn record_outcome<T>(&self, event: &str, counter: &str, result: &Result<T, SessionError>) {
        let status = EventStatus::from_outcome(result.is_ok());
        self.events.log_event(event, status);
        self.count(&format!("{counter}.{}", status.as_str().to_ascii_lowercase()));
        if let Err(err) = result {
            warn!(event, error = %err, kind = ?err.kind(), "session operation failed");
        } else {
            debug!(event, "session operation succeeded");
        }
    }

    fn count(&self, name: &str) {
        if let Err(err) = self.telemetry.record_counter(name, 1) {
            debug!(error = %err, counter = name, "dropping session counter");
        }
    }
}
