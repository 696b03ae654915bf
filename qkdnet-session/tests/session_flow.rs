use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use qkdnet_entropy::{EntropyError, EntropySource, SeededEntropySource};
use qkdnet_session::{
    Config, ErrorKind, KeyRegistry, QkdSession, SessionError, EVENT_DECRYPTION, EVENT_ENCRYPTION,
    EVENT_KEY_DISTRIBUTION,
};
use qkdnet_telemetry::{EventStatus, RecordingEventLogger};

const MESSAGE: &[u8] = b"Hello, quantum-secure world!";

fn fast_config() -> Config {
    let mut config = Config::sample();
    config.kdf.iterations = 1_000;
    config
}

fn session(seed: u64) -> (QkdSession<SeededEntropySource>, Arc<RecordingEventLogger>) {
    let events = Arc::new(RecordingEventLogger::new());
    let session = QkdSession::new(&fast_config(), SeededEntropySource::with_seed(seed))
        .with_event_logger(events.clone());
    (session, events)
}

#[test]
fn encrypt_then_decrypt_round_trips() {
    let (mut alice, events) = session(1);
    let sealed = alice.encrypt_message(MESSAGE).unwrap();
    assert!(sealed.report.accepted());
    assert_eq!(sealed.report.key().len(), 32);
    assert_eq!(sealed.salt.len(), 16);

    // The peer only needs the envelope, salt and raw key.
    let (bob, _) = session(2);
    let clear = bob
        .decrypt_message(&sealed.envelope.to_bytes(), &sealed.salt, sealed.report.key())
        .unwrap();
    assert_eq!(clear, MESSAGE);

    let names: Vec<_> = events
        .events()
        .into_iter()
        .map(|event| (event.name, event.status))
        .collect();
    assert_eq!(
        names,
        vec![
            (EVENT_KEY_DISTRIBUTION.to_owned(), EventStatus::Success),
            (EVENT_ENCRYPTION.to_owned(), EventStatus::Success),
        ]
    );
    assert_eq!(alice.telemetry().counter("qkd.distribute.success"), 1);
    assert_eq!(alice.telemetry().counter("qkd.encrypt.success"), 1);
}

#[test]
fn encrypted_envelopes_carry_the_session_clock() {
    let mut session = QkdSession::new(&fast_config(), SeededEntropySource::with_seed(8))
        .with_clock(Arc::new(|| 1_234_567u64));
    let sealed = session.encrypt_message(MESSAGE).unwrap();
    assert_eq!(sealed.envelope.issued_at(), 1_234_567);
}

#[test]
fn tampering_is_reported_and_surfaced() {
    let (mut session, events) = session(3);
    let sealed = session.encrypt_message(MESSAGE).unwrap();
    let mut bytes = sealed.envelope.to_bytes();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x80;

    let err = session
        .decrypt_message(&bytes, &sealed.salt, sealed.report.key())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
    assert!(!err.is_retryable());

    let last_event = events.events().pop().unwrap();
    assert_eq!(last_event.name, EVENT_DECRYPTION);
    assert_eq!(last_event.status, EventStatus::Failure);
    assert_eq!(session.telemetry().counter("qkd.decrypt.failure"), 1);
}

#[test]
fn wrong_salt_fails_authentication() {
    let (mut session, _) = session(4);
    let first = session.encrypt_message(MESSAGE).unwrap();
    let second = session.encrypt_message(MESSAGE).unwrap();
    let err = session
        .decrypt_message(&first.envelope.to_bytes(), &second.salt, first.report.key())
        .unwrap_err();
    assert!(matches!(err, SessionError::AuthenticationFailure(_)));
}

#[test]
fn registry_channels_seal_open_expire_and_rotate() {
    let now = Arc::new(AtomicU64::new(1_700_000_000));
    let clock_now = Arc::clone(&now);
    let mut config = fast_config();
    config.session.key_ttl_secs = 60;
    let mut session = QkdSession::new(&config, SeededEntropySource::with_seed(5))
        .with_clock(Arc::new(move || clock_now.load(Ordering::SeqCst)));
    let mut registry = KeyRegistry::new();

    let channel = session.establish_channel(&mut registry).unwrap();
    assert_eq!(registry.len(), 1);
    let envelope = session
        .seal_for(&registry, &channel.id, MESSAGE)
        .unwrap()
        .to_bytes();
    assert_eq!(
        session.open_for(&registry, &channel.id, &envelope).unwrap(),
        MESSAGE
    );

    // A peer holding the raw key and salt can open registry envelopes too.
    assert_eq!(
        session
            .decrypt_message(&envelope, &channel.salt, channel.report.key())
            .unwrap(),
        MESSAGE
    );

    now.fetch_add(60, Ordering::SeqCst);
    let err = session
        .seal_for(&registry, &channel.id, MESSAGE)
        .unwrap_err();
    assert!(matches!(err, SessionError::KeyExpired(id) if id == channel.id));
    assert_eq!(err.kind(), ErrorKind::UnknownKey);

    let rotated = session.rotate_channel(&mut registry, &channel.id).unwrap();
    assert_eq!(rotated.id, channel.id);
    assert_ne!(rotated.salt, channel.salt);
    assert_eq!(registry.len(), 1);

    // Old envelopes no longer open under the rotated key.
    let stale = session.open_for(&registry, &channel.id, &envelope).unwrap_err();
    assert_eq!(stale.kind(), ErrorKind::AuthenticationFailure);
    let fresh = session
        .seal_for(&registry, &channel.id, MESSAGE)
        .unwrap()
        .to_bytes();
    assert_eq!(
        session.open_for(&registry, &channel.id, &fresh).unwrap(),
        MESSAGE
    );
}

#[test]
fn unknown_channels_are_refused() {
    let (mut session, _) = session(6);
    let mut registry = KeyRegistry::new();
    let mut other = KeyRegistry::new();
    let channel = session.establish_channel(&mut other).unwrap();

    let err = session.seal_for(&registry, &channel.id, MESSAGE).unwrap_err();
    assert!(matches!(err, SessionError::UnknownKey(_)));
    let err = session.rotate_channel(&mut registry, &channel.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownKey);
}

struct DrainedEntropy;

impl EntropySource for DrainedEntropy {
    fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), EntropyError> {
        Err(EntropyError::Timeout { timeout_ms: 10 })
    }
}

#[test]
fn entropy_outage_is_retryable() {
    let events = Arc::new(RecordingEventLogger::new());
    let mut session =
        QkdSession::new(&fast_config(), DrainedEntropy).with_event_logger(events.clone());
    let err = session.encrypt_message(MESSAGE).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RandomnessUnavailable);
    assert!(err.is_retryable());
    assert_eq!(events.events()[0].status, EventStatus::Failure);
}

#[test]
fn sessions_move_across_threads() {
    fn assert_send<T: Send>() {}
    assert_send::<QkdSession<SeededEntropySource>>();

    let (mut session, _) = session(7);
    let handle = std::thread::spawn(move || session.encrypt_message(MESSAGE).map(|s| s.salt));
    assert_eq!(handle.join().unwrap().unwrap().len(), 16);
}
