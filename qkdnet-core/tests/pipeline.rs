use qkdnet_core::{
    estimate, estimate_counts, extract, ChannelParams, ChannelSimulator, DepolarizingChannel,
    MeasurementDistribution, QkdError, QkdReport, SecurityLevel, DEFAULT_ERROR_THRESHOLD,
};
use qkdnet_entropy::SeededEntropySource;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn run(seed: u64, params: &ChannelParams) -> MeasurementDistribution {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    DepolarizingChannel.simulate(params, &mut rng).unwrap()
}

#[test]
fn seeded_runs_are_reproducible() {
    let params = ChannelParams::new(8, 1_024, 0.2);
    assert_eq!(run(42, &params), run(42, &params));
}

#[test]
fn zero_noise_puts_every_shot_on_one_outcome() {
    let dist = run(5, &ChannelParams::new(8, 1_024, 0.0));
    assert_eq!(dist.dominant_fraction(), 1.0);
    let qber = estimate(&dist, DEFAULT_ERROR_THRESHOLD).unwrap();
    assert_eq!(qber.error_rate, 0.0);
    assert_eq!(qber.security_level, SecurityLevel::High);
}

#[test]
fn more_noise_lowers_the_dominant_fraction() {
    let quiet = run(9, &ChannelParams::new(8, 4_096, 0.001));
    let noisy = run(9, &ChannelParams::new(8, 4_096, 0.5));
    assert!(noisy.dominant_fraction() < quiet.dominant_fraction());
    let expected = DepolarizingChannel::expected_dominant_fraction(&ChannelParams::new(8, 4_096, 0.5));
    assert!((noisy.dominant_fraction() - expected).abs() < 0.05);
}

#[test]
fn qber_boundaries() {
    let high = estimate_counts(96, 100, 0.11).unwrap();
    assert!(high.accepted);
    assert_eq!(high.security_level, SecurityLevel::High);
    assert!((high.error_rate - 0.04).abs() < 1e-9);

    let medium = estimate_counts(93, 100, 0.11).unwrap();
    assert!(medium.accepted);
    assert_eq!(medium.security_level, SecurityLevel::Medium);

    // An error rate of exactly the threshold is rejected.
    let boundary = MeasurementDistribution::from_counts([("00", 89u64), ("11", 11)]).unwrap();
    let at_threshold = estimate(&boundary, DEFAULT_ERROR_THRESHOLD).unwrap();
    assert!(!at_threshold.accepted);
    assert_eq!(at_threshold.security_level, SecurityLevel::Rejected);

    let rejected = estimate_counts(80, 100, 0.11).unwrap();
    assert!(!rejected.accepted);
    assert_eq!(rejected.security_level, SecurityLevel::Rejected);
}

#[test]
fn key_length_contract() {
    let dist = run(1, &ChannelParams::default());
    let mut entropy = SeededEntropySource::with_seed(77);
    assert_eq!(extract(&dist, 32, &mut entropy).unwrap().len(), 32);
    assert!(matches!(
        extract(&dist, 0, &mut entropy),
        Err(QkdError::InvalidParameter(_))
    ));
}

#[test]
fn full_pipeline_builds_a_report() {
    let dist = run(3, &ChannelParams::default());
    let qber = estimate(&dist, DEFAULT_ERROR_THRESHOLD).unwrap();
    let key = extract(&dist, 32, &mut SeededEntropySource::with_seed(3)).unwrap();
    let report = QkdReport::new(key, dist, qber);

    assert!(report.accepted());
    assert!(report.security_level() >= SecurityLevel::Medium);
    assert_eq!(report.distribution().shots(), 1_024);
    assert_eq!(report.summary().key_fingerprint, report.key().fingerprint());
}
