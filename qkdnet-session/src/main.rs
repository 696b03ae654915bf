use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;
use qkdnet_entropy::{EntropySource, ExternalEntropySource, HostEntropySource};
use qkdnet_session::config::{load_config, Config, ConfigFormat};
use qkdnet_session::QkdSession;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "qkdnet-session",
    version,
    about = "Simulate a QKD exchange and seal a message under the distilled key"
)]
struct Cli {
    /// Path to configuration file (TOML or YAML). The built-in sample is used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Explicit configuration format override.
    #[arg(long, value_enum, default_value_t = ConfigFormat::Auto)]
    config_format: ConfigFormat,
    /// Message to encrypt and decrypt.
    #[arg(long, default_value = "Hello, quantum-secure world!")]
    message: String,
    /// Override the channel noise probability.
    #[arg(long)]
    noise: Option<f64>,
    /// Fix the channel seed for a reproducible run.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => load_config(path, cli.config_format)?,
        None => Config::sample(),
    };
    if let Some(noise) = cli.noise {
        config.qkd.noise_probability = noise;
    }
    if cli.seed.is_some() {
        config.qkd.seed = cli.seed;
    }
    config.validate()?;

    let entropy: Box<dyn EntropySource> = match config.entropy.clone() {
        // No hardware service is wired in the demo; the OS RNG stands behind
        // the bounded bridge so timeouts and retries still apply.
        Some(external) => Box::new(ExternalEntropySource::new(external, |len| {
            HostEntropySource::new().next_bytes(len)
        })),
        None => Box::new(HostEntropySource::new()),
    };
    let mut session = QkdSession::new(&config, entropy);

    let sealed = session.encrypt_message(cli.message.as_bytes())?;
    let summary = sealed.report.summary();
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let envelope = sealed.envelope.to_bytes();
    let recovered = session.decrypt_message(&envelope, &sealed.salt, sealed.report.key())?;
    let round_trip = recovered == cli.message.as_bytes();
    println!(
        "envelope {} bytes, salt {}, round trip {}",
        envelope.len(),
        sealed.salt,
        if round_trip { "ok" } else { "MISMATCH" }
    );
    info!(snapshot = %session.telemetry().flush().to_json()?, "telemetry");

    if !round_trip {
        color_eyre::eyre::bail!("decrypted message does not match the input");
    }
    Ok(())
}
