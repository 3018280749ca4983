/// SoundBridge Relay - pipes PCM from stdin through the audio engine to stdout
use clap::{Parser, Subcommand};
use soundbridge_audio::EQ_PRESETS;
use soundbridge_relay::{Relay, RelayConfig};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "soundbridge-relay")]
#[command(about = "Per-guild audio enhancement relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Relay raw int16 PCM from stdin to stdout
    Run {
        /// Configuration file path
        #[arg(short, long, env = "SOUNDBRIDGE_CONFIG")]
        config: Option<PathBuf>,
        /// Guild to relay (overrides the config file)
        #[arg(short, long)]
        guild: Option<u64>,
    },
    /// List the built-in EQ presets
    Presets,
    /// Validate a configuration and print the effective settings
    CheckConfig {
        /// Configuration file path
        #[arg(short, long, env = "SOUNDBRIDGE_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn init_tracing(default_filter: &str) {
    // stdout carries audio, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, guild } => {
            let mut config = RelayConfig::load(config.as_deref())?;
            if let Some(guild) = guild {
                config.relay.guild_id = guild;
            }
            init_tracing(&config.logging.filter);
            run(config).await?;
        }
        Commands::Presets => {
            for preset in EQ_PRESETS {
                println!(
                    "{:<14} bass {:+5.1} dB  mid {:+5.1} dB  treble {:+5.1} dB",
                    preset.name, preset.bands.bass, preset.bands.mid, preset.bands.treble
                );
            }
        }
        Commands::CheckConfig { config } => {
            let config = RelayConfig::load(config.as_deref())?;
            config.validate()?;
            print!("{}", config.to_toml()?);
            eprintln!("Configuration OK");
        }
    }

    Ok(())
}

async fn run(config: RelayConfig) -> anyhow::Result<()> {
    tracing::info!("Starting SoundBridge relay");
    tracing::info!("Guild: {}", config.relay.guild_id);
    tracing::info!("Chunk size: {} bytes", config.relay.chunk_bytes);

    let relay = Relay::new(config)?;
    let shutdown = CancellationToken::new();

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    let written = relay
        .run(std::io::stdin(), std::io::stdout(), shutdown)
        .await?;
    tracing::info!("Relayed {} bytes", written);
    Ok(())
}
