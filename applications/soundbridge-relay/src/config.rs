/// Relay configuration
use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use soundbridge_audio::QualitySettings;
use soundbridge_core::AudioConfig;
use std::path::{Path, PathBuf};

/// Config file read when no path is given, if it exists
pub const DEFAULT_CONFIG_FILE: &str = "soundbridge.toml";

/// Prefix for environment overrides, e.g. `SOUNDBRIDGE_RELAY__GUILD_ID`
pub const ENV_PREFIX: &str = "SOUNDBRIDGE";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub quality: QualitySettings,

    #[serde(default = "default_relay")]
    pub relay: RelaySettings,

    #[serde(default = "default_logging")]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RelaySettings {
    #[serde(default = "default_guild_id")]
    pub guild_id: u64,

    /// Bytes read from the input per chunk
    #[serde(default = "default_chunk_bytes")]
    pub chunk_bytes: usize,

    /// Events buffered per subscriber before the oldest are dropped
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// `tracing` filter used when `RUST_LOG` is unset
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl RelayConfig {
    /// Load configuration from a TOML file and the environment
    ///
    /// Without `path`, `soundbridge.toml` in the working directory is used
    /// if present. Environment variables override file values; sections are
    /// separated by a double underscore.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(RelayError::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                settings = settings.add_source(config::File::from(path.to_path_buf()));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    settings = settings.add_source(config::File::from(default_path));
                }
            }
        }

        settings = settings.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(settings.build()?.try_deserialize()?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.audio.validate()?;
        self.quality.validate()?;

        let frame_bytes = self.audio.frame_bytes();
        if self.relay.chunk_bytes == 0 || self.relay.chunk_bytes % frame_bytes != 0 {
            return Err(RelayError::Config(format!(
                "chunk_bytes ({}) must be a positive multiple of the frame size ({frame_bytes})",
                self.relay.chunk_bytes
            )));
        }
        if self.relay.event_capacity == 0 {
            return Err(RelayError::Config(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RelayError::Config(e.to_string()))
    }
}

// Default values
fn default_relay() -> RelaySettings {
    RelaySettings {
        guild_id: default_guild_id(),
        chunk_bytes: default_chunk_bytes(),
        event_capacity: default_event_capacity(),
    }
}

fn default_guild_id() -> u64 {
    1
}

fn default_chunk_bytes() -> usize {
    // 20 ms of 48 kHz stereo int16
    3840
}

fn default_event_capacity() -> usize {
    256
}

fn default_logging() -> LoggingSettings {
    LoggingSettings {
        filter: default_filter(),
    }
}

fn default_filter() -> String {
    "soundbridge=info".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            quality: QualitySettings::default(),
            relay: default_relay(),
            logging: default_logging(),
        }
    }
}
