//! Layered configuration loading

use soundbridge_core::QualityTier;
use soundbridge_relay::RelayConfig;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn partial_file_keeps_defaults() {
    let file = write_config(
        r#"
[audio]
master_volume = 0.4
quality = "medium"

[relay]
guild_id = 42
"#,
    );

    let config = RelayConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.audio.master_volume, 0.4);
    assert_eq!(config.audio.quality, QualityTier::Medium);
    assert_eq!(config.audio.sample_rate, 48000);
    assert_eq!(config.relay.guild_id, 42);
    assert_eq!(config.relay.chunk_bytes, 3840);
    assert_eq!(config.quality.tick_interval_ms, 5000);
    assert!(config.validate().is_ok());
}

#[test]
fn quality_settings_are_read() {
    let file = write_config(
        r#"
[quality]
downgrade_cooldown_secs = 20
min_samples = 5
"#,
    );

    let config = RelayConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.quality.downgrade_cooldown_secs, 20);
    assert_eq!(config.quality.min_samples, 5);
    assert_eq!(config.quality.upgrade_cooldown_secs, 30);
}

#[test]
fn out_of_range_audio_fails_validation() {
    let file = write_config(
        r#"
[audio]
master_volume = 1.5
"#,
    );

    let config = RelayConfig::load(Some(file.path())).unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    assert!(RelayConfig::load(Some(&path)).is_err());
}
