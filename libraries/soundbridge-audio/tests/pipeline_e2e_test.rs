//! End-to-end pipeline tests over raw PCM bytes

use soundbridge_audio::{AudioPipeline, BroadcastEventSink, EffectsChain};
use soundbridge_core::{AudioConfig, AudioEvent, EqBands, GuildId, NullEventSink};
use soundbridge_dsp::pcm::{bytes_to_i16, i16_to_bytes};
use std::sync::Arc;

fn plain_config(volume: f32) -> AudioConfig {
    AudioConfig {
        master_volume: volume,
        normalization_enabled: false,
        ..Default::default()
    }
}

#[test]
fn half_volume_halves_samples() {
    let pipeline = AudioPipeline::new(Arc::new(NullEventSink));
    let guild = GuildId::new(10);
    pipeline.start_processing(guild);

    let out = pipeline.process(guild, &i16_to_bytes(&[1000; 256]), &plain_config(0.5));
    let samples = bytes_to_i16(&out);
    assert_eq!(samples.len(), 256);
    assert!(samples.iter().all(|&s| s == 500));
}

#[test]
fn silence_stays_silent_with_every_stage_on() {
    let pipeline = AudioPipeline::new(Arc::new(NullEventSink));
    let guild = GuildId::new(11);
    pipeline.start_processing(guild);

    let config = AudioConfig {
        normalization_enabled: true,
        auto_gain_control: true,
        dynamic_range_compression: 0.8,
        eq_enabled: true,
        eq_bass: 6.0,
        eq_treble: -6.0,
        ..Default::default()
    };
    let out = pipeline.process(guild, &i16_to_bytes(&[0; 128]), &config);
    assert!(bytes_to_i16(&out).iter().all(|&s| s == 0));
}

#[test]
fn malformed_chunk_passes_through() {
    let pipeline = AudioPipeline::new(Arc::new(NullEventSink));
    let guild = GuildId::new(12);
    pipeline.start_processing(guild);

    let raw = vec![1u8, 2, 3, 4, 5];
    assert_eq!(pipeline.process(guild, &raw, &plain_config(0.5)), raw);
}

#[test]
fn stopped_guild_outputs_nothing_and_frees_buffers() {
    let pipeline = AudioPipeline::new(Arc::new(NullEventSink));
    let guild = GuildId::new(13);
    let token = pipeline.start_processing(guild);
    pipeline.process(guild, &i16_to_bytes(&[100; 16]), &plain_config(1.0));
    assert!(pipeline.has_buffers(guild));

    assert!(pipeline.stop_processing(guild));
    assert!(token.is_cancelled());
    assert!(!pipeline.has_buffers(guild));
    assert!(pipeline
        .process(guild, &i16_to_bytes(&[100; 16]), &plain_config(1.0))
        .is_empty());
}

#[test]
fn guilds_keep_independent_configs() {
    let pipeline = AudioPipeline::new(Arc::new(NullEventSink));
    let a = GuildId::new(1);
    let b = GuildId::new(2);
    pipeline.set_config(a, plain_config(0.25)).unwrap();

    assert_eq!(pipeline.get_config(a).master_volume, 0.25);
    assert_eq!(pipeline.get_config(b), AudioConfig::default());
}

#[test]
fn invalid_config_is_rejected_whole() {
    let pipeline = AudioPipeline::new(Arc::new(NullEventSink));
    let guild = GuildId::new(3);
    let bad = AudioConfig {
        master_volume: 0.3,
        sample_rate: 12345,
        ..Default::default()
    };
    assert!(pipeline.set_config(guild, bad).is_err());
    assert_eq!(pipeline.get_config(guild), AudioConfig::default());
}

#[test]
fn set_eq_emits_event_and_enables_eq() {
    let sink = Arc::new(BroadcastEventSink::default());
    let mut events = sink.subscribe();
    let pipeline = Arc::new(AudioPipeline::new(sink.clone()));
    let chain = EffectsChain::new(Arc::clone(&pipeline), sink);
    let guild = GuildId::new(4);

    chain.set_eq(guild, EqBands::new(3.0, 0.0, -3.0)).unwrap();

    let config = pipeline.get_config(guild);
    assert!(config.eq_enabled);
    assert_eq!(config.eq_bands(), EqBands::new(3.0, 0.0, -3.0));

    let mut saw_effect = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, AudioEvent::EffectApplied { .. }) {
            saw_effect = true;
        }
    }
    assert!(saw_effect);
}
