//! SoundBridge Core
//!
//! Shared types, configuration validation and event definitions for the
//! SoundBridge audio engine.
//!
//! This crate provides:
//! - **Identifiers**: `GuildId`, `StreamId`, `EffectId`
//! - **Configuration**: `AudioConfig` with all-or-nothing validation
//! - **Quality tiers**: `QualityTier` with clamped one-step transitions
//! - **Events**: `AudioEvent` and the `EventSink` trait
//!
//! # Example
//!
//! ```rust
//! use soundbridge_core::types::{AudioConfig, QualityTier, StepDirection};
//!
//! let config = AudioConfig {
//!     master_volume: 0.5,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//!
//! assert_eq!(QualityTier::High.step(StepDirection::Down), Some(QualityTier::Medium));
//! assert_eq!(QualityTier::Low.step(StepDirection::Down), None);
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod events;
pub mod types;

pub use error::{ConfigError, Result};
pub use events::{AudioEvent, EventSink, NullEventSink, QualityChangeReason};
pub use types::{
    AudioConfig, AudioMetrics, EffectId, EffectKind, EqBands, GuildId, MixingMode, QualityTier,
    StepDirection, StreamId,
};
