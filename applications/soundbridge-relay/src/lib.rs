//! SoundBridge Relay
//!
//! Runs a single guild's raw PCM stream through the SoundBridge engine:
//! layered configuration, the enhancement pipeline and effects chain, and
//! the background quality controller.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod relay;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use relay::Relay;
