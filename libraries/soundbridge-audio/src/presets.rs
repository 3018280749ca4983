//! Named EQ presets

use serde::Serialize;
use soundbridge_core::EqBands;

/// A named three-band EQ setting
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EqPreset {
    pub name: &'static str,
    pub bands: EqBands,
}

const fn preset(name: &'static str, bass: f32, mid: f32, treble: f32) -> EqPreset {
    EqPreset {
        name,
        bands: EqBands::new(bass, mid, treble),
    }
}

/// Built-in presets, in listing order
pub const EQ_PRESETS: &[EqPreset] = &[
    preset("flat", 0.0, 0.0, 0.0),
    preset("rock", 4.0, 2.0, 3.0),
    preset("pop", 2.0, 1.0, 4.0),
    preset("jazz", 3.0, -1.0, 2.0),
    preset("classical", 1.0, -2.0, 3.0),
    preset("electronic", 6.0, -2.0, 4.0),
    preset("vocal", -2.0, 4.0, 2.0),
    preset("bass_boost", 8.0, 0.0, 0.0),
    preset("treble_boost", 0.0, 0.0, 8.0),
];

/// Look up a preset by name, ignoring case and surrounding whitespace
pub fn find_preset(name: &str) -> Option<&'static EqPreset> {
    let name = name.trim();
    EQ_PRESETS
        .iter()
        .find(|preset| preset.name.eq_ignore_ascii_case(name))
}

/// Names of all presets
pub fn preset_names() -> Vec<&'static str> {
    EQ_PRESETS.iter().map(|preset| preset.name).collect()
}
