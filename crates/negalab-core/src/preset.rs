//! Conversion preset record

use serde::{Deserialize, Serialize};

/// Name of the built-in preset that is seeded at store initialization.
pub const DEFAULT_PRESET_NAME: &str = "Default";

/// A named bundle of negative-to-positive conversion parameters.
///
/// Presets are identified by `name`; every other field is an independent
/// scalar with its own default. Records are exchanged with the storage
/// layer by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    /// Unique preset name, the identity key
    pub name: String,
    /// Film stock category
    pub film_type: i32,
    /// Lower luminance bound for border detection
    pub dark_threshold: i32,
    /// Upper luminance bound for border detection
    pub light_threshold: i32,
    /// Border crop amount, in percent of frame
    pub border_crop: i32,
    /// Mirror the frame horizontally
    pub flip: bool,
    /// White point adjustment
    pub white_point: i32,
    /// Black point adjustment
    pub black_point: i32,
    /// Midtone gamma adjustment
    pub gamma: i32,
    /// Shadow lift
    pub shadows: i32,
    /// Highlight compression
    pub highlights: i32,
    /// Color temperature shift
    pub temp: i32,
    /// Green-magenta tint shift
    pub tint: i32,
    /// Saturation, 100 = unchanged
    pub sat: i32,
    /// Film base detection mode
    pub base_detect: i32,
    /// Sampled film base color (R, G, B)
    pub base_rgb: [u8; 3],
    /// Run dust and scratch removal
    pub remove_dust: bool,
    /// Whether this preset is the active one
    pub selected: bool,
}

impl Preset {
    /// Create a preset with default parameters under the given name.
    ///
    /// Unlike the seeded `"Default"` record, a user-created preset does not
    /// start out selected.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selected: false,
            ..Self::default()
        }
    }
}

impl Default for Preset {
    fn default() -> Self {
        Self {
            name: DEFAULT_PRESET_NAME.to_string(),
            film_type: 0,
            dark_threshold: 25,
            light_threshold: 100,
            border_crop: 1,
            flip: false,
            white_point: 0,
            black_point: 0,
            gamma: 0,
            shadows: 0,
            highlights: 0,
            temp: 0,
            tint: 0,
            sat: 100,
            base_detect: 0,
            base_rgb: [255, 255, 255],
            remove_dust: false,
            selected: true,
        }
    }
}
