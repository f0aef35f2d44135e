//! Read-only look presets and intensity blending.

use serde::{Deserialize, Serialize};

use crate::model::GlobalAdjustments;

/// A named set of global adjustments. Presets are reference data: applying
/// one copies blended values into the recipe, the recipe never points back
/// at the preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub name: String,
    pub mood: String,
    pub notes: String,
    pub globals: GlobalAdjustments,
}

impl Preset {
    /// Blend these globals into `current` at the given intensity.
    pub fn blend(&self, current: &GlobalAdjustments, intensity: f32) -> GlobalAdjustments {
        blend_globals(current, &self.globals, intensity)
    }
}

/// Move every field of `current` towards `target` by `intensity`.
///
/// Equivalent to `current + (target - current) * intensity`, written so that
/// intensity 0 and 1 reproduce the endpoints exactly. `intensity` is not
/// clamped: 2 overshoots by the same distance again.
pub fn blend_globals(
    current: &GlobalAdjustments,
    target: &GlobalAdjustments,
    intensity: f32,
) -> GlobalAdjustments {
    current.zip_with(target, |from, to| from * (1.0 - intensity) + to * intensity)
}

fn preset(name: &str, mood: &str, notes: &str, globals: GlobalAdjustments) -> Preset {
    Preset {
        name: name.to_string(),
        mood: mood.to_string(),
        notes: notes.to_string(),
        globals,
    }
}

/// The presets shipped with the editor.
pub fn builtin_presets() -> Vec<Preset> {
    vec![
        preset(
            "Clean Punch",
            "Crisp",
            "Adds midtone contrast and lifts shadows slightly.",
            GlobalAdjustments {
                contrast: 8.0,
                shadows: 6.0,
                highlights: -4.0,
                vibrance: 10.0,
                ..GlobalAdjustments::default()
            },
        ),
        preset(
            "Soft Matte",
            "Calm",
            "Raised blacks and muted colour for a faded print look.",
            GlobalAdjustments {
                contrast: -12.0,
                blacks: 18.0,
                whites: -6.0,
                saturation: -15.0,
                ..GlobalAdjustments::default()
            },
        ),
        preset(
            "Golden Hour",
            "Warm",
            "Warmer white balance with a gentle exposure lift.",
            GlobalAdjustments {
                exposure_ev: 0.15,
                temp: 14.0,
                tint: 4.0,
                vibrance: 12.0,
                ..GlobalAdjustments::default()
            },
        ),
        preset(
            "Blue Hour",
            "Cool",
            "Cooler balance, protected highlights.",
            GlobalAdjustments {
                temp: -16.0,
                tint: -3.0,
                highlights: -20.0,
                saturation: 6.0,
                ..GlobalAdjustments::default()
            },
        ),
        preset(
            "Mono Contrast",
            "Graphic",
            "Strips colour and pushes tonal separation.",
            GlobalAdjustments {
                contrast: 24.0,
                whites: 10.0,
                blacks: -10.0,
                saturation: -100.0,
                vibrance: -100.0,
                ..GlobalAdjustments::default()
            },
        ),
    ]
}
