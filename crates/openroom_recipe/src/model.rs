//! Edit recipe data types.
//!
//! The JSON shape produced here is the one the rendering service reads and
//! writes: camelCase field names, and every field falls back to its default
//! when missing so older sidecars keep loading.

use serde::{Deserialize, Serialize};

use crate::error::RecipeError;

/// Current recipe format version.
/// Increment this when making breaking changes to the recipe format.
pub const RECIPE_VERSION: u8 = 1;

/// Whole-image slider values.
///
/// Each field is clamped by whoever produces it (usually a slider with its own
/// range); the model never clamps globals itself.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalAdjustments {
    /// Exposure in EV stops
    pub exposure_ev: f32,
    pub contrast: f32,
    pub highlights: f32,
    pub shadows: f32,
    pub whites: f32,
    pub blacks: f32,
    /// Colour temperature shift
    pub temp: f32,
    pub tint: f32,
    pub vibrance: f32,
    pub saturation: f32,
}

impl GlobalAdjustments {
    /// Build a new value by applying `f` to each pair of matching fields.
    pub fn zip_with(&self, other: &Self, f: impl Fn(f32, f32) -> f32) -> Self {
        Self {
            exposure_ev: f(self.exposure_ev, other.exposure_ev),
            contrast: f(self.contrast, other.contrast),
            highlights: f(self.highlights, other.highlights),
            shadows: f(self.shadows, other.shadows),
            whites: f(self.whites, other.whites),
            blacks: f(self.blacks, other.blacks),
            temp: f(self.temp, other.temp),
            tint: f(self.tint, other.tint),
            vibrance: f(self.vibrance, other.vibrance),
            saturation: f(self.saturation, other.saturation),
        }
    }
}

/// Adjustments scoped to a single masked layer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalAdjustments {
    pub exposure_ev: f32,
    pub temp: f32,
    pub tint: f32,
    pub saturation: f32,
}

/// Mask shape. Only linear gradients exist today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskType {
    #[default]
    LinearGradient,
}

/// A point in normalized image space, both coordinates in [0, 1].
pub type NormalizedPoint = (f32, f32);

/// Clamp both coordinates of a point into [0, 1].
pub fn clamp_point((x, y): NormalizedPoint) -> NormalizedPoint {
    (x.clamp(0.0, 1.0), y.clamp(0.0, 1.0))
}

/// Gradient mask in normalized image coordinates, independent of the
/// resolution the image is rendered at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Mask {
    pub mask_type: MaskType,
    pub start: NormalizedPoint,
    pub end: NormalizedPoint,
    /// Softness of the gradient edge, 0..1
    pub feather: f32,
    pub invert: bool,
}

impl Default for Mask {
    fn default() -> Self {
        Self {
            mask_type: MaskType::LinearGradient,
            start: (0.35, 0.2),
            end: (0.65, 0.8),
            feather: 0.35,
            invert: false,
        }
    }
}

/// A masked local adjustment. Identity is `id`; position in
/// [`EditRecipe::layers`] is the z-order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdjustmentLayer {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    /// Blend strength, 0..1
    pub opacity: f32,
    pub mask: Mask,
    pub adjustments: LocalAdjustments,
}

impl AdjustmentLayer {
    /// Create a layer with the default gradient mask and zeroed adjustments.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for AdjustmentLayer {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: "Gradient".into(),
            enabled: true,
            opacity: 1.0,
            mask: Mask::default(),
            adjustments: LocalAdjustments::default(),
        }
    }
}

/// Full description of how to render one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditRecipe {
    pub version: u8,
    pub globals: GlobalAdjustments,
    pub layers: Vec<AdjustmentLayer>,
}

impl Default for EditRecipe {
    fn default() -> Self {
        Self {
            version: RECIPE_VERSION,
            globals: GlobalAdjustments::default(),
            layers: Vec::new(),
        }
    }
}

impl EditRecipe {
    /// Find a layer by id.
    pub fn layer(&self, id: &str) -> Option<&AdjustmentLayer> {
        self.layers.iter().find(|layer| layer.id == id)
    }

    /// Check whether a layer with this id exists.
    pub fn contains_layer(&self, id: &str) -> bool {
        self.layer(id).is_some()
    }

    /// Reject recipes written by a newer format than this build understands.
    pub fn check_version(&self) -> Result<(), RecipeError> {
        if self.version > RECIPE_VERSION {
            return Err(RecipeError::VersionTooNew {
                found: self.version,
                supported: RECIPE_VERSION,
            });
        }
        Ok(())
    }

    /// Serialize the recipe to pretty JSON.
    pub fn to_json(&self) -> Result<String, RecipeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize a recipe from JSON, validating its version.
    pub fn from_json(json: &str) -> Result<Self, RecipeError> {
        let recipe: Self = serde_json::from_str(json)?;
        recipe.check_version()?;
        Ok(recipe)
    }
}
