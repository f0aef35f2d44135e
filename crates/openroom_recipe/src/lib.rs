//! Edit recipe model for the openroom photo editor.
//!
//! A recipe describes how one asset is rendered: ten global sliders plus an
//! ordered stack of masked adjustment layers. [`RecipeStore`] is the single
//! writer of the active recipe; everything else reads snapshots from it.

mod error;
mod history;
mod model;
mod patch;
mod preset;
mod store;

pub use error::RecipeError;
pub use model::{
    AdjustmentLayer, EditRecipe, GlobalAdjustments, LocalAdjustments, Mask, MaskType,
    NormalizedPoint, RECIPE_VERSION, clamp_point,
};
pub use patch::{AdjustmentsPatch, GlobalsPatch, LayerPatch, MaskPatch};
pub use preset::{Preset, blend_globals, builtin_presets};
pub use store::{ChangeCause, RecipeEvent, RecipeStore, SubscriptionId};
