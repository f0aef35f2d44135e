//! Error types for recipe parsing and validation.

use thiserror::Error;

/// Errors that can occur while reading or validating a recipe.
#[derive(Error, Debug)]
pub enum RecipeError {
    /// JSON parsing or serialization error
    #[error("Failed to parse recipe: {0}")]
    Json(#[from] serde_json::Error),

    /// Recipe written by a newer format version
    #[error("Recipe version {found} is newer than supported version {supported}")]
    VersionTooNew {
        /// Version found in the recipe
        found: u8,
        /// Highest version this build reads
        supported: u8,
    },
}
