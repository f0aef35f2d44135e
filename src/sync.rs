//! Recipe persistence for the selected asset.
//!
//! [`RecipeSync`] loads the stored recipe whenever the asset selection
//! changes and writes the recipe back after edits, debounced so a slider drag
//! produces one save with the final value. The recipe installed by a load is
//! never saved straight back.

use std::time::Duration;

use openroom_recipe::{EditRecipe, RECIPE_VERSION, RecipeStore};
use thiserror::Error;
use web_time::Instant;

use crate::debounce::Debouncer;
use crate::dispatch::{Completion, Dispatch, Ticket};
use crate::service::{AssetId, ServiceCall, ServiceError, ServiceReply};

/// Delay between the last edit and the save call.
pub const DEFAULT_SAVE_DEBOUNCE: Duration = Duration::from_millis(300);

/// Why a stored recipe could not be used. All variants fall back to the
/// default recipe.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("No stored recipe")]
    NotFound,

    #[error("Failed to load recipe: {0}")]
    Failed(#[from] ServiceError),

    #[error("Stored recipe version {found} is newer than supported version {supported}")]
    VersionTooNew { found: u8, supported: u8 },
}

/// Interpret the reply to a `load_recipe` call.
pub fn read_loaded_recipe(
    result: Result<ServiceReply, ServiceError>,
) -> Result<EditRecipe, LoadError> {
    let recipe = result?
        .into_recipe("load_recipe")?
        .ok_or(LoadError::NotFound)?;
    if recipe.version > RECIPE_VERSION {
        return Err(LoadError::VersionTooNew {
            found: recipe.version,
            supported: RECIPE_VERSION,
        });
    }
    Ok(recipe)
}

/// Keeps the [`RecipeStore`] in step with the service's recipe storage.
pub struct RecipeSync<D: Dispatch> {
    dispatch: D,
    asset: Option<AssetId>,
    pending_load: Option<Ticket>,
    /// A load finished for the current asset
    loaded: bool,
    /// Skip the change caused by installing the loaded recipe
    just_loaded: bool,
    seen_revision: u64,
    save: Debouncer,
}

impl<D: Dispatch> RecipeSync<D> {
    pub fn new(dispatch: D) -> Self {
        Self::with_save_delay(dispatch, DEFAULT_SAVE_DEBOUNCE)
    }

    pub fn with_save_delay(dispatch: D, delay: Duration) -> Self {
        Self {
            dispatch,
            asset: None,
            pending_load: None,
            loaded: false,
            just_loaded: false,
            seen_revision: 0,
            save: Debouncer::new(delay),
        }
    }

    pub fn asset(&self) -> Option<&AssetId> {
        self.asset.as_ref()
    }

    /// Whether the recipe for the current asset has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_save_pending(&self) -> bool {
        self.save.is_pending()
    }

    /// Switch to another asset (or none).
    ///
    /// A save still waiting for the previous asset is sent right away.
    pub fn select_asset(&mut self, asset: Option<AssetId>, store: &mut RecipeStore) {
        if self.asset == asset {
            return;
        }
        self.flush(store);

        self.asset = asset;
        self.loaded = false;
        self.just_loaded = false;

        match &self.asset {
            Some(asset_id) => {
                log::debug!("Loading recipe for {}", asset_id);
                let ticket = self.dispatch.submit(ServiceCall::LoadRecipe {
                    asset_id: asset_id.clone(),
                });
                self.pending_load = Some(ticket);
            }
            None => {
                self.pending_load = None;
                store.reset();
                self.seen_revision = store.revision();
            }
        }
    }

    /// Apply finished calls and send a save if one is due.
    pub fn tick(&mut self, store: &mut RecipeStore, now: Instant) {
        while let Some(completion) = self.dispatch.poll() {
            self.complete(completion, store);
        }

        let revision = store.revision();
        if revision != self.seen_revision {
            self.seen_revision = revision;
            if self.just_loaded {
                self.just_loaded = false;
            } else if self.loaded {
                self.save.schedule(now);
            }
        }

        if self.save.fire(now) {
            self.submit_save(store);
        }
    }

    /// Send a pending save immediately.
    pub fn flush(&mut self, store: &RecipeStore) {
        if self.save.is_pending() {
            self.save.cancel();
            self.submit_save(store);
        }
    }

    fn submit_save(&mut self, store: &RecipeStore) {
        let Some(asset_id) = self.asset.clone() else {
            return;
        };
        log::debug!("Saving recipe for {} (revision {})", asset_id, store.revision());
        self.dispatch.submit(ServiceCall::SaveRecipe {
            asset_id,
            recipe: store.snapshot(),
        });
    }

    fn complete(&mut self, completion: Completion, store: &mut RecipeStore) {
        if self.pending_load == Some(completion.ticket) {
            self.pending_load = None;
            let recipe = match read_loaded_recipe(completion.result) {
                Ok(recipe) => recipe,
                Err(LoadError::NotFound) => {
                    log::debug!("No stored recipe, using defaults");
                    EditRecipe::default()
                }
                Err(e) => {
                    log::warn!("{}; using defaults", e);
                    EditRecipe::default()
                }
            };
            store.set_recipe(recipe);
            self.loaded = true;
            self.just_loaded = true;
            return;
        }

        match completion.result {
            Ok(ServiceReply::Saved) => log::trace!("Recipe saved ({:?})", completion.ticket),
            Ok(ServiceReply::Recipe(_)) => {
                log::debug!("Ignoring recipe load for a previous asset");
            }
            Ok(_) => log::debug!("Ignoring unexpected reply {:?}", completion.ticket),
            Err(e) => log::warn!("Failed to save recipe: {}", e),
        }
    }
}
