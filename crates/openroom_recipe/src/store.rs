//! Observable recipe store.
//!
//! The store owns the recipe of the currently selected asset. The mutation
//! methods here are the only write path, so the merge rules of
//! [`LayerPatch`] and the selection invariant always hold. Observers register
//! with [`RecipeStore::subscribe`] and get a [`RecipeEvent`] after each
//! change.

use std::collections::HashSet;
use std::fmt;

use crate::model::{AdjustmentLayer, EditRecipe, GlobalAdjustments, clamp_point};
use crate::patch::{GlobalsPatch, LayerPatch};
use crate::preset::{Preset, blend_globals};
use crate::history::{HistoryEntry, RecipeHistory};

/// Identifier returned by [`RecipeStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// What kind of change produced a [`RecipeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCause {
    Globals,
    Preset,
    LayerAdded,
    LayerUpdated,
    LayerRemoved,
    /// Only the selected layer changed; the recipe itself is untouched
    Selection,
    /// Whole recipe replaced (asset switch, load, reset)
    Replaced,
    Undo,
    Redo,
}

impl ChangeCause {
    /// Whether the recipe content changed, as opposed to selection only.
    pub fn touches_recipe(self) -> bool {
        !matches!(self, ChangeCause::Selection)
    }
}

/// Notification passed to subscribers after every change.
#[derive(Debug)]
pub struct RecipeEvent<'a> {
    pub recipe: &'a EditRecipe,
    pub selected: Option<&'a str>,
    pub cause: ChangeCause,
    /// Monotonic counter of recipe changes in this store
    pub revision: u64,
}

type Subscriber = Box<dyn FnMut(&RecipeEvent<'_>)>;

/// Single-owner store for the active [`EditRecipe`].
pub struct RecipeStore {
    recipe: EditRecipe,
    selected: Option<String>,
    history: RecipeHistory,
    next_layer_seq: u64,
    revision: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl Default for RecipeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecipeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecipeStore")
            .field("recipe", &self.recipe)
            .field("selected", &self.selected)
            .field("revision", &self.revision)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl RecipeStore {
    /// Create a store holding the default recipe.
    pub fn new() -> Self {
        Self {
            recipe: EditRecipe::default(),
            selected: None,
            history: RecipeHistory::default(),
            next_layer_seq: 1,
            revision: 0,
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Register a callback invoked after every change.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&RecipeEvent<'_>) + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a subscriber. Returns false if the id was unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    /// Current recipe.
    pub fn recipe(&self) -> &EditRecipe {
        &self.recipe
    }

    /// Owned copy of the current recipe, e.g. to key a render request.
    pub fn snapshot(&self) -> EditRecipe {
        self.recipe.clone()
    }

    pub fn selected_layer_id(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn selected_layer(&self) -> Option<&AdjustmentLayer> {
        self.selected
            .as_deref()
            .and_then(|id| self.recipe.layer(id))
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    // ------------------------------------------------------------------
    // Whole-recipe replacement
    // ------------------------------------------------------------------

    /// Replace the recipe wholesale (asset switch or load from persistence).
    ///
    /// History is cleared and selection moves to the first layer, if any.
    pub fn set_recipe(&mut self, recipe: EditRecipe) {
        self.recipe = recipe;
        self.normalize_layers();
        self.history.clear();
        self.selected = self.recipe.layers.first().map(|layer| layer.id.clone());
        log::debug!(
            "Recipe replaced ({} layers, selected {:?})",
            self.recipe.layers.len(),
            self.selected
        );
        self.changed(ChangeCause::Replaced);
    }

    /// Reset to the default recipe.
    pub fn reset(&mut self) {
        self.set_recipe(EditRecipe::default());
    }

    // ------------------------------------------------------------------
    // Globals
    // ------------------------------------------------------------------

    /// Shallow-merge `patch` into the globals. Values are not clamped.
    pub fn update_globals(&mut self, patch: &GlobalsPatch) {
        if patch.is_empty() {
            return;
        }
        self.record();
        patch.apply(&mut self.recipe.globals);
        self.changed(ChangeCause::Globals);
    }

    /// Blend a preset's globals into the recipe at `intensity`.
    pub fn apply_preset(&mut self, preset: &Preset, intensity: f32) {
        log::debug!("Applying preset '{}' at {:.2}", preset.name, intensity);
        self.record();
        self.recipe.globals = preset.blend(&self.recipe.globals, intensity);
        self.changed(ChangeCause::Preset);
    }

    /// Blend raw preset globals into the recipe at `intensity`.
    pub fn apply_preset_globals(
        &mut self,
        preset_globals: &GlobalAdjustments,
        intensity: f32,
    ) {
        self.record();
        self.recipe.globals = blend_globals(&self.recipe.globals, preset_globals, intensity);
        self.changed(ChangeCause::Preset);
    }

    // ------------------------------------------------------------------
    // Layers
    // ------------------------------------------------------------------

    /// Append a new gradient layer and select it. Returns its id.
    pub fn add_layer(&mut self) -> String {
        self.record();
        let id = self.allocate_layer_id();
        let name = format!("Gradient {}", self.recipe.layers.len() + 1);
        self.recipe.layers.push(AdjustmentLayer::new(id.clone(), name));
        self.selected = Some(id.clone());
        self.changed(ChangeCause::LayerAdded);
        id
    }

    /// Apply `patch` to the layer with `id`. Returns false if no such layer.
    pub fn update_layer(&mut self, id: &str, patch: &LayerPatch) -> bool {
        let Some(index) = self.recipe.layers.iter().position(|layer| layer.id == id) else {
            log::debug!("update_layer: no layer with id {id}");
            return false;
        };
        self.record();
        patch.apply(&mut self.recipe.layers[index]);
        self.changed(ChangeCause::LayerUpdated);
        true
    }

    /// Remove a layer. If it was selected, selection falls back to the first
    /// remaining layer.
    pub fn remove_layer(&mut self, id: &str) -> Option<AdjustmentLayer> {
        let index = self.recipe.layers.iter().position(|layer| layer.id == id)?;
        self.record();
        let removed = self.recipe.layers.remove(index);
        self.repair_selection();
        self.changed(ChangeCause::LayerRemoved);
        Some(removed)
    }

    /// Select a layer, or clear the selection with `None`.
    ///
    /// Unknown ids are repaired the same way as after a removal.
    pub fn select_layer(&mut self, id: Option<&str>) {
        let previous = self.selected.clone();
        self.selected = id.map(str::to_string);
        self.repair_selection();
        if self.selected != previous {
            self.notify(ChangeCause::Selection);
        }
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Group the following mutations into one undo step until
    /// [`end_interaction`](Self::end_interaction), e.g. a slider drag.
    pub fn begin_interaction(&mut self) {
        self.history.begin_group();
    }

    pub fn end_interaction(&mut self) {
        self.history.end_group();
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Restore the previous recipe and the layer selected at that point.
    /// Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.history.undo(self.history_entry()) else {
            return false;
        };
        self.restore(previous);
        self.changed(ChangeCause::Undo);
        true
    }

    /// Re-apply an undone change. Returns false when there is nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(next) = self.history.redo(self.history_entry()) else {
            return false;
        };
        self.restore(next);
        self.changed(ChangeCause::Redo);
        true
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            recipe: self.recipe.clone(),
            selected: self.selected.clone(),
        }
    }

    fn record(&mut self) {
        let before = self.history_entry();
        self.history.record(before);
    }

    fn restore(&mut self, entry: HistoryEntry) {
        self.recipe = entry.recipe;
        self.selected = entry.selected;
        self.repair_selection();
    }

    /// Keep `selected` pointing at an existing layer, or clear it.
    fn repair_selection(&mut self) {
        let dangling = self
            .selected
            .as_deref()
            .is_some_and(|id| !self.recipe.contains_layer(id));
        if dangling {
            self.selected = self.recipe.layers.first().map(|layer| layer.id.clone());
        }
    }

    fn allocate_layer_id(&mut self) -> String {
        loop {
            let id = format!("layer-{}", self.next_layer_seq);
            self.next_layer_seq += 1;
            if !self.recipe.contains_layer(&id) {
                return id;
            }
        }
    }

    /// Enforce unique, non-empty layer ids and in-range mask points on
    /// recipes coming from outside the store.
    fn normalize_layers(&mut self) {
        let mut seen = HashSet::new();
        let mut needs_id = Vec::new();
        for (index, layer) in self.recipe.layers.iter_mut().enumerate() {
            layer.mask.start = clamp_point(layer.mask.start);
            layer.mask.end = clamp_point(layer.mask.end);
            if layer.id.is_empty() || !seen.insert(layer.id.clone()) {
                needs_id.push(index);
            }
        }
        for index in needs_id {
            let id = self.allocate_layer_id();
            log::warn!(
                "Layer {} had a missing or duplicate id, reassigned to {}",
                index,
                id
            );
            self.recipe.layers[index].id = id;
        }
    }

    fn changed(&mut self, cause: ChangeCause) {
        self.revision += 1;
        self.notify(cause);
    }

    fn notify(&mut self, cause: ChangeCause) {
        let event = RecipeEvent {
            recipe: &self.recipe,
            selected: self.selected.as_deref(),
            cause,
            revision: self.revision,
        };
        for (_, callback) in self.subscribers.iter_mut() {
            callback(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::model::Mask;
    use crate::patch::MaskPatch;

    fn store_with_layers(count: usize) -> (RecipeStore, Vec<String>) {
        let mut store = RecipeStore::new();
        let ids = (0..count).map(|_| store.add_layer()).collect();
        (store, ids)
    }

    #[test]
    fn test_update_globals_merges() {
        let mut store = RecipeStore::new();
        store.update_globals(&GlobalsPatch {
            contrast: Some(5.0),
            ..GlobalsPatch::default()
        });
        store.update_globals(&GlobalsPatch {
            shadows: Some(-3.0),
            ..GlobalsPatch::default()
        });

        assert_eq!(store.recipe().globals.contrast, 5.0);
        assert_eq!(store.recipe().globals.shadows, -3.0);
    }

    #[test]
    fn test_preset_half_intensity_contrast() {
        let mut store = RecipeStore::new();
        let preset = Preset {
            name: "Test".into(),
            mood: "Neutral".into(),
            notes: String::new(),
            globals: GlobalAdjustments {
                contrast: 8.0,
                ..GlobalAdjustments::default()
            },
        };
        store.apply_preset(&preset, 0.5);
        assert_eq!(store.recipe().globals.contrast, 4.0);
    }

    #[test]
    fn test_add_layer_defaults() {
        let (store, ids) = store_with_layers(2);
        let layers = &store.recipe().layers;

        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].name, "Gradient 1");
        assert_eq!(layers[1].name, "Gradient 2");
        assert_ne!(ids[0], ids[1]);
        assert_eq!(store.selected_layer_id(), Some(ids[1].as_str()));

        let layer = &layers[1];
        assert!(layer.enabled);
        assert_eq!(layer.opacity, 1.0);
        assert_eq!(layer.mask.start, (0.35, 0.2));
        assert_eq!(layer.mask.end, (0.65, 0.8));
        assert_eq!(layer.mask.feather, 0.35);
        assert!(!layer.mask.invert);
    }

    #[test]
    fn test_update_layer_feather_only() {
        let (mut store, ids) = store_with_layers(1);
        let patch = LayerPatch::mask(MaskPatch::default().with_feather(0.5));
        assert!(store.update_layer(&ids[0], &patch));

        let mask = store.recipe().layers[0].mask;
        assert_eq!(mask.feather, 0.5);
        assert_eq!(mask.start, Mask::default().start);
        assert_eq!(mask.end, Mask::default().end);
        assert!(!mask.invert);
    }

    #[test]
    fn test_update_unknown_layer_is_noop() {
        let (mut store, _) = store_with_layers(1);
        let revision = store.revision();
        let before = store.snapshot();

        assert!(!store.update_layer("missing", &LayerPatch::default()));
        assert_eq!(store.snapshot(), before);
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn test_remove_selected_of_two_selects_remaining() {
        let (mut store, ids) = store_with_layers(2);
        assert_eq!(store.selected_layer_id(), Some(ids[1].as_str()));

        store.remove_layer(&ids[1]).unwrap();
        assert_eq!(store.selected_layer_id(), Some(ids[0].as_str()));

        store.remove_layer(&ids[0]).unwrap();
        assert_eq!(store.selected_layer_id(), None);
    }

    #[test]
    fn test_remove_unselected_keeps_selection() {
        let (mut store, ids) = store_with_layers(3);
        store.select_layer(Some(&ids[2]));
        store.remove_layer(&ids[0]);
        assert_eq!(store.selected_layer_id(), Some(ids[2].as_str()));
    }

    #[test]
    fn test_select_unknown_snaps_to_first() {
        let (mut store, ids) = store_with_layers(2);
        store.select_layer(Some("nope"));
        assert_eq!(store.selected_layer_id(), Some(ids[0].as_str()));
    }

    #[test]
    fn test_select_none_clears_selection() {
        let (mut store, ids) = store_with_layers(2);
        store.select_layer(None);
        assert_eq!(store.selected_layer_id(), None);
        assert_eq!(store.selected_layer(), None);

        store.select_layer(Some("missing"));
        assert_eq!(store.selected_layer_id(), Some(ids[0].as_str()));
    }

    #[test]
    fn test_remove_unselected_keeps_empty_selection() {
        let (mut store, ids) = store_with_layers(2);
        store.select_layer(None);
        store.remove_layer(&ids[1]);
        assert_eq!(store.selected_layer_id(), None);
    }

    #[test]
    fn test_set_recipe_selects_first_and_repairs_ids() {
        let mut store = RecipeStore::new();
        let mut recipe = EditRecipe::default();
        recipe.layers.push(AdjustmentLayer::new("a", "One"));
        recipe.layers.push(AdjustmentLayer::new("a", "Two"));
        let mut out_of_range = AdjustmentLayer::new("", "Three");
        out_of_range.mask.start = (-1.0, 2.0);
        recipe.layers.push(out_of_range);

        store.set_recipe(recipe);

        let layers = &store.recipe().layers;
        assert_eq!(store.selected_layer_id(), Some("a"));
        assert_ne!(layers[1].id, "a");
        assert!(!layers[2].id.is_empty());
        assert_ne!(layers[1].id, layers[2].id);
        assert_eq!(layers[2].mask.start, (0.0, 1.0));
    }

    #[test]
    fn test_reset_clears_selection() {
        let (mut store, _) = store_with_layers(2);
        store.reset();
        assert!(store.recipe().layers.is_empty());
        assert_eq!(store.selected_layer_id(), None);
        assert!(!store.can_undo());
    }

    #[test]
    fn test_new_ids_skip_loaded_ones() {
        let mut store = RecipeStore::new();
        let mut recipe = EditRecipe::default();
        recipe.layers.push(AdjustmentLayer::new("layer-1", "Gradient 1"));
        store.set_recipe(recipe);

        let id = store.add_layer();
        assert_ne!(id, "layer-1");
        assert_eq!(store.recipe().layers[1].name, "Gradient 2");
    }

    #[test]
    fn test_subscribers_see_changes() {
        let mut store = RecipeStore::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = store.subscribe(move |event| sink.borrow_mut().push(event.cause));

        store.add_layer();
        store.update_globals(&GlobalsPatch {
            tint: Some(2.0),
            ..GlobalsPatch::default()
        });
        assert!(store.unsubscribe(id));
        store.reset();

        assert_eq!(
            *seen.borrow(),
            vec![ChangeCause::LayerAdded, ChangeCause::Globals]
        );
        assert!(!store.unsubscribe(id));
    }

    #[test]
    fn test_selection_change_does_not_bump_revision() {
        let (mut store, ids) = store_with_layers(2);
        let revision = store.revision();
        store.select_layer(Some(&ids[0]));
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn test_undo_redo() {
        let mut store = RecipeStore::new();
        store.update_globals(&GlobalsPatch {
            contrast: Some(10.0),
            ..GlobalsPatch::default()
        });
        let id = store.add_layer();

        assert!(store.undo());
        assert!(store.recipe().layers.is_empty());
        assert_eq!(store.selected_layer_id(), None);

        assert!(store.redo());
        assert_eq!(store.selected_layer_id(), Some(id.as_str()));
        assert_eq!(store.recipe().globals.contrast, 10.0);
        assert!(!store.redo());
    }

    #[test]
    fn test_undo_restores_selection() {
        let (mut store, ids) = store_with_layers(2);
        store.select_layer(Some(&ids[0]));
        store.update_layer(&ids[0], &LayerPatch {
            opacity: Some(0.5),
            ..LayerPatch::default()
        });
        store.select_layer(Some(&ids[1]));

        assert!(store.undo());
        assert_eq!(store.recipe().layers[0].opacity, 1.0);
        assert_eq!(store.selected_layer_id(), Some(ids[0].as_str()));

        assert!(store.redo());
        assert_eq!(store.recipe().layers[0].opacity, 0.5);
        assert_eq!(store.selected_layer_id(), Some(ids[1].as_str()));
    }

    #[test]
    fn test_interaction_is_one_undo_step() {
        let mut store = RecipeStore::new();
        store.begin_interaction();
        for value in 1..=5 {
            store.update_globals(&GlobalsPatch {
                exposure_ev: Some(value as f32 * 0.1),
                ..GlobalsPatch::default()
            });
        }
        store.end_interaction();

        assert!(store.undo());
        assert_eq!(store.recipe().globals.exposure_ev, 0.0);
        assert!(!store.undo());
    }
}
