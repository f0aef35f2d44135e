//! Edit history for the recipe store.
//!
//! Each entry pairs a recipe with the layer that was selected when it was
//! recorded, so stepping back also returns to the layer being edited. While
//! an interaction group is open (a slider or mask-handle drag) only the state
//! before its first mutation is recorded.

use std::collections::VecDeque;

use crate::model::EditRecipe;

/// Number of undo steps kept per asset.
pub(crate) const HISTORY_LIMIT: usize = 100;

/// Recipe plus selection at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HistoryEntry {
    pub(crate) recipe: EditRecipe,
    pub(crate) selected: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    Closed,
    /// Open, nothing recorded yet
    Open,
    /// Open, the pre-drag state is already recorded
    Recorded,
}

#[derive(Debug)]
pub(crate) struct RecipeHistory {
    /// Oldest first
    past: VecDeque<HistoryEntry>,
    /// Most recently undone last
    future: Vec<HistoryEntry>,
    limit: usize,
    group: Group,
}

impl Default for RecipeHistory {
    fn default() -> Self {
        Self::new(HISTORY_LIMIT)
    }
}

impl RecipeHistory {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            past: VecDeque::new(),
            future: Vec::new(),
            limit: limit.max(1),
            group: Group::Closed,
        }
    }

    /// Remember `before`, the state a mutation is about to replace.
    pub(crate) fn record(&mut self, before: HistoryEntry) {
        match self.group {
            Group::Recorded => return,
            Group::Open => self.group = Group::Recorded,
            Group::Closed => {}
        }
        self.future.clear();
        self.push_past(before);
    }

    pub(crate) fn begin_group(&mut self) {
        self.group = Group::Open;
    }

    pub(crate) fn end_group(&mut self) {
        self.group = Group::Closed;
    }

    pub(crate) fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub(crate) fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Step back from `current`. Closes any open group.
    pub(crate) fn undo(&mut self, current: HistoryEntry) -> Option<HistoryEntry> {
        let previous = self.past.pop_back()?;
        self.group = Group::Closed;
        self.future.push(current);
        Some(previous)
    }

    pub(crate) fn redo(&mut self, current: HistoryEntry) -> Option<HistoryEntry> {
        let next = self.future.pop()?;
        self.group = Group::Closed;
        self.push_past(current);
        Some(next)
    }

    /// Forget everything, e.g. when another asset's recipe is installed.
    pub(crate) fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
        self.group = Group::Closed;
    }

    fn push_past(&mut self, entry: HistoryEntry) {
        self.past.push_back(entry);
        while self.past.len() > self.limit {
            self.past.pop_front();
        }
    }
}
