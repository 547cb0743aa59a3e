//! The provider's set of selected row indices.

use std::collections::BTreeSet;

use lineup_core::Signal;
use lineup_core::logging::targets;
use parking_lot::Mutex;

/// A set of selected row indices with change notification.
///
/// Every mutation that changes the set emits [`selection_changed`](Self::selection_changed)
/// once with the new selection in ascending order. Mutations that leave the
/// set unchanged are silent. The set lock is released before slots run, so
/// a slot may read or change the selection again.
#[derive(Debug, Default)]
pub struct SelectionModel {
    selected: Mutex<BTreeSet<usize>>,
    /// Emitted with the sorted selection after each change.
    pub selection_changed: Signal<Vec<usize>>,
}

impl SelectionModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.lock().contains(&index)
    }

    /// The selected indices in ascending order.
    pub fn selection(&self) -> Vec<usize> {
        self.selected.lock().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.selected.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.lock().is_empty()
    }

    pub fn select(&self, index: usize) {
        self.update(|set| set.insert(index));
    }

    /// Add all `indices` to the selection.
    pub fn select_all(&self, indices: &[usize]) {
        self.update(|set| {
            let before = set.len();
            set.extend(indices.iter().copied());
            set.len() != before
        });
    }

    /// Replace the selection with `indices`.
    pub fn set_selection(&self, indices: &[usize]) {
        let next: BTreeSet<usize> = indices.iter().copied().collect();
        self.update(|set| {
            if *set == next {
                return false;
            }
            *set = next;
            true
        });
    }

    /// Toggle a row and return its new state.
    ///
    /// Without `additional` the row becomes the only selected one, or the
    /// whole selection is cleared if it was selected.
    pub fn toggle(&self, index: usize, additional: bool) -> bool {
        if self.is_selected(index) {
            if additional {
                self.deselect(index);
            } else {
                self.clear();
            }
            false
        } else {
            if additional {
                self.select(index);
            } else {
                self.set_selection(&[index]);
            }
            true
        }
    }

    pub fn deselect(&self, index: usize) {
        self.update(|set| set.remove(&index));
    }

    pub fn clear(&self) {
        self.update(|set| {
            let changed = !set.is_empty();
            set.clear();
            changed
        });
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeSet<usize>) -> bool) {
        let snapshot = {
            let mut set = self.selected.lock();
            if !apply(&mut set) {
                return;
            }
            set.iter().copied().collect::<Vec<_>>()
        };
        tracing::trace!(target: targets::SELECTION, selected = snapshot.len(), "selection changed");
        self.selection_changed.emit(snapshot);
    }
}
