//! Children of composite columns: insertion, removal, weights and flattening.

use super::events::{EventDetail, EventKind};
use super::kinds::ColumnKind;
use super::ranking::FlatColumn;
use super::registry::ColumnRegistry;
use super::{ColumnId, DEFAULT_WIDTH, FLAT_ALL_COLUMNS, NodeRef};
use crate::error::{ModelError, ModelResult};

const STRUCTURE_EVENTS_ADD: [EventKind; 4] = [
    EventKind::AddColumn,
    EventKind::DirtyHeader,
    EventKind::DirtyValues,
    EventKind::Dirty,
];

const STRUCTURE_EVENTS_REMOVE: [EventKind; 4] = [
    EventKind::RemoveColumn,
    EventKind::DirtyHeader,
    EventKind::DirtyValues,
    EventKind::Dirty,
];

const WEIGHT_EVENTS: [EventKind; 4] = [
    EventKind::WeightsChanged,
    EventKind::DirtyHeader,
    EventKind::DirtyValues,
    EventKind::Dirty,
];

impl ColumnRegistry {
    /// Children of a column; empty for non-composite kinds.
    pub fn children(&self, col: ColumnId) -> ModelResult<&[ColumnId]> {
        Ok(&self.column(col)?.children)
    }

    pub fn child_count(&self, col: ColumnId) -> ModelResult<usize> {
        Ok(self.column(col)?.children.len())
    }

    pub fn child_at(&self, col: ColumnId, index: usize) -> ModelResult<Option<ColumnId>> {
        Ok(self.column(col)?.children.get(index).copied())
    }

    pub fn child_index(&self, parent: ColumnId, child: ColumnId) -> ModelResult<Option<usize>> {
        Ok(self.column(parent)?.children.iter().position(|&c| c == child))
    }

    /// Check that `col` may become a child of `parent`.
    pub(crate) fn check_attach(&self, parent: NodeRef, col: ColumnId) -> ModelResult<()> {
        let node = self.column(col)?;
        if node.parent.is_some() {
            return Err(ModelError::AlreadyAttached(node.id.clone()));
        }
        match parent {
            NodeRef::Ranking(ranking) => {
                self.ranking(ranking)?;
            }
            NodeRef::Column(parent_col) => {
                let parent_node = self.column(parent_col)?;
                if !parent_node.kind.is_composite() {
                    return Err(ModelError::NotComposite(parent_node.id.clone()));
                }
                if self.is_ancestor_or_self(col, parent) {
                    return Err(ModelError::CircularParentage(node.id.clone()));
                }
            }
        }
        Ok(())
    }

    /// Link `col` under `parent` at `index` and fire the add events on the parent.
    pub(crate) fn attach(&mut self, parent: NodeRef, col: ColumnId, index: usize) -> ModelResult<usize> {
        let siblings = match parent {
            NodeRef::Ranking(ranking) => &mut self.ranking_mut(ranking)?.columns,
            NodeRef::Column(parent_col) => &mut self.column_mut(parent_col)?.children,
        };
        let index = index.min(siblings.len());
        siblings.insert(index, col);
        self.column_mut(col)?.parent = Some(parent);
        self.fire(parent, &STRUCTURE_EVENTS_ADD, EventDetail::Child { column: col, index });
        Ok(index)
    }

    /// Unlink `col` from `parent` and fire the remove events on the parent.
    pub(crate) fn detach(&mut self, parent: NodeRef, col: ColumnId) -> ModelResult<Option<usize>> {
        let siblings = match parent {
            NodeRef::Ranking(ranking) => &mut self.ranking_mut(ranking)?.columns,
            NodeRef::Column(parent_col) => &mut self.column_mut(parent_col)?.children,
        };
        let Some(index) = siblings.iter().position(|&c| c == col) else {
            return Ok(None);
        };
        siblings.remove(index);
        self.column_mut(col)?.parent = None;
        self.fire(parent, &STRUCTURE_EVENTS_REMOVE, EventDetail::Child { column: col, index });
        Ok(Some(index))
    }

    /// Insert a child into a composite column.
    ///
    /// Returns `None` when a composite number column rejects a non-number child.
    pub fn insert_child(
        &mut self,
        parent: ColumnId,
        col: ColumnId,
        index: usize,
    ) -> ModelResult<Option<ColumnId>> {
        self.insert_weighted(parent, col, index, None)
    }

    /// Insert a child into a stack so that it ends up with the given weight.
    ///
    /// The weight is ignored for other composite kinds and outside `(0, 1)`.
    pub fn insert_weighted(
        &mut self,
        parent: ColumnId,
        col: ColumnId,
        index: usize,
        weight: Option<f64>,
    ) -> ModelResult<Option<ColumnId>> {
        self.check_attach(parent.into(), col)?;
        let parent_node = self.column(parent)?;
        if parent_node.kind.composite_number().is_some() && !self.column(col)?.kind.is_number() {
            tracing::debug!(
                target: lineup_core::logging::targets::COLUMN,
                parent = %parent_node.id,
                "rejected non-number child"
            );
            return Ok(None);
        }

        if matches!(parent_node.kind, ColumnKind::Stack(_) | ColumnKind::Nested(_)) {
            let was_empty = parent_node.children.is_empty();
            let parent_width = parent_node.width;
            if let Some(w) = weight.filter(|w| *w > 0.0 && *w < 1.0)
                && matches!(parent_node.kind, ColumnKind::Stack(_))
            {
                self.set_width(col, w / (1.0 - w) * parent_width)?;
            }
            let child_width = self.column(col)?.width;
            let width = if was_empty {
                child_width
            } else {
                parent_width + child_width
            };
            self.apply_width(parent, width)?;
        }

        self.attach(parent.into(), col, index)?;
        Ok(Some(col))
    }

    pub fn push_child(&mut self, parent: ColumnId, col: ColumnId) -> ModelResult<Option<ColumnId>> {
        let len = self.column(parent)?.children.len();
        self.insert_child(parent, col, len)
    }

    /// Push several children; returns how many were accepted.
    pub fn push_all(&mut self, parent: ColumnId, cols: &[ColumnId]) -> ModelResult<usize> {
        let mut accepted = 0;
        for &col in cols {
            if self.push_child(parent, col)?.is_some() {
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    pub fn push_weighted(
        &mut self,
        parent: ColumnId,
        col: ColumnId,
        weight: f64,
    ) -> ModelResult<Option<ColumnId>> {
        let len = self.column(parent)?.children.len();
        self.insert_weighted(parent, col, len, Some(weight))
    }

    /// Insert `col` right after `reference`; `None` if `reference` is not a child.
    pub fn insert_child_after(
        &mut self,
        parent: ColumnId,
        col: ColumnId,
        reference: ColumnId,
    ) -> ModelResult<Option<ColumnId>> {
        match self.child_index(parent, reference)? {
            Some(index) => self.insert_child(parent, col, index + 1),
            None => Ok(None),
        }
    }

    /// Remove a child; `false` if it is not a child of `parent`.
    ///
    /// Detaching the ranking's sort column falls back like [`ColumnRegistry::remove`].
    pub fn remove_child(&mut self, parent: ColumnId, col: ColumnId) -> ModelResult<bool> {
        let parent_node = self.column(parent)?;
        let Some(index) = parent_node.children.iter().position(|&c| c == col) else {
            return Ok(false);
        };
        let resize = matches!(parent_node.kind, ColumnKind::Stack(_) | ColumnKind::Nested(_));
        let remaining = parent_node.children.len() - 1;
        let parent_width = parent_node.width;
        let child_width = self.column(col)?.width;
        let sorted_ranking = match self.find_my_ranker(parent) {
            Some(ranking) if self.sorts_within(ranking, col)? => Some(ranking),
            _ => None,
        };

        self.column_mut(parent)?.children.remove(index);
        self.column_mut(col)?.parent = None;
        if resize {
            let width = if remaining == 0 {
                DEFAULT_WIDTH
            } else {
                parent_width - child_width
            };
            self.apply_width(parent, width)?;
        }
        self.fire(
            parent.into(),
            &STRUCTURE_EVENTS_REMOVE,
            EventDetail::Child { column: col, index },
        );
        if let Some(ranking) = sorted_ranking {
            self.fall_back_sorting(ranking, None)?;
        }
        Ok(true)
    }

    /// Child widths relative to the stack width.
    pub fn weights(&self, stack: ColumnId) -> ModelResult<Vec<f64>> {
        let node = self.column(stack)?;
        let width = node.width;
        Ok(node
            .children
            .iter()
            .filter_map(|&c| self.columns.get(c))
            .map(|c| if width > 0.0 { c.width / width } else { 0.0 })
            .collect())
    }

    /// Distribute the stack width over the children by the given weights.
    ///
    /// Missing trailing weights share the remainder up to `1` (fractions) or
    /// `100` (percentages); extra weights are dropped.
    pub fn set_weights(&mut self, stack: ColumnId, weights: &[f64]) -> ModelResult<()> {
        let node = self.column(stack)?;
        if !matches!(node.kind, ColumnKind::Stack(_)) || node.children.is_empty() {
            return Ok(());
        }
        let len = node.children.len();
        let width = node.width;
        let children = node.children.clone();

        let mut weights = weights.to_vec();
        if weights.len() < len {
            let missing = len - weights.len();
            let sum: f64 = weights.iter().sum();
            let remainder = if sum <= 1.0 {
                1.0 - sum
            } else if sum <= 100.0 {
                100.0 - sum
            } else {
                0.0
            };
            weights.extend(std::iter::repeat_n(remainder / missing as f64, missing));
        }
        weights.truncate(len);
        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 || !sum.is_finite() {
            return Ok(());
        }

        let before = self.weights(stack)?;
        let scale = sum / width;
        for (child, weight) in children.iter().zip(&weights) {
            self.set_width_silently(*child, weight / scale)?;
        }
        let after = self.weights(stack)?;
        self.fire(
            stack.into(),
            &WEIGHT_EVENTS,
            EventDetail::Weights {
                old: before,
                new: after,
            },
        );
        Ok(())
    }

    pub fn is_collapsed(&self, col: ColumnId) -> ModelResult<bool> {
        Ok(match &self.column(col)?.kind {
            ColumnKind::Stack(stack) => stack.collapsed,
            ColumnKind::Nested(nested) => nested.collapsed,
            _ => false,
        })
    }

    /// Collapse a stack or nested column; `false` for other kinds.
    pub fn set_collapsed(&mut self, col: ColumnId, collapsed: bool) -> ModelResult<bool> {
        let flag = match &mut self.column_mut(col)?.kind {
            ColumnKind::Stack(stack) => &mut stack.collapsed,
            ColumnKind::Nested(nested) => &mut nested.collapsed,
            _ => return Ok(false),
        };
        if *flag == collapsed {
            return Ok(true);
        }
        *flag = collapsed;
        self.fire(
            col.into(),
            &[
                EventKind::CollapseChanged,
                EventKind::DirtyHeader,
                EventKind::DirtyValues,
                EventKind::Dirty,
            ],
            EventDetail::Collapsed(collapsed),
        );
        Ok(true)
    }

    /// Lay out a column and, depending on `levels`, its descendants.
    ///
    /// `levels == 0` emits only the column; [`FLAT_ALL_COLUMNS`] recurses
    /// into every descendant including hidden ones. Returns the width used.
    pub fn flatten(
        &self,
        col: ColumnId,
        out: &mut Vec<FlatColumn>,
        offset: f64,
        levels: i32,
        padding: f64,
    ) -> ModelResult<f64> {
        let node = self.column(col)?;
        let width = node.actual_width();
        let emit_self = levels == 0 || levels <= FLAT_ALL_COLUMNS;
        let children: Vec<ColumnId> = node
            .children
            .iter()
            .copied()
            .filter(|&c| {
                levels <= FLAT_ALL_COLUMNS || self.columns.get(c).is_some_and(|n| !n.is_hidden())
            })
            .collect();

        match node.kind {
            ColumnKind::Stack(_) | ColumnKind::Nested(_) => {
                let collapsed = self.is_collapsed(col)?;
                let mut own = None;
                if emit_self {
                    let mut w = width;
                    if !collapsed && !node.compressed && !children.is_empty() {
                        w += (children.len() - 1) as f64 * padding;
                    }
                    own = Some(out.len());
                    out.push(FlatColumn {
                        column: col,
                        offset,
                        width: w,
                    });
                    if levels == 0 || children.is_empty() {
                        return Ok(w);
                    }
                }
                let mut acc = offset;
                for child in children {
                    acc += self.flatten(child, out, acc, levels - 1, padding)? + padding;
                }
                let used = acc - offset - padding;
                if let Some(index) = own {
                    out[index].width = used;
                }
                Ok(used)
            }
            _ if node.kind.is_composite() => {
                if emit_self {
                    out.push(FlatColumn {
                        column: col,
                        offset,
                        width,
                    });
                    if levels == 0 {
                        return Ok(width);
                    }
                }
                for child in children {
                    self.flatten(child, out, offset, levels - 1, padding)?;
                }
                Ok(width)
            }
            _ => {
                out.push(FlatColumn {
                    column: col,
                    offset,
                    width,
                });
                Ok(width)
            }
        }
    }
}
