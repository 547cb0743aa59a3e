//! Rankings: an ordered list of top-level columns, sort criteria and the current order.

use std::cmp::Ordering;

use lineup_core::logging::{span_names, targets};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::desc::{ColumnDesc, Row};
use super::events::{EventDetail, EventKind};
use super::kinds::ColumnKind;
use super::registry::{ColumnNode, ColumnRegistry};
use super::{ColumnId, FLAT_ALL_COLUMNS, NodeRef, RankingId};
use crate::error::ModelResult;

/// A ranking stored in a [`ColumnRegistry`].
#[derive(Debug, Clone, PartialEq)]
pub struct RankingNode {
    pub(crate) id: String,
    pub(crate) columns: Vec<ColumnId>,
    pub(crate) sort_column: Option<ColumnId>,
    pub(crate) ascending: bool,
    pub(crate) order: Vec<usize>,
    /// Last sort ticket handed out.
    pub(crate) generation: u64,
    /// Ticket of the last order applied.
    pub(crate) applied: u64,
}

impl RankingNode {
    pub(crate) fn new(id: String) -> Self {
        Self {
            id,
            columns: Vec::new(),
            sort_column: None,
            ascending: false,
            order: Vec::new(),
            generation: 0,
            applied: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn columns(&self) -> &[ColumnId] {
        &self.columns
    }

    /// Row indices in display order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }
}

/// The column a ranking sorts by and the direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortCriteria {
    pub column: Option<ColumnId>,
    pub ascending: bool,
}

/// Proof that a sort was requested; only the latest ticket may apply its order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortTicket {
    pub ranking: RankingId,
    pub generation: u64,
}

/// One entry of a flattened layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatColumn {
    pub column: ColumnId,
    pub offset: f64,
    pub width: f64,
}

/// Serializable sort criteria sent to a remote backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortingDesc {
    pub id: SortingId,
    pub asc: bool,
}

/// The sort key: a column id, or weighted column ids for stacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortingId {
    Column(Value),
    Weighted(Vec<WeightedSortingId>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedSortingId {
    pub weight: f64,
    pub id: SortingId,
}

const ORDER_EVENTS: [EventKind; 3] = [
    EventKind::DirtyOrder,
    EventKind::DirtyValues,
    EventKind::Dirty,
];

impl ColumnRegistry {
    /// Insert a top-level column at `index`.
    ///
    /// The first non-support column of an unsorted ranking becomes its sort
    /// column: ascending for string-like kinds, descending otherwise.
    pub fn insert(&mut self, ranking: RankingId, col: ColumnId, index: usize) -> ModelResult<ColumnId> {
        self.check_attach(ranking.into(), col)?;
        self.attach(ranking.into(), col, index)?;
        let node = self.column(col)?;
        if self.ranking(ranking)?.sort_column.is_none() && !node.desc.is_support() {
            let ascending = node.kind.is_string_like();
            self.sort_by(ranking, Some(col), ascending)?;
        }
        Ok(col)
    }

    pub fn push(&mut self, ranking: RankingId, col: ColumnId) -> ModelResult<ColumnId> {
        let len = self.ranking(ranking)?.columns.len();
        self.insert(ranking, col, len)
    }

    /// Insert right after `reference`; `None` if `reference` is not a top-level column.
    pub fn insert_after(
        &mut self,
        ranking: RankingId,
        col: ColumnId,
        reference: ColumnId,
    ) -> ModelResult<Option<ColumnId>> {
        match self.ranking(ranking)?.columns.iter().position(|&c| c == reference) {
            Some(index) => self.insert(ranking, col, index + 1).map(Some),
            None => Ok(None),
        }
    }

    pub fn index_of(&self, ranking: RankingId, col: ColumnId) -> ModelResult<Option<usize>> {
        Ok(self.ranking(ranking)?.columns.iter().position(|&c| c == col))
    }

    pub fn at(&self, ranking: RankingId, index: usize) -> ModelResult<Option<ColumnId>> {
        Ok(self.ranking(ranking)?.columns.get(index).copied())
    }

    /// Remove a top-level column; `false` if it is not part of the ranking.
    ///
    /// Removing the sort column (or its ancestor) falls back to the first
    /// remaining non-support column, descending.
    pub fn remove(&mut self, ranking: RankingId, col: ColumnId) -> ModelResult<bool> {
        let node = self.ranking(ranking)?;
        if !node.columns.contains(&col) {
            return Ok(false);
        }
        if self.sorts_within(ranking, col)? {
            self.fall_back_sorting(ranking, Some(col))?;
        }
        Ok(self.detach(ranking.into(), col)?.is_some())
    }

    /// Whether the sort column of `ranking` is `col` or lies below it.
    pub(crate) fn sorts_within(&self, ranking: RankingId, col: ColumnId) -> ModelResult<bool> {
        Ok(self
            .ranking(ranking)?
            .sort_column
            .is_some_and(|sort| self.is_ancestor_or_self(col, sort.into())))
    }

    /// Sort descending by the first top-level non-support column other than `skip`.
    pub(crate) fn fall_back_sorting(
        &mut self,
        ranking: RankingId,
        skip: Option<ColumnId>,
    ) -> ModelResult<()> {
        let next = self.ranking(ranking)?.columns.iter().copied().find(|&c| {
            Some(c) != skip && self.columns.get(c).is_some_and(|n| !n.desc.is_support())
        });
        self.sort_by(ranking, next, false)?;
        Ok(())
    }

    /// Remove every column and reset the sort criteria.
    pub fn clear(&mut self, ranking: RankingId) -> ModelResult<()> {
        let node = self.ranking_mut(ranking)?;
        if node.columns.is_empty() {
            return Ok(());
        }
        node.sort_column = None;
        let columns = std::mem::take(&mut node.columns);
        for col in columns {
            if let Some(child) = self.columns.get_mut(col) {
                child.parent = None;
            }
        }
        self.fire(
            ranking.into(),
            &[
                EventKind::RemoveColumn,
                EventKind::DirtyHeader,
                EventKind::DirtyValues,
                EventKind::Dirty,
            ],
            EventDetail::None,
        );
        Ok(())
    }

    pub fn sort_criteria(&self, ranking: RankingId) -> ModelResult<SortCriteria> {
        let node = self.ranking(ranking)?;
        Ok(SortCriteria {
            column: node.sort_column,
            ascending: node.ascending,
        })
    }

    /// Sort by `col`, or by nothing.
    ///
    /// Returns `false` when `col` belongs to another ranking.
    pub fn sort_by(
        &mut self,
        ranking: RankingId,
        col: Option<ColumnId>,
        ascending: bool,
    ) -> ModelResult<bool> {
        if let Some(col) = col
            && self.find_my_ranker(col) != Some(ranking)
        {
            return Ok(false);
        }
        let node = self.ranking_mut(ranking)?;
        if node.sort_column == col && node.ascending == ascending {
            return Ok(true);
        }
        node.sort_column = col;
        node.ascending = ascending;
        tracing::debug!(target: targets::RANKING, ranking = %node.id, ?col, ascending, "sort criteria changed");
        self.fire(
            ranking.into(),
            &[
                EventKind::SortCriteriaChanged,
                EventKind::DirtyOrder,
                EventKind::DirtyHeader,
                EventKind::DirtyValues,
                EventKind::Dirty,
            ],
            EventDetail::SortCriteria {
                column: col,
                ascending,
            },
        );
        Ok(true)
    }

    /// Flip the direction when `col` already sorts the ranking, otherwise sort by it descending.
    pub fn toggle_sorting(&mut self, ranking: RankingId, col: ColumnId) -> ModelResult<bool> {
        let node = self.ranking(ranking)?;
        if node.sort_column == Some(col) {
            let ascending = !node.ascending;
            return self.sort_by(ranking, Some(col), ascending);
        }
        self.sort_by(ranking, Some(col), false)
    }

    /// Compare two rows by the ranking's sort criteria.
    pub fn compare_rows(&self, ranking: RankingId, a: &Row, b: &Row) -> ModelResult<Ordering> {
        let node = self.ranking(ranking)?;
        let Some(sort) = node.sort_column.and_then(|c| self.columns.get(c)) else {
            return Ok(Ordering::Equal);
        };
        let r = self.compare_of(sort, a, b);
        Ok(if node.ascending { r } else { r.reverse() })
    }

    /// Whether a row passes the filters of every column.
    pub fn ranking_filter(&self, ranking: RankingId, row: &Row) -> ModelResult<bool> {
        Ok(self
            .top_level(ranking)?
            .all(|node| self.filter_of(node, row)))
    }

    pub fn ranking_is_filtered(&self, ranking: RankingId) -> ModelResult<bool> {
        Ok(self.top_level(ranking)?.any(|node| self.is_filtered_of(node)))
    }

    fn top_level(&self, ranking: RankingId) -> ModelResult<impl Iterator<Item = &ColumnNode>> {
        Ok(self
            .ranking(ranking)?
            .columns
            .iter()
            .filter_map(|&c| self.columns.get(c)))
    }

    /// Ask for the ranking to be re-sorted.
    pub fn dirty_order(&self, ranking: RankingId) {
        self.fire(ranking.into(), &ORDER_EVENTS, EventDetail::None);
    }

    pub fn order(&self, ranking: RankingId) -> ModelResult<&[usize]> {
        Ok(&self.ranking(ranking)?.order)
    }

    /// Replace the order unconditionally.
    pub fn set_order(&mut self, ranking: RankingId, order: Vec<usize>) -> ModelResult<()> {
        let len = order.len();
        self.ranking_mut(ranking)?.order = order;
        self.fire(
            ranking.into(),
            &[EventKind::OrderChanged, EventKind::DirtyValues, EventKind::Dirty],
            EventDetail::Order(len),
        );
        Ok(())
    }

    /// Start a sort and get the ticket its result must be applied with.
    pub fn begin_sort(&mut self, ranking: RankingId) -> ModelResult<SortTicket> {
        let node = self.ranking_mut(ranking)?;
        node.generation += 1;
        Ok(SortTicket {
            ranking,
            generation: node.generation,
        })
    }

    /// Apply the result of a sort unless a newer one was applied already.
    pub fn apply_order(&mut self, ticket: SortTicket, order: Vec<usize>) -> ModelResult<bool> {
        let _span = tracing::debug_span!(span_names::APPLY_ORDER, generation = ticket.generation).entered();
        let node = self.ranking_mut(ticket.ranking)?;
        if ticket.generation <= node.applied {
            tracing::debug!(
                target: targets::RANKING,
                ranking = %node.id,
                stale = ticket.generation,
                applied = node.applied,
                "dropped stale order"
            );
            return Ok(false);
        }
        node.applied = ticket.generation;
        self.set_order(ticket.ranking, order)?;
        Ok(true)
    }

    /// Lay out the ranking's columns from `offset`; returns the total width.
    pub fn flatten_ranking(
        &self,
        ranking: RankingId,
        out: &mut Vec<FlatColumn>,
        offset: f64,
        levels: i32,
        padding: f64,
    ) -> ModelResult<f64> {
        let mut acc = offset;
        if levels > 0 || levels <= FLAT_ALL_COLUMNS {
            for &col in &self.ranking(ranking)?.columns {
                let hidden = self.column(col)?.is_hidden();
                if !hidden || levels <= FLAT_ALL_COLUMNS {
                    acc += self.flatten(col, out, acc, levels - 1, padding)? + padding;
                }
            }
        }
        Ok(acc - offset)
    }

    /// Every column of the ranking, depth first, composites before their children.
    pub fn flat_columns(&self, ranking: RankingId) -> ModelResult<Vec<ColumnId>> {
        let mut out = Vec::new();
        self.flatten_ranking(ranking, &mut out, 0.0, FLAT_ALL_COLUMNS, 0.0)?;
        Ok(out.into_iter().map(|f| f.column).collect())
    }

    /// The first column of the ranking, in flat order, matching `pred`.
    pub fn find(
        &self,
        ranking: RankingId,
        pred: impl Fn(&ColumnNode) -> bool,
    ) -> ModelResult<Option<ColumnId>> {
        Ok(self
            .flat_columns(ranking)?
            .into_iter()
            .find(|&c| self.columns.get(c).is_some_and(&pred)))
    }

    pub fn find_by_id(&self, ranking: RankingId, id: &str) -> ModelResult<Option<ColumnId>> {
        self.find(ranking, |node| node.id == id)
    }

    /// Resolve an `@i@j` path as produced by [`fqpath`](Self::fqpath).
    pub fn find_by_path(&self, ranking: RankingId, path: &str) -> ModelResult<Option<ColumnId>> {
        let mut siblings = self.ranking(ranking)?.columns.as_slice();
        let mut found = None;
        for part in path.split('@').skip(1) {
            let Ok(index) = part.parse::<usize>() else {
                return Ok(None);
            };
            let Some(&col) = siblings.get(index) else {
                return Ok(None);
            };
            found = Some(col);
            siblings = self.column(col)?.children.as_slice();
        }
        Ok(found)
    }

    /// The sort criteria as sent to a remote backend.
    ///
    /// A stack becomes its weighted children; everything else goes through `to_id`.
    pub fn to_sorting_desc(
        &self,
        ranking: RankingId,
        to_id: &dyn Fn(&ColumnDesc) -> Value,
    ) -> ModelResult<Option<SortingDesc>> {
        let node = self.ranking(ranking)?;
        let Some(col) = node.sort_column else {
            return Ok(None);
        };
        Ok(Some(SortingDesc {
            id: self.sorting_id(col, to_id)?,
            asc: node.ascending,
        }))
    }

    fn sorting_id(&self, col: ColumnId, to_id: &dyn Fn(&ColumnDesc) -> Value) -> ModelResult<SortingId> {
        let node = self.column(col)?;
        if !matches!(node.kind, ColumnKind::Stack(_)) {
            return Ok(SortingId::Column(to_id(&node.desc)));
        }
        let weights = self.weights(col)?;
        node.children
            .iter()
            .zip(weights)
            .map(|(&child, weight)| {
                Ok(WeightedSortingId {
                    weight,
                    id: self.sorting_id(child, to_id)?,
                })
            })
            .collect::<ModelResult<Vec<_>>>()
            .map(SortingId::Weighted)
    }

    /// Whether `node` is or belongs to `ranking`.
    pub fn belongs_to(&self, node: impl Into<NodeRef>, ranking: RankingId) -> bool {
        self.find_my_ranker(node) == Some(ranking)
    }
}
