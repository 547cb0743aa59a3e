//! Data providers: the owners of rankings, descriptors and the selection.
//!
//! A provider keeps every column and ranking in one [`ColumnRegistry`],
//! creates columns from descriptors through its [`ColumnTypes`], and turns
//! dirty rankings into new orders. Dirty-order events are coalesced per
//! ranking with a [`Debouncer`]; [`DataProvider::process_reorders`] (or the
//! tokio driver [`DataProvider::run_pending_reorders`]) then sorts each quiet
//! ranking and applies the result through a [`SortTicket`], so a late sort
//! never overwrites a newer one.
//!
//! Slow operations return a [`Deferred`] value. [`LocalDataProvider`]
//! resolves them immediately, [`RemoteDataProvider`] forwards to a
//! [`RemoteBackend`].

mod config;
mod local;
mod remote;
mod selection;
mod stats;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use lineup_core::logging::{span_names, targets};
use lineup_core::{Debouncer, OwnerTag, Signal};
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use static_assertions::assert_impl_all;
use tracing::Instrument;

use crate::error::{ProviderError, ProviderResult};
use crate::model::{
    AccessContext, Accessor, ColumnDesc, ColumnDump, ColumnId, ColumnKind, ColumnRegistry,
    ColumnTypes, EventKind, RankingDump, RankingId, Row, SortTicket,
};

pub use config::{ExportFilter, ExportOptions, ProviderOptions};
pub use local::{LocalDataProvider, RankCache};
pub use remote::{RemoteBackend, RemoteDataProvider};
pub use selection::SelectionModel;
pub use stats::{
    Bin, CategoricalStatistics, CategoryCount, Statistics, compute_hist, compute_stats,
    compute_stats_with_bins, number_of_bins,
};

/// A value that resolves later, possibly on another task.
pub type Deferred<T> = BoxFuture<'static, ProviderResult<T>>;

fn not_implemented<T: Send + 'static>(operation: &'static str) -> Deferred<T> {
    future::ready(Err(ProviderError::NotImplemented(operation))).boxed()
}

/// What [`DataProvider::search_select`] looks for in the cell labels.
#[derive(Debug, Clone)]
pub enum SearchPattern {
    /// Case-insensitive substring.
    Text(String),
    Regex(Regex),
}

impl SearchPattern {
    pub fn matches(&self, label: &str) -> bool {
        match self {
            SearchPattern::Text(text) => label.to_lowercase().contains(&text.to_lowercase()),
            SearchPattern::Regex(regex) => regex.is_match(label),
        }
    }
}

impl From<&str> for SearchPattern {
    fn from(text: &str) -> Self {
        SearchPattern::Text(text.to_string())
    }
}

impl From<Regex> for SearchPattern {
    fn from(regex: Regex) -> Self {
        SearchPattern::Regex(regex)
    }
}

/// The dumped state of a whole provider.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProviderDump {
    #[serde(default)]
    pub uid: usize,
    #[serde(default)]
    pub selection: Vec<usize>,
    #[serde(default)]
    pub rankings: Vec<RankingDump>,
}

/// Rankings waiting for a re-sort.
#[derive(Debug)]
struct ReorderQueue {
    debouncer: Debouncer<RankingId>,
    rankings: Vec<RankingId>,
}

/// Known descriptors and how to turn them into columns.
struct DescCatalog {
    column_types: ColumnTypes,
    descs: Vec<Arc<ColumnDesc>>,
    rank_desc: Arc<ColumnDesc>,
    selection_desc: Arc<ColumnDesc>,
}

impl DescCatalog {
    /// Attach the provider-bound accessors to support descriptors.
    fn fix(&self, desc: Arc<ColumnDesc>) -> Arc<ColumnDesc> {
        let support = match desc.type_name.as_str() {
            "rank" => &self.rank_desc,
            "selection" => &self.selection_desc,
            _ => return desc,
        };
        if desc.accessor.is_some() {
            return desc;
        }
        let mut fixed = (*desc).clone();
        fixed.accessor = support.accessor.clone();
        fixed.setter = support.setter.clone();
        Arc::new(fixed)
    }

    fn to_desc_ref(desc: &ColumnDesc) -> Value {
        if desc.is_support() {
            return Value::String(desc.type_name.clone());
        }
        match &desc.column {
            Some(column) => Value::String(format!("{}@{column}", desc.type_name)),
            None => serde_json::to_value(desc).unwrap_or(Value::Null),
        }
    }

    fn from_desc_ref(&self, desc_ref: &Value) -> Option<Arc<ColumnDesc>> {
        match desc_ref {
            Value::String(reference) => match reference.as_str() {
                "rank" => Some(self.rank_desc.clone()),
                "selection" => Some(self.selection_desc.clone()),
                "actions" => Some(Arc::new(ColumnDesc::new("actions"))),
                _ => self
                    .descs
                    .iter()
                    .find(|desc| {
                        desc.column
                            .as_ref()
                            .is_some_and(|c| format!("{}@{c}", desc.type_name) == *reference)
                    })
                    .cloned(),
            },
            Value::Object(_) => serde_json::from_value::<ColumnDesc>(desc_ref.clone())
                .map(Arc::new)
                .map_err(|err| {
                    tracing::warn!(target: targets::PROVIDER, %err, "malformed column descriptor");
                })
                .ok(),
            _ => None,
        }
    }

    fn instantiate(
        &self,
        registry: &mut ColumnRegistry,
        id: &str,
        desc: Arc<ColumnDesc>,
    ) -> Option<ColumnId> {
        let desc = self.fix(desc);
        let Some(kind) = self.column_types.create(&desc) else {
            tracing::warn!(target: targets::PROVIDER, type_name = %desc.type_name, "unknown column type");
            return None;
        };
        Some(registry.create_column_with_kind(id, desc, kind))
    }
}

fn label_desc(mut desc: ColumnDesc) -> ColumnDesc {
    if desc.label.is_none() {
        desc.label = desc.column.clone();
    }
    desc
}

/// State shared by every provider implementation.
pub struct ProviderCore {
    registry: ColumnRegistry,
    rankings: Vec<RankingId>,
    selection: Arc<SelectionModel>,
    catalog: DescCatalog,
    uid: usize,
    ranking_index: usize,
    options: ProviderOptions,
    reorders: Arc<Mutex<ReorderQueue>>,
    owners: HashMap<RankingId, OwnerTag>,
    /// Emitted with the ranking and its position after it was inserted.
    pub add_ranking: Signal<(RankingId, usize)>,
    /// Emitted after a ranking was removed; `None` when all were cleared.
    pub remove_ranking: Signal<Option<RankingId>>,
    /// Emitted after a descriptor was added.
    pub add_desc: Signal<Arc<ColumnDesc>>,
}

assert_impl_all!(ProviderCore: Send, Sync);

impl std::fmt::Debug for ProviderCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCore")
            .field("registry", &self.registry)
            .field("rankings", &self.rankings)
            .field("descs", &self.catalog.descs.len())
            .field("uid", &self.uid)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ProviderCore {
    /// Create the shared state; `rank_accessor` reads a row's rank in a ranking.
    pub fn new(descs: Vec<ColumnDesc>, options: ProviderOptions, rank_accessor: Accessor) -> Self {
        let selection = Arc::new(SelectionModel::new());

        let mut rank_desc = ColumnDesc::new("rank").with_label("Rank");
        rank_desc.accessor = Some(rank_accessor);

        let mut selection_desc = ColumnDesc::new("selection").with_label("Selections");
        let reader = Arc::downgrade(&selection);
        selection_desc.accessor = Some(Arc::new(move |row: &Row, _: &AccessContext<'_>| {
            Value::Bool(reader.upgrade().is_some_and(|s| s.is_selected(row.index)))
        }));
        let writer = Arc::downgrade(&selection);
        selection_desc.setter = Some(Arc::new(move |row: &Row, value: &Value| {
            if let Some(selection) = writer.upgrade() {
                if value.as_bool().unwrap_or(false) {
                    selection.select(row.index);
                } else {
                    selection.deselect(row.index);
                }
            }
        }));

        let reorders = ReorderQueue {
            debouncer: Debouncer::new(options.reorder_delay),
            rankings: Vec::new(),
        };

        Self {
            registry: ColumnRegistry::new(),
            rankings: Vec::new(),
            selection,
            catalog: DescCatalog {
                column_types: ColumnTypes::default(),
                descs: descs.into_iter().map(|d| Arc::new(label_desc(d))).collect(),
                rank_desc: Arc::new(rank_desc),
                selection_desc: Arc::new(selection_desc),
            },
            uid: 0,
            ranking_index: 0,
            options,
            reorders: Arc::new(Mutex::new(reorders)),
            owners: HashMap::new(),
            add_ranking: Signal::new(),
            remove_ranking: Signal::new(),
            add_desc: Signal::new(),
        }
    }

    pub fn registry(&self) -> &ColumnRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ColumnRegistry {
        &mut self.registry
    }

    /// Rankings in display order.
    pub fn rankings(&self) -> &[RankingId] {
        &self.rankings
    }

    pub fn selection(&self) -> &Arc<SelectionModel> {
        &self.selection
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    pub fn column_types(&self) -> &ColumnTypes {
        &self.catalog.column_types
    }

    /// Register custom column kinds here.
    pub fn column_types_mut(&mut self) -> &mut ColumnTypes {
        &mut self.catalog.column_types
    }

    /// The data descriptors, without the support ones.
    pub fn descs(&self) -> &[Arc<ColumnDesc>] {
        &self.catalog.descs
    }

    pub fn rank_desc(&self) -> &Arc<ColumnDesc> {
        &self.catalog.rank_desc
    }

    pub fn selection_desc(&self) -> &Arc<ColumnDesc> {
        &self.catalog.selection_desc
    }

    pub fn uid(&self) -> usize {
        self.uid
    }

    /// Whether `ranking` is one of the provider's rankings.
    pub fn contains(&self, ranking: RankingId) -> bool {
        self.rankings.contains(&ranking)
    }

    pub(crate) fn check_ranking(&self, ranking: RankingId) -> ProviderResult<()> {
        if self.contains(ranking) {
            Ok(())
        } else {
            Err(ProviderError::UnknownRanking(ranking))
        }
    }

    fn next_id(&mut self) -> String {
        let id = format!("col{}", self.uid);
        self.uid += 1;
        id
    }

    fn next_ranking_id(&mut self) -> String {
        let id = format!("rank{}", self.ranking_index);
        self.ranking_index += 1;
        id
    }

    /// Create a detached column with a fresh id; `None` for unknown types.
    pub fn create(&mut self, desc: impl Into<Arc<ColumnDesc>>) -> Option<ColumnId> {
        let id = self.next_id();
        self.catalog.instantiate(&mut self.registry, &id, desc.into())
    }

    pub fn to_desc_ref(&self, desc: &ColumnDesc) -> Value {
        DescCatalog::to_desc_ref(desc)
    }

    pub fn from_desc_ref(&self, desc_ref: &Value) -> Option<Arc<ColumnDesc>> {
        self.catalog.from_desc_ref(desc_ref)
    }

    pub fn dump_column(&self, col: ColumnId) -> ProviderResult<ColumnDump> {
        Ok(self.registry.dump_column(col, &DescCatalog::to_desc_ref)?)
    }

    /// Recreate a detached column from a dump; the subtree gets fresh ids.
    pub fn restore_column(&mut self, dump: &ColumnDump) -> ProviderResult<Option<ColumnId>> {
        let Self {
            registry,
            catalog,
            uid,
            ..
        } = self;
        let mut factory = |registry: &mut ColumnRegistry, dump: &ColumnDump| {
            let desc = catalog.from_desc_ref(&dump.desc)?;
            catalog.instantiate(registry, &dump.id, desc)
        };
        let Some(col) = factory(registry, dump) else {
            return Ok(None);
        };
        registry.restore_column(col, dump, &mut factory)?;
        let mut next_id = || {
            let id = format!("col{uid}");
            *uid += 1;
            id
        };
        registry.assign_new_ids(col, &mut next_id)?;
        Ok(Some(col))
    }

    /// Copy a column by dumping and restoring it.
    pub fn clone_column(&mut self, col: ColumnId) -> ProviderResult<Option<ColumnId>> {
        let dump = self.dump_column(col)?;
        self.restore_column(&dump)
    }

    /// Create a fresh ranking, either with a rank column or as a copy of `existing`.
    pub fn new_ranking(&mut self, existing: Option<RankingId>) -> ProviderResult<RankingId> {
        let id = self.next_ranking_id();
        let ranking = self.registry.create_ranking(&id);
        match existing {
            Some(existing) => {
                let source = self.registry.ranking(existing)?;
                let columns = source.columns().to_vec();
                let sort = self.registry.sort_criteria(existing)?;
                for col in columns {
                    let Some(copy) = self.clone_column(col)? else {
                        continue;
                    };
                    self.registry.push(ranking, copy)?;
                    if sort.column == Some(col) {
                        self.registry.sort_by(ranking, Some(copy), sort.ascending)?;
                    }
                }
                let order = self.registry.order(existing)?.to_vec();
                self.registry.set_order(ranking, order)?;
            }
            None => {
                if let Some(rank) = self.create(self.catalog.rank_desc.clone()) {
                    self.registry.push(ranking, rank)?;
                }
            }
        }
        Ok(ranking)
    }

    /// Make sure the ranking starts with a rank column.
    fn ensure_rank_column(&mut self, ranking: RankingId) -> ProviderResult<()> {
        let has_rank = self.registry.ranking(ranking)?.columns().iter().any(|&c| {
            self.registry
                .column(c)
                .is_ok_and(|node| matches!(node.kind(), ColumnKind::Rank))
        });
        if !has_rank && let Some(rank) = self.create(self.catalog.rank_desc.clone()) {
            self.registry.insert(ranking, rank, 0)?;
        }
        Ok(())
    }

    /// Replace the columns of `ranking` by the dumped ones.
    fn restore_ranking_columns(&mut self, ranking: RankingId, dump: &RankingDump) -> ProviderResult<()> {
        let Self {
            registry, catalog, ..
        } = self;
        let mut factory = |registry: &mut ColumnRegistry, dump: &ColumnDump| {
            let desc = catalog.from_desc_ref(&dump.desc)?;
            catalog.instantiate(registry, &dump.id, desc)
        };
        registry.restore_ranking(ranking, dump, &mut factory)?;
        self.ensure_rank_column(ranking)
    }

    fn assign_new_ids(&mut self, ranking: RankingId) -> ProviderResult<()> {
        let Self { registry, uid, .. } = self;
        let columns = registry.ranking(ranking)?.columns().to_vec();
        let mut next_id = || {
            let id = format!("col{uid}");
            *uid += 1;
            id
        };
        for col in columns {
            registry.assign_new_ids(col, &mut next_id)?;
        }
        Ok(())
    }

    /// Register a ranking and subscribe to its dirty-order events.
    fn attach_ranking(&mut self, ranking: RankingId, index: usize) -> ProviderResult<usize> {
        self.registry.ranking(ranking)?;
        let index = index.min(self.rankings.len());
        self.rankings.insert(index, ranking);

        let owner = OwnerTag::new();
        self.owners.insert(ranking, owner);

        let queue = self.reorders.clone();
        self.registry
            .on_owned(EventKind::DirtyOrder, ranking, owner, move |_| {
                queue.lock().debouncer.touch(ranking, Instant::now());
            });
        if self.options.filter_globally {
            let queue = self.reorders.clone();
            self.registry
                .on_owned(EventKind::FilterChanged, ranking, owner, move |_| {
                    let mut queue = queue.lock();
                    let now = Instant::now();
                    let others: Vec<RankingId> = queue
                        .rankings
                        .iter()
                        .copied()
                        .filter(|&r| r != ranking)
                        .collect();
                    for other in others {
                        queue.debouncer.touch(other, now);
                    }
                });
        }

        let mut queue = self.reorders.lock();
        queue.rankings.push(ranking);
        queue.debouncer.touch(ranking, Instant::now());
        drop(queue);

        tracing::debug!(target: targets::PROVIDER, index, "inserted ranking");
        Ok(index)
    }

    /// Unregister a ranking; `false` if it is not one of ours.
    fn detach_ranking(&mut self, ranking: RankingId) -> bool {
        let Some(index) = self.rankings.iter().position(|&r| r == ranking) else {
            return false;
        };
        self.rankings.remove(index);
        if let Some(owner) = self.owners.remove(&ranking) {
            self.registry.off_owner(owner);
        }
        let mut queue = self.reorders.lock();
        queue.rankings.retain(|&r| r != ranking);
        queue.debouncer.cancel(ranking);
        true
    }

    /// Mark every ranking for a re-sort.
    pub fn dirty_all(&self) {
        for &ranking in &self.rankings {
            self.registry.dirty_order(ranking);
        }
    }

    /// Number of rankings waiting for a re-sort.
    pub fn pending_reorders(&self) -> usize {
        self.reorders.lock().debouncer.pending_count()
    }

    pub fn dump(&self) -> ProviderResult<ProviderDump> {
        let rankings = self
            .rankings
            .iter()
            .map(|&r| self.registry.dump_ranking(r, &DescCatalog::to_desc_ref))
            .collect::<Result<_, _>>()?;
        Ok(ProviderDump {
            uid: self.uid,
            selection: self.selection.selection(),
            rankings,
        })
    }
}

/// The provider protocol shared by local and remote data sources.
///
/// Implementors supply access to their [`ProviderCore`] and the backend
/// operations; everything else is provided.
pub trait DataProvider: Send + Sync {
    fn core(&self) -> &ProviderCore;

    fn core_mut(&mut self) -> &mut ProviderCore;

    // Backend

    /// Compute the order of `ranking`.
    fn sort(&self, ranking: RankingId) -> Deferred<Vec<usize>> {
        let _ = ranking;
        not_implemented("sort")
    }

    /// Fetch the rows at `indices`, in that order.
    fn view(&self, indices: &[usize]) -> Deferred<Vec<Row>> {
        let _ = indices;
        not_implemented("view")
    }

    /// Raw values of a number column for the mapping editor.
    fn mapping_sample(&self, col: ColumnId) -> Deferred<Vec<f64>> {
        let _ = col;
        not_implemented("mapping_sample")
    }

    /// Select every row whose label in `col` matches; returns the selection.
    fn search_select(&self, pattern: &SearchPattern, col: ColumnId) -> Deferred<Vec<usize>> {
        let _ = (pattern, col);
        not_implemented("search_select")
    }

    fn number_stats(&self, indices: &[usize], col: ColumnId) -> Deferred<Statistics> {
        let _ = (indices, col);
        not_implemented("number_stats")
    }

    fn categorical_hist(&self, indices: &[usize], col: ColumnId) -> Deferred<CategoricalStatistics> {
        let _ = (indices, col);
        not_implemented("categorical_hist")
    }

    // Hooks

    /// Create a ranking that is not yet part of the provider.
    fn clone_ranking(&mut self, existing: Option<RankingId>) -> ProviderResult<RankingId> {
        self.core_mut().new_ranking(existing)
    }

    /// Drop per-ranking state before the ranking is destroyed.
    fn clean_up_ranking(&mut self, ranking: RankingId) {
        let _ = ranking;
    }

    /// Prepare a freshly created column, e.g. infer its domain.
    fn init_column(&mut self, col: ColumnId) -> ProviderResult<()> {
        let _ = col;
        Ok(())
    }

    /// Called after a new order was applied to a ranking.
    fn order_applied(&mut self, ranking: RankingId, order: &[usize]) {
        let _ = (ranking, order);
    }

    // Rankings

    /// Add a new ranking at the end, optionally as a copy of `existing`.
    fn push_ranking(&mut self, existing: Option<RankingId>) -> ProviderResult<RankingId> {
        let ranking = self.clone_ranking(existing)?;
        let len = self.core().rankings.len();
        self.insert_ranking(ranking, len)?;
        Ok(ranking)
    }

    fn insert_ranking(&mut self, ranking: RankingId, index: usize) -> ProviderResult<()> {
        let index = self.core_mut().attach_ranking(ranking, index)?;
        self.core().add_ranking.emit((ranking, index));
        Ok(())
    }

    /// Add a ranking focused on `col`: the support columns, the first
    /// string column and a copy of `col` sorted descending.
    fn take_snapshot(&mut self, col: ColumnId) -> ProviderResult<RankingId> {
        let ranking = self.clone_ranking(None)?;
        let registry = self.core().registry();
        let mut has_string = registry.column(col)?.desc().type_name == "string";
        let mut has_column = false;
        let mut to_clone = Vec::new();
        if let Some(source) = registry.find_my_ranker(col) {
            for &c in registry.ranking(source)?.columns() {
                let node = registry.column(c)?;
                if c == col {
                    has_column = true;
                    to_clone.push(c);
                } else if !has_string && node.desc().type_name == "string" {
                    has_string = true;
                    to_clone.push(c);
                } else if node.desc().is_support() && !matches!(node.kind(), ColumnKind::Rank) {
                    to_clone.push(c);
                }
            }
        }
        if !has_column {
            to_clone.push(col);
        }
        for c in to_clone {
            let Some(copy) = self.core_mut().clone_column(c)? else {
                continue;
            };
            self.init_subtree(copy)?;
            let registry = self.core_mut().registry_mut();
            registry.push(ranking, copy)?;
            if c == col {
                registry.sort_by(ranking, Some(copy), false)?;
            }
        }
        let len = self.core().rankings.len();
        self.insert_ranking(ranking, len)?;
        Ok(ranking)
    }

    /// Remove and destroy a ranking; `false` if it is not one of ours.
    fn remove_ranking(&mut self, ranking: RankingId) -> ProviderResult<bool> {
        if !self.core_mut().detach_ranking(ranking) {
            return Ok(false);
        }
        self.clean_up_ranking(ranking);
        self.core_mut().registry_mut().destroy_ranking(ranking)?;
        self.core().remove_ranking.emit(Some(ranking));
        Ok(true)
    }

    fn clear_rankings(&mut self) -> ProviderResult<()> {
        for ranking in self.core().rankings.clone() {
            self.core_mut().detach_ranking(ranking);
            self.clean_up_ranking(ranking);
            self.core_mut().registry_mut().destroy_ranking(ranking)?;
        }
        self.core().remove_ranking.emit(None);
        Ok(())
    }

    fn rankings(&self) -> &[RankingId] {
        self.core().rankings()
    }

    fn last_ranking(&self) -> Option<RankingId> {
        self.core().rankings().last().copied()
    }

    // Columns and descriptors

    /// Create a detached column; `None` for unknown types.
    fn create(&mut self, desc: impl Into<Arc<ColumnDesc>>) -> ProviderResult<Option<ColumnId>>
    where
        Self: Sized,
    {
        let Some(col) = self.core_mut().create(desc) else {
            return Ok(None);
        };
        self.init_column(col)?;
        Ok(Some(col))
    }

    /// Create a column and append it to `ranking`.
    fn push(
        &mut self,
        ranking: RankingId,
        desc: impl Into<Arc<ColumnDesc>>,
    ) -> ProviderResult<Option<ColumnId>>
    where
        Self: Sized,
    {
        let len = self.core().registry().ranking(ranking)?.columns().len();
        self.insert(ranking, len, desc)
    }

    fn insert(
        &mut self,
        ranking: RankingId,
        index: usize,
        desc: impl Into<Arc<ColumnDesc>>,
    ) -> ProviderResult<Option<ColumnId>>
    where
        Self: Sized,
    {
        let Some(col) = self.create(desc)? else {
            return Ok(None);
        };
        self.core_mut().registry_mut().insert(ranking, col, index)?;
        Ok(Some(col))
    }

    /// Add a data descriptor and announce it.
    fn push_desc(&mut self, desc: ColumnDesc) {
        let desc = Arc::new(label_desc(desc));
        self.core_mut().catalog.descs.push(desc.clone());
        self.core().add_desc.emit(desc);
    }

    /// Every descriptor, the rank and selection ones first.
    fn columns(&self) -> Vec<Arc<ColumnDesc>> {
        let core = self.core();
        let mut columns = vec![core.rank_desc().clone(), core.selection_desc().clone()];
        columns.extend(core.descs().iter().cloned());
        columns
    }

    fn to_desc_ref(&self, desc: &ColumnDesc) -> Value {
        self.core().to_desc_ref(desc)
    }

    fn from_desc_ref(&self, desc_ref: &Value) -> Option<Arc<ColumnDesc>> {
        self.core().from_desc_ref(desc_ref)
    }

    /// Copy a column with fresh ids.
    fn clone_column(&mut self, col: ColumnId) -> ProviderResult<Option<ColumnId>> {
        let Some(copy) = self.core_mut().clone_column(col)? else {
            return Ok(None);
        };
        self.init_subtree(copy)?;
        Ok(Some(copy))
    }

    fn restore_column(&mut self, dump: &ColumnDump) -> ProviderResult<Option<ColumnId>> {
        let Some(col) = self.core_mut().restore_column(dump)? else {
            return Ok(None);
        };
        self.init_subtree(col)?;
        Ok(Some(col))
    }

    /// Run [`init_column`](Self::init_column) on a column and all its descendants.
    fn init_subtree(&mut self, col: ColumnId) -> ProviderResult<()> {
        let mut pending = vec![col];
        while let Some(next) = pending.pop() {
            self.init_column(next)?;
            pending.extend_from_slice(self.core().registry().children(next)?);
        }
        Ok(())
    }

    /// The first column with the given id in any ranking.
    fn find(&self, id: &str) -> ProviderResult<Option<ColumnId>> {
        let core = self.core();
        for &ranking in core.rankings() {
            if let Some(col) = core.registry().find_by_id(ranking, id)? {
                return Ok(Some(col));
            }
        }
        Ok(None)
    }

    /// Add a ranking with every descriptor unless there is a ranking already.
    fn derive_default(&mut self) -> ProviderResult<Option<RankingId>>
    where
        Self: Sized,
    {
        if !self.core().rankings().is_empty() {
            return Ok(None);
        }
        let ranking = self.push_ranking(None)?;
        let selection = self.core().selection_desc().clone();
        self.push(ranking, selection)?;
        for desc in self.core().descs().to_vec() {
            if !desc.is_support() {
                self.push(ranking, desc)?;
            }
        }
        Ok(Some(ranking))
    }

    // Persistence

    fn dump(&self) -> ProviderResult<ProviderDump> {
        self.core().dump()
    }

    fn dump_column(&self, col: ColumnId) -> ProviderResult<ColumnDump> {
        self.core().dump_column(col)
    }

    /// Create a ranking from a dump without inserting it.
    fn restore_ranking(&mut self, dump: &RankingDump) -> ProviderResult<RankingId> {
        let ranking = self.clone_ranking(None)?;
        self.core_mut().restore_ranking_columns(ranking, dump)?;
        for col in self.core().registry().ranking(ranking)?.columns().to_vec() {
            self.init_subtree(col)?;
        }
        self.core_mut().assign_new_ids(ranking)?;
        Ok(ranking)
    }

    /// Replace all rankings and the selection with the dumped ones.
    fn restore(&mut self, dump: &ProviderDump) -> ProviderResult<()> {
        let span = tracing::debug_span!(span_names::RESTORE, rankings = dump.rankings.len());
        let _guard = span.enter();
        self.clear_rankings()?;
        self.core_mut().uid = dump.uid;
        self.core().selection().set_selection(&dump.selection);
        for ranking_dump in &dump.rankings {
            let ranking = self.clone_ranking(None)?;
            self.core_mut().restore_ranking_columns(ranking, ranking_dump)?;
            for col in self.core().registry().ranking(ranking)?.columns().to_vec() {
                self.init_subtree(col)?;
            }
            let len = self.core().rankings().len();
            self.insert_ranking(ranking, len)?;
        }
        for ranking in self.core().rankings().to_vec() {
            self.core_mut().assign_new_ids(ranking)?;
        }
        Ok(())
    }

    // Ordering

    /// Apply a sorted order unless a newer sort was applied already.
    fn apply_order(&mut self, ticket: SortTicket, order: Vec<usize>) -> ProviderResult<bool> {
        let copy = order.clone();
        if !self.core_mut().registry_mut().apply_order(ticket, order)? {
            return Ok(false);
        }
        self.order_applied(ticket.ranking, &copy);
        Ok(true)
    }

    /// Sort `ranking` now and apply the result.
    fn reorder(&mut self, ranking: RankingId) -> impl Future<Output = ProviderResult<bool>> + Send
    where
        Self: Sized,
    {
        let span = tracing::debug_span!(span_names::REORDER);
        async move {
            self.core().check_ranking(ranking)?;
            let ticket = self.core_mut().registry_mut().begin_sort(ranking)?;
            let order = self.sort(ranking).await?;
            self.apply_order(ticket, order)
        }
        .instrument(span)
    }

    /// Re-sort every ranking whose quiet period elapsed by `now`; returns how many.
    fn process_reorders(&mut self, now: Instant) -> impl Future<Output = ProviderResult<usize>> + Send
    where
        Self: Sized,
    {
        async move {
            let due = self.core().reorders.lock().debouncer.take_due(now);
            self.reorder_all(due).await
        }
    }

    /// Re-sort every pending ranking immediately.
    fn flush_reorders(&mut self) -> impl Future<Output = ProviderResult<usize>> + Send
    where
        Self: Sized,
    {
        async move {
            let due = self.core().reorders.lock().debouncer.take_all();
            self.reorder_all(due).await
        }
    }

    #[doc(hidden)]
    fn reorder_all(
        &mut self,
        rankings: Vec<RankingId>,
    ) -> impl Future<Output = ProviderResult<usize>> + Send
    where
        Self: Sized,
    {
        async move {
            let mut count = 0;
            for ranking in rankings {
                if self.core().contains(ranking) {
                    self.reorder(ranking).await?;
                    count += 1;
                }
            }
            Ok(count)
        }
    }

    /// Sleep until each pending reorder is due and run it, until none are left.
    fn run_pending_reorders(&mut self) -> impl Future<Output = ProviderResult<usize>> + Send
    where
        Self: Sized,
    {
        async move {
            let mut total = 0;
            loop {
                let next = self.core().reorders.lock().debouncer.next_deadline();
                let Some(deadline) = next else {
                    return Ok(total);
                };
                lineup_core::debounce::sleep_until(deadline).await;
                total += self.process_reorders(Instant::now()).await?;
            }
        }
    }

    // Selection

    fn is_selected(&self, index: usize) -> bool {
        self.core().selection().is_selected(index)
    }

    fn select(&self, index: usize) {
        self.core().selection().select(index);
    }

    fn select_all(&self, indices: &[usize]) {
        self.core().selection().select_all(indices);
    }

    fn set_selection(&self, indices: &[usize]) {
        self.core().selection().set_selection(indices);
    }

    /// Toggle a row; see [`SelectionModel::toggle`].
    fn toggle_selection(&self, index: usize, additional: bool) -> bool {
        self.core().selection().toggle(index, additional)
    }

    fn deselect(&self, index: usize) {
        self.core().selection().deselect(index);
    }

    fn clear_selection(&self) {
        self.core().selection().clear();
    }

    fn selection(&self) -> Vec<usize> {
        self.core().selection().selection()
    }

    /// The selected rows, in ascending index order.
    fn selected_rows(&self) -> Deferred<Vec<Row>> {
        self.view(&self.selection())
    }

    // Export

    /// Render the ranking in its current order as delimited text.
    fn export_table<'a>(
        &'a self,
        ranking: RankingId,
        options: &'a ExportOptions,
    ) -> BoxFuture<'a, ProviderResult<String>> {
        async move {
            let registry = self.core().registry();
            let columns: Vec<ColumnId> = registry
                .flat_columns(ranking)?
                .into_iter()
                .filter(|&c| registry.column(c).is_ok_and(|node| (options.filter)(node.desc())))
                .collect();
            let order = registry.order(ranking)?.to_vec();
            let rows = self.view(&order).await?;

            let registry = self.core().registry();
            let mut lines = Vec::with_capacity(rows.len() + 1);
            if options.header {
                let labels = columns
                    .iter()
                    .map(|&c| Ok(options.quoted(registry.column(c)?.label())))
                    .collect::<ProviderResult<Vec<_>>>()?;
                lines.push(labels.join(&options.separator));
            }
            for row in &rows {
                let cells = columns
                    .iter()
                    .map(|&c| {
                        let label = registry.label(c, row)?;
                        Ok(if registry.column(c)?.kind().is_number() {
                            label
                        } else {
                            options.quoted(&label)
                        })
                    })
                    .collect::<ProviderResult<Vec<_>>>()?;
                lines.push(cells.join(&options.separator));
            }
            Ok(lines.join(&options.newline))
        }
        .boxed()
    }
}
