//! A provider over an in-memory data set.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future;
use lineup_core::logging::{span_names, targets};
use parking_lot::RwLock;
use serde_json::Value;

use super::{
    CategoricalStatistics, DataProvider, Deferred, ProviderCore, ProviderOptions, SearchPattern,
    Statistics, compute_hist, compute_stats,
};
use crate::error::{ProviderError, ProviderResult};
use crate::model::util::{is_missing, to_number};
use crate::model::{AccessContext, Accessor, ColumnDesc, ColumnId, ColumnKind, RankingId, Row};

/// Per-ranking position of every row after the last sort.
///
/// Rows removed by a filter have no position. Entries are keyed by ranking,
/// so sorts of different rankings never touch each other's entries.
#[derive(Debug, Clone, Default)]
pub struct RankCache {
    ranks: Arc<RwLock<HashMap<RankingId, Vec<Option<usize>>>>>,
}

impl RankCache {
    /// Zero-based position of row `index` in `ranking`.
    pub fn rank(&self, ranking: RankingId, index: usize) -> Option<usize> {
        self.ranks.read().get(&ranking)?.get(index).copied().flatten()
    }

    pub fn contains(&self, ranking: RankingId) -> bool {
        self.ranks.read().contains_key(&ranking)
    }

    fn store(&self, ranking: RankingId, ranks: Vec<Option<usize>>) {
        self.ranks.write().insert(ranking, ranks);
    }

    fn copy(&self, from: RankingId, to: RankingId) {
        let mut ranks = self.ranks.write();
        if let Some(copy) = ranks.get(&from).cloned() {
            ranks.insert(to, copy);
        }
    }

    fn remove(&self, ranking: RankingId) {
        self.ranks.write().remove(&ranking);
    }
}

/// A [`DataProvider`] that sorts, filters and summarizes rows held in memory.
///
/// Every deferred value it returns is already resolved.
#[derive(Debug)]
pub struct LocalDataProvider {
    core: ProviderCore,
    data: Vec<Arc<Value>>,
    ranks: RankCache,
}

impl LocalDataProvider {
    pub fn new(data: Vec<Value>, descs: Vec<ColumnDesc>, options: ProviderOptions) -> Self {
        let ranks = RankCache::default();
        let reader = ranks.clone();
        let rank_accessor: Accessor = Arc::new(move |row: &Row, ctx: &AccessContext<'_>| {
            let rank = ctx
                .ranking
                .and_then(|ranking| reader.rank(ranking, row.index))
                .map_or(1, |rank| rank + 1);
            Value::from(rank)
        });
        Self {
            core: ProviderCore::new(descs, options, rank_accessor),
            data: data.into_iter().map(Arc::new).collect(),
            ranks,
        }
    }

    pub fn data(&self) -> &[Arc<Value>] {
        &self.data
    }

    pub fn rank_cache(&self) -> &RankCache {
        &self.ranks
    }

    /// Replace the data set and mark every ranking for a re-sort.
    pub fn set_data(&mut self, data: Vec<Value>) {
        self.data = data.into_iter().map(Arc::new).collect();
        self.core.dirty_all();
    }

    pub fn clear_data(&mut self) {
        self.set_data(Vec::new());
    }

    /// Append rows and mark every ranking for a re-sort.
    pub fn append_data(&mut self, data: Vec<Value>) {
        self.data.extend(data.into_iter().map(Arc::new));
        self.core.dirty_all();
    }

    fn row(&self, index: usize) -> ProviderResult<Row> {
        self.data
            .get(index)
            .map(|data| Row::new(index, data.clone()))
            .ok_or(ProviderError::RowOutOfRange {
                index,
                len: self.data.len(),
            })
    }

    fn rows(&self) -> impl Iterator<Item = Row> + '_ {
        self.data
            .iter()
            .enumerate()
            .map(|(index, data)| Row::new(index, data.clone()))
    }

    /// Filter, stable-sort and cache the ranks of `ranking`; returns the argsort.
    fn sort_now(&self, ranking: RankingId) -> ProviderResult<Vec<usize>> {
        let _span = tracing::debug_span!(span_names::SORT, rows = self.data.len()).entered();
        self.core.check_ranking(ranking)?;
        let registry = self.core.registry();

        let filters: Vec<RankingId> = if self.core.options().filter_globally {
            self.core
                .rankings()
                .iter()
                .copied()
                .filter(|&r| registry.ranking_is_filtered(r).unwrap_or(false))
                .collect()
        } else {
            vec![ranking]
        };

        let mut rows = Vec::with_capacity(self.data.len());
        for row in self.rows() {
            let mut keep = true;
            for &filter in &filters {
                if !registry.ranking_filter(filter, &row)? {
                    keep = false;
                    break;
                }
            }
            if keep {
                rows.push(row);
            }
        }

        rows.sort_by(|a, b| registry.compare_rows(ranking, a, b).unwrap_or(Ordering::Equal));

        let mut ranks = vec![None; self.data.len()];
        for (position, row) in rows.iter().enumerate() {
            ranks[row.index] = Some(position);
        }
        self.ranks.store(ranking, ranks);

        tracing::trace!(target: targets::PROVIDER, kept = rows.len(), "sorted ranking");
        Ok(rows.into_iter().map(|row| row.index).collect())
    }

    fn number_values(&self, indices: &[usize], col: ColumnId) -> ProviderResult<Vec<f64>> {
        let registry = self.core.registry();
        let is_number = matches!(registry.column(col)?.kind(), ColumnKind::Number(_));
        indices
            .iter()
            .map(|&index| {
                let row = self.row(index)?;
                if is_number && is_missing(&registry.raw_value(col, &row)?) {
                    return Ok(f64::NAN);
                }
                Ok(registry.number(col, &row)?.unwrap_or(f64::NAN))
            })
            .collect()
    }

    fn category_rows(&self, indices: &[usize], col: ColumnId) -> ProviderResult<Vec<Vec<String>>> {
        let registry = self.core.registry();
        indices
            .iter()
            .map(|&index| Ok(registry.categories(col, &self.row(index)?)?))
            .collect()
    }

    fn sample_values(&self, col: ColumnId) -> ProviderResult<Vec<f64>> {
        let max = self.core.options().max_mapping_sample;
        let len = self.data.len();
        let indices: Vec<usize> = if len <= max {
            (0..len).collect()
        } else {
            let mut indices = rand::seq::index::sample(&mut rand::thread_rng(), len, max).into_vec();
            indices.sort_unstable();
            indices
        };
        let registry = self.core.registry();
        indices
            .into_iter()
            .map(|index| Ok(registry.raw_number(col, &self.row(index)?)?.unwrap_or(f64::NAN)))
            .collect()
    }

    fn search(&self, pattern: &SearchPattern, col: ColumnId) -> ProviderResult<Vec<usize>> {
        let registry = self.core.registry();
        let mut indices = Vec::new();
        for row in self.rows() {
            if pattern.matches(&registry.label(col, &row)?) {
                indices.push(row.index);
            }
        }
        self.core.selection().set_selection(&indices);
        Ok(indices)
    }
}

impl DataProvider for LocalDataProvider {
    fn core(&self) -> &ProviderCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProviderCore {
        &mut self.core
    }

    fn sort(&self, ranking: RankingId) -> Deferred<Vec<usize>> {
        future::ready(self.sort_now(ranking)).boxed()
    }

    fn view(&self, indices: &[usize]) -> Deferred<Vec<Row>> {
        let rows = indices.iter().map(|&index| self.row(index)).collect();
        future::ready(rows).boxed()
    }

    fn mapping_sample(&self, col: ColumnId) -> Deferred<Vec<f64>> {
        future::ready(self.sample_values(col)).boxed()
    }

    fn search_select(&self, pattern: &SearchPattern, col: ColumnId) -> Deferred<Vec<usize>> {
        future::ready(self.search(pattern, col)).boxed()
    }

    fn number_stats(&self, indices: &[usize], col: ColumnId) -> Deferred<Statistics> {
        let stats = self
            .number_values(indices, col)
            .map(|values| compute_stats(&values, [0.0, 1.0]));
        future::ready(stats).boxed()
    }

    fn categorical_hist(&self, indices: &[usize], col: ColumnId) -> Deferred<CategoricalStatistics> {
        let hist = (|| {
            let categories: Vec<String> = self
                .core
                .registry()
                .column(col)?
                .kind()
                .categorical_state()
                .map(|c| c.categories.iter().map(|cat| cat.name.clone()).collect())
                .unwrap_or_default();
            let rows = self.category_rows(indices, col)?;
            Ok(compute_hist(&rows, &categories))
        })();
        future::ready(hist).boxed()
    }

    fn clone_ranking(&mut self, existing: Option<RankingId>) -> ProviderResult<RankingId> {
        let ranking = self.core.new_ranking(existing)?;
        if let Some(existing) = existing {
            self.ranks.copy(existing, ranking);
        }
        Ok(ranking)
    }

    fn clean_up_ranking(&mut self, ranking: RankingId) {
        self.ranks.remove(ranking);
    }

    /// Infer a missing number domain from the raw extent of the data.
    fn init_column(&mut self, col: ColumnId) -> ProviderResult<()> {
        let registry = self.core.registry();
        let ColumnKind::Number(number) = registry.column(col)?.kind() else {
            return Ok(());
        };
        if !number.needs_domain() {
            return Ok(());
        }
        let mut extent: Option<[f64; 2]> = None;
        for row in self.rows() {
            let raw = registry.raw_value(col, &row)?;
            if is_missing(&raw) {
                continue;
            }
            let value = to_number(&raw);
            if value.is_nan() {
                continue;
            }
            extent = Some(match extent {
                Some([lo, hi]) => [lo.min(value), hi.max(value)],
                None => [value, value],
            });
        }
        let domain = extent.unwrap_or([0.0, 1.0]);
        tracing::debug!(target: targets::PROVIDER, ?domain, "inferred number domain");
        self.core.registry_mut().init_number_domain(col, domain)?;
        Ok(())
    }
}
