//! A provider that delegates sorting, row access and search to a server.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use lineup_core::logging::{span_names, targets};
use parking_lot::RwLock;
use serde_json::Value;

use super::{DataProvider, Deferred, ProviderCore, ProviderOptions, SearchPattern};
use crate::error::{ProviderError, ProviderResult};
use crate::model::{AccessContext, Accessor, ColumnDesc, ColumnId, RankingId, Row, SortingDesc};

/// The server side of a [`RemoteDataProvider`].
///
/// Columns are addressed by the `column` field of their descriptor. Results
/// may resolve in any order.
pub trait RemoteBackend: Send + Sync + 'static {
    /// The argsort of all rows for the given criteria.
    fn sort(&self, desc: Option<SortingDesc>) -> BoxFuture<'static, ProviderResult<Vec<usize>>>;

    /// The records at `indices`, in that order.
    fn view(&self, indices: &[usize]) -> BoxFuture<'static, ProviderResult<Vec<Value>>>;

    /// Raw values of a number column.
    fn mapping_sample(&self, column: &Value) -> BoxFuture<'static, ProviderResult<Vec<f64>>>;

    /// Indices of the rows matching `pattern` in `column`.
    fn search(
        &self,
        pattern: &SearchPattern,
        column: &Value,
    ) -> BoxFuture<'static, ProviderResult<Vec<usize>>>;
}

/// A server order plus the position of each row in it.
#[derive(Debug)]
struct ServerOrder {
    order: Vec<usize>,
    positions: HashMap<usize, usize>,
}

impl ServerOrder {
    fn new(order: &[usize]) -> Self {
        Self {
            positions: order.iter().enumerate().map(|(pos, &index)| (index, pos)).collect(),
            order: order.to_vec(),
        }
    }
}

type OrderCache = Arc<RwLock<HashMap<RankingId, Arc<ServerOrder>>>>;

fn column_key(desc: &ColumnDesc) -> Value {
    desc.column.clone().map_or(Value::Null, Value::String)
}

fn failed<T: Send + 'static>(err: impl Into<ProviderError>) -> Deferred<T> {
    future::ready(Err(err.into())).boxed()
}

/// A [`DataProvider`] whose rows live behind a [`RemoteBackend`].
///
/// The rank of a row is its position in the last order applied to the
/// ranking, or 0 before the first sort.
pub struct RemoteDataProvider<B> {
    core: ProviderCore,
    backend: Arc<B>,
    orders: OrderCache,
}

impl<B> std::fmt::Debug for RemoteDataProvider<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteDataProvider")
            .field("core", &self.core)
            .field("orders", &self.orders.read().len())
            .finish_non_exhaustive()
    }
}

impl<B: RemoteBackend> RemoteDataProvider<B> {
    pub fn new(backend: B, descs: Vec<ColumnDesc>, options: ProviderOptions) -> Self {
        let orders = OrderCache::default();
        let reader = orders.clone();
        let rank_accessor: Accessor = Arc::new(move |row: &Row, ctx: &AccessContext<'_>| {
            let rank = ctx
                .ranking
                .and_then(|ranking| {
                    let orders = reader.read();
                    orders.get(&ranking)?.positions.get(&row.index).copied()
                })
                .map_or(0, |pos| pos + 1);
            Value::from(rank)
        });
        Self {
            core: ProviderCore::new(descs, options, rank_accessor),
            backend: Arc::new(backend),
            orders,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// The last server order applied to `ranking`.
    pub fn server_order(&self, ranking: RankingId) -> Option<Vec<usize>> {
        self.orders.read().get(&ranking).map(|o| o.order.clone())
    }

    fn key_of(&self, col: ColumnId) -> ProviderResult<Value> {
        Ok(column_key(self.core.registry().column(col)?.desc()))
    }
}

impl<B: RemoteBackend> DataProvider for RemoteDataProvider<B> {
    fn core(&self) -> &ProviderCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProviderCore {
        &mut self.core
    }

    fn sort(&self, ranking: RankingId) -> Deferred<Vec<usize>> {
        let _span = tracing::debug_span!(span_names::SORT).entered();
        if let Err(err) = self.core.check_ranking(ranking) {
            return failed(err);
        }
        let desc = match self.core.registry().to_sorting_desc(ranking, &column_key) {
            Ok(desc) => desc,
            Err(err) => return failed(err),
        };
        tracing::trace!(target: targets::PROVIDER, ?desc, "requesting server sort");
        self.backend.sort(desc)
    }

    fn view(&self, indices: &[usize]) -> Deferred<Vec<Row>> {
        let indices = indices.to_vec();
        self.backend
            .view(&indices)
            .map(move |records| {
                records.map(|records| {
                    records
                        .into_iter()
                        .zip(indices)
                        .map(|(data, index)| Row::new(index, data))
                        .collect::<Vec<_>>()
                })
            })
            .boxed()
    }

    fn mapping_sample(&self, col: ColumnId) -> Deferred<Vec<f64>> {
        match self.key_of(col) {
            Ok(key) => self.backend.mapping_sample(&key),
            Err(err) => failed(err),
        }
    }

    fn search_select(&self, pattern: &SearchPattern, col: ColumnId) -> Deferred<Vec<usize>> {
        let key = match self.key_of(col) {
            Ok(key) => key,
            Err(err) => return failed(err),
        };
        let selection = self.core.selection().clone();
        self.backend
            .search(pattern, &key)
            .map(move |found: ProviderResult<Vec<usize>>| -> ProviderResult<Vec<usize>> {
                let found = found?;
                selection.set_selection(&found);
                Ok(found)
            })
            .boxed()
    }

    fn clone_ranking(&mut self, existing: Option<RankingId>) -> ProviderResult<RankingId> {
        let ranking = self.core.new_ranking(existing)?;
        if let Some(existing) = existing {
            let mut orders = self.orders.write();
            if let Some(order) = orders.get(&existing).cloned() {
                orders.insert(ranking, order);
            }
        }
        Ok(ranking)
    }

    fn clean_up_ranking(&mut self, ranking: RankingId) {
        self.orders.write().remove(&ranking);
    }

    fn order_applied(&mut self, ranking: RankingId, order: &[usize]) {
        self.orders.write().insert(ranking, Arc::new(ServerOrder::new(order)));
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct Reversed;

    impl RemoteBackend for Reversed {
        fn sort(&self, _: Option<SortingDesc>) -> BoxFuture<'static, ProviderResult<Vec<usize>>> {
            future::ready(Ok(vec![2, 1, 0])).boxed()
        }

        fn view(&self, indices: &[usize]) -> BoxFuture<'static, ProviderResult<Vec<Value>>> {
            let rows = indices.iter().map(|i| json!({"id": i})).collect();
            future::ready(Ok(rows)).boxed()
        }

        fn mapping_sample(&self, _: &Value) -> BoxFuture<'static, ProviderResult<Vec<f64>>> {
            future::ready(Ok(vec![0.5])).boxed()
        }

        fn search(&self, _: &SearchPattern, _: &Value) -> BoxFuture<'static, ProviderResult<Vec<usize>>> {
            future::ready(Err(ProviderError::backend("offline"))).boxed()
        }
    }

    #[test]
    fn test_server_order_positions() {
        let order = ServerOrder::new(&[2, 0, 1]);
        assert_eq!(order.positions[&2], 0);
        assert_eq!(order.positions[&1], 2);
    }

    #[tokio::test]
    async fn test_rank_follows_applied_order() {
        let mut provider = RemoteDataProvider::new(Reversed, Vec::new(), ProviderOptions::default());
        let ranking = provider.push_ranking(None).unwrap();
        let rank = provider.core().registry().ranking(ranking).unwrap().columns()[0];

        let row = Row::new(2, json!({}));
        assert_eq!(provider.core().registry().value(rank, &row).unwrap(), json!(0));

        assert!(provider.reorder(ranking).await.unwrap());
        assert_eq!(provider.server_order(ranking), Some(vec![2, 1, 0]));
        assert_eq!(provider.core().registry().value(rank, &row).unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_view_stamps_server_indices() {
        let provider = RemoteDataProvider::new(Reversed, Vec::new(), ProviderOptions::default());
        let rows = provider.view(&[4, 9]).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.index).collect::<Vec<_>>(), vec![4, 9]);
        assert_eq!(rows[1].get("id"), &json!(9));
    }

    #[tokio::test]
    async fn test_backend_errors_propagate() {
        let mut provider = RemoteDataProvider::new(
            Reversed,
            vec![ColumnDesc::string("name")],
            ProviderOptions::default(),
        );
        let ranking = provider.push_ranking(None).unwrap();
        let col = provider.push(ranking, ColumnDesc::string("name")).unwrap().unwrap();
        let err = provider
            .search_select(&SearchPattern::from("x"), col)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Backend(_)));
        assert!(provider.selection().is_empty());
    }
}
