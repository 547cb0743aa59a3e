//! Tests for the server-backed data provider against an in-memory backend.

use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use lineup::model::{SortingDesc, SortingId};
use lineup::{
    ColumnDesc, ColumnId, DataProvider, ProviderError, ProviderOptions, ProviderResult,
    RemoteBackend, RemoteDataProvider, SearchPattern,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::oneshot;

/// A backend that answers sorts only when the test releases them.
#[derive(Default)]
struct ManualBackend {
    rows: Vec<Value>,
    sorts: Mutex<Vec<oneshot::Sender<Vec<usize>>>>,
    requests: Mutex<Vec<Option<SortingDesc>>>,
}

impl ManualBackend {
    fn new(rows: Vec<Value>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    /// Resolve the `index`-th sort request with `order`.
    fn release(&self, index: usize, order: Vec<usize>) {
        let sender = {
            let mut sorts = self.sorts.lock();
            let (tx, _) = oneshot::channel();
            std::mem::replace(&mut sorts[index], tx)
        };
        sender.send(order).unwrap();
    }
}

impl RemoteBackend for ManualBackend {
    fn sort(&self, desc: Option<SortingDesc>) -> BoxFuture<'static, ProviderResult<Vec<usize>>> {
        self.requests.lock().push(desc);
        let (tx, rx) = oneshot::channel();
        self.sorts.lock().push(tx);
        async move { rx.await.map_err(|_| ProviderError::backend("sort cancelled")) }.boxed()
    }

    fn view(&self, indices: &[usize]) -> BoxFuture<'static, ProviderResult<Vec<Value>>> {
        let rows = indices
            .iter()
            .map(|&i| self.rows.get(i).cloned().unwrap_or(Value::Null))
            .collect();
        future::ready(Ok(rows)).boxed()
    }

    fn mapping_sample(&self, column: &Value) -> BoxFuture<'static, ProviderResult<Vec<f64>>> {
        let key = column.as_str().unwrap_or_default().to_string();
        let values = self.rows.iter().filter_map(|r| r.get(&key)?.as_f64()).collect();
        future::ready(Ok(values)).boxed()
    }

    fn search(
        &self,
        pattern: &SearchPattern,
        column: &Value,
    ) -> BoxFuture<'static, ProviderResult<Vec<usize>>> {
        let key = column.as_str().unwrap_or_default().to_string();
        let found = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| pattern.matches(r.get(&key).and_then(Value::as_str).unwrap_or_default()))
            .map(|(i, _)| i)
            .collect();
        future::ready(Ok(found)).boxed()
    }
}

fn rows() -> Vec<Value> {
    vec![
        json!({"name": "Ada", "score": 0.9}),
        json!({"name": "Bob", "score": 0.2}),
        json!({"name": "Cy", "score": 0.5}),
    ]
}

fn provider() -> RemoteDataProvider<ManualBackend> {
    RemoteDataProvider::new(
        ManualBackend::new(rows()),
        vec![
            ColumnDesc::string("name"),
            ColumnDesc::number("score", [0.0, 1.0]),
        ],
        ProviderOptions::default(),
    )
}

#[tokio::test]
async fn test_stale_sort_result_is_dropped() {
    let mut provider = provider();
    let ranking = provider.derive_default().unwrap().unwrap();

    let first = provider.core_mut().registry_mut().begin_sort(ranking).unwrap();
    let pending_first = provider.sort(ranking);
    let second = provider.core_mut().registry_mut().begin_sort(ranking).unwrap();
    let pending_second = provider.sort(ranking);

    // the newer request answers first
    provider.backend().release(1, vec![2, 0, 1]);
    let order = pending_second.await.unwrap();
    assert!(provider.apply_order(second, order).unwrap());

    provider.backend().release(0, vec![1, 2, 0]);
    let order = pending_first.await.unwrap();
    assert!(!provider.apply_order(first, order).unwrap());

    assert_eq!(provider.core().registry().order(ranking).unwrap(), &[2, 0, 1]);
    assert_eq!(provider.server_order(ranking), Some(vec![2, 0, 1]));
}

#[tokio::test]
async fn test_sort_request_carries_column_key() {
    let mut provider = provider();
    let ranking = provider.derive_default().unwrap().unwrap();
    let score = provider
        .core()
        .registry()
        .find(ranking, |node| node.desc().column.as_deref() == Some("score"))
        .unwrap()
        .unwrap();
    provider.core_mut().registry_mut().sort_by(ranking, Some(score), true).unwrap();

    let pending = provider.sort(ranking);
    provider.backend().release(0, vec![1, 2, 0]);
    assert_eq!(pending.await.unwrap(), vec![1, 2, 0]);

    let requests = provider.backend().requests.lock();
    let desc = requests[0].as_ref().unwrap();
    assert_eq!(desc.id, SortingId::Column(json!("score")));
    assert!(desc.asc);
}

#[tokio::test]
async fn test_rank_and_view_use_server_indices() {
    let mut provider = provider();
    let ranking = provider.derive_default().unwrap().unwrap();

    let ticket = provider.core_mut().registry_mut().begin_sort(ranking).unwrap();
    let pending = provider.sort(ranking);
    provider.backend().release(0, vec![2, 0, 1]);
    provider.apply_order(ticket, pending.await.unwrap()).unwrap();

    let rows = provider.view(&[2, 0]).await.unwrap();
    assert_eq!(rows[0].index, 2);
    assert_eq!(rows[0].get("name"), &json!("Cy"));

    let rank = provider.core().registry().ranking(ranking).unwrap().columns()[0];
    let registry = provider.core().registry();
    assert_eq!(registry.value(rank, &rows[0]).unwrap(), json!(1));
    assert_eq!(registry.value(rank, &rows[1]).unwrap(), json!(2));
}

#[tokio::test]
async fn test_cloned_ranking_keeps_server_order() {
    let mut provider = provider();
    let ranking = provider.derive_default().unwrap().unwrap();
    let ticket = provider.core_mut().registry_mut().begin_sort(ranking).unwrap();
    let pending = provider.sort(ranking);
    provider.backend().release(0, vec![1, 0, 2]);
    provider.apply_order(ticket, pending.await.unwrap()).unwrap();

    let copy = provider.push_ranking(Some(ranking)).unwrap();
    assert_eq!(provider.server_order(copy), Some(vec![1, 0, 2]));
    assert_eq!(provider.core().registry().order(copy).unwrap(), &[1, 0, 2]);

    provider.remove_ranking(copy).unwrap();
    assert_eq!(provider.server_order(copy), None);
}

#[tokio::test]
async fn test_search_select_and_mapping_sample() {
    let mut provider = provider();
    let ranking = provider.derive_default().unwrap().unwrap();
    let registry = provider.core().registry();
    let name = registry
        .find(ranking, |node| node.desc().column.as_deref() == Some("name"))
        .unwrap()
        .unwrap();
    let score = registry
        .find(ranking, |node| node.desc().column.as_deref() == Some("score"))
        .unwrap()
        .unwrap();

    let found = provider.search_select(&SearchPattern::from("b"), name).await.unwrap();
    assert_eq!(found, vec![1]);
    assert_eq!(provider.selection(), vec![1]);

    let sample = provider.mapping_sample(score).await.unwrap();
    assert_eq!(sample, vec![0.9, 0.2, 0.5]);

    let rows = provider.selected_rows().await.unwrap();
    assert_eq!(rows[0].get("name"), &json!("Bob"));
}

#[tokio::test]
async fn test_statistics_are_not_implemented() {
    let provider = provider();
    let err = provider.number_stats(&[0], ColumnId::default()).await.unwrap_err();
    assert!(matches!(err, ProviderError::NotImplemented("number_stats")));
}
