//! Tests for the in-memory data provider.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lineup::model::{CategoricalFilter, ColumnKind, NumberFilter, StringFilter};
use lineup::provider::{CategoricalStatistics, Statistics};
use lineup::{
    ColumnDesc, ColumnId, ColumnRegistry, DataProvider, ExportOptions, LocalDataProvider,
    ProviderDump, ProviderError, ProviderOptions, RankingId, SearchPattern,
};
use parking_lot::Mutex;
use serde_json::{Value, json};

fn people() -> Vec<Value> {
    vec![
        json!({"name": "Ada", "age": 36, "team": "red"}),
        json!({"name": "Bob", "age": 25, "team": "blue"}),
        json!({"name": "Cy", "age": 51, "team": "red;blue"}),
        json!({"name": "Dee", "age": 25, "team": ""}),
    ]
}

fn descs() -> Vec<ColumnDesc> {
    vec![
        ColumnDesc::string("name"),
        ColumnDesc::number("age", [0.0, 100.0]),
        ColumnDesc::categorical("team", ["red", "blue", "green"]),
    ]
}

fn provider_with(options: ProviderOptions) -> LocalDataProvider {
    LocalDataProvider::new(people(), descs(), options)
}

fn provider() -> LocalDataProvider {
    provider_with(ProviderOptions::default())
}

/// The column of `ranking` whose descriptor reads `column`.
fn column_of(provider: &LocalDataProvider, ranking: RankingId, column: &str) -> ColumnId {
    let registry = provider.core().registry();
    registry
        .ranking(ranking)
        .unwrap()
        .columns()
        .iter()
        .copied()
        .find(|&c| registry.column(c).unwrap().desc().column.as_deref() == Some(column))
        .expect("column not in ranking")
}

fn order(provider: &LocalDataProvider, ranking: RankingId) -> Vec<usize> {
    provider.core().registry().order(ranking).unwrap().to_vec()
}

#[tokio::test]
async fn test_ascending_number_sort() {
    let data = vec![json!({"a": 10}), json!({"a": 5}), json!({"a": 7})];
    let mut provider = LocalDataProvider::new(
        data,
        vec![ColumnDesc::number("a", [0.0, 10.0])],
        ProviderOptions::default(),
    );
    let ranking = provider.push_ranking(None).unwrap();
    let a = provider.push(ranking, ColumnDesc::number("a", [0.0, 10.0])).unwrap().unwrap();
    provider.core_mut().registry_mut().sort_by(ranking, Some(a), true).unwrap();

    assert!(provider.reorder(ranking).await.unwrap());
    assert_eq!(order(&provider, ranking), vec![1, 2, 0]);

    // identical criteria give an identical order
    assert!(provider.reorder(ranking).await.unwrap());
    assert_eq!(order(&provider, ranking), vec![1, 2, 0]);
}

#[tokio::test]
async fn test_sorted_order_respects_compare() {
    let mut provider = provider();
    let ranking = provider.derive_default().unwrap().unwrap();
    let name = column_of(&provider, ranking, "name");
    provider.core_mut().registry_mut().sort_by(ranking, Some(name), false).unwrap();
    provider.reorder(ranking).await.unwrap();

    let order = order(&provider, ranking);
    let rows = provider.view(&order).await.unwrap();
    let registry = provider.core().registry();
    for pair in rows.windows(2) {
        assert!(registry.compare(name, &pair[0], &pair[1]).unwrap().is_ge());
    }
    assert_eq!(order, vec![3, 2, 1, 0]);
}

#[tokio::test]
async fn test_rank_column_follows_sort() {
    let mut provider = provider();
    let ranking = provider.derive_default().unwrap().unwrap();
    let age = column_of(&provider, ranking, "age");
    provider.core_mut().registry_mut().sort_by(ranking, Some(age), false).unwrap();
    provider.reorder(ranking).await.unwrap();

    let rank = provider.core().registry().ranking(ranking).unwrap().columns()[0];
    let rows = provider.view(&[2, 0]).await.unwrap();
    let registry = provider.core().registry();
    assert_eq!(registry.value(rank, &rows[0]).unwrap(), json!(1));
    assert_eq!(registry.value(rank, &rows[1]).unwrap(), json!(2));
}

#[tokio::test]
async fn test_filters_drop_rows_from_order() {
    let mut provider = provider();
    let ranking = provider.derive_default().unwrap().unwrap();
    let age = column_of(&provider, ranking, "age");
    let team = column_of(&provider, ranking, "team");
    let registry = provider.core_mut().registry_mut();
    registry.set_number_filter(age, NumberFilter::new(30.0, 60.0)).unwrap();
    assert!(registry.ranking_is_filtered(ranking).unwrap());

    provider.reorder(ranking).await.unwrap();
    let mut kept = order(&provider, ranking);
    kept.sort_unstable();
    assert_eq!(kept, vec![0, 2]);

    // every category of a row has to be accepted
    provider
        .core_mut()
        .registry_mut()
        .set_categorical_filter(team, Some(CategoricalFilter::Set(vec!["red".into()])))
        .unwrap();
    provider.reorder(ranking).await.unwrap();
    assert_eq!(order(&provider, ranking), vec![0]);
}

#[tokio::test]
async fn test_filter_globally_applies_every_ranking_filter() {
    let mut provider = provider_with(ProviderOptions::default().with_filter_globally(true));
    let first = provider.derive_default().unwrap().unwrap();
    let second = provider.push_ranking(Some(first)).unwrap();
    assert_ne!(first, second);
    provider.flush_reorders().await.unwrap();
    assert_eq!(order(&provider, second).len(), 4);

    let name = column_of(&provider, first, "name");
    provider
        .core_mut()
        .registry_mut()
        .set_string_filter(name, StringFilter::parse("d"))
        .unwrap();
    // both rankings are marked for a re-sort
    assert_eq!(provider.core().pending_reorders(), 2);
    assert_eq!(provider.flush_reorders().await.unwrap(), 2);

    let mut kept = order(&provider, second);
    kept.sort_unstable();
    assert_eq!(kept, vec![0, 3]);
}

#[tokio::test]
async fn test_reorders_wait_for_quiet_period() {
    let options = ProviderOptions::default().with_reorder_delay(Duration::from_secs(60));
    let mut provider = provider_with(options);
    let ranking = provider.derive_default().unwrap().unwrap();
    let age = column_of(&provider, ranking, "age");
    provider.core_mut().registry_mut().sort_by(ranking, Some(age), true).unwrap();

    assert_eq!(provider.core().pending_reorders(), 1);
    assert_eq!(provider.process_reorders(Instant::now()).await.unwrap(), 0);
    assert!(order(&provider, ranking).is_empty());

    let later = Instant::now() + Duration::from_secs(61);
    assert_eq!(provider.process_reorders(later).await.unwrap(), 1);
    assert_eq!(provider.core().pending_reorders(), 0);
    assert_eq!(order(&provider, ranking), vec![1, 3, 0, 2]);
}

#[tokio::test]
async fn test_run_pending_reorders_drains_queue() {
    let options = ProviderOptions::default().with_reorder_delay(Duration::from_millis(5));
    let mut provider = provider_with(options);
    let ranking = provider.derive_default().unwrap().unwrap();

    assert_eq!(provider.run_pending_reorders().await.unwrap(), 1);
    assert_eq!(order(&provider, ranking).len(), 4);
    assert_eq!(provider.core().pending_reorders(), 0);
}

#[tokio::test]
async fn test_removed_ranking_is_not_resorted() {
    let mut provider = provider();
    let ranking = provider.derive_default().unwrap().unwrap();
    assert!(provider.remove_ranking(ranking).unwrap());
    assert!(!provider.remove_ranking(ranking).unwrap());
    assert_eq!(provider.flush_reorders().await.unwrap(), 0);
    assert!(matches!(
        provider.reorder(ranking).await,
        Err(ProviderError::UnknownRanking(_))
    ));
}

#[test]
fn test_ranking_signals() {
    let mut provider = provider();
    let added = Arc::new(Mutex::new(Vec::new()));
    let removed = Arc::new(Mutex::new(Vec::new()));
    let sink = added.clone();
    provider.core().add_ranking.connect(move |(_, index): &(RankingId, usize)| sink.lock().push(*index));
    let sink = removed.clone();
    provider.core().remove_ranking.connect(move |r: &Option<RankingId>| sink.lock().push(*r));

    let first = provider.push_ranking(None).unwrap();
    provider.push_ranking(None).unwrap();
    provider.remove_ranking(first).unwrap();
    provider.clear_rankings().unwrap();

    assert_eq!(*added.lock(), vec![0, 1]);
    assert_eq!(*removed.lock(), vec![Some(first), None]);
    assert!(provider.rankings().is_empty());
    assert_eq!(provider.last_ranking(), None);
}

#[test]
fn test_derive_default_layout() {
    let mut provider = provider();
    let ranking = provider.derive_default().unwrap().unwrap();
    assert_eq!(provider.derive_default().unwrap(), None);

    let registry = provider.core().registry();
    let types: Vec<String> = registry
        .ranking(ranking)
        .unwrap()
        .columns()
        .iter()
        .map(|&c| registry.column(c).unwrap().desc().type_name.clone())
        .collect();
    assert_eq!(types, vec!["rank", "selection", "string", "number", "categorical"]);
    assert_eq!(registry.ranking(ranking).unwrap().id(), "rank0");

    // the first non-support column sorts the ranking
    let sort = registry.sort_criteria(ranking).unwrap();
    assert_eq!(sort.column, Some(column_of(&provider, ranking, "name")));
}

#[test]
fn test_descriptor_references() {
    let mut provider = provider();
    let ranking = provider.derive_default().unwrap().unwrap();
    let columns = provider.columns();
    assert_eq!(columns.len(), 5);
    assert_eq!(columns[0].type_name, "rank");
    assert_eq!(columns[1].type_name, "selection");

    let age = column_of(&provider, ranking, "age");
    let desc = provider.core().registry().column(age).unwrap().desc().clone();
    let desc_ref = provider.to_desc_ref(&desc);
    assert_eq!(desc_ref, json!("number@age"));
    let resolved = provider.from_desc_ref(&desc_ref).unwrap();
    assert_eq!(resolved.column.as_deref(), Some("age"));

    assert_eq!(provider.to_desc_ref(provider.core().rank_desc()), json!("rank"));
    assert!(provider.from_desc_ref(&json!("selection")).unwrap().is_support());
    assert!(provider.from_desc_ref(&json!("number@missing")).is_none());
}

#[test]
fn test_push_desc_announces_descriptor() {
    let mut provider = provider();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    provider
        .core()
        .add_desc
        .connect(move |desc: &Arc<ColumnDesc>| sink.lock().push(desc.label.clone()));

    provider.push_desc(ColumnDesc::boolean("active"));
    assert_eq!(*seen.lock(), vec![Some("active".to_string())]);
    assert_eq!(provider.columns().len(), 6);
}

#[test]
fn test_take_snapshot() {
    let mut provider = provider();
    let ranking = provider.derive_default().unwrap().unwrap();
    let age = column_of(&provider, ranking, "age");

    let snapshot = provider.take_snapshot(age).unwrap();
    assert_eq!(provider.rankings(), &[ranking, snapshot]);

    let registry = provider.core().registry();
    let columns = registry.ranking(snapshot).unwrap().columns().to_vec();
    let types: Vec<&str> = columns
        .iter()
        .map(|&c| registry.column(c).unwrap().desc().type_name.as_str())
        .collect();
    assert_eq!(types, vec!["rank", "selection", "string", "number"]);

    let copy = columns[3];
    assert_ne!(copy, age);
    assert_ne!(registry.column(copy).unwrap().id(), registry.column(age).unwrap().id());
    let sort = registry.sort_criteria(snapshot).unwrap();
    assert_eq!(sort.column, Some(copy));
    assert!(!sort.ascending);
}

#[tokio::test]
async fn test_dump_restore_round_trip() {
    let mut provider = provider();
    let ranking = provider.derive_default().unwrap().unwrap();
    let age = column_of(&provider, ranking, "age");
    let registry = provider.core_mut().registry_mut();
    registry.sort_by(ranking, Some(age), true).unwrap();
    registry.set_width(age, 140.0).unwrap();
    registry.set_number_filter(age, NumberFilter::new(20.0, 40.0)).unwrap();
    provider.select_all(&[1, 3]);

    let dump = provider.dump().unwrap();
    let text = serde_json::to_string(&dump).unwrap();
    let parsed: ProviderDump = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed.rankings.len(), 1);

    let mut restored = provider_with(ProviderOptions::default());
    restored.restore(&parsed).unwrap();
    assert_eq!(restored.selection(), vec![1, 3]);
    assert_eq!(restored.rankings().len(), 1);

    let copy = restored.rankings()[0];
    let before = provider.core().registry();
    let after = restored.core().registry();
    let shape = |registry: &ColumnRegistry, ranking: RankingId| {
        registry
            .ranking(ranking)
            .unwrap()
            .columns()
            .iter()
            .map(|&c| {
                let node = registry.column(c).unwrap();
                (node.desc().type_name.clone(), node.width())
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(shape(before, ranking), shape(after, copy));

    let restored_age = column_of(&restored, copy, "age");
    let sort = after.sort_criteria(copy).unwrap();
    assert_eq!(sort.column, Some(restored_age));
    assert!(sort.ascending);
    let ColumnKind::Number(number) = after.column(restored_age).unwrap().kind() else {
        panic!("expected a number column");
    };
    assert_eq!(number.filter(), NumberFilter::new(20.0, 40.0));

    // restored columns do not reuse dumped ids
    let dumped_ids: Vec<&str> = dump.rankings[0].columns.iter().map(|c| c.id.as_str()).collect();
    for &c in after.ranking(copy).unwrap().columns() {
        assert!(!dumped_ids.contains(&after.column(c).unwrap().id()));
    }

    restored.flush_reorders().await.unwrap();
    assert_eq!(order(&restored, copy), vec![1, 3, 0]);
}

#[test]
fn test_restore_skips_unknown_types() {
    let mut provider = provider();
    let dump = serde_json::from_value(json!({
        "uid": 10,
        "rankings": [{
            "columns": [
                {"id": "col1", "desc": {"type": "sparkline", "column": "x"}, "width": 80},
                {"id": "col2", "desc": "string@name", "width": 120}
            ],
            "sortColumn": {"asc": true, "sortBy": "col2"}
        }]
    }))
    .unwrap();
    provider.restore(&dump).unwrap();

    let ranking = provider.rankings()[0];
    let registry = provider.core().registry();
    let columns = registry.ranking(ranking).unwrap().columns();
    // a rank column is added in front
    assert_eq!(columns.len(), 2);
    assert_eq!(registry.column(columns[0]).unwrap().desc().type_name, "rank");
    assert_eq!(registry.column(columns[1]).unwrap().width(), 120.0);
    assert_eq!(registry.sort_criteria(ranking).unwrap().column, Some(columns[1]));
}

#[test]
fn test_selection_delegates() {
    let provider = provider();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    provider
        .core()
        .selection()
        .selection_changed
        .connect(move |sel: &Vec<usize>| sink.lock().push(sel.clone()));

    provider.select(2);
    provider.select_all(&[0, 2]);
    assert!(provider.is_selected(0));
    assert!(provider.toggle_selection(3, true));
    assert!(!provider.toggle_selection(0, true));
    assert!(provider.toggle_selection(1, false));
    assert_eq!(provider.selection(), vec![1]);
    provider.deselect(1);
    provider.clear_selection();

    assert_eq!(
        *seen.lock(),
        vec![vec![2], vec![0, 2], vec![0, 2, 3], vec![2, 3], vec![1], vec![]]
    );
}

#[tokio::test]
async fn test_search_select_replaces_selection() {
    let mut provider = provider();
    let ranking = provider.derive_default().unwrap().unwrap();
    let name = column_of(&provider, ranking, "name");
    provider.select(0);

    let found = provider.search_select(&SearchPattern::from("d"), name).await.unwrap();
    assert_eq!(found, vec![0, 3]);

    let regex = regex::Regex::new("^[BC]").unwrap();
    let found = provider.search_select(&SearchPattern::from(regex), name).await.unwrap();
    assert_eq!(found, vec![1, 2]);
    assert_eq!(provider.selection(), vec![1, 2]);

    let rows = provider.selected_rows().await.unwrap();
    assert_eq!(rows[0].get("name"), &json!("Bob"));
}

#[tokio::test]
async fn test_export_table() {
    let mut provider = provider();
    let ranking = provider.derive_default().unwrap().unwrap();
    let age = column_of(&provider, ranking, "age");
    provider.core_mut().registry_mut().sort_by(ranking, Some(age), false).unwrap();
    provider.reorder(ranking).await.unwrap();

    let text = provider.export_table(ranking, &ExportOptions::default()).await.unwrap();
    let lines: Vec<&str> = text.split('\n').collect();
    assert_eq!(lines[0], "name\tage\tteam");
    assert_eq!(lines[1], "Cy\t51\tred;blue");
    assert_eq!(lines.len(), 5);

    let csv = ExportOptions::csv().with_header(false);
    let text = provider.export_table(ranking, &csv).await.unwrap();
    assert_eq!(text.lines().next(), Some("\"Cy\",51,\"red;blue\""));
}

#[tokio::test]
async fn test_number_stats_and_category_hist() {
    let mut provider = provider();
    let ranking = provider.derive_default().unwrap().unwrap();
    let age = column_of(&provider, ranking, "age");
    let team = column_of(&provider, ranking, "team");

    let stats: Statistics = provider.number_stats(&[0, 1, 2, 3], age).await.unwrap();
    assert_eq!(stats.count, 4);
    assert!((stats.min - 0.25).abs() < 1e-9);
    assert!((stats.max - 0.51).abs() < 1e-9);
    assert_eq!(stats.hist.iter().map(|b| b.y).sum::<usize>(), 4);

    let hist: CategoricalStatistics = provider.categorical_hist(&[0, 1, 2, 3], team).await.unwrap();
    let counts: Vec<(&str, usize)> = hist.hist.iter().map(|c| (c.cat.as_str(), c.y)).collect();
    assert_eq!(counts, vec![("red", 2), ("blue", 2), ("green", 0)]);
    assert_eq!(hist.missing, 1);
    assert_eq!(hist.max_bin, 2);
}

#[tokio::test]
async fn test_mapping_sample_is_bounded() {
    let data: Vec<Value> = (0..50).map(|i| json!({"v": i})).collect();
    let options = ProviderOptions::default().with_max_mapping_sample(10);
    let mut provider =
        LocalDataProvider::new(data, vec![ColumnDesc::number("v", [0.0, 49.0])], options);
    let col = provider.create(ColumnDesc::number("v", [0.0, 49.0])).unwrap().unwrap();

    let sample = provider.mapping_sample(col).await.unwrap();
    assert_eq!(sample.len(), 10);
    let mut distinct = sample.clone();
    distinct.dedup();
    assert_eq!(distinct.len(), 10);
    assert!(sample.iter().all(|v| (0.0..50.0).contains(v)));
}

#[tokio::test]
async fn test_set_data_marks_rankings_dirty() {
    let mut provider = provider();
    provider.derive_default().unwrap();
    provider.push_ranking(None).unwrap();
    assert_eq!(provider.flush_reorders().await.unwrap(), 2);

    provider.append_data(vec![json!({"name": "Eve", "age": 40})]);
    assert_eq!(provider.data().len(), 5);
    assert_eq!(provider.core().pending_reorders(), 2);
}
