//! Tests for the column tree and rankings without a provider.

use std::sync::Arc;

use lineup::model::{CategoricalFilter, NumberFilter, StringFilter};
use lineup::{
    ColumnDesc, ColumnDump, ColumnEvent, ColumnId, ColumnRegistry, EventKind, RankingId, Row,
};
use parking_lot::Mutex;
use serde_json::{Value, json};

const EPSILON: f64 = 1e-9;

fn number(registry: &mut ColumnRegistry, column: &str) -> ColumnId {
    registry.create_column(column, ColumnDesc::number(column, [0.0, 10.0]))
}

fn widths(registry: &ColumnRegistry, parent: ColumnId) -> Vec<f64> {
    registry
        .children(parent)
        .unwrap()
        .iter()
        .map(|&c| registry.column(c).unwrap().width())
        .collect()
}

fn assert_stack_consistent(registry: &ColumnRegistry, stack: ColumnId) {
    let sum: f64 = widths(registry, stack).iter().sum();
    let width = registry.column(stack).unwrap().width();
    assert!((sum - width).abs() < EPSILON, "children sum {sum} != stack width {width}");
}

/// A ranking `[rank, a, b]` sorted by `a` descending.
fn ranked(registry: &mut ColumnRegistry) -> (RankingId, ColumnId, ColumnId) {
    let ranking = registry.create_ranking("rank0");
    let rank = registry.create_column("rank", ColumnDesc::new("rank"));
    let a = number(registry, "a");
    let b = number(registry, "b");
    for col in [rank, a, b] {
        registry.push(ranking, col).unwrap();
    }
    registry.sort_by(ranking, Some(a), false).unwrap();
    (ranking, a, b)
}

fn desc_ref(desc: &ColumnDesc) -> Value {
    serde_json::to_value(desc).unwrap_or(Value::Null)
}

/// Recreates columns from their dumped descriptor; unparsable descriptors are skipped.
fn factory(registry: &mut ColumnRegistry, dump: &ColumnDump) -> Option<ColumnId> {
    let desc: ColumnDesc = serde_json::from_value(dump.desc.clone()).ok()?;
    Some(registry.create_column(&dump.id, desc))
}

/// A ranking `[rank, stack[a, b], c]` sorted by the nested `a`.
fn nested_sort(registry: &mut ColumnRegistry) -> (RankingId, ColumnId, ColumnId) {
    let ranking = registry.create_ranking("rank0");
    let rank = registry.create_column("rank", ColumnDesc::new("rank"));
    let stack = registry.create_column("stack", ColumnDesc::new("stack"));
    let a = number(registry, "a");
    let b = number(registry, "b");
    let c = number(registry, "c");
    registry.push(ranking, rank).unwrap();
    registry.push(ranking, stack).unwrap();
    registry.push(ranking, c).unwrap();
    registry.push_child(stack, a).unwrap();
    registry.push_child(stack, b).unwrap();
    assert!(registry.sort_by(ranking, Some(a), true).unwrap());
    (ranking, stack, a)
}

#[test]
fn test_set_weights_splits_stack_width() {
    let mut registry = ColumnRegistry::new();
    let stack = registry.create_column("stack", ColumnDesc::new("stack"));
    let a = number(&mut registry, "a");
    let b = number(&mut registry, "b");
    registry.push_child(stack, a).unwrap();
    registry.push_child(stack, b).unwrap();
    registry.set_width(stack, 100.0).unwrap();
    assert_stack_consistent(&registry, stack);

    registry.set_weights(stack, &[25.0, 75.0]).unwrap();
    let widths = widths(&registry, stack);
    assert!((widths[0] - 25.0).abs() < EPSILON);
    assert!((widths[1] - 75.0).abs() < EPSILON);

    let weights = registry.weights(stack).unwrap();
    registry.set_weights(stack, &weights).unwrap();
    assert!((registry.weights(stack).unwrap()[1] - 0.75).abs() < EPSILON);
}

#[test]
fn test_stack_width_invariant_over_edits() {
    let mut registry = ColumnRegistry::new();
    let stack = registry.create_column("stack", ColumnDesc::new("stack"));
    let children: Vec<ColumnId> = ["a", "b", "c", "d"]
        .iter()
        .map(|name| number(&mut registry, name))
        .collect();

    registry.push_child(stack, children[0]).unwrap();
    registry.push_weighted(stack, children[1], 0.3).unwrap();
    assert_stack_consistent(&registry, stack);
    registry.insert_child(stack, children[2], 0).unwrap();
    assert_stack_consistent(&registry, stack);
    registry.set_width(children[1], 42.0).unwrap();
    assert_stack_consistent(&registry, stack);
    registry.insert_child_after(stack, children[3], children[2]).unwrap();
    assert_stack_consistent(&registry, stack);
    registry.remove_child(stack, children[0]).unwrap();
    assert_stack_consistent(&registry, stack);
    registry.set_width(stack, 300.0).unwrap();
    assert_stack_consistent(&registry, stack);
    registry.set_weights(stack, &[1.0]).unwrap();
    assert_stack_consistent(&registry, stack);
}

#[test]
fn test_partial_restore_keeps_stack_width() {
    let mut registry = ColumnRegistry::new();
    let stack = registry.create_column("stack", ColumnDesc::new("stack"));
    let a = number(&mut registry, "a");
    let b = number(&mut registry, "b");
    registry.push_child(stack, a).unwrap();
    registry.push_child(stack, b).unwrap();

    let mut dump = registry.dump_column(stack, &desc_ref).unwrap();
    assert_eq!(dump.width, 200.0);
    dump.children.as_mut().unwrap()[1].desc = json!("bogus@b");

    let mut other = ColumnRegistry::new();
    let restored = factory(&mut other, &dump).unwrap();
    other.restore_column(restored, &dump, &mut factory).unwrap();

    assert_eq!(other.child_count(restored).unwrap(), 1);
    assert_stack_consistent(&other, restored);
    let weights = other.weights(restored).unwrap();
    assert!((weights.iter().sum::<f64>() - 1.0).abs() < EPSILON);
}

#[test]
fn test_insert_after_missing_reference() {
    let mut registry = ColumnRegistry::new();
    let stack = registry.create_column("stack", ColumnDesc::new("stack"));
    let a = number(&mut registry, "a");
    let b = number(&mut registry, "b");
    assert_eq!(registry.insert_child_after(stack, a, b).unwrap(), None);
    assert!(registry.children(stack).unwrap().is_empty());
}

#[test]
fn test_categorical_filter_needs_every_category() {
    let mut registry = ColumnRegistry::new();
    let col = registry.create_column(
        "cat",
        ColumnDesc::categorical("cat", ["c1", "c2", "c3"]).with_separator(";"),
    );
    let row = Row::new(0, json!({"cat": "c1;c3"}));
    assert!(registry.filter(col, &row).unwrap());

    registry
        .set_categorical_filter(col, Some(CategoricalFilter::Set(vec!["c1".into()])))
        .unwrap();
    assert!(!registry.filter(col, &row).unwrap());

    registry
        .set_categorical_filter(
            col,
            Some(CategoricalFilter::Set(vec!["c1".into(), "c3".into()])),
        )
        .unwrap();
    assert!(registry.filter(col, &row).unwrap());
}

#[test]
fn test_removing_sort_column_falls_back() {
    let mut registry = ColumnRegistry::new();
    let (ranking, a, b) = ranked(&mut registry);

    assert!(registry.remove(ranking, a).unwrap());
    let sort = registry.sort_criteria(ranking).unwrap();
    assert_eq!(sort.column, Some(b));
    assert!(!sort.ascending);

    assert!(registry.remove(ranking, b).unwrap());
    assert_eq!(registry.sort_criteria(ranking).unwrap().column, None);
    assert!(!registry.remove(ranking, b).unwrap());
}

#[test]
fn test_destroying_nested_sort_column_falls_back() {
    let mut registry = ColumnRegistry::new();
    let (ranking, stack, a) = nested_sort(&mut registry);

    registry.destroy(a).unwrap();
    let sort = registry.sort_criteria(ranking).unwrap();
    assert_eq!(sort.column, Some(stack));
    assert!(!sort.ascending);

    let dump = registry.dump_ranking(ranking, &desc_ref).unwrap();
    assert_eq!(dump.sort_column.sort_by.as_deref(), Some("stack"));

    let copy = registry.create_ranking("rank1");
    registry.restore_ranking(copy, &dump, &mut factory).unwrap();
    let restored = registry.sort_criteria(copy).unwrap().column.unwrap();
    assert_eq!(registry.column(restored).unwrap().desc().type_name, "stack");
    assert_eq!(registry.child_count(restored).unwrap(), 1);
}

#[test]
fn test_detached_nested_sort_column_stops_sorting() {
    let mut registry = ColumnRegistry::new();
    let (ranking, stack, a) = nested_sort(&mut registry);
    let seen = Arc::new(Mutex::new(0));
    let sink = seen.clone();
    registry.on(EventKind::SortCriteriaChanged, ranking, move |_| *sink.lock() += 1);

    assert!(registry.remove_child(stack, a).unwrap());
    assert_eq!(*seen.lock(), 1);
    assert_eq!(registry.sort_criteria(ranking).unwrap().column, Some(stack));

    let other = registry.create_ranking("rank1");
    registry.push(other, a).unwrap();
    assert_eq!(registry.sort_criteria(other).unwrap().column, Some(a));
    assert_ne!(registry.sort_criteria(ranking).unwrap().column, Some(a));
}

#[test]
fn test_removing_other_nested_child_keeps_sorting() {
    let mut registry = ColumnRegistry::new();
    let (ranking, stack, a) = nested_sort(&mut registry);
    let b = registry.child_at(stack, 1).unwrap().unwrap();

    registry.destroy(b).unwrap();
    let sort = registry.sort_criteria(ranking).unwrap();
    assert_eq!(sort.column, Some(a));
    assert!(sort.ascending);
}

#[test]
fn test_sort_by_foreign_column_is_rejected() {
    let mut registry = ColumnRegistry::new();
    let (ranking, a, _) = ranked(&mut registry);
    let stray = number(&mut registry, "stray");

    assert!(!registry.sort_by(ranking, Some(stray), true).unwrap());
    assert_eq!(registry.sort_criteria(ranking).unwrap().column, Some(a));
}

#[test]
fn test_ranking_filter_is_conjunction() {
    let mut registry = ColumnRegistry::new();
    let (ranking, a, b) = ranked(&mut registry);
    let name = registry.create_column("name", ColumnDesc::string("name"));
    registry.push(ranking, name).unwrap();

    registry.set_number_filter(a, NumberFilter::new(2.0, 8.0)).unwrap();
    registry.set_string_filter(name, StringFilter::parse("o")).unwrap();

    let rows = [
        json!({"a": 5, "b": 1, "name": "bob"}),
        json!({"a": 9, "b": 1, "name": "bob"}),
        json!({"a": 5, "b": 1, "name": "eve"}),
    ];
    for (index, data) in rows.into_iter().enumerate() {
        let row = Row::new(index, data);
        let expected = [a, b, name]
            .iter()
            .all(|&c| registry.filter(c, &row).unwrap());
        assert_eq!(registry.ranking_filter(ranking, &row).unwrap(), expected);
    }
    assert!(registry.ranking_is_filtered(ranking).unwrap());
}

#[test]
fn test_filter_change_dirties_order() {
    let mut registry = ColumnRegistry::new();
    let (ranking, a, _) = ranked(&mut registry);
    let stack = registry.create_column("stack", ColumnDesc::new("stack"));
    let nested = number(&mut registry, "c");
    registry.push_child(stack, nested).unwrap();
    registry.push(ranking, stack).unwrap();

    let seen: Arc<Mutex<Vec<ColumnEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    registry.on(EventKind::DirtyOrder, ranking, move |e| sink.lock().push(e.clone()));

    registry.set_number_filter(nested, NumberFilter::new(1.0, 2.0)).unwrap();
    registry.set_label(nested, "renamed").unwrap();
    assert_eq!(seen.lock().len(), 1);

    // values of the sort column reach the ranking as well
    registry.set_width(a, 150.0).unwrap();
    assert_eq!(seen.lock().len(), 2);
}

#[test]
fn test_sort_tickets_fence_stale_orders() {
    let mut registry = ColumnRegistry::new();
    let (ranking, _, _) = ranked(&mut registry);

    let first = registry.begin_sort(ranking).unwrap();
    let second = registry.begin_sort(ranking).unwrap();
    assert!(registry.apply_order(second, vec![2, 0, 1]).unwrap());
    assert!(!registry.apply_order(first, vec![0, 1, 2]).unwrap());
    assert_eq!(registry.order(ranking).unwrap(), &[2, 0, 1]);
}

#[test]
fn test_nested_compares_lexicographically() {
    let mut registry = ColumnRegistry::new();
    let nested = registry.create_column("nested", ColumnDesc::new("nested"));
    let a = number(&mut registry, "a");
    let b = number(&mut registry, "b");
    registry.push_child(nested, a).unwrap();
    registry.push_child(nested, b).unwrap();

    let x = Row::new(0, json!({"a": 1, "b": 9}));
    let y = Row::new(1, json!({"a": 1, "b": 3}));
    assert!(registry.compare(nested, &x, &y).unwrap().is_gt());
    assert_eq!(registry.column(nested).unwrap().width(), 200.0);
}

#[test]
fn test_fully_qualified_ids() {
    let mut registry = ColumnRegistry::new();
    let (ranking, _, _) = ranked(&mut registry);
    let stack = registry.create_column("stack", ColumnDesc::new("stack"));
    let inner = number(&mut registry, "inner");
    registry.push_child(stack, inner).unwrap();
    registry.push(ranking, stack).unwrap();

    assert_eq!(registry.fqid(inner).unwrap(), "rank0_stack_inner");
    assert_eq!(registry.find_by_path(ranking, "rank0@3@0").unwrap(), Some(inner));
    assert_eq!(registry.find_by_id(ranking, "inner").unwrap(), Some(inner));
    assert_eq!(registry.find_my_ranker(inner), Some(ranking));
}
