//! Kind-specific mutations: filters, mappings, scripts, links, annotations and selection.
//!
//! Setters return `Ok(false)` when the column is not of the expected kind.

use serde_json::Value;

use super::desc::Row;
use super::events::{EventDetail, EventKind};
use super::kinds::{
    BooleanColumn, CategoricalFilter, ColumnKind, NumberFilter, StringFilter,
};
use super::mapping::MappingFunction;
use super::registry::ColumnRegistry;
use super::util::to_text;
use super::ColumnId;
use crate::error::ModelResult;

const FILTER_EVENTS: [EventKind; 3] = [
    EventKind::FilterChanged,
    EventKind::DirtyValues,
    EventKind::Dirty,
];

impl ColumnRegistry {
    fn filter_changed(&self, col: ColumnId) -> ModelResult<bool> {
        self.fire(col.into(), &FILTER_EVENTS, EventDetail::None);
        Ok(true)
    }

    /// Set the filter of a string, link or annotate column.
    pub fn set_string_filter(&mut self, col: ColumnId, filter: Option<StringFilter>) -> ModelResult<bool> {
        let Some(state) = self.column_mut(col)?.kind.string_state_mut() else {
            return Ok(false);
        };
        if state.filter == filter {
            return Ok(true);
        }
        state.filter = filter;
        self.filter_changed(col)
    }

    pub fn set_boolean_filter(&mut self, col: ColumnId, filter: Option<bool>) -> ModelResult<bool> {
        let ColumnKind::Boolean(boolean) = &mut self.column_mut(col)?.kind else {
            return Ok(false);
        };
        if boolean.filter == filter {
            return Ok(true);
        }
        boolean.filter = filter;
        self.filter_changed(col)
    }

    /// Set the raw-space range filter of a number column.
    pub fn set_number_filter(&mut self, col: ColumnId, filter: NumberFilter) -> ModelResult<bool> {
        let ColumnKind::Number(number) = &mut self.column_mut(col)?.kind else {
            return Ok(false);
        };
        let filter = NumberFilter::new(filter.min, filter.max);
        if number.filter == filter {
            return Ok(true);
        }
        number.filter = filter;
        self.filter_changed(col)
    }

    /// Set the filter of a categorical or ordinal column.
    pub fn set_categorical_filter(
        &mut self,
        col: ColumnId,
        filter: Option<CategoricalFilter>,
    ) -> ModelResult<bool> {
        let Some(state) = self.column_mut(col)?.kind.categorical_state_mut() else {
            return Ok(false);
        };
        if state.filter == filter {
            return Ok(true);
        }
        state.filter = filter;
        self.filter_changed(col)
    }

    /// Replace the mapping function of a number column.
    pub fn set_mapping(&mut self, col: ColumnId, mapping: MappingFunction) -> ModelResult<bool> {
        let ColumnKind::Number(number) = &mut self.column_mut(col)?.kind else {
            return Ok(false);
        };
        if number.mapping == mapping {
            return Ok(true);
        }
        tracing::debug!(target: lineup_core::logging::targets::MAPPING, ?mapping, "mapping changed");
        number.mapping = mapping;
        self.fire(
            col.into(),
            &[EventKind::MappingChanged, EventKind::DirtyValues, EventKind::Dirty],
            EventDetail::None,
        );
        Ok(true)
    }

    /// Go back to the mapping the number column was created with.
    pub fn restore_original_mapping(&mut self, col: ColumnId) -> ModelResult<bool> {
        let original = match &self.column(col)?.kind {
            ColumnKind::Number(number) => number.original.clone(),
            _ => return Ok(false),
        };
        self.set_mapping(col, original)
    }

    /// Fill in an inferred raw domain without firing events.
    pub(crate) fn init_number_domain(&mut self, col: ColumnId, domain: [f64; 2]) -> ModelResult<()> {
        if let ColumnKind::Number(number) = &mut self.column_mut(col)?.kind {
            number.mapping.set_domain(domain);
            number.original.set_domain(domain);
        }
        Ok(())
    }

    /// Replace the per-category values of an ordinal column.
    ///
    /// Values beyond the category count are ignored; missing ones keep their value.
    pub fn set_ordinal_mapping(&mut self, col: ColumnId, values: &[f64]) -> ModelResult<bool> {
        let ColumnKind::Ordinal(ordinal) = &mut self.column_mut(col)?.kind else {
            return Ok(false);
        };
        let mut mapping = ordinal.mapping.clone();
        for (slot, value) in mapping.iter_mut().zip(values) {
            *slot = *value;
        }
        if mapping == ordinal.mapping {
            return Ok(true);
        }
        ordinal.mapping = mapping;
        self.fire(
            col.into(),
            &[EventKind::MappingChanged, EventKind::DirtyValues, EventKind::Dirty],
            EventDetail::None,
        );
        Ok(true)
    }

    /// Replace the combination script of a script column.
    pub fn set_script(&mut self, col: ColumnId, script: &str) -> ModelResult<bool> {
        let ColumnKind::Script(column) = &mut self.column_mut(col)?.kind else {
            return Ok(false);
        };
        if column.script == script {
            return Ok(true);
        }
        column.set_script(script);
        self.fire(
            col.into(),
            &[EventKind::ScriptChanged, EventKind::DirtyValues, EventKind::Dirty],
            EventDetail::None,
        );
        Ok(true)
    }

    /// Set the `$1` link pattern of a link column.
    pub fn set_link(&mut self, col: ColumnId, link: Option<String>) -> ModelResult<bool> {
        let ColumnKind::Link(column) = &mut self.column_mut(col)?.kind else {
            return Ok(false);
        };
        if column.link == link {
            return Ok(true);
        }
        column.link = link;
        self.fire(
            col.into(),
            &[
                EventKind::LinkChanged,
                EventKind::DirtyHeader,
                EventKind::DirtyValues,
                EventKind::Dirty,
            ],
            EventDetail::None,
        );
        Ok(true)
    }

    /// Override the value of one row of an annotate column.
    ///
    /// An empty text drops the override.
    pub fn set_annotation(&mut self, col: ColumnId, row: &Row, text: &str) -> ModelResult<bool> {
        let node = self.column(col)?;
        if !matches!(node.kind, ColumnKind::Annotate(_)) {
            return Ok(false);
        }
        if to_text(&self.value_of(node, row)) == text {
            return Ok(true);
        }
        if let ColumnKind::Annotate(annotate) = &mut self.column_mut(col)?.kind {
            if text.is_empty() {
                annotate.annotations.remove(&row.index);
            } else {
                annotate.annotations.insert(row.index, text.to_string());
            }
        }
        self.fire(
            col.into(),
            &[EventKind::ValueChanged, EventKind::DirtyValues, EventKind::Dirty],
            EventDetail::Row(row.index),
        );
        Ok(true)
    }

    /// Write the selection state of a row through the column's setter.
    pub fn set_selected(&mut self, col: ColumnId, row: &Row, selected: bool) -> ModelResult<bool> {
        let node = self.column(col)?;
        if !matches!(node.kind, ColumnKind::Selection) {
            return Ok(false);
        }
        if BooleanColumn::truthy(&self.value_of(node, row)) == selected {
            return Ok(true);
        }
        if let Some(setter) = &node.desc.setter {
            setter(row, &Value::Bool(selected));
        }
        self.fire(
            col.into(),
            &[EventKind::Select],
            EventDetail::Selected {
                row: row.index,
                selected,
            },
        );
        Ok(true)
    }

    /// Flip the selection state of a row; returns the new state.
    pub fn toggle_selected(&mut self, col: ColumnId, row: &Row) -> ModelResult<bool> {
        let selected = !BooleanColumn::truthy(&self.value(col, row)?);
        self.set_selected(col, row, selected)?;
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::model::{ColumnDesc, ScaleMapping, ScaleType};

    #[test]
    fn test_string_filter_fires_filter_changed() {
        let mut registry = ColumnRegistry::new();
        let col = registry.create_column("s", ColumnDesc::string("s"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        registry.on(EventKind::FilterChanged, col, move |e| sink.lock().push(e.kind));

        let filter = StringFilter::parse("ab");
        assert!(registry.set_string_filter(col, filter.clone()).unwrap());
        assert!(registry.set_string_filter(col, filter).unwrap());
        assert_eq!(seen.lock().len(), 1);

        assert!(!registry.filter(col, &Row::new(0, json!({"s": "xyz"}))).unwrap());
        assert!(registry.filter(col, &Row::new(1, json!({"s": "xABy"}))).unwrap());

        let number = registry.create_column("n", ColumnDesc::number("n", [0.0, 1.0]));
        assert!(!registry.set_string_filter(number, None).unwrap());
    }

    #[test]
    fn test_number_filter_on_raw_values() {
        let mut registry = ColumnRegistry::new();
        let col = registry.create_column("n", ColumnDesc::number("n", [0.0, 100.0]));
        registry
            .set_number_filter(col, NumberFilter::new(10.0, f64::NAN))
            .unwrap();
        assert!(registry.is_filtered(col).unwrap());
        assert!(!registry.filter(col, &Row::new(0, json!({"n": 5}))).unwrap());
        assert!(registry.filter(col, &Row::new(0, json!({"n": 50}))).unwrap());
    }

    #[test]
    fn test_set_mapping_is_noop_when_equal() {
        let mut registry = ColumnRegistry::new();
        let col = registry.create_column("n", ColumnDesc::number("n", [0.0, 10.0]));
        let seen = Arc::new(Mutex::new(0));
        let sink = seen.clone();
        registry.on(EventKind::MappingChanged, col, move |_| *sink.lock() += 1);

        let same = MappingFunction::Scale(ScaleMapping::linear([0.0, 10.0]));
        registry.set_mapping(col, same).unwrap();
        assert_eq!(*seen.lock(), 0);

        let sqrt = MappingFunction::Scale(ScaleMapping::new([0.0, 100.0], ScaleType::Sqrt, [0.0, 1.0]));
        registry.set_mapping(col, sqrt).unwrap();
        assert_eq!(*seen.lock(), 1);
        let value = registry.number(col, &Row::new(0, json!({"n": 25}))).unwrap().unwrap();
        assert!((value - 0.5).abs() < 1e-9);

        registry.restore_original_mapping(col).unwrap();
        assert_eq!(*seen.lock(), 2);
    }

    #[test]
    fn test_annotation_overrides_and_reverts() {
        let mut registry = ColumnRegistry::new();
        let col = registry.create_column("a", ColumnDesc::new("annotate").with_column("a"));
        let row = Row::new(3, json!({"a": "orig"}));

        registry.set_annotation(col, &row, "note").unwrap();
        assert_eq!(registry.value(col, &row).unwrap(), json!("note"));
        registry.set_annotation(col, &row, "").unwrap();
        assert_eq!(registry.value(col, &row).unwrap(), json!("orig"));
    }

    #[test]
    fn test_selection_uses_setter() {
        let selected = Arc::new(Mutex::new(HashSet::new()));
        let read = selected.clone();
        let write = selected.clone();
        let desc = ColumnDesc::new("selection")
            .with_accessor(move |row, _| json!(read.lock().contains(&row.index)))
            .with_setter(move |row, value| {
                if value.as_bool() == Some(true) {
                    write.lock().insert(row.index);
                } else {
                    write.lock().remove(&row.index);
                }
            });
        let mut registry = ColumnRegistry::new();
        let col = registry.create_column("sel", desc);
        let row = Row::new(2, json!({}));

        assert!(registry.toggle_selected(col, &row).unwrap());
        assert!(selected.lock().contains(&2));
        assert!(!registry.toggle_selected(col, &row).unwrap());
        assert!(selected.lock().is_empty());
    }

    #[test]
    fn test_ordinal_mapping_and_script() {
        let mut registry = ColumnRegistry::new();
        let ordinal = registry.create_column("o", ColumnDesc::new("ordinal").with_column("o").with_categories(["a", "b"]));
        registry.set_ordinal_mapping(ordinal, &[0.1, 0.9, 0.3]).unwrap();
        assert_eq!(registry.number(ordinal, &Row::new(0, json!({"o": "b"}))).unwrap(), Some(0.9));

        let script = registry.create_column("s", ColumnDesc::new("script"));
        assert!(registry.set_script(script, "return d3.min(values)").unwrap());
        assert!(!registry.set_script(ordinal, "x").unwrap());
    }
}
