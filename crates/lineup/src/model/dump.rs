//! Serializable column and ranking state.
//!
//! Descriptors are not stored inline: a caller-supplied [`DescRefFn`] turns
//! each descriptor into a reference, and a factory turns references back into
//! columns on restore.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::kinds::{Alignment, CategoricalFilter, ColumnKind, NumberFilter, StringFilter};
use super::mapping::{MappingDump, MappingFunction};
use super::registry::{ColumnNode, ColumnRegistry};
use super::util::{number_value, to_number};
use super::{ColumnDesc, ColumnId, RankingId};
use crate::error::ModelResult;

/// Turns a descriptor into the reference stored in dumps.
pub type DescRefFn = dyn Fn(&ColumnDesc) -> Value;

/// Creates a detached column from a dump; `None` if the descriptor cannot be resolved.
pub type RestoreFactory<'a> = dyn FnMut(&mut ColumnRegistry, &ColumnDump) -> Option<ColumnId> + 'a;

/// One `from -> to` entry of an ordinal mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdinalMappingEntry {
    pub from: String,
    pub to: f64,
}

/// The dumped state of one column and its subtree.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDump {
    pub id: String,
    pub desc: Value,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub compressed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<MappingDump>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<Vec<OrdinalMappingEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ColumnDump>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    /// Fields of custom column kinds.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SortColumnDump {
    pub asc: bool,
    #[serde(rename = "sortBy", default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
}

/// The dumped state of a ranking.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingDump {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub columns: Vec<ColumnDump>,
    #[serde(default)]
    pub sort_column: SortColumnDump,
}

fn dump_number_filter(filter: &NumberFilter) -> Value {
    serde_json::json!({"min": number_value(filter.min), "max": number_value(filter.max)})
}

fn restore_number_filter(value: &Value) -> NumberFilter {
    let bound = |key: &str| value.get(key).map_or(f64::NAN, to_number);
    NumberFilter::new(bound("min"), bound("max"))
}

impl ColumnRegistry {
    /// Dump a column and its subtree.
    pub fn dump_column(&self, col: ColumnId, to_desc_ref: &DescRefFn) -> ModelResult<ColumnDump> {
        let node = self.column(col)?;
        let mut dump = ColumnDump {
            id: node.id.clone(),
            desc: to_desc_ref(&node.desc),
            width: node.width,
            compressed: node.compressed,
            ..Default::default()
        };
        if node.label != ColumnNode::default_label(&node.desc, &node.id) {
            dump.label = Some(node.label.clone());
        }
        if node.color.is_some() && node.color != ColumnNode::default_color(&node.desc) {
            dump.color = node.color.clone();
        }

        match &node.kind {
            ColumnKind::String(_) | ColumnKind::Link(_) | ColumnKind::Annotate(_) => {
                if let Some(string) = node.kind.string_state() {
                    dump.filter = string.filter.as_ref().map(|f| Value::String(f.dump()));
                    dump.alignment = Some(string.alignment.as_str().to_string());
                }
                if let ColumnKind::Link(link) = &node.kind
                    && link.link != node.desc.link
                {
                    dump.link = link.link.clone();
                }
                if let ColumnKind::Annotate(annotate) = &node.kind {
                    dump.annotations = Some(
                        annotate
                            .annotations
                            .iter()
                            .map(|(row, text)| (row.to_string(), text.clone()))
                            .collect(),
                    );
                }
            }
            ColumnKind::Boolean(boolean) => {
                dump.filter = boolean.filter.map(Value::Bool);
            }
            ColumnKind::Number(number) => {
                dump.map = Some(number.mapping.dump());
                dump.filter = Some(dump_number_filter(&number.filter));
                dump.missing_value = Some(number.missing_value);
            }
            ColumnKind::Categorical(categorical) => {
                dump.filter = categorical.filter.as_ref().map(CategoricalFilter::dump);
            }
            ColumnKind::Ordinal(ordinal) => {
                dump.filter = ordinal.categorical.filter.as_ref().map(CategoricalFilter::dump);
                dump.mapping = Some(
                    ordinal
                        .categorical
                        .categories
                        .iter()
                        .zip(&ordinal.mapping)
                        .map(|(cat, to)| OrdinalMappingEntry {
                            from: cat.name.clone(),
                            to: *to,
                        })
                        .collect(),
                );
            }
            ColumnKind::Stack(stack) => dump.collapsed = Some(stack.collapsed),
            ColumnKind::Nested(nested) => dump.collapsed = Some(nested.collapsed),
            ColumnKind::Script(script) => dump.script = Some(script.script.clone()),
            ColumnKind::Custom(custom) => dump.extra = custom.dump(),
            _ => {}
        }
        if let Some(composite) = node.kind.composite_number() {
            dump.missing_value = Some(composite.missing_value);
        }
        if node.kind.is_composite() {
            dump.children = Some(
                node.children
                    .iter()
                    .map(|&child| self.dump_column(child, to_desc_ref))
                    .collect::<ModelResult<_>>()?,
            );
        }
        Ok(dump)
    }

    /// Apply a dump to an existing, detached column, creating its children through `factory`.
    pub fn restore_column(
        &mut self,
        col: ColumnId,
        dump: &ColumnDump,
        factory: &mut RestoreFactory<'_>,
    ) -> ModelResult<()> {
        let node = self.column_mut(col)?;
        if let Some(string) = node.kind.string_state_mut() {
            string.filter = dump
                .filter
                .as_ref()
                .and_then(Value::as_str)
                .and_then(StringFilter::parse);
            if let Some(alignment) = &dump.alignment {
                string.alignment = Alignment::parse(alignment);
            }
        }
        match &mut node.kind {
            ColumnKind::Link(link) => {
                if dump.link.is_some() {
                    link.link = dump.link.clone();
                }
            }
            ColumnKind::Annotate(annotate) => {
                if let Some(annotations) = &dump.annotations {
                    annotate.annotations = annotations
                        .iter()
                        .filter_map(|(row, text)| Some((row.parse().ok()?, text.clone())))
                        .collect();
                }
            }
            ColumnKind::Boolean(boolean) => {
                boolean.filter = dump.filter.as_ref().and_then(Value::as_bool);
            }
            ColumnKind::Number(number) => {
                if let Some(map) = &dump.map {
                    number.mapping = MappingFunction::restore(map);
                }
                if let Some(filter) = &dump.filter {
                    number.filter = restore_number_filter(filter);
                }
                if let Some(missing) = dump.missing_value {
                    number.missing_value = missing;
                }
            }
            ColumnKind::Categorical(categorical) => {
                categorical.filter = dump.filter.as_ref().and_then(CategoricalFilter::parse);
            }
            ColumnKind::Ordinal(ordinal) => {
                ordinal.categorical.filter = dump.filter.as_ref().and_then(CategoricalFilter::parse);
                for entry in dump.mapping.iter().flatten() {
                    if let Some(i) = ordinal
                        .categorical
                        .categories
                        .iter()
                        .position(|c| c.name == entry.from)
                    {
                        ordinal.mapping[i] = entry.to;
                    }
                }
            }
            ColumnKind::Stack(stack) => stack.collapsed = dump.collapsed.unwrap_or(false),
            ColumnKind::Nested(nested) => nested.collapsed = dump.collapsed.unwrap_or(false),
            ColumnKind::Script(script) => {
                if let Some(source) = &dump.script {
                    script.set_script(source);
                }
            }
            ColumnKind::Custom(custom) => custom.restore(&dump.extra),
            _ => {}
        }
        if let (Some(composite), Some(missing)) = (node.kind.composite_number_mut(), dump.missing_value) {
            composite.missing_value = missing;
        }

        for child_dump in dump.children.iter().flatten() {
            let Some(child) = factory(self, child_dump) else {
                tracing::warn!(
                    target: lineup_core::logging::targets::COLUMN,
                    id = %child_dump.id,
                    "skipped child with unresolvable descriptor"
                );
                continue;
            };
            self.restore_column(child, child_dump, factory)?;
            self.push_child(col, child)?;
        }

        let node = self.column_mut(col)?;
        // stacks and nested columns already span their restored children
        let spans_children = matches!(node.kind, ColumnKind::Stack(_) | ColumnKind::Nested(_))
            && !node.children.is_empty();
        if dump.width > 0.0 && !spans_children {
            node.width = dump.width;
        }
        if let Some(label) = &dump.label {
            node.label = label.clone();
        }
        if let Some(color) = &dump.color {
            node.color = Some(color.clone());
        }
        node.compressed = dump.compressed;
        Ok(())
    }

    pub fn dump_ranking(&self, ranking: RankingId, to_desc_ref: &DescRefFn) -> ModelResult<RankingDump> {
        let node = self.ranking(ranking)?;
        let columns = node
            .columns
            .iter()
            .map(|&col| self.dump_column(col, to_desc_ref))
            .collect::<ModelResult<_>>()?;
        let sort_by = match node.sort_column {
            Some(col) => Some(self.column(col)?.id.clone()),
            None => None,
        };
        Ok(RankingDump {
            id: Some(node.id.clone()),
            columns,
            sort_column: SortColumnDump {
                asc: node.ascending,
                sort_by,
            },
        })
    }

    /// Replace the columns of a ranking with the dumped ones and restore the sort criteria.
    pub fn restore_ranking(
        &mut self,
        ranking: RankingId,
        dump: &RankingDump,
        factory: &mut RestoreFactory<'_>,
    ) -> ModelResult<()> {
        let old = self.ranking(ranking)?.columns.clone();
        self.clear(ranking)?;
        for col in old {
            self.destroy(col)?;
        }
        for column_dump in &dump.columns {
            let Some(col) = factory(self, column_dump) else {
                tracing::warn!(
                    target: lineup_core::logging::targets::RANKING,
                    id = %column_dump.id,
                    "skipped column with unresolvable descriptor"
                );
                continue;
            };
            self.restore_column(col, column_dump, factory)?;
            self.push(ranking, col)?;
        }
        let sort_column = match &dump.sort_column.sort_by {
            Some(id) => self.find_by_id(ranking, id)?,
            None => None,
        };
        match sort_column {
            Some(col) => {
                self.sort_by(ranking, Some(col), dump.sort_column.asc)?;
            }
            None if dump.sort_column.sort_by.is_some() => {
                tracing::debug!(target: lineup_core::logging::targets::RANKING, "dumped sort column not found");
            }
            None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::model::{ColumnDesc, Row, ScaleMapping, ScaleType};

    fn desc_ref(desc: &ColumnDesc) -> Value {
        serde_json::to_value(desc).unwrap_or(Value::Null)
    }

    fn factory(registry: &mut ColumnRegistry, dump: &ColumnDump) -> Option<ColumnId> {
        let desc: ColumnDesc = serde_json::from_value(dump.desc.clone()).ok()?;
        Some(registry.create_column(&dump.id, Arc::new(desc)))
    }

    #[test]
    fn test_ranking_round_trip() {
        let mut registry = ColumnRegistry::new();
        let ranking = registry.create_ranking("rank0");
        let name = registry.create_column("name", ColumnDesc::string("name"));
        let stack = registry.create_column("stack", ColumnDesc::new("stack").with_label("Combined"));
        let a = registry.create_column("a", ColumnDesc::number("a", [0.0, 10.0]));
        let b = registry.create_column("b", ColumnDesc::number("b", [0.0, 10.0]));
        registry.push(ranking, name).unwrap();
        registry.push(ranking, stack).unwrap();
        registry.push_child(stack, a).unwrap();
        registry.push_weighted(stack, b, 0.25).unwrap();
        registry.set_label(name, "Name").unwrap();
        registry
            .set_mapping(a, MappingFunction::Scale(ScaleMapping::new([0.0, 100.0], ScaleType::Log, [0.0, 1.0])))
            .unwrap();
        registry.set_number_filter(b, NumberFilter::new(2.0, f64::NAN)).unwrap();
        registry.set_string_filter(name, StringFilter::parse("REGEX:^x")).unwrap();
        registry.sort_by(ranking, Some(stack), true).unwrap();

        let dump = registry.dump_ranking(ranking, &desc_ref).unwrap();
        let json = serde_json::to_value(&dump).unwrap();
        assert_eq!(json["sortColumn"], json!({"asc": true, "sortBy": "stack"}));
        assert_eq!(json["columns"][0]["label"], json!("Name"));
        assert_eq!(json["columns"][0]["filter"], json!("REGEX:^x"));
        assert_eq!(json["columns"][1]["children"][1]["filter"], json!({"min": 2.0, "max": null}));

        let mut other = ColumnRegistry::new();
        let copy = other.create_ranking("rank1");
        let parsed: RankingDump = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.columns.len(), dump.columns.len());
        other.restore_ranking(copy, &parsed, &mut factory).unwrap();

        assert_eq!(other.dump_ranking(copy, &desc_ref).unwrap().columns, parsed.columns);
        let criteria = other.sort_criteria(copy).unwrap();
        assert!(criteria.ascending);
        let sort = criteria.column.unwrap();
        assert_eq!(other.column(sort).unwrap().label(), "Combined");
        let weights = other.weights(sort).unwrap();
        assert!((weights[1] - 0.25).abs() < 1e-9);

        let row = Row::new(0, json!({"name": "xavier", "a": 10, "b": 1}));
        assert!(other.ranking_filter(copy, &row).is_ok_and(|pass| !pass));
    }

    #[test]
    fn test_defaults_are_not_dumped() {
        let mut registry = ColumnRegistry::new();
        let col = registry.create_column("c", ColumnDesc::categorical("c", ["a"]).with_color("red"));
        let dump = registry.dump_column(col, &desc_ref).unwrap();
        assert_eq!(dump.label, None);
        assert_eq!(dump.color, None);
        assert_eq!(dump.filter, None);
    }
}
