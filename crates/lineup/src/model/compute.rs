//! Per-row evaluation: values, numbers, labels, comparison, filtering and color.

use std::cmp::Ordering;

use lineup_core::script::Scope;
use serde_json::Value;

use super::desc::Row;
use super::kinds::{BooleanColumn, CategoricalColumn, ColumnKind, LinkColumn, NumberColumn};
use super::registry::{ColumnNode, ColumnRegistry};
use super::util::{is_missing, number_compare, number_value, string_compare, to_number, to_text};
use super::ColumnId;
use crate::error::ModelResult;

impl ColumnRegistry {
    /// The raw cell as read by the column's accessor.
    pub fn raw_value(&self, col: ColumnId, row: &Row) -> ModelResult<Value> {
        Ok(self.read(self.column(col)?, row))
    }

    /// The typed value of a cell.
    pub fn value(&self, col: ColumnId, row: &Row) -> ModelResult<Value> {
        Ok(self.value_of(self.column(col)?, row))
    }

    /// The normalized number of a number-like column, `None` for other kinds.
    pub fn number(&self, col: ColumnId, row: &Row) -> ModelResult<Option<f64>> {
        Ok(self.number_of(self.column(col)?, row))
    }

    /// The raw number of a number column with missing values substituted.
    pub fn raw_number(&self, col: ColumnId, row: &Row) -> ModelResult<Option<f64>> {
        let node = self.column(col)?;
        Ok(match &node.kind {
            ColumnKind::Number(number) => Some(self.raw_number_of(node, number, row)),
            _ => self.number_of(node, row),
        })
    }

    /// The display text of a cell.
    pub fn label(&self, col: ColumnId, row: &Row) -> ModelResult<String> {
        Ok(self.label_of(self.column(col)?, row))
    }

    /// Ascending comparison of two rows by this column.
    pub fn compare(&self, col: ColumnId, a: &Row, b: &Row) -> ModelResult<Ordering> {
        Ok(self.compare_of(self.column(col)?, a, b))
    }

    /// Whether the row passes the column's filter.
    pub fn filter(&self, col: ColumnId, row: &Row) -> ModelResult<bool> {
        Ok(self.filter_of(self.column(col)?, row))
    }

    /// Whether the column or, for composites, any child has an active filter.
    pub fn is_filtered(&self, col: ColumnId) -> ModelResult<bool> {
        Ok(self.is_filtered_of(self.column(col)?))
    }

    /// The color used to render the cell.
    pub fn color(&self, col: ColumnId, row: &Row) -> ModelResult<Option<String>> {
        Ok(self.color_of(self.column(col)?, row))
    }

    /// The category names of a categorical or ordinal cell.
    pub fn categories(&self, col: ColumnId, row: &Row) -> ModelResult<Vec<String>> {
        let node = self.column(col)?;
        Ok(match node.kind.categorical_state() {
            Some(categorical) => self.row_categories(node, categorical, row),
            None => Vec::new(),
        })
    }

    pub(crate) fn read(&self, node: &ColumnNode, row: &Row) -> Value {
        node.desc.read(row, &self.access_context(node))
    }

    fn child_nodes<'a>(&'a self, node: &'a ColumnNode) -> impl Iterator<Item = &'a ColumnNode> + 'a {
        node.children.iter().filter_map(|&c| self.columns.get(c))
    }

    fn raw_number_of(&self, node: &ColumnNode, number: &NumberColumn, row: &Row) -> f64 {
        let raw = self.read(node, row);
        if is_missing(&raw) {
            number.missing_value
        } else {
            to_number(&raw)
        }
    }

    fn row_categories(&self, node: &ColumnNode, categorical: &CategoricalColumn, row: &Row) -> Vec<String> {
        categorical.split(&to_text(&self.read(node, row)))
    }

    pub(crate) fn value_of(&self, node: &ColumnNode, row: &Row) -> Value {
        match &node.kind {
            ColumnKind::Dummy => Value::String(String::new()),
            ColumnKind::Rank | ColumnKind::Selection => self.read(node, row),
            ColumnKind::String(_) => Value::String(to_text(&self.read(node, row))),
            ColumnKind::Link(link) => Value::String(link_value(link, &self.read(node, row))),
            ColumnKind::Annotate(annotate) => match annotate.annotation(row.index) {
                Some(text) => Value::String(text.to_string()),
                None => Value::String(to_text(&self.read(node, row))),
            },
            ColumnKind::Boolean(_) => Value::Bool(BooleanColumn::truthy(&self.read(node, row))),
            ColumnKind::Categorical(categorical) => self
                .row_categories(node, categorical, row)
                .into_iter()
                .next()
                .map_or(Value::Null, Value::String),
            ColumnKind::Nested(_) => Value::String(
                self.child_nodes(node)
                    .map(|child| to_text(&self.value_of(child, row)))
                    .collect::<Vec<_>>()
                    .join(";"),
            ),
            ColumnKind::Custom(custom) => custom.value(row, &self.access_context(node)),
            _ => number_value(self.number_of(node, row).unwrap_or(f64::NAN)),
        }
    }

    pub(crate) fn number_of(&self, node: &ColumnNode, row: &Row) -> Option<f64> {
        let combined = match &node.kind {
            ColumnKind::Number(number) => {
                return Some(number.mapping.apply(self.raw_number_of(node, number, row)));
            }
            ColumnKind::Ordinal(ordinal) => {
                let best = self
                    .row_categories(node, &ordinal.categorical, row)
                    .iter()
                    .filter_map(|name| ordinal.value_of(name))
                    .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));
                return Some(best.unwrap_or(0.0));
            }
            ColumnKind::Custom(custom) => return custom.number(row, &self.access_context(node)),
            ColumnKind::Stack(_) => {
                let total: f64 = self.child_nodes(node).map(|c| c.width).sum();
                if total > 0.0 {
                    self.child_nodes(node)
                        .map(|c| self.number_of(c, row).unwrap_or(f64::NAN) * c.width / total)
                        .sum()
                } else {
                    f64::NAN
                }
            }
            ColumnKind::Max(_) => self
                .child_numbers(node, row)
                .into_iter()
                .filter(|v| !v.is_nan())
                .reduce(f64::max)
                .unwrap_or(f64::NAN),
            ColumnKind::Min(_) => self
                .child_numbers(node, row)
                .into_iter()
                .filter(|v| !v.is_nan())
                .reduce(f64::min)
                .unwrap_or(f64::NAN),
            ColumnKind::Mean(_) => {
                let values: Vec<f64> = self
                    .child_numbers(node, row)
                    .into_iter()
                    .filter(|v| !v.is_nan())
                    .collect();
                if values.is_empty() {
                    f64::NAN
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                }
            }
            ColumnKind::Script(script) => match &script.program {
                Some(program) => {
                    let scope = Scope::new()
                        .with("children", self.child_raw_numbers(node, row))
                        .with("values", self.child_numbers(node, row));
                    program.evaluate_number(&scope)
                }
                None => f64::NAN,
            },
            _ => return None,
        };
        let missing = node
            .kind
            .composite_number()
            .map_or(0.0, |c| c.missing_value);
        Some(if combined.is_nan() { missing } else { combined })
    }

    fn child_numbers(&self, node: &ColumnNode, row: &Row) -> Vec<f64> {
        self.child_nodes(node)
            .map(|child| self.number_of(child, row).unwrap_or(f64::NAN))
            .collect()
    }

    /// Unmapped child values; children without a raw number report their normalized one.
    fn child_raw_numbers(&self, node: &ColumnNode, row: &Row) -> Vec<f64> {
        self.child_nodes(node)
            .map(|child| match &child.kind {
                ColumnKind::Number(number) => self.raw_number_of(child, number, row),
                _ => self.number_of(child, row).unwrap_or(f64::NAN),
            })
            .collect()
    }

    pub(crate) fn label_of(&self, node: &ColumnNode, row: &Row) -> String {
        match &node.kind {
            ColumnKind::Dummy => String::new(),
            ColumnKind::Number(number) => {
                if number.explicit_format {
                    return number.format.format(self.raw_number_of(node, number, row));
                }
                match self.read(node, row) {
                    Value::Number(n) => number.format.format(n.as_f64().unwrap_or(f64::NAN)),
                    other => to_text(&other),
                }
            }
            ColumnKind::Boolean(boolean) => {
                if BooleanColumn::truthy(&self.read(node, row)) {
                    boolean.true_marker.clone()
                } else {
                    boolean.false_marker.clone()
                }
            }
            ColumnKind::Categorical(categorical) => self.categorical_label(node, categorical, row),
            ColumnKind::Ordinal(ordinal) => self.categorical_label(node, &ordinal.categorical, row),
            ColumnKind::Link(_) => {
                let raw = self.read(node, row);
                match raw.get("alt").or_else(|| raw.get("href")) {
                    Some(text) => to_text(text),
                    None => to_text(&raw),
                }
            }
            ColumnKind::Nested(_) => self
                .child_nodes(node)
                .map(|child| self.label_of(child, row))
                .collect::<Vec<_>>()
                .join(";"),
            ColumnKind::Custom(custom) => custom.label(row, &self.access_context(node)),
            kind => match kind.composite_number() {
                Some(composite) => composite
                    .format
                    .format(self.number_of(node, row).unwrap_or(f64::NAN)),
                None => to_text(&self.value_of(node, row)),
            },
        }
    }

    fn categorical_label(&self, node: &ColumnNode, categorical: &CategoricalColumn, row: &Row) -> String {
        if !categorical.has_labels() {
            return to_text(&self.read(node, row));
        }
        self.row_categories(node, categorical, row)
            .iter()
            .map(|name| {
                categorical
                    .category(name)
                    .map_or(name.as_str(), |c| c.label())
                    .to_string()
            })
            .collect::<Vec<_>>()
            .join(&categorical.separator)
    }

    pub(crate) fn compare_of(&self, node: &ColumnNode, a: &Row, b: &Row) -> Ordering {
        match &node.kind {
            ColumnKind::Dummy | ColumnKind::Rank => Ordering::Equal,
            ColumnKind::Selection | ColumnKind::Boolean(_) => {
                let value = |row: &Row| BooleanColumn::truthy(&self.value_of(node, row));
                value(a).cmp(&value(b))
            }
            ColumnKind::String(_) | ColumnKind::Link(_) | ColumnKind::Annotate(_) => {
                let value = |row: &Row| to_text(&self.value_of(node, row));
                string_compare(&value(a), &value(b))
            }
            ColumnKind::Categorical(categorical) => {
                let va = self.row_categories(node, categorical, a);
                let vb = self.row_categories(node, categorical, b);
                va.iter()
                    .zip(&vb)
                    .map(|(x, y)| x.cmp(y))
                    .find(|o| o.is_ne())
                    .unwrap_or_else(|| va.len().cmp(&vb.len()))
            }
            ColumnKind::Nested(_) => self
                .child_nodes(node)
                .map(|child| self.compare_of(child, a, b))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal),
            ColumnKind::Custom(custom) => custom.compare(a, b, &self.access_context(node)),
            _ => number_compare(
                self.number_of(node, a).unwrap_or(f64::NAN),
                self.number_of(node, b).unwrap_or(f64::NAN),
            ),
        }
    }

    pub(crate) fn filter_of(&self, node: &ColumnNode, row: &Row) -> bool {
        if let Some(string) = node.kind.string_state() {
            return string
                .filter
                .as_ref()
                .is_none_or(|f| f.matches(&self.label_of(node, row)));
        }
        if let Some(categorical) = node.kind.categorical_state() {
            return match &categorical.filter {
                Some(filter) => self
                    .row_categories(node, categorical, row)
                    .iter()
                    .all(|c| filter.accepts(c)),
                None => true,
            };
        }
        match &node.kind {
            ColumnKind::Boolean(boolean) => boolean
                .filter
                .is_none_or(|f| BooleanColumn::truthy(&self.read(node, row)) == f),
            ColumnKind::Number(number) => {
                !number.filter.is_active()
                    || number.filter.accepts(self.raw_number_of(node, number, row))
            }
            ColumnKind::Custom(custom) => custom.filter(row, &self.access_context(node)),
            kind if kind.is_composite() => self.child_nodes(node).all(|c| self.filter_of(c, row)),
            _ => true,
        }
    }

    pub(crate) fn is_filtered_of(&self, node: &ColumnNode) -> bool {
        if let Some(string) = node.kind.string_state() {
            return string.filter.is_some();
        }
        if let Some(categorical) = node.kind.categorical_state() {
            return categorical.filter.is_some();
        }
        match &node.kind {
            ColumnKind::Boolean(boolean) => boolean.filter.is_some(),
            ColumnKind::Number(number) => number.filter.is_active(),
            ColumnKind::Custom(custom) => custom.is_filtered(),
            kind if kind.is_composite() => self.child_nodes(node).any(|c| self.is_filtered_of(c)),
            _ => false,
        }
    }

    pub(crate) fn color_of(&self, node: &ColumnNode, row: &Row) -> Option<String> {
        match &node.kind {
            ColumnKind::Categorical(categorical) => self
                .row_categories(node, categorical, row)
                .first()
                .and_then(|name| categorical.category(name))
                .map(|c| c.color.clone())
                .or_else(|| node.color.clone()),
            ColumnKind::Ordinal(ordinal) => {
                let mut best: Option<(f64, &str)> = None;
                let names = self.row_categories(node, &ordinal.categorical, row);
                for (name, v) in names
                    .iter()
                    .filter_map(|name| ordinal.value_of(name).map(|v| (name.as_str(), v)))
                {
                    if best.is_none_or(|(b, _)| v > b) {
                        best = Some((v, name));
                    }
                }
                best.and_then(|(_, name)| ordinal.categorical.category(name))
                    .map(|c| c.color.clone())
                    .or_else(|| node.color.clone())
            }
            ColumnKind::Max(_) | ColumnKind::Min(_) => {
                let want_max = matches!(node.kind, ColumnKind::Max(_));
                let mut best: Option<(f64, &ColumnNode)> = None;
                for child in self.child_nodes(node) {
                    let v = self.number_of(child, row).unwrap_or(f64::NAN);
                    let better = match best {
                        None => true,
                        Some((b, _)) => {
                            if want_max {
                                v > b
                            } else {
                                v < b
                            }
                        }
                    };
                    if better {
                        best = Some((v, child));
                    }
                }
                match best {
                    Some((_, child)) => self.color_of(child, row),
                    None => node.color.clone(),
                }
            }
            _ => node.color.clone(),
        }
    }
}

fn link_value(link: &LinkColumn, raw: &Value) -> String {
    if let Some(href) = raw.get("href") {
        return to_text(href);
    }
    let text = to_text(raw);
    match &link.link {
        Some(pattern) if !text.is_empty() => pattern.replace("$1", &text),
        _ => text,
    }
}
