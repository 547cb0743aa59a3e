//! Column descriptors and row access.
//!
//! A [`ColumnDesc`] is the serializable recipe a provider turns into a column.
//! Besides the data fields it may carry an [`Accessor`] (how to read a cell
//! from a [`Row`]) and a [`Setter`]; both are skipped by serde and re-attached
//! by the provider when descriptors are restored by reference.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::RankingId;
use super::mapping::MappingDump;

/// A data row: its position in the backing data set and the caller-owned record.
///
/// The record is shared and never mutated by the engine.
#[derive(Debug, Clone)]
pub struct Row {
    /// Position in the provider's data set.
    pub index: usize,
    /// The caller-owned record.
    pub data: Arc<Value>,
}

static NULL: Value = Value::Null;

impl Row {
    /// Wrap a record at `index`.
    pub fn new(index: usize, data: impl Into<Arc<Value>>) -> Self {
        Self {
            index,
            data: data.into(),
        }
    }

    /// The field `key` of an object record, or `null`.
    pub fn get(&self, key: &str) -> &Value {
        self.data.get(key).unwrap_or(&NULL)
    }
}

/// Context passed to an [`Accessor`].
#[derive(Debug, Clone, Copy)]
pub struct AccessContext<'a> {
    /// Id of the column reading the value.
    pub column: &'a str,
    /// Descriptor of the column reading the value.
    pub desc: &'a ColumnDesc,
    /// The ranking the column currently belongs to, if any.
    pub ranking: Option<RankingId>,
}

/// Reads a cell value from a row.
pub type Accessor = Arc<dyn Fn(&Row, &AccessContext<'_>) -> Value + Send + Sync>;

/// Writes a cell value back (used by selection columns).
pub type Setter = Arc<dyn Fn(&Row, &Value) + Send + Sync>;

/// A categorical category, either a bare name or a detailed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CategoryDesc {
    /// Just the category name.
    Name(String),
    /// Name plus optional numeric value, label and color.
    Detailed {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
}

impl CategoryDesc {
    pub fn name(&self) -> &str {
        match self {
            CategoryDesc::Name(name) | CategoryDesc::Detailed { name, .. } => name,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            CategoryDesc::Detailed { label, .. } => label.as_deref(),
            CategoryDesc::Name(_) => None,
        }
    }

    pub fn color(&self) -> Option<&str> {
        match self {
            CategoryDesc::Detailed { color, .. } => color.as_deref(),
            CategoryDesc::Name(_) => None,
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            CategoryDesc::Detailed { value, .. } => *value,
            CategoryDesc::Name(_) => None,
        }
    }
}

impl From<&str> for CategoryDesc {
    fn from(name: &str) -> Self {
        CategoryDesc::Name(name.to_string())
    }
}

/// The serializable description of a column.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDesc {
    /// Registered column type name, e.g. `number` or `stack`.
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Field of the row record holding the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_class: Option<String>,
    /// Raw value domain of a number column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<[f64; 2]>,
    /// Output range of a number column's default mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<[f64; 2]>,
    /// Explicit mapping function of a number column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<MappingDump>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<CategoryDesc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
    /// Link pattern with a `$1` placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<String>,
    /// Combination script of a script column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_marker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub false_marker: Option<String>,
    /// Fields of custom column types.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
    #[serde(skip)]
    pub accessor: Option<Accessor>,
    #[serde(skip)]
    pub setter: Option<Setter>,
}

impl fmt::Debug for ColumnDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDesc")
            .field("type", &self.type_name)
            .field("label", &self.label)
            .field("column", &self.column)
            .field("domain", &self.domain)
            .field("categories", &self.categories)
            .field("accessor", &self.accessor.is_some())
            .field("setter", &self.setter.is_some())
            .finish_non_exhaustive()
    }
}

impl PartialEq for ColumnDesc {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
            && self.label == other.label
            && self.column == other.column
            && self.domain == other.domain
            && self.categories == other.categories
            && self.script == other.script
            && self.link == other.link
    }
}

/// Type names of support columns: they do not represent data.
pub const SUPPORT_TYPES: [&str; 3] = ["rank", "selection", "actions"];

impl ColumnDesc {
    /// A descriptor of the given type without further settings.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    /// A number column reading `column` with the given raw domain.
    pub fn number(column: impl Into<String>, domain: [f64; 2]) -> Self {
        Self::new("number").with_column(column).with_domain(domain)
    }

    /// A string column reading `column`.
    pub fn string(column: impl Into<String>) -> Self {
        Self::new("string").with_column(column)
    }

    /// A categorical column reading `column`.
    pub fn categorical<C: Into<CategoryDesc>>(
        column: impl Into<String>,
        categories: impl IntoIterator<Item = C>,
    ) -> Self {
        Self::new("categorical")
            .with_column(column)
            .with_categories(categories)
    }

    /// A boolean column reading `column`.
    pub fn boolean(column: impl Into<String>) -> Self {
        Self::new("boolean").with_column(column)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_domain(mut self, domain: [f64; 2]) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn with_range(mut self, range: [f64; 2]) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_map(mut self, map: MappingDump) -> Self {
        self.map = Some(map);
        self
    }

    pub fn with_missing_value(mut self, value: f64) -> Self {
        self.missing_value = Some(value);
        self
    }

    pub fn with_number_format(mut self, format: impl Into<String>) -> Self {
        self.number_format = Some(format.into());
        self
    }

    pub fn with_categories<C: Into<CategoryDesc>>(
        mut self,
        categories: impl IntoIterator<Item = C>,
    ) -> Self {
        self.categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    pub fn with_accessor<F>(mut self, accessor: F) -> Self
    where
        F: Fn(&Row, &AccessContext<'_>) -> Value + Send + Sync + 'static,
    {
        self.accessor = Some(Arc::new(accessor));
        self
    }

    pub fn with_setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&Row, &Value) + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(setter));
        self
    }

    /// Whether this describes a rank, selection or actions column.
    pub fn is_support(&self) -> bool {
        SUPPORT_TYPES.contains(&self.type_name.as_str())
    }

    /// Read the cell value of `row`.
    ///
    /// Uses the accessor if one is set, otherwise the `column` field of the record.
    pub fn read(&self, row: &Row, ctx: &AccessContext<'_>) -> Value {
        if let Some(accessor) = &self.accessor {
            return accessor(row, ctx);
        }
        match &self.column {
            Some(column) => row.get(column).clone(),
            None => Value::Null,
        }
    }
}
