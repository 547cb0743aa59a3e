//! Per-kind column state.
//!
//! Built-in columns are a closed set of [`ColumnKind`] variants. Third-party
//! kinds plug in through [`ColumnKind::Custom`] and the [`CustomColumn`]
//! capability traits.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use lineup_core::script::{self, Program};
use regex::Regex;
use serde_json::{Map, Value};

use super::desc::{AccessContext, ColumnDesc, Row};
use super::mapping::{MappingFunction, ScaleMapping};
use super::util::NumberFormat;
use super::FILTER_MISSING;

/// The d3 category10 palette used for categories without an explicit color.
pub const CATEGORY_COLORS: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// Default combination script of a script column.
pub const DEFAULT_COLUMN_SCRIPT: &str = "return d3.max(values)";

const REGEX_PREFIX: &str = "REGEX:";

/// Horizontal alignment of string columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

impl Alignment {
    pub fn parse(name: &str) -> Self {
        match name {
            "center" => Alignment::Center,
            "right" => Alignment::Right,
            _ => Alignment::Left,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
        }
    }
}

/// Filter of string-like columns, applied to the label.
#[derive(Debug, Clone)]
pub enum StringFilter {
    /// Keep only non-empty values.
    Missing,
    /// Case-insensitive substring match.
    Text(String),
    Regex(Regex),
}

impl PartialEq for StringFilter {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StringFilter::Missing, StringFilter::Missing) => true,
            (StringFilter::Text(a), StringFilter::Text(b)) => a == b,
            (StringFilter::Regex(a), StringFilter::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl StringFilter {
    /// Parse the dumped form; an empty string means no filter.
    pub fn parse(text: &str) -> Option<Self> {
        if text.is_empty() {
            return None;
        }
        if text == FILTER_MISSING {
            return Some(StringFilter::Missing);
        }
        if let Some(source) = text.strip_prefix(REGEX_PREFIX) {
            return match Regex::new(source) {
                Ok(re) => Some(StringFilter::Regex(re)),
                Err(err) => {
                    tracing::warn!(target: lineup_core::logging::targets::COLUMN, source, %err, "invalid regex filter");
                    None
                }
            };
        }
        Some(StringFilter::Text(text.to_string()))
    }

    pub fn dump(&self) -> String {
        match self {
            StringFilter::Missing => FILTER_MISSING.to_string(),
            StringFilter::Text(text) => text.clone(),
            StringFilter::Regex(re) => format!("{REGEX_PREFIX}{}", re.as_str()),
        }
    }

    pub fn matches(&self, label: &str) -> bool {
        match self {
            StringFilter::Missing => !label.trim().is_empty(),
            StringFilter::Text(text) => label.to_lowercase().contains(&text.to_lowercase()),
            StringFilter::Regex(re) => !label.is_empty() && re.is_match(label),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StringColumn {
    pub(crate) filter: Option<StringFilter>,
    pub(crate) alignment: Alignment,
}

impl StringColumn {
    pub fn from_desc(desc: &ColumnDesc) -> Self {
        Self {
            filter: None,
            alignment: desc.alignment.as_deref().map(Alignment::parse).unwrap_or_default(),
        }
    }

    pub fn filter(&self) -> Option<&StringFilter> {
        self.filter.as_ref()
    }

    pub fn alignment(&self) -> Alignment {
        self.alignment
    }
}

/// A string column whose values are links, optionally built from a `$1` pattern.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinkColumn {
    pub(crate) string: StringColumn,
    pub(crate) link: Option<String>,
}

impl LinkColumn {
    pub fn from_desc(desc: &ColumnDesc) -> Self {
        Self {
            string: StringColumn::from_desc(desc),
            link: desc.link.clone(),
        }
    }

    pub fn link(&self) -> Option<&str> {
        self.link.as_deref()
    }
}

/// A string column with per-row overrides keyed by row index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotateColumn {
    pub(crate) string: StringColumn,
    pub(crate) annotations: BTreeMap<usize, String>,
}

impl AnnotateColumn {
    pub fn from_desc(desc: &ColumnDesc) -> Self {
        Self {
            string: StringColumn::from_desc(desc),
            annotations: BTreeMap::new(),
        }
    }

    pub fn annotation(&self, row: usize) -> Option<&str> {
        self.annotations.get(&row).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BooleanColumn {
    pub(crate) filter: Option<bool>,
    pub(crate) true_marker: String,
    pub(crate) false_marker: String,
}

impl BooleanColumn {
    pub fn from_desc(desc: &ColumnDesc) -> Self {
        Self {
            filter: None,
            true_marker: desc.true_marker.clone().unwrap_or_else(|| "X".to_string()),
            false_marker: desc.false_marker.clone().unwrap_or_default(),
        }
    }

    pub fn filter(&self) -> Option<bool> {
        self.filter
    }

    /// Interpret a raw cell as a boolean.
    pub fn truthy(value: &Value) -> bool {
        match value {
            Value::Bool(b) => *b,
            Value::String(s) => matches!(s.as_str(), "true" | "yes" | "x"),
            _ => false,
        }
    }
}

/// Raw-space range filter of a number column. Infinite bounds are open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberFilter {
    pub min: f64,
    pub max: f64,
}

impl Default for NumberFilter {
    fn default() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }
}

impl NumberFilter {
    /// A filter; NaN bounds are treated as open.
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min: if min.is_nan() { f64::NEG_INFINITY } else { min },
            max: if max.is_nan() { f64::INFINITY } else { max },
        }
    }

    pub fn is_active(&self) -> bool {
        self.min.is_finite() || self.max.is_finite()
    }

    /// Whether the raw value passes. NaN always passes.
    pub fn accepts(&self, raw: f64) -> bool {
        if !self.is_active() || raw.is_nan() {
            return true;
        }
        !((self.min.is_finite() && raw < self.min) || (self.max.is_finite() && raw > self.max))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberColumn {
    pub(crate) mapping: MappingFunction,
    pub(crate) original: MappingFunction,
    pub(crate) filter: NumberFilter,
    pub(crate) missing_value: f64,
    pub(crate) format: NumberFormat,
    pub(crate) explicit_format: bool,
}

impl NumberColumn {
    /// Build from `map`, else `domain`/`range`. A missing domain is NaN until inferred.
    pub fn from_desc(desc: &ColumnDesc) -> Self {
        let mapping = match (&desc.map, desc.domain) {
            (Some(map), _) => MappingFunction::restore(map),
            (None, Some(domain)) => MappingFunction::Scale(ScaleMapping::new(
                domain,
                Default::default(),
                desc.range.unwrap_or([0.0, 1.0]),
            )),
            (None, None) => MappingFunction::Scale(ScaleMapping::new(
                [f64::NAN, f64::NAN],
                Default::default(),
                desc.range.unwrap_or([0.0, 1.0]),
            )),
        };
        let parsed = desc.number_format.as_deref().and_then(NumberFormat::parse);
        Self {
            original: mapping.clone(),
            mapping,
            filter: NumberFilter::default(),
            missing_value: desc.missing_value.unwrap_or(0.0),
            format: parsed.unwrap_or_default(),
            explicit_format: parsed.is_some(),
        }
    }

    pub fn mapping(&self) -> &MappingFunction {
        &self.mapping
    }

    /// The mapping the column was created with.
    pub fn original_mapping(&self) -> &MappingFunction {
        &self.original
    }

    pub fn filter(&self) -> NumberFilter {
        self.filter
    }

    pub fn missing_value(&self) -> f64 {
        self.missing_value
    }

    /// Whether the domain still needs to be inferred from the data.
    pub fn needs_domain(&self) -> bool {
        self.mapping.domain().iter().any(|d| d.is_nan())
    }
}

/// A resolved category.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub name: String,
    pub label: Option<String>,
    pub color: String,
    pub value: Option<f64>,
}

impl Category {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Filter of categorical columns, applied to every category of a row.
#[derive(Debug, Clone)]
pub enum CategoricalFilter {
    /// Each row category must be one of these.
    Set(Vec<String>),
    /// Each row category must contain this text, case-insensitively.
    Search(String),
    Regex(Regex),
}

impl PartialEq for CategoricalFilter {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CategoricalFilter::Set(a), CategoricalFilter::Set(b)) => a == b,
            (CategoricalFilter::Search(a), CategoricalFilter::Search(b)) => a == b,
            (CategoricalFilter::Regex(a), CategoricalFilter::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl CategoricalFilter {
    pub fn accepts(&self, category: &str) -> bool {
        match self {
            CategoricalFilter::Set(set) if !set.is_empty() => set.iter().any(|c| c == category),
            CategoricalFilter::Search(text) if !text.is_empty() => {
                category.to_lowercase().contains(&text.to_lowercase())
            }
            CategoricalFilter::Regex(re) => re.is_match(category),
            _ => true,
        }
    }

    pub fn dump(&self) -> Value {
        match self {
            CategoricalFilter::Set(set) => Value::from(set.clone()),
            CategoricalFilter::Search(text) => Value::String(text.clone()),
            CategoricalFilter::Regex(re) => Value::String(format!("{REGEX_PREFIX}{}", re.as_str())),
        }
    }

    /// Parse the dumped form: an array, a search string or a `REGEX:` string.
    pub fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => Some(CategoricalFilter::Set(
                items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
            )),
            Value::String(text) => match text.strip_prefix(REGEX_PREFIX) {
                Some(source) => Regex::new(source).ok().map(CategoricalFilter::Regex),
                None if text.is_empty() => None,
                None => Some(CategoricalFilter::Search(text.clone())),
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalColumn {
    pub(crate) categories: Vec<Category>,
    pub(crate) separator: String,
    pub(crate) filter: Option<CategoricalFilter>,
}

impl CategoricalColumn {
    pub fn from_desc(desc: &ColumnDesc) -> Self {
        let categories = desc
            .categories
            .iter()
            .flatten()
            .enumerate()
            .map(|(i, cat)| Category {
                name: cat.name().to_string(),
                label: cat.label().map(str::to_string),
                color: cat
                    .color()
                    .map(str::to_string)
                    .unwrap_or_else(|| CATEGORY_COLORS[i % CATEGORY_COLORS.len()].to_string()),
                value: cat.value(),
            })
            .collect();
        Self {
            categories,
            separator: desc.separator.clone().unwrap_or_else(|| ";".to_string()),
            filter: None,
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn filter(&self) -> Option<&CategoricalFilter> {
        self.filter.as_ref()
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub(crate) fn has_labels(&self) -> bool {
        self.categories.iter().any(|c| c.label.is_some())
    }

    /// Split a raw cell into its category names.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        text.split(self.separator.as_str()).map(str::to_string).collect()
    }
}

/// A categorical column whose categories map to numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct OrdinalColumn {
    pub(crate) categorical: CategoricalColumn,
    /// Numeric value per category, in category order.
    pub(crate) mapping: Vec<f64>,
}

impl OrdinalColumn {
    pub fn from_desc(desc: &ColumnDesc) -> Self {
        let categorical = CategoricalColumn::from_desc(desc);
        let mapping = categorical
            .categories
            .iter()
            .map(|c| c.value.unwrap_or(0.5))
            .collect();
        Self {
            categorical,
            mapping,
        }
    }

    pub fn categorical(&self) -> &CategoricalColumn {
        &self.categorical
    }

    pub fn mapping(&self) -> &[f64] {
        &self.mapping
    }

    /// Numeric value of a category; unknown categories have none.
    pub fn value_of(&self, name: &str) -> Option<f64> {
        self.categorical
            .categories
            .iter()
            .position(|c| c.name == name)
            .and_then(|i| self.mapping.get(i).copied())
    }
}

/// Shared state of composite columns producing numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeNumber {
    pub(crate) missing_value: f64,
    pub(crate) format: NumberFormat,
}

impl CompositeNumber {
    pub fn from_desc(desc: &ColumnDesc) -> Self {
        Self {
            missing_value: desc.missing_value.unwrap_or(0.0),
            format: desc
                .number_format
                .as_deref()
                .and_then(NumberFormat::parse)
                .unwrap_or_default(),
        }
    }

    pub fn missing_value(&self) -> f64 {
        self.missing_value
    }
}

/// Weighted sum of its children; weights are the child widths.
#[derive(Debug, Clone, PartialEq)]
pub struct StackColumn {
    pub(crate) number: CompositeNumber,
    pub(crate) collapsed: bool,
}

impl StackColumn {
    pub fn from_desc(desc: &ColumnDesc) -> Self {
        Self {
            number: CompositeNumber::from_desc(desc),
            collapsed: false,
        }
    }

    pub fn collapsed(&self) -> bool {
        self.collapsed
    }
}

/// Combines child values with a user script over `values`.
#[derive(Clone)]
pub struct ScriptColumn {
    pub(crate) number: CompositeNumber,
    pub(crate) script: String,
    pub(crate) program: Option<Program>,
}

impl fmt::Debug for ScriptColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptColumn")
            .field("script", &self.script)
            .field("compiled", &self.program.is_some())
            .finish()
    }
}

impl ScriptColumn {
    pub fn from_desc(desc: &ColumnDesc) -> Self {
        let mut column = Self {
            number: CompositeNumber::from_desc(desc),
            script: String::new(),
            program: None,
        };
        column.set_script(desc.script.as_deref().unwrap_or(DEFAULT_COLUMN_SCRIPT));
        column
    }

    pub fn script(&self) -> &str {
        &self.script
    }

    pub(crate) fn set_script(&mut self, script: &str) {
        self.program = script::compile_logged(script).ok();
        self.script = script.to_string();
    }
}

/// Multi-level sort over its children.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NestedColumn {
    pub(crate) collapsed: bool,
}

impl NestedColumn {
    pub fn collapsed(&self) -> bool {
        self.collapsed
    }
}

/// Capability of ordering two rows.
pub trait Sortable {
    fn compare(&self, a: &Row, b: &Row, ctx: &AccessContext<'_>) -> Ordering;
}

/// Capability of filtering rows.
pub trait Filterable {
    fn filter(&self, _row: &Row, _ctx: &AccessContext<'_>) -> bool {
        true
    }

    fn is_filtered(&self) -> bool {
        false
    }
}

/// A column kind provided outside this crate.
///
/// Register a factory producing [`ColumnKind::Custom`] under a type name in
/// [`ColumnTypes`](super::ColumnTypes) to make it available to providers.
pub trait CustomColumn: Sortable + Filterable + Send + Sync {
    /// Short name shown in debug output.
    fn kind_name(&self) -> &str;

    fn value(&self, row: &Row, ctx: &AccessContext<'_>) -> Value;

    /// Whether the column behaves as a number column.
    fn is_number(&self) -> bool {
        false
    }

    /// Numeric value, for number-like kinds.
    fn number(&self, _row: &Row, _ctx: &AccessContext<'_>) -> Option<f64> {
        None
    }

    fn label(&self, row: &Row, ctx: &AccessContext<'_>) -> String {
        super::util::to_text(&self.value(row, ctx))
    }

    /// Kind-specific fields stored with the column dump.
    fn dump(&self) -> Map<String, Value> {
        Map::new()
    }

    fn restore(&mut self, _dump: &Map<String, Value>) {}
}

/// Behavior and state of a column.
pub enum ColumnKind {
    /// An empty column, used for `actions`.
    Dummy,
    Rank,
    Selection,
    String(StringColumn),
    Link(LinkColumn),
    Annotate(AnnotateColumn),
    Boolean(BooleanColumn),
    Number(NumberColumn),
    Categorical(CategoricalColumn),
    Ordinal(OrdinalColumn),
    Stack(StackColumn),
    Max(CompositeNumber),
    Min(CompositeNumber),
    Mean(CompositeNumber),
    Script(ScriptColumn),
    Nested(NestedColumn),
    Custom(Box<dyn CustomColumn>),
}

impl fmt::Debug for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::String(c) => f.debug_tuple("String").field(c).finish(),
            ColumnKind::Link(c) => f.debug_tuple("Link").field(c).finish(),
            ColumnKind::Annotate(c) => f.debug_tuple("Annotate").field(c).finish(),
            ColumnKind::Boolean(c) => f.debug_tuple("Boolean").field(c).finish(),
            ColumnKind::Number(c) => f.debug_tuple("Number").field(c).finish(),
            ColumnKind::Categorical(c) => f.debug_tuple("Categorical").field(c).finish(),
            ColumnKind::Ordinal(c) => f.debug_tuple("Ordinal").field(c).finish(),
            ColumnKind::Stack(c) => f.debug_tuple("Stack").field(c).finish(),
            ColumnKind::Script(c) => f.debug_tuple("Script").field(c).finish(),
            ColumnKind::Nested(c) => f.debug_tuple("Nested").field(c).finish(),
            other => f.write_str(other.kind_name()),
        }
    }
}

impl ColumnKind {
    /// Build the built-in kind registered under `desc.type_name`.
    pub fn builtin(desc: &ColumnDesc) -> Option<Self> {
        let kind = match desc.type_name.as_str() {
            "actions" => ColumnKind::Dummy,
            "rank" => ColumnKind::Rank,
            "selection" => ColumnKind::Selection,
            "string" => ColumnKind::String(StringColumn::from_desc(desc)),
            "link" => ColumnKind::Link(LinkColumn::from_desc(desc)),
            "annotate" => ColumnKind::Annotate(AnnotateColumn::from_desc(desc)),
            "boolean" => ColumnKind::Boolean(BooleanColumn::from_desc(desc)),
            "number" => ColumnKind::Number(NumberColumn::from_desc(desc)),
            "categorical" => ColumnKind::Categorical(CategoricalColumn::from_desc(desc)),
            "ordinal" => ColumnKind::Ordinal(OrdinalColumn::from_desc(desc)),
            "stack" => ColumnKind::Stack(StackColumn::from_desc(desc)),
            "max" => ColumnKind::Max(CompositeNumber::from_desc(desc)),
            "min" => ColumnKind::Min(CompositeNumber::from_desc(desc)),
            "mean" => ColumnKind::Mean(CompositeNumber::from_desc(desc)),
            "script" => ColumnKind::Script(ScriptColumn::from_desc(desc)),
            "nested" => ColumnKind::Nested(NestedColumn::default()),
            _ => return None,
        };
        Some(kind)
    }

    pub fn kind_name(&self) -> &str {
        match self {
            ColumnKind::Dummy => "actions",
            ColumnKind::Rank => "rank",
            ColumnKind::Selection => "selection",
            ColumnKind::String(_) => "string",
            ColumnKind::Link(_) => "link",
            ColumnKind::Annotate(_) => "annotate",
            ColumnKind::Boolean(_) => "boolean",
            ColumnKind::Number(_) => "number",
            ColumnKind::Categorical(_) => "categorical",
            ColumnKind::Ordinal(_) => "ordinal",
            ColumnKind::Stack(_) => "stack",
            ColumnKind::Max(_) => "max",
            ColumnKind::Min(_) => "min",
            ColumnKind::Mean(_) => "mean",
            ColumnKind::Script(_) => "script",
            ColumnKind::Nested(_) => "nested",
            ColumnKind::Custom(c) => c.kind_name(),
        }
    }

    /// Whether the kind holds child columns.
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            ColumnKind::Stack(_)
                | ColumnKind::Max(_)
                | ColumnKind::Min(_)
                | ColumnKind::Mean(_)
                | ColumnKind::Script(_)
                | ColumnKind::Nested(_)
        )
    }

    /// Whether the kind yields numbers and may join a composite number column.
    pub fn is_number(&self) -> bool {
        match self {
            ColumnKind::Number(_)
            | ColumnKind::Ordinal(_)
            | ColumnKind::Stack(_)
            | ColumnKind::Max(_)
            | ColumnKind::Min(_)
            | ColumnKind::Mean(_)
            | ColumnKind::Script(_) => true,
            ColumnKind::Custom(c) => c.is_number(),
            _ => false,
        }
    }

    /// Whether the kind sorts ascending when it becomes the first sort column.
    pub fn is_string_like(&self) -> bool {
        matches!(
            self,
            ColumnKind::String(_) | ColumnKind::Link(_) | ColumnKind::Annotate(_)
        )
    }

    pub(crate) fn default_width(&self) -> f64 {
        match self {
            ColumnKind::String(_) | ColumnKind::Link(_) | ColumnKind::Annotate(_) => 200.0,
            ColumnKind::Boolean(_) => 30.0,
            ColumnKind::Rank => 50.0,
            _ => super::DEFAULT_WIDTH,
        }
    }

    pub(crate) fn starts_compressed(&self) -> bool {
        matches!(self, ColumnKind::Selection)
    }

    pub(crate) fn string_state(&self) -> Option<&StringColumn> {
        match self {
            ColumnKind::String(c) => Some(c),
            ColumnKind::Link(c) => Some(&c.string),
            ColumnKind::Annotate(c) => Some(&c.string),
            _ => None,
        }
    }

    pub(crate) fn string_state_mut(&mut self) -> Option<&mut StringColumn> {
        match self {
            ColumnKind::String(c) => Some(c),
            ColumnKind::Link(c) => Some(&mut c.string),
            ColumnKind::Annotate(c) => Some(&mut c.string),
            _ => None,
        }
    }

    pub(crate) fn categorical_state(&self) -> Option<&CategoricalColumn> {
        match self {
            ColumnKind::Categorical(c) => Some(c),
            ColumnKind::Ordinal(c) => Some(&c.categorical),
            _ => None,
        }
    }

    pub(crate) fn categorical_state_mut(&mut self) -> Option<&mut CategoricalColumn> {
        match self {
            ColumnKind::Categorical(c) => Some(c),
            ColumnKind::Ordinal(c) => Some(&mut c.categorical),
            _ => None,
        }
    }

    pub(crate) fn composite_number(&self) -> Option<&CompositeNumber> {
        match self {
            ColumnKind::Stack(c) => Some(&c.number),
            ColumnKind::Script(c) => Some(&c.number),
            ColumnKind::Max(c) | ColumnKind::Min(c) | ColumnKind::Mean(c) => Some(c),
            _ => None,
        }
    }

    pub(crate) fn composite_number_mut(&mut self) -> Option<&mut CompositeNumber> {
        match self {
            ColumnKind::Stack(c) => Some(&mut c.number),
            ColumnKind::Script(c) => Some(&mut c.number),
            ColumnKind::Max(c) | ColumnKind::Min(c) | ColumnKind::Mean(c) => Some(c),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_filter_parse_and_dump() {
        assert_eq!(StringFilter::parse(""), None);
        assert_eq!(StringFilter::parse(FILTER_MISSING), Some(StringFilter::Missing));
        let re = StringFilter::parse("REGEX:^a.c$").unwrap();
        assert!(re.matches("abc"));
        assert!(!re.matches("abcd"));
        assert_eq!(re.dump(), "REGEX:^a.c$");

        let text = StringFilter::Text("Foo".into());
        assert!(text.matches("a food"));
        assert!(!StringFilter::Missing.matches("  "));
    }

    #[test]
    fn test_number_filter() {
        let open = NumberFilter::default();
        assert!(!open.is_active());
        let f = NumberFilter::new(2.0, f64::NAN);
        assert!(f.is_active());
        assert!(f.accepts(2.0));
        assert!(!f.accepts(1.9));
        assert!(f.accepts(f64::NAN));
        assert_eq!(f.max, f64::INFINITY);
    }

    #[test]
    fn test_categories_get_palette_colors() {
        let desc = ColumnDesc::categorical("c", ["a", "b"]).with_separator("|");
        let col = CategoricalColumn::from_desc(&desc);
        assert_eq!(col.categories()[1].color, CATEGORY_COLORS[1]);
        assert_eq!(col.split("a|b"), vec!["a", "b"]);
        assert!(col.split("").is_empty());
    }

    #[test]
    fn test_categorical_filter_modes() {
        let set = CategoricalFilter::parse(&json!(["c1"])).unwrap();
        assert!(set.accepts("c1"));
        assert!(!set.accepts("c3"));
        let search = CategoricalFilter::parse(&json!("C")).unwrap();
        assert!(search.accepts("c3"));
        let re = CategoricalFilter::parse(&json!("REGEX:^c[0-2]$")).unwrap();
        assert!(!re.accepts("c3"));
        assert_eq!(re.dump(), json!("REGEX:^c[0-2]$"));
        assert!(CategoricalFilter::Set(Vec::new()).accepts("anything"));
    }

    #[test]
    fn test_ordinal_defaults_to_half() {
        let desc: ColumnDesc = serde_json::from_value(json!({
            "type": "ordinal",
            "column": "o",
            "categories": ["lo", {"name": "hi", "value": 1.0}]
        }))
        .unwrap();
        let col = OrdinalColumn::from_desc(&desc);
        assert_eq!(col.mapping(), &[0.5, 1.0]);
        assert_eq!(col.value_of("hi"), Some(1.0));
        assert_eq!(col.value_of("other"), None);
    }

    #[test]
    fn test_builtin_registry_names() {
        for name in ["number", "string", "stack", "mean", "nested", "actions"] {
            let kind = ColumnKind::builtin(&ColumnDesc::new(name)).unwrap();
            assert_eq!(kind.kind_name(), name);
        }
        assert!(ColumnKind::builtin(&ColumnDesc::new("unknown")).is_none());
        assert!(ColumnKind::builtin(&ColumnDesc::new("stack")).unwrap().is_composite());
        assert!(!ColumnKind::builtin(&ColumnDesc::new("string")).unwrap().is_number());
    }
}
