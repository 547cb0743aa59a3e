//! The open registry of column type names.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::desc::ColumnDesc;
use super::kinds::ColumnKind;

/// Builds the kind of a column from its descriptor.
pub trait ColumnFactory: Send + Sync {
    fn create(&self, desc: &ColumnDesc) -> ColumnKind;
}

impl<F> ColumnFactory for F
where
    F: Fn(&ColumnDesc) -> ColumnKind + Send + Sync,
{
    fn create(&self, desc: &ColumnDesc) -> ColumnKind {
        self(desc)
    }
}

/// Names that ship with the engine.
const BUILTIN_TYPES: [&str; 16] = [
    "actions",
    "rank",
    "selection",
    "string",
    "link",
    "annotate",
    "boolean",
    "number",
    "categorical",
    "ordinal",
    "stack",
    "max",
    "min",
    "mean",
    "script",
    "nested",
];

/// Maps type names to column factories.
///
/// [`Default`] registers every built-in type; custom kinds are added with
/// [`register`](Self::register).
#[derive(Clone)]
pub struct ColumnTypes {
    types: HashMap<String, Arc<dyn ColumnFactory>>,
}

impl fmt::Debug for ColumnTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.names();
        names.sort_unstable();
        f.debug_struct("ColumnTypes").field("types", &names).finish()
    }
}

impl Default for ColumnTypes {
    fn default() -> Self {
        let mut types = Self::empty();
        for name in BUILTIN_TYPES {
            types.register(name, |desc: &ColumnDesc| {
                ColumnKind::builtin(desc).unwrap_or(ColumnKind::Dummy)
            });
        }
        types
    }
}

impl ColumnTypes {
    /// A registry without any type.
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Register (or replace) the factory for `name`.
    pub fn register(&mut self, name: impl Into<String>, factory: impl ColumnFactory + 'static) {
        self.types.insert(name.into(), Arc::new(factory));
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.types.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.types.keys().map(String::as_str).collect()
    }

    /// Build the kind for `desc`, `None` if its type is unknown.
    pub fn create(&self, desc: &ColumnDesc) -> Option<ColumnKind> {
        self.types.get(&desc.type_name).map(|f| f.create(desc))
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use serde_json::{Value, json};

    use super::*;
    use crate::model::{AccessContext, ColumnRegistry, CustomColumn, Filterable, Row, Sortable};

    struct Length;

    impl Sortable for Length {
        fn compare(&self, a: &Row, b: &Row, ctx: &AccessContext<'_>) -> Ordering {
            let len = |row: &Row| ctx.desc.read(row, ctx).as_str().map_or(0, str::len);
            len(a).cmp(&len(b))
        }
    }

    impl Filterable for Length {}

    impl CustomColumn for Length {
        fn kind_name(&self) -> &str {
            "length"
        }

        fn value(&self, row: &Row, ctx: &AccessContext<'_>) -> Value {
            json!(ctx.desc.read(row, ctx).as_str().map_or(0, str::len))
        }
    }

    #[test]
    fn test_builtins_registered() {
        let types = ColumnTypes::default();
        assert_eq!(types.names().len(), 16);
        assert!(matches!(
            types.create(&ColumnDesc::new("mean")),
            Some(ColumnKind::Mean(_))
        ));
        assert!(types.create(&ColumnDesc::new("length")).is_none());
    }

    #[test]
    fn test_custom_kind() {
        let mut types = ColumnTypes::default();
        types.register("length", |_: &ColumnDesc| ColumnKind::Custom(Box::new(Length)));

        let desc = ColumnDesc::new("length").with_column("s");
        let kind = types.create(&desc).unwrap();
        let mut registry = ColumnRegistry::new();
        let col = registry.create_column_with_kind("len", desc, kind);

        let a = Row::new(0, json!({"s": "abc"}));
        let b = Row::new(1, json!({"s": "z"}));
        assert_eq!(registry.value(col, &a).unwrap(), json!(3));
        assert_eq!(registry.compare(col, &a, &b).unwrap(), Ordering::Greater);
        assert_eq!(registry.column(col).unwrap().kind().kind_name(), "length");
    }
}
