//! The column model: columns, composite columns and rankings.
//!
//! All columns and rankings of a provider live in one [`ColumnRegistry`]
//! arena and are addressed by [`ColumnId`] / [`RankingId`] handles. Parent
//! links are plain [`NodeRef`] values, so the tree is owned by the arena and
//! never by the nodes themselves.
//!
//! # Event flow
//!
//! Every mutation fires a list of [`EventKind`]s on the mutated node. The
//! kinds `Dirty`, `DirtyHeader`, `DirtyValues` and `FilterChanged` are then
//! re-delivered for each ancestor, ending at the owning ranking, which turns
//! filter and sort-column changes into a `DirtyOrder` event.
//!
//! ```
//! use lineup::model::{ColumnDesc, ColumnRegistry};
//!
//! let mut registry = ColumnRegistry::new();
//! let ranking = registry.create_ranking("rank0");
//! let col = registry.create_column("col0", ColumnDesc::number("a", [0.0, 10.0]));
//! registry.push(ranking, col).unwrap();
//!
//! assert_eq!(registry.sort_criteria(ranking).unwrap().column, Some(col));
//! ```

mod composite;
mod compute;
mod debug;
mod desc;
mod dump;
mod edit;
mod events;
mod kinds;
mod mapping;
mod ranking;
mod registry;
mod types;
pub mod util;

use slotmap::new_key_type;

pub use debug::RegistryTree;
pub use desc::{AccessContext, Accessor, CategoryDesc, ColumnDesc, Row, SUPPORT_TYPES, Setter};
pub use dump::{
    ColumnDump, DescRefFn, OrdinalMappingEntry, RankingDump, RestoreFactory, SortColumnDump,
};
pub use events::{ColumnEvent, EventDetail, EventKind, FORWARDED_EVENTS};
pub use kinds::{
    Alignment, AnnotateColumn, BooleanColumn, CATEGORY_COLORS, Category, CategoricalColumn,
    CategoricalFilter, ColumnKind, CompositeNumber, CustomColumn, DEFAULT_COLUMN_SCRIPT, Filterable,
    LinkColumn, NestedColumn, NumberColumn, NumberFilter, OrdinalColumn, ScriptColumn, Sortable,
    StackColumn, StringColumn, StringFilter,
};
pub use mapping::{
    DEFAULT_MAPPING_SCRIPT, MappingDump, MappingFunction, ScaleMapping, ScaleType, ScriptMapping,
};
pub use ranking::{
    FlatColumn, RankingNode, SortCriteria, SortTicket, SortingDesc, SortingId, WeightedSortingId,
};
pub use registry::{ColumnMetaData, ColumnNode, ColumnRegistry};
pub use types::{ColumnFactory, ColumnTypes};

new_key_type! {
    /// Handle of a column in a [`ColumnRegistry`].
    pub struct ColumnId;
    /// Handle of a ranking in a [`ColumnRegistry`].
    pub struct RankingId;
}

/// A node of the column tree: a column or a ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Column(ColumnId),
    Ranking(RankingId),
}

impl From<ColumnId> for NodeRef {
    fn from(id: ColumnId) -> Self {
        NodeRef::Column(id)
    }
}

impl From<RankingId> for NodeRef {
    fn from(id: RankingId) -> Self {
        NodeRef::Ranking(id)
    }
}

/// Default width of a column.
pub const DEFAULT_WIDTH: f64 = 100.0;

/// Width of a compressed column.
pub const COMPRESSED_WIDTH: f64 = 16.0;

/// Flatten depth that recurses fully, including hidden columns.
pub const FLAT_ALL_COLUMNS: i32 = -1;

/// Color of columns that neither set a color nor a css class.
pub const DEFAULT_COLOR: &str = "#C1C1C1";

/// String filter keeping only non-empty values.
pub const FILTER_MISSING: &str = "__FILTER_MISSING";
