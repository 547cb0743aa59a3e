//! Column and ranking events.

use super::{ColumnId, NodeRef};

/// Kinds of events fired by columns and rankings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    WidthChanged,
    FilterChanged,
    LabelChanged,
    MetaDataChanged,
    CompressChanged,
    AddColumn,
    RemoveColumn,
    Dirty,
    DirtyHeader,
    DirtyValues,
    MappingChanged,
    WeightsChanged,
    CollapseChanged,
    ScriptChanged,
    LinkChanged,
    ValueChanged,
    Select,
    SortCriteriaChanged,
    DirtyOrder,
    OrderChanged,
}

/// Kinds re-delivered to every ancestor of the node that fired them.
pub const FORWARDED_EVENTS: [EventKind; 4] = [
    EventKind::Dirty,
    EventKind::DirtyHeader,
    EventKind::DirtyValues,
    EventKind::FilterChanged,
];

impl EventKind {
    /// Whether ancestors receive this kind too.
    pub fn is_forwarded(self) -> bool {
        FORWARDED_EVENTS.contains(&self)
    }
}

/// Payload of a [`ColumnEvent`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EventDetail {
    #[default]
    None,
    Width {
        old: f64,
        new: f64,
    },
    Compressed(bool),
    /// A child was added or removed at `index`.
    Child {
        column: ColumnId,
        index: usize,
    },
    Weights {
        old: Vec<f64>,
        new: Vec<f64>,
    },
    SortCriteria {
        column: Option<ColumnId>,
        ascending: bool,
    },
    Order(usize),
    /// A per-row value (annotation) changed.
    Row(usize),
    Selected {
        row: usize,
        selected: bool,
    },
    Collapsed(bool),
}

/// An event as seen by a listener.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnEvent {
    pub kind: EventKind,
    /// The node this delivery is for: the origin or one of its ancestors.
    pub source: NodeRef,
    /// The node that fired the event.
    pub origin: NodeRef,
    pub detail: EventDetail,
}

impl ColumnEvent {
    /// Whether this delivery is the original one rather than a forwarded copy.
    pub fn is_direct(&self) -> bool {
        self.source == self.origin
    }
}
