//! The arena owning every column and ranking of a provider.

use std::sync::Arc;

use lineup_core::dispatch::{EventDispatcher, ListenerId, OwnerTag};
use lineup_core::logging::targets;
use slotmap::SlotMap;
use static_assertions::assert_impl_all;

use super::desc::{AccessContext, ColumnDesc};
use super::events::{ColumnEvent, EventDetail, EventKind};
use super::kinds::ColumnKind;
use super::ranking::RankingNode;
use super::util::fix_css;
use super::{COMPRESSED_WIDTH, ColumnId, DEFAULT_COLOR, NodeRef, RankingId};
use crate::error::{ModelError, ModelResult};

/// Widths closer than this are considered unchanged.
const WIDTH_TOLERANCE: f64 = 0.5;

fn similar(a: f64, b: f64) -> bool {
    (a - b).abs() < WIDTH_TOLERANCE
}

/// Label, description and color of a column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnMetaData {
    pub label: String,
    pub description: String,
    pub color: Option<String>,
}

/// A column stored in a [`ColumnRegistry`].
#[derive(Debug)]
pub struct ColumnNode {
    pub(crate) id: String,
    pub(crate) desc: Arc<ColumnDesc>,
    pub(crate) label: String,
    pub(crate) description: String,
    pub(crate) color: Option<String>,
    pub(crate) css_class: String,
    pub(crate) width: f64,
    pub(crate) compressed: bool,
    pub(crate) parent: Option<NodeRef>,
    pub(crate) children: Vec<ColumnId>,
    pub(crate) kind: ColumnKind,
}

impl ColumnNode {
    /// The css-safe id, unique within the provider.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn desc(&self) -> &Arc<ColumnDesc> {
        &self.desc
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The column color, `None` when styling is left to the css class.
    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }

    pub fn css_class(&self) -> &str {
        &self.css_class
    }

    pub fn metadata(&self) -> ColumnMetaData {
        ColumnMetaData {
            label: self.label.clone(),
            description: self.description.clone(),
            color: self.color.clone(),
        }
    }

    /// The stored width, ignoring compression.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// The width the column occupies when laid out.
    pub fn actual_width(&self) -> f64 {
        if self.compressed {
            COMPRESSED_WIDTH
        } else {
            self.width
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.width <= 0.0
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn parent(&self) -> Option<NodeRef> {
        self.parent
    }

    pub fn children(&self) -> &[ColumnId] {
        &self.children
    }

    pub fn kind(&self) -> &ColumnKind {
        &self.kind
    }

    /// The label a column gets when nothing overrides it.
    pub(crate) fn default_label(desc: &ColumnDesc, id: &str) -> String {
        desc.label
            .clone()
            .or_else(|| desc.column.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub(crate) fn default_color(desc: &ColumnDesc) -> Option<String> {
        match (&desc.color, &desc.css_class) {
            (Some(color), _) => Some(color.clone()),
            (None, Some(_)) => None,
            (None, None) => Some(DEFAULT_COLOR.to_string()),
        }
    }
}

/// Arena of columns and rankings plus the event dispatcher they fire through.
///
/// Nodes refer to each other by handle only; parent links are lookups in
/// this arena, so the tree has exactly one owner.
pub struct ColumnRegistry {
    pub(crate) columns: SlotMap<ColumnId, ColumnNode>,
    pub(crate) rankings: SlotMap<RankingId, RankingNode>,
    events: EventDispatcher<EventKind, ColumnEvent>,
}

assert_impl_all!(ColumnRegistry: Send, Sync);

impl Default for ColumnRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ColumnRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnRegistry")
            .field("columns", &self.columns.len())
            .field("rankings", &self.rankings.len())
            .finish()
    }
}

impl ColumnRegistry {
    pub fn new() -> Self {
        Self {
            columns: SlotMap::with_key(),
            rankings: SlotMap::with_key(),
            events: EventDispatcher::new(),
        }
    }

    /// Create a detached column of a built-in kind.
    ///
    /// Unknown type names produce an empty `actions` column.
    pub fn create_column(&mut self, id: &str, desc: impl Into<Arc<ColumnDesc>>) -> ColumnId {
        let desc = desc.into();
        let kind = ColumnKind::builtin(&desc).unwrap_or_else(|| {
            tracing::warn!(target: targets::COLUMN, type_name = %desc.type_name, "unknown column type");
            ColumnKind::Dummy
        });
        self.create_column_with_kind(id, desc, kind)
    }

    /// Create a detached column with an explicit kind.
    pub fn create_column_with_kind(
        &mut self,
        id: &str,
        desc: impl Into<Arc<ColumnDesc>>,
        kind: ColumnKind,
    ) -> ColumnId {
        let desc = desc.into();
        let id = fix_css(id);
        let node = ColumnNode {
            label: ColumnNode::default_label(&desc, &id),
            description: desc.description.clone().unwrap_or_default(),
            color: ColumnNode::default_color(&desc),
            css_class: desc.css_class.clone().unwrap_or_default(),
            width: kind.default_width(),
            compressed: kind.starts_compressed(),
            parent: None,
            children: Vec::new(),
            id,
            desc,
            kind,
        };
        tracing::trace!(target: targets::COLUMN, id = %node.id, kind = node.kind.kind_name(), "created column");
        self.columns.insert(node)
    }

    pub fn create_ranking(&mut self, id: &str) -> RankingId {
        self.rankings.insert(RankingNode::new(fix_css(id)))
    }

    pub fn column(&self, col: ColumnId) -> ModelResult<&ColumnNode> {
        self.columns.get(col).ok_or(ModelError::InvalidColumn(col))
    }

    pub(crate) fn column_mut(&mut self, col: ColumnId) -> ModelResult<&mut ColumnNode> {
        self.columns.get_mut(col).ok_or(ModelError::InvalidColumn(col))
    }

    pub fn ranking(&self, ranking: RankingId) -> ModelResult<&RankingNode> {
        self.rankings.get(ranking).ok_or(ModelError::InvalidRanking(ranking))
    }

    pub(crate) fn ranking_mut(&mut self, ranking: RankingId) -> ModelResult<&mut RankingNode> {
        self.rankings
            .get_mut(ranking)
            .ok_or(ModelError::InvalidRanking(ranking))
    }

    pub fn contains(&self, col: ColumnId) -> bool {
        self.columns.contains_key(col)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Find a live column by its string id.
    pub fn find_column_by_id(&self, id: &str) -> Option<ColumnId> {
        self.columns
            .iter()
            .find_map(|(key, node)| (node.id == id).then_some(key))
    }

    /// The ranking a node ultimately belongs to.
    pub fn find_my_ranker(&self, node: impl Into<NodeRef>) -> Option<RankingId> {
        let mut current = node.into();
        loop {
            match current {
                NodeRef::Ranking(ranking) => return Some(ranking),
                NodeRef::Column(col) => current = self.columns.get(col)?.parent?,
            }
        }
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    pub(crate) fn is_ancestor_or_self(&self, ancestor: ColumnId, node: NodeRef) -> bool {
        let mut current = Some(node);
        while let Some(NodeRef::Column(col)) = current {
            if col == ancestor {
                return true;
            }
            current = self.columns.get(col).and_then(|c| c.parent);
        }
        false
    }

    pub(crate) fn access_context<'a>(&self, node: &'a ColumnNode) -> AccessContext<'a> {
        AccessContext {
            column: &node.id,
            desc: &node.desc,
            ranking: node.parent.and_then(|p| self.find_my_ranker(p)),
        }
    }

    /// Detach a column from its parent and drop it with its subtree.
    pub fn destroy(&mut self, col: ColumnId) -> ModelResult<()> {
        match self.column(col)?.parent {
            Some(NodeRef::Ranking(ranking)) => {
                self.remove(ranking, col)?;
            }
            Some(NodeRef::Column(parent)) => {
                self.remove_child(parent, col)?;
            }
            None => {}
        }
        let mut pending = vec![col];
        while let Some(id) = pending.pop() {
            if let Some(node) = self.columns.remove(id) {
                pending.extend(node.children);
            }
        }
        Ok(())
    }

    /// Drop a ranking together with all of its columns.
    pub fn destroy_ranking(&mut self, ranking: RankingId) -> ModelResult<()> {
        let columns = self.ranking(ranking)?.columns.clone();
        self.clear(ranking)?;
        for col in columns {
            self.destroy(col)?;
        }
        self.rankings.remove(ranking);
        Ok(())
    }

    /// Give every column of a subtree a fresh id.
    pub(crate) fn assign_new_ids(
        &mut self,
        col: ColumnId,
        next_id: &mut dyn FnMut() -> String,
    ) -> ModelResult<()> {
        let node = self.column_mut(col)?;
        node.id = fix_css(&next_id());
        let children = node.children.clone();
        for child in children {
            self.assign_new_ids(child, next_id)?;
        }
        Ok(())
    }

    // Events

    /// Listen to `kind` on `node`, including deliveries forwarded from its descendants.
    pub fn on<F>(&self, kind: EventKind, node: impl Into<NodeRef>, slot: F) -> ListenerId
    where
        F: Fn(&ColumnEvent) + Send + Sync + 'static,
    {
        let node = node.into();
        self.events.on(kind, move |event| {
            if event.source == node {
                slot(event);
            }
        })
    }

    /// Listen to every delivery of `kind`, whatever the node.
    pub fn on_any<F>(&self, kind: EventKind, slot: F) -> ListenerId
    where
        F: Fn(&ColumnEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, slot)
    }

    /// Listen to `kind` on `node` on behalf of `owner`, replacing the owner's previous listener.
    pub fn on_owned<F>(
        &self,
        kind: EventKind,
        node: impl Into<NodeRef>,
        owner: OwnerTag,
        slot: F,
    ) -> ListenerId
    where
        F: Fn(&ColumnEvent) + Send + Sync + 'static,
    {
        let node = node.into();
        self.events.on_owned(kind, owner, move |event| {
            if event.source == node {
                slot(event);
            }
        })
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    /// Remove every listener registered for `owner`.
    pub fn off_owner(&self, owner: OwnerTag) -> usize {
        self.events.off_owner(owner)
    }

    pub fn events(&self) -> &EventDispatcher<EventKind, ColumnEvent> {
        &self.events
    }

    /// Fire `kinds` in order on `origin`, forwarding to ancestors where applicable.
    pub(crate) fn fire(&self, origin: NodeRef, kinds: &[EventKind], detail: EventDetail) {
        let sort_column = self
            .find_my_ranker(origin)
            .and_then(|r| self.rankings.get(r))
            .and_then(|r| r.sort_column);
        for &kind in kinds {
            self.deliver(kind, origin, sort_column, &detail);
        }
    }

    fn deliver(
        &self,
        kind: EventKind,
        origin: NodeRef,
        sort_column: Option<ColumnId>,
        detail: &EventDetail,
    ) {
        let mut node = origin;
        let mut through_sort_column = false;
        loop {
            if self.events.has_listeners(kind) {
                self.events.fire(
                    kind,
                    &ColumnEvent {
                        kind,
                        source: node,
                        origin,
                        detail: detail.clone(),
                    },
                );
            }
            let parent = match node {
                NodeRef::Ranking(ranking) => {
                    let reorder = match kind {
                        EventKind::FilterChanged => true,
                        EventKind::DirtyValues => through_sort_column,
                        _ => false,
                    };
                    if reorder && node != origin {
                        self.dirty_order(ranking);
                    }
                    return;
                }
                NodeRef::Column(col) => {
                    through_sort_column |= sort_column == Some(col);
                    self.columns.get(col).and_then(|c| c.parent)
                }
            };
            if !kind.is_forwarded() {
                return;
            }
            match parent {
                Some(parent) => node = parent,
                None => return,
            }
        }
    }

    // Width

    /// Set the width of a column.
    ///
    /// Stack and nested columns scale their children along. Changes within
    /// half a pixel are ignored.
    pub fn set_width(&mut self, col: ColumnId, width: f64) -> ModelResult<()> {
        let node = self.column(col)?;
        let old = node.width;
        if similar(old, width) {
            return Ok(());
        }
        if matches!(node.kind, ColumnKind::Stack(_) | ColumnKind::Nested(_)) && old > 0.0 {
            let factor = width / old;
            for child in node.children.clone() {
                if let Some(child) = self.columns.get_mut(child) {
                    child.width *= factor;
                }
            }
        }
        self.apply_width(col, width)
    }

    /// Set the stored width without touching children or firing events.
    pub(crate) fn set_width_silently(&mut self, col: ColumnId, width: f64) -> ModelResult<()> {
        self.column_mut(col)?.width = width;
        Ok(())
    }

    /// Set the own width, fire the width events and let the parent react.
    pub(crate) fn apply_width(&mut self, col: ColumnId, width: f64) -> ModelResult<()> {
        let node = self.column_mut(col)?;
        let old = node.width;
        if similar(old, width) {
            return Ok(());
        }
        node.width = width;
        let parent = node.parent;
        self.fire(
            col.into(),
            &[
                EventKind::WidthChanged,
                EventKind::DirtyHeader,
                EventKind::DirtyValues,
                EventKind::Dirty,
            ],
            EventDetail::Width { old, new: width },
        );
        if let Some(NodeRef::Column(parent)) = parent {
            self.child_width_changed(parent, col, old, width)?;
        }
        Ok(())
    }

    fn child_width_changed(
        &mut self,
        parent: ColumnId,
        child: ColumnId,
        old: f64,
        new: f64,
    ) -> ModelResult<()> {
        match self.column(parent)?.kind {
            ColumnKind::Stack(_) => self.adapt_stack_weights(parent, child, old, new),
            ColumnKind::Nested(_) => {
                let width = self.column(parent)?.width;
                self.apply_width(parent, width + new - old)
            }
            _ => Ok(()),
        }
    }

    /// Rescale the siblings of a resized stack child so the stack keeps its width.
    fn adapt_stack_weights(
        &mut self,
        stack: ColumnId,
        child: ColumnId,
        old: f64,
        new: f64,
    ) -> ModelResult<()> {
        let node = self.column(stack)?;
        let full = node.width;
        let children = node.children.clone();
        if children.len() == 1 {
            return self.apply_width(stack, new);
        }
        let old_weight = old / full;
        if full <= 0.0 || (1.0 - old_weight).abs() < f64::EPSILON {
            return Ok(());
        }
        let before: Vec<f64> = children
            .iter()
            .map(|&c| {
                if c == child {
                    old / full
                } else {
                    self.columns.get(c).map_or(0.0, |n| n.width / full)
                }
            })
            .collect();
        let change = (new - old) / full;
        let factor = (1.0 - old_weight - change) / (1.0 - old_weight);
        for &sibling in children.iter().filter(|&&c| c != child) {
            if let Some(node) = self.columns.get_mut(sibling) {
                node.width *= factor;
            }
        }
        let after = self.weights(stack)?;
        self.fire(
            stack.into(),
            &[
                EventKind::WeightsChanged,
                EventKind::DirtyHeader,
                EventKind::DirtyValues,
                EventKind::Dirty,
            ],
            EventDetail::Weights {
                old: before,
                new: after,
            },
        );
        Ok(())
    }

    // Metadata

    pub fn set_label(&mut self, col: ColumnId, label: impl Into<String>) -> ModelResult<()> {
        let mut metadata = self.column(col)?.metadata();
        metadata.label = label.into();
        self.set_metadata(col, metadata)
    }

    /// Update label, description and color together.
    pub fn set_metadata(&mut self, col: ColumnId, metadata: ColumnMetaData) -> ModelResult<()> {
        let node = self.column_mut(col)?;
        let label_changed = node.label != metadata.label;
        let color_changed = node.color != metadata.color;
        if !label_changed && !color_changed && node.description == metadata.description {
            return Ok(());
        }
        node.label = metadata.label;
        node.description = metadata.description;
        node.color = metadata.color;

        let mut kinds = Vec::with_capacity(5);
        if label_changed {
            kinds.push(EventKind::LabelChanged);
        }
        kinds.push(EventKind::MetaDataChanged);
        kinds.push(EventKind::DirtyHeader);
        if color_changed {
            kinds.push(EventKind::DirtyValues);
        }
        kinds.push(EventKind::Dirty);
        self.fire(col.into(), &kinds, EventDetail::None);
        Ok(())
    }

    pub fn set_compressed(&mut self, col: ColumnId, compressed: bool) -> ModelResult<()> {
        let node = self.column_mut(col)?;
        if node.compressed == compressed {
            return Ok(());
        }
        node.compressed = compressed;
        self.fire(
            col.into(),
            &[
                EventKind::CompressChanged,
                EventKind::DirtyHeader,
                EventKind::DirtyValues,
                EventKind::Dirty,
            ],
            EventDetail::Compressed(compressed),
        );
        Ok(())
    }

    pub fn toggle_compressed(&mut self, col: ColumnId) -> ModelResult<bool> {
        let compressed = !self.column(col)?.compressed;
        self.set_compressed(col, compressed)?;
        Ok(compressed)
    }

    /// `parent.fqid + "_" + id`, rooted at the ranking id.
    pub fn fqid(&self, col: ColumnId) -> ModelResult<String> {
        let node = self.column(col)?;
        Ok(match node.parent {
            Some(NodeRef::Column(parent)) => format!("{}_{}", self.fqid(parent)?, node.id),
            Some(NodeRef::Ranking(ranking)) => format!("{}_{}", self.ranking(ranking)?.id, node.id),
            None => node.id.clone(),
        })
    }

    /// `parent.fqpath + "@" + index`; a ranking's path is empty.
    pub fn fqpath(&self, col: ColumnId) -> ModelResult<String> {
        let node = self.column(col)?;
        let (prefix, index) = match node.parent {
            Some(NodeRef::Column(parent)) => (
                self.fqpath(parent)?,
                self.column(parent)?.children.iter().position(|&c| c == col),
            ),
            Some(NodeRef::Ranking(ranking)) => (
                String::new(),
                self.ranking(ranking)?.columns.iter().position(|&c| c == col),
            ),
            None => return Ok(String::new()),
        };
        Ok(format!("{prefix}@{}", index.unwrap_or_default()))
    }
}
