//! Tree rendering of rankings for logs and debugging.

use lineup_core::logging::{TreeDebug, TreeFormatOptions, TreeSource};

use super::registry::ColumnRegistry;
use super::{NodeRef, RankingId};

/// A [`TreeSource`] view over a [`ColumnRegistry`].
pub struct RegistryTree<'a> {
    registry: &'a ColumnRegistry,
}

impl<'a> RegistryTree<'a> {
    pub fn new(registry: &'a ColumnRegistry) -> Self {
        Self { registry }
    }
}

impl TreeSource for RegistryTree<'_> {
    type Node = NodeRef;

    fn name(&self, node: NodeRef) -> String {
        match node {
            NodeRef::Column(col) => self
                .registry
                .column(col)
                .map(|c| c.label().to_string())
                .unwrap_or_default(),
            NodeRef::Ranking(ranking) => self
                .registry
                .ranking(ranking)
                .map(|r| r.id().to_string())
                .unwrap_or_default(),
        }
    }

    fn id(&self, node: NodeRef) -> String {
        match node {
            NodeRef::Column(col) => self
                .registry
                .column(col)
                .map(|c| c.id().to_string())
                .unwrap_or_default(),
            NodeRef::Ranking(ranking) => self.name(ranking.into()),
        }
    }

    fn type_name(&self, node: NodeRef) -> String {
        match node {
            NodeRef::Column(col) => self
                .registry
                .column(col)
                .map(|c| c.kind().kind_name().to_string())
                .unwrap_or_default(),
            NodeRef::Ranking(_) => "ranking".to_string(),
        }
    }

    fn details(&self, node: NodeRef) -> Option<String> {
        match node {
            NodeRef::Column(col) => {
                let column = self.registry.column(col).ok()?;
                let ranking = self.registry.find_my_ranker(col)?;
                let criteria = self.registry.sort_criteria(ranking).ok()?;
                let mut details = format!("width={}", column.width());
                if criteria.column == Some(col) {
                    details.push_str(if criteria.ascending { " sort=asc" } else { " sort=desc" });
                }
                Some(details)
            }
            NodeRef::Ranking(ranking) => self
                .registry
                .order(ranking)
                .ok()
                .map(|order| format!("rows={}", order.len())),
        }
    }

    fn children(&self, node: NodeRef) -> Vec<NodeRef> {
        let columns = match node {
            NodeRef::Column(col) => self.registry.children(col).map(<[_]>::to_vec),
            NodeRef::Ranking(ranking) => self.registry.ranking(ranking).map(|r| r.columns().to_vec()),
        };
        columns
            .unwrap_or_default()
            .into_iter()
            .map(NodeRef::Column)
            .collect()
    }
}

impl ColumnRegistry {
    /// Render the column tree of a ranking.
    pub fn debug_tree(&self, ranking: RankingId, options: TreeFormatOptions) -> String {
        TreeDebug::with_options(options).format_subtree(&RegistryTree::new(self), ranking.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnDesc;

    #[test]
    fn test_debug_tree_lists_nested_columns() {
        let mut registry = ColumnRegistry::new();
        let ranking = registry.create_ranking("rank0");
        let stack = registry.create_column("s", ColumnDesc::new("stack").with_label("Total"));
        let a = registry.create_column("a", ColumnDesc::number("a", [0.0, 1.0]).with_label("Alpha"));
        registry.push_child(stack, a).unwrap();
        registry.push(ranking, stack).unwrap();

        let tree = registry.debug_tree(ranking, TreeFormatOptions::detailed());
        assert!(tree.contains("rank0"));
        assert!(tree.contains("Total"));
        assert!(tree.contains("Alpha"));
        assert!(tree.contains("sort=desc"));
    }
}
