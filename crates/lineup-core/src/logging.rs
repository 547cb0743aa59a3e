//! Logging and debugging facilities for LineUp.
//!
//! This module provides:
//! - Target and span name constants for the `tracing` crate
//! - A generic tree formatter used to visualize column hierarchies
//!
//! # Tracing Integration
//!
//! LineUp never installs a subscriber. To see logs, install one in your
//! application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("lineup::ranking=debug,lineup::provider=trace")
//!     .init();
//! ```

use std::fmt::Write as FmtWrite;

/// Span names used throughout LineUp for tracing.
pub mod span_names {
    /// Sorting a ranking.
    pub const SORT: &str = "lineup::sort";
    /// Applying a resolved order to a ranking.
    pub const APPLY_ORDER: &str = "lineup::apply_order";
    /// Processing debounced reorders.
    pub const REORDER: &str = "lineup::reorder";
    /// Restoring a provider dump.
    pub const RESTORE: &str = "lineup::restore";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Signal emission.
    pub const SIGNAL: &str = "lineup_core::signal";
    /// Event dispatcher.
    pub const DISPATCH: &str = "lineup_core::dispatch";
    /// Debounce queue.
    pub const DEBOUNCE: &str = "lineup_core::debounce";
    /// Script compilation and evaluation.
    pub const SCRIPT: &str = "lineup_core::script";
    /// Column model.
    pub const COLUMN: &str = "lineup::column";
    /// Mapping functions.
    pub const MAPPING: &str = "lineup::mapping";
    /// Rankings.
    pub const RANKING: &str = "lineup::ranking";
    /// Data providers.
    pub const PROVIDER: &str = "lineup::provider";
    /// Selection state.
    pub const SELECTION: &str = "lineup::selection";
}

/// Style options for tree visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Compact single-line prefixes.
    Compact,
}

/// Configuration for tree debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show node ids.
    pub show_ids: bool,
    /// Whether to show type names.
    pub show_types: bool,
    /// Whether to show node details (widths, weights, filters).
    pub show_details: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
    /// Indent size for each level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: true,
            show_types: true,
            show_details: false,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Options for detailed debugging output.
    pub fn detailed() -> Self {
        Self {
            show_details: true,
            ..Default::default()
        }
    }

    /// Options for minimal output.
    pub fn minimal() -> Self {
        Self {
            show_ids: false,
            show_types: false,
            show_details: false,
            ..Default::default()
        }
    }

    /// Use the given style.
    pub fn with_style(mut self, style: TreeStyle) -> Self {
        self.style = style;
        self
    }

    /// Limit traversal depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }
}

/// A tree that can be rendered by [`TreeDebug`].
pub trait TreeSource {
    /// Node handle type.
    type Node: Copy;

    /// Display name of a node.
    fn name(&self, node: Self::Node) -> String;
    /// Stable id of a node.
    fn id(&self, node: Self::Node) -> String;
    /// Short type name of a node.
    fn type_name(&self, node: Self::Node) -> String;
    /// Extra detail shown with [`TreeFormatOptions::show_details`].
    fn details(&self, _node: Self::Node) -> Option<String> {
        None
    }
    /// Ordered children of a node.
    fn children(&self, node: Self::Node) -> Vec<Self::Node>;
}

/// Debug utility for visualizing trees.
#[derive(Debug, Clone, Default)]
pub struct TreeDebug {
    options: TreeFormatOptions,
}

impl TreeDebug {
    /// Create a formatter with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a formatter with custom options.
    pub fn with_options(options: TreeFormatOptions) -> Self {
        Self { options }
    }

    /// Format the forest formed by `roots`, headed by `title`.
    pub fn format_roots<S: TreeSource>(&self, source: &S, title: &str, roots: &[S::Node]) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "{title}");
        if roots.is_empty() {
            let _ = writeln!(output, "  (empty)");
        }
        for (i, &root) in roots.iter().enumerate() {
            self.format_into(source, root, 1, i + 1 == roots.len(), &mut output);
        }
        output
    }

    /// Format a subtree starting at `root`.
    pub fn format_subtree<S: TreeSource>(&self, source: &S, root: S::Node) -> String {
        let mut output = String::new();
        self.format_into(source, root, 0, true, &mut output);
        output
    }

    fn format_into<S: TreeSource>(
        &self,
        source: &S,
        node: S::Node,
        depth: usize,
        is_last: bool,
        output: &mut String,
    ) {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return;
        }

        output.push_str(&self.build_prefix(depth, is_last));

        let name = source.name(node);
        output.push_str(if name.is_empty() { "(unnamed)" } else { &name });
        if self.options.show_ids {
            let _ = write!(output, " [{}]", source.id(node));
        }
        if self.options.show_types {
            let _ = write!(output, " ({})", source.type_name(node));
        }
        if self.options.show_details {
            if let Some(details) = source.details(node) {
                let _ = write!(output, " {details}");
            }
        }
        output.push('\n');

        let children = source.children(node);
        let count = children.len();
        for (i, child) in children.into_iter().enumerate() {
            self.format_into(source, child, depth + 1, i + 1 == count, output);
        }
    }

    fn build_prefix(&self, depth: usize, is_last: bool) -> String {
        if depth == 0 {
            return String::new();
        }

        let (branch, corner, last) = match self.options.style {
            TreeStyle::Ascii => ("|", "+--", "`--"),
            TreeStyle::Unicode => ("\u{2502}", "\u{251c}\u{2500}\u{2500}", "\u{2514}\u{2500}\u{2500}"),
            TreeStyle::Compact => ("", "-", "-"),
        };

        let mut prefix = String::new();
        for _ in 0..(depth - 1) {
            prefix.push_str(branch);
            prefix.extend(std::iter::repeat_n(' ', self.options.indent_size));
        }
        prefix.push_str(if is_last { last } else { corner });
        prefix.push(' ');
        prefix
    }
}
