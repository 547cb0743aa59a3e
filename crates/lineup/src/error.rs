//! Error types for the column model and data providers.

use crate::model::{ColumnId, RankingId};

/// Programmer errors raised by the column model.
///
/// Expected, user-triggered invalid operations (removing a column that is not
/// a child, sorting by a foreign column) are reported through `bool`/`Option`
/// return values instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// The column id is stale or was never issued by this registry.
    #[error("Invalid or destroyed column {0:?}")]
    InvalidColumn(ColumnId),
    /// The ranking id is stale or was never issued by this registry.
    #[error("Invalid or destroyed ranking {0:?}")]
    InvalidRanking(RankingId),
    /// The column already has a parent and must be removed from it first.
    #[error("Column '{0}' is already attached to a parent")]
    AlreadyAttached(String),
    /// The column kind cannot hold children.
    #[error("Column '{0}' is not a composite column")]
    NotComposite(String),
    /// Inserting the column would make it its own ancestor.
    #[error("Cannot insert column '{0}' into its own subtree")]
    CircularParentage(String),
}

/// Result type for column model operations.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Errors surfaced by data providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider does not implement this operation.
    #[error("Operation '{0}' is not implemented by this provider")]
    NotImplemented(&'static str),
    /// The ranking is not managed by this provider.
    #[error("Unknown ranking {0:?}")]
    UnknownRanking(RankingId),
    /// A requested row index lies outside the data set.
    #[error("Row index {index} out of range for {len} rows")]
    RowOutOfRange { index: usize, len: usize },
    /// The remote backend failed.
    #[error("Backend error: {0}")]
    Backend(String),
    /// A column model invariant was violated.
    #[error(transparent)]
    Model(#[from] ModelError),
    /// A dump or descriptor could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProviderError {
    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
