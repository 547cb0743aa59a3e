//! LineUp - a ranking engine for tabular data.
//!
//! The crate is split into two layers:
//!
//! - **Model** ([`model`]): a tree of typed columns (string, number,
//!   categorical, weighted stacks, nested multi-level sorts, ...) grouped
//!   into independently sortable and filterable rankings.
//! - **Providers** ([`provider`]): the [`DataProvider`] protocol that owns
//!   the rankings, the selection and the descriptors, and computes orders
//!   either in memory ([`LocalDataProvider`]) or through a server
//!   ([`RemoteDataProvider`]).
//!
//! # Example
//!
//! ```
//! use lineup::{ColumnDesc, DataProvider, LocalDataProvider, ProviderOptions};
//! use serde_json::json;
//!
//! let data = vec![json!({"a": 10}), json!({"a": 5}), json!({"a": 7})];
//! let descs = vec![ColumnDesc::number("a", [0.0, 10.0])];
//! let mut provider = LocalDataProvider::new(data, descs, ProviderOptions::default());
//!
//! let ranking = provider.derive_default().unwrap().unwrap();
//! // rank, selection, then the data columns
//! let a = provider.core().registry().ranking(ranking).unwrap().columns()[2];
//! provider.core_mut().registry_mut().sort_by(ranking, Some(a), true).unwrap();
//!
//! let order = futures_util::FutureExt::now_or_never(provider.reorder(ranking));
//! assert!(matches!(order, Some(Ok(true))));
//! assert_eq!(provider.core().registry().order(ranking).unwrap(), &[1, 2, 0]);
//! ```

pub mod error;
pub mod model;
pub mod provider;

pub use error::{ModelError, ModelResult, ProviderError, ProviderResult};
pub use model::{
    ColumnDesc, ColumnDump, ColumnEvent, ColumnId, ColumnKind, ColumnRegistry, EventKind,
    MappingFunction, NodeRef, RankingDump, RankingId, Row, SortCriteria, SortTicket,
};
pub use provider::{
    DataProvider, ExportOptions, LocalDataProvider, ProviderDump, ProviderOptions,
    RemoteBackend, RemoteDataProvider, SearchPattern, SelectionModel,
};
