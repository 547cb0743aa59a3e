//! Core utilities for LineUp.
//!
//! This crate provides the leaf building blocks the ranking engine is built on:
//!
//! - **Signals**: [`Signal<Args>`] for provider notifications
//! - **Event dispatch**: [`EventDispatcher<K, E>`] for multi-kind events with
//!   owner-scoped listener registration
//! - **Debouncing**: [`Debouncer<K>`] to coalesce bursts of triggers per key
//! - **Scripts**: a sandboxed expression language ([`script::Program`])
//! - **Logging**: `tracing` targets and a generic tree formatter

pub mod debounce;
pub mod dispatch;
mod error;
pub mod logging;
pub mod script;
pub mod signal;

pub use debounce::Debouncer;
pub use dispatch::{EventDispatcher, ListenerId, OwnerTag};
pub use error::{CoreError, CoreResult, EvalError, ParseError};
pub use logging::{TreeDebug, TreeFormatOptions, TreeSource, TreeStyle};
pub use signal::{ConnectionId, Signal};
