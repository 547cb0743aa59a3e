//! Error types for LineUp core utilities.

/// The main error type for core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The listener handle is invalid or has already been removed.
    #[error("Invalid or removed listener handle")]
    InvalidListener,
    /// A script failed to compile.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// A script failed while being evaluated.
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Errors produced while tokenizing or parsing a script.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Parse error at offset {offset}: {message}")]
pub struct ParseError {
    /// Human readable description.
    pub message: String,
    /// Character offset into the source where the error was detected.
    pub offset: usize,
}

impl ParseError {
    /// Create a parse error at the given offset.
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// Errors produced while evaluating a compiled script.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// A name was referenced that is neither a variable nor a function.
    #[error("Unknown identifier '{0}'")]
    UnknownIdentifier(String),
    /// A function was called with an unsupported argument list.
    #[error("Invalid arguments for '{name}': {message}")]
    InvalidArguments { name: String, message: String },
    /// An operator was applied to operands it does not support.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
}

impl EvalError {
    /// Create an invalid-arguments error.
    pub fn invalid_arguments(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// A specialized Result type for core operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
