//! Sandboxed expression language for user-supplied scripts.
//!
//! Scripts are small numeric expressions such as
//! `return this.linear(value, this.value_min, this.value_max);` or
//! `d3.max(values)`. They are parsed once into a [`Program`] and evaluated
//! against a [`Scope`] of named numbers and number lists. Nothing outside
//! the scope and the built-in function table is reachable.
//!
//! Built-in functions: `linear`, `min`, `max`, `sum`, `mean`, `median`, `abs`,
//! `sqrt`, `log`, `log10`, `exp`, `pow`, `floor`, `ceil`, `round`, `clamp`.
//!
//! ```
//! use lineup_core::script::{Program, Scope};
//!
//! let program = Program::compile("return d3.max(values);").unwrap();
//! let scope = Scope::new().with("values", vec![0.2, 0.9, 0.4]);
//! assert_eq!(program.evaluate_number(&scope), 0.9);
//! ```

mod ast;
mod eval;
mod lexer;
mod parser;

use std::fmt;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use eval::{EvalResult, Scope, Value};
pub use parser::ParseResult;

use crate::error::{EvalError, ParseError};
use crate::logging::targets;

/// A compiled script.
#[derive(Clone, PartialEq)]
pub struct Program {
    source: String,
    expr: Expr,
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Program").field(&self.source).finish()
    }
}

impl Program {
    /// Parse `source` into a program.
    pub fn compile(source: &str) -> ParseResult<Self> {
        let expr = parser::parse(source)?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// The original source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parsed expression tree.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluate against `scope`.
    pub fn evaluate(&self, scope: &Scope) -> Result<Value, EvalError> {
        eval::evaluate(&self.expr, scope)
    }

    /// Evaluate and coerce to a number; failures and lists become NaN.
    pub fn evaluate_number(&self, scope: &Scope) -> f64 {
        match self.evaluate(scope) {
            Ok(Value::Number(n)) => n,
            Ok(Value::List(_)) => {
                tracing::trace!(target: targets::SCRIPT, source = %self.source, "script returned a list");
                f64::NAN
            }
            Err(err) => {
                tracing::trace!(target: targets::SCRIPT, source = %self.source, %err, "script failed");
                f64::NAN
            }
        }
    }
}

/// Compile `source`, logging a warning on failure.
pub fn compile_logged(source: &str) -> Result<Program, ParseError> {
    Program::compile(source).inspect_err(|err| {
        tracing::warn!(target: targets::SCRIPT, source, %err, "failed to compile script");
    })
}
