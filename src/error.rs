//! Error kinds surfaced by the engine.
//!
//! Compilation fails with a [`SyntaxError`]; rendering fails with a
//! [`RenderError`]. [`TemplateError`] wraps both for callers that compile
//! and render in one go.

use thiserror::Error;

/// Malformed template source. Line and column are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("syntax error at line {line}, column {column}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("name '{0}' is not defined")]
    UnboundName(String),

    #[error("local variable '{0}' referenced before assignment")]
    UnboundLocal(String),

    /// Call arguments do not fit a parameter list.
    #[error("{0}")]
    Argument(String),

    /// A value lacks the capability an operation needs.
    #[error("{operation}: {message}")]
    Type { operation: String, message: String },

    /// Missing key, index out of range, unknown attribute.
    #[error("{0}")]
    Lookup(String),

    #[error("{0}")]
    Arithmetic(String),
}

impl RenderError {
    pub fn type_error(operation: impl Into<String>, message: impl Into<String>) -> Self {
        RenderError::Type {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Render(#[from] RenderError),
}
