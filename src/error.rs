use thiserror::Error;

use crate::backend::BackendError;

/// Compiler result type.
pub type CompilerResult<T> = Result<T, CompilerError>;

/// Errors produced while processing one top-level statement.
///
/// A `Parse` or `Codegen` error aborts only the statement that raised it;
/// the session discards tokens up to the next `;` and continues.
#[derive(Error, Debug)]
pub enum CompilerError {
    /// Structural grammar violations, bad arity declarations, unknown
    /// leading tokens.
    #[error("parse error at {location}: {message}")]
    Parse {
        location: SourceLocation,
        message: String,
    },

    /// IR generation failures.
    #[error(transparent)]
    Codegen(#[from] CodegenError),

    /// Failures reported by the backend after hand-off.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// IR generation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("unknown variable '{0}'")]
    UndefinedVariable(String),

    #[error("unknown function '{0}'")]
    UndefinedCallee(String),

    #[error("function '{name}' expects {expected} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("binary operator '{0}' is not defined")]
    UnresolvedBinaryOperator(char),

    #[error("unary operator '{0}' is not defined")]
    UnresolvedUnaryOperator(char),

    #[error("redefinition of '{name}' with {got} parameter(s), previously declared with {expected}")]
    Redefinition {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("destination of '=' must be a variable")]
    InvalidAssignmentTarget,
}

/// Source position for error reporting, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    /// Create a new source location.
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

impl CompilerError {
    /// Create a parse error.
    pub fn parse_error(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::Parse {
            location,
            message: message.into(),
        }
    }
}
