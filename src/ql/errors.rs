//! Parse/bind errors for the statement language.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum QlError {
    #[error("unexpected end of statement")]
    UnexpectedEof,
    #[error("unexpected token {found:?} at position {pos}, expected {expected}")]
    UnexpectedToken { found: String, pos: usize, expected: String },
    #[error("unknown function {0}")]
    UnknownFunction(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("invalid literal: {0}")]
    InvalidLiteral(String),
    #[error("unbound parameter @{0}")]
    UnboundParameter(String),
    #[error("parameter @{0} is not a clause string")]
    NotAClause(String),
    #[error("conflicting SET assignments on overlapping paths: {0} and {1}")]
    ConflictingAssignment(String, String),
}

pub type QlResult<T> = Result<T, QlError>;
