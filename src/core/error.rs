//! Error taxonomy
//!
//! Every public entry point returns `StoreResult<T>`. Adapters translate
//! their own native failures into this taxonomy at the boundary so callers
//! never see a backend-specific error type.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed statement text, unknown function, type mismatch in a
    /// comparison, or any other client-supplied input the store rejects
    /// before attempting execution.
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A targeted collection, index, or document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness or state-machine invariant was violated (duplicate
    /// primary key on an unconditional PUT, index already exists, etc).
    #[error("conflict: {0}")]
    Conflict(String),

    /// An `etag`-qualified operation's precondition did not hold.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The targeted backend does not implement the requested capability.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A conditional read/write found the resource unchanged.
    #[error("not modified")]
    NotModified,

    /// A transport-level failure (timeout exhaustion, connection reset)
    /// distinguishable from a logical failure so callers know it is safe
    /// to retry.
    #[error("transient: {0}")]
    Transient(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::PreconditionFailed(_) => "PRECONDITION_FAILED",
            Self::NotSupported(_) => "NOT_SUPPORTED",
            Self::NotModified => "NOT_MODIFIED",
            Self::Transient(_) => "TRANSIENT",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::PreconditionFailed(_) => 412,
            Self::NotSupported(_) => 422,
            Self::NotModified => 304,
            Self::Transient(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn precondition_failed(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }
}

impl From<crate::ql::QlError> for StoreError {
    fn from(e: crate::ql::QlError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<crate::value::PathError> for StoreError {
    fn from(e: crate::value::PathError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::BadRequest(e.to_string())
    }
}
