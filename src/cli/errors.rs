//! CLI-specific error types
//!
//! Every CLI error is fatal: the process prints a single JSON error
//! object to stderr and exits non-zero. There is no partial-command
//! recovery at this layer.

use std::fmt;
use std::io;

use crate::core::error::StoreError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdin/stdout)
    IoError,
    /// The store rejected an operation (wraps a `StoreError`)
    Store,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "PORTADB_CLI_CONFIG_ERROR",
            Self::IoError => "PORTADB_CLI_IO_ERROR",
            Self::Store => "PORTADB_CLI_STORE_ERROR",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    /// Set when this error wraps a `StoreError`; its taxonomy code
    /// (`NOT_FOUND`, `CONFLICT`, ...) takes precedence over `code` in
    /// `code_str` so callers see the store's own classification.
    store_code: Option<&'static str>,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            store_code: None,
            message: message.into(),
        }
    }

    /// Config error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    /// I/O error
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string: the wrapped store error's own taxonomy
    /// code when present, otherwise the CLI-layer code.
    pub fn code_str(&self) -> &'static str {
        self.store_code.unwrap_or_else(|| self.code.code())
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        Self {
            code: CliErrorCode::Store,
            store_code: Some(e.code()),
            message: e.to_string(),
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
