//! Error types for desk
//!
//! One taxonomy shared by every crate. Validation failures carry a stable,
//! client-facing message; everything else is logged server-side and surfaced
//! generically.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Why a command line was refused before anything was spawned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Longer than the configured cap
    TooLong,
    /// Contains a pipeline, list, redirection or substitution operator
    UnsupportedOperator,
    /// Nothing left after tokenization
    Empty,
    /// First token is not in the whitelist
    NotPermitted,
    /// Unbalanced quotes or a dangling escape
    Unparseable,
}

impl Rejection {
    /// Stable message the front end matches on
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::TooLong => "Command too long",
            Rejection::UnsupportedOperator => "Command contains unsupported operators",
            Rejection::Empty => "Empty command",
            Rejection::NotPermitted => "Command not permitted",
            Rejection::Unparseable => "Command could not be parsed",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// desk error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Validation (always 4xx)
    // ========================================================================
    /// The detail is for logs only, never for the client
    #[error("Invalid path: {0}")]
    PathEscape(String),

    #[error("{0}")]
    Rejected(Rejection),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    // ========================================================================
    // Execution
    // ========================================================================
    #[error("Failed to spawn process: {0}")]
    ProcessSpawn(String),

    // ========================================================================
    // Configuration / upstream
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    // ========================================================================
    // External conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a rejected command
    pub fn rejected(reason: Rejection) -> Self {
        Error::Rejected(reason)
    }

    /// True for errors detected before any process or job exists
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::PathEscape(_)
                | Error::Rejected(_)
                | Error::NotFound(_)
                | Error::AlreadyExists(_)
                | Error::InvalidInput(_)
                | Error::PayloadTooLarge(_)
        )
    }

    /// Rejection reason, if this is a refused command
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Error::Rejected(r) => Some(*r),
            _ => None,
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
