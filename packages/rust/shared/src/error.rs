//! Error types for shardscrape.
//!
//! Library crates use [`ScrapeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all shardscrape operations.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to the source list or destination store.
    #[error("network error: {0}")]
    Network(String),

    /// Credential loading or token exchange error.
    #[error("auth error: {0}")]
    Auth(String),

    /// Malformed payload (API response, checkpoint file, source file).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad shard spec, bad column reference, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The rendering engine could not be launched or replaced.
    #[error("render error: {0}")]
    Render(String),
}

/// Failure of a single write request to the tabular store.
///
/// Kept apart from [`ScrapeError`] because both cases are recoverable: the
/// batch stays in memory and the run continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store rejected the request for exceeding its write quota.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Any other rejection or transport failure.
    #[error("write failed: {0}")]
    Failed(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScrapeError>;

impl ScrapeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
