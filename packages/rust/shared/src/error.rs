//! Error types for promptgen.
//!
//! Library crates use [`PromptgenError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all promptgen operations.
#[derive(Debug, thiserror::Error)]
pub enum PromptgenError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Tool-mapping table is unreadable or corrupt.
    #[error("tool table error at {path:?}: {message}")]
    ToolTable { path: PathBuf, message: String },

    /// Run-level validation failure (no sources, bad layout, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PromptgenError>;

impl PromptgenError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a tool-table error for the table stored at `path`.
    pub fn tool_table(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::ToolTable {
            path: path.into(),
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
