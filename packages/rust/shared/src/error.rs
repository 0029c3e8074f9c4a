//! Error types for jetmaster.
//!
//! Library crates use [`MasterError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` and alone decides how a failure ends
//! the process.

use std::path::PathBuf;

/// Top-level error type for all master build and release operations.
#[derive(Debug, thiserror::Error)]
pub enum MasterError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A component's source could not be obtained (HTTP or local read).
    #[error("failed to fetch component {location}: {message}")]
    ComponentFetch { location: String, message: String },

    /// The dev-redirect snippet template is missing; no artifact may be built without it.
    #[error("redirect snippet not found at {path:?}")]
    SnippetMissing { path: PathBuf },

    /// The descriptor has no `master` section, so there is nothing to promote.
    #[error("descriptor at {path:?} has no master section, possibly no components were merged")]
    MissingMasterSection { path: PathBuf },

    /// Object storage error other than a missing key.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Descriptor JSON could not be parsed or serialized.
    #[error("parse error: {message}")]
    Parse { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MasterError>;

impl MasterError {
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

    /// Create a component fetch error for `location`.
    pub fn component_fetch(location: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ComponentFetch {
            location: location.into(),
            message: msg.into(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
