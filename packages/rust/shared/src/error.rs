//! Error types for citefill.
//!
//! Library crates use [`CitefillError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all citefill operations.
#[derive(Debug, thiserror::Error)]
pub enum CitefillError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input could not be parsed (catalog JSON, year ranges, entry blocks).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Data validation error (bad key, bad argument, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// No citation command could be re-located at the requested position.
    #[error("no citation found at line {line}, column {column}")]
    SiteNotFound { line: usize, column: usize },

    /// The search collaborator returned nothing, even after keyword fallback.
    #[error("no candidates found for the given context")]
    NoCandidates,

    /// An external collaborator signalled a rate or usage limit.
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    /// The detected external bibliography reference is not a writable path.
    #[error("malformed bibliography target: {message}")]
    MalformedBibliographyTarget { message: String },

    /// Any other failure reported by an external collaborator.
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// The document on disk changed after it was loaded.
    #[error("document {path:?} was modified on disk since it was loaded")]
    ConcurrentModification { path: PathBuf },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CitefillError>;

impl CitefillError {
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

    /// Create a malformed-bibliography-target error.
    pub fn malformed_target(msg: impl Into<String>) -> Self {
        Self::MalformedBibliographyTarget {
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

    /// Whether this error should stop every remaining site in a run.
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, Self::QuotaExhausted(_))
    }

    /// Whether this error comes from touching the manuscript or bibliography on disk.
    pub fn is_fatal_io(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::ConcurrentModification { .. })
    }
}
