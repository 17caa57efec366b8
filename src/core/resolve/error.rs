//! Resolve Error Types

use thiserror::Error;

/// Errors from dictionary ingestion and corrector setup.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dictionary load failed: {0}")]
    DictionaryLoad(String),
}

/// Result type alias for resolve operations.
pub type ResolveResult<T> = std::result::Result<T, ResolveError>;
