// src/error.rs

use thiserror::Error;

/// Every error kind the cache can surface to a caller.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A lookup referenced a source or destination id unknown to the cache.
    #[error("not in cache: {0}")]
    NotInCache(String),

    /// An update failed precheck: malformed shape, unknown id, duplicate in
    /// a unique variant, or a type disallowed by the variant.
    #[error("invalid cache update: {0}")]
    InvalidCacheUpdate(String),

    /// An update failed preflight normalisation.
    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    /// A field was asked to link two entity kinds with no link table
    /// between them.
    #[error("no link table between '{0}' and '{1}'")]
    InvalidLinkTable(String, String),

    /// The store reported a constraint violation on commit. The cache is
    /// stale and must be re-read.
    #[error("database integrity error, cache must be re-read: {0}")]
    DatabaseIntegrityError(String),

    /// Caller passed a value of the wrong kind, e.g. a set handed to a
    /// priority variant.
    #[error("input integrity error: {0}")]
    InputIntegrityError(String),

    /// A composite or on-device field was asked to accept a direct write.
    #[error("composite fields cannot be directly updated")]
    ReadOnlyField,

    #[error("sqlite store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;
