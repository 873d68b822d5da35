use thiserror::Error;

pub type Result<T> = std::result::Result<T, DocIndexError>;

#[derive(Debug, Error)]
pub enum DocIndexError {
    #[error("document store is closed")]
    Closed,
    #[error("invalid regex {pattern:?}: {message}")]
    InvalidRegex { pattern: String, message: String },
    #[error("commit failed: {0}")]
    Commit(String),
    #[error(transparent)]
    Storage(#[from] jref_storage::StorageError),
    #[error(transparent)]
    Cache(#[from] jref_cache::CacheError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
