use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    /// A caller broke an API contract: a closed transaction was reused, a
    /// state machine was moved backwards, or a write ran outside a
    /// transaction.
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("root `{}` is not indexed", .0.display())]
    UnknownRoot(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    DocIndex(#[from] jref_docindex::DocIndexError),

    #[error(transparent)]
    Cache(#[from] jref_cache::CacheError),

    #[error(transparent)]
    Classfile(#[from] jref_classfile::Error),

    #[error(transparent)]
    Config(#[from] jref_config::ConfigError),

    #[error("failed to read archive `{}`: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

impl IndexError {
    pub(crate) fn illegal_state(message: impl Into<String>) -> Self {
        IndexError::IllegalState(message.into())
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(self, IndexError::IllegalState(_))
    }
}
