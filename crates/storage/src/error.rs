use std::path::PathBuf;

/// All errors that can be returned by a global store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the store document (or a marker file) failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cross-process lock could not be acquired.
    #[error("failed to lock {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The in-memory document could not be serialized.
    #[error("failed to serialize global variables: {0}")]
    Serialize(#[from] serde_json::Error),

    /// An in-process mutex was poisoned by a panicking writer.
    #[error("global store poisoned: {0}")]
    Poisoned(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}
