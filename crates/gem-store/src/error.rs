use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by the persistent stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted file's contents could not be parsed; the caller
    /// should log and skip the offending section rather than abort.
    #[error("failed to parse {file}: {reason}")]
    Parse {
        /// File that failed to parse.
        file: String,
        /// Human-readable reason.
        reason: String,
    },

    /// TOML (de)serialization error.
    #[error("TOML error: {0}")]
    Toml(String),

    /// Certificate generation or parsing error.
    #[error("certificate error: {0}")]
    Certificate(String),

    /// ZIP archive error.
    #[error("archive error: {0}")]
    Archive(String),

    /// The bookmark or folder id referenced does not exist.
    #[error("no such bookmark: {0}")]
    NoSuchBookmark(u32),

    /// A [`crate::feeds::FeedFetcher`] implementation's underlying
    /// transport failed (e.g. the request pipeline's own error type).
    #[error("fetch failed: {0}")]
    Fetch(String),
}

impl From<StoreError> for gem_core::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io(e) => Self::Io(e),
            StoreError::Parse { file, reason } => Self::PersistedFileParse { file, reason },
            StoreError::Toml(msg) => Self::Toml(msg),
            StoreError::Certificate(msg) | StoreError::Archive(msg) => Self::Internal(msg),
            StoreError::NoSuchBookmark(id) => Self::Internal(format!("no such bookmark: {id}")),
            StoreError::Fetch(msg) => Self::Internal(msg),
        }
    }
}
