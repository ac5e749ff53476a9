use thiserror::Error;

/// Result type alias for font-pack operations.
pub type Result<T> = std::result::Result<T, FontError>;

/// Errors raised while discovering or loading font packs.
#[derive(Error, Debug)]
pub enum FontError {
    /// Filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive error.
    #[error("archive error: {0}")]
    Archive(String),

    /// `fontpack.ini` could not be parsed.
    #[error("failed to parse {file}: {reason}")]
    Parse {
        /// File that failed to parse.
        file: String,
        /// Human-readable reason.
        reason: String,
    },

    /// A spec table was missing its mandatory `regular` style.
    #[error("spec {0:?} has no regular style and cannot be resolved")]
    NoRegularStyle(String),
}

impl From<FontError> for gem_core::Error {
    fn from(err: FontError) -> Self {
        match err {
            FontError::Io(e) => Self::Io(e),
            FontError::Archive(msg) => Self::Internal(msg),
            FontError::Parse { file, reason } => Self::PersistedFileParse { file, reason },
            FontError::NoRegularStyle(id) => Self::Internal(format!("spec {id} has no regular style")),
        }
    }
}
