use thiserror::Error;

/// Result type alias for gem operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur anywhere in the request pipeline or the
/// persistent stores.
#[derive(Error, Debug)]
pub enum Error {
    /// The URL could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The scheme is not one this engine knows how to dispatch.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// The response header line was malformed or missing its terminator.
    #[error("invalid response header")]
    InvalidHeader,

    /// The connection closed before a complete header was received.
    #[error("incomplete response header")]
    IncompleteHeader,

    /// The peer's TLS certificate is expired.
    #[error("server certificate has expired")]
    CertificateExpired,

    /// The peer's TLS certificate did not pass TOFU verification.
    #[error("server certificate could not be verified")]
    CertificateNotVerified,

    /// A generic TLS handshake/record failure not covered above.
    #[error("TLS failure: {0}")]
    TlsFailure(String),

    /// The underlying socket connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// DNS resolution failed.
    #[error("DNS resolution failed: {0}")]
    Dns(String),

    /// A Guppy session exceeded its total timeout without finishing.
    #[error("guppy session timed out")]
    GuppyTimeout,

    /// I/O error bubbled up from a persistence layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted file could not be parsed; the offending section was
    /// skipped rather than aborting the whole load.
    #[error("failed to parse {file}: {reason}")]
    PersistedFileParse {
        /// File that failed to parse.
        file: String,
        /// Human-readable reason.
        reason: String,
    },

    /// TOML (de)serialization error.
    #[error("TOML error: {0}")]
    Toml(String),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A mime filter hook failed to run or produced no replacement body.
    #[error("mime filter hook failed: {0}")]
    FilterHook(String),

    /// Generic internal error, used sparingly.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if retrying the same request might succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Dns(_) | Self::GuppyTimeout)
    }

    /// Returns true if this is a certificate-trust related failure.
    #[must_use]
    pub const fn is_cert_error(&self) -> bool {
        matches!(
            self,
            Self::CertificateExpired | Self::CertificateNotVerified
        )
    }
}
