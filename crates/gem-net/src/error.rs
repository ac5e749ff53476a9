use thiserror::Error;

/// Result type alias for request-pipeline and transport operations.
pub type NetResult<T> = std::result::Result<T, NetError>;

/// Errors raised while dispatching or driving a request.
#[derive(Error, Debug)]
pub enum NetError {
    /// The URL could not be parsed or canonicalized.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The scheme has no registered transport.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// The local resource (file, archive entry, `about:` page) does not
    /// exist or could not be opened.
    #[error("local resource unavailable: {0}")]
    LocalResource(String),

    /// A `data:` URL was malformed.
    #[error("invalid data URL")]
    InvalidDataUrl,

    /// The underlying socket connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// DNS resolution failed.
    #[error("DNS resolution failed: {0}")]
    Dns(String),

    /// The peer's TLS certificate is expired.
    #[error("server certificate has expired")]
    CertificateExpired,

    /// The peer's TLS certificate did not pass TOFU verification.
    #[error("server certificate could not be verified")]
    CertificateNotVerified,

    /// A generic TLS handshake/record failure not covered above.
    #[error("TLS failure: {0}")]
    TlsFailure(String),

    /// A Guppy session exceeded its total timeout without finishing.
    #[error("guppy session timed out")]
    GuppyTimeout,

    /// A Guppy peer response could not be parsed into a header.
    #[error("invalid guppy response")]
    InvalidGuppyResponse,

    /// A line-oriented reply (Spartan status line, etc.) exceeded its
    /// expected size without a terminator.
    #[error("reply line too long")]
    ReplyTooLong,

    /// A mime filter hook process failed to run.
    #[error("mime filter hook failed: {0}")]
    FilterHook(String),

    /// ZIP archive error.
    #[error("archive error: {0}")]
    Archive(String),

    /// Underlying store error (trust, identity, site-spec lookups).
    #[error(transparent)]
    Store(#[from] gem_store::StoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<NetError> for gem_core::Error {
    fn from(err: NetError) -> Self {
        match err {
            NetError::InvalidUrl(msg) => Self::InvalidUrl(msg),
            NetError::UnsupportedScheme(msg) => Self::UnsupportedScheme(msg),
            NetError::LocalResource(msg) | NetError::Archive(msg) => Self::Internal(msg),
            NetError::InvalidDataUrl => Self::InvalidHeader,
            NetError::Connection(msg) => Self::Connection(msg),
            NetError::Dns(msg) => Self::Dns(msg),
            NetError::CertificateExpired => Self::CertificateExpired,
            NetError::CertificateNotVerified => Self::CertificateNotVerified,
            NetError::TlsFailure(msg) => Self::TlsFailure(msg),
            NetError::GuppyTimeout => Self::GuppyTimeout,
            NetError::InvalidGuppyResponse => Self::Internal("invalid guppy response".to_string()),
            NetError::ReplyTooLong => Self::Internal("reply line too long".to_string()),
            NetError::FilterHook(msg) => Self::FilterHook(msg),
            NetError::Store(e) => e.into(),
            NetError::Io(e) => Self::Io(e),
        }
    }
}
