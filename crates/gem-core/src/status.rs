//! Synthetic and real Gemini status codes.
//!
//! Real wire codes are the two-digit values defined by the Gemini
//! protocol (`1x` input, `2x` success, `3x` redirect, `4x` temporary
//! failure, `5x` permanent failure, `6x` client certificate). Negative
//! values are purely local, synthetic outcomes that never appear on the
//! wire but still need to flow through the same classification path.

/// A Gemini response status, wire-encoded or synthetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum GmStatusCode {
    /// The response header could not be parsed at all.
    InvalidHeader = -1,
    /// The connection closed before a header arrived.
    IncompleteHeader = -2,
    /// A TLS handshake or record-layer failure.
    TlsFailure = -3,
    /// The server's own certificate has expired.
    TlsServerCertificateExpired = -4,
    /// The server's own certificate failed TOFU verification.
    TlsServerCertificateNotVerified = -5,
    /// A proxy's certificate has expired.
    ProxyCertificateExpired = -6,
    /// A proxy's certificate failed TOFU verification.
    ProxyCertificateNotVerified = -7,
    /// A `file:`/`about:` URL named something outside the resource set
    /// this engine knows how to serve.
    InvalidLocalResource = -8,
    /// A `file:` URL pointed at something that exists but could not be
    /// opened or read.
    FailedToOpenFile = -9,
    /// The scheme has no registered transport.
    UnsupportedProtocol = -10,
    /// Input is required (1x).
    Input = 10,
    /// Sensitive input is required (11).
    SensitiveInput = 11,
    /// Success (20).
    Success = 20,
    /// Temporary redirect (30).
    RedirectTemporary = 30,
    /// Permanent redirect (31).
    RedirectPermanent = 31,
    /// Temporary failure (40).
    TemporaryFailure = 40,
    /// Server unavailable (41).
    ServerUnavailable = 41,
    /// CGI error (42).
    CgiError = 42,
    /// Proxy error (43).
    ProxyError = 43,
    /// Slow down / rate limited (44).
    SlowDown = 44,
    /// Permanent failure (50).
    PermanentFailure = 50,
    /// Not found (51).
    NotFound = 51,
    /// Gone (52).
    Gone = 52,
    /// Proxy request refused (53).
    ProxyRefused = 53,
    /// Bad request (59).
    BadRequest = 59,
    /// Client certificate required (60).
    ClientCertRequired = 60,
    /// Client certificate not authorized (61).
    CertNotAuthorized = 61,
    /// Client certificate not valid (62).
    CertNotValid = 62,
}

impl GmStatusCode {
    /// True for the `2x` success class.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// True for `3x` redirects.
    #[must_use]
    pub const fn is_redirect(self) -> bool {
        matches!(self, Self::RedirectTemporary | Self::RedirectPermanent)
    }

    /// True for any failure class, wire or synthetic.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        (self as i32) < 0 || (40..60).contains(&(self as i32))
    }

    /// Classify a raw two-digit wire status code, if recognized.
    #[must_use]
    pub fn from_wire(code: i32) -> Option<Self> {
        Some(match code {
            10 => Self::Input,
            11 => Self::SensitiveInput,
            20 => Self::Success,
            30 => Self::RedirectTemporary,
            31 => Self::RedirectPermanent,
            40 => Self::TemporaryFailure,
            41 => Self::ServerUnavailable,
            42 => Self::CgiError,
            43 => Self::ProxyError,
            44 => Self::SlowDown,
            50 => Self::PermanentFailure,
            51 => Self::NotFound,
            52 => Self::Gone,
            53 => Self::ProxyRefused,
            59 => Self::BadRequest,
            60 => Self::ClientCertRequired,
            61 => Self::CertNotAuthorized,
            62 => Self::CertNotValid,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_success_and_failure() {
        assert!(GmStatusCode::Success.is_success());
        assert!(GmStatusCode::PermanentFailure.is_failure());
        assert!(GmStatusCode::InvalidHeader.is_failure());
        assert!(!GmStatusCode::Input.is_failure());
    }

    #[test]
    fn maps_known_wire_codes() {
        assert_eq!(GmStatusCode::from_wire(20), Some(GmStatusCode::Success));
        assert_eq!(GmStatusCode::from_wire(99), None);
    }
}
