use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single TOFU trust record: the fingerprint trusted for one
/// `domain;port` key, and the expiry date of the certificate it came
/// from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustEntry {
    /// Public-key fingerprint that was accepted for this key.
    pub fingerprint: Vec<u8>,
    /// The certificate's own expiry; once elapsed the entry may be
    /// replaced by a new CA-signed certificate without a fingerprint
    /// match.
    pub valid_until: DateTime<Utc>,
}

impl TrustEntry {
    /// Whether `valid_until` has already elapsed relative to `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.valid_until
    }
}
