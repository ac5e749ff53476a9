use std::collections::BTreeSet;

/// Bit flags carried by a client identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CertificateFlags(pub u32);

impl CertificateFlags {
    /// Created implicitly (e.g. for a Titan upload) and not meant to
    /// survive a restart.
    pub const TEMPORARY: u32 = 0x1;
    /// Imported from an external `.crt`/`.key` pair rather than
    /// generated in-app.
    pub const IMPORTED: u32 = 0x2;

    /// True if `bit` is set.
    #[must_use]
    pub const fn has(self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

/// A client (TLS) identity: a self-signed certificate the user can
/// present to one or more sites.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Index into a user-facing icon table; defaults to the key emoji
    /// codepoint used throughout the small-internet ecosystem.
    pub icon: u32,
    /// Behavioral flags.
    pub flags: CertificateFlags,
    /// DER-encoded certificate bytes.
    pub certificate_der: Vec<u8>,
    /// DER-encoded private key bytes.
    pub private_key_der: Vec<u8>,
    /// Whole-certificate fingerprint, used for identity lookup (distinct
    /// from the public-key fingerprint the trust store compares).
    pub fingerprint: Vec<u8>,
    /// URL prefixes this identity is in active use on, kept
    /// case-insensitively sorted.
    pub use_urls: BTreeSet<String>,
    /// Free-form user notes.
    pub notes: String,
    /// Common name extracted from the certificate subject.
    pub common_name: String,
}

impl Identity {
    /// Default icon codepoint: the key emoji, U+1F511.
    pub const DEFAULT_ICON: u32 = 0x1f511;

    /// Whether `url` is covered by any of this identity's use-prefixes.
    #[must_use]
    pub fn is_used_on(&self, url: &str) -> bool {
        self.find_use(url).is_some()
    }

    /// Returns the first stored use-prefix that `url` starts with,
    /// case-insensitively.
    #[must_use]
    pub fn find_use(&self, url: &str) -> Option<&str> {
        let lower = url.to_ascii_lowercase();
        self.use_urls
            .iter()
            .find(|prefix| lower.starts_with(prefix.to_ascii_lowercase().as_str()))
            .map(String::as_str)
    }

    /// Mark `url` as used (or no longer used) by this identity.
    ///
    /// Setting `use = true` removes any existing use-prefix that `url`
    /// itself is a prefix of, before inserting `url`. Setting `use =
    /// false` removes every use-prefix that `url` starts with.
    pub fn set_use(&mut self, url: &str, used: bool) {
        if used {
            if self.is_used_on(url) {
                return;
            }
            let lower_url = url.to_ascii_lowercase();
            self.use_urls
                .retain(|existing| !existing.to_ascii_lowercase().starts_with(&lower_url));
            self.use_urls.insert(url.to_string());
        } else {
            let lower_url = url.to_ascii_lowercase();
            self.use_urls
                .retain(|existing| !lower_url.starts_with(&existing.to_ascii_lowercase()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            icon: Identity::DEFAULT_ICON,
            flags: CertificateFlags::default(),
            certificate_der: vec![],
            private_key_der: vec![],
            fingerprint: vec![],
            use_urls: BTreeSet::new(),
            notes: String::new(),
            common_name: String::new(),
        }
    }

    #[test]
    fn set_use_removes_more_specific_prefix_first() {
        let mut id = identity();
        id.set_use("gemini://example.org/a/b", true);
        assert!(id.use_urls.contains("gemini://example.org/a/b"));
        id.set_use("gemini://example.org/a", true);
        assert!(id.use_urls.contains("gemini://example.org/a"));
        assert!(!id.use_urls.contains("gemini://example.org/a/b"));
    }

    #[test]
    fn find_use_matches_prefix() {
        let mut id = identity();
        id.set_use("gemini://example.org/a", true);
        assert!(id.is_used_on("gemini://example.org/a/b/c"));
        assert!(!id.is_used_on("gemini://example.org/z"));
    }
}
