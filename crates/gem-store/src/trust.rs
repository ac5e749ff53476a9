//! Trust-on-first-use certificate store.
//!
//! One entry per `domain;port` key: the fingerprint of the certificate
//! we last accepted, and that certificate's own expiry date. A
//! CA-signed certificate may silently replace a mismatched fingerprint,
//! but only once the previously trusted entry has expired, or never
//! matched any stored cert in the first place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use gem_core::TrustEntry;

use crate::{atomic_write, StoreError, StoreResult};

const TRUSTED_FILENAME: &str = "trusted.2.txt";

/// What the caller already determined about a peer certificate before
/// asking the trust store for a verdict. Parsing the certificate
/// itself (subject names, fingerprint, expiry, CA chain) is the
/// request pipeline's job; this store only reasons about the
/// already-extracted facts.
#[derive(Debug, Clone)]
pub struct PeerCertInfo {
    /// Public-key fingerprint (not the whole-certificate fingerprint
    /// identities are keyed by).
    pub fingerprint: Vec<u8>,
    /// The certificate's own `not_after`.
    pub valid_until: DateTime<Utc>,
    /// Whether `valid_until` has already elapsed.
    pub is_expired: bool,
    /// Whether the certificate's subject covers `domain`, including the
    /// trailing-label wildcard rule.
    pub is_domain_valid: bool,
    /// Whether the certificate chains to a recognized CA.
    pub is_ca_trusted: bool,
}

/// TOFU trust decisions, one process-wide store per profile directory.
pub struct TrustStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, TrustEntry>>,
}

impl TrustStore {
    /// Load trust entries from `dir/trusted.2.txt`, if present. A
    /// missing or unparseable file yields an empty store rather than an
    /// error.
    #[must_use]
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(TRUSTED_FILENAME);
        let entries = std::fs::read_to_string(&path)
            .ok()
            .map(|contents| parse_trusted(&contents))
            .unwrap_or_default();
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Build the `domain;port` key the way the original client does:
    /// Punycode-encode the domain, append the effective port.
    #[must_use]
    pub fn make_key(domain: &str, port: u16, default_port: u16) -> String {
        let ascii = idna::domain_to_ascii(domain).unwrap_or_else(|_| domain.to_ascii_lowercase());
        let port = if port == 0 { default_port } else { port };
        format!("{ascii};{port}")
    }

    /// True if the shorter domain obtained by repeatedly stripping the
    /// leading label (while at least two labels remain) matches one of
    /// `cert_names` exactly, case-insensitively.
    #[must_use]
    pub fn verify_domain(cert_names: &[String], domain: &str) -> bool {
        let mut current = domain.to_ascii_lowercase();
        loop {
            if cert_names
                .iter()
                .any(|n| n.eq_ignore_ascii_case(&current))
            {
                return true;
            }
            match current.find('.') {
                Some(idx) => {
                    let shorter = current[idx + 1..].to_string();
                    if shorter.contains('.') {
                        current = shorter;
                    } else {
                        return false;
                    }
                }
                None => return false,
            }
        }
    }

    /// The core TOFU decision. Returns `true` if `cert` should be
    /// accepted for `key`, updating and persisting the store as a side
    /// effect when appropriate.
    pub fn check_trust(&self, key: &str, cert: &PeerCertInfo) -> StoreResult<bool> {
        let now = Utc::now();
        let ok = cert.is_domain_valid && !cert.is_expired;
        let new_entry = TrustEntry {
            fingerprint: cert.fingerprint.clone(),
            valid_until: cert.valid_until,
        };
        let mut entries = self.entries.lock().unwrap();
        let trusted = match entries.get(key) {
            Some(existing) if !existing.is_expired(now) => {
                let is_trusted = cert.fingerprint == existing.fingerprint;
                if is_trusted || !cert.is_ca_trusted {
                    return Ok(is_trusted);
                }
                if ok {
                    entries.insert(key.to_string(), new_entry);
                }
                ok
            }
            _ => {
                if ok {
                    entries.insert(key.to_string(), new_entry);
                }
                ok
            }
        };
        if ok {
            self.save_locked(&entries)?;
        }
        Ok(trusted)
    }

    /// Explicitly trust `fingerprint` for `key`, bypassing the
    /// match-checking logic above (used for an explicit "trust this
    /// certificate" user action).
    pub fn set_trusted(&self, key: &str, fingerprint: Vec<u8>, valid_until: DateTime<Utc>) -> StoreResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.to_string(), TrustEntry { fingerprint, valid_until });
        self.save_locked(&entries)
    }

    /// Look up the stored entry for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<TrustEntry> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    /// A snapshot of every `(key, entry)` pair, for listing UIs.
    #[must_use]
    pub fn list(&self) -> Vec<(String, TrustEntry)> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Forget the stored entry for `key`, if any (a user-initiated
    /// "distrust this site" action).
    pub fn remove(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.remove(key);
        self.save_locked(&entries)
    }

    /// Serialize to bytes (used by the export bundle).
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let entries = self.entries.lock().unwrap();
        let mut out = String::new();
        for (key, entry) in entries.iter() {
            out.push_str(&format!(
                "{key} {} {}\n",
                entry.valid_until.timestamp(),
                hex_encode(&entry.fingerprint)
            ));
        }
        out.into_bytes()
    }

    /// Merge serialized entries into this store. [`crate::bookmarks::ImportMethod::Replace`]
    /// discards every existing entry first; [`crate::bookmarks::ImportMethod::All`]
    /// overwrites existing keys in place; anything else only fills in missing ones.
    pub fn import(&self, contents: &str, method: crate::bookmarks::ImportMethod) -> StoreResult<()> {
        use crate::bookmarks::ImportMethod;
        if method == ImportMethod::Skip {
            return Ok(());
        }
        let incoming = parse_trusted(contents);
        let mut entries = self.entries.lock().unwrap();
        if method == ImportMethod::Replace {
            *entries = incoming;
        } else {
            for (key, entry) in incoming {
                if method == ImportMethod::All || !entries.contains_key(&key) {
                    entries.insert(key, entry);
                }
            }
        }
        self.save_locked(&entries)
    }

    fn save_locked(&self, entries: &BTreeMap<String, TrustEntry>) -> StoreResult<()> {
        let mut out = String::new();
        for (key, entry) in entries {
            out.push_str(&format!(
                "{key} {} {}\n",
                entry.valid_until.timestamp(),
                hex_encode(&entry.fingerprint)
            ));
        }
        atomic_write(&self.path, out.as_bytes()).map_err(StoreError::Io)
    }
}

fn parse_trusted(contents: &str) -> BTreeMap<String, TrustEntry> {
    let mut map = BTreeMap::new();
    for line in contents.lines() {
        let mut parts = line.splitn(3, ' ');
        let (Some(key), Some(epoch), Some(fp)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        let Ok(epoch) = epoch.parse::<i64>() else {
            continue;
        };
        let Some(valid_until) = DateTime::from_timestamp(epoch, 0) else {
            continue;
        };
        let Some(fingerprint) = hex_decode(fp) else {
            continue;
        };
        map.insert(key.to_string(), TrustEntry { fingerprint, valid_until });
    }
    map
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(fingerprint: &[u8], expired: bool, domain_valid: bool, ca: bool) -> PeerCertInfo {
        PeerCertInfo {
            fingerprint: fingerprint.to_vec(),
            valid_until: Utc::now() + chrono::Duration::days(if expired { -1 } else { 365 }),
            is_expired: expired,
            is_domain_valid: domain_valid,
            is_ca_trusted: ca,
        }
    }

    #[test]
    fn accepts_and_persists_new_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::load(dir.path());
        let key = TrustStore::make_key("example.org", 0, 1965);
        assert!(store.check_trust(&key, &cert(b"fp1", false, true, false)).unwrap());
        assert_eq!(store.get(&key).unwrap().fingerprint, b"fp1");
    }

    #[test]
    fn rejects_mismatched_fingerprint_without_ca() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::load(dir.path());
        let key = TrustStore::make_key("example.org", 0, 1965);
        store.check_trust(&key, &cert(b"fp1", false, true, false)).unwrap();
        assert!(!store.check_trust(&key, &cert(b"fp2", false, true, false)).unwrap());
        assert_eq!(store.get(&key).unwrap().fingerprint, b"fp1");
    }

    #[test]
    fn list_and_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::load(dir.path());
        let key = TrustStore::make_key("example.org", 0, 1965);
        store.check_trust(&key, &cert(b"fp1", false, true, false)).unwrap();
        assert_eq!(store.list().len(), 1);
        store.remove(&key).unwrap();
        assert!(store.get(&key).is_none());
        assert!(store.list().is_empty());
    }

    #[test]
    fn ca_signed_cert_rotates_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::load(dir.path());
        let key = TrustStore::make_key("example.org", 0, 1965);
        store.check_trust(&key, &cert(b"fp1", false, true, false)).unwrap();
        assert!(store.check_trust(&key, &cert(b"fp2", false, true, true)).unwrap());
        assert_eq!(store.get(&key).unwrap().fingerprint, b"fp2");
    }

    #[test]
    fn invalid_cert_never_overwrites_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::load(dir.path());
        let key = TrustStore::make_key("example.org", 0, 1965);
        store.check_trust(&key, &cert(b"fp1", false, true, false)).unwrap();
        assert!(!store.check_trust(&key, &cert(b"fp2", true, true, true)).unwrap());
        assert_eq!(store.get(&key).unwrap().fingerprint, b"fp1");
    }

    #[test]
    fn trailing_label_wildcard_accepted() {
        let names = vec!["b.example".to_string()];
        assert!(TrustStore::verify_domain(&names, "a.b.example"));
        assert!(!TrustStore::verify_domain(&names, "example"));
    }

    #[test]
    fn persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let key = TrustStore::make_key("example.org", 0, 1965);
        {
            let store = TrustStore::load(dir.path());
            store.check_trust(&key, &cert(b"fp1", false, true, false)).unwrap();
        }
        let store = TrustStore::load(dir.path());
        assert_eq!(store.get(&key).unwrap().fingerprint, b"fp1");
    }
}
