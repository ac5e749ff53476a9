//! Client TLS identities: self-signed certificates a user can present
//! to one or more sites, with per-URL use tracking.
//!
//! Persistence mirrors the original two-file scheme: a `.crt`/`.key`
//! PEM pair per identity under `idents/<fingerprint-hex>.{crt,key}`,
//! plus a binary index (`idents.lgr`) recording icon, notes, flags and
//! use-URLs so they don't have to be re-derived from the certificate.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use gem_core::{CertificateFlags, Identity};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

use crate::{atomic_write, StoreError, StoreResult};

const IDENTS_DIR: &str = "idents";
const IDENTS_FILE: &str = "idents.lgr";
const MAGIC_META: &[u8; 4] = b"lgL2";
const MAGIC_IDENTITY: &[u8; 4] = b"iden";
const FILE_VERSION: u32 = 2;

/// Key algorithm used for a newly generated self-signed identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityAlgorithm {
    /// `rcgen`'s native, self-generated key type.
    #[default]
    EcdsaP256,
    /// Matches the original client's default. `rcgen` can't generate
    /// RSA key material itself, so the key is generated with the `rsa`
    /// crate and handed to `rcgen` as an externally supplied PKCS8 key.
    Rsa2048,
}

const RSA_KEY_BITS: usize = 2048;

/// Generate a fresh 2048-bit RSA key and wrap it as an `rcgen` key pair
/// capable of self-signing with `PKCS_RSA_SHA256`.
fn generate_rsa_keypair() -> StoreResult<KeyPair> {
    let private_key = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, RSA_KEY_BITS)
        .map_err(|e| StoreError::Certificate(e.to_string()))?;
    let pkcs8 = rsa::pkcs8::EncodePrivateKey::to_pkcs8_der(&private_key)
        .map_err(|e| StoreError::Certificate(e.to_string()))?;
    KeyPair::from_der_and_sign_algo(pkcs8.as_bytes(), &rcgen::PKCS_RSA_SHA256)
        .map_err(|e| StoreError::Certificate(e.to_string()))
}

/// Parameters for a newly minted self-signed identity certificate.
#[derive(Debug, Clone, Default)]
pub struct NewIdentityParams {
    pub common_name: String,
    pub email: Option<String>,
    pub user_id: Option<String>,
    pub domain: Option<String>,
    pub organization: Option<String>,
    pub country: Option<String>,
    pub valid_until: Option<DateTime<Utc>>,
    pub temporary: bool,
}

/// Client identity store: self-signed certs plus their per-URL use
/// records, one process-wide instance per profile directory.
pub struct IdentityStore {
    dir: PathBuf,
    idents: Mutex<BTreeMap<String, Identity>>,
}

fn fingerprint_hex(fingerprint: &[u8]) -> String {
    fingerprint.iter().map(|b| format!("{b:02x}")).collect()
}

fn sha256(data: &[u8]) -> Vec<u8> {
    ring::digest::digest(&ring::digest::SHA256, data).as_ref().to_vec()
}

fn common_name_from_der(der: &[u8]) -> StoreResult<String> {
    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| StoreError::Certificate(e.to_string()))?;
    Ok(cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string())
}

impl IdentityStore {
    /// Load identities from `dir/idents.lgr`, falling back to scanning
    /// `dir/idents/*.crt` directly when the index is absent (e.g. a
    /// profile migrated from a build that predates it).
    pub fn load(dir: &Path) -> StoreResult<Self> {
        let idents_dir = dir.join(IDENTS_DIR);
        std::fs::create_dir_all(&idents_dir)?;

        let index_path = dir.join(IDENTS_FILE);
        let mut idents = if let Ok(bytes) = std::fs::read(&index_path) {
            deserialize_index(&bytes)?
        } else {
            BTreeMap::new()
        };

        // Attach certificate/key bytes (and discover imported identities
        // not yet in the index) from whatever .crt/.key pairs exist.
        if idents_dir.is_dir() {
            for entry in std::fs::read_dir(&idents_dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("crt") {
                    continue;
                }
                let key_path = path.with_extension("key");
                if !key_path.is_file() {
                    continue;
                }
                let Ok(cert_pem) = std::fs::read_to_string(&path) else { continue };
                let Ok(key_pem) = std::fs::read_to_string(&key_path) else { continue };
                let Ok(cert_der) = pem::parse(&cert_pem) else { continue };
                let Ok(key_der) = pem::parse(&key_pem) else { continue };
                let fingerprint = sha256(cert_der.contents());
                let hex = fingerprint_hex(&fingerprint);
                let common_name = common_name_from_der(cert_der.contents()).unwrap_or_default();
                idents
                    .entry(hex)
                    .and_modify(|ident| {
                        ident.certificate_der = cert_der.contents().to_vec();
                        ident.private_key_der = key_der.contents().to_vec();
                        ident.common_name = common_name.clone();
                    })
                    .or_insert_with(|| Identity {
                        icon: Identity::DEFAULT_ICON,
                        flags: CertificateFlags::default(),
                        certificate_der: cert_der.contents().to_vec(),
                        private_key_der: key_der.contents().to_vec(),
                        fingerprint,
                        use_urls: Default::default(),
                        notes: String::new(),
                        common_name,
                    });
            }
        }

        // Discard any index entries whose certificate/key files are missing.
        idents.retain(|_, ident| !ident.certificate_der.is_empty());

        Ok(Self {
            dir: dir.to_path_buf(),
            idents: Mutex::new(idents),
        })
    }

    /// Generate a new self-signed identity and persist its `.crt`/`.key`
    /// pair (unless `params.temporary` is set).
    pub fn generate(&self, params: NewIdentityParams, algorithm: IdentityAlgorithm) -> StoreResult<Identity> {
        let key_pair = match algorithm {
            IdentityAlgorithm::EcdsaP256 => {
                KeyPair::generate().map_err(|e| StoreError::Certificate(e.to_string()))?
            }
            IdentityAlgorithm::Rsa2048 => generate_rsa_keypair()?,
        };
        let mut cert_params = CertificateParams::default();

        // RFC 5280 self-issued: issuer and subject names are identical.
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, params.common_name.clone());
        if let Some(org) = &params.organization {
            dn.push(DnType::OrganizationName, org.clone());
        }
        if let Some(country) = &params.country {
            dn.push(DnType::CountryName, country.clone());
        }
        cert_params.distinguished_name = dn;

        let mut san = Vec::new();
        if let Some(domain) = &params.domain {
            san.push(rcgen::SanType::DnsName(
                domain.clone().try_into().map_err(|_| StoreError::Certificate("invalid domain".to_string()))?,
            ));
        }
        if let Some(email) = &params.email {
            san.push(rcgen::SanType::Rfc822Name(
                email.clone().try_into().map_err(|_| StoreError::Certificate("invalid email".to_string()))?,
            ));
        }
        cert_params.subject_alt_names = san;

        let not_after = params
            .valid_until
            .unwrap_or_else(|| Utc::now() + chrono::Duration::days(3650));
        cert_params.not_before = time::OffsetDateTime::now_utc();
        cert_params.not_after = time::OffsetDateTime::from_unix_timestamp(not_after.timestamp())
            .map_err(|e| StoreError::Certificate(e.to_string()))?;

        let certificate = cert_params
            .self_signed(&key_pair)
            .map_err(|e| StoreError::Certificate(e.to_string()))?;

        let cert_der = certificate.der().to_vec();
        let key_der = key_pair.serialize_der();
        let fingerprint = sha256(&cert_der);

        let mut flags = CertificateFlags::default();
        if params.temporary {
            flags.0 |= CertificateFlags::TEMPORARY;
        }

        let identity = Identity {
            icon: Identity::DEFAULT_ICON,
            flags,
            certificate_der: cert_der,
            private_key_der: key_der,
            fingerprint,
            use_urls: Default::default(),
            notes: String::new(),
            common_name: params.common_name,
        };

        self.insert(identity)
    }

    /// Import an externally generated certificate/key pair (PEM-encoded).
    pub fn import(&self, cert_pem: &str, key_pem: &str, notes: &str) -> StoreResult<Identity> {
        let cert_der = pem::parse(cert_pem).map_err(|e| StoreError::Certificate(e.to_string()))?;
        let key_der = pem::parse(key_pem).map_err(|e| StoreError::Certificate(e.to_string()))?;
        let fingerprint = sha256(cert_der.contents());
        let common_name = common_name_from_der(cert_der.contents())?;

        let identity = Identity {
            icon: Identity::DEFAULT_ICON,
            flags: CertificateFlags(CertificateFlags::IMPORTED),
            certificate_der: cert_der.contents().to_vec(),
            private_key_der: key_der.contents().to_vec(),
            fingerprint,
            use_urls: Default::default(),
            notes: notes.to_string(),
            common_name,
        };

        self.insert(identity)
    }

    fn insert(&self, identity: Identity) -> StoreResult<Identity> {
        if !identity.flags.has(CertificateFlags::TEMPORARY) {
            let hex = fingerprint_hex(&identity.fingerprint);
            let cert_pem = pem::encode(&pem::Pem::new("CERTIFICATE", identity.certificate_der.clone()));
            let key_pem = pem::encode(&pem::Pem::new("PRIVATE KEY", identity.private_key_der.clone()));
            atomic_write(&self.dir.join(IDENTS_DIR).join(format!("{hex}.crt")), cert_pem.as_bytes())?;
            atomic_write(&self.dir.join(IDENTS_DIR).join(format!("{hex}.key")), key_pem.as_bytes())?;
        }
        let hex = fingerprint_hex(&identity.fingerprint);
        let mut idents = self.idents.lock().unwrap();
        idents.insert(hex, identity.clone());
        drop(idents);
        self.save_index()?;
        Ok(identity)
    }

    /// Remove an identity and its on-disk `.crt`/`.key` pair.
    pub fn delete(&self, fingerprint_hex_str: &str) -> StoreResult<()> {
        let mut idents = self.idents.lock().unwrap();
        if let Some(ident) = idents.remove(fingerprint_hex_str) {
            if !ident.flags.has(CertificateFlags::TEMPORARY) {
                let _ = std::fs::remove_file(self.dir.join(IDENTS_DIR).join(format!("{fingerprint_hex_str}.crt")));
                let _ = std::fs::remove_file(self.dir.join(IDENTS_DIR).join(format!("{fingerprint_hex_str}.key")));
            }
        }
        drop(idents);
        self.save_index()
    }

    /// Snapshot of every stored identity, keyed by fingerprint hex.
    #[must_use]
    pub fn list(&self) -> Vec<(String, Identity)> {
        self.idents
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Longest-prefix match over every identity's use-set. Falls back to
    /// the `gemini:` equivalent of a `titan:` URL when nothing matches.
    #[must_use]
    pub fn identity_for_url(&self, url: &str) -> Option<(String, Identity)> {
        if url.is_empty() {
            return None;
        }
        let idents = self.idents.lock().unwrap();
        for (hex, ident) in idents.iter() {
            if ident.is_used_on(url) {
                return Some((hex.clone(), ident.clone()));
            }
        }
        drop(idents);
        if let Some(rest) = url.strip_prefix("titan://") {
            return self.identity_for_url(&format!("gemini://{rest}"));
        }
        None
    }

    /// Fuzzy lookup: matches the fingerprint hex substring or the common
    /// name substring, case-insensitively.
    #[must_use]
    pub fn find_fuzzy(&self, needle: &str) -> Option<(String, Identity)> {
        if needle.is_empty() {
            return None;
        }
        let lower = needle.to_ascii_lowercase();
        self.idents
            .lock()
            .unwrap()
            .iter()
            .find(|(hex, ident)| {
                hex.to_ascii_lowercase().contains(&lower)
                    || ident.common_name.to_ascii_lowercase().contains(&lower)
            })
            .map(|(hex, ident)| (hex.clone(), ident.clone()))
    }

    /// Mark `identity` as used on `url`, first removing any competing
    /// use-prefix held by any other identity.
    pub fn sign_in(&self, fingerprint_hex_str: &str, url: &str) -> StoreResult<()> {
        let mut idents = self.idents.lock().unwrap();
        for ident in idents.values_mut() {
            ident.set_use(url, false);
        }
        if let Some(ident) = idents.get_mut(fingerprint_hex_str) {
            ident.set_use(url, true);
        }
        drop(idents);
        self.save_index()
    }

    /// Remove `url`'s use-prefix from every identity.
    pub fn sign_out(&self, url: &str) -> StoreResult<()> {
        let mut idents = self.idents.lock().unwrap();
        for ident in idents.values_mut() {
            ident.set_use(url, false);
        }
        drop(idents);
        self.save_index()
    }

    fn save_index(&self) -> StoreResult<()> {
        let idents = self.idents.lock().unwrap();
        let bytes = serialize_index(&idents);
        atomic_write(&self.dir.join(IDENTS_FILE), &bytes)?;
        Ok(())
    }
}

fn write_block<W: Write>(w: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    w.write_all(&u32::try_from(bytes.len()).unwrap_or(u32::MAX).to_be_bytes())?;
    w.write_all(bytes)
}

fn write_string<W: Write>(w: &mut W, s: &str) -> std::io::Result<()> {
    write_block(w, s.as_bytes())
}

fn read_block<R: Read>(r: &mut R) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_string<R: Read>(r: &mut R) -> std::io::Result<String> {
    Ok(String::from_utf8_lossy(&read_block(r)?).into_owned())
}

fn serialize_index(idents: &BTreeMap<String, Identity>) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC_META);
    out.extend_from_slice(&FILE_VERSION.to_be_bytes());
    for ident in idents.values() {
        if ident.flags.has(CertificateFlags::TEMPORARY) {
            continue;
        }
        out.extend_from_slice(MAGIC_IDENTITY);
        write_block(&mut out, &ident.fingerprint).unwrap();
        out.extend_from_slice(&ident.icon.to_be_bytes());
        write_string(&mut out, &ident.notes).unwrap();
        out.extend_from_slice(&(ident.flags.0 as i32).to_be_bytes());
        out.extend_from_slice(&u32::try_from(ident.use_urls.len()).unwrap_or(0).to_be_bytes());
        for url in &ident.use_urls {
            write_string(&mut out, url).unwrap();
        }
    }
    out
}

fn deserialize_index(bytes: &[u8]) -> StoreResult<BTreeMap<String, Identity>> {
    let mut cursor = Cursor::new(bytes);
    let mut magic = [0u8; 4];
    cursor
        .read_exact(&mut magic)
        .map_err(|e| StoreError::Parse { file: IDENTS_FILE.to_string(), reason: e.to_string() })?;
    if &magic != MAGIC_META {
        return Err(StoreError::Parse {
            file: IDENTS_FILE.to_string(),
            reason: "unrecognized file format".to_string(),
        });
    }
    let mut version_buf = [0u8; 4];
    cursor
        .read_exact(&mut version_buf)
        .map_err(|e| StoreError::Parse { file: IDENTS_FILE.to_string(), reason: e.to_string() })?;
    let version = u32::from_be_bytes(version_buf);
    if version > FILE_VERSION {
        return Err(StoreError::Parse {
            file: IDENTS_FILE.to_string(),
            reason: format!("unsupported version {version}"),
        });
    }

    let mut map = BTreeMap::new();
    loop {
        let mut tag = [0u8; 4];
        match cursor.read_exact(&mut tag) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(StoreError::Parse { file: IDENTS_FILE.to_string(), reason: e.to_string() }),
        }
        if &tag != MAGIC_IDENTITY {
            return Err(StoreError::Parse {
                file: IDENTS_FILE.to_string(),
                reason: "invalid identity record".to_string(),
            });
        }
        let to_parse_err = |e: std::io::Error| StoreError::Parse { file: IDENTS_FILE.to_string(), reason: e.to_string() };

        let fingerprint = read_block(&mut cursor).map_err(to_parse_err)?;
        let mut icon_buf = [0u8; 4];
        cursor.read_exact(&mut icon_buf).map_err(to_parse_err)?;
        let icon = u32::from_be_bytes(icon_buf);
        let notes = read_string(&mut cursor).map_err(to_parse_err)?;
        let mut flags_buf = [0u8; 4];
        cursor.read_exact(&mut flags_buf).map_err(to_parse_err)?;
        let flags = CertificateFlags(i32::from_be_bytes(flags_buf) as u32);
        let mut count_buf = [0u8; 4];
        cursor.read_exact(&mut count_buf).map_err(to_parse_err)?;
        let count = u32::from_be_bytes(count_buf);

        let mut identity = Identity {
            icon,
            flags,
            certificate_der: Vec::new(),
            private_key_der: Vec::new(),
            fingerprint: fingerprint.clone(),
            use_urls: Default::default(),
            notes,
            common_name: String::new(),
        };
        for _ in 0..count {
            let url = read_string(&mut cursor).map_err(to_parse_err)?;
            identity.set_use(&url, true);
        }
        map.insert(fingerprint_hex(&fingerprint), identity);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(name: &str) -> NewIdentityParams {
        NewIdentityParams {
            common_name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn generates_and_persists_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::load(dir.path()).unwrap();
        let ident = store.generate(params("Alice"), IdentityAlgorithm::EcdsaP256).unwrap();
        assert!(!ident.certificate_der.is_empty());
        assert_eq!(store.list().len(), 1);

        let hex = fingerprint_hex(&ident.fingerprint);
        assert!(dir.path().join(IDENTS_DIR).join(format!("{hex}.crt")).exists());
        assert!(dir.path().join(IDENTS_DIR).join(format!("{hex}.key")).exists());
    }

    #[test]
    fn reloads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let fingerprint_hex_str;
        {
            let store = IdentityStore::load(dir.path()).unwrap();
            let ident = store.generate(params("Bob"), IdentityAlgorithm::EcdsaP256).unwrap();
            store.sign_in(&fingerprint_hex(&ident.fingerprint), "gemini://example.org/x").unwrap();
            fingerprint_hex_str = fingerprint_hex(&ident.fingerprint);
        }
        let store = IdentityStore::load(dir.path()).unwrap();
        let (_, ident) = store.identity_for_url("gemini://example.org/x/y").unwrap();
        assert_eq!(fingerprint_hex(&ident.fingerprint), fingerprint_hex_str);
    }

    #[test]
    fn sign_in_removes_competing_use() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::load(dir.path()).unwrap();
        let a = store.generate(params("A"), IdentityAlgorithm::EcdsaP256).unwrap();
        let b = store.generate(params("B"), IdentityAlgorithm::EcdsaP256).unwrap();
        let url = "gemini://example.org/";
        store.sign_in(&fingerprint_hex(&a.fingerprint), url).unwrap();
        store.sign_in(&fingerprint_hex(&b.fingerprint), url).unwrap();
        let (hex, _) = store.identity_for_url(url).unwrap();
        assert_eq!(hex, fingerprint_hex(&b.fingerprint));
    }

    #[test]
    fn titan_falls_back_to_gemini_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::load(dir.path()).unwrap();
        let ident = store.generate(params("C"), IdentityAlgorithm::EcdsaP256).unwrap();
        store.sign_in(&fingerprint_hex(&ident.fingerprint), "gemini://example.org/upload").unwrap();
        let found = store.identity_for_url("titan://example.org/upload/file.txt");
        assert!(found.is_some());
    }

    #[test]
    fn fuzzy_lookup_matches_common_name_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::load(dir.path()).unwrap();
        store.generate(params("Dora Explorer"), IdentityAlgorithm::EcdsaP256).unwrap();
        assert!(store.find_fuzzy("dora").is_some());
        assert!(store.find_fuzzy("nonexistent").is_none());
    }

    #[test]
    fn delete_removes_files_and_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::load(dir.path()).unwrap();
        let ident = store.generate(params("Temp"), IdentityAlgorithm::EcdsaP256).unwrap();
        let hex = fingerprint_hex(&ident.fingerprint);
        store.delete(&hex).unwrap();
        assert!(store.list().is_empty());
        assert!(!dir.path().join(IDENTS_DIR).join(format!("{hex}.crt")).exists());
    }

    #[test]
    fn rsa_generation_produces_a_usable_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::load(dir.path()).unwrap();
        let ident = store.generate(params("RsaUser"), IdentityAlgorithm::Rsa2048).unwrap();
        assert!(!ident.certificate_der.is_empty());
        assert!(!ident.private_key_der.is_empty());

        let hex = fingerprint_hex(&ident.fingerprint);
        assert!(dir.path().join(IDENTS_DIR).join(format!("{hex}.crt")).exists());
        assert!(dir.path().join(IDENTS_DIR).join(format!("{hex}.key")).exists());
    }
}
