//! Per-site settings keyed by lower-cased origin (`scheme://host[:port]`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::bookmarks::ImportMethod;
use crate::{atomic_write, StoreError, StoreResult};

const INI_FILENAME: &str = "sitespec.ini";
const LEGACY_FILENAME: &str = "sitespec.txt";

/// Settings recorded for one site.
#[derive(Debug, Clone, Default)]
pub struct SiteParams {
    /// Titan upload port, if the site uses a non-default one.
    pub titan_port: u16,
    /// Bitfield of warning dialogs the user asked never to see again
    /// for this site.
    pub dismiss_warnings: u32,
    /// Seed used to derive this site's accent palette.
    pub palette_seed: u32,
    /// Fingerprint of the identity to auto-apply for Titan uploads on
    /// this site.
    pub titan_identity: Option<Vec<u8>>,
    /// Fingerprints of identities the user has applied here.
    pub used_identities: Vec<Vec<u8>>,
    /// Whether this site's TLS session may be cached across requests.
    pub tls_session_cache: bool,
}

/// The site-spec store.
pub struct SiteSpecStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, SiteParams>>,
}

impl SiteSpecStore {
    /// Load from `dir/sitespec.ini`, falling back to the legacy
    /// `sitespec.txt` format.
    #[must_use]
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(INI_FILENAME);
        let entries = std::fs::read_to_string(&path)
            .ok()
            .map(|c| parse_ini(&c))
            .or_else(|| {
                std::fs::read_to_string(dir.join(LEGACY_FILENAME))
                    .ok()
                    .map(|c| parse_legacy(&c))
            })
            .unwrap_or_default();
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn key(site: &str) -> String {
        site.to_ascii_lowercase()
    }

    /// Current params for `site` (its URL root), or the defaults.
    #[must_use]
    pub fn value(&self, site: &str) -> SiteParams {
        self.entries
            .lock()
            .unwrap()
            .get(&Self::key(site))
            .cloned()
            .unwrap_or_default()
    }

    /// Replace the params for `site`.
    pub fn set_value(&self, site: &str, params: SiteParams) -> StoreResult<()> {
        self.entries.lock().unwrap().insert(Self::key(site), params);
        self.save()
    }

    /// Serialize to bytes (used by the export bundle).
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        render(&self.entries.lock().unwrap())
    }

    /// Merge serialized sections into this store. [`ImportMethod::Replace`]
    /// discards every existing section first.
    pub fn import(&self, contents: &str, method: ImportMethod) -> StoreResult<()> {
        if method == ImportMethod::Skip {
            return Ok(());
        }
        let incoming = parse_ini(contents);
        let mut entries = self.entries.lock().unwrap();
        if method == ImportMethod::Replace {
            *entries = incoming;
        } else {
            for (key, value) in incoming {
                if method == ImportMethod::All || !entries.contains_key(&key) {
                    entries.insert(key, value);
                }
            }
        }
        self.save_locked(&entries)
    }

    fn save(&self) -> StoreResult<()> {
        let entries = self.entries.lock().unwrap();
        self.save_locked(&entries)
    }

    fn save_locked(&self, entries: &HashMap<String, SiteParams>) -> StoreResult<()> {
        atomic_write(&self.path, &render(entries)).map_err(StoreError::Io)
    }
}

fn render(entries: &HashMap<String, SiteParams>) -> Vec<u8> {
    let mut keys: Vec<_> = entries.keys().collect();
    keys.sort();
    let mut out = String::new();
    for key in keys {
        let params = &entries[key];
        if params.titan_port == 0 && params.dismiss_warnings == 0 && params.palette_seed == 0 {
            continue;
        }
        out.push_str(&format!("[{key:?}]\n"));
        if params.titan_port != 0 {
            out.push_str(&format!("titanPort = {}\n", params.titan_port));
        }
        if params.dismiss_warnings != 0 {
            out.push_str(&format!("dismissWarnings = 0x{:x}\n", params.dismiss_warnings));
        }
        if params.palette_seed != 0 {
            out.push_str(&format!("paletteSeed = {}\n", params.palette_seed));
        }
        out.push('\n');
    }
    out.into_bytes()
}

fn parse_ini(contents: &str) -> HashMap<String, SiteParams> {
    let Ok(table) = contents.parse::<toml::Table>() else {
        return HashMap::new();
    };
    let mut map = HashMap::new();
    for (key, value) in &table {
        let Some(value) = value.as_table() else { continue };
        let params = SiteParams {
            titan_port: value.get("titanPort").and_then(|v| v.as_integer()).unwrap_or(0) as u16,
            dismiss_warnings: value
                .get("dismissWarnings")
                .and_then(|v| v.as_integer())
                .unwrap_or(0) as u32,
            palette_seed: value.get("paletteSeed").and_then(|v| v.as_integer()).unwrap_or(0) as u32,
            titan_identity: None,
            used_identities: Vec::new(),
            tls_session_cache: true,
        };
        map.insert(key.to_ascii_lowercase(), params);
    }
    map
}

/// `# sitename` section headers, `key: value` lines; one-way migration
/// only.
fn parse_legacy(contents: &str) -> HashMap<String, SiteParams> {
    let mut map = HashMap::new();
    let mut current: Option<String> = None;
    let mut params = SiteParams::default();
    for line in contents.lines() {
        let line = line.trim();
        if let Some(site) = line.strip_prefix('#') {
            if let Some(key) = current.take() {
                map.insert(key, std::mem::take(&mut params));
            }
            current = Some(site.trim().to_ascii_lowercase());
        } else if let Some((key, value)) = line.split_once(':') {
            if key.trim() == "titanPort" {
                params.titan_port = value.trim().parse().unwrap_or(0);
            }
        }
    }
    if let Some(key) = current {
        map.insert(key, params);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_lowercased() {
        let dir = tempfile::tempdir().unwrap();
        let store = SiteSpecStore::load(dir.path());
        store
            .set_value("Gemini://Example.ORG", SiteParams { titan_port: 1, ..Default::default() })
            .unwrap();
        assert_eq!(store.value("gemini://example.org").titan_port, 1);
    }

    #[test]
    fn round_trips_through_save() {
        let dir = tempfile::tempdir().unwrap();
        let key = "gemini://example.org";
        {
            let store = SiteSpecStore::load(dir.path());
            store
                .set_value(key, SiteParams { titan_port: 1965, ..Default::default() })
                .unwrap();
        }
        let store = SiteSpecStore::load(dir.path());
        assert_eq!(store.value(key).titan_port, 1965);
    }
}
