//! Pack loading, sorting, and spec resolution.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gem_core::{FontFile, FontPack, FontSpec};
use walkdir::WalkDir;

use crate::error::{FontError, Result};
use crate::manifest::{self, MANIFEST_NAME};

enum PackSource {
    Zip(zip::ZipArchive<std::fs::File>),
    Dir(PathBuf),
}

impl PackSource {
    fn read(&mut self, rel_path: &str) -> Result<Vec<u8>> {
        match self {
            Self::Zip(archive) => {
                let mut entry = archive
                    .by_name(rel_path)
                    .map_err(|e| FontError::Archive(e.to_string()))?;
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                Ok(buf)
            }
            Self::Dir(dir) => Ok(std::fs::read(dir.join(rel_path))?),
        }
    }
}

fn load_from_source(id: &str, mut source: PackSource) -> Result<FontPack> {
    let manifest_bytes = source.read(MANIFEST_NAME)?;
    let text = String::from_utf8_lossy(&manifest_bytes).into_owned();
    let manifest = manifest::parse(&text)?;

    let mut file_cache: HashMap<(String, u32), Arc<Vec<u8>>> = HashMap::new();
    let mut specs = Vec::new();
    for raw in manifest.specs {
        let mut files = Vec::new();
        for (style, file_ref) in &raw.styles {
            let key = (file_ref.path.clone(), file_ref.collection_index);
            let data = match file_cache.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let bytes = Arc::new(source.read(&file_ref.path)?);
                    file_cache.insert(key.clone(), bytes.clone());
                    bytes
                }
            };
            files.push(FontFile {
                id: format!("{id}-{:?}", style),
                source_path: file_ref.path.clone(),
                collection_index: file_ref.collection_index,
                style: *style,
                source_data: data,
            });
        }
        if !files.iter().any(|f| f.style == gem_core::FontStyle::Regular) {
            return Err(FontError::NoRegularStyle(raw.id));
        }
        specs.push(FontSpec {
            id: raw.id,
            name: raw.name,
            priority: raw.priority,
            files,
            flags: raw.flags,
            tuning: raw.tuning,
        });
    }

    Ok(FontPack {
        id: id.to_string(),
        version: manifest.version,
        specs,
    })
}

/// Load a font pack from a ZIP archive at `path`.
pub fn load_zip(path: &Path) -> Result<FontPack> {
    let id = pack_id(path);
    let file = std::fs::File::open(path)?;
    let archive = zip::ZipArchive::new(file).map_err(|e| FontError::Archive(e.to_string()))?;
    load_from_source(&id, PackSource::Zip(archive))
}

/// Load a font pack from a directory containing `fontpack.ini` and its
/// referenced style files.
pub fn load_dir(path: &Path) -> Result<FontPack> {
    let id = pack_id(path);
    load_from_source(&id, PackSource::Dir(path.to_path_buf()))
}

fn pack_id(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("pack")
        .to_string()
}

/// Walk `dirs` (non-recursively within each, one level of nesting) for
/// `*.zip`/`*.fontpack` archives and subdirectories carrying their own
/// `fontpack.ini`, loading every one found. Packs that fail to load are
/// logged and skipped rather than aborting discovery.
#[must_use]
pub fn discover(dirs: &[PathBuf]) -> Vec<FontPack> {
    let mut packs = Vec::new();
    for base in dirs {
        if !base.exists() {
            continue;
        }
        for entry in WalkDir::new(base).max_depth(2).into_iter().filter_map(std::result::Result::ok) {
            let path = entry.path();
            if path.is_file() {
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                if ext.eq_ignore_ascii_case("zip") || ext.eq_ignore_ascii_case("fontpack") {
                    match load_zip(path) {
                        Ok(pack) => packs.push(pack),
                        Err(err) => tracing::warn!(path = %path.display(), error = %err, "skipping font pack"),
                    }
                }
            } else if path.is_dir() && path.join(MANIFEST_NAME).is_file() {
                match load_dir(path) {
                    Ok(pack) => packs.push(pack),
                    Err(err) => tracing::warn!(path = %path.display(), error = %err, "skipping font pack"),
                }
            }
        }
    }
    packs
}

/// The loaded catalog of font packs, with per-pack enable/disable state.
#[derive(Default)]
pub struct Registry {
    packs: Vec<FontPack>,
    disabled: HashSet<String>,
}

/// One spec as seen by a consumer: its disambiguated display name and a
/// reference to the underlying spec data.
#[derive(Debug, Clone)]
pub struct ResolvedSpec<'a> {
    pub display_name: String,
    pub spec: &'a FontSpec,
    pub pack_id: &'a str,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the loaded packs with a fresh discovery pass over `dirs`,
    /// for picking up newly installed packs without a restart.
    pub fn reload(&mut self, dirs: &[PathBuf]) {
        self.packs = discover(dirs);
    }

    /// Register one already-loaded pack (used by tests and by callers
    /// that loaded a single archive explicitly, e.g. a user import).
    pub fn add_pack(&mut self, pack: FontPack) {
        self.packs.retain(|p| p.id != pack.id);
        self.packs.push(pack);
    }

    /// Enable or disable a whole pack by id.
    pub fn set_enabled(&mut self, pack_id: &str, enabled: bool) {
        if enabled {
            self.disabled.remove(pack_id);
        } else {
            self.disabled.insert(pack_id.to_string());
        }
    }

    /// All loaded packs, enabled or not.
    #[must_use]
    pub fn packs(&self) -> &[FontPack] {
        &self.packs
    }

    /// Every enabled spec across every enabled pack, sorted by
    /// descending priority then case-insensitive name, with a
    /// `" [id]"` suffix appended to the display name of any spec whose
    /// name collides with another enabled spec's.
    #[must_use]
    pub fn sorted_specs(&self) -> Vec<ResolvedSpec<'_>> {
        let mut enabled: Vec<(&FontPack, &FontSpec)> = self
            .packs
            .iter()
            .filter(|p| !self.disabled.contains(&p.id))
            .flat_map(|p| p.specs.iter().map(move |s| (p, s)))
            .collect();

        enabled.sort_by(|(_, a), (_, b)| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()))
        });

        let mut name_counts: HashMap<String, usize> = HashMap::new();
        for (_, spec) in &enabled {
            *name_counts.entry(spec.name.clone()).or_insert(0) += 1;
        }

        enabled
            .into_iter()
            .map(|(pack, spec)| {
                let display_name = if name_counts[&spec.name] > 1 {
                    format!("{} [{}]", spec.name, spec.id)
                } else {
                    spec.name.clone()
                };
                ResolvedSpec {
                    display_name,
                    spec,
                    pack_id: &pack.id,
                }
            })
            .collect()
    }

    /// Look up one spec by `(pack_id, spec_id)`.
    #[must_use]
    pub fn find(&self, pack_id: &str, spec_id: &str) -> Option<&FontSpec> {
        self.packs
            .iter()
            .find(|p| p.id == pack_id)?
            .specs
            .iter()
            .find(|s| s.id == spec_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gem_core::{FontSpecFlags, FontStyle};
    use std::collections::HashMap as Map;

    fn spec(id: &str, name: &str, priority: i32) -> FontSpec {
        FontSpec {
            id: id.to_string(),
            name: name.to_string(),
            priority,
            files: vec![FontFile {
                id: format!("{id}-regular"),
                source_path: "f.ttf".into(),
                collection_index: 0,
                style: FontStyle::Regular,
                source_data: Arc::new(vec![]),
            }],
            flags: FontSpecFlags::default(),
            tuning: Map::new(),
        }
    }

    #[test]
    fn sorts_by_priority_then_name() {
        let mut reg = Registry::new();
        reg.add_pack(FontPack { id: "a".into(), version: None, specs: vec![spec("x", "Zeta", 1), spec("y", "Alpha", 5)] });
        let sorted = reg.sorted_specs();
        assert_eq!(sorted[0].spec.name, "Alpha");
        assert_eq!(sorted[1].spec.name, "Zeta");
    }

    #[test]
    fn disambiguates_duplicate_names() {
        let mut reg = Registry::new();
        reg.add_pack(FontPack { id: "a".into(), version: None, specs: vec![spec("x", "Same", 1)] });
        reg.add_pack(FontPack { id: "b".into(), version: None, specs: vec![spec("y", "Same", 1)] });
        let sorted = reg.sorted_specs();
        assert!(sorted.iter().all(|s| s.display_name.contains('[')));
    }

    #[test]
    fn disabled_pack_excluded() {
        let mut reg = Registry::new();
        reg.add_pack(FontPack { id: "a".into(), version: None, specs: vec![spec("x", "X", 1)] });
        reg.set_enabled("a", false);
        assert!(reg.sorted_specs().is_empty());
    }
}
