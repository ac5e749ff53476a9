//! Parsing for `fontpack.ini`: a TOML-subset manifest declaring one or
//! more named font specs backed by style files.

use std::collections::HashMap;

use gem_core::{FontSpecFlags, FontStyle};

use crate::error::{FontError, Result};

pub(crate) const MANIFEST_NAME: &str = "fontpack.ini";

const STYLE_KEYS: &[(&str, FontStyle)] = &[
    ("regular", FontStyle::Regular),
    ("italic", FontStyle::Italic),
    ("light", FontStyle::Regular),
    ("semibold", FontStyle::Semibold),
    ("bold", FontStyle::Bold),
];

/// A style file reference as written in the manifest: a path, plus an
/// optional `:<index>` TrueType-collection suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleFileRef {
    pub path: String,
    pub collection_index: u32,
}

fn parse_style_ref(raw: &str) -> StyleFileRef {
    if let Some((path, idx)) = raw.rsplit_once(':') {
        if let Ok(collection_index) = idx.parse::<u32>() {
            return StyleFileRef {
                path: path.to_string(),
                collection_index,
            };
        }
    }
    StyleFileRef {
        path: raw.to_string(),
        collection_index: 0,
    }
}

/// One `[spec-id]` table, not yet resolved against file bytes.
#[derive(Debug, Clone)]
pub struct RawSpec {
    pub id: String,
    pub name: String,
    pub priority: i32,
    pub styles: HashMap<FontStyle, StyleFileRef>,
    pub flags: FontSpecFlags,
    pub tuning: HashMap<String, f64>,
}

/// A fully parsed manifest: an optional pack-level version plus every
/// declared spec.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub version: Option<String>,
    pub specs: Vec<RawSpec>,
}

/// Parse `contents` (the text of one `fontpack.ini`).
pub fn parse(contents: &str) -> Result<Manifest> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| FontError::Parse {
        file: MANIFEST_NAME.to_string(),
        reason: e.to_string(),
    })?;

    let mut manifest = Manifest::default();
    for (key, value) in &table {
        if key == "version" {
            manifest.version = value.as_str().map(str::to_string);
            continue;
        }
        let Some(section) = value.as_table() else { continue };
        let name = section.get("name").and_then(|v| v.as_str()).unwrap_or(key).to_string();
        let priority = section.get("priority").and_then(toml::Value::as_integer).unwrap_or(0) as i32;

        let mut styles = HashMap::new();
        for (style_key, style) in STYLE_KEYS {
            if let Some(raw) = section.get(*style_key).and_then(|v| v.as_str()) {
                // `light` only fills in for `regular` when `regular` itself is absent.
                if *style_key == "light" && section.contains_key("regular") {
                    continue;
                }
                styles.insert(*style, parse_style_ref(raw));
            }
        }

        let mut flags = FontSpecFlags::default();
        for (flag_key, bit) in [
            ("override", FontSpecFlags::OVERRIDE),
            ("monospace", FontSpecFlags::MONOSPACE),
            ("auxiliary", FontSpecFlags::AUXILIARY),
            ("allowspace", FontSpecFlags::ALLOW_SPACE),
            ("tweaks", FontSpecFlags::TWEAKS),
        ] {
            if section.get(flag_key).and_then(toml::Value::as_bool).unwrap_or(false) {
                flags.set(bit, true);
            }
        }

        let mut tuning = HashMap::new();
        for (k, v) in section {
            if let Some(f) = v.as_float() {
                tuning.insert(k.clone(), f);
            } else if let Some(i) = v.as_integer() {
                if matches!(k.as_str(), "height" | "glyphscale" | "voffset") || k.starts_with('.') {
                    tuning.insert(k.clone(), i as f64);
                }
            }
        }

        manifest.specs.push(RawSpec {
            id: key.clone(),
            name,
            priority,
            styles,
            flags,
            tuning,
        });
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_spec() {
        let ini = "[mono]\nname = \"Iosevka\"\npriority = 10\nregular = \"Iosevka-Regular.ttf\"\nbold = \"Iosevka-Bold.ttf:1\"\nmonospace = true\n";
        let manifest = parse(ini).unwrap();
        assert_eq!(manifest.specs.len(), 1);
        let spec = &manifest.specs[0];
        assert_eq!(spec.name, "Iosevka");
        assert_eq!(spec.priority, 10);
        assert!(spec.flags.has(FontSpecFlags::MONOSPACE));
        assert_eq!(spec.styles[&FontStyle::Regular].path, "Iosevka-Regular.ttf");
        let bold = &spec.styles[&FontStyle::Bold];
        assert_eq!(bold.path, "Iosevka-Bold.ttf");
        assert_eq!(bold.collection_index, 1);
    }

    #[test]
    fn light_only_fills_missing_regular() {
        let ini = "[a]\nname = \"A\"\nlight = \"A-Light.ttf\"\n";
        let specs = parse(ini).unwrap().specs;
        assert_eq!(specs[0].styles[&FontStyle::Regular].path, "A-Light.ttf");

        let ini2 = "[a]\nname = \"A\"\nregular = \"A-Regular.ttf\"\nlight = \"A-Light.ttf\"\n";
        let specs2 = parse(ini2).unwrap().specs;
        assert_eq!(specs2[0].styles[&FontStyle::Regular].path, "A-Regular.ttf");
    }
}
