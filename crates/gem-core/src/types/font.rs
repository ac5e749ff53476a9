/// A font's weight/slant within a pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FontStyle {
    /// Upright, regular weight.
    #[default]
    Regular,
    /// Upright, bold weight.
    Bold,
    /// Upright, semibold weight (falls back to bold, then regular).
    Semibold,
    /// Italic, regular weight.
    Italic,
    /// Italic, bold weight.
    BoldItalic,
}

impl FontStyle {
    /// The style to substitute when this exact style is missing from a
    /// pack, in fallback order. Returns `None` once `Regular` (which
    /// must always be present) is reached.
    #[must_use]
    pub const fn fallback(self) -> Option<Self> {
        match self {
            Self::Semibold => Some(Self::Bold),
            Self::Bold | Self::Italic | Self::BoldItalic => Some(Self::Regular),
            Self::Regular => None,
        }
    }
}

/// One physical font file referenced from a pack, identified by its
/// source path plus collection index so that two styles sharing one
/// TTC file are only ever loaded once.
#[derive(Debug, Clone)]
pub struct FontFile {
    /// Stable identifier, typically `<pack-id>-<style>`.
    pub id: String,
    /// Path within the pack archive (or filesystem directory).
    pub source_path: String,
    /// Index into a TrueType collection; `0` for non-collection files.
    pub collection_index: u32,
    /// Style this file object instance is registered under; a second
    /// style sharing the same `(source_path, collection_index)` reuses
    /// the same decoded font data rather than re-reading it.
    pub style: FontStyle,
    /// Raw font bytes, shared (via the registry) between styles that
    /// resolve to the same file.
    pub source_data: std::sync::Arc<Vec<u8>>,
}

/// Boolean toggles declared alongside a spec's style files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FontSpecFlags(pub u32);

impl FontSpecFlags {
    /// This spec should override the default UI font rather than only
    /// being available as an explicit user choice.
    pub const OVERRIDE: u32 = 0x1;
    /// Fixed-width; excluded from proportional-only pickers.
    pub const MONOSPACE: u32 = 0x2;
    /// Supplementary glyph coverage only (symbols, emoji); not offered
    /// as a primary body font.
    pub const AUXILIARY: u32 = 0x4;
    /// Permits letter-spacing adjustments.
    pub const ALLOW_SPACE: u32 = 0x8;
    /// Carries hand-tuned `.ui.*`/`.doc.*` scale overrides (see
    /// [`FontSpec::tuning`]) rather than relying on defaults.
    pub const TWEAKS: u32 = 0x10;

    /// True if `bit` is set.
    #[must_use]
    pub const fn has(self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    /// Sets or clears `bit`.
    pub fn set(&mut self, bit: u32, value: bool) {
        if value {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }
}

/// One named font family as declared in a pack's `fontpack.ini`.
#[derive(Debug, Clone)]
pub struct FontSpec {
    /// Unique spec id, matching the `[id]` section header.
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// Priority used to break ties when two packs declare the same
    /// name; higher wins.
    pub priority: i32,
    /// Files making up this family, one per style actually provided.
    pub files: Vec<FontFile>,
    /// Boolean toggles (`override`, `monospace`, `auxiliary`,
    /// `allowspace`, `tweaks`).
    pub flags: FontSpecFlags,
    /// Tuning scalars keyed by their manifest name (`height`,
    /// `glyphscale`, `voffset`, and any `.ui.*`/`.doc.*` override).
    /// Absent keys fall back to the built-in defaults in
    /// `gem_fonts::size`.
    pub tuning: std::collections::HashMap<String, f64>,
}

impl FontSpec {
    /// Resolve the file to use for `style`, following the fallback
    /// chain (missing `semibold` tries `bold` then `regular`; any other
    /// missing style falls straight back to `regular`) until a file is
    /// found.
    #[must_use]
    pub fn resolve(&self, style: FontStyle) -> Option<&FontFile> {
        let mut current = Some(style);
        while let Some(s) = current {
            if let Some(file) = self.files.iter().find(|f| f.style == s) {
                return Some(file);
            }
            current = s.fallback();
        }
        None
    }
}

/// A loaded font pack: a MIME-typed ZIP archive (or directory) bundling
/// one or more [`FontSpec`]s plus their `fontpack.ini` manifest.
#[derive(Debug, Clone)]
pub struct FontPack {
    /// Pack-unique id, taken from the manifest or the archive filename.
    pub id: String,
    /// Human-readable version string from the manifest, if present.
    pub version: Option<String>,
    /// Font families this pack declares.
    pub specs: Vec<FontSpec>,
}

impl FontPack {
    /// The MIME type a font-pack archive must advertise to be
    /// recognized as such.
    pub const MIME_TYPE: &'static str = "application/gem-fontpack+zip";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(style: FontStyle) -> FontFile {
        FontFile {
            id: format!("f-{style:?}"),
            source_path: "font.ttf".to_string(),
            collection_index: 0,
            style,
            source_data: std::sync::Arc::new(vec![]),
        }
    }

    #[test]
    fn semibold_falls_back_to_bold_before_regular() {
        let spec = FontSpec {
            id: "s".into(),
            name: "S".into(),
            priority: 0,
            files: vec![file(FontStyle::Regular), file(FontStyle::Bold)],
            flags: FontSpecFlags::default(),
            tuning: Default::default(),
        };
        assert_eq!(spec.resolve(FontStyle::Semibold).unwrap().style, FontStyle::Bold);
    }

    #[test]
    fn missing_style_falls_back_to_regular() {
        let spec = FontSpec {
            id: "s".into(),
            name: "S".into(),
            priority: 0,
            files: vec![file(FontStyle::Regular)],
            flags: FontSpecFlags::default(),
            tuning: Default::default(),
        };
        assert_eq!(spec.resolve(FontStyle::Italic).unwrap().style, FontStyle::Regular);
    }

    #[test]
    fn no_regular_yields_none() {
        let spec = FontSpec {
            id: "s".into(),
            name: "S".into(),
            priority: 0,
            files: vec![],
            flags: FontSpecFlags::default(),
            tuning: Default::default(),
        };
        assert!(spec.resolve(FontStyle::Regular).is_none());
    }
}
