//! Remote codepoint-coverage index: `path: range1 range2 …` per line,
//! fetched over Gemini by the caller and parsed here.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use crate::error::{FontError, Result};

/// One parsed line of a cmap index: the pack-relative path it describes
/// plus the codepoint ranges it covers.
#[derive(Debug, Clone)]
pub struct CoverageEntry {
    pub path: String,
    pub ranges: Vec<RangeInclusive<u32>>,
}

impl CoverageEntry {
    #[must_use]
    pub fn covers(&self, codepoint: u32) -> bool {
        self.ranges.iter().any(|r| r.contains(&codepoint))
    }
}

fn parse_range(token: &str) -> Option<RangeInclusive<u32>> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    if let Some((lo, hi)) = token.split_once('-') {
        let lo = u32::from_str_radix(lo.trim_start_matches("U+").trim_start_matches("0x"), 16).ok()?;
        let hi = u32::from_str_radix(hi.trim_start_matches("U+").trim_start_matches("0x"), 16).ok()?;
        Some(lo..=hi)
    } else {
        let v = u32::from_str_radix(token.trim_start_matches("U+").trim_start_matches("0x"), 16).ok()?;
        Some(v..=v)
    }
}

/// Parse the full text of a remote cmap index.
pub fn parse(contents: &str) -> Result<Vec<CoverageEntry>> {
    let mut entries = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (path, rest) = line.split_once(':').ok_or_else(|| FontError::Parse {
            file: "cmap".to_string(),
            reason: format!("line {}: missing ':' separator", lineno + 1),
        })?;
        let ranges: Vec<_> = rest.split_whitespace().filter_map(parse_range).collect();
        entries.push(CoverageEntry {
            path: path.trim().to_string(),
            ranges,
        });
    }
    Ok(entries)
}

/// Given a parsed index, return the paths covering any of `codepoints`.
#[must_use]
pub fn matching_paths(index: &[CoverageEntry], codepoints: &[u32]) -> Vec<String> {
    index
        .iter()
        .filter(|entry| codepoints.iter().any(|cp| entry.covers(*cp)))
        .map(|entry| entry.path.clone())
        .collect()
}

/// Build a lookup table from path to entry, for repeated queries against
/// the same index.
#[must_use]
pub fn by_path(index: Vec<CoverageEntry>) -> HashMap<String, CoverageEntry> {
    index.into_iter().map(|e| (e.path.clone(), e)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ranges_and_singletons() {
        let text = "NotoSans.ttf: 0041-005A 0061-007A 00A9\n# comment\nEmoji.ttf: 1F600-1F64F\n";
        let entries = parse(text).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].covers(0x41));
        assert!(entries[0].covers(0x7A));
        assert!(entries[0].covers(0xA9));
        assert!(!entries[0].covers(0x100));
        assert!(entries[1].covers(0x1F600));
    }

    #[test]
    fn matching_paths_finds_any_overlap() {
        let text = "A.ttf: 0041-005A\nB.ttf: 0061-007A\n";
        let index = parse(text).unwrap();
        let hits = matching_paths(&index, &[0x62]);
        assert_eq!(hits, vec!["B.ttf".to_string()]);
    }

    #[test]
    fn rejects_line_without_separator() {
        assert!(parse("nocolonhere").is_err());
    }
}
