//! Visited-URL history: powers "have I been here" checks for unread
//! tracking and for link coloring, with old, non-kept entries swept on
//! save.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use gem_core::{VisitFlags, VisitRecord};

use crate::bookmarks::ImportMethod;
use crate::{atomic_write, StoreError, StoreResult};

const VISITED_FILENAME: &str = "visited.txt";

/// Entries older than this (and not [`VisitFlags::KEPT`]) are dropped
/// when the log is saved.
pub const MAX_AGE: chrono::Duration = chrono::Duration::seconds(180 * 24 * 60 * 60);

/// The visited-URL log.
pub struct VisitLog {
    path: PathBuf,
    entries: Mutex<HashMap<String, VisitRecord>>,
}

impl VisitLog {
    /// Load from `dir/visited.txt`, if present.
    #[must_use]
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(VISITED_FILENAME);
        let entries = std::fs::read_to_string(&path)
            .ok()
            .map(|c| parse_visited(&c))
            .unwrap_or_default();
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Record a visit to `url` right now.
    pub fn visit_url(&self, url: &str, flags: VisitFlags) {
        self.visit_url_time(url, flags, Utc::now());
    }

    /// Record a visit to `url` at a specific time, upserting: a fresh
    /// (non-transient) visit always clears the transient bit, and the
    /// kept bit is sticky once set.
    pub fn visit_url_time(&self, url: &str, flags: VisitFlags, when: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(url) {
            Some(existing) => {
                if when >= existing.when {
                    existing.when = when;
                }
                let kept = existing.flags.has(VisitFlags::KEPT) || flags.has(VisitFlags::KEPT);
                let transient = existing.flags.has(VisitFlags::TRANSIENT) && flags.has(VisitFlags::TRANSIENT);
                existing.flags = VisitFlags(
                    (if kept { VisitFlags::KEPT } else { 0 }) | (if transient { VisitFlags::TRANSIENT } else { 0 }),
                );
            }
            None => {
                entries.insert(
                    url.to_string(),
                    VisitRecord {
                        url: url.to_string(),
                        when,
                        flags,
                    },
                );
            }
        }
    }

    /// Mark `url` as (non-)discardable by the max-age sweep. A no-op if
    /// `url` isn't present yet.
    pub fn set_url_kept(&self, url: &str, is_kept: bool) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(url) {
            entry.flags.set(VisitFlags::KEPT, is_kept);
        }
    }

    /// Remove `url` from the log entirely.
    pub fn remove_url(&self, url: &str) {
        self.entries.lock().unwrap().remove(url);
    }

    /// True if `url` has a recorded visit.
    #[must_use]
    pub fn contains_url(&self, url: &str) -> bool {
        self.entries.lock().unwrap().contains_key(url)
    }

    /// The last visit time for `url`, or the Unix epoch if never
    /// visited — always earlier than any real `posted` time, so an
    /// unvisited URL reads naturally as unread.
    #[must_use]
    pub fn url_visit_time(&self, url: &str) -> DateTime<Utc> {
        self.entries
            .lock()
            .unwrap()
            .get(url)
            .map(|e| e.when)
            .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
    }

    /// Most recent `count` visits, newest first.
    #[must_use]
    pub fn list(&self, count: usize) -> Vec<VisitRecord> {
        let mut all: Vec<_> = self.entries.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| b.when.cmp(&a.when));
        all.truncate(count);
        all
    }

    /// All entries marked [`VisitFlags::KEPT`].
    #[must_use]
    pub fn list_kept(&self) -> Vec<VisitRecord> {
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.flags.has(VisitFlags::KEPT))
            .cloned()
            .collect()
    }

    /// Drop entries older than [`MAX_AGE`] unless [`VisitFlags::KEPT`],
    /// then persist.
    pub fn sweep_and_save(&self) -> StoreResult<()> {
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|_, e| e.flags.has(VisitFlags::KEPT) || now - e.when <= MAX_AGE);
        self.save_locked(&entries)
    }

    /// Serialize to bytes (used by the export bundle).
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let entries = self.entries.lock().unwrap();
        let mut out = Vec::new();
        let mut sorted: Vec<_> = entries.values().collect();
        sorted.sort_by(|a, b| a.url.cmp(&b.url));
        for entry in sorted {
            out.extend_from_slice(
                format!("{} {:x} {}\n", entry.when.timestamp(), entry.flags.0, entry.url).as_bytes(),
            );
        }
        out
    }

    /// Merge serialized entries into this log, keeping whichever visit
    /// time is most recent for any URL present on both sides.
    /// [`ImportMethod::Replace`] discards the existing log first instead
    /// of merging.
    pub fn import(&self, contents: &str, method: ImportMethod) -> StoreResult<()> {
        if method == ImportMethod::Skip {
            return Ok(());
        }
        let incoming = parse_visited(contents);
        let mut entries = self.entries.lock().unwrap();
        if method == ImportMethod::Replace {
            *entries = incoming;
        } else {
            for (url, record) in incoming {
                match entries.get_mut(&url) {
                    Some(existing) if existing.when >= record.when => {
                        existing.flags.set(VisitFlags::KEPT, existing.flags.has(VisitFlags::KEPT) || record.flags.has(VisitFlags::KEPT));
                    }
                    _ => {
                        entries.insert(url, record);
                    }
                }
            }
        }
        self.save_locked(&entries)
    }

    fn save_locked(&self, entries: &HashMap<String, VisitRecord>) -> StoreResult<()> {
        let mut out = String::new();
        let mut sorted: Vec<_> = entries.values().collect();
        sorted.sort_by(|a, b| a.url.cmp(&b.url));
        for entry in sorted {
            out.push_str(&format!(
                "{} {:x} {}\n",
                entry.when.timestamp(),
                entry.flags.0,
                entry.url
            ));
        }
        atomic_write(&self.path, out.as_bytes()).map_err(StoreError::Io)
    }
}

fn parse_visited(contents: &str) -> HashMap<String, VisitRecord> {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let mut parts = line.splitn(3, ' ');
        let (Some(epoch), Some(flags), Some(url)) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        let (Ok(epoch), Ok(flags)) = (epoch.parse::<i64>(), u16::from_str_radix(flags, 16)) else {
            continue;
        };
        let Some(when) = DateTime::from_timestamp(epoch, 0) else {
            continue;
        };
        map.insert(
            url.to_string(),
            VisitRecord {
                url: url.to_string(),
                when,
                flags: VisitFlags(flags),
            },
        );
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unvisited_url_reads_as_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let log = VisitLog::load(dir.path());
        assert_eq!(log.url_visit_time("gemini://x/"), Utc.timestamp_opt(0, 0).unwrap());
    }

    #[test]
    fn visit_then_contains() {
        let dir = tempfile::tempdir().unwrap();
        let log = VisitLog::load(dir.path());
        log.visit_url("gemini://x/", VisitFlags::default());
        assert!(log.contains_url("gemini://x/"));
    }

    #[test]
    fn kept_entries_survive_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let log = VisitLog::load(dir.path());
        let old = Utc::now() - chrono::Duration::days(400);
        log.visit_url_time("gemini://old/", VisitFlags(VisitFlags::KEPT), old);
        log.visit_url_time("gemini://stale/", VisitFlags::default(), old);
        log.sweep_and_save().unwrap();
        assert!(log.contains_url("gemini://old/"));
        assert!(!log.contains_url("gemini://stale/"));
    }

    #[test]
    fn replace_discards_existing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let log = VisitLog::load(dir.path());
        log.visit_url("gemini://old/", VisitFlags::default());
        let incoming = "1000 0 gemini://new/\n";
        log.import(incoming, ImportMethod::Replace).unwrap();
        assert!(!log.contains_url("gemini://old/"));
        assert!(log.contains_url("gemini://new/"));
    }
}
