//! Bookmark and folder store.
//!
//! Bookmarks and folders share one flat, id-keyed arena (a folder is a
//! bookmark with an empty URL). Persistence is a TOML-subset
//! `bookmarks.ini`, one `[id]` table per bookmark; a one-way migration
//! reads the older `bookmarks.txt` line format when `.ini` is absent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use gem_core::{Bookmark, BookmarkFlags, BookmarkId, BookmarkListType};

use crate::{atomic_write, StoreError, StoreResult};

const INI_FILENAME: &str = "bookmarks.ini";
const LEGACY_FILENAME: &str = "bookmarks.txt";

/// How a bundle import should reconcile with bookmarks that already
/// exist in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMethod {
    /// Don't import this category at all.
    #[default]
    Skip,
    /// Import everything; bookmarks whose URL already exists are
    /// reparented into a "duplicate bookmarks" folder instead of being
    /// dropped.
    All,
    /// Import only bookmarks whose URL does not already exist.
    IfMissing,
    /// Discard everything already in the store, then load the incoming
    /// data as if it were a fresh store.
    Replace,
}

fn unpack_dot_tags(tags: &str) -> (String, BookmarkFlags) {
    let mut flags = BookmarkFlags::default();
    let mut kept = Vec::new();
    'token: for tok in tags.split_whitespace() {
        for &(bit, dot_token) in BookmarkFlags::SPECIAL_TAGS {
            let legacy = &dot_token[1..];
            if tok == dot_token || tok == legacy {
                flags.set(bit, true);
                continue 'token;
            }
        }
        kept.push(tok);
    }
    (kept.join(" "), flags)
}

fn pack_dot_tags(tags: &str, flags: BookmarkFlags) -> String {
    let mut out = tags.to_string();
    for &(bit, dot_token) in BookmarkFlags::SPECIAL_TAGS {
        if flags.has(bit) {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(dot_token);
        }
    }
    out
}

struct State {
    by_id: HashMap<BookmarkId, Bookmark>,
    next_id: BookmarkId,
    recent_folder: BookmarkId,
}

/// The bookmark store.
pub struct Bookmarks {
    path: PathBuf,
    legacy_path: PathBuf,
    state: Mutex<State>,
    /// When true, newly added bookmarks are appended at the end of the
    /// global order range instead of prepended at the start.
    pub add_to_bottom: bool,
}

impl Bookmarks {
    /// Load from `dir/bookmarks.ini`, falling back to a one-way
    /// migration of `dir/bookmarks.txt` if the new file is absent.
    #[must_use]
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(INI_FILENAME);
        let legacy_path = dir.join(LEGACY_FILENAME);
        let mut state = State {
            by_id: HashMap::new(),
            next_id: 1,
            recent_folder: 0,
        };
        if let Ok(contents) = std::fs::read_to_string(&path) {
            load_ini(&contents, &mut state, 0, None);
        } else if let Ok(contents) = std::fs::read_to_string(&legacy_path) {
            load_legacy(&contents, &mut state);
        }
        Self {
            path,
            legacy_path,
            state: Mutex::new(state),
            add_to_bottom: false,
        }
    }

    /// Add a bookmark or folder, returning its new id.
    pub fn add(
        &self,
        url: &str,
        title: &str,
        tags: &str,
        icon: u32,
        parent_id: BookmarkId,
    ) -> BookmarkId {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        let (min, max) = order_range(&state.by_id);
        let order = if self.add_to_bottom { max } else { min - 1 };
        let (clean_tags, flags) = unpack_dot_tags(tags);
        state.by_id.insert(
            id,
            Bookmark {
                id,
                url: url.to_string(),
                title: title.to_string(),
                tags: clean_tags,
                flags,
                icon,
                created: Utc::now(),
                parent_id,
                order,
            },
        );
        id
    }

    /// Remove `id` and, recursively, everything whose `parent_id`
    /// chain leads back to it.
    pub fn remove(&self, id: BookmarkId) {
        let mut state = self.state.lock().unwrap();
        let mut to_remove = vec![id];
        let mut i = 0;
        while i < to_remove.len() {
            let current = to_remove[i];
            for (child_id, bm) in &state.by_id {
                if bm.parent_id == current && !to_remove.contains(child_id) {
                    to_remove.push(*child_id);
                }
            }
            i += 1;
        }
        for removed in to_remove {
            state.by_id.remove(&removed);
        }
    }

    /// Move `id` to `new_order`, shifting every other bookmark whose
    /// order is `>= new_order` up by one.
    pub fn reorder(&self, id: BookmarkId, new_order: i64) {
        let mut state = self.state.lock().unwrap();
        for (bid, bm) in state.by_id.iter_mut() {
            if *bid != id && bm.order >= new_order {
                bm.order += 1;
            }
        }
        if let Some(bm) = state.by_id.get_mut(&id) {
            bm.order = new_order;
        }
    }

    /// List bookmarks (and folders) whose `parent_id` matches `parent`,
    /// default-sorted by descending creation time.
    #[must_use]
    pub fn list(&self, parent: Option<BookmarkId>) -> Vec<Bookmark> {
        let state = self.state.lock().unwrap();
        let mut list: Vec<_> = state
            .by_id
            .values()
            .filter(|b| parent.map_or(true, |p| b.parent_id == p))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created.cmp(&a.created));
        list
    }

    /// Number of non-folder bookmarks.
    #[must_use]
    pub fn count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .by_id
            .values()
            .filter(|b| !b.is_folder())
            .count()
    }

    /// Linear scan for a bookmark with exactly this URL.
    #[must_use]
    pub fn find_url(&self, url: &str) -> Option<Bookmark> {
        self.state
            .lock()
            .unwrap()
            .by_id
            .values()
            .find(|b| b.url == url)
            .cloned()
    }

    /// The user-set icon whose bookmark root matches `url`'s root,
    /// picking the shortest URL on ties.
    #[must_use]
    pub fn site_icon(&self, url: &gem_core::GemUrl) -> Option<u32> {
        let root = url.root();
        self.state
            .lock()
            .unwrap()
            .by_id
            .values()
            .filter(|b| b.icon != 0 && b.flags.has(BookmarkFlags::USER_ICON))
            .filter(|b| {
                gem_core::GemUrl::parse(&b.url)
                    .map(|u| u.root().eq_ignore_ascii_case(&root))
                    .unwrap_or(false)
            })
            .min_by_key(|b| b.url.len())
            .map(|b| b.icon)
    }

    /// Update a bookmark's icon from favicon auto-detection; a no-op if
    /// the bookmark is a remote mirror or has a user-chosen icon.
    pub fn update_icon(&self, id: BookmarkId, icon: u32) {
        let mut state = self.state.lock().unwrap();
        if let Some(bm) = state.by_id.get_mut(&id) {
            if !bm.flags.has(BookmarkFlags::REMOTE) && !bm.flags.has(BookmarkFlags::USER_ICON) {
                bm.icon = icon;
            }
        }
    }

    /// Mutate a bookmark's behavioral flags in place (e.g. to toggle
    /// `.subscribed`/`.headings` from a feed-management UI). A no-op if
    /// `id` doesn't exist.
    pub fn set_flags<F>(&self, id: BookmarkId, f: F)
    where
        F: FnOnce(&mut BookmarkFlags),
    {
        let mut state = self.state.lock().unwrap();
        if let Some(bm) = state.by_id.get_mut(&id) {
            f(&mut bm.flags);
        }
    }

    /// Assign dense, 1-based `order` values to the direct children of
    /// `parent`, after sorting them with `cmp`.
    pub fn sort_folder<F>(&self, parent: Option<BookmarkId>, mut cmp: F)
    where
        F: FnMut(&Bookmark, &Bookmark) -> std::cmp::Ordering,
    {
        let mut state = self.state.lock().unwrap();
        let mut ids: Vec<BookmarkId> = state
            .by_id
            .values()
            .filter(|b| parent.map_or(true, |p| b.parent_id == p))
            .map(|b| b.id)
            .collect();
        ids.sort_by(|a, b| cmp(&state.by_id[a], &state.by_id[b]));
        for (idx, id) in ids.into_iter().enumerate() {
            state.by_id.get_mut(&id).unwrap().order = idx as i64 + 1;
        }
    }

    /// Purge every `REMOTE`-flagged bookmark (never persisted, and
    /// always dropped first before a remote-source refresh).
    pub fn purge_remote(&self) {
        self.state
            .lock()
            .unwrap()
            .by_id
            .retain(|_, b| !b.flags.has(BookmarkFlags::REMOTE));
    }

    /// Render a `text/gemini` listing of all bookmarks, grouped as
    /// requested.
    #[must_use]
    pub fn list_page(&self, list_type: BookmarkListType) -> String {
        let state = self.state.lock().unwrap();
        let mut bms: Vec<_> = state.by_id.values().filter(|b| !b.is_folder()).collect();
        match list_type {
            BookmarkListType::ByCreationTime => bms.sort_by(|a, b| b.created.cmp(&a.created)),
            BookmarkListType::ByTag | BookmarkListType::ByFolder => {
                bms.sort_by(|a, b| a.title.cmp(&b.title));
            }
        }
        let mut out = String::from("# Bookmarks\n\n");
        for bm in bms {
            out.push_str(&format!("=> {} {}\n", bm.url, bm.title));
        }
        out
    }

    /// Save to `bookmarks.ini`.
    pub fn save(&self) -> StoreResult<()> {
        let state = self.state.lock().unwrap();
        let mut out = format!("recentfolder = {}\n\n", state.recent_folder);
        let mut ids: Vec<_> = state.by_id.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let bm = &state.by_id[&id];
            if bm.flags.has(BookmarkFlags::REMOTE) {
                continue;
            }
            out.push_str(&format!("[{id}]\n"));
            out.push_str(&format!("url = {:?}\n", bm.url));
            out.push_str(&format!("title = {:?}\n", bm.title));
            out.push_str(&format!("tags = {:?}\n", pack_dot_tags(&bm.tags, bm.flags)));
            out.push_str(&format!("icon = 0x{:x}\n", bm.icon));
            out.push_str(&format!("created = {}\n", bm.created.timestamp()));
            if bm.parent_id != 0 {
                out.push_str(&format!("parent = {}\n", bm.parent_id));
            }
            if bm.order != 0 {
                out.push_str(&format!("order = {}\n", bm.order));
            }
            out.push('\n');
        }
        atomic_write(&self.path, out.as_bytes()).map_err(StoreError::Io)
    }

    /// Serialize to an arbitrary writer (used by the export bundle,
    /// which wants the bytes in memory rather than on disk).
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let _ = &self.legacy_path; // retained for symmetry with load()
        let mut buf = Vec::new();
        let state = self.state.lock().unwrap();
        buf.extend_from_slice(format!("recentfolder = {}\n\n", state.recent_folder).as_bytes());
        let mut ids: Vec<_> = state.by_id.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let bm = &state.by_id[&id];
            if bm.flags.has(BookmarkFlags::REMOTE) {
                continue;
            }
            buf.extend_from_slice(
                format!(
                    "[{id}]\nurl = {:?}\ntitle = {:?}\ntags = {:?}\nicon = 0x{:x}\ncreated = {}\n",
                    bm.url,
                    bm.title,
                    pack_dot_tags(&bm.tags, bm.flags),
                    bm.icon,
                    bm.created.timestamp()
                )
                .as_bytes(),
            );
            if bm.parent_id != 0 {
                buf.extend_from_slice(format!("parent = {}\n", bm.parent_id).as_bytes());
            }
            if bm.order != 0 {
                buf.extend_from_slice(format!("order = {}\n", bm.order).as_bytes());
            }
            buf.push(b'\n');
        }
        buf
    }

    /// Import bookmarks serialized the way [`Bookmarks::serialize`]
    /// produces them, reconciling with what's already in the store.
    ///
    /// [`ImportMethod::Replace`] clears the store first and loads the
    /// incoming data fresh, with no id offset or merge pass. Otherwise,
    /// imported ids are offset by the current max id so they never
    /// collide with existing ones. When `method` is [`ImportMethod::All`]
    /// (and this is genuinely an import, not the initial load), any
    /// incoming bookmark whose URL already exists is reparented into a
    /// synthesized "duplicate bookmarks" folder instead of being
    /// inserted in place; folders whose title exactly matches an
    /// existing root-level folder are merged into that folder and the
    /// imported duplicate is discarded.
    pub fn import(&self, contents: &str, method: ImportMethod) -> StoreResult<()> {
        if method == ImportMethod::Skip {
            return Ok(());
        }
        let mut state = self.state.lock().unwrap();
        if method == ImportMethod::Replace {
            state.by_id.clear();
            state.next_id = 1;
            state.recent_folder = 0;
            load_ini(contents, &mut state, 0, None);
            return Ok(());
        }
        let base_id = state.by_id.keys().copied().max().unwrap_or(0);
        let mut did_import_duplicates = false;
        load_ini(contents, &mut state, base_id, None);
        state.next_id = state.by_id.keys().copied().max().unwrap_or(0) + 1;
        // Computed only after every imported id has landed, so it can
        // never alias one of them (unlike a value derived from the
        // pre-import `next_id`, which a same-sized import would collide
        // with after the `base_id` offset was applied).
        let dup_folder_id = state.next_id;

        let existing_non_folder_urls: HashMap<String, BookmarkId> = state
            .by_id
            .iter()
            .filter(|(id, b)| **id <= base_id && !b.url.is_empty())
            .map(|(id, b)| (b.url.clone(), *id))
            .collect();

        let imported_ids: Vec<BookmarkId> = state
            .by_id
            .keys()
            .copied()
            .filter(|id| *id > base_id)
            .collect();

        let mut to_delete = Vec::new();
        for id in &imported_ids {
            let is_folder = state.by_id[id].is_folder();
            if is_folder {
                continue;
            }
            let url = state.by_id[id].url.clone();
            if let Some(&existing_id) = existing_non_folder_urls.get(&url) {
                if method == ImportMethod::IfMissing {
                    to_delete.push(*id);
                } else {
                    let bm = state.by_id.get_mut(id).unwrap();
                    bm.parent_id = dup_folder_id;
                    did_import_duplicates = true;
                    let _ = existing_id;
                }
            }
        }
        for id in to_delete {
            state.by_id.remove(&id);
        }

        if did_import_duplicates && base_id != 0 && method == ImportMethod::All {
            state.by_id.insert(
                dup_folder_id,
                Bookmark {
                    id: dup_folder_id,
                    url: String::new(),
                    title: "Duplicate Bookmarks".to_string(),
                    tags: String::new(),
                    flags: BookmarkFlags::default(),
                    icon: 0,
                    created: Utc::now(),
                    parent_id: 0,
                    order: 0,
                },
            );
            state.next_id = state.next_id.max(dup_folder_id + 1);
        }

        if base_id != 0 {
            merge_folders(&mut state, base_id);
        }
        Ok(())
    }
}

fn order_range(by_id: &HashMap<BookmarkId, Bookmark>) -> (i64, i64) {
    let min = by_id.values().map(|b| b.order).min().unwrap_or(0);
    let max = by_id.values().map(|b| b.order).max().unwrap_or(0);
    (min, max + 1)
}

/// Reparent children of any imported folder whose title exactly matches
/// an existing root-level folder into that existing folder, then drop
/// the now-empty imported duplicate.
fn merge_folders(state: &mut State, base_id: BookmarkId) {
    let existing_root_folders: HashMap<String, BookmarkId> = state
        .by_id
        .iter()
        .filter(|(id, b)| **id <= base_id && b.is_folder() && b.parent_id == 0)
        .map(|(id, b)| (b.title.clone(), *id))
        .collect();

    let imported_folders: Vec<(BookmarkId, String)> = state
        .by_id
        .iter()
        .filter(|(id, b)| **id > base_id && b.is_folder())
        .map(|(id, b)| (*id, b.title.clone()))
        .collect();

    for (imported_id, title) in imported_folders {
        if let Some(&target_id) = existing_root_folders.get(&title) {
            let child_ids: Vec<BookmarkId> = state
                .by_id
                .iter()
                .filter(|(_, b)| b.parent_id == imported_id)
                .map(|(id, _)| *id)
                .collect();
            for child_id in child_ids {
                state.by_id.get_mut(&child_id).unwrap().parent_id = target_id;
            }
            state.by_id.remove(&imported_id);
        }
    }
}

fn load_ini(contents: &str, state: &mut State, id_offset: BookmarkId, _unused: Option<()>) {
    let Ok(value) = contents.parse::<toml::Table>() else {
        return;
    };
    for (key, table) in &value {
        if key == "recentfolder" {
            if let Some(v) = table.as_integer() {
                state.recent_folder = v as BookmarkId;
            }
            continue;
        }
        let Ok(raw_id) = key.parse::<BookmarkId>() else {
            continue;
        };
        let Some(table) = table.as_table() else {
            continue;
        };
        let id = raw_id + id_offset;
        let url = table.get("url").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let title = table.get("title").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let raw_tags = table.get("tags").and_then(|v| v.as_str()).unwrap_or("");
        let (tags, flags) = unpack_dot_tags(raw_tags);
        let icon = table
            .get("icon")
            .and_then(|v| v.as_integer())
            .map(|v| v as u32)
            .unwrap_or(0);
        let created = table
            .get("created")
            .and_then(|v| v.as_integer())
            .and_then(|v| DateTime::from_timestamp(v, 0))
            .unwrap_or_else(Utc::now);
        let parent_id = table
            .get("parent")
            .and_then(|v| v.as_integer())
            .map(|v| v as BookmarkId + id_offset)
            .unwrap_or(0);
        let order = table.get("order").and_then(|v| v.as_integer()).unwrap_or(0);
        state.by_id.insert(
            id,
            Bookmark {
                id,
                url,
                title,
                tags,
                flags,
                icon,
                created,
                parent_id,
                order,
            },
        );
        state.next_id = state.next_id.max(id + 1);
    }
}

/// One-way migration of the pre-1.7 format: hex icon (9 chars) +
/// timestamp + URL line, then title line, then tags line. Since the old
/// format carried no order field, loaded bookmarks are sorted
/// alphabetically by title afterward.
fn load_legacy(contents: &str, state: &mut State) {
    let mut lines = contents.lines();
    while let Some(first) = lines.next() {
        if first.len() < 10 {
            continue;
        }
        let (icon_hex, rest) = first.split_at(9);
        let icon = u32::from_str_radix(icon_hex.trim(), 16).unwrap_or(0);
        let mut parts = rest.trim_start().splitn(2, ' ');
        let Some(ts) = parts.next() else { continue };
        let url = parts.next().unwrap_or("").trim();
        let url = if url.is_empty() { "/" } else { url };
        let created = ts
            .parse::<f64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
            .unwrap_or_else(Utc::now);
        let Some(title) = lines.next() else { break };
        let raw_tags = lines.next().unwrap_or("");
        let (tags, flags) = unpack_dot_tags(raw_tags);
        let id = state.next_id;
        state.next_id += 1;
        state.by_id.insert(
            id,
            Bookmark {
                id,
                url: url.to_string(),
                title: title.to_string(),
                tags,
                flags,
                icon,
                created,
                parent_id: 0,
                order: 0,
            },
        );
    }
    let mut ids: Vec<_> = state.by_id.keys().copied().collect();
    ids.sort_by(|a, b| state.by_id[a].title.cmp(&state.by_id[b].title));
    for (idx, id) in ids.into_iter().enumerate() {
        state.by_id.get_mut(&id).unwrap().order = idx as i64 + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_tag_round_trip() {
        let (clean, flags) = unpack_dot_tags("news .subscribed .headings");
        assert_eq!(clean, "news");
        assert!(flags.has(BookmarkFlags::SUBSCRIBED));
        assert!(flags.has(BookmarkFlags::HEADINGS));
        assert_eq!(pack_dot_tags(&clean, flags), "news .subscribed .headings");
    }

    #[test]
    fn legacy_dotless_tag_also_accepted() {
        let (clean, flags) = unpack_dot_tags("news subscribed");
        assert_eq!(clean, "news");
        assert!(flags.has(BookmarkFlags::SUBSCRIBED));
    }

    #[test]
    fn add_prepends_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = Bookmarks::load(dir.path());
        let a = store.add("gemini://a/", "A", "", 0, 0);
        let b = store.add("gemini://b/", "B", "", 0, 0);
        let list = store.list(None);
        let order_a = list.iter().find(|x| x.id == a).unwrap().order;
        let order_b = list.iter().find(|x| x.id == b).unwrap().order;
        assert!(order_b < order_a);
    }

    #[test]
    fn remove_recursively_deletes_children() {
        let dir = tempfile::tempdir().unwrap();
        let store = Bookmarks::load(dir.path());
        let folder = store.add("", "Folder", "", 0, 0);
        let child = store.add("gemini://c/", "C", "", 0, folder);
        store.remove(folder);
        assert!(store.find_url("gemini://c/").is_none());
        let _ = child;
    }

    #[test]
    fn import_merges_matching_folder_and_skips_existing_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = Bookmarks::load(dir.path());
        let work = store.add("", "Work", "", 0, 0);
        store.add("gemini://foo/", "Foo", "", 0, work);

        let imported = "[1]\nurl = \"\"\ntitle = \"Work\"\ntags = \"\"\nicon = 0x0\ncreated = 0\n\n\
                         [2]\nurl = \"gemini://foo/\"\ntitle = \"Foo\"\ntags = \"\"\nicon = 0x0\ncreated = 0\nparent = 1\n\n";
        store.import(imported, ImportMethod::IfMissing).unwrap();
        // the imported "Foo" (duplicate URL) must have been dropped, and
        // the imported "Work" folder merged away (no leftover folder
        // with an id beyond the original base).
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn replace_discards_existing_bookmarks() {
        let dir = tempfile::tempdir().unwrap();
        let store = Bookmarks::load(dir.path());
        store.add("gemini://old/", "Old", "", 0, 0);

        let imported = "[1]\nurl = \"gemini://new/\"\ntitle = \"New\"\ntags = \"\"\nicon = 0x0\ncreated = 0\n\n";
        store.import(imported, ImportMethod::Replace).unwrap();
        assert!(store.find_url("gemini://old/").is_none());
        assert!(store.find_url("gemini://new/").is_some());
        assert_eq!(store.count(), 1);
    }
}
