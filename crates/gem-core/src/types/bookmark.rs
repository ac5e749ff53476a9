use chrono::{DateTime, Utc};

/// Monotonic bookmark identifier; `0` is reserved for "no parent" (the
/// implicit root folder).
pub type BookmarkId = u32;

/// Bit flags packed into a bookmark's free-form tags field on save,
/// using the dot-prefixed token for each set bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BookmarkFlags(pub u32);

impl BookmarkFlags {
    /// `.homepage`
    pub const HOMEPAGE: u32 = 0x01;
    /// `.remotesource` — this bookmark's body is a remote link list to
    /// mirror into child bookmarks.
    pub const REMOTE_SOURCE: u32 = 0x02;
    /// `.linksplit`
    pub const LINK_SPLIT: u32 = 0x04;
    /// `.usericon` — icon was explicitly chosen by the user and must
    /// not be overwritten by favicon auto-detection.
    pub const USER_ICON: u32 = 0x08;
    /// `.subscribed` — tracked by the feed aggregator.
    pub const SUBSCRIBED: u32 = 0x10;
    /// `.headings` — subscription also tracks `#` heading lines.
    pub const HEADINGS: u32 = 0x20;
    /// `.ignoreweb` — feed subscription skips `http(s)` links.
    pub const IGNORE_WEB: u32 = 0x40;
    /// Runtime-only: this bookmark was synthesized from a remote
    /// source and is never persisted.
    pub const REMOTE: u32 = 0x80;

    /// `(flag bit, dot-tag token)` pairs, in persistence order. Note
    /// that [`Self::REMOTE`] is deliberately absent: it is a runtime
    /// marker, never packed into tags.
    pub const SPECIAL_TAGS: &'static [(u32, &'static str)] = &[
        (Self::HOMEPAGE, ".homepage"),
        (Self::REMOTE_SOURCE, ".remotesource"),
        (Self::LINK_SPLIT, ".linksplit"),
        (Self::USER_ICON, ".usericon"),
        (Self::SUBSCRIBED, ".subscribed"),
        (Self::HEADINGS, ".headings"),
        (Self::IGNORE_WEB, ".ignoreweb"),
    ];

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

/// A single bookmark or folder (a folder is a bookmark with an empty
/// URL).
#[derive(Debug, Clone)]
pub struct Bookmark {
    /// Unique, monotonically assigned id.
    pub id: BookmarkId,
    /// Target URL; empty for a folder.
    pub url: String,
    /// Display title.
    pub title: String,
    /// Free-form, space-separated user tags (dot-flags stripped out on
    /// load, re-added on save).
    pub tags: String,
    /// Behavioral flags, packed into `tags` as dot-tokens on save.
    pub flags: BookmarkFlags,
    /// Icon codepoint; `0` means "no explicit icon".
    pub icon: u32,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// Parent folder id; `0` means the root.
    pub parent_id: BookmarkId,
    /// Manual ordering key (lower sorts first); ties broken by id.
    pub order: i64,
}

impl Bookmark {
    /// A bookmark with an empty URL is a folder.
    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.url.is_empty()
    }
}

/// Grouping used when rendering the bookmark listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookmarkListType {
    /// Grouped by folder hierarchy.
    ByFolder,
    /// Grouped by tag.
    ByTag,
    /// Grouped by creation time.
    ByCreationTime,
}
