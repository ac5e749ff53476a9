use chrono::{DateTime, Utc};

use super::BookmarkId;

/// A single entry discovered by the feed aggregator, either a dated
/// `=>` link line or (for subscriptions with headings tracking) a `#`
/// heading line synthesized into its own fragment URL.
#[derive(Debug, Clone)]
pub struct FeedEntry {
    /// The entry's own timestamp: the parsed date for link entries, or
    /// the poll time for heading entries.
    pub posted: DateTime<Utc>,
    /// When this engine first saw the entry. Left invalid (see
    /// [`FeedEntry::is_hidden`]) for heading entries discovered during
    /// a subscription's very first poll, so a fresh subscribe doesn't
    /// flood the user with "new" notifications for pre-existing
    /// content.
    pub discovered: Option<DateTime<Utc>>,
    /// Absolute, canonicalized entry URL. For heading entries this
    /// carries a synthetic percent-encoded fragment.
    pub url: String,
    /// Display title (leading punctuation/whitespace trimmed).
    pub title: String,
    /// The subscribed bookmark this entry came from.
    pub source_bookmark_id: BookmarkId,
    /// True for a synthesized heading entry rather than a `=>` link.
    pub is_heading: bool,
}

impl FeedEntry {
    /// A heading entry with no `discovered` time is hidden from "new
    /// since last visit" views.
    #[must_use]
    pub const fn is_hidden(&self) -> bool {
        self.discovered.is_none()
    }

    /// The URL with any synthetic heading fragment stripped.
    #[must_use]
    pub fn url_fragment_stripped(&self) -> &str {
        self.url.split('#').next().unwrap_or(&self.url)
    }
}
