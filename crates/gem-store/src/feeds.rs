//! Feed aggregation: polls `.subscribed` bookmarks for new `=>` link
//! lines (and, for `.headings`-flagged subscriptions, `#` heading
//! lines), reconciling against what was already known.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use gem_core::{BookmarkFlags, BookmarkId, FeedEntry, GemUrl};
use regex::Regex;

use crate::bookmarks::Bookmarks;
use crate::visits::VisitLog;
use crate::{atomic_write, StoreError, StoreResult};

const FEEDS_FILENAME: &str = "feeds.txt";

/// Up to this many feed jobs run concurrently.
pub const MAX_CONCURRENT_REQUESTS: usize = 4;
/// Per-job timeout before the job is abandoned.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// How often the scheduler wakes up to look for due subscriptions.
pub const UPDATE_INTERVAL: Duration = Duration::from_secs(4 * 60 * 60);
/// How often the worker loop polls for job completion / new work.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn is_trimmable_punctuation(c: char) -> bool {
    if c == '"' || "([{<".contains(c) {
        return false;
    }
    c == '\u{2013}' || c == '\u{2014}' || c.is_ascii_punctuation()
}

/// Strip leading whitespace and leading trimmable punctuation.
#[must_use]
pub fn trim_title(title: &str) -> String {
    title
        .trim_start_matches(|c: char| c.is_whitespace() || is_trimmable_punctuation(c))
        .trim()
        .to_string()
}

/// One outcome of polling a single subscription.
#[derive(Debug, Default)]
pub struct ParsedFeed {
    /// Newly discovered entries.
    pub entries: Vec<FeedEntry>,
}

/// Parse a `text/gemini` response body into feed entries.
///
/// `now` is decremented by one second per entry discovered, so entries
/// from the same poll keep a stable, distinct discovery order. Heading
/// entries found on a subscription's very first poll (`is_first_update`)
/// are inserted with no discovery time at all, so a fresh subscribe
/// doesn't flood the user with "new" notifications for pre-existing
/// content.
pub fn parse_result(
    body: &str,
    source_url: &GemUrl,
    source_bookmark_id: BookmarkId,
    check_headings: bool,
    ignore_web: bool,
    is_first_update: bool,
    now: DateTime<Utc>,
) -> ParsedFeed {
    let link_re = Regex::new(r"^=>\s*(\S+)\s+([0-9]{4}-[0-1][0-9]-[0-3][0-9])([^0-9].*)").unwrap();
    let mut entries = Vec::new();
    let mut clock = now;

    for line in body.lines() {
        if let Some(caps) = link_re.captures(line) {
            let target = &caps[1];
            if ignore_web && target.to_ascii_lowercase().starts_with("http") {
                continue;
            }
            let Ok(date) = chrono::NaiveDate::parse_from_str(&caps[2], "%Y-%m-%d") else {
                continue;
            };
            let posted = date
                .and_hms_opt(12, 0, 0)
                .unwrap()
                .and_local_timezone(Utc)
                .single()
                .unwrap_or(now);
            let title = trim_title(&caps[3]);
            let Ok(url) = source_url.absoluteize(target) else {
                continue;
            };
            entries.push(FeedEntry {
                posted,
                discovered: Some(clock),
                url: url.to_string(),
                title,
                source_bookmark_id,
                is_heading: false,
            });
            clock -= chrono::Duration::seconds(1);
        } else if check_headings {
            if let Some(rest) = line.strip_prefix('#') {
                let heading = rest.trim_start_matches('#').trim();
                if heading.is_empty() {
                    continue;
                }
                let fragment = percent_encoding::utf8_percent_encode(
                    heading,
                    percent_encoding::NON_ALPHANUMERIC,
                )
                .to_string();
                let Ok(url) = source_url.with_fragment(&fragment).absoluteize("") else {
                    continue;
                };
                entries.push(FeedEntry {
                    posted: now,
                    discovered: if is_first_update { None } else { Some(clock) },
                    url: url.to_string(),
                    title: heading.to_string(),
                    source_bookmark_id,
                    is_heading: true,
                });
                if !is_first_update {
                    clock -= chrono::Duration::seconds(1);
                }
            }
        }
    }
    ParsedFeed { entries }
}

/// Reconcile freshly-parsed entries for one subscription against what's
/// already stored.
///
/// Heading feeds: anything in `incoming` not already known is added;
/// anything stored for this source but absent from `incoming` is
/// deleted (the source no longer has that heading). Link feeds: every
/// incoming URL is marked [`gem_core::VisitFlags::KEPT`] in `visits`
/// (so it's never swept while still linked from the source); existing
/// entries get title/date refreshed, and a changed title or date clears
/// the visit record so the entry reads unread again.
pub fn update_entries(
    stored: &mut Vec<FeedEntry>,
    incoming: Vec<FeedEntry>,
    source_id: BookmarkId,
    is_headings: bool,
    visits: &VisitLog,
) -> bool {
    let mut got_new = false;
    if is_headings {
        let known: HashSet<String> = stored
            .iter()
            .filter(|e| e.source_bookmark_id == source_id)
            .map(|e| e.url.clone())
            .collect();
        let mut present_in_source = HashSet::new();
        for entry in incoming {
            present_in_source.insert(entry.url.clone());
            if !known.contains(&entry.url) {
                stored.push(entry);
                got_new = true;
            }
        }
        stored.retain(|e| e.source_bookmark_id != source_id || present_in_source.contains(&e.url));
    } else {
        for entry in incoming {
            visits.set_url_kept(&entry.url, true);
            if let Some(existing) = stored
                .iter_mut()
                .find(|e| e.source_bookmark_id == source_id && e.url == entry.url)
            {
                if existing.title != entry.title || existing.posted != entry.posted {
                    visits.remove_url(&entry.url);
                }
                existing.title = entry.title;
                existing.posted = entry.posted;
            } else {
                stored.push(entry);
                got_new = true;
            }
        }
    }
    got_new
}

/// Whether a feed entry should be surfaced as unread right now.
#[must_use]
pub fn is_unread(entry: &FeedEntry, visits: &VisitLog) -> bool {
    if entry.is_hidden() {
        return false;
    }
    if entry.url.contains('#') {
        visits.url_visit_time(entry.url_fragment_stripped()) < entry.posted
    } else {
        !visits.contains_url(&entry.url)
    }
}

type FetchFuture = Pin<Box<dyn Future<Output = StoreResult<(String, Vec<u8>)>> + Send>>;

/// Fetches one URL, returning its `<META>` line and body bytes.
pub trait FeedFetcher: Send + Sync {
    /// Fetch `url`.
    fn fetch(&self, url: String) -> FetchFuture;
}

/// The feed aggregator: owns the entry store and drives the polling
/// schedule.
pub struct FeedAggregator {
    path: std::path::PathBuf,
    entries: Mutex<Vec<FeedEntry>>,
    fetcher: Arc<dyn FeedFetcher>,
}

impl FeedAggregator {
    /// Load stored entries from `dir/feeds.txt`.
    #[must_use]
    pub fn load(dir: &std::path::Path, fetcher: Arc<dyn FeedFetcher>) -> Self {
        let path = dir.join(FEEDS_FILENAME);
        let entries = std::fs::read_to_string(&path)
            .ok()
            .map(|c| parse_feeds_file(&c))
            .unwrap_or_default();
        Self {
            path,
            entries: Mutex::new(entries),
            fetcher,
        }
    }

    /// All stored entries for a source bookmark.
    #[must_use]
    pub fn entries_for(&self, source_id: BookmarkId) -> Vec<FeedEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.source_bookmark_id == source_id)
            .cloned()
            .collect()
    }

    /// Poll every `.subscribed` bookmark once, respecting the
    /// concurrency cap and per-job timeout, and reconcile results.
    pub async fn poll_once(&self, bookmarks: &Bookmarks, visits: &VisitLog) -> StoreResult<()> {
        let subs: Vec<_> = bookmarks
            .list(None)
            .into_iter()
            .filter(|b| b.flags.has(BookmarkFlags::SUBSCRIBED))
            .collect();

        let semaphore = Arc::new(tokio::sync::Semaphore::new(MAX_CONCURRENT_REQUESTS));
        let mut handles = Vec::new();
        for bm in subs {
            let sem = semaphore.clone();
            let fetcher = self.fetcher.clone();
            let url = bm.url.clone();
            let check_headings = bm.flags.has(BookmarkFlags::HEADINGS);
            let ignore_web = bm.flags.has(BookmarkFlags::IGNORE_WEB);
            let source_id = bm.id;
            let is_first_update = self.entries_for(source_id).is_empty();
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire().await.ok()?;
                let result = tokio::time::timeout(REQUEST_TIMEOUT, fetcher.fetch(url.clone())).await;
                let (_, body) = result.ok()?.ok()?;
                let body = String::from_utf8_lossy(&body).to_string();
                let Ok(source_url) = GemUrl::parse(&url) else {
                    return None;
                };
                let parsed = parse_result(
                    &body,
                    &source_url,
                    source_id,
                    check_headings,
                    ignore_web,
                    is_first_update,
                    Utc::now(),
                );
                Some((source_id, check_headings, parsed.entries))
            }));
        }

        let mut stored = self.entries.lock().unwrap();
        for handle in handles {
            if let Ok(Some((source_id, is_headings, incoming))) = handle.await {
                update_entries(&mut stored, incoming, source_id, is_headings, visits);
            }
        }
        self.save_locked(&stored)
    }

    /// Run the scheduler loop forever: wake every [`UPDATE_INTERVAL`]
    /// (once immediately on startup) and poll all subscriptions.
    pub async fn run(
        self: Arc<Self>,
        bookmarks: Arc<Bookmarks>,
        visits: Arc<VisitLog>,
        mut stop: tokio::sync::mpsc::Receiver<()>,
    ) {
        let mut interval = tokio::time::interval(UPDATE_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.poll_once(&bookmarks, &visits).await {
                        tracing::warn!(error = %err, "feed poll failed");
                    }
                }
                _ = stop.recv() => break,
            }
        }
    }

    fn save_locked(&self, entries: &[FeedEntry]) -> StoreResult<()> {
        let mut out = format!("{}\n# Feeds\n", Utc::now().timestamp());
        out.push_str("# Entries\n");
        let now = Utc::now();
        for entry in entries {
            if !entry.is_heading {
                if let Some(discovered) = entry.discovered {
                    if now - discovered > crate::visits::MAX_AGE {
                        continue;
                    }
                }
            }
            out.push_str(&format!(
                "{:x}\n{}\n{}\n{}\n{}\n",
                entry.source_bookmark_id,
                entry.posted.timestamp(),
                entry.discovered.map(|d| d.timestamp()).unwrap_or(0),
                entry.url,
                entry.title
            ));
        }
        atomic_write(&self.path, out.as_bytes()).map_err(StoreError::Io)
    }
}

fn parse_feeds_file(contents: &str) -> Vec<FeedEntry> {
    let mut lines = contents.lines();
    let mut entries = Vec::new();
    for line in &mut lines {
        if line == "# Entries" {
            break;
        }
    }
    loop {
        let Some(id_line) = lines.next() else { break };
        let Ok(source_bookmark_id) = BookmarkId::from_str_radix(id_line, 16) else {
            break;
        };
        let Some(posted_line) = lines.next() else { break };
        let Some(discovered_line) = lines.next() else { break };
        let Some(url) = lines.next() else { break };
        let Some(title) = lines.next() else { break };
        let (Ok(posted), Ok(discovered)) =
            (posted_line.parse::<i64>(), discovered_line.parse::<i64>())
        else {
            break;
        };
        entries.push(FeedEntry {
            posted: DateTime::from_timestamp(posted, 0).unwrap_or_else(Utc::now),
            discovered: if discovered == 0 {
                None
            } else {
                DateTime::from_timestamp(discovered, 0)
            },
            url: url.to_string(),
            title: title.to_string(),
            source_bookmark_id,
            is_heading: url.contains('#'),
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_leading_punctuation_but_not_quotes() {
        assert_eq!(trim_title("-- Title"), "Title");
        assert_eq!(trim_title("\"Quoted\""), "\"Quoted\"");
        assert_eq!(trim_title("(Parenthesized)"), "(Parenthesized)");
    }

    #[test]
    fn parses_link_lines() {
        let src = GemUrl::parse("gemini://example.org/feed").unwrap();
        let body = "=> /a 2024-01-02 First post\n=> /b 2024-01-03 Second post\n";
        let parsed = parse_result(body, &src, 1, false, false, false, Utc::now());
        assert_eq!(parsed.entries.len(), 2);
        assert_eq!(parsed.entries[0].title, "First post");
    }

    #[test]
    fn first_update_headings_are_hidden() {
        let src = GemUrl::parse("gemini://example.org/feed").unwrap();
        let body = "# A Heading\n";
        let parsed = parse_result(body, &src, 1, true, false, true, Utc::now());
        assert!(parsed.entries[0].is_hidden());
    }

    #[test]
    fn heading_reconciliation_deletes_vanished_entries() {
        let dir = tempfile::tempdir().unwrap();
        let visits = VisitLog::load(dir.path());
        let mut stored = vec![FeedEntry {
            posted: Utc::now(),
            discovered: Some(Utc::now()),
            url: "gemini://x/feed#old".to_string(),
            title: "Old".to_string(),
            source_bookmark_id: 1,
            is_heading: true,
        }];
        let incoming = vec![FeedEntry {
            posted: Utc::now(),
            discovered: Some(Utc::now()),
            url: "gemini://x/feed#new".to_string(),
            title: "New".to_string(),
            source_bookmark_id: 1,
            is_heading: true,
        }];
        update_entries(&mut stored, incoming, 1, true, &visits);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].url, "gemini://x/feed#new");
    }
}
