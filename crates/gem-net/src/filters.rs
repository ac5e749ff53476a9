//! Mime filter hooks: external-process transforms plus two built-in
//! filters (Atom→Gemini feed translation, GemPub cover pages) that
//! always run last.

use std::io::Read;
use std::path::Path;
use std::process::Stdio;

use regex::Regex;

use crate::request::ResponseFilter;

const GEMPUB_MIME: &str = "application/gpub+zip";

/// One external-process hook: a MIME pattern and the command line to
/// run when it matches, loaded from `mimehooks.txt`.
struct FilterHook {
    label: String,
    mime_regex: Regex,
    command: String,
}

impl FilterHook {
    /// Spawn the hook's command, write `body` to its stdin, and accept
    /// its stdout only if it starts with a Gemini success header.
    fn run(&self, mime: &str, body: &[u8], request_url: &str) -> Option<Vec<u8>> {
        let mut args: Vec<&str> = self.command.split(';').collect();
        args.extend(mime.split(';'));
        let Some((program, rest)) = args.split_first() else {
            return None;
        };

        let mut cmd = std::process::Command::new(program);
        cmd.args(rest)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if !request_url.is_empty() {
            cmd.env("REQUEST_URL", request_url);
        }

        let mut child = cmd.spawn().ok()?;
        {
            use std::io::Write;
            child.stdin.take()?.write_all(body).ok()?;
        }
        let output = child.wait_with_output().ok()?;
        if output.stdout.starts_with(b"20") {
            Some(output.stdout)
        } else {
            None
        }
    }
}

/// The mime filter hook registry: zero or more external-process hooks,
/// consulted in registration order, followed by the built-in filters.
pub struct MimeHooks {
    filters: Vec<FilterHook>,
}

impl MimeHooks {
    /// Parse `dir/mimehooks.txt`: groups of three non-empty lines
    /// (label, MIME regex, semicolon-joined command), blank lines
    /// otherwise ignored.
    #[must_use]
    pub fn load(dir: &Path) -> Self {
        let mut filters = Vec::new();
        if let Ok(contents) = std::fs::read_to_string(dir.join("mimehooks.txt")) {
            let mut pending: Vec<&str> = Vec::new();
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                pending.push(line);
                if pending.len() == 3 {
                    if let Ok(mime_regex) = Regex::new(&format!("(?i){}", pending[1])) {
                        filters.push(FilterHook {
                            label: pending[0].to_string(),
                            mime_regex,
                            command: pending[2].to_string(),
                        });
                    }
                    pending.clear();
                }
            }
        }
        Self { filters }
    }

    /// Human-readable summary of registered hooks, used by diagnostics
    /// pages.
    #[must_use]
    pub fn debug_info(&self) -> String {
        let mut out = String::new();
        for (i, hook) in self.filters.iter().enumerate() {
            out.push_str(&format!("### {i}: {}\n", hook.label));
            out.push_str(&format!("MIME regex:\n```\n{}\n```\n", hook.mime_regex.as_str()));
        }
        out
    }

    /// True if any hook (including a built-in) would run for `mime`.
    #[must_use]
    pub fn will_try_filter(&self, mime: &str) -> bool {
        self.filters.iter().any(|f| f.mime_regex.is_match(mime)) || atom_xml_pattern().is_match(mime)
    }
}

impl ResponseFilter for MimeHooks {
    fn try_filter(&self, mime: &str, body: &[u8], request_url: &str) -> Option<(String, Vec<u8>)> {
        for hook in &self.filters {
            if hook.mime_regex.is_match(mime) {
                if let Some(output) = hook.run(mime, body, request_url) {
                    if let Some(parsed) = parse_hook_output(&output) {
                        return Some(parsed);
                    }
                }
            }
        }

        if is_gempub(mime, request_url) {
            if let Some(page) = gempub_cover_page(body, request_url) {
                return Some(("text/gemini; charset=utf-8".to_string(), page.into_bytes()));
            }
        }

        if atom_xml_pattern().is_match(mime) {
            if let Some(page) = atom_to_gemini_feed(body) {
                return Some(("text/gemini".to_string(), page.into_bytes()));
            }
        }

        None
    }
}

fn atom_xml_pattern() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(application|text)/(atom\+)?xml").unwrap())
}

/// The header a hook's stdout must begin with is `"20 <mime>\r\n"`,
/// followed by the replacement body.
fn parse_hook_output(output: &[u8]) -> Option<(String, Vec<u8>)> {
    let crlf = output.windows(2).position(|w| w == b"\r\n")?;
    let header = std::str::from_utf8(&output[..crlf]).ok()?;
    let meta = header.get(2..)?.trim_start().to_string();
    Some((meta, output[crlf + 2..].to_vec()))
}

/// GemPub covers are only synthesized for local files, matching the
/// original's restriction to avoid running ZIP parsing on arbitrary
/// remote responses claiming the GemPub MIME type.
fn is_gempub(mime: &str, request_url: &str) -> bool {
    request_url.starts_with("file:") && mime.to_ascii_lowercase().starts_with(GEMPUB_MIME)
}

/// Build a cover page from a GemPub container's manifest: title/author
/// from `metadata.opf` if present, and a link to its `index.gmi`.
fn gempub_cover_page(source: &[u8], request_url: &str) -> Option<String> {
    let cursor = std::io::Cursor::new(source);
    let mut archive = zip::ZipArchive::new(cursor).ok()?;

    let manifest = read_zip_entry(&mut archive, "metadata.opf").or_else(|| read_zip_entry(&mut archive, "index.gmi"));
    let mut title = None;
    let mut author = None;
    if let Some(opf) = manifest.as_deref().filter(|s| s.contains("<metadata")) {
        if let Ok(doc) = roxmltree::Document::parse(opf) {
            title = doc
                .descendants()
                .find(|n| n.has_tag_name("title"))
                .and_then(|n| n.text())
                .map(str::to_string);
            author = doc
                .descendants()
                .find(|n| n.has_tag_name("creator"))
                .and_then(|n| n.text())
                .map(str::to_string);
        }
    }
    let title = title.unwrap_or_else(|| {
        Path::new(request_url.trim_start_matches("file://"))
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "GemPub".to_string())
    });

    let base = request_url.trim_end_matches('/');
    let mut page = format!("# {title}\n\n");
    if let Some(author) = author {
        page.push_str(&format!("By {author}\n\n"));
    }
    if read_zip_entry(&mut archive, "index.gmi").is_some() {
        page.push_str(&format!("=> {base}/index.gmi Start reading\n"));
    }
    Some(page)
}

fn read_zip_entry<R: std::io::Read + std::io::Seek>(archive: &mut zip::ZipArchive<R>, name: &str) -> Option<String> {
    let mut entry = archive.by_name(name).ok()?;
    let mut buf = String::new();
    entry.read_to_string(&mut buf).ok()?;
    Some(buf)
}

/// Translate an Atom feed document into a Gemini document: `# title`,
/// `## subtitle`, then one `=> url YYYY-MM-DD - title` line per entry
/// whose `updated`/`published` date parses.
fn atom_to_gemini_feed(source: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(source).ok()?;
    let doc = roxmltree::Document::parse(text).ok()?;
    let feed = doc.root_element();
    if feed.tag_name().name() != "feed" {
        return None;
    }

    let title = child_text(feed, "title")?;
    if title.trim().is_empty() {
        return None;
    }
    let subtitle = child_text(feed, "subtitle").unwrap_or_default();

    let mut out = format!("# {title}\n\n");
    if !subtitle.trim().is_empty() {
        out.push_str(&format!("## {subtitle}\n\n"));
    }
    out.push_str("Translated from an Atom feed.\n\n");

    let date_pattern = entry_date_pattern();
    for entry in feed.children().filter(|n| n.has_tag_name("entry")) {
        let Some(entry_title) = child_text(entry, "title") else { continue };
        if entry_title.trim().is_empty() {
            continue;
        }
        let updated = child_text(entry, "updated").unwrap_or_default();
        let published = child_text(entry, "published").unwrap_or_default();
        let date = date_pattern
            .captures(&updated)
            .or_else(|| date_pattern.captures(&published))
            .map(|c| c[1].to_string());
        let Some(date) = date else { continue };

        let mut url = None;
        for link in entry.children().filter(|n| n.has_tag_name("link")) {
            let href = link.attribute("href").unwrap_or_default();
            if href.to_ascii_lowercase().starts_with("gemini:") {
                url = Some(href.to_string());
                break;
            }
            if url.is_none() && !href.is_empty() {
                url = Some(href.to_string());
            }
        }
        let Some(url) = url else { continue };
        out.push_str(&format!("=> {url} {date} - {entry_title}\n"));
    }
    Some(out)
}

fn child_text(node: roxmltree::Node, name: &str) -> Option<String> {
    node.children().find(|n| n.has_tag_name(name)).and_then(|n| n.text()).map(str::to_string)
}

fn entry_date_pattern() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([0-9]{4}-[0-1][0-9]-[0-3][0-9])(T|\s)").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_feed_translates_entries_with_parseable_dates() {
        let xml = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Feed</title>
  <subtitle>A subtitle</subtitle>
  <entry>
    <title>First post</title>
    <updated>2024-03-01T12:00:00Z</updated>
    <link href="gemini://example.org/post1.gmi"/>
  </entry>
  <entry>
    <title>No date post</title>
    <link href="gemini://example.org/post2.gmi"/>
  </entry>
</feed>"#;
        let page = atom_to_gemini_feed(xml.as_bytes()).unwrap();
        assert!(page.contains("# Example Feed"));
        assert!(page.contains("## A subtitle"));
        assert!(page.contains("=> gemini://example.org/post1.gmi 2024-03-01 - First post"));
        assert!(!page.contains("No date post"));
    }

    #[test]
    fn non_feed_xml_yields_none() {
        assert!(atom_to_gemini_feed(b"<html></html>").is_none());
    }

    #[test]
    fn mime_hooks_load_parses_triplets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("mimehooks.txt"),
            "Markdown renderer\ntext/markdown\n/usr/bin/md2gemini\n",
        )
        .unwrap();
        let hooks = MimeHooks::load(dir.path());
        assert!(hooks.will_try_filter("text/markdown"));
        assert!(hooks.will_try_filter("application/atom+xml"));
        assert!(!hooks.will_try_filter("image/png"));
    }

    #[test]
    fn parses_hook_output_header() {
        let (meta, body) = parse_hook_output(b"20 text/gemini\r\nhello").unwrap();
        assert_eq!(meta, "text/gemini");
        assert_eq!(body, b"hello");
    }
}
