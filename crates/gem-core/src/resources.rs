//! Read-only bundle of embedded `about:` pages.
//!
//! Pages are plain `text/gemini` source with `${name}` placeholders
//! resolved at lookup time: `${APP_VERSION}` expands to the crate
//! version, everything else is looked up in a small built-in
//! translation table (callers needing real localization can layer
//! their own `lang` table in front of [`page`]).

use std::collections::HashMap;
use std::sync::OnceLock;

/// The application version substituted for `${APP_VERSION}`.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const ABOUT: &str = "# About\n\n\
This is gem, a small-internet browser engine for Gemini, Titan, Gopher, \
Finger, Spartan and Guppy.\n\n\
=> about:lagrange What's in a name?\n\
=> about:help Help\n\
=> about:license License\n\
=> about:version Version ${APP_VERSION}\n";

const LAGRANGE: &str = "# gem\n\n\
Version ${APP_VERSION}.\n\n\
Powered by ${TLS_LIBRARY}.\n";

const HELP: &str = "# Help\n\n\
## Navigating\n\n\
Enter a URL, or follow a link line (lines beginning with \"=>\").\n\n\
## Identities\n\n\
Generate or import a client certificate under an identity, then sign in \
to present it automatically on matching URLs.\n\n\
## Bookmarks\n\n\
Bookmark pages for quick access; organize them into folders, or tag one \
${tag.home} or ${tag.subscribed}.\n";

const LICENSE: &str = "# License\n\n\
Licensed under the terms stated in the project repository.\n";

const VERSION: &str = "# Version ${APP_VERSION}\n\n\
See about:lagrange for more.\n";

const BLANK: &str = "\n";

fn pages() -> &'static HashMap<&'static str, &'static str> {
    static PAGES: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    PAGES.get_or_init(|| {
        let mut map = HashMap::new();
        map.insert("about", ABOUT);
        map.insert("lagrange", LAGRANGE);
        map.insert("help", HELP);
        map.insert("license", LICENSE);
        map.insert("version", VERSION);
        map.insert("blank", BLANK);
        map
    })
}

/// Translate a single `${name}` token. Falls back to leaving the token
/// as a bracketed tag if nothing matches, so a missing string is
/// visibly wrong rather than silently empty.
fn translate(name: &str) -> String {
    match name {
        "APP_VERSION" => APP_VERSION.to_string(),
        "TLS_LIBRARY" => "rustls".to_string(),
        "tag.home" => "Home".to_string(),
        "tag.subscribed" => "Subscribed".to_string(),
        other => format!("[{other}]"),
    }
}

/// Expand every `${name}` placeholder in `source`.
#[must_use]
pub fn expand_variables(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                out.push_str(&translate(&after[..end]));
                rest = &after[end + 1..];
            }
            None => {
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Look up the embedded page named `path` (the part of an `about:`
/// URL after the scheme), with variables expanded. `query` is
/// currently unused by any built-in page but is accepted so callers
/// can pass it straight through from the URL.
#[must_use]
pub fn page(path: &str, _query: Option<&str>) -> Option<String> {
    pages()
        .get(path.to_ascii_lowercase().as_str())
        .map(|src| expand_variables(src))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_variable() {
        let out = expand_variables("v${APP_VERSION}");
        assert_eq!(out, format!("v{APP_VERSION}"));
    }

    #[test]
    fn unknown_variable_becomes_bracketed_tag() {
        assert_eq!(expand_variables("${nonexistent.key}"), "[nonexistent.key]");
    }

    #[test]
    fn looks_up_known_page_case_insensitively() {
        assert!(page("ABOUT", None).unwrap().contains("About"));
        assert!(page("nosuchpage", None).is_none());
    }

    #[test]
    fn blank_page_is_single_newline() {
        assert_eq!(page("blank", None).unwrap(), "\n");
    }
}
