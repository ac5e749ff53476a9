//! Gemini-flavored URL parsing and canonicalization.
//!
//! This does not delegate to the `url` crate: its normalization rules
//! (default-port elision, empty-path-to-`/` for `gemini:`/`titan:`/
//! `spartan:`/`guppy:`, percent-encoding non-ASCII path/query bytes
//! while leaving everything already percent-encoded untouched) are
//! specific enough to this family of protocols that no published crate
//! implements them as written.

use std::fmt;

use percent_encoding::{AsciiSet, CONTROLS};

use crate::error::{Error, Result};

/// Bytes a path/query component is escaped against: ASCII control
/// characters plus (implicitly, since `percent_encoding` always
/// escapes them) anything outside ASCII. Reserved and unreserved ASCII
/// bytes, including an existing `%`, are left alone — so a `%XX`
/// escape already present in the input survives byte-for-byte.
const PATH_QUERY_ESCAPES: &AsciiSet = &CONTROLS;

/// Percent-encode every byte of `input` that isn't a safe ASCII byte,
/// i.e. every non-ASCII UTF-8 byte and ASCII control character. This is
/// the exclusion-set percent-encoder named by the URL module's
/// operations: callers needing a different exclusion set can add bytes
/// to a custom [`AsciiSet`] the same way [`PATH_QUERY_ESCAPES`] does.
#[must_use]
pub fn percent_encode_non_ascii(input: &str) -> String {
    percent_encoding::utf8_percent_encode(input, PATH_QUERY_ESCAPES).to_string()
}

/// A parsed, canonicalizable small-internet URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GemUrl {
    scheme: String,
    userinfo: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: String,
    query: Option<String>,
    fragment: Option<String>,
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "gemini" => Some(1965),
        "titan" => Some(1965),
        "gopher" => Some(70),
        "finger" => Some(79),
        "spartan" => Some(300),
        "guppy" => Some(7906),
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

fn has_authority(scheme: &str) -> bool {
    matches!(
        scheme,
        "gemini" | "titan" | "gopher" | "finger" | "spartan" | "guppy" | "http" | "https"
    )
}

impl GemUrl {
    /// Parse a URL, applying canonicalization immediately.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let colon = input
            .find(':')
            .ok_or_else(|| Error::InvalidUrl(input.to_string()))?;
        let scheme = input[..colon].to_ascii_lowercase();
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
            return Err(Error::InvalidUrl(input.to_string()));
        }
        let mut rest = &input[colon + 1..];

        let (userinfo, host, port, path_start) = if has_authority(&scheme) && rest.starts_with("//")
        {
            rest = &rest[2..];
            let authority_end = rest
                .find(['/', '?', '#'])
                .unwrap_or(rest.len());
            let authority = &rest[..authority_end];
            let (userinfo, hostport) = match authority.rsplit_once('@') {
                Some((u, h)) => (Some(u.to_string()), h),
                None => (None, authority),
            };
            let (host, port) = if let Some(bracket_end) = hostport.strip_prefix('[') {
                let end = bracket_end
                    .find(']')
                    .ok_or_else(|| Error::InvalidUrl(input.to_string()))?;
                let host = format!("[{}]", &bracket_end[..end]);
                let rest_hp = &bracket_end[end + 1..];
                let port = rest_hp
                    .strip_prefix(':')
                    .map(|p| p.parse::<u16>().map_err(|_| Error::InvalidUrl(input.to_string())))
                    .transpose()?;
                (Some(host), port)
            } else {
                match hostport.rsplit_once(':') {
                    Some((h, p)) if !h.is_empty() && p.chars().all(|c| c.is_ascii_digit()) && !p.is_empty() => {
                        let port = p
                            .parse::<u16>()
                            .map_err(|_| Error::InvalidUrl(input.to_string()))?;
                        (Some(h.to_string()), Some(port))
                    }
                    _ => (
                        if hostport.is_empty() {
                            None
                        } else {
                            Some(hostport.to_string())
                        },
                        None,
                    ),
                }
            };
            (userinfo, host, port, authority_end)
        } else {
            (None, None, None, 0)
        };
        rest = &rest[path_start..];

        let (path_and_rest, fragment) = match rest.split_once('#') {
            Some((p, f)) => (p, Some(f.to_string())),
            None => (rest, None),
        };
        let (path, query) = match path_and_rest.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path_and_rest.to_string(), None),
        };

        let mut url = Self {
            scheme,
            userinfo,
            host: host.map(|h| h.to_ascii_lowercase()),
            port,
            path,
            query,
            fragment,
        };
        url.canonicalize();
        Ok(url)
    }

    fn canonicalize(&mut self) {
        if self.port == default_port(&self.scheme) {
            self.port = None;
        }
        if has_authority(&self.scheme) && self.host.is_some() && self.path.is_empty() {
            self.path = "/".to_string();
        }
        if let Some(host) = &self.host {
            if !host.starts_with('[') {
                if let Ok(ascii) = idna::domain_to_ascii(host) {
                    self.host = Some(ascii);
                }
            }
        }
        self.path = percent_encode_non_ascii(&self.path);
        if let Some(query) = &self.query {
            self.query = Some(percent_encode_non_ascii(query));
        }
    }

    /// The scheme, lowercased.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The host, Punycode-encoded and lowercased, if the scheme has an
    /// authority component.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The explicit port, or `None` if it equals (or was omitted and
    /// defaults to) the scheme's default port.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    /// The effective port: explicit, or the scheme's default.
    #[must_use]
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or_else(|| default_port(&self.scheme))
    }

    /// The path component; always `/`-prefixed once there's an authority.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The raw query string, without the leading `?`.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// The raw fragment, without the leading `#`.
    #[must_use]
    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// Returns a copy of this URL with any fragment removed.
    #[must_use]
    pub fn fragment_stripped(&self) -> Self {
        let mut url = self.clone();
        url.fragment = None;
        url
    }

    /// Returns a copy of this URL with a new fragment attached.
    #[must_use]
    pub fn with_fragment(&self, fragment: &str) -> Self {
        let mut url = self.clone();
        url.fragment = Some(
            percent_encoding::utf8_percent_encode(
                fragment,
                percent_encoding::NON_ALPHANUMERIC,
            )
            .to_string(),
        );
        url
    }

    /// `scheme://host[:port]` with no path, query, or fragment.
    #[must_use]
    pub fn root(&self) -> String {
        let mut s = format!("{}://", self.scheme);
        if let Some(host) = &self.host {
            s.push_str(host);
        }
        if let Some(port) = self.port {
            s.push(':');
            s.push_str(&port.to_string());
        }
        s
    }

    /// Resolve `relative` against `self` acting as the base URL.
    pub fn absoluteize(&self, relative: &str) -> Result<Self> {
        let relative = relative.trim();
        if relative.contains(':')
            && relative
                .split(':')
                .next()
                .is_some_and(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+'))
            && Self::parse(relative).is_ok()
        {
            return Self::parse(relative);
        }
        if let Some(stripped) = relative.strip_prefix("//") {
            return Self::parse(&format!("{}://{}", self.scheme, stripped));
        }
        let mut result = self.clone();
        result.query = None;
        result.fragment = None;
        if let Some(frag) = relative.strip_prefix('#') {
            result.fragment = Some(frag.to_string());
            return Ok(result);
        }
        if let Some(q) = relative.strip_prefix('?') {
            result.query = Some(q.to_string());
            return Ok(result);
        }
        if relative.is_empty() {
            return Ok(self.clone());
        }
        let (rel_path, rel_query_frag) = match relative.find(['?', '#']) {
            Some(idx) => (&relative[..idx], &relative[idx..]),
            None => (relative, ""),
        };
        let new_path = if rel_path.starts_with('/') {
            rel_path.to_string()
        } else {
            let base_dir = match self.path.rfind('/') {
                Some(idx) => &self.path[..=idx],
                None => "/",
            };
            normalize_path(&format!("{base_dir}{rel_path}"))
        };
        let mut full = format!("{}://", result.scheme);
        if let Some(host) = &result.host {
            full.push_str(host);
        }
        if let Some(port) = result.port {
            full.push(':');
            full.push_str(&port.to_string());
        }
        full.push_str(&new_path);
        full.push_str(rel_query_frag);
        Self::parse(&full)
    }
}

fn normalize_path(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
    }
    format!("/{}", out.join("/"))
}

impl fmt::Display for GemUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root())?;
        write!(f, "{}", self.path)?;
        if let Some(q) = &self.query {
            write!(f, "?{q}")?;
        }
        if let Some(frag) = &self.fragment {
            write!(f, "#{frag}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_default_port() {
        let url = GemUrl::parse("gemini://example.org:1965/foo").unwrap();
        assert_eq!(url.port(), None);
        assert_eq!(url.to_string(), "gemini://example.org/foo");
    }

    #[test]
    fn empty_path_becomes_slash() {
        let url = GemUrl::parse("gemini://example.org").unwrap();
        assert_eq!(url.path(), "/");
    }

    #[test]
    fn keeps_nondefault_port() {
        let url = GemUrl::parse("gemini://example.org:1966/foo").unwrap();
        assert_eq!(url.port(), Some(1966));
    }

    #[test]
    fn root_extraction() {
        let url = GemUrl::parse("gemini://example.org/a/b?q#f").unwrap();
        assert_eq!(url.root(), "gemini://example.org");
    }

    #[test]
    fn absoluteize_relative_path() {
        let base = GemUrl::parse("gemini://example.org/a/b/").unwrap();
        let resolved = base.absoluteize("c/d").unwrap();
        assert_eq!(resolved.to_string(), "gemini://example.org/a/b/c/d");
    }

    #[test]
    fn absoluteize_parent_path() {
        let base = GemUrl::parse("gemini://example.org/a/b/").unwrap();
        let resolved = base.absoluteize("../c").unwrap();
        assert_eq!(resolved.to_string(), "gemini://example.org/a/c");
    }

    #[test]
    fn absoluteize_absolute_url() {
        let base = GemUrl::parse("gemini://example.org/a/").unwrap();
        let resolved = base.absoluteize("titan://example.org/upload").unwrap();
        assert_eq!(resolved.scheme(), "titan");
    }

    #[test]
    fn fragment_stripped_round_trip() {
        let url = GemUrl::parse("gemini://example.org/a#section").unwrap();
        assert_eq!(url.fragment(), Some("section"));
        assert_eq!(url.fragment_stripped().to_string(), "gemini://example.org/a");
    }

    #[test]
    fn punycode_host() {
        let url = GemUrl::parse("gemini://exämple.org/").unwrap();
        assert!(url.host().unwrap().starts_with("xn--"));
    }

    #[test]
    fn percent_encodes_non_ascii_path() {
        let url = GemUrl::parse("gemini://example.org/café").unwrap();
        assert_eq!(url.path(), "/caf%C3%A9");
        assert_eq!(url.to_string(), "gemini://example.org/caf%C3%A9");
    }

    #[test]
    fn percent_encodes_non_ascii_query() {
        let url = GemUrl::parse("gemini://example.org/search?q=café").unwrap();
        assert_eq!(url.query(), Some("q=caf%C3%A9"));
    }

    #[test]
    fn already_encoded_path_is_preserved_bit_for_bit() {
        let url = GemUrl::parse("gemini://example.org/caf%C3%A9").unwrap();
        assert_eq!(url.path(), "/caf%C3%A9");
    }
}
