//! `about:`, `file:` and `data:` scheme handling.
//!
//! None of these schemes involve a network round trip, so each is
//! resolved synchronously into a finished [`Response`] body.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::Utc;
use gem_core::{status::GmStatusCode, types::Response};

use crate::error::{NetError, NetResult};

const DEFAULT_GEMINI_MIME: &str = "text/gemini; charset=utf-8";

/// Resolve an `about:<page>[?query]` URL.
pub fn about(path: &str, query: Option<&str>) -> Response {
    let mut resp = Response::new(Utc::now());
    match gem_core::resources::page(path, query) {
        Some(body) => {
            resp.status_code = Some(GmStatusCode::Success);
            resp.meta = DEFAULT_GEMINI_MIME.to_string();
            resp.body = body.into_bytes();
        }
        None => {
            resp.status_code = Some(GmStatusCode::InvalidLocalResource);
            resp.meta = format!("no such page: about:{path}");
        }
    }
    resp
}

/// Resolve a `data:<mime>[;base64],<payload>` URL. `raw` is everything
/// after the `data:` prefix.
pub fn data(raw: &str) -> NetResult<Response> {
    let mut resp = Response::new(Utc::now());
    let comma = raw.find(',').ok_or(NetError::InvalidDataUrl)?;
    let header = &raw[..comma];
    let payload = &raw[comma + 1..];
    let is_base64 = header.split(';').any(|seg| seg.eq_ignore_ascii_case("base64"));
    let mime = header
        .split(';')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("text/plain;charset=US-ASCII");

    let body = if is_base64 {
        use base64::Engine;
        tolerant_base64().decode(payload.trim()).map_err(|_| NetError::InvalidDataUrl)?
    } else {
        percent_encoding::percent_decode_str(payload).collect()
    };

    resp.status_code = Some(GmStatusCode::Success);
    resp.meta = mime.to_string();
    resp.body = body;
    Ok(resp)
}

/// Standard-alphabet base64 with optional padding: real `data:` URLs
/// in the wild are inconsistent about trailing `=`.
fn tolerant_base64() -> &'static base64::engine::GeneralPurpose {
    use base64::engine::{general_purpose::GeneralPurposeConfig, DecodePaddingMode, GeneralPurpose};
    static ENGINE: std::sync::OnceLock<GeneralPurpose> = std::sync::OnceLock::new();
    ENGINE.get_or_init(|| {
        let config = GeneralPurposeConfig::new()
            .with_decode_padding_mode(DecodePaddingMode::Indifferent)
            .with_encode_padding(false);
        GeneralPurpose::new(&base64::alphabet::STANDARD, config)
    })
}

/// Convert a `file://` URL's path component into a local filesystem
/// path, percent-decoding as we go.
#[must_use]
pub fn local_path_from_url(path: &str) -> PathBuf {
    let decoded: Vec<u8> = percent_encoding::percent_decode_str(path).collect();
    PathBuf::from(String::from_utf8_lossy(&decoded).into_owned())
}

/// Resolve a `file:` URL. `url_string` is the full canonicalized URL,
/// used to build link targets in synthesized index pages.
pub fn file(path: &str, url_string: &str) -> NetResult<Response> {
    let mut resp = Response::new(Utc::now());
    let local = local_path_from_url(path);

    if local.is_dir() {
        resp.status_code = Some(GmStatusCode::Success);
        resp.meta = "text/gemini".to_string();
        resp.body = directory_index(&local, url_string)?.into_bytes();
        return Ok(resp);
    }

    match std::fs::File::open(&local) {
        Ok(mut f) => {
            let mut buf = Vec::new();
            f.read_to_end(&mut buf)?;
            resp.status_code = Some(GmStatusCode::Success);
            resp.meta = mime_guess::from_path(&local)
                .first()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());
            resp.body = buf;
            Ok(resp)
        }
        Err(_) => {
            // Might live inside a ZIP archive being treated as a virtual
            // filesystem: walk up the path looking for a file that opens
            // as an archive.
            if let Some((archive_path, entry_path)) = find_container_archive(&local) {
                zip_entry(&archive_path, &entry_path, url_string)
            } else {
                Err(NetError::LocalResource(local.display().to_string()))
            }
        }
    }
}

fn directory_index(dir: &Path, url_string: &str) -> NetResult<String> {
    let mut page = String::new();
    page.push_str(&format!(
        "# {}\n",
        dir.file_name().and_then(|n| n.to_str()).unwrap_or("/")
    ));
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let trailing = if is_dir { "/" } else { "" };
        page.push_str(&format!(
            "=> {}/{name}{trailing} {name}{trailing}\n",
            url_string.trim_end_matches('/')
        ));
    }
    Ok(page)
}

/// Walk up `path`'s ancestors looking for the first component that is
/// itself an openable file (i.e. a ZIP archive being traversed as a
/// directory). Returns `(archive_path, entry_path_within_archive)`.
fn find_container_archive(path: &Path) -> Option<(PathBuf, String)> {
    let mut ancestor = path;
    let mut tail: Vec<String> = Vec::new();
    loop {
        if ancestor.is_file() {
            let entry_path = tail.into_iter().rev().collect::<Vec<_>>().join("/");
            return Some((ancestor.to_path_buf(), entry_path));
        }
        let file_name = ancestor.file_name()?.to_string_lossy().into_owned();
        tail.push(file_name);
        ancestor = ancestor.parent()?;
    }
}

fn zip_entry(archive_path: &Path, entry_path: &str, url_string: &str) -> NetResult<Response> {
    let mut resp = Response::new(Utc::now());
    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| NetError::Archive(e.to_string()))?;

    if entry_path.is_empty() || entry_path.ends_with('/') {
        // Directory listing within the archive.
        let prefix = entry_path;
        let mut names: Vec<String> = Vec::new();
        for i in 0..archive.len() {
            let entry = archive
                .by_index(i)
                .map_err(|e| NetError::Archive(e.to_string()))?;
            let name = entry.name();
            if let Some(rel) = name.strip_prefix(prefix) {
                if !rel.is_empty() {
                    let top = rel.split('/').next().unwrap_or(rel);
                    let display = if rel.contains('/') {
                        format!("{top}/")
                    } else {
                        top.to_string()
                    };
                    if !names.contains(&display) {
                        names.push(display);
                    }
                }
            }
        }
        names.sort();
        let mut page = format!(
            "# {}\n\n",
            archive_path.file_name().and_then(|n| n.to_str()).unwrap_or("archive")
        );
        for name in names {
            page.push_str(&format!("=> {}/{name} {name}\n", url_string.trim_end_matches('/')));
        }
        resp.status_code = Some(GmStatusCode::Success);
        resp.meta = DEFAULT_GEMINI_MIME.to_string();
        resp.body = page.into_bytes();
        return Ok(resp);
    }

    let mut entry = archive
        .by_name(entry_path)
        .map_err(|_| NetError::LocalResource(entry_path.to_string()))?;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf)?;
    resp.status_code = Some(GmStatusCode::Success);
    resp.meta = mime_guess::from_path(entry_path)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string());
    resp.body = buf;
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn about_unknown_page_reports_invalid_resource() {
        let resp = about("nonexistent", None);
        assert_eq!(resp.status_code, Some(GmStatusCode::InvalidLocalResource));
    }

    #[test]
    fn about_known_page_succeeds() {
        let resp = about("about", None);
        assert_eq!(resp.status_code, Some(GmStatusCode::Success));
    }

    #[test]
    fn data_url_plain_text() {
        let resp = data("text/plain,hello%20world").unwrap();
        assert_eq!(resp.body, b"hello world");
        assert_eq!(resp.meta, "text/plain");
    }

    #[test]
    fn data_url_base64() {
        let resp = data("application/octet-stream;base64,aGVsbG8=").unwrap();
        assert_eq!(resp.body, b"hello");
    }

    #[test]
    fn data_url_missing_comma_errors() {
        assert!(data("text/plain").is_err());
    }

    #[test]
    fn file_reads_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.gmi"), b"# hi\n").unwrap();
        let url_path = dir.path().join("a.gmi").to_string_lossy().into_owned();
        let resp = file(&url_path, "file:///a.gmi").unwrap();
        assert_eq!(resp.body, b"# hi\n");
    }

    #[test]
    fn file_lists_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.gmi"), b"hi").unwrap();
        let url_path = dir.path().to_string_lossy().into_owned();
        let resp = file(&url_path, "file:///dir").unwrap();
        let body = String::from_utf8(resp.body).unwrap();
        assert!(body.contains("a.gmi"));
    }
}
