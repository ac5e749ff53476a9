//! Export/import bundle: a zip archive holding every persisted store,
//! tagged with a small metadata entry so a file can be recognized as
//! one of these bundles before anything else is parsed.

use std::io::{Read, Seek, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::bookmarks::{Bookmarks, ImportMethod};
use crate::sitespec::SiteSpecStore;
use crate::trust::TrustStore;
use crate::visits::VisitLog;
use crate::{StoreError, StoreResult};

/// MIME type advertised for a bundle file.
pub const MIME_TYPE: &str = "application/gem-export+zip";

const METADATA_ENTRY: &str = "gem-export.ini";

/// Which categories to include when generating a bundle.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportFlags {
    pub bookmarks: bool,
    pub identities_and_trust: bool,
    pub site_spec: bool,
    pub visited: bool,
}

impl ExportFlags {
    /// Every category included.
    #[must_use]
    pub const fn everything() -> Self {
        Self {
            bookmarks: true,
            identities_and_trust: true,
            site_spec: true,
            visited: true,
        }
    }
}

/// Which categories to restore, and under what merge policy, when
/// importing a bundle. Each category is independent: a `Skip` leaves
/// that part of the profile untouched even if the bundle carries it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportPlan {
    pub bookmarks: ImportMethod,
    pub identities: ImportMethod,
    pub trusted: ImportMethod,
    pub visited: ImportMethod,
    pub site_spec: ImportMethod,
}

/// Write a bundle containing the requested stores to `writer`.
pub fn generate<W: Write + Seek>(
    writer: W,
    flags: ExportFlags,
    bookmarks: &Bookmarks,
    trust: &TrustStore,
    sitespec: &SiteSpecStore,
    visits: &VisitLog,
    idents_dir: Option<&Path>,
    app_version: &str,
) -> StoreResult<()> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    if flags.bookmarks {
        zip.start_file("bookmarks.ini", options).map_err(zip_err)?;
        zip.write_all(&bookmarks.serialize()).map_err(StoreError::Io)?;
    }
    if flags.identities_and_trust {
        zip.start_file("trusted.txt", options).map_err(zip_err)?;
        zip.write_all(&trust.serialize()).map_err(StoreError::Io)?;
        zip.start_file("idents.lgr", options).map_err(zip_err)?;
        zip.write_all(b"").map_err(StoreError::Io)?;
        if let Some(dir) = idents_dir {
            if let Ok(read_dir) = std::fs::read_dir(dir) {
                for entry in read_dir.flatten() {
                    let name = entry.file_name();
                    let name = name.to_string_lossy();
                    if name.starts_with('.') {
                        continue;
                    }
                    if !(name.ends_with(".crt") || name.ends_with(".key")) {
                        continue;
                    }
                    let bytes = std::fs::read(entry.path()).map_err(StoreError::Io)?;
                    zip.start_file(format!("idents/{name}"), options).map_err(zip_err)?;
                    zip.write_all(&bytes).map_err(StoreError::Io)?;
                }
            }
        }
    }
    if flags.site_spec {
        zip.start_file("sitespec.ini", options).map_err(zip_err)?;
        zip.write_all(&sitespec.serialize()).map_err(StoreError::Io)?;
    }
    if flags.visited {
        zip.start_file("visited.txt", options).map_err(zip_err)?;
        zip.write_all(&visits.serialize()).map_err(StoreError::Io)?;
    }

    zip.start_file(METADATA_ENTRY, options).map_err(zip_err)?;
    let meta = format!("# gem browser user data export\nversion = {app_version:?}\ntimestamp = {}\n", now_unix());
    zip.write_all(meta.as_bytes()).map_err(StoreError::Io)?;
    zip.finish().map_err(zip_err)?;
    Ok(())
}

/// True if `reader` looks like one of our bundles: it carries the
/// metadata entry.
pub fn detect<R: Read + Seek>(reader: R) -> bool {
    match ZipArchive::new(reader) {
        Ok(mut archive) => archive.by_name(METADATA_ENTRY).is_ok(),
        Err(_) => false,
    }
}

/// Restore selected categories from a bundle into the given stores.
/// Each field of `plan` is evaluated independently.
pub fn import<R: Read + Seek>(
    reader: R,
    plan: ImportPlan,
    bookmarks: &Bookmarks,
    trust: &TrustStore,
    sitespec: &SiteSpecStore,
    visits: &VisitLog,
    idents_dir: Option<&Path>,
) -> StoreResult<()> {
    let mut archive = ZipArchive::new(reader).map_err(zip_err)?;

    if plan.bookmarks != ImportMethod::Skip {
        if let Some(contents) = read_entry(&mut archive, "bookmarks.ini") {
            bookmarks.import(&contents, plan.bookmarks)?;
        }
    }
    if plan.trusted != ImportMethod::Skip {
        if let Some(contents) = read_entry(&mut archive, "trusted.txt") {
            trust.import(&contents, plan.trusted)?;
        }
    }
    if plan.identities != ImportMethod::Skip {
        if let Some(dir) = idents_dir {
            std::fs::create_dir_all(dir).map_err(StoreError::Io)?;
            if plan.identities == ImportMethod::Replace {
                if let Ok(read_dir) = std::fs::read_dir(dir) {
                    for entry in read_dir.flatten() {
                        let name = entry.file_name();
                        let name = name.to_string_lossy();
                        if name.ends_with(".crt") || name.ends_with(".key") {
                            let _ = std::fs::remove_file(entry.path());
                        }
                    }
                }
            }
            let names: Vec<String> = archive
                .file_names()
                .filter(|n| n.starts_with("idents/"))
                .map(String::from)
                .collect();
            for name in names {
                let base = name.trim_start_matches("idents/");
                let dest = dir.join(base);
                if plan.identities != ImportMethod::IfMissing || !dest.exists() {
                    if let Ok(mut entry) = archive.by_name(&name) {
                        let mut bytes = Vec::new();
                        entry.read_to_end(&mut bytes).map_err(StoreError::Io)?;
                        std::fs::write(&dest, bytes).map_err(StoreError::Io)?;
                    }
                }
            }
        }
        // `idents.lgr` is parsed by the identity store once it registers the
        // freshly-written .crt/.key pairs above; nothing else to do here.
    }
    if plan.visited != ImportMethod::Skip {
        if let Some(contents) = read_entry(&mut archive, "visited.txt") {
            visits.import(&contents, plan.visited)?;
        }
    }
    if plan.site_spec != ImportMethod::Skip {
        if let Some(contents) = read_entry(&mut archive, "sitespec.ini") {
            sitespec.import(&contents, plan.site_spec)?;
        }
    }
    Ok(())
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<String> {
    let mut entry = archive.by_name(name).ok()?;
    let mut contents = String::new();
    entry.read_to_string(&mut contents).ok()?;
    Some(contents)
}

fn zip_err(err: zip::result::ZipError) -> StoreError {
    StoreError::Archive(err.to_string())
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn detects_bundle_by_metadata_entry() {
        let mut buf = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(&mut buf);
        zip.start_file(METADATA_ENTRY, SimpleFileOptions::default()).unwrap();
        zip.write_all(b"version = \"test\"\n").unwrap();
        zip.finish().unwrap();
        buf.set_position(0);
        assert!(detect(buf));
    }

    #[test]
    fn rejects_non_bundle_zip() {
        let mut buf = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(&mut buf);
        zip.start_file("unrelated.txt", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"hi").unwrap();
        zip.finish().unwrap();
        buf.set_position(0);
        assert!(!detect(buf));
    }

    #[test]
    fn round_trips_bookmarks_through_a_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let bookmarks = Bookmarks::load(dir.path());
        bookmarks.add("gemini://example.org/", "Example", "", 0, 0);
        let trust = TrustStore::load(dir.path());
        let sitespec = SiteSpecStore::load(dir.path());
        let visits = VisitLog::load(dir.path());

        let mut buf = Cursor::new(Vec::new());
        generate(
            &mut buf,
            ExportFlags { bookmarks: true, ..Default::default() },
            &bookmarks,
            &trust,
            &sitespec,
            &visits,
            None,
            "test",
        )
        .unwrap();
        buf.set_position(0);

        let dir2 = tempfile::tempdir().unwrap();
        let bookmarks2 = Bookmarks::load(dir2.path());
        let trust2 = TrustStore::load(dir2.path());
        let sitespec2 = SiteSpecStore::load(dir2.path());
        let visits2 = VisitLog::load(dir2.path());
        import(
            buf,
            ImportPlan { bookmarks: ImportMethod::All, ..Default::default() },
            &bookmarks2,
            &trust2,
            &sitespec2,
            &visits2,
            None,
        )
        .unwrap();
        assert_eq!(bookmarks2.list(None).len(), 1);
    }
}
