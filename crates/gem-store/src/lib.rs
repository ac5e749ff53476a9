//! Persistent stores backing the gem browser engine: TOFU trust
//! decisions, client identities, visit history, bookmarks, per-site
//! settings, the feed aggregator, and export/import bundles.
//!
//! Every store here follows the same shape: an in-memory collection
//! guarded by one [`std::sync::Mutex`], loaded once at startup from a
//! directory on disk, and saved back via a write-to-temp-then-rename
//! so a crash mid-write never corrupts the previous, valid file.

#![doc(html_root_url = "https://docs.rs/gem-store/2.0.0")]

pub mod bookmarks;
pub mod bundle;
mod error;
pub mod feeds;
#[cfg(feature = "identity-gen")]
pub mod identity;
pub mod sitespec;
pub mod trust;
pub mod visits;

pub use error::{StoreError, StoreResult};

use std::io::Write;
use std::path::Path;

/// Write `contents` to `path` atomically: write to a sibling temp file
/// then rename it over the destination.
pub(crate) fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let tmp_path = dir.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("save")
    ));
    {
        let mut f = std::fs::File::create(&tmp_path)?;
        f.write_all(contents)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
