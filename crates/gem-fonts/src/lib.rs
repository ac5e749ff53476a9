//! Font-pack registry: archive/directory driven font catalog with style
//! sharing, tuning overrides, and remote codepoint-coverage search.

mod cmap;
mod error;
mod manifest;
mod registry;
mod size;

pub use cmap::{by_path, matching_paths, parse as parse_cmap, CoverageEntry};
pub use error::{FontError, Result};
pub use manifest::{parse as parse_manifest, Manifest, RawSpec, StyleFileRef};
pub use registry::{discover, load_dir, load_zip, Registry, ResolvedSpec};
pub use size::{FontSize, DOCUMENT_CALIBRATION, UI_CALIBRATION};

pub use gem_core::{FontFile, FontPack, FontSpec, FontSpecFlags, FontStyle};
