//! Command-line argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::output::OutputFormat;

/// Command-line client for the gem Gemini-family browser engine.
///
/// Fetch Gemini/Titan/Gopher/Finger/Spartan/Guppy URLs, manage
/// bookmarks, client identities, TOFU trust, feed subscriptions and
/// font packs.
#[derive(Parser, Debug)]
#[command(name = "gem")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Profile directory override (defaults to the platform data dir)
    #[arg(long, global = true, env = "GEM_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    /// Increase verbosity
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch a single URL and print the response
    Fetch(FetchArgs),

    /// Manage bookmarks and folders
    Bookmarks(BookmarksArgs),

    /// Manage client TLS identities
    Identity(IdentityArgs),

    /// Inspect or forget TOFU trust entries
    Trust(TrustArgs),

    /// Inspect the visit history log
    Visits(VisitsArgs),

    /// Poll subscribed feeds and list unread entries
    Feeds(FeedsArgs),

    /// List installed font packs
    Fonts(FontsArgs),

    /// Export the profile to a zip bundle
    Export(ExportArgs),

    /// Import a profile bundle
    Import(ImportArgs),

    /// Start an interactive shell
    Shell,

    /// Manage CLI configuration
    Config(ConfigArgs),
}

// ============================================================================
// Fetch command
// ============================================================================

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// URL to fetch, e.g. gemini://gemini.circumlunar.space/
    pub url: String,

    /// Fingerprint (or fuzzy common-name match) of the client identity
    /// to present
    #[arg(short, long)]
    pub identity: Option<String>,

    /// Write the response body to this file instead of stdout
    #[arg(short = 'O', long)]
    pub output_file: Option<PathBuf>,

    /// Open the result in the system's default browser instead of
    /// printing it (only meaningful for `file:`/`about:` results)
    #[arg(long)]
    pub open: bool,
}

// ============================================================================
// Bookmarks command
// ============================================================================

#[derive(Args, Debug)]
pub struct BookmarksArgs {
    #[command(subcommand)]
    pub command: BookmarksCommands,
}

#[derive(Subcommand, Debug)]
pub enum BookmarksCommands {
    /// Add a bookmark
    Add {
        /// Target URL
        url: String,
        /// Display title
        #[arg(short, long, default_value = "")]
        title: String,
        /// Space-separated tags
        #[arg(long, default_value = "")]
        tags: String,
        /// Parent folder id (0 = root)
        #[arg(long, default_value_t = 0)]
        parent: u32,
    },
    /// Add a folder
    Mkdir {
        /// Folder title
        title: String,
        /// Parent folder id (0 = root)
        #[arg(long, default_value_t = 0)]
        parent: u32,
    },
    /// Remove a bookmark or folder (recursively, for folders)
    Remove {
        /// Bookmark id
        id: u32,
    },
    /// List bookmarks under a folder
    List {
        /// Parent folder id (0 = root); omit to list every bookmark
        #[arg(long)]
        parent: Option<u32>,
    },
    /// Find the bookmark for a URL, if any
    Find {
        /// URL to look up
        url: String,
    },
    /// Subscribe a bookmark to the feed aggregator
    Subscribe {
        /// Bookmark id
        id: u32,
        /// Also track `#` heading lines as entries
        #[arg(long)]
        headings: bool,
    },
}

// ============================================================================
// Identity command
// ============================================================================

#[derive(Args, Debug)]
pub struct IdentityArgs {
    #[command(subcommand)]
    pub command: IdentityCommands,
}

#[derive(Subcommand, Debug)]
pub enum IdentityCommands {
    /// Generate a new self-signed identity
    New {
        /// Common name (CN)
        common_name: String,
        /// Subject alternative DNS name
        #[arg(long)]
        domain: Option<String>,
        /// Subject alternative email
        #[arg(long)]
        email: Option<String>,
        /// Don't persist the identity to disk
        #[arg(long)]
        temporary: bool,
    },
    /// List every stored identity
    List,
    /// Delete an identity by fingerprint (accepts a fuzzy match)
    Delete {
        /// Fingerprint hex, or a substring of the common name
        identity: String,
    },
    /// Present an identity for every request under a URL prefix
    SignIn {
        /// Fingerprint hex, or a substring of the common name
        identity: String,
        /// URL prefix
        url: String,
    },
    /// Stop presenting any identity for a URL prefix
    SignOut {
        /// URL prefix
        url: String,
    },
}

// ============================================================================
// Trust command
// ============================================================================

#[derive(Args, Debug)]
pub struct TrustArgs {
    #[command(subcommand)]
    pub command: TrustCommands,
}

#[derive(Subcommand, Debug)]
pub enum TrustCommands {
    /// List every TOFU trust entry
    List,
    /// Forget a stored entry
    Remove {
        /// The `host;port` key, as printed by `gem trust list`
        key: String,
    },
}

// ============================================================================
// Visits command
// ============================================================================

#[derive(Args, Debug)]
pub struct VisitsArgs {
    /// How many most-recent visits to show
    #[arg(long, default_value_t = 50)]
    pub count: usize,
}

// ============================================================================
// Feeds command
// ============================================================================

#[derive(Args, Debug)]
pub struct FeedsArgs {
    #[command(subcommand)]
    pub command: FeedsCommands,
}

#[derive(Subcommand, Debug)]
pub enum FeedsCommands {
    /// Poll every subscribed bookmark once
    Refresh,
    /// List stored entries for a source bookmark
    List {
        /// Source bookmark id
        source: u32,
        /// Only show unread entries
        #[arg(long)]
        unread_only: bool,
    },
}

// ============================================================================
// Fonts command
// ============================================================================

#[derive(Args, Debug)]
pub struct FontsArgs {
    /// Directories to scan for font packs (zip files or unpacked
    /// directories); may be given more than once
    #[arg(long = "dir")]
    pub dirs: Vec<PathBuf>,
}

// ============================================================================
// Export / import commands
// ============================================================================

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output bundle path
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Bundle path to import
    pub path: PathBuf,
    /// Import method applied to every category
    #[arg(long, value_enum, default_value_t = ImportMethodArg::IfMissing)]
    pub method: ImportMethodArg,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMethodArg {
    /// Only import items whose URL/key doesn't already exist
    IfMissing,
    /// Import everything, reparenting/overwriting duplicates
    All,
    /// Discard the existing category first, then load the bundle fresh
    Replace,
    /// Don't import this bundle at all
    Skip,
}

// ============================================================================
// Config command
// ============================================================================

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the current configuration
    Show,
    /// Set a configuration key
    Set {
        /// Key name (output_format, data_dir, proxy, show_tips)
        key: String,
        /// New value
        value: String,
    },
    /// Print the configuration file path
    Path,
}
