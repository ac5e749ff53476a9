//! Command implementations.

pub mod bookmarks;
pub mod config;
pub mod export;
pub mod feeds;
pub mod fetch;
pub mod fonts;
pub mod identity;
pub mod shell;
pub mod trust;
pub mod visits;

use std::sync::Arc;

use crate::output::OutputFormat;
use crate::services::Services;

/// Shared context for all commands.
#[derive(Clone)]
pub struct Context {
    /// Every persistent store and the shared request context.
    pub services: Arc<Services>,

    /// Output format
    pub output_format: OutputFormat,

    /// Verbose output
    pub verbose: bool,
}
