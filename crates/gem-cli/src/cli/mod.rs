//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use anyhow::Result;
use args::{Cli, Commands};
use clap::Parser;
use std::sync::Arc;

use crate::config::Config;
use crate::output::OutputFormat;
use crate::services::Services;

/// Run the CLI application.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("gem=debug".parse()?))
            .init();
    }

    let config = Config::load()?;
    let output_format = cli.output.or(config.output_format).unwrap_or(OutputFormat::Pretty);
    let data_dir = cli.data_dir.map_or_else(|| config.data_dir(), Ok)?;
    let services = Arc::new(Services::load(data_dir)?);

    let ctx = commands::Context {
        services,
        output_format,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Fetch(args) => commands::fetch::execute(ctx, args).await,
        Commands::Bookmarks(args) => commands::bookmarks::execute(ctx, args).await,
        Commands::Identity(args) => commands::identity::execute(ctx, args).await,
        Commands::Trust(args) => commands::trust::execute(ctx, args).await,
        Commands::Visits(args) => commands::visits::execute(ctx, args).await,
        Commands::Feeds(args) => commands::feeds::execute(ctx, args).await,
        Commands::Fonts(args) => commands::fonts::execute(ctx, args).await,
        Commands::Export(args) => commands::export::execute_export(ctx, args).await,
        Commands::Import(args) => commands::export::execute_import(ctx, args).await,
        Commands::Shell => commands::shell::execute(ctx).await,
        Commands::Config(args) => commands::config::execute(ctx, args).await,
    }
}
