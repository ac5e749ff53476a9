//! `gem feeds` - poll subscribed bookmarks and list their entries.

use anyhow::Result;
use console::style;
use gem::store::feeds::is_unread;
use tabled::Tabled;

use super::Context;
use crate::cli::args::{FeedsArgs, FeedsCommands};
use crate::output::OutputFormat;

#[derive(Tabled, serde::Serialize)]
struct FeedRow {
    #[tabled(rename = "Posted")]
    posted: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Kind")]
    kind: &'static str,
}

pub async fn execute(ctx: Context, args: FeedsArgs) -> Result<()> {
    match args.command {
        FeedsCommands::Refresh => {
            ctx.services.feeds.poll_once(&ctx.services.bookmarks, &ctx.services.visits).await?;
            println!("{}", style("feeds refreshed").green().bold());
        }
        FeedsCommands::List { source, unread_only } => {
            let entries: Vec<_> = ctx
                .services
                .feeds
                .entries_for(source)
                .into_iter()
                .filter(|e| !unread_only || is_unread(e, &ctx.services.visits))
                .collect();

            let rows: Vec<FeedRow> = entries
                .into_iter()
                .map(|e| FeedRow {
                    posted: e.posted.to_rfc3339(),
                    title: e.title,
                    url: e.url,
                    kind: if e.is_heading { "heading" } else { "link" },
                })
                .collect();

            match ctx.output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
                OutputFormat::Pretty => {
                    if rows.is_empty() {
                        println!("{}", style("(no entries)").dim());
                    } else {
                        println!("{}", tabled::Table::new(rows).with(tabled::settings::Style::rounded()));
                    }
                }
            }
        }
    }
    Ok(())
}
