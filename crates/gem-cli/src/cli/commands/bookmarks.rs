//! `gem bookmarks` - add, remove, list and inspect bookmarks.

use anyhow::Result;
use console::style;
use gem_core::BookmarkFlags;
use tabled::Tabled;

use super::Context;
use crate::cli::args::{BookmarksArgs, BookmarksCommands};
use crate::output::OutputFormat;

#[derive(Tabled, serde::Serialize)]
struct BookmarkRow {
    #[tabled(rename = "Id")]
    id: u32,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Tags")]
    tags: String,
    #[tabled(rename = "Parent")]
    parent: u32,
}

pub async fn execute(ctx: Context, args: BookmarksArgs) -> Result<()> {
    match args.command {
        BookmarksCommands::Add { url, title, tags, parent } => {
            let id = ctx.services.bookmarks.add(&url, &title, &tags, 0, parent);
            ctx.services.bookmarks.save()?;
            println!("{} bookmark {}", style("added").green().bold(), id);
        }
        BookmarksCommands::Mkdir { title, parent } => {
            let id = ctx.services.bookmarks.add("", &title, "", 0, parent);
            ctx.services.bookmarks.save()?;
            println!("{} folder {}", style("added").green().bold(), id);
        }
        BookmarksCommands::Remove { id } => {
            ctx.services.bookmarks.remove(id);
            ctx.services.bookmarks.save()?;
            println!("{} bookmark {}", style("removed").red().bold(), id);
        }
        BookmarksCommands::List { parent } => {
            let list = ctx.services.bookmarks.list(parent);
            print_list(&ctx, &list);
        }
        BookmarksCommands::Find { url } => match ctx.services.bookmarks.find_url(&url) {
            Some(bm) => print_list(&ctx, &[bm]),
            None => println!("{}", style("no bookmark for that URL").yellow()),
        },
        BookmarksCommands::Subscribe { id, headings } => {
            let list = ctx.services.bookmarks.list(None);
            if !list.iter().any(|b| b.id == id) {
                anyhow::bail!("no such bookmark: {id}");
            }
            ctx.services.bookmarks.set_flags(id, |flags| {
                flags.set(BookmarkFlags::SUBSCRIBED, true);
                flags.set(BookmarkFlags::HEADINGS, headings);
            });
            ctx.services.bookmarks.save()?;
            println!("{} bookmark {} subscribed", style("ok").green().bold(), id);
        }
    }
    Ok(())
}

fn print_list(ctx: &Context, list: &[gem_core::Bookmark]) {
    let rows: Vec<BookmarkRow> = list
        .iter()
        .map(|b| BookmarkRow {
            id: b.id,
            title: if b.is_folder() { format!("{}/", b.title) } else { b.title.clone() },
            url: b.url.clone(),
            tags: b.tags.clone(),
            parent: b.parent_id,
        })
        .collect();

    match ctx.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rows).unwrap_or_default());
        }
        OutputFormat::Pretty => {
            if rows.is_empty() {
                println!("{}", style("(no bookmarks)").dim());
            } else {
                println!("{}", tabled::Table::new(rows).with(tabled::settings::Style::rounded()));
            }
        }
    }
}
