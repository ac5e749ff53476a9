//! `gem shell` - a minimal interactive REPL over the request pipeline.

use anyhow::Result;
use console::style;
use gem::request::GmRequest;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use super::Context;

const PROMPT: &str = "gem> ";

pub async fn execute(ctx: Context) -> Result<()> {
    println!("{}", style("gem interactive shell").bold());
    println!(
        "type a URL to fetch it, or one of: {}, {}, {}, {}",
        style("bookmarks").cyan(),
        style("visits").cyan(),
        style("help").cyan(),
        style("quit").cyan()
    );

    let mut editor = DefaultEditor::new()?;

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);

                match line {
                    "quit" | "exit" | ".quit" => break,
                    "help" | "?" => print_help(),
                    "bookmarks" => {
                        for bm in ctx.services.bookmarks.list(None) {
                            println!("  {:>4}  {}  {}", bm.id, bm.title, style(&bm.url).dim());
                        }
                    }
                    "visits" => {
                        for visit in ctx.services.visits.list(20) {
                            println!("  {}  {}", visit.when.to_rfc3339(), visit.url);
                        }
                    }
                    url => {
                        if let Err(err) = fetch_once(&ctx, url).await {
                            println!("{} {err}", style("error:").red().bold());
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(err) => {
                println!("{} {err}", style("readline error:").red().bold());
                break;
            }
        }
    }

    println!("{}", style("goodbye").dim());
    Ok(())
}

fn print_help() {
    println!("  <url>       fetch a gemini/titan/gopher/finger/spartan/guppy/about/file/data URL");
    println!("  bookmarks   list top-level bookmarks and folders");
    println!("  visits      show the 20 most recent visits");
    println!("  help        show this message");
    println!("  quit        leave the shell");
}

async fn fetch_once(ctx: &Context, url: &str) -> Result<()> {
    let req = GmRequest::new(ctx.services.request_ctx.clone());
    req.set_url(url)?;
    req.submit().await?;
    let resp = req.lock_response();
    println!("{} {:?}", style("status:").bold(), resp.status_code);
    println!("{} {}", style("meta:").bold(), resp.meta);
    println!();
    println!("{}", String::from_utf8_lossy(&resp.body));
    ctx.services.visits.visit_url(url, gem_core::VisitFlags::default());
    Ok(())
}
