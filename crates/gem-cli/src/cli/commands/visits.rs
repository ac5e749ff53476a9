//! `gem visits` - show recently visited URLs.

use anyhow::Result;
use console::style;
use tabled::Tabled;

use super::Context;
use crate::cli::args::VisitsArgs;
use crate::output::OutputFormat;

#[derive(Tabled, serde::Serialize)]
struct VisitRow {
    #[tabled(rename = "When")]
    when: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Kept")]
    kept: bool,
}

pub async fn execute(ctx: Context, args: VisitsArgs) -> Result<()> {
    let rows: Vec<VisitRow> = ctx
        .services
        .visits
        .list(args.count)
        .into_iter()
        .map(|record| VisitRow {
            when: record.when.to_rfc3339(),
            url: record.url,
            kept: record.flags.has(gem_core::VisitFlags::KEPT),
        })
        .collect();

    match ctx.output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Pretty => {
            if rows.is_empty() {
                println!("{}", style("(no visits)").dim());
            } else {
                println!("{}", tabled::Table::new(rows).with(tabled::settings::Style::rounded()));
            }
        }
    }

    Ok(())
}
