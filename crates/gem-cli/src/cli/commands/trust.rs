//! `gem trust` - inspect or forget TOFU trust entries.

use anyhow::Result;
use console::style;
use tabled::Tabled;

use super::Context;
use crate::cli::args::{TrustArgs, TrustCommands};
use crate::output::OutputFormat;

#[derive(Tabled, serde::Serialize)]
struct TrustRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
    #[tabled(rename = "Valid Until")]
    valid_until: String,
}

pub async fn execute(ctx: Context, args: TrustArgs) -> Result<()> {
    match args.command {
        TrustCommands::List => {
            let rows: Vec<TrustRow> = ctx
                .services
                .trust
                .list()
                .into_iter()
                .map(|(key, entry)| TrustRow {
                    key,
                    fingerprint: entry.fingerprint.iter().map(|b| format!("{b:02x}")).collect(),
                    valid_until: entry.valid_until.to_rfc3339(),
                })
                .collect();
            match ctx.output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
                OutputFormat::Pretty => {
                    if rows.is_empty() {
                        println!("{}", style("(no trust entries)").dim());
                    } else {
                        println!("{}", tabled::Table::new(rows).with(tabled::settings::Style::rounded()));
                    }
                }
            }
        }
        TrustCommands::Remove { key } => {
            ctx.services.trust.remove(&key)?;
            println!("{} {}", style("forgot").red().bold(), key);
        }
    }
    Ok(())
}
