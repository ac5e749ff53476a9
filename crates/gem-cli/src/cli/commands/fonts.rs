//! `gem fonts` - discover and list installed font packs.

use anyhow::Result;
use console::style;
use gem::fonts::{discover, Registry};
use tabled::Tabled;

use super::Context;
use crate::cli::args::FontsArgs;
use crate::output::OutputFormat;

#[derive(Tabled, serde::Serialize)]
struct FontRow {
    #[tabled(rename = "Pack")]
    pack: String,
    #[tabled(rename = "Spec")]
    spec: String,
    #[tabled(rename = "Priority")]
    priority: i32,
}

pub async fn execute(ctx: Context, args: FontsArgs) -> Result<()> {
    let dirs = if args.dirs.is_empty() {
        vec![ctx.services.data_dir.join("fonts")]
    } else {
        args.dirs
    };

    let mut registry = Registry::new();
    for pack in discover(&dirs) {
        registry.add_pack(pack);
    }

    let rows: Vec<FontRow> = registry
        .sorted_specs()
        .into_iter()
        .map(|resolved| FontRow {
            pack: resolved.pack_id.to_string(),
            spec: resolved.display_name,
            priority: resolved.spec.priority,
        })
        .collect();

    match ctx.output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        OutputFormat::Pretty => {
            if rows.is_empty() {
                println!("{}", style("(no font packs found)").dim());
            } else {
                println!("{}", tabled::Table::new(rows).with(tabled::settings::Style::rounded()));
            }
        }
    }

    Ok(())
}
