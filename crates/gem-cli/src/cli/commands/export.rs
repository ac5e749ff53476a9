//! `gem export` / `gem import` - profile bundle round-tripping.

use anyhow::Result;
use console::style;
use gem::store::bookmarks::ImportMethod;
use gem::store::bundle::{detect, generate, import, ExportFlags, ImportPlan};

use super::Context;
use crate::cli::args::{ExportArgs, ImportArgs, ImportMethodArg};

fn to_store_method(arg: ImportMethodArg) -> ImportMethod {
    match arg {
        ImportMethodArg::IfMissing => ImportMethod::IfMissing,
        ImportMethodArg::All => ImportMethod::All,
        ImportMethodArg::Replace => ImportMethod::Replace,
        ImportMethodArg::Skip => ImportMethod::Skip,
    }
}

pub async fn execute_export(ctx: Context, args: ExportArgs) -> Result<()> {
    let file = std::fs::File::create(&args.path)?;
    generate(
        file,
        ExportFlags::everything(),
        &ctx.services.bookmarks,
        &ctx.services.trust,
        &ctx.services.site_spec,
        &ctx.services.visits,
        Some(&ctx.services.data_dir.join("idents")),
        env!("CARGO_PKG_VERSION"),
    )?;
    println!("{} bundle written to {}", style("exported").green().bold(), args.path.display());
    Ok(())
}

pub async fn execute_import(ctx: Context, args: ImportArgs) -> Result<()> {
    use std::io::{Seek, SeekFrom};

    let mut file = std::fs::File::open(&args.path)?;
    if !detect(&mut file) {
        anyhow::bail!("{} does not look like a gem export bundle", args.path.display());
    }
    file.seek(SeekFrom::Start(0))?;

    let method = to_store_method(args.method);
    let plan = ImportPlan {
        bookmarks: method,
        identities: method,
        trusted: method,
        visited: method,
        site_spec: method,
    };

    import(
        file,
        plan,
        &ctx.services.bookmarks,
        &ctx.services.trust,
        &ctx.services.site_spec,
        &ctx.services.visits,
        Some(&ctx.services.data_dir.join("idents")),
    )?;
    println!("{} bundle {}", style("imported").green().bold(), args.path.display());
    if method != ImportMethod::Skip {
        println!(
            "{}",
            style("note: newly imported identities take effect the next time gem runs").dim()
        );
    }
    Ok(())
}
