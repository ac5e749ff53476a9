//! `gem fetch` - resolve a single URL and print the response.

use anyhow::Result;
use console::style;
use gem::request::GmRequest;

use super::Context;
use crate::cli::args::FetchArgs;
use crate::output::OutputFormat;

#[derive(serde::Serialize)]
struct FetchResult {
    status: String,
    meta: String,
    body_len: usize,
    body_utf8: Option<String>,
}

pub async fn execute(ctx: Context, args: FetchArgs) -> Result<()> {
    let req = GmRequest::new(ctx.services.request_ctx.clone());
    req.set_url(&args.url)?;

    if let Some(needle) = &args.identity {
        if let Some((_, identity)) = ctx.services.identities.find_fuzzy(needle) {
            req.set_identity(identity);
        } else {
            anyhow::bail!("no identity matching {needle:?}");
        }
    }

    req.submit().await?;
    let resp = req.lock_response();

    if let Some(path) = &args.output_file {
        std::fs::write(path, &resp.body)?;
    }

    match ctx.output_format {
        OutputFormat::Json => {
            let result = FetchResult {
                status: format!("{:?}", resp.status_code),
                meta: resp.meta.clone(),
                body_len: resp.body.len(),
                body_utf8: String::from_utf8(resp.body.clone()).ok(),
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Pretty => {
            let status_label = match resp.status_code {
                Some(code) if !code.is_failure() => style(format!("{code:?}")).green(),
                Some(code) => style(format!("{code:?}")).red(),
                None => style("(no status)".to_string()).yellow(),
            };
            println!("{} {}", style("status:").bold(), status_label);
            println!("{} {}", style("meta:").bold(), resp.meta);
            if args.output_file.is_none() {
                println!();
                println!("{}", String::from_utf8_lossy(&resp.body));
            } else {
                println!("{} bytes written", resp.body.len());
            }
        }
    }

    if args.open {
        if let Some(path) = &args.output_file {
            let _ = open::that(path);
        }
    }

    Ok(())
}
