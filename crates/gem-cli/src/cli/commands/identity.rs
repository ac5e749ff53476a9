//! `gem identity` - manage client TLS identities.

use anyhow::Result;
use console::style;
use gem::store::identity::{IdentityAlgorithm, NewIdentityParams};
use tabled::Tabled;

use super::Context;
use crate::cli::args::{IdentityArgs, IdentityCommands};
use crate::output::OutputFormat;

#[derive(Tabled, serde::Serialize)]
struct IdentityRow {
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
    #[tabled(rename = "Common Name")]
    common_name: String,
    #[tabled(rename = "Uses")]
    uses: usize,
    #[tabled(rename = "Notes")]
    notes: String,
}

pub async fn execute(ctx: Context, args: IdentityArgs) -> Result<()> {
    match args.command {
        IdentityCommands::New { common_name, domain, email, temporary } => {
            let params = NewIdentityParams {
                common_name: common_name.clone(),
                domain,
                email,
                temporary,
                ..Default::default()
            };
            let identity = ctx.services.identities.generate(params, IdentityAlgorithm::EcdsaP256)?;
            let hex: String = identity.fingerprint.iter().map(|b| format!("{b:02x}")).collect();
            println!("{} identity {} ({})", style("generated").green().bold(), common_name, hex);
        }
        IdentityCommands::List => {
            let rows: Vec<IdentityRow> = ctx
                .services
                .identities
                .list()
                .into_iter()
                .map(|(hex, ident)| IdentityRow {
                    fingerprint: hex,
                    common_name: ident.common_name,
                    uses: ident.use_urls.len(),
                    notes: ident.notes,
                })
                .collect();
            match ctx.output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
                OutputFormat::Pretty => {
                    if rows.is_empty() {
                        println!("{}", style("(no identities)").dim());
                    } else {
                        println!("{}", tabled::Table::new(rows).with(tabled::settings::Style::rounded()));
                    }
                }
            }
        }
        IdentityCommands::Delete { identity } => {
            let (hex, _) = ctx
                .services
                .identities
                .find_fuzzy(&identity)
                .ok_or_else(|| anyhow::anyhow!("no identity matching {identity:?}"))?;
            ctx.services.identities.delete(&hex)?;
            println!("{} identity {}", style("deleted").red().bold(), hex);
        }
        IdentityCommands::SignIn { identity, url } => {
            let (hex, _) = ctx
                .services
                .identities
                .find_fuzzy(&identity)
                .ok_or_else(|| anyhow::anyhow!("no identity matching {identity:?}"))?;
            ctx.services.identities.sign_in(&hex, &url)?;
            println!("{} {} will present {}", style("ok").green().bold(), url, hex);
        }
        IdentityCommands::SignOut { url } => {
            ctx.services.identities.sign_out(&url)?;
            println!("{} signed out of {}", style("ok").green().bold(), url);
        }
    }
    Ok(())
}
