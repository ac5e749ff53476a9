//! `gem config` - inspect or edit the persisted CLI configuration.

use anyhow::Result;
use console::style;

use super::Context;
use crate::cli::args::{ConfigArgs, ConfigCommands};
use crate::config::Config;
use crate::output::OutputFormat;

pub async fn execute(ctx: Context, args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show => {
            let config = Config::load()?;
            match ctx.output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
                OutputFormat::Pretty => {
                    println!("{} {:?}", style("output_format:").bold(), config.output_format);
                    println!("{} {:?}", style("data_dir:").bold(), config.data_dir);
                    println!("{} {:?}", style("proxy:").bold(), config.proxy);
                    println!("{} {}", style("show_tips:").bold(), config.show_tips);
                }
            }
        }
        ConfigCommands::Set { key, value } => {
            let mut config = Config::load()?;
            match key.as_str() {
                "output_format" => config.output_format = Some(value.parse()?),
                "data_dir" => config.data_dir = Some(value.into()),
                "proxy" => config.proxy = Some(value),
                "show_tips" => config.show_tips = value.parse()?,
                other => anyhow::bail!("unknown configuration key: {other}"),
            }
            config.save()?;
            println!("{} {key} = {value}", style("set").green().bold());
        }
        ConfigCommands::Path => {
            println!("{}", Config::path()?.display());
        }
    }
    Ok(())
}
