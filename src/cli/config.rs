use anyhow::Result;
use clap::{Args, Subcommand};

use crate::cli::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration (file plus environment) as YAML
    Show,

    /// Check the effective configuration and report every problem
    Validate,

    /// Print the resolved configuration file path
    Path,
}

pub fn cmd_config(args: ConfigArgs, ctx: &CliContext) -> Result<()> {
    let path = ctx.config_path();
    match args.action {
        ConfigAction::Show => {
            let source = if ctx.from_file() {
                path.display().to_string()
            } else {
                "defaults".to_string()
            };
            println!("# effective configuration ({source})");
            print!("{}", serde_yaml::to_string(ctx.config())?);
        }
        ConfigAction::Validate => {
            ctx.config().validate()?;
            if ctx.from_file() {
                println!("Configuration file {} is valid", path.display());
            } else {
                println!("No configuration file at {}; defaults are valid", path.display());
            }
        }
        ConfigAction::Path => {
            println!("{}", path.display());
        }
    }
    Ok(())
}
