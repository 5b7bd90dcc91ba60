use anyhow::Result;

use super::config::cmd_config;
use super::env::CliArgs;
use super::query::{cmd_rate, cmd_ticket};
use super::session::cmd_session;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;

/// Runs the command and returns the process exit code.
pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<u8> {
    match cli.command.clone() {
        Commands::Ticket(args) => cmd_ticket(args, ctx, cli.output).await,
        Commands::Rate(args) => cmd_rate(args, ctx, cli.output).await,
        Commands::Session(args) => cmd_session(args, ctx, cli.output).map(|()| 0),
        Commands::Config(args) => cmd_config(args, ctx).map(|()| 0),
    }
}
