use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::{load_config, load_env_files, LoadedConfig};
use crate::logging::init_logging;

/// Parses arguments, loads configuration, installs logging and runs the
/// command. Returns the process exit code.
pub async fn run() -> Result<u8> {
    let env_files = load_env_files();
    let cli = CliArgs::parse();

    let LoadedConfig {
        config,
        path,
        from_file,
    } = load_config(cli.config.as_ref())?;

    let level = cli
        .log_level
        .clone()
        .or_else(|| config.logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    let _log_guard = init_logging(&level, cli.debug, cli.log_format, config.logging.dir.as_deref())?;

    info!("Starting dashprobe v{}", env!("CARGO_PKG_VERSION"));
    for file in &env_files {
        info!(path = %file.display(), "loaded environment overrides");
    }
    if from_file {
        info!(path = %path.display(), "loaded configuration");
    }

    let ctx = CliContext::new(config, path, from_file);
    match dispatch(&cli, &ctx).await {
        Ok(code) => {
            info!(code, "command finished");
            Ok(code)
        }
        Err(err) => {
            error!("Command failed: {:#}", err);
            Err(err)
        }
    }
}
