use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::{apply_env_overrides, init_logging, load_config, load_local_env_overrides, LoadedConfig};

pub async fn run() -> ExitCode {
    load_local_env_overrides();
    let cli = CliArgs::parse();

    let _log_guard = match init_logging(&cli.log_level, cli.debug, cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    info!("Starting BeaconCheck v{}", env!("CARGO_PKG_VERSION"));

    let LoadedConfig { mut config, path } = match load_config(cli.config.as_ref()) {
        Ok(loaded) => loaded,
        Err(err) => {
            error!("Failed to load configuration: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    apply_env_overrides(&mut config);
    let ctx = CliContext::new(config, path, cli.output);

    match dispatch(&cli, &ctx).await {
        Ok(code) => {
            info!("Command completed");
            code
        }
        Err(err) => {
            error!("Command failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
