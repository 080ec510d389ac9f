use std::process::ExitCode;

use anyhow::Result;

use super::commands::Commands;
use super::context::CliContext;
use super::env::CliArgs;
use super::info::cmd_info;
use super::classify::cmd_classify;
use super::rules::cmd_rules;
use super::run::cmd_run;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<ExitCode> {
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, ctx).await,
        Commands::Classify(args) => cmd_classify(args, ctx),
        Commands::Rules(args) => cmd_rules(args, ctx),
        Commands::Info => cmd_info(ctx),
    }
}
