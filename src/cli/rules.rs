use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Subcommand};
use expect_gate::RuleBook;

use super::context::CliContext;
use super::output::print_structured;

#[derive(Args, Clone, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub command: RulesCommand,
}

#[derive(Subcommand, Clone, Debug)]
pub enum RulesCommand {
    /// Parse a rules file, compile its patterns and print what it covers
    Check {
        /// Rules file (JSON or YAML)
        file: PathBuf,
    },
}

pub fn cmd_rules(args: RulesArgs, ctx: &CliContext) -> Result<ExitCode> {
    match args.command {
        RulesCommand::Check { file } => {
            let book = RuleBook::load(&file)?;
            let summary = book.summary();
            if !print_structured(ctx.output(), &summary)? {
                println!("{}: {} step rules", file.display(), book.step_count());
                for entry in &summary {
                    println!(
                        "  {:<6} {} steps, {} parameters",
                        entry.platform.label(),
                        entry.steps,
                        entry.parameters
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
