use std::process::ExitCode;

use anyhow::Result;
use cdp_adapter::find_chrome;

use super::context::CliContext;

pub fn cmd_info(ctx: &CliContext) -> Result<ExitCode> {
    let config = ctx.config();

    println!("BeaconCheck System Information");
    println!("==============================");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Build Date: {}", env!("BUILD_DATE"));
    println!("Git Commit: {}", env!("GIT_HASH"));
    println!();

    println!("Configuration:");
    match ctx.config_path() {
        Some(path) => println!("- Config File: {}", path.display()),
        None => println!("- Config File: (defaults)"),
    }
    println!("- Report Directory: {}", config.report.output_dir.display());
    println!("- Headless: {}", config.browser.headless);
    println!("- Interactive Prompts: {}", config.decisions.interactive);
    println!(
        "- Settle Time: {}",
        humantime::format_duration(std::time::Duration::from_millis(config.timings.settle_ms))
    );
    println!();

    println!("Browser:");
    match &config.browser.websocket_url {
        Some(url) => println!("- Attach To: {url}"),
        None => match find_chrome() {
            Some(install) => {
                println!("- Chrome: {} (via {})", install.path.display(), install.source)
            }
            None => println!("- Chrome: not found (set BEACONCHECK_CHROME)"),
        },
    }
    Ok(ExitCode::SUCCESS)
}
