use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    beaconcheck_cli::cli::run().await
}
