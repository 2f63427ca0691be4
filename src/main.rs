//! DMF - test harness for Kit-based simulation applications
//!
//! Launches DSRS or MAP2SIM, drives them through pytest scenario scripts,
//! collects telemetry and writes pass/fail reports.

use clap::Parser;
use dmf::cli;
use dmf::commands::Commands;

#[derive(Parser)]
#[command(name = "dmf", about = "Test harness for Kit-based simulation applications")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli::dispatch(cli.command).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
