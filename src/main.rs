//! verify - condition-polling and assertion engine
//!
//! Runs YAML scenarios against HTTP APIs and browser-rendered pages, waiting
//! on conditions with explicit timeouts instead of fixed sleeps, and exits
//! with 0 (all passed), 1 (some failed) or 2 (some errored).

use std::path::PathBuf;

use clap::Parser;
use verify::commands::Commands;
use verify::common::logging;
use verify::{cli, testing};

#[derive(Parser)]
#[command(name = "verify", about = "Verify HTTP APIs and web pages with explicit waits")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.verbose);

    match cli::dispatch(cli.command, cli.config.as_deref()).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(testing::EXIT_ERRORED);
        }
    }
}
