//! CLI command definitions
//!
//! Defines the clap commands for the verify CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run verification scenarios
    Run(RunArgs),

    /// List available scenarios
    #[command(alias = "ls")]
    List {
        /// Additional scenario file(s) to include
        #[arg(long = "file", short = 'f')]
        files: Vec<PathBuf>,
    },
}

/// Options for `verify run`; each overrides the configuration file
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Default timeout for waits and retries, in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Interval between condition checks, in milliseconds
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Base URL that API request paths are resolved against
    #[arg(long)]
    pub base_url: Option<String>,

    /// Start page for browser scenarios
    #[arg(long)]
    pub ui_url: Option<String>,

    /// WebDriver endpoint (chromedriver, geckodriver or a grid)
    #[arg(long)]
    pub webdriver: Option<String>,

    /// Accept an identifier as proof that a write was received
    #[arg(long)]
    pub lenient: bool,

    /// Maximum number of scenarios running at once
    #[arg(long, short)]
    pub jobs: Option<usize>,

    /// Cancel the whole run after this many seconds
    #[arg(long)]
    pub run_timeout: Option<u64>,

    /// Additional scenario file(s) to load.
    /// Can be specified multiple times: --file a.yaml --file b.yaml
    #[arg(long = "file", short = 'f')]
    pub files: Vec<PathBuf>,

    /// Run only the named scenario(s), in the order given
    #[arg(long = "scenario", short = 's')]
    pub scenarios: Vec<String>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}
