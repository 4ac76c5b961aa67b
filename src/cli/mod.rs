//! CLI command handling
//!
//! Merges flags into the configuration, runs the selected scenarios and
//! formats the report.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use serde::Serialize;

use crate::assertion::{ScenarioOutcome, ScenarioResult};
use crate::browser::WebDriverLauncher;
use crate::commands::{Commands, RunArgs};
use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::http::Strictness;
use crate::poll::{cancellation, CancelHandle};
use crate::testing::{self, RunContext, ScenarioDef, Summary, EXIT_PASSED};

/// Dispatch a CLI command, returning the process exit code
pub async fn dispatch(command: Commands, config_path: Option<&Path>) -> Result<i32> {
    match command {
        Commands::Run(args) => run(args, config_path).await,
        Commands::List { files } => {
            list(&files)?;
            Ok(EXIT_PASSED)
        }
    }
}

/// Apply `verify run` flags on top of the loaded configuration
pub fn apply_overrides(config: &mut Config, args: &RunArgs) -> Result<()> {
    if let Some(timeout) = args.timeout {
        config.timeouts.wait_secs = timeout;
    }
    if let Some(interval) = args.poll_interval {
        config.timeouts.poll_interval_ms = interval;
    }
    if let Some(url) = &args.base_url {
        config.target.base_url = url.clone();
    }
    if let Some(url) = &args.ui_url {
        config.target.ui_url = url.clone();
    }
    if let Some(url) = &args.webdriver {
        config.browser.webdriver_url = url.clone();
    }
    if args.lenient {
        config.verification.strictness = Strictness::Lenient;
    }
    if let Some(jobs) = args.jobs {
        config.run.jobs = jobs;
    }
    config.validate()
}

async fn run(args: RunArgs, config_path: Option<&Path>) -> Result<i32> {
    let mut config = Config::load(config_path)?;
    apply_overrides(&mut config, &args)?;

    let user_dir = paths::scenario_dir();
    let defs = testing::select(
        testing::catalog(user_dir.as_deref(), &args.files)?,
        &args.scenarios,
    )?;
    if defs.is_empty() {
        return Err(Error::Config("no scenarios to run".to_string()));
    }
    check_timing(&defs, &config)?;

    let launcher = WebDriverLauncher::new(&config.browser, config.timeouts.request())?;
    let (handle, cancel) = cancellation();
    let watcher = tokio::spawn(cancel_on_interrupt(handle, args.run_timeout));

    let jobs = config.run.jobs;
    let ctx = Arc::new(RunContext {
        config,
        launcher: Arc::new(launcher),
        http: None,
        cancel,
    });

    let results = testing::run_suite(defs, ctx, jobs).await;
    watcher.abort();

    let summary = Summary::of(&results);
    if args.json {
        let report = Report {
            summary,
            results: &results,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for result in &results {
            print_result(result);
        }
        print_summary(&summary);
    }

    Ok(summary.exit_code())
}

/// Reject any selected scenario whose waits cannot run under `config`
fn check_timing(defs: &[ScenarioDef], config: &Config) -> Result<()> {
    defs.iter().try_for_each(|def| def.check_timing(&config.timeouts))
}

/// Trigger cancellation on Ctrl+C or when the run timeout passes
async fn cancel_on_interrupt(handle: CancelHandle, run_timeout: Option<u64>) {
    let deadline = async {
        match run_timeout {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            eprintln!("{}", "Interrupted, cancelling run...".yellow());
        }
        _ = deadline => {
            tracing::warn!(secs = run_timeout, "Run timeout reached, cancelling run");
        }
    }
    handle.cancel();
}

fn list(files: &[std::path::PathBuf]) -> Result<()> {
    let user_dir = paths::scenario_dir();
    let defs = testing::catalog(user_dir.as_deref(), files)?;

    println!("Scenarios:");
    for def in &defs {
        println!(
            "  {:<20} {:<8} {}",
            def.name.bold(),
            def.session.to_string(),
            def.description.as_deref().unwrap_or("").dimmed()
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct Report<'a> {
    summary: Summary,
    results: &'a [ScenarioResult],
}

fn print_result(result: &ScenarioResult) {
    let secs = format!("({:.2}s)", result.duration.as_secs_f64());
    match result.outcome {
        ScenarioOutcome::Passed => {
            println!("{} {} {}", "✓".green(), result.name, secs.dimmed());
        }
        ScenarioOutcome::Failed => {
            println!(
                "{} {} {} {}",
                "✗".red(),
                result.name.bold(),
                "failed".red(),
                secs.dimmed()
            );
            for assertion in result.failed_assertions() {
                println!("    {} {}", "✗".red(), assertion.mismatch());
            }
        }
        ScenarioOutcome::Errored => {
            println!(
                "{} {} {} {}",
                "!".yellow().bold(),
                result.name.bold(),
                "errored".yellow(),
                secs.dimmed()
            );
            if let Some(error) = &result.error {
                let code = result.error_code.as_deref().unwrap_or("ERROR");
                println!("    {} {}", code.yellow(), error);
            }
        }
    }
}

fn print_summary(summary: &Summary) {
    let line = format!(
        "{} scenarios: {} passed, {} failed, {} errored",
        summary.total(),
        summary.passed,
        summary.failed,
        summary.errored
    );
    match summary.exit_code() {
        EXIT_PASSED => println!("\n{}", line.green().bold()),
        _ if summary.errored > 0 => println!("\n{}", line.yellow().bold()),
        _ => println!("\n{}", line.red().bold()),
    }
}
