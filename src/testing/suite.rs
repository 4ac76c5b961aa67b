//! Concurrent suite execution
//!
//! Each scenario runs as its own task with its own session. At most `jobs`
//! run at once; results flow through one channel to a single collector and
//! are returned in definition order.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};

use crate::assertion::{ScenarioOutcome, ScenarioResult};
use crate::common::Error;
use crate::session::SessionState;

use super::config::ScenarioDef;
use super::runner::{run_scenario, RunContext};

/// Process exit code when every scenario passed
pub const EXIT_PASSED: i32 = 0;
/// Process exit code when a scenario failed and none errored
pub const EXIT_FAILED: i32 = 1;
/// Process exit code when a scenario errored or the run could not start
pub const EXIT_ERRORED: i32 = 2;

/// Run scenarios with bounded concurrency
pub async fn run_suite(
    defs: Vec<ScenarioDef>,
    ctx: Arc<RunContext>,
    jobs: usize,
) -> Vec<ScenarioResult> {
    let total = defs.len();
    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
    let (tx, mut rx) = mpsc::channel::<(usize, ScenarioResult)>(total.max(1));
    let names: Vec<String> = defs.iter().map(|d| d.name.clone()).collect();

    tracing::info!(scenarios = total, jobs, "Starting suite");

    let mut tasks = Vec::with_capacity(total);
    for (index, def) in defs.into_iter().enumerate() {
        let tx = tx.clone();
        let ctx = ctx.clone();
        let semaphore = semaphore.clone();
        tasks.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            let result = run_scenario(&def, &ctx).await;
            if tx.send((index, result)).await.is_err() {
                tracing::warn!(scenario = %def.name, "Result collector went away");
            }
        }));
    }
    drop(tx);

    let mut results: Vec<Option<ScenarioResult>> = (0..total).map(|_| None).collect();
    while let Some((index, result)) = rx.recv().await {
        tracing::debug!(scenario = %result.name, outcome = %result.outcome, "Collected result");
        results[index] = Some(result);
    }

    for (index, task) in tasks.into_iter().enumerate() {
        if let Err(e) = task.await {
            tracing::error!(scenario = %names[index], error = %e, "Scenario task failed");
        }
    }

    results
        .into_iter()
        .zip(names)
        .map(|(result, name)| {
            result.unwrap_or_else(|| {
                let error = Error::Internal("scenario task ended without a result".to_string());
                ScenarioResult::new(
                    &name,
                    Vec::new(),
                    Some(&error),
                    Duration::ZERO,
                    SessionState::Uninitialized,
                )
            })
        })
        .collect()
}

/// Outcome counts of a finished suite
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
}

impl Summary {
    pub fn of(results: &[ScenarioResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match result.outcome {
                ScenarioOutcome::Passed => summary.passed += 1,
                ScenarioOutcome::Failed => summary.failed += 1,
                ScenarioOutcome::Errored => summary.errored += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errored
    }

    /// Errored dominates Failed, Failed dominates Passed
    pub fn exit_code(&self) -> i32 {
        if self.errored > 0 {
            EXIT_ERRORED
        } else if self.failed > 0 {
            EXIT_FAILED
        } else {
            EXIT_PASSED
        }
    }
}
