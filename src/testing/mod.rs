//! Scenario execution
//!
//! Scenarios are YAML files describing one session's worth of steps. The
//! runner drives a scenario against real collaborators and folds everything
//! that happened into a [`ScenarioResult`](crate::assertion::ScenarioResult).

mod builtin;
mod config;
mod runner;
mod suite;

pub use builtin::builtin;
pub use config::*;
pub use runner::{run_scenario, Phase, RunContext};
pub use suite::{run_suite, Summary, EXIT_ERRORED, EXIT_FAILED, EXIT_PASSED};

use std::path::{Path, PathBuf};

use crate::common::{Error, Result};

/// Every known scenario: built-ins, then the user scenario directory, then
/// explicit files. A later definition replaces an earlier one of the same
/// name.
pub fn catalog(user_dir: Option<&Path>, files: &[PathBuf]) -> Result<Vec<ScenarioDef>> {
    let mut defs = builtin()?;

    let mut paths = Vec::new();
    if let Some(dir) = user_dir.filter(|d| d.is_dir()) {
        paths.extend(scenario_files(dir)?);
    }
    paths.extend(files.iter().cloned());

    for path in paths {
        let def = ScenarioDef::load(&path)?;
        match defs.iter_mut().find(|d| d.name == def.name) {
            Some(existing) => {
                tracing::info!(scenario = %def.name, path = %path.display(), "Overriding scenario");
                *existing = def;
            }
            None => defs.push(def),
        }
    }
    Ok(defs)
}

/// Keep the named scenarios, in the order given; all of them when no
/// names are given
pub fn select(defs: Vec<ScenarioDef>, names: &[String]) -> Result<Vec<ScenarioDef>> {
    if names.is_empty() {
        return Ok(defs);
    }
    names
        .iter()
        .map(|name| {
            defs.iter()
                .find(|d| &d.name == name)
                .cloned()
                .ok_or_else(|| Error::UnknownScenario(name.clone()))
        })
        .collect()
}
