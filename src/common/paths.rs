//! Configuration paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/verify-cli/`
//! - macOS: `~/Library/Application Support/verify-cli/`
//! - Windows: `%APPDATA%\verify-cli\`

use std::path::PathBuf;

const APP_NAME: &str = "verify-cli";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the directory scanned for user scenario files
pub fn scenario_dir() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("scenarios"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_is_toml() {
        if let Some(path) = config_path() {
            assert!(path.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_scenario_dir_is_under_config_dir() {
        if let (Some(config), Some(scenarios)) = (config_dir(), scenario_dir()) {
            assert!(scenarios.starts_with(config));
        }
    }
}
