//! Scenarios shipped with the binary

use crate::common::Result;

use super::config::ScenarioDef;

const BUILTIN: &[(&str, &str)] = &[
    ("get-user.yaml", include_str!("../../scenarios/get-user.yaml")),
    ("create-user.yaml", include_str!("../../scenarios/create-user.yaml")),
    ("update-user.yaml", include_str!("../../scenarios/update-user.yaml")),
    ("verify-user-ui.yaml", include_str!("../../scenarios/verify-user-ui.yaml")),
];

/// Parse the built-in scenarios, in definition order
pub fn builtin() -> Result<Vec<ScenarioDef>> {
    BUILTIN
        .iter()
        .map(|(file, content)| ScenarioDef::from_yaml(content, &format!("builtin:{}", file)))
        .collect()
}
