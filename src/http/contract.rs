//! Per-method response contracts
//!
//! A contract turns an observed response into assertions. The shape of the
//! response is never hard-coded: an [`ApiProfile`] says where the identifier
//! and the record live, so an API that answers `{"id": 1}` and one that
//! answers `{"user": {"id": 1}}` are two profiles, not two code paths.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assertion::{assert_condition, assert_equal, Assertion};

use super::verifier::ObservedResponse;

/// How much of a write request must be reflected in the response
///
/// Stub-like systems acknowledge writes without applying them. `Lenient`
/// accepts an identifier as proof of receipt; `Strict` demands that every
/// submitted field comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    #[default]
    Strict,
    Lenient,
}

impl std::fmt::Display for Strictness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Lenient => write!(f, "lenient"),
        }
    }
}

/// Response-shape descriptor of one external API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiProfile {
    #[serde(default = "default_profile_name")]
    pub name: String,
    /// JSON pointer to the resource identifier
    #[serde(default = "default_id_pointer")]
    pub id_pointer: String,
    /// JSON pointer to the object holding the resource fields
    #[serde(default)]
    pub record_pointer: String,
}

impl Default for ApiProfile {
    fn default() -> Self {
        Self {
            name: default_profile_name(),
            id_pointer: default_id_pointer(),
            record_pointer: String::new(),
        }
    }
}

fn default_profile_name() -> String {
    "flat".to_string()
}

fn default_id_pointer() -> String {
    "/id".to_string()
}

impl ApiProfile {
    /// A profile whose resources are wrapped in `{"<key>": {...}}`
    pub fn enveloped(key: &str) -> Self {
        Self {
            name: format!("enveloped:{}", key),
            id_pointer: format!("/{}/id", key),
            record_pointer: format!("/{}", key),
        }
    }

    /// The identifier, if the body has one
    pub fn id<'a>(&self, body: &'a Value) -> Option<&'a Value> {
        body.pointer(&self.id_pointer).filter(|v| !v.is_null())
    }

    /// A field of the record
    pub fn field<'a>(&self, body: &'a Value, name: &str) -> Option<&'a Value> {
        body.pointer(&self.record_pointer)
            .and_then(|record| record.get(name))
    }

    /// Name of the identifier field, for assertion descriptions
    fn id_label(&self) -> &str {
        self.id_pointer.rsplit('/').next().unwrap_or("id")
    }
}

/// What a successful response must look like
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Contract {
    /// GET by identifier: 200 and the same identifier back
    Fetch { id: Value },
    /// POST create: 201 and a generated identifier
    Create,
    /// PUT update: 200 and an identifier (lenient), or the same identifier
    /// and every updated field reflected (strict)
    Update { id: Value },
    /// Only the status code matters
    Status { code: u16 },
}

impl Contract {
    /// Evaluate the contract against a response
    ///
    /// `submitted` is the request body; its top-level fields are the ones
    /// strict create/update contracts expect to see reflected.
    pub fn evaluate(
        &self,
        observed: &ObservedResponse,
        submitted: Option<&Value>,
        profile: &ApiProfile,
        strictness: Strictness,
    ) -> Vec<Assertion> {
        let body = &observed.body;
        let id_label = profile.id_label();
        let mut assertions = Vec::new();

        match self {
            Contract::Fetch { id } => {
                assertions.push(assert_equal("status is 200", 200, observed.status));
                assertions.push(assert_equal(
                    format!("{} equals {}", id_label, id),
                    id.clone(),
                    profile.id(body).cloned().unwrap_or(Value::Null),
                ));
            }
            Contract::Create => {
                assertions.push(assert_equal("status is 201", 201, observed.status));
                assertions.push(id_present(profile, body));
                if strictness == Strictness::Strict {
                    assertions.extend(reflected_fields(profile, body, submitted, "echoed"));
                }
            }
            Contract::Update { id } => {
                assertions.push(assert_equal("status is 200", 200, observed.status));
                if strictness == Strictness::Lenient {
                    assertions.push(id_present(profile, body));
                } else {
                    assertions.push(assert_equal(
                        format!("{} equals {}", id_label, id),
                        id.clone(),
                        profile.id(body).cloned().unwrap_or(Value::Null),
                    ));
                    assertions.extend(reflected_fields(profile, body, submitted, "reflected"));
                }
            }
            Contract::Status { code } => {
                assertions.push(assert_equal(
                    format!("status is {}", code),
                    *code,
                    observed.status,
                ));
            }
        }

        assertions
    }
}

fn id_present(profile: &ApiProfile, body: &Value) -> Assertion {
    assert_condition(
        format!("response carries {}", profile.id_label()),
        || profile.id(body).is_some(),
    )
}

fn reflected_fields(
    profile: &ApiProfile,
    body: &Value,
    submitted: Option<&Value>,
    verb: &str,
) -> Vec<Assertion> {
    let Some(Value::Object(fields)) = submitted else {
        return Vec::new();
    };
    fields
        .iter()
        .map(|(name, expected)| {
            assert_equal(
                format!("{} {}", name, verb),
                expected.clone(),
                profile.field(body, name).cloned().unwrap_or(Value::Null),
            )
        })
        .collect()
}
