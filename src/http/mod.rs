//! HTTP verification
//!
//! - [`client`]: the HTTP collaborator trait and its reqwest binding
//! - [`verifier`]: request execution, outcome classification, explicit retry
//! - [`contract`]: per-method response contracts and response-shape profiles

pub mod client;
pub mod contract;
pub mod verifier;

pub use client::{HttpClient, HttpResponse, Method, ReqwestClient};
pub use contract::{ApiProfile, Contract, Strictness};
pub use verifier::{
    classify, retry_until_success, HttpVerifier, ObservedResponse, RequestSpec,
    VerificationOutcome,
};
