//! API sessions: an HTTP client bound to one base URL

use std::sync::Arc;

use async_trait::async_trait;

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::http::{ApiProfile, HttpClient, HttpVerifier, ReqwestClient, Strictness};

use super::{Handle, Session};

pub struct ApiHandle {
    verifier: HttpVerifier,
    profile: ApiProfile,
    strictness: Strictness,
}

#[async_trait]
impl Handle for ApiHandle {
    fn kind(&self) -> &'static str {
        "api"
    }

    async fn close(&mut self) -> Result<()> {
        // Connections are pooled per client and dropped with it
        Ok(())
    }
}

impl ApiHandle {
    pub fn verifier(&self) -> &HttpVerifier {
        &self.verifier
    }

    pub fn profile(&self) -> &ApiProfile {
        &self.profile
    }

    pub fn strictness(&self) -> Strictness {
        self.strictness
    }
}

/// Build a reqwest-backed session from configuration
pub fn acquire(config: &Config) -> Result<Session<ApiHandle>> {
    let client = ReqwestClient::new(&config.target.headers)
        .map_err(|e| Error::Acquisition(format!("could not build HTTP client: {}", e)))?;
    Ok(acquire_with(Arc::new(client), config))
}

/// Build a session around an existing client
pub fn acquire_with(client: Arc<dyn HttpClient>, config: &Config) -> Session<ApiHandle> {
    let base_url = config.target.base_url.clone();
    let handle = ApiHandle {
        verifier: HttpVerifier::new(client, base_url.clone()),
        profile: config.target.profile.clone(),
        strictness: config.verification.strictness,
    };
    Session::ready(base_url, handle)
}
