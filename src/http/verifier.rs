//! HTTP verifier
//!
//! Executes one request and classifies what happened. The verifier never
//! retries on its own: retrying is an explicit composition with the
//! condition poller ([`retry_until_success`]), so every report can say
//! whether a failure was transient or fatal and how many attempts it took.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use crate::common::{resolve_url, Error, Result};
use crate::poll::{wait_until, Cancellation, PollOptions, PollOutcome};

use super::client::{HttpClient, Method};

/// Request timeout used when a request does not set one
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// One HTTP call, fully described
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    /// Path resolved against the verifier's base URL, or an absolute URL
    pub target: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    /// Non-2xx status codes the caller declares as acceptable outcomes
    pub accept: Vec<u16>,
}

impl RequestSpec {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            body: None,
            headers: Vec::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            accept: Vec::new(),
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::Get, target)
    }

    pub fn post(target: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, target).with_body(body)
    }

    pub fn put(target: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, target).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Declare a status code as an accepted outcome (negative tests)
    pub fn accepting(mut self, status: u16) -> Self {
        self.accept.push(status);
        self
    }
}

/// What the external system answered with
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedResponse {
    pub status: u16,
    pub body: Value,
}

/// Classified result of one request
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationOutcome {
    Success(ObservedResponse),
    /// 5xx, connection failure or request timeout; a retry may cure it
    TransientFailure { cause: String, attempts: u32 },
    /// Unexpected status or malformed body; retrying will not help
    FatalFailure { cause: String },
}

impl VerificationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, VerificationOutcome::Success(_))
    }

    /// Convert into the observed response, or the matching error
    pub fn into_result(self) -> Result<ObservedResponse> {
        match self {
            VerificationOutcome::Success(observed) => Ok(observed),
            VerificationOutcome::TransientFailure { cause, attempts } => Err(Error::Transient(
                format!("{} (after {} attempt(s))", cause, attempts),
            )),
            VerificationOutcome::FatalFailure { cause } => Err(Error::Fatal(cause)),
        }
    }
}

/// Classify a received response
pub fn classify(status: u16, body: &[u8], accept: &[u16]) -> VerificationOutcome {
    if accept.contains(&status) {
        let body = serde_json::from_slice(body).unwrap_or(Value::Null);
        return VerificationOutcome::Success(ObservedResponse { status, body });
    }

    match status {
        200..=299 => match parse_body(body) {
            Ok(body) => VerificationOutcome::Success(ObservedResponse { status, body }),
            Err(e) => VerificationOutcome::FatalFailure {
                cause: format!("status {} with malformed body: {}", status, e),
            },
        },
        500..=599 => VerificationOutcome::TransientFailure {
            cause: format!("server error: status {}", status),
            attempts: 1,
        },
        400..=499 => VerificationOutcome::FatalFailure {
            cause: format!("client error: status {}", status),
        },
        _ => VerificationOutcome::FatalFailure {
            cause: format!("unexpected status {}", status),
        },
    }
}

fn parse_body(body: &[u8]) -> std::result::Result<Value, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
}

/// Issues requests against one base URL through an [`HttpClient`]
#[derive(Clone)]
pub struct HttpVerifier {
    client: Arc<dyn HttpClient>,
    base_url: String,
}

impl HttpVerifier {
    pub fn new(client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a request exactly once and classify the result
    pub async fn execute(&self, spec: &RequestSpec) -> VerificationOutcome {
        let url = resolve_url(&self.base_url, &spec.target);

        let body = match spec.body.as_ref().map(serde_json::to_vec).transpose() {
            Ok(body) => body,
            Err(e) => {
                return VerificationOutcome::FatalFailure {
                    cause: format!("could not encode request body: {}", e),
                }
            }
        };

        tracing::debug!(method = %spec.method, %url, "Sending request");
        let response = self
            .client
            .send(
                spec.method,
                &url,
                &spec.headers,
                body.as_deref(),
                spec.timeout,
            )
            .await;

        let outcome = match response {
            Ok(response) => classify(response.status, &response.body, &spec.accept),
            Err(e) if e.is_transient() => VerificationOutcome::TransientFailure {
                cause: e.to_string(),
                attempts: 1,
            },
            Err(e) => VerificationOutcome::FatalFailure {
                cause: e.to_string(),
            },
        };

        match &outcome {
            VerificationOutcome::Success(observed) => {
                tracing::debug!(method = %spec.method, %url, status = observed.status, "Request succeeded");
            }
            VerificationOutcome::TransientFailure { cause, .. } => {
                tracing::info!(method = %spec.method, %url, %cause, "Transient failure");
            }
            VerificationOutcome::FatalFailure { cause } => {
                tracing::warn!(method = %spec.method, %url, %cause, "Fatal failure");
            }
        }

        outcome
    }
}

/// Retry a request through the condition poller until it succeeds
///
/// Transient failures keep the poll going; a fatal failure ends it at once
/// and is returned unchanged. When the deadline passes first, the result is
/// [`Error::Timeout`] naming the last transient cause and the attempt count.
pub async fn retry_until_success(
    verifier: &HttpVerifier,
    spec: &RequestSpec,
    options: &PollOptions,
    cancel: &Cancellation,
) -> Result<VerificationOutcome> {
    let last: Mutex<Option<VerificationOutcome>> = Mutex::new(None);
    let slot = &last;

    let polled = wait_until(
        move || async move {
            let outcome = verifier.execute(spec).await;
            let verdict = match &outcome {
                VerificationOutcome::Success(_) => Ok(true),
                VerificationOutcome::TransientFailure { .. } => Ok(false),
                VerificationOutcome::FatalFailure { cause } => Err(Error::Fatal(cause.clone())),
            };
            if let Ok(mut slot) = slot.lock() {
                *slot = Some(outcome);
            }
            verdict
        },
        options,
        cancel,
    )
    .await;

    let last = last.into_inner().ok().flatten();

    match polled {
        Ok(PollOutcome::Satisfied { attempts, .. }) => {
            tracing::debug!(attempts, target = %spec.target, "Request succeeded after retry");
            last.ok_or_else(|| Error::Internal("retry finished without an outcome".to_string()))
        }
        Ok(PollOutcome::TimedOut { attempts, elapsed }) => {
            let cause = match last {
                Some(VerificationOutcome::TransientFailure { cause, .. }) => cause,
                _ => "no successful response".to_string(),
            };
            Err(Error::Timeout {
                what: format!(
                    "{} {} to succeed (last: {}, {} attempts)",
                    spec.method, spec.target, cause, attempts
                ),
                after: elapsed,
            })
        }
        Err(Error::Fatal(_)) => match last {
            Some(fatal @ VerificationOutcome::FatalFailure { .. }) => Ok(fatal),
            _ => Err(Error::Internal("fatal failure without an outcome".to_string())),
        },
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::client::HttpResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays scripted responses, repeating the last one forever
    struct ScriptedClient {
        script: Vec<std::result::Result<(u16, &'static str), &'static str>>,
        calls: AtomicU32,
        seen: Mutex<Vec<(Method, String, Option<Vec<u8>>)>>,
    }

    impl ScriptedClient {
        fn new(script: Vec<std::result::Result<(u16, &'static str), &'static str>>) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn send(
            &self,
            method: Method,
            url: &str,
            _headers: &[(String, String)],
            body: Option<&[u8]>,
            _timeout: Duration,
        ) -> Result<HttpResponse> {
            self.seen
                .lock()
                .unwrap()
                .push((method, url.to_string(), body.map(|b| b.to_vec())));
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.script[n.min(self.script.len() - 1)] {
                Ok((status, body)) => Ok(HttpResponse {
                    status,
                    headers: Vec::new(),
                    body: body.as_bytes().to_vec(),
                }),
                Err("timeout") => Err(Error::RequestTimeout(Duration::from_secs(5))),
                Err(msg) => Err(Error::Connection(msg.to_string())),
            }
        }
    }

    fn opts(timeout_ms: u64, interval_ms: u64) -> PollOptions {
        PollOptions::new(Duration::from_millis(timeout_ms))
            .unwrap()
            .with_interval(Duration::from_millis(interval_ms))
            .unwrap()
    }

    #[test]
    fn test_classify_table() {
        assert!(classify(200, br#"{"id":1}"#, &[]).is_success());
        assert!(classify(204, b"", &[]).is_success());
        assert!(matches!(
            classify(200, b"<html>", &[]),
            VerificationOutcome::FatalFailure { .. }
        ));
        assert!(matches!(
            classify(503, b"", &[]),
            VerificationOutcome::TransientFailure { attempts: 1, .. }
        ));
        assert!(matches!(
            classify(404, b"{}", &[]),
            VerificationOutcome::FatalFailure { .. }
        ));
        assert!(matches!(
            classify(302, b"", &[]),
            VerificationOutcome::FatalFailure { .. }
        ));
    }

    #[test]
    fn test_accepted_status_is_success() {
        match classify(404, b"not json", &[404]) {
            VerificationOutcome::Success(observed) => {
                assert_eq!(observed.status, 404);
                assert_eq!(observed.body, Value::Null);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_resolves_url_and_sends_json_body() {
        let client = ScriptedClient::new(vec![Ok((201, r#"{"id":11}"#))]);
        let verifier = HttpVerifier::new(client.clone(), "http://stub.local/");

        let outcome = verifier
            .execute(&RequestSpec::post("/users", json!({"name": "John Doe"})))
            .await;

        assert_eq!(
            outcome,
            VerificationOutcome::Success(ObservedResponse {
                status: 201,
                body: json!({"id": 11})
            })
        );
        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].0, Method::Post);
        assert_eq!(seen[0].1, "http://stub.local/users");
        let sent: Value = serde_json::from_slice(seen[0].2.as_ref().unwrap()).unwrap();
        assert_eq!(sent, json!({"name": "John Doe"}));
    }

    #[tokio::test]
    async fn test_transport_errors_are_transient() {
        let client = ScriptedClient::new(vec![Err("connection reset")]);
        let verifier = HttpVerifier::new(client, "http://stub.local");
        let outcome = verifier.execute(&RequestSpec::get("/users/1")).await;
        assert!(matches!(outcome, VerificationOutcome::TransientFailure { .. }));

        let client = ScriptedClient::new(vec![Err("timeout")]);
        let verifier = HttpVerifier::new(client, "http://stub.local");
        let outcome = verifier.execute(&RequestSpec::get("/users/1")).await;
        assert!(matches!(outcome, VerificationOutcome::TransientFailure { .. }));
    }

    #[tokio::test]
    async fn test_execute_never_retries_by_itself() {
        let client = ScriptedClient::new(vec![Ok((500, ""))]);
        let verifier = HttpVerifier::new(client.clone(), "http://stub.local");
        let _ = verifier.execute(&RequestSpec::get("/users/1")).await;
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_failures() {
        let client = ScriptedClient::new(vec![
            Ok((503, "")),
            Err("connection reset"),
            Ok((200, r#"{"id":1}"#)),
        ]);
        let verifier = HttpVerifier::new(client.clone(), "http://stub.local");

        let outcome = retry_until_success(
            &verifier,
            &RequestSpec::get("/users/1"),
            &opts(5000, 100),
            &Cancellation::never(),
        )
        .await
        .unwrap();

        assert!(outcome.is_success());
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_times_out_when_never_recovering() {
        let client = ScriptedClient::new(vec![Ok((500, ""))]);
        let verifier = HttpVerifier::new(client, "http://stub.local");

        let result = retry_until_success(
            &verifier,
            &RequestSpec::post("/users", json!({"name": "John Doe"})),
            &opts(1000, 250),
            &Cancellation::never(),
        )
        .await;

        match result {
            Err(Error::Timeout { what, after }) => {
                assert!(what.contains("server error: status 500"));
                assert!(after >= Duration::from_millis(1000));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_on_fatal_failure() {
        let client = ScriptedClient::new(vec![Ok((503, "")), Ok((404, "{}"))]);
        let verifier = HttpVerifier::new(client.clone(), "http://stub.local");

        let outcome = retry_until_success(
            &verifier,
            &RequestSpec::get("/users/99"),
            &opts(5000, 100),
            &Cancellation::never(),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, VerificationOutcome::FatalFailure { .. }));
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_into_result() {
        let transient = VerificationOutcome::TransientFailure {
            cause: "server error: status 502".into(),
            attempts: 3,
        };
        assert!(matches!(transient.into_result(), Err(Error::Transient(m)) if m.contains("3 attempt")));
        let fatal = VerificationOutcome::FatalFailure { cause: "x".into() };
        assert!(matches!(fatal.into_result(), Err(Error::Fatal(_))));
    }
}
