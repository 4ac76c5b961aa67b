//! Scenario runner
//!
//! Drives one scenario through `Init -> SessionAcquired -> Interacting ->
//! Verifying -> Completed`. Steps run strictly in order against a session
//! the scenario owns, and each step re-enters `Interacting` or `Verifying`,
//! so a multi-step scenario cycles between the two. The session is released
//! on every path once it was acquired.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::Instrument;

use crate::assertion::{assert_condition, assert_contains, Assertion, ScenarioResult};
use crate::browser::BrowserLauncher;
use crate::common::config::Config;
use crate::common::{resolve_url, Error, Result};
use crate::http::{retry_until_success, HttpClient, RequestSpec};
use crate::poll::{Cancellation, PollOptions};
use crate::session::{
    self, api, browser, ApiHandle, BrowserHandle, BrowserOptions, Handle, Session,
    SessionBody, SessionState, Visibility,
};

use super::config::{ScenarioDef, SessionKind, Step};

/// Everything a scenario needs from its surroundings
pub struct RunContext {
    pub config: Config,
    pub launcher: Arc<dyn BrowserLauncher>,
    /// Shared HTTP client; when unset each API scenario builds its own
    pub http: Option<Arc<dyn HttpClient>>,
    pub cancel: Cancellation,
}

/// Where a scenario is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    SessionAcquired,
    Interacting,
    Verifying,
    Completed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::SessionAcquired => write!(f, "session_acquired"),
            Self::Interacting => write!(f, "interacting"),
            Self::Verifying => write!(f, "verifying"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug)]
struct PhaseTracker {
    current: Phase,
}

impl PhaseTracker {
    fn new() -> Self {
        Self {
            current: Phase::Init,
        }
    }

    /// Whether `next` may follow the current phase
    ///
    /// Only the per-step cycle between `Interacting` and `Verifying` goes
    /// back; `Init` and `SessionAcquired` are never re-entered and nothing
    /// leaves `Completed`.
    fn allows(&self, next: Phase) -> bool {
        match (self.current, next) {
            (Phase::Completed, _) | (_, Phase::Init) => false,
            (from, Phase::SessionAcquired) => from == Phase::Init,
            (Phase::Init, Phase::Interacting | Phase::Verifying) => false,
            _ => true,
        }
    }

    fn enter(&mut self, next: Phase) {
        if self.current == next {
            return;
        }
        if !self.allows(next) {
            tracing::warn!(from = %self.current, to = %next, "Ignoring out-of-order phase");
            return;
        }
        tracing::debug!(from = %self.current, to = %next, "Phase");
        self.current = next;
    }
}

/// Run one scenario to completion
///
/// Never fails: every error is folded into the returned result.
pub async fn run_scenario(def: &ScenarioDef, ctx: &RunContext) -> ScenarioResult {
    let span = tracing::info_span!("scenario", name = %def.name, session = %def.session);
    execute(def, ctx).instrument(span).await
}

async fn execute(def: &ScenarioDef, ctx: &RunContext) -> ScenarioResult {
    let started = Instant::now();
    let mut phases = PhaseTracker::new();

    if ctx.cancel.is_cancelled() {
        return ScenarioResult::new(
            &def.name,
            Vec::new(),
            Some(&Error::Cancelled),
            started.elapsed(),
            SessionState::Uninitialized,
        );
    }

    let mut assertions = Vec::new();
    let (error, session) = match def.session {
        SessionKind::Api => {
            let acquired = match &ctx.http {
                Some(client) => Ok(api::acquire_with(client.clone(), &ctx.config)),
                None => api::acquire(&ctx.config),
            };
            match acquired {
                Ok(session) => {
                    let steps = Steps::new(def, ctx, &mut assertions, &mut phases);
                    drive(session, steps, ctx).await
                }
                Err(e) => acquisition_failed(e),
            }
        }
        SessionKind::Browser => {
            let acquired = match browser_options(def, &ctx.config) {
                Ok(options) => browser::acquire(&*ctx.launcher, &options, &ctx.cancel).await,
                Err(e) => Err(e),
            };
            match acquired {
                Ok(session) => {
                    let steps = Steps::new(def, ctx, &mut assertions, &mut phases);
                    drive(session, steps, ctx).await
                }
                Err(e) => acquisition_failed(e),
            }
        }
    };

    phases.enter(Phase::Completed);
    let result = ScenarioResult::new(
        &def.name,
        assertions,
        error.as_ref(),
        started.elapsed(),
        session,
    );
    tracing::info!(
        outcome = %result.outcome,
        assertions = result.assertions.len(),
        duration = ?result.duration,
        "Scenario completed"
    );
    result
}

fn browser_options(def: &ScenarioDef, config: &Config) -> Result<BrowserOptions> {
    Ok(BrowserOptions {
        start_url: resolve_url(&config.target.ui_url, def.start.as_deref().unwrap_or("")),
        readiness: config.timeouts.readiness_options()?,
        release_limit: config.timeouts.release(),
    })
}

fn acquisition_failed(e: Error) -> (Option<Error>, SessionState) {
    tracing::warn!(error = %e, "Session acquisition failed");
    (Some(e), SessionState::Uninitialized)
}

/// Run the steps inside the session scope
async fn drive<H, B>(session: Session<H>, steps: B, ctx: &RunContext) -> (Option<Error>, SessionState)
where
    H: Handle,
    B: SessionBody<H, Output = ()>,
{
    let (result, state) =
        session::scoped(session, steps, &ctx.cancel, ctx.config.timeouts.release()).await;

    match result {
        Ok(()) => (None, state),
        Err(e) if e.is_infrastructure() => {
            tracing::warn!(error = %e, code = e.code(), "Scenario stopped");
            (Some(e), state)
        }
        Err(e) => (Some(e), state),
    }
}

/// The step sequence of one scenario, run inside its session scope
struct Steps<'a> {
    def: &'a ScenarioDef,
    ctx: &'a RunContext,
    assertions: &'a mut Vec<Assertion>,
    phases: &'a mut PhaseTracker,
}

impl<'a> Steps<'a> {
    fn new(
        def: &'a ScenarioDef,
        ctx: &'a RunContext,
        assertions: &'a mut Vec<Assertion>,
        phases: &'a mut PhaseTracker,
    ) -> Self {
        phases.enter(Phase::SessionAcquired);
        Self {
            def,
            ctx,
            assertions,
            phases,
        }
    }

    fn config(&self) -> &Config {
        &self.ctx.config
    }

    fn wait_options(&self, timeout: Option<u64>) -> Result<PollOptions> {
        self.config().timeouts.wait_options(timeout)
    }

    /// Record assertions
    ///
    /// The first failed one becomes [`Error::AssertionMismatch`], which ends
    /// the scenario as Failed.
    fn record(&mut self, new: Vec<Assertion>) -> Result<()> {
        let mismatch = new.iter().find(|a| !a.passed).map(Assertion::mismatch);
        for assertion in &new {
            if assertion.passed {
                tracing::debug!(description = %assertion.description, "Assertion passed");
            } else {
                tracing::info!(mismatch = %assertion.mismatch(), "Assertion failed");
            }
        }
        self.assertions.extend(new);
        match mismatch {
            Some(mismatch) => Err(Error::AssertionMismatch(mismatch)),
            None => Ok(()),
        }
    }

    fn log_stop(&self, index: usize, step: &Step, error: &Error) {
        let remaining = self.def.steps.len() - index - 1;
        if remaining > 0 {
            tracing::info!(
                step = %step.label(),
                remaining,
                code = error.code(),
                "Skipping remaining steps"
            );
        }
    }

    async fn request(&mut self, api: &ApiHandle, step: &Step) -> Result<()> {
        let Step::Request {
            method,
            path,
            body,
            headers,
            accept,
            timeout,
            retry,
            strictness,
            expect,
        } = step
        else {
            return Err(Error::Internal(format!("{} is not a request", step.label())));
        };

        let request_timeout = timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.config().timeouts.request());
        let mut spec = RequestSpec::new(*method, path.clone()).with_timeout(request_timeout);
        if let Some(body) = body {
            spec = spec.with_body(body.clone());
        }
        for (name, value) in headers {
            spec = spec.with_header(name.clone(), value.clone());
        }
        for status in accept {
            spec = spec.accepting(*status);
        }

        self.phases.enter(Phase::Interacting);
        let outcome = match retry {
            Some(policy) => {
                let options = policy.options(&self.config().timeouts)?;
                retry_until_success(api.verifier(), &spec, &options, &self.ctx.cancel).await?
            }
            None => api.verifier().execute(&spec).await,
        };
        let observed = outcome.into_result()?;

        self.phases.enter(Phase::Verifying);
        let Some(contract) = expect else {
            return Ok(());
        };
        let strictness = strictness.unwrap_or(api.strictness());
        let assertions = contract.evaluate(&observed, body.as_ref(), api.profile(), strictness);
        self.record(assertions)
    }

    async fn browser_step(&mut self, page: &mut BrowserHandle, step: &Step) -> Result<()> {
        match step {
            Step::Navigate { url } => {
                self.phases.enter(Phase::Interacting);
                let url = resolve_url(&self.config().target.ui_url, url);
                page.navigate(&url).await?;
            }
            Step::Refresh { wait_ready } => {
                self.phases.enter(Phase::Interacting);
                if *wait_ready {
                    page.reload().await?;
                } else {
                    page.refresh().await?;
                }
            }
            Step::Click {
                locator,
                navigates,
                timeout,
            } => {
                self.phases.enter(Phase::Interacting);
                let element = page
                    .wait_for_element(locator, Visibility::Visible, &self.wait_options(*timeout)?)
                    .await?;
                page.click(&element, *navigates).await?;
            }
            Step::Type {
                locator,
                text,
                submit,
                timeout,
            } => {
                self.phases.enter(Phase::Interacting);
                let element = page
                    .wait_for_element(locator, Visibility::Visible, &self.wait_options(*timeout)?)
                    .await?;
                page.type_text(&element, text, *submit).await?;
            }
            Step::WaitForElement {
                locator,
                visibility,
                timeout,
            } => {
                self.phases.enter(Phase::Interacting);
                page.wait_for_element(locator, *visibility, &self.wait_options(*timeout)?)
                    .await?;
            }
            Step::WaitForText {
                locator,
                contains,
                timeout,
                expect_timeout,
            } => {
                self.phases.enter(Phase::Verifying);
                let options = self.wait_options(*timeout)?;
                let outcome = page.wait_for_text(locator, contains, &options).await?;
                let assertion = if *expect_timeout {
                    assert_condition(
                        format!("'{}' never appears in {}", contains, locator),
                        || !outcome.is_satisfied(),
                    )
                } else {
                    outcome.into_result(&format!("'{}' in {}", contains, locator))?;
                    assert_condition(format!("{} contains '{}'", locator, contains), || {
                        outcome.is_satisfied()
                    })
                };
                return self.record(vec![assertion]);
            }
            Step::AssertText { locator, contains } => {
                self.phases.enter(Phase::Verifying);
                let element = page
                    .find(locator)
                    .await?
                    .ok_or_else(|| Error::ElementNotFound(locator.to_string()))?;
                let text = page.text(&element).await?;
                let assertion =
                    assert_contains(format!("{} contains '{}'", locator, contains), contains, &text);
                return self.record(vec![assertion]);
            }
            Step::Request { .. } => {
                return Err(Error::Internal(format!(
                    "{} cannot run in a browser session",
                    step.label()
                )))
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SessionBody<ApiHandle> for Steps<'_> {
    type Output = ();

    async fn run(mut self, api: &mut ApiHandle) -> Result<()> {
        let def = self.def;
        for (index, step) in def.steps.iter().enumerate() {
            tracing::debug!(step = index + 1, action = %step.label(), "Step");
            if let Err(e) = self.request(api, step).await {
                self.log_stop(index, step, &e);
                return Err(e);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SessionBody<BrowserHandle> for Steps<'_> {
    type Output = ();

    async fn run(mut self, page: &mut BrowserHandle) -> Result<()> {
        let def = self.def;
        for (index, step) in def.steps.iter().enumerate() {
            tracing::debug!(step = index + 1, action = %step.label(), "Step");
            if let Err(e) = self.browser_step(page, step).await {
                self.log_stop(index, step, &e);
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::ScenarioOutcome;
    use crate::browser::fake::{FakeBrowser, FakeLauncher};
    use crate::http::client::{HttpResponse, Method};
    use crate::http::Strictness;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Minimal users API: answers from a queue, then repeats the last entry
    struct StubApi {
        responses: Mutex<VecDeque<(u16, &'static str)>>,
        requests: Mutex<Vec<(Method, String)>>,
    }

    impl StubApi {
        fn new(responses: &[(u16, &'static str)]) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.iter().copied().collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HttpClient for StubApi {
        async fn send(
            &self,
            method: Method,
            url: &str,
            _headers: &[(String, String)],
            _body: Option<&[u8]>,
            _timeout: Duration,
        ) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push((method, url.to_string()));
            let mut queue = self.responses.lock().unwrap();
            let (status, body) = if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                *queue.front().unwrap()
            };
            Ok(HttpResponse {
                status,
                headers: Vec::new(),
                body: body.as_bytes().to_vec(),
            })
        }
    }

    fn context(http: Arc<StubApi>, launcher: FakeLauncher) -> RunContext {
        let mut config = Config::default();
        config.target.base_url = "http://stub.test".to_string();
        config.timeouts.wait_secs = 2;
        config.timeouts.poll_interval_ms = 200;
        config.timeouts.readiness_secs = 2;
        RunContext {
            config,
            launcher: Arc::new(launcher),
            http: Some(http),
            cancel: Cancellation::never(),
        }
    }

    fn scenario(yaml: &str) -> ScenarioDef {
        ScenarioDef::from_yaml(yaml, "test").unwrap()
    }

    const UPDATE: &str = r#"
name: update-user
steps:
  - action: request
    method: PUT
    path: /users/1
    body: { email: newjohn@example.com }
    expect: { kind: update, id: 1 }
"#;

    #[tokio::test]
    async fn test_update_against_acknowledging_stub() {
        let api = StubApi::new(&[(200, r#"{"id": 1}"#)]);

        let ctx = context(api.clone(), FakeLauncher::default());
        let strict = run_scenario(&scenario(UPDATE), &ctx).await;
        assert_eq!(strict.outcome, ScenarioOutcome::Failed);
        assert_eq!(strict.session, SessionState::Closed);
        assert_eq!(
            strict.failed_assertions().next().unwrap().description,
            "email reflected"
        );
        assert_eq!(strict.error_code.as_deref(), Some("ASSERTION_MISMATCH"));
        assert!(strict.error.as_deref().unwrap().contains("email reflected"));

        let mut ctx = context(api, FakeLauncher::default());
        ctx.config.verification.strictness = Strictness::Lenient;
        let lenient = run_scenario(&scenario(UPDATE), &ctx).await;
        assert_eq!(lenient.outcome, ScenarioOutcome::Passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_against_failing_stub_errors_after_retries() {
        let yaml = r#"
name: create-user
steps:
  - action: request
    method: POST
    path: /users
    body: { name: John Doe }
    retry: {}
    expect: { kind: create }
"#;
        let api = StubApi::new(&[(500, "")]);
        let ctx = context(api.clone(), FakeLauncher::default());

        let result = run_scenario(&scenario(yaml), &ctx).await;
        assert_eq!(result.outcome, ScenarioOutcome::Errored);
        assert_eq!(result.error_code.as_deref(), Some("TIMEOUT"));
        assert_eq!(result.session, SessionState::Closed);
        // 2s budget at 200ms intervals
        assert_eq!(api.request_count(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_failures() {
        let yaml = r#"
name: get-user
steps:
  - action: request
    method: GET
    path: /users/1
    retry: {}
    expect: { kind: fetch, id: 1 }
"#;
        let api = StubApi::new(&[(503, ""), (502, ""), (200, r#"{"id": 1}"#)]);
        let ctx = context(api.clone(), FakeLauncher::default());

        let result = run_scenario(&scenario(yaml), &ctx).await;
        assert_eq!(result.outcome, ScenarioOutcome::Passed);
        assert_eq!(api.request_count(), 3);
    }

    #[test]
    fn test_phases_cycle_per_step_but_never_rewind() {
        let mut phases = PhaseTracker::new();
        phases.enter(Phase::Interacting);
        assert_eq!(phases.current, Phase::Init);

        for next in [
            Phase::SessionAcquired,
            Phase::Interacting,
            Phase::Verifying,
            Phase::Interacting,
            Phase::Verifying,
        ] {
            phases.enter(next);
            assert_eq!(phases.current, next);
        }

        phases.enter(Phase::SessionAcquired);
        assert_eq!(phases.current, Phase::Verifying);

        phases.enter(Phase::Completed);
        phases.enter(Phase::Interacting);
        assert_eq!(phases.current, Phase::Completed);
    }

    #[test]
    fn test_failed_acquisition_completes_from_init() {
        let mut phases = PhaseTracker::new();
        phases.enter(Phase::Completed);
        assert_eq!(phases.current, Phase::Completed);
    }

    #[tokio::test]
    async fn test_failed_step_stops_remaining_steps() {
        let yaml = r#"
name: two-gets
steps:
  - action: request
    method: GET
    path: /users/1
    expect: { kind: fetch, id: 1 }
  - action: request
    method: GET
    path: /users/2
    expect: { kind: fetch, id: 2 }
"#;
        let api = StubApi::new(&[(200, r#"{"id": 99}"#)]);
        let ctx = context(api.clone(), FakeLauncher::default());

        let result = run_scenario(&scenario(yaml), &ctx).await;
        assert_eq!(result.outcome, ScenarioOutcome::Failed);
        assert_eq!(result.error_code.as_deref(), Some("ASSERTION_MISMATCH"));
        assert_eq!(api.request_count(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_errored_unless_accepted() {
        let fetch = r#"
name: missing-user
steps:
  - action: request
    method: GET
    path: /users/999
    expect: { kind: fetch, id: 999 }
"#;
        let api = StubApi::new(&[(404, "{}")]);
        let ctx = context(api.clone(), FakeLauncher::default());
        let result = run_scenario(&scenario(fetch), &ctx).await;
        assert_eq!(result.outcome, ScenarioOutcome::Errored);
        assert_eq!(result.error_code.as_deref(), Some("FATAL"));

        let accepted = r#"
name: missing-user
steps:
  - action: request
    method: GET
    path: /users/999
    accept: [404]
    expect: { kind: status, code: 404 }
"#;
        let result = run_scenario(&scenario(accepted), &ctx).await;
        assert_eq!(result.outcome, ScenarioOutcome::Passed);
    }

    const TEXT_BOX: &str = r#"
name: verify-user-ui
session: browser
steps:
  - action: click
    locator: { link_text: Text Box }
    navigates: true
  - action: type
    locator: { id: userName }
    text: John Doe
    submit: true
  - action: wait_for_text
    locator: { id: output }
    contains: John Doe
"#;

    #[tokio::test(start_paused = true)]
    async fn test_browser_scenario_passes_and_releases() {
        let browser = FakeBrowser::text_box_form();
        let launcher = FakeLauncher::new(browser.clone());
        let ctx = context(StubApi::new(&[(200, "{}")]), launcher);

        let result = run_scenario(&scenario(TEXT_BOX), &ctx).await;
        assert_eq!(result.outcome, ScenarioOutcome::Passed, "{:?}", result.error);
        assert_eq!(result.assertions.len(), 1);
        assert_eq!(result.session, SessionState::Closed);
        assert_eq!(browser.state().closes, 1);
        assert_eq!(browser.state().navigations, vec!["https://demoqa.com"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout_is_errored_unless_expected() {
        let browser = FakeBrowser::text_box_form();
        let ctx = context(StubApi::new(&[(200, "{}")]), FakeLauncher::new(browser));

        let waits = r#"
name: absent
session: browser
steps:
  - action: wait_for_text
    locator: { id: output }
    contains: Jane Roe
"#;
        let result = run_scenario(&scenario(waits), &ctx).await;
        assert_eq!(result.outcome, ScenarioOutcome::Errored);
        assert_eq!(result.error_code.as_deref(), Some("TIMEOUT"));

        let negative = r#"
name: absent
session: browser
steps:
  - action: wait_for_text
    locator: { id: output }
    contains: Jane Roe
    expect_timeout: true
"#;
        let result = run_scenario(&scenario(negative), &ctx).await;
        assert_eq!(result.outcome, ScenarioOutcome::Passed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_without_wait_makes_next_step_not_ready() {
        let yaml = r#"
name: stale-page
session: browser
steps:
  - action: refresh
    wait_ready: false
  - action: click
    locator: { link_text: Text Box }
"#;
        let browser = FakeBrowser::text_box_form();
        let ctx = context(StubApi::new(&[(200, "{}")]), FakeLauncher::new(browser.clone()));

        let result = run_scenario(&scenario(yaml), &ctx).await;
        assert_eq!(result.outcome, ScenarioOutcome::Errored);
        assert_eq!(result.error_code.as_deref(), Some("NOT_READY"));
        assert!(browser.state().clicks.is_empty());
        assert_eq!(browser.state().closes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquisition_failure_never_releases() {
        let launcher = FakeLauncher {
            fail_launch: true,
            ..FakeLauncher::default()
        };
        let browser = launcher.browser.clone();
        let ctx = context(StubApi::new(&[(200, "{}")]), launcher);

        let result = run_scenario(&scenario(TEXT_BOX), &ctx).await;
        assert_eq!(result.outcome, ScenarioOutcome::Errored);
        assert_eq!(result.error_code.as_deref(), Some("ACQUISITION"));
        assert_eq!(result.session, SessionState::Uninitialized);
        assert_eq!(browser.state().closes, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (handle, cancel) = crate::poll::cancellation();
        handle.cancel();
        let mut ctx = context(StubApi::new(&[(200, "{}")]), FakeLauncher::default());
        ctx.cancel = cancel;

        let result = run_scenario(&scenario(UPDATE), &ctx).await;
        assert_eq!(result.outcome, ScenarioOutcome::Errored);
        assert_eq!(result.error_code.as_deref(), Some("CANCELLED"));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::SessionAcquired.to_string(), "session_acquired");
        let mut tracker = PhaseTracker::new();
        tracker.enter(Phase::SessionAcquired);
        tracker.enter(Phase::Interacting);
        assert_eq!(tracker.current, Phase::Interacting);
    }
}
