//! External session lifecycle
//!
//! A [`Session`] owns one stateful external resource: a browser driven over
//! WebDriver, or an HTTP client bound to an API. Sessions are only handed
//! out once they are usable, belong to exactly one scenario, and are
//! released on every exit path by [`scoped`].

pub mod api;
pub mod browser;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::Serialize;

use crate::common::{Error, Result};
use crate::poll::Cancellation;

pub use api::ApiHandle;
pub use browser::{BrowserHandle, BrowserOptions, PageState, Visibility};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Acquisition has not succeeded (yet)
    Uninitialized,
    /// Usable
    Ready,
    /// Released
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Ready => write!(f, "ready"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// The external resource behind a session
#[async_trait]
pub trait Handle: Send + Sync {
    /// Short name for logs ("api", "browser")
    fn kind(&self) -> &'static str;

    /// Free the external resource
    async fn close(&mut self) -> Result<()>;
}

/// An acquired external resource and its lifecycle state
pub struct Session<H: Handle> {
    handle: H,
    state: SessionState,
    label: String,
}

impl<H: Handle> Session<H> {
    /// Wrap a handle that finished acquisition
    ///
    /// Only acquisition functions construct sessions, so a session is never
    /// observed in any state but `Ready` before it is released.
    pub(crate) fn ready(label: impl Into<String>, handle: H) -> Self {
        let label = label.into();
        tracing::debug!(kind = handle.kind(), %label, "Session ready");
        Self {
            handle,
            state: SessionState::Ready,
            label,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn handle(&self) -> Result<&H> {
        self.ensure_ready()?;
        Ok(&self.handle)
    }

    pub fn handle_mut(&mut self) -> Result<&mut H> {
        self.ensure_ready()?;
        Ok(&mut self.handle)
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            SessionState::Ready => Ok(()),
            state => Err(Error::NotReady(format!(
                "{} session '{}' is {}",
                self.handle.kind(),
                self.label,
                state
            ))),
        }
    }

    /// Release the external resource
    ///
    /// Idempotent: only the first call closes the handle. Close failures
    /// are logged and swallowed so they never mask the scenario outcome.
    /// Returns whether this call performed the release.
    pub async fn release(&mut self) -> bool {
        if self.state != SessionState::Ready {
            return false;
        }
        self.state = SessionState::Closed;

        match self.handle.close().await {
            Ok(()) => {
                tracing::debug!(kind = self.handle.kind(), label = %self.label, "Session released");
            }
            Err(e) => {
                tracing::warn!(
                    kind = self.handle.kind(),
                    label = %self.label,
                    error = %e,
                    "Session release failed"
                );
            }
        }
        true
    }

    /// Release, giving up after `limit`
    pub async fn release_within(&mut self, limit: Duration) -> bool {
        let label = self.label.clone();
        match tokio::time::timeout(limit, self.release()).await {
            Ok(released) => released,
            Err(_) => {
                tracing::warn!(%label, ?limit, "Session release timed out");
                self.state = SessionState::Closed;
                true
            }
        }
    }
}

/// Work done with a session's handle inside [`scoped`]
#[async_trait]
pub trait SessionBody<H: Handle>: Send {
    type Output: Send;

    async fn run(self, handle: &mut H) -> Result<Self::Output>;
}

/// Run `body` with the session and release the session afterwards, on
/// every exit path.
///
/// The body's error is returned as-is; a panic becomes
/// [`Error::Internal`]; cancellation drops the body and yields
/// [`Error::Cancelled`]. In every case release is attempted, bounded by
/// `release_limit`. Returns the body result and the final session state.
pub async fn scoped<H, B>(
    mut session: Session<H>,
    body: B,
    cancel: &Cancellation,
    release_limit: Duration,
) -> (Result<B::Output>, SessionState)
where
    H: Handle,
    B: SessionBody<H>,
{
    let result = match session.handle_mut() {
        Ok(handle) => {
            let work = AssertUnwindSafe(body.run(handle)).catch_unwind();
            tokio::select! {
                outcome = work => match outcome {
                    Ok(result) => result,
                    Err(panic) => Err(Error::Internal(format!(
                        "scenario panicked: {}",
                        panic_message(panic.as_ref())
                    ))),
                },
                _ = cancel.cancelled() => Err(Error::Cancelled),
            }
        }
        Err(e) => Err(e),
    };

    session.release_within(release_limit).await;
    (result, session.state())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::cancellation;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingHandle {
        closes: Arc<AtomicU32>,
        fail_close: bool,
        hang_close: bool,
    }

    impl CountingHandle {
        fn new() -> (Self, Arc<AtomicU32>) {
            let closes = Arc::new(AtomicU32::new(0));
            (
                Self {
                    closes: closes.clone(),
                    fail_close: false,
                    hang_close: false,
                },
                closes,
            )
        }
    }

    #[async_trait]
    impl Handle for CountingHandle {
        fn kind(&self) -> &'static str {
            "counting"
        }

        async fn close(&mut self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.hang_close {
                std::future::pending::<()>().await;
            }
            if self.fail_close {
                return Err(Error::Internal("close failed".to_string()));
            }
            Ok(())
        }
    }

    struct Succeed;

    #[async_trait]
    impl SessionBody<CountingHandle> for Succeed {
        type Output = u32;

        async fn run(self, _handle: &mut CountingHandle) -> Result<u32> {
            Ok(7)
        }
    }

    struct Fail;

    #[async_trait]
    impl SessionBody<CountingHandle> for Fail {
        type Output = ();

        async fn run(self, _handle: &mut CountingHandle) -> Result<()> {
            Err(Error::AssertionMismatch("id equals 1".to_string()))
        }
    }

    struct Panic;

    #[async_trait]
    impl SessionBody<CountingHandle> for Panic {
        type Output = ();

        async fn run(self, _handle: &mut CountingHandle) -> Result<()> {
            panic!("driver exploded");
        }
    }

    struct Forever;

    #[async_trait]
    impl SessionBody<CountingHandle> for Forever {
        type Output = ();

        async fn run(self, _handle: &mut CountingHandle) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (handle, closes) = CountingHandle::new();
        let mut session = Session::ready("t", handle);

        assert!(session.release().await);
        assert!(!session.release().await);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(session.handle(), Err(Error::NotReady(_))));
    }

    #[tokio::test]
    async fn test_release_failure_is_swallowed() {
        let (mut handle, closes) = CountingHandle::new();
        handle.fail_close = true;
        let mut session = Session::ready("t", handle);

        assert!(session.release().await);
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scoped_releases_on_success_and_error() {
        let (handle, closes) = CountingHandle::new();
        let (result, state) = scoped(
            Session::ready("ok", handle),
            Succeed,
            &Cancellation::never(),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(state, SessionState::Closed);
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        let (handle, closes) = CountingHandle::new();
        let (result, state) = scoped(
            Session::ready("err", handle),
            Fail,
            &Cancellation::never(),
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(Error::AssertionMismatch(_))));
        assert_eq!(state, SessionState::Closed);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scoped_releases_after_panic() {
        let (handle, closes) = CountingHandle::new();
        let (result, state) = scoped(
            Session::ready("panic", handle),
            Panic,
            &Cancellation::never(),
            Duration::from_secs(1),
        )
        .await;

        match result {
            Err(Error::Internal(msg)) => assert!(msg.contains("driver exploded")),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert_eq!(state, SessionState::Closed);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_releases_within_limit() {
        let (handle, cancel) = cancellation();
        let (mut counting, closes) = CountingHandle::new();
        counting.hang_close = true;

        let task = tokio::spawn(async move {
            scoped(
                Session::ready("cancelled", counting),
                Forever,
                &cancel,
                Duration::from_secs(2),
            )
            .await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();

        let started = tokio::time::Instant::now();
        let (result, state) = task.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(state, SessionState::Closed);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() <= Duration::from_secs(2));
    }
}
