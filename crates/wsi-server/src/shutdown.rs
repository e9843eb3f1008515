//! Stop accepting, cancel sessions, then wait for them to drain.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Drain budget used when the caller passes `None`.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// One cancellation token plus a tracker of live sessions.
///
/// The serve loop and every session writer watch the token; sessions are
/// registered through [`track`](Self::track) so draining does not need their
/// join handles.
#[derive(Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// Fresh coordinator with nothing cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle on the shared token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the token. Calling it again does nothing.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Register a session so draining waits for it.
    pub fn track<F>(&self, fut: F) -> impl Future<Output = F::Output> + Send + 'static
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.sessions.track_future(fut)
    }

    /// Sessions registered and not yet finished.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Cancel, then wait for `handles` and every tracked session.
    ///
    /// Returns `false` if `timeout` (default 30s) elapsed first; stragglers
    /// are left to the runtime.
    pub async fn graceful_shutdown(
        &self,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> bool {
        let budget = timeout.unwrap_or(DRAIN_TIMEOUT);
        self.shutdown();
        let _ = self.sessions.close();
        info!(
            tasks = handles.len(),
            sessions = self.sessions.len(),
            budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
            "draining"
        );

        let drained = tokio::time::timeout(budget, async {
            let _ = futures::future::join_all(handles).await;
            self.sessions.wait().await;
        })
        .await
        .is_ok();

        if !drained {
            warn!(
                sessions = self.sessions.len(),
                "drain budget of {budget:?} exhausted"
            );
        }
        drained
    }
}
