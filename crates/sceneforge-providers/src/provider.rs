//! The generation provider contract and the shared polling loop.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use sceneforge_models::{GenerationRequest, JobHandle, JobState, ProviderKind};

use crate::error::{ProviderError, ProviderResult};

/// An asynchronous video generation backend.
///
/// `submit` starts a job and returns a handle; `poll` refreshes the
/// handle's state without blocking; `fetch_artifact` downloads the
/// finished clip. Providers that complete synchronously may return an
/// already-terminal handle from `submit`, in which case the poll loop
/// exits immediately.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Lower bound on the poll interval, regardless of caller settings.
    fn min_poll_interval(&self) -> Duration {
        Duration::from_secs(10)
    }

    /// Start a generation job.
    async fn submit(&self, request: &GenerationRequest) -> ProviderResult<JobHandle>;

    /// Refresh the job state. Must not block waiting for completion.
    async fn poll(&self, handle: &JobHandle) -> ProviderResult<JobHandle>;

    /// Download the completed artifact to `dest`.
    async fn fetch_artifact(&self, handle: &JobHandle, dest: &Path) -> ProviderResult<PathBuf>;
}

/// Polling policy for [`await_completion`].
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// Overall deadline from the first poll
    pub timeout: Duration,
    /// Requested delay between polls; raised to the provider's minimum
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            interval: Duration::from_secs(10),
        }
    }
}

impl PollSettings {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

/// Poll `handle` until it reaches a terminal state.
///
/// - A `Completed` handle is returned as-is.
/// - A `Failed` handle becomes [`ProviderError::Remote`] carrying the
///   provider's message.
/// - Transient network errors are logged and retried until the deadline.
/// - Once `settings.timeout` has elapsed with the job still running, the
///   loop stops with [`ProviderError::Timeout`]; it never waits more than
///   one interval past the deadline.
/// - A `true` on `cancel` aborts with [`ProviderError::Cancelled`].
pub async fn await_completion(
    provider: &dyn GenerationProvider,
    handle: JobHandle,
    settings: PollSettings,
    mut cancel: Option<watch::Receiver<bool>>,
) -> ProviderResult<JobHandle> {
    let interval = settings.interval.max(provider.min_poll_interval());
    let started = Instant::now();
    let deadline = started + settings.timeout;
    let mut current = handle;

    loop {
        if let Some(terminal) = resolve_terminal(&current)? {
            return Ok(terminal);
        }

        if Instant::now() >= deadline {
            let elapsed_secs = started.elapsed().as_secs();
            warn!(
                job_id = %current.job_id,
                provider = %provider.kind(),
                elapsed_secs,
                "Generation job timed out"
            );
            return Err(ProviderError::Timeout { elapsed_secs });
        }

        sleep_or_cancel(interval.min(deadline - Instant::now()), cancel.as_mut()).await?;

        match provider.poll(&current).await {
            Ok(updated) => {
                debug!(
                    job_id = %updated.job_id,
                    state = updated.state.as_str(),
                    "Polled generation job"
                );
                current = updated;
            }
            Err(e) if e.is_transient() => {
                warn!(
                    job_id = %current.job_id,
                    error = %e,
                    "Transient poll error, will retry"
                );
            }
            Err(e) => return Err(e),
        }
    }
}

/// Map a terminal handle to its outcome, or None when still running.
fn resolve_terminal(handle: &JobHandle) -> ProviderResult<Option<JobHandle>> {
    match handle.state {
        JobState::Completed => {
            info!(job_id = %handle.job_id, "Generation job completed");
            Ok(Some(handle.clone()))
        }
        JobState::Failed => {
            let message = handle
                .error
                .clone()
                .unwrap_or_else(|| "provider reported failure without a message".to_string());
            Err(ProviderError::Remote(message))
        }
        JobState::Submitted | JobState::Processing => Ok(None),
    }
}

async fn sleep_or_cancel(
    delay: Duration,
    cancel: Option<&mut watch::Receiver<bool>>,
) -> ProviderResult<()> {
    match cancel {
        None => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
        Some(rx) => {
            if *rx.borrow() {
                return Err(ProviderError::Cancelled);
            }
            tokio::select! {
                _ = tokio::time::sleep(delay) => Ok(()),
                changed = rx.changed() => {
                    if changed.is_ok() && *rx.borrow() {
                        Err(ProviderError::Cancelled)
                    } else {
                        Ok(())
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use sceneforge_models::OutputLocator;

    /// Provider that reports Processing `polls_until_done` times, then
    /// Completed. `polls_until_done == u32::MAX` means never done.
    struct StubProvider {
        polls: AtomicU32,
        polls_until_done: u32,
        transient_failures: u32,
    }

    impl StubProvider {
        fn completing_after(polls: u32) -> Self {
            Self {
                polls: AtomicU32::new(0),
                polls_until_done: polls,
                transient_failures: 0,
            }
        }

        fn never_completing() -> Self {
            Self::completing_after(u32::MAX)
        }
    }

    #[async_trait]
    impl GenerationProvider for StubProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Kling
        }

        fn min_poll_interval(&self) -> Duration {
            Duration::from_millis(1)
        }

        async fn submit(&self, _request: &GenerationRequest) -> ProviderResult<JobHandle> {
            Ok(JobHandle::submitted(ProviderKind::Kling, "task-1"))
        }

        async fn poll(&self, handle: &JobHandle) -> ProviderResult<JobHandle> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.transient_failures {
                return Err(ProviderError::TransientNetwork("connection reset".into()));
            }
            if n >= self.polls_until_done {
                Ok(handle.clone().completed(OutputLocator::Url {
                    url: "https://cdn.example/out.mp4".into(),
                }))
            } else {
                Ok(handle.clone().processing())
            }
        }

        async fn fetch_artifact(
            &self,
            _handle: &JobHandle,
            dest: &Path,
        ) -> ProviderResult<PathBuf> {
            Ok(dest.to_path_buf())
        }
    }

    fn fast_settings(timeout_ms: u64) -> PollSettings {
        PollSettings::new(
            Duration::from_millis(timeout_ms),
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn test_completes_after_polls() {
        let provider = StubProvider::completing_after(3);
        let handle = JobHandle::submitted(ProviderKind::Kling, "task-1");
        let done = await_completion(&provider, handle, fast_settings(5_000), None)
            .await
            .unwrap();
        assert_eq!(done.state, JobState::Completed);
        assert!(done.output.is_some());
    }

    #[tokio::test]
    async fn test_already_terminal_handle_returns_without_polling() {
        let provider = StubProvider::never_completing();
        let handle = JobHandle::submitted(ProviderKind::Kling, "task-1")
            .completed(OutputLocator::Url {
                url: "https://cdn.example/out.mp4".into(),
            });
        let done = await_completion(&provider, handle, fast_settings(5_000), None)
            .await
            .unwrap();
        assert_eq!(done.state, JobState::Completed);
        assert_eq!(provider.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_handle_surfaces_provider_message() {
        let provider = StubProvider::never_completing();
        let handle =
            JobHandle::submitted(ProviderKind::Kling, "task-1").failed("content policy violation");
        let err = await_completion(&provider, handle, fast_settings(5_000), None)
            .await
            .unwrap_err();
        match err {
            ProviderError::Remote(msg) => assert_eq!(msg, "content policy violation"),
            other => panic!("expected Remote, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_distinct_from_failure() {
        let provider = StubProvider::never_completing();
        let handle = JobHandle::submitted(ProviderKind::Kling, "task-1");
        let err = await_completion(&provider, handle, fast_settings(20), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_transient_poll_errors_are_retried() {
        let provider = StubProvider {
            polls: AtomicU32::new(0),
            polls_until_done: 4,
            transient_failures: 2,
        };
        let handle = JobHandle::submitted(ProviderKind::Kling, "task-1");
        let done = await_completion(&provider, handle, fast_settings(5_000), None)
            .await
            .unwrap();
        assert_eq!(done.state, JobState::Completed);
    }

    #[tokio::test]
    async fn test_cancellation_stops_polling() {
        let provider = StubProvider::never_completing();
        let handle = JobHandle::submitted(ProviderKind::Kling, "task-1");
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            await_completion(&provider, handle, fast_settings(60_000), Some(rx)).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
    }

    #[tokio::test]
    async fn test_pre_cancelled_channel_aborts_first_wait() {
        let provider = StubProvider::never_completing();
        let handle = JobHandle::submitted(ProviderKind::Kling, "task-1");
        let (_tx, rx) = watch::channel(true);
        let err = await_completion(&provider, handle, fast_settings(60_000), Some(rx))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled));
    }
}
