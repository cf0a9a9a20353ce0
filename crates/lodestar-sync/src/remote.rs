//! Rate-limited, retrying wrapper around a [`RemoteClient`].

use std::future::Future;
use std::sync::Arc;

use lodestar_core::{RemoteClient, RemoteResult};
use lodestar_telemetry::Metrics;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::rate_limit::{ApiCategory, RateLimiter};

/// Every outbound call goes through here: one token per attempt, penalties on 429,
/// bounded retries for transient failures.
#[derive(Clone)]
pub struct RemoteCaller {
    client: Arc<dyn RemoteClient>,
    limiter: Arc<RateLimiter>,
    retry_budget: u32,
    metrics: Metrics,
}

impl RemoteCaller {
    /// Wrap `client` with a shared limiter.
    #[must_use]
    pub fn new(
        client: Arc<dyn RemoteClient>,
        limiter: Arc<RateLimiter>,
        retry_budget: u32,
        metrics: Metrics,
    ) -> Self {
        Self {
            client,
            limiter,
            retry_budget,
            metrics,
        }
    }

    /// The shared limiter.
    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Run `request` until it succeeds, fails permanently, or exhausts the retry budget.
    ///
    /// Rate-limited attempts do not count against the budget; each one penalises the
    /// bucket and waits for it to reopen.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] when `cancel` fires and [`SyncError::Remote`]
    /// with the final remote failure otherwise.
    pub async fn call<T, F, Fut>(
        &self,
        category: ApiCategory,
        operation: &'static str,
        cancel: &CancellationToken,
        mut request: F,
    ) -> SyncResult<T>
    where
        F: FnMut(Arc<dyn RemoteClient>) -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let mut retries = 0_u32;
        loop {
            self.limiter.acquire(category, cancel).await?;
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(SyncError::Cancelled { operation }),
                outcome = request(Arc::clone(&self.client)) => outcome,
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_rate_limited() => {
                    self.metrics.inc_rate_limit_penalty(category.as_str());
                    self.limiter.penalize(category);
                }
                Err(err) if err.is_transient() && retries < self.retry_budget => {
                    retries += 1;
                    warn!(
                        operation,
                        attempt = retries,
                        budget = self.retry_budget,
                        error = %err,
                        "transient remote failure; retrying"
                    );
                }
                Err(source) => {
                    debug!(operation, error = %source, "remote call failed");
                    return Err(SyncError::Remote { operation, source });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lodestar_core::RemoteError;
    use lodestar_test_support::fixtures::movie;
    use lodestar_test_support::{Failure, Operation, ScriptedRemote};

    use super::*;

    fn caller(remote: &Arc<ScriptedRemote>, budget: u32) -> anyhow::Result<RemoteCaller> {
        let client: Arc<dyn RemoteClient> = remote.clone();
        Ok(RemoteCaller::new(
            client,
            Arc::new(RateLimiter::new(600, 600, Duration::from_secs(5))),
            budget,
            Metrics::new()?,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_within_budget() -> anyhow::Result<()> {
        let remote = Arc::new(ScriptedRemote::with_torrents([movie("A", "a")]));
        remote.fail_times(Operation::TorrentDetail, Failure::Transient, 2);
        let caller = caller(&remote, 2)?;
        let cancel = CancellationToken::new();

        let detail = caller
            .call(ApiCategory::General, "torrent_detail", &cancel, |client| async move {
                client.torrent_detail("A").await
            })
            .await?;
        assert_eq!(detail.id, "A");
        assert_eq!(remote.calls(Operation::TorrentDetail), 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_beyond_budget_surface() -> anyhow::Result<()> {
        let remote = Arc::new(ScriptedRemote::with_torrents([movie("A", "a")]));
        remote.fail_times(Operation::TorrentDetail, Failure::Transient, 5);
        let caller = caller(&remote, 2)?;
        let cancel = CancellationToken::new();

        let err = caller
            .call(ApiCategory::General, "torrent_detail", &cancel, |client| async move {
                client.torrent_detail("A").await
            })
            .await
            .expect_err("budget exhausted");
        assert!(matches!(
            err,
            SyncError::Remote { source: RemoteError::Transient { .. }, .. }
        ));
        assert_eq!(remote.calls(Operation::TorrentDetail), 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failures_are_not_retried() -> anyhow::Result<()> {
        let remote = Arc::new(ScriptedRemote::new());
        let caller = caller(&remote, 3)?;
        let cancel = CancellationToken::new();

        let err = caller
            .call(ApiCategory::General, "torrent_detail", &cancel, |client| async move {
                client.torrent_detail("missing").await
            })
            .await
            .expect_err("404");
        assert!(matches!(
            err,
            SyncError::Remote { source: RemoteError::Permanent { status: 404, .. }, .. }
        ));
        assert_eq!(remote.calls(Operation::TorrentDetail), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_calls_penalise_and_retry() -> anyhow::Result<()> {
        let remote = Arc::new(ScriptedRemote::with_torrents([movie("A", "a")]));
        remote.fail_times(Operation::TorrentDetail, Failure::RateLimited, 4);
        let caller = caller(&remote, 0)?;
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();

        caller
            .call(ApiCategory::General, "torrent_detail", &cancel, |client| async move {
                client.torrent_detail("A").await
            })
            .await?;
        assert_eq!(remote.calls(Operation::TorrentDetail), 5);
        assert!(start.elapsed() >= Duration::from_secs(20));
        assert_eq!(caller.metrics.rate_limit_penalties("general"), 4);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_a_penalised_call() -> anyhow::Result<()> {
        let remote = Arc::new(ScriptedRemote::with_torrents([movie("A", "a")]));
        remote.fail_times(Operation::TorrentDetail, Failure::RateLimited, 100);
        let caller = caller(&remote, 0)?;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            trigger.cancel();
        });

        let err = caller
            .call(ApiCategory::General, "torrent_detail", &cancel, |client| async move {
                client.torrent_detail("A").await
            })
            .await
            .expect_err("cancelled");
        assert!(err.is_cancelled());
        assert!(remote.calls(Operation::TorrentDetail) <= 3);
        Ok(())
    }
}
