//! Periodic reconciliation of the store with the remote torrent listing.
//!
//! A cycle moves through `Fetching → Diffing → Applying → Rebuilding` and back to
//! `Idle`. Nothing is published unless the cycle reaches `Rebuilding`; a failed or
//! cancelled cycle leaves the previous generation in place.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lodestar_core::{ListPage, TorrentRecord, TorrentSummary};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::SyncContext;
use crate::diff::diff;
use crate::error::{SyncError, SyncResult};
use crate::hook::LibraryHook;
use crate::rate_limit::ApiCategory;
use crate::scheduler::PeriodicJob;

/// Where the refresh job currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPhase {
    /// Waiting for the next tick.
    #[default]
    Idle,
    /// Paging through the remote listing.
    Fetching,
    /// Holding the store writer and comparing.
    Diffing,
    /// Fetching detail and staging records.
    Applying,
    /// Committing and rebuilding the tree.
    Rebuilding,
}

/// Counts for one finished cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Distinct torrents in the listing.
    pub listed: usize,
    /// Torrents new to the store.
    pub added: usize,
    /// Torrents whose record was replaced.
    pub updated: usize,
    /// Torrents no longer listed.
    pub removed: usize,
    /// Updated torrents that became complete during this cycle.
    pub completed: usize,
    /// Torrents whose detail could not be fetched; their prior record was kept.
    pub detail_failures: usize,
    /// Generation committed by this cycle, if anything changed.
    pub generation: Option<u64>,
}

impl RefreshOutcome {
    /// Whether the cycle committed a new generation.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.generation.is_some()
    }

    /// Whether the library-update hook should run.
    #[must_use]
    pub const fn library_changed(&self) -> bool {
        self.added + self.removed + self.completed > 0
    }
}

/// The refresh job.
pub struct RefreshJob {
    ctx: Arc<SyncContext>,
    hook: Option<LibraryHook>,
    phase: watch::Sender<RefreshPhase>,
}

impl RefreshJob {
    /// Job bound to `ctx`; the hook comes from `on_library_update`.
    #[must_use]
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        let hook = ctx
            .settings
            .on_library_update
            .clone()
            .map(|command| LibraryHook::new(command, ctx.metrics.clone()));
        let (phase, _) = watch::channel(RefreshPhase::Idle);
        Self { ctx, hook, phase }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> RefreshPhase {
        *self.phase.borrow()
    }

    /// Receiver notified on every phase change.
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<RefreshPhase> {
        self.phase.subscribe()
    }

    /// Run one reconciliation cycle.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ListingFailed`] when any listing page fails after retries
    /// and [`SyncError::Cancelled`] when `cancel` fires. Neither mutates the store.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> SyncResult<RefreshOutcome> {
        let result = self.cycle(cancel).await;
        self.phase.send_replace(RefreshPhase::Idle);
        let label = match &result {
            Ok(outcome) if outcome.changed() => "changed",
            Ok(_) => "unchanged",
            Err(err) if err.is_cancelled() => "cancelled",
            Err(_) => "failed",
        };
        self.ctx.metrics.inc_refresh_cycle(label);
        result
    }

    async fn cycle(&self, cancel: &CancellationToken) -> SyncResult<RefreshOutcome> {
        self.phase.send_replace(RefreshPhase::Fetching);
        let listing = self.fetch_listing(cancel).await?;

        self.phase.send_replace(RefreshPhase::Diffing);
        let mut mutation = self.ctx.store.begin_mutation().await;
        let changes = diff(mutation.records(), &listing);

        self.phase.send_replace(RefreshPhase::Applying);
        let now = Utc::now();
        let mut outcome = RefreshOutcome {
            listed: listing.len(),
            ..RefreshOutcome::default()
        };

        for summary in &changes.additions {
            match self.record_for_addition(summary, now, cancel).await {
                Ok(record) => {
                    mutation.put(record);
                    outcome.added += 1;
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    warn!(
                        torrent_id = %summary.id,
                        error = %err.describe(),
                        "skipping new torrent without detail"
                    );
                    outcome.detail_failures += 1;
                }
            }
        }

        for summary in &changes.updates {
            let Some(prior) = mutation.get(&summary.id).cloned() else {
                continue;
            };
            match self.record_for_update(summary, &prior, now, cancel).await {
                Ok(record) => {
                    if !prior.is_complete() && record.is_complete() {
                        outcome.completed += 1;
                    }
                    mutation.put(record);
                    outcome.updated += 1;
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    warn!(
                        torrent_id = %summary.id,
                        error = %err.describe(),
                        "keeping cached torrent after detail failure"
                    );
                    outcome.detail_failures += 1;
                }
            }
        }

        for id in &changes.removals {
            if mutation.remove(id).is_some() {
                outcome.removed += 1;
            }
        }

        self.phase.send_replace(RefreshPhase::Rebuilding);
        if mutation.is_dirty() {
            outcome.generation = Some(mutation.commit());
        } else {
            mutation.abort();
        }

        info!(
            listed = outcome.listed,
            added = outcome.added,
            updated = outcome.updated,
            removed = outcome.removed,
            completed = outcome.completed,
            detail_failures = outcome.detail_failures,
            generation = ?outcome.generation,
            "refresh cycle finished"
        );

        if outcome.library_changed()
            && let Some(hook) = &self.hook
        {
            hook.run(cancel).await;
        }
        Ok(outcome)
    }

    /// Page through the listing until an empty page or the configured cap.
    async fn fetch_listing(&self, cancel: &CancellationToken) -> SyncResult<Vec<TorrentSummary>> {
        let settings = &self.ctx.settings;
        let mut page = ListPage::first(settings.page_size);
        let mut seen = HashSet::new();
        let mut listing = Vec::new();

        while listing.len() < settings.max_torrents {
            let batch = self
                .ctx
                .caller
                .call(ApiCategory::Torrents, "list_torrents", cancel, |client| async move {
                    client.list_torrents(page).await
                })
                .await
                .map_err(|err| match err {
                    SyncError::Remote { source, .. } => SyncError::ListingFailed {
                        offset: page.offset,
                        source,
                    },
                    other => other,
                })?;
            if batch.is_empty() {
                break;
            }
            for summary in batch {
                if listing.len() < settings.max_torrents && seen.insert(summary.id.clone()) {
                    listing.push(summary);
                }
            }
            page = page.next();
        }
        Ok(listing)
    }

    async fn record_for_addition(
        &self,
        summary: &TorrentSummary,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> SyncResult<TorrentRecord> {
        if summary.has_files() {
            return Ok(TorrentRecord::from_summary(
                summary,
                summary.files_with_links(),
                now,
            ));
        }
        let detail = self.fetch_detail(&summary.id, cancel).await?;
        Ok(TorrentRecord::from_detail(&detail, now))
    }

    async fn record_for_update(
        &self,
        summary: &TorrentSummary,
        prior: &TorrentRecord,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> SyncResult<TorrentRecord> {
        let record = if summary.has_files() {
            TorrentRecord::from_summary(summary, summary.files_with_links(), now)
        } else if prior.needs_detail(summary) {
            let detail = self.fetch_detail(&summary.id, cancel).await?;
            TorrentRecord::from_detail(&detail, now)
        } else {
            TorrentRecord::from_summary(summary, prior.files.clone(), now)
        };
        Ok(record.carry_local_state(prior))
    }

    async fn fetch_detail(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> SyncResult<lodestar_core::TorrentDetail> {
        self.ctx
            .caller
            .call(ApiCategory::General, "torrent_detail", cancel, |client| {
                let id = id.to_string();
                async move { client.torrent_detail(&id).await }
            })
            .await
    }
}

#[async_trait]
impl PeriodicJob for RefreshJob {
    fn name(&self) -> &'static str {
        "refresh"
    }

    fn interval(&self) -> Duration {
        self.ctx.settings.refresh_interval
    }

    async fn execute(&self, cancel: &CancellationToken) -> SyncResult<()> {
        self.run_cycle(cancel).await.map(|_| ())
    }
}
