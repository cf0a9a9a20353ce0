//! Periodic remediation of failed, stalled, and incomplete torrents.
//!
//! Soft remediation (re-selecting files, refetching detail) runs first and counts
//! failures on the record. Once a record's failures reach the retry budget the
//! torrent is deleted remotely, re-added by hash, and dropped from the store.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lodestar_core::{TorrentDetail, TorrentRecord, TorrentStatus};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::SyncContext;
use crate::error::SyncResult;
use crate::rate_limit::ApiCategory;
use crate::scheduler::PeriodicJob;
use crate::store::StoreSnapshot;

/// Why a torrent was picked for repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairReason {
    /// The remote reports a failure status.
    Failed(TorrentStatus),
    /// Finished, but a selected file has no content.
    ZeroByteSelection,
    /// Downloading with no progress for longer than the stall threshold.
    Stalled,
    /// Waiting for a file selection that never came.
    AwaitingSelection,
}

impl Display for RepairReason {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(status) => write!(formatter, "remote status {status}"),
            Self::ZeroByteSelection => formatter.write_str("selected file without content"),
            Self::Stalled => formatter.write_str("download stalled"),
            Self::AwaitingSelection => formatter.write_str("awaiting file selection"),
        }
    }
}

/// A torrent picked for repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairCandidate {
    /// Remote identifier.
    pub id: String,
    /// Info hash used to re-add.
    pub hash: String,
    /// Detected problem.
    pub reason: RepairReason,
    /// Failures recorded so far.
    pub failures: u32,
}

/// Counts for one repair cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairOutcome {
    /// Candidates examined.
    pub candidates: usize,
    /// Soft remediations that healed the torrent.
    pub remediated: usize,
    /// Soft remediations that did not.
    pub failed: usize,
    /// Torrents deleted remotely.
    pub deleted: usize,
    /// Torrents re-added, including queued re-adds from earlier cycles.
    pub readded: usize,
    /// Hashes still waiting to be re-added.
    pub pending_readds: usize,
    /// Generation committed by this cycle, if any record changed.
    pub generation: Option<u64>,
}

/// Scan `snapshot` for torrents that need attention, in identifier order.
///
/// Queued and progressing downloads are never candidates.
#[must_use]
pub fn find_candidates(
    snapshot: &StoreSnapshot,
    now: DateTime<Utc>,
    stall_threshold: Duration,
) -> Vec<RepairCandidate> {
    snapshot
        .records
        .values()
        .filter_map(|record| {
            classify(record, now, stall_threshold).map(|reason| RepairCandidate {
                id: record.id.clone(),
                hash: record.hash.clone(),
                reason,
                failures: record.failures,
            })
        })
        .collect()
}

fn classify(
    record: &TorrentRecord,
    now: DateTime<Utc>,
    stall_threshold: Duration,
) -> Option<RepairReason> {
    match record.status {
        status if status.is_failed() => Some(RepairReason::Failed(status)),
        status if status.is_done() && record.has_zero_byte_selection() => {
            Some(RepairReason::ZeroByteSelection)
        }
        TorrentStatus::WaitingFilesSelection => Some(RepairReason::AwaitingSelection),
        TorrentStatus::Downloading if stalled(record, now, stall_threshold) => {
            Some(RepairReason::Stalled)
        }
        _ => None,
    }
}

fn stalled(record: &TorrentRecord, now: DateTime<Utc>, threshold: Duration) -> bool {
    let Ok(threshold) = chrono::Duration::from_std(threshold) else {
        return false;
    };
    now.signed_duration_since(record.progress_changed_at) >= threshold
}

enum RecordChange {
    Healed(TorrentRecord),
    Failed {
        id: String,
        hash: String,
        message: String,
    },
    Removed { id: String },
}

/// The repair job.
pub struct RepairJob {
    ctx: Arc<SyncContext>,
    pending_readds: Mutex<BTreeSet<String>>,
}

impl RepairJob {
    /// Job bound to `ctx`.
    #[must_use]
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self {
            ctx,
            pending_readds: Mutex::new(BTreeSet::new()),
        }
    }

    /// Hashes whose re-add failed and will be retried next cycle.
    pub async fn pending_readds(&self) -> Vec<String> {
        self.pending_readds.lock().await.iter().cloned().collect()
    }

    /// Run one repair cycle.
    ///
    /// Per-torrent failures are recorded on the torrent and do not fail the cycle.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SyncError::Cancelled`] when `cancel` fires; no record changes
    /// from the interrupted cycle are committed.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> SyncResult<RepairOutcome> {
        let mut outcome = RepairOutcome {
            readded: self.retry_pending_readds(cancel).await?,
            ..RepairOutcome::default()
        };

        let snapshot = self.ctx.store.snapshot();
        let candidates = find_candidates(&snapshot, Utc::now(), self.ctx.settings.stall_threshold);
        outcome.candidates = candidates.len();
        let budget = self.ctx.settings.retry_budget;

        let mut changes = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let Some(record) = snapshot.get(&candidate.id) else {
                continue;
            };
            if candidate.failures >= budget {
                if let Some(change) = self.escalate(candidate, &mut outcome, cancel).await? {
                    changes.push(change);
                }
                continue;
            }

            match self.remediate(record, candidate.reason, cancel).await {
                Ok(Some(healed)) => {
                    outcome.remediated += 1;
                    changes.push(RecordChange::Healed(healed));
                }
                Ok(None) => {
                    outcome.failed += 1;
                    let message = format!("{} persists after remediation", candidate.reason);
                    let change = self
                        .record_failure(candidate, message, &mut outcome, cancel)
                        .await?;
                    changes.push(change);
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    outcome.failed += 1;
                    let change = self
                        .record_failure(candidate, err.describe(), &mut outcome, cancel)
                        .await?;
                    changes.push(change);
                }
            }
        }

        outcome.generation = self.apply(changes).await;
        outcome.pending_readds = self.pending_readds.lock().await.len();
        info!(
            candidates = outcome.candidates,
            remediated = outcome.remediated,
            failed = outcome.failed,
            deleted = outcome.deleted,
            readded = outcome.readded,
            pending_readds = outcome.pending_readds,
            "repair cycle finished"
        );
        Ok(outcome)
    }

    /// Count a failed remediation and escalate when it exhausts the budget.
    async fn record_failure(
        &self,
        candidate: &RepairCandidate,
        message: String,
        outcome: &mut RepairOutcome,
        cancel: &CancellationToken,
    ) -> SyncResult<RecordChange> {
        let failures = candidate.failures.saturating_add(1);
        warn!(
            torrent_id = %candidate.id,
            failures,
            budget = self.ctx.settings.retry_budget,
            error = %message,
            "repair attempt failed"
        );
        if failures >= self.ctx.settings.retry_budget {
            let escalated = RepairCandidate {
                failures,
                ..candidate.clone()
            };
            if let Some(change) = self.escalate(&escalated, outcome, cancel).await? {
                return Ok(change);
            }
        }
        Ok(RecordChange::Failed {
            id: candidate.id.clone(),
            hash: candidate.hash.clone(),
            message,
        })
    }

    /// Delete, re-add, and drop the record. A failed delete leaves the record as is.
    async fn escalate(
        &self,
        candidate: &RepairCandidate,
        outcome: &mut RepairOutcome,
        cancel: &CancellationToken,
    ) -> SyncResult<Option<RecordChange>> {
        let id = candidate.id.as_str();
        let deleted = self
            .ctx
            .caller
            .call(ApiCategory::General, "delete_torrent", cancel, |client| {
                let id = id.to_string();
                async move { client.delete_torrent(&id).await }
            })
            .await;
        match deleted {
            Ok(()) => {
                outcome.deleted += 1;
                self.ctx.metrics.inc_repair_action("delete");
            }
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                warn!(
                    torrent_id = %id,
                    error = %err.describe(),
                    "could not delete torrent for re-add"
                );
                self.ctx.metrics.inc_repair_action("delete_failed");
                return Ok(None);
            }
        }

        if self.readd(&candidate.hash, cancel).await? {
            outcome.readded += 1;
        } else {
            let mut pending = self.pending_readds.lock().await;
            pending.insert(candidate.hash.clone());
        }
        Ok(Some(RecordChange::Removed { id: id.to_string() }))
    }

    async fn readd(&self, hash: &str, cancel: &CancellationToken) -> SyncResult<bool> {
        let added = self
            .ctx
            .caller
            .call(ApiCategory::General, "add_by_hash", cancel, |client| {
                let hash = hash.to_string();
                async move { client.add_by_hash(&hash).await }
            })
            .await;
        match added {
            Ok(added) => {
                info!(hash, new_id = %added.id, "torrent re-added");
                self.ctx.metrics.inc_repair_action("readd");
                Ok(true)
            }
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                warn!(
                    hash,
                    error = %err.describe(),
                    "re-add failed; will retry next cycle"
                );
                self.ctx.metrics.inc_repair_action("readd_failed");
                Ok(false)
            }
        }
    }

    async fn retry_pending_readds(&self, cancel: &CancellationToken) -> SyncResult<usize> {
        let pending: Vec<String> = self.pending_readds.lock().await.iter().cloned().collect();
        let mut readded = 0;
        for hash in pending {
            if self.readd(&hash, cancel).await? {
                self.pending_readds.lock().await.remove(&hash);
                readded += 1;
            }
        }
        Ok(readded)
    }

    /// Soft remediation. `Ok(Some)` carries the healed record; `Ok(None)` means the
    /// problem persists.
    async fn remediate(
        &self,
        record: &TorrentRecord,
        reason: RepairReason,
        cancel: &CancellationToken,
    ) -> SyncResult<Option<TorrentRecord>> {
        let now = Utc::now();
        let detail = self.fetch_detail(&record.id, cancel).await?;
        self.ctx.metrics.inc_repair_action("refetch");

        let detail = match reason {
            RepairReason::AwaitingSelection | RepairReason::ZeroByteSelection
                if !healthy(&detail, record, reason) =>
            {
                let files = self.selection_for(&detail, reason);
                if files.is_empty() {
                    return Ok(None);
                }
                self.select_files(&record.id, &files, cancel).await?;
                self.fetch_detail(&record.id, cancel).await?
            }
            _ => detail,
        };

        if healthy(&detail, record, reason) {
            let mut healed = TorrentRecord::from_detail(&detail, now).carry_local_state(record);
            healed.failures = 0;
            healed.last_error = None;
            Ok(Some(healed))
        } else {
            Ok(None)
        }
    }

    /// Files to (re)select: the playable ones, or everything when none are playable.
    fn selection_for(&self, detail: &TorrentDetail, reason: RepairReason) -> Vec<u32> {
        if reason == RepairReason::ZeroByteSelection {
            let selected: Vec<u32> = detail
                .files
                .iter()
                .filter(|file| file.selected)
                .map(|file| file.id)
                .collect();
            if !selected.is_empty() {
                return selected;
            }
        }
        let playable = &self.ctx.store.policy().playable;
        let wanted: Vec<u32> = detail
            .files
            .iter()
            .filter(|file| playable.is_playable(&file.path))
            .map(|file| file.id)
            .collect();
        if wanted.is_empty() {
            detail.files.iter().map(|file| file.id).collect()
        } else {
            wanted
        }
    }

    async fn fetch_detail(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> SyncResult<TorrentDetail> {
        self.ctx
            .caller
            .call(ApiCategory::General, "torrent_detail", cancel, |client| {
                let id = id.to_string();
                async move { client.torrent_detail(&id).await }
            })
            .await
    }

    async fn select_files(
        &self,
        id: &str,
        files: &[u32],
        cancel: &CancellationToken,
    ) -> SyncResult<()> {
        self.ctx
            .caller
            .call(ApiCategory::General, "select_files", cancel, |client| {
                let id = id.to_string();
                let files = files.to_vec();
                async move { client.select_files(&id, &files).await }
            })
            .await?;
        self.ctx.metrics.inc_repair_action("reselect");
        Ok(())
    }

    /// Apply collected changes to records that still exist with the same hash.
    async fn apply(&self, changes: Vec<RecordChange>) -> Option<u64> {
        if changes.is_empty() {
            return None;
        }
        let mut mutation = self.ctx.store.begin_mutation().await;
        for change in changes {
            match change {
                RecordChange::Healed(healed) => {
                    if mutation
                        .get(&healed.id)
                        .is_some_and(|current| current.hash == healed.hash)
                    {
                        mutation.put(healed);
                    }
                }
                RecordChange::Failed { id, hash, message } => {
                    if let Some(current) = mutation.get(&id)
                        && current.hash == hash
                    {
                        let mut updated = current.clone();
                        updated.failures = updated.failures.saturating_add(1);
                        updated.last_error = Some(message);
                        mutation.put(updated);
                    }
                }
                RecordChange::Removed { id } => {
                    mutation.remove(&id);
                }
            }
        }
        if mutation.is_dirty() {
            Some(mutation.commit())
        } else {
            mutation.abort();
            None
        }
    }
}

/// Whether `detail` shows the problem behind `reason` has cleared.
fn healthy(detail: &TorrentDetail, prior: &TorrentRecord, reason: RepairReason) -> bool {
    match reason {
        RepairReason::Failed(_) => !detail.status.is_failed(),
        RepairReason::ZeroByteSelection => detail.is_complete(),
        RepairReason::AwaitingSelection => detail.status != TorrentStatus::WaitingFilesSelection,
        RepairReason::Stalled => {
            (detail.status != TorrentStatus::Downloading && !detail.status.is_failed())
                || (detail.progress - prior.progress).abs() >= f64::EPSILON
        }
    }
}

#[async_trait]
impl PeriodicJob for RepairJob {
    fn name(&self) -> &'static str {
        "repair"
    }

    fn interval(&self) -> Duration {
        self.ctx.settings.repair_interval
    }

    fn runs_at_start(&self) -> bool {
        false
    }

    async fn execute(&self, cancel: &CancellationToken) -> SyncResult<()> {
        self.run_cycle(cancel).await.map(|_| ())
    }
}
