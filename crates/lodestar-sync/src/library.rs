//! Facade the serving layer talks to: tree reads, link resolution, and job lifecycle.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use lodestar_config::{SyncSettings, TreePolicy};
use lodestar_core::{DirectLink, RemoteClient};
use lodestar_telemetry::Metrics;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::maintenance::{ClearReport, clear_downloads, clear_torrents};
use crate::premium::PremiumMonitor;
use crate::rate_limit::ApiCategory;
use crate::refresh::{RefreshJob, RefreshOutcome, RefreshPhase};
use crate::repair::{RepairJob, RepairOutcome};
use crate::scheduler::{PeriodicJob, spawn_periodic};
use crate::store::StoreSnapshot;
use crate::tree::VirtualTree;

/// Jobs that did not stop within the shutdown grace period.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Names of jobs that were aborted.
    pub abandoned: Vec<&'static str>,
}

/// The running library.
pub struct Library {
    ctx: Arc<SyncContext>,
    refresh: Arc<RefreshJob>,
    repair: Arc<RepairJob>,
    premium: Arc<PremiumMonitor>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl Library {
    /// Wire the store and jobs around `client`. Nothing runs until [`Library::start`].
    #[must_use]
    pub fn new(
        client: Arc<dyn RemoteClient>,
        settings: SyncSettings,
        policy: TreePolicy,
        metrics: Metrics,
    ) -> Self {
        let ctx = Arc::new(SyncContext::new(client, settings, policy, metrics));
        Self {
            refresh: Arc::new(RefreshJob::new(Arc::clone(&ctx))),
            repair: Arc::new(RepairJob::new(Arc::clone(&ctx))),
            premium: Arc::new(PremiumMonitor::new(Arc::clone(&ctx))),
            ctx,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the refresh, account, and (when enabled) repair jobs.
    ///
    /// Calling this twice has no effect.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !tasks.is_empty() {
            return;
        }
        let mut jobs: Vec<Arc<dyn PeriodicJob>> = vec![
            Arc::clone(&self.refresh) as Arc<dyn PeriodicJob>,
            Arc::clone(&self.premium) as Arc<dyn PeriodicJob>,
        ];
        if self.ctx.settings.enable_repair {
            jobs.push(Arc::clone(&self.repair) as Arc<dyn PeriodicJob>);
        }
        for job in jobs {
            let name = job.name();
            tasks.push((name, spawn_periodic(job, self.cancel.child_token())));
        }
        info!(
            jobs = tasks.len(),
            repair = self.ctx.settings.enable_repair,
            "library jobs started"
        );
    }

    /// Cancel every job and wait up to `grace` for them to finish.
    ///
    /// Jobs still running afterwards are aborted and reported.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        self.cancel.cancel();
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let deadline = tokio::time::Instant::now() + grace;
        let mut report = ShutdownReport::default();
        for (name, mut handle) in tasks {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                warn!(
                    job = name,
                    "job did not stop within the grace period; aborting"
                );
                handle.abort();
                report.abandoned.push(name);
            }
        }
        info!(abandoned = report.abandoned.len(), "library stopped");
        report
    }

    /// Token cancelled at shutdown.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Tree from the last committed generation.
    #[must_use]
    pub fn current_tree(&self) -> Arc<VirtualTree> {
        self.ctx.store.tree()
    }

    /// Receiver notified on each new tree.
    #[must_use]
    pub fn subscribe_tree(&self) -> watch::Receiver<Arc<VirtualTree>> {
        self.ctx.store.subscribe_tree()
    }

    /// Last committed store snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.ctx.store.snapshot()
    }

    /// Current refresh phase.
    #[must_use]
    pub fn refresh_phase(&self) -> RefreshPhase {
        self.refresh.phase()
    }

    /// Metrics registry.
    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.ctx.metrics
    }

    /// Run a refresh cycle now, outside the schedule.
    ///
    /// # Errors
    ///
    /// See [`RefreshJob::run_cycle`].
    pub async fn refresh_now(&self) -> SyncResult<RefreshOutcome> {
        self.refresh.run_cycle(&self.cancel).await
    }

    /// Run a repair cycle now, even when scheduled repair is disabled.
    ///
    /// # Errors
    ///
    /// See [`RepairJob::run_cycle`].
    pub async fn repair_now(&self) -> SyncResult<RepairOutcome> {
        self.repair.run_cycle(&self.cancel).await
    }

    /// Unrestrict the file at `path` inside torrent `torrent_id`.
    ///
    /// `path` may be the remote path or the file name shown in the tree.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::TorrentNotFound`], [`SyncError::FileNotFound`], or
    /// [`SyncError::LinkUnavailable`] for lookups that fail locally, and the remote
    /// failure when unrestricting fails.
    pub async fn resolve_file(&self, torrent_id: &str, path: &str) -> SyncResult<DirectLink> {
        let snapshot = self.ctx.store.snapshot();
        let record = snapshot
            .get(torrent_id)
            .ok_or_else(|| SyncError::TorrentNotFound {
                torrent_id: torrent_id.to_string(),
            })?;
        let file = record
            .files
            .iter()
            .find(|file| file.path == path)
            .or_else(|| record.files.iter().find(|file| file.name() == path))
            .ok_or_else(|| SyncError::FileNotFound {
                torrent_id: torrent_id.to_string(),
                path: path.to_string(),
            })?;
        let link = file
            .link
            .as_deref()
            .ok_or_else(|| SyncError::LinkUnavailable {
                torrent_id: torrent_id.to_string(),
                path: path.to_string(),
            })?;

        self.ctx
            .caller
            .call(ApiCategory::General, "unrestrict_link", &self.cancel, |client| {
                let link = link.to_string();
                async move { client.unrestrict_link(&link).await }
            })
            .await
    }

    /// Delete every torrent on the account.
    ///
    /// # Errors
    ///
    /// See [`clear_torrents`].
    pub async fn clear_torrents(&self) -> SyncResult<ClearReport> {
        clear_torrents(&self.ctx.caller, self.ctx.settings.page_size, &self.cancel).await
    }

    /// Delete the account's download history.
    ///
    /// # Errors
    ///
    /// See [`clear_downloads`].
    pub async fn clear_downloads(&self) -> SyncResult<ClearReport> {
        clear_downloads(&self.ctx.caller, self.ctx.settings.page_size, &self.cancel).await
    }
}
