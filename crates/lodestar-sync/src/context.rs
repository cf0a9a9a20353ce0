//! Shared wiring handed to every job.

use std::sync::Arc;

use lodestar_config::{SyncSettings, TreePolicy};
use lodestar_core::RemoteClient;
use lodestar_telemetry::Metrics;

use crate::rate_limit::RateLimiter;
use crate::remote::RemoteCaller;
use crate::store::TorrentStore;

/// Settings, store, and rate-limited client shared by the refresh, repair, and
/// account jobs.
pub struct SyncContext {
    /// Rate-limited remote access.
    pub caller: RemoteCaller,
    /// Torrent store and tree publisher.
    pub store: Arc<TorrentStore>,
    /// Scheduling and budget settings.
    pub settings: SyncSettings,
    /// Metrics registry.
    pub metrics: Metrics,
}

impl SyncContext {
    /// Build the limiter, caller, and an empty store.
    #[must_use]
    pub fn new(
        client: Arc<dyn RemoteClient>,
        settings: SyncSettings,
        policy: TreePolicy,
        metrics: Metrics,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(
            settings.api_rate_per_minute,
            settings.torrents_rate_per_minute,
            settings.rate_limit_sleep,
        ));
        let caller = RemoteCaller::new(client, limiter, settings.retry_budget, metrics.clone());
        let store = Arc::new(TorrentStore::new(Arc::new(policy), metrics.clone()));
        Self {
            caller,
            store,
            settings,
            metrics,
        }
    }
}
