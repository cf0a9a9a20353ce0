//! Hourly account check that warns before premium access lapses.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::context::SyncContext;
use crate::error::SyncResult;
use crate::rate_limit::ApiCategory;
use crate::scheduler::PeriodicJob;

/// How often the account is checked.
pub const PREMIUM_CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Remaining days below which each check logs a warning.
pub const PREMIUM_WARNING_DAYS: i64 = 7;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Account state derived from one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PremiumStatus {
    /// Premium with more than the warning window left.
    Active {
        /// Whole days left.
        days: i64,
    },
    /// Premium ending within the warning window.
    Expiring {
        /// Whole days left.
        days: i64,
    },
    /// No premium time left.
    Expired,
}

/// The account job.
pub struct PremiumMonitor {
    ctx: Arc<SyncContext>,
}

impl PremiumMonitor {
    /// Monitor bound to `ctx`.
    #[must_use]
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    /// Fetch the account and report how much premium time is left.
    ///
    /// # Errors
    ///
    /// Returns the remote failure when the account cannot be fetched.
    pub async fn check(&self, cancel: &CancellationToken) -> SyncResult<PremiumStatus> {
        let user = self
            .ctx
            .caller
            .call(ApiCategory::General, "user", cancel, |client| async move {
                client.user().await
            })
            .await?;

        let seconds = user
            .premium_remaining(Utc::now())
            .map_or(user.premium, |remaining| remaining.num_seconds());
        let days = seconds.max(0) / SECONDS_PER_DAY;
        self.ctx.metrics.set_premium_days_remaining(days);

        let status = if seconds <= 0 {
            error!(username = %user.username, "premium access has expired");
            PremiumStatus::Expired
        } else if days < PREMIUM_WARNING_DAYS {
            warn!(username = %user.username, days, "premium access ends soon");
            PremiumStatus::Expiring { days }
        } else {
            info!(username = %user.username, days, "premium access active");
            PremiumStatus::Active { days }
        };
        Ok(status)
    }
}

#[async_trait]
impl PeriodicJob for PremiumMonitor {
    fn name(&self) -> &'static str {
        "premium"
    }

    fn interval(&self) -> Duration {
        PREMIUM_CHECK_INTERVAL
    }

    async fn execute(&self, cancel: &CancellationToken) -> SyncResult<()> {
        self.check(cancel).await.map(|_| ())
    }
}
