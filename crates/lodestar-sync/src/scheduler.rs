//! Periodic job runner.
//!
//! Each job runs in its own task and executes at most one cycle at a time; a tick that
//! arrives while a cycle is still running is skipped rather than queued.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::SyncResult;

/// A unit of periodic work.
#[async_trait]
pub trait PeriodicJob: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Time between ticks.
    fn interval(&self) -> Duration;

    /// Whether the first cycle runs immediately instead of after one interval.
    fn runs_at_start(&self) -> bool {
        true
    }

    /// Run one cycle. Waits inside the cycle must observe `cancel`.
    async fn execute(&self, cancel: &CancellationToken) -> SyncResult<()>;
}

/// Source of ticks for [`run_periodic`].
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick; `false` means no more ticks will come.
    async fn tick(&mut self) -> bool;
}

/// Wall-clock ticker backed by [`tokio::time::Interval`].
#[derive(Debug)]
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    /// Tick every `period`, starting now or after one period.
    #[must_use]
    pub fn new(period: Duration, immediate: bool) -> Self {
        let period = period.max(Duration::from_millis(1));
        let start = if immediate {
            Instant::now()
        } else {
            Instant::now() + period
        };
        let mut interval = interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Manually driven ticks; the runner stops when every sender is dropped.
#[async_trait]
impl Ticker for mpsc::Receiver<()> {
    async fn tick(&mut self) -> bool {
        self.recv().await.is_some()
    }
}

/// Drive `job` from `ticker` until cancellation or the ticker ends.
///
/// Cycle errors are logged and the job keeps its schedule; a cancelled cycle ends the loop.
pub async fn run_periodic<J, T>(job: Arc<J>, mut ticker: T, cancel: CancellationToken)
where
    J: PeriodicJob + ?Sized,
    T: Ticker,
{
    info!(
        job = job.name(),
        interval_secs = job.interval().as_secs(),
        "periodic job started"
    );
    loop {
        let ticked = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            ticked = ticker.tick() => ticked,
        };
        if !ticked {
            break;
        }

        debug!(job = job.name(), "periodic job cycle starting");
        match job.execute(&cancel).await {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => break,
            Err(err) => error!(
                job = job.name(),
                error = %err.describe(),
                "periodic job cycle failed"
            ),
        }
    }
    info!(job = job.name(), "periodic job stopped");
}

/// Spawn `job` on the runtime with a wall-clock ticker.
pub fn spawn_periodic(job: Arc<dyn PeriodicJob>, cancel: CancellationToken) -> JoinHandle<()> {
    let ticker = IntervalTicker::new(job.interval(), job.runs_at_start());
    tokio::spawn(run_periodic(job, ticker, cancel))
}
