//! Per-category token buckets shared by every outbound remote call.
//!
//! Each bucket holds at most one whole token and refills continuously at its
//! configured per-minute rate, so no rolling 60-second window ever admits more
//! calls than the limit. A 429 from the remote empties the bucket and freezes
//! refill for the penalty duration.

use std::convert::TryFrom;
use std::fmt::{self, Display, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{SyncError, SyncResult};

/// Budget an outbound call is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiCategory {
    /// Every endpoint except the torrent listing.
    General,
    /// The torrent listing endpoint.
    Torrents,
}

impl ApiCategory {
    /// Metric and log label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Torrents => "torrents",
        }
    }
}

impl Display for ApiCategory {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Limiter holding one bucket per [`ApiCategory`].
#[derive(Debug)]
pub struct RateLimiter {
    general: Mutex<TokenBucket>,
    torrents: Mutex<TokenBucket>,
    penalty: Duration,
}

impl RateLimiter {
    /// Build a limiter with full buckets.
    #[must_use]
    pub fn new(general_per_minute: u32, torrents_per_minute: u32, penalty: Duration) -> Self {
        let now = Instant::now();
        Self {
            general: Mutex::new(TokenBucket::new(general_per_minute, now)),
            torrents: Mutex::new(TokenBucket::new(torrents_per_minute, now)),
            penalty,
        }
    }

    /// Wait until `category` grants a token.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cancelled`] as soon as `cancel` fires.
    pub async fn acquire(
        &self,
        category: ApiCategory,
        cancel: &CancellationToken,
    ) -> SyncResult<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled {
                    operation: "rate_limit.acquire",
                });
            }
            let wait = match self.bucket(category).try_acquire(Instant::now()) {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };
            tokio::select! {
                () = cancel.cancelled() => {
                    return Err(SyncError::Cancelled {
                        operation: "rate_limit.acquire",
                    });
                }
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Take a token only if one is available right now.
    #[must_use]
    pub fn try_acquire(&self, category: ApiCategory) -> bool {
        self.bucket(category).try_acquire(Instant::now()).is_ok()
    }

    /// Empty the bucket and hold refill back for the penalty duration.
    pub fn penalize(&self, category: ApiCategory) {
        let until = Instant::now() + self.penalty;
        self.bucket(category).penalize(until);
        warn!(
            bucket = %category,
            penalty_secs = self.penalty.as_secs(),
            "remote rate limit hit; pausing bucket"
        );
    }

    /// Time until `category` would grant a token.
    #[must_use]
    pub fn retry_delay(&self, category: ApiCategory) -> Duration {
        let now = Instant::now();
        let mut bucket = self.bucket(category);
        bucket.refill(now);
        bucket.retry_delay(now)
    }

    fn bucket(&self, category: ApiCategory) -> MutexGuard<'_, TokenBucket> {
        let bucket = match category {
            ApiCategory::General => &self.general,
            ApiCategory::Torrents => &self.torrents,
        };
        bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
struct TokenBucket {
    per_minute: u32,
    tokens: u128,
    last_refill: Instant,
}

impl TokenBucket {
    const TOKEN_SCALE: u128 = 1_000_000;
    const WINDOW_MICROS: u128 = 60_000_000;

    fn new(per_minute: u32, now: Instant) -> Self {
        Self {
            per_minute,
            tokens: Self::TOKEN_SCALE,
            last_refill: now,
        }
    }

    fn rate(&self) -> u128 {
        u128::from(self.per_minute) * Self::TOKEN_SCALE
    }

    // `last_refill` may sit in the future while a penalty is active.
    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed == Duration::ZERO {
            return;
        }

        let replenished = self
            .rate()
            .saturating_mul(elapsed.as_micros())
            .checked_div(Self::WINDOW_MICROS);

        if let Some(amount) = replenished
            && amount > 0
        {
            self.tokens = (self.tokens + amount).min(Self::TOKEN_SCALE);
            self.last_refill = now;
        }
    }

    fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= Self::TOKEN_SCALE {
            self.tokens -= Self::TOKEN_SCALE;
            Ok(())
        } else {
            Err(self.retry_delay(now))
        }
    }

    fn penalize(&mut self, until: Instant) {
        self.tokens = 0;
        self.last_refill = self.last_refill.max(until);
    }

    fn retry_delay(&self, now: Instant) -> Duration {
        let rate = self.rate();
        if rate == 0 {
            return Duration::MAX;
        }

        let frozen = self.last_refill.saturating_duration_since(now);
        let deficit = Self::TOKEN_SCALE.saturating_sub(self.tokens);
        let needed = deficit.saturating_mul(Self::WINDOW_MICROS);
        let retry_micros = needed.div_ceil(rate);
        let clamped = retry_micros.min(u128::from(u64::MAX));
        let micros = u64::try_from(clamped).unwrap_or(u64::MAX);
        frozen.saturating_add(Duration::from_micros(micros))
    }
}
