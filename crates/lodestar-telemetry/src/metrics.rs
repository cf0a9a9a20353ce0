//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters and gauges the sync jobs report against.

use std::fmt;
use std::sync::Arc;

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared across the sync jobs.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    refresh_cycles_total: IntCounterVec,
    repair_actions_total: IntCounterVec,
    rate_limit_penalties_total: IntCounterVec,
    hook_invocations_total: IntCounterVec,
    store_generation: IntGauge,
    torrents_cached: IntGauge,
    tree_files: IntGauge,
    premium_days_remaining: IntGauge,
}

/// Snapshot of the gauges for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Generation of the most recently committed store.
    pub store_generation: i64,
    /// Torrents held in the store.
    pub torrents_cached: i64,
    /// Files published in the current tree.
    pub tree_files: i64,
    /// Days of premium left at the last account check.
    pub premium_days_remaining: i64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built or
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let refresh_cycles_total = counter_vec(
            "refresh_cycles_total",
            "Refresh cycles completed by outcome",
            &["outcome"],
        )?;
        let repair_actions_total = counter_vec(
            "repair_actions_total",
            "Repair remediation steps by action",
            &["action"],
        )?;
        let rate_limit_penalties_total = counter_vec(
            "rate_limit_penalties_total",
            "Rate-limit penalties applied after HTTP 429 by bucket",
            &["bucket"],
        )?;
        let hook_invocations_total = counter_vec(
            "hook_invocations_total",
            "Library-update hook runs by outcome",
            &["outcome"],
        )?;
        let store_generation = gauge("store_generation", "Committed store generation")?;
        let torrents_cached = gauge("torrents_cached", "Torrents held in the store")?;
        let tree_files = gauge("tree_files", "Files published in the virtual tree")?;
        let premium_days_remaining = gauge(
            "premium_days_remaining",
            "Days of premium left on the account",
        )?;

        register(&registry, "refresh_cycles_total", &refresh_cycles_total)?;
        register(&registry, "repair_actions_total", &repair_actions_total)?;
        register(
            &registry,
            "rate_limit_penalties_total",
            &rate_limit_penalties_total,
        )?;
        register(&registry, "hook_invocations_total", &hook_invocations_total)?;
        register(&registry, "store_generation", &store_generation)?;
        register(&registry, "torrents_cached", &torrents_cached)?;
        register(&registry, "tree_files", &tree_files)?;
        register(&registry, "premium_days_remaining", &premium_days_remaining)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                refresh_cycles_total,
                repair_actions_total,
                rate_limit_penalties_total,
                hook_invocations_total,
                store_generation,
                torrents_cached,
                tree_files,
                premium_days_remaining,
            }),
        })
    }

    /// Count a finished refresh cycle (`changed`, `unchanged`, `failed`).
    pub fn inc_refresh_cycle(&self, outcome: &str) {
        self.inner
            .refresh_cycles_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Count a repair step (`reselect`, `refetch`, `delete`, `readd`, ...).
    pub fn inc_repair_action(&self, action: &str) {
        self.inner
            .repair_actions_total
            .with_label_values(&[action])
            .inc();
    }

    /// Count a penalty applied to a rate-limit bucket.
    pub fn inc_rate_limit_penalty(&self, bucket: &str) {
        self.inner
            .rate_limit_penalties_total
            .with_label_values(&[bucket])
            .inc();
    }

    /// Count a hook invocation (`success`, `failure`, `spawn_error`).
    pub fn inc_hook_invocation(&self, outcome: &str) {
        self.inner
            .hook_invocations_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record the outcome of a store commit.
    pub fn observe_commit(&self, generation: u64, torrents: usize, files: usize) {
        self.inner.store_generation.set(saturating_i64(generation));
        self.inner
            .torrents_cached
            .set(saturating_i64(u64::try_from(torrents).unwrap_or(u64::MAX)));
        self.inner
            .tree_files
            .set(saturating_i64(u64::try_from(files).unwrap_or(u64::MAX)));
    }

    /// Record the premium days left at the latest account check.
    pub fn set_premium_days_remaining(&self, days: i64) {
        self.inner.premium_days_remaining.set(days);
    }

    /// Current value of a refresh-cycle counter.
    #[must_use]
    pub fn refresh_cycles(&self, outcome: &str) -> u64 {
        self.inner
            .refresh_cycles_total
            .with_label_values(&[outcome])
            .get()
    }

    /// Current value of a repair-action counter.
    #[must_use]
    pub fn repair_actions(&self, action: &str) -> u64 {
        self.inner
            .repair_actions_total
            .with_label_values(&[action])
            .get()
    }

    /// Current value of a penalty counter.
    #[must_use]
    pub fn rate_limit_penalties(&self, bucket: &str) -> u64 {
        self.inner
            .rate_limit_penalties_total
            .with_label_values(&[bucket])
            .get()
    }

    /// Current value of a hook counter.
    #[must_use]
    pub fn hook_invocations(&self, outcome: &str) -> u64 {
        self.inner
            .hook_invocations_total
            .with_label_values(&[outcome])
            .get()
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the gauges.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            store_generation: self.inner.store_generation.get(),
            torrents_cached: self.inner.torrents_cached.get(),
            tree_files: self.inner.tree_files.get(),
            premium_days_remaining: self.inner.premium_days_remaining.get(),
        }
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Metrics")
            .field("gauges", &self.snapshot())
            .finish_non_exhaustive()
    }
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricSetup {
            metric: name,
            stage: "build",
            source,
        })
}

fn gauge(name: &'static str, help: &str) -> Result<IntGauge> {
    IntGauge::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricSetup {
            metric: name,
            stage: "build",
            source,
        })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricSetup {
            metric: name,
            stage: "register",
            source,
        })
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
