//! Raw YAML document and the typed settings derived from it.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::defaults;
use crate::policy::TreePolicy;

/// Configuration document exactly as written in YAML.
///
/// Unknown keys are ignored so documents written for older releases still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// Debrid API token.
    pub token: Option<String>,
    /// Bind host for the serving layer.
    pub host: String,
    /// Bind port for the serving layer.
    pub port: u16,
    /// Seconds between refresh cycles.
    pub refresh_every_secs: u64,
    /// Minutes between repair cycles.
    pub repair_every_mins: u64,
    /// Whether the repair job runs at all.
    pub enable_repair: bool,
    /// Retry budget for remote calls and repair attempts.
    pub retries_until_failed: u32,
    /// Calls per minute for general endpoints.
    pub api_rate_limit_per_minute: u32,
    /// Calls per minute for the torrent listing.
    pub torrents_rate_limit_per_minute: u32,
    /// Seconds a bucket stays empty after a 429.
    pub rate_limit_sleep_secs: u64,
    /// Extensions exposed in the tree; empty means the defaults.
    pub playable_extensions: Vec<String>,
    /// Hide `.rar` files from the tree.
    pub should_delete_rar_files: bool,
    /// Keep a single-file torrent's extension in its folder name.
    pub enable_retain_folder_name_extension: bool,
    /// Use the remote torrent name verbatim.
    pub enable_retain_rd_torrent_name: bool,
    /// Keep the first-seen folder name when the remote renames a torrent.
    pub should_ignore_renames: bool,
    /// Upper bound on torrents fetched per refresh.
    pub torrents_count: usize,
    /// Page size for the torrent listing.
    pub torrents_page_size: usize,
    /// Command run after a refresh that changed the library.
    pub on_library_update: Option<String>,
    /// Minutes without progress before a downloading torrent counts as stalled.
    pub stall_threshold_mins: u64,
    /// Seconds to wait for background jobs at shutdown.
    pub shutdown_grace_secs: u64,
    /// Per-request timeout for the HTTP client.
    pub api_timeout_secs: u64,
    /// Proxy for every API request (`http`, `https`, or `socks5` URL); empty means none.
    pub proxy: Option<String>,
    /// Bind outgoing connections to an IPv6 local address.
    pub should_force_ipv6: bool,
    /// Log output format (`json` or `pretty`).
    pub log_format: Option<String>,
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
    /// Named directory rules.
    pub directories: BTreeMap<String, RawDirectory>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            token: None,
            host: defaults::HOST.to_string(),
            port: defaults::PORT,
            refresh_every_secs: defaults::REFRESH_EVERY_SECS,
            repair_every_mins: defaults::REPAIR_EVERY_MINS,
            enable_repair: false,
            retries_until_failed: defaults::RETRIES_UNTIL_FAILED,
            api_rate_limit_per_minute: defaults::API_RATE_LIMIT_PER_MINUTE,
            torrents_rate_limit_per_minute: defaults::TORRENTS_RATE_LIMIT_PER_MINUTE,
            rate_limit_sleep_secs: defaults::RATE_LIMIT_SLEEP_SECS,
            playable_extensions: Vec::new(),
            should_delete_rar_files: false,
            enable_retain_folder_name_extension: false,
            enable_retain_rd_torrent_name: false,
            should_ignore_renames: false,
            torrents_count: defaults::TORRENTS_COUNT,
            torrents_page_size: defaults::TORRENTS_PAGE_SIZE,
            on_library_update: None,
            stall_threshold_mins: defaults::STALL_THRESHOLD_MINS,
            shutdown_grace_secs: defaults::SHUTDOWN_GRACE_SECS,
            api_timeout_secs: defaults::API_TIMEOUT_SECS,
            proxy: None,
            should_force_ipv6: false,
            log_format: None,
            log_level: defaults::LOG_LEVEL.to_string(),
            directories: BTreeMap::new(),
        }
    }
}

/// One entry under `directories:`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawDirectory {
    /// Group the directory competes in; defaults to the directory's own name.
    pub group: Option<String>,
    /// Priority within the group (lower wins).
    pub group_order: i64,
    /// Filters that must all match.
    pub filters: Vec<RawFilter>,
}

/// A single filter; exactly one key must be set.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawFilter {
    /// Torrent name contains the text (case-insensitive).
    pub contains: Option<String>,
    /// Torrent name does not contain the text (case-insensitive).
    pub not_contains: Option<String>,
    /// Torrent name matches the pattern.
    pub regex: Option<String>,
    /// Torrent name does not match the pattern.
    pub not_regex: Option<String>,
    /// Torrent is at least this large.
    pub min_size_bytes: Option<u64>,
    /// Torrent is at most this large.
    pub max_size_bytes: Option<u64>,
    /// Some file path contains the text (case-insensitive).
    pub any_file_contains: Option<String>,
}

/// Fully validated configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// File the configuration was read from, when loaded from disk.
    pub source: Option<PathBuf>,
    /// Debrid API token.
    pub token: String,
    /// Bind host for the serving layer.
    pub host: String,
    /// Bind port for the serving layer.
    pub port: u16,
    /// Per-request timeout for the HTTP client.
    pub api_timeout: Duration,
    /// Proxy every API request goes through.
    pub proxy: Option<Url>,
    /// Connect to the API over IPv6 only.
    pub force_ipv6: bool,
    /// Time allowed for background jobs to stop.
    pub shutdown_grace: Duration,
    /// Requested log format (`json` or `pretty`).
    pub log_format: Option<String>,
    /// Default log level.
    pub log_level: String,
    /// Settings consumed by the sync core.
    pub sync: SyncSettings,
    /// Settings consumed by the tree builder.
    pub tree: TreePolicy,
}

/// Scheduling, budget, and rate settings for the sync core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Period of the refresh job.
    pub refresh_interval: Duration,
    /// Period of the repair job.
    pub repair_interval: Duration,
    /// Whether the repair job is scheduled.
    pub enable_repair: bool,
    /// Retry budget for remote calls and repair escalation.
    pub retry_budget: u32,
    /// General bucket refill per minute.
    pub api_rate_per_minute: u32,
    /// Listing bucket refill per minute.
    pub torrents_rate_per_minute: u32,
    /// Penalty applied after a 429.
    pub rate_limit_sleep: Duration,
    /// Upper bound on torrents fetched per refresh.
    pub max_torrents: usize,
    /// Listing page size.
    pub page_size: usize,
    /// Time without progress before a download is stalled.
    pub stall_threshold: Duration,
    /// Library-update hook command.
    pub on_library_update: Option<PathBuf>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(defaults::REFRESH_EVERY_SECS),
            repair_interval: Duration::from_secs(defaults::REPAIR_EVERY_MINS * 60),
            enable_repair: false,
            retry_budget: defaults::RETRIES_UNTIL_FAILED,
            api_rate_per_minute: defaults::API_RATE_LIMIT_PER_MINUTE,
            torrents_rate_per_minute: defaults::TORRENTS_RATE_LIMIT_PER_MINUTE,
            rate_limit_sleep: Duration::from_secs(defaults::RATE_LIMIT_SLEEP_SECS),
            max_torrents: defaults::TORRENTS_COUNT,
            page_size: defaults::TORRENTS_PAGE_SIZE,
            stall_threshold: Duration::from_secs(defaults::STALL_THRESHOLD_MINS * 60),
            on_library_update: None,
        }
    }
}
