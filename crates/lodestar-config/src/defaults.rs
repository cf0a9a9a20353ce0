//! Default values and lookup paths for configuration documents.
//!
//! # Design
//! - Every default lives here so the raw model and the docs agree.
//! - Lookup order: explicit flag, `LODESTAR_CONFIG`, working directory, container path.

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "LODESTAR_CONFIG";
/// Configuration file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "config.yml";
/// Configuration file looked up inside container images.
pub const CONTAINER_CONFIG_FILE: &str = "/app/config.yml";

/// Directory every torrent lands in when no rules are configured.
pub const ALL_DIRECTORY: &str = "__all__";

pub(crate) const HOST: &str = "0.0.0.0";
pub(crate) const PORT: u16 = 9999;
pub(crate) const REFRESH_EVERY_SECS: u64 = 120;
pub(crate) const REPAIR_EVERY_MINS: u64 = 30;
pub(crate) const RETRIES_UNTIL_FAILED: u32 = 3;
pub(crate) const API_RATE_LIMIT_PER_MINUTE: u32 = 60;
pub(crate) const TORRENTS_RATE_LIMIT_PER_MINUTE: u32 = 1;
pub(crate) const RATE_LIMIT_SLEEP_SECS: u64 = 5;
pub(crate) const TORRENTS_COUNT: usize = 2500;
pub(crate) const TORRENTS_PAGE_SIZE: usize = 1000;
pub(crate) const STALL_THRESHOLD_MINS: u64 = 60;
pub(crate) const SHUTDOWN_GRACE_SECS: u64 = 30;
pub(crate) const API_TIMEOUT_SECS: u64 = 30;
pub(crate) const LOG_LEVEL: &str = "info";

/// Extensions served when the document does not list any.
pub const PLAYABLE_EXTENSIONS: [&str; 11] = [
    ".mp4", ".mkv", ".avi", ".mov", ".wmv", ".flv", ".webm", ".m4v", ".3gp", ".ts", ".m2ts",
];
