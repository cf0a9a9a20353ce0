//! Conversion from the raw YAML document into typed settings.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use lodestar_core::PlayableExtensions;
use regex::Regex;
use url::Url;

use crate::defaults::PLAYABLE_EXTENSIONS;
use crate::error::{ConfigError, ConfigResult};
use crate::model::{AppConfig, RawConfig, RawDirectory, RawFilter, SyncSettings};
use crate::policy::{DirectoryGroup, DirectoryRule, TorrentFilter, TreePolicy};

const ROOT: &str = "root";
const LOG_FORMATS: [&str; 2] = ["json", "pretty"];
const PROXY_SCHEMES: [&str; 4] = ["http", "https", "socks5", "socks5h"];

/// Validate a raw document and derive the typed configuration.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for the first field that fails validation.
pub fn validate(raw: RawConfig, source: Option<PathBuf>) -> ConfigResult<AppConfig> {
    let token = raw
        .token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ConfigError::invalid(ROOT, "token", None, "required"))?
        .to_string();

    let log_format = raw
        .log_format
        .as_deref()
        .map(|format| {
            let normalised = format.trim().to_ascii_lowercase();
            if LOG_FORMATS.contains(&normalised.as_str()) {
                Ok(normalised)
            } else {
                Err(ConfigError::invalid(
                    ROOT,
                    "log_format",
                    Some(format.to_string()),
                    "must be json or pretty",
                ))
            }
        })
        .transpose()?;

    let proxy = validate_proxy(raw.proxy.as_deref())?;
    let sync = validate_sync(&raw)?;
    let tree = validate_tree(&raw)?;

    Ok(AppConfig {
        source,
        token,
        host: raw.host,
        port: raw.port,
        api_timeout: Duration::from_secs(positive(raw.api_timeout_secs, "api_timeout_secs")?),
        proxy,
        force_ipv6: raw.should_force_ipv6,
        shutdown_grace: Duration::from_secs(raw.shutdown_grace_secs),
        log_format,
        log_level: raw.log_level,
        sync,
        tree,
    })
}

fn validate_proxy(value: Option<&str>) -> ConfigResult<Option<Url>> {
    let Some(text) = value.map(str::trim).filter(|text| !text.is_empty()) else {
        return Ok(None);
    };
    let rejected = |reason| ConfigError::invalid(ROOT, "proxy", Some(text.to_string()), reason);
    let url = Url::parse(text).map_err(|_| rejected("invalid url"))?;
    if !PROXY_SCHEMES.contains(&url.scheme()) || url.host_str().is_none() {
        return Err(rejected("unsupported proxy url"));
    }
    Ok(Some(url))
}

fn validate_sync(raw: &RawConfig) -> ConfigResult<SyncSettings> {
    let refresh = positive(raw.refresh_every_secs, "refresh_every_secs")?;
    let repair = positive(raw.repair_every_mins, "repair_every_mins")?;
    let stall = positive(raw.stall_threshold_mins, "stall_threshold_mins")?;
    let page_size = positive_usize(raw.torrents_page_size, "torrents_page_size")?;
    let max_torrents = positive_usize(raw.torrents_count, "torrents_count")?;

    Ok(SyncSettings {
        refresh_interval: Duration::from_secs(refresh),
        repair_interval: Duration::from_secs(repair.saturating_mul(60)),
        enable_repair: raw.enable_repair,
        retry_budget: positive_u32(raw.retries_until_failed, "retries_until_failed")?,
        api_rate_per_minute: positive_u32(
            raw.api_rate_limit_per_minute,
            "api_rate_limit_per_minute",
        )?,
        torrents_rate_per_minute: positive_u32(
            raw.torrents_rate_limit_per_minute,
            "torrents_rate_limit_per_minute",
        )?,
        rate_limit_sleep: Duration::from_secs(raw.rate_limit_sleep_secs),
        max_torrents,
        page_size,
        stall_threshold: Duration::from_secs(stall.saturating_mul(60)),
        on_library_update: raw
            .on_library_update
            .as_deref()
            .map(str::trim)
            .filter(|hook| !hook.is_empty())
            .map(PathBuf::from),
    })
}

fn validate_tree(raw: &RawConfig) -> ConfigResult<TreePolicy> {
    let playable = if raw.playable_extensions.is_empty() {
        PlayableExtensions::new(PLAYABLE_EXTENSIONS)
    } else {
        let set = PlayableExtensions::new(&raw.playable_extensions);
        if set.is_empty() {
            return Err(ConfigError::invalid(
                ROOT,
                "playable_extensions",
                None,
                "must contain at least one extension",
            ));
        }
        set
    };

    let groups = if raw.directories.is_empty() {
        vec![DirectoryGroup::catch_all()]
    } else {
        build_groups(&raw.directories)?
    };

    Ok(TreePolicy {
        playable,
        delete_rar_files: raw.should_delete_rar_files,
        retain_folder_name_extension: raw.enable_retain_folder_name_extension,
        retain_original_name: raw.enable_retain_rd_torrent_name,
        ignore_renames: raw.should_ignore_renames,
        groups,
    })
}

/// Group directory rules, ordering groups by their lowest `group_order` and rules by
/// `(group_order, name)`.
pub(crate) fn build_groups(
    directories: &BTreeMap<String, RawDirectory>,
) -> ConfigResult<Vec<DirectoryGroup>> {
    let mut grouped: BTreeMap<String, Vec<DirectoryRule>> = BTreeMap::new();
    for (name, directory) in directories {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.contains('/') {
            return Err(ConfigError::invalid(
                "directories",
                "name",
                Some(name.clone()),
                "must be a non-empty single path segment",
            ));
        }
        let section = format!("directories.{trimmed}");
        let filters = directory
            .filters
            .iter()
            .map(|filter| compile_filter(&section, filter))
            .collect::<ConfigResult<Vec<_>>>()?;
        let group = directory
            .group
            .as_deref()
            .map(str::trim)
            .filter(|group| !group.is_empty())
            .unwrap_or(trimmed)
            .to_string();
        grouped.entry(group).or_default().push(DirectoryRule {
            name: trimmed.to_string(),
            group_order: directory.group_order,
            filters,
        });
    }

    let mut groups: Vec<DirectoryGroup> = grouped
        .into_iter()
        .map(|(name, mut rules)| {
            rules.sort_by(|left, right| {
                left.group_order
                    .cmp(&right.group_order)
                    .then_with(|| left.name.cmp(&right.name))
            });
            DirectoryGroup { name, rules }
        })
        .collect();
    groups.sort_by(|left, right| {
        let left_order = left.rules.first().map_or(0, |rule| rule.group_order);
        let right_order = right.rules.first().map_or(0, |rule| rule.group_order);
        left_order
            .cmp(&right_order)
            .then_with(|| left.name.cmp(&right.name))
    });
    Ok(groups)
}

fn compile_filter(section: &str, filter: &RawFilter) -> ConfigResult<TorrentFilter> {
    let mut compiled = Vec::with_capacity(1);
    if let Some(text) = &filter.contains {
        compiled.push(TorrentFilter::Contains(lowercase(section, "contains", text)?));
    }
    if let Some(text) = &filter.not_contains {
        compiled.push(TorrentFilter::NotContains(lowercase(
            section,
            "not_contains",
            text,
        )?));
    }
    if let Some(pattern) = &filter.regex {
        compiled.push(TorrentFilter::Regex(compile_regex(section, "regex", pattern)?));
    }
    if let Some(pattern) = &filter.not_regex {
        compiled.push(TorrentFilter::NotRegex(compile_regex(
            section,
            "not_regex",
            pattern,
        )?));
    }
    if let Some(bytes) = filter.min_size_bytes {
        compiled.push(TorrentFilter::MinSizeBytes(bytes));
    }
    if let Some(bytes) = filter.max_size_bytes {
        compiled.push(TorrentFilter::MaxSizeBytes(bytes));
    }
    if let Some(text) = &filter.any_file_contains {
        compiled.push(TorrentFilter::AnyFileContains(lowercase(
            section,
            "any_file_contains",
            text,
        )?));
    }

    if compiled.len() != 1 {
        return Err(ConfigError::invalid(
            section,
            "filters",
            None,
            "each filter must set exactly one key",
        ));
    }
    compiled
        .pop()
        .ok_or_else(|| ConfigError::invalid(section, "filters", None, "empty filter"))
}

fn lowercase(section: &str, field: &str, text: &str) -> ConfigResult<String> {
    if text.is_empty() {
        return Err(ConfigError::invalid(section, field, None, "must not be empty"));
    }
    Ok(text.to_lowercase())
}

fn compile_regex(section: &str, field: &str, pattern: &str) -> ConfigResult<Regex> {
    Regex::new(pattern).map_err(|_| {
        ConfigError::invalid(section, field, Some(pattern.to_string()), "invalid regex")
    })
}

fn positive(value: u64, field: &'static str) -> ConfigResult<u64> {
    if value == 0 {
        return Err(ConfigError::invalid(
            ROOT,
            field,
            Some(value.to_string()),
            "must be positive",
        ));
    }
    Ok(value)
}

fn positive_u32(value: u32, field: &'static str) -> ConfigResult<u32> {
    positive(u64::from(value), field).map(|_| value)
}

fn positive_usize(value: usize, field: &'static str) -> ConfigResult<usize> {
    if value == 0 {
        return Err(ConfigError::invalid(
            ROOT,
            field,
            Some(value.to_string()),
            "must be positive",
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with_token() -> RawConfig {
        RawConfig {
            token: Some("secret".into()),
            ..RawConfig::default()
        }
    }

    #[test]
    fn defaults_validate() -> anyhow::Result<()> {
        let config = validate(raw_with_token(), None)?;
        assert_eq!(config.port, 9999);
        assert_eq!(config.sync.refresh_interval, Duration::from_secs(120));
        assert_eq!(config.sync.repair_interval, Duration::from_secs(30 * 60));
        assert_eq!(config.sync.retry_budget, 3);
        assert_eq!(config.sync.api_rate_per_minute, 60);
        assert_eq!(config.sync.torrents_rate_per_minute, 1);
        assert_eq!(config.tree.playable.len(), PLAYABLE_EXTENSIONS.len());
        assert_eq!(config.tree.groups.len(), 1);
        assert!(config.sync.on_library_update.is_none());
        Ok(())
    }

    #[test]
    fn proxy_and_ipv6_are_carried_over() -> anyhow::Result<()> {
        let config = validate(
            RawConfig {
                proxy: Some(" socks5://10.0.0.2:1080 ".into()),
                should_force_ipv6: true,
                ..raw_with_token()
            },
            None,
        )?;
        assert_eq!(
            config.proxy.as_ref().map(Url::as_str),
            Some("socks5://10.0.0.2:1080")
        );
        assert!(config.force_ipv6);

        let blank = validate(
            RawConfig {
                proxy: Some(String::new()),
                ..raw_with_token()
            },
            None,
        )?;
        assert!(blank.proxy.is_none());
        assert!(!blank.force_ipv6);
        Ok(())
    }

    #[test]
    fn malformed_proxy_is_rejected() {
        for proxy in ["not a url", "ftp://proxy.lan:21", "file:///tmp/socket"] {
            let err = validate(
                RawConfig {
                    proxy: Some(proxy.into()),
                    ..raw_with_token()
                },
                None,
            )
            .expect_err("proxy rejected");
            assert!(
                matches!(err, ConfigError::InvalidField { ref field, .. } if field == "proxy"),
                "{proxy}: {err:?}"
            );
        }
    }

    #[test]
    fn missing_token_is_rejected() {
        let err = validate(RawConfig::default(), None).expect_err("token required");
        assert!(matches!(
            err,
            ConfigError::InvalidField { ref field, reason: "required", .. } if field == "token"
        ));
    }

    #[test]
    fn zero_rates_are_rejected() {
        let raw = RawConfig {
            api_rate_limit_per_minute: 0,
            ..raw_with_token()
        };
        let err = validate(raw, None).expect_err("zero rate");
        assert!(matches!(
            err,
            ConfigError::InvalidField { ref field, .. } if field == "api_rate_limit_per_minute"
        ));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let raw = RawConfig {
            log_format: Some("xml".into()),
            ..raw_with_token()
        };
        assert!(validate(raw, None).is_err());
    }

    #[test]
    fn blank_hook_means_unset() -> anyhow::Result<()> {
        let raw = RawConfig {
            on_library_update: Some("   ".into()),
            ..raw_with_token()
        };
        assert!(validate(raw, None)?.sync.on_library_update.is_none());
        Ok(())
    }

    #[test]
    fn filters_need_exactly_one_key() {
        let mut directories = BTreeMap::new();
        directories.insert(
            "movies".to_string(),
            RawDirectory {
                group: None,
                group_order: 0,
                filters: vec![RawFilter {
                    contains: Some("a".into()),
                    regex: Some("b".into()),
                    ..RawFilter::default()
                }],
            },
        );
        assert!(build_groups(&directories).is_err());
    }

    #[test]
    fn bad_regex_is_reported_with_section() {
        let mut directories = BTreeMap::new();
        directories.insert(
            "shows".to_string(),
            RawDirectory {
                filters: vec![RawFilter {
                    regex: Some("(".into()),
                    ..RawFilter::default()
                }],
                ..RawDirectory::default()
            },
        );
        let err = build_groups(&directories).expect_err("invalid regex");
        assert!(matches!(
            err,
            ConfigError::InvalidField { ref section, reason: "invalid regex", .. }
                if section == "directories.shows"
        ));
    }

    #[test]
    fn groups_are_ordered_by_group_order() -> anyhow::Result<()> {
        let mut directories = BTreeMap::new();
        for (name, order) in [("shows", 2), ("4k", 0), ("movies", 1)] {
            directories.insert(
                name.to_string(),
                RawDirectory {
                    group: Some("media".into()),
                    group_order: order,
                    filters: Vec::new(),
                },
            );
        }
        directories.insert("everything".to_string(), RawDirectory::default());

        let groups = build_groups(&directories)?;
        assert_eq!(groups.len(), 2);
        let media = groups
            .iter()
            .find(|group| group.name == "media")
            .expect("media group");
        let names: Vec<_> = media.rules.iter().map(|rule| rule.name.as_str()).collect();
        assert_eq!(names, vec!["4k", "movies", "shows"]);
        Ok(())
    }
}
