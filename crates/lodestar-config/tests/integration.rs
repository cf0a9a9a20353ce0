use std::io::Write;
use std::time::Duration;

use lodestar_config::defaults::ALL_DIRECTORY;
use lodestar_config::{ConfigError, TorrentFilter, load, parse_str};

const FULL_DOCUMENT: &str = r"
token: ABCDEF
port: 8080
refresh_every_secs: 15
repair_every_mins: 10
enable_repair: true
retries_until_failed: 5
api_rate_limit_per_minute: 250
torrents_rate_limit_per_minute: 4
rate_limit_sleep_secs: 7
playable_extensions: [mkv, .MP4]
should_delete_rar_files: true
enable_retain_folder_name_extension: true
should_ignore_renames: true
torrents_page_size: 250
on_library_update: /usr/local/bin/notify.sh
log_format: JSON
num_of_workers: 8
directories:
  anime:
    group: media
    group_order: 10
    filters:
      - regex: (?i)\[subsplease\]
  shows:
    group: media
    group_order: 20
    filters:
      - regex: S\d\dE\d\d
      - not_contains: sample
  movies:
    group: media
    group_order: 30
    filters:
      - min_size_bytes: 1000000
";

#[test]
fn full_document_loads_into_typed_settings() -> anyhow::Result<()> {
    let config = parse_str(FULL_DOCUMENT)?;

    assert_eq!(config.token, "ABCDEF");
    assert_eq!(config.port, 8080);
    assert_eq!(config.log_format.as_deref(), Some("json"));

    let sync = &config.sync;
    assert_eq!(sync.refresh_interval, Duration::from_secs(15));
    assert_eq!(sync.repair_interval, Duration::from_secs(600));
    assert!(sync.enable_repair);
    assert_eq!(sync.retry_budget, 5);
    assert_eq!(sync.api_rate_per_minute, 250);
    assert_eq!(sync.torrents_rate_per_minute, 4);
    assert_eq!(sync.rate_limit_sleep, Duration::from_secs(7));
    assert_eq!(sync.page_size, 250);
    assert_eq!(sync.max_torrents, 2500);
    assert_eq!(
        sync.on_library_update.as_deref(),
        Some(std::path::Path::new("/usr/local/bin/notify.sh"))
    );

    let tree = &config.tree;
    assert!(tree.delete_rar_files);
    assert!(tree.retain_folder_name_extension);
    assert!(!tree.retain_original_name);
    assert!(tree.ignore_renames);
    assert_eq!(
        tree.playable.iter().collect::<Vec<_>>(),
        vec![".mkv", ".mp4"]
    );

    assert_eq!(tree.groups.len(), 1);
    let media = &tree.groups[0];
    let names: Vec<_> = media.rules.iter().map(|rule| rule.name.as_str()).collect();
    assert_eq!(names, vec!["anime", "shows", "movies"]);
    assert!(matches!(
        media.rules[1].filters[1],
        TorrentFilter::NotContains(ref text) if text == "sample"
    ));
    Ok(())
}

#[test]
fn minimal_document_uses_catch_all_directory() -> anyhow::Result<()> {
    let config = parse_str("token: abc\n")?;
    assert_eq!(config.tree.groups.len(), 1);
    assert_eq!(config.tree.groups[0].rules[0].name, ALL_DIRECTORY);
    assert!(config.tree.groups[0].rules[0].filters.is_empty());
    Ok(())
}

#[test]
fn load_reads_from_disk_and_records_source() -> anyhow::Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "token: from-disk")?;
    writeln!(file, "should_delete_rar_files: true")?;
    let config = load(file.path())?;
    assert_eq!(config.token, "from-disk");
    assert_eq!(config.source.as_deref(), Some(file.path()));
    assert!(config.tree.delete_rar_files);
    Ok(())
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = load(&dir.path().join("absent.yml")).expect_err("missing file");
    assert!(matches!(err, ConfigError::Io { operation: "config.load.read", .. }));
}

#[test]
fn unknown_filter_key_is_rejected() {
    let document = "token: abc\ndirectories:\n  x:\n    filters:\n      - starts_with: foo\n";
    assert!(matches!(parse_str(document), Err(ConfigError::Parse { .. })));
}
