use std::sync::Arc;
use std::time::Duration;

use lodestar_config::{SyncSettings, TreePolicy};
use lodestar_core::{RemoteClient, TorrentStatus};
use lodestar_sync::{Library, SyncError};
use lodestar_telemetry::Metrics;
use lodestar_test_support::fixtures::{detail, file, movie};
use lodestar_test_support::{Operation, ScriptedRemote};

fn library(remote: &Arc<ScriptedRemote>, settings: SyncSettings) -> anyhow::Result<Library> {
    let client: Arc<dyn RemoteClient> = remote.clone();
    Ok(Library::new(
        client,
        settings,
        TreePolicy::default(),
        Metrics::new()?,
    ))
}

fn settings() -> SyncSettings {
    SyncSettings {
        api_rate_per_minute: 60_000,
        torrents_rate_per_minute: 60_000,
        ..SyncSettings::default()
    }
}

#[tokio::test(start_paused = true)]
async fn started_library_publishes_and_stops_cleanly() -> anyhow::Result<()> {
    let remote = Arc::new(ScriptedRemote::with_torrents([movie("A", "Film")]));
    let library = library(&remote, settings())?;
    let mut trees = library.subscribe_tree();

    library.start();
    library.start();
    trees.changed().await?;
    assert_eq!(trees.borrow().generation, 1);
    assert_eq!(library.current_tree().file_count(), 1);

    let report = library.shutdown(Duration::from_secs(5)).await;
    assert!(report.abandoned.is_empty());
    assert!(library.cancellation().is_cancelled());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn manual_cycles_fail_after_shutdown() -> anyhow::Result<()> {
    let remote = Arc::new(ScriptedRemote::with_torrents([movie("A", "Film")]));
    let library = library(&remote, settings())?;
    library.shutdown(Duration::from_secs(1)).await;

    let err = library.refresh_now().await.expect_err("cancelled");
    assert!(err.is_cancelled());
    assert_eq!(library.snapshot().generation, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn resolve_file_unrestricts_by_path_or_name() -> anyhow::Result<()> {
    let remote = Arc::new(ScriptedRemote::with_torrents([detail(
        "A",
        "Film",
        TorrentStatus::Downloaded,
        vec![
            file(1, "/Film/film.mkv", 100, true),
            file(2, "/Film/extra.nfo", 1, false),
        ],
    )]));
    let library = library(&remote, settings())?;
    library.refresh_now().await?;

    let by_name = library.resolve_file("A", "film.mkv").await?;
    let by_path = library.resolve_file("A", "/Film/film.mkv").await?;
    assert_eq!(by_name, by_path);
    assert!(by_name.download.ends_with("/direct"));

    assert!(matches!(
        library.resolve_file("Z", "film.mkv").await,
        Err(SyncError::TorrentNotFound { .. })
    ));
    assert!(matches!(
        library.resolve_file("A", "missing.mkv").await,
        Err(SyncError::FileNotFound { .. })
    ));
    assert!(matches!(
        library.resolve_file("A", "extra.nfo").await,
        Err(SyncError::LinkUnavailable { .. })
    ));
    assert_eq!(remote.calls(Operation::UnrestrictLink), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn repair_now_runs_when_scheduling_is_disabled() -> anyhow::Result<()> {
    let remote = Arc::new(ScriptedRemote::with_torrents([detail(
        "A",
        "Pack",
        TorrentStatus::WaitingFilesSelection,
        vec![file(1, "/Pack/a.mkv", 10, false)],
    )]));
    let library = library(
        &remote,
        SyncSettings {
            enable_repair: false,
            ..settings()
        },
    )?;
    library.refresh_now().await?;
    let outcome = library.repair_now().await?;
    assert_eq!(outcome.remediated, 1);
    assert_eq!(library.metrics().repair_actions("reselect"), 1);
    Ok(())
}

#[cfg(unix)]
mod hook {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use super::*;

    fn counting_script(dir: &Path) -> anyhow::Result<(std::path::PathBuf, std::path::PathBuf)> {
        let counter = dir.join("count");
        let script = dir.join("hook.sh");
        fs::write(
            &script,
            format!("#!/bin/sh\necho run >> '{}'\n", counter.display()),
        )?;
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;
        Ok((script, counter))
    }

    fn runs(counter: &Path) -> usize {
        fs::read_to_string(counter).map_or(0, |text| text.lines().count())
    }

    #[tokio::test]
    async fn hook_runs_once_per_changing_cycle() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let (script, counter) = counting_script(dir.path())?;
        let remote = Arc::new(ScriptedRemote::with_torrents([movie("A", "Film")]));
        let library = library(
            &remote,
            SyncSettings {
                on_library_update: Some(script),
                ..settings()
            },
        )?;

        library.refresh_now().await?;
        assert_eq!(runs(&counter), 1);

        let outcome = library.refresh_now().await?;
        assert!(!outcome.changed());
        assert_eq!(runs(&counter), 1);

        remote.upsert(movie("B", "Second"));
        library.refresh_now().await?;
        assert_eq!(runs(&counter), 2);
        assert_eq!(library.metrics().hook_invocations("success"), 2);
        Ok(())
    }

    #[tokio::test]
    async fn failing_hook_does_not_fail_the_cycle() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let remote = Arc::new(ScriptedRemote::with_torrents([movie("A", "Film")]));
        let library = library(
            &remote,
            SyncSettings {
                on_library_update: Some(dir.path().join("missing-hook")),
                ..settings()
            },
        )?;

        let outcome = library.refresh_now().await?;
        assert_eq!(outcome.generation, Some(1));
        assert_eq!(library.metrics().hook_invocations("spawn_error"), 1);
        Ok(())
    }
}
