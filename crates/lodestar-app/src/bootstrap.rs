use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use lodestar_client::{HttpOptions, RealDebridClient};
use lodestar_config::{AppConfig, resolve_config_path};
use lodestar_core::RemoteClient;
use lodestar_sync::Library;
use lodestar_telemetry::{CommandSpan, LogFormat, LoggingConfig, Metrics, init_logging};
use tracing::{debug, info, warn};

use crate::cli::{Cli, Command};
use crate::error::{AppError, AppResult};

/// Build identifier recorded in every log line.
pub const BUILD_SHA: &str = match option_env!("LODESTAR_BUILD_SHA") {
    Some(sha) => sha,
    None => "dev",
};

/// Dependencies required to run a command.
pub(crate) struct BootstrapDependencies {
    config: AppConfig,
    client: Arc<dyn RemoteClient>,
    metrics: Metrics,
}

impl BootstrapDependencies {
    /// Production dependencies: the Real-Debrid client and a fresh metrics registry.
    pub(crate) fn from_config(config: AppConfig) -> AppResult<Self> {
        let options = HttpOptions {
            timeout: config.api_timeout,
            proxy: config.proxy.clone(),
            force_ipv6: config.force_ipv6,
        };
        let client = RealDebridClient::new(&config.token, &options)
            .map_err(|err| AppError::client("client.new", err))?;
        let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        Ok(Self {
            config,
            client: Arc::new(client),
            metrics,
        })
    }
}

/// Entry point for the `lodestar` binary.
///
/// # Errors
///
/// Returns an error if configuration loading, logging setup, or the selected command fails.
pub async fn run_app(cli: Cli) -> AppResult<()> {
    let command = cli.command();
    if command == Command::Version {
        print_version();
        return Ok(());
    }

    let path = resolve_config_path(cli.config.as_deref());
    let config =
        lodestar_config::load(&path).map_err(|err| AppError::config("config.load", err))?;
    init_logging(&LoggingConfig {
        level: &config.log_level,
        format: LogFormat::from_setting(config.log_format.as_deref()),
        build_sha: BUILD_SHA,
    })
    .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _span = CommandSpan::enter(command.label());
    log_bootstrap(&path, &config);

    let dependencies = BootstrapDependencies::from_config(config)?;
    run_app_with(dependencies, command, shutdown_signal()).await
}

/// Dispatch `command` against injected dependencies. `serve` runs until `shutdown` resolves.
pub(crate) async fn run_app_with<S>(
    dependencies: BootstrapDependencies,
    command: Command,
    shutdown: S,
) -> AppResult<()>
where
    S: Future<Output = AppResult<()>>,
{
    let BootstrapDependencies {
        config,
        client,
        metrics,
    } = dependencies;
    let AppConfig {
        host,
        port,
        shutdown_grace,
        sync,
        tree,
        ..
    } = config;
    let library = Library::new(client, sync, tree, metrics);

    match command {
        Command::Serve => {
            library.start();
            let tree = library.current_tree();
            info!(
                host = %host,
                port,
                directories = ?tree.directory_names().collect::<Vec<_>>(),
                "library ready"
            );

            let signal = shutdown.await;
            let report = library.shutdown(shutdown_grace).await;
            if !report.abandoned.is_empty() {
                warn!(abandoned = ?report.abandoned, "jobs abandoned at shutdown");
            }
            match library.metrics().render() {
                Ok(exposition) => debug!(%exposition, "final metrics"),
                Err(err) => warn!(error = %err, "metrics export failed"),
            }
            info!("lodestar shutdown complete");
            signal
        }
        Command::ClearTorrents => {
            let report = library
                .clear_torrents()
                .await
                .map_err(|err| AppError::sync("library.clear_torrents", err))?;
            info!(
                deleted = report.deleted,
                failed = report.failed,
                "clear-torrents finished"
            );
            Ok(())
        }
        Command::ClearDownloads => {
            let report = library
                .clear_downloads()
                .await
                .map_err(|err| AppError::sync("library.clear_downloads", err))?;
            info!(
                deleted = report.deleted,
                failed = report.failed,
                "clear-downloads finished"
            );
            Ok(())
        }
        Command::Version => {
            print_version();
            Ok(())
        }
    }
}

fn log_bootstrap(path: &Path, config: &AppConfig) {
    info!(
        config = %path.display(),
        refresh_secs = config.sync.refresh_interval.as_secs(),
        repair = config.sync.enable_repair,
        hook = config.sync.on_library_update.is_some(),
        "lodestar bootstrap starting"
    );
}

fn print_version() {
    println!("lodestar {} ({BUILD_SHA})", env!("CARGO_PKG_VERSION"));
}

/// Resolve on Ctrl-C, or on SIGTERM where available.
async fn shutdown_signal() -> AppResult<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate()).map_err(|source| AppError::Io {
            operation: "signal.terminate",
            source,
        })?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map_err(|source| AppError::Io {
                operation: "signal.ctrl_c",
                source,
            })?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .map_err(|source| AppError::Io {
            operation: "signal.ctrl_c",
            source,
        })?;

    info!("shutdown signal received");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lodestar_core::Download;
    use lodestar_test_support::fixtures::{fixed_time, movie};
    use lodestar_test_support::{Failure, Operation, ScriptedRemote};

    use super::*;

    fn dependencies(
        remote: &Arc<ScriptedRemote>,
        yaml: &str,
    ) -> anyhow::Result<BootstrapDependencies> {
        let client: Arc<dyn RemoteClient> = remote.clone();
        Ok(BootstrapDependencies {
            config: lodestar_config::parse_str(yaml)?,
            client,
            metrics: Metrics::new()?,
        })
    }

    const CONFIG: &str = "token: test-token\ntorrents_page_size: 2\nshutdown_grace_secs: 1\n";

    #[test]
    fn production_dependencies_build_from_config() -> anyhow::Result<()> {
        let config = lodestar_config::parse_str(CONFIG)?;
        let dependencies = BootstrapDependencies::from_config(config)?;
        assert_eq!(dependencies.config.token, "test-token");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn serve_runs_until_shutdown_resolves() -> anyhow::Result<()> {
        let remote = Arc::new(ScriptedRemote::with_torrents([movie("A", "Film")]));
        let dependencies = dependencies(&remote, CONFIG)?;
        run_app_with(dependencies, Command::Serve, async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await?;
        assert!(remote.calls(Operation::ListTorrents) >= 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn serve_reports_a_failed_signal_after_stopping() -> anyhow::Result<()> {
        let remote = Arc::new(ScriptedRemote::new());
        let dependencies = dependencies(&remote, CONFIG)?;
        let result = run_app_with(dependencies, Command::Serve, async {
            Err(AppError::Io {
                operation: "signal.ctrl_c",
                source: std::io::Error::other("no signal handler"),
            })
        })
        .await;
        assert!(matches!(result, Err(AppError::Io { operation: "signal.ctrl_c", .. })));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn clear_torrents_empties_the_account() -> anyhow::Result<()> {
        let remote = Arc::new(ScriptedRemote::with_torrents(
            (0..5).map(|n| movie(&format!("T{n}"), &format!("t{n}"))),
        ));
        let dependencies = dependencies(&remote, CONFIG)?;
        run_app_with(dependencies, Command::ClearTorrents, async { Ok(()) }).await?;
        assert!(remote.torrents().is_empty());
        assert_eq!(remote.deleted().len(), 5);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn clear_downloads_empties_history() -> anyhow::Result<()> {
        let remote = Arc::new(ScriptedRemote::new());
        remote.set_downloads(
            (0..3)
                .map(|n| Download {
                    id: format!("D{n}"),
                    filename: format!("d{n}.mkv"),
                    mime_type: None,
                    filesize: 1,
                    link: format!("https://real-debrid.com/d/D{n}"),
                    host: "real-debrid.com".to_string(),
                    download: format!("https://cdn.example/D{n}"),
                    generated: fixed_time(),
                })
                .collect(),
        );
        let dependencies = dependencies(&remote, CONFIG)?;
        run_app_with(dependencies, Command::ClearDownloads, async { Ok(()) }).await?;
        assert_eq!(remote.deleted().len(), 3);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn listing_failure_surfaces_as_sync_error() -> anyhow::Result<()> {
        let remote = Arc::new(ScriptedRemote::with_torrents([movie("A", "Film")]));
        remote.fail_next(Operation::ListTorrents, Failure::Status(401));
        let dependencies = dependencies(&remote, CONFIG)?;
        let result = run_app_with(dependencies, Command::ClearTorrents, async { Ok(()) }).await;
        assert!(matches!(
            result,
            Err(AppError::Sync {
                operation: "library.clear_torrents",
                ..
            })
        ));
        assert_eq!(remote.torrents().len(), 1);
        Ok(())
    }
}
