//! Errors that end a `lodestar` command, each tagged with the step that failed.

use std::io;

use thiserror::Error;

/// Result of a top-level command.
pub type AppResult<T> = Result<T, AppError>;

/// Failure of a `lodestar` command. The process exit code derives from the variant.
#[derive(Debug, Error)]
pub enum AppError {
    /// `lodestar.yml` was missing, malformed, or rejected.
    #[error("could not load configuration")]
    Config {
        /// Failing step, for example `config.load`.
        operation: &'static str,
        /// Loader failure.
        source: lodestar_config::ConfigError,
    },
    /// Logging or the metrics registry could not be installed.
    #[error("could not set up logging or metrics")]
    Telemetry {
        /// Failing step.
        operation: &'static str,
        /// Telemetry failure.
        source: lodestar_telemetry::TelemetryError,
    },
    /// The Real-Debrid client could not be constructed.
    #[error("could not build the Real-Debrid client")]
    Client {
        /// Failing step.
        operation: &'static str,
        /// Client failure.
        source: lodestar_client::ClientError,
    },
    /// A library command such as `clear-torrents` failed against the account.
    #[error("library command failed")]
    Sync {
        /// Failing step, for example `library.clear_torrents`.
        operation: &'static str,
        /// Library failure.
        source: lodestar_sync::SyncError,
    },
    /// Signal handling failed.
    #[error("could not wait for a shutdown signal")]
    Io {
        /// Failing step, for example `signal.ctrl_c`.
        operation: &'static str,
        /// OS failure.
        source: io::Error,
    },
}

impl AppError {
    pub(crate) const fn config(
        operation: &'static str,
        source: lodestar_config::ConfigError,
    ) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: lodestar_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn client(
        operation: &'static str,
        source: lodestar_client::ClientError,
    ) -> Self {
        Self::Client { operation, source }
    }

    pub(crate) const fn sync(operation: &'static str, source: lodestar_sync::SyncError) -> Self {
        Self::Sync { operation, source }
    }

    /// Operation label carried by every variant.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Config { operation, .. }
            | Self::Telemetry { operation, .. }
            | Self::Client { operation, .. }
            | Self::Sync { operation, .. }
            | Self::Io { operation, .. } => operation,
        }
    }

    /// Process exit code: 2 for configuration problems, 1 otherwise.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config { .. } => 2,
            _ => 1,
        }
    }
}
