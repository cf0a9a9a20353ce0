//! Library-update hook: an external command run after a refresh changes the library.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use lodestar_telemetry::Metrics;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How a hook invocation ended. Failures are logged and never propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// Exit status zero.
    Succeeded,
    /// Non-zero exit or killed by a signal (`None`).
    Failed {
        /// Exit code when the process exited normally.
        code: Option<i32>,
    },
    /// The command could not be started.
    SpawnFailed,
    /// Cancellation fired while the command was running; the child was killed.
    Cancelled,
}

impl HookOutcome {
    const fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "success",
            Self::Failed { .. } => "failure",
            Self::SpawnFailed => "spawn_error",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Configured hook command.
#[derive(Debug, Clone)]
pub struct LibraryHook {
    command: PathBuf,
    metrics: Metrics,
}

impl LibraryHook {
    /// Hook running `command` with no arguments.
    #[must_use]
    pub fn new(command: PathBuf, metrics: Metrics) -> Self {
        Self { command, metrics }
    }

    /// Command path.
    #[must_use]
    pub fn command(&self) -> &Path {
        &self.command
    }

    /// Run the command to completion, logging its exit status and output.
    pub async fn run(&self, cancel: &CancellationToken) -> HookOutcome {
        let mut command = Command::new(&self.command);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let outcome = tokio::select! {
            () = cancel.cancelled() => HookOutcome::Cancelled,
            output = command.output() => match output {
                Ok(output) => {
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    if output.status.success() {
                        info!(
                            command = %self.command.display(),
                            stdout = %stdout.trim(),
                            "library update hook finished"
                        );
                        HookOutcome::Succeeded
                    } else {
                        warn!(
                            command = %self.command.display(),
                            code = ?output.status.code(),
                            stdout = %stdout.trim(),
                            stderr = %stderr.trim(),
                            "library update hook failed"
                        );
                        HookOutcome::Failed {
                            code: output.status.code(),
                        }
                    }
                }
                Err(error) => {
                    warn!(
                        command = %self.command.display(),
                        error = %error,
                        "library update hook could not be started"
                    );
                    HookOutcome::SpawnFailed
                }
            },
        };
        self.metrics.inc_hook_invocation(outcome.label());
        outcome
    }
}
