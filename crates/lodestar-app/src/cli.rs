//! Command-line surface of the `lodestar` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lodestar_config::defaults::CONFIG_ENV_VAR;

/// Parsed command line.
#[derive(Debug, Parser)]
#[command(name = "lodestar", version, about = "Mirror a Real-Debrid library into a virtual tree")]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, global = true, env = CONFIG_ENV_VAR)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    /// Selected command; `serve` when none was given.
    #[must_use]
    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }
}

/// Top-level commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the refresh, repair, and account jobs until interrupted.
    Serve,
    /// Print the version and build identifier.
    Version,
    /// Delete every torrent on the account.
    ClearTorrents,
    /// Delete the account's download history.
    ClearDownloads,
}

impl Command {
    /// Label used for the application span and logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Serve => "serve",
            Self::Version => "version",
            Self::ClearTorrents => "clear-torrents",
            Self::ClearDownloads => "clear-downloads",
        }
    }
}
