//! Failures surfaced while reading and checking `lodestar.yml`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why a configuration could not be turned into an [`AppConfig`](crate::AppConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A key decoded but its value is unusable.
    #[error("configuration value rejected")]
    InvalidField {
        /// `root` or the directory name the key belongs to.
        section: String,
        /// YAML key.
        field: String,
        /// Rejected value, omitted for secrets and absent keys.
        value: Option<String>,
        /// Short reason such as `required` or `invalid regex`.
        reason: &'static str,
    },
    /// The document is not valid YAML for the expected shape.
    #[error("configuration yaml malformed")]
    Parse {
        /// Source file; `None` for in-memory documents.
        path: Option<PathBuf>,
        /// Decoder failure.
        source: serde_yaml::Error,
    },
    /// The file could not be read.
    #[error("configuration file unreadable")]
    Io {
        /// Step that failed.
        operation: &'static str,
        /// File path.
        path: PathBuf,
        /// Underlying failure.
        source: io::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(
        section: impl Into<String>,
        field: impl Into<String>,
        value: Option<String>,
        reason: &'static str,
    ) -> Self {
        Self::InvalidField {
            section: section.into(),
            field: field.into(),
            value,
            reason,
        }
    }
}

/// Result of loading or validating configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;
