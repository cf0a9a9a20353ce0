//! Subscriber installation for the `lodestar` binary.
//!
//! `RUST_LOG` wins over the configured level. A configured level that does not
//! parse as a filter directive falls back to [`DEFAULT_LOG_LEVEL`] instead of
//! silencing output.

use once_cell::sync::OnceCell;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Result, TelemetryError};

/// Level used when neither `RUST_LOG` nor the configuration yields a usable filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";

static BUILD: OnceCell<String> = OnceCell::new();

/// Settings consumed by [`init_logging`].
#[derive(Debug, Clone, Copy)]
pub struct LoggingConfig<'a> {
    /// Filter directive from `log_level`, such as `debug` or `lodestar_sync=trace`.
    pub level: &'a str,
    /// Line format.
    pub format: LogFormat,
    /// Build identifier attached to the command span.
    pub build_sha: &'a str,
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, fields flattened to the top level.
    Json,
    /// Compact human-readable lines.
    Pretty,
}

impl LogFormat {
    /// Pretty in debug builds, JSON in release builds.
    #[must_use]
    pub const fn infer() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }

    /// Map the `log_format` setting; unknown or missing values use [`LogFormat::infer`].
    #[must_use]
    pub fn from_setting(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(name) if name.eq_ignore_ascii_case("json") => Self::Json,
            Some(name) if name.eq_ignore_ascii_case("pretty") => Self::Pretty,
            _ => Self::infer(),
        }
    }

    fn layer<S>(self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'span> LookupSpan<'span> + 'static,
    {
        match self {
            Self::Json => fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .with_target(false)
                .boxed(),
            Self::Pretty => fmt::layer().compact().with_target(false).boxed(),
        }
    }
}

/// Record the build identifier and install the global subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::SubscriberInstall`] when a global subscriber is
/// already set.
pub fn init_logging(config: &LoggingConfig<'_>) -> Result<()> {
    if BUILD.set(config.build_sha.to_owned()).is_err() {
        tracing::debug!("build identifier already recorded");
    }
    tracing_subscriber::registry()
        .with(env_filter(config.level))
        .with(config.format.layer())
        .try_init()
        .map_err(|source| TelemetryError::SubscriberInstall { source })
}

/// Build identifier recorded by [`init_logging`], or `dev` before it runs.
#[must_use]
pub fn build_sha() -> &'static str {
    BUILD.get().map_or("dev", String::as_str)
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_are_case_insensitive() {
        assert_eq!(LogFormat::from_setting(Some("JSON")), LogFormat::Json);
        assert_eq!(LogFormat::from_setting(Some(" pretty ")), LogFormat::Pretty);
        assert_eq!(LogFormat::from_setting(None), LogFormat::infer());
        assert_eq!(LogFormat::from_setting(Some("xml")), LogFormat::infer());
    }

    #[test]
    fn unparsable_level_falls_back_to_default() {
        let filter = env_filter("lodestar_sync=verbose");
        let fallback = EnvFilter::new(DEFAULT_LOG_LEVEL);
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(filter.to_string(), fallback.to_string());
        }
    }

    #[test]
    fn only_the_first_install_succeeds() {
        let config = LoggingConfig {
            level: "debug",
            format: LogFormat::Json,
            build_sha: "abc123",
        };
        let _first = init_logging(&config);
        let second = init_logging(&config);
        assert!(matches!(second, Err(TelemetryError::SubscriberInstall { .. })));
        assert_eq!(build_sha(), "abc123");
    }
}
