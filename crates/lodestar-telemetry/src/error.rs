//! Failures raised while wiring logging or the metrics registry.

use thiserror::Error;

/// Result alias for telemetry helpers.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors from subscriber installation and metric export.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error("tracing subscriber already installed")]
    SubscriberInstall {
        /// Installation failure.
        source: tracing_subscriber::util::TryInitError,
    },
    /// A sync metric could not be created or added to the registry.
    #[error("metric setup failed")]
    MetricSetup {
        /// Metric family name.
        metric: &'static str,
        /// `build` or `register`.
        stage: &'static str,
        /// Prometheus failure.
        source: prometheus::Error,
    },
    /// The text exposition could not be produced.
    #[error("metric export failed")]
    MetricsEncode {
        /// Prometheus failure.
        source: prometheus::Error,
    },
    /// The text exposition was not UTF-8.
    #[error("metric export produced invalid utf-8")]
    MetricsUtf8 {
        /// Conversion failure.
        source: std::string::FromUtf8Error,
    },
}

impl TelemetryError {
    /// Metric family involved in a setup failure.
    #[must_use]
    pub const fn metric(&self) -> Option<&'static str> {
        match self {
            Self::MetricSetup { metric, .. } => Some(metric),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn duplicate_registration_names_the_metric() {
        let err = TelemetryError::MetricSetup {
            metric: "refresh_cycles_total",
            stage: "register",
            source: prometheus::Error::AlreadyReg,
        };
        assert_eq!(err.to_string(), "metric setup failed");
        assert_eq!(err.metric(), Some("refresh_cycles_total"));
        assert!(err.source().is_some());
    }
}
