//! Errors raised while constructing the HTTP client.

use thiserror::Error;

/// Failures building a [`crate::RealDebridClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The API token cannot be sent as a header value.
    #[error("api token contains invalid header characters")]
    InvalidToken,
    /// The base URL could not be parsed.
    #[error("invalid base url")]
    InvalidBaseUrl {
        /// Offending value.
        value: String,
        /// Parse failure.
        source: url::ParseError,
    },
    /// The configured proxy was rejected by the HTTP client.
    #[error("invalid proxy")]
    InvalidProxy {
        /// Offending proxy URL.
        value: String,
        /// Rejection from the HTTP client.
        source: reqwest::Error,
    },
    /// The underlying HTTP client could not be built.
    #[error("failed to build http client")]
    Build {
        /// Builder failure.
        source: reqwest::Error,
    },
}

/// Convenience alias for client construction results.
pub type ClientResult<T> = Result<T, ClientError>;
