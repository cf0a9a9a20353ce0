//! Error taxonomy for calls against the remote debrid service.

use std::error::Error;

use thiserror::Error;

/// HTTP status the remote uses to signal quota exhaustion.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Primary error type returned by [`crate::RemoteClient`] implementations.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Network-level failure (timeout, reset, refused) worth retrying.
    #[error("remote call failed transiently")]
    Transient {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying transport failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The remote answered HTTP 429.
    #[error("remote rate limit exhausted")]
    RateLimited {
        /// Operation identifier.
        operation: &'static str,
    },
    /// The remote answered with a non-success status other than 429.
    #[error("remote rejected the request")]
    Permanent {
        /// Operation identifier.
        operation: &'static str,
        /// HTTP status code returned by the remote.
        status: u16,
        /// Response body or error code reported by the remote.
        message: String,
    },
    /// The response body could not be decoded.
    #[error("remote payload could not be decoded")]
    Decode {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying decoding failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The client does not implement this operation.
    #[error("remote operation not supported")]
    Unsupported {
        /// Operation identifier.
        operation: &'static str,
    },
}

impl RemoteError {
    /// Classify a non-success HTTP status.
    #[must_use]
    pub fn from_status(operation: &'static str, status: u16, message: impl Into<String>) -> Self {
        if status == STATUS_TOO_MANY_REQUESTS {
            Self::RateLimited { operation }
        } else {
            Self::Permanent {
                operation,
                status,
                message: message.into(),
            }
        }
    }

    /// Wrap a transport failure as transient.
    #[must_use]
    pub fn transient(
        operation: &'static str,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self::Transient {
            operation,
            source: source.into(),
        }
    }

    /// Whether the failure may succeed on a plain retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Whether the remote signalled quota exhaustion.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Operation label carried by every variant.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Transient { operation, .. }
            | Self::RateLimited { operation }
            | Self::Permanent { operation, .. }
            | Self::Decode { operation, .. }
            | Self::Unsupported { operation } => operation,
        }
    }
}

/// Convenience alias for remote call results.
pub type RemoteResult<T> = Result<T, RemoteError>;
