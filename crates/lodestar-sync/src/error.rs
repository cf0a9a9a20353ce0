//! Error taxonomy for the synchronisation core.

use lodestar_core::RemoteError;
use thiserror::Error;

/// Primary error type for sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The shared cancellation token fired.
    #[error("operation cancelled")]
    Cancelled {
        /// Operation identifier.
        operation: &'static str,
    },
    /// A remote call failed after exhausting its retry budget.
    #[error("remote call failed")]
    Remote {
        /// Operation identifier.
        operation: &'static str,
        /// Final remote failure.
        source: RemoteError,
    },
    /// A listing page could not be fetched; the cycle was aborted without mutation.
    #[error("torrent listing failed")]
    ListingFailed {
        /// Offset of the failing page.
        offset: usize,
        /// Final remote failure.
        source: RemoteError,
    },
    /// No cached torrent has this identifier.
    #[error("torrent not found")]
    TorrentNotFound {
        /// Requested torrent identifier.
        torrent_id: String,
    },
    /// The torrent has no file at this path.
    #[error("file not found")]
    FileNotFound {
        /// Owning torrent identifier.
        torrent_id: String,
        /// Requested path.
        path: String,
    },
    /// The file exists but the remote has not published a link for it.
    #[error("file link unavailable")]
    LinkUnavailable {
        /// Owning torrent identifier.
        torrent_id: String,
        /// Requested path.
        path: String,
    },
}

impl SyncError {
    /// Whether the failure is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// One-line description including the remote status, for logs and `last_error`.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Remote { operation, source } => match source {
                RemoteError::Permanent {
                    status, message, ..
                } => format!("{operation}: status {status} ({message})"),
                other => format!("{operation}: {other}"),
            },
            Self::ListingFailed { offset, source } => {
                format!("listing at offset {offset}: {source}")
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_includes_remote_status() {
        let err = SyncError::Remote {
            operation: "torrent_detail",
            source: RemoteError::from_status("torrent_detail", 503, "hoster_unavailable"),
        };
        assert_eq!(
            err.describe(),
            "torrent_detail: status 503 (hoster_unavailable)"
        );
        assert_eq!(
            SyncError::TorrentNotFound {
                torrent_id: "A".to_string()
            }
            .describe(),
            "torrent not found"
        );
    }
}

/// Convenience alias for sync results.
pub type SyncResult<T> = Result<T, SyncError>;
