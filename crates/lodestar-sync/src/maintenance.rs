//! One-shot bulk cleanup commands.

use lodestar_core::ListPage;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::SyncResult;
use crate::rate_limit::ApiCategory;
use crate::remote::RemoteCaller;

/// Result of a bulk delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearReport {
    /// Items deleted.
    pub deleted: usize,
    /// Items whose delete failed; they remain on the remote.
    pub failed: usize,
}

/// Delete every torrent on the account.
///
/// Deleting shifts the listing, so the first page is re-read until only failed items remain.
///
/// # Errors
///
/// Returns the listing failure or [`crate::SyncError::Cancelled`].
pub async fn clear_torrents(
    caller: &RemoteCaller,
    page_size: usize,
    cancel: &CancellationToken,
) -> SyncResult<ClearReport> {
    let mut report = ClearReport::default();
    loop {
        let page = ListPage {
            offset: report.failed,
            limit: page_size,
        };
        let batch = caller
            .call(ApiCategory::Torrents, "list_torrents", cancel, |client| async move {
                client.list_torrents(page).await
            })
            .await?;
        if batch.is_empty() {
            break;
        }
        for torrent in batch {
            let id = torrent.id.as_str();
            let deleted = caller
                .call(ApiCategory::General, "delete_torrent", cancel, |client| {
                    let id = id.to_string();
                    async move { client.delete_torrent(&id).await }
                })
                .await;
            match deleted {
                Ok(()) => report.deleted += 1,
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    warn!(torrent_id = %id, error = %err.describe(), "torrent delete failed");
                    report.failed += 1;
                }
            }
        }
    }
    info!(
        deleted = report.deleted,
        failed = report.failed,
        "torrents cleared"
    );
    Ok(report)
}

/// Delete every entry in the account's download history.
///
/// # Errors
///
/// Returns the listing failure or [`crate::SyncError::Cancelled`].
pub async fn clear_downloads(
    caller: &RemoteCaller,
    page_size: usize,
    cancel: &CancellationToken,
) -> SyncResult<ClearReport> {
    let mut report = ClearReport::default();
    loop {
        let page = ListPage {
            offset: report.failed,
            limit: page_size,
        };
        let batch = caller
            .call(ApiCategory::General, "list_downloads", cancel, |client| async move {
                client.list_downloads(page).await
            })
            .await?;
        if batch.is_empty() {
            break;
        }
        for download in batch {
            let id = download.id.as_str();
            let deleted = caller
                .call(ApiCategory::General, "delete_download", cancel, |client| {
                    let id = id.to_string();
                    async move { client.delete_download(&id).await }
                })
                .await;
            match deleted {
                Ok(()) => report.deleted += 1,
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    warn!(download_id = %id, error = %err.describe(), "download delete failed");
                    report.failed += 1;
                }
            }
        }
    }
    info!(
        deleted = report.deleted,
        failed = report.failed,
        "downloads cleared"
    );
    Ok(report)
}
