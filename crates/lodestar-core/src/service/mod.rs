//! Remote client contract implemented by debrid adapters.

use async_trait::async_trait;

use crate::error::{RemoteError, RemoteResult};
use crate::model::{
    AddedTorrent, DirectLink, Download, ListPage, TorrentDetail, TorrentSummary, UserAccount,
};

/// Typed operations the sync core issues against the debrid service.
///
/// Implementations perform exactly one HTTP exchange per call and never retry;
/// rate limiting and retries are layered on top by the caller.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Fetch one page of the torrent listing.
    async fn list_torrents(&self, page: ListPage) -> RemoteResult<Vec<TorrentSummary>>;

    /// Fetch the full detail (file list and links) of one torrent.
    async fn torrent_detail(&self, id: &str) -> RemoteResult<TorrentDetail>;

    /// Select the given file identifiers for download.
    async fn select_files(&self, id: &str, file_ids: &[u32]) -> RemoteResult<()>;

    /// Delete a torrent remotely.
    async fn delete_torrent(&self, id: &str) -> RemoteResult<()>;

    /// Re-add a torrent from its info hash.
    async fn add_by_hash(&self, hash: &str) -> RemoteResult<AddedTorrent>;

    /// Turn a restricted hoster link into a direct download link.
    async fn unrestrict_link(&self, link: &str) -> RemoteResult<DirectLink>;

    /// Fetch one page of the download history; default implementation reports lack of support.
    async fn list_downloads(&self, page: ListPage) -> RemoteResult<Vec<Download>> {
        let _ = page;
        Err(RemoteError::Unsupported {
            operation: "list_downloads",
        })
    }

    /// Delete one entry of the download history; default implementation reports lack of support.
    async fn delete_download(&self, id: &str) -> RemoteResult<()> {
        let _ = id;
        Err(RemoteError::Unsupported {
            operation: "delete_download",
        })
    }

    /// Fetch account information; default implementation reports lack of support.
    async fn user(&self) -> RemoteResult<UserAccount> {
        Err(RemoteError::Unsupported { operation: "user" })
    }
}
