//! In-memory [`RemoteClient`] with failure injection and call accounting.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use lodestar_core::{
    AddedTorrent, DirectLink, Download, ListPage, RemoteClient, RemoteError, RemoteResult,
    TorrentDetail, TorrentStatus, TorrentSummary, UserAccount,
};

use crate::fixtures::{fixed_time, summary_of};

/// Remote operations that can be counted or scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `list_torrents`
    ListTorrents,
    /// `torrent_detail`
    TorrentDetail,
    /// `select_files`
    SelectFiles,
    /// `delete_torrent`
    DeleteTorrent,
    /// `add_by_hash`
    AddByHash,
    /// `unrestrict_link`
    UnrestrictLink,
    /// `list_downloads`
    ListDownloads,
    /// `delete_download`
    DeleteDownload,
    /// `user`
    User,
}

impl Operation {
    const fn label(self) -> &'static str {
        match self {
            Self::ListTorrents => "list_torrents",
            Self::TorrentDetail => "torrent_detail",
            Self::SelectFiles => "select_files",
            Self::DeleteTorrent => "delete_torrent",
            Self::AddByHash => "add_by_hash",
            Self::UnrestrictLink => "unrestrict_link",
            Self::ListDownloads => "list_downloads",
            Self::DeleteDownload => "delete_download",
            Self::User => "user",
        }
    }
}

/// Failure injected into the next call of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Connection-level failure.
    Transient,
    /// HTTP 429.
    RateLimited,
    /// Any other HTTP status.
    Status(u16),
}

impl Failure {
    fn into_error(self, operation: Operation) -> RemoteError {
        let label = operation.label();
        match self {
            Self::Transient => RemoteError::transient(
                label,
                std::io::Error::new(std::io::ErrorKind::ConnectionReset, "scripted reset"),
            ),
            Self::RateLimited => RemoteError::RateLimited { operation: label },
            Self::Status(status) => RemoteError::from_status(label, status, "scripted failure"),
        }
    }
}

#[derive(Default)]
struct RemoteState {
    torrents: Vec<TorrentDetail>,
    removed: HashMap<String, TorrentDetail>,
    downloads: Vec<Download>,
    user: Option<UserAccount>,
    failures: HashMap<Operation, VecDeque<Failure>>,
    calls: HashMap<Operation, usize>,
    pages: Vec<ListPage>,
    selections: Vec<(String, Vec<u32>)>,
    deleted: Vec<String>,
    added: Vec<String>,
    next_id: u64,
    listing_includes_files: bool,
    readd_status: Option<TorrentStatus>,
    list_delay: Option<Duration>,
}

/// Scripted in-memory debrid service.
///
/// The listing is served in insertion order. Deleting a torrent remembers its payload so
/// a later `add_by_hash` recreates it under a fresh identifier.
#[derive(Default)]
pub struct ScriptedRemote {
    state: Mutex<RemoteState>,
}

impl ScriptedRemote {
    /// Empty remote.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remote pre-populated with torrents.
    #[must_use]
    pub fn with_torrents(torrents: impl IntoIterator<Item = TorrentDetail>) -> Self {
        let remote = Self::new();
        remote.lock().torrents.extend(torrents);
        remote
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a torrent.
    pub fn upsert(&self, detail: TorrentDetail) {
        let mut state = self.lock();
        if let Some(existing) = state.torrents.iter_mut().find(|t| t.id == detail.id) {
            *existing = detail;
        } else {
            state.torrents.push(detail);
        }
    }

    /// Mutate a torrent in place; returns `false` when the id is unknown.
    pub fn update(&self, id: &str, change: impl FnOnce(&mut TorrentDetail)) -> bool {
        let mut state = self.lock();
        state
            .torrents
            .iter_mut()
            .find(|t| t.id == id)
            .map(change)
            .is_some()
    }

    /// Drop a torrent without recording a delete call.
    pub fn remove(&self, id: &str) {
        self.lock().torrents.retain(|t| t.id != id);
    }

    /// Current torrents in listing order.
    #[must_use]
    pub fn torrents(&self) -> Vec<TorrentDetail> {
        self.lock().torrents.clone()
    }

    /// Whether listing pages carry file lists (the real service omits them).
    pub fn set_listing_includes_files(&self, include: bool) {
        self.lock().listing_includes_files = include;
    }

    /// Status given to torrents recreated by `add_by_hash`; defaults to the deleted status.
    pub fn set_readd_status(&self, status: TorrentStatus) {
        self.lock().readd_status = Some(status);
    }

    /// Delay every listing call by `delay` (uses the tokio clock).
    pub fn set_list_delay(&self, delay: Duration) {
        self.lock().list_delay = Some(delay);
    }

    /// Seed the download history.
    pub fn set_downloads(&self, downloads: Vec<Download>) {
        self.lock().downloads = downloads;
    }

    /// Seed the account payload.
    pub fn set_user(&self, user: UserAccount) {
        self.lock().user = Some(user);
    }

    /// Fail the next call of `operation` with `failure`.
    pub fn fail_next(&self, operation: Operation, failure: Failure) {
        self.fail_times(operation, failure, 1);
    }

    /// Fail the next `times` calls of `operation` with `failure`.
    pub fn fail_times(&self, operation: Operation, failure: Failure, times: usize) {
        let mut state = self.lock();
        let queue = state.failures.entry(operation).or_default();
        queue.extend(std::iter::repeat_n(failure, times));
    }

    /// Number of calls made to `operation`, including failed ones.
    #[must_use]
    pub fn calls(&self, operation: Operation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Pages requested so far, in order.
    #[must_use]
    pub fn pages(&self) -> Vec<ListPage> {
        self.lock().pages.clone()
    }

    /// Successful `select_files` calls.
    #[must_use]
    pub fn selections(&self) -> Vec<(String, Vec<u32>)> {
        self.lock().selections.clone()
    }

    /// Ids deleted through `delete_torrent` or `delete_download`.
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    /// Hashes re-added through `add_by_hash`.
    #[must_use]
    pub fn added(&self) -> Vec<String> {
        self.lock().added.clone()
    }

    /// Record the call and pop any scripted failure.
    fn enter(&self, operation: Operation) -> RemoteResult<MutexGuard<'_, RemoteState>> {
        let mut state = self.lock();
        *state.calls.entry(operation).or_default() += 1;
        if let Some(failure) = state
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            return Err(failure.into_error(operation));
        }
        Ok(state)
    }
}

#[async_trait]
impl RemoteClient for ScriptedRemote {
    async fn list_torrents(&self, page: ListPage) -> RemoteResult<Vec<TorrentSummary>> {
        let delay = self.lock().list_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.enter(Operation::ListTorrents)?;
        state.pages.push(page);
        let include_files = state.listing_includes_files;
        Ok(state
            .torrents
            .iter()
            .skip(page.offset)
            .take(page.limit)
            .map(|detail| {
                let mut summary = summary_of(detail);
                if include_files {
                    summary.files.clone_from(&detail.files);
                }
                summary
            })
            .collect())
    }

    async fn torrent_detail(&self, id: &str) -> RemoteResult<TorrentDetail> {
        let state = self.enter(Operation::TorrentDetail)?;
        state
            .torrents
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| RemoteError::from_status("torrent_detail", 404, "unknown_ressource"))
    }

    async fn select_files(&self, id: &str, file_ids: &[u32]) -> RemoteResult<()> {
        let mut state = self.enter(Operation::SelectFiles)?;
        let Some(torrent) = state.torrents.iter_mut().find(|t| t.id == id) else {
            return Err(RemoteError::from_status("select_files", 404, "unknown_ressource"));
        };
        for file in &mut torrent.files {
            file.selected = file_ids.contains(&file.id);
        }
        if torrent.status == TorrentStatus::WaitingFilesSelection {
            torrent.status = TorrentStatus::Queued;
        }
        state.selections.push((id.to_string(), file_ids.to_vec()));
        Ok(())
    }

    async fn delete_torrent(&self, id: &str) -> RemoteResult<()> {
        let mut state = self.enter(Operation::DeleteTorrent)?;
        let Some(index) = state.torrents.iter().position(|t| t.id == id) else {
            return Err(RemoteError::from_status("delete_torrent", 404, "unknown_ressource"));
        };
        let removed = state.torrents.remove(index);
        state.removed.insert(removed.hash.clone(), removed);
        state.deleted.push(id.to_string());
        Ok(())
    }

    async fn add_by_hash(&self, hash: &str) -> RemoteResult<AddedTorrent> {
        let mut state = self.enter(Operation::AddByHash)?;
        state.next_id += 1;
        let id = format!("NEW{}", state.next_id);
        let readd_status = state.readd_status;
        let mut detail = state.removed.remove(hash).unwrap_or_else(|| TorrentDetail {
            id: String::new(),
            filename: hash.to_string(),
            original_filename: hash.to_string(),
            hash: hash.to_string(),
            bytes: 0,
            original_bytes: 0,
            progress: 0.0,
            status: TorrentStatus::Queued,
            added: fixed_time(),
            ended: None,
            files: Vec::new(),
            links: Vec::new(),
        });
        detail.id.clone_from(&id);
        if let Some(status) = readd_status {
            detail.status = status;
        }
        state.torrents.push(detail);
        state.added.push(hash.to_string());
        Ok(AddedTorrent {
            uri: format!("https://api.real-debrid.com/rest/1.0/torrents/info/{id}"),
            id,
        })
    }

    async fn unrestrict_link(&self, link: &str) -> RemoteResult<DirectLink> {
        let state = self.enter(Operation::UnrestrictLink)?;
        let file = state
            .torrents
            .iter()
            .flat_map(TorrentDetail::files_with_links)
            .find(|file| file.link.as_deref() == Some(link))
            .ok_or_else(|| RemoteError::from_status("unrestrict_link", 503, "hoster_unavailable"))?;
        Ok(DirectLink {
            id: format!("DL{}", file.id),
            filename: file.name().to_string(),
            mime_type: None,
            filesize: file.bytes,
            link: link.to_string(),
            host: "real-debrid.com".to_string(),
            chunks: 32,
            download: format!("{link}/direct"),
        })
    }

    async fn list_downloads(&self, page: ListPage) -> RemoteResult<Vec<Download>> {
        let state = self.enter(Operation::ListDownloads)?;
        Ok(state
            .downloads
            .iter()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }

    async fn delete_download(&self, id: &str) -> RemoteResult<()> {
        let mut state = self.enter(Operation::DeleteDownload)?;
        state.downloads.retain(|download| download.id != id);
        state.deleted.push(id.to_string());
        Ok(())
    }

    async fn user(&self) -> RemoteResult<UserAccount> {
        let state = self.enter(Operation::User)?;
        state
            .user
            .clone()
            .ok_or_else(|| RemoteError::from_status("user", 401, "bad_token"))
    }
}
