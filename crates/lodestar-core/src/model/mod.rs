//! Torrent records cached by the sync core and the remote DTOs they are built from.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::media;

/// Lifecycle status reported by the debrid service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentStatus {
    /// Waiting for the user to pick which files to download.
    WaitingFilesSelection,
    /// Accepted but not started.
    Queued,
    /// Transfer in progress on the remote side.
    Downloading,
    /// Transfer finished; links are available.
    Downloaded,
    /// Finished and seeding; links are available.
    Seeding,
    /// Remote reported a generic failure.
    Error,
    /// Magnet could not be resolved.
    MagnetError,
    /// Content was flagged as malicious.
    Virus,
    /// No peers left to complete the transfer.
    Dead,
    /// Any status this build does not know about.
    #[serde(other)]
    Unknown,
}

impl TorrentStatus {
    /// Whether the status implies the payload is fully available.
    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Downloaded | Self::Seeding)
    }

    /// Whether the status is a terminal failure the repair job should act on.
    #[must_use]
    pub const fn is_failed(self) -> bool {
        matches!(
            self,
            Self::Error | Self::MagnetError | Self::Virus | Self::Dead
        )
    }

    /// Snake-case label used in logs and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WaitingFilesSelection => "waiting_files_selection",
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Seeding => "seeding",
            Self::Error => "error",
            Self::MagnetError => "magnet_error",
            Self::Virus => "virus",
            Self::Dead => "dead",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for TorrentStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Individual file inside a remote torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Remote file identifier used for selection calls.
    pub id: u32,
    /// Path as reported by the remote (usually `/`-prefixed).
    pub path: String,
    /// File size in bytes.
    pub bytes: u64,
    /// Whether the file was selected for download.
    #[serde(with = "codec::flag")]
    pub selected: bool,
    /// Restricted hoster link for selected files, when the remote provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl FileRecord {
    /// Last path segment.
    #[must_use]
    pub fn name(&self) -> &str {
        media::file_name(&self.path)
    }
}

/// Attach restricted links to selected files; the remote lists one link per selected file.
fn assign_links(files: &[FileRecord], links: &[String]) -> Vec<FileRecord> {
    let mut links = links.iter();
    files
        .iter()
        .map(|file| {
            let mut file = file.clone();
            if file.selected && file.link.is_none() {
                file.link = links.next().cloned();
            }
            file
        })
        .collect()
}

/// Entry of the paginated torrent listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentSummary {
    /// Remote identifier.
    pub id: String,
    /// Display name reported by the remote.
    pub filename: String,
    /// Info hash; stable across re-adds.
    pub hash: String,
    /// Total selected size in bytes.
    pub bytes: u64,
    /// Completion percentage (0-100).
    pub progress: f64,
    /// Remote lifecycle status.
    pub status: TorrentStatus,
    /// When the torrent was added.
    #[serde(with = "codec::timestamp")]
    pub added: DateTime<Utc>,
    /// When the transfer ended, if it has.
    #[serde(default, with = "codec::optional_timestamp")]
    pub ended: Option<DateTime<Utc>>,
    /// File list, when the listing payload carries one.
    #[serde(default)]
    pub files: Vec<FileRecord>,
    /// Restricted links for the selected files.
    #[serde(default)]
    pub links: Vec<String>,
}

impl TorrentSummary {
    /// Whether the listing entry already carries the file list.
    #[must_use]
    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }

    /// Files with restricted links attached.
    #[must_use]
    pub fn files_with_links(&self) -> Vec<FileRecord> {
        assign_links(&self.files, &self.links)
    }
}

/// Full per-torrent payload including the file list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentDetail {
    /// Remote identifier.
    pub id: String,
    /// Display name reported by the remote.
    pub filename: String,
    /// Name of the torrent as originally added.
    #[serde(default)]
    pub original_filename: String,
    /// Info hash; stable across re-adds.
    pub hash: String,
    /// Total selected size in bytes.
    pub bytes: u64,
    /// Size of the complete torrent payload.
    #[serde(default)]
    pub original_bytes: u64,
    /// Completion percentage (0-100).
    pub progress: f64,
    /// Remote lifecycle status.
    pub status: TorrentStatus,
    /// When the torrent was added.
    #[serde(with = "codec::timestamp")]
    pub added: DateTime<Utc>,
    /// When the transfer ended, if it has.
    #[serde(default, with = "codec::optional_timestamp")]
    pub ended: Option<DateTime<Utc>>,
    /// Every file in the torrent.
    #[serde(default)]
    pub files: Vec<FileRecord>,
    /// Restricted links for the selected files.
    #[serde(default)]
    pub links: Vec<String>,
}

impl TorrentDetail {
    /// Files with restricted links attached.
    #[must_use]
    pub fn files_with_links(&self) -> Vec<FileRecord> {
        assign_links(&self.files, &self.links)
    }

    /// Whether the detail shows a finished torrent whose selected files all have content.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status.is_done()
            && self
                .files
                .iter()
                .filter(|file| file.selected)
                .all(|file| file.bytes > 0)
    }
}

/// Locally cached representation of one remote torrent.
///
/// Records are replaced by value; `pinned_name`, `failures`, `last_error`, and
/// `progress_changed_at` are local bookkeeping carried across replacements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentRecord {
    /// Remote identifier.
    pub id: String,
    /// Info hash; stable across re-adds.
    pub hash: String,
    /// Current display name reported by the remote.
    pub filename: String,
    /// Display name observed when the record was first created.
    pub pinned_name: String,
    /// Total selected size in bytes.
    pub bytes: u64,
    /// Remote lifecycle status.
    pub status: TorrentStatus,
    /// Completion percentage (0-100).
    pub progress: f64,
    /// When the torrent was added remotely.
    #[serde(with = "codec::timestamp")]
    pub added: DateTime<Utc>,
    /// When the transfer ended remotely.
    #[serde(default, with = "codec::optional_timestamp")]
    pub ended: Option<DateTime<Utc>>,
    /// Files in remote order.
    pub files: Vec<FileRecord>,
    /// Consecutive failed repair attempts.
    #[serde(default)]
    pub failures: u32,
    /// Message of the most recent repair failure.
    #[serde(default)]
    pub last_error: Option<String>,
    /// Last time the observed progress value changed.
    #[serde(with = "codec::timestamp")]
    pub progress_changed_at: DateTime<Utc>,
}

impl TorrentRecord {
    /// Build a fresh record from a listing entry and a resolved file list.
    #[must_use]
    pub fn from_summary(
        summary: &TorrentSummary,
        files: Vec<FileRecord>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: summary.id.clone(),
            hash: summary.hash.clone(),
            filename: summary.filename.clone(),
            pinned_name: summary.filename.clone(),
            bytes: summary.bytes,
            status: summary.status,
            progress: summary.progress,
            added: summary.added,
            ended: summary.ended,
            files,
            failures: 0,
            last_error: None,
            progress_changed_at: observed_at,
        }
    }

    /// Build a fresh record from a detail payload.
    #[must_use]
    pub fn from_detail(detail: &TorrentDetail, observed_at: DateTime<Utc>) -> Self {
        Self {
            id: detail.id.clone(),
            hash: detail.hash.clone(),
            filename: detail.filename.clone(),
            pinned_name: detail.filename.clone(),
            bytes: detail.bytes,
            status: detail.status,
            progress: detail.progress,
            added: detail.added,
            ended: detail.ended,
            files: detail.files_with_links(),
            failures: 0,
            last_error: None,
            progress_changed_at: observed_at,
        }
    }

    /// Copy local bookkeeping from the record this one replaces.
    ///
    /// The progress clock restarts when either progress or status moves, so a
    /// torrent that leaves the queue starts its stall window afresh.
    #[must_use]
    pub fn carry_local_state(mut self, prior: &Self) -> Self {
        self.pinned_name.clone_from(&prior.pinned_name);
        self.failures = prior.failures;
        self.last_error.clone_from(&prior.last_error);
        if self.status == prior.status && same_progress(self.progress, prior.progress) {
            self.progress_changed_at = prior.progress_changed_at;
        }
        self
    }

    /// Selected files in remote order.
    pub fn selected_files(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.iter().filter(|file| file.selected)
    }

    /// Whether any selected file reports zero bytes.
    #[must_use]
    pub fn has_zero_byte_selection(&self) -> bool {
        self.selected_files().any(|file| file.bytes == 0)
    }

    /// Finished status and every selected file has content.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status.is_done() && !self.has_zero_byte_selection()
    }

    /// Whether the cached file list cannot be trusted once `summary` is observed.
    ///
    /// Status transitions can change the file list and publish links, so they
    /// always refetch.
    #[must_use]
    pub fn needs_detail(&self, summary: &TorrentSummary) -> bool {
        self.files.is_empty()
            || self.status != summary.status
            || (summary.status.is_done() && self.has_zero_byte_selection())
    }

    /// Whether any attribute observed in the listing differs from this record.
    #[must_use]
    pub fn differs_from(&self, summary: &TorrentSummary) -> bool {
        self.status != summary.status
            || !same_progress(self.progress, summary.progress)
            || self.bytes != summary.bytes
            || self.filename != summary.filename
            || self.ended != summary.ended
            || (summary.has_files() && self.files != summary.files_with_links())
    }
}

fn same_progress(left: f64, right: f64) -> bool {
    (left - right).abs() < f64::EPSILON
}

/// Direct download link produced by unrestricting a hoster link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectLink {
    /// Remote identifier of the generated download.
    pub id: String,
    /// File name served by the link.
    pub filename: String,
    /// MIME type, when reported.
    #[serde(rename = "mimeType", default)]
    pub mime_type: Option<String>,
    /// Size in bytes.
    pub filesize: u64,
    /// Restricted link that was unrestricted.
    pub link: String,
    /// Hoster domain.
    pub host: String,
    /// Maximum parallel chunks allowed.
    #[serde(default)]
    pub chunks: u32,
    /// Direct URL to stream from.
    pub download: String,
}

/// Entry of the remote download history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Download {
    /// Remote identifier.
    pub id: String,
    /// File name.
    pub filename: String,
    /// MIME type, when reported.
    #[serde(rename = "mimeType", default)]
    pub mime_type: Option<String>,
    /// Size in bytes.
    pub filesize: u64,
    /// Original restricted link.
    pub link: String,
    /// Hoster domain.
    pub host: String,
    /// Direct URL.
    pub download: String,
    /// When the link was generated.
    #[serde(with = "codec::timestamp")]
    pub generated: DateTime<Utc>,
}

/// Account information used by the premium monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Numeric account identifier.
    pub id: u64,
    /// Account name.
    pub username: String,
    /// Account e-mail address.
    #[serde(default)]
    pub email: String,
    /// Fidelity points.
    #[serde(default)]
    pub points: i64,
    /// Account type (`premium` or `free`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Seconds of premium left.
    #[serde(default)]
    pub premium: i64,
    /// Premium expiry instant.
    #[serde(default, with = "codec::optional_timestamp")]
    pub expiration: Option<DateTime<Utc>>,
}

impl UserAccount {
    /// Premium time left at `now`; `None` when the account has no expiry date.
    #[must_use]
    pub fn premium_remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.expiration.map(|expiry| expiry - now)
    }
}

/// Response to adding a torrent by hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedTorrent {
    /// New remote identifier.
    pub id: String,
    /// Resource URI of the new torrent.
    #[serde(default)]
    pub uri: String,
}

/// Cursor for paginated listing calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListPage {
    /// Number of entries to skip.
    pub offset: usize,
    /// Maximum number of entries to return.
    pub limit: usize,
}

impl ListPage {
    /// First page of the given size.
    #[must_use]
    pub const fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }

    /// Page following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn file(id: u32, path: &str, bytes: u64, selected: bool) -> FileRecord {
        FileRecord {
            id,
            path: path.to_string(),
            bytes,
            selected,
            link: None,
        }
    }

    fn summary(status: TorrentStatus) -> TorrentSummary {
        TorrentSummary {
            id: "ABC".into(),
            filename: "Movie.2020.mkv".into(),
            hash: "deadbeef".into(),
            bytes: 10,
            progress: 100.0,
            status,
            added: Utc
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .expect("valid"),
            ended: None,
            files: Vec::new(),
            links: Vec::new(),
        }
    }

    #[test]
    fn status_classification() {
        assert!(TorrentStatus::Downloaded.is_done());
        assert!(TorrentStatus::Seeding.is_done());
        assert!(!TorrentStatus::Downloading.is_done());
        for failed in [
            TorrentStatus::Error,
            TorrentStatus::MagnetError,
            TorrentStatus::Virus,
            TorrentStatus::Dead,
        ] {
            assert!(failed.is_failed(), "{failed} should be failed");
        }
        assert!(!TorrentStatus::Queued.is_failed());
    }

    #[test]
    fn unknown_status_decodes() -> anyhow::Result<()> {
        let status: TorrentStatus = serde_json::from_str("\"compressing\"")?;
        assert_eq!(status, TorrentStatus::Unknown);
        let status: TorrentStatus = serde_json::from_str("\"magnet_error\"")?;
        assert_eq!(status, TorrentStatus::MagnetError);
        Ok(())
    }

    #[test]
    fn links_attach_to_selected_files_in_order() {
        let detail = TorrentDetail {
            id: "ABC".into(),
            filename: "Pack".into(),
            original_filename: "Pack".into(),
            hash: "deadbeef".into(),
            bytes: 30,
            original_bytes: 40,
            progress: 100.0,
            status: TorrentStatus::Downloaded,
            added: Utc::now(),
            ended: None,
            files: vec![
                file(1, "/Pack/a.mkv", 10, true),
                file(2, "/Pack/sample.mkv", 10, false),
                file(3, "/Pack/b.mkv", 20, true),
            ],
            links: vec!["https://host/a".into(), "https://host/b".into()],
        };
        let files = detail.files_with_links();
        assert_eq!(files[0].link.as_deref(), Some("https://host/a"));
        assert_eq!(files[1].link, None);
        assert_eq!(files[2].link.as_deref(), Some("https://host/b"));
        assert!(detail.is_complete());
    }

    #[test]
    fn zero_byte_selection_is_incomplete_despite_status() {
        let mut record = TorrentRecord::from_summary(
            &summary(TorrentStatus::Downloaded),
            vec![file(1, "/a.mkv", 0, true), file(2, "/b.mkv", 5, false)],
            Utc::now(),
        );
        let listed = summary(TorrentStatus::Downloaded);
        assert!(!record.is_complete());
        assert!(record.needs_detail(&listed));

        record.files[0].bytes = 7;
        assert!(record.is_complete());
        assert!(!record.needs_detail(&listed));
    }

    #[test]
    fn status_change_or_missing_files_need_detail() {
        let downloading = summary(TorrentStatus::Downloading);
        let record = TorrentRecord::from_summary(
            &downloading,
            vec![file(1, "/a.mkv", 0, true)],
            Utc::now(),
        );
        assert!(!record.needs_detail(&downloading));
        assert!(record.needs_detail(&summary(TorrentStatus::Downloaded)));

        let bare = TorrentRecord::from_summary(&downloading, Vec::new(), Utc::now());
        assert!(bare.needs_detail(&downloading));
    }

    #[test]
    fn carry_local_state_keeps_bookkeeping() {
        let first_seen = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .expect("valid");
        let mut prior = TorrentRecord::from_summary(
            &summary(TorrentStatus::Downloading),
            Vec::new(),
            first_seen,
        );
        prior.failures = 2;
        prior.last_error = Some("dead".into());

        let mut renamed = summary(TorrentStatus::Downloading);
        renamed.filename = "Renamed".into();
        let later = first_seen + chrono::Duration::hours(1);
        let replacement =
            TorrentRecord::from_summary(&renamed, Vec::new(), later).carry_local_state(&prior);

        assert_eq!(replacement.filename, "Renamed");
        assert_eq!(replacement.pinned_name, "Movie.2020.mkv");
        assert_eq!(replacement.failures, 2);
        assert_eq!(replacement.progress_changed_at, first_seen);

        let mut progressed = renamed.clone();
        progressed.progress = 50.0;
        let moved =
            TorrentRecord::from_summary(&progressed, Vec::new(), later).carry_local_state(&prior);
        assert_eq!(moved.progress_changed_at, later);
    }

    #[test]
    fn leaving_the_queue_restarts_the_progress_clock() {
        let queued_at = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .expect("valid");
        let mut waiting = summary(TorrentStatus::Queued);
        waiting.progress = 0.0;
        let queued = TorrentRecord::from_summary(&waiting, Vec::new(), queued_at);

        let mut started = waiting.clone();
        started.status = TorrentStatus::Downloading;
        let later = queued_at + chrono::Duration::minutes(90);
        let downloading =
            TorrentRecord::from_summary(&started, Vec::new(), later).carry_local_state(&queued);

        assert_eq!(downloading.progress_changed_at, later);
    }

    #[test]
    fn differs_from_detects_observed_changes() {
        let base = summary(TorrentStatus::Downloading);
        let record = TorrentRecord::from_summary(&base, Vec::new(), Utc::now());
        assert!(!record.differs_from(&base));

        let mut status = base.clone();
        status.status = TorrentStatus::Downloaded;
        assert!(record.differs_from(&status));

        let mut size = base.clone();
        size.bytes = 11;
        assert!(record.differs_from(&size));

        let mut files = base;
        files.files = vec![file(1, "/a.mkv", 10, true)];
        assert!(record.differs_from(&files));
    }

    #[test]
    fn list_page_advances_by_limit() {
        let page = ListPage::first(3);
        assert_eq!(
            page.next(),
            ListPage {
                offset: 3,
                limit: 3
            }
        );
        assert_eq!(page.next().next().offset, 6);
    }

    #[test]
    fn summary_decodes_remote_payload() -> anyhow::Result<()> {
        let payload = r#"{
            "id": "NZ5BSRMRE3HGQ",
            "filename": "Show.S01.1080p",
            "hash": "abc123",
            "bytes": 2048,
            "host": "real-debrid.com",
            "split": 2000,
            "progress": 100,
            "status": "downloaded",
            "added": "2024-03-01T10:00:00.000Z",
            "ended": "2024-03-01T10:05:00.000Z",
            "links": ["https://real-debrid.com/d/AAA"]
        }"#;
        let summary: TorrentSummary = serde_json::from_str(payload)?;
        assert_eq!(summary.status, TorrentStatus::Downloaded);
        assert!(!summary.has_files());
        assert!(summary.ended.is_some());
        Ok(())
    }
}
