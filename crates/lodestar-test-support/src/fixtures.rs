//! Record builders with deterministic identifiers, hashes, and timestamps.

use chrono::{DateTime, TimeZone, Utc};
use lodestar_core::{FileRecord, TorrentDetail, TorrentRecord, TorrentStatus, TorrentSummary};

/// Fixed instant used for every fixture timestamp.
#[must_use]
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Info hash assigned to the fixture torrent with `id`.
#[must_use]
pub fn hash_for(id: &str) -> String {
    format!("hash-{}", id.to_lowercase())
}

/// Restricted link assigned to file `file_id` of torrent `id`.
#[must_use]
pub fn link_for(id: &str, file_id: u32) -> String {
    format!("https://real-debrid.com/d/{id}{file_id}")
}

/// A file entry.
#[must_use]
pub fn file(id: u32, path: &str, bytes: u64, selected: bool) -> FileRecord {
    FileRecord {
        id,
        path: path.to_string(),
        bytes,
        selected,
        link: None,
    }
}

/// A detail payload; size is the sum of selected files and one link exists per selected file.
#[must_use]
pub fn detail(
    id: &str,
    name: &str,
    status: TorrentStatus,
    files: Vec<FileRecord>,
) -> TorrentDetail {
    let bytes = files
        .iter()
        .filter(|file| file.selected)
        .map(|file| file.bytes)
        .sum();
    let links = files
        .iter()
        .filter(|file| file.selected)
        .map(|file| link_for(id, file.id))
        .collect();
    TorrentDetail {
        id: id.to_string(),
        filename: name.to_string(),
        original_filename: name.to_string(),
        hash: hash_for(id),
        bytes,
        original_bytes: files.iter().map(|file| file.bytes).sum(),
        progress: if status.is_done() { 100.0 } else { 0.0 },
        status,
        added: fixed_time(),
        ended: status.is_done().then(fixed_time),
        files,
        links,
    }
}

/// The listing entry the remote reports for `detail` (without the file list).
#[must_use]
pub fn summary_of(detail: &TorrentDetail) -> TorrentSummary {
    TorrentSummary {
        id: detail.id.clone(),
        filename: detail.filename.clone(),
        hash: detail.hash.clone(),
        bytes: detail.bytes,
        progress: detail.progress,
        status: detail.status,
        added: detail.added,
        ended: detail.ended,
        files: Vec::new(),
        links: detail.links.clone(),
    }
}

/// A cached record built from [`detail`].
#[must_use]
pub fn record(
    id: &str,
    name: &str,
    status: TorrentStatus,
    files: Vec<FileRecord>,
) -> TorrentRecord {
    TorrentRecord::from_detail(&detail(id, name, status, files), fixed_time())
}

/// A finished single-file movie torrent.
#[must_use]
pub fn movie(id: &str, name: &str) -> TorrentDetail {
    detail(
        id,
        name,
        TorrentStatus::Downloaded,
        vec![file(1, &format!("/{name}.mkv"), 1_000, true)],
    )
}
