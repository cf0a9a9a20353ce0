use lodestar_config::TreePolicy;
use lodestar_core::TorrentRecord;
use lodestar_core::media::{extension_of, is_rar};

const RESERVED: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Folder name a torrent is exposed under.
///
/// Falls back to the torrent identifier when the name is empty after cleanup.
#[must_use]
pub fn folder_name(record: &TorrentRecord, policy: &TreePolicy) -> String {
    let base = if policy.ignore_renames {
        record.pinned_name.as_str()
    } else {
        record.filename.as_str()
    };

    let mut name = if policy.retain_original_name {
        base.replace('/', "_")
    } else {
        normalize_name(base)
    };

    if !policy.retain_folder_name_extension {
        name = strip_media_extension(&name, policy);
    }

    if name.is_empty() {
        record.id.clone()
    } else {
        name
    }
}

/// Replace characters filesystems reject, collapse whitespace, and trim trailing dots.
#[must_use]
pub fn normalize_name(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|ch| {
            if ch.is_control() || RESERVED.contains(&ch) {
                ' '
            } else {
                ch
            }
        })
        .collect();
    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches(['.', ' ']).to_string()
}

fn strip_media_extension(name: &str, policy: &TreePolicy) -> String {
    match extension_of(name) {
        Some(extension) if policy.playable.contains(&extension) || is_rar(name) => name
            [..name.len() - extension.len()]
            .trim_end()
            .to_string(),
        _ => name.to_string(),
    }
}
