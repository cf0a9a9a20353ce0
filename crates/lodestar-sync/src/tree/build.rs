use std::collections::btree_map::Entry;

use lodestar_config::TreePolicy;
use lodestar_core::TorrentRecord;
use lodestar_core::media::file_name;

use super::naming::folder_name;
use super::{TreeDirectory, TreeFile, VirtualTree};
use crate::store::StoreSnapshot;

/// Derive the tree for `snapshot` under `policy`.
///
/// Pure and deterministic: records are visited in identifier order, so when two torrents
/// share a folder name and a file name the smaller identifier keeps the slot.
#[must_use]
pub fn build_tree(snapshot: &StoreSnapshot, policy: &TreePolicy) -> VirtualTree {
    let mut root = TreeDirectory::default();
    for rule in policy.groups.iter().flat_map(|group| &group.rules) {
        root.directories.entry(rule.name.clone()).or_default();
    }

    for record in snapshot.records.values() {
        if !record.is_complete() {
            continue;
        }
        let files = visible_files(record, policy);
        if files.is_empty() {
            continue;
        }
        let folder = folder_name(record, policy);
        for directory in policy.directories_for(&folder, record) {
            let target = root
                .directories
                .entry(directory.to_string())
                .or_default()
                .directories
                .entry(folder.clone())
                .or_default();
            for (name, file) in &files {
                if let Entry::Vacant(slot) = target.files.entry(name.clone()) {
                    slot.insert(file.clone());
                }
            }
        }
    }

    VirtualTree {
        generation: snapshot.generation,
        root,
    }
}

fn visible_files(record: &TorrentRecord, policy: &TreePolicy) -> Vec<(String, TreeFile)> {
    let mut files: Vec<(String, TreeFile)> = Vec::new();
    for file in record.selected_files() {
        if !policy.shows_file(&file.path) {
            continue;
        }
        let name = file_name(&file.path);
        if name.is_empty() || files.iter().any(|(existing, _)| existing == name) {
            continue;
        }
        files.push((
            name.to_string(),
            TreeFile {
                torrent_id: record.id.clone(),
                path: file.path.clone(),
                bytes: file.bytes,
                link: file.link.clone(),
            },
        ));
    }
    files
}
