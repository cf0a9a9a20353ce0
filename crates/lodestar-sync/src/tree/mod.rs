//! Read-only directory tree derived from a store snapshot.
//!
//! The root holds one directory per configured rule. Each of those holds one folder per
//! placed torrent, and each folder holds that torrent's visible files.

mod build;
mod naming;

use std::collections::BTreeMap;

pub use build::build_tree;
pub use naming::{folder_name, normalize_name};

/// A published tree, tagged with the store generation it was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualTree {
    /// Generation of the snapshot this tree reflects.
    pub generation: u64,
    /// Top-level directories keyed by rule name.
    pub root: TreeDirectory,
}

/// A directory node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDirectory {
    /// Child directories.
    pub directories: BTreeMap<String, TreeDirectory>,
    /// Child files.
    pub files: BTreeMap<String, TreeFile>,
}

/// A file leaf pointing back at the torrent file it exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeFile {
    /// Owning torrent.
    pub torrent_id: String,
    /// Path of the file inside the torrent.
    pub path: String,
    /// Size in bytes.
    pub bytes: u64,
    /// Restricted link, when the remote has published one.
    pub link: Option<String>,
}

/// Result of resolving a slash-separated path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeNode<'a> {
    /// A directory.
    Directory(&'a TreeDirectory),
    /// A file.
    File(&'a TreeFile),
}

impl VirtualTree {
    /// Names of the top-level directories.
    pub fn directory_names(&self) -> impl Iterator<Item = &str> {
        self.root.directories.keys().map(String::as_str)
    }

    /// Resolve a path such as `movies/Some Film/film.mkv`; empty segments are ignored.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<TreeNode<'_>> {
        let mut current = &self.root;
        let mut segments = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .peekable();
        while let Some(segment) = segments.next() {
            if let Some(directory) = current.directories.get(segment) {
                current = directory;
                continue;
            }
            return match (current.files.get(segment), segments.peek()) {
                (Some(file), None) => Some(TreeNode::File(file)),
                _ => None,
            };
        }
        Some(TreeNode::Directory(current))
    }

    /// Total number of file leaves.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.root.file_count()
    }
}

impl TreeDirectory {
    /// Files in this directory and all descendants.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.len()
            + self
                .directories
                .values()
                .map(TreeDirectory::file_count)
                .sum::<usize>()
    }

    /// Whether this directory has neither files nor subdirectories.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }
}
