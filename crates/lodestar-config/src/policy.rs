//! Tree-building policy: naming flags, file filters, and directory rules.

use lodestar_core::{PlayableExtensions, TorrentRecord};
use regex::Regex;

use crate::defaults::{ALL_DIRECTORY, PLAYABLE_EXTENSIONS};

/// Everything the tree builder needs to know about the user's preferences.
#[derive(Debug, Clone)]
pub struct TreePolicy {
    /// Extensions shown in the tree.
    pub playable: PlayableExtensions,
    /// Hide `.rar` files regardless of the playable set.
    pub delete_rar_files: bool,
    /// Keep the extension when a single-file torrent names its folder.
    pub retain_folder_name_extension: bool,
    /// Use the remote name verbatim instead of the normalised form.
    pub retain_original_name: bool,
    /// Keep the first-seen folder name across remote renames.
    pub ignore_renames: bool,
    /// Directory groups in evaluation order.
    pub groups: Vec<DirectoryGroup>,
}

impl Default for TreePolicy {
    fn default() -> Self {
        Self {
            playable: PlayableExtensions::new(PLAYABLE_EXTENSIONS),
            delete_rar_files: false,
            retain_folder_name_extension: false,
            retain_original_name: false,
            ignore_renames: false,
            groups: vec![DirectoryGroup::catch_all()],
        }
    }
}

impl TreePolicy {
    /// Whether a file at `path` should appear in the tree.
    ///
    /// `.rar` exclusion is applied independently of the playable set.
    #[must_use]
    pub fn shows_file(&self, path: &str) -> bool {
        if self.delete_rar_files && lodestar_core::media::is_rar(path) {
            return false;
        }
        self.playable.is_playable(path) || lodestar_core::media::is_rar(path)
    }

    /// Top-level directory names a torrent is placed under, one per matching group.
    #[must_use]
    pub fn directories_for<'a>(&'a self, name: &str, record: &TorrentRecord) -> Vec<&'a str> {
        self.groups
            .iter()
            .filter_map(|group| group.first_match(name, record))
            .map(|rule| rule.name.as_str())
            .collect()
    }
}

/// Directories competing for the same torrents; the first match wins.
#[derive(Debug, Clone)]
pub struct DirectoryGroup {
    /// Group name.
    pub name: String,
    /// Rules ordered by `group_order`, then directory name.
    pub rules: Vec<DirectoryRule>,
}

impl DirectoryGroup {
    /// Single group holding the catch-all directory.
    #[must_use]
    pub fn catch_all() -> Self {
        Self {
            name: ALL_DIRECTORY.to_string(),
            rules: vec![DirectoryRule {
                name: ALL_DIRECTORY.to_string(),
                group_order: 0,
                filters: Vec::new(),
            }],
        }
    }

    /// First rule in the group whose filters all match.
    #[must_use]
    pub fn first_match(&self, name: &str, record: &TorrentRecord) -> Option<&DirectoryRule> {
        self.rules.iter().find(|rule| rule.matches(name, record))
    }
}

/// A named top-level directory and the filters a torrent must pass to appear in it.
#[derive(Debug, Clone)]
pub struct DirectoryRule {
    /// Directory name as shown at the tree root.
    pub name: String,
    /// Priority within the group.
    pub group_order: i64,
    /// Filters combined with AND; empty matches everything.
    pub filters: Vec<TorrentFilter>,
}

impl DirectoryRule {
    /// Whether every filter accepts the torrent.
    #[must_use]
    pub fn matches(&self, name: &str, record: &TorrentRecord) -> bool {
        self.filters.iter().all(|filter| filter.matches(name, record))
    }
}

/// Compiled filter; text comparisons are stored lowercase.
#[derive(Debug, Clone)]
pub enum TorrentFilter {
    /// Name contains the text.
    Contains(String),
    /// Name does not contain the text.
    NotContains(String),
    /// Name matches the pattern.
    Regex(Regex),
    /// Name does not match the pattern.
    NotRegex(Regex),
    /// Torrent size is at least this many bytes.
    MinSizeBytes(u64),
    /// Torrent size is at most this many bytes.
    MaxSizeBytes(u64),
    /// Some file path contains the text.
    AnyFileContains(String),
}

impl TorrentFilter {
    /// Evaluate the filter against a torrent shown under `name`.
    #[must_use]
    pub fn matches(&self, name: &str, record: &TorrentRecord) -> bool {
        match self {
            Self::Contains(text) => name.to_lowercase().contains(text),
            Self::NotContains(text) => !name.to_lowercase().contains(text),
            Self::Regex(pattern) => pattern.is_match(name),
            Self::NotRegex(pattern) => !pattern.is_match(name),
            Self::MinSizeBytes(min) => record.bytes >= *min,
            Self::MaxSizeBytes(max) => record.bytes <= *max,
            Self::AnyFileContains(text) => record
                .files
                .iter()
                .any(|file| file.path.to_lowercase().contains(text)),
        }
    }
}
