//! File-extension helpers used to decide which files are playable.

use std::collections::BTreeSet;

/// Extension of archive parts that can be hidden from the tree.
pub const RAR_EXTENSION: &str = ".rar";

/// Normalised set of playable extensions (lowercase, leading dot).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlayableExtensions {
    extensions: BTreeSet<String>,
}

impl PlayableExtensions {
    /// Build a set from raw configuration values such as `mkv`, `.MP4`, or ` .avi `.
    ///
    /// Blank entries are ignored.
    pub fn new<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = raw
            .into_iter()
            .filter_map(|value| normalize_extension(value.as_ref()))
            .collect();
        Self { extensions }
    }

    /// Whether the path ends in one of the configured extensions.
    #[must_use]
    pub fn is_playable(&self, path: &str) -> bool {
        extension_of(path).is_some_and(|ext| self.extensions.contains(&ext))
    }

    /// Whether the extension (already normalised or not) is in the set.
    #[must_use]
    pub fn contains(&self, extension: &str) -> bool {
        normalize_extension(extension).is_some_and(|ext| self.extensions.contains(&ext))
    }

    /// Iterate the normalised extensions in lexicographic order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }

    /// Number of extensions in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

/// Lowercase extension of the last path segment, including the leading dot.
#[must_use]
pub fn extension_of(path: &str) -> Option<String> {
    let name = file_name(path);
    let dot = name.rfind('.')?;
    if dot == 0 || dot + 1 == name.len() {
        return None;
    }
    Some(name[dot..].to_ascii_lowercase())
}

/// Whether the path names a `.rar` archive part.
#[must_use]
pub fn is_rar(path: &str) -> bool {
    extension_of(path).is_some_and(|ext| ext == RAR_EXTENSION)
}

/// Last segment of a `/`-separated remote path.
#[must_use]
pub fn file_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

fn normalize_extension(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    Some(format!(".{}", trimmed.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_normalised() {
        let set = PlayableExtensions::new(["mkv", ".MP4", "  .avi ", ""]);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![".avi", ".mkv", ".mp4"]);
        assert!(set.contains("MKV"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn playable_detection_uses_last_segment() {
        let set = PlayableExtensions::new([".mkv"]);
        assert!(set.is_playable("/Show.S01/Episode.01.MKV"));
        assert!(!set.is_playable("/Show.mkv/readme.txt"));
        assert!(!set.is_playable("/Show/.mkv"));
        assert!(!set.is_playable("/Show/noext"));
    }

    #[test]
    fn rar_detection_is_case_insensitive() {
        assert!(is_rar("/pack/movie.RAR"));
        assert!(!is_rar("/pack/movie.r00"));
        assert_eq!(file_name("/pack/movie.rar"), "movie.rar");
        assert_eq!(file_name("movie.rar"), "movie.rar");
    }
}
