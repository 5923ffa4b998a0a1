use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn is_dir(self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

/// One node of the filtered tree, as produced by the scanner.
///
/// `relative_path` uses `/` separators and is empty for the root.
/// `depth` is the number of path segments below the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEntry {
    pub relative_path: String,
    pub kind: EntryKind,
    pub depth: usize,
}

impl ScanEntry {
    pub fn new(relative_path: impl Into<String>, kind: EntryKind, depth: usize) -> Self {
        Self {
            relative_path: relative_path.into(),
            kind,
            depth,
        }
    }

    pub fn is_root(&self) -> bool {
        self.relative_path.is_empty()
    }

    /// Last path segment, or `/` for the root.
    pub fn name(&self) -> &str {
        if self.is_root() {
            return "/";
        }
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }
}

/// A search request. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub pattern: String,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub whole_word: bool,
    #[serde(default)]
    pub is_regex: bool,
}

impl SearchQuery {
    pub fn literal(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            case_sensitive: false,
            whole_word: false,
            is_regex: false,
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            is_regex: true,
            ..Self::literal(pattern)
        }
    }

    pub fn case_sensitive(mut self, value: bool) -> Self {
        self.case_sensitive = value;
        self
    }

    pub fn whole_word(mut self, value: bool) -> Self {
        self.whole_word = value;
        self
    }
}

/// A match span, in bytes, relative to the file's own content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub path: String,
    pub start: usize,
    pub end: usize,
}

/// All matches found in one file, in left-to-right order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMatches {
    pub path: String,
    pub matches: Vec<Match>,
}

impl FileMatches {
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// Cursor position over the files that have matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationPosition {
    /// Zero-based cursor index.
    pub index: usize,
    pub total: usize,
    pub path: String,
}

impl fmt::Display for NavigationPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File {} of {}", self.index + 1, self.total)
    }
}
