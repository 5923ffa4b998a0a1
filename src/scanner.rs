use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Span};
use walkdir::{DirEntry, WalkDir};

use crate::config::FilterConfig;
use crate::error::Result;
use crate::filter::{Decision, PathFilter};
use crate::types::{EntryKind, ScanEntry};

const BRANCH: &str = "├── ";
const PIPE: &str = "│   ";

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub root: PathBuf,
    /// Depth-first, directories before their children, siblings sorted by name.
    pub entries: Vec<ScanEntry>,
    /// Directories that were excluded and not descended into.
    pub pruned: Vec<String>,
    pub duration_ms: u64,
}

impl ScanResult {
    pub fn files(&self) -> impl Iterator<Item = &ScanEntry> {
        self.entries.iter().filter(|e| e.kind == EntryKind::File)
    }

    pub fn directories(&self) -> impl Iterator<Item = &ScanEntry> {
        self.entries.iter().filter(|e| e.kind == EntryKind::Directory)
    }

    pub fn render(&self, directories_only: bool) -> String {
        render_structure(&self.entries, directories_only)
    }
}

/// Deterministic filtered walk of a directory tree.
pub struct TreeScanner {
    filter: PathFilter,
    follow_links: bool,
    span: Span,
}

impl TreeScanner {
    pub fn new(config: &FilterConfig) -> Result<Self> {
        Ok(Self::with_filter(PathFilter::new(config)?))
    }

    pub fn with_filter(filter: PathFilter) -> Self {
        Self {
            filter,
            follow_links: false,
            span: info_span!("tree_scanner"),
        }
    }

    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Run all logging for this scanner under `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    pub fn scan(&self, root: &Path) -> Result<ScanResult> {
        let _guard = self.span.enter();
        let start = Instant::now();

        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not a directory: {}", root.display()),
            )
            .into());
        }

        let mut entries = Vec::new();
        let mut pruned = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(self.follow_links)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| self.admit(root, entry, &mut pruned));

        for item in walker {
            let entry = match item {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            let relative = relative_path(root, entry.path());
            entries.push(ScanEntry::new(relative, kind_of(&entry), entry.depth()));
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Scanned {} entries ({} pruned) under {} in {}ms",
            entries.len(),
            pruned.len(),
            root.display(),
            duration_ms
        );

        Ok(ScanResult {
            root: root.to_path_buf(),
            entries,
            pruned,
            duration_ms,
        })
    }

    fn admit(&self, root: &Path, entry: &DirEntry, pruned: &mut Vec<String>) -> bool {
        if entry.depth() == 0 {
            return true;
        }
        let relative = relative_path(root, entry.path());
        let kind = kind_of(entry);
        match self.filter.decide_path(&relative, kind) {
            Decision::Included => true,
            Decision::Excluded(reason) => {
                debug!("Excluding {} ({})", relative, reason);
                if kind == EntryKind::Directory {
                    pruned.push(relative);
                }
                false
            }
        }
    }
}

fn kind_of(entry: &DirEntry) -> EntryKind {
    if entry.file_type().is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    }
}

/// `/`-separated path of `path` below `root`; empty for the root itself.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Draw the tree with one line per entry, indented by depth.
pub fn render_structure(entries: &[ScanEntry], directories_only: bool) -> String {
    let mut lines = Vec::with_capacity(entries.len());
    for entry in entries {
        if directories_only && entry.kind == EntryKind::File {
            continue;
        }
        if entry.is_root() {
            lines.push("/".to_string());
            continue;
        }
        let suffix = if entry.kind.is_dir() { "/" } else { "" };
        lines.push(format!(
            "{}{}{}{}",
            PIPE.repeat(entry.depth.saturating_sub(1)),
            BRANCH,
            entry.name(),
            suffix
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, rel: &str, content: &str) {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn paths(result: &ScanResult) -> Vec<&str> {
        result.entries.iter().map(|e| e.relative_path.as_str()).collect()
    }

    #[test]
    fn test_scan_orders_depth_first_and_sorted() {
        let dir = TempDir::new().unwrap();
        write(&dir, "b/file2.md", "world");
        write(&dir, "a/file1.py", "hello");
        write(&dir, "top.txt", "x");

        let scanner = TreeScanner::new(&FilterConfig::default()).unwrap();
        let result = scanner.scan(dir.path()).unwrap();

        assert_eq!(
            paths(&result),
            vec!["", "a", "a/file1.py", "b", "b/file2.md", "top.txt"]
        );
        let depths: Vec<usize> = result.entries.iter().map(|e| e.depth).collect();
        assert_eq!(depths, vec![0, 1, 2, 1, 2, 1]);
    }

    #[test]
    fn test_empty_directories_are_listed() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("empty/nested")).unwrap();

        let scanner = TreeScanner::new(&FilterConfig::default()).unwrap();
        let result = scanner.scan(dir.path()).unwrap();
        assert_eq!(paths(&result), vec!["", "empty", "empty/nested"]);
    }

    #[test]
    fn test_excluded_folder_is_pruned() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/main.rs", "fn main() {}");
        write(&dir, "node_modules/pkg/index.js", "x");
        write(&dir, "web/node_modules/pkg/index.js", "x");

        let config = FilterConfig::builder()
            .exclude_folders(["**/node_modules"])
            .build();
        let result = TreeScanner::new(&config).unwrap().scan(dir.path()).unwrap();

        assert!(result
            .entries
            .iter()
            .all(|e| !e.relative_path.contains("node_modules")));
        assert_eq!(result.pruned, vec!["node_modules", "web/node_modules"]);
        assert!(paths(&result).contains(&"web"));
    }

    #[test]
    fn test_git_directory_skipped_by_default() {
        let dir = TempDir::new().unwrap();
        write(&dir, ".git/HEAD", "ref: refs/heads/main");
        write(&dir, ".gitignore", "target/");
        write(&dir, "LICENSE", "MIT");
        write(&dir, "lib.rs", "");

        let result = TreeScanner::new(&FilterConfig::default())
            .unwrap()
            .scan(dir.path())
            .unwrap();
        assert_eq!(paths(&result), vec!["", "lib.rs"]);
    }

    #[test]
    fn test_structure_lists_binary_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("blob.txt"), b"\0\0\0").unwrap();

        let result = TreeScanner::new(&FilterConfig::default())
            .unwrap()
            .scan(dir.path())
            .unwrap();
        assert_eq!(paths(&result), vec!["", "blob.txt"]);
    }

    #[test]
    fn test_scan_missing_root() {
        let dir = TempDir::new().unwrap();
        let scanner = TreeScanner::new(&FilterConfig::default()).unwrap();
        assert!(scanner.scan(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_render_structure() {
        let entries = vec![
            ScanEntry::new("", EntryKind::Directory, 0),
            ScanEntry::new("a", EntryKind::Directory, 1),
            ScanEntry::new("a/file1.py", EntryKind::File, 2),
            ScanEntry::new("b", EntryKind::Directory, 1),
            ScanEntry::new("b/c", EntryKind::Directory, 2),
            ScanEntry::new("b/c/deep.rs", EntryKind::File, 3),
        ];

        assert_eq!(
            render_structure(&entries, false),
            "/\n├── a/\n│   ├── file1.py\n├── b/\n│   ├── c/\n│   │   ├── deep.rs"
        );
        assert_eq!(
            render_structure(&entries, true),
            "/\n├── a/\n├── b/\n│   ├── c/"
        );
    }
}
