//! Builds the concatenated document, its path→offset index and the
//! path→content map used as the search corpus.
//!
//! Files are grouped by directory in the scanner's depth-first order. A
//! directory header is written only before a directory's first eligible
//! file, so directories without content leave no trace in the document.

use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Span};

use crate::config::FilterConfig;
use crate::error::Result;
use crate::filter::{Decision, ExclusionReason, SNIFF_LEN};
use crate::notebook::{IpynbConverter, NotebookConverter};
use crate::scanner::{ScanResult, TreeScanner};
use crate::types::{EntryKind, ScanEntry};

/// Stands in for content that is not valid UTF-8.
pub const BINARY_PLACEHOLDER: &str = "binary file, content not displayed";
pub const EMPTY_FOLDER_TEXT: &str = "No text files in this folder.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    DirectoryHeader,
    FileHeader,
    FileContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub kind: SectionKind,
    pub path: String,
    pub range: Range<usize>,
}

pub fn directory_header(relative_dir: &str) -> String {
    if relative_dir.is_empty() {
        "\n---/---\n".to_string()
    } else {
        format!("\n---{}/---\n", relative_dir)
    }
}

pub fn file_header(file_name: &str) -> String {
    format!("\n--{}--\n", file_name)
}

/// Ordered sections whose concatenation is the full document text.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatedDocument {
    text: String,
    sections: Vec<Section>,
}

impl AggregatedDocument {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: SectionKind, path: &str, text: &str) -> Range<usize> {
        let start = self.text.len();
        self.text.push_str(text);
        let range = start..self.text.len();
        self.sections.push(Section {
            kind,
            path: path.to_string(),
            range: range.clone(),
        });
        range
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section_text(&self, section: &Section) -> &str {
        &self.text[section.range.clone()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub path: String,
    pub offset: usize,
    pub len: usize,
}

/// Path → byte offset of the file's content inside the document, in
/// traversal order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContentIndex {
    entries: Vec<IndexEntry>,
    #[serde(skip)]
    by_path: HashMap<String, usize>,
}

impl ContentIndex {
    fn insert(&mut self, path: &str, offset: usize, len: usize) {
        if self.by_path.contains_key(path) {
            warn!("Duplicate index key ignored: {}", path);
            return;
        }
        self.by_path.insert(path.to_string(), self.entries.len());
        self.entries.push(IndexEntry {
            path: path.to_string(),
            offset,
            len,
        });
    }

    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.by_path.get(path).map(|&i| &self.entries[i])
    }

    pub fn offset(&self, path: &str) -> Option<usize> {
        self.get(path).map(|e| e.offset)
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Path → decoded text, in traversal order. This is the search corpus.
#[derive(Debug, Clone, Default)]
pub struct PathContentMap {
    entries: Vec<(String, String)>,
    by_path: HashMap<String, usize>,
}

impl PathContentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the content for `path`. Replacing keeps the
    /// original position.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        let path = path.into();
        let content = content.into();
        match self.by_path.get(&path) {
            Some(&i) => self.entries[i].1 = content,
            None => {
                self.by_path.insert(path.clone(), self.entries.len());
                self.entries.push((path, content));
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.by_path.get(path).map(|&i| self.entries[i].1.as_str())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    /// Traversal position of `path`.
    pub fn position(&self, path: &str) -> Option<usize> {
        self.by_path.get(path).copied()
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<P: Into<String>, C: Into<String>> FromIterator<(P, C)> for PathContentMap {
    fn from_iter<T: IntoIterator<Item = (P, C)>>(iter: T) -> Self {
        let mut map = PathContentMap::new();
        for (path, content) in iter {
            map.insert(path, content);
        }
        map
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregationStats {
    pub files_included: usize,
    pub skipped_binary: usize,
    pub skipped_read_errors: usize,
    pub skipped_conversion: usize,
    pub decode_placeholders: usize,
    pub content_bytes: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Aggregation {
    pub document: AggregatedDocument,
    pub index: ContentIndex,
    /// Shared with the search workers.
    pub contents: Arc<PathContentMap>,
    pub stats: AggregationStats,
    /// False for the structure-only fast path: offsets are placeholders and
    /// contents are empty.
    pub content_read: bool,
}

impl Aggregation {
    /// Slice of the document holding the content of `path`.
    pub fn content_at(&self, path: &str) -> Option<&str> {
        if !self.content_read {
            return None;
        }
        let entry = self.index.get(path)?;
        self.document
            .as_str()
            .get(entry.offset..entry.offset + entry.len)
    }

    /// Every file directly inside `folder`, each behind its own header.
    pub fn folder_contents(&self, folder: &str) -> String {
        let folder = normalize_path(folder);
        let blocks: Vec<String> = self
            .contents
            .iter()
            .filter(|(path, _)| parent_dir(path) == folder)
            .map(|(path, content)| format!("{}{}", file_header(file_name(path)), content))
            .collect();

        if blocks.is_empty() {
            EMPTY_FOLDER_TEXT.to_string()
        } else {
            blocks.join("\n")
        }
    }

    /// Export the selected files as `--name--` blocks separated by blank
    /// lines. Unknown paths are skipped.
    pub fn select_files<I, S>(&self, paths: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        paths
            .into_iter()
            .filter_map(|p| {
                let path = normalize_path(p.as_ref());
                self.contents
                    .get(&path)
                    .map(|content| format!("--{}--\n{}", file_name(&path), content))
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// `/` separators, no leading `./` or `/`, no trailing `/`.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut trimmed = unified.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    let trimmed = trimmed.trim_start_matches('/').trim_end_matches('/');
    if trimmed == "." {
        String::new()
    } else {
        trimmed.to_string()
    }
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

pub struct ContentAggregator {
    scanner: TreeScanner,
    converter: Arc<dyn NotebookConverter>,
    span: Span,
}

impl ContentAggregator {
    pub fn new(config: &FilterConfig) -> Result<Self> {
        Ok(Self::from_scanner(TreeScanner::new(config)?))
    }

    pub fn from_scanner(scanner: TreeScanner) -> Self {
        Self {
            scanner,
            converter: Arc::new(IpynbConverter::new()),
            span: info_span!("content_aggregator"),
        }
    }

    pub fn with_converter(mut self, converter: Arc<dyn NotebookConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn scanner(&self) -> &TreeScanner {
        &self.scanner
    }

    pub fn aggregate(&self, root: &Path, read_content: bool) -> Result<Aggregation> {
        let scan = self.scanner.scan(root)?;
        Ok(self.aggregate_scanned(&scan, read_content))
    }

    /// Aggregate the files of an existing scan, so the listing and the
    /// document are guaranteed to come from the same walk.
    pub fn aggregate_scanned(&self, scan: &ScanResult, read_content: bool) -> Aggregation {
        let _guard = self.span.enter();
        let start = Instant::now();

        let mut document = AggregatedDocument::new();
        let mut index = ContentIndex::default();
        let mut contents = PathContentMap::new();
        let mut stats = AggregationStats::default();

        for (dir, files) in group_by_directory(&scan.entries) {
            let mut header_written = false;

            for entry in files {
                let rel = entry.relative_path.as_str();

                if !read_content {
                    if let Decision::Excluded(reason) =
                        self.scanner.filter().decide(rel, EntryKind::File, None)
                    {
                        skipped(rel, reason, &mut stats);
                        continue;
                    }
                    index.insert(rel, 0, 0);
                    contents.insert(rel, String::new());
                    stats.files_included += 1;
                    continue;
                }

                let Some(content) = self.load(&scan.root, entry, &mut stats) else {
                    continue;
                };

                if !header_written {
                    document.push(SectionKind::DirectoryHeader, dir, &directory_header(dir));
                    header_written = true;
                }
                document.push(SectionKind::FileHeader, rel, &file_header(entry.name()));
                let range = document.push(SectionKind::FileContent, rel, &content);

                index.insert(rel, range.start, range.len());
                stats.content_bytes += content.len();
                stats.files_included += 1;
                contents.insert(rel, content);
            }
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Aggregated {} files ({} bytes, {} binary, {} unreadable, {} unconverted) in {}ms",
            stats.files_included,
            stats.content_bytes,
            stats.skipped_binary,
            stats.skipped_read_errors,
            stats.skipped_conversion,
            stats.duration_ms
        );

        Aggregation {
            document,
            index,
            contents: Arc::new(contents),
            stats,
            content_read: read_content,
        }
    }

    /// Sniff, read and decode (or convert) one file. `None` means skip it.
    ///
    /// The path and extension rules run before any I/O, and only regular
    /// files are opened. The content sniff sees at most [`SNIFF_LEN`] bytes
    /// (plus one, to tell a cut UTF-8 sequence from a truncated file) before
    /// the rest of the file is read.
    fn load(&self, root: &Path, entry: &ScanEntry, stats: &mut AggregationStats) -> Option<String> {
        let rel = entry.relative_path.as_str();
        let full_path = root.join(rel);
        let filter = self.scanner.filter();

        if let Decision::Excluded(reason) = filter.decide(rel, EntryKind::File, None) {
            skipped(rel, reason, stats);
            return None;
        }

        match std::fs::metadata(&full_path) {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => {
                debug!("Skipping {}: not a regular file", rel);
                return None;
            }
            Err(e) => {
                warn!("Error reading file {}: {}", rel, e);
                stats.skipped_read_errors += 1;
                return None;
            }
        }

        let mut file = match File::open(&full_path) {
            Ok(file) => file,
            Err(e) => {
                warn!("Error reading file {}: {}", rel, e);
                stats.skipped_read_errors += 1;
                return None;
            }
        };

        let mut bytes = Vec::new();
        if let Err(e) = (&mut file).take(SNIFF_LEN as u64 + 1).read_to_end(&mut bytes) {
            warn!("Error reading file {}: {}", rel, e);
            stats.skipped_read_errors += 1;
            return None;
        }
        if let Decision::Excluded(reason) = filter.decide(rel, EntryKind::File, Some(&bytes)) {
            skipped(rel, reason, stats);
            return None;
        }

        if self.converter.handles(entry.name()) {
            return match self.converter.convert(&full_path) {
                Some(markdown) => Some(markdown),
                None => {
                    warn!("Skipping notebook {}: conversion failed", rel);
                    stats.skipped_conversion += 1;
                    None
                }
            };
        }

        if let Err(e) = file.read_to_end(&mut bytes) {
            warn!("Error reading file {}: {}", rel, e);
            stats.skipped_read_errors += 1;
            return None;
        }

        match String::from_utf8(bytes) {
            Ok(text) => Some(text),
            Err(_) => {
                debug!("{} is not valid UTF-8, using placeholder", rel);
                stats.decode_placeholders += 1;
                Some(BINARY_PLACEHOLDER.to_string())
            }
        }
    }
}

fn skipped(rel: &str, reason: ExclusionReason, stats: &mut AggregationStats) {
    debug!("Skipping {} ({})", rel, reason);
    if reason == ExclusionReason::Binary {
        stats.skipped_binary += 1;
    }
}

/// Directories in scan order, each with its direct files in name order.
fn group_by_directory(entries: &[ScanEntry]) -> Vec<(&str, Vec<&ScanEntry>)> {
    let mut groups: Vec<(&str, Vec<&ScanEntry>)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for entry in entries {
        match entry.kind {
            EntryKind::Directory => {
                positions.insert(entry.relative_path.as_str(), groups.len());
                groups.push((entry.relative_path.as_str(), Vec::new()));
            }
            EntryKind::File => {
                let parent = parent_dir(&entry.relative_path);
                if let Some(&i) = positions.get(parent) {
                    groups[i].1.push(entry);
                }
            }
        }
    }
    groups
}
