//! Inclusion rules for paths entering the structure listing and the
//! aggregated document.
//!
//! Rules are evaluated in a fixed order and the first one that fires wins:
//! git metadata, license files, readme files, excluded folder globs,
//! extension lists, and finally binary classification. Directories are only
//! subject to the first four.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::fmt;

use crate::config::FilterConfig;
use crate::error::ConfigError;
use crate::types::EntryKind;

/// Number of leading bytes inspected when sniffing for binary content.
pub const SNIFF_LEN: usize = 1024;

const GIT_SEGMENTS: &[&str] = &[".git", ".gitignore", ".gitattributes"];
const LICENSE_NAMES: &[&str] = &["license", "license.txt", "license.md"];
const README_NAMES: &[&str] = &["readme", "readme.txt", "readme.md"];

const BINARY_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".ico", ".tif", ".tiff", ".pdf", ".doc", ".docx",
    ".ppt", ".pptx", ".xls", ".xlsx", ".zip", ".tar", ".gz", ".rar", ".7z", ".exe", ".dll", ".so",
    ".dylib", ".pyc", ".pyd", ".db", ".sqlite", ".dat", ".bin", ".o", ".class",
];

const BINARY_MAGIC: &[&[u8]] = &[
    b"\x89PNG",
    b"GIF8",
    b"\xff\xd8\xff",
    b"PK\x03\x04",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    Git,
    License,
    Readme,
    ExcludedFolder,
    ExtensionExcluded,
    ExtensionNotIncluded,
    Binary,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExclusionReason::Git => "git metadata",
            ExclusionReason::License => "license file",
            ExclusionReason::Readme => "readme file",
            ExclusionReason::ExcludedFolder => "excluded folder",
            ExclusionReason::ExtensionExcluded => "excluded extension",
            ExclusionReason::ExtensionNotIncluded => "extension not included",
            ExclusionReason::Binary => "binary file",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Included,
    Excluded(ExclusionReason),
}

impl Decision {
    pub fn is_included(self) -> bool {
        matches!(self, Decision::Included)
    }
}

/// Compiled form of a [`FilterConfig`].
///
/// All checks are pure: the filter never touches the filesystem. Content
/// sniffing works on bytes the caller has already read.
#[derive(Debug, Clone)]
pub struct PathFilter {
    config: FilterConfig,
    folder_globs: GlobSet,
}

impl PathFilter {
    pub fn new(config: &FilterConfig) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.exclude_folders {
            let trimmed = pattern.trim_end_matches('/');
            let glob = GlobBuilder::new(trimmed)
                .literal_separator(true)
                .build()
                .map_err(|source| ConfigError::Glob {
                    pattern: pattern.clone(),
                    source,
                })?;
            builder.add(glob);
        }
        let folder_globs = builder.build().map_err(|source| ConfigError::Glob {
            pattern: config.exclude_folders.join(", "),
            source,
        })?;

        Ok(Self {
            config: config.clone(),
            folder_globs,
        })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Full decision for `relative_path`. `head` holds the leading bytes of a
    /// file when the caller has read them; without it the content sniff is
    /// skipped and only the extension-based binary check applies.
    pub fn decide(&self, relative_path: &str, kind: EntryKind, head: Option<&[u8]>) -> Decision {
        if let Decision::Excluded(reason) = self.decide_path(relative_path, kind) {
            return Decision::Excluded(reason);
        }
        if kind == EntryKind::File {
            let binary = match head {
                Some(bytes) => is_binary(relative_path, bytes),
                None => has_binary_extension(relative_path),
            };
            if binary {
                return Decision::Excluded(ExclusionReason::Binary);
            }
        }
        Decision::Included
    }

    pub fn included(&self, relative_path: &str, is_directory: bool, head: Option<&[u8]>) -> bool {
        let kind = if is_directory {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        self.decide(relative_path, kind, head).is_included()
    }

    /// Rules 1 to 5: everything that can be decided from the path alone.
    /// This is what the structure listing uses, so mislabeled binaries still
    /// show up there.
    pub fn decide_path(&self, relative_path: &str, kind: EntryKind) -> Decision {
        let name = basename(relative_path);
        let folded = name.to_lowercase();

        if self.config.ignore_git && relative_path.split('/').any(|seg| GIT_SEGMENTS.contains(&seg)) {
            return Decision::Excluded(ExclusionReason::Git);
        }
        if self.config.exclude_license && LICENSE_NAMES.contains(&folded.as_str()) {
            return Decision::Excluded(ExclusionReason::License);
        }
        if self.config.exclude_readme && README_NAMES.contains(&folded.as_str()) {
            return Decision::Excluded(ExclusionReason::Readme);
        }
        if self.in_excluded_folder(relative_path) {
            return Decision::Excluded(ExclusionReason::ExcludedFolder);
        }

        if kind == EntryKind::File {
            if self
                .config
                .exclude_extensions
                .iter()
                .any(|ext| name.ends_with(ext.as_str()))
            {
                return Decision::Excluded(ExclusionReason::ExtensionExcluded);
            }
            if !self.config.include_extensions.is_empty()
                && !self
                    .config
                    .include_extensions
                    .iter()
                    .any(|ext| name.ends_with(ext.as_str()))
            {
                return Decision::Excluded(ExclusionReason::ExtensionNotIncluded);
            }
        }

        Decision::Included
    }

    /// True when a folder glob matches the path itself or any of its
    /// ancestor directories.
    fn in_excluded_folder(&self, relative_path: &str) -> bool {
        if self.folder_globs.is_empty() || relative_path.is_empty() {
            return false;
        }
        if self.folder_globs.is_match(relative_path) {
            return true;
        }
        relative_path
            .match_indices('/')
            .any(|(idx, _)| self.folder_globs.is_match(&relative_path[..idx]))
    }
}

fn basename(relative_path: &str) -> &str {
    relative_path.rsplit('/').next().unwrap_or(relative_path)
}

pub fn has_binary_extension(name: &str) -> bool {
    let lower = name.to_lowercase();
    BINARY_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Binary classification from the name and the leading bytes of a file.
///
/// Only the first [`SNIFF_LEN`] bytes of `head` are considered. A UTF-8
/// sequence cut off by that limit is not treated as a decode failure.
pub fn is_binary(name: &str, head: &[u8]) -> bool {
    if has_binary_extension(name) {
        return true;
    }

    let truncated = head.len() > SNIFF_LEN;
    let chunk = &head[..head.len().min(SNIFF_LEN)];

    if chunk.contains(&0) {
        return true;
    }
    if BINARY_MAGIC.iter().any(|magic| chunk.starts_with(magic)) {
        return true;
    }

    match std::str::from_utf8(chunk) {
        Ok(_) => false,
        // Incomplete trailing sequence: only acceptable when we cut it.
        Err(e) if e.error_len().is_none() => !truncated,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn filter(config: FilterConfig) -> PathFilter {
        PathFilter::new(&config).unwrap()
    }

    #[test]
    fn test_git_segments_excluded() {
        let f = filter(FilterConfig::default());
        assert!(!f.included(".git", true, None));
        assert!(!f.included(".git/config", false, None));
        assert!(!f.included("sub/.gitignore", false, None));
        assert!(!f.included(".gitattributes", false, None));
        // Only whole segments count.
        assert!(f.included("docs/.github-notes.md", false, None));
        assert!(f.included(".github/workflows/ci.yml", false, None));
    }

    #[test]
    fn test_git_included_when_not_ignored() {
        let f = filter(FilterConfig::builder().ignore_git(false).build());
        assert!(f.included(".gitignore", false, Some(b"target/\n")));
    }

    #[test]
    fn test_license_and_readme() {
        let f = filter(FilterConfig::builder().exclude_readme(true).build());
        assert_eq!(
            f.decide_path("LICENSE", EntryKind::File),
            Decision::Excluded(ExclusionReason::License)
        );
        assert_eq!(
            f.decide_path("pkg/License.md", EntryKind::File),
            Decision::Excluded(ExclusionReason::License)
        );
        assert_eq!(
            f.decide_path("README.md", EntryKind::File),
            Decision::Excluded(ExclusionReason::Readme)
        );
        assert!(f.included("LICENSE-MIT", false, Some(b"text")));

        let f = filter(FilterConfig::default());
        assert!(f.included("README.md", false, Some(b"# title")));
    }

    #[test]
    fn test_folder_globs_single_and_double_star() {
        let f = filter(
            FilterConfig::builder()
                .exclude_folders(["build", "**/node_modules", "src/*/generated"])
                .build(),
        );

        assert!(!f.included("build", true, None));
        assert!(f.included("sub/build", true, None));
        assert!(!f.included("node_modules", true, None));
        assert!(!f.included("web/app/node_modules", true, None));
        assert!(!f.included("src/api/generated", true, None));
        // `*` does not cross segments.
        assert!(f.included("src/api/v1/generated", true, None));
    }

    #[test]
    fn test_files_under_excluded_folder_are_excluded() {
        let f = filter(FilterConfig::builder().exclude_folders(["vendor"]).build());
        assert_eq!(
            f.decide("vendor/lib/a.rs", EntryKind::File, Some(b"fn a() {}")),
            Decision::Excluded(ExclusionReason::ExcludedFolder)
        );
        assert!(f.included("vendored.rs", false, Some(b"fn a() {}")));
    }

    #[test]
    fn test_folder_globs_match_file_paths() {
        let f = filter(
            FilterConfig::builder()
                .exclude_folders(["**/*.lock", "docs/generated.md"])
                .build(),
        );
        assert_eq!(
            f.decide("Cargo.lock", EntryKind::File, Some(b"x")),
            Decision::Excluded(ExclusionReason::ExcludedFolder)
        );
        assert!(!f.included("web/yarn.lock", false, Some(b"x")));
        assert!(!f.included("docs/generated.md", false, Some(b"x")));
        assert!(f.included("docs/guide.md", false, Some(b"x")));
    }

    #[test]
    fn test_extension_lists_apply_to_files_only() {
        let f = filter(
            FilterConfig::builder()
                .include_extensions([".py", ".md"])
                .exclude_extensions(["_test.py"])
                .build(),
        );

        assert!(f.included("a/main.py", false, Some(b"print()")));
        assert_eq!(
            f.decide_path("a/main_test.py", EntryKind::File),
            Decision::Excluded(ExclusionReason::ExtensionExcluded)
        );
        assert_eq!(
            f.decide_path("a/main.rs", EntryKind::File),
            Decision::Excluded(ExclusionReason::ExtensionNotIncluded)
        );
        assert!(f.included("a.rs", true, None));
    }

    #[test]
    fn test_binary_detection() {
        assert!(is_binary("logo.PNG", b"anything"));
        assert!(is_binary("data.txt", b"abc\0def"));
        assert!(is_binary("image.txt", b"\x89PNG\r\n\x1a\n"));
        assert!(is_binary("anim.txt", b"GIF87a"));
        assert!(is_binary("photo.txt", b"\xff\xd8\xff\xe0"));
        assert!(is_binary("archive.txt", b"PK\x03\x04rest"));
        assert!(is_binary("latin1.txt", b"caf\xe9 au lait"));
        assert!(!is_binary("notes.txt", "héllo wörld".as_bytes()));
        assert!(!is_binary("empty.txt", b""));
    }

    #[test]
    fn test_utf8_sequence_cut_at_sniff_boundary() {
        let mut bytes = vec![b'a'; SNIFF_LEN - 1];
        bytes.extend_from_slice("é".as_bytes());
        assert!(!is_binary("long.txt", &bytes));
    }

    #[test]
    fn test_truncated_sequence_at_end_of_short_file_is_binary() {
        let mut bytes = vec![b'a'; SNIFF_LEN - 1];
        bytes.push(0xC3);
        assert_eq!(bytes.len(), SNIFF_LEN);
        assert!(is_binary("exact.txt", &bytes));
    }

    #[test]
    fn test_binary_applies_even_when_extension_included() {
        let f = filter(FilterConfig::builder().include_extensions([".txt"]).build());
        assert_eq!(
            f.decide("blob.txt", EntryKind::File, Some(b"\0\0\0")),
            Decision::Excluded(ExclusionReason::Binary)
        );
        // Path-only decision still lists it.
        assert!(f.decide_path("blob.txt", EntryKind::File).is_included());
    }

    #[test]
    fn test_invalid_glob_is_rejected() {
        let config = FilterConfig::builder().exclude_folders(["src/[unclosed"]).build();
        assert!(matches!(PathFilter::new(&config), Err(ConfigError::Glob { .. })));
    }

    proptest! {
        #[test]
        fn prop_decisions_are_deterministic(
            path in "[a-zA-Z._]{1,8}(/[a-zA-Z._]{1,8}){0,3}",
            is_dir in any::<bool>(),
            head in proptest::collection::vec(any::<u8>(), 0..64),
            exclude_readme in any::<bool>(),
            ignore_git in any::<bool>(),
        ) {
            let config = FilterConfig::builder()
                .exclude_readme(exclude_readme)
                .ignore_git(ignore_git)
                .exclude_folders(["**/tmp"])
                .include_extensions([".rs", ".md"])
                .build();
            let first = filter(config.clone());
            let second = filter(config);

            let a = first.included(&path, is_dir, Some(&head));
            let b = first.included(&path, is_dir, Some(&head));
            let c = second.included(&path, is_dir, Some(&head));
            prop_assert_eq!(a, b);
            prop_assert_eq!(a, c);
        }
    }
}
