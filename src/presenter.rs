//! Context windows around matches, and cursor stepping over result files.

use serde::Serialize;
use tracing::{info_span, warn, Span};

use crate::aggregator::{file_header, PathContentMap};
use crate::types::{Direction, FileMatches};

pub const WINDOW_SEPARATOR: &str = "\n...\n";

/// An inclusive, zero-based line range of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextWindow {
    pub first_line: usize,
    pub last_line: usize,
    pub lines: Vec<String>,
}

impl ContextWindow {
    /// Lines prefixed with their 1-based line number.
    pub fn render(&self) -> String {
        self.lines
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{}: {}", self.first_line + i + 1, line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileView {
    pub path: String,
    pub match_count: usize,
    pub windows: Vec<ContextWindow>,
}

impl FileView {
    /// Windows separated by an ellipsis line, without the file header.
    pub fn body(&self) -> String {
        self.windows
            .iter()
            .map(ContextWindow::render)
            .collect::<Vec<_>>()
            .join(WINDOW_SEPARATOR)
    }

    pub fn render(&self) -> String {
        format!("{}{}", file_header(&self.path).trim_start(), self.body())
    }
}

pub struct ResultPresenter {
    context_lines: usize,
    span: Span,
}

impl Default for ResultPresenter {
    fn default() -> Self {
        Self::new(3)
    }
}

impl ResultPresenter {
    pub fn new(context_lines: usize) -> Self {
        Self {
            context_lines,
            span: info_span!("result_presenter"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn context_lines(&self) -> usize {
        self.context_lines
    }

    pub fn present(&self, results: &[FileMatches], contents: &PathContentMap) -> Vec<FileView> {
        let _guard = self.span.enter();
        results
            .iter()
            .filter_map(|file| match contents.get(&file.path) {
                Some(content) => Some(self.present_file(file, content)),
                None => {
                    warn!("No content for matched file {}", file.path);
                    None
                }
            })
            .collect()
    }

    pub fn present_file(&self, file: &FileMatches, content: &str) -> FileView {
        let lines: Vec<&str> = content.split('\n').collect();
        let last = lines.len() - 1;
        let mut ranges: Vec<(usize, usize)> = Vec::new();

        for m in &file.matches {
            let line = line_of(content, m.start);
            let first = line.saturating_sub(self.context_lines);
            let end = (line + self.context_lines).min(last);
            match ranges.last_mut() {
                Some(prev) if first <= prev.1 => prev.1 = prev.1.max(end),
                _ => ranges.push((first, end)),
            }
        }

        let windows = ranges
            .into_iter()
            .map(|(first, end)| ContextWindow {
                first_line: first,
                last_line: end,
                lines: lines[first..=end].iter().map(|l| l.to_string()).collect(),
            })
            .collect();

        FileView {
            path: file.path.clone(),
            match_count: file.matches.len(),
            windows,
        }
    }

    pub fn render(&self, views: &[FileView]) -> String {
        views
            .iter()
            .map(FileView::render)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Zero-based line containing byte `offset`.
pub fn line_of(content: &str, offset: usize) -> usize {
    let end = offset.min(content.len());
    content.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count()
}

/// Next cursor over `len` items, wrapping in both directions. A fresh
/// cursor starts at the first item going forward and the last going back.
pub fn step_cursor(cursor: Option<usize>, len: usize, direction: Direction) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let next = match (cursor, direction) {
        (None, Direction::Next) => 0,
        (None, Direction::Previous) => len - 1,
        (Some(c), Direction::Next) => (c.min(len - 1) + 1) % len,
        (Some(c), Direction::Previous) => (c.min(len - 1) + len - 1) % len,
    };
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Match;

    fn matches(path: &str, spans: &[(usize, usize)]) -> FileMatches {
        FileMatches {
            path: path.to_string(),
            matches: spans
                .iter()
                .map(|&(start, end)| Match {
                    path: path.to_string(),
                    start,
                    end,
                })
                .collect(),
        }
    }

    fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("line{}", i)).collect::<Vec<_>>().join("\n")
    }

    fn offset_of_line(content: &str, line: usize) -> usize {
        content.split('\n').take(line).map(|l| l.len() + 1).sum()
    }

    #[test]
    fn test_line_of() {
        assert_eq!(line_of("abc", 1), 0);
        assert_eq!(line_of("a\nb\nc", 4), 2);
        assert_eq!(line_of("a\n", 99), 1);
    }

    #[test]
    fn test_window_clamped_at_file_start() {
        let content = numbered(10);
        let view = ResultPresenter::default().present_file(&matches("f", &[(0, 5)]), &content);
        assert_eq!(view.windows.len(), 1);
        assert_eq!(view.windows[0].first_line, 0);
        assert_eq!(view.windows[0].last_line, 3);
        assert_eq!(view.windows[0].render(), "1: line1\n2: line2\n3: line3\n4: line4");
    }

    #[test]
    fn test_overlapping_windows_merge() {
        let content = numbered(20);
        let a = offset_of_line(&content, 4);
        let b = offset_of_line(&content, 8);
        let view = ResultPresenter::default().present_file(&matches("f", &[(a, a + 1), (b, b + 1)]), &content);
        assert_eq!(view.windows.len(), 1);
        assert_eq!((view.windows[0].first_line, view.windows[0].last_line), (1, 11));
    }

    #[test]
    fn test_adjacent_windows_stay_separate() {
        let content = numbered(20);
        let a = offset_of_line(&content, 0);
        let b = offset_of_line(&content, 7);
        let view = ResultPresenter::default().present_file(&matches("f", &[(a, a + 1), (b, b + 1)]), &content);
        assert_eq!(view.windows.len(), 2);
        assert_eq!((view.windows[0].first_line, view.windows[0].last_line), (0, 3));
        assert_eq!((view.windows[1].first_line, view.windows[1].last_line), (4, 10));
        assert!(view.render().contains("4: line4\n...\n5: line5"));
    }

    #[test]
    fn test_windows_sharing_a_line_merge() {
        let content = numbered(20);
        let a = offset_of_line(&content, 0);
        let b = offset_of_line(&content, 6);
        let view = ResultPresenter::default().present_file(&matches("f", &[(a, a + 1), (b, b + 1)]), &content);
        assert_eq!(view.windows.len(), 1);
        assert_eq!((view.windows[0].first_line, view.windows[0].last_line), (0, 9));
    }

    #[test]
    fn test_distant_windows_separated() {
        let content = numbered(30);
        let a = offset_of_line(&content, 2);
        let b = offset_of_line(&content, 20);
        let presenter = ResultPresenter::default();
        let view = presenter.present_file(&matches("src/f.rs", &[(a, a + 1), (b, b + 1)]), &content);

        assert_eq!(view.windows.len(), 2);
        assert_eq!(view.match_count, 2);
        let text = view.render();
        assert!(text.starts_with("--src/f.rs--\n1: line1\n"));
        assert!(text.contains("6: line6\n...\n18: line18"));
        assert!(text.ends_with("24: line24"));
    }

    #[test]
    fn test_present_skips_unknown_files() {
        let contents: PathContentMap = vec![("a.txt", "hello")].into_iter().collect();
        let views = ResultPresenter::default().present(
            &[matches("a.txt", &[(0, 5)]), matches("gone.txt", &[(0, 1)])],
            &contents,
        );
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].render(), "--a.txt--\n1: hello");
    }

    #[test]
    fn test_step_cursor_wraps() {
        assert_eq!(step_cursor(None, 0, Direction::Next), None);
        assert_eq!(step_cursor(None, 3, Direction::Next), Some(0));
        assert_eq!(step_cursor(None, 3, Direction::Previous), Some(2));
        assert_eq!(step_cursor(Some(2), 3, Direction::Next), Some(0));
        assert_eq!(step_cursor(Some(0), 3, Direction::Previous), Some(2));
        assert_eq!(step_cursor(Some(1), 3, Direction::Next), Some(2));
    }
}
