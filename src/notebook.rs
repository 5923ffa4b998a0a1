use serde::Deserialize;
use std::path::Path;
use tracing::error;

pub const NOTEBOOK_EXTENSION: &str = ".ipynb";

/// Converts notebook files into markdown text for aggregation.
///
/// Returning `None` means the file is skipped; it never aborts aggregation.
#[cfg_attr(test, mockall::automock)]
pub trait NotebookConverter: Send + Sync {
    fn convert(&self, path: &Path) -> Option<String>;

    fn handles(&self, file_name: &str) -> bool {
        file_name.to_lowercase().ends_with(NOTEBOOK_EXTENSION)
    }
}

#[derive(Debug, Deserialize)]
struct Notebook {
    #[serde(default)]
    cells: Vec<Cell>,
    #[serde(default)]
    metadata: NotebookMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct NotebookMetadata {
    kernelspec: Option<KernelSpec>,
    language_info: Option<LanguageInfo>,
}

#[derive(Debug, Deserialize)]
struct KernelSpec {
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LanguageInfo {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    cell_type: String,
    #[serde(default)]
    source: Source,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Source {
    Lines(Vec<String>),
    Text(String),
}

impl Default for Source {
    fn default() -> Self {
        Source::Text(String::new())
    }
}

impl Source {
    fn text(&self) -> String {
        match self {
            Source::Lines(lines) => lines.concat(),
            Source::Text(text) => text.clone(),
        }
    }
}

/// Reads `.ipynb` JSON and renders it as markdown.
#[derive(Debug, Default, Clone)]
pub struct IpynbConverter;

impl IpynbConverter {
    pub fn new() -> Self {
        Self
    }

    pub fn to_markdown(&self, raw: &str) -> Result<String, serde_json::Error> {
        let notebook: Notebook = serde_json::from_str(raw)?;
        let language = notebook
            .metadata
            .language_info
            .and_then(|info| info.name)
            .or_else(|| notebook.metadata.kernelspec.and_then(|k| k.language))
            .unwrap_or_default();

        let blocks: Vec<String> = notebook
            .cells
            .iter()
            .map(|cell| {
                let text = cell.source.text();
                let text = text.trim_end_matches('\n');
                match cell.cell_type.as_str() {
                    "code" => format!("```{}\n{}\n```", language, text),
                    _ => text.to_string(),
                }
            })
            .collect();

        let mut markdown = blocks.join("\n\n");
        markdown.push('\n');
        Ok(markdown)
    }
}

impl NotebookConverter for IpynbConverter {
    fn convert(&self, path: &Path) -> Option<String> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Error reading notebook {}: {}", path.display(), e);
                return None;
            }
        };
        match self.to_markdown(&raw) {
            Ok(markdown) => Some(markdown),
            Err(e) => {
                error!("Error converting notebook {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const NOTEBOOK: &str = r##"{
        "cells": [
            {"cell_type": "markdown", "metadata": {}, "source": ["# Title\n", "Some text"]},
            {"cell_type": "code", "metadata": {}, "outputs": [], "source": "print('hi')\n"},
            {"cell_type": "raw", "metadata": {}, "source": []}
        ],
        "metadata": {"language_info": {"name": "python"}},
        "nbformat": 4,
        "nbformat_minor": 5
    }"##;

    #[test]
    fn test_notebook_to_markdown() {
        let markdown = IpynbConverter::new().to_markdown(NOTEBOOK).unwrap();
        assert_eq!(markdown, "# Title\nSome text\n\n```python\nprint('hi')\n```\n\n\n");
    }

    #[test]
    fn test_kernelspec_language_fallback() {
        let raw = r#"{"cells": [{"cell_type": "code", "source": "x = 1"}],
                      "metadata": {"kernelspec": {"language": "julia"}}}"#;
        let markdown = IpynbConverter::new().to_markdown(raw).unwrap();
        assert!(markdown.starts_with("```julia\nx = 1\n```"));
    }

    #[test]
    fn test_convert_invalid_notebook_returns_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.ipynb");
        fs::write(&path, "{ not json").unwrap();
        assert!(IpynbConverter::new().convert(&path).is_none());
    }

    #[test]
    fn test_handles_extension() {
        let converter = IpynbConverter::new();
        assert!(converter.handles("analysis.ipynb"));
        assert!(converter.handles("Analysis.IPYNB"));
        assert!(!converter.handles("analysis.py"));
    }
}
