use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::context::RepoContext;
use crate::error::RepoCtxError;
use crate::types::SearchQuery;

/// JSON schema of one callable tool, in the shape LLM tool APIs expect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Tools over the repository most recently analyzed by a [`RepoContext`].
pub struct RepoTools {
    context: Arc<RepoContext>,
}

impl RepoTools {
    pub fn new(context: Arc<RepoContext>) -> Self {
        Self { context }
    }

    pub fn get_tool_schemas() -> Vec<ToolSchema> {
        vec![
            ToolSchema {
                name: "get_structure".to_string(),
                description: "Get the filtered directory tree of the analyzed repository".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "directories_only": {
                            "type": "boolean",
                            "description": "List directories only",
                            "default": false
                        }
                    }
                }),
            },
            ToolSchema {
                name: "get_file_content".to_string(),
                description: "Get the text content of one file by its path relative to the repository root".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "file_path": {
                            "type": "string",
                            "description": "Relative path, e.g. 'src/main.rs'"
                        }
                    },
                    "required": ["file_path"]
                }),
            },
            ToolSchema {
                name: "get_folder_contents".to_string(),
                description: "Get the contents of every file directly inside a folder".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "folder": {
                            "type": "string",
                            "description": "Relative folder path; empty for the repository root"
                        }
                    },
                    "required": ["folder"]
                }),
            },
            ToolSchema {
                name: "search_content".to_string(),
                description: "Search file contents for a literal string or regex and return matches with surrounding lines".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "pattern": {
                            "type": "string",
                            "description": "Text or regular expression to search for"
                        },
                        "case_sensitive": {
                            "type": "boolean",
                            "default": false
                        },
                        "whole_word": {
                            "type": "boolean",
                            "default": false
                        },
                        "is_regex": {
                            "type": "boolean",
                            "default": false
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of files to return",
                            "default": 20
                        }
                    },
                    "required": ["pattern"]
                }),
            },
        ]
    }

    pub async fn execute_tool(&self, tool_name: &str, input: Value) -> Result<ToolResult> {
        let outcome = match tool_name {
            "get_structure" => self.get_structure(input),
            "get_file_content" => self.get_file_content(input),
            "get_folder_contents" => self.get_folder_contents(input),
            "search_content" => self.search_content(input).await,
            _ => return Ok(ToolResult::error(format!("Unknown tool: {}", tool_name))),
        };

        match outcome {
            Err(e) => match e.downcast_ref::<RepoCtxError>() {
                Some(err) => Ok(ToolResult::error(err.to_string())),
                None => Err(e),
            },
            ok => ok,
        }
    }

    fn get_structure(&self, input: Value) -> Result<ToolResult> {
        let input: GetStructureInput =
            serde_json::from_value(input).context("Invalid get_structure input")?;
        let analysis = self.context.current()?;

        let structure = if input.directories_only.unwrap_or(false) {
            analysis.scan.render(true)
        } else {
            analysis.structure.clone()
        };

        Ok(ToolResult::success(json!({
            "structure": structure,
            "entries": analysis.entries().len(),
            "files_with_content": analysis.aggregation.stats.files_included
        })))
    }

    fn get_file_content(&self, input: Value) -> Result<ToolResult> {
        let input: GetFileContentInput =
            serde_json::from_value(input).context("Invalid get_file_content input")?;
        let analysis = self.context.current()?;

        match analysis.file_content(&input.file_path) {
            Some(content) => Ok(ToolResult::success(json!({
                "file_path": input.file_path,
                "content": content
            }))),
            None => Ok(ToolResult::error_with_data(json!({
                "file_path": input.file_path,
                "error": RepoCtxError::UnknownPath(input.file_path.clone()).to_string()
            }))),
        }
    }

    fn get_folder_contents(&self, input: Value) -> Result<ToolResult> {
        let input: GetFolderContentsInput =
            serde_json::from_value(input).context("Invalid get_folder_contents input")?;
        let analysis = self.context.current()?;

        Ok(ToolResult::success(json!({
            "folder": input.folder,
            "content": analysis.folder_contents(&input.folder)
        })))
    }

    async fn search_content(&self, input: Value) -> Result<ToolResult> {
        let input: SearchContentInput =
            serde_json::from_value(input).context("Invalid search_content input")?;

        let query = SearchQuery {
            pattern: input.pattern.clone(),
            case_sensitive: input.case_sensitive.unwrap_or(false),
            whole_word: input.whole_word.unwrap_or(false),
            is_regex: input.is_regex.unwrap_or(false),
        };
        let handle = self.context.search(query)?;
        let outcome = tokio::task::spawn_blocking(move || handle.wait())
            .await
            .context("Search task panicked")?
            .map_err(RepoCtxError::from)?;

        let limit = input.limit.unwrap_or(20);
        let views = self.context.present(&outcome.results)?;
        let files: Vec<Value> = views
            .iter()
            .take(limit)
            .map(|view| {
                json!({
                    "path": view.path,
                    "match_count": view.match_count,
                    "context": view.render()
                })
            })
            .collect();

        Ok(ToolResult::success(json!({
            "pattern": input.pattern,
            "summary": outcome.summary(),
            "total_matches": outcome.total_matches,
            "files_with_matches": outcome.files_with_matches,
            "files": files
        })))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub data: Value,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: json!({}),
            error: Some(message),
        }
    }

    pub fn error_with_data(data: Value) -> Self {
        Self {
            success: false,
            data,
            error: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GetStructureInput {
    directories_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct GetFileContentInput {
    file_path: String,
}

#[derive(Debug, Deserialize)]
struct GetFolderContentsInput {
    folder: String,
}

#[derive(Debug, Deserialize)]
struct SearchContentInput {
    pattern: String,
    case_sensitive: Option<bool>,
    whole_word: Option<bool>,
    is_regex: Option<bool>,
    limit: Option<usize>,
}
