use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RepoCtxError>;

#[derive(Debug, Error)]
pub enum RepoCtxError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("search failed: {0}")]
    Search(#[from] SearchError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no repository has been analyzed yet")]
    NotAggregated,

    #[error("path not found in aggregated content: {0}")]
    UnknownPath(String),

    #[error("background task failed: {0}")]
    Task(String),
}

/// Remote clone/transport failures. Always terminal for the pipeline.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid repository URL: {0}")]
    InvalidUrl(String),

    #[error("failed to clone {url}: {message}")]
    Clone { url: String, message: String },

    #[error("I/O error while fetching: {0}")]
    Io(#[from] std::io::Error),

    #[error("fetch was cancelled")]
    Cancelled,
}

/// Malformed search expressions. Raised before any worker starts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("search pattern is empty")]
    Empty,

    #[error("invalid pattern `{pattern}`: {message}")]
    Invalid { pattern: String, message: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("a search is already in progress")]
    InProgress,

    #[error("search worker for chunk {chunk} failed: {message}")]
    WorkerFailed { chunk: usize, message: String },

    #[error("search workers disconnected before finishing")]
    Disconnected,

    #[error("search was cleared before it finished")]
    Cancelled,

    #[error("failed to start search workers: {0}")]
    WorkerPool(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid exclude-folder glob `{pattern}`: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error(transparent)]
    Load(#[from] config::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_error_converts_into_search_error() {
        let err: SearchError = PatternError::Empty.into();
        assert_eq!(err, SearchError::Pattern(PatternError::Empty));
        assert_eq!(err.to_string(), "search pattern is empty");
    }

    #[test]
    fn test_fetch_error_message_includes_url() {
        let err = RepoCtxError::from(FetchError::Clone {
            url: "https://github.com/user/repo".to_string(),
            message: "exit status 128".to_string(),
        });
        let text = err.to_string();
        assert!(text.contains("https://github.com/user/repo"));
        assert!(text.contains("exit status 128"));
    }
}
