//! Pack a repository into a filtered directory tree and one offset-indexed
//! text document, then search that document in parallel.
//!
//! ```no_run
//! use repoctx::{RepoContext, SearchQuery};
//!
//! # async fn demo() -> repoctx::Result<()> {
//! let context = RepoContext::builder().build()?;
//! let analysis = context.analyze_local("./my-project").await?;
//! println!("{}", analysis.full_output());
//!
//! let outcome = context.search(SearchQuery::literal("TODO"))?.wait()?;
//! println!("{}", outcome.summary());
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "cli")]
pub mod cli_types;
pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod logging;
pub mod notebook;
pub mod presenter;
pub mod scanner;
pub mod search;
pub mod tools;
pub mod types;

pub use aggregator::{Aggregation, AggregatedDocument, ContentAggregator, ContentIndex, IndexEntry, PathContentMap};
pub use config::{AppConfig, FetchSettings, FilterConfig, OutputFormat, SearchSettings};
pub use context::{Analysis, RepoContext, RepoContextBuilder, RepoSource};
pub use error::{ConfigError, FetchError, PatternError, RepoCtxError, Result, SearchError};
pub use fetch::{Credential, GitFetcher, RepositoryFetcher, TempCheckout};
pub use filter::{Decision, ExclusionReason, PathFilter};
pub use notebook::{IpynbConverter, NotebookConverter};
pub use presenter::{ContextWindow, FileView, ResultPresenter};
pub use scanner::{ScanResult, TreeScanner};
pub use search::{SearchCoordinator, SearchEvent, SearchHandle, SearchOutcome, SearchSession, SessionStatus};
pub use tools::{RepoTools, ToolResult, ToolSchema};
pub use types::{Direction, EntryKind, FileMatches, Match, NavigationPosition, ScanEntry, SearchQuery};

#[cfg(feature = "cli")]
pub use cli::CliApp;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
