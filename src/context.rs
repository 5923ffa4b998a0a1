//! The public entry point: analyze a local or remote repository, then
//! export, search and navigate it.

use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument, Span};

use crate::aggregator::{normalize_path, Aggregation, ContentAggregator};
use crate::config::{AppConfig, FetchSettings, FilterConfig, SearchSettings};
use crate::error::{RepoCtxError, Result};
use crate::fetch::{Credential, GitFetcher, RepositoryFetcher};
use crate::notebook::NotebookConverter;
use crate::presenter::{FileView, ResultPresenter};
use crate::scanner::{ScanResult, TreeScanner};
use crate::search::{SearchCoordinator, SearchHandle};
use crate::types::{Direction, FileMatches, NavigationPosition, ScanEntry, SearchQuery};

/// Where an analyzed tree came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoSource {
    Local(PathBuf),
    Remote(String),
}

/// One aggregation run: the structure listing plus the document, index and
/// content map built from the same walk.
#[derive(Debug)]
pub struct Analysis {
    pub source: RepoSource,
    pub scan: ScanResult,
    pub structure: String,
    pub aggregation: Aggregation,
    pub structure_only: bool,
}

impl Analysis {
    pub fn entries(&self) -> &[ScanEntry] {
        &self.scan.entries
    }

    pub fn document(&self) -> &str {
        self.aggregation.document.as_str()
    }

    /// Structure listing followed by the concatenated document. Index offsets
    /// refer to [`Analysis::document`], not to this text.
    pub fn full_output(&self) -> String {
        let mut output = format!("Folder structure:\n{}\n", self.structure);
        if !self.structure_only {
            output.push_str("\nConcatenated content:\n");
            output.push_str(self.document());
        }
        output
    }

    pub fn file_content(&self, path: &str) -> Option<&str> {
        self.aggregation.contents.get(&normalize_path(path))
    }

    pub fn folder_contents(&self, folder: &str) -> String {
        self.aggregation.folder_contents(folder)
    }

    pub fn select_files<I, S>(&self, paths: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.aggregation.select_files(paths)
    }
}

pub struct RepoContextBuilder {
    filter: FilterConfig,
    search: SearchSettings,
    fetch: FetchSettings,
    fetcher: Option<Arc<dyn RepositoryFetcher>>,
    converter: Option<Arc<dyn NotebookConverter>>,
    span: Option<Span>,
}

impl Default for RepoContextBuilder {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            search: SearchSettings::default(),
            fetch: FetchSettings::default(),
            fetcher: None,
            converter: None,
            span: None,
        }
    }
}

impl RepoContextBuilder {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            filter: config.filter.clone(),
            search: config.search.clone(),
            fetch: config.fetch.clone(),
            ..Self::default()
        }
    }

    pub fn filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }

    pub fn search_settings(mut self, settings: SearchSettings) -> Self {
        self.search = settings;
        self
    }

    pub fn fetch_settings(mut self, settings: FetchSettings) -> Self {
        self.fetch = settings;
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn RepositoryFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn converter(mut self, converter: Arc<dyn NotebookConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Parent span for every component's logging.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> Result<RepoContext> {
        let span = self.span.unwrap_or_else(|| info_span!("repoctx"));
        let child = |name: &'static str| info_span!(parent: &span, "component", component = name);

        let scanner = TreeScanner::new(&self.filter)?.with_span(child("scanner"));
        let mut aggregator = ContentAggregator::from_scanner(scanner).with_span(child("aggregator"));
        if let Some(converter) = self.converter {
            aggregator = aggregator.with_converter(converter);
        }

        let fetcher = self.fetcher.unwrap_or_else(|| {
            Arc::new(GitFetcher::new(&self.fetch).with_span(child("fetcher")))
        });
        let coordinator = SearchCoordinator::new(&self.search)?.with_span(child("search"));
        let presenter = ResultPresenter::new(self.search.context_lines).with_span(child("presenter"));

        Ok(RepoContext {
            structure_only: self.filter.structure_only,
            default_token: self.fetch.token.map(Credential::new),
            aggregator: Arc::new(aggregator),
            fetcher,
            coordinator,
            presenter,
            current: RwLock::new(None),
            span,
        })
    }
}

/// Analyzes one repository at a time and serves search over the latest
/// analysis. Re-analyzing replaces the previous result wholesale.
pub struct RepoContext {
    structure_only: bool,
    default_token: Option<Credential>,
    aggregator: Arc<ContentAggregator>,
    fetcher: Arc<dyn RepositoryFetcher>,
    coordinator: SearchCoordinator,
    presenter: ResultPresenter,
    current: RwLock<Option<Arc<Analysis>>>,
    span: Span,
}

impl RepoContext {
    pub fn builder() -> RepoContextBuilder {
        RepoContextBuilder::default()
    }

    pub async fn analyze_local(&self, path: impl AsRef<Path>) -> Result<Arc<Analysis>> {
        let root = path.as_ref().to_path_buf();
        self.analyze_path(root.clone(), RepoSource::Local(root))
            .instrument(self.span.clone())
            .await
    }

    /// Clone `url`, analyze the checkout, then remove it. A fetch failure
    /// aborts before any walk. Without an explicit credential the configured
    /// token, if any, is used.
    pub async fn analyze_remote(
        &self,
        url: &str,
        credential: Option<Credential>,
    ) -> Result<Arc<Analysis>> {
        let span = self.span.clone();
        async move {
            let credential = credential.or_else(|| self.default_token.clone());
            let checkout = self.fetcher.fetch(url, credential).await?;
            let result = self
                .analyze_path(checkout.path().to_path_buf(), RepoSource::Remote(url.to_string()))
                .await;

            if let Err(e) = tokio::task::spawn_blocking(move || checkout.cleanup()).await {
                warn!("Checkout cleanup task failed: {}", e);
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn analyze_path(&self, root: PathBuf, source: RepoSource) -> Result<Arc<Analysis>> {
        let aggregator = Arc::clone(&self.aggregator);
        let read_content = !self.structure_only;

        let (scan, aggregation) = tokio::task::spawn_blocking(move || -> Result<_> {
            let scan = aggregator.scanner().scan(&root)?;
            let aggregation = aggregator.aggregate_scanned(&scan, read_content);
            Ok((scan, aggregation))
        })
        .await
        .map_err(|e| RepoCtxError::Task(e.to_string()))??;

        let analysis = Arc::new(Analysis {
            source,
            structure: scan.render(false),
            scan,
            aggregation,
            structure_only: self.structure_only,
        });
        info!(
            "Analysis ready: {} entries, {} files with content",
            analysis.scan.entries.len(),
            analysis.aggregation.stats.files_included
        );

        self.coordinator.clear();
        *self.current.write() = Some(Arc::clone(&analysis));
        Ok(analysis)
    }

    pub fn current(&self) -> Result<Arc<Analysis>> {
        self.current.read().clone().ok_or(RepoCtxError::NotAggregated)
    }

    pub fn is_analyzed(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn search(&self, query: SearchQuery) -> Result<SearchHandle> {
        let analysis = self.current()?;
        Ok(self
            .coordinator
            .search(Arc::clone(&analysis.aggregation.contents), query)?)
    }

    pub fn present(&self, results: &[FileMatches]) -> Result<Vec<FileView>> {
        let analysis = self.current()?;
        Ok(self.presenter.present(results, &analysis.aggregation.contents))
    }

    /// Context view of the file under the navigation cursor.
    pub fn present_current(&self) -> Result<Option<FileView>> {
        let analysis = self.current()?;
        let Some(session) = self.coordinator.session() else {
            return Ok(None);
        };
        let Some(file) = session.cursor.and_then(|c| session.partial_results.get(c)) else {
            return Ok(None);
        };
        let content = analysis
            .aggregation
            .contents
            .get(&file.path)
            .ok_or_else(|| RepoCtxError::UnknownPath(file.path.clone()))?;
        Ok(Some(self.presenter.present_file(file, content)))
    }

    pub fn navigate(&self, direction: Direction) -> Option<NavigationPosition> {
        self.coordinator.navigate(direction)
    }

    pub fn clear_search(&self) {
        self.coordinator.clear();
    }

    pub fn coordinator(&self) -> &SearchCoordinator {
        &self.coordinator
    }

    pub fn presenter(&self) -> &ResultPresenter {
        &self.presenter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::fetch::{MockRepositoryFetcher, TempCheckout};
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn sample_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/file1.py", "hello");
        write(dir.path(), "b/file2.md", "world");
        dir
    }

    #[tokio::test]
    async fn test_analyze_local_full_output() {
        let dir = sample_tree();
        let context = RepoContext::builder().build().unwrap();
        let analysis = context.analyze_local(dir.path()).await.unwrap();

        assert_eq!(
            analysis.structure,
            "/\n├── a/\n│   ├── file1.py\n├── b/\n│   ├── file2.md"
        );
        let output = analysis.full_output();
        assert!(output.starts_with("Folder structure:\n/\n"));
        assert!(output.ends_with(
            "\nConcatenated content:\n\n---a/---\n\n--file1.py--\nhello\n---b/---\n\n--file2.md--\nworld"
        ));
        assert_eq!(analysis.file_content("./a/file1.py"), Some("hello"));
        assert_eq!(analysis.source, RepoSource::Local(dir.path().to_path_buf()));
    }

    #[tokio::test]
    async fn test_structure_only_output() {
        let dir = sample_tree();
        let context = RepoContext::builder()
            .filter(FilterConfig::builder().structure_only(true).build())
            .build()
            .unwrap();
        let analysis = context.analyze_local(dir.path()).await.unwrap();

        assert!(!analysis.full_output().contains("Concatenated content"));
        assert!(analysis.document().is_empty());
        assert_eq!(analysis.aggregation.contents.len(), 2);
    }

    #[tokio::test]
    async fn test_search_before_analysis_fails() {
        let context = RepoContext::builder().build().unwrap();
        let err = context.search(SearchQuery::literal("x")).err().unwrap();
        assert!(matches!(err, RepoCtxError::NotAggregated));
    }

    #[tokio::test]
    async fn test_search_and_present() {
        let dir = sample_tree();
        let context = RepoContext::builder().build().unwrap();
        context.analyze_local(dir.path()).await.unwrap();

        let outcome = context
            .search(SearchQuery::literal("hello"))
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(outcome.total_matches, 1);

        let views = context.present(&outcome.results).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].render(), "--a/file1.py--\n1: hello");

        let current = context.present_current().unwrap().unwrap();
        assert_eq!(current.path, "a/file1.py");
        let position = context.navigate(Direction::Next).unwrap();
        assert_eq!(position.to_string(), "File 1 of 1");

        context.clear_search();
        assert!(context.present_current().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_error_aborts_before_walk() {
        let mut fetcher = MockRepositoryFetcher::new();
        fetcher.expect_fetch().times(1).returning(|url, _| {
            Err(FetchError::Clone {
                url: url.to_string(),
                message: "repository not found".to_string(),
            })
        });

        let context = RepoContext::builder()
            .fetcher(Arc::new(fetcher))
            .build()
            .unwrap();
        let err = context
            .analyze_remote("https://github.com/user/missing", None)
            .await
            .unwrap_err();

        assert!(matches!(err, RepoCtxError::Fetch(FetchError::Clone { .. })));
        assert!(!context.is_analyzed());
    }

    #[tokio::test]
    async fn test_remote_checkout_is_removed_after_analysis() {
        let dir = TempDir::new().unwrap();
        let checkout = dir.path().join("checkout");
        write(&checkout, "src/lib.rs", "pub fn answer() -> u32 { 42 }");

        let mut fetcher = MockRepositoryFetcher::new();
        let path = checkout.clone();
        fetcher
            .expect_fetch()
            .withf(|url, credential| {
                url == "https://github.com/user/repo"
                    && credential.as_ref().map(Credential::secret) == Some("from-config")
            })
            .times(1)
            .returning(move |_, _| Ok(TempCheckout::adopt(path.clone())));

        let context = RepoContext::builder()
            .fetch_settings(FetchSettings {
                token: Some("from-config".to_string()),
                ..FetchSettings::default()
            })
            .fetcher(Arc::new(fetcher))
            .build()
            .unwrap();
        let analysis = context
            .analyze_remote("https://github.com/user/repo", None)
            .await
            .unwrap();

        assert_eq!(analysis.file_content("src/lib.rs"), Some("pub fn answer() -> u32 { 42 }"));
        assert_eq!(
            analysis.source,
            RepoSource::Remote("https://github.com/user/repo".to_string())
        );
        assert!(!checkout.exists());
    }

    #[tokio::test]
    async fn test_reanalysis_clears_search_session() {
        let dir = sample_tree();
        let context = RepoContext::builder().build().unwrap();
        context.analyze_local(dir.path()).await.unwrap();
        context
            .search(SearchQuery::literal("world"))
            .unwrap()
            .wait()
            .unwrap();
        assert!(context.coordinator().session().is_some());

        context.analyze_local(dir.path()).await.unwrap();
        assert!(context.coordinator().session().is_none());
    }
}
