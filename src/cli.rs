use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::{
    cli_types::{FilterArgs, PackArgs, SearchArgs, SourceArgs, StructureArgs},
    config::{AppConfig, OutputFormat},
    context::{Analysis, RepoContext, RepoContextBuilder},
    fetch::Credential,
    search::{SearchEvent, SearchOutcome},
    types::SearchQuery,
};

const PROGRESS_STEPS: u64 = 1000;

pub struct CliApp {
    config: AppConfig,
    verbose: bool,
}

impl CliApp {
    pub fn new(config: AppConfig, verbose: bool, colors_enabled: bool) -> Self {
        info!("Initializing repoctx CLI");
        colored::control::set_override(colors_enabled);
        Self { config, verbose }
    }

    pub async fn structure(&self, args: StructureArgs) -> Result<()> {
        let analysis = self.analyze_structure(&args).await?;

        match self.config.output.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&json!({
                    "entries": analysis.entries(),
                    "pruned": analysis.scan.pruned,
                }))
                .context("Failed to serialize structure")?;
                println!("{}", json);
            }
            OutputFormat::Text => println!("{}", analysis.scan.render(args.dirs_only)),
        }
        Ok(())
    }

    pub async fn pack(&self, args: PackArgs) -> Result<()> {
        let start_time = Instant::now();
        let context = self.build_context(&args.filter, args.structure_only, None)?;
        let analysis = self.analyze(&context, &args.source).await?;

        let text = if !args.files.is_empty() {
            analysis.select_files(&args.files)
        } else if let Some(folder) = &args.folder {
            analysis.folder_contents(folder)
        } else {
            match self.config.output.format {
                OutputFormat::Json => serde_json::to_string_pretty(&json!({
                    "structure": analysis.structure,
                    "document": analysis.document(),
                    "index": analysis.aggregation.index.entries(),
                    "stats": analysis.aggregation.stats,
                }))
                .context("Failed to serialize packed output")?,
                OutputFormat::Text => analysis.full_output(),
            }
        };

        match &args.output {
            Some(path) => {
                tokio::fs::write(path, &text)
                    .await
                    .with_context(|| format!("Failed to write output to {}", path.display()))?;
                self.print_success(&format!("Wrote {} bytes to {}", text.len(), path.display()));
            }
            None => println!("{}", text),
        }

        if self.verbose {
            let stats = &analysis.aggregation.stats;
            self.print_info(&format!(
                "{} files, {} bytes ({} binary skipped, {} unreadable, {} notebooks failed) in {:?}",
                stats.files_included,
                stats.content_bytes,
                stats.skipped_binary,
                stats.skipped_read_errors,
                stats.skipped_conversion,
                start_time.elapsed()
            ));
        }
        Ok(())
    }

    pub async fn search(&self, args: SearchArgs) -> Result<()> {
        let context = Arc::new(self.build_context(&args.filter, false, Some(&args))?);
        self.analyze(&context, &args.source).await?;

        let query = SearchQuery {
            pattern: args.pattern.clone(),
            case_sensitive: args.case_sensitive,
            whole_word: args.whole_word,
            is_regex: args.regex,
        };
        let start_time = Instant::now();
        let handle = context.search(query).context("Search could not start")?;

        let progress = ProgressBar::new(PROGRESS_STEPS);
        progress.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {percent}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        progress.set_message(format!("searching for {:?}", args.pattern));

        let bar = progress.clone();
        let outcome = tokio::task::spawn_blocking(move || -> Result<SearchOutcome> {
            for event in handle.events().iter() {
                match event {
                    SearchEvent::Progress(fraction) => {
                        bar.set_position((fraction * PROGRESS_STEPS as f64) as u64)
                    }
                    SearchEvent::Completed(outcome) => return Ok(outcome),
                    SearchEvent::Failed(err) => return Err(err.into()),
                    SearchEvent::Cancelled => anyhow::bail!("search was cancelled"),
                    _ => {}
                }
            }
            anyhow::bail!("search ended without a result")
        })
        .await
        .context("Search task panicked")?;
        progress.finish_and_clear();
        let outcome = outcome?;

        let views = context.present(&outcome.results)?;
        match self.config.output.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&json!({
                    "summary": outcome.summary(),
                    "total_matches": outcome.total_matches,
                    "files": views.iter().take(args.limit).collect::<Vec<_>>(),
                }))
                .context("Failed to serialize search results")?;
                println!("{}", json);
            }
            OutputFormat::Text => {
                for view in views.iter().take(args.limit) {
                    println!("{}", format!("--{}--", view.path).bold().magenta());
                    println!("{}\n", view.body());
                }
                if views.len() > args.limit {
                    self.print_info(&format!("... {} more files not shown", views.len() - args.limit));
                }
                if outcome.total_matches == 0 {
                    self.print_warning(&outcome.summary());
                } else {
                    self.print_success(&outcome.summary());
                }
            }
        }

        if self.verbose {
            self.print_info(&format!("Search completed in {:?}", start_time.elapsed()));
        }
        Ok(())
    }

    pub fn show_config(&self) -> Result<()> {
        let text = match self.config.output.format {
            OutputFormat::Json => serde_json::to_string_pretty(&self.config)
                .context("Failed to serialize configuration")?,
            OutputFormat::Text => self
                .config
                .to_toml()
                .context("Failed to serialize configuration")?,
        };
        println!("{}", text);

        if let Some(path) = AppConfig::user_config_path() {
            self.print_info(&format!("User config file: {}", path.display()));
        }
        Ok(())
    }

    fn build_context(
        &self,
        filter: &FilterArgs,
        structure_only: bool,
        search: Option<&SearchArgs>,
    ) -> Result<RepoContext> {
        let mut filter_config = filter.apply(self.config.filter.clone());
        filter_config.structure_only |= structure_only;

        let mut search_settings = self.config.search.clone();
        if let Some(args) = search {
            if let Some(lines) = args.context {
                search_settings.context_lines = lines;
            }
            search_settings.sort_results |= args.sort;
        }

        RepoContextBuilder::from_config(&self.config)
            .filter(filter_config)
            .search_settings(search_settings)
            .build()
            .context("Invalid filter configuration")
    }

    /// The tree only; file contents are never read.
    async fn analyze_structure(&self, args: &StructureArgs) -> Result<Arc<Analysis>> {
        let context = self.build_context(&args.filter, true, None)?;
        self.analyze(&context, &args.source).await
    }

    async fn analyze(&self, context: &RepoContext, source: &SourceArgs) -> Result<Arc<Analysis>> {
        let spinner = ProgressBar::new_spinner();
        spinner.enable_steady_tick(Duration::from_millis(100));

        let analysis = match &source.repo {
            Some(url) => {
                spinner.set_message(format!("Cloning {}", url));
                let credential = source.token.clone().map(Credential::new);
                context
                    .analyze_remote(url, credential)
                    .await
                    .with_context(|| format!("Failed to analyze repository {}", url))
            }
            None => {
                spinner.set_message(format!("Scanning {}", source.path.display()));
                context
                    .analyze_local(&source.path)
                    .await
                    .with_context(|| format!("Failed to analyze directory {}", source.path.display()))
            }
        };
        spinner.finish_and_clear();
        let analysis = analysis?;

        if self.verbose {
            self.print_info(&format!(
                "Analyzed {} entries, {} files with content",
                analysis.entries().len(),
                analysis.aggregation.stats.files_included
            ));
        }
        Ok(analysis)
    }

    // Status lines go to stderr so stdout stays pipeable.
    fn print_success(&self, message: &str) {
        eprintln!("{} {}", "✓".green().bold(), message);
    }

    fn print_info(&self, message: &str) {
        eprintln!("{} {}", "ℹ".blue().bold(), message);
    }

    fn print_warning(&self, message: &str) {
        eprintln!("{} {}", "⚠".yellow().bold(), message.yellow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {\n    run();\n}\n").unwrap();
        fs::write(dir.path().join("src/run.rs"), "pub fn run() {}\n").unwrap();
        fs::write(dir.path().join("LICENSE"), "MIT").unwrap();
        dir
    }

    fn source(path: PathBuf) -> SourceArgs {
        SourceArgs {
            path,
            ..SourceArgs::default()
        }
    }

    fn app() -> CliApp {
        CliApp::new(AppConfig::default(), false, false)
    }

    #[tokio::test]
    async fn test_pack_writes_output_file() {
        let repo = create_test_repo();
        let out_dir = TempDir::new().unwrap();
        let output = out_dir.path().join("packed.txt");

        let args = PackArgs {
            source: source(repo.path().to_path_buf()),
            filter: FilterArgs::default(),
            output: Some(output.clone()),
            structure_only: false,
            files: Vec::new(),
            folder: None,
        };
        app().pack(args).await.unwrap();

        let text = fs::read_to_string(&output).unwrap();
        assert!(text.starts_with("Folder structure:\n/\n"));
        assert!(text.contains("\n---src/---\n\n--main.rs--\nfn main()"));
        assert!(!text.contains("LICENSE"));
    }

    #[tokio::test]
    async fn test_pack_selected_files() {
        let repo = create_test_repo();
        let out_dir = TempDir::new().unwrap();
        let output = out_dir.path().join("selected.txt");

        let args = PackArgs {
            source: source(repo.path().to_path_buf()),
            filter: FilterArgs::default(),
            output: Some(output.clone()),
            structure_only: false,
            files: vec!["src/run.rs".to_string()],
            folder: None,
        };
        app().pack(args).await.unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "--run.rs--\npub fn run() {}\n");
    }

    #[tokio::test]
    async fn test_search_command() {
        let repo = create_test_repo();
        let args = SearchArgs {
            pattern: "run".to_string(),
            source: source(repo.path().to_path_buf()),
            filter: FilterArgs::default(),
            case_sensitive: false,
            whole_word: true,
            regex: false,
            limit: 10,
            context: Some(1),
            sort: true,
        };
        assert!(app().search(args).await.is_ok());
    }

    #[tokio::test]
    async fn test_search_invalid_regex_fails() {
        let repo = create_test_repo();
        let args = SearchArgs {
            pattern: "(".to_string(),
            source: source(repo.path().to_path_buf()),
            filter: FilterArgs::default(),
            case_sensitive: false,
            whole_word: false,
            regex: true,
            limit: 10,
            context: None,
            sort: false,
        };
        assert!(app().search(args).await.is_err());
    }

    #[tokio::test]
    async fn test_structure_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let args = StructureArgs {
            source: source(dir.path().join("missing")),
            filter: FilterArgs::default(),
            dirs_only: false,
        };
        assert!(app().structure(args).await.is_err());
    }

    #[tokio::test]
    async fn test_structure_reads_no_content() {
        let repo = create_test_repo();
        let args = StructureArgs {
            source: source(repo.path().to_path_buf()),
            filter: FilterArgs::default(),
            dirs_only: false,
        };
        let analysis = app().analyze_structure(&args).await.unwrap();
        assert!(analysis.structure_only);
        assert_eq!(analysis.file_content("src/main.rs"), Some(""));
        assert!(app().structure(args).await.is_ok());
    }

    #[test]
    fn test_config_display() {
        assert!(app().show_config().is_ok());
    }

    #[test]
    fn test_invalid_glob_is_rejected() {
        let filter = FilterArgs {
            exclude_folders: vec!["src/[".to_string()],
            ..FilterArgs::default()
        };
        assert!(app().build_context(&filter, false, None).is_err());
    }
}
