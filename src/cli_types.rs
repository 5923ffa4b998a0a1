use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{FilterConfig, OutputFormat};

#[derive(Parser, Debug)]
#[command(name = "repoctx")]
#[command(about = "Pack a repository into one indexed text document and search it", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to ./repoctx.toml when present)
    #[arg(short, long, global = true, env = "REPOCTX_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub no_color: bool,

    #[arg(long, value_enum, global = true)]
    pub format: Option<FormatArg>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true, env = "REPOCTX_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the filtered directory tree
    Structure(StructureArgs),
    /// Write the structure and concatenated content
    Pack(PackArgs),
    /// Search file contents in parallel
    Search(SearchArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Json => OutputFormat::Json,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Local directory to analyze
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Clone and analyze a remote repository instead of a local path
    #[arg(long, conflicts_with = "path")]
    pub repo: Option<String>,

    /// Access token for private GitHub repositories
    #[arg(long, env = "REPOCTX_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only include files ending with one of these suffixes (e.g. .rs,.toml)
    #[arg(long = "include", value_delimiter = ',')]
    pub include_extensions: Vec<String>,

    /// Exclude files ending with one of these suffixes
    #[arg(long = "exclude-ext", value_delimiter = ',')]
    pub exclude_extensions: Vec<String>,

    /// Exclude folders matching these globs (e.g. **/node_modules)
    #[arg(long = "exclude-folder", value_delimiter = ',')]
    pub exclude_folders: Vec<String>,

    #[arg(long)]
    pub include_git: bool,

    #[arg(long)]
    pub include_license: bool,

    #[arg(long)]
    pub exclude_readme: bool,
}

impl FilterArgs {
    /// Layer the flags over a loaded configuration.
    pub fn apply(&self, mut config: FilterConfig) -> FilterConfig {
        if !self.include_extensions.is_empty() {
            config.include_extensions = self.include_extensions.clone();
        }
        if !self.exclude_extensions.is_empty() {
            config.exclude_extensions = self.exclude_extensions.clone();
        }
        config.exclude_folders.extend(self.exclude_folders.iter().cloned());
        if self.include_git {
            config.ignore_git = false;
        }
        if self.include_license {
            config.exclude_license = false;
        }
        if self.exclude_readme {
            config.exclude_readme = true;
        }
        config
    }
}

#[derive(Args, Debug, Clone)]
pub struct StructureArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    #[arg(long)]
    pub dirs_only: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PackArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Skip reading file contents
    #[arg(long)]
    pub structure_only: bool,

    /// Export only these files (relative paths)
    #[arg(long, value_delimiter = ',', conflicts_with = "folder")]
    pub files: Vec<String>,

    /// Export only the files directly inside this folder
    #[arg(long)]
    pub folder: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    pub pattern: String,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub filter: FilterArgs,

    #[arg(long)]
    pub case_sensitive: bool,

    #[arg(short, long)]
    pub whole_word: bool,

    #[arg(short, long)]
    pub regex: bool,

    /// Maximum number of files to print
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Lines of context around each match
    #[arg(short = 'C', long)]
    pub context: Option<usize>,

    /// Order results by traversal order instead of completion order
    #[arg(long)]
    pub sort: bool,
}
