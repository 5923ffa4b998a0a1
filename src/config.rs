use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const PROJECT_CONFIG_FILE: &str = "repoctx.toml";
pub const ENV_PREFIX: &str = "REPOCTX";

/// Which paths enter the structure listing and the aggregated document.
///
/// Immutable for the duration of an aggregation run; build a new one to change
/// any field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Filename suffixes a file must end with (any of) to be included.
    pub include_extensions: Vec<String>,
    /// Filename suffixes that exclude a file.
    pub exclude_extensions: Vec<String>,
    /// Globs matched against relative paths; matching directories are pruned.
    pub exclude_folders: Vec<String>,
    pub ignore_git: bool,
    pub exclude_license: bool,
    pub exclude_readme: bool,
    /// Skip reading file content; only the structure is produced.
    pub structure_only: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            include_extensions: Vec::new(),
            exclude_extensions: Vec::new(),
            exclude_folders: Vec::new(),
            ignore_git: true,
            exclude_license: true,
            exclude_readme: false,
            structure_only: false,
        }
    }
}

impl FilterConfig {
    pub fn builder() -> FilterConfigBuilder {
        FilterConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct FilterConfigBuilder {
    config: FilterConfig,
}

impl FilterConfigBuilder {
    pub fn include_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.include_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.exclude_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude_folders<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.exclude_folders = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn ignore_git(mut self, value: bool) -> Self {
        self.config.ignore_git = value;
        self
    }

    pub fn exclude_license(mut self, value: bool) -> Self {
        self.config.exclude_license = value;
        self
    }

    pub fn exclude_readme(mut self, value: bool) -> Self {
        self.config.exclude_readme = value;
        self
    }

    pub fn structure_only(mut self, value: bool) -> Self {
        self.config.structure_only = value;
        self
    }

    pub fn build(self) -> FilterConfig {
        self.config
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Lower bound on the worker count; the actual count is
    /// `max(min_workers, available processors)`.
    pub min_workers: usize,
    /// Lines of context shown above and below each match.
    pub context_lines: usize,
    /// Re-sort merged results into traversal order once a search completes.
    pub sort_results: bool,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            min_workers: 4,
            context_lines: 3,
            sort_results: false,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub git_binary: String,
    pub shallow: bool,
    pub cleanup_attempts: u32,
    pub cleanup_backoff_ms: u64,
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            git_binary: "git".to_string(),
            shallow: true,
            cleanup_attempts: 3,
            cleanup_backoff_ms: 1000,
            token: None,
        }
    }
}

impl FetchSettings {
    pub fn cleanup_backoff(&self) -> Duration {
        Duration::from_millis(self.cleanup_backoff_ms)
    }
}

impl std::fmt::Debug for FetchSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchSettings")
            .field("git_binary", &self.git_binary)
            .field("shallow", &self.shallow)
            .field("cleanup_attempts", &self.cleanup_attempts)
            .field("cleanup_backoff_ms", &self.cleanup_backoff_ms)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub colors: bool,
    pub format: OutputFormat,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            colors: true,
            format: OutputFormat::Text,
        }
    }
}

/// Layered application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub filter: FilterConfig,
    pub search: SearchSettings,
    pub fetch: FetchSettings,
    pub output: OutputSettings,
}

impl AppConfig {
    /// Load defaults, then the user config file, then `./repoctx.toml`
    /// (or `explicit` when given), then `REPOCTX_*` environment variables.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(user_file) = Self::user_config_path() {
            builder = builder.add_source(config::File::from(user_file).required(false));
        }

        builder = match explicit {
            Some(path) => builder.add_source(config::File::from(path.to_path_buf()).required(true)),
            None => builder.add_source(config::File::with_name(PROJECT_CONFIG_FILE).required(false)),
        };

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Render in the same format `repoctx.toml` is read from.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn user_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "repoctx")
            .map(|dirs| dirs.config_dir().join(PROJECT_CONFIG_FILE))
    }
}
