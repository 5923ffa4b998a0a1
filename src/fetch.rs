//! Remote repository checkout into a temporary directory.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::FetchSettings;
use crate::error::FetchError;

const CREDENTIAL_HOST: &str = "github.com";
const REDACTED: &str = "***";

/// An access token for private repositories. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Produces a local checkout for a repository URL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    async fn fetch(&self, url: &str, credential: Option<Credential>) -> Result<TempCheckout, FetchError>;
}

/// A temporary checkout directory that is removed when released.
///
/// [`TempCheckout::cleanup`] retries with a fixed backoff; dropping without
/// calling it makes a single best-effort attempt.
#[derive(Debug)]
pub struct TempCheckout {
    path: PathBuf,
    attempts: u32,
    backoff: Duration,
    released: bool,
}

impl TempCheckout {
    pub fn new(path: PathBuf, attempts: u32, backoff: Duration) -> Self {
        Self {
            path,
            attempts,
            backoff,
            released: false,
        }
    }

    /// Take ownership of an existing directory with default retry settings.
    pub fn adopt(path: impl Into<PathBuf>) -> Self {
        let defaults = FetchSettings::default();
        Self::new(path.into(), defaults.cleanup_attempts, defaults.cleanup_backoff())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory. Blocks between retries. Failure is logged and
    /// reported as `false`, never as an error.
    pub fn cleanup(mut self) -> bool {
        self.released = true;
        remove_dir_with_retries(&self.path, self.attempts, self.backoff)
    }
}

impl Drop for TempCheckout {
    fn drop(&mut self) {
        if self.released || !self.path.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!("Failed to remove temporary checkout {}: {}", self.path.display(), e);
        }
    }
}

/// `remove_dir_all` with up to `attempts` tries and `backoff` between them.
/// A missing directory counts as removed.
pub fn remove_dir_with_retries(path: &Path, attempts: u32, backoff: Duration) -> bool {
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match std::fs::remove_dir_all(path) {
            Ok(()) => {
                debug!("Removed {}", path.display());
                return true;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => return true,
            Err(e) => {
                warn!(
                    "Cleanup attempt {}/{} for {} failed: {}",
                    attempt,
                    attempts,
                    path.display(),
                    e
                );
                // Git marks pack files read-only on some platforms.
                clear_readonly(path);
                if attempt < attempts {
                    std::thread::sleep(backoff);
                }
            }
        }
    }
    error!("Giving up on removing {} after {} attempts", path.display(), attempts);
    false
}

#[allow(clippy::permissions_set_readonly_false)]
fn clear_readonly(path: &Path) {
    for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
        if let Ok(metadata) = entry.metadata() {
            let mut permissions = metadata.permissions();
            if permissions.readonly() {
                permissions.set_readonly(false);
                let _ = std::fs::set_permissions(entry.path(), permissions);
            }
        }
    }
}

/// Clones with the `git` command line into the system temp directory.
pub struct GitFetcher {
    git_binary: String,
    shallow: bool,
    cleanup_attempts: u32,
    cleanup_backoff: Duration,
    span: Span,
}

impl GitFetcher {
    pub fn new(settings: &FetchSettings) -> Self {
        Self {
            git_binary: settings.git_binary.clone(),
            shallow: settings.shallow,
            cleanup_attempts: settings.cleanup_attempts,
            cleanup_backoff: settings.cleanup_backoff(),
            span: info_span!("git_fetcher"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    async fn clone_into(
        &self,
        url: &str,
        credential: Option<Credential>,
    ) -> Result<TempCheckout, FetchError> {
        validate_url(url)?;

        let target = std::env::temp_dir().join(format!("repoctx-{}", Uuid::new_v4()));
        let checkout = TempCheckout::new(target.clone(), self.cleanup_attempts, self.cleanup_backoff);
        let remote = match &credential {
            Some(credential) => embed_credential(url, credential),
            None => url.to_string(),
        };

        info!("Cloning {} into {}", redact_url(url), target.display());
        let mut command = Command::new(&self.git_binary);
        command.arg("clone");
        if self.shallow {
            command.args(["--depth", "1"]);
        }
        command
            .arg("--")
            .arg(&remote)
            .arg(&target)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = command.output().await?;
        if !output.status.success() {
            let mut message = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if let Some(credential) = &credential {
                message = message.replace(credential.secret(), REDACTED);
            }
            if message.is_empty() {
                message = output.status.to_string();
            }
            error!("git clone failed: {}", message);
            let _ = tokio::task::spawn_blocking(move || checkout.cleanup()).await;
            return Err(FetchError::Clone {
                url: redact_url(url),
                message,
            });
        }

        info!("Clone of {} complete", redact_url(url));
        Ok(checkout)
    }
}

#[async_trait]
impl RepositoryFetcher for GitFetcher {
    async fn fetch(&self, url: &str, credential: Option<Credential>) -> Result<TempCheckout, FetchError> {
        let span = self.span.clone();
        self.clone_into(url, credential).instrument(span).await
    }
}

fn validate_url(url: &str) -> Result<(), FetchError> {
    let trimmed = url.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') || trimmed.chars().any(char::is_whitespace) {
        return Err(FetchError::InvalidUrl(url.to_string()));
    }
    Ok(())
}

/// Put `credential` into an `https://github.com/...` URL as userinfo.
/// Other hosts and schemes are returned unchanged.
pub fn embed_credential(url: &str, credential: &Credential) -> String {
    let Some(rest) = url.strip_prefix("https://") else {
        return url.to_string();
    };
    let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
    let host = authority.rsplit_once('@').map(|(_, h)| h).unwrap_or(authority);
    if !host.eq_ignore_ascii_case(CREDENTIAL_HOST) {
        return url.to_string();
    }
    format!("https://{}@{}/{}", credential.secret(), host, path)
}

/// Replace any userinfo in `url` with `***`.
pub fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let (authority, path) = match rest.split_once('/') {
        Some((authority, path)) => (authority, Some(path)),
        None => (rest, None),
    };
    let Some((_, host)) = authority.rsplit_once('@') else {
        return url.to_string();
    };
    match path {
        Some(path) => format!("{}://{}@{}/{}", scheme, REDACTED, host, path),
        None => format!("{}://{}@{}", scheme, REDACTED, host),
    }
}
