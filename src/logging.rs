use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub const LOG_FILE_PREFIX: &str = "repoctx.log";

#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    pub verbose: bool,
    pub json: bool,
    pub log_dir: Option<PathBuf>,
}

/// Keeps the file writer flushing until dropped.
pub struct LoggingGuard {
    _guard: Option<WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

/// `RUST_LOG` wins over the verbosity flag.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "repoctx=info" } else { "repoctx=warn" })
    })
}

/// Install the global subscriber. Logs go to stderr, plus a daily rolling
/// file when `log_dir` is set. Returns `None` if a subscriber already exists.
pub fn init(options: &LoggingOptions) -> Option<LoggingGuard> {
    let stderr_layer = if options.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .boxed()
    };

    let (file_layer, guard) = match &options.log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter(options.verbose))
        .with(stderr_layer)
        .with(file_layer);

    if subscriber.try_init().is_err() {
        return None;
    }

    if let Some(dir) = &options.log_dir {
        tracing::info!(log_dir = %dir.display(), "tracing initialized");
    }

    Some(LoggingGuard {
        _guard: guard,
        log_dir: options.log_dir.clone(),
    })
}
