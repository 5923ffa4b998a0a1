use crossbeam::channel::Sender;
use regex::Regex;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::aggregator::PathContentMap;
use crate::types::{FileMatches, Match};

/// What a worker reports to the accumulator.
#[derive(Debug)]
pub(crate) enum WorkerMessage {
    Progress {
        chunk: usize,
        fraction: f64,
    },
    Finished {
        chunk: usize,
        results: Vec<FileMatches>,
    },
    Failed {
        chunk: usize,
        message: String,
    },
}

/// Scans one contiguous chunk of the corpus.
pub(crate) struct SearchWorker {
    pub chunk: usize,
    pub range: Range<usize>,
    pub regex: Arc<Regex>,
    pub corpus: Arc<PathContentMap>,
    pub cancel: Arc<AtomicBool>,
    pub tx: Sender<WorkerMessage>,
}

impl SearchWorker {
    pub fn run(self) {
        let chunk = self.chunk;
        match panic::catch_unwind(AssertUnwindSafe(|| self.scan())) {
            Ok(Some(results)) => {
                let _ = self.tx.send(WorkerMessage::Finished { chunk, results });
            }
            // Cancelled: dropping the sender is the signal.
            Ok(None) => {}
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "worker panicked".to_string());
                let _ = self.tx.send(WorkerMessage::Failed { chunk, message });
            }
        }
    }

    fn scan(&self) -> Option<Vec<FileMatches>> {
        let files = self.corpus.entries().get(self.range.clone())?;
        let total = files.len();
        let mut results = Vec::new();

        for (done, (path, content)) in files.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                return None;
            }
            let matches = find_matches(&self.regex, path, content);
            if !matches.is_empty() {
                results.push(FileMatches {
                    path: path.clone(),
                    matches,
                });
            }
            let _ = self.tx.send(WorkerMessage::Progress {
                chunk: self.chunk,
                fraction: (done + 1) as f64 / total as f64,
            });
        }
        Some(results)
    }
}

/// Leftmost, non-overlapping match spans in `content`, empty spans included.
pub fn find_matches(regex: &Regex, path: &str, content: &str) -> Vec<Match> {
    regex
        .find_iter(content)
        .map(|m| Match {
            path: path.to_string(),
            start: m.start(),
            end: m.end(),
        })
        .collect()
}
