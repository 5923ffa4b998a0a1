use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Span};

use super::partition::{partition, worker_count};
use super::pattern::compile;
use super::worker::{SearchWorker, WorkerMessage};
use crate::aggregator::PathContentMap;
use crate::config::SearchSettings;
use crate::error::SearchError;
use crate::presenter::step_cursor;
use crate::types::{Direction, FileMatches, NavigationPosition, SearchQuery};

/// Updates published to a search subscriber.
#[derive(Debug, Clone)]
pub enum SearchEvent {
    Started { total_chunks: usize },
    /// Size-weighted mean of per-chunk progress, in `0.0..=1.0`.
    Progress(f64),
    /// Results of one finished chunk.
    Batch {
        chunk: usize,
        results: Vec<FileMatches>,
    },
    Completed(SearchOutcome),
    Failed(SearchError),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<FileMatches>,
    pub total_matches: usize,
    pub files_with_matches: usize,
}

impl SearchOutcome {
    fn new(results: Vec<FileMatches>) -> Self {
        let total_matches = results.iter().map(FileMatches::len).sum();
        let files_with_matches = results.len();
        Self {
            results,
            total_matches,
            files_with_matches,
        }
    }

    pub fn summary(&self) -> String {
        if self.total_matches == 0 {
            "No matches found".to_string()
        } else {
            format!(
                "Found {} matches in {} files",
                self.total_matches, self.files_with_matches
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    Running,
    Completed,
    Failed(SearchError),
}

/// Snapshot of the current search.
#[derive(Debug, Clone)]
pub struct SearchSession {
    pub query: SearchQuery,
    pub total_chunks: usize,
    pub completed_chunks: usize,
    pub progress: f64,
    pub partial_results: Vec<FileMatches>,
    /// Index into `partial_results` of the file being viewed.
    pub cursor: Option<usize>,
    pub status: SessionStatus,
}

impl SearchSession {
    fn new(query: SearchQuery, total_chunks: usize) -> Self {
        Self {
            query,
            total_chunks,
            completed_chunks: 0,
            progress: 0.0,
            partial_results: Vec::new(),
            cursor: None,
            status: SessionStatus::Running,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }
}

#[derive(Default)]
struct SessionState {
    generation: u64,
    in_flight: bool,
    active: Option<SearchSession>,
    cancel: Arc<AtomicBool>,
}

/// Subscription to one submitted search.
#[derive(Debug)]
pub struct SearchHandle {
    generation: u64,
    events: Receiver<SearchEvent>,
}

impl SearchHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn events(&self) -> &Receiver<SearchEvent> {
        &self.events
    }

    /// Block until the search reaches a terminal state.
    pub fn wait(self) -> Result<SearchOutcome, SearchError> {
        for event in self.events.iter() {
            match event {
                SearchEvent::Completed(outcome) => return Ok(outcome),
                SearchEvent::Failed(err) => return Err(err),
                SearchEvent::Cancelled => return Err(SearchError::Cancelled),
                _ => {}
            }
        }
        Err(SearchError::Disconnected)
    }
}

/// Runs searches over a content map on a fixed pool of workers.
///
/// One search may be in flight at a time; a second submission is rejected
/// with [`SearchError::InProgress`]. Worker reports funnel through a single
/// accumulator thread, which is the only writer of the session.
pub struct SearchCoordinator {
    pool: Arc<rayon::ThreadPool>,
    workers: usize,
    sort_results: bool,
    state: Arc<Mutex<SessionState>>,
    span: Span,
}

impl SearchCoordinator {
    pub fn new(settings: &SearchSettings) -> Result<Self, SearchError> {
        let workers = worker_count(settings.min_workers);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("repoctx-search-{}", i))
            .build()
            .map_err(|e| SearchError::WorkerPool(e.to_string()))?;

        Ok(Self {
            pool: Arc::new(pool),
            workers,
            sort_results: settings.sort_results,
            state: Arc::new(Mutex::new(SessionState::default())),
            span: info_span!("search_coordinator"),
        })
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    pub fn is_searching(&self) -> bool {
        self.state.lock().in_flight
    }

    pub fn session(&self) -> Option<SearchSession> {
        self.state.lock().active.clone()
    }

    /// Start a search. The pattern is compiled before any worker starts; a
    /// bad pattern discards the previous session and produces no results.
    pub fn search(
        &self,
        corpus: Arc<PathContentMap>,
        query: SearchQuery,
    ) -> Result<SearchHandle, SearchError> {
        let _guard = self.span.enter();
        let mut state = self.state.lock();

        if state.in_flight {
            warn!("Rejecting search for {:?}: another search is in flight", query.pattern);
            return Err(SearchError::InProgress);
        }

        state.generation += 1;
        let generation = state.generation;

        let regex = match compile(&query) {
            Ok(regex) => Arc::new(regex),
            Err(e) => {
                error!("Search aborted: {}", e);
                state.active = None;
                return Err(e.into());
            }
        };

        let chunks = partition(corpus.len(), self.workers);
        let weights: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        let cancel = Arc::new(AtomicBool::new(false));

        let (event_tx, event_rx) = unbounded();
        let (worker_tx, worker_rx) = unbounded();

        let accumulator = Accumulator {
            generation,
            weights,
            sort_results: self.sort_results,
            corpus: Arc::clone(&corpus),
            state: Arc::clone(&self.state),
            cancel: Arc::clone(&cancel),
            events: event_tx.clone(),
            span: self.span.clone(),
        };
        std::thread::Builder::new()
            .name("repoctx-search-accumulator".to_string())
            .spawn(move || accumulator.run(worker_rx))
            .map_err(|e| SearchError::WorkerPool(e.to_string()))?;

        info!(
            "Searching {} files for {:?} across {} chunks",
            corpus.len(),
            query.pattern,
            chunks.len()
        );
        let _ = event_tx.send(SearchEvent::Started {
            total_chunks: chunks.len(),
        });

        state.active = Some(SearchSession::new(query, chunks.len()));
        state.in_flight = true;
        state.cancel = Arc::clone(&cancel);
        drop(state);

        for (chunk, range) in chunks.into_iter().enumerate() {
            let worker = SearchWorker {
                chunk,
                range,
                regex: Arc::clone(&regex),
                corpus: Arc::clone(&corpus),
                cancel: Arc::clone(&cancel),
                tx: worker_tx.clone(),
            };
            self.pool.spawn(move || worker.run());
        }

        Ok(SearchHandle {
            generation,
            events: event_rx,
        })
    }

    /// Discard the current session. An in-flight search is detached: its
    /// workers stop at the next file and nothing they report is merged.
    pub fn clear(&self) {
        let _guard = self.span.enter();
        let mut state = self.state.lock();
        state.generation += 1;
        state.cancel.store(true, Ordering::Relaxed);
        if state.in_flight {
            info!("Detaching in-flight search");
        }
        state.in_flight = false;
        state.active = None;
    }

    /// Move the cursor over files with matches, wrapping at both ends.
    pub fn navigate(&self, direction: Direction) -> Option<NavigationPosition> {
        let mut state = self.state.lock();
        let session = state.active.as_mut()?;
        let total = session.partial_results.len();
        let index = step_cursor(session.cursor, total, direction)?;
        session.cursor = Some(index);
        Some(NavigationPosition {
            index,
            total,
            path: session.partial_results[index].path.clone(),
        })
    }
}

/// Single accumulation point for one search generation.
struct Accumulator {
    generation: u64,
    weights: Vec<usize>,
    sort_results: bool,
    corpus: Arc<PathContentMap>,
    state: Arc<Mutex<SessionState>>,
    cancel: Arc<AtomicBool>,
    events: Sender<SearchEvent>,
    span: Span,
}

impl Accumulator {
    fn run(self, rx: Receiver<WorkerMessage>) {
        let _guard = self.span.enter();
        let total = self.weights.len();
        let mut fractions = vec![0.0; total];
        let mut finished = vec![false; total];
        let mut finished_count = 0;
        let mut results: Vec<FileMatches> = Vec::new();

        while finished_count < total {
            let message = match rx.recv() {
                Ok(message) => message,
                Err(_) => {
                    if self.cancel.load(Ordering::Relaxed) {
                        self.detach();
                    } else {
                        self.fail(SearchError::Disconnected);
                    }
                    return;
                }
            };

            match message {
                WorkerMessage::Progress { chunk, fraction } => {
                    if let Some(slot) = fractions.get_mut(chunk) {
                        *slot = fraction;
                    }
                    let progress = self.progress(&fractions);
                    if !self.update(|session| session.progress = progress) {
                        return self.detach();
                    }
                    let _ = self.events.send(SearchEvent::Progress(progress));
                }
                WorkerMessage::Finished { chunk, results: batch } => {
                    if chunk >= total || finished[chunk] {
                        continue;
                    }
                    finished[chunk] = true;
                    finished_count += 1;
                    fractions[chunk] = 1.0;
                    let progress = self.progress(&fractions);
                    debug!("Chunk {} finished with {} files matched", chunk, batch.len());

                    let merged = self.update(|session| {
                        session.completed_chunks += 1;
                        session.progress = progress;
                        session.partial_results.extend(batch.iter().cloned());
                    });
                    if !merged {
                        return self.detach();
                    }
                    results.extend(batch.iter().cloned());
                    let _ = self.events.send(SearchEvent::Batch {
                        chunk,
                        results: batch,
                    });
                    let _ = self.events.send(SearchEvent::Progress(progress));
                }
                WorkerMessage::Failed { chunk, message } => {
                    self.cancel.store(true, Ordering::Relaxed);
                    return self.fail(SearchError::WorkerFailed { chunk, message });
                }
            }
        }

        if self.sort_results {
            results.sort_by_key(|r| self.corpus.position(&r.path).unwrap_or(usize::MAX));
        }
        let outcome = SearchOutcome::new(results);

        let mut state = self.state.lock();
        if state.generation != self.generation {
            drop(state);
            return self.detach();
        }
        state.in_flight = false;
        if let Some(session) = state.active.as_mut() {
            session.partial_results = outcome.results.clone();
            session.progress = 1.0;
            session.status = SessionStatus::Completed;
            if !session.partial_results.is_empty() {
                session.cursor = Some(0);
            }
        }
        drop(state);

        info!("{}", outcome.summary());
        let _ = self.events.send(SearchEvent::Completed(outcome));
    }

    fn progress(&self, fractions: &[f64]) -> f64 {
        let total: usize = self.weights.iter().sum();
        if total == 0 {
            return 1.0;
        }
        let done: f64 = fractions
            .iter()
            .zip(&self.weights)
            .map(|(f, &w)| f * w as f64)
            .sum();
        done / total as f64
    }

    /// Apply `f` to the session if this generation still owns it.
    fn update(&self, f: impl FnOnce(&mut SearchSession)) -> bool {
        let mut state = self.state.lock();
        if state.generation != self.generation {
            return false;
        }
        if let Some(session) = state.active.as_mut() {
            f(session);
        }
        true
    }

    fn fail(&self, err: SearchError) {
        error!("Search failed: {}", err);
        let mut state = self.state.lock();
        if state.generation == self.generation {
            state.in_flight = false;
            if let Some(session) = state.active.as_mut() {
                session.status = SessionStatus::Failed(err.clone());
            }
        }
        drop(state);
        let _ = self.events.send(SearchEvent::Failed(err));
    }

    fn detach(&self) {
        debug!("Discarding results of superseded search generation {}", self.generation);
        let _ = self.events.send(SearchEvent::Cancelled);
    }
}
