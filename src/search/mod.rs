//! Parallel search over an aggregated content map.
//!
//! The corpus is split into contiguous chunks, each scanned by a worker on
//! a fixed rayon pool. Workers only send messages; a single accumulator
//! thread owns progress and result merging and publishes [`SearchEvent`]s
//! to the caller's [`SearchHandle`].

mod coordinator;
mod partition;
mod pattern;
mod worker;

pub use coordinator::{
    SearchCoordinator, SearchEvent, SearchHandle, SearchOutcome, SearchSession, SessionStatus,
};
pub use partition::{partition, worker_count};
pub use pattern::compile;
pub use worker::find_matches;
