use std::ops::Range;

/// `max(min_workers, available processors)`, never zero.
pub fn worker_count(min_workers: usize) -> usize {
    min_workers.max(num_cpus::get()).max(1)
}

/// Split `len` items into at most `workers` contiguous chunks of
/// `ceil(len / workers)` items. The last chunk may be shorter.
pub fn partition(len: usize, workers: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let chunk_size = len.div_ceil(workers.max(1));
    (0..len)
        .step_by(chunk_size)
        .map(|start| start..(start + chunk_size).min(len))
        .collect()
}
