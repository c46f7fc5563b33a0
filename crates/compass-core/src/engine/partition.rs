use super::error::EngineError;
use std::ops::Range;

/// A half-open slice `[start, stop)` of an index domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobChunk {
    pub start: usize,
    pub stop: usize,
}

impl JobChunk {
    pub fn len(&self) -> usize {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.stop
    }
}

/// Splits `0..total` into exactly `workers` contiguous chunks of at most
/// `ceil(total / workers)` items each.
///
/// When there are fewer items than workers the trailing chunks are empty.
pub fn partition(total: usize, workers: usize) -> Result<Vec<JobChunk>, EngineError> {
    if workers == 0 {
        return Err(EngineError::InvalidWorkerCount(workers));
    }
    let chunk_size = total.div_ceil(workers);
    Ok((0..workers)
        .map(|i| JobChunk {
            start: (i * chunk_size).min(total),
            stop: ((i + 1) * chunk_size).min(total),
        })
        .collect())
}
