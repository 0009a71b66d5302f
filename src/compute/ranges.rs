//! Row partitioning for parallel evaluation.

use serde::{Deserialize, Serialize};

use super::{ComputeError, ComputeResult};

/// A contiguous range of row indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: usize,
    pub length: usize,
}

impl Range {
    pub fn new(start: usize, length: usize) -> Self {
        Self { start, length }
    }

    pub fn end(&self) -> usize {
        self.start + self.length
    }
}

/// Split `[offset, len)` into at most `partitions` ordered ranges.
///
/// The chunk size is `ceil(remaining / partitions)`; full chunks are emitted
/// until the remainder is shorter, which becomes the final chunk. When the
/// remainder fits into one chunk a single range is returned.
pub fn partition_to_ranges(
    len: usize,
    partitions: usize,
    offset: usize,
) -> ComputeResult<Vec<Range>> {
    if partitions == 0 {
        return Err(ComputeError::ZeroPartitions);
    }
    if offset > len {
        return Err(ComputeError::OutOfRange {
            offset,
            end: offset,
            len,
        });
    }

    let mut remaining = len - offset;
    let chunk = remaining.div_ceil(partitions);

    if remaining <= chunk {
        return Ok(vec![Range::new(offset, remaining)]);
    }

    let mut ranges = Vec::with_capacity(partitions);
    let mut start = offset;
    while remaining >= chunk {
        ranges.push(Range::new(start, chunk));
        start += chunk;
        remaining -= chunk;
    }
    if remaining > 0 {
        ranges.push(Range::new(start, remaining));
    }

    Ok(ranges)
}
