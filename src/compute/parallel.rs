//! Parallel map over index ranges.
//!
//! Each range is evaluated by a pure function on tokio's blocking pool; the
//! caller resumes once every range has finished (or the first one failed).
//! Results come back in range order.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::debug;

use crate::data::Column;

use super::{
    compute_cdf, partition_to_ranges, ComputationKind, ComputeError, ComputeResult, ComputedData,
    Range,
};

/// Parallelism used when the platform cannot report it.
pub const FALLBACK_PARALLELISM: usize = 4;

/// The number of ranges to split work into by default.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_PARALLELISM)
}

/// Evaluate `f` over every range concurrently and collect results in order.
pub async fn map_ranges<T, F>(ranges: Vec<Range>, f: F) -> ComputeResult<Vec<T>>
where
    T: Send + 'static,
    F: Fn(Range) -> ComputeResult<T> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let tasks = ranges.into_iter().map(|range| {
        let f = Arc::clone(&f);
        async move {
            tokio::task::spawn_blocking(move || f(range))
                .await
                .map_err(|e| ComputeError::TaskFailed(e.to_string()))?
        }
    });

    try_join_all(tasks).await
}

/// Compute a CDF/CCDF over all rows of `columns`, split into `parallelism`
/// ranges, and merge the chunks into one result.
pub async fn compute_cdf_parallel(
    columns: Arc<Vec<Column>>,
    parallelism: usize,
    kind: ComputationKind,
) -> ComputeResult<ComputedData> {
    let len = columns.first().ok_or(ComputeError::NoColumns)?.len();
    if len == 0 {
        return Ok(ComputedData::new(kind, vec![]));
    }

    let ranges = partition_to_ranges(len, parallelism.max(1), 0)?;
    debug!(
        kind = %kind,
        rows = len,
        dimensions = columns.len(),
        ranges = ranges.len(),
        "computing distribution"
    );

    let ccdf = kind.is_ccdf();
    let chunks = map_ranges(ranges, move |range| {
        compute_cdf(&columns, range.start, Some(range.length), ccdf)
    })
    .await?;

    Ok(ComputedData::from_chunks(kind, chunks))
}
