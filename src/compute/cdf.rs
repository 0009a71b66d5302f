//! Empirical multivariate CDF/CCDF by dominance counting.

use crate::data::{Column, EntityData};

use super::{ComputationKind, ComputeError, ComputeResult};

/// Compute the empirical joint CDF (or CCDF) for a range of rows.
///
/// Columns are aligned by sorting each of them by entity id. For every row
/// `i` in `[offset, offset + length)` the result is the fraction of *other*
/// rows `j` that are dominated by `i` in every dimension (`v[j] <= v[i]`), or,
/// with `ccdf`, that strictly dominate it (`v[j] > v[i]`). The divisor is the
/// total row count, so values lie in `[0, (N - 1) / N]`.
///
/// A `length` of `None` extends the range to the last row.
///
/// The returned column is named `"CDF"` or `"CCDF"` and lists the requested
/// rows in id order. Cost is `O(columns * length * N)`.
pub fn compute_cdf(
    columns: &[Column],
    offset: usize,
    length: Option<usize>,
    ccdf: bool,
) -> ComputeResult<Column> {
    let aligned = align_columns(columns)?;
    let n = aligned[0].len();

    let length = length.unwrap_or_else(|| n.saturating_sub(offset));
    let end = offset.checked_add(length).ok_or(ComputeError::OutOfRange {
        offset,
        end: usize::MAX,
        len: n,
    })?;
    if offset >= n || end > n {
        return Err(ComputeError::OutOfRange {
            offset,
            end,
            len: n,
        });
    }

    let kind = if ccdf {
        ComputationKind::Ccdf
    } else {
        ComputationKind::Cdf
    };

    let data = (offset..end)
        .map(|i| {
            let count = (0..n)
                .filter(|&j| j != i && dominates(&aligned, i, j, ccdf))
                .count();
            EntityData::new(aligned[0][i].id.clone(), count as f64 / n as f64)
        })
        .collect();

    Ok(Column::new(kind.as_str(), data))
}

/// Whether row `j` is counted for row `i` across all dimensions.
#[inline]
fn dominates(aligned: &[Vec<EntityData>], i: usize, j: usize, ccdf: bool) -> bool {
    aligned.iter().all(|col| {
        if ccdf {
            col[j].val > col[i].val
        } else {
            col[j].val <= col[i].val
        }
    })
}

/// Validate the columns and return each one sorted by entity id.
fn align_columns(columns: &[Column]) -> ComputeResult<Vec<Vec<EntityData>>> {
    let first = columns.first().ok_or(ComputeError::NoColumns)?;
    let expected = first.len();

    for col in columns {
        if col.is_empty() {
            return Err(ComputeError::EmptyColumn(col.name.clone()));
        }
        if col.len() != expected {
            return Err(ComputeError::LengthMismatch {
                name: col.name.clone(),
                expected,
                actual: col.len(),
            });
        }
    }

    let aligned: Vec<Vec<EntityData>> = columns.iter().map(Column::sorted_by_id).collect();

    for (col, data) in columns.iter().zip(&aligned).skip(1) {
        for (row, (reference, entity)) in aligned[0].iter().zip(data).enumerate() {
            if reference.id != entity.id {
                return Err(ComputeError::IdMismatch {
                    name: col.name.clone(),
                    row,
                    expected: reference.id.clone(),
                    found: entity.id.clone(),
                });
            }
        }
    }

    Ok(aligned)
}
