//! Integration tests for row partitioning and parallel evaluation.

use std::sync::Arc;

use qmodel::compute::parallel::compute_cdf_parallel;
use qmodel::compute::{compute_cdf, partition_to_ranges, ComputationKind, ComputeError, Range};
use qmodel::data::Column;

#[test]
fn test_reasonable_arguments() {
    assert_eq!(
        partition_to_ranges(10, 3, 0).unwrap(),
        vec![Range::new(0, 4), Range::new(4, 4), Range::new(8, 2)]
    );
}

#[test]
fn test_extreme_cases() {
    assert_eq!(
        partition_to_ranges(6, 2, 5).unwrap(),
        vec![Range::new(5, 1)]
    );
    assert_eq!(
        partition_to_ranges(6, 2, 1).unwrap(),
        vec![Range::new(1, 3), Range::new(4, 2)]
    );
}

#[test]
fn test_more_partitions_than_rows() {
    let ranges = partition_to_ranges(3, 8, 0).unwrap();
    assert_eq!(
        ranges,
        vec![Range::new(0, 1), Range::new(1, 1), Range::new(2, 1)]
    );
}

#[test]
fn test_ranges_cover_input_exactly() {
    for len in 0..40 {
        for partitions in 1..9 {
            for offset in [0, len / 3, len] {
                let ranges = partition_to_ranges(len, partitions, offset).unwrap();
                assert!(ranges.len() <= partitions.max(1));

                let mut next = offset;
                for range in &ranges {
                    assert_eq!(range.start, next, "len={len} p={partitions} o={offset}");
                    next = range.end();
                }
                assert_eq!(next, len);
            }
        }
    }
}

#[test]
fn test_invalid_partitioning() {
    assert_eq!(partition_to_ranges(10, 0, 0), Err(ComputeError::ZeroPartitions));
    assert!(matches!(
        partition_to_ranges(10, 2, 11),
        Err(ComputeError::OutOfRange { offset: 11, .. })
    ));
}

#[tokio::test]
async fn test_parallel_matches_sequential() {
    let columns = vec![
        Column::from_values("m1", &[14.0, 21.0, 16.0, 8.0, 21.0, 11.0, 18.0, 16.0]),
        Column::from_values("m3", &[0.18, 0.51, 0.25, 0.84, 0.05, 0.36, 0.97, 0.48]),
    ];
    let sequential = compute_cdf(&columns, 0, None, false).unwrap();

    for parallelism in [1, 3, 8, 16] {
        let parallel = compute_cdf_parallel(Arc::new(columns.clone()), parallelism, ComputationKind::Cdf)
            .await
            .unwrap();
        assert_eq!(parallel.len(), 8);
        for entity in &sequential.data {
            assert_eq!(parallel.get(&entity.id), Some(entity.val));
        }
    }
}

#[tokio::test]
async fn test_parallel_over_no_rows() {
    let columns = Arc::new(vec![Column::new("m", vec![])]);
    let result = compute_cdf_parallel(columns, 4, ComputationKind::Ccdf)
        .await
        .unwrap();
    assert!(result.is_empty());
    assert_eq!(result.kind(), ComputationKind::Ccdf);
}
