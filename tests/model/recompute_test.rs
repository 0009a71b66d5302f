//! Integration tests for cascading recomputation.

use std::sync::Arc;

use qmodel::compute::ComputationKind;
use qmodel::data::InMemoryDataset;
use qmodel::events::{ModelEvent, NodeEvent};
use qmodel::model::{ComputeOptions, Model, ModelError};

fn dataset() -> Arc<InMemoryDataset> {
    let ids = (1..=8).map(|i| format!("F{i}")).collect();
    let ds = InMemoryDataset::new(ids)
        .with_column("m1", vec![14.0, 21.0, 16.0, 8.0, 21.0, 11.0, 18.0, 16.0])
        .unwrap()
        .with_column("m2", vec![112.5, 78.2, 67.7, 100.2, 55.0, 85.9, 88.9, 102.3])
        .unwrap()
        .with_column("m3", vec![0.18, 0.51, 0.25, 0.84, 0.05, 0.36, 0.97, 0.48])
        .unwrap();
    Arc::new(ds)
}

fn options(aggregate_ccdf: bool) -> ComputeOptions {
    ComputeOptions {
        parallelism: 3,
        aggregate_ccdf,
        digest_keys: false,
    }
}

fn aggregate_over(metrics: &[&str], options: ComputeOptions) -> Model {
    let mut model = Model::new(dataset()).with_options(options);
    model.add_aggregate("agg").unwrap();
    for name in metrics {
        model.add_metric(*name).unwrap();
        model.add_edge(name, "agg").unwrap();
    }
    model
}

fn assert_distribution(model: &Model, node: &str, kind: ComputationKind, expected: &[f64]) {
    let results = model.node(node).unwrap().computed_data(Some(kind)).unwrap();
    assert_eq!(results.len(), 1, "{node} should have one {kind}");
    let data = &results[0];
    assert_eq!(data.len(), expected.len());
    for (i, want) in expected.iter().enumerate() {
        let id = format!("F{}", i + 1);
        let got = data.get(&id).unwrap();
        assert!((got - want).abs() < 1e-12, "{node} {kind} {id}: got {got}, expected {want}");
    }
}

#[tokio::test]
async fn test_metric_results() {
    let model = aggregate_over(&["m1"], options(false));
    model.recompute().await.unwrap();

    assert_distribution(
        &model,
        "m1",
        ComputationKind::Cdf,
        &[2.0 / 8.0, 7.0 / 8.0, 4.0 / 8.0, 0.0, 7.0 / 8.0, 1.0 / 8.0, 5.0 / 8.0, 4.0 / 8.0],
    );
    assert_distribution(
        &model,
        "m1",
        ComputationKind::Ccdf,
        &[5.0 / 8.0, 0.0, 3.0 / 8.0, 7.0 / 8.0, 0.0, 6.0 / 8.0, 2.0 / 8.0, 3.0 / 8.0],
    );

    let all = model.node("m1").unwrap().computed_data(None).unwrap();
    let kinds: Vec<ComputationKind> = all.iter().map(|d| d.kind()).collect();
    assert_eq!(kinds, ComputationKind::ALL.to_vec());
}

#[tokio::test]
async fn test_aggregate_matches_multivariate_cdf() {
    let model = aggregate_over(&["m1", "m2", "m3"], options(false));
    model.recompute().await.unwrap();

    assert_distribution(
        &model,
        "agg",
        ComputationKind::Cdf,
        &[0.0, 2.0 / 8.0, 0.0, 0.0, 0.0, 0.0, 2.0 / 8.0, 2.0 / 8.0],
    );
    let ccdf = model
        .node("agg")
        .unwrap()
        .computed_data(Some(ComputationKind::Ccdf))
        .unwrap();
    assert!(ccdf.is_empty());
}

#[tokio::test]
async fn test_aggregate_ccdf_when_enabled() {
    let model = aggregate_over(&["m1", "m3"], options(true));
    model.recompute().await.unwrap();

    assert_distribution(
        &model,
        "agg",
        ComputationKind::Cdf,
        &[0.0, 5.0 / 8.0, 1.0 / 8.0, 0.0, 0.0, 0.0, 5.0 / 8.0, 3.0 / 8.0],
    );
    assert_distribution(
        &model,
        "agg",
        ComputationKind::Ccdf,
        &[4.0 / 8.0, 0.0, 2.0 / 8.0, 1.0 / 8.0, 0.0, 3.0 / 8.0, 0.0, 2.0 / 8.0],
    );
}

#[tokio::test]
async fn test_second_recompute_is_free() {
    let model = aggregate_over(&["m1", "m2", "m3"], options(false));
    assert_eq!(model.recompute_cost(), 192);

    model.recompute().await.unwrap();
    assert_eq!(model.recompute_cost(), 0);
    assert!(!model.needs_recompute());

    let mut events = model.subscribe();
    model.recompute().await.unwrap();

    assert_eq!(model.node("agg").unwrap().node().computation_count(), 1);
    assert_eq!(
        events.drain(),
        vec![ModelEvent::Progress(0.0), ModelEvent::Progress(1.0)]
    );
}

#[tokio::test]
async fn test_progress_is_monotonic_and_ends_at_one() {
    let model = aggregate_over(&["m1", "m2", "m3"], options(false));
    let mut events = model.subscribe();

    model.recompute().await.unwrap();

    let progress: Vec<f64> = events
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            ModelEvent::Progress(p) => Some(p),
            ModelEvent::RequiresRecompute(_) => None,
        })
        .collect();

    assert_eq!(progress.first(), Some(&0.0));
    assert_eq!(progress.last(), Some(&1.0));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    // The start, then one event per computed node.
    assert_eq!(progress.len(), 1 + 4);
}

#[tokio::test]
async fn test_node_computed_event() {
    let model = aggregate_over(&["m1"], options(false));
    let mut events = model.node("agg").unwrap().node().subscribe();

    model.recompute().await.unwrap();

    assert_eq!(
        events.drain(),
        vec![NodeEvent::Computed {
            node: "agg".to_string(),
            progress: 1.0
        }]
    );
}

#[tokio::test]
async fn test_shared_subtree_computed_once() {
    let mut model = aggregate_over(&["m1", "m2"], options(false));
    model.add_aggregate("left").unwrap();
    model.add_aggregate("right").unwrap();
    model.add_edge("agg", "left").unwrap();
    model.add_edge("agg", "right").unwrap();

    // Counted per path, computed once.
    assert_eq!(model.recompute_cost(), 2 * 128 + 2 * 64);
    assert_eq!(model.recompute_cost_unique(), 128 + 2 * 64);

    let (a, b) = tokio::join!(model.recompute(), model.recompute());
    a.unwrap();
    b.unwrap();

    for node in model.nodes() {
        assert_eq!(node.node().computation_count(), 1, "{}", node.name());
    }
    assert_eq!(
        model.node("left").unwrap().computed_data(None).unwrap(),
        model.node("right").unwrap().computed_data(None).unwrap()
    );
}

#[tokio::test]
async fn test_progress_total_counts_shared_nodes_once() {
    let mut model = aggregate_over(&["m1", "m2"], options(false));
    model.add_aggregate("left").unwrap();
    model.add_aggregate("right").unwrap();
    model.add_edge("agg", "left").unwrap();
    model.add_edge("agg", "right").unwrap();
    let mut events = model.subscribe();

    model.recompute().await.unwrap();

    // agg is 128 of 256, left and right 64 each.
    assert_eq!(
        events.drain(),
        vec![
            ModelEvent::Progress(0.0),
            ModelEvent::Progress(0.0),
            ModelEvent::Progress(0.0),
            ModelEvent::Progress(0.5),
            ModelEvent::Progress(0.75),
            ModelEvent::Progress(1.0),
        ]
    );
}

#[tokio::test]
async fn test_recompute_single_subtree() {
    let mut model = aggregate_over(&["m1", "m2"], options(false));
    model.add_aggregate("top").unwrap();
    model.add_edge("agg", "top").unwrap();

    model.recompute_node("agg").await.unwrap();

    assert!(model.node("agg").unwrap().is_computed());
    assert!(!model.node("top").unwrap().is_computed());
    assert_eq!(model.recompute_cost(), 64);
    assert!(matches!(
        model.node("top").unwrap().computed_data(None),
        Err(ModelError::NotComputed { .. })
    ));
}

#[tokio::test]
async fn test_edit_invalidates_parent_state() {
    let mut model = aggregate_over(&["m1", "m2"], options(false));
    model.recompute().await.unwrap();
    let before = model.node("agg").unwrap().computed_data(None).unwrap();

    model.add_metric("m3").unwrap();
    model.add_edge("m3", "agg").unwrap();
    assert_eq!(model.recompute_cost(), 192);
    assert!(model.node("agg").unwrap().computed_data(None).is_err());

    model.recompute().await.unwrap();
    assert_eq!(model.node("agg").unwrap().node().computation_count(), 2);
    // Metrics keep their state.
    assert_eq!(model.node("m1").unwrap().node().computation_count(), 1);

    // Back to the old structure: the old state is served from the cache.
    model.remove_edge("m3", "agg").unwrap();
    assert_eq!(model.recompute_cost(), 0);
    assert_eq!(
        model.node("agg").unwrap().computed_data(None).unwrap(),
        before
    );
}

#[tokio::test]
async fn test_empty_aggregation_child_is_skipped() {
    let mut model = aggregate_over(&["m1"], options(false));
    model.add_aggregate("empty").unwrap();
    model.add_edge("empty", "agg").unwrap();

    model.recompute().await.unwrap();

    assert!(model.node("empty").unwrap().computed_data(None).unwrap().is_empty());
    // Only m1 contributes.
    assert_distribution(
        &model,
        "agg",
        ComputationKind::Cdf,
        &[2.0 / 8.0, 7.0 / 8.0, 4.0 / 8.0, 0.0, 7.0 / 8.0, 1.0 / 8.0, 5.0 / 8.0, 4.0 / 8.0],
    );
}

#[tokio::test]
async fn test_empty_dataset() {
    let ds = InMemoryDataset::new(vec![]).with_column("m1", vec![]).unwrap();
    let mut model = Model::new(Arc::new(ds));
    model.add_metric("m1").unwrap();
    model.add_aggregate("agg").unwrap();
    model.add_edge("m1", "agg").unwrap();

    assert_eq!(model.recompute_cost(), 0);
    model.recompute().await.unwrap();

    let results = model.node("agg").unwrap().computed_data(None).unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_empty());
    assert_eq!(results[0].min(), None);
}

#[tokio::test]
async fn test_digested_keys_give_same_results() {
    let plain = aggregate_over(&["m1", "m2", "m3"], options(false));
    let digested = aggregate_over(
        &["m1", "m2", "m3"],
        ComputeOptions {
            digest_keys: true,
            ..options(false)
        },
    );

    plain.recompute().await.unwrap();
    digested.recompute().await.unwrap();

    assert_eq!(
        plain.node("agg").unwrap().computed_data(None).unwrap(),
        digested.node("agg").unwrap().computed_data(None).unwrap()
    );
    assert_eq!(digested.node("agg").unwrap().state_key().as_str().len(), 64);
}
