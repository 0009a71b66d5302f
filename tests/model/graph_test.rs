//! Integration tests for building and editing the model DAG.

use std::sync::Arc;

use qmodel::data::InMemoryDataset;
use qmodel::events::ModelEvent;
use qmodel::model::{Model, ModelError, ModelNode, NodeKind};

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

/// `agg` over all three metrics.
fn flat_model() -> Model {
    let mut model = Model::new(dataset());
    for name in ["m1", "m2", "m3"] {
        model.add_metric(name).unwrap();
    }
    model.add_aggregate("agg").unwrap();
    for name in ["m1", "m2", "m3"] {
        model.add_edge(name, "agg").unwrap();
    }
    model
}

#[test]
fn test_three_metrics_cost() {
    let model = flat_model();
    // 3 children * 8²
    assert_eq!(model.recompute_cost(), 192);
    assert_eq!(model.node("agg").unwrap().recompute_cost(), 192);
    assert!(model.needs_recompute());
}

#[test]
fn test_edges_are_bidirectional() {
    let model = flat_model();
    let agg = model.node("agg").unwrap();
    let children: Vec<&str> = agg.children().iter().map(|c| c.name()).collect();
    assert_eq!(children, vec!["m1", "m2", "m3"]);

    for name in ["m1", "m2", "m3"] {
        let parents: Vec<&str> = model
            .node(name)
            .unwrap()
            .parents()
            .iter()
            .map(|p| p.name())
            .collect();
        assert_eq!(parents, vec!["agg"]);
    }
}

#[test]
fn test_add_node_instance() {
    let mut model = Model::new(dataset());
    model.add_node(ModelNode::metric("m1")).unwrap();
    model.add_node(ModelNode::aggregate("agg")).unwrap();

    assert_eq!(model.node("m1").unwrap().kind(), NodeKind::Metric);
    assert_eq!(model.node_count(), 2);
    assert!(matches!(
        model.add_node(ModelNode::aggregate("m1")),
        Err(ModelError::DuplicateNode(_))
    ));
}

#[test]
fn test_metric_cannot_become_parent() {
    let mut model = flat_model();
    assert!(matches!(
        model.add_edge("m2", "m1"),
        Err(ModelError::MetricParent(_))
    ));
}

#[test]
fn test_two_cycle_is_rejected() {
    let mut model = flat_model();
    model.add_aggregate("outer").unwrap();
    model.add_edge("agg", "outer").unwrap();

    let err = model.add_edge("outer", "agg").unwrap_err();
    assert!(matches!(err, ModelError::ImmediateCycle { .. }));
    assert_eq!(err.to_string(), "'agg' is already a child of 'outer'");
}

#[test]
fn test_cycle_error_names_path() {
    let mut model = flat_model();
    model.add_aggregate("a").unwrap();
    model.add_aggregate("b").unwrap();
    model.add_edge("agg", "a").unwrap();
    model.add_edge("a", "b").unwrap();

    let err = model.add_edge("b", "agg").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cyclic dependency detected: b -> agg -> a -> b"
    );
}

#[test]
fn test_roots_exclude_metrics() {
    let mut model = Model::new(dataset());
    model.add_metric("m1").unwrap();
    model.add_aggregate("lonely").unwrap();

    let roots: Vec<&str> = model.root_nodes().iter().map(|n| n.name()).collect();
    assert_eq!(roots, vec!["lonely"]);
}

#[test]
fn test_requires_recompute_on_edits() {
    let mut model = Model::new(dataset());
    let mut events = model.subscribe();

    model.add_metric("m1").unwrap();
    model.add_aggregate("agg").unwrap();
    assert!(events.drain().is_empty());

    model.add_edge("m1", "agg").unwrap();
    model.add_metric("m2").unwrap();
    model.add_edge("m2", "agg").unwrap();
    model.remove_edge("m1", "agg").unwrap();
    model.remove_node("agg").unwrap();

    assert_eq!(
        events.drain(),
        vec![
            ModelEvent::RequiresRecompute(64),
            ModelEvent::RequiresRecompute(64),
            ModelEvent::RequiresRecompute(128),
            ModelEvent::RequiresRecompute(64),
        ]
    );
}

#[test]
fn test_unsubscribed_listener_gets_nothing() {
    let mut model = flat_model();
    let mut events = model.subscribe();
    assert!(model.unsubscribe(events.id));

    model.add_aggregate("x").unwrap();
    model.add_edge("m1", "x").unwrap();

    assert!(events.drain().is_empty());
    assert!(!model.unsubscribe(events.id));
}

#[test]
fn test_render_tree_shares_subtrees() {
    let mut model = flat_model();
    model.add_aggregate("quality").unwrap();
    model.add_aggregate("maintainability").unwrap();
    model.add_edge("agg", "quality").unwrap();
    model.add_edge("m3", "quality").unwrap();
    model.add_edge("agg", "maintainability").unwrap();

    insta::assert_snapshot!(model.render_tree(), @r"
    |- maintainability (aggregate)
      |- agg (aggregate)
        |- m1 (metric)
        |- m2 (metric)
        |- m3 (metric)
    |- quality (aggregate)
      |- agg (aggregate)
        |- m1 (metric)
        |- m2 (metric)
        |- m3 (metric)
      |- m3 (metric)
    ");
}
