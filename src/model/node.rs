//! Model nodes: metrics bound to a dataset column, and aggregates that
//! combine their children's distributions.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::cache::StateCache;
use crate::events::{EventBus, NodeEvent, Subscription, SubscriptionId};

/// What a node computes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Bound to the dataset column of the same name.
    Metric,
    /// Combines the CDFs of its children as a multivariate input.
    Aggregate,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Metric => "metric",
            NodeKind::Aggregate => "aggregate",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of the model DAG.
///
/// The node owns its results (keyed by structural state) and the guard that
/// serializes its recomputation. Edges live in the owning
/// [`Model`](super::Model); use [`NodeRef`](super::NodeRef) to walk them.
#[derive(Debug)]
pub struct ModelNode {
    name: String,
    kind: NodeKind,
    pub(crate) cache: StateCache,
    /// Held while the node computes, so concurrent callers wait and then
    /// find the result cached.
    pub(crate) in_flight: Mutex<()>,
    events: EventBus<NodeEvent>,
    computations: AtomicUsize,
}

impl ModelNode {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            cache: StateCache::new(),
            in_flight: Mutex::new(()),
            events: EventBus::new(),
            computations: AtomicUsize::new(0),
        }
    }

    /// A metric node reading the dataset column `name`.
    pub fn metric(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Metric)
    }

    pub fn aggregate(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Aggregate)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_metric(&self) -> bool {
        self.kind == NodeKind::Metric
    }

    pub fn is_aggregate(&self) -> bool {
        self.kind == NodeKind::Aggregate
    }

    pub fn cache(&self) -> &StateCache {
        &self.cache
    }

    /// How many times this node has actually run a computation.
    pub fn computation_count(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> Subscription<NodeEvent> {
        self.events.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub(crate) fn mark_computed(&self) {
        self.computations.fetch_add(1, Ordering::Relaxed);
        self.events.emit(NodeEvent::Computed {
            node: self.name.clone(),
            progress: 1.0,
        });
    }
}
