//! Model - the DAG of metric and aggregate nodes.
//!
//! The model exclusively owns its nodes and all edges between them. An edge
//! runs from a child to its parent; a parent's distribution is computed from
//! its children's CDFs, so children always finish before their parents.
//!
//! The module is organized into submodules:
//! - `node`: the node type and its kinds
//! - `description`: the load-time model format
//! - `recompute`: cascading, cost-weighted recomputation

pub mod description;
mod node;
mod recompute;


use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use petgraph::algo::{astar, toposort};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use tracing::debug;

use crate::cache::StateKey;
use crate::compute::parallel::default_parallelism;
use crate::compute::{ComputationKind, ComputeError, ComputedData};
use crate::data::{Dataset, DatasetError};
use crate::events::{EventBus, ModelEvent, Subscription, SubscriptionId};

pub use description::{EntityIdSpec, LoadError, LoadResult, ModelDescription, NodeDescription};
pub use node::{ModelNode, NodeKind};

/// Errors raised by model edits and recomputation.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("The node with the name '{0}' is already added")]
    DuplicateNode(String),

    #[error("Unknown node: '{0}'")]
    UnknownNode(String),

    #[error("Metric '{0}' has no column in the dataset")]
    UnknownColumn(String),

    #[error("Cannot connect node '{0}' to itself")]
    SelfLoop(String),

    #[error("Edge from '{child}' to '{parent}' already exists")]
    DuplicateEdge { child: String, parent: String },

    #[error("'{parent}' is already a child of '{child}'")]
    ImmediateCycle { child: String, parent: String },

    #[error("Cyclic dependency detected: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("Metric '{0}' cannot have children")]
    MetricParent(String),

    #[error("There is no edge from '{child}' to '{parent}'")]
    UnknownEdge { child: String, parent: String },

    #[error("The current state ({state}) of '{node}' is not computed")]
    NotComputed { node: String, state: String },

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Computation failed: {0}")]
    Compute(#[from] ComputeError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),
}

pub type ModelResult<T> = Result<T, ModelError>;

/// Knobs for how a model computes.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeOptions {
    /// Number of row ranges an aggregate is split into.
    pub parallelism: usize,
    /// Also compute a CCDF for aggregates.
    pub aggregate_ccdf: bool,
    /// Key caches by a SHA256 of the fingerprint instead of the fingerprint.
    pub digest_keys: bool,
}

impl Default for ComputeOptions {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            aggregate_ccdf: false,
            digest_keys: false,
        }
    }
}

/// The model DAG.
pub struct Model {
    /// Edges point from child to parent.
    graph: StableDiGraph<ModelNode, ()>,

    /// Mapping from node name to node index
    node_indices: HashMap<String, NodeIndex>,

    dataset: Arc<dyn Dataset>,

    options: ComputeOptions,

    events: EventBus<ModelEvent>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("nodes", &self.node_indices.len())
            .field("edges", &self.graph.edge_count())
            .field("rows", &self.dataset.len())
            .field("options", &self.options)
            .finish()
    }
}

impl Model {
    /// Create an empty model over a dataset.
    pub fn new(dataset: Arc<dyn Dataset>) -> Self {
        Self {
            graph: StableDiGraph::new(),
            node_indices: HashMap::new(),
            dataset,
            options: ComputeOptions::default(),
            events: EventBus::new(),
        }
    }

    pub fn with_options(mut self, options: ComputeOptions) -> Self {
        self.options = options;
        self
    }

    /// Build a model from a description.
    pub fn from_description(
        dataset: Arc<dyn Dataset>,
        description: &ModelDescription,
    ) -> ModelResult<Self> {
        let mut model = Self::new(dataset);
        model.load(description)?;
        Ok(model)
    }

    /// Discard every node and rebuild from a description.
    ///
    /// A node becomes a metric when it sets `useColumn` and the dataset has
    /// a column of that name; every other node is an aggregate. On error the
    /// previous graph is restored unchanged.
    pub fn load(&mut self, description: &ModelDescription) -> ModelResult<()> {
        description.validate()?;

        let previous = (
            std::mem::take(&mut self.graph),
            std::mem::take(&mut self.node_indices),
        );
        if let Err(e) = self.build(description) {
            (self.graph, self.node_indices) = previous;
            return Err(e);
        }

        debug!(
            nodes = self.node_indices.len(),
            edges = self.graph.edge_count(),
            digest = ?description.content_hash().ok(),
            "loaded model"
        );
        self.notify_if_needed();
        Ok(())
    }

    fn build(&mut self, description: &ModelDescription) -> ModelResult<()> {
        for entry in &description.model {
            let kind = if entry.use_column && self.dataset.has_column(&entry.name) {
                NodeKind::Metric
            } else {
                NodeKind::Aggregate
            };
            self.insert_node(ModelNode::new(entry.name.clone(), kind))?;
        }

        for entry in &description.model {
            for source in &entry.sources {
                self.link(source, &entry.name)?;
            }
        }
        Ok(())
    }

    pub fn options(&self) -> &ComputeOptions {
        &self.options
    }

    pub fn dataset(&self) -> &Arc<dyn Dataset> {
        &self.dataset
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub fn subscribe(&self) -> Subscription<ModelEvent> {
        self.events.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    fn notify_if_needed(&self) {
        let cost = self.recompute_cost();
        if cost > 0 {
            self.events.emit(ModelEvent::RequiresRecompute(cost));
        }
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Register a node under its unique name.
    pub fn add_node(&mut self, node: ModelNode) -> ModelResult<()> {
        self.insert_node(node)?;
        self.notify_if_needed();
        Ok(())
    }

    pub fn add_metric(&mut self, name: impl Into<String>) -> ModelResult<()> {
        self.add_node(ModelNode::metric(name))
    }

    pub fn add_aggregate(&mut self, name: impl Into<String>) -> ModelResult<()> {
        self.add_node(ModelNode::aggregate(name))
    }

    fn insert_node(&mut self, node: ModelNode) -> ModelResult<NodeIndex> {
        if self.node_indices.contains_key(node.name()) {
            return Err(ModelError::DuplicateNode(node.name().to_string()));
        }
        if node.is_metric() && !self.dataset.has_column(node.name()) {
            return Err(ModelError::UnknownColumn(node.name().to_string()));
        }

        let name = node.name().to_string();
        let idx = self.graph.add_node(node);
        self.node_indices.insert(name, idx);
        Ok(idx)
    }

    /// Remove a node together with all of its edges.
    pub fn remove_node(&mut self, name: &str) -> ModelResult<ModelNode> {
        let idx = self.index_of(name)?;

        // Removing the node drops its incident edges with it.
        let node = self
            .graph
            .remove_node(idx)
            .ok_or_else(|| ModelError::UnknownNode(name.to_string()))?;
        self.node_indices.remove(name);

        self.notify_if_needed();
        Ok(node)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node_indices.contains_key(name)
    }

    pub fn node(&self, name: &str) -> ModelResult<NodeRef<'_>> {
        let idx = self.index_of(name)?;
        Ok(NodeRef { model: self, idx })
    }

    /// All nodes, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeRef<'_>> {
        self.graph
            .node_indices()
            .map(move |idx| NodeRef { model: self, idx })
    }

    pub fn node_count(&self) -> usize {
        self.node_indices.len()
    }

    /// Aggregates without parents. Parentless metrics are not roots.
    pub fn root_nodes(&self) -> Vec<NodeRef<'_>> {
        self.root_indices()
            .into_iter()
            .map(|idx| NodeRef { model: self, idx })
            .collect()
    }

    fn root_indices(&self) -> Vec<NodeIndex> {
        let mut roots: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&idx| {
                self.graph[idx].is_aggregate()
                    && self
                        .graph
                        .neighbors_directed(idx, Direction::Outgoing)
                        .next()
                        .is_none()
            })
            .collect();
        roots.sort_by(|a, b| self.graph[*a].name().cmp(self.graph[*b].name()));
        roots
    }

    fn index_of(&self, name: &str) -> ModelResult<NodeIndex> {
        self.node_indices
            .get(name)
            .copied()
            .ok_or_else(|| ModelError::UnknownNode(name.to_string()))
    }

    // =========================================================================
    // Edges
    // =========================================================================

    /// Connect `child` as an input of `parent`.
    pub fn add_edge(&mut self, child: &str, parent: &str) -> ModelResult<()> {
        self.link(child, parent)?;
        self.notify_if_needed();
        Ok(())
    }

    fn link(&mut self, child: &str, parent: &str) -> ModelResult<()> {
        let child_idx = self.index_of(child)?;
        let parent_idx = self.index_of(parent)?;

        if child_idx == parent_idx {
            return Err(ModelError::SelfLoop(child.to_string()));
        }
        if self.graph.contains_edge(child_idx, parent_idx) {
            return Err(ModelError::DuplicateEdge {
                child: child.to_string(),
                parent: parent.to_string(),
            });
        }
        if self.graph.contains_edge(parent_idx, child_idx) {
            return Err(ModelError::ImmediateCycle {
                child: child.to_string(),
                parent: parent.to_string(),
            });
        }
        if self.graph[parent_idx].is_metric() {
            return Err(ModelError::MetricParent(parent.to_string()));
        }

        // The new edge closes a cycle iff the child is already reachable
        // upwards from the parent.
        if let Some((_, path)) = astar(
            &self.graph,
            parent_idx,
            |n| n == child_idx,
            |_| 1usize,
            |_| 0,
        ) {
            let mut cycle = vec![child.to_string()];
            cycle.extend(path.into_iter().map(|idx| self.graph[idx].name().to_string()));
            return Err(ModelError::CyclicDependency(cycle));
        }

        self.graph.add_edge(child_idx, parent_idx, ());
        Ok(())
    }

    /// Disconnect `child` from `parent`.
    pub fn remove_edge(&mut self, child: &str, parent: &str) -> ModelResult<()> {
        let child_idx = self.index_of(child)?;
        let parent_idx = self.index_of(parent)?;

        let edge = self
            .graph
            .find_edge(child_idx, parent_idx)
            .ok_or_else(|| ModelError::UnknownEdge {
                child: child.to_string(),
                parent: parent.to_string(),
            })?;
        self.graph.remove_edge(edge);

        self.notify_if_needed();
        Ok(())
    }

    pub fn has_edge(&self, child: &str, parent: &str) -> bool {
        match (self.node_indices.get(child), self.node_indices.get(parent)) {
            (Some(&c), Some(&p)) => self.graph.contains_edge(c, p),
            _ => false,
        }
    }

    /// All edges as `(child, parent)` pairs.
    pub fn edges(&self) -> Vec<(String, String)> {
        let mut edges: Vec<(String, String)> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(c, p)| {
                (
                    self.graph[c].name().to_string(),
                    self.graph[p].name().to_string(),
                )
            })
            .collect();
        edges.sort();
        edges
    }

    /// Children in the order they were connected.
    fn child_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        // petgraph yields the most recently added edge first.
        let mut children: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .collect();
        children.reverse();
        children
    }

    fn parent_indices(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut parents: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();
        parents.reverse();
        parents
    }

    /// Node names ordered so that every child precedes its parents.
    pub fn topological_order(&self) -> ModelResult<Vec<String>> {
        let order = toposort(&self.graph, None).map_err(|cycle| {
            ModelError::CyclicDependency(vec![self.graph[cycle.node_id()].name().to_string()])
        })?;
        Ok(order
            .into_iter()
            .map(|idx| self.graph[idx].name().to_string())
            .collect())
    }

    // =========================================================================
    // State and cost
    // =========================================================================

    /// Canonical structural fingerprint of a node's subtree.
    fn fingerprint(&self, idx: NodeIndex) -> String {
        let mut children = self.child_indices(idx);
        children.sort_by(|a, b| self.graph[*a].name().cmp(self.graph[*b].name()));
        let inner: Vec<String> = children.into_iter().map(|c| self.fingerprint(c)).collect();
        format!("[{}]--{{{}}}", self.graph[idx].name(), inner.join(";"))
    }

    fn state_key(&self, idx: NodeIndex) -> StateKey {
        StateKey::from_fingerprint(self.fingerprint(idx), self.options.digest_keys)
    }

    /// Worst-case comparisons to recompute one node: `children * rows²`, or
    /// zero when its current state is cached.
    fn node_cost(&self, idx: NodeIndex) -> u64 {
        if self.graph[idx].cache.contains(&self.state_key(idx)) {
            return 0;
        }
        let rows = self.dataset.len() as u64;
        self.child_indices(idx).len() as u64 * rows * rows
    }

    /// Cost of recomputing everything reachable from the roots.
    ///
    /// A node shared by several parents is counted once per path that
    /// reaches it.
    pub fn recompute_cost(&self) -> u64 {
        fn subtree(model: &Model, idx: NodeIndex) -> u64 {
            model.node_cost(idx)
                + model
                    .child_indices(idx)
                    .into_iter()
                    .map(|c| subtree(model, c))
                    .sum::<u64>()
        }

        self.root_indices()
            .into_iter()
            .map(|idx| subtree(self, idx))
            .sum()
    }

    /// Like [`recompute_cost`](Self::recompute_cost) but counting every node
    /// once. This is the work a recompute actually performs.
    pub fn recompute_cost_unique(&self) -> u64 {
        self.reachable_from(&self.root_indices())
            .into_iter()
            .map(|idx| self.node_cost(idx))
            .sum()
    }

    /// Every node reachable downwards from `starts`, including them.
    fn reachable_from(&self, starts: &[NodeIndex]) -> Vec<NodeIndex> {
        let mut seen = Vec::new();
        let mut stack: Vec<NodeIndex> = starts.to_vec();
        while let Some(idx) = stack.pop() {
            if seen.contains(&idx) {
                continue;
            }
            seen.push(idx);
            stack.extend(self.child_indices(idx));
        }
        seen
    }

    pub fn needs_recompute(&self) -> bool {
        self.recompute_cost() > 0
    }

    // =========================================================================
    // Display
    // =========================================================================

    /// The model as an indented tree below its roots.
    pub fn render_tree(&self) -> String {
        fn walk(model: &Model, idx: NodeIndex, depth: usize, out: &mut String) {
            let node = &model.graph[idx];
            let _ = writeln!(out, "{}|- {} ({})", "  ".repeat(depth), node.name(), node.kind());
            for child in model.child_indices(idx) {
                walk(model, child, depth + 1, out);
            }
        }

        let mut out = String::new();
        for root in self.root_indices() {
            walk(self, root, 0, &mut out);
        }
        out
    }
}

/// A borrowed view of one node within its model.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    model: &'a Model,
    idx: NodeIndex,
}

impl std::fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

impl<'a> NodeRef<'a> {
    pub fn node(&self) -> &'a ModelNode {
        &self.model.graph[self.idx]
    }

    pub fn name(&self) -> &'a str {
        self.node().name()
    }

    pub fn kind(&self) -> NodeKind {
        self.node().kind()
    }

    pub fn children(&self) -> Vec<NodeRef<'a>> {
        self.model
            .child_indices(self.idx)
            .into_iter()
            .map(|idx| NodeRef {
                model: self.model,
                idx,
            })
            .collect()
    }

    pub fn parents(&self) -> Vec<NodeRef<'a>> {
        self.model
            .parent_indices(self.idx)
            .into_iter()
            .map(|idx| NodeRef {
                model: self.model,
                idx,
            })
            .collect()
    }

    /// An aggregate without children; it has nothing to compute.
    pub fn is_empty_aggregation(&self) -> bool {
        self.node().is_aggregate() && self.children().is_empty()
    }

    pub fn fingerprint(&self) -> String {
        self.model.fingerprint(self.idx)
    }

    pub fn state_key(&self) -> StateKey {
        self.model.state_key(self.idx)
    }

    /// Whether the current state is cached.
    pub fn is_computed(&self) -> bool {
        self.node().cache.contains(&self.state_key())
    }

    pub fn recompute_cost(&self) -> u64 {
        self.model.node_cost(self.idx)
    }

    /// Results for the current state, optionally restricted to one kind.
    pub fn computed_data(&self, kind: Option<ComputationKind>) -> ModelResult<Vec<ComputedData>> {
        let key = self.state_key();
        let results = self
            .node()
            .cache
            .get(&key)
            .ok_or_else(|| ModelError::NotComputed {
                node: self.name().to_string(),
                state: self.fingerprint(),
            })?;

        Ok(results
            .iter()
            .filter(|cd| kind.map_or(true, |k| cd.kind() == k))
            .cloned()
            .collect())
    }

    /// Recompute this node and everything below it.
    pub async fn recompute(&self) -> ModelResult<()> {
        self.model.recompute_from(&[self.idx]).await
    }
}
