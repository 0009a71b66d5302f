//! Cascading recomputation.
//!
//! A node recomputes its children first (siblings concurrently), then takes
//! its in-flight guard, re-checks the cache and only then computes. Two
//! parents sharing a child therefore compute it once: the second waits on
//! the guard and finds the state cached.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture, FutureExt};
use petgraph::stable_graph::NodeIndex;
use tracing::{debug, info, warn};

use crate::compute::parallel::compute_cdf_parallel;
use crate::compute::{ComputationKind, ComputedData};
use crate::data::Column;
use crate::events::{EventBus, ModelEvent};

use super::{Model, ModelError, ModelResult, NodeKind};

/// Turns per-node completions into cost-weighted progress.
struct ProgressTracker<'a> {
    total: u64,
    done: AtomicU64,
    completed: AtomicUsize,
    events: &'a EventBus<ModelEvent>,
}

impl<'a> ProgressTracker<'a> {
    fn new(total: u64, events: &'a EventBus<ModelEvent>) -> Self {
        Self {
            total,
            done: AtomicU64::new(0),
            completed: AtomicUsize::new(0),
            events,
        }
    }

    fn complete(&self, cost: u64) {
        let done = self.done.fetch_add(cost, Ordering::SeqCst) + cost;
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.events.emit(ModelEvent::Progress(self.fraction(done)));
    }

    fn fraction(&self, done: u64) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (done as f64 / self.total as f64).min(1.0)
        }
    }

    /// Close the stream at 1.0 when no node did. This happens when nothing
    /// needed computing, or a concurrent recompute did the work.
    fn finish(&self) {
        let done = self.done.load(Ordering::SeqCst);
        if self.completed.load(Ordering::SeqCst) == 0 || done < self.total {
            self.events.emit(ModelEvent::Progress(1.0));
        }
    }
}

impl Model {
    /// Recompute every root and, transitively, everything below them.
    ///
    /// Emits `Progress(0.0)` first, then the completed fraction of the
    /// total cost after each node that actually computed.
    ///
    /// The total is [`Model::recompute_cost_unique`], which counts a shared
    /// node once. It is smaller than [`Model::recompute_cost`] whenever a
    /// node is reachable through more than one parent.
    pub async fn recompute(&self) -> ModelResult<()> {
        let roots = self.root_indices();
        self.recompute_from(&roots).await
    }

    /// Recompute one node's subtree.
    pub async fn recompute_node(&self, name: &str) -> ModelResult<()> {
        self.node(name)?.recompute().await
    }

    pub(super) async fn recompute_from(&self, starts: &[NodeIndex]) -> ModelResult<()> {
        let total: u64 = self
            .reachable_from(starts)
            .into_iter()
            .map(|idx| self.node_cost(idx))
            .sum();
        info!(total_cost = total, starts = starts.len(), "recomputing model");

        let tracker = ProgressTracker::new(total, &self.events);
        self.events.emit(ModelEvent::Progress(0.0));

        try_join_all(starts.iter().map(|&idx| self.recompute_index(idx, &tracker))).await?;

        tracker.finish();
        info!(
            computed = tracker.completed.load(Ordering::SeqCst),
            "recompute finished"
        );
        Ok(())
    }

    fn recompute_index<'a>(
        &'a self,
        idx: NodeIndex,
        tracker: &'a ProgressTracker<'a>,
    ) -> BoxFuture<'a, ModelResult<()>> {
        async move {
            let children = self.child_indices(idx);
            try_join_all(children.iter().map(|&c| self.recompute_index(c, tracker))).await?;

            let node = &self.graph[idx];
            let _guard = node.in_flight.lock().await;

            let key = self.state_key(idx);
            if node.cache.contains(&key) {
                debug!(node = node.name(), "state already computed");
                return Ok(());
            }

            let cost = self.node_cost(idx);
            let results = match node.kind() {
                NodeKind::Metric => self.compute_metric(idx).await?,
                NodeKind::Aggregate => self.compute_aggregate(idx, &children).await?,
            };

            debug!(node = node.name(), results = results.len(), cost, "node computed");
            node.cache.insert(key, results);
            node.mark_computed();
            tracker.complete(cost);
            Ok(())
        }
        .boxed()
    }

    /// CDF and CCDF of the node's dataset column.
    async fn compute_metric(&self, idx: NodeIndex) -> ModelResult<Vec<ComputedData>> {
        let name = self.graph[idx].name();
        let columns = Arc::new(vec![self.dataset.column(name)?]);
        let parallelism = self.options.parallelism;
        let (cdf, ccdf) = futures::try_join!(
            compute_cdf_parallel(Arc::clone(&columns), parallelism, ComputationKind::Cdf),
            compute_cdf_parallel(columns, parallelism, ComputationKind::Ccdf),
        )?;

        Ok(vec![cdf, ccdf])
    }

    /// Joint distribution over the children's distributions.
    async fn compute_aggregate(
        &self,
        idx: NodeIndex,
        children: &[NodeIndex],
    ) -> ModelResult<Vec<ComputedData>> {
        if children.is_empty() {
            debug!(node = self.graph[idx].name(), "empty aggregation");
            return Ok(vec![]);
        }

        let columns = self.child_columns(idx, children)?;
        if columns.is_empty() {
            return Ok(vec![]);
        }

        let columns = Arc::new(columns);
        let parallelism = self.options.parallelism;
        let cdf = compute_cdf_parallel(Arc::clone(&columns), parallelism, ComputationKind::Cdf);

        // Both kinds count dominance over the children's CDFs, which order
        // entities the same way as the raw values do.
        if self.options.aggregate_ccdf {
            let ccdf = compute_cdf_parallel(columns, parallelism, ComputationKind::Ccdf);
            let (cdf, ccdf) = futures::try_join!(cdf, ccdf)?;
            Ok(vec![cdf, ccdf])
        } else {
            Ok(vec![cdf.await?])
        }
    }

    /// One column per child, holding the child's cached CDF. Children that
    /// produced nothing (empty aggregations) are skipped.
    fn child_columns(&self, parent: NodeIndex, children: &[NodeIndex]) -> ModelResult<Vec<Column>> {
        let mut columns = Vec::with_capacity(children.len());

        for &child in children {
            let node = &self.graph[child];
            let key = self.state_key(child);

            if let Some(data) = node.cache.get_kind(&key, ComputationKind::Cdf) {
                let mut column = data.as_column();
                column.name = node.name().to_string();
                columns.push(column);
                continue;
            }

            match node.cache.get(&key) {
                Some(results) if results.is_empty() => {
                    warn!(
                        node = self.graph[parent].name(),
                        child = node.name(),
                        "skipping child without results"
                    );
                }
                _ => {
                    return Err(ModelError::NotComputed {
                        node: node.name().to_string(),
                        state: self.fingerprint(child),
                    })
                }
            }
        }

        Ok(columns)
    }
}
