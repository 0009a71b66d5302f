//! # qmodel
//!
//! Quality models over entity metrics, evaluated as empirical multivariate
//! CDFs and CCDFs.
//!
//! ## Architecture
//!
//! A model is a DAG whose leaves are metrics (dataset columns) and whose
//! inner nodes aggregate their children's distributions:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Model description (JSON)                    │
//! │  (nodes, sources, optional entity id generation)         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [model::load]
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Model DAG (petgraph)                     │
//! │   metrics ──▶ aggregates ──▶ roots                       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [recompute, children first]
//! ┌─────────────────────────────────────────────────────────┐
//! │     compute_cdf over row ranges (tokio blocking pool)    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │   ComputedData per node, cached by structural state      │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod compute;
pub mod config;
pub mod data;
pub mod events;
pub mod model;

pub use compute::{compute_cdf, partition_to_ranges, ComputationKind, ComputedData, Range};
pub use data::{Column, Dataset, EntityData, InMemoryDataset};
pub use model::{ComputeOptions, Model, ModelDescription, ModelError, ModelNode, NodeKind};
