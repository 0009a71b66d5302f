//! Immutable, value-sorted statistical results.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::{Column, EntityData};

/// The kind of distribution a [`ComputedData`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComputationKind {
    #[serde(rename = "CDF")]
    Cdf,
    #[serde(rename = "CCDF")]
    Ccdf,
}

impl ComputationKind {
    pub const ALL: [ComputationKind; 2] = [ComputationKind::Cdf, ComputationKind::Ccdf];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComputationKind::Cdf => "CDF",
            ComputationKind::Ccdf => "CCDF",
        }
    }

    pub fn is_ccdf(&self) -> bool {
        matches!(self, ComputationKind::Ccdf)
    }
}

impl fmt::Display for ComputationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A CDF or CCDF over a set of entities.
///
/// The data is sorted ascending by value on construction; `min` and `max`
/// are derived once and are `None` for empty input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputedData {
    kind: ComputationKind,
    data: Vec<EntityData>,
    min: Option<f64>,
    max: Option<f64>,
}

impl ComputedData {
    pub fn new(kind: ComputationKind, mut data: Vec<EntityData>) -> Self {
        data.sort_by(|a, b| a.val.total_cmp(&b.val));
        let min = data.first().map(|d| d.val);
        let max = data.last().map(|d| d.val);
        Self {
            kind,
            data,
            min,
            max,
        }
    }

    /// Merge the column-shaped results of several partitions into one.
    pub fn from_chunks<I>(kind: ComputationKind, chunks: I) -> Self
    where
        I: IntoIterator<Item = Column>,
    {
        let data = chunks.into_iter().flat_map(|chunk| chunk.data).collect();
        Self::new(kind, data)
    }

    pub fn kind(&self) -> ComputationKind {
        self.kind
    }

    /// Entity values, ascending by value.
    pub fn data(&self) -> &[EntityData] {
        &self.data
    }

    /// Values alone, ascending.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.data.iter().map(|d| d.val)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn min(&self) -> Option<f64> {
        self.min
    }

    pub fn max(&self) -> Option<f64> {
        self.max
    }

    pub fn range(&self) -> Option<f64> {
        Some(self.max? - self.min?)
    }

    /// Look up the value of one entity.
    pub fn get(&self, id: &str) -> Option<f64> {
        self.data.iter().find(|d| d.id == id).map(|d| d.val)
    }

    /// This result as a column in entity-id order, named after the kind.
    ///
    /// Parent aggregates use this as one dimension of their input.
    pub fn as_column(&self) -> Column {
        let mut data = self.data.clone();
        data.sort_by(|a, b| a.id.cmp(&b.id));
        Column::new(self.kind.as_str(), data)
    }
}
