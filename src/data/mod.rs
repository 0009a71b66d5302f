//! Entity-level data and the dataset collaborator.
//!
//! A [`Dataset`] hands out one [`Column`] per metric. Each column holds one
//! [`EntityData`] per entity; the entity id is what aligns rows across
//! columns when several of them are combined into a multivariate input.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Errors raised by a dataset.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum DatasetError {
    #[error("The column '{0}' is not known")]
    UnknownColumn(String),

    #[error("Row {row} has no value for column '{column}'")]
    MissingValue { row: usize, column: String },

    #[error("Row {row} has no entity id column '{column}'")]
    MissingId { row: usize, column: String },

    #[error("Duplicate entity id: '{0}'")]
    DuplicateId(String),
}

pub type DatasetResult<T> = Result<T, DatasetError>;

/// One entity's value for one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityData {
    pub id: String,
    pub val: f64,
}

impl EntityData {
    pub fn new(id: impl Into<String>, val: f64) -> Self {
        Self { id: id.into(), val }
    }
}

/// A named, ordered sequence of entity values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: Vec<EntityData>,
}

impl Column {
    pub fn new(name: impl Into<String>, data: Vec<EntityData>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Build a column from plain values, naming entities `F1..Fn`.
    ///
    /// Mostly useful for tests and small fixtures.
    pub fn from_values(name: impl Into<String>, values: &[f64]) -> Self {
        let data = values
            .iter()
            .enumerate()
            .map(|(i, v)| EntityData::new(format!("F{}", i + 1), *v))
            .collect();
        Self::new(name, data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The column's data, sorted by entity id.
    pub fn sorted_by_id(&self) -> Vec<EntityData> {
        let mut data = self.data.clone();
        data.sort_by(|a, b| a.id.cmp(&b.id));
        data
    }
}

/// The dataset collaborator consumed by metric nodes.
pub trait Dataset: Send + Sync {
    /// Fetch the column with the given name.
    fn column(&self, name: &str) -> DatasetResult<Column>;

    /// Whether a column with the given name exists.
    fn has_column(&self, name: &str) -> bool;

    /// Number of entities (rows).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A dataset held entirely in memory, column-major.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataset {
    ids: Vec<String>,
    columns: HashMap<String, Vec<f64>>,
    /// Column names in declaration order.
    order: Vec<String>,
}

impl InMemoryDataset {
    /// Create a dataset from entity ids and named value columns.
    ///
    /// Every column must have one value per id.
    pub fn new(ids: Vec<String>) -> Self {
        Self {
            ids,
            columns: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Add a column. Missing trailing values are an error.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> DatasetResult<Self> {
        let name = name.into();
        if values.len() < self.ids.len() {
            return Err(DatasetError::MissingValue {
                row: values.len(),
                column: name,
            });
        }
        if !self.columns.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.columns.insert(name, values);
        Ok(self)
    }

    /// Build a dataset from row objects, as produced by parsing a JSON array of
    /// records. The entity id is read from `id_column` and rendered as a string;
    /// every other numeric field becomes a column.
    pub fn from_rows(
        rows: &[serde_json::Map<String, serde_json::Value>],
        id_column: &str,
    ) -> DatasetResult<Self> {
        let mut ids = Vec::with_capacity(rows.len());
        let mut columns: BTreeMap<String, Vec<f64>> = BTreeMap::new();

        for (row_idx, row) in rows.iter().enumerate() {
            let id = match row.get(id_column) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Null) | None => {
                    return Err(DatasetError::MissingId {
                        row: row_idx,
                        column: id_column.to_string(),
                    })
                }
                Some(other) => other.to_string(),
            };
            if ids.contains(&id) {
                return Err(DatasetError::DuplicateId(id));
            }
            ids.push(id);

            for (key, value) in row {
                if key == id_column {
                    continue;
                }
                let Some(v) = value_as_f64(value) else {
                    continue;
                };
                let column = columns.entry(key.clone()).or_default();
                if column.len() != row_idx {
                    return Err(DatasetError::MissingValue {
                        row: column.len(),
                        column: key.clone(),
                    });
                }
                column.push(v);
            }
        }

        let mut dataset = Self::new(ids);
        for (name, values) in columns {
            dataset = dataset.with_column(name, values)?;
        }
        Ok(dataset)
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> &[String] {
        &self.order
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}

fn value_as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl Dataset for InMemoryDataset {
    fn column(&self, name: &str) -> DatasetResult<Column> {
        let values = self
            .columns
            .get(name)
            .ok_or_else(|| DatasetError::UnknownColumn(name.to_string()))?;

        let data = self
            .ids
            .iter()
            .zip(values)
            .map(|(id, v)| EntityData::new(id.clone(), *v))
            .collect();

        Ok(Column::new(name, data))
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}
