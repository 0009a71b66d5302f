//! The model description consumed at load time.
//!
//! ```json
//! {
//!   "entityId": { "generateColName": "id", "from": ["path", "name"] },
//!   "model": [
//!     { "name": "loc", "useColumn": true, "sources": [] },
//!     { "name": "size", "useColumn": false, "sources": ["loc"] }
//!   ]
//! }
//! ```
//!
//! Layout fields written by the editor (`x`, `y`, `modelLayout`) are ignored.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::digest_json;

/// Errors that can occur when loading a model description.
#[derive(Debug, Error)]
pub enum LoadError {
    /// IO error reading file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The description is not valid JSON for this format
    #[error("Invalid model description: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate node in model: '{0}'")]
    DuplicateNode(String),

    #[error("Node '{node}' cannot connect to source '{source_name}' (not found)")]
    UnknownSource { node: String, source_name: String },
}

/// Result type for model loading operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// How entity ids are derived from raw data rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityIdSpec {
    /// Name of the generated id column.
    pub generate_col_name: String,
    /// Fields joined to form the id.
    pub from: Vec<String>,
}

impl EntityIdSpec {
    /// Insert the generated id column into every row.
    ///
    /// Values of the `from` fields are joined with `/`; absent fields
    /// contribute an empty segment.
    pub fn apply(&self, rows: &mut [serde_json::Map<String, serde_json::Value>]) {
        for row in rows.iter_mut() {
            let id = self
                .from
                .iter()
                .map(|field| match row.get(field) {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(serde_json::Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("/");
            row.insert(
                self.generate_col_name.clone(),
                serde_json::Value::String(id),
            );
        }
    }
}

/// One node entry of the description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescription {
    pub name: String,
    /// Bind to the dataset column of the same name, if there is one.
    #[serde(default)]
    pub use_column: bool,
    /// Names of the child nodes.
    #[serde(default)]
    pub sources: Vec<String>,
}

impl NodeDescription {
    pub fn metric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            use_column: true,
            sources: vec![],
        }
    }

    pub fn aggregate(name: impl Into<String>, sources: &[&str]) -> Self {
        Self {
            name: name.into(),
            use_column: false,
            sources: sources.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A full model description.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityIdSpec>,
    pub model: Vec<NodeDescription>,
}

impl ModelDescription {
    pub fn new(model: Vec<NodeDescription>) -> Self {
        Self {
            entity_id: None,
            model,
        }
    }

    pub fn from_json(json: &str) -> LoadResult<Self> {
        let description: Self = serde_json::from_str(json)?;
        description.validate()?;
        Ok(description)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> LoadResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Check that names are unique and every source is declared.
    pub fn validate(&self) -> LoadResult<()> {
        let mut declared = HashSet::new();
        for node in &self.model {
            if !declared.insert(node.name.as_str()) {
                return Err(LoadError::DuplicateNode(node.name.clone()));
            }
        }

        for node in &self.model {
            if let Some(missing) = node.sources.iter().find(|s| !declared.contains(s.as_str())) {
                return Err(LoadError::UnknownSource {
                    node: node.name.clone(),
                    source_name: missing.clone(),
                });
            }
        }

        Ok(())
    }

    /// SHA256 over the canonical JSON form of this description.
    pub fn content_hash(&self) -> Result<String, serde_json::Error> {
        digest_json(self)
    }
}
