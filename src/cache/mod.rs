//! State-keyed result cache.
//!
//! Every node keeps the results it computed, keyed by the structural state of
//! its subtree at the time. Editing the subtree changes the key, so stale
//! entries simply stop being looked up; they are not evicted.
//!
//! # Key Format
//!
//! ```text
//! [name]--{}                        -> a leaf (metric or empty aggregate)
//! [name]--{[a]--{};[b]--{...}}      -> children sorted by name, recursively
//! ```
//!
//! With digesting enabled the key is the SHA256 of that string, which keeps
//! key size fixed for deep trees without changing which states compare equal.

mod digest;
pub use digest::{digest_json, sha256_hex};

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::compute::{ComputationKind, ComputedData};

/// Identifies one structural state of a node's subtree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateKey(String);

impl StateKey {
    /// Use the fingerprint verbatim.
    pub fn plain(fingerprint: impl Into<String>) -> Self {
        Self(fingerprint.into())
    }

    /// Use a fixed-width digest of the fingerprint.
    pub fn digest(fingerprint: &str) -> Self {
        Self(sha256_hex(fingerprint))
    }

    pub fn from_fingerprint(fingerprint: String, digest: bool) -> Self {
        if digest {
            Self::digest(&fingerprint)
        } else {
            Self::plain(fingerprint)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The results stored for one state.
pub type CachedResults = Arc<[ComputedData]>;

/// A node's results per structural state.
#[derive(Debug, Default)]
pub struct StateCache {
    entries: DashMap<StateKey, CachedResults>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &StateKey) -> bool {
        self.entries.contains_key(key)
    }

    /// All results for a state.
    pub fn get(&self, key: &StateKey) -> Option<CachedResults> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// The result of one kind for a state, if it was computed.
    pub fn get_kind(&self, key: &StateKey, kind: ComputationKind) -> Option<ComputedData> {
        self.entries
            .get(key)
            .and_then(|entry| entry.iter().find(|cd| cd.kind() == kind).cloned())
    }

    pub fn insert(&self, key: StateKey, results: Vec<ComputedData>) -> CachedResults {
        let results: CachedResults = results.into();
        self.entries.insert(key, Arc::clone(&results));
        results
    }

    /// Number of states held, reachable or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

}
