//! Per-query results store.

use std::collections::{BTreeMap, HashMap, HashSet};

use hubit_path::{InternalPath, PathAddress};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::tree;

/// Flat results keyed by canonical path.
pub type Snapshot = BTreeMap<InternalPath, Value>;

/// Flat mapping from concrete path to value, owned by one query call.
///
/// Values written by workers are write-once. Values preloaded from a cache
/// snapshot or user-supplied results are tracked separately so only
/// computed values are written back to the whole-model cache.
#[derive(Debug, Default, Clone)]
pub struct ResultsStore {
    values: HashMap<InternalPath, Value>,
    written: HashSet<InternalPath>,
}

impl ResultsStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store preloaded from a snapshot.
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            values: snapshot.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            written: HashSet::new(),
        }
    }

    /// Creates a store preloaded with every location of a results document.
    pub fn from_tree(results: &Value) -> Self {
        Self {
            values: tree::nodes(results)
                .into_iter()
                .map(|(path, value)| (path.to_internal(), value.clone()))
                .collect(),
            written: HashSet::new(),
        }
    }

    /// Writes a computed value.
    ///
    /// Fails if the path already holds a computed value.
    pub fn insert(&mut self, path: &PathAddress, value: Value) -> EngineResult<()> {
        let key = path.to_internal();
        if self.written.contains(&key) {
            return Err(EngineError::Internal(format!(
                "result '{}' written twice",
                key
            )));
        }
        self.values.insert(key.clone(), value);
        self.written.insert(key);
        Ok(())
    }

    /// Returns the value at a concrete path.
    pub fn get(&self, path: &PathAddress) -> Option<&Value> {
        self.values.get(&path.to_internal())
    }

    /// Returns true if a value is known for the path.
    pub fn contains(&self, path: &PathAddress) -> bool {
        self.values.contains_key(&path.to_internal())
    }

    /// Number of known values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing is known.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of values written by workers.
    pub fn written_len(&self) -> usize {
        self.written.len()
    }

    /// Values written by workers, keyed by canonical path.
    pub fn written_snapshot(&self) -> Snapshot {
        self.written
            .iter()
            .filter_map(|key| self.values.get(key).map(|v| (key.clone(), v.clone())))
            .collect()
    }

    /// Every known value, keyed by canonical path.
    pub fn snapshot(&self) -> Snapshot {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(s: &str) -> PathAddress {
        PathAddress::parse(s).unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let mut store = ResultsStore::new();
        store.insert(&path("list[0].area"), json!(2.0)).unwrap();

        assert_eq!(store.get(&path("list[0].area")), Some(&json!(2.0)));
        assert!(store.contains(&path("list[0].area")));
        assert!(!store.contains(&path("list[1].area")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_write_once() {
        let mut store = ResultsStore::new();
        store.insert(&path("x"), json!(1)).unwrap();
        let err = store.insert(&path("x"), json!(2)).unwrap_err();
        assert!(matches!(err, EngineError::Internal(_)));
        assert_eq!(store.get(&path("x")), Some(&json!(1)));
    }

    #[test]
    fn test_preloaded_values_are_not_written() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(path("a").to_internal(), json!(1));
        let mut store = ResultsStore::from_snapshot(&snapshot);
        store.insert(&path("b"), json!(2)).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.written_len(), 1);
        let written = store.written_snapshot();
        assert_eq!(written.len(), 1);
        assert!(written.contains_key(&path("b").to_internal()));
    }

    #[test]
    fn test_from_tree_indexes_nested_locations() {
        let store = ResultsStore::from_tree(&json!({"list": [{"area": 3.0}]}));
        assert_eq!(store.get(&path("list[0].area")), Some(&json!(3.0)));
        assert!(store.contains(&path("list[0]")));
        assert!(store.contains(&path("list")));
        assert_eq!(store.written_len(), 0);
    }
}
