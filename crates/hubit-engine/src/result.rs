//! Query response types.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

/// Response of a `Model::get` call.
///
/// Holds one value per query string. Wildcard queries map to nested lists
/// mirroring the wildcard structure.
///
/// # Example
///
/// ```ignore
/// let response = model.get(&["rooms[:].area", "total_area"], QueryOptions::default())?;
///
/// println!("areas: {}", response["rooms[:].area"]);
///
/// for (query, value) in response.iter() {
///     println!("{} = {}", query, value);
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    /// Values keyed by the original query strings.
    pub values: BTreeMap<String, Value>,
    /// Execution statistics.
    pub stats: ExecutionStats,
}

impl QueryResponse {
    /// Creates a new QueryResponse.
    pub fn new(values: BTreeMap<String, Value>, stats: ExecutionStats) -> Self {
        Self { values, stats }
    }

    /// Returns the value for a query string.
    pub fn get(&self, query: &str) -> Option<&Value> {
        self.values.get(query)
    }

    /// Number of queries answered.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no query was answered.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(query, value)` pairs ordered by query string.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Consumes the response and returns the values.
    pub fn into_values(self) -> BTreeMap<String, Value> {
        self.values
    }
}

impl std::ops::Index<&str> for QueryResponse {
    type Output = Value;

    /// Returns `Value::Null` for unknown queries, like indexing a JSON object.
    fn index(&self, query: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(query).unwrap_or(&NULL)
    }
}

impl<'a> IntoIterator for &'a QueryResponse {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Statistics from one query execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Total execution duration.
    pub duration: Duration,
    /// Number of component calls.
    pub workers_executed: usize,
    /// Number of workers served from the component cache.
    pub component_cache_hits: usize,
    /// Whether the store was preloaded from a whole-model cache entry.
    pub model_cache_hit: bool,
    /// Number of waves executed.
    pub waves: usize,
}
