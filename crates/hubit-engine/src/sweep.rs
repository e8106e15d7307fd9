//! Parameter sweeps over input values.
//!
//! A sweep lists candidate values for input paths. `Model::get_many` runs
//! one query per combination, with the first path varying slowest.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use hubit_path::PathAddress;
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::result::QueryResponse;
use crate::tree;

/// Input document flattened to `path -> value`.
pub type FlatInput = BTreeMap<String, Value>;

type SkipFn = Arc<dyn Fn(&FlatInput) -> bool + Send + Sync>;

/// Candidate input values for a parameter sweep.
///
/// # Example
///
/// ```rust
/// use hubit_engine::ParameterSweep;
/// use serde_json::json;
///
/// let sweep = ParameterSweep::new()
///     .with_values("rooms[0].width", vec![json!(2.0), json!(3.0)])
///     .with_values("rooms[1].width", vec![json!(1.0), json!(4.0), json!(5.0)])
///     .skip_if(|flat| flat["rooms[0].width"] == json!(3.0) && flat["rooms[1].width"] == json!(5.0));
///
/// assert_eq!(sweep.len(), 6);
/// ```
#[derive(Clone, Default)]
pub struct ParameterSweep {
    values: Vec<(String, Vec<Value>)>,
    skip: Option<SkipFn>,
}

impl ParameterSweep {
    /// Creates an empty sweep. An empty sweep has one combination: the
    /// input as it is.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds candidate values for a concrete input path.
    pub fn with_values(mut self, path: impl Into<String>, values: impl IntoIterator<Item = Value>) -> Self {
        self.values.push((path.into(), values.into_iter().collect()));
        self
    }

    /// Skips combinations whose flattened input matches `predicate`.
    pub fn skip_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&FlatInput) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(predicate));
        self
    }

    /// Number of combinations, skipped ones included.
    pub fn len(&self) -> usize {
        self.values.iter().map(|(_, values)| values.len()).product()
    }

    /// Returns true if the sweep has no combination.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds one input document per combination.
    ///
    /// Every path must be concrete and present in `input`.
    pub fn combinations(&self, input: &Value) -> EngineResult<Vec<Value>> {
        let paths = self
            .values
            .iter()
            .map(|(raw, _)| -> EngineResult<PathAddress> {
                let path = PathAddress::parse_query(raw)?;
                if !path.is_concrete() {
                    return Err(EngineError::query(raw, "sweep paths must be concrete"));
                }
                if tree::lookup(input, &path).is_none() {
                    return Err(EngineError::query(raw, "sweep path not present in the input"));
                }
                Ok(path)
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let mut combinations = Vec::with_capacity(self.len());
        let mut odometer = vec![0usize; self.values.len()];
        for _ in 0..self.len() {
            let mut document = input.clone();
            for ((path, (_, values)), &choice) in paths.iter().zip(&self.values).zip(&odometer) {
                let slot = tree::lookup_mut(&mut document, path).ok_or_else(|| {
                    EngineError::query(path, "sweep path not present in the input")
                })?;
                *slot = values[choice].clone();
            }
            combinations.push(document);

            // Last path varies fastest.
            for (digit, (_, values)) in odometer.iter_mut().zip(&self.values).rev() {
                *digit += 1;
                if *digit < values.len() {
                    break;
                }
                *digit = 0;
            }
        }
        Ok(combinations)
    }

    pub(crate) fn skips(&self, flat: &FlatInput) -> bool {
        self.skip.as_ref().is_some_and(|skip| skip(flat))
    }
}

impl fmt::Debug for ParameterSweep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterSweep")
            .field("values", &self.values)
            .field("skip", &self.skip.is_some())
            .finish()
    }
}

/// Responses of a parameter sweep, in combination order.
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    /// One response per combination that ran.
    pub responses: Vec<QueryResponse>,
    /// Flattened input used for each response.
    pub flat_inputs: Vec<FlatInput>,
    /// Flattened inputs of combinations rejected by the skip predicate.
    pub skipped: Vec<FlatInput>,
}

impl SweepOutcome {
    /// Number of combinations that ran.
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    /// Returns true if no combination ran.
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Iterates over `(flat input, response)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&FlatInput, &QueryResponse)> {
        self.flat_inputs.iter().zip(&self.responses)
    }
}

/// Flattens a document into `path -> value` pairs.
///
/// Objects expand to `a.b` and lists to `a[0]`, recursively, so every
/// scalar is keyed by its own concrete path. Empty objects and lists are
/// kept as values.
pub fn flatten(value: &Value) -> FlatInput {
    let mut flat = FlatInput::new();
    flatten_into(value, "", &mut flat);
    flat
}

fn flatten_into(value: &Value, prefix: &str, flat: &mut FlatInput) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(child, &path, flat);
            }
        }
        Value::Array(items) if !prefix.is_empty() && !items.is_empty() => {
            for (i, item) in items.iter().enumerate() {
                flatten_into(item, &format!("{}[{}]", prefix, i), flat);
            }
        }
        _ => {
            flat.insert(prefix.to_string(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten() {
        let flat = flatten(&json!({
            "name": "house",
            "rooms": [{"width": 1.0, "tags": ["a", "b"]}, {"width": 2.0, "tags": []}],
            "origin": {"x": 0, "y": [1, 2]}
        }));
        assert_eq!(flat["name"], json!("house"));
        assert_eq!(flat["rooms[0].width"], json!(1.0));
        assert_eq!(flat["rooms[1].tags"], json!([]));
        assert_eq!(flat["rooms[0].tags[0]"], json!("a"));
        assert_eq!(flat["rooms[0].tags[1]"], json!("b"));
        assert_eq!(flat["origin.y[1]"], json!(2));
        assert!(!flat.contains_key("origin.y"));
        assert_eq!(flat.len(), 9);
    }

    #[test]
    fn test_flatten_keeps_empty_containers() {
        let flat = flatten(&json!({
            "rooms": [{}, {"width": 2.0}],
            "grid": [[1, 2], []],
            "meta": {}
        }));
        assert_eq!(flat["rooms[0]"], json!({}));
        assert_eq!(flat["rooms[1].width"], json!(2.0));
        assert_eq!(flat["grid[0][1]"], json!(2));
        assert_eq!(flat["grid[1]"], json!([]));
        assert_eq!(flat["meta"], json!({}));
        assert_eq!(flat.len(), 6);
    }

    #[test]
    fn test_combinations_first_path_slowest() {
        let input = json!({"a": 0, "b": {"c": 0}});
        let sweep = ParameterSweep::new()
            .with_values("a", vec![json!(1), json!(2)])
            .with_values("b.c", vec![json!(10), json!(20), json!(30)]);

        let combinations = sweep.combinations(&input).unwrap();
        let pairs: Vec<(Value, Value)> = combinations
            .iter()
            .map(|doc| (doc["a"].clone(), doc["b"]["c"].clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (json!(1), json!(10)),
                (json!(1), json!(20)),
                (json!(1), json!(30)),
                (json!(2), json!(10)),
                (json!(2), json!(20)),
                (json!(2), json!(30)),
            ]
        );
        // the source document is not modified
        assert_eq!(input["a"], json!(0));
    }

    #[test]
    fn test_empty_sweep_has_one_combination() {
        let input = json!({"a": 1});
        let combinations = ParameterSweep::new().combinations(&input).unwrap();
        assert_eq!(combinations, vec![input]);
    }

    #[test]
    fn test_empty_candidate_list() {
        let sweep = ParameterSweep::new().with_values("a", Vec::new());
        assert!(sweep.is_empty());
        assert!(sweep.combinations(&json!({"a": 1})).unwrap().is_empty());
    }

    #[test]
    fn test_missing_path_fails() {
        let sweep = ParameterSweep::new().with_values("nope", vec![json!(1)]);
        let err = sweep.combinations(&json!({"a": 1})).unwrap_err();
        assert!(err.is_query_error());
    }

    #[test]
    fn test_wildcard_path_fails() {
        let sweep = ParameterSweep::new().with_values("a[:]", vec![json!(1)]);
        assert!(sweep.combinations(&json!({"a": [1]})).is_err());
    }

    #[test]
    fn test_skip_predicate() {
        let sweep = ParameterSweep::new().skip_if(|flat| flat.get("a") == Some(&json!(2)));
        assert!(sweep.skips(&flatten(&json!({"a": 2}))));
        assert!(!sweep.skips(&flatten(&json!({"a": 3}))));
        assert!(!ParameterSweep::new().skips(&FlatInput::new()));
    }
}
