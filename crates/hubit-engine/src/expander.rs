//! Query expansion.
//!
//! Turns a query with `[:]` or `[-1]` segments into concrete paths arranged
//! in the nesting implied by the wildcards. Axis lengths come from the input
//! document when the axis exists there, otherwise from the components that
//! provide the axis.

use std::collections::HashSet;

use hubit_path::{Bindings, InternalPath, PathAddress, Segment};
use serde_json::Value;

use crate::component::{binder_position, ComponentSpec};
use crate::error::{EngineError, EngineResult};
use crate::tree;

/// Concrete paths of one query, nested like its wildcards.
///
/// The outermost wildcard is the outermost list (row-major).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// A single concrete path.
    Leaf(PathAddress),
    /// One entry per index of a wildcard axis.
    List(Vec<Expansion>),
}

impl Expansion {
    /// Every concrete path, in row-major order.
    pub fn leaves(&self) -> Vec<&PathAddress> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a PathAddress>) {
        match self {
            Expansion::Leaf(path) => out.push(path),
            Expansion::List(items) => items.iter().for_each(|item| item.collect_leaves(out)),
        }
    }

    /// Builds a value of the same shape, mapping each leaf with `f`.
    pub fn try_map<F>(&self, f: &mut F) -> EngineResult<Value>
    where
        F: FnMut(&PathAddress) -> EngineResult<Value>,
    {
        match self {
            Expansion::Leaf(path) => f(path),
            Expansion::List(items) => items
                .iter()
                .map(|item| item.try_map(f))
                .collect::<EngineResult<Vec<_>>>()
                .map(Value::Array),
        }
    }
}

/// Expands queries against a component set and an input document.
#[derive(Debug, Clone, Copy)]
pub struct QueryExpander<'a> {
    components: &'a [ComponentSpec],
    input: &'a Value,
}

impl<'a> QueryExpander<'a> {
    /// Creates an expander.
    pub fn new(components: &'a [ComponentSpec], input: &'a Value) -> Self {
        Self { components, input }
    }

    /// Expands `query` into its concrete paths.
    ///
    /// `[:]` and `[:@IDX]` segments fan out over the whole axis, `[-1]`
    /// selects its last element. Concrete queries expand to a single leaf;
    /// whether that leaf can be computed is decided during resolution.
    pub fn expand(&self, query: &PathAddress) -> EngineResult<Expansion> {
        let Some(position) = query.first_open() else {
            return Ok(Expansion::Leaf(query.clone()));
        };

        let prefix = query.prefix(position);
        let length = self.extent(&prefix)?.ok_or_else(|| {
            EngineError::query(
                query,
                format!(
                    "the length of '{}' is given by neither the input nor any component",
                    prefix
                ),
            )
        })?;

        let concrete_at = |i: usize| -> EngineResult<PathAddress> {
            query.with_segment(position, Segment::Index(i)).ok_or_else(|| {
                EngineError::Internal(format!("'{}' has no segment {}", query, position))
            })
        };

        match &query.segments()[position] {
            Segment::Wildcard | Segment::Range(_) => (0..length)
                .map(|i| self.expand(&concrete_at(i)?))
                .collect::<EngineResult<Vec<_>>>()
                .map(Expansion::List),
            Segment::Last => {
                if length == 0 {
                    return Err(EngineError::query(
                        query,
                        format!("'{}' is empty so it has no last element", prefix),
                    ));
                }
                self.expand(&concrete_at(length - 1)?)
            }
            Segment::Binder(name) => Err(EngineError::Internal(format!(
                "binder '{}' left unbound in '{}'",
                name, query
            ))),
            Segment::Key(_) | Segment::Index(_) => Err(EngineError::Internal(format!(
                "segment {} of '{}' reported as open",
                position, query
            ))),
        }
    }

    /// Length of the sequence at a concrete path, if it can be determined.
    pub fn extent(&self, prefix: &PathAddress) -> EngineResult<Option<usize>> {
        self.find_extent(prefix, &mut HashSet::new())
    }

    fn find_extent(
        &self,
        prefix: &PathAddress,
        visited: &mut HashSet<InternalPath>,
    ) -> EngineResult<Option<usize>> {
        if let Some(node) = tree::lookup(self.input, prefix) {
            return match node {
                Value::Array(items) => Ok(Some(items.len())),
                _ => Err(EngineError::query(prefix, "not a sequence in the input")),
            };
        }
        if !visited.insert(prefix.to_internal()) {
            return Ok(None);
        }

        for component in self.components {
            for binding in component.provides() {
                let template = &binding.path;
                let Some(Segment::Binder(binder)) = template.segments().get(prefix.len()) else {
                    continue;
                };
                let Some(bindings) = template.match_prefix(prefix) else {
                    continue;
                };
                if let Some(length) = self.binder_extent(component, binder, &bindings, visited)? {
                    return Ok(Some(length));
                }
            }
        }
        Ok(None)
    }

    /// Derives the range of `binder` from the paths the component consumes.
    fn binder_extent(
        &self,
        component: &ComponentSpec,
        binder: &str,
        bindings: &Bindings,
        visited: &mut HashSet<InternalPath>,
    ) -> EngineResult<Option<usize>> {
        let consumes = component
            .consumes_input()
            .iter()
            .map(|b| (b, true))
            .chain(component.consumes_results().iter().map(|b| (b, false)));

        for (binding, from_input) in consumes {
            let Some(position) = binder_position(&binding.path, binder) else {
                continue;
            };
            let Ok(bound) = binding.path.prefix(position).bind(bindings) else {
                continue;
            };
            if !bound.is_concrete() {
                continue;
            }
            let found = if from_input {
                match tree::lookup(self.input, &bound) {
                    Some(Value::Array(items)) => Some(items.len()),
                    _ => None,
                }
            } else {
                self.find_extent(&bound, visited)?
            };
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentError, LocalValues};
    use serde_json::json;

    fn identity(inputs: &LocalValues) -> Result<LocalValues, ComponentError> {
        Ok(inputs.clone())
    }

    fn query(s: &str) -> PathAddress {
        PathAddress::parse_query(s).unwrap()
    }

    fn leaf_strings(expansion: &Expansion) -> Vec<String> {
        expansion.leaves().iter().map(|p| p.to_string()).collect()
    }

    fn area_components() -> Vec<ComponentSpec> {
        vec![
            ComponentSpec::builder("area")
                .consumes_input("width", "rooms[IDX].width")
                .provides("area", "rooms[IDX].area")
                .func(identity)
                .build()
                .unwrap(),
            ComponentSpec::builder("cost")
                .consumes_result("area", "rooms[IDX].area")
                .provides("cost", "costs[IDX].value")
                .func(identity)
                .build()
                .unwrap(),
        ]
    }

    #[test]
    fn test_concrete_query_is_leaf() {
        let input = json!({});
        let expander = QueryExpander::new(&[], &input);
        let expansion = expander.expand(&query("a.b[0]")).unwrap();
        assert_eq!(expansion, Expansion::Leaf(query("a.b[0]")));
    }

    #[test]
    fn test_wildcard_from_input() {
        let input = json!({"a": [{"b": 1}, {"b": 2}]});
        let expander = QueryExpander::new(&[], &input);
        let expansion = expander.expand(&query("a[:].b")).unwrap();
        assert_eq!(leaf_strings(&expansion), vec!["a[0].b", "a[1].b"]);
        assert!(matches!(expansion, Expansion::List(ref items) if items.len() == 2));
    }

    #[test]
    fn test_nested_wildcards_row_major() {
        let input = json!({"a": [{"b": [{"c": 1}, {"c": 2}]}, {"b": [{"c": 3}]}]});
        let expander = QueryExpander::new(&[], &input);
        let expansion = expander.expand(&query("a[:].b[:].c")).unwrap();
        assert_eq!(
            leaf_strings(&expansion),
            vec!["a[0].b[0].c", "a[0].b[1].c", "a[1].b[0].c"]
        );
        let shape = expansion.try_map(&mut |_| Ok(json!(0))).unwrap();
        assert_eq!(shape, json!([[0, 0], [0]]));
    }

    #[test]
    fn test_last_index_from_input() {
        let input = json!({"a": [1, 2, 3]});
        let expander = QueryExpander::new(&[], &input);
        let expansion = expander.expand(&query("a[-1]")).unwrap();
        assert_eq!(expansion, Expansion::Leaf(query("a[2]")));
    }

    #[test]
    fn test_last_index_of_empty_sequence() {
        let input = json!({"a": []});
        let expander = QueryExpander::new(&[], &input);
        let err = expander.expand(&query("a[-1]")).unwrap_err();
        assert!(err.is_query_error());
    }

    #[test]
    fn test_wildcard_over_provider_axis() {
        let input = json!({"rooms": [{"width": 1}, {"width": 2}, {"width": 3}]});
        let components = area_components();
        let expander = QueryExpander::new(&components, &input);

        // `costs` exists only as component output; its length follows the
        // chain costs -> rooms[IDX].area -> rooms[IDX].width.
        let expansion = expander.expand(&query("costs[:].value")).unwrap();
        assert_eq!(
            leaf_strings(&expansion),
            vec!["costs[0].value", "costs[1].value", "costs[2].value"]
        );
        let last = expander.expand(&query("costs[-1].value")).unwrap();
        assert_eq!(last, Expansion::Leaf(query("costs[2].value")));
    }

    #[test]
    fn test_unknown_axis_fails() {
        let input = json!({"rooms": []});
        let components = area_components();
        let expander = QueryExpander::new(&components, &input);
        let err = expander.expand(&query("nothing[:].value")).unwrap_err();
        assert!(matches!(err, EngineError::Query { .. }));
    }

    #[test]
    fn test_wildcard_on_scalar_fails() {
        let input = json!({"a": 3});
        let expander = QueryExpander::new(&[], &input);
        assert!(expander.expand(&query("a[:]")).is_err());
    }

    #[test]
    fn test_range_segment_expands_like_wildcard() {
        let input = json!({"rooms": [{"width": 1}, {"width": 2}]});
        let template = PathAddress::parse_template("rooms[:@IDX].width").unwrap();
        let expander = QueryExpander::new(&[], &input);
        let expansion = expander.expand(&template).unwrap();
        assert_eq!(leaf_strings(&expansion), vec!["rooms[0].width", "rooms[1].width"]);
    }

    #[test]
    fn test_self_referencing_provider_terminates() {
        let components = vec![ComponentSpec::builder("loop")
            .consumes_result("x", "a[I].x")
            .provides("y", "a[I].x")
            .func(identity)
            .build()
            .unwrap()];
        let input = json!({});
        let expander = QueryExpander::new(&components, &input);
        assert_eq!(expander.extent(&query("a")).unwrap(), None);
    }
}
