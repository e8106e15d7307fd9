//! Path access into JSON-like documents.

use hubit_path::{PathAddress, Segment};
use serde_json::Value;

/// Returns the value at a concrete path.
///
/// `[-1]` selects the last element; other open segments never match.
pub(crate) fn lookup<'a>(root: &'a Value, path: &PathAddress) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |node, segment| match (segment, node) {
            (Segment::Key(key), Value::Object(map)) => map.get(key),
            (Segment::Index(i), Value::Array(items)) => items.get(*i),
            (Segment::Last, Value::Array(items)) => items.last(),
            _ => None,
        })
}

/// Mutable variant of [`lookup`] for concrete paths.
pub(crate) fn lookup_mut<'a>(root: &'a mut Value, path: &PathAddress) -> Option<&'a mut Value> {
    let mut node = root;
    for segment in path.segments() {
        node = match (segment, node) {
            (Segment::Key(key), Value::Object(map)) => map.get_mut(key)?,
            (Segment::Index(i), Value::Array(items)) => items.get_mut(*i)?,
            _ => return None,
        };
    }
    Some(node)
}

/// Every node below the root with its concrete path, children before parents.
pub(crate) fn nodes(root: &Value) -> Vec<(PathAddress, &Value)> {
    let mut out = Vec::new();
    collect_nodes(root, PathAddress::default(), &mut out);
    out
}

fn collect_nodes<'a>(node: &'a Value, path: PathAddress, out: &mut Vec<(PathAddress, &'a Value)>) {
    match node {
        Value::Object(map) => {
            for (key, child) in map {
                let mut child_path = path.clone();
                child_path.push(Segment::Key(key.clone()));
                collect_nodes(child, child_path, out);
            }
        }
        Value::Array(items) if !path.is_empty() => {
            for (i, child) in items.iter().enumerate() {
                let mut child_path = path.clone();
                child_path.push(Segment::Index(i));
                collect_nodes(child, child_path, out);
            }
        }
        _ => {}
    }
    if !path.is_empty() {
        out.push((path, node));
    }
}
