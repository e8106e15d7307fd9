//! Path address types.
//!
//! A [`PathAddress`] is an ordered list of tagged [`Segment`]s. The same type
//! represents queries (`list[:].area`), concrete locations (`list[1].area`)
//! and component templates (`list[IDX].area`, `list[:@IDX].area`).

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{PathError, PathResult};

/// Concrete values for named index binders.
pub type Bindings = BTreeMap<String, usize>;

/// One segment of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Segment {
    /// Attribute key: `some_attr`.
    Key(String),
    /// Concrete, zero-based index: `[3]`.
    Index(usize),
    /// All elements: `[:]`.
    Wildcard,
    /// Last element: `[-1]`.
    Last,
    /// Named binder, one worker per value: `[IDX]`.
    Binder(String),
    /// Named range binder, all elements gathered into one list: `[:@IDX]`.
    Range(String),
}

impl Segment {
    /// Returns true for every segment kind except [`Segment::Key`].
    pub fn is_index(&self) -> bool {
        !matches!(self, Segment::Key(_))
    }

    /// Returns true if the segment names an exact location.
    pub fn is_concrete(&self) -> bool {
        matches!(self, Segment::Key(_) | Segment::Index(_))
    }

    /// Returns true for segments that still need an index value.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            Segment::Wildcard | Segment::Last | Segment::Binder(_) | Segment::Range(_)
        )
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => write!(f, "{}", key),
            Segment::Index(i) => write!(f, "[{}]", i),
            Segment::Wildcard => write!(f, "[:]"),
            Segment::Last => write!(f, "[-1]"),
            Segment::Binder(name) => write!(f, "[{}]", name),
            Segment::Range(name) => write!(f, "[:@{}]", name),
        }
    }
}

/// Canonical string form of a path, used as a map key by stores and caches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InternalPath(String);

impl InternalPath {
    /// Returns the canonical string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InternalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InternalPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A hierarchical, indexable attribute path.
///
/// # Example
///
/// ```rust
/// use hubit_path::{PathAddress, Segment};
///
/// let path = PathAddress::parse_query("list[1].some_attr.numbers").unwrap();
/// assert_eq!(path.len(), 4);
/// assert_eq!(path.segments()[1], Segment::Index(1));
/// assert!(path.is_concrete());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PathAddress {
    segments: Vec<Segment>,
}

impl PathAddress {
    /// Creates a path from segments.
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Returns the segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Consumes the path and returns its segments.
    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true if the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns true if every segment is a key or a concrete index.
    pub fn is_concrete(&self) -> bool {
        self.segments.iter().all(Segment::is_concrete)
    }

    /// Returns true if any segment is `[:]` or `[-1]`.
    pub fn has_wildcards(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Wildcard | Segment::Last))
    }

    /// Position of the first segment that is not concrete.
    pub fn first_open(&self) -> Option<usize> {
        self.segments.iter().position(Segment::is_open)
    }

    /// Names of `[IDX]` binders in order of first appearance.
    pub fn binders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Binder(name) = segment {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Names of `[:@IDX]` range binders in order of appearance.
    pub fn range_binders(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Range(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Returns the first `len` segments as a new path.
    pub fn prefix(&self, len: usize) -> PathAddress {
        PathAddress::new(self.segments[..len.min(self.segments.len())].to_vec())
    }

    /// Returns a copy with the segment at `position` replaced, or `None` if
    /// the path has no such segment.
    pub fn with_segment(&self, position: usize, segment: Segment) -> Option<PathAddress> {
        let mut segments = self.segments.clone();
        *segments.get_mut(position)? = segment;
        Some(PathAddress::new(segments))
    }

    /// Appends a segment.
    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Canonical key form of this path.
    pub fn to_internal(&self) -> InternalPath {
        InternalPath(self.to_string())
    }

    /// Substitutes `[IDX]` binders with their values from `bindings`.
    ///
    /// Range binders, wildcards and last-index segments are left untouched.
    pub fn bind(&self, bindings: &Bindings) -> PathResult<PathAddress> {
        let segments = self
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Binder(name) => bindings
                    .get(name)
                    .map(|&i| Segment::Index(i))
                    .ok_or_else(|| PathError::UnboundBinder {
                        path: self.to_string(),
                        binder: name.clone(),
                    }),
                other => Ok(other.clone()),
            })
            .collect::<PathResult<Vec<_>>>()?;
        Ok(PathAddress::new(segments))
    }

    /// Substitutes every open segment, left to right, with `indices`.
    pub fn bind_positional(&self, indices: &[usize]) -> PathResult<PathAddress> {
        let open = self.segments.iter().filter(|s| s.is_open()).count();
        if open != indices.len() {
            return Err(PathError::IndexCountMismatch {
                path: self.to_string(),
                expected: open,
                actual: indices.len(),
            });
        }
        let mut next = indices.iter();
        let segments = self
            .segments
            .iter()
            .map(|segment| {
                if segment.is_open() {
                    // counted above, the iterator cannot run dry here
                    next.next()
                        .map(|&i| Segment::Index(i))
                        .unwrap_or_else(|| segment.clone())
                } else {
                    segment.clone()
                }
            })
            .collect();
        Ok(PathAddress::new(segments))
    }

    /// Matches this template against a concrete path.
    ///
    /// Returns the binder values on success. Keys must be equal, fixed
    /// indices must be equal, and a binder repeated in the template must
    /// bind the same value each time.
    pub fn match_concrete(&self, concrete: &PathAddress) -> Option<Bindings> {
        if self.len() != concrete.len() {
            return None;
        }
        self.match_segments(&concrete.segments)
    }

    /// Like [`PathAddress::match_concrete`] but only compares the first
    /// `prefix.len()` segments of the template.
    pub fn match_prefix(&self, prefix: &PathAddress) -> Option<Bindings> {
        if prefix.len() > self.len() {
            return None;
        }
        self.match_segments(&prefix.segments)
    }

    fn match_segments(&self, concrete: &[Segment]) -> Option<Bindings> {
        let mut bindings = Bindings::new();
        for (template, segment) in self.segments.iter().zip(concrete) {
            match (template, segment) {
                (Segment::Key(a), Segment::Key(b)) if a == b => {}
                (Segment::Index(a), Segment::Index(b)) if a == b => {}
                (Segment::Binder(name), Segment::Index(i))
                | (Segment::Range(name), Segment::Index(i)) => {
                    if let Some(previous) = bindings.insert(name.clone(), *i) {
                        if previous != *i {
                            return None;
                        }
                    }
                }
                _ => return None,
            }
        }
        Some(bindings)
    }
}

impl fmt::Display for PathAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 && !segment.is_index() {
                f.write_str(".")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl From<Vec<Segment>> for PathAddress {
    fn from(segments: Vec<Segment>) -> Self {
        Self::new(segments)
    }
}

/// Substitutes open segments of `template` positionally with `indices`.
pub fn bind_index(template: &PathAddress, indices: &[usize]) -> PathResult<PathAddress> {
    template.bind_positional(indices)
}

/// Structural compatibility of a template and a concrete path.
///
/// Keys must match; any index kind in the template accepts any concrete
/// index unless it is a fixed index, which must be equal.
pub fn matches(template: &PathAddress, concrete: &PathAddress) -> bool {
    template.len() == concrete.len()
        && template
            .segments
            .iter()
            .zip(&concrete.segments)
            .all(|(t, c)| match (t, c) {
                (Segment::Key(a), Segment::Key(b)) => a == b,
                (Segment::Index(a), Segment::Index(b)) => a == b,
                (Segment::Key(_), _) | (_, Segment::Key(_)) => false,
                _ => true,
            })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: &str) -> Segment {
        Segment::Key(k.to_string())
    }

    fn binder(name: &str) -> Segment {
        Segment::Binder(name.to_string())
    }

    #[test]
    fn test_display_round_trip_shape() {
        let path = PathAddress::new(vec![
            key("list"),
            Segment::Index(1),
            key("some_attr"),
            Segment::Wildcard,
            Segment::Last,
            Segment::Range("J".to_string()),
        ]);
        assert_eq!(path.to_string(), "list[1].some_attr[:][-1][:@J]");
    }

    #[test]
    fn test_binders_deduplicated_in_order() {
        let path = PathAddress::new(vec![
            key("a"),
            binder("I"),
            key("b"),
            binder("J"),
            key("c"),
            binder("I"),
        ]);
        assert_eq!(path.binders(), vec!["I", "J"]);
    }

    #[test]
    fn test_with_segment() {
        let path = PathAddress::new(vec![key("a"), Segment::Wildcard, key("b")]);
        let concrete = path.with_segment(1, Segment::Index(4)).unwrap();
        assert_eq!(concrete.to_string(), "a[4].b");
        assert_eq!(path.to_string(), "a[:].b");
        assert!(path.with_segment(3, Segment::Index(0)).is_none());
    }

    #[test]
    fn test_bind_named() {
        let template = PathAddress::new(vec![key("list"), binder("IDX"), key("area")]);
        let mut bindings = Bindings::new();
        bindings.insert("IDX".to_string(), 4);

        let bound = template.bind(&bindings).unwrap();
        assert_eq!(bound.to_string(), "list[4].area");
        assert!(bound.is_concrete());
    }

    #[test]
    fn test_bind_missing_binder() {
        let template = PathAddress::new(vec![key("list"), binder("IDX")]);
        let err = template.bind(&Bindings::new()).unwrap_err();
        assert!(matches!(err, PathError::UnboundBinder { .. }));
    }

    #[test]
    fn test_bind_positional() {
        let query = PathAddress::new(vec![
            key("a"),
            Segment::Wildcard,
            key("b"),
            Segment::Wildcard,
            key("c"),
        ]);
        let bound = bind_index(&query, &[1, 0]).unwrap();
        assert_eq!(bound.to_string(), "a[1].b[0].c");
    }

    #[test]
    fn test_bind_positional_count_mismatch() {
        let query = PathAddress::new(vec![key("a"), Segment::Wildcard]);
        let err = query.bind_positional(&[1, 2]).unwrap_err();
        assert!(matches!(
            err,
            PathError::IndexCountMismatch {
                expected: 1,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_match_concrete_binds() {
        let template = PathAddress::new(vec![key("list"), binder("IDX"), key("area")]);
        let concrete = PathAddress::new(vec![key("list"), Segment::Index(2), key("area")]);

        let bindings = template.match_concrete(&concrete).unwrap();
        assert_eq!(bindings.get("IDX"), Some(&2));
    }

    #[test]
    fn test_match_concrete_rejects_inconsistent_binder() {
        let template = PathAddress::new(vec![key("m"), binder("I"), binder("I")]);
        let ok = PathAddress::new(vec![key("m"), Segment::Index(1), Segment::Index(1)]);
        let bad = PathAddress::new(vec![key("m"), Segment::Index(1), Segment::Index(0)]);

        assert!(template.match_concrete(&ok).is_some());
        assert!(template.match_concrete(&bad).is_none());
    }

    #[test]
    fn test_match_concrete_fixed_index() {
        let template = PathAddress::new(vec![key("list"), Segment::Index(0), key("x")]);
        let zero = PathAddress::new(vec![key("list"), Segment::Index(0), key("x")]);
        let one = PathAddress::new(vec![key("list"), Segment::Index(1), key("x")]);

        assert!(template.match_concrete(&zero).is_some());
        assert!(template.match_concrete(&one).is_none());
    }

    #[test]
    fn test_match_prefix() {
        let template = PathAddress::new(vec![key("out"), binder("I"), key("v")]);
        let prefix = PathAddress::new(vec![key("out")]);
        assert_eq!(template.match_prefix(&prefix), Some(Bindings::new()));
        assert!(template
            .match_prefix(&PathAddress::new(vec![key("other")]))
            .is_none());
    }

    #[test]
    fn test_matches_ignores_index_concreteness() {
        let template = PathAddress::new(vec![key("a"), binder("I"), key("b")]);
        let query = PathAddress::new(vec![key("a"), Segment::Wildcard, key("b")]);
        let wrong = PathAddress::new(vec![key("a"), key("b"), key("b")]);

        assert!(matches(&template, &query));
        assert!(!matches(&template, &wrong));
    }

    #[test]
    fn test_internal_is_canonical() {
        let a = PathAddress::new(vec![key("a"), Segment::Index(0), key("b")]);
        assert_eq!(a.to_internal().as_str(), "a[0].b");
    }

    #[test]
    fn test_first_open() {
        let path = PathAddress::new(vec![key("a"), Segment::Index(0), Segment::Wildcard]);
        assert_eq!(path.first_open(), Some(2));
        assert_eq!(path.prefix(2).to_string(), "a[0]");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_keeps_segment_kinds() {
        let path = PathAddress::new(vec![key("a"), binder("I"), Segment::Range("J".to_string())]);
        let json = serde_json::to_string(&path).unwrap();
        let back: PathAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
