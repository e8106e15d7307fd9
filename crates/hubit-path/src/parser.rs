//! Path parser implementation using nom.
//!
//! Grammar:
//!
//! ```text
//! path      = component ( "." component )*
//! component = key ( "[" index "]" )*
//! key       = [A-Za-z0-9_]+
//! index     = digits | ":" | "-1" | ":@" ident | ident
//! ```
//!
//! Which index forms are accepted depends on the context: queries take
//! `digits | : | -1`, templates take `digits | ident | :@ident`.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0, satisfy},
    combinator::{all_consuming, map, map_res, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded},
    IResult,
};

use crate::address::{InternalPath, PathAddress, Segment};
use crate::error::{PathError, PathResult};

const QUERY_INDEX: &str = "expected a non-negative integer, ':' or '-1'";
const TEMPLATE_INDEX: &str = "expected a non-negative integer, a binder or ':@binder'";

impl PathAddress {
    /// Parses a query path. Same as [`PathAddress::parse_query`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hubit_path::PathAddress;
    ///
    /// let path = PathAddress::parse("segments[:].layers[-1].thickness").unwrap();
    /// assert!(path.has_wildcards());
    /// assert!(PathAddress::parse("segments[IDX].thickness").is_err());
    /// ```
    pub fn parse(input: &str) -> PathResult<PathAddress> {
        PathAddress::parse_query(input)
    }

    /// Parses a query path: indices must be integers, `:` or `-1`.
    pub fn parse_query(input: &str) -> PathResult<PathAddress> {
        let path = parse_any(input)?;
        for segment in path.segments() {
            if matches!(segment, Segment::Binder(_) | Segment::Range(_)) {
                return Err(invalid_index(input, segment, QUERY_INDEX));
            }
        }
        Ok(path)
    }

    /// Parses a component template: indices must be integers, binders or
    /// range binders.
    pub fn parse_template(input: &str) -> PathResult<PathAddress> {
        let path = parse_any(input)?;
        for segment in path.segments() {
            if matches!(segment, Segment::Wildcard | Segment::Last) {
                return Err(invalid_index(input, segment, TEMPLATE_INDEX));
            }
        }
        Ok(path)
    }
}

impl std::str::FromStr for PathAddress {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PathAddress::parse(s)
    }
}

/// Parses a query path string. Binder and range indices are rejected.
pub fn parse(input: &str) -> PathResult<PathAddress> {
    PathAddress::parse_query(input)
}

/// Parses a path string accepting every index form.
fn parse_any(input: &str) -> PathResult<PathAddress> {
    let input = input.trim();
    if input.is_empty() {
        return Err(PathError::Empty);
    }

    match all_consuming(path)(input) {
        Ok((_, segments)) => Ok(PathAddress::new(segments)),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let position = input.len() - e.input.len();
            Err(PathError::InvalidPath {
                path: input.to_string(),
                position,
                message: format!("unexpected input at: '{}'", truncate(e.input, 20)),
            })
        }
        Err(nom::Err::Incomplete(_)) => Err(PathError::InvalidPath {
            path: input.to_string(),
            position: input.len(),
            message: "incomplete path".to_string(),
        }),
    }
}

/// Parses a query path and returns its canonical key form.
pub fn to_internal(input: &str) -> PathResult<InternalPath> {
    Ok(PathAddress::parse_query(input)?.to_internal())
}

fn invalid_index(input: &str, segment: &Segment, expected: &'static str) -> PathError {
    let written = segment.to_string();
    PathError::InvalidIndex {
        path: input.trim().to_string(),
        token: written.trim_start_matches('[').trim_end_matches(']').to_string(),
        expected,
    }
}

fn truncate(s: &str, max_len: usize) -> &str {
    match s.char_indices().nth(max_len) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

// ============================================================================
// Path structure
// ============================================================================

fn path(input: &str) -> IResult<&str, Vec<Segment>> {
    let (input, first) = component(input)?;
    let (input, rest) = many0(preceded(char('.'), component))(input)?;

    let mut segments = first;
    for part in rest {
        segments.extend(part);
    }
    Ok((input, segments))
}

fn component(input: &str) -> IResult<&str, Vec<Segment>> {
    let (input, name) = key(input)?;
    let (input, indices) = many0(bracketed_index)(input)?;

    let mut segments = Vec::with_capacity(indices.len() + 1);
    segments.push(Segment::Key(name.to_string()));
    segments.extend(indices);
    Ok((input, segments))
}

fn key(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

// ============================================================================
// Index specifiers
// ============================================================================

fn bracketed_index(input: &str) -> IResult<&str, Segment> {
    delimited(pair(char('['), ws), index_spec, pair(ws, char(']')))(input)
}

fn index_spec(input: &str) -> IResult<&str, Segment> {
    alt((
        // Order matters - ":@" before ":"
        map(preceded(tag(":@"), identifier), |name| {
            Segment::Range(name.to_string())
        }),
        value(Segment::Wildcard, char(':')),
        value(Segment::Last, tag("-1")),
        map_res(digit1, |digits: &str| digits.parse::<usize>().map(Segment::Index)),
        map(identifier, |name| Segment::Binder(name.to_string())),
    ))(input)
}

/// Optional whitespace
fn ws(input: &str) -> IResult<&str, &str> {
    multispace0(input)
}
