//! Error types for path parsing and binding.

use thiserror::Error;

/// Errors that can occur while parsing or binding a path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Syntax error at a specific position in the path string.
    #[error("invalid path '{path}' at position {position}: {message}")]
    InvalidPath {
        /// The offending path string.
        path: String,
        /// Position in the input where the error occurred.
        position: usize,
        /// Description of the error.
        message: String,
    },

    /// An index token is not allowed in the parsing context.
    #[error("invalid index '[{token}]' in '{path}': {expected}")]
    InvalidIndex {
        /// The offending path string.
        path: String,
        /// The index token as written.
        token: String,
        /// What the context accepts.
        expected: &'static str,
    },

    /// Empty input provided.
    #[error("empty path")]
    Empty,

    /// A binder has no value in the supplied bindings.
    #[error("unbound index binder '{binder}' in '{path}'")]
    UnboundBinder {
        /// Path being bound.
        path: String,
        /// Name of the binder without a value.
        binder: String,
    },

    /// Positional binding received the wrong number of indices.
    #[error("path '{path}' has {expected} open index segments but {actual} indices were given")]
    IndexCountMismatch {
        /// Path being bound.
        path: String,
        /// Number of open index segments in the path.
        expected: usize,
        /// Number of indices supplied.
        actual: usize,
    },
}

/// Result type for path operations.
pub type PathResult<T> = std::result::Result<T, PathError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_path_display() {
        let err = PathError::InvalidPath {
            path: "a[".to_string(),
            position: 1,
            message: "unexpected input at: '['".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid path 'a[' at position 1: unexpected input at: '['"
        );
    }

    #[test]
    fn test_unbound_binder_display() {
        let err = PathError::UnboundBinder {
            path: "list[IDX].area".to_string(),
            binder: "IDX".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unbound index binder 'IDX' in 'list[IDX].area'"
        );
    }
}
