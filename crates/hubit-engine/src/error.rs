//! Error types for model construction and query execution.

use hubit_path::PathError;
use thiserror::Error;

/// Errors that can occur while building a model or running a query.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A query or validation was attempted before `set_input`.
    #[error("no input data set on the model")]
    NoInput,

    /// A path cannot be resolved against the model.
    #[error("cannot resolve '{path}': {reason}")]
    Query {
        /// The path that failed to resolve.
        path: String,
        /// Why it failed.
        reason: String,
    },

    /// Dependency resolution revisited a worker still on the resolution stack.
    #[error("cyclic dependency: {chain}")]
    Cyclic {
        /// Workers on the cycle, outermost first.
        chain: String,
    },

    /// More than one component provides the same concrete path.
    #[error("ambiguous provider for '{path}': {candidates}")]
    AmbiguousProvider {
        /// The concrete path.
        path: String,
        /// Comma separated provider names.
        candidates: String,
    },

    /// Malformed path syntax.
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),

    /// A component function failed or returned incomplete outputs.
    #[error("component '{component}' failed: {message}")]
    Computation {
        /// Component name.
        component: String,
        /// Error reported by the component.
        message: String,
    },

    /// A cache entry is inconsistent with the model. Recover with `clear_cache`.
    #[error("cache corruption: {0}")]
    CacheCorruption(String),

    /// The component declarations are inconsistent.
    #[error("invalid model: {0}")]
    Model(String),

    /// An option string or configuration value is not recognized.
    #[error("invalid option: {0}")]
    Config(String),

    /// `RunLog::get_all` was asked for a field entries do not have.
    #[error("unknown run log field: {0}")]
    UnknownLogField(String),

    /// An engine invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Creates a query resolution error.
    pub fn query(path: impl ToString, reason: impl Into<String>) -> Self {
        Self::Query {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a computation error for a component.
    pub fn computation(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Computation {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Returns true for the kinds that mean "this query cannot be answered":
    /// unresolvable paths, cycles and ambiguous providers.
    pub fn is_query_error(&self) -> bool {
        matches!(
            self,
            Self::Query { .. } | Self::Cyclic { .. } | Self::AmbiguousProvider { .. }
        )
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
