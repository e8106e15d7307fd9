//! Configuration types for models and queries.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// When whole-model cache entries are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Whole-model caching disabled.
    #[default]
    None,
    /// Written once, after a successful query.
    AfterExecution,
    /// Merged after every completed wave of workers.
    Incremental,
}

impl FromStr for CacheMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "after_execution" => Ok(Self::AfterExecution),
            "incremental" => Ok(Self::Incremental),
            other => Err(EngineError::Config(format!(
                "unknown cache mode '{}', expected none, after_execution or incremental",
                other
            ))),
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::AfterExecution => "after_execution",
            Self::Incremental => "incremental",
        })
    }
}

/// Which previously known results a query may start from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UseResults {
    /// Compute everything the query needs.
    #[default]
    None,
    /// Start from the whole-model cache entry for the current input.
    Cached,
    /// Start from the results set with `Model::set_results`.
    Current,
}

impl FromStr for UseResults {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "cached" => Ok(Self::Cached),
            "current" => Ok(Self::Current),
            other => Err(EngineError::Config(format!(
                "unknown use_results '{}', expected none, cached or current",
                other
            ))),
        }
    }
}

/// Configuration for a [`Model`](crate::Model).
///
/// # Example
///
/// ```rust
/// use hubit_engine::{CacheConfig, CacheMode, ModelConfig};
///
/// let config = ModelConfig::builder()
///     .with_model_caching(CacheMode::AfterExecution)
///     .with_component_caching(true)
///     .with_cache(CacheConfig::default())
///     .with_threads(4)
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct ModelConfig {
    /// Whole-model cache population mode.
    pub model_caching: CacheMode,
    /// Per-component caching keyed by local input fingerprints.
    pub component_caching: bool,
    /// Cache capacities.
    pub cache: CacheConfig,
    /// Size of a dedicated worker pool for parallel queries
    /// (None = rayon's global pool).
    pub threads: Option<usize>,
}

impl ModelConfig {
    /// Creates a new builder for ModelConfig.
    pub fn builder() -> ModelConfigBuilder {
        ModelConfigBuilder::default()
    }
}

/// Builder for ModelConfig.
#[derive(Debug, Clone, Default)]
pub struct ModelConfigBuilder {
    model_caching: CacheMode,
    component_caching: bool,
    cache: CacheConfig,
    threads: Option<usize>,
}

impl ModelConfigBuilder {
    /// Sets the whole-model cache mode.
    pub fn with_model_caching(mut self, mode: CacheMode) -> Self {
        self.model_caching = mode;
        self
    }

    /// Enables or disables per-component caching.
    pub fn with_component_caching(mut self, enabled: bool) -> Self {
        self.component_caching = enabled;
        self
    }

    /// Sets cache capacities.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Uses a dedicated pool of `threads` workers for parallel queries.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Builds the ModelConfig.
    pub fn build(self) -> ModelConfig {
        ModelConfig {
            model_caching: self.model_caching,
            component_caching: self.component_caching,
            cache: self.cache,
            threads: self.threads,
        }
    }
}

/// Capacities of the two cache tiers.
///
/// Both tiers evict least-recently-used entries when full.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of whole-model entries (one per distinct input).
    pub max_model_entries: usize,
    /// Maximum number of per-component entries.
    pub max_component_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_model_entries: 64,
            max_component_entries: 100_000,
        }
    }
}

/// Per-call options for `Model::get`.
///
/// # Example
///
/// ```rust
/// use hubit_engine::{QueryOptions, UseResults};
///
/// let options = QueryOptions::default()
///     .with_results(UseResults::Cached)
///     .with_parallel(true);
/// assert!(options.validate);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Which known results the query may start from.
    pub use_results: UseResults,
    /// Run each wave of workers in parallel.
    pub parallel: bool,
    /// Resolve every query against an empty results store before running.
    pub validate: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            use_results: UseResults::None,
            parallel: false,
            validate: true,
        }
    }
}

impl QueryOptions {
    /// Sets which known results the query may start from.
    pub fn with_results(mut self, use_results: UseResults) -> Self {
        self.use_results = use_results;
        self
    }

    /// Enables or disables parallel wave execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Enables or disables up-front validation.
    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }
}
