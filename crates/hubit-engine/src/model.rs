//! The model: components, input data, caches and run log.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use hubit_path::PathAddress;
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::{CacheStats, ResultCache};
use crate::component::{check_registry, ComponentSpec};
use crate::config::{CacheMode, ModelConfig, QueryOptions, UseResults};
use crate::error::{EngineError, EngineResult};
use crate::planner::ExecutionPlan;
use crate::result::{ExecutionStats, QueryResponse};
use crate::run_log::{RunLog, RunLogEntry};
use crate::runner::QueryRunner;
use crate::store::ResultsStore;
use crate::sweep::{flatten, ParameterSweep, SweepOutcome};

/// A set of components evaluated against an input document.
///
/// # Example
///
/// ```rust
/// use hubit_engine::{ComponentSpec, LocalValues, Model, QueryOptions};
/// use serde_json::json;
///
/// let area = ComponentSpec::builder("area")
///     .consumes_input("width", "rooms[IDX].width")
///     .consumes_input("depth", "rooms[IDX].depth")
///     .provides("area", "rooms[IDX].area")
///     .func(|inputs: &LocalValues| {
///         let width = inputs["width"].as_f64().ok_or("width is not a number")?;
///         let depth = inputs["depth"].as_f64().ok_or("depth is not a number")?;
///         let mut out = LocalValues::new();
///         out.insert("area".to_string(), json!(width * depth));
///         Ok(out)
///     })
///     .build()
///     .unwrap();
///
/// let mut model = Model::new(vec![area]).unwrap();
/// model.set_input(json!({"rooms": [
///     {"width": 2.0, "depth": 3.0},
///     {"width": 4.0, "depth": 1.0}
/// ]}));
///
/// let response = model.get(&["rooms[:].area"], QueryOptions::default()).unwrap();
/// assert_eq!(response["rooms[:].area"], json!([6.0, 4.0]));
/// ```
#[derive(Debug)]
pub struct Model {
    components: Vec<ComponentSpec>,
    input: Option<Arc<Value>>,
    results: Option<Arc<Value>>,
    config: ModelConfig,
    cache: ResultCache,
    log: RunLog,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl Model {
    /// Creates a model with the default configuration.
    pub fn new(components: Vec<ComponentSpec>) -> EngineResult<Self> {
        Self::with_config(components, ModelConfig::default())
    }

    /// Creates a model with a custom configuration.
    pub fn with_config(components: Vec<ComponentSpec>, config: ModelConfig) -> EngineResult<Self> {
        check_registry(&components)?;
        if config.threads == Some(0) {
            return Err(EngineError::Config("threads must be at least 1".to_string()));
        }

        #[cfg(feature = "parallel")]
        let pool = config
            .threads
            .map(|threads| {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| EngineError::Config(format!("cannot build worker pool: {}", e)))
            })
            .transpose()?;

        debug!(
            components = components.len(),
            model_caching = %config.model_caching,
            component_caching = config.component_caching,
            "model created"
        );

        Ok(Self {
            cache: ResultCache::new(&config.cache),
            components,
            input: None,
            results: None,
            config,
            log: RunLog::new(),
            #[cfg(feature = "parallel")]
            pool,
        })
    }

    /// Component declarations.
    pub fn components(&self) -> &[ComponentSpec] {
        &self.components
    }

    /// Current configuration.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Replaces the input document.
    pub fn set_input(&mut self, input: Value) {
        self.input = Some(Arc::new(input));
    }

    /// The input document, if set.
    pub fn input(&self) -> Option<&Value> {
        self.input.as_deref()
    }

    /// Sets known results, used by queries run with [`UseResults::Current`].
    pub fn set_results(&mut self, results: Value) {
        self.results = Some(Arc::new(results));
    }

    /// Sets the whole-model cache mode.
    pub fn set_model_caching(&mut self, mode: CacheMode) {
        self.config.model_caching = mode;
    }

    /// Enables or disables the per-component cache.
    pub fn set_component_caching(&mut self, enabled: bool) {
        self.config.component_caching = enabled;
    }

    /// Drops every cache entry. The run log is kept.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Returns true if the whole-model cache holds results for the current
    /// input.
    pub fn has_cached_results(&self) -> bool {
        self.input
            .as_deref()
            .is_some_and(|input| self.cache.has_model_entry(input))
    }

    /// Cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Log of successful queries.
    pub fn log(&self) -> &RunLog {
        &self.log
    }

    /// Clears the run log.
    pub fn reset_log(&mut self) {
        self.log.reset();
    }

    /// Checks that every query can be resolved, without running anything.
    pub fn validate<Q: AsRef<str>>(&self, queries: &[Q]) -> EngineResult<()> {
        self.explain(queries).map(|_| ())
    }

    /// Returns the waves of workers the queries would run from scratch.
    pub fn explain<Q: AsRef<str>>(&self, queries: &[Q]) -> EngineResult<ExecutionPlan> {
        let input = self.input.as_deref().ok_or(EngineError::NoInput)?;
        let (raw, parsed) = parse_queries(queries)?;
        let (_, graph) = self.runner(input, false).plan(&parsed, &ResultsStore::new())?;
        Ok(ExecutionPlan::from_graph(raw, &graph))
    }

    /// Answers the queries against the current input.
    ///
    /// On failure nothing is logged and cache writes made by the call are
    /// undone.
    pub fn get<Q: AsRef<str>>(&mut self, queries: &[Q], options: QueryOptions) -> EngineResult<QueryResponse> {
        let input = Arc::clone(self.input.as_ref().ok_or(EngineError::NoInput)?);
        let (response, entry) = self.execute(&input, queries, options)?;
        self.log.append(entry);
        Ok(response)
    }

    /// Runs the queries once per combination of a parameter sweep.
    ///
    /// The model's own input is left unchanged. Fails on the first failing
    /// combination.
    pub fn get_many<Q: AsRef<str>>(
        &mut self,
        queries: &[Q],
        sweep: &ParameterSweep,
        options: QueryOptions,
    ) -> EngineResult<SweepOutcome> {
        let input = Arc::clone(self.input.as_ref().ok_or(EngineError::NoInput)?);
        let mut outcome = SweepOutcome::default();

        for document in sweep.combinations(&input)? {
            let flat = flatten(&document);
            if sweep.skips(&flat) {
                debug!("sweep combination skipped");
                outcome.skipped.push(flat);
                continue;
            }
            let (response, entry) = self.execute(&document, queries, options)?;
            self.log.append(entry);
            outcome.responses.push(response);
            outcome.flat_inputs.push(flat);
        }

        info!(
            combinations = sweep.len(),
            ran = outcome.responses.len(),
            skipped = outcome.skipped.len(),
            "sweep complete"
        );
        Ok(outcome)
    }

    fn runner<'a>(&'a self, input: &'a Value, parallel: bool) -> QueryRunner<'a> {
        let runner = QueryRunner::new(&self.components, input, &self.cache)
            .with_component_caching(self.config.component_caching)
            .with_incremental(self.config.model_caching == CacheMode::Incremental)
            .with_parallel(parallel);
        #[cfg(feature = "parallel")]
        let runner = runner.with_pool(self.pool.as_ref());
        runner
    }

    fn execute<Q: AsRef<str>>(
        &self,
        input: &Value,
        queries: &[Q],
        options: QueryOptions,
    ) -> EngineResult<(QueryResponse, RunLogEntry)> {
        let started_at = Utc::now();
        let start = Instant::now();
        let (raw, parsed) = parse_queries(queries)?;
        let runner = self.runner(input, options.parallel);

        if options.validate {
            runner.plan(&parsed, &ResultsStore::new())?;
        }

        let (mut store, model_cache_hit) = match options.use_results {
            UseResults::None => (ResultsStore::new(), false),
            UseResults::Cached => match self.cache.get_model(input) {
                Some(snapshot) => (ResultsStore::from_snapshot(&snapshot), true),
                None => (ResultsStore::new(), false),
            },
            UseResults::Current => (
                self.results
                    .as_deref()
                    .map(ResultsStore::from_tree)
                    .unwrap_or_default(),
                false,
            ),
        };
        debug!(
            use_results = ?options.use_results,
            preloaded = store.len(),
            model_cache_hit,
            "results store prepared"
        );

        self.cache.begin();
        let output = match runner.run(&parsed, &mut store) {
            Ok(output) => output,
            Err(e) => {
                self.cache.rollback();
                debug!(error = %e, "query failed");
                return Err(e);
            }
        };
        if self.config.model_caching == CacheMode::AfterExecution {
            self.cache.merge_model(input, store.written_snapshot());
        }
        self.cache.commit();

        let duration = start.elapsed();
        let stats = ExecutionStats {
            duration,
            workers_executed: output.stats.workers_executed(),
            component_cache_hits: output.stats.cache_hits(),
            model_cache_hit,
            waves: output.stats.waves,
        };
        info!(
            queries = ?raw,
            workers = stats.workers_executed,
            cache_hits = stats.component_cache_hits,
            model_cache_hit,
            waves = stats.waves,
            elapsed_ms = duration.as_secs_f64() * 1000.0,
            "query complete"
        );

        let values: BTreeMap<String, Value> = raw.iter().cloned().zip(output.responses).collect();
        let entry = RunLogEntry {
            started_at,
            elapsed_ms: duration.as_secs_f64() * 1000.0,
            queries: raw,
            worker_counts: output.stats.worker_counts,
            cache_counts: output.stats.cache_counts,
            model_cache_hit,
            parallel: options.parallel,
        };
        Ok((QueryResponse::new(values, stats), entry))
    }
}

fn parse_queries<Q: AsRef<str>>(queries: &[Q]) -> EngineResult<(Vec<String>, Vec<PathAddress>)> {
    let raw: Vec<String> = queries.iter().map(|q| q.as_ref().to_string()).collect();
    let parsed = raw
        .iter()
        .map(|q| PathAddress::parse_query(q))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((raw, parsed))
}
