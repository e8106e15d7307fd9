//! Query execution.
//!
//! A query runs in three steps:
//!
//! 1. **Plan**: expand every query, resolve every concrete path into a
//!    [`WorkerGraph`] and group the workers into waves.
//! 2. **Execute**: run the waves in order. A wave runs on the calling thread
//!    or fanned out over rayon; either way the results store is only written
//!    once the whole wave has finished.
//! 3. **Assemble**: read every query's concrete paths back from the store
//!    (or the input) in the shape of its wildcards.

use std::collections::{BTreeMap, HashSet};

use hubit_path::PathAddress;
use serde_json::Value;
use tracing::{debug, trace};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::cache::ResultCache;
use crate::component::ComponentSpec;
use crate::error::{EngineError, EngineResult};
use crate::expander::{Expansion, QueryExpander};
use crate::resolver::{DependencyResolver, WorkerGraph};
use crate::store::{ResultsStore, Snapshot};
use crate::tree;
use crate::worker::{PreparedInputs, WorkerId, WorkerOutcome, WorkerState};

/// Counters collected while executing one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Component name to number of workers that called the component.
    pub worker_counts: BTreeMap<String, usize>,
    /// Component name to number of workers served from the component cache.
    pub cache_counts: BTreeMap<String, usize>,
    /// Number of waves executed.
    pub waves: usize,
}

impl RunStats {
    fn for_components(components: &[ComponentSpec]) -> Self {
        let zeroed: BTreeMap<String, usize> = components
            .iter()
            .map(|c| (c.name().to_string(), 0))
            .collect();
        Self {
            worker_counts: zeroed.clone(),
            cache_counts: zeroed,
            waves: 0,
        }
    }

    /// Total number of component calls.
    pub fn workers_executed(&self) -> usize {
        self.worker_counts.values().sum()
    }

    /// Total number of component cache hits.
    pub fn cache_hits(&self) -> usize {
        self.cache_counts.values().sum()
    }
}

/// Responses of one run, in query order, with its counters.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// One value per query, nested like the query's wildcards.
    pub responses: Vec<Value>,
    /// Execution counters.
    pub stats: RunStats,
}

/// Plans and executes queries against one input document.
pub struct QueryRunner<'a> {
    components: &'a [ComponentSpec],
    input: &'a Value,
    cache: &'a ResultCache,
    component_caching: bool,
    incremental: bool,
    parallel: bool,
    #[cfg(feature = "parallel")]
    pool: Option<&'a rayon::ThreadPool>,
}

impl<'a> QueryRunner<'a> {
    /// Creates a sequential runner without caching.
    pub fn new(components: &'a [ComponentSpec], input: &'a Value, cache: &'a ResultCache) -> Self {
        Self {
            components,
            input,
            cache,
            component_caching: false,
            incremental: false,
            parallel: false,
            #[cfg(feature = "parallel")]
            pool: None,
        }
    }

    /// Reads and writes the per-component cache.
    pub fn with_component_caching(mut self, enabled: bool) -> Self {
        self.component_caching = enabled;
        self
    }

    /// Merges each wave's results into the whole-model cache as it finishes.
    pub fn with_incremental(mut self, enabled: bool) -> Self {
        self.incremental = enabled;
        self
    }

    /// Runs each wave in parallel.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Runs parallel waves on `pool` instead of rayon's global pool.
    #[cfg(feature = "parallel")]
    pub fn with_pool(mut self, pool: Option<&'a rayon::ThreadPool>) -> Self {
        self.pool = pool;
        self
    }

    /// Expands the queries and resolves the workers they need.
    ///
    /// Paths present in `store` need no worker.
    pub fn plan(
        &self,
        queries: &[PathAddress],
        store: &ResultsStore,
    ) -> EngineResult<(Vec<Expansion>, WorkerGraph)> {
        let expander = QueryExpander::new(self.components, self.input);
        let expansions = queries
            .iter()
            .map(|query| expander.expand(query))
            .collect::<EngineResult<Vec<_>>>()?;

        let mut resolver = DependencyResolver::new(self.components, self.input, store);
        for expansion in &expansions {
            for leaf in expansion.leaves() {
                resolver.resolve(leaf)?;
            }
        }
        Ok((expansions, resolver.into_graph()))
    }

    /// Plans, executes and assembles the queries.
    ///
    /// Computed values are written to `store`.
    pub fn run(&self, queries: &[PathAddress], store: &mut ResultsStore) -> EngineResult<RunOutput> {
        let (expansions, mut graph) = self.plan(queries, store)?;
        let waves = graph.waves();
        let mut stats = RunStats::for_components(self.components);

        debug!(
            workers = graph.len(),
            waves = waves.len(),
            parallel = self.parallel,
            "execution planned"
        );

        for (number, wave) in waves.iter().enumerate() {
            self.run_wave(number, wave, &mut graph, store, &mut stats)?;
        }
        stats.waves = waves.len();

        let responses = expansions
            .iter()
            .map(|expansion| expansion.try_map(&mut |path| self.read(store, path)))
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(RunOutput { responses, stats })
    }

    fn run_wave(
        &self,
        number: usize,
        wave: &[WorkerId],
        graph: &mut WorkerGraph,
        store: &mut ResultsStore,
        stats: &mut RunStats,
    ) -> EngineResult<()> {
        let mut leaders = Vec::with_capacity(wave.len());
        let mut followers = Vec::new();
        let mut seen = HashSet::new();
        for &id in wave {
            let worker = graph
                .get(id)
                .ok_or_else(|| EngineError::Internal(format!("worker {} missing from graph", id)))?;
            let prepared = worker.prepare(store, self.input, self.component_caching)?;
            // Equal fingerprints within a wave: only the first one computes.
            match prepared.key {
                Some(key) if !seen.insert(key) => followers.push((id, prepared)),
                _ => leaders.push((id, prepared)),
            }
        }

        debug!(
            wave = number,
            workers = wave.len(),
            deduplicated = followers.len(),
            "running wave"
        );

        for &id in wave {
            if let Some(worker) = graph.worker_mut(id) {
                worker.set_state(WorkerState::Running);
            }
        }

        let mut outcomes = self.execute_batch(graph, &leaders, self.parallel);
        if outcomes.iter().all(|(_, outcome)| outcome.is_ok()) {
            outcomes.extend(self.execute_batch(graph, &followers, false));
        }

        let mut produced = Snapshot::new();
        for (id, outcome) in outcomes {
            let worker = graph
                .worker_mut(id)
                .ok_or_else(|| EngineError::Internal(format!("worker {} missing from graph", id)))?;
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    worker.set_state(WorkerState::Failed);
                    return Err(e);
                }
            };

            let counts = if outcome.cache_hit {
                &mut stats.cache_counts
            } else {
                &mut stats.worker_counts
            };
            *counts.entry(worker.component_name().to_string()).or_insert(0) += 1;

            for (path, value) in outcome.outputs {
                if self.incremental {
                    produced.insert(path.to_internal(), value.clone());
                }
                store.insert(&path, value)?;
            }
            worker.set_state(WorkerState::Done);
        }

        if self.incremental {
            self.cache.merge_model(self.input, produced);
        }
        Ok(())
    }

    fn execute_batch(
        &self,
        graph: &WorkerGraph,
        batch: &[(WorkerId, PreparedInputs)],
        parallel: bool,
    ) -> Vec<(WorkerId, EngineResult<WorkerOutcome>)> {
        let cache = self.component_caching.then_some(self.cache);
        let execute = |(id, prepared): &(WorkerId, PreparedInputs)| {
            let outcome = match graph.get(*id) {
                Some(worker) => {
                    trace!(worker = %worker, "dispatch");
                    worker.execute(&self.components[worker.component()], prepared, cache)
                }
                None => Err(EngineError::Internal(format!("worker {} missing from graph", id))),
            };
            (*id, outcome)
        };

        if parallel && batch.len() > 1 {
            if let Some(outcomes) = self.execute_parallel(batch, &execute) {
                return outcomes;
            }
        }

        let mut outcomes = Vec::with_capacity(batch.len());
        for item in batch {
            let (id, outcome) = execute(item);
            let failed = outcome.is_err();
            outcomes.push((id, outcome));
            if failed {
                break;
            }
        }
        outcomes
    }

    #[cfg(feature = "parallel")]
    fn execute_parallel<F>(
        &self,
        batch: &[(WorkerId, PreparedInputs)],
        execute: &F,
    ) -> Option<Vec<(WorkerId, EngineResult<WorkerOutcome>)>>
    where
        F: Fn(&(WorkerId, PreparedInputs)) -> (WorkerId, EngineResult<WorkerOutcome>) + Sync,
    {
        let fan_out = || batch.par_iter().map(execute).collect::<Vec<_>>();
        Some(match self.pool {
            Some(pool) => pool.install(fan_out),
            None => fan_out(),
        })
    }

    #[cfg(not(feature = "parallel"))]
    fn execute_parallel<F>(
        &self,
        _batch: &[(WorkerId, PreparedInputs)],
        _execute: &F,
    ) -> Option<Vec<(WorkerId, EngineResult<WorkerOutcome>)>>
    where
        F: Fn(&(WorkerId, PreparedInputs)) -> (WorkerId, EngineResult<WorkerOutcome>) + Sync,
    {
        tracing::warn!("built without the `parallel` feature, running wave sequentially");
        None
    }

    fn read(&self, store: &ResultsStore, path: &PathAddress) -> EngineResult<Value> {
        store
            .get(path)
            .or_else(|| tree::lookup(self.input, path))
            .cloned()
            .ok_or_else(|| EngineError::Internal(format!("'{}' was resolved but never produced", path)))
    }
}
