//! Workers: one component instantiated at one index tuple.

use std::fmt;

use hubit_path::{Bindings, PathAddress};
use serde_json::Value;
use tracing::trace;

use crate::cache::ResultCache;
use crate::component::{ComponentSpec, LocalValues};
use crate::error::{EngineError, EngineResult};
use crate::expander::Expansion;
use crate::fingerprint::{component_fingerprint, Fingerprint};
use crate::store::ResultsStore;
use crate::tree;

/// Position of a worker in its [`WorkerGraph`](crate::WorkerGraph).
pub type WorkerId = usize;

/// Lifecycle of a worker within one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Resolved, waiting for its wave.
    Pending,
    /// On the resolution stack; its dependencies are being resolved.
    Waiting,
    /// Executing.
    Running,
    /// Outputs written to the results store.
    Done,
    /// The component function failed.
    Failed,
}

/// Where a local input is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOrigin {
    /// The input document.
    Input,
    /// The results store.
    Results,
}

/// One local input of a worker and the concrete paths it gathers.
#[derive(Debug, Clone)]
pub struct LocalInput {
    /// Local name seen by the component function.
    pub name: String,
    /// Document the paths are read from.
    pub origin: InputOrigin,
    /// Concrete paths, nested for range bindings.
    pub shape: Expansion,
}

/// Local inputs gathered for a worker, with their cache key.
#[derive(Debug, Clone)]
pub struct PreparedInputs {
    /// Values keyed by local name.
    pub values: LocalValues,
    /// Component cache key, when component caching is on.
    pub key: Option<Fingerprint>,
}

/// Result of running a worker.
#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    /// Concrete output paths and their values.
    pub outputs: Vec<(PathAddress, Value)>,
    /// True if the outputs came from the component cache.
    pub cache_hit: bool,
}

/// A component bound to concrete values of its binders.
#[derive(Debug, Clone)]
pub struct Worker {
    id: WorkerId,
    component: usize,
    component_name: String,
    index: Vec<usize>,
    bindings: Bindings,
    inputs: Vec<LocalInput>,
    provides: Vec<(String, PathAddress)>,
    deps: Vec<WorkerId>,
    state: WorkerState,
}

impl Worker {
    /// Creates a worker stub with its outputs bound. Inputs and
    /// dependencies are added during resolution.
    pub(crate) fn new(
        id: WorkerId,
        component: usize,
        spec: &ComponentSpec,
        bindings: Bindings,
    ) -> EngineResult<Self> {
        let index = spec
            .binders()
            .iter()
            .map(|binder| {
                bindings.get(binder).copied().ok_or_else(|| {
                    EngineError::Internal(format!(
                        "component '{}' instantiated without binder '{}'",
                        spec.name(),
                        binder
                    ))
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;
        let provides = spec
            .provides()
            .iter()
            .map(|binding| -> EngineResult<(String, PathAddress)> {
                Ok((binding.name.clone(), binding.path.bind(&bindings)?))
            })
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(Self {
            id,
            component,
            component_name: spec.name().to_string(),
            index,
            bindings,
            inputs: Vec::new(),
            provides,
            deps: Vec::new(),
            state: WorkerState::Waiting,
        })
    }

    /// Worker id.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Position of the component in the model's component list.
    pub fn component(&self) -> usize {
        self.component
    }

    /// Component name.
    pub fn component_name(&self) -> &str {
        &self.component_name
    }

    /// Binder values in the component's binder order.
    pub fn index(&self) -> &[usize] {
        &self.index
    }

    /// Binder values by name.
    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Local inputs.
    pub fn inputs(&self) -> &[LocalInput] {
        &self.inputs
    }

    /// Output names with their concrete paths.
    pub fn provides(&self) -> &[(String, PathAddress)] {
        &self.provides
    }

    /// Concrete result paths this worker reads.
    pub fn required_results(&self) -> Vec<&PathAddress> {
        self.inputs
            .iter()
            .filter(|input| input.origin == InputOrigin::Results)
            .flat_map(|input| input.shape.leaves())
            .collect()
    }

    /// Workers that must finish first.
    pub fn deps(&self) -> &[WorkerId] {
        &self.deps
    }

    /// Current state.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: WorkerState) {
        self.state = state;
    }

    pub(crate) fn add_input(&mut self, input: LocalInput) {
        self.inputs.push(input);
    }

    pub(crate) fn add_dep(&mut self, dep: WorkerId) {
        if !self.deps.contains(&dep) {
            self.deps.push(dep);
        }
    }

    /// Reads every local input from the store or the input document.
    pub fn prepare(
        &self,
        store: &ResultsStore,
        input: &Value,
        with_key: bool,
    ) -> EngineResult<PreparedInputs> {
        let mut values = LocalValues::new();
        for local in &self.inputs {
            let value = local.shape.try_map(&mut |path| match local.origin {
                InputOrigin::Results => store.get(path).cloned().ok_or_else(|| {
                    EngineError::Internal(format!(
                        "result '{}' not available for {}",
                        path, self
                    ))
                }),
                InputOrigin::Input => tree::lookup(input, path)
                    .cloned()
                    .ok_or_else(|| EngineError::query(path, "not present in the input")),
            })?;
            values.insert(local.name.clone(), value);
        }
        let key = with_key.then(|| component_fingerprint(&self.component_name, &values));
        Ok(PreparedInputs { values, key })
    }

    /// Produces the worker's outputs from prepared inputs.
    ///
    /// With a cache and a key, a cached entry is used instead of calling the
    /// component, and a computed result is stored for later calls.
    pub fn execute(
        &self,
        spec: &ComponentSpec,
        prepared: &PreparedInputs,
        cache: Option<&ResultCache>,
    ) -> EngineResult<WorkerOutcome> {
        let cache = cache.zip(prepared.key);

        if let Some((cache, key)) = cache {
            if let Some(cached) = cache.get_component_by_key(&key) {
                trace!(worker = %self, "component cache hit");
                let outputs = self.publish(&cached).map_err(|e| {
                    EngineError::CacheCorruption(format!("entry for {}: {}", self, e))
                })?;
                return Ok(WorkerOutcome {
                    outputs,
                    cache_hit: true,
                });
            }
        }

        trace!(worker = %self, "executing");
        let computed = spec
            .call(&prepared.values)
            .map_err(|e| EngineError::computation(&self.component_name, e.to_string()))?;
        let outputs = self.publish(&computed)?;
        if let Some((cache, key)) = cache {
            cache.put_component_by_key(key, computed);
        }
        Ok(WorkerOutcome {
            outputs,
            cache_hit: false,
        })
    }

    /// Gathers inputs and executes in one step.
    pub fn run(
        &self,
        spec: &ComponentSpec,
        store: &ResultsStore,
        input: &Value,
        cache: Option<&ResultCache>,
    ) -> EngineResult<WorkerOutcome> {
        let prepared = self.prepare(store, input, cache.is_some())?;
        self.execute(spec, &prepared, cache)
    }

    /// Maps local output names onto the worker's concrete output paths.
    fn publish(&self, outputs: &LocalValues) -> EngineResult<Vec<(PathAddress, Value)>> {
        self.provides
            .iter()
            .map(|(name, path)| {
                outputs
                    .get(name)
                    .map(|value| (path.clone(), value.clone()))
                    .ok_or_else(|| {
                        EngineError::computation(
                            &self.component_name,
                            format!("output '{}' was not returned", name),
                        )
                    })
            })
            .collect()
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.component_name)?;
        if !self.index.is_empty() {
            let index: Vec<String> = self.index.iter().map(usize::to_string).collect();
            write!(f, "[{}]", index.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use serde_json::json;

    fn doubler() -> ComponentSpec {
        ComponentSpec::builder("double")
            .consumes_input("x", "items[I].x")
            .provides("y", "items[I].y")
            .func(|inputs: &LocalValues| {
                let x = inputs["x"].as_f64().ok_or("x is not a number")?;
                let mut out = LocalValues::new();
                out.insert("y".to_string(), json!(x * 2.0));
                Ok(out)
            })
            .build()
            .unwrap()
    }

    fn worker_for(spec: &ComponentSpec, i: usize) -> Worker {
        let mut bindings = Bindings::new();
        bindings.insert("I".to_string(), i);
        let mut worker = Worker::new(0, 0, spec, bindings).unwrap();
        worker.add_input(LocalInput {
            name: "x".to_string(),
            origin: InputOrigin::Input,
            shape: Expansion::Leaf(PathAddress::parse(&format!("items[{}].x", i)).unwrap()),
        });
        worker
    }

    #[test]
    fn test_new_binds_outputs() {
        let spec = doubler();
        let worker = worker_for(&spec, 1);
        assert_eq!(worker.index(), &[1]);
        assert_eq!(worker.provides()[0].1.to_string(), "items[1].y");
        assert_eq!(worker.state(), WorkerState::Waiting);
        assert_eq!(worker.to_string(), "double[1]");
    }

    #[test]
    fn test_run_computes_outputs() {
        let spec = doubler();
        let worker = worker_for(&spec, 1);
        let input = json!({"items": [{"x": 1.0}, {"x": 4.0}]});

        let outcome = worker.run(&spec, &ResultsStore::new(), &input, None).unwrap();
        assert!(!outcome.cache_hit);
        assert_eq!(outcome.outputs[0].1, json!(8.0));
    }

    #[test]
    fn test_run_uses_component_cache() {
        let spec = doubler();
        let cache = ResultCache::new(&CacheConfig::default());
        let input = json!({"items": [{"x": 3.0}, {"x": 3.0}]});
        let store = ResultsStore::new();

        let first = worker_for(&spec, 0).run(&spec, &store, &input, Some(&cache)).unwrap();
        let second = worker_for(&spec, 1).run(&spec, &store, &input, Some(&cache)).unwrap();

        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(second.outputs[0].0.to_string(), "items[1].y");
        assert_eq!(second.outputs[0].1, json!(6.0));
    }

    #[test]
    fn test_failure_is_computation_error() {
        let spec = doubler();
        let worker = worker_for(&spec, 0);
        let input = json!({"items": [{"x": "text"}]});
        let err = worker.run(&spec, &ResultsStore::new(), &input, None).unwrap_err();
        assert!(matches!(err, EngineError::Computation { ref component, .. } if component == "double"));
    }

    #[test]
    fn test_missing_output_is_computation_error() {
        let spec = ComponentSpec::builder("silent")
            .provides("y", "y")
            .func(|_: &LocalValues| Ok(LocalValues::new()))
            .build()
            .unwrap();
        let worker = Worker::new(0, 0, &spec, Bindings::new()).unwrap();
        let err = worker
            .run(&spec, &ResultsStore::new(), &json!({}), None)
            .unwrap_err();
        assert!(err.to_string().contains("output 'y' was not returned"));
    }

    #[test]
    fn test_missing_input_is_query_error() {
        let spec = doubler();
        let worker = worker_for(&spec, 5);
        let err = worker
            .run(&spec, &ResultsStore::new(), &json!({"items": []}), None)
            .unwrap_err();
        assert!(err.is_query_error());
    }

    #[test]
    fn test_required_results_lists_result_leaves() {
        let spec = doubler();
        let mut worker = worker_for(&spec, 0);
        worker.add_input(LocalInput {
            name: "z".to_string(),
            origin: InputOrigin::Results,
            shape: Expansion::List(vec![
                Expansion::Leaf(PathAddress::parse("r[0]").unwrap()),
                Expansion::Leaf(PathAddress::parse("r[1]").unwrap()),
            ]),
        });
        assert_eq!(worker.required_results().len(), 2);
    }
}
