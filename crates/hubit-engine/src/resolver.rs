//! Dependency resolution.
//!
//! Maps concrete paths to the workers that produce them and recursively
//! resolves what those workers consume. Workers live in an arena keyed by
//! `(component, index tuple)` so every worker is created once per query no
//! matter how many paths lead to it.

use std::collections::HashMap;

use hubit_path::{Bindings, PathAddress};
use serde_json::Value;
use tracing::trace;

use crate::component::ComponentSpec;
use crate::error::{EngineError, EngineResult};
use crate::expander::QueryExpander;
use crate::store::ResultsStore;
use crate::tree;
use crate::worker::{InputOrigin, LocalInput, Worker, WorkerId, WorkerState};

/// What a concrete path resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Already in the results store.
    Available,
    /// Read directly from the input document.
    Input,
    /// Produced by a worker.
    Worker(WorkerId),
}

/// Arena of the workers needed by one query.
#[derive(Debug, Default)]
pub struct WorkerGraph {
    workers: Vec<Worker>,
    index: HashMap<(usize, Vec<usize>), WorkerId>,
    order: Vec<WorkerId>,
}

impl WorkerGraph {
    /// Number of workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Returns true if no worker is needed.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Returns a worker by id.
    pub fn get(&self, id: WorkerId) -> Option<&Worker> {
        self.workers.get(id)
    }

    /// All workers, indexed by id.
    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub(crate) fn worker_mut(&mut self, id: WorkerId) -> Option<&mut Worker> {
        self.workers.get_mut(id)
    }

    /// Groups workers into waves.
    ///
    /// A worker's wave is one past the latest wave of its dependencies, so
    /// every worker in a wave only needs results from earlier waves. Within
    /// a wave, workers are ordered by component name then index tuple.
    pub fn waves(&self) -> Vec<Vec<WorkerId>> {
        let mut level = vec![0usize; self.workers.len()];
        let mut waves: Vec<Vec<WorkerId>> = Vec::new();

        // Resolution finishes dependencies before dependents.
        for &id in &self.order {
            let wave = self.workers[id]
                .deps()
                .iter()
                .map(|&dep| level[dep] + 1)
                .max()
                .unwrap_or(0);
            level[id] = wave;
            if waves.len() <= wave {
                waves.resize_with(wave + 1, Vec::new);
            }
            waves[wave].push(id);
        }

        for wave in &mut waves {
            wave.sort_by(|&a, &b| {
                let (a, b) = (&self.workers[a], &self.workers[b]);
                (a.component_name(), a.index()).cmp(&(b.component_name(), b.index()))
            });
        }
        waves
    }
}

/// Resolves concrete paths into a [`WorkerGraph`].
#[derive(Debug)]
pub struct DependencyResolver<'a> {
    components: &'a [ComponentSpec],
    input: &'a Value,
    available: &'a ResultsStore,
    graph: WorkerGraph,
    stack: Vec<WorkerId>,
}

impl<'a> DependencyResolver<'a> {
    /// Creates a resolver. Paths already in `available` need no worker.
    pub fn new(components: &'a [ComponentSpec], input: &'a Value, available: &'a ResultsStore) -> Self {
        Self {
            components,
            input,
            available,
            graph: WorkerGraph::default(),
            stack: Vec::new(),
        }
    }

    /// Resolves one concrete path, creating workers as needed.
    pub fn resolve(&mut self, path: &PathAddress) -> EngineResult<Target> {
        if self.available.contains(path) {
            return Ok(Target::Available);
        }
        match self.provider(path)? {
            Some((component, bindings)) => self.ensure_worker(component, bindings).map(Target::Worker),
            None if tree::lookup(self.input, path).is_some() => Ok(Target::Input),
            None => Err(EngineError::query(
                path,
                "neither present in the input nor provided by any component",
            )),
        }
    }

    /// Returns the resolved graph.
    pub fn into_graph(self) -> WorkerGraph {
        self.graph
    }

    /// The single component instance providing `path`, if any.
    fn provider(&self, path: &PathAddress) -> EngineResult<Option<(usize, Bindings)>> {
        let mut found: Vec<(usize, Bindings)> = Vec::new();
        for (component, spec) in self.components.iter().enumerate() {
            for binding in spec.provides() {
                if let Some(bindings) = binding.path.match_concrete(path) {
                    if !found.iter().any(|(c, b)| *c == component && *b == bindings) {
                        found.push((component, bindings));
                    }
                }
            }
        }
        if found.len() > 1 {
            let candidates: Vec<&str> = found
                .iter()
                .map(|(component, _)| self.components[*component].name())
                .collect();
            return Err(EngineError::AmbiguousProvider {
                path: path.to_string(),
                candidates: candidates.join(", "),
            });
        }
        Ok(found.pop())
    }

    fn ensure_worker(&mut self, component: usize, bindings: Bindings) -> EngineResult<WorkerId> {
        let spec = &self.components[component];
        let key = (
            component,
            spec.binders()
                .iter()
                .filter_map(|binder| bindings.get(binder).copied())
                .collect::<Vec<_>>(),
        );

        if let Some(&id) = self.graph.index.get(&key) {
            if self.graph.workers[id].state() == WorkerState::Waiting {
                return Err(self.cycle(id));
            }
            return Ok(id);
        }

        let id = self.graph.workers.len();
        let worker = Worker::new(id, component, spec, bindings)?;
        trace!(worker = %worker, "resolving");
        self.graph.workers.push(worker);
        self.graph.index.insert(key, id);

        self.stack.push(id);
        let consumed = self.resolve_consumes(id, component);
        self.stack.pop();
        consumed?;

        self.graph.workers[id].set_state(WorkerState::Pending);
        self.graph.order.push(id);
        Ok(id)
    }

    fn resolve_consumes(&mut self, id: WorkerId, component: usize) -> EngineResult<()> {
        let components = self.components;
        let spec = &components[component];
        let expander = QueryExpander::new(components, self.input);
        let bindings = self.graph.workers[id].bindings().clone();

        for binding in spec.consumes_input() {
            let shape = expander.expand(&binding.path.bind(&bindings)?)?;
            for leaf in shape.leaves() {
                if tree::lookup(self.input, leaf).is_none() {
                    return Err(EngineError::query(
                        leaf,
                        format!("required by {} but not present in the input", self.graph.workers[id]),
                    ));
                }
            }
            self.graph.workers[id].add_input(LocalInput {
                name: binding.name.clone(),
                origin: InputOrigin::Input,
                shape,
            });
        }

        for binding in spec.consumes_results() {
            let shape = expander.expand(&binding.path.bind(&bindings)?)?;
            for leaf in shape.leaves() {
                match self.resolve(leaf)? {
                    Target::Worker(dep) => self.graph.workers[id].add_dep(dep),
                    Target::Available => {}
                    Target::Input => {
                        return Err(EngineError::query(
                            leaf,
                            format!(
                                "consumed as a result by {} but no component provides it",
                                self.graph.workers[id]
                            ),
                        ))
                    }
                }
            }
            self.graph.workers[id].add_input(LocalInput {
                name: binding.name.clone(),
                origin: InputOrigin::Results,
                shape,
            });
        }
        Ok(())
    }

    fn cycle(&self, id: WorkerId) -> EngineError {
        let start = self.stack.iter().position(|&w| w == id).unwrap_or(0);
        let mut chain: Vec<String> = self.stack[start..]
            .iter()
            .map(|&w| self.graph.workers[w].to_string())
            .collect();
        chain.push(self.graph.workers[id].to_string());
        EngineError::Cyclic {
            chain: chain.join(" -> "),
        }
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

    fn path(s: &str) -> PathAddress {
        PathAddress::parse_query(s).unwrap()
    }

    fn chain_components() -> Vec<ComponentSpec> {
        vec![
            ComponentSpec::builder("area")
                .consumes_input("width", "rooms[IDX].width")
                .provides("area", "rooms[IDX].area")
                .func(identity)
                .build()
                .unwrap(),
            ComponentSpec::builder("total")
                .consumes_result("areas", "rooms[:@IDX].area")
                .provides("total", "total_area")
                .func(identity)
                .build()
                .unwrap(),
        ]
    }

    fn input() -> Value {
        json!({"rooms": [{"width": 1.0}, {"width": 2.0}]})
    }

    #[test]
    fn test_resolve_builds_waves() {
        let components = chain_components();
        let input = input();
        let store = ResultsStore::new();
        let mut resolver = DependencyResolver::new(&components, &input, &store);

        let target = resolver.resolve(&path("total_area")).unwrap();
        let graph = resolver.into_graph();
        assert_eq!(graph.len(), 3);
        assert!(matches!(target, Target::Worker(_)));

        let waves = graph.waves();
        assert_eq!(waves.len(), 2);
        let first: Vec<String> = waves[0].iter().map(|&id| graph.workers()[id].to_string()).collect();
        assert_eq!(first, vec!["area[0]", "area[1]"]);
        assert_eq!(graph.workers()[waves[1][0]].component_name(), "total");
        assert!(graph.workers().iter().all(|w| w.state() == WorkerState::Pending));
    }

    #[test]
    fn test_workers_are_reused() {
        let components = chain_components();
        let input = input();
        let store = ResultsStore::new();
        let mut resolver = DependencyResolver::new(&components, &input, &store);

        let a = resolver.resolve(&path("rooms[1].area")).unwrap();
        let b = resolver.resolve(&path("rooms[1].area")).unwrap();
        resolver.resolve(&path("total_area")).unwrap();
        assert_eq!(a, b);
        assert_eq!(resolver.into_graph().len(), 3);
    }

    #[test]
    fn test_input_and_available_paths() {
        let components = chain_components();
        let input = input();
        let mut store = ResultsStore::new();
        store.insert(&path("rooms[0].area"), json!(1.0)).unwrap();
        let mut resolver = DependencyResolver::new(&components, &input, &store);

        assert_eq!(resolver.resolve(&path("rooms[0].width")).unwrap(), Target::Input);
        assert_eq!(resolver.resolve(&path("rooms[0].area")).unwrap(), Target::Available);
        resolver.resolve(&path("total_area")).unwrap();
        // rooms[0].area is known, so only area[1] and total are needed
        assert_eq!(resolver.into_graph().len(), 2);
    }

    #[test]
    fn test_unknown_path() {
        let components = chain_components();
        let input = input();
        let store = ResultsStore::new();
        let mut resolver = DependencyResolver::new(&components, &input, &store);
        let err = resolver.resolve(&path("rooms[1].width.nope")).unwrap_err();
        assert!(matches!(err, EngineError::Query { .. }));
    }

    #[test]
    fn test_missing_consumed_input() {
        let components = chain_components();
        let input = input();
        let store = ResultsStore::new();
        let mut resolver = DependencyResolver::new(&components, &input, &store);
        let err = resolver.resolve(&path("rooms[7].area")).unwrap_err();
        assert!(err.to_string().contains("rooms[7].width"));
    }

    #[test]
    fn test_ambiguous_provider() {
        let mut components = chain_components();
        components.push(
            ComponentSpec::builder("other_total")
                .provides("total", "total_area")
                .func(identity)
                .build()
                .unwrap(),
        );
        let input = input();
        let store = ResultsStore::new();
        let mut resolver = DependencyResolver::new(&components, &input, &store);
        let err = resolver.resolve(&path("total_area")).unwrap_err();
        assert!(matches!(err, EngineError::AmbiguousProvider { .. }));
        assert!(err.is_query_error());
    }

    #[test]
    fn test_cycle_detected() {
        let components = vec![
            ComponentSpec::builder("a")
                .consumes_result("b", "b")
                .provides("a", "a")
                .func(identity)
                .build()
                .unwrap(),
            ComponentSpec::builder("b")
                .consumes_result("a", "a")
                .provides("b", "b")
                .func(identity)
                .build()
                .unwrap(),
        ];
        let input = json!({});
        let store = ResultsStore::new();
        let mut resolver = DependencyResolver::new(&components, &input, &store);
        match resolver.resolve(&path("a")).unwrap_err() {
            EngineError::Cyclic { chain } => assert_eq!(chain, "a -> b -> a"),
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_result_consume_of_input_only_path() {
        let components = vec![ComponentSpec::builder("c")
            .consumes_result("x", "x")
            .provides("y", "y")
            .func(identity)
            .build()
            .unwrap()];
        let input = json!({"x": 1});
        let store = ResultsStore::new();
        let mut resolver = DependencyResolver::new(&components, &input, &store);
        assert!(resolver.resolve(&path("y")).is_err());
    }
}
