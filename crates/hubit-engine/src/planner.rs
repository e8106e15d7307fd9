//! Execution plans.
//!
//! An [`ExecutionPlan`] is what `Model::explain` returns: the waves of
//! workers a query would run, without running them.

use std::fmt;

use crate::resolver::WorkerGraph;

/// The waves of workers needed to answer a set of queries.
///
/// # Example
///
/// ```ignore
/// let plan = model.explain(&["total_area"])?;
///
/// println!("{} workers in {} waves", plan.worker_count(), plan.waves.len());
/// println!("{}", plan);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// The queries, as given.
    pub queries: Vec<String>,
    /// Waves in execution order.
    pub waves: Vec<PlannedWave>,
}

impl ExecutionPlan {
    /// Builds a plan from a resolved graph.
    pub fn from_graph(queries: Vec<String>, graph: &WorkerGraph) -> Self {
        let waves = graph
            .waves()
            .into_iter()
            .map(|wave| PlannedWave {
                workers: wave
                    .into_iter()
                    .filter_map(|id| graph.get(id))
                    .map(|worker| PlannedWorker {
                        component: worker.component_name().to_string(),
                        index: worker.index().to_vec(),
                        provides: worker.provides().iter().map(|(_, p)| p.to_string()).collect(),
                        requires: worker
                            .required_results()
                            .into_iter()
                            .map(ToString::to_string)
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        Self { queries, waves }
    }

    /// Total number of workers.
    pub fn worker_count(&self) -> usize {
        self.waves.iter().map(|w| w.workers.len()).sum()
    }

    /// Returns true if every query can be answered without running anything.
    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Execution Plan for: {}", self.queries.join(", "))?;
        writeln!(f, "Workers: {}", self.worker_count())?;

        for (i, wave) in self.waves.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "Wave {}:", i + 1)?;
            for worker in &wave.workers {
                writeln!(f, "  - {}", worker)?;
            }
        }

        Ok(())
    }
}

/// Workers that can run together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWave {
    /// Workers, ordered by component name then index.
    pub workers: Vec<PlannedWorker>,
}

/// One worker of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedWorker {
    /// Component name.
    pub component: String,
    /// Binder values.
    pub index: Vec<usize>,
    /// Concrete paths the worker writes.
    pub provides: Vec<String>,
    /// Concrete result paths the worker reads.
    pub requires: Vec<String>,
}

impl fmt::Display for PlannedWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.component)?;
        if !self.index.is_empty() {
            let index: Vec<String> = self.index.iter().map(usize::to_string).collect();
            write!(f, "[{}]", index.join(", "))?;
        }
        write!(f, " -> {}", self.provides.join(", "))?;
        if !self.requires.is_empty() {
            write!(f, " (needs {})", self.requires.join(", "))?;
        }
        Ok(())
    }
}
