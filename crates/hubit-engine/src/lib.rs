//! # hubit-engine
//!
//! Query-driven calculation engine.
//!
//! A [`Model`] is a set of components, each declaring the paths it reads and
//! the paths it writes. A query names the paths the caller wants; the engine
//! works out which component instances (workers) are needed to produce
//! them, runs only those, and returns the values in the shape of the query.
//!
//! ## Key Features
//!
//! - **Lazy evaluation** - only the workers a query depends on are run
//! - **Wildcard queries** - `rooms[:].area` returns a list, nested wildcards
//!   return nested lists
//! - **Two-tier caching** - whole-model snapshots keyed by the input
//!   document, and per-component results keyed by local inputs
//! - **Optional parallelism** - enable the `parallel` feature to run each
//!   wave of independent workers on rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use hubit_engine::{ComponentSpec, LocalValues, Model, QueryOptions};
//! use serde_json::json;
//!
//! let area = ComponentSpec::builder("area")
//!     .consumes_input("width", "rooms[IDX].width")
//!     .consumes_input("depth", "rooms[IDX].depth")
//!     .provides("area", "rooms[IDX].area")
//!     .func(|inputs: &LocalValues| {
//!         let width = inputs["width"].as_f64().ok_or("width is not a number")?;
//!         let depth = inputs["depth"].as_f64().ok_or("depth is not a number")?;
//!         let mut out = LocalValues::new();
//!         out.insert("area".to_string(), json!(width * depth));
//!         Ok(out)
//!     })
//!     .build()?;
//!
//! let total = ComponentSpec::builder("total")
//!     .consumes_result("areas", "rooms[:@IDX].area")
//!     .provides("total", "total_area")
//!     .func(|inputs: &LocalValues| {
//!         let areas = inputs["areas"].as_array().ok_or("areas is not a list")?;
//!         let total: f64 = areas.iter().filter_map(|a| a.as_f64()).sum();
//!         let mut out = LocalValues::new();
//!         out.insert("total".to_string(), json!(total));
//!         Ok(out)
//!     })
//!     .build()?;
//!
//! let mut model = Model::new(vec![area, total])?;
//! model.set_input(json!({"rooms": [
//!     {"width": 2.0, "depth": 3.0},
//!     {"width": 4.0, "depth": 1.0}
//! ]}));
//!
//! let response = model.get(&["total_area", "rooms[:].area"], QueryOptions::default())?;
//! assert_eq!(response["total_area"], json!(10.0));
//! assert_eq!(response["rooms[:].area"], json!([6.0, 4.0]));
//! # Ok::<(), hubit_engine::EngineError>(())
//! ```
//!
//! ## With Configuration
//!
//! ```rust
//! use hubit_engine::{CacheConfig, CacheMode, Model, ModelConfig};
//!
//! let config = ModelConfig::builder()
//!     .with_model_caching(CacheMode::AfterExecution)
//!     .with_component_caching(true)
//!     .with_cache(CacheConfig {
//!         max_model_entries: 16,
//!         max_component_entries: 10_000,
//!     })
//!     .build();
//!
//! let model = Model::with_config(Vec::new(), config)?;
//! # Ok::<(), hubit_engine::EngineError>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `parallel` (default) - Runs waves on rayon when a query asks for it
//!
//! ## Architecture
//!
//! ```text
//! Model::get(queries)
//!  ├── QueryExpander      wildcards → concrete paths (nested)
//!  ├── DependencyResolver concrete paths → WorkerGraph → waves
//!  ├── QueryRunner        waves, sequential or rayon, barrier per wave
//!  │    └── Worker        gather inputs → component cache → func
//!  ├── ResultCache        whole-model + per-component, LRU, journaled
//!  └── RunLog             one entry per successful call
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod cache;
mod component;
mod config;
mod error;
mod expander;
mod fingerprint;
mod model;
mod planner;
mod resolver;
mod result;
mod run_log;
mod runner;
mod store;
mod sweep;
mod tree;
mod worker;

// Public re-exports
pub use cache::{CacheStats, ResultCache};
pub use component::{Binding, ComponentError, ComponentFn, ComponentSpec, ComponentSpecBuilder, LocalValues};
pub use config::{CacheConfig, CacheMode, ModelConfig, ModelConfigBuilder, QueryOptions, UseResults};
pub use error::{EngineError, EngineResult};
pub use expander::{Expansion, QueryExpander};
pub use fingerprint::{component_fingerprint, fingerprint, Fingerprint};
pub use model::Model;
pub use planner::{ExecutionPlan, PlannedWave, PlannedWorker};
pub use resolver::{DependencyResolver, Target, WorkerGraph};
pub use result::{ExecutionStats, QueryResponse};
pub use run_log::{RunLog, RunLogEntry};
pub use runner::{QueryRunner, RunOutput, RunStats};
pub use store::{ResultsStore, Snapshot};
pub use sweep::{flatten, FlatInput, ParameterSweep, SweepOutcome};
pub use worker::{InputOrigin, LocalInput, PreparedInputs, Worker, WorkerId, WorkerOutcome, WorkerState};

// Re-export path types for convenience
pub use hubit_path::{InternalPath, PathAddress, PathError};
