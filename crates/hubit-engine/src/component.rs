//! Component declarations.
//!
//! A component names the paths it reads (`consumes_input` from the input
//! document, `consumes_results` from other components) and the paths it
//! writes (`provides`), each under a local name. Its function maps local
//! inputs to local outputs:
//!
//! ```rust
//! use hubit_engine::{ComponentSpec, LocalValues};
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
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(area.binders(), &["IDX".to_string()]);
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use hubit_path::{PathAddress, Segment};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};

/// Local inputs or outputs of a component, keyed by local name.
pub type LocalValues = BTreeMap<String, Value>;

/// Error returned by a component function.
pub type ComponentError = Box<dyn std::error::Error + Send + Sync>;

/// A component function. Must be pure and must not mutate its input.
pub type ComponentFn = Arc<dyn Fn(&LocalValues) -> Result<LocalValues, ComponentError> + Send + Sync>;

/// A local name bound to a path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Name the component function sees.
    pub name: String,
    /// Path template.
    pub path: PathAddress,
}

/// A named calculation unit.
#[derive(Clone)]
pub struct ComponentSpec {
    name: String,
    provides: Vec<Binding>,
    consumes_input: Vec<Binding>,
    consumes_results: Vec<Binding>,
    binders: Vec<String>,
    func: ComponentFn,
}

impl ComponentSpec {
    /// Starts a declaration for the component `name`.
    pub fn builder(name: impl Into<String>) -> ComponentSpecBuilder {
        ComponentSpecBuilder {
            name: name.into(),
            provides: Vec::new(),
            consumes_input: Vec::new(),
            consumes_results: Vec::new(),
            func: None,
        }
    }

    /// Component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Output bindings.
    pub fn provides(&self) -> &[Binding] {
        &self.provides
    }

    /// Bindings rooted in the input document.
    pub fn consumes_input(&self) -> &[Binding] {
        &self.consumes_input
    }

    /// Bindings rooted in other components' outputs.
    pub fn consumes_results(&self) -> &[Binding] {
        &self.consumes_results
    }

    /// Index binders shared by every output path, in declaration order.
    ///
    /// One worker is created per combination of binder values.
    pub fn binders(&self) -> &[String] {
        &self.binders
    }

    /// Invokes the component function.
    pub fn call(&self, inputs: &LocalValues) -> Result<LocalValues, ComponentError> {
        (self.func)(inputs)
    }
}

impl fmt::Debug for ComponentSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentSpec")
            .field("name", &self.name)
            .field("provides", &self.provides)
            .field("consumes_input", &self.consumes_input)
            .field("consumes_results", &self.consumes_results)
            .field("binders", &self.binders)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ComponentSpec`]. Templates are parsed and the declaration
/// is checked in [`ComponentSpecBuilder::build`].
pub struct ComponentSpecBuilder {
    name: String,
    provides: Vec<(String, String)>,
    consumes_input: Vec<(String, String)>,
    consumes_results: Vec<(String, String)>,
    func: Option<ComponentFn>,
}

impl ComponentSpecBuilder {
    /// Declares an output.
    pub fn provides(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.provides.push((name.into(), path.into()));
        self
    }

    /// Declares an input read from the input document.
    pub fn consumes_input(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.consumes_input.push((name.into(), path.into()));
        self
    }

    /// Declares an input read from another component's output.
    pub fn consumes_result(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.consumes_results.push((name.into(), path.into()));
        self
    }

    /// Sets the component function.
    pub fn func<F>(mut self, func: F) -> Self
    where
        F: Fn(&LocalValues) -> Result<LocalValues, ComponentError> + Send + Sync + 'static,
    {
        self.func = Some(Arc::new(func));
        self
    }

    /// Parses the templates and checks the declaration.
    pub fn build(self) -> EngineResult<ComponentSpec> {
        let name = self.name;
        let invalid = |message: String| EngineError::Model(format!("component '{}': {}", name, message));

        let func = self
            .func
            .ok_or_else(|| invalid("no function given".to_string()))?;
        if self.provides.is_empty() {
            return Err(invalid("provides nothing".to_string()));
        }

        let provides = parse_bindings(self.provides)?;
        let consumes_input = parse_bindings(self.consumes_input)?;
        let consumes_results = parse_bindings(self.consumes_results)?;

        check_unique_names("provides", &provides).map_err(invalid)?;
        let mut consumed: Vec<Binding> = consumes_input.clone();
        consumed.extend(consumes_results.iter().cloned());
        check_unique_names("consumes", &consumed).map_err(invalid)?;

        let binders: Vec<String> = provides[0]
            .path
            .binders()
            .into_iter()
            .map(str::to_string)
            .collect();
        let binder_set: HashSet<&str> = binders.iter().map(String::as_str).collect();

        for binding in &provides {
            if !binding.path.range_binders().is_empty() {
                return Err(invalid(format!(
                    "output '{}' uses a range binder in '{}'",
                    binding.name, binding.path
                )));
            }
            let these: HashSet<&str> = binding.path.binders().into_iter().collect();
            if these != binder_set {
                return Err(invalid(format!(
                    "output '{}' binds [{}] but '{}' binds [{}]",
                    binding.name,
                    sorted(&these),
                    provides[0].name,
                    sorted(&binder_set)
                )));
            }
        }

        for binding in &consumed {
            for binder in binding.path.binders() {
                if !binder_set.contains(binder) {
                    return Err(invalid(format!(
                        "input '{}' uses binder '{}' which no output binds",
                        binding.name, binder
                    )));
                }
            }
            for range in binding.path.range_binders() {
                if binder_set.contains(range) {
                    return Err(invalid(format!(
                        "input '{}' uses '{}' both as binder and range binder",
                        binding.name, range
                    )));
                }
            }
        }

        Ok(ComponentSpec {
            name,
            provides,
            consumes_input,
            consumes_results,
            binders,
            func,
        })
    }
}

fn parse_bindings(raw: Vec<(String, String)>) -> EngineResult<Vec<Binding>> {
    raw.into_iter()
        .map(|(name, path)| -> EngineResult<Binding> {
            Ok(Binding {
                name,
                path: PathAddress::parse_template(&path)?,
            })
        })
        .collect()
}

fn check_unique_names(direction: &str, bindings: &[Binding]) -> Result<(), String> {
    let mut seen = HashSet::new();
    for binding in bindings {
        if !seen.insert(binding.name.as_str()) {
            return Err(format!("{} name '{}' declared twice", direction, binding.name));
        }
    }
    Ok(())
}

fn sorted(set: &HashSet<&str>) -> String {
    let mut names: Vec<&str> = set.iter().copied().collect();
    names.sort_unstable();
    names.join(", ")
}

/// Returns the position of binder `name` in `path`, if any.
pub(crate) fn binder_position(path: &PathAddress, name: &str) -> Option<usize> {
    path.segments()
        .iter()
        .position(|s| matches!(s, Segment::Binder(b) if b == name))
}

/// Checks that component names are unique.
pub(crate) fn check_registry(components: &[ComponentSpec]) -> EngineResult<()> {
    let mut seen = HashSet::new();
    for component in components {
        if !seen.insert(component.name()) {
            return Err(EngineError::Model(format!(
                "component '{}' declared twice",
                component.name()
            )));
        }
    }
    Ok(())
}
