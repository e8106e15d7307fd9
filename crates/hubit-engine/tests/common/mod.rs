//! Shared fixtures: a small building model.
//!
//! - `area`:  rooms[IDX].width * rooms[IDX].depth -> rooms[IDX].area
//! - `cost`:  rooms[IDX].area * price_per_m2      -> rooms[IDX].cost
//! - `total`: sum of rooms[:@IDX].cost            -> total_cost

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hubit_engine::{ComponentError, ComponentSpec, LocalValues, Model, ModelConfig};
use serde_json::{json, Value};

/// Number of times each component function ran.
#[derive(Debug, Default)]
pub struct Calls {
    pub area: AtomicUsize,
    pub cost: AtomicUsize,
    pub total: AtomicUsize,
}

impl Calls {
    pub fn area(&self) -> usize {
        self.area.load(Ordering::SeqCst)
    }

    pub fn cost(&self) -> usize {
        self.cost.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

fn number(inputs: &LocalValues, name: &str) -> Result<f64, ComponentError> {
    inputs
        .get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| format!("'{}' is not a number", name).into())
}

fn single(name: &str, value: f64) -> LocalValues {
    let mut out = LocalValues::new();
    out.insert(name.to_string(), json!(value));
    out
}

pub fn components(calls: &Arc<Calls>) -> Vec<ComponentSpec> {
    let area_calls = Arc::clone(calls);
    let cost_calls = Arc::clone(calls);
    let total_calls = Arc::clone(calls);

    vec![
        ComponentSpec::builder("area")
            .consumes_input("width", "rooms[IDX].width")
            .consumes_input("depth", "rooms[IDX].depth")
            .provides("area", "rooms[IDX].area")
            .func(move |inputs: &LocalValues| {
                area_calls.area.fetch_add(1, Ordering::SeqCst);
                Ok(single("area", number(inputs, "width")? * number(inputs, "depth")?))
            })
            .build()
            .unwrap(),
        ComponentSpec::builder("cost")
            .consumes_input("price", "price_per_m2")
            .consumes_result("area", "rooms[IDX].area")
            .provides("cost", "rooms[IDX].cost")
            .func(move |inputs: &LocalValues| {
                cost_calls.cost.fetch_add(1, Ordering::SeqCst);
                Ok(single("cost", number(inputs, "area")? * number(inputs, "price")?))
            })
            .build()
            .unwrap(),
        ComponentSpec::builder("total")
            .consumes_result("costs", "rooms[:@IDX].cost")
            .provides("total", "total_cost")
            .func(move |inputs: &LocalValues| {
                total_calls.total.fetch_add(1, Ordering::SeqCst);
                let costs = inputs
                    .get("costs")
                    .and_then(Value::as_array)
                    .ok_or("'costs' is not a list")?;
                Ok(single("total", costs.iter().filter_map(Value::as_f64).sum()))
            })
            .build()
            .unwrap(),
    ]
}

pub fn building() -> Value {
    json!({
        "price_per_m2": 10.0,
        "rooms": [
            {"width": 2.0, "depth": 3.0},
            {"width": 4.0, "depth": 1.0},
            {"width": 2.0, "depth": 3.0}
        ]
    })
}

pub fn model_with(config: ModelConfig) -> (Model, Arc<Calls>) {
    let calls = Arc::new(Calls::default());
    let mut model = Model::with_config(components(&calls), config).unwrap();
    model.set_input(building());
    (model, calls)
}

pub fn model() -> (Model, Arc<Calls>) {
    model_with(ModelConfig::default())
}
