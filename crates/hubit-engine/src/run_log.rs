//! Append-only record of executed queries.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};

/// One successful `get` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogEntry {
    /// When the call started.
    pub started_at: DateTime<Utc>,
    /// Wall time of the call in milliseconds.
    pub elapsed_ms: f64,
    /// Query strings, as given.
    pub queries: Vec<String>,
    /// Component name to number of component calls.
    pub worker_counts: BTreeMap<String, usize>,
    /// Component name to number of component cache hits.
    pub cache_counts: BTreeMap<String, usize>,
    /// Whether the store was preloaded from the whole-model cache.
    pub model_cache_hit: bool,
    /// Whether waves ran in parallel.
    pub parallel: bool,
}

impl RunLogEntry {
    /// Field names accepted by [`RunLog::get_all`].
    pub const FIELDS: &'static [&'static str] = &[
        "started_at",
        "elapsed_ms",
        "queries",
        "worker_counts",
        "cache_counts",
        "model_cache_hit",
        "parallel",
    ];
}

/// Log of every successful `get` call on a model.
///
/// # Example
///
/// ```ignore
/// model.get(&["total_area"], QueryOptions::default())?;
///
/// let counts = model.log().get_all("worker_counts")?;
/// println!("latest run: {}", counts[0]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    entries: Vec<RunLogEntry>,
}

impl RunLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn append(&mut self, entry: RunLogEntry) {
        self.entries.push(entry);
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was logged.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &RunLogEntry> {
        self.entries.iter().rev()
    }

    /// The most recent entry.
    pub fn latest(&self) -> Option<&RunLogEntry> {
        self.entries.last()
    }

    /// Drops every entry.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Values of one field across all entries, newest first.
    pub fn get_all(&self, field: &str) -> EngineResult<Vec<Value>> {
        if !RunLogEntry::FIELDS.contains(&field) {
            return Err(EngineError::UnknownLogField(field.to_string()));
        }
        self.entries()
            .map(|entry| -> EngineResult<Value> {
                let mut record = serde_json::to_value(entry)
                    .map_err(|e| EngineError::Internal(format!("run log entry: {}", e)))?;
                record
                    .get_mut(field)
                    .map(Value::take)
                    .ok_or_else(|| EngineError::UnknownLogField(field.to_string()))
            })
            .collect()
    }
}

impl fmt::Display for RunLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run log ({} entries):", self.len())?;
        for entry in self.entries() {
            let executed: usize = entry.worker_counts.values().sum();
            let cached: usize = entry.cache_counts.values().sum();
            writeln!(
                f,
                "  {} {:.3}ms workers={} cached={} model_cache_hit={} [{}]",
                entry.started_at.to_rfc3339(),
                entry.elapsed_ms,
                executed,
                cached,
                entry.model_cache_hit,
                entry.queries.join(", ")
            )?;
        }
        Ok(())
    }
}
