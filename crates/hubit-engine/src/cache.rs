//! Two-tier result caching.
//!
//! - **Model tier**: keyed by the fingerprint of the whole input document,
//!   holds a flat snapshot of computed results.
//! - **Component tier**: keyed by the fingerprint of a component name plus
//!   that worker's local inputs, holds the worker's local outputs.
//!
//! Both tiers are LRU-bounded and thread-safe. Writes made while a
//! transaction is open are journaled so a failed query can restore the
//! state it found.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::component::LocalValues;
use crate::config::CacheConfig;
use crate::fingerprint::{component_fingerprint, fingerprint, Fingerprint};
use crate::store::Snapshot;

/// Previous state of an entry touched inside a transaction, plus the
/// least-recently-used entry the write pushed out, if any.
#[derive(Debug)]
enum JournalEntry {
    Model(Undo<Arc<Snapshot>>),
    Component(Undo<LocalValues>),
}

#[derive(Debug)]
struct Undo<V> {
    key: Fingerprint,
    previous: Option<V>,
    evicted: Option<(Fingerprint, V)>,
}

impl<V> Undo<V> {
    fn apply(self, cache: &mut LruCache<Fingerprint, V>) {
        match self.previous {
            Some(previous) => {
                cache.put(self.key, previous);
            }
            None => {
                cache.pop(&self.key);
            }
        }
        if let Some((key, value)) = self.evicted {
            cache.put(key, value);
        }
    }
}

/// Writes `value` and reports what the write displaced.
fn push<V>(cache: &mut LruCache<Fingerprint, V>, key: Fingerprint, value: V) -> Undo<V> {
    match cache.push(key, value) {
        Some((old_key, old)) if old_key == key => Undo {
            key,
            previous: Some(old),
            evicted: None,
        },
        evicted => Undo {
            key,
            previous: None,
            evicted,
        },
    }
}

/// Thread-safe two-tier cache of computed results.
///
/// # Example
///
/// ```rust
/// use hubit_engine::{CacheConfig, LocalValues, ResultCache};
/// use serde_json::json;
///
/// let cache = ResultCache::new(&CacheConfig::default());
///
/// let mut inputs = LocalValues::new();
/// inputs.insert("width".to_string(), json!(2.0));
/// let mut outputs = LocalValues::new();
/// outputs.insert("area".to_string(), json!(4.0));
///
/// cache.put_component("area", &inputs, outputs.clone());
/// assert_eq!(cache.get_component("area", &inputs), Some(outputs));
/// ```
pub struct ResultCache {
    models: Mutex<LruCache<Fingerprint, Arc<Snapshot>>>,
    components: Mutex<LruCache<Fingerprint, LocalValues>>,
    journal: Mutex<Option<Vec<JournalEntry>>>,
}

impl ResultCache {
    /// Creates an empty cache with the configured capacities.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            models: Mutex::new(LruCache::new(capacity(config.max_model_entries))),
            components: Mutex::new(LruCache::new(capacity(config.max_component_entries))),
            journal: Mutex::new(None),
        }
    }

    // =========================================================================
    // Component tier
    // =========================================================================

    /// Cached outputs for a component evaluated on `inputs`.
    pub fn get_component(&self, component: &str, inputs: &LocalValues) -> Option<LocalValues> {
        self.get_component_by_key(&component_fingerprint(component, inputs))
    }

    /// Cached outputs for a precomputed component key.
    pub fn get_component_by_key(&self, key: &Fingerprint) -> Option<LocalValues> {
        self.components.lock().get(key).cloned()
    }

    /// Stores the outputs of a component evaluated on `inputs`.
    pub fn put_component(&self, component: &str, inputs: &LocalValues, outputs: LocalValues) {
        self.put_component_by_key(component_fingerprint(component, inputs), outputs);
    }

    /// Stores outputs under a precomputed component key.
    pub fn put_component_by_key(&self, key: Fingerprint, outputs: LocalValues) {
        let undo = push(&mut self.components.lock(), key, outputs);
        if let Some((evicted, _)) = &undo.evicted {
            debug!(%evicted, "component entry evicted");
        }
        self.record(|| JournalEntry::Component(undo));
    }

    // =========================================================================
    // Model tier
    // =========================================================================

    /// Cached results snapshot for an input document.
    pub fn get_model(&self, input: &Value) -> Option<Arc<Snapshot>> {
        self.models.lock().get(&fingerprint(input)).cloned()
    }

    /// Returns true if a snapshot exists for the input document.
    pub fn has_model_entry(&self, input: &Value) -> bool {
        self.models.lock().contains(&fingerprint(input))
    }

    /// Replaces the snapshot for an input document.
    pub fn put_model(&self, input: &Value, snapshot: Snapshot) {
        let key = fingerprint(input);
        let undo = push(&mut self.models.lock(), key, Arc::new(snapshot));
        self.record(|| JournalEntry::Model(undo));
    }

    /// Adds `results` to the snapshot for an input document, creating it if
    /// needed. Paths already in the snapshot keep their cached value.
    pub fn merge_model(&self, input: &Value, results: Snapshot) {
        if results.is_empty() {
            return;
        }
        let key = fingerprint(input);
        let undo = {
            let mut models = self.models.lock();
            let mut merged = models
                .get(&key)
                .map(|existing| existing.as_ref().clone())
                .unwrap_or_default();
            for (path, value) in results {
                merged.entry(path).or_insert(value);
            }
            push(&mut models, key, Arc::new(merged))
        };
        self.record(|| JournalEntry::Model(undo));
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Drops every entry of both tiers.
    pub fn clear(&self) {
        self.models.lock().clear();
        self.components.lock().clear();
        debug!("result cache cleared");
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            model_entries: self.models.lock().len(),
            component_entries: self.components.lock().len(),
        }
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Starts journaling writes. Any open transaction is committed first.
    pub fn begin(&self) {
        *self.journal.lock() = Some(Vec::new());
    }

    /// Keeps every write made since [`ResultCache::begin`].
    pub fn commit(&self) {
        *self.journal.lock() = None;
    }

    /// Undoes every write made since [`ResultCache::begin`].
    pub fn rollback(&self) {
        let Some(entries) = self.journal.lock().take() else {
            return;
        };
        let undone = entries.len();
        for entry in entries.into_iter().rev() {
            match entry {
                JournalEntry::Model(undo) => undo.apply(&mut self.models.lock()),
                JournalEntry::Component(undo) => undo.apply(&mut self.components.lock()),
            }
        }
        debug!(undone, "result cache rolled back");
    }

    fn record(&self, entry: impl FnOnce() -> JournalEntry) {
        if let Some(journal) = self.journal.lock().as_mut() {
            journal.push(entry());
        }
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ResultCache")
            .field("model_entries", &stats.model_entries)
            .field("component_entries", &stats.component_entries)
            .finish()
    }
}

fn capacity(entries: usize) -> NonZeroUsize {
    NonZeroUsize::new(entries.max(1)).unwrap_or(NonZeroUsize::MIN)
}

/// Statistics about the cache state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of whole-model snapshots.
    pub model_entries: usize,
    /// Number of per-component entries.
    pub component_entries: usize,
}
