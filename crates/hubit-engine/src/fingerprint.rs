//! Content fingerprints used as cache keys.
//!
//! Values are encoded canonically before hashing: every node carries a type
//! tag and a length prefix, object keys are sorted, sequence order is kept.
//! Equal content therefore always yields an equal fingerprint.

use std::fmt;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::component::LocalValues;

/// A SHA-256 content hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Fingerprint of a whole input document.
pub fn fingerprint(value: &Value) -> Fingerprint {
    let mut hasher = domain_hasher(b"model");
    encode(&mut hasher, value);
    Fingerprint(hasher.finalize().into())
}

/// Fingerprint of one component's local inputs.
pub fn component_fingerprint(component: &str, inputs: &LocalValues) -> Fingerprint {
    let mut hasher = domain_hasher(b"component");
    encode_str(&mut hasher, component);
    hasher.update((inputs.len() as u64).to_le_bytes());
    for (name, value) in inputs {
        encode_str(&mut hasher, name);
        encode(&mut hasher, value);
    }
    Fingerprint(hasher.finalize().into())
}

fn domain_hasher(domain: &[u8]) -> Sha256 {
    let mut hasher = Sha256::new();
    hasher.update(b"hubit:");
    hasher.update(domain);
    hasher.update(b":v1");
    hasher
}

fn encode(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => hasher.update(b"n"),
        Value::Bool(b) => hasher.update([b'b', u8::from(*b)]),
        Value::Number(n) => {
            hasher.update(b"d");
            encode_str(hasher, &n.to_string());
        }
        Value::String(s) => {
            hasher.update(b"s");
            encode_str(hasher, s);
        }
        Value::Array(items) => {
            hasher.update(b"a");
            hasher.update((items.len() as u64).to_le_bytes());
            for item in items {
                encode(hasher, item);
            }
        }
        Value::Object(map) => {
            hasher.update(b"o");
            hasher.update((map.len() as u64).to_le_bytes());
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            for key in keys {
                encode_str(hasher, key);
                encode(hasher, &map[key]);
            }
        }
    }
}

fn encode_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}
