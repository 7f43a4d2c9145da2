//! Deep-clone-safe wrapper around free-form JSON configuration.
//!
//! Alert template vars, exporter `custom_params`, and policy config maps are all
//! "string→any" in the data model (§3, §9 Design Notes). `DynamicMap` wraps a
//! `serde_json::Map` so every read out of a store or resolver clones the value rather
//! than handing back a reference into shared state — resolver output must never alias
//! store state per the Design Notes' no-aliasing rule.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A free-form string-keyed map of JSON values with deep-clone read semantics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DynamicMap(Map<String, Value>);

impl DynamicMap {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Returns an owned deep copy of the underlying map.
    pub fn to_owned_map(&self) -> Map<String, Value> {
        self.0.clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.get(key).cloned()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Key-wise union with `other` taking precedence on shared keys.
    ///
    /// This is the merge primitive used throughout §4.1 (child-precedence map merge).
    pub fn union_with_precedence(&self, other: &DynamicMap) -> DynamicMap {
        let mut merged = self.0.clone();
        for (k, v) in other.0.iter() {
            merged.insert(k.clone(), v.clone());
        }
        DynamicMap(merged)
    }
}

impl From<Map<String, Value>> for DynamicMap {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<DynamicMap> for Value {
    fn from(dm: DynamicMap) -> Self {
        Value::Object(dm.0)
    }
}

/// A free-form string→string label/annotation map (always flat, unlike `DynamicMap`).
pub type StringMap = std::collections::BTreeMap<String, String>;

/// Key-wise union of two string maps with `child` taking precedence.
pub fn union_string_maps(parent: &StringMap, child: &StringMap) -> StringMap {
    let mut merged = parent.clone();
    for (k, v) in child {
        merged.insert(k.clone(), v.clone());
    }
    merged
}
