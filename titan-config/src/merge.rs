//! Deep-merge and structural-diff primitives for JSON configuration trees.

use serde_json::Value;
use std::collections::BTreeMap;

/// Merge `overlay` onto `base`, leaves win.
///
/// When both sides hold JSON objects the merge recurses; any other pairing
/// replaces the base value wholesale. Arrays are never concatenated.
#[must_use]
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Dotted paths of every leaf in a JSON tree. An empty object or array is
/// itself a leaf.
#[must_use]
pub fn leaf_paths(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_leaves(value, String::new(), &mut out);
    out
}

fn collect_leaves(value: &Value, prefix: String, out: &mut Vec<String>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                collect_leaves(child, path, out);
            }
        }
        _ => out.push(prefix),
    }
}

/// Structural difference between two configuration snapshots, keyed by
/// dotted leaf path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDiff {
    /// Paths present only in the newer snapshot.
    pub added: BTreeMap<String, Value>,
    /// Paths present only in the older snapshot.
    pub removed: BTreeMap<String, Value>,
    /// Paths present in both with different values: `(old, new)`.
    pub changed: BTreeMap<String, (Value, Value)>,
}

impl ConfigDiff {
    /// Whether the two snapshots are identical.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Compute the structural diff `old -> new`.
#[must_use]
pub fn diff_values(old: &Value, new: &Value) -> ConfigDiff {
    let mut diff = ConfigDiff::default();
    let mut old_leaves = BTreeMap::new();
    flatten(old, String::new(), &mut old_leaves);
    let mut new_leaves = BTreeMap::new();
    flatten(new, String::new(), &mut new_leaves);

    for (path, old_value) in &old_leaves {
        match new_leaves.get(path) {
            None => {
                diff.removed.insert(path.clone(), old_value.clone());
            }
            Some(new_value) if new_value != old_value => {
                diff.changed
                    .insert(path.clone(), (old_value.clone(), new_value.clone()));
            }
            Some(_) => {}
        }
    }
    for (path, new_value) in &new_leaves {
        if !old_leaves.contains_key(path) {
            diff.added.insert(path.clone(), new_value.clone());
        }
    }
    diff
}

fn flatten(value: &Value, prefix: String, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(child, path, out);
            }
        }
        other => {
            out.insert(prefix, other.clone());
        }
    }
}
