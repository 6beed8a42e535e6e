//! Deterministic JSON canonicalization.
//!
//! The canonical form is the signing input: object keys are ordered
//! lexicographically at every depth, array order is preserved, and no
//! insignificant whitespace is emitted. Two JSON values that differ only in
//! key order produce byte-identical canonical strings.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hex SHA-256 over the canonical form of a value. Used for config content
/// hashes and policy digests, so both sides of a handshake agree regardless
/// of key order.
#[must_use]
pub fn content_digest(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    hex::encode(hasher.finalize())
}

/// Render a JSON value in canonical form.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// The string covered by the envelope signature:
/// `ts "." nonce "." J(payload)`.
#[must_use]
pub fn canonical_string(ts: i64, nonce: &str, payload: &Value) -> String {
    format!("{ts}.{nonce}.{}", canonical_json(payload))
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => {
            // serde_json's display for scalars is already whitespace-free.
            out.push_str(&value.to_string());
        }
        Value::String(s) => {
            out.push_str(&Value::String(s.clone()).to_string());
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Map iteration order depends on serde_json's feature flags, so
            // the ordering is imposed here rather than trusted.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_value(out, &map[key]);
            }
            out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::canonical_json;
    use serde_json::json;

    #[test]
    fn orders_keys_recursively() {
        let v = json!({"b": {"z": 1, "a": [3, 1, 2]}, "a": null});
        assert_eq!(canonical_json(&v), r#"{"a":null,"b":{"a":[3,1,2],"z":1}}"#);
    }

    #[test]
    fn escapes_strings_like_serde() {
        let v = json!({"k": "line\nbreak \"quoted\""});
        assert_eq!(canonical_json(&v), r#"{"k":"line\nbreak \"quoted\""}"#);
    }
}
