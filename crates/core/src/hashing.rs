//! SHA-256 digests and the request fingerprint used as the cache key.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::process::ProcessKind;

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Rebuild a JSON value with every object's keys in sorted order.
///
/// Arrays keep their element order; only object keys are reordered.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Deterministic 64-char hex fingerprint of `(kind, params)`.
///
/// The digest covers the compact, key-sorted serialization of
/// `{"params": .., "process_type": ..}`, so field order in the caller's
/// input never changes the result.
pub fn fingerprint(kind: ProcessKind, params: &Value) -> String {
    let envelope = serde_json::json!({
        "params": canonicalize(params),
        "process_type": kind.as_str(),
    });
    // Serializing a `Value` cannot fail.
    let canonical = serde_json::to_string(&canonicalize(&envelope)).unwrap_or_default();
    sha256_hex(canonical.as_bytes())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn empty_input_produces_known_hash() {
        let hash = sha256_hex(b"");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn fingerprint_ignores_field_order() {
        let a: Value = serde_json::from_str(
            r#"{"width":896,"height":1216,"plugins":{"preset":"none","slots":[]},"seed":1}"#,
        )
        .unwrap();
        let b: Value = serde_json::from_str(
            r#"{"seed":1,"plugins":{"slots":[],"preset":"none"},"height":1216,"width":896}"#,
        )
        .unwrap();

        let fa = fingerprint(ProcessKind::Portrait, &a);
        assert_eq!(fa, fingerprint(ProcessKind::Portrait, &b));
        assert_eq!(fa.len(), 64);
    }

    #[test]
    fn fingerprint_depends_on_kind_and_values() {
        let params = json!({"width": 896, "seed": 1});
        let portrait = fingerprint(ProcessKind::Portrait, &params);

        assert_ne!(portrait, fingerprint(ProcessKind::Pose, &params));
        assert_ne!(
            portrait,
            fingerprint(ProcessKind::Portrait, &json!({"width": 896, "seed": 2}))
        );
    }

    #[test]
    fn canonicalize_keeps_array_order() {
        let value = json!({"b": [3, 1, 2], "a": {"z": 1, "y": 2}});
        let text = serde_json::to_string(&canonicalize(&value)).unwrap();
        assert_eq!(text, r#"{"a":{"y":2,"z":1},"b":[3,1,2]}"#);
    }
}
