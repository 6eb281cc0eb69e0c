//! Safe encoding of arbitrary nested values for the cluster API
//!
//! Unstructured writes reject several native numeric shapes (narrow
//! integers, `f32`), so every value that reaches a reconciler's apply call
//! is normalized once, here, before it is handed to `kube`.

use serde_json::Value;

/// Recursively normalize a `serde_json::Value` tree into the shape the
/// cluster API's deep-copy accepts: every number becomes an `i64` or `f64`,
/// every sequence/mapping is recursed into, and bools/strings pass through.
///
/// `serde_json::Number` already only carries i64/u64/f64 internally, so the
/// width-narrowing this performs is mostly about rejecting `u64` values that
/// don't fit in `i64` by demoting them to `f64` — the same "any numeric
/// width in, i64 or f64 out" contract the source describes.
pub fn safe_encode(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::Number(normalize_number(n)),
        Value::Array(items) => Value::Array(items.into_iter().map(safe_encode).collect()),
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, safe_encode(v))).collect())
        }
        other => other,
    }
}

fn normalize_number(n: serde_json::Number) -> serde_json::Number {
    if let Some(i) = n.as_i64() {
        return serde_json::Number::from(i);
    }
    if let Some(u) = n.as_u64() {
        if let Ok(i) = i64::try_from(u) {
            return serde_json::Number::from(i);
        }
        // Doesn't fit in i64; widen to f64 rather than truncate.
        return serde_json::Number::from_f64(u as f64).unwrap_or(n);
    }
    if let Some(f) = n.as_f64() {
        return serde_json::Number::from_f64(f).unwrap_or(n);
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_passthrough_types() {
        let input = json!({"a": true, "b": "x", "c": null});
        assert_eq!(safe_encode(input.clone()), input);
    }

    #[test]
    fn test_nested_normalization() {
        let input = json!({
            "port": 8080,
            "weights": [90, 10],
            "nested": {"attempts": 3}
        });
        let out = safe_encode(input);
        assert_eq!(out["port"], json!(8080));
        assert_eq!(out["weights"], json!([90, 10]));
        assert_eq!(out["nested"]["attempts"], json!(3));
    }

    #[test]
    fn test_round_trip_preserves_semantics() {
        let input = json!({
            "a": 1, "b": [1, 2, 3], "c": {"d": "e"}, "f": 1.5, "g": true
        });
        let encoded = safe_encode(input.clone());
        let round_tripped: Value =
            serde_json::from_str(&serde_json::to_string(&encoded).unwrap()).unwrap();
        let original_round_tripped: Value =
            serde_json::from_str(&serde_json::to_string(&input).unwrap()).unwrap();
        assert_eq!(round_tripped, original_round_tripped);
    }
}
