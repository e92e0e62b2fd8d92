//! Argument sanitization before logging or span attribution (§4.1).

use once_cell::sync::Lazy;
use regex::Regex;

static SECRET_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i).*(password|token|secret|key|authorization).*").unwrap());

/// Deep-copies an argument map, replacing any value whose key matches the
/// secret pattern with `***`. Nested objects and arrays are walked
/// recursively so a secret buried inside a structured argument is still
/// caught.
pub fn sanitize_args(
    args: &serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    args.iter()
        .map(|(k, v)| {
            let redacted = if SECRET_KEY.is_match(k) {
                serde_json::Value::String("***".to_string())
            } else {
                sanitize_value(v)
            };
            (k.clone(), redacted)
        })
        .collect()
}

fn sanitize_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => serde_json::Value::Object(sanitize_args(map)),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(sanitize_value).collect())
        }
        other => other.clone(),
    }
}
