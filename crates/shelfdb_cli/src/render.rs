//! Conversion of stored values to JSON.

use serde_json::{json, Map, Number};
use shelfdb_core::{Key, Value};

/// Converts a value to JSON.
///
/// Dates become `{"$date": millis}` and byte strings become
/// `{"$bytes": "<hex>"}`. Non-finite numbers become `null`.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => number(*n),
        Value::Date(ms) => json!({ "$date": number(*ms) }),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(bytes) => json!({ "$bytes": hex(bytes) }),
        Value::Array(items) => items.iter().map(value_to_json).collect(),
        Value::Map(entries) => {
            let object: Map<String, serde_json::Value> = entries
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect();
            serde_json::Value::Object(object)
        }
    }
}

/// Converts a key to JSON.
pub fn key_to_json(key: &Key) -> serde_json::Value {
    value_to_json(&key.to_value())
}

fn number(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return serde_json::Value::from(n as i64);
    }
    Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
