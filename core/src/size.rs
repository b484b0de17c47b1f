//! C1: the virtual-length size estimator (spec §4.1).
//!
//! An O(n) proxy for a value's serialized length, used to decide where the
//! chunker has to split without ever actually serializing to JSON text.

use serde_json::Value;

/// Virtual string-length of a JSON-like value.
pub fn virtual_length(value: &Value) -> usize {
    match value {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.iter().map(virtual_length).sum(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| k.chars().count() + virtual_length(v))
            .sum(),
        other => scalar_string(other).chars().count(),
    }
}

/// Renders a non-string, non-container value the way an overflowing leaf is
/// downgraded to string-splitting in chunk.rs case 4.
pub fn scalar_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_length_is_char_count() {
        assert_eq!(virtual_length(&json!("hello")), 5);
    }

    #[test]
    fn array_length_sums_elements() {
        assert_eq!(virtual_length(&json!(["ab", "cde"])), 5);
    }

    #[test]
    fn object_length_sums_keys_and_values() {
        assert_eq!(virtual_length(&json!({"a": "X", "bb": "YY"})), 1 + 1 + 2 + 2);
    }

    #[test]
    fn scalar_uses_string_form() {
        assert_eq!(virtual_length(&json!(12345)), 5);
        assert_eq!(virtual_length(&json!(true)), 4);
        assert_eq!(virtual_length(&Value::Null), 4);
    }
}
