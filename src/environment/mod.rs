//! # Environment & Variable Models
//!
//! Variable sets (environment, globals) reach a run in several shapes:
//! a plain object, an object wrapped in an envelope keyed by its kind (as
//! returned by cloud APIs, sometimes twice), a named set with a `values`
//! array, or a bare array of `{ key, value }` records. [`extract_model`]
//! flattens all of them into one `key -> value` mapping.

use serde_json::{Map, Value};

/// A flattened variable set.
pub type VariableMap = Map<String, Value>;

/// Normalize a variable-set shaped value of the given kind (`"environment"`,
/// `"globals"`, `"collection"`, ...) into a flat mapping.
///
/// Returns `None` when there is no usable data; callers decide whether that
/// is fatal. Repeated keys in a record array resolve last-key-wins.
pub fn extract_model(source: &Value, kind: &str) -> Option<VariableMap> {
    let mut model = match source.get(kind) {
        Some(inner) if inner.is_object() => inner,
        _ => source,
    };

    if !model.is_object() && !model.is_array() {
        return None;
    }

    if model.get("values").is_none() {
        if let Some(inner) = model.get(kind).filter(|inner| inner.is_object()) {
            model = inner;
        }
    }

    if is_truthy(model.get("name")) {
        if let Some(values) = model.get("values").filter(|values| values.is_array()) {
            model = values;
        }
    }

    match model {
        Value::Array(records) => Some(collapse_records(records)),
        Value::Object(map) => Some(map.clone()),
        _ => None,
    }
}

/// Collapse `[{ key, value }, ...]` into a mapping. Records without a usable
/// key are skipped.
fn collapse_records(records: &[Value]) -> VariableMap {
    let mut variables = VariableMap::new();
    for record in records {
        let key = match record.get("key") {
            Some(Value::String(key)) => key.clone(),
            Some(Value::Number(key)) => key.to_string(),
            Some(Value::Bool(key)) => key.to_string(),
            _ => continue,
        };
        let value = record.get("value").cloned().unwrap_or(Value::Null);
        // a repeated key keeps its first position and takes the later value
        variables.insert(key, value);
    }
    variables
}

/// JSON truthiness: `null`, `false`, `0`, `""` and missing are falsy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
