//! Value overrides and merging

use crate::error::{ChartError, ChartResult};
use serde_yaml_ng::{Mapping, Value};

/// Parse user-supplied values, JSON or YAML
///
/// Empty input yields an empty mapping. Anything but a mapping is rejected.
pub fn parse_overrides(input: &str) -> ChartResult<Value> {
    if input.trim().is_empty() {
        return Ok(Value::Mapping(Mapping::new()));
    }

    // JSON documents are valid YAML
    let value: Value =
        serde_yaml_ng::from_str(input).map_err(|e| ChartError::ValuesParse(e.to_string()))?;
    match value {
        Value::Null => Ok(Value::Mapping(Mapping::new())),
        Value::Mapping(_) => Ok(value),
        _ => Err(ChartError::ValuesParse(
            "values must be a mapping of keys to values".to_string(),
        )),
    }
}

/// Deep-merge `overrides` onto `base`
///
/// Nested mappings merge key by key; any other override value replaces the
/// base value. A `null` override removes the key.
pub fn merge_values(base: &Value, overrides: &Value) -> Value {
    match (base, overrides) {
        (Value::Mapping(base_map), Value::Mapping(override_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in override_map {
                if value.is_null() {
                    merged.remove(key);
                    continue;
                }
                let combined = match merged.get(key) {
                    Some(existing) => merge_values(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), combined);
            }
            Value::Mapping(merged)
        }
        (_, Value::Null) => base.clone(),
        (_, replacement) => replacement.clone(),
    }
}
