//! Validate function call arguments against a tool's JSON Schema before
//! execution.

use std::fmt;

/// First problem found with a set of arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentViolation {
    NotAnObject { actual: &'static str },
    /// Every required parameter that is absent, in schema order.
    Missing(Vec<String>),
    WrongType {
        field: String,
        expected: String,
        actual: &'static str,
    },
}

impl fmt::Display for ArgumentViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject { actual } => write!(f, "expected object arguments, got {actual}"),
            Self::Missing(names) => write!(f, "missing: {}", names.join(", ")),
            Self::WrongType {
                field,
                expected,
                actual,
            } => write!(f, "field '{field}' expected type '{expected}', got {actual}"),
        }
    }
}

/// Check schema type, required field presence and property types.
/// Missing fields are reported together so the caller can fix them in one
/// retry.
pub fn validate_arguments(
    args: &serde_json::Value,
    schema: &serde_json::Value,
) -> Result<(), ArgumentViolation> {
    let expects_object = schema.get("type").and_then(|v| v.as_str()) == Some("object");
    let obj = match args.as_object() {
        Some(obj) => obj,
        None if expects_object && !args.is_null() => {
            return Err(ArgumentViolation::NotAnObject {
                actual: json_type_name(args),
            })
        }
        None => {
            return match missing_required(&serde_json::Map::new(), schema) {
                missing if missing.is_empty() => Ok(()),
                missing => Err(ArgumentViolation::Missing(missing)),
            }
        }
    };

    let missing = missing_required(obj, schema);
    if !missing.is_empty() {
        return Err(ArgumentViolation::Missing(missing));
    }

    if let Some(properties) = schema.get("properties").and_then(|v| v.as_object()) {
        for (key, value) in obj {
            let expected = properties
                .get(key)
                .and_then(|prop| prop.get("type"))
                .and_then(|v| v.as_str());
            if let Some(expected) = expected {
                if !value_matches_type(value, expected) {
                    return Err(ArgumentViolation::WrongType {
                        field: key.clone(),
                        expected: expected.to_string(),
                        actual: json_type_name(value),
                    });
                }
            }
        }
    }

    Ok(())
}

fn missing_required(
    obj: &serde_json::Map<String, serde_json::Value>,
    schema: &serde_json::Value,
) -> Vec<String> {
    schema
        .get("required")
        .and_then(|v| v.as_array())
        .map(|required| {
            required
                .iter()
                .filter_map(|name| name.as_str())
                .filter(|name| obj.get(*name).map_or(true, |v| v.is_null()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn value_matches_type(value: &serde_json::Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|f| f.fract() == 0.0),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
