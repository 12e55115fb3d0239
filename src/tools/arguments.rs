//! Typed access to function call arguments.

use crate::error::ArborError;

/// Wrapper around function call arguments providing typed extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn contains(&self, key: &str) -> bool {
        self.value.get(key).is_some()
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, ArborError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ArborError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Get an integer argument. Whole floats are accepted.
    pub fn get_i64(&self, key: &str) -> Result<i64, ArborError> {
        self.value
            .get(key)
            .and_then(|v| {
                v.as_i64()
                    .or_else(|| v.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            })
            .ok_or_else(|| ArborError::InvalidArgument(format!("Missing integer argument: {key}")))
    }

    /// Get an optional integer argument.
    pub fn get_i64_opt(&self, key: &str) -> Option<i64> {
        self.get_i64(key).ok()
    }

    /// Get a float argument.
    pub fn get_f64(&self, key: &str) -> Result<f64, ArborError> {
        self.value
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| ArborError::InvalidArgument(format!("Missing float argument: {key}")))
    }

    /// Get a boolean argument.
    pub fn get_bool(&self, key: &str) -> Result<bool, ArborError> {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| ArborError::InvalidArgument(format!("Missing boolean argument: {key}")))
    }

    /// Get an array argument.
    pub fn get_array(&self, key: &str) -> Result<&Vec<serde_json::Value>, ArborError> {
        self.value
            .get(key)
            .and_then(|v| v.as_array())
            .ok_or_else(|| ArborError::InvalidArgument(format!("Missing array argument: {key}")))
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, ArborError> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            ArborError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_accepts_whole_floats() {
        let args = ToolArguments::new(json!({"sides": 6.0, "bad": 1.5}));
        assert_eq!(args.get_i64("sides").unwrap(), 6);
        assert!(args.get_i64("bad").is_err());
        assert_eq!(args.get_i64_opt("absent"), None);
    }

    #[test]
    fn deserialize_into_struct() {
        #[derive(serde::Deserialize)]
        struct Roll {
            sides: u32,
        }
        let args = ToolArguments::new(json!({"sides": 20}));
        assert_eq!(args.deserialize::<Roll>().unwrap().sides, 20);
    }
}
