//! Configuration system (layered: code > env > config file).

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{ArborError, Result};

/// Default cap on model calls per invocation.
pub const DEFAULT_MAX_LLM_CALLS: i64 = 500;
/// Default capacity of the channel merging parallel branches.
pub const DEFAULT_EVENT_BUFFER: usize = 16;

/// How model responses are requested.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StreamingMode {
    #[default]
    None,
    Sse,
}

/// Per-invocation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bon::Builder)]
#[serde(default)]
pub struct RunConfig {
    #[builder(default)]
    pub streaming_mode: StreamingMode,
    /// Values <= 0 disable the cap.
    #[builder(default = DEFAULT_MAX_LLM_CALLS)]
    pub max_llm_calls: i64,
    #[builder(default = DEFAULT_EVENT_BUFFER)]
    pub event_buffer: usize,
    #[builder(default)]
    pub save_input_blobs_as_artifacts: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RunConfig {
    /// Positive cap on model calls, if one applies.
    pub fn llm_call_limit(&self) -> Option<u32> {
        u32::try_from(self.max_llm_calls).ok().filter(|limit| *limit > 0)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    run: RunConfig,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArborConfig {
    pub run: RunConfig,
}

impl ArborConfig {
    pub fn new(run: RunConfig) -> Self {
        Self { run }
    }

    /// Load from environment variables (`ARBOR_MAX_LLM_CALLS`,
    /// `ARBOR_STREAMING_MODE`, `ARBOR_EVENT_BUFFER`), reading `.env` first.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Parse a TOML document with an optional `[run]` table.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(raw)
            .map_err(|e| ArborError::Configuration(format!("invalid config file: {e}")))?;
        Ok(Self { run: file.run })
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ArborError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply environment variables on top of this config.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = lookup("ARBOR_MAX_LLM_CALLS") {
            self.run.max_llm_calls = parse_var("ARBOR_MAX_LLM_CALLS", &raw)?;
        }
        if let Some(raw) = lookup("ARBOR_STREAMING_MODE") {
            self.run.streaming_mode = parse_var("ARBOR_STREAMING_MODE", &raw)?;
        }
        if let Some(raw) = lookup("ARBOR_EVENT_BUFFER") {
            let buffer: usize = parse_var("ARBOR_EVENT_BUFFER", &raw)?;
            if buffer == 0 {
                return Err(ArborError::Configuration(
                    "ARBOR_EVENT_BUFFER must be at least 1".into(),
                ));
            }
            self.run.event_buffer = buffer;
        }
        Ok(self)
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ArborError::Configuration(format!("invalid {key}={raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn overrides_parse_each_variable() {
        let vars: HashMap<&str, &str> = [
            ("ARBOR_MAX_LLM_CALLS", "12"),
            ("ARBOR_STREAMING_MODE", "SSE"),
            ("ARBOR_EVENT_BUFFER", "4"),
        ]
        .into_iter()
        .collect();
        let config = ArborConfig::default()
            .with_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.run.max_llm_calls, 12);
        assert_eq!(config.run.streaming_mode, StreamingMode::Sse);
        assert_eq!(config.run.event_buffer, 4);
    }

    #[test]
    fn invalid_override_is_a_configuration_error() {
        let err = ArborConfig::default()
            .with_overrides(|key| (key == "ARBOR_MAX_LLM_CALLS").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ArborError::Configuration(_)));
    }

    #[test]
    fn non_positive_limit_means_unbounded() {
        let config = RunConfig::builder().max_llm_calls(0).build();
        assert_eq!(config.llm_call_limit(), None);
        assert_eq!(RunConfig::default().llm_call_limit(), Some(500));
    }
}
