//! Session state with scope inferred from key prefixes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::Display;

/// Plain key/value mapping used for deltas and persisted scopes.
pub type StateMap = HashMap<String, serde_json::Value>;

/// Shared by every session of an app.
pub const APP_PREFIX: &str = "app:";
/// Shared by every session of one user within an app.
pub const USER_PREFIX: &str = "user:";
/// Never persisted.
pub const TEMP_PREFIX: &str = "temp:";

/// Persistence tier of a state key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum StateScope {
    App,
    User,
    Temp,
    Session,
}

impl StateScope {
    pub fn of(key: &str) -> Self {
        if key.starts_with(APP_PREFIX) {
            Self::App
        } else if key.starts_with(USER_PREFIX) {
            Self::User
        } else if key.starts_with(TEMP_PREFIX) {
            Self::Temp
        } else {
            Self::Session
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Self::App => APP_PREFIX,
            Self::User => USER_PREFIX,
            Self::Temp => TEMP_PREFIX,
            Self::Session => "",
        }
    }
}

/// A state delta split by scope. App and user keys have their prefix
/// stripped so they can be stored directly in the shared scopes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionedDelta {
    pub app: StateMap,
    pub user: StateMap,
    pub session: StateMap,
    pub temp: StateMap,
}

impl PartitionedDelta {
    pub fn from_delta(delta: &StateMap) -> Self {
        let mut parts = Self::default();
        for (key, value) in delta {
            let scope = StateScope::of(key);
            let stripped = key[scope.prefix().len()..].to_string();
            match scope {
                StateScope::App => parts.app.insert(stripped, value.clone()),
                StateScope::User => parts.user.insert(stripped, value.clone()),
                StateScope::Temp => parts.temp.insert(key.clone(), value.clone()),
                StateScope::Session => parts.session.insert(key.clone(), value.clone()),
            };
        }
        parts
    }
}

/// Materialized state of one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct State {
    values: StateMap,
}

impl State {
    pub fn new(values: StateMap) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Local write; not persisted until committed through an event.
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.values.insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.values.iter()
    }

    /// Commit a delta. Every key except `temp:` ones is written; the
    /// returned map is the committed (non-temp) subset.
    pub fn apply_delta(&mut self, delta: &StateMap) -> StateMap {
        let committed: StateMap = delta
            .iter()
            .filter(|(key, _)| StateScope::of(key) != StateScope::Temp)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        self.values
            .extend(committed.iter().map(|(k, v)| (k.clone(), v.clone())));
        committed
    }

    /// Overlay shared app and user scopes, re-adding their prefixes.
    pub fn merge_shared(&mut self, app_state: &StateMap, user_state: &StateMap) {
        for (key, value) in app_state {
            self.values.insert(format!("{APP_PREFIX}{key}"), value.clone());
        }
        for (key, value) in user_state {
            self.values.insert(format!("{USER_PREFIX}{key}"), value.clone());
        }
    }
}

impl From<StateMap> for State {
    fn from(values: StateMap) -> Self {
        Self::new(values)
    }
}
