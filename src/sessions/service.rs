//! The session service contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::session::Session;
use super::state::StateMap;
use crate::error::Result;
use crate::events::Event;

/// Bounds on the events returned by [`SessionService::get_session`].
/// Both filters apply together.
#[derive(Debug, Clone, Default, bon::Builder)]
pub struct GetSessionConfig {
    /// Keep only the most recent N events. Zero keeps all.
    pub num_recent_events: Option<usize>,
    /// Keep only events at or after this instant.
    pub after_timestamp: Option<DateTime<Utc>>,
}

impl GetSessionConfig {
    pub fn filter_events(&self, mut events: Vec<Event>) -> Vec<Event> {
        if let Some(n) = self.num_recent_events.filter(|n| *n > 0) {
            let start = events.len().saturating_sub(n);
            events.drain(..start);
        }
        if let Some(after) = self.after_timestamp {
            events.retain(|event| event.timestamp >= after);
        }
        events
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListSessionsResponse {
    /// Session headers, without events or state.
    pub sessions: Vec<Session>,
}

#[derive(Debug, Clone, Default)]
pub struct ListEventsResponse {
    pub events: Vec<Event>,
    pub next_page_token: Option<String>,
}

/// Creates, reads and deletes sessions, and is the only place event side
/// effects are committed.
#[async_trait]
pub trait SessionService: Send + Sync {
    /// Create a session. A missing or blank id is replaced by a fresh UUID.
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<StateMap>,
        session_id: Option<String>,
    ) -> Result<Session>;

    /// Fetch a deep copy of a session, `None` if it does not exist.
    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        config: Option<GetSessionConfig>,
    ) -> Result<Option<Session>>;

    async fn list_sessions(&self, app_name: &str, user_id: &str) -> Result<ListSessionsResponse>;

    /// Delete a session. Unknown ids are ignored.
    async fn delete_session(&self, app_name: &str, user_id: &str, session_id: &str)
        -> Result<()>;

    async fn list_events(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<ListEventsResponse>;

    /// Commit an event: apply its state delta to the stored session and
    /// its shared scopes, then append it. `session` is updated in place.
    /// Returns the committed copy, whose delta holds no `temp:` keys.
    /// Partial events are returned unchanged and not stored.
    async fn append_event(&self, session: &mut Session, event: Event) -> Result<Event>;
}

/// Apply an event to the caller's in-memory session. The caller sees
/// every key of the delta, including `temp:` ones.
pub fn apply_event_to_session(session: &mut Session, original: &Event, committed: &Event) {
    for (key, value) in &original.actions.state_delta {
        session.state.set(key.clone(), value.clone());
    }
    session.events.push(committed.clone());
    session.last_update_time = committed.timestamp;
}
