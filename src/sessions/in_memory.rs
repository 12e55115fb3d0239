//! Process-local session service.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::service::{
    apply_event_to_session, GetSessionConfig, ListEventsResponse, ListSessionsResponse,
    SessionService,
};
use super::session::{Session, SessionKey};
use super::state::{PartitionedDelta, State, StateMap};
use crate::error::{ArborError, Result};
use crate::events::Event;

#[derive(Debug, Default)]
struct Store {
    sessions: HashMap<SessionKey, Session>,
    app_state: HashMap<String, StateMap>,
    user_state: HashMap<(String, String), StateMap>,
}

impl Store {
    fn commit_shared(&mut self, app_name: &str, user_id: &str, parts: PartitionedDelta) {
        if !parts.app.is_empty() {
            self.app_state
                .entry(app_name.to_string())
                .or_default()
                .extend(parts.app);
        }
        if !parts.user.is_empty() {
            self.user_state
                .entry((app_name.to_string(), user_id.to_string()))
                .or_default()
                .extend(parts.user);
        }
    }

    fn merged(&self, session: &Session) -> Session {
        let mut copy = session.clone();
        let empty = StateMap::new();
        let app = self.app_state.get(&session.app_name).unwrap_or(&empty);
        let user = self
            .user_state
            .get(&(session.app_name.clone(), session.user_id.clone()))
            .unwrap_or(&empty);
        copy.state.merge_shared(app, user);
        copy
    }
}

/// Keeps sessions and shared app/user scopes in memory. Appends to one
/// session key are serialized by a per-key lock.
#[derive(Debug, Default)]
pub struct InMemorySessionService {
    store: Mutex<Store>,
    locks: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }

    async fn session_lock(&self, key: &SessionKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(key.clone()).or_default().clone()
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: Option<StateMap>,
        session_id: Option<String>,
    ) -> Result<Session> {
        let session_id = session_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let key = SessionKey::new(app_name, user_id, &session_id);

        let mut store = self.store.lock().await;
        if store.sessions.contains_key(&key) {
            return Err(ArborError::SessionAlreadyExists {
                app_name: key.app_name,
                user_id: key.user_id,
                session_id: key.session_id,
            });
        }

        let parts = PartitionedDelta::from_delta(&state.unwrap_or_default());
        let mut session = Session::new(app_name, user_id, &session_id);
        session.state = State::new(parts.session.clone());
        store.commit_shared(app_name, user_id, parts);
        store.sessions.insert(key.clone(), session.clone());

        tracing::debug!(session = %key, "created session");
        Ok(store.merged(&session))
    }

    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
        config: Option<GetSessionConfig>,
    ) -> Result<Option<Session>> {
        let key = SessionKey::new(app_name, user_id, session_id);
        let store = self.store.lock().await;
        let Some(stored) = store.sessions.get(&key) else {
            return Ok(None);
        };
        let mut session = store.merged(stored);
        if let Some(config) = config {
            session.events = config.filter_events(std::mem::take(&mut session.events));
        }
        Ok(Some(session))
    }

    async fn list_sessions(&self, app_name: &str, user_id: &str) -> Result<ListSessionsResponse> {
        let store = self.store.lock().await;
        let mut sessions: Vec<Session> = store
            .sessions
            .values()
            .filter(|s| s.app_name == app_name && s.user_id == user_id)
            .map(Session::header)
            .collect();
        sessions.sort_by(|a, b| {
            a.last_update_time
                .cmp(&b.last_update_time)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(ListSessionsResponse { sessions })
    }

    async fn delete_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<()> {
        let key = SessionKey::new(app_name, user_id, session_id);
        if self.store.lock().await.sessions.remove(&key).is_some() {
            tracing::debug!(session = %key, "deleted session");
        }
        self.locks.lock().await.remove(&key);
        Ok(())
    }

    async fn list_events(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<ListEventsResponse> {
        let key = SessionKey::new(app_name, user_id, session_id);
        let store = self.store.lock().await;
        let session = store
            .sessions
            .get(&key)
            .ok_or_else(|| ArborError::session_not_found(app_name, user_id, session_id))?;
        Ok(ListEventsResponse {
            events: session.events.clone(),
            next_page_token: None,
        })
    }

    async fn append_event(&self, session: &mut Session, event: Event) -> Result<Event> {
        if event.partial {
            return Ok(event);
        }

        let key = session.key();
        let lock = self.session_lock(&key).await;
        let _guard = lock.lock().await;

        let committed = {
            let mut store = self.store.lock().await;
            if !store.sessions.contains_key(&key) {
                return Err(ArborError::session_not_found(
                    &key.app_name,
                    &key.user_id,
                    &key.session_id,
                ));
            }

            let mut committed = event.clone();
            if !event.actions.state_delta.is_empty() {
                let parts = PartitionedDelta::from_delta(&event.actions.state_delta);
                store.commit_shared(&key.app_name, &key.user_id, parts);
                if let Some(stored) = store.sessions.get_mut(&key) {
                    committed.actions.state_delta =
                        stored.state.apply_delta(&event.actions.state_delta);
                }
            }
            if let Some(stored) = store.sessions.get_mut(&key) {
                stored.events.push(committed.clone());
                stored.last_update_time = committed.timestamp;
            }
            committed
        };

        apply_event_to_session(session, &event, &committed);
        tracing::debug!(
            session = %key,
            event_id = %committed.id,
            author = %committed.author,
            "committed event"
        );
        Ok(committed)
    }
}
