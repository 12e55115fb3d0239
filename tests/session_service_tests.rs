//! Tests for scoped session state and the in-memory session service.

mod common;

use chrono::Utc;
use pretty_assertions::assert_eq;
use serde_json::json;

use arbor::error::ArborError;
use arbor::events::{Event, EventActions};
use arbor::sessions::{GetSessionConfig, InMemorySessionService, SessionService, StateMap};
use arbor::types::Content;

use common::{APP, USER};

fn delta_event(pairs: &[(&str, serde_json::Value)]) -> Event {
    let mut actions = EventActions::default();
    for (key, value) in pairs {
        actions.state_delta.insert(key.to_string(), value.clone());
    }
    Event::new("e-1", "agent").with_actions(actions)
}

#[tokio::test]
async fn temp_keys_are_visible_to_caller_but_not_persisted() {
    let service = InMemorySessionService::new();
    let mut session = service.create_session(APP, USER, None, None).await.unwrap();

    let committed = service
        .append_event(
            &mut session,
            delta_event(&[("temp:scratch", json!("x")), ("keep", json!(1))]),
        )
        .await
        .unwrap();

    assert_eq!(session.state.get("temp:scratch"), Some(&json!("x")));
    assert!(!committed.actions.state_delta.contains_key("temp:scratch"));
    assert_eq!(committed.actions.state_delta.get("keep"), Some(&json!(1)));

    let reloaded = service
        .get_session(APP, USER, &session.id, None)
        .await
        .unwrap()
        .unwrap();
    assert!(!reloaded.state.contains("temp:scratch"));
    assert_eq!(reloaded.state.get("keep"), Some(&json!(1)));
    assert_eq!(reloaded.events.len(), 1);
}

#[tokio::test]
async fn app_and_user_scopes_are_shared_across_sessions() {
    let service = InMemorySessionService::new();
    let mut first = service.create_session(APP, USER, None, None).await.unwrap();
    service
        .append_event(
            &mut first,
            delta_event(&[
                ("app:theme", json!("dark")),
                ("user:lang", json!("en")),
                ("local", json!(true)),
            ]),
        )
        .await
        .unwrap();

    let same_user = service.create_session(APP, USER, None, None).await.unwrap();
    assert_eq!(same_user.state.get("app:theme"), Some(&json!("dark")));
    assert_eq!(same_user.state.get("user:lang"), Some(&json!("en")));
    assert!(!same_user.state.contains("local"));

    let other_user = service.create_session(APP, "someone_else", None, None).await.unwrap();
    assert_eq!(other_user.state.get("app:theme"), Some(&json!("dark")));
    assert!(!other_user.state.contains("user:lang"));

    let other_app = service.create_session("other_app", USER, None, None).await.unwrap();
    assert!(other_app.state.is_empty());
}

#[tokio::test]
async fn initial_state_is_split_into_scopes() {
    let service = InMemorySessionService::new();
    let mut initial = StateMap::new();
    initial.insert("app:version".into(), json!(2));
    initial.insert("user:name".into(), json!("Ada"));
    initial.insert("count".into(), json!(0));
    initial.insert("temp:draft".into(), json!("dropped"));

    let created = service
        .create_session(APP, USER, Some(initial), Some("s1".into()))
        .await
        .unwrap();
    assert_eq!(created.state.get("count"), Some(&json!(0)));
    assert!(!created.state.contains("temp:draft"));

    let sibling = service.create_session(APP, USER, None, None).await.unwrap();
    assert_eq!(sibling.state.get("app:version"), Some(&json!(2)));
    assert_eq!(sibling.state.get("user:name"), Some(&json!("Ada")));
    assert!(!sibling.state.contains("count"));
}

#[tokio::test]
async fn shared_scope_updates_reach_existing_sessions_on_reload() {
    let service = InMemorySessionService::new();
    let mut writer = service.create_session(APP, USER, None, None).await.unwrap();
    let reader = service.create_session(APP, USER, None, None).await.unwrap();

    service
        .append_event(&mut writer, delta_event(&[("user:score", json!(10))]))
        .await
        .unwrap();

    let reloaded = service
        .get_session(APP, USER, &reader.id, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.state.get("user:score"), Some(&json!(10)));
    assert!(reloaded.events.is_empty());
}

#[tokio::test]
async fn get_session_filters_events() {
    let service = InMemorySessionService::new();
    let mut session = service.create_session(APP, USER, None, None).await.unwrap();
    for text in ["one", "two", "three"] {
        let event = Event::new("e-1", "user").with_content(Content::user_text(text));
        service.append_event(&mut session, event).await.unwrap();
    }

    let config = GetSessionConfig::builder().num_recent_events(2).build();
    let recent = service
        .get_session(APP, USER, &session.id, Some(config))
        .await
        .unwrap()
        .unwrap();
    let texts: Vec<String> = recent.events.iter().filter_map(Event::text).collect();
    assert_eq!(texts, vec!["two".to_string(), "three".to_string()]);

    let config = GetSessionConfig::builder()
        .after_timestamp(Utc::now() + chrono::Duration::hours(1))
        .build();
    let none = service
        .get_session(APP, USER, &session.id, Some(config))
        .await
        .unwrap()
        .unwrap();
    assert!(none.events.is_empty());
}

#[tokio::test]
async fn list_sessions_returns_headers_only() {
    let service = InMemorySessionService::new();
    let mut session = service.create_session(APP, USER, None, Some("a".into())).await.unwrap();
    service
        .append_event(&mut session, delta_event(&[("k", json!(1))]))
        .await
        .unwrap();
    service.create_session(APP, USER, None, Some("b".into())).await.unwrap();
    service.create_session(APP, "other", None, Some("c".into())).await.unwrap();

    let listed = service.list_sessions(APP, USER).await.unwrap().sessions;
    let mut ids: Vec<&str> = listed.iter().map(|s| s.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(listed.iter().all(|s| s.events.is_empty() && s.state.is_empty()));
}

#[tokio::test]
async fn list_events_requires_existing_session() {
    let service = InMemorySessionService::new();
    let mut session = service.create_session(APP, USER, None, None).await.unwrap();
    service
        .append_event(&mut session, Event::new("e-1", "user"))
        .await
        .unwrap();

    let listed = service.list_events(APP, USER, &session.id).await.unwrap();
    assert_eq!(listed.events.len(), 1);
    assert!(listed.next_page_token.is_none());

    let err = service.list_events(APP, USER, "nope").await.unwrap_err();
    assert!(matches!(err, ArborError::SessionNotFound { .. }));
}

#[tokio::test]
async fn concurrent_appends_are_all_committed() {
    let service = std::sync::Arc::new(InMemorySessionService::new());
    let session = service.create_session(APP, USER, None, None).await.unwrap();

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..20 {
        let service = service.clone();
        let mut copy = session.clone();
        tasks.spawn(async move {
            service
                .append_event(&mut copy, delta_event(&[(&format!("k{i}"), json!(i))]))
                .await
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap().unwrap();
    }

    let stored = service
        .get_session(APP, USER, &session.id, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.events.len(), 20);
    assert_eq!(stored.state.len(), 20);
}
