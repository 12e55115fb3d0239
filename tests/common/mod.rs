//! Shared test helpers: a scripted model, a scripted custom agent and
//! session utilities.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;

use arbor::agents::{Agent, AgentCallbacks, EventStream, InvocationContext};
use arbor::error::ArborError;
use arbor::events::Event;
use arbor::models::{Llm, LlmRequest, LlmResponse, LlmResponseStream};
use arbor::sessions::{InMemorySessionService, Session, SessionService};
use arbor::types::{Content, Part, Role};

pub const APP: &str = "test_app";
pub const USER: &str = "test_user";

/// A model that replays queued turns and records every request.
///
/// Each queued turn is the list of responses one model call streams back.
/// With nothing queued the model answers "Mock response".
pub struct ScriptedModel {
    name: String,
    turns: Mutex<VecDeque<Vec<LlmResponse>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            turns: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a turn of raw responses.
    pub fn queue(&self, responses: Vec<LlmResponse>) -> &Self {
        self.turns.lock().unwrap().push_back(responses);
        self
    }

    /// Queue a plain text reply.
    pub fn queue_text(&self, text: &str) -> &Self {
        self.queue(vec![LlmResponse::from_content(Content::model_text(text))])
    }

    /// Queue a single function call. An empty id lets the flow assign one.
    pub fn queue_call(&self, id: &str, name: &str, args: serde_json::Value) -> &Self {
        self.queue(vec![LlmResponse::from_content(Content::new(
            Role::Model,
            vec![Part::function_call(id, name, args)],
        ))])
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Llm for ScriptedModel {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn generate_content(
        &self,
        request: LlmRequest,
        _stream: bool,
    ) -> Result<LlmResponseStream, ArborError> {
        self.requests.lock().unwrap().push(request);
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![LlmResponse::from_content(Content::model_text("Mock response"))]);
        Ok(Box::pin(futures::stream::iter(turn.into_iter().map(Ok::<_, ArborError>))))
    }
}

/// A custom agent that waits, then replies with fixed text, optionally
/// escalating.
pub struct ScriptedAgent {
    name: String,
    reply: String,
    delay: Duration,
    escalate: bool,
    callbacks: AgentCallbacks,
}

impl ScriptedAgent {
    pub fn new(name: &str, reply: &str) -> Self {
        Self {
            name: name.to_string(),
            reply: reply.to_string(),
            delay: Duration::ZERO,
            escalate: false,
            callbacks: AgentCallbacks::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn escalating(mut self) -> Self {
        self.escalate = true;
        self
    }
}

impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn callbacks(&self) -> &AgentCallbacks {
        &self.callbacks
    }

    fn run_impl(self: Arc<Self>, ctx: InvocationContext) -> EventStream {
        Box::pin(try_stream! {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut event = ctx.new_event().with_content(Content::model_text(self.reply.clone()));
            event.actions.escalate = self.escalate;
            yield event;
        })
    }
}

pub fn service() -> Arc<InMemorySessionService> {
    Arc::new(InMemorySessionService::new())
}

pub async fn new_session(service: &Arc<InMemorySessionService>) -> Session {
    service
        .create_session(APP, USER, None, None)
        .await
        .expect("create session")
}

/// Drain a stream, panicking on the first error.
pub async fn collect(mut events: EventStream) -> Vec<Event> {
    let mut out = Vec::new();
    while let Some(event) = events.next().await {
        out.push(event.expect("event"));
    }
    out
}

/// Drain a stream, keeping errors.
pub async fn collect_results(mut events: EventStream) -> Vec<Result<Event, ArborError>> {
    let mut out = Vec::new();
    while let Some(event) = events.next().await {
        out.push(event);
    }
    out
}

pub fn texts(events: &[Event]) -> Vec<String> {
    events.iter().filter_map(Event::text).collect()
}
