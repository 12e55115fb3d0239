//! Tests for function-call dispatch through an LLM agent.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use arbor::agents::{after_tool_callback, before_tool_callback, LlmAgent};
use arbor::error::ArborError;
use arbor::events::Event;
use arbor::flows::CLIENT_FUNCTION_CALL_ID_PREFIX;
use arbor::runner::Runner;
use arbor::sessions::{InMemorySessionService, SessionService};
use arbor::tools::{FunctionTool, Tool, ToolParameters};
use arbor::types::{Content, Part, Role};

use common::{collect, new_session, service, ScriptedModel, APP, USER};

struct Harness {
    model: Arc<ScriptedModel>,
    service: Arc<InMemorySessionService>,
    runner: Runner,
    session_id: String,
}

impl Harness {
    async fn new(model: Arc<ScriptedModel>, agent: LlmAgent) -> Self {
        let service = service();
        let session = new_session(&service).await;
        let runner = Runner::new(APP, Arc::new(agent), service.clone()).unwrap();
        Self {
            model,
            service,
            runner,
            session_id: session.id,
        }
    }

    async fn turn(&self, message: Content) -> Vec<Event> {
        collect(
            self.runner
                .run_async(USER, &self.session_id, message)
                .await
                .unwrap(),
        )
        .await
    }
}

fn counting_tool(name: &str, calls: Arc<AtomicUsize>, result: serde_json::Value) -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        name,
        "Counts invocations.",
        ToolParameters::empty(),
        move |_args, _ctx| {
            let calls = calls.clone();
            let result = result.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(result)
            }
        },
    ))
}

fn first_response(event: &Event) -> serde_json::Value {
    event.function_responses()[0].response.clone()
}

#[tokio::test]
async fn unknown_tool_yields_structured_error() {
    let model = Arc::new(ScriptedModel::new("m"));
    model.queue_call("c1", "does_not_exist", json!({})).queue_text("sorry");
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = LlmAgent::new("assistant", model.clone())
        .with_tool(counting_tool("known", calls.clone(), json!({"ok": true})));
    let harness = Harness::new(model, agent).await;

    let events = harness.turn(Content::user_text("go")).await;
    assert_eq!(events.len(), 3);
    let error = first_response(&events[1]);
    let message = error["error"].as_str().unwrap();
    assert!(message.contains("does_not_exist"));
    assert!(message.contains("known"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(events[2].text().as_deref(), Some("sorry"));
}

#[tokio::test]
async fn missing_parameters_are_listed_without_running_the_tool() {
    let model = Arc::new(ScriptedModel::new("m"));
    model.queue_call("c1", "add", json!({"c": 1})).queue_text("retrying");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let add = FunctionTool::new(
        "add",
        "Add two numbers.",
        ToolParameters::object()
            .number("a", "first", true)
            .number("b", "second", true)
            .build(),
        move |args, _ctx| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"sum": args.get_f64("a")? + args.get_f64("b")?}))
            }
        },
    );
    let agent = LlmAgent::new("assistant", model.clone()).with_tool(Arc::new(add));
    let harness = Harness::new(model, agent).await;

    let events = harness.turn(Content::user_text("add")).await;
    let error = first_response(&events[1]);
    assert!(error["error"].as_str().unwrap().contains("missing: a, b"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(events[1].error_code.is_none());
}

#[tokio::test]
async fn before_tool_hook_short_circuits_the_tool() {
    let model = Arc::new(ScriptedModel::new("m"));
    model.queue_call("c1", "lookup", json!({})).queue_text("ok");
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = LlmAgent::new("assistant", model.clone())
        .with_tool(counting_tool("lookup", calls.clone(), json!({"from": "tool"})))
        .with_before_tool_callback(before_tool_callback(|_call, _ctx| async move {
            Ok(Some(json!({"from": "cache"})))
        }))
        .with_before_tool_callback(before_tool_callback(|_call, _ctx| async move {
            Ok(Some(json!({"from": "second hook"})))
        }));
    let harness = Harness::new(model, agent).await;

    let events = harness.turn(Content::user_text("go")).await;
    assert_eq!(first_response(&events[1]), json!({"from": "cache"}));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn after_tool_hook_replaces_the_result() {
    let model = Arc::new(ScriptedModel::new("m"));
    model.queue_call("c1", "lookup", json!({})).queue_text("ok");
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = LlmAgent::new("assistant", model.clone())
        .with_tool(counting_tool("lookup", calls.clone(), json!({"value": 1})))
        .with_after_tool_callback(after_tool_callback(|_call, _ctx, result| async move {
            Ok(Some(json!({"value": result["value"].as_i64().unwrap_or(0) * 10})))
        }));
    let harness = Harness::new(model, agent).await;

    let events = harness.turn(Content::user_text("go")).await;
    assert_eq!(first_response(&events[1]), json!({"value": 10}));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_before_hook_becomes_tool_error_result() {
    let model = Arc::new(ScriptedModel::new("m"));
    model.queue_call("c1", "lookup", json!({})).queue_text("ok");
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = LlmAgent::new("assistant", model.clone())
        .with_tool(counting_tool("lookup", calls.clone(), json!({})))
        .with_before_tool_callback(before_tool_callback(|_call, _ctx| async move {
            Err(ArborError::callback("before_tool", "policy check unavailable"))
        }));
    let harness = Harness::new(model, agent).await;

    let events = harness.turn(Content::user_text("go")).await;
    let result = first_response(&events[1]);
    assert_eq!(result["source"], json!("before_tool_callback"));
    assert!(result["error"].as_str().unwrap().contains("policy check unavailable"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn tool_failure_is_recorded_on_the_response_event() {
    let model = Arc::new(ScriptedModel::new("m"));
    model.queue_call("c1", "explode", json!({})).queue_text("that failed");
    let explode = FunctionTool::new("explode", "Always fails.", ToolParameters::empty(), |_a, _c| async {
        Err(ArborError::tool("explode", "boom"))
    });
    let agent = LlmAgent::new("assistant", model.clone()).with_tool(Arc::new(explode));
    let harness = Harness::new(model, agent).await;

    let events = harness.turn(Content::user_text("go")).await;
    assert!(first_response(&events[1])["error"].as_str().unwrap().contains("boom"));
    assert_eq!(events[1].error_code.as_deref(), Some("tool_execution"));
    assert_eq!(events[2].text().as_deref(), Some("that failed"));
}

#[tokio::test]
async fn scalar_results_are_wrapped_and_ids_are_generated() {
    let model = Arc::new(ScriptedModel::new("m"));
    model.queue_call("", "seven", json!({})).queue_text("got it");
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = LlmAgent::new("assistant", model.clone())
        .with_tool(counting_tool("seven", calls, json!(7)));
    let harness = Harness::new(model, agent).await;

    let events = harness.turn(Content::user_text("go")).await;
    let call_id = events[0].function_calls()[0].id.clone();
    assert!(call_id.starts_with(CLIENT_FUNCTION_CALL_ID_PREFIX));
    assert_eq!(events[1].function_responses()[0].id, call_id);
    assert_eq!(first_response(&events[1]), json!({"result": 7}));
    assert_eq!(events[1].content.as_ref().unwrap().role, Role::User);
}

#[tokio::test]
async fn tool_state_changes_are_committed() {
    let model = Arc::new(ScriptedModel::new("m"));
    model.queue_call("c1", "remember", json!({"fact": "sky is blue"})).queue_text("noted");
    let remember = FunctionTool::new(
        "remember",
        "Store a fact.",
        ToolParameters::object().string("fact", "the fact", true).build(),
        |args, ctx| async move {
            ctx.set_state("fact", json!(args.get_str("fact")?));
            ctx.set_state("temp:seen", json!(true));
            Ok(json!({"stored": true}))
        },
    );
    let agent = LlmAgent::new("assistant", model.clone()).with_tool(Arc::new(remember));
    let harness = Harness::new(model, agent).await;

    let events = harness.turn(Content::user_text("remember")).await;
    assert_eq!(events[1].actions.state_delta.get("fact"), Some(&json!("sky is blue")));

    let stored = harness
        .service
        .get_session(APP, USER, &harness.session_id, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state.get("fact"), Some(&json!("sky is blue")));
    assert!(!stored.state.contains("temp:seen"));
}

#[tokio::test]
async fn long_running_tool_suspends_and_resumes_on_matching_response() {
    let model = Arc::new(ScriptedModel::new("m"));
    model.queue_call("job-1", "start_job", json!({})).queue_text("job finished: 42");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let start_job = FunctionTool::new("start_job", "Start a job.", ToolParameters::empty(), move |_a, _c| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"status": "pending"}))
        }
    })
    .long_running();
    let agent = LlmAgent::new("assistant", model.clone()).with_tool(Arc::new(start_job));
    let harness = Harness::new(model.clone(), agent).await;

    let first = harness.turn(Content::user_text("start")).await;
    assert_eq!(first.len(), 2);
    assert!(first[0].long_running_tool_ids.contains("job-1"));
    assert!(first[1].long_running_tool_ids.contains("job-1"));
    assert_eq!(first_response(&first[1]), json!({"status": "pending"}));
    assert_eq!(harness.model.call_count(), 1);

    let update = Content::new(
        Role::User,
        vec![Part::function_response("job-1", "start_job", json!({"status": "done", "value": 42}))],
    );
    let second = harness.turn(update).await;
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].author, "assistant");
    assert_eq!(second[0].text().as_deref(), Some("job finished: 42"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let request = &model.requests()[1];
    let last = request.contents.last().unwrap();
    assert_eq!(
        last.function_responses()[0].response,
        json!({"status": "done", "value": 42})
    );
}

#[tokio::test]
async fn long_running_tool_without_result_stays_pending() {
    let model = Arc::new(ScriptedModel::new("m"));
    model.queue_call("job-2", "background", json!({}));
    let background = FunctionTool::new("background", "Run later.", ToolParameters::empty(), |_a, _c| async {
        Ok(serde_json::Value::Null)
    })
    .long_running();
    let agent = LlmAgent::new("assistant", model.clone()).with_tool(Arc::new(background));
    let harness = Harness::new(model, agent).await;

    let events = harness.turn(Content::user_text("go")).await;
    assert_eq!(events.len(), 1);
    assert!(events[0].long_running_tool_ids.contains("job-2"));
    assert!(events[0].is_final_response());
    assert!(events[0].function_responses().is_empty());
}
