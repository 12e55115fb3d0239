//! Arbor: agent invocation and session-event engine.
//!
//! A tree of agents (model-driven, sequential, parallel, loop or custom)
//! produces a lazy stream of [`events::Event`]s for each user turn. The
//! [`runner::Runner`] resolves which agent continues a conversation,
//! drives it, and commits every event through a
//! [`sessions::SessionService`], which is the only place state changes.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use arbor::prelude::*;
//!
//! # async fn example(model: Arc<dyn Llm>) -> arbor::error::Result<()> {
//! let service = Arc::new(InMemorySessionService::new());
//! let agent = Arc::new(LlmAgent::new("assistant", model).with_instruction("Be brief."));
//! let runner = Runner::new("demo", agent, service.clone())?;
//!
//! let session = service.create_session("demo", "u1", None, None).await?;
//! let mut events = runner.run_async("u1", &session.id, Content::user_text("Hello!")).await?;
//! while let Some(event) = events.next().await {
//!     println!("{:?}", event?.text());
//! }
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod config;
pub mod error;
pub mod events;
pub mod flows;
pub mod models;
pub mod prelude;
pub mod runner;
pub mod sessions;
pub mod tools;
pub mod types;
