//! Events and their side-effect payloads.

pub mod actions;
pub mod event;

pub use actions::EventActions;
pub use event::{Event, USER_AUTHOR};
