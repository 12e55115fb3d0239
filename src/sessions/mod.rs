//! Sessions, scoped state and the session service.

pub mod in_memory;
pub mod service;
pub mod session;
pub mod state;

pub use in_memory::InMemorySessionService;
pub use service::{
    apply_event_to_session, GetSessionConfig, ListEventsResponse, ListSessionsResponse,
    SessionService,
};
pub use session::{Session, SessionKey};
pub use state::{
    PartitionedDelta, State, StateMap, StateScope, APP_PREFIX, TEMP_PREFIX, USER_PREFIX,
};
