// Session relay: turn state machine, tool-call resolution, per-conversation sessions.

pub mod resolver;
pub mod session;
pub mod store;
pub mod types;

pub use resolver::resolve_and_execute_tool_call;
pub use session::{is_exit_command, RelaySettings, Session, SessionRelay, EXIT_REPLY, ROUND_LIMIT_REPLY};
pub use store::{SessionStore, SharedSession, StoreLimits};
pub use types::{RelayEvent, RelayState, ToolResolution, TurnOutcome};
