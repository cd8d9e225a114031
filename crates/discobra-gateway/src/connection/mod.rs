//! Connection lifecycle
//!
//! The session state machine, the heartbeat task and the shared state they
//! coordinate through.

mod backoff;
mod heartbeat;
mod outbound;
mod sequence;
mod session;

pub use backoff::{compute_backoff, invalid_session_delay, with_jitter};
pub use heartbeat::{HeartbeatFailure, HeartbeatState, Heartbeater};
pub use outbound::Outbound;
pub use sequence::Sequence;
pub use session::{Action, ConnectPlan, Session, SessionStage};
