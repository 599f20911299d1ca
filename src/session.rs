//! Conversation session: transcript plus turn state
//!
//! The state is a plain value with synchronous transitions; the runtime
//! owns one and drives it from its event loop.

mod message;
mod state;


pub use message::{Message, Role};
pub use state::{SessionError, SessionState, TurnPhase, TurnTicket};
