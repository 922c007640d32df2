//! Conversation sessions and the inbound message boundary.

pub mod runtime;
pub mod session;

pub use runtime::{ConversationRuntime, TurnOutcome, USER_SENDER};
pub use session::{Session, SessionRegistry};
