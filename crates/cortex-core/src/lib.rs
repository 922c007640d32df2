pub mod config;
pub mod conversation;
pub mod error;
pub mod event;
pub mod hub;
pub mod state;
pub mod telemetry;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use conversation::{LogEntry, MemoryConversationLog};
pub use error::{CortexError, Result};
pub use event::{Event, Publish, Topic};
pub use hub::{ConversationPublisher, EventHub, Subscription};
pub use state::SharedState;
pub use traits::{Capability, CapabilityFactory, ConversationLog};
pub use types::*;
