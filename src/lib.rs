//! Cortex: a conversational agent runtime that plans, walks and streams
//! task graphs of pluggable capabilities.

pub use cortex_capabilities as capabilities;
pub use cortex_flow as flow;
pub use cortex_runtime as runtime;

pub use cortex_core::config::{AppConfig, ExecutorConfig, JobsConfig, LogConfig, SessionConfig};
pub use cortex_core::conversation::{LogEntry, MemoryConversationLog};
pub use cortex_core::error::{CortexError, Result};
pub use cortex_core::event::{Event, Publish, Topic};
pub use cortex_core::hub::{ConversationPublisher, EventHub, Subscription};
pub use cortex_core::state::{keys, SharedState};
pub use cortex_core::telemetry::init_tracing;
pub use cortex_core::traits::{Capability, CapabilityFactory, ConversationLog};
pub use cortex_core::types::{ConversationId, NodeOutput, Params};
