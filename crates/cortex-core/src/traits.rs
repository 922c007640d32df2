use futures::future::BoxFuture;

use crate::conversation::LogEntry;
use crate::error::Result;
use crate::state::SharedState;
use crate::types::*;

/// A named, independently pluggable unit of work.
pub trait Capability: Send + Sync + 'static {
    /// Capability name (used in flow graphs and plans).
    fn name(&self) -> &str;

    /// Human/LLM-facing description, shown in the planning catalogue.
    fn description(&self) -> &str;

    /// JSON Schema for the capability's parameters.
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    /// Run the capability against the shared state.
    fn invoke<'a>(
        &'a self,
        state: &'a mut SharedState,
        params: Params,
    ) -> BoxFuture<'a, Result<NodeOutput>>;
}

/// Resolves capability names and exposes the catalogue used for planning.
pub trait CapabilityFactory: Send + Sync + 'static {
    /// Invoke a capability by name.
    fn invoke<'a>(
        &'a self,
        name: &'a str,
        state: &'a mut SharedState,
        params: Params,
    ) -> BoxFuture<'a, Result<NodeOutput>>;

    /// Structured capability listing for the planner.
    fn catalogue(&self, conversation: Option<&ConversationId>) -> serde_json::Value;

    /// Human/LLM-facing description of every capability.
    fn describe(&self, conversation: Option<&ConversationId>) -> String;
}

/// Conversation transcript attached to a session's shared state.
pub trait ConversationLog: Send + Sync + 'static {
    /// Append one line to the transcript.
    fn append(&self, sender: &str, text: &str) -> Result<()>;

    /// Full transcript in insertion order.
    fn history(&self) -> Vec<LogEntry>;
}
