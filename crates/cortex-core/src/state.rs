use std::sync::Arc;

use serde_json::{Map, Value};

use crate::traits::ConversationLog;
use crate::types::{is_truthy, ConversationId, NodeOutput};

/// Reserved keys. The `__` prefix marks runtime-internal context.
pub mod keys {
    pub const CONVERSATION_ID: &str = "__cid";
    pub const NEEDS_REPLAN: &str = "__needs_replan";
    pub const PLANNER: &str = "__planner";
    pub const GOAL: &str = "goal";
    pub const PROJECT_ROOT: &str = "__project_root";
}

/// Planner capability used when `__planner` is unset.
pub const DEFAULT_PLANNER: &str = "planner";

/// Mutable key-value carrier threaded through one conversation's execution.
///
/// Created once per conversation session and reused across every executor
/// pass and re-plan round. The conversation log is a typed handle rather
/// than a JSON value so it never appears in snapshots.
#[derive(Clone, Default)]
pub struct SharedState {
    data: Map<String, Value>,
    log: Option<Arc<dyn ConversationLog>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State pre-populated with the conversation id.
    pub fn for_conversation(cid: &ConversationId) -> Self {
        let mut state = Self::new();
        state.set(keys::CONVERSATION_ID, Value::String(cid.0.clone()));
        state
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Shallow merge: same-named keys are overwritten.
    pub fn merge(&mut self, output: &NodeOutput) {
        for (k, v) in output.as_map() {
            self.data.insert(k.clone(), v.clone());
        }
    }

    pub fn needs_replan(&self) -> bool {
        self.data.get(keys::NEEDS_REPLAN).is_some_and(is_truthy)
    }

    pub fn set_needs_replan(&mut self) {
        self.data.insert(keys::NEEDS_REPLAN.into(), Value::Bool(true));
    }

    pub fn clear_needs_replan(&mut self) {
        self.data.remove(keys::NEEDS_REPLAN);
    }

    pub fn planner_name(&self) -> &str {
        self.get_str(keys::PLANNER).unwrap_or(DEFAULT_PLANNER)
    }

    pub fn goal(&self) -> &str {
        self.get_str(keys::GOAL).unwrap_or("")
    }

    pub fn set_goal(&mut self, goal: impl Into<String>) {
        self.data.insert(keys::GOAL.into(), Value::String(goal.into()));
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.get_str(keys::CONVERSATION_ID).map(ConversationId::from_str)
    }

    pub fn attach_log(&mut self, log: Arc<dyn ConversationLog>) {
        self.log = Some(log);
    }

    pub fn conversation_log(&self) -> Option<&Arc<dyn ConversationLog>> {
        self.log.as_ref()
    }

    /// JSON snapshot of the data map.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.data.clone())
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("data", &self.data)
            .field("log", &self.log.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_overwrites() {
        let mut state = SharedState::new();
        state.set("a", json!(1));
        state.set("b", json!(2));

        let out = NodeOutput::new().with("b", json!("new")).with("c", json!(3));
        state.merge(&out);

        assert_eq!(state.get("a"), Some(&json!(1)));
        assert_eq!(state.get("b"), Some(&json!("new")));
        assert_eq!(state.get("c"), Some(&json!(3)));
    }

    #[test]
    fn test_replan_flag() {
        let mut state = SharedState::new();
        assert!(!state.needs_replan());
        state.set_needs_replan();
        assert!(state.needs_replan());
        state.clear_needs_replan();
        assert!(!state.needs_replan());
    }

    #[test]
    fn test_reserved_defaults() {
        let cid = ConversationId::from_str("c1");
        let mut state = SharedState::for_conversation(&cid);
        assert_eq!(state.planner_name(), DEFAULT_PLANNER);
        assert_eq!(state.goal(), "");
        assert_eq!(state.conversation_id(), Some(cid));

        state.set(keys::PLANNER, json!("smart_planner"));
        state.set_goal("write a poem");
        assert_eq!(state.planner_name(), "smart_planner");
        assert_eq!(state.goal(), "write a poem");
    }

    #[test]
    fn test_snapshot_excludes_log_handle() {
        let mut state = SharedState::new();
        state.attach_log(Arc::new(crate::conversation::MemoryConversationLog::new()));
        state.set("k", json!("v"));
        assert_eq!(state.snapshot(), json!({"k": "v"}));
        assert!(state.conversation_log().is_some());
    }
}
