use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Lifecycle event topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "node.start")]
    NodeStart,
    #[serde(rename = "node.log")]
    NodeLog,
    #[serde(rename = "node.done")]
    NodeDone,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "task.done")]
    TaskDone,
    /// Inbound user message, echoed to observers.
    #[serde(rename = "user")]
    User,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NodeStart => "node.start",
            Self::NodeLog => "node.log",
            Self::NodeDone => "node.done",
            Self::Assistant => "assistant",
            Self::TaskDone => "task.done",
            Self::User => "user",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event on the wire: `{"topic": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub topic: Topic,
    pub data: Value,
}

impl Event {
    pub fn new(topic: Topic, data: Value) -> Self {
        Self { topic, data }
    }

    pub fn node_start(id: &str, capability: &str) -> Self {
        Self::new(Topic::NodeStart, json!({ "id": id, "capability": capability }))
    }

    pub fn node_log(id: &str, capability: &str, logs: Vec<String>) -> Self {
        Self::new(
            Topic::NodeLog,
            json!({ "id": id, "capability": capability, "logs": logs }),
        )
    }

    pub fn node_done(id: &str, out: Value) -> Self {
        Self::new(Topic::NodeDone, json!({ "id": id, "out": out }))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Topic::Assistant, Value::String(text.into()))
    }

    pub fn task_done(state: Value) -> Self {
        Self::new(Topic::TaskDone, json!({ "state": state }))
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Topic::User, Value::String(text.into()))
    }

    /// The `data` payload as text, for `assistant` and `user` events.
    pub fn text(&self) -> Option<&str> {
        self.data.as_str()
    }
}

/// Non-blocking, order-preserving event sink.
///
/// Implementations must never block the caller and never report delivery
/// failures back to it.
pub trait Publish: Send + Sync {
    fn publish(&self, event: Event);
}

impl<F> Publish for F
where
    F: Fn(Event) + Send + Sync,
{
    fn publish(&self, event: Event) {
        self(event)
    }
}
