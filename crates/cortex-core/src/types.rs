use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{CortexError, Result};

/// Parameters passed to a capability invocation.
pub type Params = Map<String, Value>;

/// Unique conversation identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Output keys with meaning to the executor.
pub mod output_keys {
    pub const REPLY: &str = "reply";
    pub const REPLAN: &str = "replan";
    pub const NEEDS_REPLAN: &str = "needs_replan";
    pub const LOGS: &str = "logs";
    /// Older capabilities report captured lines under this key.
    pub const LEGACY_LOGS: &str = "__logs";
}

/// The mapping returned by one capability invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeOutput(Map<String, Value>);

impl NodeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// An output carrying only a user-facing reply.
    pub fn reply(text: impl Into<String>) -> Self {
        Self::new().with(output_keys::REPLY, Value::String(text.into()))
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// The `reply` field, if it is a string.
    pub fn reply_text(&self) -> Option<&str> {
        self.0.get(output_keys::REPLY).and_then(Value::as_str)
    }

    /// Whether the output asks for another planning round.
    pub fn requests_replan(&self) -> bool {
        [output_keys::REPLAN, output_keys::NEEDS_REPLAN]
            .iter()
            .any(|k| self.0.get(*k).is_some_and(is_truthy))
    }

    /// Remove captured log lines from the output.
    ///
    /// Returns `None` when neither `logs` nor `__logs` was present.
    pub fn take_logs(&mut self) -> Option<Vec<String>> {
        let mut found = None;
        for key in [output_keys::LOGS, output_keys::LEGACY_LOGS] {
            if let Some(value) = self.0.remove(key) {
                let lines = found.get_or_insert_with(Vec::new);
                lines.extend(log_lines(value));
            }
        }
        found
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for NodeOutput {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for NodeOutput {
    type Error = CortexError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(CortexError::CapabilityValidation {
                capability: String::new(),
                message: format!("capability output must be an object, got {}", other),
            }),
        }
    }
}

fn log_lines(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        Value::String(s) => s.lines().map(str::to_string).collect(),
        Value::Null => Vec::new(),
        other => vec![other.to_string()],
    }
}

/// Loose truthiness for flags written by capabilities.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
