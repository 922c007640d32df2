use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use cortex_core::types::NodeOutput;

/// Assistant text used when a declined plan carries no question.
pub const PLANNER_FALLBACK: &str = "Planner could not formulate a new plan.";

/// A planner's answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub ok: bool,
    /// Shorthand or complete graph; see `FlowShape`.
    #[serde(default)]
    pub flow: Option<Value>,
    /// Inputs the planner still needs from the user.
    #[serde(default)]
    pub missing: Vec<String>,
    /// Clarifying question for the user when `ok` is false.
    #[serde(default)]
    pub question: Option<String>,
}

impl Plan {
    /// An accepted plan with the given flow.
    pub fn accept(flow: Value) -> Self {
        Self {
            ok: true,
            flow: Some(flow),
            ..Self::default()
        }
    }

    /// A declined plan, optionally asking the user something.
    pub fn declined(question: Option<String>) -> Self {
        Self {
            question,
            ..Self::default()
        }
    }

    /// Extract the plan from a planner capability's output.
    ///
    /// Accepts the plan at the top level or nested under `plan`. A bare flow
    /// shorthand (`{"type": ...}` or `{"name": ...}`) without `ok` counts as
    /// an accepted plan. Anything unreadable becomes a declined plan.
    pub fn from_output(output: &NodeOutput) -> Self {
        let doc = match output.get("plan") {
            Some(nested) => nested.clone(),
            None => output.to_value(),
        };

        if let Value::Object(obj) = &doc {
            if !obj.contains_key("ok") && (obj.contains_key("type") || obj.contains_key("name")) {
                return Self::accept(doc);
            }
        }

        match serde_json::from_value::<Plan>(doc) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "Malformed planner output");
                Self::declined(None)
            }
        }
    }

    /// Whether the executor can act on this plan.
    pub fn is_actionable(&self) -> bool {
        self.ok && self.flow.is_some()
    }

    /// The text to show the user when the plan is not actionable.
    pub fn user_message(&self) -> &str {
        match self.question.as_deref() {
            Some(q) if !q.trim().is_empty() => q,
            _ => PLANNER_FALLBACK,
        }
    }
}
