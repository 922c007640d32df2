use serde::{Deserialize, Serialize};
use serde_json::Value;

use cortex_core::types::Params;

/// One step of a flow graph: which capability to run, with what
/// parameters, and which node follows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Capability name. Older planners emit this as `neuro`.
    #[serde(alias = "neuro")]
    pub capability: String,
    /// Keyword parameters for the capability.
    #[serde(default)]
    pub params: Params,
    /// Id of the following node; `None` ends the walk.
    #[serde(default)]
    pub next: Option<String>,
}

impl NodeSpec {
    /// Create a node with no parameters and no successor.
    pub fn new(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            params: Params::new(),
            next: None,
        }
    }

    /// Replace the parameters.
    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Set a single parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Set the successor node.
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }
}
