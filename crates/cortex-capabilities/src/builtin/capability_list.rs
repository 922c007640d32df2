use futures::future::BoxFuture;
use serde_json::Value;

use cortex_core::error::Result;
use cortex_core::state::SharedState;
use cortex_core::traits::Capability;
use cortex_core::types::{NodeOutput, Params};

use crate::registry::{describe_definitions, CapabilityDefinition};

/// Describes the capabilities available when it was registered.
pub struct CapabilityListCapability {
    definitions: Vec<CapabilityDefinition>,
}

impl CapabilityListCapability {
    pub fn new(definitions: Vec<CapabilityDefinition>) -> Self {
        Self { definitions }
    }
}

impl Capability for CapabilityListCapability {
    fn name(&self) -> &str {
        "capability_list"
    }

    fn description(&self) -> &str {
        "List the capabilities this assistant can use."
    }

    fn invoke<'a>(
        &'a self,
        _state: &'a mut SharedState,
        _params: Params,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            let reply = if self.definitions.is_empty() {
                "No capabilities are registered.".to_string()
            } else {
                format!(
                    "Here is what I can do:\n{}",
                    describe_definitions(&self.definitions)
                )
            };
            Ok(NodeOutput::reply(reply).with(
                "capabilities",
                serde_json::to_value(&self.definitions).unwrap_or(Value::Null),
            ))
        })
    }
}
