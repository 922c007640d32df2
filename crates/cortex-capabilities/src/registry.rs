use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use cortex_core::error::{CortexError, Result};
use cortex_core::state::SharedState;
use cortex_core::traits::{Capability, CapabilityFactory};
use cortex_core::types::{ConversationId, NodeOutput, Params};

use crate::jobs::JobStore;

/// Catalogue entry handed to planners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDefinition {
    pub name: String,
    pub description: String,
    pub params: serde_json::Value,
}

/// Registry of available capabilities.
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            capabilities: HashMap::new(),
        }
    }

    /// Register a capability, replacing any with the same name.
    pub fn register(&mut self, capability: impl Capability) {
        self.register_arc(Arc::new(capability));
    }

    /// Register an already shared capability.
    pub fn register_arc(&mut self, capability: Arc<dyn Capability>) {
        let name = capability.name().to_string();
        self.capabilities.insert(name, capability);
    }

    /// Unregister a capability by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.capabilities.remove(name).is_some()
    }

    /// Get a capability by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.capabilities.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Catalogue entries, sorted by name.
    pub fn definitions(&self) -> Vec<CapabilityDefinition> {
        self.list()
            .into_iter()
            .filter_map(|name| self.capabilities.get(name))
            .map(|c| CapabilityDefinition {
                name: c.name().to_string(),
                description: c.description().to_string(),
                params: c.input_schema(),
            })
            .collect()
    }

    /// Register `capability_list`, describing everything registered so far.
    pub fn register_listing(&mut self) {
        let listing = crate::builtin::capability_list::CapabilityListCapability::new(
            self.definitions(),
        );
        self.register(listing);
    }

    /// Create a registry with the built-in capabilities registered.
    pub fn with_builtins(jobs: Arc<JobStore>) -> Self {
        let mut registry = Self::new();

        registry.register(crate::builtin::write_file::WriteFileCapability);
        registry.register(crate::builtin::job_status::JobStatusCapability::new(jobs));

        // Last, so the listing sees every other built-in
        registry.register_listing();

        registry
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityFactory for CapabilityRegistry {
    fn invoke<'a>(
        &'a self,
        name: &'a str,
        state: &'a mut SharedState,
        params: Params,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            let capability = self
                .get(name)
                .ok_or_else(|| CortexError::CapabilityNotFound(name.to_string()))?;
            debug!(capability = name, params = params.len(), "Invoking capability");
            capability.invoke(state, params).await
        })
    }

    fn catalogue(&self, _conversation: Option<&ConversationId>) -> serde_json::Value {
        serde_json::to_value(self.definitions()).unwrap_or_default()
    }

    fn describe(&self, _conversation: Option<&ConversationId>) -> String {
        describe_definitions(&self.definitions())
    }
}

/// Markdown bullet list of capabilities.
pub fn describe_definitions(definitions: &[CapabilityDefinition]) -> String {
    definitions
        .iter()
        .map(|d| format!("- **{}**: {}", d.name, d.description))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_test_utils::{FailingCapability, StaticCapability};
    use serde_json::json;

    #[tokio::test]
    async fn test_invoke_by_name() {
        let mut registry = CapabilityRegistry::new();
        registry.register(StaticCapability::new("echo", json!({"reply": "pong"})));

        let mut state = SharedState::new();
        let out = registry.invoke("echo", &mut state, Params::new()).await.unwrap();
        assert_eq!(out.reply_text(), Some("pong"));
    }

    #[tokio::test]
    async fn test_unknown_capability() {
        let registry = CapabilityRegistry::new();
        let mut state = SharedState::new();
        let err = registry
            .invoke("ghost", &mut state, Params::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CortexError::CapabilityNotFound(ref n) if n == "ghost"));
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let mut registry = CapabilityRegistry::new();
        registry.register(FailingCapability::new("bad", "broken"));
        let mut state = SharedState::new();
        let err = registry.invoke("bad", &mut state, Params::new()).await.unwrap_err();
        assert_eq!(err.message(), "broken");
    }

    #[test]
    fn test_catalogue_sorted() {
        let mut registry = CapabilityRegistry::new();
        registry.register(StaticCapability::new("zeta", json!({})));
        registry.register(StaticCapability::new("alpha", json!({})));

        let catalogue = registry.catalogue(None);
        let names: Vec<_> = catalogue
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert!(registry.describe(None).starts_with("- **alpha**: Returns a fixed output."));
    }

    #[test]
    fn test_register_and_unregister() {
        let mut registry = CapabilityRegistry::new();
        registry.register(StaticCapability::new("a", json!({})));
        assert!(registry.get("a").is_some());
        assert!(registry.unregister("a"));
        assert!(registry.get("a").is_none());
        assert!(!registry.unregister("a"));
    }

    #[test]
    fn test_builtins() {
        let registry = CapabilityRegistry::with_builtins(Arc::new(JobStore::new()));
        assert_eq!(registry.list(), vec!["capability_list", "job_status", "write_file"]);
    }
}
