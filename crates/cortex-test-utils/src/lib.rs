//! Mocks shared by the Cortex test suites.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde_json::{json, Value};

use cortex_core::error::{CortexError, Result};
use cortex_core::event::{Event, Publish, Topic};
use cortex_core::state::SharedState;
use cortex_core::traits::{Capability, CapabilityFactory};
use cortex_core::types::{ConversationId, NodeOutput, Params};

/// Publisher that keeps every event in memory.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<Event>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.events().iter().map(|e| e.topic).collect()
    }

    pub fn of_topic(&self, topic: Topic) -> Vec<Event> {
        self.events().into_iter().filter(|e| e.topic == topic).collect()
    }

    pub fn assistant_texts(&self) -> Vec<String> {
        self.of_topic(Topic::Assistant)
            .iter()
            .filter_map(|e| e.text().map(str::to_string))
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl Publish for RecordingPublisher {
    fn publish(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

/// Capability factory backed by a plain map; records invocation order.
#[derive(Default)]
pub struct MockFactory {
    capabilities: HashMap<String, Arc<dyn Capability>>,
    calls: Mutex<Vec<String>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: impl Capability) {
        self.capabilities
            .insert(capability.name().to_string(), Arc::new(capability));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == name).count()
    }
}

impl CapabilityFactory for MockFactory {
    fn invoke<'a>(
        &'a self,
        name: &'a str,
        state: &'a mut SharedState,
        params: Params,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        self.calls.lock().unwrap().push(name.to_string());
        Box::pin(async move {
            let capability = self
                .capabilities
                .get(name)
                .cloned()
                .ok_or_else(|| CortexError::CapabilityNotFound(name.to_string()))?;
            capability.invoke(state, params).await
        })
    }

    fn catalogue(&self, _conversation: Option<&ConversationId>) -> Value {
        let mut names: Vec<&String> = self.capabilities.keys().collect();
        names.sort();
        Value::Array(
            names
                .into_iter()
                .map(|n| json!({ "name": n, "description": self.capabilities[n].description() }))
                .collect(),
        )
    }

    fn describe(&self, _conversation: Option<&ConversationId>) -> String {
        let mut names: Vec<&String> = self.capabilities.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|n| format!("- {}", n))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Returns the same output on every call.
pub struct StaticCapability {
    name: String,
    output: Value,
}

impl StaticCapability {
    pub fn new(name: &str, output: Value) -> Self {
        Self {
            name: name.to_string(),
            output,
        }
    }
}

impl Capability for StaticCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns a fixed output."
    }

    fn invoke<'a>(
        &'a self,
        _state: &'a mut SharedState,
        _params: Params,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move { NodeOutput::try_from(self.output.clone()) })
    }
}

/// Fails on every call with a `CapabilityExecution` error.
pub struct FailingCapability {
    name: String,
    message: String,
}

impl FailingCapability {
    pub fn new(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            message: message.to_string(),
        }
    }
}

impl Capability for FailingCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Always fails."
    }

    fn invoke<'a>(
        &'a self,
        _state: &'a mut SharedState,
        _params: Params,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move { Err(CortexError::execution(&self.name, &self.message)) })
    }
}

/// Planner returning queued plans in order, repeating the last one.
pub struct ScriptedPlanner {
    name: String,
    plans: Mutex<Vec<Value>>,
    received: Arc<Mutex<Vec<Params>>>,
}

impl ScriptedPlanner {
    pub fn new(name: &str, plans: Vec<Value>) -> Self {
        assert!(!plans.is_empty(), "ScriptedPlanner needs at least one plan");
        Self {
            name: name.to_string(),
            plans: Mutex::new(plans),
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn always(name: &str, plan: Value) -> Self {
        Self::new(name, vec![plan])
    }

    /// Parameters of every invocation, shared with the test.
    pub fn received(&self) -> Arc<Mutex<Vec<Params>>> {
        self.received.clone()
    }
}

impl Capability for ScriptedPlanner {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Scripted planner."
    }

    fn invoke<'a>(
        &'a self,
        _state: &'a mut SharedState,
        params: Params,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        self.received.lock().unwrap().push(params);
        let plan = {
            let mut plans = self.plans.lock().unwrap();
            if plans.len() > 1 {
                plans.remove(0)
            } else {
                plans[0].clone()
            }
        };
        Box::pin(async move { NodeOutput::try_from(plan) })
    }
}

/// Capability driven by a closure over the state and parameters.
pub struct FnCapability<F> {
    name: String,
    f: F,
}

impl<F> FnCapability<F>
where
    F: Fn(&mut SharedState, Params) -> Result<NodeOutput> + Send + Sync + 'static,
{
    pub fn new(name: &str, f: F) -> Self {
        Self {
            name: name.to_string(),
            f,
        }
    }
}

impl<F> Capability for FnCapability<F>
where
    F: Fn(&mut SharedState, Params) -> Result<NodeOutput> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Closure-backed capability."
    }

    fn invoke<'a>(
        &'a self,
        state: &'a mut SharedState,
        params: Params,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        let result = (self.f)(state, params);
        Box::pin(async move { result })
    }
}

/// Sleeps before returning, to hold a run open.
pub struct SlowCapability {
    name: String,
    delay: std::time::Duration,
}

impl SlowCapability {
    pub fn new(name: &str, delay: std::time::Duration) -> Self {
        Self {
            name: name.to_string(),
            delay,
        }
    }
}

impl Capability for SlowCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Sleeps, then replies with the goal."
    }

    fn invoke<'a>(
        &'a self,
        state: &'a mut SharedState,
        _params: Params,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(NodeOutput::reply(format!("done: {}", state.goal())))
        })
    }
}
