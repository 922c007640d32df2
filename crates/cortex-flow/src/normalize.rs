//! Canonicalization of planner output into a `FlowGraph`.

use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::debug;

use cortex_core::config::AppConfig;
use cortex_core::error::{CortexError, Result};
use cortex_core::types::Params;

use crate::graph::FlowGraph;

/// Capability invoked by the reply shorthand.
pub const REPLY_CAPABILITY: &str = "reply";

/// The shapes a planner may hand back as its `flow`.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowShape {
    /// Already a complete graph.
    FullGraph(FlowGraph),
    /// `"reply"` or `{"type": "reply"}`: answer the goal directly.
    ReplyShorthand,
    /// A single capability with parameters.
    SingleCapability { name: String, params: Params },
}

impl FlowShape {
    /// Classify a raw flow value.
    pub fn parse(raw: &Value) -> Result<Self> {
        match raw {
            Value::Object(obj) if obj.contains_key("start") && obj.contains_key("nodes") => {
                let graph: FlowGraph = serde_json::from_value(raw.clone()).map_err(|e| {
                    CortexError::Normalization(format!("malformed flow graph: {}", e))
                })?;
                Ok(Self::FullGraph(graph))
            }
            Value::String(s) if s == REPLY_CAPABILITY => Ok(Self::ReplyShorthand),
            Value::String(s) => Ok(Self::SingleCapability {
                name: s.clone(),
                params: Params::new(),
            }),
            Value::Object(obj) if obj.get("type").and_then(Value::as_str) == Some("reply") => {
                Ok(Self::ReplyShorthand)
            }
            Value::Object(obj) if obj.contains_key("name") => single_from_object(obj),
            Value::Array(items) if items.len() == 1 => match &items[0] {
                Value::Object(obj) if obj.contains_key("name") => single_from_object(obj),
                other => Err(unrecognised(other)),
            },
            other => Err(unrecognised(other)),
        }
    }
}

fn single_from_object(obj: &serde_json::Map<String, Value>) -> Result<FlowShape> {
    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| CortexError::Normalization("capability `name` must be a string".into()))?;
    let params = match obj.get("params") {
        None | Some(Value::Null) => Params::new(),
        Some(Value::Object(p)) => p.clone(),
        Some(other) => {
            return Err(CortexError::Normalization(format!(
                "params for '{}' must be an object, got {}",
                name, other
            )))
        }
    };
    Ok(FlowShape::SingleCapability {
        name: name.to_string(),
        params,
    })
}

fn unrecognised(raw: &Value) -> CortexError {
    let mut shown = raw.to_string();
    if shown.len() > 120 {
        let cut = (0..=120).rev().find(|i| shown.is_char_boundary(*i)).unwrap_or(0);
        shown.truncate(cut);
        shown.push('…');
    }
    CortexError::Normalization(format!("unrecognised flow shape: {}", shown))
}

/// Per-capability parameter renames applied to shorthand plans.
#[derive(Debug, Clone, Default)]
pub struct ParamAliases {
    table: HashMap<String, Vec<(String, String)>>,
}

impl ParamAliases {
    /// No renames at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in renames planners are known to need.
    pub fn builtin() -> Self {
        Self::empty().with_alias("write_file", "file_name", "filename")
    }

    /// Rename `from` to `to` in parameters for `capability`.
    pub fn with_alias(
        mut self,
        capability: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.insert(capability, from, to);
        self
    }

    pub fn insert(
        &mut self,
        capability: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) {
        self.table
            .entry(capability.into())
            .or_default()
            .push((from.into(), to.into()));
    }

    /// Add renames from the `[aliases]` config table.
    pub fn extend_from_config(&mut self, config: &HashMap<String, HashMap<String, String>>) {
        for (capability, renames) in config {
            for (from, to) in renames {
                self.insert(capability.clone(), from.clone(), to.clone());
            }
        }
    }

    /// Rename aliased keys in place. An existing target key is never
    /// overwritten.
    pub fn apply(&self, capability: &str, params: &mut Params) {
        let Some(renames) = self.table.get(capability) else {
            return;
        };
        for (from, to) in renames {
            if params.contains_key(to) {
                continue;
            }
            if let Some(value) = params.remove(from) {
                debug!(capability, from = %from, to = %to, "Renamed aliased parameter");
                params.insert(to.clone(), value);
            }
        }
    }
}

/// Turns any accepted plan flow into a `FlowGraph`.
#[derive(Debug, Clone)]
pub struct FlowNormalizer {
    aliases: ParamAliases,
}

impl Default for FlowNormalizer {
    fn default() -> Self {
        Self::new(ParamAliases::builtin())
    }
}

impl FlowNormalizer {
    pub fn new(aliases: ParamAliases) -> Self {
        Self { aliases }
    }

    /// Built-in aliases extended with the configured `[aliases]` tables.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut aliases = ParamAliases::builtin();
        aliases.extend_from_config(&config.aliases);
        Self::new(aliases)
    }

    pub fn aliases(&self) -> &ParamAliases {
        &self.aliases
    }

    /// Normalize a raw flow value. `goal` binds the reply shorthand's `text`.
    pub fn normalize(&self, raw: &Value, goal: &str) -> Result<FlowGraph> {
        let shape = FlowShape::parse(raw)?;
        Ok(self.to_graph(shape, goal))
    }

    /// Expand a classified shape. Complete graphs pass through unchanged.
    pub fn to_graph(&self, shape: FlowShape, goal: &str) -> FlowGraph {
        match shape {
            FlowShape::FullGraph(graph) => graph,
            FlowShape::ReplyShorthand => {
                let mut params = Params::new();
                params.insert("text".into(), json!(goal));
                FlowGraph::single(REPLY_CAPABILITY, params)
            }
            FlowShape::SingleCapability { name, mut params } => {
                self.aliases.apply(&name, &mut params);
                FlowGraph::single(name, params)
            }
        }
    }
}

/// Normalize with the built-in alias table.
pub fn normalize(raw: &Value, goal: &str) -> Result<FlowGraph> {
    FlowNormalizer::default().normalize(raw, goal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeSpec;

    #[test]
    fn test_reply_string_and_object_match() {
        let a = normalize(&json!("reply"), "hi").unwrap();
        let b = normalize(&json!({"type": "reply"}), "hi").unwrap();
        assert_eq!(a, b);

        let node = a.get("n0").unwrap();
        assert_eq!(node.capability, "reply");
        assert_eq!(node.params.get("text"), Some(&json!("hi")));
        assert!(node.next.is_none());
    }

    #[test]
    fn test_bare_capability_name() {
        let graph = normalize(&json!("capability_list"), "ignored").unwrap();
        let node = graph.get("n0").unwrap();
        assert_eq!(node.capability, "capability_list");
        assert!(node.params.is_empty());
    }

    #[test]
    fn test_named_object() {
        let graph = normalize(
            &json!({"name": "video_generator", "params": {"topic": "cats"}}),
            "",
        )
        .unwrap();
        let node = graph.get("n0").unwrap();
        assert_eq!(node.capability, "video_generator");
        assert_eq!(node.params.get("topic"), Some(&json!("cats")));
    }

    #[test]
    fn test_named_object_without_params() {
        let graph = normalize(&json!({"name": "x", "params": null}), "").unwrap();
        assert!(graph.get("n0").unwrap().params.is_empty());
    }

    #[test]
    fn test_single_element_list() {
        let graph = normalize(&json!([{"name": "x", "params": {"a": 1}}]), "").unwrap();
        assert_eq!(graph.get("n0").unwrap().params.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_full_graph_unchanged() {
        let original = FlowGraph::chain(vec![
            NodeSpec::new("a").with_param("k", json!("v")),
            NodeSpec::new("b"),
        ]);
        let raw = serde_json::to_value(&original).unwrap();
        assert_eq!(normalize(&raw, "goal").unwrap(), original);
    }

    #[test]
    fn test_write_file_alias() {
        let graph = normalize(
            &json!({"name": "write_file", "params": {"file_name": "a.txt", "content": "x"}}),
            "",
        )
        .unwrap();
        let params = &graph.get("n0").unwrap().params;
        assert_eq!(params.get("filename"), Some(&json!("a.txt")));
        assert!(!params.contains_key("file_name"));
    }

    #[test]
    fn test_alias_does_not_clobber() {
        let graph = normalize(
            &json!({"name": "write_file", "params": {"file_name": "old", "filename": "keep"}}),
            "",
        )
        .unwrap();
        let params = &graph.get("n0").unwrap().params;
        assert_eq!(params.get("filename"), Some(&json!("keep")));
        assert_eq!(params.get("file_name"), Some(&json!("old")));
    }

    #[test]
    fn test_alias_scoped_to_capability() {
        let graph = normalize(&json!({"name": "other", "params": {"file_name": "a"}}), "").unwrap();
        assert!(graph.get("n0").unwrap().params.contains_key("file_name"));
    }

    #[test]
    fn test_configured_alias() {
        let mut config = HashMap::new();
        config.insert(
            "video_generator".to_string(),
            HashMap::from([("subject".to_string(), "topic".to_string())]),
        );
        let mut aliases = ParamAliases::builtin();
        aliases.extend_from_config(&config);
        let normalizer = FlowNormalizer::new(aliases);

        let graph = normalizer
            .normalize(&json!({"name": "video_generator", "params": {"subject": "owls"}}), "")
            .unwrap();
        assert_eq!(graph.get("n0").unwrap().params.get("topic"), Some(&json!("owls")));
    }

    #[test]
    fn test_rejected_shapes() {
        for raw in [
            json!(42),
            json!(null),
            json!({"foo": "bar"}),
            json!([]),
            json!([{"name": "a"}, {"name": "b"}]),
            json!(["reply"]),
            json!({"name": 7}),
            json!({"name": "x", "params": [1, 2]}),
            json!({"start": "n0", "nodes": "not a map"}),
        ] {
            let err = normalize(&raw, "").unwrap_err();
            assert!(matches!(err, CortexError::Normalization(_)), "{raw}");
        }
    }

    #[test]
    fn test_unrecognised_message_names_the_problem() {
        let err = normalize(&json!(42), "").unwrap_err();
        assert_eq!(err.message(), "unrecognised flow shape: 42");

        let long = json!("x".repeat(300));
        let err = normalize(&json!([long]), "").unwrap_err();
        assert!(err.message().starts_with("unrecognised flow shape: "));
        assert!(err.message().ends_with('…'));
    }
}
