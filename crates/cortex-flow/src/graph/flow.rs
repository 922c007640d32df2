use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use cortex_core::error::{CortexError, Result};
use cortex_core::types::Params;

use super::node::NodeSpec;

/// Node id used by every single-step graph built from a shorthand plan.
pub const SINGLE_NODE_ID: &str = "n0";

/// The task graph walked by the executor.
///
/// The data model allows any `next` pointer, but the executor only ever
/// follows one successor per node, so a valid graph is a finite chain from
/// `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    pub start: String,
    pub nodes: HashMap<String, NodeSpec>,
}

impl FlowGraph {
    /// A one-node graph with the fixed id `n0`.
    pub fn single(capability: impl Into<String>, params: Params) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            SINGLE_NODE_ID.to_string(),
            NodeSpec::new(capability).with_params(params),
        );
        Self {
            start: SINGLE_NODE_ID.to_string(),
            nodes,
        }
    }

    /// Chain the given nodes as `n0 -> n1 -> ...`, overwriting their `next`.
    ///
    /// An empty input yields a graph whose start id is dangling; it fails
    /// validation.
    pub fn chain(specs: impl IntoIterator<Item = NodeSpec>) -> Self {
        let specs: Vec<NodeSpec> = specs.into_iter().collect();
        let count = specs.len();
        let nodes = specs
            .into_iter()
            .enumerate()
            .map(|(i, mut spec)| {
                spec.next = (i + 1 < count).then(|| format!("n{}", i + 1));
                (format!("n{}", i), spec)
            })
            .collect();
        Self {
            start: SINGLE_NODE_ID.to_string(),
            nodes,
        }
    }

    pub fn get(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check that the chain from `start` only visits known ids and ends.
    ///
    /// Returns the node ids in walk order.
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(self.start.as_str());

        while let Some(id) = current {
            let node = self.nodes.get(id).ok_or_else(|| {
                CortexError::InvalidGraph(if order.is_empty() {
                    format!("start node '{}' not found", id)
                } else {
                    format!("node '{}' points to unknown node '{}'", order[order.len() - 1], id)
                })
            })?;
            if !seen.insert(id) {
                return Err(CortexError::InvalidGraph(format!(
                    "cycle detected at node '{}'",
                    id
                )));
            }
            order.push(id.to_string());
            current = node.next.as_deref();
        }

        Ok(order)
    }
}
