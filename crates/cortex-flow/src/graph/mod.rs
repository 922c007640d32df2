//! Flow graph data model.
//!
//! A flow is a start id plus a map of `NodeSpec`s, each naming a capability,
//! its parameters and the id of the next node. Planners may return a graph
//! directly or a shorthand that `normalize` expands into one.

pub mod flow;
pub mod node;

pub use flow::{FlowGraph, SINGLE_NODE_ID};
pub use node::NodeSpec;
