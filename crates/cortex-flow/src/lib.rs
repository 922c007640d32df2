//! Flow execution engine: plan normalization, graph walking and re-planning.
//!
//! A planner capability produces a `Plan` whose `flow` is either a complete
//! `FlowGraph` or a shorthand. `FlowNormalizer` expands shorthands into a
//! graph, and the `Executor` walks it node by node against the
//! conversation's `SharedState`, publishing lifecycle events as it goes.
//! When a node fails or asks for it, the executor calls the planner again
//! and walks the replacement graph, up to a fixed number of rounds.

pub mod executor;
pub mod graph;
pub mod normalize;
pub mod plan;
pub mod policy;

pub use executor::{Executor, RunOutcome, DEFAULT_MAX_REPLANS};
pub use graph::{FlowGraph, NodeSpec};
pub use normalize::{normalize, FlowNormalizer, FlowShape, ParamAliases};
pub use plan::Plan;
pub use policy::{BroadcastReply, ConversationReplies, RecordReply, ReplyPolicy};
