use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use cortex_core::config::AppConfig;
use cortex_core::error::{CortexError, Result};
use cortex_core::event::{Event, Publish};
use cortex_core::state::SharedState;
use cortex_core::traits::CapabilityFactory;
use cortex_core::types::Params;

use crate::graph::FlowGraph;
use crate::normalize::FlowNormalizer;
use crate::plan::Plan;
use crate::policy::{ConversationReplies, ReplyPolicy};

/// Re-plan rounds allowed after the first pass unless configured otherwise.
pub const DEFAULT_MAX_REPLANS: usize = 3;

/// How a call to `Executor::run` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A pass finished without asking for a re-plan; `task.done` was sent.
    Completed { passes: usize },
    /// The planner declined to produce a new flow.
    PlannerDeclined { passes: usize },
    /// The re-plan cap was reached.
    ReplanExhausted { passes: usize },
}

impl RunOutcome {
    /// Total passes walked, including ones that stopped on an error.
    pub fn passes(&self) -> usize {
        match self {
            Self::Completed { passes }
            | Self::PlannerDeclined { passes }
            | Self::ReplanExhausted { passes } => *passes,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Walks a flow graph against the conversation's shared state.
///
/// Nodes run strictly one after another. A failing node never aborts the
/// run: it is reported, flags the state for re-planning and ends the pass.
/// `run` then asks the planner for a replacement flow, up to the re-plan cap.
pub struct Executor<'s, R = ConversationReplies> {
    flow: FlowGraph,
    factory: Arc<dyn CapabilityFactory>,
    state: &'s mut SharedState,
    publisher: Arc<dyn Publish>,
    replies: R,
    normalizer: FlowNormalizer,
    max_replans: usize,
    /// Why the initial flow cannot be walked, if it could not be built.
    rejected: Option<CortexError>,
}

impl<'s> Executor<'s> {
    /// Create an executor with the default reply policy and limits.
    pub fn new(
        flow: FlowGraph,
        factory: Arc<dyn CapabilityFactory>,
        state: &'s mut SharedState,
        publisher: Arc<dyn Publish>,
    ) -> Self {
        Self {
            flow,
            factory,
            state,
            publisher,
            replies: ConversationReplies::default(),
            normalizer: FlowNormalizer::default(),
            max_replans: DEFAULT_MAX_REPLANS,
            rejected: None,
        }
    }

    /// Create an executor whose first plan could not be turned into a
    /// graph. The first pass reports `err` like any unusable flow and the
    /// run continues with re-planning.
    pub fn rejected(
        err: CortexError,
        factory: Arc<dyn CapabilityFactory>,
        state: &'s mut SharedState,
        publisher: Arc<dyn Publish>,
    ) -> Self {
        let mut executor = Self::new(FlowGraph::chain(Vec::new()), factory, state, publisher);
        executor.rejected = Some(err);
        executor
    }
}

impl<'s, R: ReplyPolicy> Executor<'s, R> {
    /// Swap the reply policy.
    pub fn with_reply_policy<P: ReplyPolicy>(self, replies: P) -> Executor<'s, P> {
        Executor {
            flow: self.flow,
            factory: self.factory,
            state: self.state,
            publisher: self.publisher,
            replies,
            normalizer: self.normalizer,
            max_replans: self.max_replans,
            rejected: self.rejected,
        }
    }

    /// Set the re-plan cap.
    pub fn with_max_replans(mut self, max_replans: usize) -> Self {
        self.max_replans = max_replans;
        self
    }

    /// Set the normalizer applied to re-planned flows.
    pub fn with_normalizer(mut self, normalizer: FlowNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Apply executor limits and parameter aliases from configuration.
    pub fn with_config(self, config: &AppConfig) -> Self {
        self.with_max_replans(config.executor.max_replans)
            .with_normalizer(FlowNormalizer::from_config(config))
    }

    /// The flow the next pass will walk.
    pub fn flow(&self) -> &FlowGraph {
        &self.flow
    }

    fn emit(&self, event: Event) {
        self.publisher.publish(event);
    }

    /// Walk the current flow once.
    ///
    /// Returns `true` when a re-plan was requested, either by a failing node
    /// or by a node output carrying `replan`/`needs_replan`. `task.done` is
    /// published only when it returns `false`.
    pub async fn run_once(&mut self) -> bool {
        self.state.clear_needs_replan();

        if let Err(e) = self.flow.validate() {
            return self.reject_flow(&e);
        }

        let mut current = Some(self.flow.start.clone());

        while let Some(node_id) = current {
            let Some(spec) = self.flow.get(&node_id).cloned() else {
                return self.reject_flow(&CortexError::InvalidGraph(format!(
                    "node '{}' not found",
                    node_id
                )));
            };

            self.emit(Event::node_start(&node_id, &spec.capability));
            info!(node_id = %node_id, capability = %spec.capability, "Running capability");

            let result = self
                .factory
                .invoke(&spec.capability, self.state, spec.params.clone())
                .await;

            let mut out = match result {
                Ok(out) => out,
                Err(e) => {
                    error!(
                        node_id = %node_id,
                        capability = %spec.capability,
                        error = %e,
                        "Capability failed"
                    );
                    let err = json!({
                        "error": e.kind(),
                        "message": e.message(),
                        "capability": spec.capability,
                    });
                    self.emit(Event::assistant(format!(
                        "⚠️ {} failed: {}",
                        spec.capability,
                        e.message()
                    )));
                    self.emit(Event::node_done(&node_id, err));
                    self.state.set_needs_replan();
                    break;
                }
            };

            if let Some(logs) = out.take_logs() {
                if !logs.is_empty() {
                    self.emit(Event::node_log(&node_id, &spec.capability, logs));
                }
            }

            self.state.merge(&out);

            if out.requests_replan() {
                debug!(node_id = %node_id, "Capability requested a re-plan");
                self.state.set_needs_replan();
            }

            if let Some(reply) = out.reply_text() {
                self.replies.deliver(self.state, reply, self.publisher.as_ref());
            }

            self.emit(Event::node_done(&node_id, out.to_value()));
            current = spec.next;
        }

        let needs_replan = self.state.needs_replan();
        if !needs_replan {
            debug!("All nodes processed, publishing task.done");
            self.emit(Event::task_done(self.state.snapshot()));
        }
        needs_replan
    }

    /// Report a flow that cannot be walked and request a re-plan.
    fn reject_flow(&mut self, err: &CortexError) -> bool {
        warn!(error = %err, "Rejecting flow");
        self.emit(Event::assistant(format!("⚠️ Unusable flow: {}", err.message())));
        self.state.set_needs_replan();
        true
    }

    /// Walk, re-plan and walk again until a pass needs no re-plan, the
    /// planner declines, or the re-plan cap is reached.
    ///
    /// Errors from invoking the planner itself are returned to the caller.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let mut passes = 0;
        let mut replans = 0;
        let mut unusable = self.rejected.take();

        loop {
            passes += 1;
            let needs_replan = match unusable.take() {
                Some(err) => self.reject_flow(&err),
                None => self.run_once().await,
            };

            if !needs_replan {
                return Ok(RunOutcome::Completed { passes });
            }

            if replans >= self.max_replans {
                warn!(passes, "Re-plan cap reached");
                self.emit(Event::assistant(format!(
                    "⚠️ Replanning aborted after {} attempts.",
                    self.max_replans
                )));
                return Ok(RunOutcome::ReplanExhausted { passes });
            }

            replans += 1;
            let plan = self.replan().await?;
            info!(round = replans, ok = plan.ok, "Planner returned");

            let flow = match (plan.is_actionable(), plan.flow.as_ref()) {
                (true, Some(flow)) => flow,
                _ => {
                    self.emit(Event::assistant(plan.user_message()));
                    return Ok(RunOutcome::PlannerDeclined { passes });
                }
            };

            let goal = self.state.goal().to_string();
            match self.normalizer.normalize(flow, &goal) {
                Ok(graph) => self.flow = graph,
                Err(e) => unusable = Some(e),
            }
        }
    }

    /// Ask the planner capability for a new plan.
    async fn replan(&mut self) -> Result<Plan> {
        let planner = self.state.planner_name().to_string();
        let cid = self.state.conversation_id();

        let mut params = Params::new();
        params.insert("goal".into(), Value::String(self.state.goal().to_string()));
        params.insert("catalogue".into(), self.factory.catalogue(cid.as_ref()));

        info!(planner = %planner, "Re-planning");
        let output = self.factory.invoke(&planner, self.state, params).await?;
        Ok(Plan::from_output(&output))
    }
}
