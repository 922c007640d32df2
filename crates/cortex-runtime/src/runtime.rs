use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cortex_capabilities::JobStore;
use cortex_core::config::AppConfig;
use cortex_core::error::Result;
use cortex_core::event::{Event, Publish};
use cortex_core::hub::{EventHub, Subscription};
use cortex_core::state::{keys, SharedState};
use cortex_core::traits::{CapabilityFactory, ConversationLog};
use cortex_core::types::{ConversationId, Params};
use cortex_flow::{ConversationReplies, Executor, FlowNormalizer, Plan, ReplyPolicy, RunOutcome};

use crate::session::SessionRegistry;

/// Sender name recorded for inbound messages in the conversation log.
pub const USER_SENDER: &str = "user";

/// How one inbound message was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// A flow was planned and executed.
    Executed(RunOutcome),
    /// The planner asked the user for more input instead of planning.
    NeedsInput,
    /// Planning or execution failed; the user was told.
    Failed(String),
}

/// Entry point for user messages.
///
/// Each message is planned, normalized and executed against its
/// conversation's session. Runs for one conversation never overlap. Errors
/// that escape planning or execution are reported to the conversation as an
/// `assistant` event and never returned to the caller.
pub struct ConversationRuntime {
    factory: Arc<dyn CapabilityFactory>,
    sessions: Arc<SessionRegistry>,
    hub: Arc<EventHub>,
    config: AppConfig,
    normalizer: FlowNormalizer,
    jobs: Option<Arc<JobStore>>,
}

impl ConversationRuntime {
    pub fn new(
        factory: Arc<dyn CapabilityFactory>,
        sessions: Arc<SessionRegistry>,
        hub: Arc<EventHub>,
        config: AppConfig,
    ) -> Self {
        let normalizer = FlowNormalizer::from_config(&config);
        Self {
            factory,
            sessions,
            hub,
            config,
            normalizer,
            jobs: None,
        }
    }

    /// Attach the job store whose finished records the reapers prune.
    pub fn with_jobs(mut self, jobs: Arc<JobStore>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Build the hub and session registry from configuration.
    pub fn from_config(factory: Arc<dyn CapabilityFactory>, config: AppConfig) -> Self {
        let hub = Arc::new(EventHub::new());
        let sessions = Arc::new(SessionRegistry::new(hub.clone(), &config.session));
        Self::new(factory, sessions, hub, config)
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Attach a relay to a conversation's event stream.
    pub fn subscribe(&self, cid: &ConversationId) -> Subscription {
        self.hub.subscribe(cid)
    }

    /// Start the idle-session reaper and, when a job store is attached, the
    /// finished-job reaper. All stop when `cancel` fires.
    pub fn spawn_reapers(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let interval = Duration::from_secs(self.config.session.reaper_interval_secs.max(1));
        let mut handles = vec![self.sessions.spawn_reaper(interval, cancel.clone())];
        if let Some(jobs) = &self.jobs {
            handles.push(jobs.spawn_reaper(&self.config.jobs, cancel));
        }
        handles
    }

    /// Handle one user message for `cid`.
    pub async fn handle(&self, cid: &ConversationId, text: &str) -> TurnOutcome {
        let publisher: Arc<dyn Publish> = Arc::new(self.hub.publisher(cid));
        let session = self.sessions.get_or_create(cid);
        let mut state = session.lock_state().await;
        session.touch();
        publisher.publish(Event::user(text));

        if let Err(e) = session.log().append(USER_SENDER, text) {
            warn!(conversation = %cid, error = %e, "Failed to record user message");
        }

        info!(conversation = %cid, "Processing message");
        let outcome = match self.run_turn(&mut state, text, publisher.clone()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(conversation = %cid, error = %e, "Error processing message");
                let message = e.message();
                ConversationReplies::default().deliver(
                    &state,
                    &format!("Error processing your request: {}", message),
                    publisher.as_ref(),
                );
                TurnOutcome::Failed(message)
            }
        };

        session.touch();
        outcome
    }

    async fn run_turn(
        &self,
        state: &mut SharedState,
        text: &str,
        publisher: Arc<dyn Publish>,
    ) -> Result<TurnOutcome> {
        state.set_goal(text);
        if !state.contains_key(keys::PLANNER) {
            state.set(
                keys::PLANNER,
                Value::String(self.config.executor.planner.clone()),
            );
        }

        let plan = self.plan(state).await?;
        let flow = match (plan.is_actionable(), plan.flow.as_ref()) {
            (true, Some(flow)) => flow,
            _ => {
                ConversationReplies::default().deliver(
                    state,
                    plan.user_message(),
                    publisher.as_ref(),
                );
                return Ok(TurnOutcome::NeedsInput);
            }
        };

        let factory = self.factory.clone();
        let mut executor = match self.normalizer.normalize(flow, text) {
            Ok(graph) => Executor::new(graph, factory, state, publisher),
            Err(e) => Executor::rejected(e, factory, state, publisher),
        }
        .with_config(&self.config);
        let outcome = executor.run().await?;
        info!(passes = outcome.passes(), completed = outcome.is_completed(), "Run finished");
        Ok(TurnOutcome::Executed(outcome))
    }

    /// Ask the conversation's planner for the first plan of a turn.
    async fn plan(&self, state: &mut SharedState) -> Result<Plan> {
        let planner = state.planner_name().to_string();
        let cid = state.conversation_id();

        let mut params = Params::new();
        params.insert("goal".into(), Value::String(state.goal().to_string()));
        params.insert("catalogue".into(), self.factory.catalogue(cid.as_ref()));

        let output = self.factory.invoke(&planner, state, params).await?;
        Ok(Plan::from_output(&output))
    }
}
