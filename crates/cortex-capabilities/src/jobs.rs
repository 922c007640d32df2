//! Background jobs for capabilities whose work outlives a single walk.
//!
//! A starting capability registers a job, spawns the work and returns the
//! job id at once. The `job_status` capability polls the store later.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use cortex_core::config::JobsConfig;
use cortex_core::error::{CortexError, Result};
use cortex_core::state::SharedState;
use cortex_core::traits::Capability;
use cortex_core::types::{NodeOutput, Params};

/// Lifecycle of a background job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    Starting,
    Running,
    Completed { result: Value },
    Failed { error: String },
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: String,
    /// What the job is about, for status replies.
    pub label: String,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lock-guarded job table shared between starters, workers and pollers.
#[derive(Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<String, JobRecord>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<String, JobRecord>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a job in `Starting` and return its id.
    pub fn create(&self, label: impl Into<String>) -> String {
        let id = Uuid::new_v4().simple().to_string();
        let now = Utc::now();
        self.jobs().insert(
            id.clone(),
            JobRecord {
                id: id.clone(),
                label: label.into(),
                state: JobState::Starting,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    fn transition(&self, id: &str, next: JobState) -> Result<()> {
        let mut jobs = self.jobs();
        let record = jobs
            .get_mut(id)
            .ok_or_else(|| CortexError::Job(format!("unknown job '{}'", id)))?;

        let allowed = match (&record.state, &next) {
            (JobState::Starting, JobState::Running) => true,
            (JobState::Starting | JobState::Running, JobState::Completed { .. })
            | (JobState::Starting | JobState::Running, JobState::Failed { .. }) => true,
            _ => false,
        };
        if !allowed {
            return Err(CortexError::Job(format!(
                "job '{}' cannot move from {} to {}",
                id,
                record.state.label(),
                next.label()
            )));
        }

        record.state = next;
        record.updated_at = Utc::now();
        Ok(())
    }

    pub fn mark_running(&self, id: &str) -> Result<()> {
        self.transition(id, JobState::Running)
    }

    pub fn complete(&self, id: &str, result: Value) -> Result<()> {
        self.transition(id, JobState::Completed { result })
    }

    pub fn fail(&self, id: &str, error: impl Into<String>) -> Result<()> {
        self.transition(id, JobState::Failed { error: error.into() })
    }

    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.jobs().get(id).cloned()
    }

    /// Jobs whose id starts with `prefix`, oldest first.
    pub fn find_by_prefix(&self, prefix: &str) -> Vec<JobRecord> {
        let mut found: Vec<JobRecord> = self
            .jobs()
            .values()
            .filter(|r| r.id.starts_with(prefix))
            .cloned()
            .collect();
        found.sort_by_key(|r| r.created_at);
        found
    }

    /// Drop finished jobs last updated before `cutoff`. Returns how many.
    pub fn prune_finished(&self, cutoff: DateTime<Utc>) -> usize {
        let mut jobs = self.jobs();
        let before = jobs.len();
        jobs.retain(|_, r| !(r.state.is_finished() && r.updated_at < cutoff));
        before - jobs.len()
    }

    /// Run `prune_finished` with the configured retention until `cancel`
    /// fires.
    pub fn spawn_reaper(
        self: &Arc<Self>,
        config: &JobsConfig,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let interval = Duration::from_secs(config.reaper_interval_secs.max(1));
        let retention = chrono::Duration::from_std(Duration::from_secs(config.retention_secs))
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        Arc::clone(self).spawn_reaper_every(interval, retention, cancel)
    }

    fn spawn_reaper_every(
        self: Arc<Self>,
        interval: Duration,
        retention: chrono::Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = interval.as_secs(),
                retention_secs = retention.num_seconds(),
                "Job reaper started"
            );
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = cancel.cancelled() => {
                        info!("Job reaper shutting down");
                        break;
                    }
                }
                let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
                    continue;
                };
                let pruned = self.prune_finished(cutoff);
                if pruned > 0 {
                    info!(pruned, remaining = self.len(), "Pruned finished jobs");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The long-running work behind a `JobCapability`.
pub trait JobRunner: Send + Sync + 'static {
    /// Do the work. Runs on its own task, outside any flow walk.
    fn run(&self, params: Params) -> BoxFuture<'static, anyhow::Result<Value>>;
}

/// Starts a `JobRunner` in the background and returns the job id at once.
pub struct JobCapability {
    name: String,
    description: String,
    /// Parameter whose value labels the job in status replies.
    label_param: String,
    runner: Arc<dyn JobRunner>,
    store: Arc<JobStore>,
}

impl JobCapability {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        runner: Arc<dyn JobRunner>,
        store: Arc<JobStore>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            label_param: "topic".into(),
            runner,
            store,
        }
    }

    pub fn with_label_param(mut self, param: impl Into<String>) -> Self {
        self.label_param = param.into();
        self
    }
}

impl Capability for JobCapability {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                self.label_param.as_str(): {
                    "type": "string",
                    "description": "What the job is about"
                }
            },
            "required": [self.label_param.as_str()]
        })
    }

    fn invoke<'a>(
        &'a self,
        _state: &'a mut SharedState,
        params: Params,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            let Some(label) = params.get(&self.label_param).and_then(Value::as_str) else {
                return Ok(NodeOutput::reply(format!(
                    "⚠️ No {} provided.",
                    self.label_param
                )));
            };
            let label = label.to_string();

            let id = self.store.create(label.clone());
            let store = self.store.clone();
            let runner = self.runner.clone();
            let job_id = id.clone();
            let capability = self.name.clone();

            tokio::spawn(async move {
                if let Err(e) = store.mark_running(&job_id) {
                    error!(job_id = %job_id, error = %e, "Job vanished before start");
                    return;
                }
                let outcome = match runner.run(params).await {
                    Ok(result) => store.complete(&job_id, result),
                    Err(e) => store.fail(&job_id, format!("{:#}", e)),
                };
                match outcome {
                    Ok(()) => info!(job_id = %job_id, capability = %capability, "Job finished"),
                    Err(e) => error!(job_id = %job_id, error = %e, "Job state update failed"),
                }
            });

            info!(job_id = %id, capability = %self.name, "Job started");
            let short = &id[..8.min(id.len())];
            Ok(NodeOutput::reply(format!(
                "🚀 Started '{}' in the background.\n\nJob ID: `{}`\n\nAsk for the status of job {} to check on it.",
                label, id, short
            ))
            .with("job_id", Value::String(id.clone())))
        })
    }
}
