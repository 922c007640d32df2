use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use cortex_core::error::Result;
use cortex_core::state::SharedState;
use cortex_core::traits::Capability;
use cortex_core::types::{NodeOutput, Params};

use crate::jobs::{JobRecord, JobState, JobStore};

/// Reports on a background job, looked up by id prefix.
pub struct JobStatusCapability {
    store: Arc<JobStore>,
}

impl JobStatusCapability {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store }
    }
}

impl Capability for JobStatusCapability {
    fn name(&self) -> &str {
        "job_status"
    }

    fn description(&self) -> &str {
        "Check the status of a background job by its id or id prefix."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task_id": {
                    "type": "string",
                    "description": "Job id, or the first few characters of it"
                }
            },
            "required": ["task_id"]
        })
    }

    fn invoke<'a>(
        &'a self,
        _state: &'a mut SharedState,
        params: Params,
    ) -> BoxFuture<'a, Result<NodeOutput>> {
        Box::pin(async move {
            let Some(prefix) = ["task_id", "job_id"]
                .iter()
                .find_map(|k| params.get(*k).and_then(Value::as_str))
                .filter(|p| !p.is_empty())
            else {
                return Ok(NodeOutput::reply("⚠️ No job ID provided."));
            };

            let matches = self.store.find_by_prefix(prefix);
            let output = match matches.as_slice() {
                [] => NodeOutput::reply(format!("⚠️ No job found with ID starting with '{}'", prefix)),
                [job] => status_output(job),
                many => {
                    let listing = many
                        .iter()
                        .map(|j| format!("- `{}...`: {} ({})", short_id(&j.id), j.label, j.state.label()))
                        .collect::<Vec<_>>()
                        .join("\n");
                    NodeOutput::reply(format!(
                        "Found multiple matching jobs:\n{}\n\nPlease specify which job ID you want to check.",
                        listing
                    ))
                }
            };
            Ok(output)
        })
    }
}

fn short_id(id: &str) -> &str {
    &id[..8.min(id.len())]
}

fn status_output(job: &JobRecord) -> NodeOutput {
    let out = match &job.state {
        JobState::Starting => NodeOutput::reply(format!("Job '{}' is initializing...", job.label)),
        JobState::Running => NodeOutput::reply(format!(
            "Job '{}' is still running. This may take several minutes.",
            job.label
        )),
        JobState::Completed { result } => {
            let shown = match result {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            NodeOutput::reply(format!(
                "✅ Job '{}' is done.\n\nResult: ```\n{}\n```",
                job.label, shown
            ))
            .with("result", result.clone())
        }
        JobState::Failed { error } => NodeOutput::reply(format!(
            "⚠️ Job '{}' failed\nError: {}",
            job.label, error
        )),
    };
    out.with("job_status", Value::String(job.state.label().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn ask(store: &Arc<JobStore>, id: &str) -> NodeOutput {
        let cap = JobStatusCapability::new(store.clone());
        let mut state = SharedState::new();
        let mut params = Params::new();
        params.insert("task_id".into(), json!(id));
        cap.invoke(&mut state, params).await.unwrap()
    }

    #[tokio::test]
    async fn test_reports_each_state() {
        let store = Arc::new(JobStore::new());
        let id = store.create("owls");

        let out = ask(&store, &id[..8]).await;
        assert_eq!(out.reply_text(), Some("Job 'owls' is initializing..."));

        store.mark_running(&id).unwrap();
        let out = ask(&store, &id).await;
        assert!(out.reply_text().unwrap().contains("still running"));

        store.complete(&id, json!("/tmp/owls.mp4")).unwrap();
        let out = ask(&store, &id).await;
        assert!(out.reply_text().unwrap().contains("/tmp/owls.mp4"));
        assert_eq!(out.get("job_status"), Some(&json!("completed")));
    }

    #[tokio::test]
    async fn test_failed_job() {
        let store = Arc::new(JobStore::new());
        let id = store.create("cats");
        store.fail(&id, "gpu on fire").unwrap();
        let out = ask(&store, &id).await;
        assert_eq!(out.reply_text(), Some("⚠️ Job 'cats' failed\nError: gpu on fire"));
    }

    #[tokio::test]
    async fn test_unknown_and_missing_id() {
        let store = Arc::new(JobStore::new());
        store.create("a");
        let out = ask(&store, "zzzz").await;
        assert_eq!(
            out.reply_text(),
            Some("⚠️ No job found with ID starting with 'zzzz'")
        );

        let out = ask(&store, "").await;
        assert_eq!(out.reply_text(), Some("⚠️ No job ID provided."));

        let cap = JobStatusCapability::new(store.clone());
        let mut state = SharedState::new();
        let out = cap.invoke(&mut state, Params::new()).await.unwrap();
        assert_eq!(out.reply_text(), Some("⚠️ No job ID provided."));
    }
}
