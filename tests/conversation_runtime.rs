use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{json, Value};

use cortex::capabilities::{CapabilityRegistry, JobCapability, JobRunner, JobStore};
use cortex::runtime::{ConversationRuntime, TurnOutcome};
use cortex::{AppConfig, ConversationId, NodeOutput, Params, SharedState, Topic};
use cortex_test_utils::FnCapability;

struct QuickRender;

impl JobRunner for QuickRender {
    fn run(&self, params: Params) -> BoxFuture<'static, anyhow::Result<Value>> {
        Box::pin(async move {
            let topic = params.get("topic").and_then(Value::as_str).unwrap_or("?");
            Ok(json!(format!("/videos/{}.mp4", topic)))
        })
    }
}

/// Plans a render for new requests and a status check once a job exists.
fn planner(state: &mut SharedState, _params: Params) -> cortex::Result<NodeOutput> {
    let plan = if state.goal().contains("status") {
        let id = state.get_str("job_id").unwrap_or_default().to_string();
        json!({"ok": true, "flow": {"name": "job_status", "params": {"task_id": id}}})
    } else {
        json!({"ok": true, "flow": {"name": "render", "params": {"topic": "owls"}}})
    };
    Ok(NodeOutput::new().with("plan", plan))
}

#[tokio::test]
async fn test_job_started_then_polled_across_turns() {
    let jobs = Arc::new(JobStore::new());
    let mut registry = CapabilityRegistry::with_builtins(jobs.clone());
    registry.register(JobCapability::new(
        "render",
        "Render a video in the background",
        Arc::new(QuickRender),
        jobs.clone(),
    ));
    registry.register(FnCapability::new("planner", planner));

    let rt = ConversationRuntime::from_config(Arc::new(registry), AppConfig::default())
        .with_jobs(jobs.clone());
    let cid = ConversationId::new();
    let sub = rt.subscribe(&cid);

    let first = rt.handle(&cid, "make a video about owls").await;
    assert!(matches!(first, TurnOutcome::Executed(ref o) if o.is_completed()));

    for _ in 0..100 {
        if jobs.find_by_prefix("").iter().all(|j| j.state.is_finished()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let second = rt.handle(&cid, "what's the status?").await;
    assert!(matches!(second, TurnOutcome::Executed(_)));

    let replies: Vec<String> = sub
        .drain()
        .into_iter()
        .filter(|e| e.topic == Topic::Assistant)
        .filter_map(|e| e.text().map(str::to_string))
        .collect();
    assert_eq!(replies.len(), 2);
    assert!(replies[0].starts_with("🚀 Started 'owls'"));
    assert!(replies[1].contains("/videos/owls.mp4"));

    let session = rt.sessions().get(&cid).unwrap();
    assert_eq!(session.log().len(), 4);
}

async fn count(rt: &ConversationRuntime, cid: &ConversationId) -> Option<Value> {
    let session = rt.sessions().get(cid).unwrap();
    let state = session.lock_state().await;
    state.get("count").cloned()
}

#[tokio::test]
async fn test_conversations_are_isolated() {
    let mut registry = CapabilityRegistry::new();
    registry.register(FnCapability::new("planner", |_s: &mut SharedState, _p: Params| {
        Ok(NodeOutput::new().with("ok", json!(true)).with("flow", json!("remember")))
    }));
    registry.register(FnCapability::new("remember", |s: &mut SharedState, _p: Params| {
        let count = s.get("count").and_then(Value::as_u64).unwrap_or(0) + 1;
        Ok(NodeOutput::new().with("count", json!(count)))
    }));

    let rt = ConversationRuntime::from_config(Arc::new(registry), AppConfig::default());
    let a = ConversationId::from_str("a");
    let b = ConversationId::from_str("b");

    rt.handle(&a, "one").await;
    rt.handle(&a, "two").await;
    rt.handle(&b, "one").await;

    assert_eq!(count(&rt, &a).await, Some(json!(2)));
    assert_eq!(count(&rt, &b).await, Some(json!(1)));
    assert_eq!(rt.sessions().len(), 2);
}
