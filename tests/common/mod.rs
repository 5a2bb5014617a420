#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use autoglm_client::{ClientConfig, ClientState, ExecutionClient};
use serde_json::{json, Value};
use wiremock::{MockServer, Request, Respond, ResponseTemplate};

/// Timeout for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Responds with each template in turn, then repeats the last one.
pub struct Sequence {
    responses: Vec<ResponseTemplate>,
    calls: AtomicUsize,
}

impl Sequence {
    pub fn new(responses: Vec<ResponseTemplate>) -> Self {
        assert!(!responses.is_empty(), "sequence needs at least one response");
        Self {
            responses,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn json(bodies: Vec<Value>) -> Self {
        Self::new(
            bodies
                .into_iter()
                .map(|body| ResponseTemplate::new(200).set_body_json(body))
                .collect(),
        )
    }
}

impl Respond for Sequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let index = call.min(self.responses.len() - 1);
        self.responses[index].clone()
    }
}

/// `count` progress entries, numbered from 1.
pub fn progress(count: usize) -> Vec<Value> {
    (1..=count)
        .map(|step| {
            json!({
                "step": step,
                "thinking": format!("thinking {}", step),
                "action": format!("{{\"action\": \"Tap\", \"element\": [{}, 500]}}", step * 100),
            })
        })
        .collect()
}

/// A `/status` body for a running task.
pub fn running(task: &str, count: usize) -> Value {
    json!({
        "running": true,
        "task": task,
        "step": count,
        "message": null,
        "error": null,
        "thinking": null,
        "action": null,
        "progress": progress(count),
    })
}

/// A `/status` body for a task that has ended.
pub fn finished(task: &str, count: usize, message: Option<&str>, error: Option<&str>) -> Value {
    json!({
        "running": false,
        "task": task,
        "step": count,
        "message": message,
        "error": error,
        "thinking": null,
        "action": null,
        "progress": progress(count),
    })
}

pub fn health_ok() -> Value {
    json!({
        "status": "ok",
        "agent_initialized": true,
        "devices": [
            {"id": "192.168.1.100:5555", "status": "device", "type": "remote", "model": "Pixel 7"}
        ],
    })
}

pub fn accepted(task: &str) -> Value {
    json!({
        "status": "started",
        "task": task,
        "message": "Task started. Use /status to check progress.",
    })
}

/// Fast intervals so tests finish quickly.
pub fn test_config(server: &MockServer) -> ClientConfig {
    ClientConfig::default()
        .with_base_url(server.uri())
        .with_request_timeout(Duration::from_millis(500))
        .with_submit_timeout(Duration::from_secs(2))
        .with_poll_interval(Duration::from_millis(20))
        .with_progress_interval(Duration::from_millis(10))
}

pub fn start_client(server: &MockServer) -> ExecutionClient {
    ExecutionClient::start(test_config(server)).expect("client should start")
}

/// Wait until the client state satisfies `predicate`.
pub async fn wait_for_state(
    client: &ExecutionClient,
    predicate: impl FnMut(&ClientState) -> bool,
) -> ClientState {
    let mut state = client.subscribe();
    let result = tokio::time::timeout(WAIT, state.wait_for(predicate))
        .await
        .expect("timed out waiting for client state")
        .expect("client stopped while waiting for state");
    result.clone()
}

/// Number of requests the server received on `path`.
pub async fn requests_to(server: &MockServer, path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == path)
        .count()
}

/// Wait until the server has received at least `count` requests on `path`.
pub async fn wait_for_requests(server: &MockServer, path: &str, count: usize) {
    tokio::time::timeout(WAIT, async {
        while requests_to(server, path).await < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for requests");
}
