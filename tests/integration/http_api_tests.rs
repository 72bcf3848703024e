//! HTTP API over a live listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use swe_agent::api;
use swe_agent::models::session::SessionStatus;
use swe_agent::models::state::WorkflowStatus;
use swe_agent::orchestrator::SessionService;
use swe_agent::persistence::queue::{SqliteTaskQueue, TaskQueue};
use swe_agent::persistence::state_store::{SqliteStateStore, StateStore};

use super::test_helpers::memory_store;

struct Server {
    base: String,
    store: Arc<SqliteStateStore>,
    queue: Arc<SqliteTaskQueue>,
    ct: CancellationToken,
    http: reqwest::Client,
}

impl Drop for Server {
    fn drop(&mut self) {
        self.ct.cancel();
    }
}

async fn server() -> Server {
    let (db, store) = memory_store().await;
    let queue = Arc::new(SqliteTaskQueue::new(db));
    let service = Arc::new(SessionService::new(store.clone(), queue.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr: SocketAddr = listener.local_addr().expect("addr");
    let ct = CancellationToken::new();
    tokio::spawn(api::serve(listener, service, ct.clone()));

    Server {
        base: format!("http://{addr}"),
        store,
        queue,
        ct,
        http: reqwest::Client::new(),
    }
}

impl Server {
    async fn create(&self, body: Value) -> reqwest::Response {
        self.http
            .post(format!("{}/sessions", self.base))
            .json(&body)
            .send()
            .await
            .expect("send")
    }

    async fn create_id(&self) -> String {
        let response = self.create(json!({ "goal": "Add a README" })).await;
        assert_eq!(response.status(), 201);
        let body: Value = response.json().await.expect("json");
        body["session_id"].as_str().expect("id").to_owned()
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let server = server().await;
    let response = server
        .http
        .get(format!("{}/health", server.base))
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.expect("text"), "ok");
}

#[tokio::test]
async fn created_session_is_queued() {
    let server = server().await;
    let id = server.create_id().await;

    let response = server
        .http
        .get(format!("{}/sessions/{id}", server.base))
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["id"], id.as_str());
    assert_eq!(body["status"], "QUEUED");
    assert_eq!(body["logs"], json!(["Session queued."]));
    assert!(body["result"].is_null());

    let message = server
        .queue
        .dequeue(Duration::from_millis(50))
        .await
        .expect("dequeue")
        .expect("message");
    assert_eq!(message.session_id, id);
}

#[tokio::test]
async fn review_mode_and_base_branch_are_accepted() {
    let server = server().await;
    let response = server
        .create(json!({
            "goal": "Fix login",
            "repo_url": "https://github.com/acme/widgets.git",
            "base_branch": "develop",
            "mode": "review",
        }))
        .await;
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("json");
    let id = body["session_id"].as_str().expect("id");

    let state = server.store.get_state(id).await.expect("get").expect("state");
    assert_eq!(state.base_branch, "develop");
    assert_eq!(state.mode.as_str(), "review");
}

#[tokio::test]
async fn empty_goal_is_a_bad_request() {
    let server = server().await;
    let response = server.create(json!({ "goal": "" })).await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.expect("json");
    assert!(body["error"].as_str().expect("error").contains("goal"));
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let server = server().await;
    for request in [
        server.http.get(format!("{}/sessions/missing", server.base)),
        server.http.post(format!("{}/sessions/missing/approve", server.base)),
        server
            .http
            .post(format!("{}/sessions/missing/input", server.base))
            .json(&json!({ "message": "hi" })),
    ] {
        let response = request.send().await.expect("send");
        assert_eq!(response.status(), 404);
    }
}

#[tokio::test]
async fn approving_a_running_session_is_rejected() {
    let server = server().await;
    let id = server.create_id().await;

    let response = server
        .http
        .post(format!("{}/sessions/{id}/approve", server.base))
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn approving_a_paused_session_resumes_it() {
    let server = server().await;
    let id = server.create_id().await;
    let mut state = server.store.get_state(&id).await.expect("get").expect("state");
    state.status = WorkflowStatus::WaitingForUser;
    state.next_status = Some(WorkflowStatus::BranchNaming);
    server.store.save_state(&state).await.expect("save");
    server
        .store
        .set_status(&id, SessionStatus::WaitingForUser)
        .await
        .expect("status");

    let response = server
        .http
        .post(format!("{}/sessions/{id}/approve", server.base))
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["status"], "resumed");
    assert_eq!(
        server.store.get_status(&id).await.expect("status"),
        Some(SessionStatus::Queued)
    );
}

#[tokio::test]
async fn input_is_acknowledged() {
    let server = server().await;
    let id = server.create_id().await;

    let response = server
        .http
        .post(format!("{}/sessions/{id}/input", server.base))
        .json(&json!({ "message": "also add a license" }))
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["status"], "input_added");
    assert_eq!(
        server.store.get_pending_inputs(&id).await.expect("pending"),
        vec!["also add a license".to_owned()]
    );
}
