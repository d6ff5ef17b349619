//! Integration tests for the Control API: boot the real axum router on a
//! loopback port and drive it with `reqwest`, the same client this crate
//! uses for federation polling.

use overcode::api::routes::{build_router, ApiState};
use overcode::config::Config;
use overcode::federation::FederationPoller;
use overcode::monitor::MonitorLoop;
use overcode::registry::Registry;
use overcode::state_dir::StateDir;
use overcode::supervisor::SupervisorState;
use overcode_mux::InMemoryAdapter;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

struct TestServer {
    base: String,
    _tmp: tempfile::TempDir,
}

async fn spawn_server(api_key: &str) -> TestServer {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.api_key = api_key.to_string();
    config.state_dir = tmp.path().to_path_buf();

    let state_dir = StateDir::new(&config.state_dir, &config.multiplexer_group);
    state_dir.ensure().await.unwrap();

    let mux: Arc<dyn overcode_mux::MultiplexerAdapter> = Arc::new(InMemoryAdapter::new());
    let registry = Arc::new(Registry::new(mux.clone(), config.multiplexer_group.clone(), state_dir.clone()));

    let (bell_tx, _bell_rx) = async_channel::unbounded();
    let (tick_tx, _tick_rx) = async_channel::unbounded();
    let supervisor = Arc::new(SupervisorState::new(config.min_launch_interval_s));
    let monitor = Arc::new(MonitorLoop::new(registry.clone(), mux.clone(), config.clone(), state_dir.clone(), supervisor.clone(), bell_tx, tick_tx));
    let federation = Arc::new(FederationPoller::new(registry.clone(), &config));

    let api_state = ApiState {
        registry,
        mux,
        config,
        state_dir,
        federation,
        monitor,
        supervisor,
        supervisor_enabled: Arc::new(AtomicBool::new(true)),
    };
    let router = build_router(api_state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    TestServer { base: format!("http://{addr}"), _tmp: tmp }
}

#[tokio::test]
async fn status_is_reachable_without_auth() {
    let server = spawn_server("secret").await;
    let resp = reqwest::get(format!("{}/api/status", server.base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], serde_json::json!(true));
    assert_eq!(body["data"]["sessions"], serde_json::json!([]));
}

#[tokio::test]
async fn launch_without_api_key_is_rejected() {
    let server = spawn_server("secret").await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/agents/launch", server.base))
        .json(&serde_json::json!({ "name": "worker", "directory": "/tmp" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn launch_then_send_then_kill_round_trips() {
    let server = spawn_server("secret").await;
    let client = reqwest::Client::new();

    let launch_resp = client
        .post(format!("{}/api/agents/launch", server.base))
        .header("X-API-Key", "secret")
        .json(&serde_json::json!({ "name": "worker", "directory": "/tmp" }))
        .send()
        .await
        .unwrap();
    assert_eq!(launch_resp.status(), 200);
    let launch_body: serde_json::Value = launch_resp.json().await.unwrap();
    assert_eq!(launch_body["data"]["name"], serde_json::json!("worker"));

    let send_resp = client
        .post(format!("{}/api/agents/worker/send", server.base))
        .header("X-API-Key", "secret")
        .json(&serde_json::json!({ "text": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(send_resp.status(), 200);

    let kill_resp = client
        .post(format!("{}/api/agents/worker/kill", server.base))
        .header("X-API-Key", "secret")
        .json(&serde_json::json!({ "cascade": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(kill_resp.status(), 200);

    let status_resp = reqwest::get(format!("{}/api/status", server.base)).await.unwrap();
    let status_body: serde_json::Value = status_resp.json().await.unwrap();
    let sessions = status_body["data"]["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["status"], serde_json::json!("terminated"));
}

#[tokio::test]
async fn unknown_agent_name_is_not_found() {
    let server = spawn_server("secret").await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/agents/ghost/send", server.base))
        .header("X-API-Key", "secret")
        .json(&serde_json::json!({ "text": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], serde_json::json!(false));
}

#[tokio::test]
async fn cleanup_actually_removes_terminated_sessions() {
    let server = spawn_server("secret").await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/api/agents/launch", server.base))
        .header("X-API-Key", "secret")
        .json(&serde_json::json!({ "name": "worker", "directory": "/tmp" }))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{}/api/agents/worker/kill", server.base))
        .header("X-API-Key", "secret")
        .json(&serde_json::json!({ "cascade": false }))
        .send()
        .await
        .unwrap();

    let cleanup_resp = client
        .post(format!("{}/api/agents/cleanup", server.base))
        .header("X-API-Key", "secret")
        .json(&serde_json::json!({ "include_done": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(cleanup_resp.status(), 200);
    let cleanup_body: serde_json::Value = cleanup_resp.json().await.unwrap();
    assert_eq!(cleanup_body["data"]["removed"], serde_json::json!(1));

    let status_resp = reqwest::get(format!("{}/api/status", server.base)).await.unwrap();
    let status_body: serde_json::Value = status_resp.json().await.unwrap();
    assert_eq!(status_body["data"]["sessions"].as_array().unwrap().len(), 0);
}
