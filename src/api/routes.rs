//! Axum handlers for the §6.2 Control API surface. All mutating routes
//! require a matching `X-API-Key` header; `/api/status` and
//! `/api/timeline/raw` are read-only and unauthenticated for local
//! peers.

use crate::error::{ApiError, OvercodeError};
use crate::federation::FederationPoller;
use crate::history::read_tail;
use crate::monitor::MonitorLoop;
use crate::registry::{CreateOptions, Heartbeat, Permissiveness, Registry};
use crate::state_dir::StateDir;
use crate::supervisor::SupervisorState;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use axum::Router;
use overcode_mux::MultiplexerAdapter;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<Registry>,
    pub mux: Arc<dyn MultiplexerAdapter>,
    pub config: crate::config::Config,
    pub state_dir: StateDir,
    pub federation: Arc<FederationPoller>,
    pub monitor: Arc<MonitorLoop>,
    pub supervisor: Arc<SupervisorState>,
    pub supervisor_enabled: Arc<AtomicBool>,
}

fn envelope_ok(data: Value) -> Response {
    (StatusCode::OK, Json(json!({ "ok": true, "data": data }))).into_response()
}

fn envelope_err(err: &OvercodeError) -> Response {
    let status = if err.is_caller_fault() { StatusCode::BAD_REQUEST } else { StatusCode::INTERNAL_SERVER_ERROR };
    (status, Json(ApiError::from(err))).into_response()
}

fn authorized(headers: &HeaderMap, expected: &str) -> bool {
    if expected.is_empty() {
        return true;
    }
    headers
        .iter()
        .find(|(name, _)| name.as_str().eq_ignore_ascii_case("x-api-key"))
        .map(|(_, value)| value.to_str().unwrap_or("") == expected)
        .unwrap_or(false)
}

fn require_auth(headers: &HeaderMap, state: &ApiState) -> Result<(), Response> {
    if authorized(headers, &state.config.api_key) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "ok": false, "error": "unauthorized", "message": "missing or invalid X-API-Key" })),
        )
            .into_response())
    }
}

fn resolve_id(state: &ApiState, name: &str) -> Result<String, Response> {
    state
        .registry
        .find_by_name(name)
        .map(|s| s.id)
        .ok_or_else(|| envelope_err(&OvercodeError::NotFound(name.to_string())))
}

#[derive(Deserialize)]
struct LaunchBody {
    directory: String,
    name: String,
    prompt: Option<String>,
    #[serde(default)]
    permissions: Option<String>,
}

async fn launch(State(state): State<ApiState>, headers: HeaderMap, Json(body): Json<LaunchBody>) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    let permissiveness = match body.permissions.as_deref() {
        Some("permissive") => Permissiveness::Permissive,
        Some("bypass") => Permissiveness::Bypass,
        _ => Permissiveness::Normal,
    };
    let options = CreateOptions { permissiveness, ..Default::default() };
    let directory = std::path::PathBuf::from(&body.directory);
    match state.registry.create(&body.name, state.config.agent_command.clone(), &directory, options).await {
        Ok(session) => {
            if let Some(prompt) = body.prompt {
                let _ = state.mux.send_text(&state.config.multiplexer_group, &session.multiplexer_window, &prompt, true).await;
            }
            envelope_ok(json!(session))
        }
        Err(e) => envelope_err(&e),
    }
}

#[derive(Deserialize)]
struct SendBody {
    text: String,
    #[serde(default)]
    enter: bool,
}

async fn send(State(state): State<ApiState>, headers: HeaderMap, AxumPath(name): AxumPath<String>, Json(body): Json<SendBody>) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    let session = match state.registry.find_by_name(&name) {
        Some(s) => s,
        None => return envelope_err(&OvercodeError::NotFound(name)),
    };
    match state.mux.send_text(&state.config.multiplexer_group, &session.multiplexer_window, &body.text, body.enter).await {
        Ok(()) => envelope_ok(json!({})),
        Err(e) => envelope_err(&OvercodeError::TransientIo(e.to_string())),
    }
}

#[derive(Deserialize)]
struct KeysBody {
    key: String,
}

async fn keys(State(state): State<ApiState>, headers: HeaderMap, AxumPath(name): AxumPath<String>, Json(body): Json<KeysBody>) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    let session = match state.registry.find_by_name(&name) {
        Some(s) => s,
        None => return envelope_err(&OvercodeError::NotFound(name)),
    };
    match state.mux.send_key(&state.config.multiplexer_group, &session.multiplexer_window, &body.key).await {
        Ok(()) => envelope_ok(json!({})),
        Err(e) => envelope_err(&OvercodeError::TransientIo(e.to_string())),
    }
}

#[derive(Deserialize, Default)]
struct KillBody {
    #[serde(default)]
    cascade: bool,
}

async fn kill(State(state): State<ApiState>, headers: HeaderMap, AxumPath(name): AxumPath<String>, Json(body): Json<KillBody>) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    let id = match resolve_id(&state, &name) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.registry.terminate(&id, body.cascade).await {
        Ok(()) => envelope_ok(json!({})),
        Err(e) => envelope_err(&e),
    }
}

async fn restart(State(state): State<ApiState>, headers: HeaderMap, AxumPath(name): AxumPath<String>) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    let session = match state.registry.find_by_name(&name) {
        Some(s) => s,
        None => return envelope_err(&OvercodeError::NotFound(name)),
    };
    if let Err(e) = state.registry.terminate(&session.id, true).await {
        return envelope_err(&e);
    }
    match state
        .registry
        .create(&session.name, session.command.clone(), &session.working_directory, CreateOptions::default())
        .await
    {
        Ok(s) => envelope_ok(json!(s)),
        Err(e) => envelope_err(&e),
    }
}

#[derive(Deserialize)]
struct StandingOrdersBody {
    text: Option<String>,
    preset: Option<String>,
}

async fn set_standing_orders(State(state): State<ApiState>, headers: HeaderMap, AxumPath(name): AxumPath<String>, Json(body): Json<StandingOrdersBody>) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    let id = match resolve_id(&state, &name) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let input = body.preset.or(body.text);
    let resolved = input.map(|t| crate::presets::resolve(&t).0);
    match state.registry.set_standing_orders(&id, resolved) {
        Ok(()) => envelope_ok(json!({})),
        Err(e) => envelope_err(&e),
    }
}

async fn clear_standing_orders(State(state): State<ApiState>, headers: HeaderMap, AxumPath(name): AxumPath<String>) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    let id = match resolve_id(&state, &name) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.registry.set_standing_orders(&id, None) {
        Ok(()) => envelope_ok(json!({})),
        Err(e) => envelope_err(&e),
    }
}

#[derive(Deserialize)]
struct BudgetBody {
    usd: f64,
}

async fn set_budget(State(state): State<ApiState>, headers: HeaderMap, AxumPath(name): AxumPath<String>, Json(body): Json<BudgetBody>) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    let id = match resolve_id(&state, &name) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.registry.set_budget(&id, Some(body.usd)) {
        Ok(()) => envelope_ok(json!({})),
        Err(e) => envelope_err(&e),
    }
}

#[derive(Deserialize)]
struct ValueBody {
    value: i64,
}

async fn set_value(State(state): State<ApiState>, headers: HeaderMap, AxumPath(name): AxumPath<String>, Json(body): Json<ValueBody>) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    let id = match resolve_id(&state, &name) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.registry.set_value(&id, body.value) {
        Ok(()) => envelope_ok(json!({})),
        Err(e) => envelope_err(&e),
    }
}

#[derive(Deserialize)]
struct AnnotationBody {
    text: String,
}

async fn annotate(State(state): State<ApiState>, headers: HeaderMap, AxumPath(name): AxumPath<String>, Json(body): Json<AnnotationBody>) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    let id = match resolve_id(&state, &name) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.registry.annotate(&id, body.text) {
        Ok(()) => envelope_ok(json!({})),
        Err(e) => envelope_err(&e),
    }
}

#[derive(Deserialize)]
struct SleepBody {
    asleep: bool,
}

async fn sleep(State(state): State<ApiState>, headers: HeaderMap, AxumPath(name): AxumPath<String>, Json(body): Json<SleepBody>) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    let id = match resolve_id(&state, &name) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.registry.set_sleep(&id, body.asleep) {
        Ok(()) => envelope_ok(json!({})),
        Err(e) => envelope_err(&e),
    }
}

#[derive(Deserialize, Default)]
struct CleanupBody {
    #[serde(default)]
    include_done: bool,
}

async fn cleanup(State(state): State<ApiState>, headers: HeaderMap, Json(body): Json<CleanupBody>) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    let removed = state.registry.purge(body.include_done).await;
    envelope_ok(json!({ "removed": removed }))
}

async fn status(State(state): State<ApiState>) -> Response {
    let sessions = state.registry.snapshot();
    envelope_ok(json!({ "sessions": sessions }))
}

#[derive(Deserialize)]
struct TimelineQuery {
    #[serde(default = "default_hours")]
    hours: f64,
}

fn default_hours() -> f64 {
    24.0
}

async fn timeline_raw(State(state): State<ApiState>, Query(q): Query<TimelineQuery>) -> Response {
    match read_tail(&state.state_dir, q.hours).await {
        Ok(rows) => envelope_ok(json!(rows
            .into_iter()
            .map(|r| json!({ "timestamp": r.timestamp, "agent": r.agent, "status": r.status, "activity": r.activity }))
            .collect::<Vec<_>>())),
        Err(e) => envelope_err(&OvercodeError::TransientIo(e.to_string())),
    }
}

#[derive(Deserialize)]
struct HeartbeatBody {
    enabled: bool,
    frequency: Option<u64>,
    instruction: Option<String>,
}

async fn set_heartbeat(State(state): State<ApiState>, headers: HeaderMap, AxumPath(name): AxumPath<String>, Json(body): Json<HeartbeatBody>) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    let id = match resolve_id(&state, &name) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let heartbeat = body.enabled.then(|| Heartbeat {
        interval_s: body.frequency.unwrap_or(1800),
        last_fired: None,
        paused: false,
        instruction: body.instruction,
    });
    match state.registry.set_heartbeat(&id, heartbeat) {
        Ok(()) => envelope_ok(json!({})),
        Err(e) => envelope_err(&e),
    }
}

async fn heartbeat_pause(State(state): State<ApiState>, headers: HeaderMap, AxumPath(name): AxumPath<String>) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    let id = match resolve_id(&state, &name) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.registry.set_heartbeat_paused(&id, true) {
        Ok(()) => envelope_ok(json!({})),
        Err(e) => envelope_err(&e),
    }
}

async fn heartbeat_resume(State(state): State<ApiState>, headers: HeaderMap, AxumPath(name): AxumPath<String>) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    let id = match resolve_id(&state, &name) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.registry.set_heartbeat_paused(&id, false) {
        Ok(()) => envelope_ok(json!({})),
        Err(e) => envelope_err(&e),
    }
}

#[derive(Deserialize)]
struct EnabledBody {
    enabled: bool,
}

async fn set_time_context(State(state): State<ApiState>, headers: HeaderMap, AxumPath(name): AxumPath<String>, Json(body): Json<EnabledBody>) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    let id = match resolve_id(&state, &name) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.registry.set_time_context_enabled(&id, body.enabled) {
        Ok(()) => envelope_ok(json!({})),
        Err(e) => envelope_err(&e),
    }
}

async fn set_hook_detection(State(state): State<ApiState>, headers: HeaderMap, AxumPath(name): AxumPath<String>, Json(body): Json<EnabledBody>) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    let id = match resolve_id(&state, &name) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.registry.set_hook_detection_enabled(&id, body.enabled) {
        Ok(()) => envelope_ok(json!({})),
        Err(e) => envelope_err(&e),
    }
}

async fn transport(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    envelope_ok(json!({ "transported": state.registry.transportable_local_count() }))
}

async fn monitor_restart(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    state.monitor.tick().await;
    envelope_ok(json!({}))
}

async fn supervisor_start(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    state.supervisor_enabled.store(true, Ordering::SeqCst);
    envelope_ok(json!({}))
}

async fn supervisor_stop(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    if let Err(resp) = require_auth(&headers, &state) {
        return resp;
    }
    state.supervisor_enabled.store(false, Ordering::SeqCst);
    envelope_ok(json!({}))
}

async fn federation_status(State(state): State<ApiState>, AxumPath(peer): AxumPath<String>) -> Response {
    match state.federation.peer_state(&peer).await {
        Some(s) => envelope_ok(json!({ "reachable": s.reachable, "last_error": s.last_error })),
        None => envelope_err(&OvercodeError::NotFound(peer)),
    }
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/agents/launch", post(launch))
        .route("/api/agents/:name/send", post(send))
        .route("/api/agents/:name/keys", post(keys))
        .route("/api/agents/:name/kill", post(kill))
        .route("/api/agents/:name/restart", post(restart))
        .route("/api/agents/:name/standing-orders", put(set_standing_orders).delete(clear_standing_orders))
        .route("/api/agents/:name/budget", put(set_budget))
        .route("/api/agents/:name/value", put(set_value))
        .route("/api/agents/:name/annotation", put(annotate))
        .route("/api/agents/:name/sleep", post(sleep))
        .route("/api/agents/:name/heartbeat", put(set_heartbeat))
        .route("/api/agents/:name/heartbeat/pause", post(heartbeat_pause))
        .route("/api/agents/:name/heartbeat/resume", post(heartbeat_resume))
        .route("/api/agents/:name/time-context", put(set_time_context))
        .route("/api/agents/:name/hook-detection", put(set_hook_detection))
        .route("/api/agents/transport", post(transport))
        .route("/api/agents/cleanup", post(cleanup))
        .route("/api/daemon/monitor/restart", post(monitor_restart))
        .route("/api/daemon/supervisor/start", post(supervisor_start))
        .route("/api/daemon/supervisor/stop", post(supervisor_stop))
        .route("/api/federation/:peer", get(federation_status))
        .route("/api/status", get(status))
        .route("/api/timeline/raw", get(timeline_raw))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorized_matches_case_insensitive_header_name() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Api-Key", "secret".parse().unwrap());
        assert!(authorized(&headers, "secret"));
        assert!(!authorized(&headers, "other"));
    }

    #[test]
    fn empty_expected_key_allows_any_request() {
        let headers = HeaderMap::new();
        assert!(authorized(&headers, ""));
    }
}
