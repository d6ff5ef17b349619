//! Hook Receiver (§4.7): a short-lived process invoked out-of-band by
//! each agent at lifecycle events.

use crate::presence::PresenceState;
use crate::registry::AgentSession;
use crate::state_dir::{write_atomic, StateDir};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct HookInput {
    hook_event_name: Option<String>,
    tool_name: Option<String>,
}

/// Environment variables the receiver reads to identify the owning
/// session (§4.7).
#[derive(Debug, Clone, Default)]
pub struct HookEnv {
    pub session_name: Option<String>,
    pub multiplexer_group: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HookOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl HookOutcome {
    fn silent_ok() -> Self {
        HookOutcome { exit_code: 0, stdout: String::new(), stderr: String::new() }
    }
}

/// Extra context used only by `UserPromptSubmit`'s time-context line.
/// Every field is optional — only fields with available data appear in
/// the printed line.
#[derive(Debug, Clone, Default)]
pub struct TimeContextInputs {
    pub now: Option<DateTime<Utc>>,
    pub tz_label: Option<String>,
    pub presence: Option<PresenceState>,
    pub office: Option<bool>,
    pub uptime_seconds: Option<f64>,
    pub heartbeat_frequency: Option<String>,
    pub heartbeat_next: Option<String>,
}

fn presence_label(p: PresenceState) -> &'static str {
    match p {
        PresenceState::Active => "active",
        PresenceState::Inactive => "inactive",
        PresenceState::LockedOrSleep => "locked",
        PresenceState::Unknown => "unknown",
    }
}

fn format_uptime(seconds: f64) -> String {
    let total_minutes = (seconds / 60.0).round() as i64;
    format!("{}h {}m", total_minutes / 60, total_minutes % 60)
}

/// Builds the one-line time-context string (§4.7 step 3), including
/// only the fields whose underlying data is available.
pub fn build_time_context(inputs: &TimeContextInputs) -> String {
    let mut parts = Vec::new();
    if let Some(now) = inputs.now {
        let tz = inputs.tz_label.as_deref().unwrap_or("UTC");
        parts.push(format!("Clock: {} {tz}", now.format("%H:%M")));
    }
    if let Some(p) = inputs.presence {
        parts.push(format!("User: {}", presence_label(p)));
    }
    if let Some(office) = inputs.office {
        parts.push(format!("Office: {}", if office { "yes" } else { "no" }));
    }
    if let Some(uptime) = inputs.uptime_seconds {
        parts.push(format!("Uptime: {}", format_uptime(uptime)));
    }
    if let Some(freq) = &inputs.heartbeat_frequency {
        let next = inputs.heartbeat_next.as_deref().unwrap_or("now");
        parts.push(format!("Heartbeat: {freq} (next: {next})"));
    }
    parts.join(" | ")
}

/// Runs the hook protocol end-to-end. `sessions` is the already-loaded
/// `sessions.json` contents; the caller is responsible for reading it
/// (the receiver itself never mutates the registry beyond the hook
/// state file).
pub async fn run(stdin: &str, env: &HookEnv, state_dir: &StateDir, sessions: &[AgentSession], time_context: &TimeContextInputs) -> HookOutcome {
    let (Some(session_name), Some(group)) = (&env.session_name, &env.multiplexer_group) else {
        return HookOutcome::silent_ok();
    };

    let Ok(input) = serde_json::from_str::<HookInput>(stdin) else {
        return HookOutcome::silent_ok();
    };
    let Some(event_name) = input.hook_event_name else {
        return HookOutcome::silent_ok();
    };

    let known_events = [
        "UserPromptSubmit",
        "PostToolUse",
        "Stop",
        "PermissionRequest",
        "SessionEnd",
    ];
    if !known_events.contains(&event_name.as_str()) {
        return HookOutcome::silent_ok();
    }

    let _ = group; // identifies which multiplexer group's state_dir the caller should have opened
    let _ = tokio::fs::create_dir_all(state_dir.root()).await;
    let state_path = state_dir.hook_state(session_name);
    let doc = json!({
        "event": event_name,
        "tool_name": input.tool_name,
        "timestamp": Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    });
    if let Ok(bytes) = serde_json::to_vec(&doc) {
        let _ = write_atomic(&state_path, &bytes).await;
    }

    if event_name != "UserPromptSubmit" {
        return HookOutcome::silent_ok();
    }

    let Some(session) = sessions.iter().find(|s| &s.name == session_name) else {
        return HookOutcome::silent_ok();
    };

    if session.budget_exceeded {
        let budget = session.cost_budget.unwrap_or(0.0);
        let spent = session.stats.estimated_cost_usd;
        return HookOutcome {
            exit_code: 2,
            stdout: String::new(),
            stderr: format!("Budget exceeded: spent ${spent:.2} of ${budget:.2} budget. This prompt has been blocked.\n"),
        };
    }

    HookOutcome {
        exit_code: 0,
        stdout: format!("{}\n", build_time_context(time_context)),
        stderr: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AgentStatus, Permissiveness, SessionStats};
    use std::path::PathBuf;

    fn acme_session(budget_exceeded: bool, cost_budget: f64, spent: f64) -> AgentSession {
        let mut stats = SessionStats::new(0.0);
        stats.estimated_cost_usd = spent;
        AgentSession {
            id: "1".to_string(),
            name: "acme".to_string(),
            host: "local".to_string(),
            multiplexer_window: "@1".to_string(),
            working_directory: PathBuf::from("/tmp"),
            repo: None,
            branch: None,
            command: vec!["claude".to_string()],
            start_time: 0.0,
            status: AgentStatus::Running,
            is_asleep: false,
            terminated_at: None,
            standing_orders: None,
            standing_orders_complete: false,
            permissiveness: Permissiveness::Normal,
            agent_value: 0,
            cost_budget: Some(cost_budget),
            budget_exceeded,
            annotation: None,
            heartbeat: None,
            time_context_enabled: true,
            hook_detection_enabled: true,
            stats,
        }
    }

    /// E5 — Hook receiver: budget block.
    #[tokio::test]
    async fn e5_budget_block() {
        let tmp = tempfile::tempdir().unwrap();
        let state_dir = StateDir::new(tmp.path(), "agents");
        let sessions = vec![acme_session(true, 5.00, 5.42)];
        let env = HookEnv {
            session_name: Some("acme".to_string()),
            multiplexer_group: Some("agents".to_string()),
        };
        let outcome = run(
            r#"{"hook_event_name":"UserPromptSubmit"}"#,
            &env,
            &state_dir,
            &sessions,
            &TimeContextInputs::default(),
        )
        .await;
        assert_eq!(outcome.exit_code, 2);
        assert!(outcome.stderr.contains("$5.42"));
        assert!(outcome.stderr.contains("$5.00"));
        assert!(outcome.stderr.contains("Budget"));
    }

    #[tokio::test]
    async fn under_budget_prints_time_context() {
        let tmp = tempfile::tempdir().unwrap();
        let state_dir = StateDir::new(tmp.path(), "agents");
        let sessions = vec![acme_session(false, 5.00, 1.00)];
        let env = HookEnv {
            session_name: Some("acme".to_string()),
            multiplexer_group: Some("agents".to_string()),
        };
        let ctx = TimeContextInputs { presence: Some(PresenceState::Active), ..Default::default() };
        let outcome = run(r#"{"hook_event_name":"UserPromptSubmit"}"#, &env, &state_dir, &sessions, &ctx).await;
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.stdout.contains("User: active"));
    }

    #[tokio::test]
    async fn missing_envvars_is_silent() {
        let tmp = tempfile::tempdir().unwrap();
        let state_dir = StateDir::new(tmp.path(), "agents");
        let outcome = run(r#"{"hook_event_name":"Stop"}"#, &HookEnv::default(), &state_dir, &[], &TimeContextInputs::default()).await;
        assert_eq!(outcome, HookOutcome { exit_code: 0, stdout: String::new(), stderr: String::new() });
    }

    #[tokio::test]
    async fn malformed_input_is_silent() {
        let tmp = tempfile::tempdir().unwrap();
        let state_dir = StateDir::new(tmp.path(), "agents");
        let env = HookEnv { session_name: Some("acme".to_string()), multiplexer_group: Some("agents".to_string()) };
        let outcome = run("not json", &env, &state_dir, &[], &TimeContextInputs::default()).await;
        assert_eq!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn unknown_event_is_silent() {
        let tmp = tempfile::tempdir().unwrap();
        let state_dir = StateDir::new(tmp.path(), "agents");
        let env = HookEnv { session_name: Some("acme".to_string()), multiplexer_group: Some("agents".to_string()) };
        let outcome = run(r#"{"hook_event_name":"SomethingElse"}"#, &env, &state_dir, &[], &TimeContextInputs::default()).await;
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.stdout.is_empty());
    }

    #[tokio::test]
    async fn stop_event_writes_hook_state_file() {
        let tmp = tempfile::tempdir().unwrap();
        let state_dir = StateDir::new(tmp.path(), "agents");
        let env = HookEnv { session_name: Some("acme".to_string()), multiplexer_group: Some("agents".to_string()) };
        run(r#"{"hook_event_name":"Stop"}"#, &env, &state_dir, &[], &TimeContextInputs::default()).await;
        let path = tmp.path().join("agents").join("hook_state_acme.json");
        let contents = tokio::fs::read_to_string(path).await.unwrap();
        assert!(contents.contains("\"Stop\""));
    }
}
