//! Hook Receiver entrypoint: a short-lived process an agent CLI invokes
//! directly. Reads JSON from stdin, identifies its owning session from
//! the environment, and exits with the code `hooks::run` decides.

use overcode::config::Config;
use overcode::hooks::{self, HookEnv, TimeContextInputs};
use overcode::presence::read_presence;
use overcode::registry::AgentSession;
use overcode::state_dir::StateDir;
use std::io::Read;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let mut stdin = String::new();
    if std::io::stdin().read_to_string(&mut stdin).is_err() {
        return ExitCode::SUCCESS;
    }

    let env = HookEnv {
        session_name: std::env::var("SESSION_NAME").ok(),
        multiplexer_group: std::env::var("MULTIPLEXER_GROUP").ok(),
    };

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(_) => return ExitCode::SUCCESS,
    };
    let group = env.multiplexer_group.clone().unwrap_or(config.multiplexer_group.clone());
    let state_dir = StateDir::new(&config.state_dir, &group);

    let sessions: Vec<AgentSession> = tokio::fs::read(state_dir.sessions_json())
        .await
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default();

    let presence = read_presence(&state_dir, config.tick_interval_s).await;
    let started_at = tokio::fs::metadata(state_dir.monitor_daemon_pid())
        .await
        .and_then(|m| m.created())
        .ok();
    let uptime_seconds = started_at.and_then(|t| t.elapsed().ok()).map(|d| d.as_secs_f64());

    let time_context = TimeContextInputs {
        now: Some(chrono::Utc::now()),
        tz_label: None,
        presence: Some(presence.state),
        office: None,
        uptime_seconds,
        heartbeat_frequency: None,
        heartbeat_next: None,
    };

    let outcome = hooks::run(&stdin, &env, &state_dir, &sessions, &time_context).await;

    if !outcome.stdout.is_empty() {
        print!("{}", outcome.stdout);
    }
    if !outcome.stderr.is_empty() {
        eprint!("{}", outcome.stderr);
    }

    ExitCode::from(outcome.exit_code as u8)
}
