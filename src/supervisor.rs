//! Supervisor Loop (§4.5): decides when to launch a remediation agent
//! and tracks its interventions. The decision functions
//! (`filter_candidates`, `should_launch`, `run_seconds`) are pure;
//! `launch` and `track` are the I/O-touching orchestration around them.

use crate::registry::{AgentStatus, Registry};
use crate::presets::resolve;
use overcode_mux::MultiplexerAdapter;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;

/// The subset of an `AgentSession` the decision functions need. Kept
/// separate from `AgentSession` so `filter_candidates`/`should_launch`
/// stay pure and independently testable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub status: AgentStatus,
    pub is_asleep: bool,
    pub is_remediation_agent: bool,
    pub standing_orders: Option<String>,
    pub repo: Option<String>,
    pub multiplexer_window: String,
}

/// `filter_candidates`: non-green, not asleep, not the remediation agent
/// itself, and whose standing orders do not begin (case-insensitively)
/// with `DO_NOTHING`.
pub fn filter_candidates(sessions: &[Candidate]) -> Vec<&Candidate> {
    sessions
        .iter()
        .filter(|c| !c.status.is_green())
        .filter(|c| !c.is_asleep)
        .filter(|c| !c.is_remediation_agent)
        .filter(|c| {
            !c.standing_orders
                .as_deref()
                .unwrap_or("")
                .trim_start()
                .to_uppercase()
                .starts_with("DO_NOTHING")
        })
        .collect()
}

/// `should_launch`.
pub fn should_launch(candidates: &[&Candidate], remediation_running: bool) -> (bool, &'static str) {
    if candidates.is_empty() {
        return (false, "no_sessions");
    }
    if remediation_running {
        return (false, "already_running");
    }
    let any_has_orders = candidates.iter().any(|c| c.standing_orders.is_some());
    let all_waiting_user = candidates.iter().all(|c| c.status == AgentStatus::WaitingUser);
    if all_waiting_user && !any_has_orders {
        return (false, "waiting_user_no_instructions");
    }
    if any_has_orders {
        (true, "with_instructions")
    } else {
        (true, "non_user_blocked")
    }
}

/// `run_seconds` law (§9): pure, total.
pub fn run_seconds(started_at: Option<f64>, now: f64, previous_total: f64) -> f64 {
    match started_at {
        None => previous_total,
        Some(start) => previous_total + (now - start).max(0.0),
    }
}

fn status_emoji(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Running | AgentStatus::RunningHeartbeat => "🟢",
        AgentStatus::WaitingUser | AgentStatus::WaitingApproval | AgentStatus::WaitingSupervisor | AgentStatus::WaitingHeartbeat => "🟡",
        AgentStatus::Error => "🔴",
        AgentStatus::NoInstructions => "⚪",
        AgentStatus::Asleep => "💤",
        AgentStatus::Terminated | AgentStatus::Done => "⚫",
    }
}

/// Composes the remediation-agent context string (§4.5 `launch`).
pub fn build_context(candidates: &[&Candidate]) -> String {
    let mut out = String::new();
    out.push_str(
        "You are a remediation agent. The sessions below are not making \
         progress unattended. Review each one and, per its autopilot \
         instructions, take whatever action is appropriate to unblock it.\n\n",
    );
    for c in candidates {
        out.push_str(&format!("{} {} (window {})\n", status_emoji(c.status), c.name, c.multiplexer_window));
        let orders = match &c.standing_orders {
            Some(text) => resolve(text).0,
            None => "No autopilot instructions set".to_string(),
        };
        out.push_str(&format!("   Autopilot: {orders}\n"));
        if let Some(repo) = &c.repo {
            out.push_str(&format!("   Repo: {repo}\n"));
        }
    }
    out.push_str("\nConsult the shared state document for current status before acting.\n");
    out
}

/// A detected intervention: a remediation-agent pane line naming a
/// local session and an action phrase, with no matching no-action
/// phrase.
pub fn parse_intervention_line<'a>(line: &'a str, session_names: &'a [String], action_phrases: &[String], no_action_phrases: &[String]) -> Option<&'a str> {
    let lower = line.to_lowercase();
    if no_action_phrases.iter().any(|p| lower.contains(&p.to_lowercase())) {
        return None;
    }
    let name = session_names.iter().find(|n| line.contains(&format!("{n} - ")))?;
    if action_phrases.iter().any(|p| lower.contains(&p.to_lowercase())) {
        Some(name.as_str())
    } else {
        None
    }
}

/// Runtime state for the Supervisor Loop task: last-launch timestamp,
/// the active remediation agent (if any), and cumulative counters.
pub struct SupervisorState {
    pub min_launch_interval_s: u64,
    last_launch_unix: AtomicU64,
    remediation_running: AtomicBool,
    remediation_handle: Mutex<Option<String>>,
    pub supervisor_claude_started_at: Mutex<Option<f64>>,
    pub supervisor_claude_total_run_seconds: Mutex<f64>,
    pub supervisor_launches: AtomicU64,
}

impl SupervisorState {
    pub fn new(min_launch_interval_s: u64) -> Self {
        SupervisorState {
            min_launch_interval_s,
            last_launch_unix: AtomicU64::new(0),
            remediation_running: AtomicBool::new(false),
            remediation_handle: Mutex::new(None),
            supervisor_claude_started_at: Mutex::new(None),
            supervisor_claude_total_run_seconds: Mutex::new(0.0),
            supervisor_launches: AtomicU64::new(0),
        }
    }

    pub fn is_remediation_running(&self) -> bool {
        self.remediation_running.load(Ordering::SeqCst)
    }

    fn min_interval_elapsed(&self, now: f64) -> bool {
        let last = self.last_launch_unix.load(Ordering::SeqCst) as f64;
        last == 0.0 || now - last >= self.min_launch_interval_s as f64
    }

    /// Spawns a remediation agent via `mux`, using the same external CLI
    /// command ordinary agents use.
    pub async fn launch(
        &self,
        registry: &Registry,
        mux: &Arc<dyn MultiplexerAdapter>,
        multiplexer_group: &str,
        agent_command: &[String],
        working_dir: &Path,
        candidates: &[&Candidate],
        now: f64,
    ) -> Result<(), overcode_mux::MuxError> {
        if !self.min_interval_elapsed(now) {
            return Ok(());
        }
        let context = build_context(candidates);
        let handle = mux.new_window(multiplexer_group, "overcode-remediation", working_dir).await?;
        let joined = agent_command.join(" ");
        mux.send_text(multiplexer_group, &handle, &joined, true).await?;
        mux.send_text(multiplexer_group, &handle, &context, true).await?;

        *self.remediation_handle.lock().await = Some(handle);
        self.remediation_running.store(true, Ordering::SeqCst);
        self.last_launch_unix.store(now as u64, Ordering::SeqCst);
        *self.supervisor_claude_started_at.lock().await = Some(now);
        self.supervisor_launches.fetch_add(1, Ordering::SeqCst);
        let _ = registry; // reserved for future remediation-session bookkeeping
        Ok(())
    }

    /// Scrapes the remediation agent's pane for intervention lines and
    /// increments matching sessions' `steer_count`. When the window is
    /// gone, accumulates `run_seconds` and clears the running flag.
    pub async fn track(
        &self,
        registry: &Registry,
        mux: &Arc<dyn MultiplexerAdapter>,
        multiplexer_group: &str,
        action_phrases: &[String],
        no_action_phrases: &[String],
        now: f64,
    ) {
        let handle = self.remediation_handle.lock().await.clone();
        let Some(handle) = handle else { return };

        let local_sessions = registry.non_terminated_local();
        let names: Vec<String> = local_sessions.iter().map(|s| s.name.clone()).collect();

        match mux.capture_pane(multiplexer_group, &handle, 200).await {
            Some(text) => {
                for line in text.lines() {
                    if let Some(name) = parse_intervention_line(line, &names, action_phrases, no_action_phrases) {
                        if let Some(session) = local_sessions.iter().find(|s| s.name == name) {
                            registry.mutate_steer_count(&session.id);
                        }
                    }
                }
            }
            None => {
                let started_at = *self.supervisor_claude_started_at.lock().await;
                let mut total = self.supervisor_claude_total_run_seconds.lock().await;
                *total = run_seconds(started_at, now, *total);
                *self.supervisor_claude_started_at.lock().await = None;
                *self.remediation_handle.lock().await = None;
                self.remediation_running.store(false, Ordering::SeqCst);
            }
        }
    }
}
