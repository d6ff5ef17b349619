use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Closed status set (§3). `{Running, RunningHeartbeat}` is "green".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Running,
    RunningHeartbeat,
    WaitingUser,
    WaitingApproval,
    WaitingSupervisor,
    WaitingHeartbeat,
    NoInstructions,
    Error,
    Asleep,
    Terminated,
    Done,
}

impl AgentStatus {
    pub fn is_green(self) -> bool {
        matches!(self, AgentStatus::Running | AgentStatus::RunningHeartbeat)
    }

    /// `asleep` and `terminated` accumulate no time at all (neither
    /// green, non-green, nor sleep bucket) — see `is_sleep_bucket` for
    /// the distinct "sleep" accumulator bucket used by `update_times`.
    pub fn accumulates_time(self) -> bool {
        !matches!(self, AgentStatus::Asleep | AgentStatus::Terminated)
    }

    /// Whether elapsed time in this status is credited to the `sleep`
    /// bucket rather than `non_green`. Only `Asleep` sessions that are
    /// still being accumulated (e.g. mid-transition) land here; in
    /// steady state `is_asleep` on the session gates accumulation
    /// entirely before `update_times` is even called.
    pub fn is_sleep_bucket(self) -> bool {
        matches!(self, AgentStatus::Asleep)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permissiveness {
    Normal,
    Permissive,
    Bypass,
}

impl Default for Permissiveness {
    fn default() -> Self {
        Permissiveness::Normal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub interval_s: u64,
    pub last_fired: Option<f64>,
    pub paused: bool,
    pub instruction: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub current_state: Option<String>,
    pub state_since: f64,
    pub last_accumulation_time: f64,
    pub green_seconds: f64,
    pub non_green_seconds: f64,
    pub sleep_seconds: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_write_tokens: u64,
    pub cache_read_tokens: u64,
    pub total_tokens: u64,
    pub estimated_cost_usd: f64,
    pub interaction_count: u64,
    pub steer_count: u64,
    pub work_durations: Vec<f64>,
    pub median_work_seconds: f64,
    /// Written by the classifier (§4.2); read by external UI
    /// collaborators and optionally extended by the summarizer
    /// subsystem, which this crate treats as an external writer (see
    /// the grounding ledger's Open Question decisions).
    pub activity_summary: Option<String>,
    pub activity_summary_context: Option<String>,
}

impl SessionStats {
    pub fn new(now: f64) -> Self {
        SessionStats {
            current_state: None,
            state_since: now,
            last_accumulation_time: now,
            green_seconds: 0.0,
            non_green_seconds: 0.0,
            sleep_seconds: 0.0,
            input_tokens: 0,
            output_tokens: 0,
            cache_write_tokens: 0,
            cache_read_tokens: 0,
            total_tokens: 0,
            estimated_cost_usd: 0.0,
            interaction_count: 0,
            steer_count: 0,
            work_durations: Vec::new(),
            median_work_seconds: 0.0,
            activity_summary: None,
            activity_summary_context: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSession {
    pub id: String,
    pub name: String,
    pub host: String,
    pub multiplexer_window: String,
    pub working_directory: PathBuf,
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub command: Vec<String>,
    pub start_time: f64,
    pub status: AgentStatus,
    pub is_asleep: bool,
    pub terminated_at: Option<f64>,
    pub standing_orders: Option<String>,
    pub standing_orders_complete: bool,
    pub permissiveness: Permissiveness,
    pub agent_value: i64,
    pub cost_budget: Option<f64>,
    pub budget_exceeded: bool,
    pub annotation: Option<String>,
    pub heartbeat: Option<Heartbeat>,
    /// Whether the §4.7 `UserPromptSubmit` time-context line is emitted
    /// for this session.
    #[serde(default = "default_true")]
    pub time_context_enabled: bool,
    /// Whether the classifier's polling pattern table is consulted
    /// (`true`, the default) or this session relies on hook-only events.
    #[serde(default = "default_true")]
    pub hook_detection_enabled: bool,
    pub stats: SessionStats,
}

fn default_true() -> bool {
    true
}

impl AgentSession {
    pub fn is_remote(&self) -> bool {
        self.id.starts_with("remote:")
    }
}

/// Filter accepted by `Registry::list_visible` (§4.1).
#[derive(Debug, Clone, Default)]
pub struct VisibleFilter {
    pub include_asleep: bool,
    pub include_terminated: bool,
    pub include_done: bool,
}
