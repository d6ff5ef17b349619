//! Monitor Loop (§4.3): the periodic scheduler that scrapes pane text,
//! classifies status, accumulates statistics, and flushes the state
//! document every tick.

use crate::accumulator::{update_times, TimeAccumulation};
use crate::classifier::{classify_polling, ClassifierConfig};
use crate::config::Config;
use crate::presence::{read_presence, Presence};
use crate::registry::{AgentStatus, Registry};
use crate::state_dir::{write_atomic, StateDir};
use crate::supervisor::SupervisorState;
use overcode_mux::MultiplexerAdapter;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

fn now_unix() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

/// One entry of the `MonitorState` snapshot (§3).
#[derive(Debug, Clone, Serialize)]
pub struct SessionProjection {
    pub id: String,
    pub name: String,
    pub status: AgentStatus,
    pub is_remote: bool,
    pub estimated_cost_usd: f64,
    pub budget_exceeded: bool,
}

/// Process-wide snapshot persisted to `monitor_daemon_state.json`
/// (§3, §6.1). Only the Monitor Loop task ever writes this document.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorState {
    pub loop_count: u64,
    pub tick_interval_s: u64,
    pub started_at: f64,
    pub daemon_version: &'static str,
    pub sessions: Vec<SessionProjection>,
    pub supervisor_launches: u64,
    pub supervisor_claude_total_run_seconds: f64,
    pub supervisor_claude_running: bool,
}

/// A coalesced "someone needs attention" notification sent to the
/// Supervisor Loop once per tick.
#[derive(Debug, Clone)]
pub struct AttentionBell {
    pub newly_waiting: Vec<String>,
}

pub struct MonitorLoop {
    registry: Arc<Registry>,
    mux: Arc<dyn MultiplexerAdapter>,
    config: Config,
    state_dir: StateDir,
    supervisor: Arc<SupervisorState>,
    started_at: f64,
    loop_count: AtomicU64,
    bell_tx: async_channel::Sender<AttentionBell>,
    tick_tx: async_channel::Sender<()>,
    visited_waiting: Mutex<HashSet<String>>,
}

impl MonitorLoop {
    pub fn new(
        registry: Arc<Registry>,
        mux: Arc<dyn MultiplexerAdapter>,
        config: Config,
        state_dir: StateDir,
        supervisor: Arc<SupervisorState>,
        bell_tx: async_channel::Sender<AttentionBell>,
        tick_tx: async_channel::Sender<()>,
    ) -> Self {
        MonitorLoop {
            registry,
            mux,
            config,
            state_dir,
            supervisor,
            started_at: now_unix(),
            loop_count: AtomicU64::new(0),
            bell_tx,
            tick_tx,
            visited_waiting: Mutex::new(HashSet::new()),
        }
    }

    /// Runs the tick loop until `cancel` fires, then performs one final
    /// flush before returning.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(self.config.tick_interval_s.max(1)));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.tick().await;
                    tracing::info!("monitor loop shutting down after final flush");
                    return;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// Executes the 5-step tick algorithm (§4.3).
    pub async fn tick(&self) {
        // Step 2: presence signal (step 1, peer snapshots, is the
        // Federation Poller's job — it updates the registry directly via
        // merge_remote, so there's nothing further to read here).
        let presence = read_presence(&self.state_dir, self.config.tick_interval_s).await;

        let sessions = self.registry.non_terminated_local();
        let mut newly_waiting = Vec::new();
        let now = now_unix();

        for session in &sessions {
            let pane = self
                .mux
                .capture_pane(&self.config.multiplexer_group, &session.multiplexer_window, self.config.capture_lines)
                .await
                .unwrap_or_default();
            let lines: Vec<&str> = pane.lines().collect();

            let classifier_cfg = ClassifierConfig {
                prev_status: session.status,
                seconds_since_last_tick: (now - session.stats.last_accumulation_time).max(0.0),
                staleness_s: self.config.classifier_staleness_s as f64,
            };
            let (new_status, activity) = classify_polling(&lines, &classifier_cfg);

            let elapsed = (now - session.stats.last_accumulation_time).max(0.0);
            let acc: TimeAccumulation = update_times(
                new_status,
                session.status,
                elapsed,
                session.stats.green_seconds,
                session.stats.non_green_seconds,
                session.stats.sleep_seconds,
                session.start_time,
                now,
                1.1,
            );

            self.registry.update_status(&session.id, new_status, activity);
            self.registry.apply_time_accumulation(&session.id, acc, now);

            crate::history::append_row(
                &self.state_dir,
                chrono::Utc::now(),
                &session.name,
                status_label(new_status),
                session.stats.activity_summary.as_deref().unwrap_or(""),
            )
            .await
            .ok();

            if new_status == AgentStatus::WaitingUser {
                let mut visited = self.visited_waiting.lock().await;
                if visited.insert(session.id.clone()) {
                    newly_waiting.push(session.name.clone());
                }
            } else {
                self.visited_waiting.lock().await.remove(&session.id);
            }

            if let Some(refreshed) = self.registry.get(&session.id) {
                let exceeded = refreshed
                    .cost_budget
                    .map(|budget| refreshed.stats.estimated_cost_usd > budget)
                    .unwrap_or(false);
                self.registry.set_budget_exceeded(&session.id, exceeded);
            }
        }

        let _ = presence; // consulted for future UI projection; no core decision depends on it today

        if !newly_waiting.is_empty() {
            let _ = self.bell_tx.try_send(AttentionBell { newly_waiting });
        }

        self.flush_state().await;
        let _ = self.tick_tx.try_send(());
        self.loop_count.fetch_add(1, Ordering::SeqCst);
    }

    async fn flush_state(&self) {
        let all = self.registry.snapshot();
        let sessions = all
            .iter()
            .map(|s| SessionProjection {
                id: s.id.clone(),
                name: s.name.clone(),
                status: s.status,
                is_remote: s.is_remote(),
                estimated_cost_usd: s.stats.estimated_cost_usd,
                budget_exceeded: s.budget_exceeded,
            })
            .collect();

        let state = MonitorState {
            loop_count: self.loop_count.load(Ordering::SeqCst),
            tick_interval_s: self.config.tick_interval_s,
            started_at: self.started_at,
            daemon_version: env!("CARGO_PKG_VERSION"),
            sessions,
            supervisor_launches: self.supervisor.supervisor_launches.load(Ordering::SeqCst),
            supervisor_claude_total_run_seconds: *self.supervisor.supervisor_claude_total_run_seconds.lock().await,
            supervisor_claude_running: self.supervisor.is_remediation_running(),
        };

        let Ok(mut bytes) = serde_json::to_vec_pretty(&state) else {
            tracing::error!("failed to serialize monitor_daemon_state.json");
            return;
        };
        bytes.push(b'\n');
        if let Err(e) = write_atomic(&self.state_dir.monitor_daemon_state_json(), &bytes).await {
            tracing::warn!(error = %e, "failed to flush monitor_daemon_state.json");
        }

        self.registry.persist().await;
    }
}

fn status_label(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Running => "running",
        AgentStatus::RunningHeartbeat => "running_heartbeat",
        AgentStatus::WaitingUser => "waiting_user",
        AgentStatus::WaitingApproval => "waiting_approval",
        AgentStatus::WaitingSupervisor => "waiting_supervisor",
        AgentStatus::WaitingHeartbeat => "waiting_heartbeat",
        AgentStatus::NoInstructions => "no_instructions",
        AgentStatus::Error => "error",
        AgentStatus::Asleep => "asleep",
        AgentStatus::Terminated => "terminated",
        AgentStatus::Done => "done",
    }
}
