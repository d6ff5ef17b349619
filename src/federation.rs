//! Federation Poller (§4.9): pulls peer instances' state and merges it
//! into the local registry for read-only display.

use crate::api::client::SisterClient;
use crate::config::{Config, PeerConfig};
use crate::registry::{AgentSession, AgentStatus, Permissiveness, Registry, SessionStats};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeerState {
    pub reachable: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteSessionProjection {
    name: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct RemoteMonitorState {
    sessions: Vec<RemoteSessionProjection>,
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    data: Option<RemoteMonitorState>,
}

fn parse_status(status_label: &str) -> AgentStatus {
    match status_label {
        "running" => AgentStatus::Running,
        "running_heartbeat" => AgentStatus::RunningHeartbeat,
        "waiting_user" => AgentStatus::WaitingUser,
        "waiting_approval" => AgentStatus::WaitingApproval,
        "waiting_supervisor" => AgentStatus::WaitingSupervisor,
        "waiting_heartbeat" => AgentStatus::WaitingHeartbeat,
        "no_instructions" => AgentStatus::NoInstructions,
        "error" => AgentStatus::Error,
        "asleep" => AgentStatus::Asleep,
        "terminated" => AgentStatus::Terminated,
        _ => AgentStatus::Done,
    }
}

fn to_agent_session(remote: RemoteSessionProjection) -> AgentSession {
    AgentSession {
        id: String::new(), // overwritten by Registry::merge_remote
        name: remote.name,
        host: String::new(), // overwritten by Registry::merge_remote
        multiplexer_window: String::new(),
        working_directory: PathBuf::new(),
        repo: None,
        branch: None,
        command: Vec::new(),
        start_time: 0.0,
        status: parse_status(&remote.status),
        is_asleep: false,
        terminated_at: None,
        standing_orders: None,
        standing_orders_complete: false,
        permissiveness: Permissiveness::Normal,
        agent_value: 0,
        cost_budget: None,
        budget_exceeded: false,
        annotation: None,
        heartbeat: None,
        time_context_enabled: true,
        hook_detection_enabled: true,
        stats: SessionStats::new(0.0),
    }
}

pub struct FederationPoller {
    registry: Arc<Registry>,
    peers: Vec<PeerConfig>,
    timeout: Duration,
    peer_states: Mutex<HashMap<String, PeerState>>,
}

impl FederationPoller {
    pub fn new(registry: Arc<Registry>, config: &Config) -> Self {
        FederationPoller {
            registry,
            peers: config.peers.clone(),
            timeout: Duration::from_secs(config.http_timeout_s),
            peer_states: Mutex::new(HashMap::new()),
        }
    }

    pub async fn peer_state(&self, name: &str) -> Option<PeerState> {
        self.peer_states.lock().await.get(name).cloned()
    }

    /// Polls every configured peer concurrently, merging successes and
    /// recording failures without discarding the prior snapshot (§4.9).
    pub async fn poll_once(&self) {
        let mut set = tokio::task::JoinSet::new();
        for peer in self.peers.clone() {
            let client = SisterClient::new(&peer, self.timeout);
            set.spawn(async move {
                let result = client.status().await;
                (peer, result)
            });
        }
        while let Some(joined) = set.join_next().await {
            if let Ok((peer, result)) = joined {
                self.apply_poll_result(&peer, result).await;
            }
        }
    }

    async fn apply_poll_result(&self, peer: &PeerConfig, result: crate::api::client::ControlResult<serde_json::Value>) {
        if !result.ok {
            let mut states = self.peer_states.lock().await;
            states.insert(peer.name.clone(), PeerState { reachable: false, last_error: result.error.clone() });
            return;
        }
        let Some(value) = result.data else { return };
        let parsed: Result<StatusEnvelope, _> = serde_json::from_value(value.clone());
        let monitor_state = match parsed {
            Ok(envelope) => envelope.data,
            Err(_) => serde_json::from_value::<RemoteMonitorState>(value).ok(),
        };
        match monitor_state {
            Some(state) => {
                let sessions: Vec<AgentSession> = state.sessions.into_iter().map(to_agent_session).collect();
                self.registry.merge_remote(&peer.name, sessions);
                self.peer_states.lock().await.insert(peer.name.clone(), PeerState { reachable: true, last_error: None });
            }
            None => {
                self.peer_states.lock().await.insert(
                    peer.name.clone(),
                    PeerState { reachable: false, last_error: Some("malformed response".to_string()) },
                );
            }
        }
    }

    pub async fn run(&self, interval_s: u64, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_s.max(1)));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => self.poll_once().await,
            }
        }
    }
}
