//! Session Registry (§4.1): the persistent map `id -> AgentSession`.

mod types;

pub use types::{AgentSession, AgentStatus, Heartbeat, Permissiveness, SessionStats, VisibleFilter};

use crate::error::OvercodeError;
use crate::state_dir::{write_atomic, StateDir};
use dashmap::DashMap;
use overcode_mux::MultiplexerAdapter;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Options accepted by `Registry::create`.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub standing_orders: Option<String>,
    pub permissiveness: Permissiveness,
    pub agent_value: i64,
    pub cost_budget: Option<f64>,
    /// If true, `create` fails with `Conflict` on a name collision
    /// instead of renaming (invariant 4).
    pub forbid_rename: bool,
}

/// Owns the in-memory session map and serializes all writes to the
/// on-disk document. Reads may happen concurrently with a write; they
/// observe either the pre- or post-write map, per invariant 6 — callers
/// that need a point-in-time snapshot should call `snapshot()`.
pub struct Registry {
    sessions: DashMap<String, AgentSession>,
    mux: Arc<dyn MultiplexerAdapter>,
    multiplexer_group: String,
    state_dir: StateDir,
}

impl Registry {
    pub fn new(mux: Arc<dyn MultiplexerAdapter>, multiplexer_group: String, state_dir: StateDir) -> Self {
        Registry {
            sessions: DashMap::new(),
            mux,
            multiplexer_group,
            state_dir,
        }
    }

    /// Loads a previously persisted `sessions.json`, tolerating a
    /// missing file (fresh install) and a malformed one (logged and
    /// treated as empty, per the Malformed error class).
    pub async fn load(&self) {
        let path = self.state_dir.sessions_json();
        let Ok(bytes) = tokio::fs::read(&path).await else {
            return;
        };
        match serde_json::from_slice::<Vec<AgentSession>>(&bytes) {
            Ok(sessions) => {
                for s in sessions {
                    self.sessions.insert(s.id.clone(), s);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "sessions.json is malformed, starting empty");
            }
        }
    }

    fn unique_name(&self, requested: &str) -> String {
        let taken = |n: &str| {
            self.sessions
                .iter()
                .any(|e| e.name == n && e.status != AgentStatus::Terminated && !e.id.starts_with("remote:"))
        };
        if !taken(requested) {
            return requested.to_string();
        }
        let mut n = 2u32;
        loop {
            let candidate = format!("{requested}-{n}");
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Creates a session, opening a multiplexer window for it. Always
    /// succeeds unless `options.forbid_rename` is set and the name
    /// collides, in which case `Conflict` is returned.
    pub async fn create(
        &self,
        name: &str,
        command: Vec<String>,
        working_directory: &Path,
        options: CreateOptions,
    ) -> Result<AgentSession, OvercodeError> {
        let resolved_name = if options.forbid_rename {
            let taken = self
                .sessions
                .iter()
                .any(|e| e.name == name && e.status != AgentStatus::Terminated);
            if taken {
                return Err(OvercodeError::Conflict(format!("name '{name}' is in use")));
            }
            name.to_string()
        } else {
            self.unique_name(name)
        };

        let handle = self
            .mux
            .new_window(&self.multiplexer_group, &resolved_name, working_directory)
            .await
            .map_err(|e| OvercodeError::TransientIo(e.to_string()))?;

        let now = now_unix();
        let session = AgentSession {
            id: Uuid::new_v4().to_string(),
            name: resolved_name,
            host: "local".to_string(),
            multiplexer_window: handle,
            working_directory: working_directory.to_path_buf(),
            repo: options.repo,
            branch: options.branch,
            command,
            start_time: now,
            status: AgentStatus::Running,
            is_asleep: false,
            terminated_at: None,
            standing_orders: options.standing_orders,
            standing_orders_complete: false,
            permissiveness: options.permissiveness,
            agent_value: options.agent_value,
            cost_budget: options.cost_budget,
            budget_exceeded: false,
            annotation: None,
            heartbeat: None,
            time_context_enabled: true,
            hook_detection_enabled: true,
            stats: SessionStats::new(now),
        };

        self.sessions.insert(session.id.clone(), session.clone());
        self.persist().await;
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<AgentSession> {
        self.sessions.get(id).map(|e| e.clone())
    }

    pub fn find_by_name(&self, name: &str) -> Option<AgentSession> {
        self.sessions.iter().find(|e| e.name == name).map(|e| e.clone())
    }

    /// Idempotent status transition; records `state_since` on change and
    /// delegates time accumulation to the caller (the Monitor Loop calls
    /// the accumulator itself and passes the result here via
    /// `apply_time_accumulation`).
    pub fn update_status(&self, id: &str, status: AgentStatus, activity: Option<String>) {
        if let Some(mut e) = self.sessions.get_mut(id) {
            let changed = e.status != status;
            if changed {
                e.stats.state_since = now_unix();
            }
            e.status = status;
            if let Some(a) = activity {
                e.stats.activity_summary = Some(a);
            }
        }
    }

    pub fn apply_time_accumulation(&self, id: &str, acc: crate::accumulator::TimeAccumulation, now: f64) {
        if let Some(mut e) = self.sessions.get_mut(id) {
            if e.status == AgentStatus::Terminated {
                return;
            }
            e.stats.green_seconds = acc.green;
            e.stats.non_green_seconds = acc.non_green;
            e.stats.sleep_seconds = acc.sleep;
            e.stats.last_accumulation_time = now;
        }
    }

    pub async fn terminate(&self, id: &str, cascade: bool) -> Result<(), OvercodeError> {
        let window = {
            let mut e = self
                .sessions
                .get_mut(id)
                .ok_or_else(|| OvercodeError::NotFound(id.to_string()))?;
            if e.id.starts_with("remote:") {
                return Err(OvercodeError::RemoteReadOnly(id.to_string()));
            }
            e.status = AgentStatus::Terminated;
            e.terminated_at = Some(now_unix());
            e.multiplexer_window.clone()
        };
        if cascade {
            let _ = self.mux.kill_window(&self.multiplexer_group, &window).await;
        }
        self.persist().await;
        Ok(())
    }

    pub fn set_standing_orders(&self, id: &str, text: Option<String>) -> Result<(), OvercodeError> {
        self.mutate_local(id, |e| e.standing_orders = text)
    }

    pub fn set_budget(&self, id: &str, usd: Option<f64>) -> Result<(), OvercodeError> {
        self.mutate_local(id, |e| e.cost_budget = usd)
    }

    pub fn set_value(&self, id: &str, value: i64) -> Result<(), OvercodeError> {
        self.mutate_local(id, |e| e.agent_value = value)
    }

    pub fn set_sleep(&self, id: &str, asleep: bool) -> Result<(), OvercodeError> {
        self.mutate_local(id, |e| e.is_asleep = asleep)
    }

    pub fn annotate(&self, id: &str, text: String) -> Result<(), OvercodeError> {
        self.mutate_local(id, |e| e.annotation = Some(text))
    }

    pub fn set_heartbeat(&self, id: &str, heartbeat: Option<Heartbeat>) -> Result<(), OvercodeError> {
        self.mutate_local(id, |e| e.heartbeat = heartbeat)
    }

    pub fn set_heartbeat_paused(&self, id: &str, paused: bool) -> Result<(), OvercodeError> {
        self.mutate_local(id, |e| {
            if let Some(h) = &mut e.heartbeat {
                h.paused = paused;
            }
        })
    }

    pub fn set_time_context_enabled(&self, id: &str, enabled: bool) -> Result<(), OvercodeError> {
        self.mutate_local(id, |e| e.time_context_enabled = enabled)
    }

    pub fn set_hook_detection_enabled(&self, id: &str, enabled: bool) -> Result<(), OvercodeError> {
        self.mutate_local(id, |e| e.hook_detection_enabled = enabled)
    }

    /// Counts local sessions eligible for `/api/agents/transport`
    /// (§6.2). Window relocation itself is the multiplexer adapter's
    /// job; the adapter trait has no cross-group move primitive, so the
    /// Control API layer reports the count and leaves the actual move to
    /// an adapter-specific follow-up call.
    pub fn transportable_local_count(&self) -> usize {
        self.sessions.iter().filter(|e| e.host == "local").count()
    }

    /// Increments `steer_count` when the Supervisor Loop detects an
    /// intervention on this session's behalf (§4.5 `track`).
    pub fn mutate_steer_count(&self, id: &str) {
        if let Some(mut e) = self.sessions.get_mut(id) {
            e.stats.steer_count += 1;
        }
    }

    /// Sets the `budget_exceeded` flag (§4.3 step (e)).
    pub fn set_budget_exceeded(&self, id: &str, exceeded: bool) {
        if let Some(mut e) = self.sessions.get_mut(id) {
            e.budget_exceeded = exceeded;
        }
    }

    fn mutate_local(&self, id: &str, f: impl FnOnce(&mut AgentSession)) -> Result<(), OvercodeError> {
        let mut e = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| OvercodeError::NotFound(id.to_string()))?;
        if e.id.starts_with("remote:") {
            return Err(OvercodeError::RemoteReadOnly(id.to_string()));
        }
        f(&mut e);
        Ok(())
    }

    /// Returns sessions honoring `filter`.
    pub fn list_visible(&self, filter: &VisibleFilter) -> Vec<AgentSession> {
        self.sessions
            .iter()
            .filter(|e| {
                if e.status == AgentStatus::Terminated && !filter.include_terminated {
                    return false;
                }
                if e.status == AgentStatus::Done && !filter.include_done {
                    return false;
                }
                if e.is_asleep && !filter.include_asleep {
                    return false;
                }
                true
            })
            .map(|e| e.clone())
            .collect()
    }

    pub fn snapshot(&self) -> Vec<AgentSession> {
        self.sessions.iter().map(|e| e.clone()).collect()
    }

    pub fn non_terminated_local(&self) -> Vec<AgentSession> {
        self.sessions
            .iter()
            .filter(|e| e.status != AgentStatus::Terminated && e.host == "local")
            .map(|e| e.clone())
            .collect()
    }

    /// Removes terminated (and, if requested, done) local sessions from
    /// the map and persists the result. Returns the number removed.
    pub async fn purge(&self, include_done: bool) -> usize {
        let doomed: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| {
                e.host == "local" && (e.status == AgentStatus::Terminated || (include_done && e.status == AgentStatus::Done))
            })
            .map(|e| e.id.clone())
            .collect();
        for id in &doomed {
            self.sessions.remove(id);
        }
        if !doomed.is_empty() {
            self.persist().await;
        }
        doomed.len()
    }

    /// Removes local sessions that have been `Terminated` for longer than
    /// `horizon_hours`, per the configured retention window. Unlike
    /// `purge`, this never touches sessions that are merely `Done`.
    pub async fn purge_terminated_older_than(&self, horizon_hours: f64, now: f64) -> usize {
        let cutoff = now - horizon_hours * 3600.0;
        let doomed: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| e.host == "local" && e.status == AgentStatus::Terminated && e.terminated_at.is_some_and(|t| t < cutoff))
            .map(|e| e.id.clone())
            .collect();
        for id in &doomed {
            self.sessions.remove(id);
        }
        if !doomed.is_empty() {
            self.persist().await;
        }
        doomed.len()
    }

    /// Replaces the remote subset for `host` atomically, per invariant 5.
    pub fn merge_remote(&self, host: &str, snapshot: Vec<AgentSession>) {
        let prefix = format!("remote:{host}:");
        self.sessions.retain(|id, _| !id.starts_with(&prefix));
        for mut s in snapshot {
            s.id = format!("remote:{host}:{}", s.name);
            s.host = host.to_string();
            self.sessions.insert(s.id.clone(), s);
        }
    }

    /// Persists the full registry to `sessions.json` atomically
    /// (invariant 6).
    pub async fn persist(&self) {
        let all: Vec<AgentSession> = self.snapshot();
        let Ok(mut bytes) = serde_json::to_vec_pretty(&all) else {
            tracing::error!("failed to serialize sessions.json");
            return;
        };
        bytes.push(b'\n');
        if let Err(e) = write_atomic(&self.state_dir.sessions_json(), &bytes).await {
            tracing::warn!(error = %e, "failed to persist sessions.json");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overcode_mux::InMemoryAdapter;

    fn registry() -> Registry {
        let tmp = tempfile::tempdir().unwrap();
        Registry::new(
            Arc::new(InMemoryAdapter::new()),
            "agents".to_string(),
            StateDir::new(tmp.path(), "agents"),
        )
    }

    #[tokio::test]
    async fn create_resolves_name_collisions() {
        let reg = registry();
        let a = reg
            .create("worker", vec!["claude".into()], Path::new("/tmp"), CreateOptions::default())
            .await
            .unwrap();
        let b = reg
            .create("worker", vec!["claude".into()], Path::new("/tmp"), CreateOptions::default())
            .await
            .unwrap();
        assert_eq!(a.name, "worker");
        assert_eq!(b.name, "worker-2");
    }

    #[tokio::test]
    async fn create_forbid_rename_conflicts() {
        let reg = registry();
        reg.create("worker", vec!["claude".into()], Path::new("/tmp"), CreateOptions::default())
            .await
            .unwrap();
        let opts = CreateOptions { forbid_rename: true, ..Default::default() };
        let err = reg
            .create("worker", vec!["claude".into()], Path::new("/tmp"), opts)
            .await
            .unwrap_err();
        assert!(matches!(err, OvercodeError::Conflict(_)));
    }

    #[tokio::test]
    async fn terminate_is_permanent() {
        let reg = registry();
        let s = reg
            .create("worker", vec!["claude".into()], Path::new("/tmp"), CreateOptions::default())
            .await
            .unwrap();
        reg.terminate(&s.id, true).await.unwrap();
        let acc = crate::accumulator::TimeAccumulation {
            green: 500.0,
            non_green: 0.0,
            sleep: 0.0,
            state_changed: false,
            was_capped: false,
        };
        reg.apply_time_accumulation(&s.id, acc, now_unix());
        let after = reg.get(&s.id).unwrap();
        assert_eq!(after.status, AgentStatus::Terminated);
        assert_eq!(after.stats.green_seconds, 0.0);
    }

    #[tokio::test]
    async fn merge_remote_is_read_only() {
        let reg = registry();
        let remote = AgentSession {
            id: "placeholder".to_string(),
            name: "x".to_string(),
            host: "east".to_string(),
            multiplexer_window: "@1".to_string(),
            working_directory: "/tmp".into(),
            repo: None,
            branch: None,
            command: vec![],
            start_time: 0.0,
            status: AgentStatus::Running,
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
        };
        reg.merge_remote("east", vec![remote]);
        let got = reg.get("remote:east:x").unwrap();
        assert_eq!(got.host, "east");
        let err = reg.set_budget("remote:east:x", Some(10.0)).unwrap_err();
        assert!(matches!(err, OvercodeError::RemoteReadOnly(_)));
    }

    #[tokio::test]
    async fn purge_removes_terminated_but_keeps_done_by_default() {
        let reg = registry();
        let a = reg
            .create("a", vec!["claude".into()], Path::new("/tmp"), CreateOptions::default())
            .await
            .unwrap();
        reg.terminate(&a.id, false).await.unwrap();
        let b = reg
            .create("b", vec!["claude".into()], Path::new("/tmp"), CreateOptions::default())
            .await
            .unwrap();
        reg.update_status(&b.id, AgentStatus::Done, None);

        let removed = reg.purge(false).await;
        assert_eq!(removed, 1);
        assert!(reg.get(&a.id).is_none());
        assert!(reg.get(&b.id).is_some());

        let removed = reg.purge(true).await;
        assert_eq!(removed, 1);
        assert!(reg.get(&b.id).is_none());
    }

    #[tokio::test]
    async fn purge_terminated_older_than_respects_horizon() {
        let reg = registry();
        let a = reg
            .create("a", vec!["claude".into()], Path::new("/tmp"), CreateOptions::default())
            .await
            .unwrap();
        reg.terminate(&a.id, false).await.unwrap();

        let removed = reg.purge_terminated_older_than(24.0, now_unix()).await;
        assert_eq!(removed, 0, "freshly terminated session is within the retention horizon");
        assert!(reg.get(&a.id).is_some());

        let removed = reg.purge_terminated_older_than(0.0, now_unix() + 1.0).await;
        assert_eq!(removed, 1);
        assert!(reg.get(&a.id).is_none());
    }

    #[tokio::test]
    async fn list_visible_honors_filter() {
        let reg = registry();
        let a = reg
            .create("a", vec!["claude".into()], Path::new("/tmp"), CreateOptions::default())
            .await
            .unwrap();
        reg.terminate(&a.id, false).await.unwrap();
        reg.create("b", vec!["claude".into()], Path::new("/tmp"), CreateOptions::default())
            .await
            .unwrap();

        let visible = reg.list_visible(&VisibleFilter::default());
        assert_eq!(visible.len(), 1);

        let with_terminated = reg.list_visible(&VisibleFilter { include_terminated: true, ..Default::default() });
        assert_eq!(with_terminated.len(), 2);
    }
}
