use std::path::{Path, PathBuf};

/// Path helpers for the §6.1 state directory layout. One instance per
/// multiplexer group.
#[derive(Debug, Clone)]
pub struct StateDir {
    group_dir: PathBuf,
}

impl StateDir {
    pub fn new(state_dir: &Path, multiplexer_group: &str) -> Self {
        StateDir {
            group_dir: state_dir.join(multiplexer_group),
        }
    }

    pub fn root(&self) -> &Path {
        &self.group_dir
    }

    pub fn sessions_json(&self) -> PathBuf {
        self.group_dir.join("sessions.json")
    }

    pub fn monitor_daemon_state_json(&self) -> PathBuf {
        self.group_dir.join("monitor_daemon_state.json")
    }

    pub fn monitor_daemon_pid(&self) -> PathBuf {
        self.group_dir.join("monitor_daemon.pid")
    }

    pub fn supervisor_daemon_pid(&self) -> PathBuf {
        self.group_dir.join("supervisor_daemon.pid")
    }

    pub fn web_server_pid(&self) -> PathBuf {
        self.group_dir.join("web_server.pid")
    }

    pub fn web_server_port(&self) -> PathBuf {
        self.group_dir.join("web_server.port")
    }

    pub fn hook_state(&self, session_name: &str) -> PathBuf {
        self.group_dir.join(format!("hook_state_{session_name}.json"))
    }

    pub fn heartbeat_last(&self, session_name: &str) -> PathBuf {
        self.group_dir.join(format!("heartbeat_{session_name}.last"))
    }

    pub fn status_history_csv(&self) -> PathBuf {
        self.group_dir.join("status_history.csv")
    }

    pub fn monitor_daemon_log(&self) -> PathBuf {
        self.group_dir.join("monitor_daemon.log")
    }

    pub fn supervisor_daemon_log(&self) -> PathBuf {
        self.group_dir.join("supervisor_daemon.log")
    }

    pub fn presence_log_csv(&self) -> PathBuf {
        self.group_dir.join("presence_log.csv")
    }

    /// Ensures the group directory exists.
    pub async fn ensure(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.group_dir).await
    }
}

/// Writes `contents` to `path` atomically: write to a sibling temp file,
/// then rename over the destination (invariant 6). The rename is atomic
/// on POSIX filesystems within the same directory.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = dir.join(format!(".{file_name}.tmp-{}", std::process::id()));
    tokio::fs::write(&tmp_path, contents).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}
