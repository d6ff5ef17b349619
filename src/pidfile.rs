//! PID file exclusive-lock semantics (§5): acquiring the lock is atomic
//! with writing the PID, and stale PIDs (no such process) are silently
//! reclaimed.

use crate::error::OvercodeError;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
fn process_is_alive(pid: i32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    // Signal 0: no signal is sent, just existence/permission is checked.
    kill(Pid::from_raw(pid), None).is_ok()
}

#[cfg(not(unix))]
fn process_is_alive(_pid: i32) -> bool {
    // No portable liveness check off Unix; treat any existing PID file
    // as held to err on the side of refusing a second instance.
    true
}

/// An acquired, exclusively-held PID file. Dropping it (or calling
/// `release`) removes the file.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Acquires the PID file at `path`, reclaiming it if the recorded
    /// PID no longer corresponds to a live process. Returns `Conflict`
    /// if a live process already holds it.
    pub fn acquire(path: &Path) -> Result<Self, OvercodeError> {
        match Self::try_create(path) {
            Ok(()) => return Ok(PidFile { path: path.to_path_buf() }),
            Err(e) if e.kind() != ErrorKind::AlreadyExists => {
                return Err(OvercodeError::Fatal(format!("cannot create pid file {}: {e}", path.display())));
            }
            Err(_) => {}
        }

        let existing = std::fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse::<i32>().ok());

        match existing {
            Some(pid) if process_is_alive(pid) => Err(OvercodeError::Conflict(format!(
                "pid file {} is held by live process {pid}",
                path.display()
            ))),
            _ => {
                // Stale: no parseable PID, or the process is gone. Reclaim.
                std::fs::remove_file(path).ok();
                Self::try_create(path)
                    .map_err(|e| OvercodeError::Fatal(format!("cannot reclaim pid file {}: {e}", path.display())))?;
                Ok(PidFile { path: path.to_path_buf() })
            }
        }
    }

    fn try_create(path: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        write!(file, "{}", std::process::id())?;
        Ok(())
    }

    pub fn release(self) {
        std::fs::remove_file(&self.path).ok();
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        std::fs::remove_file(&self.path).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_conflict_on_second_attempt_while_held() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("daemon.pid");
        let first = PidFile::acquire(&path).unwrap();
        // Our own PID is alive, so a second acquire attempt must conflict.
        let err = PidFile::acquire(&path).unwrap_err();
        assert!(matches!(err, OvercodeError::Conflict(_)));
        first.release();
    }

    #[test]
    fn reclaims_stale_pid() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("daemon.pid");
        std::fs::write(&path, "999999999").unwrap();
        let acquired = PidFile::acquire(&path).unwrap();
        acquired.release();
    }

    #[test]
    fn reclaims_garbage_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("daemon.pid");
        std::fs::write(&path, "not-a-pid").unwrap();
        let acquired = PidFile::acquire(&path).unwrap();
        acquired.release();
    }

    #[test]
    fn release_removes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("daemon.pid");
        let pid_file = PidFile::acquire(&path).unwrap();
        pid_file.release();
        assert!(!path.exists());
    }
}
