use crate::adapter::{MultiplexerAdapter, MuxError, WindowHandle, WindowInfo};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const OP_TIMEOUT: Duration = Duration::from_secs(5);

/// `MultiplexerAdapter` backed by a real `tmux` binary on `PATH`.
///
/// One multiplexer group is one tmux session; each agent window is a tmux
/// window within that session. Adapted from the synchronous
/// `TmuxClient` the teacher used for single-session control, generalized
/// to the group/window split this engine needs and made fully async so it
/// composes with the monitor loop's tick without blocking a worker thread.
pub struct TmuxAdapter {
    tmux_bin: String,
}

impl TmuxAdapter {
    /// Probes for a working `tmux` binary. Does not create any sessions.
    pub async fn new() -> Result<Self, MuxError> {
        Self::with_binary("tmux").await
    }

    pub async fn with_binary(tmux_bin: impl Into<String>) -> Result<Self, MuxError> {
        let tmux_bin = tmux_bin.into();
        let status = Command::new(&tmux_bin)
            .arg("-V")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|_| MuxError::NotInstalled)?;
        if !status.success() {
            return Err(MuxError::NotInstalled);
        }
        Ok(Self { tmux_bin })
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, MuxError> {
        let fut = Command::new(&self.tmux_bin).args(args).output();
        let output = tokio::time::timeout(OP_TIMEOUT, fut)
            .await
            .map_err(|_| MuxError::Timeout)??;
        Ok(output)
    }

    async fn ensure_group(&self, group: &str) -> Result<(), MuxError> {
        let has = self.run(&["has-session", "-t", group]).await;
        match has {
            Ok(output) if output.status.success() => Ok(()),
            _ => {
                let output = self
                    .run(&["new-session", "-d", "-s", group])
                    .await?;
                if output.status.success() {
                    Ok(())
                } else {
                    Err(MuxError::CommandFailed(
                        String::from_utf8_lossy(&output.stderr).into_owned(),
                    ))
                }
            }
        }
    }
}

#[async_trait]
impl MultiplexerAdapter for TmuxAdapter {
    async fn new_window(
        &self,
        group: &str,
        name: &str,
        working_dir: &Path,
    ) -> Result<WindowHandle, MuxError> {
        self.ensure_group(group).await?;
        let dir = working_dir.to_string_lossy();
        let target = format!("{group}:");
        let output = self
            .run(&[
                "new-window",
                "-t",
                &target,
                "-n",
                name,
                "-c",
                &dir,
                "-P",
                "-F",
                "#{window_id}",
            ])
            .await?;
        if !output.status.success() {
            return Err(MuxError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn kill_window(&self, group: &str, handle: &WindowHandle) -> Result<(), MuxError> {
        let target = format!("{group}:{handle}");
        let output = self.run(&["kill-window", "-t", &target]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(MuxError::WindowNotFound(handle.clone()))
        }
    }

    async fn list_windows(&self, group: &str) -> Result<Vec<WindowInfo>, MuxError> {
        let output = self
            .run(&[
                "list-windows",
                "-t",
                group,
                "-F",
                "#{window_id}|#{window_name}",
            ])
            .await?;
        if !output.status.success() {
            return Err(MuxError::GroupNotFound(group.to_string()));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text
            .lines()
            .filter_map(|line| {
                let (handle, name) = line.split_once('|')?;
                Some(WindowInfo {
                    handle: handle.to_string(),
                    name: name.to_string(),
                })
            })
            .collect())
    }

    async fn capture_pane(&self, group: &str, handle: &WindowHandle, max_lines: usize) -> Option<String> {
        let target = format!("{group}:{handle}");
        let start_line = format!("-{max_lines}");
        let output = self
            .run(&["capture-pane", "-t", &target, "-p", "-S", &start_line])
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        Some(strip_ansi(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn send_text(
        &self,
        group: &str,
        handle: &WindowHandle,
        text: &str,
        press_enter: bool,
    ) -> Result<(), MuxError> {
        let target = format!("{group}:{handle}");
        let output = self.run(&["send-keys", "-t", &target, "-l", text]).await?;
        if !output.status.success() {
            return Err(MuxError::WindowNotFound(handle.clone()));
        }
        if press_enter {
            self.send_key(group, handle, "Enter").await?;
        }
        Ok(())
    }

    async fn send_key(&self, group: &str, handle: &WindowHandle, named_key: &str) -> Result<(), MuxError> {
        let target = format!("{group}:{handle}");
        let output = self.run(&["send-keys", "-t", &target, named_key]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(MuxError::WindowNotFound(handle.clone()))
        }
    }
}

/// Strips ANSI CSI/OSC escape sequences from captured pane text.
fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            match chars.peek() {
                Some('[') => {
                    chars.next();
                    for c in chars.by_ref() {
                        if c.is_ascii_alphabetic() {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    for c in chars.by_ref() {
                        if c == '\u{7}' || c == '\u{1b}' {
                            break;
                        }
                    }
                }
                _ => {}
            }
            continue;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_csi_sequences() {
        let input = "\u{1b}[31mred\u{1b}[0m plain";
        assert_eq!(strip_ansi(input), "red plain");
    }

    #[test]
    fn preserves_blank_lines() {
        let input = "a\n\nb";
        assert_eq!(strip_ansi(input), "a\n\nb");
    }
}
