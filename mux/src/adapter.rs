use async_trait::async_trait;
use std::path::Path;

/// Opaque handle to a multiplexer window. Callers must not parse it.
pub type WindowHandle = String;

/// Listing entry returned by [`MultiplexerAdapter::list_windows`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error("multiplexer group '{0}' not found")]
    GroupNotFound(String),
    #[error("window '{0}' not found")]
    WindowNotFound(String),
    #[error("multiplexer command timed out")]
    Timeout,
    #[error("multiplexer command failed: {0}")]
    CommandFailed(String),
    #[error("multiplexer binary not found on PATH")]
    NotInstalled,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The only surface the core engine uses to talk to a terminal multiplexer.
///
/// Every method carries its own timeout internally (§5): a timeout must
/// surface as [`MuxError::Timeout`] (or `None` for `capture_pane`), never
/// as a panic or an unhandled failure. Implementations must not pre-split
/// `text` passed to `send_text` on newlines — the agent CLI running inside
/// the window interprets embedded newlines itself.
#[async_trait]
pub trait MultiplexerAdapter: Send + Sync {
    /// Creates a new window within `group`, starting in `working_dir`.
    async fn new_window(
        &self,
        group: &str,
        name: &str,
        working_dir: &Path,
    ) -> Result<WindowHandle, MuxError>;

    /// Kills a window. Returns `Ok(())` if killed, `Err(WindowNotFound)` if
    /// it no longer exists — never treated as fatal by callers.
    async fn kill_window(&self, group: &str, handle: &WindowHandle) -> Result<(), MuxError>;

    /// Lists all windows currently open in `group`.
    async fn list_windows(&self, group: &str) -> Result<Vec<WindowInfo>, MuxError>;

    /// Captures the last `max_lines` lines of a window's pane, ANSI
    /// sequences stripped, blank lines preserved. Returns `None` on
    /// timeout or if the window is gone — never an error.
    async fn capture_pane(&self, group: &str, handle: &WindowHandle, max_lines: usize) -> Option<String>;

    /// Sends literal text to the window, optionally followed by Enter.
    async fn send_text(
        &self,
        group: &str,
        handle: &WindowHandle,
        text: &str,
        press_enter: bool,
    ) -> Result<(), MuxError>;

    /// Sends a single named key (e.g. `"Enter"`, `"C-c"`, `"Escape"`).
    async fn send_key(&self, group: &str, handle: &WindowHandle, named_key: &str) -> Result<(), MuxError>;
}
