use crate::adapter::{MultiplexerAdapter, MuxError, WindowHandle, WindowInfo};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Records of calls made against an [`InMemoryAdapter`], for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    NewWindow { group: String, name: String, working_dir: PathBuf },
    KillWindow { group: String, handle: WindowHandle },
    SendText { group: String, handle: WindowHandle, text: String, press_enter: bool },
    SendKey { group: String, handle: WindowHandle, key: String },
}

struct Window {
    name: String,
    pane: Vec<String>,
}

/// In-memory fake of [`MultiplexerAdapter`] for unit and integration tests.
///
/// Panes are seeded with [`InMemoryAdapter::set_pane`] and calls are
/// recorded so supervisor/monitor tests can assert on what was sent to
/// which window without shelling out to a real multiplexer.
#[derive(Default)]
pub struct InMemoryAdapter {
    groups: Mutex<HashMap<String, HashMap<WindowHandle, Window>>>,
    calls: Mutex<Vec<RecordedCall>>,
    next_handle: Mutex<u64>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Seeds (or replaces) the pane contents for a window, creating the
    /// window if it doesn't exist yet.
    pub fn set_pane(&self, group: &str, handle: &str, name: &str, lines: Vec<String>) {
        let mut groups = self.groups.lock().unwrap();
        let windows = groups.entry(group.to_string()).or_default();
        windows.insert(
            handle.to_string(),
            Window { name: name.to_string(), pane: lines },
        );
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MultiplexerAdapter for InMemoryAdapter {
    async fn new_window(&self, group: &str, name: &str, working_dir: &Path) -> Result<WindowHandle, MuxError> {
        self.record(RecordedCall::NewWindow {
            group: group.to_string(),
            name: name.to_string(),
            working_dir: working_dir.to_path_buf(),
        });
        let mut next = self.next_handle.lock().unwrap();
        *next += 1;
        let handle = format!("@{next}");
        let mut groups = self.groups.lock().unwrap();
        groups.entry(group.to_string()).or_default().insert(
            handle.clone(),
            Window { name: name.to_string(), pane: Vec::new() },
        );
        Ok(handle)
    }

    async fn kill_window(&self, group: &str, handle: &WindowHandle) -> Result<(), MuxError> {
        self.record(RecordedCall::KillWindow { group: group.to_string(), handle: handle.clone() });
        let mut groups = self.groups.lock().unwrap();
        match groups.get_mut(group).and_then(|w| w.remove(handle)) {
            Some(_) => Ok(()),
            None => Err(MuxError::WindowNotFound(handle.clone())),
        }
    }

    async fn list_windows(&self, group: &str) -> Result<Vec<WindowInfo>, MuxError> {
        let groups = self.groups.lock().unwrap();
        let windows = groups.get(group).ok_or_else(|| MuxError::GroupNotFound(group.to_string()))?;
        Ok(windows
            .iter()
            .map(|(handle, w)| WindowInfo { handle: handle.clone(), name: w.name.clone() })
            .collect())
    }

    async fn capture_pane(&self, group: &str, handle: &WindowHandle, max_lines: usize) -> Option<String> {
        let groups = self.groups.lock().unwrap();
        let window = groups.get(group)?.get(handle)?;
        let start = window.pane.len().saturating_sub(max_lines);
        Some(window.pane[start..].join("\n"))
    }

    async fn send_text(&self, group: &str, handle: &WindowHandle, text: &str, press_enter: bool) -> Result<(), MuxError> {
        self.record(RecordedCall::SendText {
            group: group.to_string(),
            handle: handle.clone(),
            text: text.to_string(),
            press_enter,
        });
        let mut groups = self.groups.lock().unwrap();
        let window = groups
            .get_mut(group)
            .and_then(|w| w.get_mut(handle))
            .ok_or_else(|| MuxError::WindowNotFound(handle.clone()))?;
        window.pane.push(text.to_string());
        Ok(())
    }

    async fn send_key(&self, group: &str, handle: &WindowHandle, key: &str) -> Result<(), MuxError> {
        self.record(RecordedCall::SendKey { group: group.to_string(), handle: handle.clone(), key: key.to_string() });
        let groups = self.groups.lock().unwrap();
        if groups.get(group).and_then(|w| w.get(handle)).is_some() {
            Ok(())
        } else {
            Err(MuxError::WindowNotFound(handle.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_send_text_calls() {
        let adapter = InMemoryAdapter::new();
        let handle = adapter.new_window("agents", "alpha", Path::new("/tmp")).await.unwrap();
        adapter.send_text("agents", &handle, "hello", true).await.unwrap();

        let calls = adapter.calls();
        assert!(matches!(&calls[1], RecordedCall::SendText { text, press_enter: true, .. } if text == "hello"));
    }

    #[tokio::test]
    async fn capture_pane_returns_seeded_lines() {
        let adapter = InMemoryAdapter::new();
        adapter.set_pane("agents", "@1", "alpha", vec!["a".into(), "b".into(), "c".into()]);
        let out = adapter.capture_pane("agents", &"@1".to_string(), 2).await.unwrap();
        assert_eq!(out, "b\nc");
    }

    #[tokio::test]
    async fn kill_missing_window_is_not_found() {
        let adapter = InMemoryAdapter::new();
        let err = adapter.kill_window("agents", &"@404".to_string()).await.unwrap_err();
        assert!(matches!(err, MuxError::WindowNotFound(_)));
    }
}
