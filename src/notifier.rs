//! macOS attention-bell notifier, grounded on the original presence
//! notifier's coalescing behavior. A no-op on every other platform.

use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    Off,
    Sound,
    Banner,
    Both,
}

/// Coalesces repeated attention requests within a window into a single
/// notification, and pluralizes the message for multiple agents.
pub struct Notifier {
    mode: NotifyMode,
    coalesce_window_s: f64,
    last_fired: Mutex<Option<f64>>,
}

impl Notifier {
    pub fn new(mode: NotifyMode, coalesce_window_s: f64) -> Self {
        Notifier {
            mode,
            coalesce_window_s,
            last_fired: Mutex::new(None),
        }
    }

    fn message_for(names: &[String]) -> String {
        match names.len() {
            0 => String::new(),
            1 => format!("{} is waiting for you", names[0]),
            n => format!("{} agents are waiting for you: {}", n, names.join(", ")),
        }
    }

    /// Fires a notification for the given waiting-agent names, unless a
    /// notification already fired within the coalescing window.
    pub async fn notify_waiting(&self, names: &[String], now: f64) {
        if self.mode == NotifyMode::Off || names.is_empty() {
            return;
        }
        let mut last = self.last_fired.lock().await;
        if let Some(prev) = *last {
            if now - prev < self.coalesce_window_s {
                return;
            }
        }
        *last = Some(now);
        let message = Self::message_for(names);
        fire(self.mode, &message).await;
    }
}

#[cfg(target_os = "macos")]
async fn fire(mode: NotifyMode, message: &str) {
    let script = format!(r#"display notification "{message}" with title "Overcode""#, message = message.replace('"', "'"));
    if matches!(mode, NotifyMode::Banner | NotifyMode::Both) {
        let _ = tokio::process::Command::new("osascript").arg("-e").arg(&script).status().await;
    }
    if matches!(mode, NotifyMode::Sound | NotifyMode::Both) {
        let _ = tokio::process::Command::new("afplay")
            .arg("/System/Library/Sounds/Ping.aiff")
            .status()
            .await;
    }
}

#[cfg(not(target_os = "macos"))]
async fn fire(_mode: NotifyMode, _message: &str) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn off_mode_never_fires() {
        let n = Notifier::new(NotifyMode::Off, 30.0);
        n.notify_waiting(&["acme".to_string()], 0.0).await;
    }

    #[tokio::test]
    async fn coalesces_within_window() {
        let n = Notifier::new(NotifyMode::Sound, 30.0);
        n.notify_waiting(&["a".to_string()], 0.0).await;
        *n.last_fired.lock().await = Some(0.0);
        n.notify_waiting(&["b".to_string()], 10.0).await;
        assert_eq!(*n.last_fired.lock().await, Some(0.0));
        n.notify_waiting(&["c".to_string()], 40.0).await;
        assert_eq!(*n.last_fired.lock().await, Some(40.0));
    }

    #[test]
    fn message_pluralizes() {
        assert_eq!(Notifier::message_for(&["acme".to_string()]), "acme is waiting for you");
        assert_eq!(
            Notifier::message_for(&["a".to_string(), "b".to_string()]),
            "2 agents are waiting for you: a, b"
        );
    }
}
