//! Status Classifier (§4.2): a pure mapping from pane text (or hook
//! state) to `(AgentStatus, activity_summary)`. Neither strategy
//! suspends or touches the filesystem itself — callers read the pane
//! text / hook-state file and pass it in.

pub mod patterns;

use crate::registry::AgentStatus;
use patterns::{clean_activity_line, default_patterns, find_matching_line, matches_any};

/// Hook events recognised by the hook strategy (§4.7's event set, minus
/// the receiver-only bookkeeping).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    UserPromptSubmit,
    PostToolUse,
    Stop,
    PermissionRequest,
    SessionEnd,
}

/// Everything the polling strategy needs besides the pane text itself.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierConfig {
    pub prev_status: AgentStatus,
    /// Seconds since the classifier last ran for this session.
    pub seconds_since_last_tick: f64,
    /// Staleness horizon (§4.2 precedence 6, default 10s).
    pub staleness_s: f64,
}

/// `Stop -> waiting_user`, `PermissionRequest -> waiting_approval`,
/// `SessionEnd -> terminated`, `UserPromptSubmit`/`PostToolUse -> running`.
pub fn classify_hook(event: HookEvent) -> AgentStatus {
    match event {
        HookEvent::Stop => AgentStatus::WaitingUser,
        HookEvent::PermissionRequest => AgentStatus::WaitingApproval,
        HookEvent::SessionEnd => AgentStatus::Terminated,
        HookEvent::UserPromptSubmit | HookEvent::PostToolUse => AgentStatus::Running,
    }
}

/// Polling strategy: scans the last N captured lines per the §4.2
/// pattern table, evaluated top-to-bottom, first match wins.
///
/// Returns `(status, activity)` where `activity` is `None` for
/// precedence class 6 ("otherwise") — the caller keeps whatever
/// `activity_summary` it already had, since nothing new was observed.
pub fn classify_polling(lines: &[&str], config: &ClassifierConfig) -> (AgentStatus, Option<String>) {
    let p = default_patterns();

    // 1. Permission menu header.
    if let Some(line) = find_matching_line(lines, |l| p.permission_header.is_match(l)) {
        return (AgentStatus::WaitingApproval, Some(clean_activity_line(line)));
    }

    // 2. Short confirmation token line.
    if let Some(line) = find_matching_line(lines, |l| p.confirmation_tokens.is_match(l)) {
        return (AgentStatus::WaitingApproval, Some(clean_activity_line(line)));
    }

    // 3. Bare prompt line (only non-whitespace content is `>` or `›`).
    if let Some(line) = find_matching_line(lines, |l| p.bare_prompt.is_match(l)) {
        return (AgentStatus::WaitingUser, Some(clean_activity_line(line)));
    }

    // 4. Active indicator token, or a capitalized tool-call verb
    //    immediately followed by `(`.
    if let Some(line) = find_matching_line(lines, |l| {
        matches_any(l, &p.active_indicators)
            || p.active_indicators_with_paren
                .iter()
                .any(|verb| l.contains(&format!("{verb}(")))
    }) {
        return (AgentStatus::Running, Some(clean_activity_line(line)));
    }

    // 5. Slash-command menu: at least 3 lines matching `  /ident   desc`.
    let slash_lines = lines.iter().filter(|l| p.slash_command_line.is_match(l)).count();
    if slash_lines >= 3 {
        if let Some(line) = find_matching_line(lines, |l| p.slash_command_line.is_match(l)) {
            return (AgentStatus::WaitingUser, Some(clean_activity_line(line)));
        }
    }

    // 6. Otherwise: previous status survives until the staleness
    //    horizon, then degrades to waiting_user.
    if config.seconds_since_last_tick <= config.staleness_s {
        (config.prev_status, None)
    } else {
        (AgentStatus::WaitingUser, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ClassifierConfig {
        ClassifierConfig {
            prev_status: AgentStatus::Running,
            seconds_since_last_tick: 0.0,
            staleness_s: 10.0,
        }
    }

    /// E1 — Classifier: permission prompt.
    #[test]
    fn e1_permission_prompt() {
        let lines = vec![
            "  Bash(rm -rf /tmp/test)",
            "  Do you want to proceed?",
            "  ❯ 1. Yes",
            "    2. Yes, and don't ask again",
            "    3. No, and tell Claude what to do differently (esc)",
        ];
        let (status, activity) = classify_polling(&lines, &cfg());
        assert_eq!(status, AgentStatus::WaitingApproval);
        assert_eq!(activity.as_deref(), Some("Do you want to proceed?"));
    }

    /// E2 — Classifier: bare prompt after banner.
    #[test]
    fn e2_bare_prompt() {
        let lines = vec!["Welcome to Claude Code", "────────────────────────", ">"];
        let (status, activity) = classify_polling(&lines, &cfg());
        assert_eq!(status, AgentStatus::WaitingUser);
        assert_eq!(activity.as_deref(), Some(""));
    }

    #[test]
    fn active_indicator_wins_over_stale_fallback() {
        let lines = vec!["✽ thinking through the approach"];
        let (status, activity) = classify_polling(&lines, &cfg());
        assert_eq!(status, AgentStatus::Running);
        assert_eq!(activity.as_deref(), Some("✽ thinking through the approach"));
    }

    #[test]
    fn tool_call_verb_with_paren_is_running() {
        let lines = vec!["Reading(src/main.rs)"];
        let (status, _) = classify_polling(&lines, &cfg());
        assert_eq!(status, AgentStatus::Running);
    }

    #[test]
    fn slash_menu_requires_at_least_three_lines() {
        let two_lines = vec!["  /help   show help", "  /quit   exit"];
        let (status, _) = classify_polling(&two_lines, &cfg());
        assert_eq!(status, AgentStatus::Running);

        let three_lines = vec!["  /help   show help", "  /quit   exit", "  /reset  clear context"];
        let (status3, activity) = classify_polling(&three_lines, &cfg());
        assert_eq!(status3, AgentStatus::WaitingUser);
        assert!(activity.is_some());
    }

    #[test]
    fn otherwise_survives_until_staleness_horizon() {
        let lines: Vec<&str> = vec!["nothing recognisable here"];
        let fresh = ClassifierConfig { seconds_since_last_tick: 5.0, ..cfg() };
        let (status, activity) = classify_polling(&lines, &fresh);
        assert_eq!(status, AgentStatus::Running);
        assert!(activity.is_none());

        let stale = ClassifierConfig { seconds_since_last_tick: 11.0, ..cfg() };
        let (status, _) = classify_polling(&lines, &stale);
        assert_eq!(status, AgentStatus::WaitingUser);
    }

    #[test]
    fn idempotent_on_unchanged_pane_text() {
        let lines = vec!["  Do you want to proceed?", "  ❯ 1. Yes"];
        let (s1, a1) = classify_polling(&lines, &cfg());
        let (s2, a2) = classify_polling(&lines, &cfg());
        assert_eq!(s1, s2);
        assert_eq!(a1, a2);
    }

    #[test]
    fn hook_event_mapping() {
        assert_eq!(classify_hook(HookEvent::Stop), AgentStatus::WaitingUser);
        assert_eq!(classify_hook(HookEvent::PermissionRequest), AgentStatus::WaitingApproval);
        assert_eq!(classify_hook(HookEvent::SessionEnd), AgentStatus::Terminated);
        assert_eq!(classify_hook(HookEvent::UserPromptSubmit), AgentStatus::Running);
        assert_eq!(classify_hook(HookEvent::PostToolUse), AgentStatus::Running);
    }
}
