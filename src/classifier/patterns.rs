//! Pattern tables consumed by the polling strategy (§4.2).

use regex::Regex;
use std::sync::OnceLock;

pub struct StatusPatterns {
    pub permission_header: Regex,
    pub confirmation_tokens: Regex,
    pub bare_prompt: Regex,
    pub active_indicators: Vec<&'static str>,
    pub active_indicators_with_paren: Vec<&'static str>,
    pub slash_command_line: Regex,
    pub status_bar_prefix: &'static str,
    pub background_bash_count: Regex,
}

pub fn default_patterns() -> &'static StatusPatterns {
    static PATTERNS: OnceLock<StatusPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| StatusPatterns {
        permission_header: Regex::new(r"(?i)do you want to proceed\?").unwrap(),
        confirmation_tokens: Regex::new(r"(?i)^\s*(\[y/n\]|\(y/n\)|press enter to confirm)\s*$").unwrap(),
        bare_prompt: Regex::new(r"^\s*[>›]\s*$").unwrap(),
        active_indicators: vec!["thinking", "working", "processing", "✽"],
        active_indicators_with_paren: vec!["Reading", "Writing", "Editing", "Searching", "Bash", "Task"],
        slash_command_line: Regex::new(r"^\s{2}/[A-Za-z][\w-]*\s{2,}\S").unwrap(),
        status_bar_prefix: "⏵⏵",
        background_bash_count: Regex::new(r"(\d+)\s+bash(es)?").unwrap(),
    })
}

/// True if any pattern in `candidates` appears, case-insensitively, in
/// `line`.
pub fn matches_any(line: &str, candidates: &[&str]) -> bool {
    let lower = line.to_lowercase();
    candidates.iter().any(|c| lower.contains(&c.to_lowercase()))
}

/// Finds the first line (searching from the end) satisfying `pred`.
pub fn find_matching_line<'a>(lines: &[&'a str], pred: impl Fn(&str) -> bool) -> Option<&'a str> {
    lines.iter().rev().find(|l| pred(l)).copied()
}

/// Strips common prefixes (`>`, `›`, `-`, `•`) and truncates to 80
/// graphemes (approximated here as chars, since the pane text this
/// crate handles is ASCII/Latin terminal output).
pub fn clean_activity_line(line: &str) -> String {
    let trimmed = line.trim();
    let stripped = trimmed
        .strip_prefix('>')
        .or_else(|| trimmed.strip_prefix('›'))
        .or_else(|| trimmed.strip_prefix('-'))
        .or_else(|| trimmed.strip_prefix('•'))
        .unwrap_or(trimmed)
        .trim();
    stripped.chars().take(80).collect()
}

/// Extracts the background-bash count from a status bar line
/// (recognised by a leading `⏵⏵`), if present.
pub fn extract_background_bash_count(line: &str) -> Option<u32> {
    let patterns = default_patterns();
    if !line.trim_start().starts_with(patterns.status_bar_prefix) {
        return None;
    }
    patterns
        .background_bash_count
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_any_is_case_insensitive() {
        assert!(matches_any("Thinking about it", &["thinking"]));
        assert!(!matches_any("idle", &["thinking"]));
    }

    #[test]
    fn clean_activity_line_strips_prefixes_and_truncates() {
        assert_eq!(clean_activity_line("> hello"), "hello");
        assert_eq!(clean_activity_line("• bullet"), "bullet");
        let long = "a".repeat(200);
        assert_eq!(clean_activity_line(&long).chars().count(), 80);
    }

    #[test]
    fn extracts_background_bash_count() {
        let line = "⏵⏵ 3 bashes running";
        assert_eq!(extract_background_bash_count(line), Some(3));
        assert_eq!(extract_background_bash_count("no prefix here"), None);
    }
}
