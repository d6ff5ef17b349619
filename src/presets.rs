//! Standing-orders presets (§6.3): a closed, case-insensitive set of
//! named instruction blocks the Supervisor Loop includes verbatim in a
//! remediation agent's context.

/// The closed preset name set, in the order spec §6.3 lists them.
pub const PRESET_NAMES: [&str; 11] = [
    "DO_NOTHING",
    "STANDARD",
    "PERMISSIVE",
    "CAUTIOUS",
    "RESEARCH",
    "CODING",
    "TESTING",
    "REVIEW",
    "DEPLOY",
    "AUTONOMOUS",
    "MINIMAL",
];

fn preset_text(name: &str) -> Option<&'static str> {
    match name {
        "DO_NOTHING" => Some(
            "Do not intervene with this agent under any circumstances. \
             It is intentionally idle or paused; leave it alone.",
        ),
        "STANDARD" => Some(
            "Check on this agent's progress. If it is stuck waiting on a \
             question you can answer from the repository and its own prior \
             output, answer it and let it continue. Otherwise, leave a \
             short status note and move on.",
        ),
        "PERMISSIVE" => Some(
            "Approve reasonable tool-use and confirmation prompts on this \
             agent's behalf so it can keep making progress. Avoid approving \
             anything destructive or irreversible without a clear reason \
             stated in its own output.",
        ),
        "CAUTIOUS" => Some(
            "Only intervene to unblock a confirmation prompt if the action \
             being confirmed is clearly safe and reversible. For anything \
             ambiguous, leave the agent waiting and note why.",
        ),
        "RESEARCH" => Some(
            "This agent is doing open-ended investigation. Nudge it forward \
             with clarifying direction if it stalls, but do not approve \
             destructive actions on its behalf.",
        ),
        "CODING" => Some(
            "This agent is implementing a change. Unblock routine tool \
             approvals (file edits, test runs) so it can keep working. Flag \
             anything that touches infrastructure or credentials instead of \
             approving it.",
        ),
        "TESTING" => Some(
            "This agent is writing or running tests. Approve test execution \
             and routine file edits. Do not approve destructive commands \
             outside the test working directory.",
        ),
        "REVIEW" => Some(
            "This agent is reviewing code. It should not need write \
             approvals; if it is stuck, it's more likely waiting on a \
             question — answer from context if you can.",
        ),
        "DEPLOY" => Some(
            "This agent is performing a deployment. Do not approve any \
             prompt on its behalf; deployments require an explicit human \
             decision. Wake a human if it is blocked.",
        ),
        "AUTONOMOUS" => Some(
            "This agent has broad latitude. Approve routine confirmations \
             so it keeps moving, and only leave it waiting for genuinely \
             irreversible or out-of-scope actions.",
        ),
        "MINIMAL" => Some(
            "Only answer direct questions this agent asks. Do not approve \
             tool-use prompts or take any other action on its behalf.",
        ),
        _ => None,
    }
}

/// `resolve(input)`: if `input` (uppercased) names a preset, returns its
/// text and name; otherwise returns `input` unchanged with no preset
/// name (testable property 5).
pub fn resolve(input: &str) -> (String, Option<&'static str>) {
    let upper = input.trim().to_uppercase();
    if let Some(name) = PRESET_NAMES.iter().find(|n| **n == upper) {
        (preset_text(name).unwrap().to_string(), Some(*name))
    } else {
        (input.to_string(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_case_insensitive() {
        let (text_upper, name_upper) = resolve("STANDARD");
        let (text_lower, name_lower) = resolve("standard");
        assert_eq!(text_upper, text_lower);
        assert_eq!(name_upper, name_lower);
        assert_eq!(name_upper, Some("STANDARD"));
    }

    #[test]
    fn resolve_passes_through_arbitrary_text() {
        let (text, name) = resolve("look after the tests directory only");
        assert_eq!(text, "look after the tests directory only");
        assert_eq!(name, None);
    }

    #[test]
    fn every_preset_name_resolves() {
        for name in PRESET_NAMES {
            let (_, resolved) = resolve(name);
            assert_eq!(resolved, Some(name));
        }
    }
}
