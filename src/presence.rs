//! Presence signal reader (§6.6). An external collaborator writes
//! `presence_log.csv`; this crate only ever reads the most recent row.

use crate::state_dir::StateDir;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    LockedOrSleep,
    Inactive,
    Active,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Presence {
    pub state: PresenceState,
    pub idle_seconds: f64,
    pub locked: bool,
    pub inferred_sleep: bool,
}

impl Presence {
    pub fn unknown() -> Self {
        Presence {
            state: PresenceState::Unknown,
            idle_seconds: 0.0,
            locked: false,
            inferred_sleep: false,
        }
    }
}

fn parse_row(line: &str) -> Option<(DateTime<Utc>, Presence)> {
    let mut fields = line.splitn(5, ',');
    let ts = fields.next()?;
    let state = fields.next()?;
    let idle = fields.next()?;
    let locked = fields.next()?;
    let inferred_sleep = fields.next()?;

    let timestamp = DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc);
    let state = match state.trim() {
        "1" => PresenceState::LockedOrSleep,
        "2" => PresenceState::Inactive,
        "3" => PresenceState::Active,
        _ => return None,
    };
    Some((
        timestamp,
        Presence {
            state,
            idle_seconds: idle.trim().parse().ok()?,
            locked: locked.trim() == "1" || locked.trim().eq_ignore_ascii_case("true"),
            inferred_sleep: inferred_sleep.trim() == "1" || inferred_sleep.trim().eq_ignore_ascii_case("true"),
        },
    ))
}

/// Reads the most recent row of `presence_log.csv`. Returns `Unknown`
/// if the file is absent or its latest row is older than
/// `2 * tick_interval_s`.
pub async fn read_presence(state_dir: &StateDir, tick_interval_s: u64) -> Presence {
    let path = state_dir.presence_log_csv();
    let Ok(contents) = tokio::fs::read_to_string(&path).await else {
        return Presence::unknown();
    };
    let Some((timestamp, presence)) = contents.lines().filter_map(parse_row).last() else {
        return Presence::unknown();
    };
    let age = (Utc::now() - timestamp).num_seconds();
    if age > (2 * tick_interval_s) as i64 {
        return Presence::unknown();
    }
    presence
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_unknown() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = StateDir::new(tmp.path(), "agents");
        let p = read_presence(&dir, 5).await;
        assert_eq!(p.state, PresenceState::Unknown);
    }

    #[tokio::test]
    async fn fresh_row_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = StateDir::new(tmp.path(), "agents");
        dir.ensure().await.unwrap();
        let now = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        tokio::fs::write(dir.presence_log_csv(), format!("{now},3,12,0,0\n")).await.unwrap();
        let p = read_presence(&dir, 5).await;
        assert_eq!(p.state, PresenceState::Active);
        assert_eq!(p.idle_seconds, 12.0);
    }

    #[tokio::test]
    async fn stale_row_is_unknown() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = StateDir::new(tmp.path(), "agents");
        dir.ensure().await.unwrap();
        let old = (Utc::now() - chrono::Duration::seconds(3600)).to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        tokio::fs::write(dir.presence_log_csv(), format!("{old},3,12,0,0\n")).await.unwrap();
        let p = read_presence(&dir, 5).await;
        assert_eq!(p.state, PresenceState::Unknown);
    }
}
