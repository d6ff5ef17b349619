//! Status history log (§6.5): an append-only CSV with header
//! `timestamp,agent,status,activity`.

use crate::state_dir::StateDir;
use chrono::{DateTime, Utc};
use std::io::SeekFrom;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

const HEADER: &str = "timestamp,agent,status,activity";

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn truncate_activity(activity: &str) -> String {
    activity.chars().take(100).collect()
}

/// Appends one row. Creates the file with its header if absent.
pub async fn append_row(state_dir: &StateDir, timestamp: DateTime<Utc>, agent: &str, status: &str, activity: &str) -> std::io::Result<()> {
    let path = state_dir.status_history_csv();
    let exists = tokio::fs::metadata(&path).await.is_ok();

    let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
    if !exists {
        file.write_all(HEADER.as_bytes()).await?;
        file.write_all(b"\n").await?;
    }
    let row = format!(
        "{},{},{},{}\n",
        timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        csv_escape(agent),
        csv_escape(status),
        csv_escape(&truncate_activity(activity)),
    );
    file.write_all(row.as_bytes()).await?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub status: String,
    pub activity: String,
}

fn parse_line(line: &str) -> Option<HistoryRow> {
    let mut fields = line.splitn(4, ',');
    let ts = fields.next()?;
    let agent = fields.next()?;
    let status = fields.next()?;
    let activity = fields.next().unwrap_or("");
    let timestamp = DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc);
    Some(HistoryRow {
        timestamp,
        agent: agent.to_string(),
        status: status.to_string(),
        activity: activity.to_string(),
    })
}

/// Returns `(timestamp, status)` rows from the last `hours`, per agent.
/// Malformed rows are skipped silently (§6.5).
pub async fn read_tail(state_dir: &StateDir, hours: f64) -> std::io::Result<Vec<HistoryRow>> {
    let path = state_dir.status_history_csv();
    let Ok(contents) = tokio::fs::read_to_string(&path).await else {
        return Ok(Vec::new());
    };
    let cutoff = Utc::now() - chrono::Duration::seconds((hours * 3600.0) as i64);
    Ok(contents
        .lines()
        .skip(1) // header
        .filter_map(parse_line)
        .filter(|r| r.timestamp >= cutoff)
        .collect())
}

/// Idempotent: rewrites the file keeping only rows newer than `hours`
/// old. Rotation beyond this is the caller's responsibility.
pub async fn clear_older_than(state_dir: &StateDir, hours: f64) -> std::io::Result<()> {
    let path = state_dir.status_history_csv();
    let Ok(contents) = tokio::fs::read_to_string(&path).await else {
        return Ok(());
    };
    let cutoff = Utc::now() - chrono::Duration::seconds((hours * 3600.0) as i64);
    let mut kept = String::from(HEADER);
    kept.push('\n');
    for row in contents.lines().skip(1).filter_map(parse_line) {
        if row.timestamp >= cutoff {
            kept.push_str(&format!(
                "{},{},{},{}\n",
                row.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                csv_escape(&row.agent),
                csv_escape(&row.status),
                csv_escape(&row.activity),
            ));
        }
    }
    let mut file = tokio::fs::File::create(&path).await?;
    file.seek(SeekFrom::Start(0)).await?;
    file.write_all(kept.as_bytes()).await?;
    Ok(())
}
