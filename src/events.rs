//! Append-only per-container event journal.
//!
//! Each line in `events.log` is one complete JSON object; readers may rely on
//! newline framing and tolerate concurrent appenders.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{json, Value};

use crate::container::State;
use crate::utils;

pub fn events_file_path(root: &Path, id: &str) -> PathBuf {
    root.join(id).join("events.log")
}

/// UTC timestamp with millisecond precision and a `Z` suffix.
pub fn iso8601_now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Appends one event line. Journal failures are reported to the log and never
/// interrupt the operation that produced the event.
pub fn record_event(root: &Path, id: &str, event_type: &str, data: Option<Value>) {
    if let Err(err) = try_record_event(root, id, event_type, data) {
        log::warn!("failed to record {} event for {}: {:#}", event_type, id, err);
    }
}

fn try_record_event(root: &Path, id: &str, event_type: &str, data: Option<Value>) -> Result<()> {
    let path = events_file_path(root, id);
    if let Some(parent) = path.parent() {
        utils::ensure_directory(parent, 0o755)?;
    }

    let mut entry = json!({
        "timestamp": iso8601_now(),
        "type": event_type,
        "id": id,
    });
    if let Some(data) = data {
        entry["data"] = data;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open events log {}", path.display()))?;
    writeln!(file, "{}", entry).context("failed to append to events log")?;
    Ok(())
}

pub fn record_state_event(root: &Path, state: &State) {
    let data = serde_json::to_value(state).ok();
    record_event(root, &state.id, "state", data);
}

pub fn record_error_event(root: &Path, id: &str, phase: &str, message: &str) {
    record_event(
        root,
        id,
        "error",
        Some(json!({ "phase": phase, "message": message })),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerStatus;
    use crate::utils::create_temp_dir;

    #[test]
    fn test_iso8601_shape() {
        let ts = iso8601_now();
        assert!(ts.ends_with('Z'));
        assert_eq!(ts.matches('T').count(), 1);
        assert_eq!(ts.matches('.').count(), 1);
        let millis = ts
            .rsplit('.')
            .next()
            .unwrap()
            .trim_end_matches('Z')
            .to_string();
        assert_eq!(millis.len(), 3);
        assert!(millis.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_events_are_newline_framed_json() -> Result<()> {
        let tmp = create_temp_dir("events_framing")?;
        record_event(&tmp, "demo", "signal", Some(json!({"signal": "SIGTERM"})));
        let state = State::new("demo", ContainerStatus::Created, 42, "/bundle", "1.0.2");
        record_state_event(&tmp, &state);
        record_error_event(&tmp, "demo", "fork", "boom");

        let contents = std::fs::read_to_string(events_file_path(&tmp, "demo"))?;
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            let value: Value = serde_json::from_str(line)?;
            assert!(value["timestamp"].is_string());
            assert!(value["type"].is_string());
            assert_eq!(value["id"], "demo");
        }

        let error: Value = serde_json::from_str(contents.lines().last().unwrap())?;
        assert_eq!(error["data"]["phase"], "fork");
        Ok(())
    }
}
