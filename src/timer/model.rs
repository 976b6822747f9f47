use std::collections::HashSet;

use anyhow::{Result, bail};
use serde::Deserialize;
use serde_json::{Map, Value, json};

pub type TimerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStatus {
    /// Created but not counting down; the only editable state.
    Staged,
    Running,
    Paused,
    /// Terminal; stays visible until explicitly stopped.
    Finished,
}

impl TimerStatus {
    pub fn as_token(self) -> &'static str {
        match self {
            TimerStatus::Staged => "staged",
            TimerStatus::Running => "running",
            TimerStatus::Paused => "paused",
            TimerStatus::Finished => "finished",
        }
    }
}

/// A single countdown timer.
///
/// While `Running`, `started_at_ms` anchors the countdown: it is the
/// wall-clock instant the timer would have started at if it had been
/// running uninterrupted, i.e. `now - (duration - remaining) * 1000` at the
/// moment of starting or resuming. Remaining time is always recomputed
/// from that anchor rather than decremented, so missed ticks cannot drift.
#[derive(Debug, Clone)]
pub struct Timer {
    pub id: TimerId,
    pub duration_secs: u64,
    pub remaining_secs: u64,
    pub label: String,
    pub description: String,
    pub status: TimerStatus,
    pub started_at_ms: Option<u64>,
}

impl Timer {
    pub fn staged(
        id: TimerId,
        duration_secs: u64,
        label: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id,
            duration_secs,
            remaining_secs: duration_secs,
            label: label.into(),
            description: description.into(),
            status: TimerStatus::Staged,
            started_at_ms: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    pub fn is_finished(&self) -> bool {
        self.status == TimerStatus::Finished
    }

    /// Remaining whole seconds at `now_ms`, projected from the running
    /// anchor; non-running timers report their stored value.
    pub fn remaining_at(&self, now_ms: u64) -> u64 {
        match (self.status, self.started_at_ms) {
            (TimerStatus::Running, Some(anchor_ms)) => {
                let elapsed_secs = now_ms.saturating_sub(anchor_ms) / 1_000;
                self.duration_secs.saturating_sub(elapsed_secs)
            }
            _ => self.remaining_secs,
        }
    }

    /// Anchor instant for a timer that resumes at `now_ms` with
    /// `remaining_secs` left on the clock.
    pub fn anchor_at(&self, now_ms: u64) -> u64 {
        let consumed_ms = self
            .duration_secs
            .saturating_sub(self.remaining_secs)
            .saturating_mul(1_000);
        now_ms.saturating_sub(consumed_ms)
    }
}

/// `m:ss` clock-face rendering; only the seconds are zero-padded.
pub fn format_clock(total_secs: u64) -> String {
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

/// Full persisted state of the registry: the id counter plus every
/// timer's complete state.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub next_timer_id: TimerId,
    pub timers: Vec<Timer>,
}

impl Default for RegistrySnapshot {
    fn default() -> Self {
        Self {
            next_timer_id: 1,
            timers: Vec::new(),
        }
    }
}

pub fn parse_snapshot_text(content: &str) -> Result<RegistrySnapshot> {
    let raw = serde_json::from_str::<SnapshotFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;

    let mut ids = HashSet::new();
    let mut timers = Vec::with_capacity(raw.timers.len());
    for timer in raw.timers {
        if !ids.insert(timer.id) {
            bail!("duplicate timer id found: {}", timer.id);
        }
        if timer.duration == 0 {
            bail!("timer {} must have duration > 0", timer.id);
        }
        if timer.remaining > timer.duration {
            bail!(
                "timer {} has remaining {} beyond its duration {}",
                timer.id,
                timer.remaining,
                timer.duration
            );
        }

        let status = match timer.status {
            StatusToken::Staged => TimerStatus::Staged,
            StatusToken::Running => TimerStatus::Running,
            StatusToken::Paused => TimerStatus::Paused,
            StatusToken::Finished => TimerStatus::Finished,
        };
        match status {
            TimerStatus::Staged if timer.remaining != timer.duration => {
                bail!("staged timer {} must have remaining == duration", timer.id);
            }
            TimerStatus::Finished if timer.remaining != 0 => {
                bail!("finished timer {} must have remaining == 0", timer.id);
            }
            TimerStatus::Running if timer.start_time.is_none() => {
                bail!("running timer {} is missing startTime", timer.id);
            }
            _ => {}
        }

        timers.push(Timer {
            id: timer.id,
            duration_secs: timer.duration,
            remaining_secs: timer.remaining,
            label: timer.label,
            description: timer.description,
            status,
            // The anchor only means anything while running.
            started_at_ms: if status == TimerStatus::Running {
                timer.start_time
            } else {
                None
            },
        });
    }

    Ok(RegistrySnapshot {
        next_timer_id: raw.next_timer_id,
        timers,
    })
}

pub fn serialize_snapshot(snapshot: &RegistrySnapshot) -> Result<String> {
    let mut serialized_timers = Vec::with_capacity(snapshot.timers.len());
    for timer in &snapshot.timers {
        let mut timer_obj = Map::new();
        timer_obj.insert("id".to_string(), Value::Number(timer.id.into()));
        timer_obj.insert(
            "duration".to_string(),
            Value::Number(timer.duration_secs.into()),
        );
        timer_obj.insert(
            "remaining".to_string(),
            Value::Number(timer.remaining_secs.into()),
        );
        timer_obj.insert("label".to_string(), Value::String(timer.label.clone()));
        timer_obj.insert(
            "description".to_string(),
            Value::String(timer.description.clone()),
        );
        timer_obj.insert(
            "status".to_string(),
            Value::String(timer.status.as_token().to_string()),
        );
        timer_obj.insert(
            "startTime".to_string(),
            match timer.started_at_ms {
                Some(anchor_ms) => Value::Number(anchor_ms.into()),
                None => Value::Null,
            },
        );
        serialized_timers.push(Value::Object(timer_obj));
    }

    let payload = json!({
        "nextTimerId": snapshot.next_timer_id,
        "timers": serialized_timers,
    });
    Ok(serde_json::to_string_pretty(&payload)?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotFile {
    next_timer_id: TimerId,
    #[serde(default)]
    timers: Vec<TimerFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimerFile {
    id: TimerId,
    duration: u64,
    remaining: u64,
    #[serde(default)]
    label: String,
    #[serde(default)]
    description: String,
    status: StatusToken,
    #[serde(default)]
    start_time: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StatusToken {
    Staged,
    Running,
    Paused,
    Finished,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_snapshot() {
        let json = r#"
{
  "nextTimerId": 4,
  "timers": [
    {
      "id": 1,
      "duration": 300,
      "remaining": 300,
      "label": "5:00",
      "description": "Apples",
      "status": "staged",
      "startTime": null
    },
    {
      "id": 3,
      "duration": 600,
      "remaining": 240,
      "label": "TTT: 10 minutes",
      "description": "Chicken",
      "status": "running",
      "startTime": 1700000000000
    }
  ]
}
"#;

        let snapshot = parse_snapshot_text(json).expect("valid snapshot");
        assert_eq!(snapshot.next_timer_id, 4);
        assert_eq!(snapshot.timers.len(), 2);
        assert_eq!(snapshot.timers[0].status, TimerStatus::Staged);
        assert_eq!(snapshot.timers[0].started_at_ms, None);
        assert_eq!(snapshot.timers[1].status, TimerStatus::Running);
        assert_eq!(snapshot.timers[1].started_at_ms, Some(1_700_000_000_000));
        assert_eq!(snapshot.timers[1].remaining_secs, 240);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let json = r#"
{
  "nextTimerId": 3,
  "timers": [
    { "id": 1, "duration": 60, "remaining": 60, "status": "staged" },
    { "id": 1, "duration": 90, "remaining": 90, "status": "staged" }
  ]
}
"#;
        let err = parse_snapshot_text(json).expect_err("duplicate ids should fail");
        assert!(err.to_string().contains("duplicate timer id"));
    }

    #[test]
    fn rejects_zero_duration() {
        let json = r#"
{
  "nextTimerId": 2,
  "timers": [
    { "id": 1, "duration": 0, "remaining": 0, "status": "staged" }
  ]
}
"#;
        let err = parse_snapshot_text(json).expect_err("zero duration should fail");
        assert!(err.to_string().contains("duration > 0"));
    }

    #[test]
    fn rejects_remaining_beyond_duration() {
        let json = r#"
{
  "nextTimerId": 2,
  "timers": [
    { "id": 1, "duration": 60, "remaining": 61, "status": "paused" }
  ]
}
"#;
        let err = parse_snapshot_text(json).expect_err("should fail");
        assert!(err.to_string().contains("beyond its duration"));
    }

    #[test]
    fn rejects_running_timer_without_anchor() {
        let json = r#"
{
  "nextTimerId": 2,
  "timers": [
    { "id": 1, "duration": 60, "remaining": 30, "status": "running" }
  ]
}
"#;
        let err = parse_snapshot_text(json).expect_err("should fail");
        assert!(err.to_string().contains("startTime"));
    }

    #[test]
    fn malformed_json_reports_position() {
        let err = parse_snapshot_text("{ not-json").expect_err("should fail");
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn snapshot_round_trips_through_blob_keys() {
        let snapshot = RegistrySnapshot {
            next_timer_id: 7,
            timers: vec![
                Timer::staged(2, 120, "2:00", "Eggs"),
                Timer {
                    id: 6,
                    duration_secs: 600,
                    remaining_secs: 0,
                    label: "10:00".to_string(),
                    description: String::new(),
                    status: TimerStatus::Finished,
                    started_at_ms: None,
                },
            ],
        };

        let text = serialize_snapshot(&snapshot).expect("serialize");
        assert!(text.contains("\"nextTimerId\""));
        assert!(text.contains("\"startTime\""));

        let restored = parse_snapshot_text(&text).expect("parse back");
        assert_eq!(restored.next_timer_id, 7);
        assert_eq!(restored.timers.len(), 2);
        assert_eq!(restored.timers[0].label, "2:00");
        assert_eq!(restored.timers[1].status, TimerStatus::Finished);
    }

    #[test]
    fn projection_recomputes_from_anchor() {
        let timer = Timer {
            id: 1,
            duration_secs: 60,
            remaining_secs: 60,
            label: "1:00".to_string(),
            description: String::new(),
            status: TimerStatus::Running,
            started_at_ms: Some(10_000),
        };
        assert_eq!(timer.remaining_at(10_000), 60);
        assert_eq!(timer.remaining_at(10_999), 60);
        assert_eq!(timer.remaining_at(11_000), 59);
        assert_eq!(timer.remaining_at(70_000), 0);
        // A gap far past the deadline still floors at zero.
        assert_eq!(timer.remaining_at(1_000_000), 0);
    }

    #[test]
    fn anchor_accounts_for_consumed_time() {
        let mut timer = Timer::staged(1, 60, "1:00", "");
        timer.remaining_secs = 45;
        assert_eq!(timer.anchor_at(100_000), 85_000);
    }

    #[test]
    fn clock_face_pads_seconds_only() {
        assert_eq!(format_clock(0), "0:00");
        assert_eq!(format_clock(5), "0:05");
        assert_eq!(format_clock(60), "1:00");
        assert_eq!(format_clock(300), "5:00");
        assert_eq!(format_clock(7_200), "120:00");
        assert_eq!(format_clock(61), "1:01");
    }
}
