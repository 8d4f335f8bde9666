//! Data models for Task Nudge

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lifecycle phase of a monitored task.
///
/// Variants are declared in lifecycle order, so the derived `Ord` is the
/// "is later than" relation used to refuse regressions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    WaitingStart,
    StartCountdown,
    TaskCountdown,
    Completed,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::WaitingStart => "waiting_start",
            ScheduleStatus::StartCountdown => "start_countdown",
            ScheduleStatus::TaskCountdown => "task_countdown",
            ScheduleStatus::Completed => "completed",
        }
    }

    /// Whether moving from `self` to `next` keeps the lifecycle forward-only.
    /// Staying in the same phase is allowed (a re-armed countdown).
    pub fn can_move_to(&self, next: ScheduleStatus) -> bool {
        next >= *self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScheduleStatus::Completed)
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a task is followed by the checker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    /// Full verification lifecycle: start countdown, task countdown, escalation.
    #[default]
    Countdown,
    /// Lightweight start / ending-soon / end notices anchored to the window.
    Session,
}

/// Descriptive task fields cached for composing notices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDetail {
    pub task_id: String,
    pub title: String,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    #[serde(default)]
    pub gold_reward: i64,
    #[serde(default)]
    pub has_verification: bool,
    #[serde(default)]
    pub start_keywords: Vec<String>,
    #[serde(default)]
    pub complete_keywords: Vec<String>,
    #[serde(default)]
    pub tracking: TrackingMode,
}

impl TaskDetail {
    pub fn new(
        task_id: impl Into<String>,
        title: impl Into<String>,
        scheduled_start: DateTime<Utc>,
        scheduled_end: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            title: title.into(),
            scheduled_start,
            scheduled_end,
            gold_reward: 0,
            has_verification: false,
            start_keywords: Vec::new(),
            complete_keywords: Vec::new(),
            tracking: TrackingMode::default(),
        }
    }

    /// Stand-in used when the detail cache lost an entry but the schedule survived.
    pub fn placeholder(record: &ScheduleRecord) -> Self {
        let mut detail = Self::new(
            record.task_id.clone(),
            "Scheduled task",
            record.scheduled_start,
            record.scheduled_end,
        );
        detail.tracking = record.tracking;
        detail
    }
}

/// Persisted state machine for one monitored task, keyed by `task_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleRecord {
    pub task_id: String,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub status: ScheduleStatus,
    pub start_deadline: Option<DateTime<Utc>>,
    pub task_deadline: Option<DateTime<Utc>>,
    pub start_timeout_count: u32,
    pub complete_timeout_count: u32,
    pub actual_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tracking: TrackingMode,
    #[serde(default)]
    pub reminders_triggered: BTreeSet<String>,
}

impl ScheduleRecord {
    pub fn new(detail: &TaskDetail) -> Self {
        Self {
            task_id: detail.task_id.clone(),
            scheduled_start: detail.scheduled_start,
            scheduled_end: detail.scheduled_end,
            status: ScheduleStatus::WaitingStart,
            start_deadline: None,
            task_deadline: None,
            start_timeout_count: 0,
            complete_timeout_count: 0,
            actual_start_time: None,
            tracking: detail.tracking,
            reminders_triggered: BTreeSet::new(),
        }
    }

    /// True when the detail describes the same window and tracking mode.
    pub fn matches(&self, detail: &TaskDetail) -> bool {
        self.scheduled_start == detail.scheduled_start
            && self.scheduled_end == detail.scheduled_end
            && self.tracking == detail.tracking
    }

    pub fn has_fired(&self, key: &str) -> bool {
        self.reminders_triggered.contains(key)
    }

    /// Records a reminder key. Returns false if it was already present.
    pub fn mark_fired(&mut self, key: impl Into<String>) -> bool {
        self.reminders_triggered.insert(key.into())
    }

    /// Nominal length of the execution window, never negative.
    pub fn window_length(&self) -> Duration {
        (self.scheduled_end - self.scheduled_start).max(Duration::zero())
    }
}

/// Optional fields applied by `update_task_status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatusPatch {
    #[serde(default)]
    pub start_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub task_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub start_timeout_count: Option<u32>,
    #[serde(default)]
    pub complete_timeout_count: Option<u32>,
    /// Used to derive `task_deadline` when entering `task_countdown` without one.
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

/// Outcome of `update_task_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusUpdate {
    Applied { record: ScheduleRecord },
    UnknownTask,
    Rejected { from: ScheduleStatus, to: ScheduleStatus },
    /// The schedule store could not be read; nothing was changed.
    Unavailable,
}
