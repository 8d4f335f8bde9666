//! Scheduler module - Evaluate one schedule against the clock
//!
//! Everything here is a pure function of `(record, detail, settings, now)`.
//! Running it twice with the same `now` changes nothing the second time:
//! reminders are keyed in `reminders_triggered` and deadlines only move
//! forward, so a long gap between ticks is reconciled by the next one.

use crate::models::*;
use crate::notice::{self, Notice, OvertimePhase};
use crate::settings::ReminderSettings;
use chrono::{DateTime, Duration, Utc};

/// Time allowed to confirm a start before escalating.
pub const START_GRACE_MINUTES: i64 = 2;

/// Extension granted each time the completion deadline is missed.
pub const COMPLETE_GRACE_MINUTES: i64 = 10;

/// Lead of the session-mode ending-soon notice.
pub const SESSION_WARNING_MINUTES: i64 = 2;

const SESSION_START: &str = "session-start";
const SESSION_WARNING: &str = "session-warning";
const SESSION_END: &str = "session-end";

/// Whole minutes from `from` to `to`, rounded down.
fn floor_minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds().div_euclid(60)
}

/// Advance `record` to reflect `now`, returning the notices to deliver.
/// Completed records are left untouched.
pub fn evaluate(
    record: &mut ScheduleRecord,
    detail: &TaskDetail,
    reminders: &ReminderSettings,
    now: DateTime<Utc>,
) -> Vec<Notice> {
    let mut notices = Vec::new();
    if record.status.is_terminal() {
        return notices;
    }

    check_start_soon(record, detail, reminders, now, &mut notices);
    match record.tracking {
        TrackingMode::Countdown => evaluate_countdown(record, detail, reminders, now, &mut notices),
        TrackingMode::Session => evaluate_session(record, detail, now, &mut notices),
    }
    notices
}

fn check_start_soon(
    record: &mut ScheduleRecord,
    detail: &TaskDetail,
    reminders: &ReminderSettings,
    now: DateTime<Utc>,
    notices: &mut Vec<Notice>,
) {
    if record.status != ScheduleStatus::WaitingStart {
        return;
    }
    let Some(minutes) = reminders.start_before_minutes else {
        return;
    };
    let remind_at = record.scheduled_start - Duration::minutes(i64::from(minutes));
    if now >= remind_at && record.mark_fired(format!("task-start-before-{minutes}")) {
        tracing::info!("Start reminder ({} min) for {}", minutes, record.task_id);
        notices.push(notice::start_soon(detail, minutes));
    }
}

fn evaluate_countdown(
    record: &mut ScheduleRecord,
    detail: &TaskDetail,
    reminders: &ReminderSettings,
    now: DateTime<Utc>,
    notices: &mut Vec<Notice>,
) {
    let start_grace = Duration::minutes(START_GRACE_MINUTES);

    if record.status == ScheduleStatus::WaitingStart && now >= record.scheduled_start {
        tracing::info!("Task {} reached its start time", record.task_id);
        notices.push(notice::task_start(detail));
        record.status = ScheduleStatus::StartCountdown;
        record.start_deadline = Some(now + start_grace);
    }

    if record.status == ScheduleStatus::StartCountdown {
        match record.start_deadline {
            Some(deadline) if now >= deadline => {
                let count = record.start_timeout_count + 1;
                tracing::warn!("Start overdue for {} ({} times)", record.task_id, count);
                notices.push(notice::overtime(detail, OvertimePhase::Start, count));
                record.start_timeout_count = count;
                record.start_deadline = Some(now + start_grace);
            }
            Some(_) => {}
            None => record.start_deadline = Some(now + start_grace),
        }
    }

    if record.status != ScheduleStatus::TaskCountdown {
        return;
    }

    if let (Some(started), Some(interval)) =
        (record.actual_start_time, reminders.during_interval_minutes)
    {
        let elapsed = floor_minutes(started, now);
        if elapsed > 0
            && elapsed.checked_rem(i64::from(interval)) == Some(0)
            && record.mark_fired(format!("task-during-{elapsed}"))
        {
            notices.push(notice::in_progress(detail, elapsed));
        }
    }

    let deadline = match record.task_deadline {
        Some(deadline) => deadline,
        None => {
            let deadline = record.actual_start_time.unwrap_or(now) + record.window_length();
            record.task_deadline = Some(deadline);
            deadline
        }
    };

    if let Some(minutes) = reminders.end_before_minutes {
        if floor_minutes(now, deadline) == i64::from(minutes)
            && record.mark_fired(format!("task-end-before-{minutes}"))
        {
            notices.push(notice::ending_soon(detail, minutes));
        }
    }

    if now >= deadline {
        let count = record.complete_timeout_count + 1;
        tracing::warn!("Completion overdue for {} ({} times)", record.task_id, count);
        notices.push(notice::overtime(detail, OvertimePhase::Completion, count));
        record.complete_timeout_count = count;
        record.task_deadline = Some(now + Duration::minutes(COMPLETE_GRACE_MINUTES));
    }
}

/// Session mode: start, ending-soon and end notices anchored to the window.
/// When a gap makes several due at once only the latest is delivered.
fn evaluate_session(
    record: &mut ScheduleRecord,
    detail: &TaskDetail,
    now: DateTime<Utc>,
    notices: &mut Vec<Notice>,
) {
    let mut due: Vec<(&str, DateTime<Utc>)> = [
        (SESSION_START, record.scheduled_start),
        (
            SESSION_WARNING,
            record.scheduled_end - Duration::minutes(SESSION_WARNING_MINUTES),
        ),
        (SESSION_END, record.scheduled_end),
    ]
    .into_iter()
    .filter(|(key, at)| now >= *at && !record.has_fired(key))
    .collect();
    due.sort_by_key(|(_, at)| *at);

    let Some(&(latest, _)) = due.last() else {
        return;
    };
    for (key, _) in &due {
        record.mark_fired(*key);
        if *key != latest {
            tracing::debug!("Session event {} for {} superseded", key, record.task_id);
        }
    }

    notices.push(match latest {
        SESSION_START => notice::task_start(detail),
        SESSION_WARNING => notice::ending_soon(detail, SESSION_WARNING_MINUTES as u32),
        _ => notice::task_end(detail),
    });

    if due.iter().any(|(key, _)| *key == SESSION_START)
        && record.status == ScheduleStatus::WaitingStart
    {
        record.status = ScheduleStatus::TaskCountdown;
        record.actual_start_time = Some(record.scheduled_start);
        record.task_deadline = Some(record.scheduled_end);
    }
    if due.iter().any(|(key, _)| *key == SESSION_END) {
        tracing::info!("Session for {} ended", record.task_id);
        record.status = ScheduleStatus::Completed;
    }
}

/// Apply an explicit status change requested by the UI.
///
/// Callers check [`ScheduleStatus::can_move_to`] first. Deadlines that belong
/// to a phase being left are cleared; deadlines for the phase being entered
/// are derived when the patch does not supply them.
pub fn apply_status(
    record: &mut ScheduleRecord,
    status: ScheduleStatus,
    patch: StatusPatch,
    now: DateTime<Utc>,
) {
    record.status = status;
    if status > ScheduleStatus::StartCountdown {
        record.start_deadline = None;
    }
    if status.is_terminal() {
        record.task_deadline = None;
    }

    if let Some(deadline) = patch.start_deadline {
        record.start_deadline = Some(deadline);
    }
    if let Some(deadline) = patch.task_deadline {
        record.task_deadline = Some(deadline);
    }
    if let Some(started) = patch.actual_start_time {
        record.actual_start_time = Some(started);
    }
    if let Some(count) = patch.start_timeout_count {
        record.start_timeout_count = count;
    }
    if let Some(count) = patch.complete_timeout_count {
        record.complete_timeout_count = count;
    }

    match status {
        ScheduleStatus::StartCountdown if record.start_deadline.is_none() => {
            record.start_deadline = Some(now + Duration::minutes(START_GRACE_MINUTES));
        }
        ScheduleStatus::TaskCountdown => {
            let started = *record.actual_start_time.get_or_insert(now);
            if patch.task_deadline.is_none() {
                if let Some(minutes) = patch.duration_minutes {
                    record.task_deadline = Some(started + Duration::minutes(i64::from(minutes)));
                } else if record.task_deadline.is_none() {
                    record.task_deadline = Some(started + record.window_length());
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notice::NoticeKind;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn detail(tracking: TrackingMode) -> TaskDetail {
        let mut d = TaskDetail::new("t1", "Deep work", t0(), t0() + Duration::minutes(30));
        d.tracking = tracking;
        d
    }

    fn all_reminders() -> ReminderSettings {
        ReminderSettings {
            start_before_minutes: Some(2),
            during_interval_minutes: Some(10),
            end_before_minutes: Some(5),
        }
    }

    fn kinds(notices: &[Notice]) -> Vec<NoticeKind> {
        notices.iter().map(|n| n.kind.clone()).collect()
    }

    #[test]
    fn nothing_happens_before_the_window() {
        let d = detail(TrackingMode::Countdown);
        let mut record = ScheduleRecord::new(&d);
        let notices = evaluate(&mut record, &d, &all_reminders(), t0() - Duration::minutes(10));
        assert!(notices.is_empty());
        assert_eq!(record, ScheduleRecord::new(&d));
    }

    #[test]
    fn start_opens_countdown_once() {
        let d = detail(TrackingMode::Countdown);
        let mut record = ScheduleRecord::new(&d);
        let notices = evaluate(&mut record, &d, &ReminderSettings::default(), t0());
        assert_eq!(kinds(&notices), vec![NoticeKind::TaskStart]);
        assert_eq!(record.status, ScheduleStatus::StartCountdown);
        assert_eq!(record.start_deadline, Some(t0() + Duration::minutes(2)));

        let again = evaluate(&mut record, &d, &ReminderSettings::default(), t0());
        assert!(again.is_empty());
    }

    #[test]
    fn start_timeout_rearms_forever() {
        let d = detail(TrackingMode::Countdown);
        let mut record = ScheduleRecord::new(&d);
        evaluate(&mut record, &d, &ReminderSettings::default(), t0());

        let mut previous = record.start_deadline.unwrap();
        for n in 1..=5u32 {
            let now = previous;
            let notices = evaluate(&mut record, &d, &ReminderSettings::default(), now);
            assert_eq!(
                kinds(&notices),
                vec![NoticeKind::Overtime { phase: OvertimePhase::Start, count: n }]
            );
            assert_eq!(record.start_timeout_count, n);
            let deadline = record.start_deadline.unwrap();
            assert!(deadline > previous);
            previous = deadline;
        }
        assert_eq!(record.status, ScheduleStatus::StartCountdown);
    }

    #[test]
    fn long_gap_makes_one_structural_step_per_tick() {
        let d = detail(TrackingMode::Countdown);
        let mut record = ScheduleRecord::new(&d);
        let late = t0() + Duration::hours(5);
        let notices = evaluate(&mut record, &d, &ReminderSettings::default(), late);
        assert_eq!(kinds(&notices), vec![NoticeKind::TaskStart]);
        assert_eq!(record.start_timeout_count, 0);
        assert_eq!(record.start_deadline, Some(late + Duration::minutes(2)));
    }

    #[test]
    fn in_progress_and_ending_reminders_fire_on_their_minute() {
        let d = detail(TrackingMode::Countdown);
        let mut record = ScheduleRecord::new(&d);
        apply_status(
            &mut record,
            ScheduleStatus::TaskCountdown,
            StatusPatch {
                actual_start_time: Some(t0()),
                duration_minutes: Some(30),
                ..StatusPatch::default()
            },
            t0(),
        );

        let at_10 = evaluate(&mut record, &d, &all_reminders(), t0() + Duration::minutes(10));
        assert_eq!(kinds(&at_10), vec![NoticeKind::InProgress { elapsed_minutes: 10 }]);
        let at_10_again = evaluate(
            &mut record,
            &d,
            &all_reminders(),
            t0() + Duration::minutes(10) + Duration::seconds(30),
        );
        assert!(at_10_again.is_empty());

        let at_25 = evaluate(&mut record, &d, &all_reminders(), t0() + Duration::minutes(25));
        assert_eq!(kinds(&at_25), vec![NoticeKind::EndingSoon { minutes: 5 }]);
        assert!(record.has_fired("task-end-before-5"));
    }

    #[test]
    fn completion_timeout_extends_by_ten_minutes() {
        let d = detail(TrackingMode::Countdown);
        let mut record = ScheduleRecord::new(&d);
        apply_status(&mut record, ScheduleStatus::TaskCountdown, StatusPatch::default(), t0());
        assert_eq!(record.task_deadline, Some(t0() + Duration::minutes(30)));

        let now = t0() + Duration::minutes(31);
        let notices = evaluate(&mut record, &d, &ReminderSettings::default(), now);
        assert_eq!(
            kinds(&notices),
            vec![NoticeKind::Overtime { phase: OvertimePhase::Completion, count: 1 }]
        );
        assert_eq!(record.task_deadline, Some(now + Duration::minutes(10)));
        assert_eq!(record.complete_timeout_count, 1);
    }

    #[test]
    fn pre_start_reminder_only_while_waiting() {
        let d = detail(TrackingMode::Countdown);
        let mut record = ScheduleRecord::new(&d);
        record.status = ScheduleStatus::StartCountdown;
        record.start_deadline = Some(t0() + Duration::minutes(2));
        let notices = evaluate(&mut record, &d, &all_reminders(), t0() - Duration::minutes(1));
        assert!(notices.is_empty());
    }

    #[test]
    fn completed_records_are_inert() {
        let d = detail(TrackingMode::Countdown);
        let mut record = ScheduleRecord::new(&d);
        record.status = ScheduleStatus::Completed;
        let before = record.clone();
        let notices = evaluate(&mut record, &d, &all_reminders(), t0() + Duration::days(1));
        assert!(notices.is_empty());
        assert_eq!(record, before);
    }

    #[test]
    fn session_mode_walks_start_warning_end() {
        let d = detail(TrackingMode::Session);
        let mut record = ScheduleRecord::new(&d);
        let none = ReminderSettings::default();

        let start = evaluate(&mut record, &d, &none, t0());
        assert_eq!(kinds(&start), vec![NoticeKind::TaskStart]);
        assert_eq!(record.status, ScheduleStatus::TaskCountdown);

        let warn = evaluate(&mut record, &d, &none, t0() + Duration::minutes(28));
        assert_eq!(kinds(&warn), vec![NoticeKind::EndingSoon { minutes: 2 }]);

        let end = evaluate(&mut record, &d, &none, t0() + Duration::minutes(30));
        assert_eq!(kinds(&end), vec![NoticeKind::TaskEnd]);
        assert_eq!(record.status, ScheduleStatus::Completed);
        assert!(evaluate(&mut record, &d, &none, t0() + Duration::minutes(40)).is_empty());
    }

    #[test]
    fn session_gap_delivers_only_latest_event() {
        let d = detail(TrackingMode::Session);
        let mut record = ScheduleRecord::new(&d);
        let notices = evaluate(
            &mut record,
            &d,
            &ReminderSettings::default(),
            t0() + Duration::minutes(29),
        );
        assert_eq!(kinds(&notices), vec![NoticeKind::EndingSoon { minutes: 2 }]);
        assert!(record.has_fired("session-start"));
        assert_eq!(record.status, ScheduleStatus::TaskCountdown);
    }

    #[test]
    fn apply_status_clears_left_phase_deadline() {
        let d = detail(TrackingMode::Countdown);
        let mut record = ScheduleRecord::new(&d);
        apply_status(&mut record, ScheduleStatus::StartCountdown, StatusPatch::default(), t0());
        assert_eq!(record.start_deadline, Some(t0() + Duration::minutes(2)));

        let t = t0() + Duration::minutes(1);
        apply_status(
            &mut record,
            ScheduleStatus::TaskCountdown,
            StatusPatch {
                actual_start_time: Some(t),
                duration_minutes: Some(20),
                ..StatusPatch::default()
            },
            t,
        );
        assert_eq!(record.start_deadline, None);
        assert_eq!(record.task_deadline, Some(t + Duration::minutes(20)));

        apply_status(&mut record, ScheduleStatus::Completed, StatusPatch::default(), t);
        assert_eq!(record.task_deadline, None);
    }

    #[test]
    fn zero_during_interval_is_ignored() {
        let d = detail(TrackingMode::Countdown);
        let mut record = ScheduleRecord::new(&d);
        let reminders = ReminderSettings {
            during_interval_minutes: Some(0),
            ..ReminderSettings::default()
        };
        apply_status(
            &mut record,
            ScheduleStatus::TaskCountdown,
            StatusPatch::default(),
            t0(),
        );

        let notices = evaluate(&mut record, &d, &reminders, t0() + Duration::minutes(5));
        assert!(notices.is_empty());
        assert!(record.reminders_triggered.is_empty());
    }
}
