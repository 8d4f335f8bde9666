//! Task scheduler - owns the ports and drives schedules through their lifecycle
//!
//! All writes to the schedule store go through this type and are serialized
//! by one write lock. Ticks never overlap: a tick requested from another
//! thread waits for the running one to finish, while a tick requested from
//! inside a dispatcher on the ticking thread is skipped.

use crate::clock::Clock;
use crate::models::*;
use crate::notifier::{deliver, NotificationDispatcher};
use crate::schedule_store::{ScheduleStore, TaskDetailCache};
use crate::scheduler::{apply_status, evaluate};
use crate::settings::ResolvedSettings;
use crate::storage::KvStore;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// Summary of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Non-completed schedules evaluated.
    pub evaluated: usize,
    /// Notices handed to the dispatcher.
    pub notices: usize,
    /// True when another tick was already running.
    pub skipped: bool,
}

impl TickReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Holds the tick lock for one pass and records which thread owns it.
struct TickGuard<'a> {
    owner: &'a Mutex<Option<ThreadId>>,
    _lock: MutexGuard<'a, ()>,
}

impl<'a> TickGuard<'a> {
    /// Waits for any tick running on another thread. Returns `None` when the
    /// calling thread is already ticking.
    fn enter(lock: &'a Mutex<()>, owner: &'a Mutex<Option<ThreadId>>) -> Option<Self> {
        let me = thread::current().id();
        if *owner.lock().unwrap_or_else(PoisonError::into_inner) == Some(me) {
            return None;
        }
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        *owner.lock().unwrap_or_else(PoisonError::into_inner) = Some(me);
        Some(Self {
            owner,
            _lock: guard,
        })
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

pub struct TaskScheduler {
    clock: Arc<dyn Clock>,
    kv: Arc<dyn KvStore>,
    schedules: ScheduleStore,
    details: TaskDetailCache,
    dispatcher: Arc<dyn NotificationDispatcher>,
    write_lock: Mutex<()>,
    tick_lock: Mutex<()>,
    tick_owner: Mutex<Option<ThreadId>>,
}

impl TaskScheduler {
    pub fn new(
        clock: Arc<dyn Clock>,
        kv: Arc<dyn KvStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            clock,
            schedules: ScheduleStore::new(kv.clone()),
            details: TaskDetailCache::new(kv.clone()),
            kv,
            dispatcher,
            write_lock: Mutex::new(()),
            tick_lock: Mutex::new(()),
            tick_owner: Mutex::new(None),
        }
    }

    fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register or refresh a task, then run an evaluation pass.
    ///
    /// Re-registering with the same window and tracking mode keeps progress.
    /// A changed window (or mode) resets the schedule to `waiting_start`.
    pub fn schedule_task(&self, detail: TaskDetail) -> TickReport {
        {
            let _lock = self.write_lock();
            let registered = self.schedules.update(|records| {
                match records.iter_mut().find(|r| r.task_id == detail.task_id) {
                    Some(existing) if existing.matches(&detail) => {
                        tracing::debug!("Task {} already scheduled, keeping state", detail.task_id);
                    }
                    Some(existing) => {
                        tracing::info!("Task window changed, resetting: {}", detail.title);
                        *existing = ScheduleRecord::new(&detail);
                    }
                    None => {
                        tracing::info!("Scheduling new task: {}", detail.title);
                        records.push(ScheduleRecord::new(&detail));
                    }
                }
            });
            match registered {
                Ok(()) => self.details.upsert(detail),
                Err(e) => tracing::error!("Could not register {}: {}", detail.task_id, e),
            }
        }
        self.check_all_tasks()
    }

    /// Stop monitoring a task. Unknown ids are a no-op.
    pub fn unschedule_task(&self, task_id: &str) -> bool {
        let _lock = self.write_lock();
        let removed = self.schedules.remove(task_id);
        self.details.remove(task_id);
        if removed {
            tracing::info!("Unscheduled task {}", task_id);
        } else {
            tracing::debug!("Unschedule ignored, {} not scheduled", task_id);
        }
        removed
    }

    /// Evaluate every non-completed schedule against the clock.
    pub fn check_all_tasks(&self) -> TickReport {
        let Some(_tick) = TickGuard::enter(&self.tick_lock, &self.tick_owner) else {
            tracing::debug!("Tick requested from inside a tick, skipping");
            return TickReport::skipped();
        };

        let now = self.clock.now();
        let settings = ResolvedSettings::load(self.kv.as_ref());

        let evaluated = {
            let _lock = self.write_lock();
            let details = self.details.all();
            self.schedules.update(|records| {
                let mut evaluated = 0;
                let mut notices = Vec::new();
                for record in records.iter_mut().filter(|r| !r.status.is_terminal()) {
                    evaluated += 1;
                    let detail = match details.get(&record.task_id) {
                        Some(detail) => detail.clone(),
                        None => {
                            tracing::warn!(
                                "No cached detail for {}, using placeholder",
                                record.task_id
                            );
                            TaskDetail::placeholder(record)
                        }
                    };
                    notices.extend(evaluate(record, &detail, &settings.reminders, now));
                }
                (evaluated, notices)
            })
        };
        let (evaluated, notices) = match evaluated {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Schedules unreadable, tick left them untouched: {}", e);
                return TickReport::default();
            }
        };

        for notice in &notices {
            deliver(self.dispatcher.as_ref(), &notice.clone().with_voice(&settings.voice));
        }

        if !notices.is_empty() {
            tracing::debug!("Tick at {} delivered {} notices", now, notices.len());
        }
        TickReport {
            evaluated,
            notices: notices.len(),
            skipped: false,
        }
    }

    /// Explicit status change from the UI. Unknown ids and regressions are
    /// logged no-ops.
    pub fn update_task_status(
        &self,
        task_id: &str,
        status: ScheduleStatus,
        patch: StatusPatch,
    ) -> StatusUpdate {
        let now = self.clock.now();
        let _lock = self.write_lock();
        let outcome = self.schedules.update(|records| {
            let Some(record) = records.iter_mut().find(|r| r.task_id == task_id) else {
                tracing::warn!("Status update for unknown task {}", task_id);
                return StatusUpdate::UnknownTask;
            };
            if !record.status.can_move_to(status) {
                tracing::warn!(
                    "Refusing to move {} back from {} to {}",
                    task_id,
                    record.status,
                    status
                );
                return StatusUpdate::Rejected {
                    from: record.status,
                    to: status,
                };
            }
            apply_status(record, status, patch, now);
            tracing::info!("Task {} status updated to {}", task_id, status);
            StatusUpdate::Applied {
                record: record.clone(),
            }
        });
        outcome.unwrap_or_else(|e| {
            tracing::error!("Status update for {} not applied: {}", task_id, e);
            StatusUpdate::Unavailable
        })
    }

    /// The user began the task. Without a duration the scheduled window
    /// length is used.
    pub fn confirm_start(&self, task_id: &str, duration_minutes: Option<u32>) -> StatusUpdate {
        let patch = StatusPatch {
            actual_start_time: Some(self.clock.now()),
            duration_minutes,
            ..StatusPatch::default()
        };
        self.update_task_status(task_id, ScheduleStatus::TaskCountdown, patch)
    }

    pub fn confirm_complete(&self, task_id: &str) -> StatusUpdate {
        self.update_task_status(task_id, ScheduleStatus::Completed, StatusPatch::default())
    }

    pub fn get_task_status(&self, task_id: &str) -> Option<ScheduleRecord> {
        self.schedules.get(task_id)
    }

    pub fn schedules(&self) -> Vec<ScheduleRecord> {
        self.schedules.all()
    }

    pub fn task_detail(&self, task_id: &str) -> Option<TaskDetail> {
        self.details.get(task_id)
    }
}
