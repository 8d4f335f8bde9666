//! Host commands - UI <-> scheduler bridge
//!
//! One JSON object per request, tagged by `cmd`, answered by one JSON
//! response object.

use crate::background::BackgroundMessage;
use crate::models::*;
use crate::scheduler_runner::RunnerHandle;
use crate::settings::{NotificationSettings, SETTINGS_KEY};
use crate::storage::{KvStore, StorageError};
use crate::task_scheduler::TaskScheduler;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Malformed command: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    ScheduleTask {
        task: TaskDetail,
    },
    UnscheduleTask {
        task_id: String,
    },
    UpdateTaskStatus {
        task_id: String,
        status: ScheduleStatus,
        #[serde(default)]
        patch: StatusPatch,
    },
    ConfirmStart {
        task_id: String,
        #[serde(default)]
        duration_minutes: Option<u32>,
    },
    ConfirmComplete {
        task_id: String,
    },
    GetTaskStatus {
        task_id: String,
    },
    ListSchedules,
    CheckNow,
    Resumed,
    Pause,
    Resume,
    Background {
        message: BackgroundMessage,
    },
    GetSettings,
    SaveSettings {
        settings: NotificationSettings,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok {
        #[serde(skip_serializing_if = "Value::is_null")]
        data: Value,
    },
    Error {
        message: String,
    },
}

pub struct CommandContext {
    scheduler: Arc<TaskScheduler>,
    runner: RunnerHandle,
    kv: Arc<dyn KvStore>,
}

impl CommandContext {
    pub fn new(scheduler: Arc<TaskScheduler>, runner: RunnerHandle, kv: Arc<dyn KvStore>) -> Self {
        Self {
            scheduler,
            runner,
            kv,
        }
    }

    pub fn execute(&self, command: Command) -> Result<Value, CommandError> {
        let data = match command {
            Command::ScheduleTask { task } => {
                let task_id = task.task_id.clone();
                let report = self.scheduler.schedule_task(task);
                json!({ "tick": report, "schedule": self.scheduler.get_task_status(&task_id) })
            }
            Command::UnscheduleTask { task_id } => {
                json!({ "removed": self.scheduler.unschedule_task(&task_id) })
            }
            Command::UpdateTaskStatus {
                task_id,
                status,
                patch,
            } => serde_json::to_value(self.scheduler.update_task_status(&task_id, status, patch))?,
            Command::ConfirmStart {
                task_id,
                duration_minutes,
            } => serde_json::to_value(self.scheduler.confirm_start(&task_id, duration_minutes))?,
            Command::ConfirmComplete { task_id } => {
                serde_json::to_value(self.scheduler.confirm_complete(&task_id))?
            }
            Command::GetTaskStatus { task_id } => {
                serde_json::to_value(self.scheduler.get_task_status(&task_id))?
            }
            Command::ListSchedules => serde_json::to_value(self.scheduler.schedules())?,
            Command::CheckNow => {
                self.runner.check_now();
                Value::Null
            }
            Command::Resumed => {
                self.runner.resumed();
                Value::Null
            }
            Command::Pause => {
                self.runner.pause();
                json!({ "paused": true })
            }
            Command::Resume => {
                self.runner.resume();
                json!({ "paused": false })
            }
            Command::Background { message } => {
                self.runner.background(message);
                Value::Null
            }
            Command::GetSettings => self.load_settings(),
            Command::SaveSettings { settings } => {
                settings.save(self.kv.as_ref())?;
                tracing::info!("Notification settings saved");
                serde_json::to_value(settings)?
            }
        };
        Ok(data)
    }

    /// Stored settings document, or the defaults when none is stored yet.
    fn load_settings(&self) -> Value {
        let stored = self
            .kv
            .get(SETTINGS_KEY)
            .ok()
            .flatten()
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok());
        match stored {
            Some(doc) => doc,
            None => serde_json::to_value(NotificationSettings::default()).unwrap_or(Value::Null),
        }
    }

    /// Parse, execute and answer one request line.
    pub fn handle_line(&self, line: &str) -> Response {
        let result = serde_json::from_str::<Command>(line)
            .map_err(CommandError::from)
            .and_then(|command| self.execute(command));
        match result {
            Ok(data) => Response::Ok { data },
            Err(e) => {
                tracing::warn!("Command failed: {}", e);
                Response::Error {
                    message: e.to_string(),
                }
            }
        }
    }
}
