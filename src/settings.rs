//! Notification settings
//!
//! The settings document is owned by the configuration surface and only read
//! by the scheduler. Each reminder category is resolved on its own, so a bad
//! value in one never disables another.

use crate::storage::{KvStore, StorageError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SETTINGS_KEY: &str = "notification_settings";

/// Settings document as written by the configuration surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationSettings {
    pub task_start_before_reminder: bool,
    pub task_start_before_minutes: u32,
    pub task_during_reminder: bool,
    pub task_during_minutes: u32,
    pub task_end_before_reminder: bool,
    pub task_end_before_minutes: u32,
    pub voice_enabled: bool,
    pub voice_rate: f32,
    pub voice_pitch: f32,
    pub voice_volume: f32,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            task_start_before_reminder: true,
            task_start_before_minutes: 2,
            task_during_reminder: false,
            task_during_minutes: 10,
            task_end_before_reminder: true,
            task_end_before_minutes: 5,
            voice_enabled: true,
            voice_rate: 1.0,
            voice_pitch: 1.0,
            voice_volume: 0.8,
        }
    }
}

impl NotificationSettings {
    pub fn save(&self, kv: &dyn KvStore) -> Result<(), StorageError> {
        let json = serde_json::to_string(self)?;
        kv.put(SETTINGS_KEY, &json)
    }
}

/// Resolved reminder thresholds in minutes. `None` means disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReminderSettings {
    pub start_before_minutes: Option<u32>,
    pub during_interval_minutes: Option<u32>,
    pub end_before_minutes: Option<u32>,
}

/// Speech channel parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceSettings {
    pub enabled: bool,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: 1.0,
            pitch: 1.0,
            volume: 0.8,
        }
    }
}

/// Everything a tick needs from the settings document.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResolvedSettings {
    pub reminders: ReminderSettings,
    pub voice: VoiceSettings,
}

impl ResolvedSettings {
    pub fn load(kv: &dyn KvStore) -> Self {
        match kv.get(SETTINGS_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
                Ok(doc) => Self::from_value(&doc),
                Err(e) => {
                    tracing::warn!("Notification settings unreadable, reminders disabled: {}", e);
                    Self::default()
                }
            },
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!("Failed to read notification settings: {}", e);
                Self::default()
            }
        }
    }

    pub fn from_value(doc: &Value) -> Self {
        Self {
            reminders: ReminderSettings {
                start_before_minutes: category(
                    doc,
                    "task_start_before_reminder",
                    "task_start_before_minutes",
                ),
                during_interval_minutes: category(
                    doc,
                    "task_during_reminder",
                    "task_during_minutes",
                ),
                end_before_minutes: category(
                    doc,
                    "task_end_before_reminder",
                    "task_end_before_minutes",
                ),
            },
            voice: voice(doc),
        }
    }
}

/// A category is on only when its flag is `true` and its threshold is a
/// positive integer.
fn category(doc: &Value, flag: &str, minutes: &str) -> Option<u32> {
    if doc.get(flag).and_then(Value::as_bool) != Some(true) {
        return None;
    }
    let threshold = doc
        .get(minutes)
        .and_then(Value::as_u64)
        .and_then(|m| u32::try_from(m).ok())
        .filter(|m| *m > 0);
    if threshold.is_none() {
        tracing::warn!("Malformed '{}' in notification settings, category disabled", minutes);
    }
    threshold
}

fn voice(doc: &Value) -> VoiceSettings {
    let defaults = VoiceSettings::default();
    let number = |key: &str, fallback: f32| {
        doc.get(key)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as f32)
            .unwrap_or(fallback)
    };
    VoiceSettings {
        enabled: doc
            .get("voice_enabled")
            .and_then(Value::as_bool)
            .unwrap_or(defaults.enabled),
        rate: number("voice_rate", defaults.rate),
        pitch: number("voice_pitch", defaults.pitch),
        volume: number("voice_volume", defaults.volume).min(1.0),
    }
}
