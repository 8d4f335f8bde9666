//! Runtime configuration for the headless host

use crate::scheduler_runner::DEFAULT_TICK_INTERVAL;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BACKGROUND_INTERVAL: Duration = Duration::from_secs(60);
const DATABASE_FILE: &str = "task-nudge.db";

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    pub data_dir: PathBuf,
    pub tick_interval: Duration,
    pub background_interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("task-nudge"),
            tick_interval: DEFAULT_TICK_INTERVAL,
            background_interval: DEFAULT_BACKGROUND_INTERVAL,
        }
    }
}

impl RunnerConfig {
    /// Defaults overridden by `TASK_NUDGE_DATA_DIR`, `TASK_NUDGE_TICK_SECS`
    /// and `TASK_NUDGE_BACKGROUND_SECS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = lookup("TASK_NUDGE_DATA_DIR").filter(|d| !d.trim().is_empty()) {
            config.data_dir = PathBuf::from(dir.trim());
        }
        if let Some(secs) = seconds(&lookup, "TASK_NUDGE_TICK_SECS") {
            config.tick_interval = secs;
        }
        if let Some(secs) = seconds(&lookup, "TASK_NUDGE_BACKGROUND_SECS") {
            config.background_interval = secs;
        }
        config
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
        _ => {
            tracing::warn!("Ignoring invalid {}={:?}, using default", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let config = RunnerConfig::from_lookup(|_| None);
        assert_eq!(config.tick_interval, Duration::from_secs(10));
        assert_eq!(config.background_interval, Duration::from_secs(60));
        assert!(config.database_path().ends_with("task-nudge/task-nudge.db"));
    }

    #[test]
    fn overrides_apply_and_bad_values_fall_back() {
        let config = RunnerConfig::from_lookup(lookup(&[
            ("TASK_NUDGE_DATA_DIR", "/tmp/nudge"),
            ("TASK_NUDGE_TICK_SECS", "5"),
            ("TASK_NUDGE_BACKGROUND_SECS", "zero"),
        ]));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/nudge"));
        assert_eq!(config.tick_interval, Duration::from_secs(5));
        assert_eq!(config.background_interval, DEFAULT_BACKGROUND_INTERVAL);
    }
}
