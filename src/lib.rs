//! Task Nudge - Core library
//!
//! Keeps scheduled tasks moving through their lifecycle and raises timely
//! reminders while the host stays open or sits in the background.

pub mod models;
pub mod clock;
pub mod storage;
pub mod schedule_store;
pub mod settings;
pub mod notice;
pub mod notifier;
pub mod scheduler;
pub mod task_scheduler;
pub mod background;
pub mod scheduler_runner;
pub mod config;
pub mod commands;

pub use models::*;
