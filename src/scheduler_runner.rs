//! Scheduler Runner - The single serial loop that triggers evaluation passes
//!
//! Interval ticks, background check requests, resume events and manual
//! checks all land in one `select!` loop, so passes run strictly one after
//! another.

use crate::background::{BackgroundLink, BackgroundMessage};
use crate::task_scheduler::{TaskScheduler, TickReport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Default interval between evaluation passes.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(10);

/// Why a pass ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    Startup,
    Interval,
    BackgroundRequest,
    Resumed,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerEvent {
    /// Run a pass now, even while paused.
    CheckNow,
    /// The host became visible / was brought to the foreground.
    Resumed,
    /// A message relayed from an out-of-process background runner.
    Background(BackgroundMessage),
    Shutdown,
}

/// Cloneable control handle for a running [`SchedulerRunner`].
#[derive(Clone)]
pub struct RunnerHandle {
    events: mpsc::UnboundedSender<RunnerEvent>,
    paused: Arc<AtomicBool>,
}

impl RunnerHandle {
    fn send(&self, event: RunnerEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Runner stopped, dropping {:?}", event);
        }
    }

    pub fn check_now(&self) {
        self.send(RunnerEvent::CheckNow);
    }

    pub fn resumed(&self) {
        self.send(RunnerEvent::Resumed);
    }

    pub fn background(&self, message: BackgroundMessage) {
        self.send(RunnerEvent::Background(message));
    }

    pub fn shutdown(&self) {
        self.send(RunnerEvent::Shutdown);
    }

    /// Pause the scheduler
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        tracing::info!("Scheduler paused");
    }

    /// Resume the scheduler
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        tracing::info!("Scheduler resumed");
    }

    /// Check if scheduler is paused
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

pub struct SchedulerRunner {
    scheduler: Arc<TaskScheduler>,
    tick_interval: Duration,
    paused: Arc<AtomicBool>,
    events_tx: mpsc::UnboundedSender<RunnerEvent>,
    events_rx: mpsc::UnboundedReceiver<RunnerEvent>,
    background: Option<BackgroundLink>,
}

impl SchedulerRunner {
    pub fn new(scheduler: Arc<TaskScheduler>, tick_interval: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            scheduler,
            tick_interval,
            paused: Arc::new(AtomicBool::new(false)),
            events_tx,
            events_rx,
            background: None,
        }
    }

    /// Attach an in-process background runner.
    pub fn with_background(mut self, link: BackgroundLink) -> Self {
        self.background = Some(link);
        self
    }

    pub fn handle(&self) -> RunnerHandle {
        RunnerHandle {
            events: self.events_tx.clone(),
            paused: self.paused.clone(),
        }
    }

    /// Run the scheduler loop until a shutdown event arrives.
    pub async fn run(self) {
        let SchedulerRunner {
            scheduler,
            tick_interval,
            paused,
            events_tx,
            mut events_rx,
            mut background,
        } = self;
        // Keeps `events_rx` open even when every handle has been dropped.
        let _events_tx = events_tx;

        if let Some(link) = &background {
            match link
                .to_background
                .send(BackgroundMessage::StartBackgroundCheck)
                .await
            {
                Ok(()) => tracing::info!("Background checking registered"),
                Err(_) => {
                    tracing::warn!("Background runner unavailable, using foreground timer only")
                }
            }
        }

        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;
        tick(&scheduler, Wakeup::Startup);
        tracing::info!("Periodic check started (every {:?})", tick_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if !paused.load(Ordering::SeqCst) {
                        tick(&scheduler, Wakeup::Interval);
                    }
                }
                Some(message) = next_background(&mut background) => {
                    on_background(&scheduler, &paused, message);
                }
                event = events_rx.recv() => match event {
                    Some(RunnerEvent::CheckNow) => {
                        tick(&scheduler, Wakeup::Manual);
                    }
                    Some(RunnerEvent::Resumed) => {
                        tracing::info!("Host resumed, checking task status");
                        tick(&scheduler, Wakeup::Resumed);
                    }
                    Some(RunnerEvent::Background(message)) => {
                        on_background(&scheduler, &paused, message);
                    }
                    Some(RunnerEvent::Shutdown) | None => break,
                },
            }
        }
        tracing::info!("Periodic check stopped");
    }
}

/// Single pass of the scheduler
fn tick(scheduler: &TaskScheduler, wakeup: Wakeup) -> TickReport {
    let report = scheduler.check_all_tasks();
    tracing::debug!(
        "Tick ({:?}): {} evaluated, {} notices",
        wakeup,
        report.evaluated,
        report.notices
    );
    report
}

fn on_background(scheduler: &TaskScheduler, paused: &AtomicBool, message: BackgroundMessage) {
    match message {
        BackgroundMessage::CheckTasksRequest if !paused.load(Ordering::SeqCst) => {
            tick(scheduler, Wakeup::BackgroundRequest);
        }
        BackgroundMessage::CheckTasksRequest => {
            tracing::debug!("Paused, ignoring background check request");
        }
        BackgroundMessage::StartBackgroundCheck => {
            tracing::debug!("Ignoring unexpected {:?} from background", message);
        }
    }
}

/// Next message from the background runner; pends forever without one.
async fn next_background(link: &mut Option<BackgroundLink>) -> Option<BackgroundMessage> {
    let message = match link.as_mut() {
        Some(link) => link.from_background.recv().await,
        None => return std::future::pending().await,
    };
    if message.is_none() {
        tracing::warn!("Background runner disconnected");
        *link = None;
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::{self, KeepAliveWorker};
    use crate::clock::ManualClock;
    use crate::models::{ScheduleStatus, TaskDetail};
    use crate::notifier::MemoryDispatcher;
    use crate::storage::MemoryKv;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn scheduler_with_task() -> (Arc<ManualClock>, Arc<MemoryDispatcher>, Arc<TaskScheduler>) {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start - ChronoDuration::minutes(1)));
        let dispatcher = Arc::new(MemoryDispatcher::new());
        let scheduler = Arc::new(TaskScheduler::new(
            clock.clone(),
            Arc::new(MemoryKv::new()),
            dispatcher.clone(),
        ));
        scheduler.schedule_task(TaskDetail::new(
            "a",
            "Walk",
            start,
            start + ChronoDuration::minutes(20),
        ));
        (clock, dispatcher, scheduler)
    }

    async fn wait_for_status(scheduler: &TaskScheduler, status: ScheduleStatus) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if scheduler.get_task_status("a").map(|r| r.status) == Some(status) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("status not reached");
    }

    #[tokio::test]
    async fn interval_ticks_drive_transitions() {
        let (clock, dispatcher, scheduler) = scheduler_with_task();
        let runner = SchedulerRunner::new(scheduler.clone(), Duration::from_millis(10));
        let handle = runner.handle();
        let task = tokio::spawn(runner.run());

        clock.advance(ChronoDuration::minutes(1));
        wait_for_status(&scheduler, ScheduleStatus::StartCountdown).await;
        assert_eq!(dispatcher.shown().len(), 1);

        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn paused_runner_still_honours_resume_events() {
        let (clock, _dispatcher, scheduler) = scheduler_with_task();
        let runner = SchedulerRunner::new(scheduler.clone(), Duration::from_secs(3600));
        let handle = runner.handle();
        handle.pause();
        assert!(handle.is_paused());
        let task = tokio::spawn(runner.run());

        clock.advance(ChronoDuration::minutes(1));
        handle.resumed();
        wait_for_status(&scheduler, ScheduleStatus::StartCountdown).await;

        handle.resume();
        assert!(!handle.is_paused());
        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn background_requests_trigger_checks() {
        let (clock, _dispatcher, scheduler) = scheduler_with_task();
        let (link, endpoint) = background::channel(1);
        let worker = KeepAliveWorker::new(endpoint, Duration::from_millis(10)).spawn();
        let runner = SchedulerRunner::new(scheduler.clone(), Duration::from_secs(3600))
            .with_background(link);
        let handle = runner.handle();
        let task = tokio::spawn(runner.run());

        clock.advance(ChronoDuration::minutes(1));
        wait_for_status(&scheduler, ScheduleStatus::StartCountdown).await;

        handle.shutdown();
        task.await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn relayed_background_message_triggers_check() {
        let (clock, _dispatcher, scheduler) = scheduler_with_task();
        let runner = SchedulerRunner::new(scheduler.clone(), Duration::from_secs(3600));
        let handle = runner.handle();
        let task = tokio::spawn(runner.run());

        clock.advance(ChronoDuration::minutes(1));
        handle.background(BackgroundMessage::CheckTasksRequest);
        wait_for_status(&scheduler, ScheduleStatus::StartCountdown).await;

        handle.shutdown();
        task.await.unwrap();
    }
}
