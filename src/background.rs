//! Background runner protocol
//!
//! The background context never touches schedule state. It receives one
//! `START_BACKGROUND_CHECK` at registration and answers, at its own cadence,
//! with `CHECK_TASKS_REQUEST` messages that the foreground turns into ticks.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Wire messages, e.g. `{"type":"CHECK_TASKS_REQUEST"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackgroundMessage {
    /// Foreground -> background, sent once at registration.
    StartBackgroundCheck,
    /// Background -> foreground, asks for an evaluation pass.
    CheckTasksRequest,
}

/// Foreground side of the link.
pub struct BackgroundLink {
    pub to_background: mpsc::Sender<BackgroundMessage>,
    pub from_background: mpsc::Receiver<BackgroundMessage>,
}

/// Background side of the link.
pub struct BackgroundEndpoint {
    pub commands: mpsc::Receiver<BackgroundMessage>,
    pub requests: mpsc::Sender<BackgroundMessage>,
}

/// Create a connected pair. Requests beyond `capacity` pending ones are
/// dropped by the worker, since one pending check covers them all.
pub fn channel(capacity: usize) -> (BackgroundLink, BackgroundEndpoint) {
    let (cmd_tx, cmd_rx) = mpsc::channel(capacity.max(1));
    let (req_tx, req_rx) = mpsc::channel(capacity.max(1));
    (
        BackgroundLink {
            to_background: cmd_tx,
            from_background: req_rx,
        },
        BackgroundEndpoint {
            commands: cmd_rx,
            requests: req_tx,
        },
    )
}

/// In-process background runner that keeps checks flowing while the
/// foreground's own timer may be throttled.
pub struct KeepAliveWorker {
    endpoint: BackgroundEndpoint,
    cadence: Duration,
}

impl KeepAliveWorker {
    pub fn new(endpoint: BackgroundEndpoint, cadence: Duration) -> Self {
        Self { endpoint, cadence }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        let KeepAliveWorker {
            mut endpoint,
            cadence,
        } = self;

        loop {
            match endpoint.commands.recv().await {
                Some(BackgroundMessage::StartBackgroundCheck) => break,
                Some(other) => tracing::debug!("Background worker ignoring {:?}", other),
                None => return,
            }
        }
        tracing::info!("Background checking started (every {:?})", cadence);

        let mut interval = tokio::time::interval(cadence);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match endpoint.requests.try_send(BackgroundMessage::CheckTasksRequest) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            tracing::debug!("Check request already pending");
                        }
                        Err(TrySendError::Closed(_)) => break,
                    }
                }
                command = endpoint.commands.recv() => match command {
                    Some(message) => {
                        tracing::debug!("Background worker already running, ignoring {:?}", message)
                    }
                    None => break,
                },
            }
        }
        tracing::info!("Background worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_matches_protocol() {
        let start = serde_json::to_string(&BackgroundMessage::StartBackgroundCheck).unwrap();
        assert_eq!(start, r#"{"type":"START_BACKGROUND_CHECK"}"#);

        let parsed: BackgroundMessage =
            serde_json::from_str(r#"{"type":"CHECK_TASKS_REQUEST"}"#).unwrap();
        assert_eq!(parsed, BackgroundMessage::CheckTasksRequest);

        assert!(serde_json::from_str::<BackgroundMessage>(r#"{"type":"REBOOT"}"#).is_err());
    }

    #[tokio::test]
    async fn worker_waits_for_start_then_requests_checks() {
        let (mut link, endpoint) = channel(1);
        let worker = KeepAliveWorker::new(endpoint, Duration::from_millis(20)).spawn();

        let early =
            tokio::time::timeout(Duration::from_millis(60), link.from_background.recv()).await;
        assert!(early.is_err(), "no requests before registration");

        link.to_background
            .send(BackgroundMessage::StartBackgroundCheck)
            .await
            .unwrap();
        let request = tokio::time::timeout(Duration::from_secs(5), link.from_background.recv())
            .await
            .unwrap();
        assert_eq!(request, Some(BackgroundMessage::CheckTasksRequest));

        drop(link);
        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .unwrap()
            .unwrap();
    }
}
