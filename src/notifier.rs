//! Notifier module - Fan a notice out to alert, sound, speech and vibration

use crate::notice::{Notice, SoundCue, Utterance};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Alert,
    Sound,
    Speech,
    Vibration,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Channel::Alert => "alert",
            Channel::Sound => "sound",
            Channel::Speech => "speech",
            Channel::Vibration => "vibration",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Permission denied for {0} channel")]
    PermissionDenied(Channel),

    #[error("{channel} channel unavailable: {reason}")]
    Unavailable { channel: Channel, reason: String },
}

/// Delivery surface owned by the host. Calls are fire-and-forget and must
/// not call back into the scheduler synchronously.
pub trait NotificationDispatcher: Send + Sync {
    fn show(&self, notice: &Notice) -> Result<(), DispatchError>;
    fn play(&self, cue: SoundCue) -> Result<(), DispatchError>;
    fn speak(&self, utterance: &Utterance) -> Result<(), DispatchError>;
    fn vibrate(&self, pattern: &[u32]) -> Result<(), DispatchError>;
}

/// Send a notice on every relevant channel. A failing channel is logged and
/// skipped. Returns the number of channels that accepted the notice.
pub fn deliver(dispatcher: &dyn NotificationDispatcher, notice: &Notice) -> usize {
    let mut attempts = vec![
        (Channel::Alert, dispatcher.show(notice)),
        (Channel::Sound, dispatcher.play(notice.sound)),
    ];
    if let Some(utterance) = &notice.speech {
        attempts.push((Channel::Speech, dispatcher.speak(utterance)));
    }
    if !notice.vibration.is_empty() {
        attempts.push((Channel::Vibration, dispatcher.vibrate(&notice.vibration)));
    }

    let mut delivered = 0;
    for (channel, result) in attempts {
        match result {
            Ok(()) => delivered += 1,
            Err(e) => tracing::warn!("Skipping {} for '{}': {}", channel, notice.tag, e),
        }
    }
    delivered
}

/// Dispatcher that only writes notices to the log.
#[derive(Debug, Default)]
pub struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn show(&self, notice: &Notice) -> Result<(), DispatchError> {
        tracing::info!("[{}] {}: {}", notice.tag, notice.title, notice.body);
        Ok(())
    }

    fn play(&self, cue: SoundCue) -> Result<(), DispatchError> {
        tracing::debug!("Sound cue: {:?}", cue);
        Ok(())
    }

    fn speak(&self, utterance: &Utterance) -> Result<(), DispatchError> {
        tracing::debug!("Speech (rate {}): {}", utterance.rate, utterance.text);
        Ok(())
    }

    fn vibrate(&self, pattern: &[u32]) -> Result<(), DispatchError> {
        tracing::debug!("Vibration pattern: {:?}", pattern);
        Ok(())
    }
}

/// Keeps every shown notice in memory so a host can drain and render them.
#[derive(Debug, Default)]
pub struct MemoryDispatcher {
    shown: Mutex<Vec<Notice>>,
}

impl MemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notices shown so far, oldest first.
    pub fn shown(&self) -> Vec<Notice> {
        match self.shown.lock() {
            Ok(shown) => shown.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn drain(&self) -> Vec<Notice> {
        match self.shown.lock() {
            Ok(mut shown) => std::mem::take(&mut *shown),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl NotificationDispatcher for MemoryDispatcher {
    fn show(&self, notice: &Notice) -> Result<(), DispatchError> {
        match self.shown.lock() {
            Ok(mut shown) => shown.push(notice.clone()),
            Err(poisoned) => poisoned.into_inner().push(notice.clone()),
        }
        Ok(())
    }

    fn play(&self, _cue: SoundCue) -> Result<(), DispatchError> {
        Ok(())
    }

    fn speak(&self, _utterance: &Utterance) -> Result<(), DispatchError> {
        Ok(())
    }

    fn vibrate(&self, _pattern: &[u32]) -> Result<(), DispatchError> {
        Ok(())
    }
}
