//! Notice composition - the text and cues delivered for each scheduler event

use crate::models::TaskDetail;
use crate::settings::VoiceSettings;
use serde::{Deserialize, Serialize};

const VIBRATE_DEFAULT: &[u32] = &[200, 100, 200];
const VIBRATE_SHORT: &[u32] = &[100];
const VIBRATE_URGENT: &[u32] = &[100, 50, 100, 50, 100];
const VIBRATE_LONG: &[u32] = &[300, 100, 300];
const VIBRATE_OVERTIME: &[u32] = &[300, 100, 300, 100, 300];

/// Audio cue played alongside a notice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SoundCue {
    Start,
    End,
    Warning,
}

/// Which countdown ran out.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OvertimePhase {
    Start,
    Completion,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoticeKind {
    StartSoon { minutes: u32 },
    TaskStart,
    Overtime { phase: OvertimePhase, count: u32 },
    InProgress { elapsed_minutes: i64 },
    EndingSoon { minutes: u32 },
    TaskEnd,
}

impl NoticeKind {
    fn tag_prefix(&self) -> &'static str {
        match self {
            NoticeKind::StartSoon { .. } => "task-start-before",
            NoticeKind::TaskStart => "task-start",
            NoticeKind::Overtime {
                phase: OvertimePhase::Start,
                ..
            } => "task-overtime-start",
            NoticeKind::Overtime {
                phase: OvertimePhase::Completion,
                ..
            } => "task-overtime-completion",
            NoticeKind::InProgress { .. } => "task-during",
            NoticeKind::EndingSoon { .. } => "task-ending",
            NoticeKind::TaskEnd => "task-end",
        }
    }
}

/// Spoken form of a notice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// One event as it goes out on every channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notice {
    pub task_id: String,
    pub kind: NoticeKind,
    pub title: String,
    pub body: String,
    /// Dedupe tag; a later alert with the same tag replaces the earlier one.
    pub tag: String,
    pub require_interaction: bool,
    pub vibration: Vec<u32>,
    pub sound: SoundCue,
    pub speech: Option<Utterance>,
}

impl Notice {
    fn new(
        detail: &TaskDetail,
        kind: NoticeKind,
        title: &str,
        body: String,
        require_interaction: bool,
        vibration: &[u32],
        sound: SoundCue,
    ) -> Self {
        Self {
            task_id: detail.task_id.clone(),
            tag: format!("{}-{}", kind.tag_prefix(), detail.task_id),
            kind,
            title: title.to_string(),
            body,
            require_interaction,
            vibration: vibration.to_vec(),
            sound,
            speech: None,
        }
    }

    /// Attach the spoken form of the body, unless speech is switched off.
    pub fn with_voice(mut self, voice: &VoiceSettings) -> Self {
        self.speech = voice.enabled.then(|| Utterance {
            text: self.body.clone(),
            rate: voice.rate,
            pitch: voice.pitch,
            volume: voice.volume,
        });
        self
    }
}

fn keyword_hint(keywords: &[String]) -> String {
    if keywords.is_empty() {
        String::new()
    } else {
        format!(" (keywords: {})", keywords.join(", "))
    }
}

pub fn start_soon(detail: &TaskDetail, minutes: u32) -> Notice {
    let body = if detail.has_verification {
        format!(
            "{} starts in {} minutes, get ready to verify the start{}",
            detail.title,
            minutes,
            keyword_hint(&detail.start_keywords)
        )
    } else {
        format!("{} starts in {} minutes", detail.title, minutes)
    };
    Notice::new(
        detail,
        NoticeKind::StartSoon { minutes },
        "⏰ Task starting soon",
        body,
        detail.has_verification,
        VIBRATE_DEFAULT,
        SoundCue::Start,
    )
}

pub fn task_start(detail: &TaskDetail) -> Notice {
    let mut body = if detail.has_verification {
        format!(
            "{} has started, please verify the start{}",
            detail.title,
            keyword_hint(&detail.start_keywords)
        )
    } else {
        format!("{} has started", detail.title)
    };
    if detail.gold_reward > 0 {
        body.push_str(&format!(". Reward: {} gold", detail.gold_reward));
    }
    Notice::new(
        detail,
        NoticeKind::TaskStart,
        "📋 Task started",
        body,
        detail.has_verification,
        VIBRATE_DEFAULT,
        SoundCue::Start,
    )
}

/// Escalation for a missed deadline; `count` is the 1-based number of misses.
pub fn overtime(detail: &TaskDetail, phase: OvertimePhase, count: u32) -> Notice {
    let (title, action) = match phase {
        OvertimePhase::Start => ("⚠️ Start overdue", "start"),
        OvertimePhase::Completion => ("⚠️ Completion overdue", "finish"),
    };
    let body = match count {
        0 | 1 => format!("Time to {} {}. You've got this!", action, detail.title),
        2 | 3 => format!(
            "{} is still waiting, missed {} times. Please {} it now.",
            detail.title, count, action
        ),
        _ => format!(
            "Procrastination alert: {} missed {} times in a row. {} it right now!",
            detail.title,
            count,
            capitalize(action)
        ),
    };
    Notice::new(
        detail,
        NoticeKind::Overtime { phase, count },
        title,
        body,
        true,
        VIBRATE_OVERTIME,
        SoundCue::Warning,
    )
}

pub fn in_progress(detail: &TaskDetail, elapsed_minutes: i64) -> Notice {
    Notice::new(
        detail,
        NoticeKind::InProgress { elapsed_minutes },
        "⏳ Task in progress",
        format!("{}: {} minutes in, keep going", detail.title, elapsed_minutes),
        false,
        VIBRATE_SHORT,
        SoundCue::Start,
    )
}

pub fn ending_soon(detail: &TaskDetail, minutes: u32) -> Notice {
    let body = if detail.has_verification {
        format!(
            "{} ends in {} minutes, get ready to verify completion{}",
            detail.title,
            minutes,
            keyword_hint(&detail.complete_keywords)
        )
    } else {
        format!("{} ends in {} minutes", detail.title, minutes)
    };
    Notice::new(
        detail,
        NoticeKind::EndingSoon { minutes },
        "⏰ Task ending soon",
        body,
        detail.has_verification,
        VIBRATE_URGENT,
        SoundCue::Warning,
    )
}

pub fn task_end(detail: &TaskDetail) -> Notice {
    let body = if detail.has_verification {
        format!(
            "{} has ended, please verify completion{}",
            detail.title,
            keyword_hint(&detail.complete_keywords)
        )
    } else {
        format!("{} has ended", detail.title)
    };
    Notice::new(
        detail,
        NoticeKind::TaskEnd,
        "✅ Task ended",
        body,
        detail.has_verification,
        VIBRATE_LONG,
        SoundCue::End,
    )
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn detail() -> TaskDetail {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let mut d = TaskDetail::new("t9", "Read chapter 3", start, start + Duration::minutes(45));
        d.has_verification = true;
        d.start_keywords = vec!["book".into(), "desk".into()];
        d.gold_reward = 15;
        d
    }

    #[test]
    fn start_notice_mentions_verification_and_reward() {
        let notice = task_start(&detail());
        assert_eq!(notice.tag, "task-start-t9");
        assert!(notice.require_interaction);
        assert!(notice.body.contains("verify the start (keywords: book, desk)"));
        assert!(notice.body.ends_with("Reward: 15 gold"));
    }

    #[test]
    fn overtime_wording_escalates() {
        let d = detail();
        let first = overtime(&d, OvertimePhase::Start, 1);
        let fifth = overtime(&d, OvertimePhase::Start, 5);
        assert!(first.body.starts_with("Time to start"));
        assert!(fifth.body.starts_with("Procrastination alert"));
        assert!(fifth.body.contains("Start it right now"));
        assert_eq!(fifth.kind, NoticeKind::Overtime { phase: OvertimePhase::Start, count: 5 });
        assert_eq!(fifth.sound, SoundCue::Warning);
    }

    #[test]
    fn voice_can_be_disabled() {
        let voice = VoiceSettings {
            enabled: false,
            ..VoiceSettings::default()
        };
        assert!(task_end(&detail()).with_voice(&voice).speech.is_none());

        let spoken = task_end(&detail()).with_voice(&VoiceSettings::default());
        let utterance = spoken.speech.unwrap();
        assert_eq!(utterance.text, spoken.body);
        assert_eq!(utterance.volume, 0.8);
    }
}
