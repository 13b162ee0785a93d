// Notifications - device faults, reconnects and performance events for display
//
// Payloads carry only owned data so a notification can cross threads through
// the ring buffer. `Beat` is plain Copy data: it is built on the audio thread.

use crate::sequencer::{DeviceId, TimeSignature};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Subsystem a notification comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationCategory {
    Midi,
    Audio,
    Transport,
    Generic,
}

/// What happened
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationKind {
    Fault { device: String, cause: String },
    Reconnected { device: String },
    Beat { beat: u32, bar: u64 },
    SongStarted { index: usize, title: String },
    SectionChanged {
        name: String,
        bpm: f64,
        time_signature: TimeSignature,
    },
    PresetChanged {
        device: DeviceId,
        channel: u8,
        program: u8,
    },
    CueFired { sample_ref: String, gain_db: f32 },
    SongFinished { index: usize, title: String },
    SetlistCompleted { name: String },
    Message(String),
}

impl NotificationKind {
    fn level(&self) -> NotificationLevel {
        match self {
            NotificationKind::Fault { .. } => NotificationLevel::Error,
            _ => NotificationLevel::Info,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Fault { device, cause } => {
                write!(f, "Device '{}' faulted: {}", device, cause)
            }
            NotificationKind::Reconnected { device } => write!(f, "Device '{}' reconnected", device),
            NotificationKind::Beat { beat, bar } => write!(f, "Bar {} beat {}", bar + 1, beat + 1),
            NotificationKind::SongStarted { index, title } => {
                write!(f, "Song {} started: {}", index + 1, title)
            }
            NotificationKind::SectionChanged {
                name,
                bpm,
                time_signature,
            } => write!(f, "Section '{}' ({:.1} BPM {})", name, bpm, time_signature),
            NotificationKind::PresetChanged {
                device,
                channel,
                program,
            } => write!(f, "Preset {} ch{} -> program {}", device, channel + 1, program),
            NotificationKind::CueFired { sample_ref, gain_db } => {
                write!(f, "Cue '{}' ({:+.1} dB)", sample_ref, gain_db)
            }
            NotificationKind::SongFinished { index, title } => {
                write!(f, "Song {} finished: {}", index + 1, title)
            }
            NotificationKind::SetlistCompleted { name } => write!(f, "Setlist '{}' completed", name),
            NotificationKind::Message(message) => f.write_str(message),
        }
    }
}

/// Notification with timestamp and metadata
#[derive(Debug, Clone)]
pub struct Notification {
    pub level: NotificationLevel,
    pub category: NotificationCategory,
    pub kind: NotificationKind,
    pub timestamp: u64, // Unix timestamp in milliseconds
}

impl Notification {
    /// Creates a notification stamped with the current time
    pub fn new(level: NotificationLevel, category: NotificationCategory, kind: NotificationKind) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            level,
            category,
            kind,
            timestamp,
        }
    }

    /// Level derived from the kind
    pub fn of(category: NotificationCategory, kind: NotificationKind) -> Self {
        Self::new(kind.level(), category, kind)
    }

    pub fn fault(category: NotificationCategory, device: &str, cause: impl Into<String>) -> Self {
        Self::of(
            category,
            NotificationKind::Fault {
                device: device.to_string(),
                cause: cause.into(),
            },
        )
    }

    pub fn reconnected(category: NotificationCategory, device: &str) -> Self {
        Self::of(
            category,
            NotificationKind::Reconnected {
                device: device.to_string(),
            },
        )
    }

    pub fn info(category: NotificationCategory, message: String) -> Self {
        Self::new(NotificationLevel::Info, category, NotificationKind::Message(message))
    }

    pub fn warning(category: NotificationCategory, message: String) -> Self {
        Self::new(NotificationLevel::Warning, category, NotificationKind::Message(message))
    }

    /// Human-readable text
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    /// True if the notification is younger than `max_age_ms`
    pub fn is_recent(&self, max_age_ms: u64) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        now.saturating_sub(self.timestamp) < max_age_ms
    }
}
