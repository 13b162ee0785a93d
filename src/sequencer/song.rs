// Song data model - setlists, songs and their tick-stamped events
//
// These records are produced by the setlist source (persistence lives outside this crate);
// the engine only consumes them.

use super::timeline::{Tick, TimeSignature, TimingError, validate_ppqn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// External MIDI device a preset is aimed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceId {
    DeviceA,
    DeviceB,
    DeviceC,
    DeviceD,
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceId::DeviceA => "DeviceA",
            DeviceId::DeviceB => "DeviceB",
            DeviceId::DeviceC => "DeviceC",
            DeviceId::DeviceD => "DeviceD",
        };
        f.write_str(name)
    }
}

/// One Control Change inside a preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlChange {
    pub controller: u8,
    pub value: u8,
}

/// A Program Change plus ordered Control Changes for one device/channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiPreset {
    pub device: DeviceId,
    pub channel: u8,
    pub program_change: u8,
    #[serde(default)]
    pub control_changes: Vec<ControlChange>,
}

impl MidiPreset {
    pub fn new(device: DeviceId, channel: u8, program_change: u8) -> Self {
        Self {
            device,
            channel,
            program_change,
            control_changes: Vec::new(),
        }
    }

    /// Builder-style helper to append a Control Change
    pub fn with_cc(mut self, controller: u8, value: u8) -> Self {
        self.control_changes.push(ControlChange { controller, value });
        self
    }

    /// True when every field fits its MIDI range
    pub fn is_valid(&self) -> bool {
        self.channel <= 15
            && self.program_change <= 127
            && self
                .control_changes
                .iter()
                .all(|cc| cc.controller <= 127 && cc.value <= 127)
    }
}

/// Tempo/meter/preset change point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub bpm: f64,
    pub time_signature: TimeSignature,
    #[serde(default)]
    pub presets: Vec<MidiPreset>,
}

/// Request to play a pre-loaded sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioCue {
    pub sample_ref: String,
    pub gain_db: f32,
}

/// Song event variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SongEvent {
    SectionChange(Section),
    AudioCue(AudioCue),
}

/// A song event stamped with the tick it fires on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub tick: Tick,
    pub event: SongEvent,
}

impl TimedEvent {
    pub fn section(tick: Tick, section: Section) -> Self {
        Self {
            tick,
            event: SongEvent::SectionChange(section),
        }
    }

    pub fn cue(tick: Tick, sample_ref: impl Into<String>, gain_db: f32) -> Self {
        Self {
            tick,
            event: SongEvent::AudioCue(AudioCue {
                sample_ref: sample_ref.into(),
                gain_db,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub title: String,
    #[serde(default)]
    pub artist: String,
    pub duration_ticks: Tick,
    /// Authoring order; not required to be sorted
    #[serde(default)]
    pub events: Vec<TimedEvent>,
}

impl Song {
    pub fn new(title: impl Into<String>, duration_ticks: Tick) -> Self {
        Self {
            title: title.into(),
            artist: String::new(),
            duration_ticks,
            events: Vec::new(),
        }
    }

    pub fn with_event(mut self, event: TimedEvent) -> Self {
        self.events.push(event);
        self
    }

    /// First section authored at tick 0, which seeds the song's tempo
    pub fn opening_section(&self) -> Option<&Section> {
        self.events.iter().find_map(|e| match &e.event {
            SongEvent::SectionChange(section) if e.tick == 0 => Some(section),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setlist {
    pub name: String,
    pub ppqn: u32,
    pub songs: Vec<Song>,
}

impl Setlist {
    pub fn new(name: impl Into<String>, ppqn: u32) -> Self {
        Self {
            name: name.into(),
            ppqn,
            songs: Vec::new(),
        }
    }

    pub fn with_song(mut self, song: Song) -> Self {
        self.songs.push(song);
        self
    }

    /// Checks the resolution and every section's meter
    pub fn validate(&self) -> Result<(), TimingError> {
        validate_ppqn(self.ppqn)?;
        for song in &self.songs {
            for event in &song.events {
                if let SongEvent::SectionChange(section) = &event.event {
                    section.time_signature.validate()?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(name: &str, bpm: f64) -> Section {
        Section {
            name: name.to_string(),
            bpm,
            time_signature: TimeSignature::four_four(),
            presets: Vec::new(),
        }
    }

    #[test]
    fn test_opening_section() {
        let song = Song::new("Intro", 1920)
            .with_event(TimedEvent::cue(0, "count-in", 0.0))
            .with_event(TimedEvent::section(960, section("Verse", 100.0)))
            .with_event(TimedEvent::section(0, section("Start", 90.0)));

        assert_eq!(song.opening_section().map(|s| s.name.as_str()), Some("Start"));

        let no_opening = Song::new("Late", 1920)
            .with_event(TimedEvent::section(480, section("Verse", 100.0)));
        assert!(no_opening.opening_section().is_none());
    }

    #[test]
    fn test_preset_validation() {
        let ok = MidiPreset::new(DeviceId::DeviceA, 0, 3).with_cc(7, 100);
        assert!(ok.is_valid());

        let bad_channel = MidiPreset::new(DeviceId::DeviceA, 16, 3);
        assert!(!bad_channel.is_valid());

        let bad_cc = MidiPreset::new(DeviceId::DeviceB, 0, 3).with_cc(128, 0);
        assert!(!bad_cc.is_valid());
    }

    #[test]
    fn test_setlist_validation() {
        let setlist = Setlist::new("Show", 480).with_song(Song::new("One", 100));
        assert!(setlist.validate().is_ok());

        let zero = Setlist::new("Broken", 0);
        assert_eq!(zero.validate(), Err(TimingError::ZeroPpqn));

        let mut bad_meter = section("Odd", 120.0);
        bad_meter.time_signature = TimeSignature {
            numerator: 5,
            denominator: 3,
        };
        let setlist = Setlist::new("Show", 480)
            .with_song(Song::new("One", 100).with_event(TimedEvent::section(0, bad_meter)));
        assert!(setlist.validate().is_err());
    }

    #[test]
    fn test_device_display() {
        assert_eq!(DeviceId::DeviceC.to_string(), "DeviceC");
    }
}
