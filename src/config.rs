// Engine configuration - RON file with defaults for everything

use crate::connection::ReconnectPolicy;
use crate::connection::reconnect::{AUDIO_RECONNECT_INTERVAL, MIDI_RECONNECT_INTERVAL};
use crate::sequencer::{DEFAULT_PPQN, DeviceId, MIDI_CLOCK_PPQN, Setlist, TimingError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("RON error: {0}")]
    Serialize(#[from] ron::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid timing: {0}")]
    Timing(#[from] TimingError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name; "default" picks the host default
    pub device: Option<String>,
    pub sample_rate: u32,
    /// Fixed driver buffer size, driver default when absent
    pub buffer_frames: Option<u32>,
    pub channels: u16,
    /// First channel of the click pair
    pub click_offset: usize,
    /// First channel of the cue playback pair
    pub cue_offset: usize,
    pub master_volume: f32,
    pub beat_volume: f32,
    pub max_cue_voices: usize,
    pub reconnect_interval_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: Some("default".to_string()),
            sample_rate: 44100,
            buffer_frames: Some(256),
            channels: 4,
            click_offset: 0,
            cue_offset: 2,
            master_volume: 1.0,
            beat_volume: 0.8,
            max_cue_voices: 8,
            reconnect_interval_ms: AUDIO_RECONNECT_INTERVAL.as_millis() as u64,
        }
    }
}

impl AudioConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(Duration::from_millis(self.reconnect_interval_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiConfig {
    /// Output port per device
    pub devices: BTreeMap<DeviceId, String>,
    /// Devices that receive MIDI clock and transport
    pub clock_targets: Vec<DeviceId>,
    pub reconnect_interval_ms: u64,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            devices: BTreeMap::new(),
            clock_targets: Vec::new(),
            reconnect_interval_ms: MIDI_RECONNECT_INTERVAL.as_millis() as u64,
        }
    }
}

impl MidiConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(Duration::from_millis(self.reconnect_interval_ms))
    }

    /// Device to port routes for preset dispatch
    pub fn routes(&self) -> HashMap<DeviceId, String> {
        self.devices
            .iter()
            .map(|(device, port)| (*device, port.clone()))
            .collect()
    }

    /// Port names of the clock targets, in configuration order
    pub fn clock_ports(&self) -> Vec<String> {
        self.clock_targets
            .iter()
            .filter_map(|device| self.devices.get(device).cloned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub audio: AudioConfig,
    pub midi: MidiConfig,
    pub ppqn: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            midi: MidiConfig::default(),
            ppqn: DEFAULT_PPQN,
        }
    }
}

impl EngineConfig {
    /// `<config dir>/stageclock/config.ron`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stageclock").join("config.ron"))
    }

    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_ron_str(&text)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, else the default file if it exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                log::info!("No configuration file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_ron_string()?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let audio = &self.audio;
        let channels = audio.channels as usize;

        if audio.sample_rate == 0 {
            return Err(TimingError::InvalidSampleRate.into());
        }
        if channels < 2 {
            return Err(ConfigError::Invalid(format!(
                "at least 2 output channels required, got {}",
                channels
            )));
        }
        for (label, offset) in [("click", audio.click_offset), ("cue", audio.cue_offset)] {
            if offset >= channels - 1 {
                return Err(ConfigError::Invalid(format!(
                    "{} offset {} does not fit {} channels",
                    label, offset, channels
                )));
            }
        }
        for (label, volume) in [("master", audio.master_volume), ("beat", audio.beat_volume)] {
            if !(0.0..=1.0).contains(&volume) {
                return Err(ConfigError::Invalid(format!(
                    "{} volume must be within 0..=1, got {}",
                    label, volume
                )));
            }
        }

        if self.ppqn == 0 {
            return Err(TimingError::ZeroPpqn.into());
        }
        if !self.midi.clock_targets.is_empty() && self.ppqn % MIDI_CLOCK_PPQN != 0 {
            return Err(TimingError::PpqnNotClockCompatible(self.ppqn).into());
        }
        if let Some(device) = self
            .midi
            .clock_targets
            .iter()
            .find(|d| !self.midi.devices.contains_key(*d))
        {
            return Err(ConfigError::Invalid(format!(
                "clock target {} has no MIDI port configured",
                device
            )));
        }
        Ok(())
    }
}

/// Read a setlist from a RON file
pub fn load_setlist(path: &Path) -> Result<Setlist, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let setlist: Setlist = ron::from_str(&text)?;
    setlist.validate()?;
    Ok(setlist)
}
