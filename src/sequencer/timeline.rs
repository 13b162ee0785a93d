// Timeline - Musical time representation
// Tick resolution, tempo and time signature, and the conversions between them

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Smallest timing unit. Advances by exactly one per clock step.
pub type Tick = u64;

/// Default tick resolution (Pulses Per Quarter Note)
pub const DEFAULT_PPQN: u32 = 480;

/// MIDI clock resolution, fixed by the MIDI specification
pub const MIDI_CLOCK_PPQN: u32 = 24;

/// Upper tempo bound; keeps the per-frame tick loop bounded
pub const MAX_BPM: f64 = 999.0;

/// Errors raised when building timing values
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimingError {
    #[error("BPM must be in (0, 999], got {0}")]
    InvalidBpm(f64),

    #[error("Invalid time signature {numerator}/{denominator}")]
    InvalidTimeSignature { numerator: u8, denominator: u8 },

    #[error("PPQN must be greater than zero")]
    ZeroPpqn,

    #[error("PPQN {0} is not divisible by 24, MIDI clock cannot be derived from it")]
    PpqnNotClockCompatible(u32),

    #[error("Sample rate must be greater than zero")]
    InvalidSampleRate,
}

/// Time signature (numerator/denominator)
/// Example: 4/4 time = TimeSignature { numerator: 4, denominator: 4 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,   // Beats per bar
    pub denominator: u8, // Note value (4 = quarter note, 8 = eighth note)
}

impl TimeSignature {
    /// Creates a new time signature
    pub fn new(numerator: u8, denominator: u8) -> Result<Self, TimingError> {
        if numerator == 0 || !denominator.is_power_of_two() {
            return Err(TimingError::InvalidTimeSignature {
                numerator,
                denominator,
            });
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Common 4/4 time signature
    pub const fn four_four() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }

    /// Common 3/4 time signature (waltz)
    pub const fn three_four() -> Self {
        Self {
            numerator: 3,
            denominator: 4,
        }
    }

    /// Common 6/8 time signature
    pub const fn six_eight() -> Self {
        Self {
            numerator: 6,
            denominator: 8,
        }
    }

    /// Checks the invariants `new` enforces, for values built from deserialized data
    pub fn validate(&self) -> Result<(), TimingError> {
        Self::new(self.numerator, self.denominator).map(|_| ())
    }

    /// Pack into a u16 so the signature can live in a single atomic
    pub(crate) fn to_bits(self) -> u16 {
        ((self.numerator as u16) << 8) | self.denominator as u16
    }

    pub(crate) fn from_bits(bits: u16) -> Self {
        Self {
            numerator: (bits >> 8) as u8,
            denominator: (bits & 0xFF) as u8,
        }
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Tempo: quarter notes per minute plus the meter they are counted in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tempo {
    bpm: f64,
    time_signature: TimeSignature,
}

impl Tempo {
    /// Creates a new tempo
    pub fn new(bpm: f64, time_signature: TimeSignature) -> Result<Self, TimingError> {
        if !bpm.is_finite() || bpm <= 0.0 || bpm > MAX_BPM {
            return Err(TimingError::InvalidBpm(bpm));
        }
        time_signature.validate()?;
        Ok(Self {
            bpm,
            time_signature,
        })
    }

    /// Tempo in 4/4
    pub fn with_bpm(bpm: f64) -> Result<Self, TimingError> {
        Self::new(bpm, TimeSignature::four_four())
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Number of audio samples spanned by one tick
    pub fn samples_per_tick(&self, sample_rate: f64, ppqn: u32) -> f64 {
        samples_per_tick(sample_rate, self.bpm, ppqn)
    }

    /// Wall-clock duration of one tick
    pub fn tick_duration(&self, ppqn: u32) -> Duration {
        Duration::from_secs_f64(self.beat_duration_seconds() / ppqn.max(1) as f64)
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            time_signature: TimeSignature::four_four(),
        }
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM {}", self.bpm, self.time_signature)
    }
}

/// `R * 60 / (bpm * ppqn)`
#[inline]
pub fn samples_per_tick(sample_rate: f64, bpm: f64, ppqn: u32) -> f64 {
    sample_rate * 60.0 / (bpm * ppqn as f64)
}

/// Validates a tick resolution
pub fn validate_ppqn(ppqn: u32) -> Result<(), TimingError> {
    if ppqn == 0 {
        Err(TimingError::ZeroPpqn)
    } else {
        Ok(())
    }
}

/// Bar/beat position derived from an absolute tick.
/// Both counters are 0-based, matching the Beat notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BarPosition {
    pub bar: u64,
    pub beat: u32,
    pub tick_in_beat: u32,
}

impl BarPosition {
    /// Create from an absolute tick at a given resolution and meter
    pub fn from_tick(tick: Tick, ppqn: u32, time_signature: TimeSignature) -> Self {
        let ppqn = ppqn.max(1) as u64;
        let numerator = time_signature.numerator.max(1) as u64;
        let total_beats = tick / ppqn;

        Self {
            bar: total_beats / numerator,
            beat: (total_beats % numerator) as u32,
            tick_in_beat: (tick % ppqn) as u32,
        }
    }
}

impl fmt::Display for BarPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Displayed 1-based, the way musicians count
        write!(f, "{}:{:02}:{:03}", self.bar + 1, self.beat + 1, self.tick_in_beat)
    }
}
