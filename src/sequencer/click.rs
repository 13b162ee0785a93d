// Click synthesis - short sine bursts rendered on beats
//
// Bursts are computed sample by sample with a linear fade-out, so starting one
// never allocates on the audio thread.

use std::f64::consts::TAU;

/// Metronome click type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickType {
    /// Click on first beat of bar (downbeat)
    Accent,
    /// Click on other beats
    Regular,
}

impl ClickType {
    /// Accent on beat 0 of the bar
    pub fn for_beat(beat: u32) -> Self {
        if beat == 0 {
            ClickType::Accent
        } else {
            ClickType::Regular
        }
    }

    /// Sine frequency in Hz
    pub fn frequency(self) -> f64 {
        match self {
            ClickType::Accent => 1200.0,
            ClickType::Regular => 800.0,
        }
    }

    /// Burst length. Short enough to be heard as a click, never a tone.
    pub fn duration_ms(self) -> f64 {
        match self {
            ClickType::Accent => 15.0,
            ClickType::Regular => 10.0,
        }
    }
}

/// An in-flight click: a sine at a fixed frequency faded out linearly
#[derive(Debug, Clone)]
pub struct ClickBurst {
    click_type: ClickType,
    phase_increment: f64,
    total: u32,
    remaining: u32,
}

impl ClickBurst {
    pub fn new(click_type: ClickType, sample_rate: f64) -> Self {
        let total = ((click_type.duration_ms() / 1000.0) * sample_rate).round().max(1.0) as u32;

        Self {
            click_type,
            phase_increment: TAU * click_type.frequency() / sample_rate,
            total,
            remaining: total,
        }
    }

    pub fn click_type(&self) -> ClickType {
        self.click_type
    }

    /// Total burst length in samples
    pub fn total_samples(&self) -> u32 {
        self.total
    }

    pub fn remaining_samples(&self) -> u32 {
        self.remaining
    }

    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }

    /// Next unscaled sample, `None` once the burst has decayed
    #[inline]
    pub fn next_sample(&mut self) -> Option<f32> {
        if self.remaining == 0 {
            return None;
        }

        let position = (self.total - self.remaining) as f64;
        let envelope = self.remaining as f64 / self.total as f64;
        self.remaining -= 1;

        Some(((position * self.phase_increment).sin() * envelope) as f32)
    }
}
