// Tick clock - sample-accurate tick/beat generator driven by the audio callback
//
// The clock renders its own click audio and, frame by frame, emits tick and beat
// events to registered listeners. Control threads talk to it through a
// `ClockHandle` that only touches atomics, so the render path never locks.

use super::click::{ClickBurst, ClickType};
use super::timeline::{
    BarPosition, Tempo, Tick, TimeSignature, TimingError, samples_per_tick, validate_ppqn,
};
use crate::audio::parameters::{AtomicF32, AtomicF64};
use crate::audio::routing::AudioSource;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};

/// Receives the tick stream. Runs on the audio thread: must not block or allocate.
pub trait ClockListener: Send {
    /// Called once per tick, in registration order
    fn on_tick(&mut self, _tick: Tick) {}

    /// Called on every quarter-note boundary, after all `on_tick` calls of that tick
    fn on_beat(&mut self, _beat: u32, _bar: u64) {}
}

/// What a tick consumer needs from the clock that drives it
pub trait ClockControl: Send + Sync {
    /// Last published tick. A tick is published after its `on_tick` and
    /// `on_beat` listener calls.
    fn current_tick(&self) -> Tick;

    fn ppqn(&self) -> u32;

    fn tempo(&self) -> Tempo;

    /// Retarget tempo; the next tick boundary uses the new rate
    fn change_tempo(&self, tempo: Tempo);

    /// Zero tick and accumulator without touching the running flag
    fn reset(&self);

    /// True while a reset has been requested but not yet applied
    fn is_reset_pending(&self) -> bool {
        false
    }
}

/// State shared between the render thread and control threads
#[derive(Debug)]
pub struct SharedClockState {
    ppqn: u32,
    bpm: AtomicF64,
    signature: AtomicU16,
    running: AtomicBool,
    reset_pending: AtomicBool,
    tick: AtomicU64,
    master_volume: AtomicF32,
    beat_volume: AtomicF32,
}

impl SharedClockState {
    fn new(ppqn: u32, tempo: Tempo) -> Self {
        Self {
            ppqn,
            bpm: AtomicF64::new(tempo.bpm()),
            signature: AtomicU16::new(tempo.time_signature().to_bits()),
            running: AtomicBool::new(false),
            reset_pending: AtomicBool::new(false),
            tick: AtomicU64::new(0),
            master_volume: AtomicF32::new(1.0),
            beat_volume: AtomicF32::new(0.8),
        }
    }

    fn time_signature(&self) -> TimeSignature {
        TimeSignature::from_bits(self.signature.load(Ordering::Acquire))
    }

    fn tempo(&self) -> Tempo {
        // Both halves were validated when stored
        Tempo::new(self.bpm.get(), self.time_signature()).unwrap_or_default()
    }

    fn set_tempo(&self, tempo: Tempo) {
        self.signature
            .store(tempo.time_signature().to_bits(), Ordering::Release);
        self.bpm.set(tempo.bpm());
    }
}

/// Cheap, cloneable control surface for a `TickClock` living on the audio thread
#[derive(Debug, Clone)]
pub struct ClockHandle {
    shared: Arc<SharedClockState>,
}

impl ClockHandle {
    pub fn start(&self) {
        self.shared.running.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Clamped to 0.0..=1.0
    pub fn set_master_volume(&self, volume: f32) {
        self.shared.master_volume.set(volume.clamp(0.0, 1.0));
    }

    pub fn master_volume(&self) -> f32 {
        self.shared.master_volume.get()
    }

    /// Clamped to 0.0..=1.0
    pub fn set_beat_volume(&self, volume: f32) {
        self.shared.beat_volume.set(volume.clamp(0.0, 1.0));
    }

    pub fn beat_volume(&self) -> f32 {
        self.shared.beat_volume.get()
    }
}

impl ClockControl for ClockHandle {
    fn current_tick(&self) -> Tick {
        self.shared.tick.load(Ordering::Acquire)
    }

    fn ppqn(&self) -> u32 {
        self.shared.ppqn
    }

    fn tempo(&self) -> Tempo {
        self.shared.tempo()
    }

    fn change_tempo(&self, tempo: Tempo) {
        log::debug!("Clock tempo -> {}", tempo);
        self.shared.set_tempo(tempo);
    }

    fn reset(&self) {
        self.shared.reset_pending.store(true, Ordering::Release);
    }

    fn is_reset_pending(&self) -> bool {
        self.shared.reset_pending.load(Ordering::Acquire)
    }
}

/// Audio-callback-driven tick generator and click synthesizer
pub struct TickClock {
    sample_rate: f64,
    ppqn: u32,
    shared: Arc<SharedClockState>,
    accumulator: f64,
    tick: Tick,
    burst: Option<ClickBurst>,
    listeners: Vec<Box<dyn ClockListener>>,
}

impl TickClock {
    pub fn new(sample_rate: u32, ppqn: u32, tempo: Tempo) -> Result<Self, TimingError> {
        if sample_rate == 0 {
            return Err(TimingError::InvalidSampleRate);
        }
        validate_ppqn(ppqn)?;

        Ok(Self {
            sample_rate: sample_rate as f64,
            ppqn,
            shared: Arc::new(SharedClockState::new(ppqn, tempo)),
            accumulator: 0.0,
            tick: 0,
            burst: None,
            listeners: Vec::new(),
        })
    }

    /// Control handle usable from any thread
    pub fn handle(&self) -> ClockHandle {
        ClockHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Register a tick/beat listener. Listeners are fixed once the clock moves
    /// into the audio callback.
    pub fn add_listener(&mut self, listener: Box<dyn ClockListener>) {
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn start(&self) {
        self.shared.running.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn ppqn(&self) -> u32 {
        self.ppqn
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn tempo(&self) -> Tempo {
        self.shared.tempo()
    }

    /// Applied on the next rendered frame
    pub fn change_tempo(&self, tempo: Tempo) {
        self.shared.set_tempo(tempo);
    }

    /// Zero tick and accumulator immediately. The running flag is left alone.
    pub fn reset(&mut self) {
        self.tick = 0;
        self.accumulator = 0.0;
        self.shared.tick.store(0, Ordering::Release);
        self.shared.reset_pending.store(false, Ordering::Release);
    }

    /// Click burst currently sounding, if any
    pub fn active_click(&self) -> Option<ClickType> {
        self.burst.as_ref().map(ClickBurst::click_type)
    }

    #[inline]
    fn apply_pending_reset(&mut self) {
        if self.shared.reset_pending.load(Ordering::Acquire) {
            self.tick = 0;
            self.accumulator = 0.0;
            // Publish the zero before clearing the flag so pollers never see a stale tick
            self.shared.tick.store(0, Ordering::Release);
            self.shared.reset_pending.store(false, Ordering::Release);
        }
    }

    #[inline]
    fn current_samples_per_tick(&self) -> f64 {
        samples_per_tick(self.sample_rate, self.shared.bpm.get(), self.ppqn)
    }

    fn advance_tick(&mut self) {
        self.tick += 1;

        let tick = self.tick;
        for listener in self.listeners.iter_mut() {
            listener.on_tick(tick);
        }

        if tick % self.ppqn as u64 == 0 {
            let position = BarPosition::from_tick(tick, self.ppqn, self.shared.time_signature());

            for listener in self.listeners.iter_mut() {
                listener.on_beat(position.beat, position.bar);
            }
            self.burst = Some(ClickBurst::new(
                ClickType::for_beat(position.beat),
                self.sample_rate,
            ));
        }

        // Published only once every listener has seen the tick, so anything
        // polling `current_tick` reacts after the tick's Beat
        self.shared.tick.store(tick, Ordering::Release);

        // A listener may have requested a reset (song change)
        self.apply_pending_reset();
    }

    /// Advance one frame and return the unscaled click sample
    #[inline]
    fn step_frame(&mut self) -> f32 {
        self.apply_pending_reset();

        if !self.shared.running.load(Ordering::Acquire) {
            self.burst = None;
            return 0.0;
        }

        self.accumulator += 1.0;
        let mut spt = self.current_samples_per_tick();
        while self.accumulator >= spt {
            self.accumulator -= spt;
            self.advance_tick();
            // Tempo may have been retargeted by a listener on that tick
            spt = self.current_samples_per_tick();
        }

        match self.burst.as_mut().and_then(ClickBurst::next_sample) {
            Some(sample) => sample,
            None => {
                self.burst = None;
                0.0
            }
        }
    }

    /// Render interleaved stereo frames. Returns the number of frames written.
    pub fn render_stereo(&mut self, out: &mut [f32], frames: usize) -> usize {
        let frames = frames.min(out.len() / 2);
        let gain = self.shared.master_volume.get() * self.shared.beat_volume.get();

        for frame in out[..frames * 2].chunks_exact_mut(2) {
            let sample = self.step_frame() * gain;
            frame[0] = sample;
            frame[1] = sample;
        }

        frames
    }
}

impl AudioSource for TickClock {
    fn channels(&self) -> usize {
        2
    }

    fn render(&mut self, out: &mut [f32], frames: usize) -> usize {
        self.render_stereo(out, frames)
    }
}
