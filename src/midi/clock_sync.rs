// MIDI clock - transport bytes derived from the audio clock's tick stream
//
// Pulses are counted off the same ticks that drive the audible click, so the
// two can never drift apart and tempo changes need no handling here.

use super::message::MidiMessage;
use crate::connection::{DeviceError, DeviceManager, DevicePort, PortConnector};
use crate::sequencer::{
    ClockListener, MIDI_CLOCK_PPQN, Setlist, Song, Tick, TimelineObserver, TimingError,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Outbound MIDI paths, implemented by the MIDI device manager
pub trait MidiSender: Send + Sync + 'static {
    /// Send now, or drop while the port is down. Called from the audio
    /// thread: must not wait on a reconnect.
    fn send_best_effort(&self, port: &str, message: &MidiMessage);

    /// Queued delivery, replayed after reconnect
    fn send_reliable(&self, port: &str, message: MidiMessage) -> Result<(), DeviceError>;
}

impl<C> MidiSender for DeviceManager<C>
where
    C: PortConnector,
    C::Port: DevicePort<Message = MidiMessage>,
{
    fn send_best_effort(&self, port: &str, message: &MidiMessage) {
        DeviceManager::send_best_effort(self, port, message)
    }

    fn send_reliable(&self, port: &str, message: MidiMessage) -> Result<(), DeviceError> {
        DeviceManager::send_reliable(self, port, message)
    }
}

#[derive(Debug, Default)]
struct SyncState {
    enabled: AtomicBool,
    ticks: AtomicU64,
    pulses: AtomicU64,
}

/// MIDI clock generator. Clones share state: one clone listens to the tick
/// clock, another observes the timeline.
pub struct ClockSync<S: MidiSender> {
    sender: Arc<S>,
    targets: Arc<[String]>,
    ticks_per_pulse: u64,
    state: Arc<SyncState>,
}

impl<S: MidiSender> Clone for ClockSync<S> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
            targets: Arc::clone(&self.targets),
            ticks_per_pulse: self.ticks_per_pulse,
            state: Arc::clone(&self.state),
        }
    }
}

impl<S: MidiSender> ClockSync<S> {
    /// Fails when `ppqn` is not a multiple of 24
    pub fn new(sender: Arc<S>, targets: Vec<String>, ppqn: u32) -> Result<Self, TimingError> {
        if ppqn == 0 {
            return Err(TimingError::ZeroPpqn);
        }
        if ppqn % MIDI_CLOCK_PPQN != 0 {
            return Err(TimingError::PpqnNotClockCompatible(ppqn));
        }

        Ok(Self {
            sender,
            targets: targets.into(),
            ticks_per_pulse: (ppqn / MIDI_CLOCK_PPQN) as u64,
            state: Arc::new(SyncState::default()),
        })
    }

    /// None when there is no target: without MIDI clock output `ppqn` need
    /// not be a multiple of 24
    pub fn for_targets(
        sender: Arc<S>,
        targets: Vec<String>,
        ppqn: u32,
    ) -> Result<Option<Self>, TimingError> {
        if targets.is_empty() {
            return Ok(None);
        }
        Self::new(sender, targets, ppqn).map(Some)
    }

    pub fn ticks_per_pulse(&self) -> u64 {
        self.ticks_per_pulse
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::Acquire)
    }

    /// Clock pulses sent since construction
    pub fn pulses_sent(&self) -> u64 {
        self.state.pulses.load(Ordering::Relaxed)
    }

    fn broadcast(&self, message: MidiMessage) {
        for target in self.targets.iter() {
            self.sender.send_best_effort(target, &message);
        }
    }

    /// Restart the pulse count and send Start
    pub fn start(&self) {
        self.state.ticks.store(0, Ordering::Release);
        self.broadcast(MidiMessage::Start);
        self.state.enabled.store(true, Ordering::Release);
    }

    /// Send Stop once; a second call while stopped sends nothing
    pub fn stop(&self) {
        if self.state.enabled.swap(false, Ordering::AcqRel) {
            self.broadcast(MidiMessage::Stop);
        }
    }

    /// Resume pulses without resetting the count
    pub fn resume(&self) {
        self.broadcast(MidiMessage::Continue);
        self.state.enabled.store(true, Ordering::Release);
    }
}

impl<S: MidiSender> ClockListener for ClockSync<S> {
    fn on_tick(&mut self, _tick: Tick) {
        if !self.state.enabled.load(Ordering::Acquire) {
            return;
        }

        let ticks = self.state.ticks.fetch_add(1, Ordering::AcqRel) + 1;
        if ticks % self.ticks_per_pulse == 0 {
            self.broadcast(MidiMessage::Clock);
            self.state.pulses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl<S: MidiSender> TimelineObserver for ClockSync<S> {
    fn on_song_started(&mut self, _index: usize, _song: &Song) {
        self.start();
    }

    fn on_setlist_completed(&mut self, _setlist: &Setlist) {
        self.stop();
    }

    fn on_stopped(&mut self) {
        self.stop();
    }
}
