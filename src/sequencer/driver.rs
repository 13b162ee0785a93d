// Tick supply for the dispatcher
//
// Real-time mode polls the audio clock's published tick from a dedicated
// thread. Offline mode steps a `ManualClock` synchronously, one tick at a time.

use super::dispatcher::{DispatcherState, StopHandle, TimelineDispatcher};
use super::tick_clock::{ClockControl, ClockHandle};
use super::timeline::{Tempo, Tick, TimeSignature};
use crate::audio::parameters::AtomicF64;
use crate::connection::reconnect::CancellationToken;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const MIN_POLL_INTERVAL: Duration = Duration::from_micros(250);
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug)]
struct ManualState {
    ppqn: u32,
    tick: AtomicU64,
    bpm: AtomicF64,
    signature: AtomicU16,
}

/// Non-audio clock for tests and offline runs. Ticks only move when stepped.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<ManualState>,
}

impl ManualClock {
    pub fn new(ppqn: u32, tempo: Tempo) -> Self {
        Self {
            state: Arc::new(ManualState {
                ppqn,
                tick: AtomicU64::new(0),
                bpm: AtomicF64::new(tempo.bpm()),
                signature: AtomicU16::new(tempo.time_signature().to_bits()),
            }),
        }
    }

    /// Advance by one tick and return the new tick
    pub fn step(&self) -> Tick {
        self.state.tick.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl ClockControl for ManualClock {
    fn current_tick(&self) -> Tick {
        self.state.tick.load(Ordering::Acquire)
    }

    fn ppqn(&self) -> u32 {
        self.state.ppqn
    }

    fn tempo(&self) -> Tempo {
        let signature = TimeSignature::from_bits(self.state.signature.load(Ordering::Acquire));
        Tempo::new(self.state.bpm.get(), signature).unwrap_or_default()
    }

    fn change_tempo(&self, tempo: Tempo) {
        self.state
            .signature
            .store(tempo.time_signature().to_bits(), Ordering::Release);
        self.state.bpm.set(tempo.bpm());
    }

    fn reset(&self) {
        self.state.tick.store(0, Ordering::Release);
    }
}

/// Step the dispatcher's clock until the dispatcher leaves Playing or
/// `max_ticks` ticks were stepped. Returns the number of ticks stepped.
pub fn run_offline(dispatcher: &mut TimelineDispatcher<ManualClock>, max_ticks: u64) -> u64 {
    let mut stepped = 0;
    while dispatcher.state() == DispatcherState::Playing && stepped < max_ticks {
        let tick = dispatcher.clock().step();
        dispatcher.advance(tick);
        stepped += 1;
    }
    stepped
}

/// Poll interval: one tick at the current tempo, bounded
pub fn poll_interval(tempo: Tempo, ppqn: u32) -> Duration {
    tempo
        .tick_duration(ppqn)
        .clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
}

/// Real-time dispatch thread following the audio clock
pub struct DispatchLoop {
    handle: Option<JoinHandle<TimelineDispatcher<ClockHandle>>>,
    token: CancellationToken,
    stop: StopHandle,
}

impl DispatchLoop {
    /// Move a dispatcher onto its own thread. The thread exits when the
    /// dispatcher stops or the loop is cancelled.
    pub fn spawn(dispatcher: TimelineDispatcher<ClockHandle>) -> std::io::Result<Self> {
        let token = CancellationToken::new();
        let stop = dispatcher.stop_handle();
        let thread_token = token.clone();

        let handle = thread::Builder::new()
            .name("timeline-dispatch".to_string())
            .spawn(move || run_realtime(dispatcher, thread_token))?;

        Ok(Self {
            handle: Some(handle),
            token,
            stop,
        })
    }

    /// Stop dispatching; observed within one poll interval
    pub fn stop(&self) {
        self.stop.stop();
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the thread and take the dispatcher back
    pub fn join(mut self) -> Option<TimelineDispatcher<ClockHandle>> {
        self.handle.take().and_then(|h| h.join().ok())
    }
}

impl Drop for DispatchLoop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop();
            let _ = handle.join();
        }
    }
}

fn run_realtime(
    mut dispatcher: TimelineDispatcher<ClockHandle>,
    token: CancellationToken,
) -> TimelineDispatcher<ClockHandle> {
    log::debug!("Dispatch loop started");

    while dispatcher.state() == DispatcherState::Playing {
        let clock = dispatcher.clock();
        // Ticks published before a pending reset belong to the previous song
        if !clock.is_reset_pending() {
            let tick = clock.current_tick();
            dispatcher.advance(tick);
        }

        let interval = poll_interval(dispatcher.clock().tempo(), dispatcher.clock().ppqn());
        if token.wait_timeout(interval) {
            dispatcher.stop();
            break;
        }
    }

    log::debug!("Dispatch loop exited ({})", dispatcher.state());
    dispatcher
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::song::{Setlist, Song, TimedEvent};

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(480, Tempo::default());
        assert_eq!(clock.step(), 1);
        assert_eq!(clock.step(), 2);
        clock.reset();
        assert_eq!(clock.current_tick(), 0);

        clock.change_tempo(Tempo::new(90.0, TimeSignature::six_eight()).unwrap());
        assert_eq!(clock.tempo().bpm(), 90.0);
        assert_eq!(clock.tempo().time_signature(), TimeSignature::six_eight());
    }

    #[test]
    fn test_run_offline_plays_whole_setlist() {
        let setlist = Setlist::new("Show", 480)
            .with_song(Song::new("One", 960).with_event(TimedEvent::cue(480, "a", 0.0)))
            .with_song(Song::new("Two", 480));

        let mut dispatcher = TimelineDispatcher::new(ManualClock::new(480, Tempo::default()));
        dispatcher.load(setlist).unwrap();
        dispatcher.play().unwrap();

        let stepped = run_offline(&mut dispatcher, 10_000);
        assert_eq!(stepped, 960 + 480);
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
    }

    #[test]
    fn test_run_offline_respects_limit() {
        let setlist = Setlist::new("Show", 480).with_song(Song::new("Long", 100_000));
        let mut dispatcher = TimelineDispatcher::new(ManualClock::new(480, Tempo::default()));
        dispatcher.load(setlist).unwrap();
        dispatcher.play().unwrap();

        assert_eq!(run_offline(&mut dispatcher, 50), 50);
        assert_eq!(dispatcher.clock().current_tick(), 50);
        assert_eq!(dispatcher.state(), DispatcherState::Playing);
    }

    #[test]
    fn test_poll_interval_bounds() {
        // 120 BPM, 480 ppqn: ~1.04ms per tick
        let tempo = Tempo::default();
        let interval = poll_interval(tempo, 480);
        assert!(interval > Duration::from_millis(1) && interval < Duration::from_millis(2));

        let slow = Tempo::with_bpm(20.0).unwrap();
        assert_eq!(poll_interval(slow, 24), MAX_POLL_INTERVAL);

        let fast = Tempo::with_bpm(999.0).unwrap();
        assert_eq!(poll_interval(fast, 960), MIN_POLL_INTERVAL);
    }
}
