// Timeline dispatcher - walks a song's events against an advancing tick
//
// Events are sorted once per song (stable, so same-tick events keep their
// authoring order) and consumed through a forward-only cursor. Every call to
// `advance` fires all events up to the given tick, so nothing is skipped when
// several ticks elapse between calls.

use super::song::{AudioCue, MidiPreset, Section, Setlist, Song, SongEvent, TimedEvent};
use super::tick_clock::ClockControl;
use super::timeline::{Tempo, Tick, TimingError};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    #[error("Cannot load a setlist while playing")]
    LoadWhilePlaying,

    #[error("No setlist loaded")]
    NoSetlist,

    #[error("Invalid setlist: {0}")]
    InvalidSetlist(#[from] TimingError),

    #[error("Setlist is written at {setlist} ppqn but the clock runs at {clock}")]
    PpqnMismatch { setlist: u32, clock: u32 },
}

/// Dispatcher state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    Playing,
    Stopped,
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatcherState::Idle => write!(f, "Idle"),
            DispatcherState::Playing => write!(f, "Playing"),
            DispatcherState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Receives the dispatcher's domain notifications. Handlers run on whichever
/// thread drives the dispatcher and must not block.
pub trait TimelineObserver: Send {
    fn on_song_started(&mut self, _index: usize, _song: &Song) {}

    fn on_section_changed(&mut self, _tick: Tick, _section: &Section) {}

    /// Once per preset of a section, in list order
    fn on_preset_changed(&mut self, _preset: &MidiPreset) {}

    fn on_cue_fired(&mut self, _tick: Tick, _cue: &AudioCue) {}

    fn on_song_finished(&mut self, _index: usize, _song: &Song) {}

    /// Fired exactly once, after the last song
    fn on_setlist_completed(&mut self, _setlist: &Setlist) {}

    /// Playback was stopped before the setlist completed. Fired once per
    /// stop, after which nothing else fires until the next `play`.
    fn on_stopped(&mut self) {}
}

/// Cross-thread stop request. Checked before every notification.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn clear(&self) {
        self.stopped.store(false, Ordering::Release);
    }
}

/// Observers plus the stop flag, split from the dispatcher so events can be
/// borrowed while notifying
struct Observers {
    list: Vec<Box<dyn TimelineObserver>>,
    stop: StopHandle,
}

impl Observers {
    /// Returns false (and notifies nobody further) once a stop was requested
    fn each(&mut self, mut f: impl FnMut(&mut dyn TimelineObserver)) -> bool {
        for observer in self.list.iter_mut() {
            if self.stop.is_stopped() {
                return false;
            }
            f(observer.as_mut());
        }
        !self.stop.is_stopped()
    }
}

pub struct TimelineDispatcher<C: ClockControl> {
    clock: C,
    observers: Observers,
    state: DispatcherState,
    setlist: Option<Setlist>,
    song_index: usize,
    events: Vec<TimedEvent>,
    cursor: usize,
}

impl<C: ClockControl> TimelineDispatcher<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            observers: Observers {
                list: Vec::new(),
                stop: StopHandle::default(),
            },
            state: DispatcherState::Idle,
            setlist: None,
            song_index: 0,
            events: Vec::new(),
            cursor: 0,
        }
    }

    /// Register an observer; notified in registration order
    pub fn subscribe(&mut self, observer: Box<dyn TimelineObserver>) {
        self.observers.list.push(observer);
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.observers.stop.clone()
    }

    pub fn setlist(&self) -> Option<&Setlist> {
        self.setlist.as_ref()
    }

    pub fn song_index(&self) -> usize {
        self.song_index
    }

    pub fn current_song(&self) -> Option<&Song> {
        self.setlist.as_ref()?.songs.get(self.song_index)
    }

    /// Events of the current song not fired yet
    pub fn pending_events(&self) -> usize {
        self.events.len() - self.cursor
    }

    /// Load a setlist. Leaves the dispatcher Idle; fails while Playing or
    /// when the setlist's resolution is not the clock's.
    pub fn load(&mut self, setlist: Setlist) -> Result<(), DispatchError> {
        if self.state == DispatcherState::Playing {
            return Err(DispatchError::LoadWhilePlaying);
        }
        setlist.validate()?;
        if setlist.ppqn != self.clock.ppqn() {
            return Err(DispatchError::PpqnMismatch {
                setlist: setlist.ppqn,
                clock: self.clock.ppqn(),
            });
        }

        log::info!(
            "Loaded setlist '{}' ({} songs, ppqn {})",
            setlist.name,
            setlist.songs.len(),
            setlist.ppqn
        );

        self.setlist = Some(setlist);
        self.state = DispatcherState::Idle;
        self.song_index = 0;
        self.events.clear();
        self.cursor = 0;
        Ok(())
    }

    /// Start the loaded setlist from its first song. No-op while Playing.
    pub fn play(&mut self) -> Result<(), DispatchError> {
        if self.state == DispatcherState::Playing {
            return Ok(());
        }
        if self.setlist.is_none() {
            return Err(DispatchError::NoSetlist);
        }

        self.observers.stop.clear();
        self.state = DispatcherState::Playing;
        self.song_index = 0;
        log::info!("Dispatcher playing");

        if self.begin_song() {
            self.dispatch_until(0);
        }
        Ok(())
    }

    /// Stop immediately; apart from `on_stopped` no further notification fires
    pub fn stop(&mut self) {
        self.observers.stop.stop();
        self.halt();
    }

    /// Fire everything due at `tick`. Returns the state afterwards.
    pub fn advance(&mut self, tick: Tick) -> DispatcherState {
        if self.state == DispatcherState::Playing {
            self.dispatch_until(tick);
        }
        self.state
    }

    fn halt(&mut self) {
        let was_playing = self.state == DispatcherState::Playing;
        self.state = DispatcherState::Stopped;

        if was_playing && self.observers.stop.is_stopped() {
            log::info!("Dispatcher stopped");
            for observer in self.observers.list.iter_mut() {
                observer.on_stopped();
            }
        }
    }

    /// Prepare the song at `song_index`: reset the clock, sort its events and
    /// announce it. Completes the setlist when there is no such song.
    fn begin_song(&mut self) -> bool {
        let Some(setlist) = self.setlist.as_ref() else {
            self.halt();
            return false;
        };

        let Some(song) = setlist.songs.get(self.song_index) else {
            log::info!("Setlist '{}' completed", setlist.name);
            let observers = &mut self.observers;
            observers.each(|o| o.on_setlist_completed(setlist));
            self.halt();
            return false;
        };

        self.clock.reset();

        let duration = song.duration_ticks;
        self.events.clear();
        self.events.extend(
            song.events
                .iter()
                .filter(|e| e.tick <= duration)
                .cloned(),
        );
        self.events.sort_by_key(|e| e.tick);
        self.cursor = 0;

        log::info!("Song {}: '{}'", self.song_index + 1, song.title);
        let index = self.song_index;
        if !self.observers.each(|o| o.on_song_started(index, song)) {
            self.halt();
            return false;
        }
        true
    }

    fn dispatch_until(&mut self, mut tick: Tick) {
        loop {
            if self.observers.stop.is_stopped() {
                self.halt();
                return;
            }

            while let Some(event) = self.events.get(self.cursor) {
                if event.tick > tick {
                    break;
                }
                self.cursor += 1;
                if !fire(&mut self.observers, &self.clock, event) {
                    self.halt();
                    return;
                }
            }

            let Some(song) = self.current_song() else {
                self.halt();
                return;
            };
            if tick < song.duration_ticks {
                return;
            }

            let index = self.song_index;
            if let Some(setlist) = self.setlist.as_ref() {
                let song = &setlist.songs[index];
                if !self.observers.each(|o| o.on_song_finished(index, song)) {
                    self.halt();
                    return;
                }
            }

            self.song_index += 1;
            if !self.begin_song() {
                return;
            }
            tick = 0;
        }
    }
}

/// Fire one event. Returns false if a stop interrupted it.
fn fire<C: ClockControl>(observers: &mut Observers, clock: &C, event: &TimedEvent) -> bool {
    match &event.event {
        SongEvent::SectionChange(section) => {
            match Tempo::new(section.bpm, section.time_signature) {
                Ok(tempo) => clock.change_tempo(tempo),
                Err(e) => log::warn!("Section '{}' keeps previous tempo: {}", section.name, e),
            }

            if !observers.each(|o| o.on_section_changed(event.tick, section)) {
                return false;
            }
            for preset in &section.presets {
                if !observers.each(|o| o.on_preset_changed(preset)) {
                    return false;
                }
            }
            true
        }
        SongEvent::AudioCue(cue) => observers.each(|o| o.on_cue_fired(event.tick, cue)),
    }
}
