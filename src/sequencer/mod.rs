// Sequencer module
// Musical time, the audio-driven tick clock and the song timeline dispatcher

pub mod click;
pub mod dispatcher;
pub mod driver;
pub mod song;
pub mod tick_clock;
pub mod timeline;

pub use click::{ClickBurst, ClickType};
pub use dispatcher::{
    DispatchError, DispatcherState, StopHandle, TimelineDispatcher, TimelineObserver,
};
pub use driver::{DispatchLoop, ManualClock, run_offline};
pub use song::{
    AudioCue, ControlChange, DeviceId, MidiPreset, Section, Setlist, Song, SongEvent, TimedEvent,
};
pub use tick_clock::{ClockControl, ClockHandle, ClockListener, TickClock};
pub use timeline::{
    BarPosition, DEFAULT_PPQN, MIDI_CLOCK_PPQN, Tempo, Tick, TimeSignature, TimingError,
};
