// StageClock - Library exports for the binary, tests and benchmarks

pub mod audio;
pub mod config;
pub mod connection;
pub mod messaging;
pub mod midi;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use audio::{AudioDeviceManager, AudioSource, ChannelRouter, CpalConnector, RoutingError};
pub use config::{ConfigError, EngineConfig};
pub use connection::{DeviceError, DeviceManager, DeviceStatus, ReconnectPolicy};
pub use messaging::{Notification, NotificationSink, RingNotifier};
pub use midi::{ClockSync, MidiDeviceManager, MidiMessage, PresetRouter};
pub use sequencer::{
    ClockHandle, ClockListener, DispatchLoop, DispatcherState, Setlist, Song, Tempo, TickClock,
    TimeSignature, TimelineDispatcher, TimelineObserver,
};
