// MIDI output - wire messages, ports, clock sync and preset dispatch

pub mod clock_sync;
pub mod message;
pub mod port;
pub mod preset;

pub use clock_sync::{ClockSync, MidiSender};
pub use message::MidiMessage;
pub use port::{MidirConnector, MidirPort};
pub use preset::PresetRouter;

use crate::connection::DeviceManager;

/// Device manager for MIDI outputs
pub type MidiDeviceManager = DeviceManager<MidirConnector>;
