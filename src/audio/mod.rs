// Audio module - channel routing, cue playback and the cpal output port

pub mod cue_player;
pub mod dsp_utils;
pub mod parameters;
pub mod port;
pub mod routing;

pub use cue_player::{CuePlayer, CueTrigger, SampleBuffer, SampleLibrary, cue_channel};
pub use port::{CpalConnector, CpalPort};
pub use routing::{AudioSource, ChannelRouter, RoutingError};

use crate::connection::DeviceManager;

/// Device manager for the audio output
pub type AudioDeviceManager = DeviceManager<CpalConnector>;
