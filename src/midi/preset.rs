// Preset dispatch - section presets to the configured MIDI ports

use super::clock_sync::MidiSender;
use super::message::MidiMessage;
use crate::connection::DeviceError;
use crate::sequencer::{DeviceId, MidiPreset, TimelineObserver};
use std::collections::HashMap;
use std::sync::Arc;

/// Sends presets through the reliable path, so a preset change made while a
/// device is unplugged still lands once it comes back
pub struct PresetRouter<S: MidiSender> {
    sender: Arc<S>,
    routes: HashMap<DeviceId, String>,
}

impl<S: MidiSender> PresetRouter<S> {
    pub fn new(sender: Arc<S>, routes: HashMap<DeviceId, String>) -> Self {
        Self { sender, routes }
    }

    pub fn port_for(&self, device: DeviceId) -> Option<&str> {
        self.routes.get(&device).map(String::as_str)
    }

    /// Send one preset. Returns the number of messages handed to the port.
    pub fn route(&self, preset: &MidiPreset) -> Result<usize, DeviceError> {
        let port = self
            .port_for(preset.device)
            .ok_or_else(|| DeviceError::Unroutable(preset.device.to_string()))?;

        if !preset.is_valid() {
            log::warn!(
                "Preset for {} has out-of-range values, masking to MIDI range",
                preset.device
            );
        }

        let messages = MidiMessage::for_preset(preset);
        let count = messages.len();
        for message in messages {
            self.sender.send_reliable(port, message)?;
        }
        Ok(count)
    }
}

impl<S: MidiSender> TimelineObserver for PresetRouter<S> {
    fn on_preset_changed(&mut self, preset: &MidiPreset) {
        match self.route(preset) {
            Ok(count) => log::debug!("Preset sent to {} ({} messages)", preset.device, count),
            Err(DeviceError::Unroutable(device)) => {
                log::warn!("No MIDI port configured for {}, preset ignored", device)
            }
            Err(e) => log::error!("Preset for {} not sent: {}", preset.device, e),
        }
    }
}
