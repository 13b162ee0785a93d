// MIDI output ports through midir

use super::message::MidiMessage;
use crate::connection::{DeviceError, DevicePort, FaultReporter, PortConnector};
use midir::{MidiOutput, MidiOutputConnection};

const CLIENT_NAME: &str = "stageclock";

/// Opens MIDI outputs by name. An exact name wins; otherwise the first port
/// whose name contains the configured one (case-insensitive) is used.
#[derive(Debug, Clone, Default)]
pub struct MidirConnector;

impl MidirConnector {
    pub fn new() -> Self {
        Self
    }
}

pub struct MidirPort {
    connection: MidiOutputConnection,
    name: String,
}

impl MidirPort {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl DevicePort for MidirPort {
    type Message = MidiMessage;

    fn send(&mut self, message: &MidiMessage) -> Result<(), DeviceError> {
        let (bytes, len) = message.encode();
        self.connection
            .send(&bytes[..len])
            .map_err(|e| DeviceError::SendFailed(e.to_string()))
    }
}

impl PortConnector for MidirConnector {
    type Port = MidirPort;

    fn open(&self, name: &str, _faults: FaultReporter) -> Result<MidirPort, DeviceError> {
        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| DeviceError::Open {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        let ports = midi_out.ports();
        let pattern = name.to_lowercase();
        let named: Vec<(String, &midir::MidiOutputPort)> = ports
            .iter()
            .filter_map(|p| midi_out.port_name(p).ok().map(|n| (n, p)))
            .collect();

        let (port_name, port) = named
            .iter()
            .find(|(n, _)| n == name)
            .or_else(|| named.iter().find(|(n, _)| n.to_lowercase().contains(&pattern)))
            .map(|(n, p)| (n.clone(), (*p).clone()))
            .ok_or_else(|| DeviceError::NotFound(name.to_string()))?;

        let connection = midi_out
            .connect(&port, "stageclock-output")
            .map_err(|e| DeviceError::Open {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        log::info!("MIDI: Connected to output port '{}'", port_name);
        Ok(MidirPort {
            connection,
            name: port_name,
        })
    }

    fn available(&self) -> Vec<String> {
        match MidiOutput::new(CLIENT_NAME) {
            Ok(midi_out) => midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect(),
            Err(e) => {
                log::warn!("MIDI: Failed to initialize output: {}", e);
                Vec::new()
            }
        }
    }
}
