// MIDI wire messages - the outbound subset the engine sends

use crate::sequencer::MidiPreset;

pub const CLOCK: u8 = 0xF8;
pub const START: u8 = 0xFA;
pub const CONTINUE: u8 = 0xFB;
pub const STOP: u8 = 0xFC;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    ProgramChange { channel: u8, program: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    Clock,
    Start,
    Continue,
    Stop,
}

impl MidiMessage {
    /// Program Change; out-of-range values are masked to their MIDI width
    pub fn program_change(channel: u8, program: u8) -> Self {
        MidiMessage::ProgramChange {
            channel: channel & 0x0F,
            program: program & 0x7F,
        }
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        MidiMessage::ControlChange {
            channel: channel & 0x0F,
            controller: controller & 0x7F,
            value: value & 0x7F,
        }
    }

    pub fn status(&self) -> u8 {
        match *self {
            MidiMessage::ProgramChange { channel, .. } => 0xC0 | (channel & 0x0F),
            MidiMessage::ControlChange { channel, .. } => 0xB0 | (channel & 0x0F),
            MidiMessage::Clock => CLOCK,
            MidiMessage::Start => START,
            MidiMessage::Continue => CONTINUE,
            MidiMessage::Stop => STOP,
        }
    }

    /// Realtime transport bytes (clock/start/continue/stop)
    pub fn is_realtime(&self) -> bool {
        self.status() >= 0xF8
    }

    /// Wire bytes and how many of them are used
    pub fn encode(&self) -> ([u8; 3], usize) {
        let status = self.status();
        match *self {
            MidiMessage::ProgramChange { program, .. } => ([status, program & 0x7F, 0], 2),
            MidiMessage::ControlChange {
                controller, value, ..
            } => ([status, controller & 0x7F, value & 0x7F], 3),
            _ => ([status, 0, 0], 1),
        }
    }

    /// Packed short message: `status | data1 << 8 | data2 << 16`
    pub fn packed(&self) -> u32 {
        let ([status, data1, data2], _) = self.encode();
        status as u32 | (data1 as u32) << 8 | (data2 as u32) << 16
    }

    /// Parse a raw outbound-subset message
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;

        match status {
            CLOCK => Some(MidiMessage::Clock),
            START => Some(MidiMessage::Start),
            CONTINUE => Some(MidiMessage::Continue),
            STOP => Some(MidiMessage::Stop),
            _ => match status & 0xF0 {
                0xC0 if bytes.len() >= 2 => Some(MidiMessage::program_change(status, bytes[1])),
                0xB0 if bytes.len() >= 3 => {
                    Some(MidiMessage::control_change(status, bytes[1], bytes[2]))
                }
                _ => None,
            },
        }
    }

    /// A preset as it goes on the wire: Program Change, then its Control
    /// Changes in list order
    pub fn for_preset(preset: &MidiPreset) -> Vec<MidiMessage> {
        std::iter::once(MidiMessage::program_change(
            preset.channel,
            preset.program_change,
        ))
        .chain(
            preset
                .control_changes
                .iter()
                .map(|cc| MidiMessage::control_change(preset.channel, cc.controller, cc.value)),
        )
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::DeviceId;

    #[test]
    fn test_preset_packs_in_order() {
        let preset = MidiPreset::new(DeviceId::DeviceA, 0, 3)
            .with_cc(7, 100)
            .with_cc(1, 64);

        let packed: Vec<u32> = MidiMessage::for_preset(&preset)
            .iter()
            .map(MidiMessage::packed)
            .collect();

        assert_eq!(packed, vec![0x03C0, 0x6407B0, 0x4001B0]);
    }

    #[test]
    fn test_realtime_bytes() {
        assert_eq!(MidiMessage::Clock.encode(), ([0xF8, 0, 0], 1));
        assert_eq!(MidiMessage::Start.packed(), 0xFA);
        assert_eq!(MidiMessage::Continue.packed(), 0xFB);
        assert_eq!(MidiMessage::Stop.packed(), 0xFC);
        assert!(MidiMessage::Clock.is_realtime());
        assert!(!MidiMessage::program_change(0, 1).is_realtime());
    }

    #[test]
    fn test_channel_in_status() {
        let pc = MidiMessage::program_change(9, 42);
        assert_eq!(pc.encode(), ([0xC9, 42, 0], 2));

        let cc = MidiMessage::control_change(15, 74, 127);
        assert_eq!(cc.encode(), ([0xBF, 74, 127], 3));
    }

    #[test]
    fn test_from_bytes() {
        assert_eq!(
            MidiMessage::from_bytes(&[0xB2, 7, 100]),
            Some(MidiMessage::control_change(2, 7, 100))
        );
        assert_eq!(
            MidiMessage::from_bytes(&[0xC0, 3]),
            Some(MidiMessage::program_change(0, 3))
        );
        assert_eq!(MidiMessage::from_bytes(&[0xF8]), Some(MidiMessage::Clock));
        assert_eq!(MidiMessage::from_bytes(&[0x90, 60, 100]), None);
        assert_eq!(MidiMessage::from_bytes(&[]), None);
    }
}
