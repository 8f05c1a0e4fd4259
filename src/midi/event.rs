// MIDI types events
// The flattened wire format a sequence exports for playback

#[derive(Debug, Clone, PartialEq)]
pub enum MidiEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    ControlChange { controller: u8, value: u8 },
    TimeSignature { numerator: u8, denominator: u8 },
    Text(String),
}

/// MIDI event with beat-accurate timing
/// `beat` is the timestamp relative to the start of the owning sequence
#[derive(Debug, Clone, PartialEq)]
pub struct MidiEventTimed {
    pub event: MidiEvent,
    pub channel: u8,
    pub beat: f32,
}

impl MidiEvent {
    /// Encode as raw MIDI bytes
    ///
    /// `channel` is 1-based (1..=16). Meta events use the SMF meta layout (0xFF type len data).
    pub fn to_bytes(&self, channel: u8) -> Vec<u8> {
        let channel_nibble = channel.clamp(1, 16) - 1;

        match self {
            MidiEvent::NoteOn { note, velocity } => {
                vec![0x90 | channel_nibble, note & 0x7F, velocity & 0x7F]
            }
            MidiEvent::NoteOff { note } => vec![0x80 | channel_nibble, note & 0x7F, 0],
            MidiEvent::ControlChange { controller, value } => {
                vec![0xB0 | channel_nibble, controller & 0x7F, value & 0x7F]
            }
            MidiEvent::TimeSignature {
                numerator,
                denominator,
            } => {
                // Denominator is stored as a power of two
                let power = denominator.max(&1).trailing_zeros() as u8;
                vec![0xFF, 0x58, 0x04, *numerator, power, 24, 8]
            }
            MidiEvent::Text(text) => {
                let bytes = text.as_bytes();
                let len = bytes.len().min(0x7F);
                let mut out = vec![0xFF, 0x01, len as u8];
                out.extend_from_slice(&bytes[..len]);
                out
            }
        }
    }
}

impl MidiEventTimed {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.event.to_bytes(self.channel)
    }
}
