// MIDI module - Playback-facing event format

pub mod event;

pub use event::{MidiEvent, MidiEventTimed};
