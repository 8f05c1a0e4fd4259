// Event - One timed musical fact stored in a sequence
// Notes, annotations, automation points and time signatures share an id + beat header;
// the kind-specific data lives in the EventPayload sum type

use crate::project::error::ProjectError;
use crate::project::serialization::{SerializedData, keys};
use crate::sequencer::timeline::{TimeSignature, round_beat};
use rand::Rng;
use std::cmp::Ordering;
use std::fmt;

/// Event identifier, unique within the owning sequence
pub type EventId = String;

/// Shortest id handed out by `create_unique_id`
pub const MIN_ID_LENGTH: usize = 2;

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Velocity is persisted as an integer with this many steps
const VELOCITY_SAVE_ACCURACY: f32 = 128.0;

/// Notes never get shorter than this (in beats)
pub const MIN_NOTE_LENGTH: f32 = 0.5;

pub const MAX_KEY: i32 = 128;

/// Generate a random alphanumeric id of the given length
pub fn generate_id(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Generate an id that `is_taken` rejects nowhere
///
/// Starts with two characters and adds one more after every collision, so
/// crowded containers converge quickly.
pub fn create_unique_id(is_taken: impl Fn(&str) -> bool) -> String {
    let mut length = MIN_ID_LENGTH;
    loop {
        let id = generate_id(length);
        if !is_taken(&id) {
            return id;
        }
        length += 1;
    }
}

/// Packed 0xAARRGGBB colour, persisted as 8 hex digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Colour(pub u32);

impl Colour {
    pub const WHITE: Colour = Colour(0xffff_ffff);

    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Colour(0xff00_0000 | (r as u32) << 16 | (g as u32) << 8 | b as u32)
    }

    pub fn to_hex(self) -> String {
        format!("{:08x}", self.0)
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        u32::from_str_radix(hex.trim().trim_start_matches('#'), 16)
            .ok()
            .map(Colour)
    }
}

impl Default for Colour {
    fn default() -> Self {
        Self::WHITE
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Pitch/length/velocity of a note
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteData {
    /// MIDI key (0..=128, where 60 = C4)
    pub key: i32,
    /// Length in beats
    pub length: f32,
    /// Normalized velocity (0.0..=1.0)
    pub velocity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationData {
    pub description: String,
    pub colour: Colour,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationData {
    /// Normalized controller value (0.0..=1.0)
    pub controller_value: f32,
    pub curvature: f32,
}

/// Kind-specific part of an event
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Note(NoteData),
    Annotation(AnnotationData),
    Automation(AutomationData),
    TimeSignature(TimeSignature),
}

/// A timed musical fact
///
/// Events are values. The `with_*` methods return a modified copy that keeps
/// the same id, which is what lets undo actions and diffs correlate the
/// before/after versions of one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    id: EventId,
    beat: f32,
    payload: EventPayload,
}

impl Event {
    pub fn new(id: impl Into<EventId>, beat: f32, payload: EventPayload) -> Self {
        Self {
            id: id.into(),
            beat: round_beat(beat),
            payload,
        }
    }

    pub fn note(id: impl Into<EventId>, beat: f32, key: i32, length: f32, velocity: f32) -> Self {
        Self::new(
            id,
            beat,
            EventPayload::Note(NoteData {
                key: key.clamp(0, MAX_KEY),
                length: round_beat(length).max(MIN_NOTE_LENGTH),
                velocity: velocity.clamp(0.0, 1.0),
            }),
        )
    }

    pub fn annotation(
        id: impl Into<EventId>,
        beat: f32,
        description: impl Into<String>,
        colour: Colour,
    ) -> Self {
        Self::new(
            id,
            beat,
            EventPayload::Annotation(AnnotationData {
                description: description.into(),
                colour,
            }),
        )
    }

    pub fn automation(id: impl Into<EventId>, beat: f32, controller_value: f32) -> Self {
        Self::new(
            id,
            beat,
            EventPayload::Automation(AutomationData {
                controller_value: controller_value.clamp(0.0, 1.0),
                curvature: 0.5,
            }),
        )
    }

    pub fn time_signature(id: impl Into<EventId>, beat: f32, signature: TimeSignature) -> Self {
        Self::new(id, beat, EventPayload::TimeSignature(signature))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn beat(&self) -> f32 {
        self.beat
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn as_note(&self) -> Option<&NoteData> {
        match &self.payload {
            EventPayload::Note(note) => Some(note),
            _ => None,
        }
    }

    pub fn as_time_signature(&self) -> Option<&TimeSignature> {
        match &self.payload {
            EventPayload::TimeSignature(ts) => Some(ts),
            _ => None,
        }
    }

    pub fn is_note(&self) -> bool {
        matches!(self.payload, EventPayload::Note(_))
    }

    pub fn is_automation(&self) -> bool {
        matches!(self.payload, EventPayload::Automation(_))
    }

    /// Beat where the event stops sounding; only notes have a duration
    pub fn end_beat(&self) -> f32 {
        match &self.payload {
            EventPayload::Note(note) => self.beat + note.length,
            _ => self.beat,
        }
    }

    /// Name of the event kind, also its serialization tag
    pub fn kind_name(&self) -> &'static str {
        match &self.payload {
            EventPayload::Note(_) => keys::NOTE,
            EventPayload::Annotation(_) => keys::ANNOTATION,
            EventPayload::Automation(_) => keys::AUTOMATION,
            EventPayload::TimeSignature(_) => keys::TIME_SIGNATURE,
        }
    }

    /// Sort order inside a sequence: by beat, then by id
    pub fn compare(&self, other: &Event) -> Ordering {
        self.beat
            .total_cmp(&other.beat)
            .then_with(|| self.id.cmp(&other.id))
    }

    //===------------------------------------------------------------------===//
    // Copy-with-field mutators
    //===------------------------------------------------------------------===//

    pub fn with_beat(&self, beat: f32) -> Self {
        Self {
            beat: round_beat(beat),
            ..self.clone()
        }
    }

    pub fn with_delta_beat(&self, delta: f32) -> Self {
        self.with_beat(self.beat + delta)
    }

    /// Same event under a fresh id (used when duplicating)
    pub fn copy_with_new_id(&self, id: impl Into<EventId>) -> Self {
        Self {
            id: id.into(),
            ..self.clone()
        }
    }

    fn map_note(&self, f: impl FnOnce(&mut NoteData)) -> Self {
        let mut copy = self.clone();
        if let EventPayload::Note(note) = &mut copy.payload {
            f(note);
        }
        copy
    }

    pub fn with_key(&self, key: i32) -> Self {
        self.map_note(|n| n.key = key.clamp(0, MAX_KEY))
    }

    pub fn with_delta_key(&self, delta: i32) -> Self {
        self.map_note(|n| n.key = (n.key + delta).clamp(0, MAX_KEY))
    }

    pub fn with_length(&self, length: f32) -> Self {
        self.map_note(|n| n.length = round_beat(length).max(MIN_NOTE_LENGTH))
    }

    pub fn with_delta_length(&self, delta: f32) -> Self {
        self.map_note(|n| n.length = round_beat(n.length + delta).max(MIN_NOTE_LENGTH))
    }

    pub fn with_velocity(&self, velocity: f32) -> Self {
        self.map_note(|n| n.velocity = velocity.clamp(0.0, 1.0))
    }

    pub fn with_description(&self, description: impl Into<String>) -> Self {
        let mut copy = self.clone();
        if let EventPayload::Annotation(a) = &mut copy.payload {
            a.description = description.into();
        }
        copy
    }

    pub fn with_colour(&self, colour: Colour) -> Self {
        let mut copy = self.clone();
        if let EventPayload::Annotation(a) = &mut copy.payload {
            a.colour = colour;
        }
        copy
    }

    pub fn with_controller_value(&self, value: f32) -> Self {
        let mut copy = self.clone();
        if let EventPayload::Automation(a) = &mut copy.payload {
            a.controller_value = value.clamp(0.0, 1.0);
        }
        copy
    }

    pub fn with_numerator(&self, numerator: u8) -> Self {
        let mut copy = self.clone();
        if let EventPayload::TimeSignature(ts) = &mut copy.payload {
            *ts = TimeSignature::new(numerator, ts.denominator);
        }
        copy
    }

    pub fn with_denominator(&self, denominator: u8) -> Self {
        let mut copy = self.clone();
        if let EventPayload::TimeSignature(ts) = &mut copy.payload {
            *ts = TimeSignature::new(ts.numerator, denominator);
        }
        copy
    }

    //===------------------------------------------------------------------===//
    // Serialization
    //===------------------------------------------------------------------===//

    pub fn serialize(&self) -> SerializedData {
        let node = SerializedData::new(self.kind_name())
            .with_attribute(keys::ID, &self.id)
            .with_attribute(keys::BEAT, self.beat);

        match &self.payload {
            EventPayload::Note(n) => node
                .with_attribute(keys::KEY, n.key)
                .with_attribute(keys::LENGTH, n.length)
                .with_attribute(
                    keys::VELOCITY,
                    (n.velocity * VELOCITY_SAVE_ACCURACY).round() as i32,
                ),
            EventPayload::Annotation(a) => node
                .with_attribute(keys::TEXT, &a.description)
                .with_attribute(keys::COLOUR, a.colour),
            EventPayload::Automation(a) => node
                .with_attribute(keys::VALUE, a.controller_value)
                .with_attribute(keys::CURVE, a.curvature),
            EventPayload::TimeSignature(ts) => node
                .with_attribute(keys::NUMERATOR, ts.numerator)
                .with_attribute(keys::DENOMINATOR, ts.denominator),
        }
    }

    pub fn deserialize(data: &SerializedData) -> Result<Self, ProjectError> {
        let id = data.require(keys::ID)?.to_string();
        let beat = data.get_f32(keys::BEAT, 0.0);

        let payload = match data.tag.as_str() {
            keys::NOTE => {
                let velocity = data.get_f32(keys::VELOCITY, VELOCITY_SAVE_ACCURACY)
                    / VELOCITY_SAVE_ACCURACY;
                EventPayload::Note(NoteData {
                    key: data.get_i32(keys::KEY, 60).clamp(0, MAX_KEY),
                    length: round_beat(data.get_f32(keys::LENGTH, 1.0)).max(MIN_NOTE_LENGTH),
                    velocity: velocity.clamp(0.0, 1.0),
                })
            }
            keys::ANNOTATION => EventPayload::Annotation(AnnotationData {
                description: data.get_str(keys::TEXT, "").to_string(),
                colour: Colour::from_hex(data.get_str(keys::COLOUR, "")).unwrap_or_default(),
            }),
            keys::AUTOMATION => EventPayload::Automation(AutomationData {
                controller_value: data.get_f32(keys::VALUE, 0.0).clamp(0.0, 1.0),
                curvature: data.get_f32(keys::CURVE, 0.5),
            }),
            keys::TIME_SIGNATURE => {
                let numerator = data.get_i32(keys::NUMERATOR, 4).clamp(0, u8::MAX as i32);
                let denominator = data.get_i32(keys::DENOMINATOR, 4).clamp(0, u8::MAX as i32);
                EventPayload::TimeSignature(TimeSignature::new(numerator as u8, denominator as u8))
            }
            other => {
                return Err(ProjectError::InvalidStructure(format!(
                    "<{}> is not an event",
                    other
                )));
            }
        };

        Ok(Self::new(id, beat, payload))
    }

    /// Whether a tag names one of the event kinds
    pub fn is_event_tag(tag: &str) -> bool {
        matches!(
            tag,
            keys::NOTE | keys::ANNOTATION | keys::AUTOMATION | keys::TIME_SIGNATURE
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_creation() {
        let note = Event::note("n1", 2.0, 60, 1.0, 0.8);

        assert_eq!(note.id(), "n1");
        assert_eq!(note.beat(), 2.0);
        let data = note.as_note().unwrap();
        assert_eq!(data.key, 60);
        assert_eq!(data.length, 1.0);
        assert_eq!(data.velocity, 0.8);
    }

    #[test]
    fn test_note_clamping() {
        let note = Event::note("n1", 0.0, 200, 0.1, 1.5);
        let data = note.as_note().unwrap();

        assert_eq!(data.key, MAX_KEY);
        assert_eq!(data.length, MIN_NOTE_LENGTH);
        assert_eq!(data.velocity, 1.0);
    }

    #[test]
    fn test_with_mutators_keep_identity() {
        let note = Event::note("xy", 1.0, 60, 1.0, 0.5);

        for beat in [0.0, 3.5, 100.25, -2.0] {
            assert_eq!(note.with_beat(beat).id(), note.id());
        }
        assert_eq!(note.with_key(64).id(), "xy");
        assert_eq!(note.with_delta_key(-3).as_note().unwrap().key, 57);
        assert_eq!(note.with_delta_length(1.0).as_note().unwrap().length, 2.0);
        assert_eq!(note.with_velocity(0.25).as_note().unwrap().velocity, 0.25);

        // The source event stays untouched
        assert_eq!(note.beat(), 1.0);
        assert_eq!(note.as_note().unwrap().key, 60);
    }

    #[test]
    fn test_note_mutators_ignore_other_kinds() {
        let marker = Event::annotation("a", 4.0, "Chorus", Colour::WHITE);
        assert_eq!(marker.with_key(10), marker);
        assert_eq!(
            marker.with_description("Verse").payload(),
            &EventPayload::Annotation(AnnotationData {
                description: "Verse".to_string(),
                colour: Colour::WHITE,
            })
        );
    }

    #[test]
    fn test_ordering_by_beat_then_id() {
        let a = Event::note("b", 1.0, 60, 1.0, 1.0);
        let b = Event::note("a", 2.0, 30, 1.0, 1.0);
        let c = Event::note("c", 1.0, 10, 1.0, 1.0);

        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(a.compare(&c), Ordering::Less);
        assert_eq!(c.compare(&a), Ordering::Greater);
        assert_eq!(a.compare(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn test_beat_rounding() {
        let note = Event::note("n", 1.03, 60, 1.0, 1.0);
        assert_eq!(note.beat(), 1.0);
    }

    #[test]
    fn test_serialization_keeps_payload() {
        let events = vec![
            Event::note("n1", 2.5, 61, 1.5, 0.5),
            Event::annotation("a1", 8.0, "Bridge", Colour::from_rgb(255, 128, 0)),
            Event::automation("c1", 3.0, 0.75),
            Event::time_signature("t1", 16.0, TimeSignature::new(7, 8)),
        ];

        for event in events {
            let data = event.serialize();
            assert_eq!(data.tag, event.kind_name());
            assert_eq!(Event::deserialize(&data).unwrap(), event);
        }
    }

    #[test]
    fn test_velocity_saved_as_integer() {
        let note = Event::note("n1", 0.0, 60, 1.0, 0.5);
        assert_eq!(note.serialize().attribute(keys::VELOCITY), Some("64"));
    }

    #[test]
    fn test_deserialize_rejects_unknown_tag() {
        let data = SerializedData::new("clip").with_attribute(keys::ID, "x");
        assert!(Event::deserialize(&data).is_err());
    }

    #[test]
    fn test_unique_id_grows_on_collision() {
        let id = create_unique_id(|candidate| candidate.len() < 4);
        assert_eq!(id.len(), 4);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_colour_hex() {
        let colour = Colour::from_rgb(0x12, 0x34, 0x56);
        assert_eq!(colour.to_hex(), "ff123456");
        assert_eq!(Colour::from_hex("ff123456"), Some(colour));
        assert_eq!(Colour::from_hex("nope"), None);
    }
}
