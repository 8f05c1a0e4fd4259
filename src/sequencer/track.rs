// Track - One sequence plus one pattern, with identity and display metadata
// The track is what turns sequence/pattern changes into project notifications

use crate::midi::event::MidiEventTimed;
use crate::project::error::ProjectError;
use crate::project::listener::{ProjectListener, TrackDispatcher};
use crate::project::serialization::{SerializedData, keys};
use crate::sequencer::clip::Clip;
use crate::sequencer::event::{Colour, Event};
use crate::sequencer::pattern::Pattern;
use crate::sequencer::sequence::Sequence;
use crate::vcs::delta::{Delta, DeltaDescription, kinds, write_entities};
use uuid::Uuid;

/// Track identifier (uuid v4 string)
pub type TrackId = String;

#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    /// Display path, e.g. "Drums/Kick"
    name: String,
    colour: Colour,
    time_signature: Option<Event>,
    sequence: Sequence,
    pattern: Pattern,
}

impl Track {
    /// New empty track with a fresh id and the default clip
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name)
    }

    pub fn with_id(id: impl Into<TrackId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            colour: Colour::default(),
            time_signature: None,
            sequence: Sequence::new(),
            pattern: Pattern::with_default_clip(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn colour(&self) -> Colour {
        self.colour
    }

    pub fn time_signature_override(&self) -> Option<&Event> {
        self.time_signature.as_ref()
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Mutable sequence plus the dispatcher its changes must go through
    pub fn sequence_with_dispatcher<'a>(
        &'a mut self,
        listener: &'a mut dyn ProjectListener,
    ) -> (&'a mut Sequence, TrackDispatcher<'a>) {
        (&mut self.sequence, TrackDispatcher::new(&self.id, listener))
    }

    pub fn pattern_with_dispatcher<'a>(
        &'a mut self,
        listener: &'a mut dyn ProjectListener,
    ) -> (&'a mut Pattern, TrackDispatcher<'a>) {
        (&mut self.pattern, TrackDispatcher::new(&self.id, listener))
    }

    /// Sequence export cache, for playback collaborators
    pub fn export_sequence(&mut self) -> &[MidiEventTimed] {
        self.sequence.export_sequence()
    }

    //===------------------------------------------------------------------===//
    // Properties
    //===------------------------------------------------------------------===//

    pub fn set_name(&mut self, name: &str, listener: &mut dyn ProjectListener) {
        if self.name != name {
            self.name = name.to_string();
            listener.on_change_track_properties(&self.id);
        }
    }

    pub fn set_colour(&mut self, colour: Colour, listener: &mut dyn ProjectListener) {
        if self.colour != colour {
            self.colour = colour;
            listener.on_change_track_properties(&self.id);
        }
    }

    pub fn set_channel(&mut self, channel: u8, listener: &mut dyn ProjectListener) {
        let (sequence, mut dispatcher) = self.sequence_with_dispatcher(listener);
        sequence.set_channel(channel, &mut dispatcher);
    }

    pub fn set_mute(&mut self, mute: bool, listener: &mut dyn ProjectListener) {
        let (sequence, mut dispatcher) = self.sequence_with_dispatcher(listener);
        sequence.set_mute(mute, &mut dispatcher);
    }

    pub fn set_instrument_id(&mut self, instrument_id: &str, listener: &mut dyn ProjectListener) {
        let (sequence, mut dispatcher) = self.sequence_with_dispatcher(listener);
        sequence.set_instrument_id(instrument_id, &mut dispatcher);
    }

    pub fn set_controller_number(
        &mut self,
        controller: Option<u8>,
        listener: &mut dyn ProjectListener,
    ) {
        let (sequence, mut dispatcher) = self.sequence_with_dispatcher(listener);
        sequence.set_controller_number(controller, &mut dispatcher);
    }

    /// Keep an override's beat inside `[0, sequence length - bar length]`
    ///
    /// Events that aren't time signatures pass through untouched.
    pub fn clamp_time_signature(&self, event: &Event) -> Event {
        let Some(signature) = event.as_time_signature() else {
            return event.clone();
        };

        let max_beat = (self.sequence.length_in_beats() - signature.bar_length_in_beats()).max(0.0);
        event.with_beat(event.beat().clamp(0.0, max_beat))
    }

    /// Store a (clamped) override, or clear it with `None`
    pub fn set_time_signature_override(
        &mut self,
        event: Option<Event>,
        listener: &mut dyn ProjectListener,
        notify: bool,
    ) {
        let event = event.map(|e| self.clamp_time_signature(&e));
        if self.time_signature == event {
            return;
        }

        self.time_signature = event;
        if notify {
            listener.on_change_track_properties(&self.id);
        }
    }

    //===------------------------------------------------------------------===//
    // Snapshots
    //===------------------------------------------------------------------===//

    /// Full state as one delta per tracked category
    pub fn serialize_deltas(&self) -> Vec<Delta> {
        let head = DeltaDescription::head_state;

        let mut time_signature = SerializedData::new(kinds::TIME_SIGNATURES_CHANGED);
        if let Some(event) = &self.time_signature {
            time_signature.append_child(event.serialize());
        }

        vec![
            Delta::property(head(), kinds::TRACK_PATH, &self.name),
            Delta::property(head(), kinds::TRACK_COLOUR, self.colour),
            Delta::property(head(), kinds::TRACK_INSTRUMENT, self.sequence.instrument_id()),
            Delta::new(head(), kinds::TIME_SIGNATURES_CHANGED, time_signature),
            Delta::new(
                head(),
                kinds::EVENTS_ADDED,
                write_entities(self.sequence.events(), kinds::EVENTS_ADDED),
            ),
            Delta::new(
                head(),
                kinds::CLIPS_ADDED,
                write_entities(self.pattern.clips(), kinds::CLIPS_ADDED),
            ),
        ]
    }

    /// Check out a snapshot produced by `serialize_deltas` (or a merge of it)
    ///
    /// Collections are replaced wholesale through silent imports, followed by
    /// one reload notification each. Categories the snapshot lacks keep their
    /// current value.
    pub fn reset_state_to(
        &mut self,
        deltas: &[Delta],
        listener: &mut dyn ProjectListener,
    ) -> Result<(), ProjectError> {
        let mut properties_changed = false;

        for delta in deltas {
            match delta.kind() {
                kinds::TRACK_PATH => {
                    let name = delta.value().unwrap_or_default().to_string();
                    properties_changed |= self.name != name;
                    self.name = name;
                }
                kinds::TRACK_COLOUR => {
                    let colour = delta
                        .value()
                        .and_then(Colour::from_hex)
                        .unwrap_or_default();
                    properties_changed |= self.colour != colour;
                    self.colour = colour;
                }
                kinds::TRACK_INSTRUMENT => {
                    let (sequence, mut dispatcher) = self.sequence_with_dispatcher(listener);
                    sequence.set_instrument_id(delta.value().unwrap_or_default(), &mut dispatcher);
                }
                kinds::TIME_SIGNATURES_CHANGED => {
                    let event = match delta.data().children.first() {
                        Some(child) => Some(Event::deserialize(child)?),
                        None => None,
                    };
                    properties_changed |= self.time_signature != event;
                    self.time_signature = event;
                }
                kinds::EVENTS_ADDED => {
                    let events = delta
                        .data()
                        .children
                        .iter()
                        .filter(|c| Event::is_event_tag(&c.tag))
                        .map(Event::deserialize)
                        .collect::<Result<Vec<_>, _>>()?;

                    let (sequence, mut dispatcher) = self.sequence_with_dispatcher(listener);
                    sequence.clear_silently();
                    for event in events {
                        sequence.silent_import(event);
                    }
                    sequence.sort();
                    sequence.notify_reloaded(&mut dispatcher);
                }
                kinds::CLIPS_ADDED => {
                    let clips = delta
                        .data()
                        .children_with_tag(keys::CLIP)
                        .map(Clip::deserialize)
                        .collect::<Result<Vec<_>, _>>()?;

                    let (pattern, mut dispatcher) = self.pattern_with_dispatcher(listener);
                    pattern.clear_silently();
                    for clip in clips {
                        pattern.silent_import(clip);
                    }
                    pattern.ensure_default_clip();
                    pattern.sort();
                    pattern.notify_reloaded(&mut dispatcher);
                }
                other => {
                    log::warn!(target: "vcs", "Ignoring delta type {} on checkout", other);
                }
            }
        }

        if properties_changed {
            listener.on_change_track_properties(&self.id);
        }

        Ok(())
    }

    //===------------------------------------------------------------------===//
    // Serialization
    //===------------------------------------------------------------------===//

    pub fn serialize(&self) -> SerializedData {
        let mut node = SerializedData::new(keys::TRACK)
            .with_attribute(keys::ID, &self.id)
            .with_attribute(keys::NAME, &self.name)
            .with_attribute(keys::COLOUR, self.colour)
            .with_child(self.sequence.serialize())
            .with_child(self.pattern.serialize());

        if let Some(event) = &self.time_signature {
            node.append_child(event.serialize());
        }

        node
    }

    pub fn deserialize(data: &SerializedData) -> Result<Self, ProjectError> {
        data.expect_tag(keys::TRACK)?;

        let mut track = Self::with_id(data.require(keys::ID)?, data.get_str(keys::NAME, ""));
        track.colour = Colour::from_hex(data.get_str(keys::COLOUR, "")).unwrap_or_default();

        if let Some(sequence) = data.child_with_tag(keys::SEQUENCE) {
            track.sequence.deserialize(sequence)?;
        }

        match data.child_with_tag(keys::PATTERN) {
            Some(pattern) => track.pattern.deserialize(pattern)?,
            None => track.pattern = Pattern::with_default_clip(),
        }

        if let Some(ts) = data.child_with_tag(keys::TIME_SIGNATURE) {
            let event = Event::deserialize(ts)?;
            track.time_signature = Some(track.clamp_time_signature(&event));
        }

        Ok(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::timeline::TimeSignature;

    #[derive(Default)]
    struct Counter {
        properties: usize,
        reloads: usize,
    }

    impl ProjectListener for Counter {
        fn on_change_track_properties(&mut self, _track_id: &str) {
            self.properties += 1;
        }

        fn on_reload_sequence(&mut self, _track_id: &str) {
            self.reloads += 1;
        }

        fn on_reload_pattern(&mut self, _track_id: &str) {
            self.reloads += 1;
        }
    }

    fn track_with_notes(beats: &[f32]) -> Track {
        let mut track = Track::with_id("t", "Lead");
        let mut counter = Counter::default();
        for (i, beat) in beats.iter().enumerate() {
            let (sequence, mut d) = track.sequence_with_dispatcher(&mut counter);
            sequence.insert(Event::note(format!("n{}", i), *beat, 60, 1.0, 1.0), &mut d);
        }
        track
    }

    #[test]
    fn test_new_track_has_default_clip() {
        let track = Track::new("Drums");
        assert_eq!(track.pattern().len(), 1);
        assert_eq!(track.pattern().clips()[0].beat(), 0.0);
        assert!(Uuid::parse_str(track.id()).is_ok());
    }

    #[test]
    fn test_property_setters_notify_once() {
        let mut track = Track::with_id("t", "Lead");
        let mut counter = Counter::default();

        track.set_name("Bass", &mut counter);
        track.set_name("Bass", &mut counter);
        track.set_colour(Colour::from_rgb(1, 2, 3), &mut counter);
        track.set_channel(10, &mut counter);

        assert_eq!(track.name(), "Bass");
        assert_eq!(track.sequence().channel(), 10);
        assert_eq!(counter.properties, 3);
    }

    #[test]
    fn test_time_signature_override_is_clamped() {
        let mut track = track_with_notes(&[0.0, 16.0]);
        let mut counter = Counter::default();

        // 16 beats of material, a 4/4 bar is 4 beats long: valid range is 0..=12
        let late = Event::time_signature("ts", 40.0, TimeSignature::four_four());
        track.set_time_signature_override(Some(late), &mut counter, true);
        assert_eq!(track.time_signature_override().unwrap().beat(), 12.0);

        let early = Event::time_signature("ts", -3.0, TimeSignature::four_four());
        track.set_time_signature_override(Some(early), &mut counter, false);
        assert_eq!(track.time_signature_override().unwrap().beat(), 0.0);
        assert_eq!(counter.properties, 1);
    }

    #[test]
    fn test_clamp_on_short_sequence() {
        let track = track_with_notes(&[0.0]);
        let ts = Event::time_signature("ts", 5.0, TimeSignature::three_four());
        assert_eq!(track.clamp_time_signature(&ts).beat(), 0.0);
    }

    #[test]
    fn test_serialization() {
        let mut track = track_with_notes(&[0.0, 2.0, 8.0]);
        let mut counter = Counter::default();
        track.set_instrument_id("synth-1", &mut counter);
        track.set_time_signature_override(
            Some(Event::time_signature("ts", 4.0, TimeSignature::six_eight())),
            &mut counter,
            true,
        );

        let restored = Track::deserialize(&track.serialize()).unwrap();
        assert_eq!(restored.id(), "t");
        assert_eq!(restored.name(), "Lead");
        assert_eq!(restored.sequence().events(), track.sequence().events());
        assert_eq!(restored.pattern().clips(), track.pattern().clips());
        assert_eq!(restored.sequence().instrument_id(), "synth-1");
        assert_eq!(restored.time_signature_override(), track.time_signature_override());
    }

    #[test]
    fn test_snapshot_checkout() {
        let original = track_with_notes(&[0.0, 4.0]);
        let snapshot = original.serialize_deltas();
        assert_eq!(snapshot.len(), 6);

        let mut track = track_with_notes(&[1.0, 2.0, 3.0]);
        let mut counter = Counter::default();
        track.set_name("Renamed", &mut counter);
        {
            let (pattern, mut d) = track.pattern_with_dispatcher(&mut counter);
            pattern.insert(Clip::new("extra", 32.0), &mut d);
        }

        let mut counter = Counter::default();
        track.reset_state_to(&snapshot, &mut counter).unwrap();

        assert_eq!(track.name(), "Lead");
        assert_eq!(track.sequence().events(), original.sequence().events());
        assert_eq!(track.pattern().clips(), original.pattern().clips());
        assert_eq!(counter.reloads, 2);
        assert_eq!(counter.properties, 1);
    }
}
