// Sequence - The sorted event list owned by one track
// Also keeps the playback properties (channel, mute, instrument) and a lazily rebuilt export

use crate::midi::event::{MidiEvent, MidiEventTimed};
use crate::project::error::ProjectError;
use crate::project::listener::EventDispatcher;
use crate::project::serialization::{SerializedData, keys};
use crate::sequencer::clip::Clip;
use crate::sequencer::event::{Event, EventId, EventPayload, create_unique_id};
use std::collections::HashSet;

pub const MIN_CHANNEL: u8 = 1;
pub const MAX_CHANNEL: u8 = 16;

/// Events of one track, kept sorted by (beat, id)
///
/// Mutations go through an `EventDispatcher` so the owning track can fan the
/// change out to the project. None of the mutators fail loudly: a duplicate
/// id on insert or a missing event on remove/change just returns `false`.
#[derive(Debug, Clone)]
pub struct Sequence {
    events: Vec<Event>,
    used_ids: HashSet<EventId>,

    channel: u8,
    mute: bool,
    instrument_id: String,
    /// Set for automation sequences; exported automation points target this CC
    controller_number: Option<u8>,

    export_cache: Vec<MidiEventTimed>,
    export_outdated: bool,

    last_start_beat: f32,
    last_end_beat: f32,
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequence {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            used_ids: HashSet::new(),
            channel: MIN_CHANNEL,
            mute: false,
            instrument_id: String::new(),
            controller_number: None,
            export_cache: Vec::new(),
            export_outdated: true,
            last_start_beat: 0.0,
            last_end_beat: 0.0,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.id() == id)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.used_ids.contains(id)
    }

    pub fn create_unique_event_id(&self) -> EventId {
        create_unique_id(|candidate| self.used_ids.contains(candidate))
    }

    /// Binary search for an event with the same beat and id
    ///
    /// Only valid while the list is sorted; callers fall back to `position_of`
    /// when the caller's copy is stale.
    pub fn index_of_sorted(&self, event: &Event) -> Option<usize> {
        self.events
            .binary_search_by(|other| other.compare(event))
            .ok()
    }

    fn position_of(&self, event: &Event) -> Option<usize> {
        self.index_of_sorted(event)
            .or_else(|| self.events.iter().position(|e| e.id() == event.id()))
    }

    fn insertion_index(&self, event: &Event) -> usize {
        self.events
            .binary_search_by(|other| other.compare(event))
            .unwrap_or_else(|pos| pos)
    }

    fn insert_sorted(&mut self, event: Event) {
        self.used_ids.insert(event.id().to_string());
        let at = self.insertion_index(&event);
        self.events.insert(at, event);
    }

    pub fn is_sorted(&self) -> bool {
        self.events
            .windows(2)
            .all(|pair| pair[0].compare(&pair[1]).is_le())
    }

    //===------------------------------------------------------------------===//
    // Direct mutations
    //===------------------------------------------------------------------===//

    pub fn insert(&mut self, event: Event, dispatcher: &mut dyn EventDispatcher) -> bool {
        if self.used_ids.contains(event.id()) {
            return false;
        }

        self.insert_sorted(event.clone());
        dispatcher.dispatch_add_event(&event);
        self.invalidate();
        self.update_beat_range(dispatcher);
        true
    }

    pub fn remove(&mut self, event: &Event, dispatcher: &mut dyn EventDispatcher) -> bool {
        let Some(index) = self.position_of(event) else {
            return false;
        };

        dispatcher.dispatch_remove_event(&self.events[index]);
        let removed = self.events.remove(index);
        self.used_ids.remove(removed.id());
        dispatcher.dispatch_post_remove_event();
        self.invalidate();
        self.update_beat_range(dispatcher);
        true
    }

    /// Replace `old` by `new`, which must carry the same id
    ///
    /// The event is moved to the sorted position of its new beat.
    pub fn change(
        &mut self,
        old: &Event,
        new: Event,
        dispatcher: &mut dyn EventDispatcher,
    ) -> bool {
        if old.id() != new.id() {
            return false;
        }

        let Some(index) = self.position_of(old) else {
            return false;
        };

        let previous = self.events.remove(index);
        let at = self.insertion_index(&new);
        self.events.insert(at, new);
        dispatcher.dispatch_change_event(&previous, &self.events[at]);
        self.invalidate();
        self.update_beat_range(dispatcher);
        true
    }

    /// Insert a batch; rejected as a whole if any id is already taken
    pub fn insert_group(&mut self, group: &[Event], dispatcher: &mut dyn EventDispatcher) -> bool {
        let mut incoming = HashSet::new();
        let clash = group
            .iter()
            .any(|e| self.used_ids.contains(e.id()) || !incoming.insert(e.id()));
        if clash {
            return false;
        }

        for event in group {
            self.insert_sorted(event.clone());
            dispatcher.dispatch_add_event(event);
        }

        self.invalidate();
        self.update_beat_range(dispatcher);
        true
    }

    /// Remove a batch; rejected as a whole if any event is missing
    pub fn remove_group(&mut self, group: &[Event], dispatcher: &mut dyn EventDispatcher) -> bool {
        if group.iter().any(|e| !self.used_ids.contains(e.id())) {
            return false;
        }

        for event in group {
            if let Some(index) = self.position_of(event) {
                dispatcher.dispatch_remove_event(&self.events[index]);
                let removed = self.events.remove(index);
                self.used_ids.remove(removed.id());
            }
        }

        dispatcher.dispatch_post_remove_event();
        self.invalidate();
        self.update_beat_range(dispatcher);
        true
    }

    /// Pairwise change; both slices must line up id by id
    pub fn change_group(
        &mut self,
        old: &[Event],
        new: &[Event],
        dispatcher: &mut dyn EventDispatcher,
    ) -> bool {
        if old.len() != new.len()
            || old.iter().zip(new).any(|(o, n)| o.id() != n.id())
            || old.iter().any(|e| !self.used_ids.contains(e.id()))
        {
            return false;
        }

        for (before, after) in old.iter().zip(new) {
            if let Some(index) = self.position_of(before) {
                let previous = self.events.remove(index);
                let at = self.insertion_index(after);
                self.events.insert(at, after.clone());
                dispatcher.dispatch_change_event(&previous, after);
            }
        }

        self.invalidate();
        self.update_beat_range(dispatcher);
        true
    }

    //===------------------------------------------------------------------===//
    // Bulk loading
    //===------------------------------------------------------------------===//

    /// Append without sorting or notifying
    ///
    /// Only for bulk loads: finish with `sort()` and `notify_reloaded()`.
    pub fn silent_import(&mut self, event: Event) -> bool {
        if !self.used_ids.insert(event.id().to_string()) {
            return false;
        }
        self.events.push(event);
        self.export_outdated = true;
        true
    }

    pub fn sort(&mut self) {
        self.events.sort_by(Event::compare);
    }

    /// Drop every event without notifying (start of a bulk reload)
    pub fn clear_silently(&mut self) {
        self.events.clear();
        self.used_ids.clear();
        self.export_outdated = true;
    }

    /// One notification for a whole bulk load
    pub fn notify_reloaded(&mut self, dispatcher: &mut dyn EventDispatcher) {
        self.invalidate();
        dispatcher.dispatch_reload_sequence();
        self.update_beat_range(dispatcher);
    }

    //===------------------------------------------------------------------===//
    // Properties
    //===------------------------------------------------------------------===//

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn is_muted(&self) -> bool {
        self.mute
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    pub fn controller_number(&self) -> Option<u8> {
        self.controller_number
    }

    pub fn set_channel(&mut self, channel: u8, dispatcher: &mut dyn EventDispatcher) {
        let channel = channel.clamp(MIN_CHANNEL, MAX_CHANNEL);
        if self.channel != channel {
            self.channel = channel;
            self.property_changed(dispatcher);
        }
    }

    pub fn set_mute(&mut self, mute: bool, dispatcher: &mut dyn EventDispatcher) {
        if self.mute != mute {
            self.mute = mute;
            self.property_changed(dispatcher);
        }
    }

    pub fn set_instrument_id(&mut self, instrument_id: &str, dispatcher: &mut dyn EventDispatcher) {
        if self.instrument_id != instrument_id {
            self.instrument_id = instrument_id.to_string();
            self.property_changed(dispatcher);
        }
    }

    pub fn set_controller_number(
        &mut self,
        controller: Option<u8>,
        dispatcher: &mut dyn EventDispatcher,
    ) {
        let controller = controller.map(|c| c.min(127));
        if self.controller_number != controller {
            self.controller_number = controller;
            self.property_changed(dispatcher);
        }
    }

    fn property_changed(&mut self, dispatcher: &mut dyn EventDispatcher) {
        self.invalidate();
        dispatcher.dispatch_change_track_properties();
    }

    //===------------------------------------------------------------------===//
    // Beat range
    //===------------------------------------------------------------------===//

    /// Beat of the first event, `f32::MAX` when empty
    pub fn first_beat(&self) -> f32 {
        self.events.first().map_or(f32::MAX, Event::beat)
    }

    /// Beat of the last event, `-f32::MAX` when empty
    pub fn last_beat(&self) -> f32 {
        self.events.last().map_or(-f32::MAX, Event::beat)
    }

    pub fn length_in_beats(&self) -> f32 {
        if self.events.is_empty() {
            0.0
        } else {
            self.last_beat() - self.first_beat()
        }
    }

    fn update_beat_range(&mut self, dispatcher: &mut dyn EventDispatcher) {
        let first = self.first_beat();
        let last = self.last_beat();
        if self.last_start_beat == first && self.last_end_beat == last {
            return;
        }

        self.last_start_beat = first;
        self.last_end_beat = last;
        dispatcher.dispatch_change_track_beat_range();
    }

    //===------------------------------------------------------------------===//
    // Export
    //===------------------------------------------------------------------===//

    fn invalidate(&mut self) {
        self.export_outdated = true;
    }

    pub fn is_export_outdated(&self) -> bool {
        self.export_outdated
    }

    /// Flattened MIDI stream for playback
    ///
    /// Rebuilt only when something changed since the last call. A muted
    /// sequence exports nothing, whatever the cache holds.
    pub fn export_sequence(&mut self) -> &[MidiEventTimed] {
        if self.mute {
            return &[];
        }

        if self.export_outdated {
            self.export_cache = self.build_export();
            self.export_outdated = false;
        }

        &self.export_cache
    }

    fn build_export(&self) -> Vec<MidiEventTimed> {
        let channel = self.channel;
        let timed = |event: MidiEvent, beat: f32| MidiEventTimed {
            event,
            channel,
            beat,
        };

        let mut out = Vec::with_capacity(self.events.len() * 2);
        for event in &self.events {
            match event.payload() {
                EventPayload::Note(note) => {
                    let key = note.key.clamp(0, 127) as u8;
                    let velocity = (note.velocity * 127.0).round().clamp(0.0, 127.0) as u8;
                    out.push(timed(MidiEvent::NoteOn { note: key, velocity }, event.beat()));
                    out.push(timed(MidiEvent::NoteOff { note: key }, event.end_beat()));
                }
                EventPayload::Automation(point) => {
                    // Automation points mean nothing without a target controller
                    if let Some(controller) = self.controller_number {
                        let value = (point.controller_value * 127.0).round() as u8;
                        out.push(timed(
                            MidiEvent::ControlChange { controller, value },
                            event.beat(),
                        ));
                    }
                }
                EventPayload::TimeSignature(ts) => out.push(timed(
                    MidiEvent::TimeSignature {
                        numerator: ts.numerator,
                        denominator: ts.denominator,
                    },
                    event.beat(),
                )),
                EventPayload::Annotation(annotation) => out.push(timed(
                    MidiEvent::Text(annotation.description.clone()),
                    event.beat(),
                )),
            }
        }

        out.sort_by(|a, b| a.beat.total_cmp(&b.beat));
        out
    }

    //===------------------------------------------------------------------===//
    // Serialization
    //===------------------------------------------------------------------===//

    pub fn serialize(&self) -> SerializedData {
        let mut node = SerializedData::new(keys::SEQUENCE)
            .with_attribute(keys::CHANNEL, self.channel)
            .with_attribute(keys::MUTE, self.mute)
            .with_attribute(keys::INSTRUMENT, &self.instrument_id)
            .with_children(self.events.iter().map(Event::serialize));

        if let Some(controller) = self.controller_number {
            node.set_attribute(keys::CONTROLLER, controller);
        }

        node
    }

    /// Replace the content wholesale; no notifications are sent
    ///
    /// Unknown child nodes are skipped so newer documents still load.
    pub fn deserialize(&mut self, data: &SerializedData) -> Result<(), ProjectError> {
        data.expect_tag(keys::SEQUENCE)?;

        self.clear_silently();
        self.channel = data
            .get_i32(keys::CHANNEL, MIN_CHANNEL as i32)
            .clamp(MIN_CHANNEL as i32, MAX_CHANNEL as i32) as u8;
        self.mute = data.get_bool(keys::MUTE, false);
        self.instrument_id = data.get_str(keys::INSTRUMENT, "").to_string();
        self.controller_number = data
            .attribute(keys::CONTROLLER)
            .and_then(|c| c.trim().parse::<u8>().ok())
            .map(|c| c.min(127));

        for child in &data.children {
            if Event::is_event_tag(&child.tag) {
                self.silent_import(Event::deserialize(child)?);
            } else {
                log::warn!(target: "project", "Skipping unknown sequence child <{}>", child.tag);
            }
        }

        self.sort();
        self.last_start_beat = self.first_beat();
        self.last_end_beat = self.last_beat();
        Ok(())
    }
}

/// Dispatcher that drops every notification
///
/// For sequences and patterns living outside a project (generated copies,
/// scratch buffers in tests and benchmarks).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDispatcher;

impl EventDispatcher for NullDispatcher {
    fn dispatch_add_event(&mut self, _event: &Event) {}
    fn dispatch_change_event(&mut self, _old: &Event, _new: &Event) {}
    fn dispatch_remove_event(&mut self, _event: &Event) {}
    fn dispatch_post_remove_event(&mut self) {}
    fn dispatch_reload_sequence(&mut self) {}
    fn dispatch_add_clip(&mut self, _clip: &Clip) {}
    fn dispatch_change_clip(&mut self, _old: &Clip, _new: &Clip) {}
    fn dispatch_remove_clip(&mut self, _clip: &Clip) {}
    fn dispatch_post_remove_clip(&mut self) {}
    fn dispatch_reload_pattern(&mut self) {}
    fn dispatch_change_track_properties(&mut self) {}
    fn dispatch_change_track_beat_range(&mut self) {}
}
