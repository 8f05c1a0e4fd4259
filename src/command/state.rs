// ProjectState - The live track tree that undo actions run against
//
// This struct owns every track plus the notification fan-out. Actions only
// reach the tracks through the id-based methods below, so a stale id just
// makes the call return false.

use crate::midi::event::MidiEventTimed;
use crate::project::listener::{ListenerId, ProjectBroadcaster, ProjectListener};
use crate::sequencer::clip::{Clip, ClipId};
use crate::sequencer::event::{Colour, Event};
use crate::sequencer::generated::GeneratedSequences;
use crate::sequencer::sequence::Sequence;
use crate::sequencer::timeline::{BEATS_PER_BAR, DEFAULT_NUM_BARS};
use crate::sequencer::track::{Track, TrackId};
use std::collections::BTreeSet;

/// Tracks of a project and whoever listens to them
pub struct ProjectState {
    tracks: Vec<Track>,
    broadcaster: ProjectBroadcaster,
    /// Minimum length of the project range
    default_length_in_beats: f32,
}

impl Default for ProjectState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectState {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            broadcaster: ProjectBroadcaster::default(),
            default_length_in_beats: DEFAULT_NUM_BARS as f32 * BEATS_PER_BAR,
        }
    }

    pub fn set_default_length_in_beats(&mut self, beats: f32) {
        self.default_length_in_beats = beats.max(BEATS_PER_BAR);
    }

    //===------------------------------------------------------------------===//
    // Lookup
    //===------------------------------------------------------------------===//

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, track_id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id() == track_id)
    }

    pub fn track_index(&self, track_id: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.id() == track_id)
    }

    /// Run `f` on a track together with the listener its changes must go to
    ///
    /// Returns `None` (and logs) if no track has that id. If `f` reloaded the
    /// pattern, generated sequences of clips it dropped are evicted before
    /// this returns.
    pub fn with_track<R>(
        &mut self,
        track_id: &str,
        f: impl FnOnce(&mut Track, &mut dyn ProjectListener) -> R,
    ) -> Option<R> {
        let result = match self.tracks.iter_mut().find(|t| t.id() == track_id) {
            Some(track) => f(track, &mut self.broadcaster),
            None => {
                log::warn!(target: "project", "Track {} not found", track_id);
                return None;
            }
        };

        self.evict_dropped_generated();
        Some(result)
    }

    fn evict_dropped_generated(&mut self) {
        for track_id in self.broadcaster.generated.take_reloaded_patterns() {
            if let Some(track) = self.tracks.iter().find(|t| t.id() == track_id) {
                self.broadcaster
                    .generated
                    .evict_missing(&track_id, track.pattern());
            }
        }
        self.broadcaster.announce_evictions();
    }

    pub fn export_sequence(&mut self, track_id: &str) -> Option<&[MidiEventTimed]> {
        self.tracks
            .iter_mut()
            .find(|t| t.id() == track_id)
            .map(|t| t.export_sequence())
    }

    //===------------------------------------------------------------------===//
    // Listeners
    //===------------------------------------------------------------------===//

    pub fn add_listener(&mut self, listener: Box<dyn ProjectListener>) -> ListenerId {
        self.broadcaster.listeners.add(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.broadcaster.listeners.remove(id)
    }

    pub fn generated_sequences(&self) -> &GeneratedSequences {
        self.broadcaster.generated()
    }

    //===------------------------------------------------------------------===//
    // Events
    //===------------------------------------------------------------------===//

    pub fn insert_event(&mut self, track_id: &str, event: Event) -> bool {
        self.with_track(track_id, |track, listener| {
            let (sequence, mut dispatcher) = track.sequence_with_dispatcher(listener);
            sequence.insert(event, &mut dispatcher)
        })
        .unwrap_or(false)
    }

    pub fn remove_event(&mut self, track_id: &str, event: &Event) -> bool {
        self.with_track(track_id, |track, listener| {
            let (sequence, mut dispatcher) = track.sequence_with_dispatcher(listener);
            sequence.remove(event, &mut dispatcher)
        })
        .unwrap_or(false)
    }

    pub fn change_event(&mut self, track_id: &str, old: &Event, new: Event) -> bool {
        self.with_track(track_id, |track, listener| {
            let (sequence, mut dispatcher) = track.sequence_with_dispatcher(listener);
            sequence.change(old, new, &mut dispatcher)
        })
        .unwrap_or(false)
    }

    pub fn insert_events(&mut self, track_id: &str, group: &[Event]) -> bool {
        self.with_track(track_id, |track, listener| {
            let (sequence, mut dispatcher) = track.sequence_with_dispatcher(listener);
            sequence.insert_group(group, &mut dispatcher)
        })
        .unwrap_or(false)
    }

    pub fn remove_events(&mut self, track_id: &str, group: &[Event]) -> bool {
        self.with_track(track_id, |track, listener| {
            let (sequence, mut dispatcher) = track.sequence_with_dispatcher(listener);
            sequence.remove_group(group, &mut dispatcher)
        })
        .unwrap_or(false)
    }

    pub fn change_events(&mut self, track_id: &str, old: &[Event], new: &[Event]) -> bool {
        self.with_track(track_id, |track, listener| {
            let (sequence, mut dispatcher) = track.sequence_with_dispatcher(listener);
            sequence.change_group(old, new, &mut dispatcher)
        })
        .unwrap_or(false)
    }

    //===------------------------------------------------------------------===//
    // Clips
    //===------------------------------------------------------------------===//

    pub fn insert_clip(&mut self, track_id: &str, clip: Clip) -> bool {
        self.with_track(track_id, |track, listener| {
            let (pattern, mut dispatcher) = track.pattern_with_dispatcher(listener);
            pattern.insert(clip, &mut dispatcher)
        })
        .unwrap_or(false)
    }

    pub fn remove_clip(&mut self, track_id: &str, clip: &Clip) -> bool {
        self.with_track(track_id, |track, listener| {
            let (pattern, mut dispatcher) = track.pattern_with_dispatcher(listener);
            pattern.remove(clip, &mut dispatcher)
        })
        .unwrap_or(false)
    }

    pub fn change_clip(&mut self, track_id: &str, old: &Clip, new: Clip) -> bool {
        self.with_track(track_id, |track, listener| {
            let (pattern, mut dispatcher) = track.pattern_with_dispatcher(listener);
            pattern.change(old, new, &mut dispatcher)
        })
        .unwrap_or(false)
    }

    pub fn insert_clips(&mut self, track_id: &str, group: &[Clip]) -> bool {
        self.with_track(track_id, |track, listener| {
            let (pattern, mut dispatcher) = track.pattern_with_dispatcher(listener);
            pattern.insert_group(group, &mut dispatcher)
        })
        .unwrap_or(false)
    }

    pub fn remove_clips(&mut self, track_id: &str, group: &[Clip]) -> bool {
        self.with_track(track_id, |track, listener| {
            let (pattern, mut dispatcher) = track.pattern_with_dispatcher(listener);
            pattern.remove_group(group, &mut dispatcher)
        })
        .unwrap_or(false)
    }

    pub fn change_clips(&mut self, track_id: &str, old: &[Clip], new: &[Clip]) -> bool {
        self.with_track(track_id, |track, listener| {
            let (pattern, mut dispatcher) = track.pattern_with_dispatcher(listener);
            pattern.change_group(old, new, &mut dispatcher)
        })
        .unwrap_or(false)
    }

    //===------------------------------------------------------------------===//
    // Track properties
    //===------------------------------------------------------------------===//

    pub fn set_track_name(&mut self, track_id: &str, name: &str) -> bool {
        self.with_track(track_id, |track, listener| track.set_name(name, listener))
            .is_some()
    }

    pub fn set_track_colour(&mut self, track_id: &str, colour: Colour) -> bool {
        self.with_track(track_id, |track, listener| track.set_colour(colour, listener))
            .is_some()
    }

    pub fn set_track_instrument(&mut self, track_id: &str, instrument_id: &str) -> bool {
        self.with_track(track_id, |track, listener| {
            track.set_instrument_id(instrument_id, listener)
        })
        .is_some()
    }

    pub fn set_track_time_signature(&mut self, track_id: &str, time_signature: Option<Event>) -> bool {
        self.with_track(track_id, |track, listener| {
            track.set_time_signature_override(time_signature, listener, true)
        })
        .is_some()
    }

    //===------------------------------------------------------------------===//
    // Tracks
    //===------------------------------------------------------------------===//

    /// Append a track; fails if the id is taken
    pub fn add_track(&mut self, track: Track) -> bool {
        let index = self.tracks.len();
        self.insert_track(index, track)
    }

    /// Insert a track at `index` (clamped to the track count)
    pub fn insert_track(&mut self, index: usize, track: Track) -> bool {
        if self.track(track.id()).is_some() {
            log::warn!(target: "project", "Track {} already exists", track.id());
            return false;
        }

        let track_id = track.id().to_string();
        let index = index.min(self.tracks.len());
        self.tracks.insert(index, track);

        self.broadcaster.on_add_track(&track_id);
        self.notify_project_beat_range();
        true
    }

    /// Detach a track, returning it with the position it had
    pub fn remove_track(&mut self, track_id: &str) -> Option<(usize, Track)> {
        let index = self.track_index(track_id)?;

        self.broadcaster.on_remove_track(track_id);
        let track = self.tracks.remove(index);
        self.notify_project_beat_range();
        Some((index, track))
    }

    //===------------------------------------------------------------------===//
    // Beat range
    //===------------------------------------------------------------------===//

    /// First and last beat of the whole project
    ///
    /// Each track contributes its sequence range shifted by its pattern range.
    /// The result always spans at least the default length.
    pub fn beat_range(&self) -> (f32, f32) {
        let mut first = f32::MAX;
        let mut last = -f32::MAX;

        for track in &self.tracks {
            let sequence = track.sequence();
            let pattern = track.pattern();
            first = first.min(sequence.first_beat() + pattern.first_beat());
            last = last.max(sequence.last_beat() + pattern.last_beat());
        }

        let default_length = self.default_length_in_beats;
        if first == f32::MAX {
            first = 0.0;
        } else if first > last {
            first = last - default_length;
        }

        if (last - first) < default_length {
            last = first + default_length;
        }

        (first, last)
    }

    fn notify_project_beat_range(&mut self) {
        let (first, last) = self.beat_range();
        self.broadcaster.on_change_project_beat_range(first, last);
    }

    //===------------------------------------------------------------------===//
    // Generated sequences
    //===------------------------------------------------------------------===//

    /// Run every scheduled generated-sequence rebuild in one pass
    ///
    /// Each rebuild reads the clip as it is now, not as it was when the
    /// rebuild was scheduled. Clips that lost their modifiers get their
    /// entry dropped. Ends with a single project beat range notification.
    /// Returns the number of clips processed.
    pub fn flush_generated_sequences(&mut self) -> usize {
        let pending = self.broadcaster.generated.take_pending();
        let mut keys: BTreeSet<(TrackId, ClipId)> = pending.clips;

        for track_id in &pending.tracks {
            let Some(track) = self.track(track_id) else {
                continue;
            };
            for clip in track.pattern().clips() {
                if clip.has_modifiers() || self.broadcaster.generated.contains(track_id, clip.id()) {
                    keys.insert((track_id.clone(), clip.id().to_string()));
                }
            }
            // Cached clips the pattern no longer has fall through to eviction
            for clip_id in self.broadcaster.generated.cached_clip_ids(track_id) {
                keys.insert((track_id.clone(), clip_id));
            }
        }

        if keys.is_empty() {
            return 0;
        }

        for (track_id, clip_id) in &keys {
            let live = self.track(track_id).and_then(|track| {
                track
                    .pattern()
                    .get(clip_id)
                    .filter(|clip| clip.has_modifiers())
                    .map(|clip| (clip.clone(), GeneratedSequences::build(track.sequence(), clip)))
            });

            match live {
                Some((clip, sequence)) => {
                    self.broadcaster.generated.store(track_id, clip.clone(), sequence);
                    let generated: Option<&Sequence> =
                        self.broadcaster.generated.get(track_id, clip_id);
                    self.broadcaster
                        .listeners
                        .on_reload_generated_sequence(track_id, &clip, generated);
                }
                None => {
                    if let Some((clip, _)) = self.broadcaster.generated.evict(track_id, clip_id) {
                        self.broadcaster
                            .listeners
                            .on_reload_generated_sequence(track_id, &clip, None);
                    }
                }
            }
        }

        log::debug!(target: "generated", "Rebuilt {} generated sequences", keys.len());
        self.notify_project_beat_range();
        keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::modifier::{Modifier, ModifierKind};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log {
        reloads: Vec<(String, bool)>,
        ranges: Vec<(f32, f32)>,
    }

    struct Recorder(Rc<RefCell<Log>>);

    impl ProjectListener for Recorder {
        fn on_change_project_beat_range(&mut self, first_beat: f32, last_beat: f32) {
            self.0.borrow_mut().ranges.push((first_beat, last_beat));
        }

        fn on_reload_generated_sequence(
            &mut self,
            _track_id: &str,
            clip: &Clip,
            sequence: Option<&Sequence>,
        ) {
            self.0
                .borrow_mut()
                .reloads
                .push((clip.id().to_string(), sequence.is_some()));
        }
    }

    fn state_with_track() -> (ProjectState, Rc<RefCell<Log>>) {
        let mut state = ProjectState::new();
        state.add_track(Track::with_id("t", "Lead"));
        let log = Rc::new(RefCell::new(Log::default()));
        state.add_listener(Box::new(Recorder(log.clone())));
        (state, log)
    }

    #[test]
    fn test_empty_project_range() {
        let state = ProjectState::new();
        assert_eq!(state.beat_range(), (0.0, 32.0));
    }

    #[test]
    fn test_range_spans_sequence_and_pattern() {
        let (mut state, _) = state_with_track();
        state.insert_event("t", Event::note("a", 4.0, 60, 1.0, 1.0));
        state.insert_event("t", Event::note("b", 40.0, 60, 1.0, 1.0));
        state.insert_clip("t", Clip::new("late", 16.0));

        assert_eq!(state.beat_range(), (4.0, 56.0));
    }

    #[test]
    fn test_stale_track_id_is_absorbed() {
        let (mut state, _) = state_with_track();
        assert!(!state.insert_event("gone", Event::note("a", 0.0, 60, 1.0, 1.0)));
        assert!(!state.set_track_name("gone", "X"));
        assert!(state.remove_track("gone").is_none());
    }

    #[test]
    fn test_duplicate_track_is_rejected() {
        let (mut state, _) = state_with_track();
        assert!(!state.add_track(Track::with_id("t", "Other")));
        assert_eq!(state.tracks().len(), 1);
    }

    #[test]
    fn test_remove_and_reinsert_track_keeps_position() {
        let (mut state, _) = state_with_track();
        state.add_track(Track::with_id("u", "Bass"));

        let (index, track) = state.remove_track("t").unwrap();
        assert_eq!(index, 0);
        assert!(state.insert_track(index, track));
        assert_eq!(state.tracks()[0].id(), "t");
    }

    #[test]
    fn test_flush_builds_and_notifies_once() {
        let (mut state, log) = state_with_track();
        state.insert_event("t", Event::note("a", 0.0, 60, 1.0, 1.0));
        let clip = Clip::new("m", 4.0).with_appended_modifier(Modifier::new(ModifierKind::Transpose(5)));
        state.insert_clip("t", clip.clone());
        state.change_clip("t", &clip, clip.with_beat(8.0));
        log.borrow_mut().ranges.clear();

        assert!(state.generated_sequences().is_empty());
        assert_eq!(state.flush_generated_sequences(), 1);

        let generated = state.generated_sequences().get("t", "m").unwrap();
        assert_eq!(generated.events()[0].as_note().unwrap().key, 65);
        assert_eq!(log.borrow().reloads, vec![("m".to_string(), true)]);
        assert_eq!(log.borrow().ranges.len(), 1);

        assert_eq!(state.flush_generated_sequences(), 0);
    }

    #[test]
    fn test_flush_drops_clip_without_modifiers() {
        let (mut state, log) = state_with_track();
        let clip = Clip::new("m", 0.0).with_appended_modifier(Modifier::new(ModifierKind::Legato));
        state.insert_clip("t", clip.clone());
        state.flush_generated_sequences();

        state.change_clip("t", &clip, clip.with_removed_modifier(0));
        state.flush_generated_sequences();

        assert!(state.generated_sequences().is_empty());
        assert_eq!(
            log.borrow().reloads,
            vec![("m".to_string(), true), ("m".to_string(), false)]
        );
    }

    #[test]
    fn test_base_edit_rebuilds_every_modified_clip() {
        let (mut state, _) = state_with_track();
        let transpose = Modifier::new(ModifierKind::Transpose(1));
        state.insert_clip("t", Clip::new("x", 0.0).with_appended_modifier(transpose));
        state.insert_clip("t", Clip::new("y", 8.0).with_appended_modifier(transpose));
        state.flush_generated_sequences();

        state.insert_event("t", Event::note("n", 1.0, 60, 1.0, 1.0));
        assert!(state.generated_sequences().has_pending_updates());
        assert_eq!(state.flush_generated_sequences(), 2);
        assert_eq!(state.generated_sequences().get("t", "y").unwrap().len(), 1);
    }

    #[test]
    fn test_reinserted_track_is_rebuilt() {
        let (mut state, log) = state_with_track();
        let clip = Clip::new("m", 0.0).with_appended_modifier(Modifier::new(ModifierKind::Transpose(2)));
        state.insert_clip("t", clip);
        state.flush_generated_sequences();

        let (index, track) = state.remove_track("t").unwrap();
        assert!(state.generated_sequences().is_empty());
        state.insert_track(index, track);

        assert_eq!(state.flush_generated_sequences(), 1);
        assert!(state.generated_sequences().contains("t", "m"));
        assert_eq!(
            log.borrow().reloads,
            vec![
                ("m".to_string(), true),
                ("m".to_string(), false),
                ("m".to_string(), true)
            ]
        );
    }

    #[test]
    fn test_removing_clip_evicts_synchronously() {
        let (mut state, log) = state_with_track();
        let clip = Clip::new("m", 0.0).with_appended_modifier(Modifier::new(ModifierKind::Retrograde));
        state.insert_clip("t", clip.clone());
        state.flush_generated_sequences();

        assert!(state.remove_clip("t", &clip));

        assert!(state.generated_sequences().get("t", "m").is_none());
        assert_eq!(log.borrow().reloads.last(), Some(&("m".to_string(), false)));
    }
}
