// Generated sequences - Cache of clip-specific sequences built from modifier stacks
//
// The cache only listens: edits schedule rebuilds, and the owner runs the
// batched rebuild later (see `ProjectState::flush_generated_sequences`).
// Evictions caused by removals happen immediately and are queued in an
// outbox the broadcaster drains within the same notification. A pattern
// reload only names the track, so the owner prunes against the live pattern
// right after the reload returns (see `ProjectState::with_track`).

use crate::project::listener::ProjectListener;
use crate::sequencer::clip::{Clip, ClipId};
use crate::sequencer::event::Event;
use crate::sequencer::pattern::Pattern;
use crate::sequencer::sequence::Sequence;
use crate::sequencer::track::TrackId;
use std::collections::{BTreeSet, HashMap};

type CacheKey = (TrackId, ClipId);

#[derive(Debug, Default)]
pub struct GeneratedSequences {
    sequences: HashMap<CacheKey, (Clip, Sequence)>,
    /// Clips whose own parameters changed
    pending_clips: BTreeSet<CacheKey>,
    /// Tracks whose base events changed: every clip with modifiers needs a rebuild
    pending_tracks: BTreeSet<TrackId>,
    /// Tracks whose clip list was replaced wholesale since the last prune
    reloaded_patterns: BTreeSet<TrackId>,
    evicted: Vec<(TrackId, Clip)>,
}

/// Work collected since the last flush
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PendingUpdates {
    pub clips: BTreeSet<CacheKey>,
    pub tracks: BTreeSet<TrackId>,
}

impl GeneratedSequences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derived sequence of a clip, if one has been built
    pub fn get(&self, track_id: &str, clip_id: &str) -> Option<&Sequence> {
        self.sequences
            .get(&(track_id.to_string(), clip_id.to_string()))
            .map(|(_, sequence)| sequence)
    }

    pub fn contains(&self, track_id: &str, clip_id: &str) -> bool {
        self.get(track_id, clip_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn has_pending_updates(&self) -> bool {
        !self.pending_clips.is_empty() || !self.pending_tracks.is_empty()
    }

    /// Hand the scheduled work over to whoever runs the rebuild
    pub fn take_pending(&mut self) -> PendingUpdates {
        PendingUpdates {
            clips: std::mem::take(&mut self.pending_clips),
            tracks: std::mem::take(&mut self.pending_tracks),
        }
    }

    pub fn take_reloaded_patterns(&mut self) -> BTreeSet<TrackId> {
        std::mem::take(&mut self.reloaded_patterns)
    }

    /// Ids of every clip of a track that has a cached entry
    pub fn cached_clip_ids(&self, track_id: &str) -> Vec<ClipId> {
        self.sequences
            .keys()
            .filter(|(track, _)| track == track_id)
            .map(|(_, clip_id)| clip_id.clone())
            .collect()
    }

    /// Drop entries whose clip is no longer part of `pattern`
    ///
    /// Evicted clips go to the outbox, like removals do.
    pub fn evict_missing(&mut self, track_id: &str, pattern: &Pattern) {
        for clip_id in self.cached_clip_ids(track_id) {
            if pattern.contains_id(&clip_id) {
                continue;
            }

            let key = (track_id.to_string(), clip_id);
            self.pending_clips.remove(&key);
            if let Some((clip, _)) = self.sequences.remove(&key) {
                log::debug!(target: "generated", "evicting generated sequence of dropped clip {}", clip.id());
                self.evicted.push((key.0, clip));
            }
        }
    }

    /// Entries dropped by removals since the last call
    pub fn take_evicted(&mut self) -> Vec<(TrackId, Clip)> {
        std::mem::take(&mut self.evicted)
    }

    pub fn store(&mut self, track_id: &str, clip: Clip, sequence: Sequence) {
        self.sequences
            .insert((track_id.to_string(), clip.id().to_string()), (clip, sequence));
    }

    pub fn evict(&mut self, track_id: &str, clip_id: &str) -> Option<(Clip, Sequence)> {
        self.sequences
            .remove(&(track_id.to_string(), clip_id.to_string()))
    }

    /// Run a clip's enabled modifiers, in stack order, over a copy of the base sequence
    pub fn build(base: &Sequence, clip: &Clip) -> Sequence {
        let events = clip
            .modifiers()
            .iter()
            .fold(base.events().to_vec(), |events, modifier| modifier.apply(events));

        let mut generated = base.clone();
        generated.clear_silently();
        for event in events {
            generated.silent_import(event);
        }
        generated.sort();
        generated
    }

    fn schedule_clip(&mut self, track_id: &str, clip: &Clip) {
        if clip.has_modifiers() || self.contains(track_id, clip.id()) {
            self.pending_clips
                .insert((track_id.to_string(), clip.id().to_string()));
        }
    }

    fn schedule_track(&mut self, track_id: &str) {
        self.pending_tracks.insert(track_id.to_string());
    }
}

impl ProjectListener for GeneratedSequences {
    fn on_add_event(&mut self, track_id: &str, event: &Event) {
        if !event.is_automation() {
            self.schedule_track(track_id);
        }
    }

    fn on_change_event(&mut self, track_id: &str, _old: &Event, new: &Event) {
        if !new.is_automation() {
            self.schedule_track(track_id);
        }
    }

    fn on_remove_event(&mut self, track_id: &str, event: &Event) {
        if !event.is_automation() {
            self.schedule_track(track_id);
        }
    }

    fn on_reload_sequence(&mut self, track_id: &str) {
        self.schedule_track(track_id);
    }

    fn on_add_clip(&mut self, track_id: &str, clip: &Clip) {
        self.schedule_clip(track_id, clip);
    }

    fn on_change_clip(&mut self, track_id: &str, old: &Clip, new: &Clip) {
        let parameters_changed = old.key() != new.key()
            || old.beat() != new.beat()
            || old.modifiers() != new.modifiers();
        if parameters_changed {
            self.schedule_clip(track_id, new);
        }
    }

    fn on_remove_clip(&mut self, track_id: &str, clip: &Clip) {
        let key = (track_id.to_string(), clip.id().to_string());
        self.pending_clips.remove(&key);
        if let Some((cached_clip, _)) = self.sequences.remove(&key) {
            log::debug!(target: "generated", "evicting generated sequence of clip {}", clip.id());
            self.evicted.push((track_id.to_string(), cached_clip));
        }
    }

    fn on_reload_pattern(&mut self, track_id: &str) {
        self.reloaded_patterns.insert(track_id.to_string());
        self.schedule_track(track_id);
    }

    // A track arriving from undo, load or checkout may bring modifier clips
    fn on_add_track(&mut self, track_id: &str) {
        self.schedule_track(track_id);
    }

    fn on_remove_track(&mut self, track_id: &str) {
        self.pending_tracks.remove(track_id);
        self.reloaded_patterns.remove(track_id);
        self.pending_clips.retain(|(track, _)| track != track_id);

        let keys: Vec<CacheKey> = self
            .sequences
            .keys()
            .filter(|(track, _)| track == track_id)
            .cloned()
            .collect();

        for key in keys {
            if let Some((clip, _)) = self.sequences.remove(&key) {
                self.evicted.push((key.0, clip));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::modifier::{Modifier, ModifierKind};
    use crate::sequencer::sequence::NullDispatcher;

    fn transposed_clip(id: &str) -> Clip {
        Clip::new(id, 0.0).with_appended_modifier(Modifier::new(ModifierKind::Transpose(12)))
    }

    #[test]
    fn test_build_applies_modifiers_to_a_copy() {
        let mut base = Sequence::new();
        base.insert(Event::note("a", 0.0, 60, 1.0, 1.0), &mut NullDispatcher);

        let generated = GeneratedSequences::build(&base, &transposed_clip("c"));

        assert_eq!(generated.events()[0].as_note().unwrap().key, 72);
        assert_eq!(base.events()[0].as_note().unwrap().key, 60);
    }

    #[test]
    fn test_plain_clips_are_not_scheduled() {
        let mut cache = GeneratedSequences::new();
        cache.on_add_clip("t", &Clip::new("c", 0.0));
        assert!(!cache.has_pending_updates());

        cache.on_add_clip("t", &transposed_clip("m"));
        assert!(cache.has_pending_updates());
    }

    #[test]
    fn test_schedules_coalesce() {
        let mut cache = GeneratedSequences::new();
        let clip = transposed_clip("c");
        cache.on_add_clip("t", &clip);
        cache.on_change_clip("t", &clip, &clip.with_beat(4.0));
        cache.on_change_clip("t", &clip.with_beat(4.0), &clip.with_beat(8.0));

        let pending = cache.take_pending();
        assert_eq!(pending.clips.len(), 1);
        assert!(!cache.has_pending_updates());
    }

    #[test]
    fn test_automation_edits_are_ignored() {
        let mut cache = GeneratedSequences::new();
        cache.on_add_event("t", &Event::automation("x", 0.0, 0.5));
        assert!(!cache.has_pending_updates());

        cache.on_add_event("t", &Event::note("n", 0.0, 60, 1.0, 1.0));
        assert_eq!(cache.take_pending().tracks.len(), 1);
    }

    #[test]
    fn test_remove_clip_cancels_and_evicts() {
        let mut cache = GeneratedSequences::new();
        let clip = transposed_clip("c");
        cache.store("t", clip.clone(), Sequence::new());
        cache.on_change_clip("t", &clip, &clip.with_key(2));
        assert!(cache.has_pending_updates());

        cache.on_remove_clip("t", &clip);

        assert!(!cache.has_pending_updates());
        assert!(cache.get("t", "c").is_none());
        let evicted = cache.take_evicted();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].1.id(), "c");
    }

    #[test]
    fn test_added_track_is_scheduled() {
        let mut cache = GeneratedSequences::new();
        cache.on_add_track("t");

        let pending = cache.take_pending();
        assert!(pending.tracks.contains("t"));
    }

    #[test]
    fn test_evict_missing_keeps_live_clips() {
        let mut cache = GeneratedSequences::new();
        cache.store("t", transposed_clip("a"), Sequence::new());
        cache.store("t", transposed_clip("b"), Sequence::new());
        cache.store("u", transposed_clip("b"), Sequence::new());
        cache.on_reload_pattern("t");
        assert_eq!(cache.take_reloaded_patterns().len(), 1);

        let mut live = Pattern::new();
        live.insert(transposed_clip("a"), &mut NullDispatcher);
        cache.evict_missing("t", &live);

        assert!(cache.contains("t", "a"));
        assert!(!cache.contains("t", "b"));
        assert!(cache.contains("u", "b"));
        let evicted = cache.take_evicted();
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].1.id(), "b");
    }

    #[test]
    fn test_remove_track_evicts_all_entries() {
        let mut cache = GeneratedSequences::new();
        cache.store("t", transposed_clip("a"), Sequence::new());
        cache.store("t", transposed_clip("b"), Sequence::new());
        cache.store("u", transposed_clip("a"), Sequence::new());
        cache.on_reload_sequence("t");

        cache.on_remove_track("t");

        assert_eq!(cache.len(), 1);
        assert!(cache.contains("u", "a"));
        assert_eq!(cache.take_evicted().len(), 2);
        assert!(!cache.has_pending_updates());
    }
}
