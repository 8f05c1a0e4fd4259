// Pattern - The sorted list of clip placements owned by one track
// A pattern is never empty once loaded: every track needs one placement to be visible

use crate::project::error::ProjectError;
use crate::project::listener::EventDispatcher;
use crate::project::serialization::{SerializedData, keys};
use crate::sequencer::clip::{Clip, ClipId};
use crate::sequencer::event::create_unique_id;
use std::collections::HashSet;

/// Clips of one track, sorted by (beat, id)
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    clips: Vec<Clip>,
    used_ids: HashSet<ClipId>,
}

impl Pattern {
    pub fn new() -> Self {
        Self {
            clips: Vec::new(),
            used_ids: HashSet::new(),
        }
    }

    /// Pattern holding the single default placement at beat zero
    pub fn with_default_clip() -> Self {
        let mut pattern = Self::new();
        pattern.ensure_default_clip();
        pattern
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id() == id)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.used_ids.contains(id)
    }

    pub fn create_unique_clip_id(&self) -> ClipId {
        create_unique_id(|candidate| self.contains_id(candidate))
    }

    /// Binary search by (beat, id)
    ///
    /// Callers rely on the result being exact, so an unsorted pattern is a bug.
    pub fn index_of_sorted(&self, clip: &Clip) -> Option<usize> {
        self.clips.binary_search_by(|other| other.compare(clip)).ok()
    }

    fn position_of(&self, clip: &Clip) -> Option<usize> {
        self.index_of_sorted(clip)
            .or_else(|| self.clips.iter().position(|c| c.id() == clip.id()))
    }

    fn insert_sorted(&mut self, clip: Clip) -> usize {
        self.used_ids.insert(clip.id().to_string());
        let at = self
            .clips
            .binary_search_by(|other| other.compare(&clip))
            .unwrap_or_else(|pos| pos);
        self.clips.insert(at, clip);
        at
    }

    fn remove_at(&mut self, index: usize) -> Clip {
        let clip = self.clips.remove(index);
        self.used_ids.remove(clip.id());
        clip
    }

    pub fn is_sorted(&self) -> bool {
        self.clips
            .windows(2)
            .all(|pair| pair[0].compare(&pair[1]).is_le())
    }

    pub fn first_beat(&self) -> f32 {
        self.clips.first().map_or(0.0, Clip::beat)
    }

    pub fn last_beat(&self) -> f32 {
        self.clips.last().map_or(0.0, Clip::beat)
    }

    //===------------------------------------------------------------------===//
    // Direct mutations
    //===------------------------------------------------------------------===//

    pub fn insert(&mut self, clip: Clip, dispatcher: &mut dyn EventDispatcher) -> bool {
        if self.contains_id(clip.id()) {
            return false;
        }

        let at = self.insert_sorted(clip);
        dispatcher.dispatch_add_clip(&self.clips[at]);
        dispatcher.dispatch_change_track_beat_range();
        true
    }

    pub fn remove(&mut self, clip: &Clip, dispatcher: &mut dyn EventDispatcher) -> bool {
        let Some(index) = self.position_of(clip) else {
            return false;
        };

        dispatcher.dispatch_remove_clip(&self.clips[index]);
        self.remove_at(index);
        dispatcher.dispatch_post_remove_clip();
        dispatcher.dispatch_change_track_beat_range();
        true
    }

    pub fn change(&mut self, old: &Clip, new: Clip, dispatcher: &mut dyn EventDispatcher) -> bool {
        if old.id() != new.id() {
            return false;
        }

        let Some(index) = self.position_of(old) else {
            return false;
        };

        let previous = self.remove_at(index);
        let at = self.insert_sorted(new);
        dispatcher.dispatch_change_clip(&previous, &self.clips[at]);
        dispatcher.dispatch_change_track_beat_range();
        true
    }

    /// Insert a batch; rejected as a whole if any id is already taken
    pub fn insert_group(&mut self, group: &[Clip], dispatcher: &mut dyn EventDispatcher) -> bool {
        let mut incoming = HashSet::new();
        if group
            .iter()
            .any(|c| self.contains_id(c.id()) || !incoming.insert(c.id()))
        {
            return false;
        }

        for clip in group {
            self.insert_sorted(clip.clone());
            dispatcher.dispatch_add_clip(clip);
        }

        dispatcher.dispatch_change_track_beat_range();
        true
    }

    /// Remove a batch; rejected as a whole if any clip is missing
    pub fn remove_group(&mut self, group: &[Clip], dispatcher: &mut dyn EventDispatcher) -> bool {
        if group.iter().any(|c| !self.contains_id(c.id())) {
            return false;
        }

        for clip in group {
            if let Some(index) = self.position_of(clip) {
                dispatcher.dispatch_remove_clip(&self.clips[index]);
                self.remove_at(index);
            }
        }

        dispatcher.dispatch_post_remove_clip();
        dispatcher.dispatch_change_track_beat_range();
        true
    }

    pub fn change_group(
        &mut self,
        old: &[Clip],
        new: &[Clip],
        dispatcher: &mut dyn EventDispatcher,
    ) -> bool {
        if old.len() != new.len()
            || old.iter().zip(new).any(|(o, n)| o.id() != n.id())
            || old.iter().any(|c| !self.contains_id(c.id()))
        {
            return false;
        }

        for (before, after) in old.iter().zip(new) {
            if let Some(index) = self.position_of(before) {
                let previous = self.remove_at(index);
                self.insert_sorted(after.clone());
                dispatcher.dispatch_change_clip(&previous, after);
            }
        }

        dispatcher.dispatch_change_track_beat_range();
        true
    }

    //===------------------------------------------------------------------===//
    // Bulk loading
    //===------------------------------------------------------------------===//

    pub fn silent_import(&mut self, clip: Clip) -> bool {
        if !self.used_ids.insert(clip.id().to_string()) {
            return false;
        }
        self.clips.push(clip);
        true
    }

    pub fn sort(&mut self) {
        self.clips.sort_by(Clip::compare);
    }

    pub fn clear_silently(&mut self) {
        self.clips.clear();
        self.used_ids.clear();
    }

    /// Fall back to the default placement if a load left nothing behind
    pub fn ensure_default_clip(&mut self) {
        if self.clips.is_empty() {
            let id = self.create_unique_clip_id();
            self.silent_import(Clip::new(id, 0.0));
        }
    }

    pub fn notify_reloaded(&mut self, dispatcher: &mut dyn EventDispatcher) {
        dispatcher.dispatch_reload_pattern();
        dispatcher.dispatch_change_track_beat_range();
    }

    //===------------------------------------------------------------------===//
    // Serialization
    //===------------------------------------------------------------------===//

    pub fn serialize(&self) -> SerializedData {
        SerializedData::new(keys::PATTERN).with_children(self.clips.iter().map(Clip::serialize))
    }

    /// Replace all clips; an empty document yields one default clip at beat zero
    pub fn deserialize(&mut self, data: &SerializedData) -> Result<(), ProjectError> {
        data.expect_tag(keys::PATTERN)?;

        self.clear_silently();
        for child in data.children_with_tag(keys::CLIP) {
            self.silent_import(Clip::deserialize(child)?);
        }

        self.ensure_default_clip();
        self.sort();
        Ok(())
    }
}
