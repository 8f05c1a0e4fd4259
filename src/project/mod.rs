// Project - Composition root for the sequencer model
//
// Owns the live track tree (ProjectState) and its undo history. Every edit
// takes an `undoable` flag: undoable edits are recorded as actions on the
// stack, the others run the same action once and drop it.

pub mod error;
pub mod listener;
pub mod serialization;

use crate::command::manager::{TransactionId, UndoStack, UndoStackConfig};
use crate::command::state::ProjectState;
use crate::command::trait_def::UndoAction;
use crate::command::{
    ClipChangeAction, ClipInsertAction, ClipRemoveAction, ClipsGroupChangeAction,
    ClipsGroupInsertAction, ClipsGroupRemoveAction, EventChangeAction, EventInsertAction,
    EventRemoveAction, EventsGroupChangeAction, EventsGroupInsertAction, EventsGroupRemoveAction,
    TrackColourAction, TrackInsertAction, TrackInstrumentAction, TrackRemoveAction,
    TrackRenameAction, TrackTimeSignatureAction,
};
use crate::midi::event::MidiEventTimed;
use crate::sequencer::clip::Clip;
use crate::sequencer::event::{Colour, Event};
use crate::sequencer::sequence::Sequence;
use crate::sequencer::track::Track;
use crate::vcs::delta::Delta;
use serde::{Deserialize, Serialize};

pub use error::ProjectError;
pub use listener::{EventDispatcher, ListenerId, ProjectBroadcaster, ProjectListener};
pub use serialization::{
    SerializedData, deserialize_from_json, deserialize_from_ron, serialize_to_json,
    serialize_to_ron,
};

/// Project settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub undo: UndoStackConfig,
    /// Minimum project length, in bars
    pub default_bar_count: u32,
    pub beats_per_bar: u32,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            undo: UndoStackConfig::default(),
            default_bar_count: 8,
            beats_per_bar: 4,
        }
    }
}

impl ProjectConfig {
    pub fn from_ron(text: &str) -> Result<Self, ProjectError> {
        deserialize_from_ron(text)
    }

    pub fn from_json(text: &str) -> Result<Self, ProjectError> {
        deserialize_from_json(text)
    }

    pub fn default_length_in_beats(&self) -> f32 {
        (self.default_bar_count * self.beats_per_bar) as f32
    }
}

/// A project: tracks, listeners and undo history
pub struct Project {
    state: ProjectState,
    undo_stack: UndoStack,
    config: ProjectConfig,
}

impl Default for Project {
    fn default() -> Self {
        Self::new(ProjectConfig::default())
    }
}

impl Project {
    pub fn new(config: ProjectConfig) -> Self {
        let mut state = ProjectState::new();
        state.set_default_length_in_beats(config.default_length_in_beats());

        Self {
            state,
            undo_stack: UndoStack::with_config(config.undo),
            config,
        }
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn state(&self) -> &ProjectState {
        &self.state
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo_stack
    }

    pub fn tracks(&self) -> &[Track] {
        self.state.tracks()
    }

    pub fn track(&self, track_id: &str) -> Option<&Track> {
        self.state.track(track_id)
    }

    fn apply(&mut self, mut action: Box<dyn UndoAction>, undoable: bool) -> bool {
        if undoable {
            self.undo_stack.perform(action, &mut self.state)
        } else {
            action.perform(&mut self.state)
        }
    }

    //===------------------------------------------------------------------===//
    // Undo / redo
    //===------------------------------------------------------------------===//

    /// Close the current transaction
    pub fn checkpoint(&mut self) {
        self.undo_stack.begin_new_transaction(None);
    }

    pub fn checkpoint_with_id(&mut self, transaction_id: TransactionId) {
        self.undo_stack.begin_new_transaction(Some(transaction_id));
    }

    pub fn undo(&mut self) -> bool {
        self.undo_stack.undo(&mut self.state)
    }

    pub fn redo(&mut self) -> bool {
        self.undo_stack.redo(&mut self.state)
    }

    pub fn can_undo(&self) -> bool {
        self.undo_stack.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo_stack.can_redo()
    }

    pub fn clear_undo_history(&mut self) {
        self.undo_stack.clear_undo_history();
    }

    //===------------------------------------------------------------------===//
    // Tracks
    //===------------------------------------------------------------------===//

    pub fn add_track(&mut self, track: Track, undoable: bool) -> bool {
        if undoable {
            self.apply(Box::new(TrackInsertAction::new(&track)), true)
        } else {
            self.state.add_track(track)
        }
    }

    pub fn remove_track(&mut self, track_id: &str, undoable: bool) -> bool {
        self.apply(Box::new(TrackRemoveAction::new(track_id)), undoable)
    }

    pub fn rename_track(&mut self, track_id: &str, name: &str, undoable: bool) -> bool {
        self.apply(Box::new(TrackRenameAction::new(track_id, name)), undoable)
    }

    pub fn set_track_colour(&mut self, track_id: &str, colour: Colour, undoable: bool) -> bool {
        self.apply(Box::new(TrackColourAction::new(track_id, colour)), undoable)
    }

    pub fn set_track_instrument(&mut self, track_id: &str, instrument_id: &str, undoable: bool) -> bool {
        self.apply(
            Box::new(TrackInstrumentAction::new(track_id, instrument_id)),
            undoable,
        )
    }

    pub fn set_track_time_signature(
        &mut self,
        track_id: &str,
        time_signature: Option<Event>,
        undoable: bool,
    ) -> bool {
        self.apply(
            Box::new(TrackTimeSignatureAction::new(track_id, time_signature)),
            undoable,
        )
    }

    //===------------------------------------------------------------------===//
    // Events
    //===------------------------------------------------------------------===//

    pub fn insert_event(&mut self, track_id: &str, event: Event, undoable: bool) -> bool {
        self.apply(Box::new(EventInsertAction::new(track_id, event)), undoable)
    }

    pub fn remove_event(&mut self, track_id: &str, event: &Event, undoable: bool) -> bool {
        self.apply(
            Box::new(EventRemoveAction::new(track_id, event.clone())),
            undoable,
        )
    }

    pub fn change_event(&mut self, track_id: &str, old: &Event, new: Event, undoable: bool) -> bool {
        self.apply(
            Box::new(EventChangeAction::new(track_id, old.clone(), new)),
            undoable,
        )
    }

    pub fn insert_events(&mut self, track_id: &str, group: Vec<Event>, undoable: bool) -> bool {
        self.apply(Box::new(EventsGroupInsertAction::new(track_id, group)), undoable)
    }

    pub fn remove_events(&mut self, track_id: &str, group: Vec<Event>, undoable: bool) -> bool {
        self.apply(Box::new(EventsGroupRemoveAction::new(track_id, group)), undoable)
    }

    pub fn change_events(
        &mut self,
        track_id: &str,
        old: Vec<Event>,
        new: Vec<Event>,
        undoable: bool,
    ) -> bool {
        self.apply(
            Box::new(EventsGroupChangeAction::new(track_id, old, new)),
            undoable,
        )
    }

    /// Shift every note of a track by `delta_key` semitones as one group change
    ///
    /// Returns `false` if the track has no notes.
    pub fn transpose_all(&mut self, track_id: &str, delta_key: i32, undoable: bool) -> bool {
        let Some(track) = self.state.track(track_id) else {
            return false;
        };

        let old: Vec<Event> = track
            .sequence()
            .events()
            .iter()
            .filter(|e| e.is_note())
            .cloned()
            .collect();

        if old.is_empty() || delta_key == 0 {
            return false;
        }

        let new = old.iter().map(|e| e.with_delta_key(delta_key)).collect();
        self.change_events(track_id, old, new, undoable)
    }

    //===------------------------------------------------------------------===//
    // Clips
    //===------------------------------------------------------------------===//

    pub fn insert_clip(&mut self, track_id: &str, clip: Clip, undoable: bool) -> bool {
        self.apply(Box::new(ClipInsertAction::new(track_id, clip)), undoable)
    }

    pub fn remove_clip(&mut self, track_id: &str, clip: &Clip, undoable: bool) -> bool {
        self.apply(
            Box::new(ClipRemoveAction::new(track_id, clip.clone())),
            undoable,
        )
    }

    pub fn change_clip(&mut self, track_id: &str, old: &Clip, new: Clip, undoable: bool) -> bool {
        self.apply(
            Box::new(ClipChangeAction::new(track_id, old.clone(), new)),
            undoable,
        )
    }

    pub fn insert_clips(&mut self, track_id: &str, group: Vec<Clip>, undoable: bool) -> bool {
        self.apply(Box::new(ClipsGroupInsertAction::new(track_id, group)), undoable)
    }

    pub fn remove_clips(&mut self, track_id: &str, group: Vec<Clip>, undoable: bool) -> bool {
        self.apply(Box::new(ClipsGroupRemoveAction::new(track_id, group)), undoable)
    }

    pub fn change_clips(
        &mut self,
        track_id: &str,
        old: Vec<Clip>,
        new: Vec<Clip>,
        undoable: bool,
    ) -> bool {
        self.apply(
            Box::new(ClipsGroupChangeAction::new(track_id, old, new)),
            undoable,
        )
    }

    //===------------------------------------------------------------------===//
    // Listeners, playback, generated sequences
    //===------------------------------------------------------------------===//

    pub fn add_listener(&mut self, listener: Box<dyn ProjectListener>) -> ListenerId {
        self.state.add_listener(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.state.remove_listener(id)
    }

    pub fn beat_range(&self) -> (f32, f32) {
        self.state.beat_range()
    }

    pub fn export_sequence(&mut self, track_id: &str) -> Option<&[MidiEventTimed]> {
        self.state.export_sequence(track_id)
    }

    pub fn generated_sequence(&self, track_id: &str, clip_id: &str) -> Option<&Sequence> {
        self.state.generated_sequences().get(track_id, clip_id)
    }

    pub fn has_pending_generated_updates(&self) -> bool {
        self.state.generated_sequences().has_pending_updates()
    }

    /// Run the scheduled generated-sequence rebuilds; call once per event loop tick
    pub fn flush_generated_sequences(&mut self) -> usize {
        self.state.flush_generated_sequences()
    }

    //===------------------------------------------------------------------===//
    // Version control
    //===------------------------------------------------------------------===//

    pub fn track_snapshot(&self, track_id: &str) -> Option<Vec<Delta>> {
        self.state.track(track_id).map(Track::serialize_deltas)
    }

    /// Reset a track to a snapshot, creating the track if it doesn't exist
    ///
    /// Checkouts bypass the undo stack. Recorded actions that no longer
    /// apply fail on undo like any other stale action.
    pub fn checkout_track(&mut self, track_id: &str, deltas: &[Delta]) -> Result<(), ProjectError> {
        if self.state.track(track_id).is_none() {
            log::debug!(target: "vcs", "Checkout creates track {}", track_id);
            self.state.add_track(Track::with_id(track_id, ""));
        }

        self.state
            .with_track(track_id, |track, listener| track.reset_state_to(deltas, listener))
            .unwrap_or(Ok(()))
    }

    //===------------------------------------------------------------------===//
    // Serialization
    //===------------------------------------------------------------------===//

    pub fn serialize(&self) -> SerializedData {
        SerializedData::new(serialization::keys::PROJECT)
            .with_children(self.state.tracks().iter().map(Track::serialize))
            .with_child(self.undo_stack.serialize())
    }

    /// Replace tracks and history with a serialized project
    ///
    /// Nothing changes if any track fails to load.
    pub fn deserialize(&mut self, data: &SerializedData) -> Result<(), ProjectError> {
        data.expect_tag(serialization::keys::PROJECT)?;

        let tracks = data
            .children_with_tag(serialization::keys::TRACK)
            .map(Track::deserialize)
            .collect::<Result<Vec<_>, _>>()?;

        let mut undo_stack = UndoStack::with_config(self.config.undo);
        undo_stack.deserialize(data)?;

        let old_ids: Vec<String> = self.state.tracks().iter().map(|t| t.id().to_string()).collect();
        for track_id in &old_ids {
            self.state.remove_track(track_id);
        }
        for track in tracks {
            self.state.add_track(track);
        }
        self.undo_stack = undo_stack;

        log::debug!(target: "project", "Loaded {} tracks", self.state.tracks().len());
        Ok(())
    }
}
