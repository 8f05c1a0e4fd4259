// Clip actions - Undoable edits of a track's pattern

use crate::command::entity_actions::{
    ChangeAction, EditTarget, GroupChangeAction, GroupInsertAction, GroupRemoveAction,
    InsertAction, RemoveAction,
};
use crate::command::factory::tags;
use crate::command::state::ProjectState;
use crate::sequencer::clip::Clip;

impl EditTarget for Clip {
    const NOUN: &'static str = "clip";

    const INSERT_TAG: &'static str = tags::CLIP_INSERT;
    const REMOVE_TAG: &'static str = tags::CLIP_REMOVE;
    const CHANGE_TAG: &'static str = tags::CLIP_CHANGE;
    const GROUP_INSERT_TAG: &'static str = tags::CLIPS_GROUP_INSERT;
    const GROUP_REMOVE_TAG: &'static str = tags::CLIPS_GROUP_REMOVE;
    const GROUP_CHANGE_TAG: &'static str = tags::CLIPS_GROUP_CHANGE;

    fn insert(state: &mut ProjectState, track_id: &str, item: Self) -> bool {
        state.insert_clip(track_id, item)
    }

    fn remove(state: &mut ProjectState, track_id: &str, item: &Self) -> bool {
        state.remove_clip(track_id, item)
    }

    fn change(state: &mut ProjectState, track_id: &str, old: &Self, new: Self) -> bool {
        state.change_clip(track_id, old, new)
    }

    fn insert_group(state: &mut ProjectState, track_id: &str, group: &[Self]) -> bool {
        state.insert_clips(track_id, group)
    }

    fn remove_group(state: &mut ProjectState, track_id: &str, group: &[Self]) -> bool {
        state.remove_clips(track_id, group)
    }

    fn change_group(state: &mut ProjectState, track_id: &str, old: &[Self], new: &[Self]) -> bool {
        state.change_clips(track_id, old, new)
    }
}

pub type ClipInsertAction = InsertAction<Clip>;
pub type ClipRemoveAction = RemoveAction<Clip>;
pub type ClipChangeAction = ChangeAction<Clip>;
pub type ClipsGroupInsertAction = GroupInsertAction<Clip>;
pub type ClipsGroupRemoveAction = GroupRemoveAction<Clip>;
pub type ClipsGroupChangeAction = GroupChangeAction<Clip>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::trait_def::UndoAction;
    use crate::sequencer::track::Track;

    fn state_with_clip() -> (ProjectState, Clip) {
        let mut state = ProjectState::new();
        state.add_track(Track::with_id("t", "Drums"));
        let default_clip = state.track("t").unwrap().pattern().clips()[0].clone();
        (state, default_clip)
    }

    fn clip_beats(state: &ProjectState) -> Vec<f32> {
        state
            .track("t")
            .unwrap()
            .pattern()
            .clips()
            .iter()
            .map(Clip::beat)
            .collect()
    }

    #[test]
    fn test_clip_change_round_trip() {
        let (mut state, clip) = state_with_clip();
        let mut action = ClipChangeAction::new("t", clip.clone(), clip.with_beat(8.0));

        assert!(action.perform(&mut state));
        assert_eq!(clip_beats(&state), vec![8.0]);
        assert!(action.undo(&mut state));
        assert_eq!(clip_beats(&state), vec![0.0]);
    }

    #[test]
    fn test_clip_insert_duplicate_fails() {
        let (mut state, clip) = state_with_clip();
        let mut action = ClipInsertAction::new("t", clip);
        assert!(!action.perform(&mut state));
    }

    #[test]
    fn test_clip_group_remove_is_all_or_nothing() {
        let (mut state, clip) = state_with_clip();
        let mut action = ClipsGroupRemoveAction::new("t", vec![clip, Clip::new("ghost", 4.0)]);

        assert!(!action.perform(&mut state));
        assert_eq!(clip_beats(&state), vec![0.0]);
    }

    #[test]
    fn test_clip_changes_coalesce() {
        let (_, clip) = state_with_clip();
        let first = ClipChangeAction::new("t", clip.clone(), clip.with_key(2));
        let second = ClipChangeAction::new("t", clip.with_key(2), clip.with_key(5));
        let elsewhere = ClipChangeAction::new("u", clip.with_key(2), clip.with_key(5));

        assert!(first.create_coalesced_action(&second).is_some());
        assert!(first.create_coalesced_action(&elsewhere).is_none());
    }

    #[test]
    fn test_group_insert_serialization() {
        let action = ClipsGroupInsertAction::new("t", vec![Clip::new("a", 0.0), Clip::new("b", 4.0)]);
        let data = action.serialize();
        assert_eq!(data.tag, tags::CLIPS_GROUP_INSERT);
        assert_eq!(data.children.len(), 2);

        let restored = ClipsGroupInsertAction::deserialize(&data).unwrap();
        assert_eq!(restored.description(), "Insert 2 clips");
    }
}
