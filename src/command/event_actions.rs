// Event actions - Undoable edits of a track's sequence

use crate::command::entity_actions::{
    ChangeAction, EditTarget, GroupChangeAction, GroupInsertAction, GroupRemoveAction,
    InsertAction, RemoveAction,
};
use crate::command::factory::tags;
use crate::command::state::ProjectState;
use crate::sequencer::event::Event;

impl EditTarget for Event {
    const NOUN: &'static str = "event";

    const INSERT_TAG: &'static str = tags::EVENT_INSERT;
    const REMOVE_TAG: &'static str = tags::EVENT_REMOVE;
    const CHANGE_TAG: &'static str = tags::EVENT_CHANGE;
    const GROUP_INSERT_TAG: &'static str = tags::EVENTS_GROUP_INSERT;
    const GROUP_REMOVE_TAG: &'static str = tags::EVENTS_GROUP_REMOVE;
    const GROUP_CHANGE_TAG: &'static str = tags::EVENTS_GROUP_CHANGE;

    fn insert(state: &mut ProjectState, track_id: &str, item: Self) -> bool {
        state.insert_event(track_id, item)
    }

    fn remove(state: &mut ProjectState, track_id: &str, item: &Self) -> bool {
        state.remove_event(track_id, item)
    }

    fn change(state: &mut ProjectState, track_id: &str, old: &Self, new: Self) -> bool {
        state.change_event(track_id, old, new)
    }

    fn insert_group(state: &mut ProjectState, track_id: &str, group: &[Self]) -> bool {
        state.insert_events(track_id, group)
    }

    fn remove_group(state: &mut ProjectState, track_id: &str, group: &[Self]) -> bool {
        state.remove_events(track_id, group)
    }

    fn change_group(state: &mut ProjectState, track_id: &str, old: &[Self], new: &[Self]) -> bool {
        state.change_events(track_id, old, new)
    }
}

pub type EventInsertAction = InsertAction<Event>;
pub type EventRemoveAction = RemoveAction<Event>;
pub type EventChangeAction = ChangeAction<Event>;
pub type EventsGroupInsertAction = GroupInsertAction<Event>;
pub type EventsGroupRemoveAction = GroupRemoveAction<Event>;
pub type EventsGroupChangeAction = GroupChangeAction<Event>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::trait_def::UndoAction;
    use crate::sequencer::track::Track;

    fn state() -> ProjectState {
        let mut state = ProjectState::new();
        state.add_track(Track::with_id("t", "Lead"));
        state
    }

    fn note(id: &str, beat: f32) -> Event {
        Event::note(id, beat, 60, 1.0, 0.8)
    }

    fn beats(state: &ProjectState) -> Vec<(String, f32)> {
        state
            .track("t")
            .unwrap()
            .sequence()
            .events()
            .iter()
            .map(|e| (e.id().to_string(), e.beat()))
            .collect()
    }

    #[test]
    fn test_insert_and_undo() {
        let mut state = state();
        let mut action = EventInsertAction::new("t", note("a", 1.0));

        assert!(action.perform(&mut state));
        assert_eq!(beats(&state), vec![("a".to_string(), 1.0)]);
        assert!(action.undo(&mut state));
        assert!(beats(&state).is_empty());
    }

    #[test]
    fn test_remove_of_missing_event_fails() {
        let mut state = state();
        let mut action = EventRemoveAction::new("t", note("a", 1.0));
        assert!(!action.perform(&mut state));
    }

    #[test]
    fn test_missing_track_fails_quietly() {
        let mut state = state();
        let mut action = EventInsertAction::new("deleted", note("a", 1.0));
        assert!(!action.perform(&mut state));
    }

    #[test]
    fn test_change_coalesces_on_same_id() {
        let a = note("a", 0.0);
        let first = EventChangeAction::new("t", a.clone(), a.with_beat(1.0));
        let second = EventChangeAction::new("t", a.with_beat(1.0), a.with_beat(2.0));
        let other = EventChangeAction::new("t", note("b", 0.0), note("b", 4.0));

        let coalesced = first.create_coalesced_action(&second).unwrap();
        assert!(first.create_coalesced_action(&other).is_none());

        let mut state = state();
        state.insert_event("t", a.with_beat(2.0));
        let mut coalesced = coalesced;
        assert!(coalesced.undo(&mut state));
        assert_eq!(beats(&state), vec![("a".to_string(), 0.0)]);
    }

    #[test]
    fn test_change_does_not_coalesce_with_other_kinds() {
        let a = note("a", 0.0);
        let change = EventChangeAction::new("t", a.clone(), a.with_beat(1.0));
        let insert = EventInsertAction::new("t", note("b", 0.0));
        assert!(change.create_coalesced_action(&insert).is_none());
    }

    #[test]
    fn test_group_change_coalesces_on_same_id_set() {
        let group = vec![note("a", 0.0), note("b", 1.0)];
        let moved: Vec<Event> = group.iter().map(|e| e.with_delta_beat(1.0)).collect();
        let moved_again: Vec<Event> = moved.iter().map(|e| e.with_delta_beat(1.0)).collect();

        let first = EventsGroupChangeAction::new("t", group.clone(), moved.clone());
        let second = EventsGroupChangeAction::new("t", moved.clone(), moved_again);
        let smaller = EventsGroupChangeAction::new("t", moved[..1].to_vec(), group[..1].to_vec());

        assert!(first.create_coalesced_action(&second).is_some());
        assert!(first.create_coalesced_action(&smaller).is_none());
    }

    #[test]
    fn test_group_actions_round_trip() {
        let mut state = state();
        let group = vec![note("a", 0.0), note("b", 1.0), note("c", 2.0)];

        let mut insert = EventsGroupInsertAction::new("t", group.clone());
        assert!(insert.perform(&mut state));
        assert_eq!(beats(&state).len(), 3);

        let mut remove = EventsGroupRemoveAction::new("t", group[1..].to_vec());
        assert!(remove.perform(&mut state));
        assert_eq!(beats(&state), vec![("a".to_string(), 0.0)]);
        assert!(remove.undo(&mut state));
        assert_eq!(beats(&state).len(), 3);
    }

    #[test]
    fn test_serialized_change_rebuilds() {
        let a = note("a", 0.0);
        let action = EventChangeAction::new("t", a.clone(), a.with_key(64));
        let data = action.serialize();

        let restored = EventChangeAction::deserialize(&data).unwrap();
        assert_eq!(restored.serialize(), data);
        assert_eq!(restored.description(), "Change event");
    }
}
