// Action factory - Rebuilds serialized undo actions from their node tag

use crate::command::clip_actions::{
    ClipChangeAction, ClipInsertAction, ClipRemoveAction, ClipsGroupChangeAction,
    ClipsGroupInsertAction, ClipsGroupRemoveAction,
};
use crate::command::event_actions::{
    EventChangeAction, EventInsertAction, EventRemoveAction, EventsGroupChangeAction,
    EventsGroupInsertAction, EventsGroupRemoveAction,
};
use crate::command::track_actions::{
    TrackColourAction, TrackInsertAction, TrackInstrumentAction, TrackRemoveAction,
    TrackRenameAction, TrackTimeSignatureAction,
};
use crate::command::trait_def::UndoAction;
use crate::project::error::ProjectError;
use crate::project::serialization::SerializedData;

/// Node tags of every serializable action
pub mod tags {
    pub const EVENT_INSERT: &str = "eventInsertAction";
    pub const EVENT_REMOVE: &str = "eventRemoveAction";
    pub const EVENT_CHANGE: &str = "eventChangeAction";
    pub const EVENTS_GROUP_INSERT: &str = "eventsGroupInsertAction";
    pub const EVENTS_GROUP_REMOVE: &str = "eventsGroupRemoveAction";
    pub const EVENTS_GROUP_CHANGE: &str = "eventsGroupChangeAction";

    pub const CLIP_INSERT: &str = "clipInsertAction";
    pub const CLIP_REMOVE: &str = "clipRemoveAction";
    pub const CLIP_CHANGE: &str = "clipChangeAction";
    pub const CLIPS_GROUP_INSERT: &str = "clipsGroupInsertAction";
    pub const CLIPS_GROUP_REMOVE: &str = "clipsGroupRemoveAction";
    pub const CLIPS_GROUP_CHANGE: &str = "clipsGroupChangeAction";

    pub const TRACK_INSERT: &str = "trackInsertAction";
    pub const TRACK_REMOVE: &str = "trackRemoveAction";
    pub const TRACK_RENAME: &str = "trackRenameAction";
    pub const TRACK_COLOUR: &str = "trackChangeColourAction";
    pub const TRACK_INSTRUMENT: &str = "trackChangeInstrumentAction";
    pub const TRACK_TIME_SIGNATURE: &str = "trackChangeTimeSignatureAction";
}

fn boxed<A: UndoAction + 'static>(action: A) -> Box<dyn UndoAction> {
    Box::new(action)
}

/// Rebuild an action from its serialized node
///
/// Unknown tags (e.g. actions from a newer version) give `UnknownAction`;
/// the undo stack skips those instead of failing the whole history.
pub fn create_action_by_tag(data: &SerializedData) -> Result<Box<dyn UndoAction>, ProjectError> {
    let action = match data.tag.as_str() {
        tags::EVENT_INSERT => boxed(EventInsertAction::deserialize(data)?),
        tags::EVENT_REMOVE => boxed(EventRemoveAction::deserialize(data)?),
        tags::EVENT_CHANGE => boxed(EventChangeAction::deserialize(data)?),
        tags::EVENTS_GROUP_INSERT => boxed(EventsGroupInsertAction::deserialize(data)?),
        tags::EVENTS_GROUP_REMOVE => boxed(EventsGroupRemoveAction::deserialize(data)?),
        tags::EVENTS_GROUP_CHANGE => boxed(EventsGroupChangeAction::deserialize(data)?),

        tags::CLIP_INSERT => boxed(ClipInsertAction::deserialize(data)?),
        tags::CLIP_REMOVE => boxed(ClipRemoveAction::deserialize(data)?),
        tags::CLIP_CHANGE => boxed(ClipChangeAction::deserialize(data)?),
        tags::CLIPS_GROUP_INSERT => boxed(ClipsGroupInsertAction::deserialize(data)?),
        tags::CLIPS_GROUP_REMOVE => boxed(ClipsGroupRemoveAction::deserialize(data)?),
        tags::CLIPS_GROUP_CHANGE => boxed(ClipsGroupChangeAction::deserialize(data)?),

        tags::TRACK_INSERT => boxed(TrackInsertAction::deserialize(data)?),
        tags::TRACK_REMOVE => boxed(TrackRemoveAction::deserialize(data)?),
        tags::TRACK_RENAME => boxed(TrackRenameAction::deserialize(data)?),
        tags::TRACK_COLOUR => boxed(TrackColourAction::deserialize(data)?),
        tags::TRACK_INSTRUMENT => boxed(TrackInstrumentAction::deserialize(data)?),
        tags::TRACK_TIME_SIGNATURE => boxed(TrackTimeSignatureAction::deserialize(data)?),

        other => return Err(ProjectError::UnknownAction(other.to_string())),
    };

    Ok(action)
}
