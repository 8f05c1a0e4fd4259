// Undo/redo for every project edit
//
// Architecture:
// - UndoAction trait: perform(), undo(), size, description, coalescing, serialization
// - UndoStack: checkpoint-bounded transactions, redo tail, unit-based trimming
// - Concrete actions: event/clip edits (single and group), track insert/remove/properties
// - create_action_by_tag: rebuilds actions from a serialized history
//
// Actions only touch the project through ProjectState, which routes every
// change through the owning track so listeners see it.

pub mod clip_actions;
pub mod entity_actions;
pub mod event_actions;
pub mod factory;
pub mod manager;
pub mod state;
pub mod track_actions;
pub mod trait_def;

pub use clip_actions::{
    ClipChangeAction, ClipInsertAction, ClipRemoveAction, ClipsGroupChangeAction,
    ClipsGroupInsertAction, ClipsGroupRemoveAction,
};
pub use event_actions::{
    EventChangeAction, EventInsertAction, EventRemoveAction, EventsGroupChangeAction,
    EventsGroupInsertAction, EventsGroupRemoveAction,
};
pub use factory::create_action_by_tag;
pub use manager::{TransactionId, UndoStack, UndoStackConfig};
pub use state::ProjectState;
pub use track_actions::{
    TrackColourAction, TrackInsertAction, TrackInstrumentAction, TrackRemoveAction,
    TrackRenameAction, TrackTimeSignatureAction,
};
pub use trait_def::UndoAction;
