// UndoAction trait definition

use crate::command::state::ProjectState;
use crate::project::serialization::SerializedData;
use std::any::Any;

/// A reversible edit recorded by the undo stack
///
/// Actions never hold references into the project tree. They keep the
/// target track id plus copies of the values involved, and look the target
/// up again every time they run. A target that no longer exists (its track
/// was deleted in the meantime) makes `perform`/`undo` return `false`; that
/// is an expected outcome, not an error.
///
/// # Example
/// ```no_run
/// use mymusic_sequencer::command::{ProjectState, UndoAction};
/// use mymusic_sequencer::project::serialization::SerializedData;
/// use std::any::Any;
///
/// struct Rename {
///     track_id: String,
///     name: String,
///     old_name: Option<String>,
/// }
///
/// impl UndoAction for Rename {
///     fn perform(&mut self, state: &mut ProjectState) -> bool {
///         self.old_name = state.track(&self.track_id).map(|t| t.name().to_string());
///         state.set_track_name(&self.track_id, &self.name)
///     }
///
///     fn undo(&mut self, state: &mut ProjectState) -> bool {
///         match self.old_name.clone() {
///             Some(old) => state.set_track_name(&self.track_id, &old),
///             None => false,
///         }
///     }
///
///     fn description(&self) -> String {
///         format!("Rename to {}", self.name)
///     }
///
///     fn serialize(&self) -> SerializedData {
///         SerializedData::new("rename")
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
/// ```
pub trait UndoAction: Send {
    /// Apply the edit; `false` leaves the project untouched
    fn perform(&mut self, state: &mut ProjectState) -> bool;

    /// Revert what `perform` did
    fn undo(&mut self, state: &mut ProjectState) -> bool;

    /// Rough memory footprint, used to trim old history
    fn size_in_units(&self) -> usize {
        1
    }

    /// Human-readable label (e.g. "Change event")
    fn description(&self) -> String;

    /// Merge with the action performed right after this one
    ///
    /// Returns one action going from this action's "before" straight to
    /// `next`'s "after", or `None` if the two can't be combined.
    /// The returned action is stored in place of both, without being performed again.
    fn create_coalesced_action(&self, _next: &dyn UndoAction) -> Option<Box<dyn UndoAction>> {
        None
    }

    /// Tagged node the action factory can rebuild this action from
    fn serialize(&self) -> SerializedData;

    /// Concrete type access for coalescing
    fn as_any(&self) -> &dyn Any;
}
