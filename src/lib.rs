// MyMusic Sequencer - Project model library
//
// Tracks of sorted events and clip placements, undoable edits,
// snapshot deltas with three-way merge, and modifier-generated sequences.

pub mod command;
pub mod midi;
pub mod project;
pub mod sequencer;
pub mod vcs;

// Re-export commonly used types for convenience
pub use command::{ProjectState, UndoAction, UndoStack, UndoStackConfig};
pub use midi::{MidiEvent, MidiEventTimed};
pub use project::{Project, ProjectConfig, ProjectError, ProjectListener, SerializedData};
pub use sequencer::{
    Clip, Colour, Event, EventPayload, Modifier, ModifierKind, Pattern, Sequence, TimeSignature,
    Track,
};
pub use vcs::{Delta, DeltaDescription};
