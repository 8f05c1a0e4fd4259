// Sequencer module - The project data model
// Beat grid, events, clips and modifiers, and the track = sequence + pattern composition

pub mod clip;
pub mod event;
pub mod generated;
pub mod modifier;
pub mod pattern;
pub mod sequence;
pub mod timeline;
pub mod track;

pub use clip::{Clip, ClipId};
pub use event::{Colour, Event, EventId, EventPayload};
pub use generated::{GeneratedSequences, PendingUpdates};
pub use modifier::{Modifier, ModifierKind};
pub use pattern::Pattern;
pub use sequence::Sequence;
pub use timeline::{BEATS_PER_BAR, DEFAULT_NUM_BARS, TimeSignature};
pub use track::{Track, TrackId};
