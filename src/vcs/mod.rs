// Version control - Snapshot deltas and id-keyed diff/merge of tracks
// Deltas are full-state payloads per category; merges correlate entities by id

pub mod delta;
pub mod pattern_diff;
pub mod track_diff;

pub use delta::{Delta, DeltaDescription, DiffEntity, kinds};
pub use pattern_diff::{
    create_clips_diffs, merge_clips_added, merge_clips_changed, merge_clips_removed,
    three_way_merge_clips,
};
pub use track_diff::{create_diff, create_events_diffs, create_merged_item, three_way_merge_events};
