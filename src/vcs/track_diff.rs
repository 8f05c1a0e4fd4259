// Track diff - Diff and merge of a track's full-state deltas
//
// A track snapshot (see `Track::serialize_deltas`) is one delta per category:
// path, colour, instrument, time signature override, all events, all clips.

use crate::project::error::ProjectError;
use crate::project::serialization::{SerializedData, keys};
use crate::sequencer::event::Event;
use crate::vcs::delta::{
    Delta, DeltaDescription, DeltaFamily, DiffEntity, create_entity_diffs, kinds, merge_by_kind,
};
use crate::vcs::pattern_diff::{self, CLIPS};
use std::cmp::Ordering;

pub const EVENTS: DeltaFamily = DeltaFamily {
    added: kinds::EVENTS_ADDED,
    removed: kinds::EVENTS_REMOVED,
    changed: kinds::EVENTS_CHANGED,
    noun: "events",
};

impl DiffEntity for Event {
    fn accepts(tag: &str) -> bool {
        Event::is_event_tag(tag)
    }

    fn from_data(data: &SerializedData) -> Result<Self, ProjectError> {
        Event::deserialize(data)
    }

    fn to_data(&self) -> SerializedData {
        self.serialize()
    }

    fn entity_id(&self) -> &str {
        self.id()
    }

    fn has_changes(&self, other: &Self) -> bool {
        self.beat() != other.beat() || self.payload() != other.payload()
    }

    fn order(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

fn is_property_kind(kind: &str) -> bool {
    matches!(
        kind,
        kinds::TRACK_PATH
            | kinds::TRACK_COLOUR
            | kinds::TRACK_INSTRUMENT
            | kinds::TIME_SIGNATURES_CHANGED
    )
}

//===----------------------------------------------------------------------===//
// Property diffs
//===----------------------------------------------------------------------===//

pub fn create_path_diff(state: &SerializedData, changes: &SerializedData) -> Delta {
    Delta::new(
        DeltaDescription::with_parameter("moved from {x}", state.get_str(keys::VALUE, "")),
        kinds::TRACK_PATH,
        changes.clone(),
    )
}

pub fn create_colour_diff(_state: &SerializedData, changes: &SerializedData) -> Delta {
    Delta::new(
        DeltaDescription::new("color changed"),
        kinds::TRACK_COLOUR,
        changes.clone(),
    )
}

pub fn create_instrument_diff(_state: &SerializedData, changes: &SerializedData) -> Delta {
    Delta::new(
        DeltaDescription::new("instrument changed"),
        kinds::TRACK_INSTRUMENT,
        changes.clone(),
    )
}

pub fn create_time_signature_diff(_state: &SerializedData, changes: &SerializedData) -> Delta {
    Delta::new(
        DeltaDescription::with_count("changed {x} time signatures", 1),
        kinds::TIME_SIGNATURES_CHANGED,
        changes.clone(),
    )
}

/// Scalar properties merge by taking the incoming value
pub fn merge_property(_state: &SerializedData, changes: &SerializedData) -> SerializedData {
    changes.clone()
}

pub fn create_events_diffs(
    state: &SerializedData,
    changes: &SerializedData,
) -> Result<Vec<Delta>, ProjectError> {
    create_entity_diffs::<Event>(EVENTS, state, changes)
}

pub fn merge_events_delta(
    state: &SerializedData,
    delta: &Delta,
) -> Result<SerializedData, ProjectError> {
    merge_by_kind::<Event>(EVENTS, delta.kind(), state, delta.data())
}

//===----------------------------------------------------------------------===//
// Whole-track diff and merge
//===----------------------------------------------------------------------===//

/// What changed between `initial` and the full state `target`
///
/// A category counts as changed when its data differs, or when `initial`
/// doesn't have it at all and the target holds something non-default.
pub fn create_diff(target: &[Delta], initial: &[Delta]) -> Result<Vec<Delta>, ProjectError> {
    let mut diff = Vec::new();

    for target_delta in target {
        let state_delta = initial.iter().find(|d| d.has_kind(target_delta.kind()));
        let changed = match state_delta {
            Some(state_delta) => state_delta.data() != target_delta.data(),
            None => !target_delta.has_default_data(),
        };

        if !changed {
            continue;
        }

        let empty = SerializedData::new(target_delta.kind());
        let state_data = state_delta.map_or(&empty, Delta::data);
        let changes = target_delta.data();

        match target_delta.kind() {
            kinds::TRACK_PATH => diff.push(create_path_diff(state_data, changes)),
            kinds::TRACK_COLOUR => diff.push(create_colour_diff(state_data, changes)),
            kinds::TRACK_INSTRUMENT => diff.push(create_instrument_diff(state_data, changes)),
            kinds::TIME_SIGNATURES_CHANGED => {
                diff.push(create_time_signature_diff(state_data, changes))
            }
            kinds::EVENTS_ADDED => diff.extend(create_events_diffs(state_data, changes)?),
            kinds::CLIPS_ADDED => diff.extend(pattern_diff::create_clips_diffs(state_data, changes)?),
            other => log::warn!(target: "vcs", "No diff logic for delta type {}", other),
        }
    }

    Ok(diff)
}

type DeltaMerge = fn(&SerializedData, &Delta) -> Result<SerializedData, ProjectError>;

fn family_merge(family: DeltaFamily) -> DeltaMerge {
    if family.added == CLIPS.added {
        pattern_diff::merge_clips_delta
    } else {
        merge_events_delta
    }
}

/// Fold every target delta of the family onto `start`, `None` if there are none
fn fold_family(
    family: DeltaFamily,
    start: &SerializedData,
    target: &[Delta],
) -> Result<Option<SerializedData>, ProjectError> {
    let merge = family_merge(family);
    let mut merged: Option<SerializedData> = None;

    for delta in target.iter().filter(|d| family.contains(d.kind())) {
        let next = merge(merged.as_ref().unwrap_or(start), delta)?;
        merged = Some(next);
    }

    Ok(merged)
}

fn head_state(kind: &str, data: SerializedData) -> Delta {
    Delta::new(DeltaDescription::head_state(), kind, data)
}

/// Apply the changes `target` carries on top of the full state `initial`
///
/// Property deltas take the target's value. Event and clip deltas of any
/// category are folded one after the other onto the initial collection and
/// come out as a single full-state `*Added` delta. Categories the initial
/// state doesn't know yet (clips, events, time signature) are built from
/// an empty start.
pub fn create_merged_item(target: &[Delta], initial: &[Delta]) -> Result<Vec<Delta>, ProjectError> {
    let mut merged = Vec::new();

    for state_delta in initial {
        let kind = state_delta.kind();

        if is_property_kind(kind) {
            match target.iter().find(|d| d.has_kind(kind)) {
                Some(target_delta) => merged.push(Delta::new(
                    target_delta.description().clone(),
                    kind,
                    merge_property(state_delta.data(), target_delta.data()),
                )),
                None => merged.push(state_delta.clone()),
            }
            continue;
        }

        let family = if kinds::is_events_family(kind) {
            EVENTS
        } else if kinds::is_clips_family(kind) {
            CLIPS
        } else {
            merged.push(state_delta.clone());
            continue;
        };

        match fold_family(family, state_delta.data(), target)? {
            Some(data) => merged.push(head_state(family.added, data)),
            None => merged.push(state_delta.clone()),
        }
    }

    // Categories missing from the initial state
    let initial_has = |predicate: fn(&str) -> bool| initial.iter().any(|d| predicate(d.kind()));

    if !initial.iter().any(|d| d.has_kind(kinds::TIME_SIGNATURES_CHANGED)) {
        if let Some(ts) = target
            .iter()
            .find(|d| d.has_kind(kinds::TIME_SIGNATURES_CHANGED))
        {
            let empty = SerializedData::new(kinds::TIME_SIGNATURES_CHANGED);
            merged.push(head_state(
                kinds::TIME_SIGNATURES_CHANGED,
                merge_property(&empty, ts.data()),
            ));
        }
    }

    for (family, present) in [
        (CLIPS, initial_has(kinds::is_clips_family)),
        (EVENTS, initial_has(kinds::is_events_family)),
    ] {
        if present {
            continue;
        }
        let empty = SerializedData::new(family.added);
        if let Some(data) = fold_family(family, &empty, target)? {
            merged.push(head_state(family.added, data));
        }
    }

    log::debug!(target: "vcs", "merged item: {} deltas", merged.len());
    Ok(merged)
}

pub fn three_way_merge_events(
    base: &SerializedData,
    local: &[Delta],
    remote: &[Delta],
) -> Result<SerializedData, ProjectError> {
    pattern_diff::three_way_merge::<Event>(EVENTS, base, local, remote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::delta::write_entities;

    fn notes(list: &[(&str, f32, i32)]) -> SerializedData {
        let events: Vec<Event> = list
            .iter()
            .map(|(id, beat, key)| Event::note(*id, *beat, *key, 1.0, 1.0))
            .collect();
        write_entities(&events, kinds::EVENTS_ADDED)
    }

    fn path(name: &str) -> Delta {
        Delta::property(DeltaDescription::head_state(), kinds::TRACK_PATH, name)
    }

    fn events_state(data: SerializedData) -> Delta {
        Delta::new(DeltaDescription::head_state(), kinds::EVENTS_ADDED, data)
    }

    #[test]
    fn test_unchanged_track_has_empty_diff() {
        let state = vec![path("Lead"), events_state(notes(&[("a", 0.0, 60)]))];
        assert!(create_diff(&state, &state).unwrap().is_empty());
    }

    #[test]
    fn test_property_and_event_diffs() {
        let initial = vec![path("Lead"), events_state(notes(&[("a", 0.0, 60)]))];
        let target = vec![
            path("Bass"),
            events_state(notes(&[("a", 0.0, 48), ("b", 1.0, 50)])),
        ];

        let diff = create_diff(&target, &initial).unwrap();
        let descriptions: Vec<String> = diff.iter().map(|d| d.description().to_string()).collect();
        assert_eq!(
            descriptions,
            vec!["moved from Lead", "added 1 events", "changed 1 events"]
        );
    }

    #[test]
    fn test_missing_category_with_default_data_is_skipped() {
        let target = vec![Delta::new(
            DeltaDescription::head_state(),
            kinds::CLIPS_ADDED,
            SerializedData::new(kinds::CLIPS_ADDED),
        )];
        assert!(create_diff(&target, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_merged_item_folds_event_deltas() {
        let initial = vec![path("Lead"), events_state(notes(&[("a", 0.0, 60), ("b", 2.0, 62)]))];
        let changes = vec![
            Delta::new(
                DeltaDescription::with_count("added {x} events", 1),
                kinds::EVENTS_ADDED,
                notes(&[("c", 4.0, 64)]),
            ),
            Delta::new(
                DeltaDescription::with_count("removed {x} events", 1),
                kinds::EVENTS_REMOVED,
                notes(&[("a", 0.0, 60)]),
            ),
            Delta::property(
                DeltaDescription::with_parameter("moved from {x}", "Lead"),
                kinds::TRACK_PATH,
                "Keys",
            ),
        ];

        let merged = create_merged_item(&changes, &initial).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].value(), Some("Keys"));

        let events = merged[1].data();
        let ids: Vec<&str> = events.children.iter().map(|c| c.get_str(keys::ID, "")).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(merged[1].has_kind(kinds::EVENTS_ADDED));
    }

    #[test]
    fn test_merged_item_resolves_missing_clips() {
        let initial = vec![path("Lead")];
        let clip = crate::sequencer::clip::Clip::new("k", 0.0);
        let changes = vec![Delta::new(
            DeltaDescription::with_count("added {x} clips", 1),
            kinds::CLIPS_ADDED,
            write_entities(&[clip], kinds::CLIPS_ADDED),
        )];

        let merged = create_merged_item(&changes, &initial).unwrap();
        assert_eq!(merged.len(), 2);
        assert!(merged[1].has_kind(kinds::CLIPS_ADDED));
        assert_eq!(merged[1].data().children.len(), 1);
    }
}
