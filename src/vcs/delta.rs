// Delta - A named snapshot of one property category of a tracked item
//
// A delta is not a line diff: it carries all current values of its category
// (every clip, every event, one scalar property) as a serialized payload.
// The generic id-keyed diff/merge helpers shared by clips and events live here too.

use crate::project::error::ProjectError;
use crate::project::serialization::{SerializedData, keys};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Delta category tags
pub mod kinds {
    pub const CLIPS_ADDED: &str = "clipsAdded";
    pub const CLIPS_REMOVED: &str = "clipsRemoved";
    pub const CLIPS_CHANGED: &str = "clipsChanged";

    pub const EVENTS_ADDED: &str = "eventsAdded";
    pub const EVENTS_REMOVED: &str = "eventsRemoved";
    pub const EVENTS_CHANGED: &str = "eventsChanged";

    pub const TRACK_PATH: &str = "trackPath";
    pub const TRACK_COLOUR: &str = "trackColour";
    pub const TRACK_INSTRUMENT: &str = "trackInstrument";
    pub const TIME_SIGNATURES_CHANGED: &str = "timeSignaturesChanged";

    pub fn is_clips_family(kind: &str) -> bool {
        matches!(kind, CLIPS_ADDED | CLIPS_REMOVED | CLIPS_CHANGED)
    }

    pub fn is_events_family(kind: &str) -> bool {
        matches!(kind, EVENTS_ADDED | EVENTS_REMOVED | EVENTS_CHANGED)
    }
}

/// Description used for full-state deltas produced by merges
pub const HEAD_STATE_DESCRIPTION: &str = "HeadState";

/// Human readable description, with an optional `{x}` placeholder
///
/// The placeholder is filled with `parameter` when there is one, the count otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaDescription {
    pub text: String,
    pub count: i64,
    pub parameter: Option<String>,
}

impl DeltaDescription {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            count: 0,
            parameter: None,
        }
    }

    pub fn with_count(text: impl Into<String>, count: i64) -> Self {
        Self {
            count,
            ..Self::new(text)
        }
    }

    pub fn with_parameter(text: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            parameter: Some(parameter.into()),
            ..Self::new(text)
        }
    }

    pub fn head_state() -> Self {
        Self::new(HEAD_STATE_DESCRIPTION)
    }
}

impl fmt::Display for DeltaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let x = match &self.parameter {
            Some(parameter) => parameter.clone(),
            None => self.count.to_string(),
        };
        write!(f, "{}", self.text.replace("{x}", &x))
    }
}

/// One categorized payload
#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    description: DeltaDescription,
    kind: String,
    data: SerializedData,
}

impl Delta {
    pub fn new(description: DeltaDescription, kind: impl Into<String>, data: SerializedData) -> Self {
        Self {
            description,
            kind: kind.into(),
            data,
        }
    }

    /// Scalar property delta (path, colour, instrument)
    pub fn property(description: DeltaDescription, kind: &str, value: impl fmt::Display) -> Self {
        Self::new(
            description,
            kind,
            SerializedData::new(kind).with_attribute(keys::VALUE, value),
        )
    }

    pub fn description(&self) -> &DeltaDescription {
        &self.description
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn has_kind(&self, kind: &str) -> bool {
        self.kind == kind
    }

    pub fn data(&self) -> &SerializedData {
        &self.data
    }

    /// Property value for scalar deltas
    pub fn value(&self) -> Option<&str> {
        self.data.attribute(keys::VALUE)
    }

    /// No values at all: an empty collection or an unset property
    pub fn has_default_data(&self) -> bool {
        self.data.is_empty()
    }

    pub fn serialize(&self) -> SerializedData {
        let mut node = SerializedData::new(keys::DELTA)
            .with_attribute(keys::TYPE, &self.kind)
            .with_attribute(keys::DESCRIPTION, &self.description.text)
            .with_attribute(keys::COUNT, self.description.count)
            .with_child(self.data.clone());

        if let Some(parameter) = &self.description.parameter {
            node.set_attribute(keys::PARAMETER, parameter);
        }

        node
    }

    pub fn deserialize(data: &SerializedData) -> Result<Self, ProjectError> {
        data.expect_tag(keys::DELTA)?;
        let kind = data.require(keys::TYPE)?.to_string();

        let description = DeltaDescription {
            text: data.get_str(keys::DESCRIPTION, "").to_string(),
            count: data.get_i32(keys::COUNT, 0) as i64,
            parameter: data.attribute(keys::PARAMETER).map(str::to_string),
        };

        let payload = data
            .children
            .first()
            .cloned()
            .unwrap_or_else(|| SerializedData::new(kind.clone()));

        Ok(Self::new(description, kind, payload))
    }
}

//===----------------------------------------------------------------------===//
// Generic id-keyed diff and merge
//===----------------------------------------------------------------------===//

/// An entity that can be correlated across snapshots by id
pub trait DiffEntity: Clone {
    /// Node tag of one serialized entity
    fn accepts(tag: &str) -> bool;

    fn from_data(data: &SerializedData) -> Result<Self, ProjectError>;

    fn to_data(&self) -> SerializedData;

    fn entity_id(&self) -> &str;

    /// Whether `other` (same id) differs in anything the diff tracks
    fn has_changes(&self, other: &Self) -> bool;

    fn order(&self, other: &Self) -> Ordering;
}

/// Read every entity out of a delta payload, sorted
pub fn read_entities<T: DiffEntity>(data: &SerializedData) -> Result<Vec<T>, ProjectError> {
    let mut entities = data
        .children
        .iter()
        .filter(|child| T::accepts(&child.tag))
        .map(T::from_data)
        .collect::<Result<Vec<_>, _>>()?;
    entities.sort_by(T::order);
    Ok(entities)
}

pub fn write_entities<T: DiffEntity>(entities: &[T], kind: &str) -> SerializedData {
    SerializedData::new(kind).with_children(entities.iter().map(T::to_data))
}

/// Family of three delta kinds describing one entity collection
#[derive(Debug, Clone, Copy)]
pub struct DeltaFamily {
    pub added: &'static str,
    pub removed: &'static str,
    pub changed: &'static str,
    /// Plural noun used in descriptions ("clips", "events")
    pub noun: &'static str,
}

impl DeltaFamily {
    pub fn contains(&self, kind: &str) -> bool {
        kind == self.added || kind == self.removed || kind == self.changed
    }
}

/// Split `changes` against `state` into added/removed/changed deltas
///
/// Empty categories produce no delta.
pub fn create_entity_diffs<T: DiffEntity>(
    family: DeltaFamily,
    state: &SerializedData,
    changes: &SerializedData,
) -> Result<Vec<Delta>, ProjectError> {
    let state_entities: Vec<T> = read_entities(state)?;
    let changes_entities: Vec<T> = read_entities(changes)?;

    let changes_by_id: HashMap<&str, &T> = changes_entities
        .iter()
        .map(|e| (e.entity_id(), e))
        .collect();
    let state_ids: HashSet<&str> = state_entities.iter().map(T::entity_id).collect();

    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut changed = Vec::new();

    for state_entity in &state_entities {
        match changes_by_id.get(state_entity.entity_id()) {
            Some(&changes_entity) if state_entity.has_changes(changes_entity) => {
                changed.push(changes_entity.clone())
            }
            Some(_) => {}
            None => removed.push(state_entity.clone()),
        }
    }

    for changes_entity in &changes_entities {
        if !state_ids.contains(changes_entity.entity_id()) {
            added.push(changes_entity.clone());
        }
    }

    let mut deltas = Vec::new();
    for (entities, kind, verb) in [
        (added, family.added, "added"),
        (removed, family.removed, "removed"),
        (changed, family.changed, "changed"),
    ] {
        if !entities.is_empty() {
            deltas.push(Delta::new(
                DeltaDescription::with_count(
                    format!("{} {{x}} {}", verb, family.noun),
                    entities.len() as i64,
                ),
                kind,
                write_entities(&entities, kind),
            ));
        }
    }

    Ok(deltas)
}

/// `state` plus every entity of `changes` whose id is not in `state`
pub fn merge_added<T: DiffEntity>(
    family: DeltaFamily,
    state: &SerializedData,
    changes: &SerializedData,
) -> Result<SerializedData, ProjectError> {
    let mut result: Vec<T> = read_entities(state)?;
    let state_ids: HashSet<String> = result.iter().map(|e| e.entity_id().to_string()).collect();

    for entity in read_entities::<T>(changes)? {
        if !state_ids.contains(entity.entity_id()) {
            result.push(entity);
        }
    }

    result.sort_by(T::order);
    Ok(write_entities(&result, family.added))
}

/// `state` minus every id listed in `changes`
pub fn merge_removed<T: DiffEntity>(
    family: DeltaFamily,
    state: &SerializedData,
    changes: &SerializedData,
) -> Result<SerializedData, ProjectError> {
    let removed_ids: HashSet<String> = read_entities::<T>(changes)?
        .iter()
        .map(|e| e.entity_id().to_string())
        .collect();

    let result: Vec<T> = read_entities::<T>(state)?
        .into_iter()
        .filter(|e| !removed_ids.contains(e.entity_id()))
        .collect();

    Ok(write_entities(&result, family.added))
}

/// `state` with every entity that `changes` also defines replaced by the incoming version
///
/// When both sides define an id, `changes` wins.
pub fn merge_changed<T: DiffEntity>(
    family: DeltaFamily,
    state: &SerializedData,
    changes: &SerializedData,
) -> Result<SerializedData, ProjectError> {
    let incoming: HashMap<String, T> = read_entities::<T>(changes)?
        .into_iter()
        .map(|e| (e.entity_id().to_string(), e))
        .collect();

    let mut result: Vec<T> = read_entities::<T>(state)?
        .into_iter()
        .map(|e| incoming.get(e.entity_id()).cloned().unwrap_or(e))
        .collect();

    result.sort_by(T::order);
    Ok(write_entities(&result, family.added))
}

/// Apply one delta of the family onto a full state
pub fn merge_by_kind<T: DiffEntity>(
    family: DeltaFamily,
    kind: &str,
    state: &SerializedData,
    changes: &SerializedData,
) -> Result<SerializedData, ProjectError> {
    if kind == family.removed {
        merge_removed::<T>(family, state, changes)
    } else if kind == family.changed {
        merge_changed::<T>(family, state, changes)
    } else {
        merge_added::<T>(family, state, changes)
    }
}
