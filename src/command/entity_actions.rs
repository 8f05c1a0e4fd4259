// Entity actions - Insert/remove/change of events and clips, single or grouped
//
// Events and clips are edited the same way, so the actions are written once
// over `EditTarget` and instantiated in event_actions.rs and clip_actions.rs.

use crate::command::state::ProjectState;
use crate::command::trait_def::UndoAction;
use crate::project::error::ProjectError;
use crate::project::serialization::{SerializedData, keys};
use crate::sequencer::track::TrackId;
use crate::vcs::delta::DiffEntity;
use std::any::Any;
use std::mem::size_of;

/// Something that lives in a track and can be edited by id
pub trait EditTarget: DiffEntity + Send + 'static {
    /// Singular noun used in descriptions ("event", "clip")
    const NOUN: &'static str;

    const INSERT_TAG: &'static str;
    const REMOVE_TAG: &'static str;
    const CHANGE_TAG: &'static str;
    const GROUP_INSERT_TAG: &'static str;
    const GROUP_REMOVE_TAG: &'static str;
    const GROUP_CHANGE_TAG: &'static str;

    fn insert(state: &mut ProjectState, track_id: &str, item: Self) -> bool;
    fn remove(state: &mut ProjectState, track_id: &str, item: &Self) -> bool;
    fn change(state: &mut ProjectState, track_id: &str, old: &Self, new: Self) -> bool;
    fn insert_group(state: &mut ProjectState, track_id: &str, group: &[Self]) -> bool;
    fn remove_group(state: &mut ProjectState, track_id: &str, group: &[Self]) -> bool;
    fn change_group(state: &mut ProjectState, track_id: &str, old: &[Self], new: &[Self]) -> bool;
}

fn read_track_id(data: &SerializedData) -> Result<TrackId, ProjectError> {
    Ok(data.require(keys::TRACK_ID)?.to_string())
}

fn read_single<T: EditTarget>(data: &SerializedData) -> Result<T, ProjectError> {
    let child = data
        .children
        .iter()
        .find(|c| T::accepts(&c.tag))
        .ok_or_else(|| ProjectError::InvalidStructure(format!("<{}> has no {}", data.tag, T::NOUN)))?;
    T::from_data(child)
}

fn read_group<T: EditTarget>(data: &SerializedData) -> Result<Vec<T>, ProjectError> {
    data.children
        .iter()
        .filter(|c| T::accepts(&c.tag))
        .map(T::from_data)
        .collect()
}

fn read_wrapped<T: EditTarget>(data: &SerializedData, wrapper: &str) -> Result<Vec<T>, ProjectError> {
    let node = data.child_with_tag(wrapper).ok_or_else(|| {
        ProjectError::InvalidStructure(format!("<{}> has no <{}>", data.tag, wrapper))
    })?;
    read_group(node)
}

fn wrap<T: EditTarget>(wrapper: &str, items: &[T]) -> SerializedData {
    SerializedData::new(wrapper).with_children(items.iter().map(T::to_data))
}

fn same_ids<T: EditTarget>(a: &[T], b: &[T]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| x.entity_id() == y.entity_id())
}

//===----------------------------------------------------------------------===//
// Single item
//===----------------------------------------------------------------------===//

pub struct InsertAction<T: EditTarget> {
    track_id: TrackId,
    item: T,
}

impl<T: EditTarget> InsertAction<T> {
    pub fn new(track_id: impl Into<TrackId>, item: T) -> Self {
        Self {
            track_id: track_id.into(),
            item,
        }
    }

    pub fn deserialize(data: &SerializedData) -> Result<Self, ProjectError> {
        data.expect_tag(T::INSERT_TAG)?;
        Ok(Self::new(read_track_id(data)?, read_single(data)?))
    }
}

impl<T: EditTarget> UndoAction for InsertAction<T> {
    fn perform(&mut self, state: &mut ProjectState) -> bool {
        T::insert(state, &self.track_id, self.item.clone())
    }

    fn undo(&mut self, state: &mut ProjectState) -> bool {
        T::remove(state, &self.track_id, &self.item)
    }

    fn size_in_units(&self) -> usize {
        size_of::<T>()
    }

    fn description(&self) -> String {
        format!("Insert {}", T::NOUN)
    }

    fn serialize(&self) -> SerializedData {
        SerializedData::new(T::INSERT_TAG)
            .with_attribute(keys::TRACK_ID, &self.track_id)
            .with_child(self.item.to_data())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct RemoveAction<T: EditTarget> {
    track_id: TrackId,
    item: T,
}

impl<T: EditTarget> RemoveAction<T> {
    pub fn new(track_id: impl Into<TrackId>, item: T) -> Self {
        Self {
            track_id: track_id.into(),
            item,
        }
    }

    pub fn deserialize(data: &SerializedData) -> Result<Self, ProjectError> {
        data.expect_tag(T::REMOVE_TAG)?;
        Ok(Self::new(read_track_id(data)?, read_single(data)?))
    }
}

impl<T: EditTarget> UndoAction for RemoveAction<T> {
    fn perform(&mut self, state: &mut ProjectState) -> bool {
        T::remove(state, &self.track_id, &self.item)
    }

    fn undo(&mut self, state: &mut ProjectState) -> bool {
        T::insert(state, &self.track_id, self.item.clone())
    }

    fn size_in_units(&self) -> usize {
        size_of::<T>()
    }

    fn description(&self) -> String {
        format!("Remove {}", T::NOUN)
    }

    fn serialize(&self) -> SerializedData {
        SerializedData::new(T::REMOVE_TAG)
            .with_attribute(keys::TRACK_ID, &self.track_id)
            .with_child(self.item.to_data())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct ChangeAction<T: EditTarget> {
    track_id: TrackId,
    before: T,
    after: T,
}

impl<T: EditTarget> ChangeAction<T> {
    pub fn new(track_id: impl Into<TrackId>, before: T, after: T) -> Self {
        debug_assert_eq!(before.entity_id(), after.entity_id());
        Self {
            track_id: track_id.into(),
            before,
            after,
        }
    }

    pub fn deserialize(data: &SerializedData) -> Result<Self, ProjectError> {
        data.expect_tag(T::CHANGE_TAG)?;
        let before = read_wrapped::<T>(data, keys::BEFORE)?;
        let after = read_wrapped::<T>(data, keys::AFTER)?;
        match (before.into_iter().next(), after.into_iter().next()) {
            (Some(before), Some(after)) => Ok(Self::new(read_track_id(data)?, before, after)),
            _ => Err(ProjectError::InvalidStructure(format!(
                "<{}> needs one {} before and after",
                data.tag,
                T::NOUN
            ))),
        }
    }
}

impl<T: EditTarget> UndoAction for ChangeAction<T> {
    fn perform(&mut self, state: &mut ProjectState) -> bool {
        T::change(state, &self.track_id, &self.before, self.after.clone())
    }

    fn undo(&mut self, state: &mut ProjectState) -> bool {
        T::change(state, &self.track_id, &self.after, self.before.clone())
    }

    fn size_in_units(&self) -> usize {
        size_of::<T>() * 2
    }

    fn description(&self) -> String {
        format!("Change {}", T::NOUN)
    }

    fn create_coalesced_action(&self, next: &dyn UndoAction) -> Option<Box<dyn UndoAction>> {
        let next = next.as_any().downcast_ref::<ChangeAction<T>>()?;

        // Ids must match too, or group edits made of single changes would merge
        let same_target = self.track_id == next.track_id
            && self.before.entity_id() == next.after.entity_id();

        same_target.then(|| {
            Box::new(ChangeAction::new(
                self.track_id.clone(),
                self.before.clone(),
                next.after.clone(),
            )) as Box<dyn UndoAction>
        })
    }

    fn serialize(&self) -> SerializedData {
        SerializedData::new(T::CHANGE_TAG)
            .with_attribute(keys::TRACK_ID, &self.track_id)
            .with_child(wrap(keys::BEFORE, std::slice::from_ref(&self.before)))
            .with_child(wrap(keys::AFTER, std::slice::from_ref(&self.after)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

//===----------------------------------------------------------------------===//
// Groups
//===----------------------------------------------------------------------===//

pub struct GroupInsertAction<T: EditTarget> {
    track_id: TrackId,
    items: Vec<T>,
}

impl<T: EditTarget> GroupInsertAction<T> {
    pub fn new(track_id: impl Into<TrackId>, items: Vec<T>) -> Self {
        Self {
            track_id: track_id.into(),
            items,
        }
    }

    pub fn deserialize(data: &SerializedData) -> Result<Self, ProjectError> {
        data.expect_tag(T::GROUP_INSERT_TAG)?;
        Ok(Self::new(read_track_id(data)?, read_group(data)?))
    }
}

impl<T: EditTarget> UndoAction for GroupInsertAction<T> {
    fn perform(&mut self, state: &mut ProjectState) -> bool {
        T::insert_group(state, &self.track_id, &self.items)
    }

    fn undo(&mut self, state: &mut ProjectState) -> bool {
        T::remove_group(state, &self.track_id, &self.items)
    }

    fn size_in_units(&self) -> usize {
        size_of::<T>() * self.items.len()
    }

    fn description(&self) -> String {
        format!("Insert {} {}s", self.items.len(), T::NOUN)
    }

    fn serialize(&self) -> SerializedData {
        SerializedData::new(T::GROUP_INSERT_TAG)
            .with_attribute(keys::TRACK_ID, &self.track_id)
            .with_children(self.items.iter().map(T::to_data))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct GroupRemoveAction<T: EditTarget> {
    track_id: TrackId,
    items: Vec<T>,
}

impl<T: EditTarget> GroupRemoveAction<T> {
    pub fn new(track_id: impl Into<TrackId>, items: Vec<T>) -> Self {
        Self {
            track_id: track_id.into(),
            items,
        }
    }

    pub fn deserialize(data: &SerializedData) -> Result<Self, ProjectError> {
        data.expect_tag(T::GROUP_REMOVE_TAG)?;
        Ok(Self::new(read_track_id(data)?, read_group(data)?))
    }
}

impl<T: EditTarget> UndoAction for GroupRemoveAction<T> {
    fn perform(&mut self, state: &mut ProjectState) -> bool {
        T::remove_group(state, &self.track_id, &self.items)
    }

    fn undo(&mut self, state: &mut ProjectState) -> bool {
        T::insert_group(state, &self.track_id, &self.items)
    }

    fn size_in_units(&self) -> usize {
        size_of::<T>() * self.items.len()
    }

    fn description(&self) -> String {
        format!("Remove {} {}s", self.items.len(), T::NOUN)
    }

    fn serialize(&self) -> SerializedData {
        SerializedData::new(T::GROUP_REMOVE_TAG)
            .with_attribute(keys::TRACK_ID, &self.track_id)
            .with_children(self.items.iter().map(T::to_data))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct GroupChangeAction<T: EditTarget> {
    track_id: TrackId,
    before: Vec<T>,
    after: Vec<T>,
}

impl<T: EditTarget> GroupChangeAction<T> {
    pub fn new(track_id: impl Into<TrackId>, before: Vec<T>, after: Vec<T>) -> Self {
        debug_assert!(same_ids(&before, &after));
        Self {
            track_id: track_id.into(),
            before,
            after,
        }
    }

    pub fn deserialize(data: &SerializedData) -> Result<Self, ProjectError> {
        data.expect_tag(T::GROUP_CHANGE_TAG)?;
        let before = read_wrapped::<T>(data, keys::BEFORE)?;
        let after = read_wrapped::<T>(data, keys::AFTER)?;
        if !same_ids(&before, &after) {
            return Err(ProjectError::InvalidStructure(format!(
                "<{}> before and after lists don't match",
                data.tag
            )));
        }
        Ok(Self::new(read_track_id(data)?, before, after))
    }
}

impl<T: EditTarget> UndoAction for GroupChangeAction<T> {
    fn perform(&mut self, state: &mut ProjectState) -> bool {
        T::change_group(state, &self.track_id, &self.before, &self.after)
    }

    fn undo(&mut self, state: &mut ProjectState) -> bool {
        T::change_group(state, &self.track_id, &self.after, &self.before)
    }

    fn size_in_units(&self) -> usize {
        size_of::<T>() * self.before.len() * 2
    }

    fn description(&self) -> String {
        format!("Change {} {}s", self.before.len(), T::NOUN)
    }

    fn create_coalesced_action(&self, next: &dyn UndoAction) -> Option<Box<dyn UndoAction>> {
        let next = next.as_any().downcast_ref::<GroupChangeAction<T>>()?;

        let same_target = self.track_id == next.track_id && same_ids(&self.before, &next.after);

        same_target.then(|| {
            Box::new(GroupChangeAction::new(
                self.track_id.clone(),
                self.before.clone(),
                next.after.clone(),
            )) as Box<dyn UndoAction>
        })
    }

    fn serialize(&self) -> SerializedData {
        SerializedData::new(T::GROUP_CHANGE_TAG)
            .with_attribute(keys::TRACK_ID, &self.track_id)
            .with_child(wrap(keys::BEFORE, &self.before))
            .with_child(wrap(keys::AFTER, &self.after))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
