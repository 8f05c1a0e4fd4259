// Track actions - Undoable track insertion, removal and property edits

use crate::command::factory::tags;
use crate::command::state::ProjectState;
use crate::command::trait_def::UndoAction;
use crate::project::error::ProjectError;
use crate::project::serialization::{SerializedData, keys};
use crate::sequencer::event::{Colour, Event};
use crate::sequencer::track::{Track, TrackId};
use std::any::Any;
use std::mem::size_of;

fn read_track_id(data: &SerializedData) -> Result<TrackId, ProjectError> {
    Ok(data.require(keys::TRACK_ID)?.to_string())
}

fn track_node(data: &SerializedData) -> Result<&SerializedData, ProjectError> {
    data.child_with_tag(keys::TRACK)
        .ok_or_else(|| ProjectError::InvalidStructure(format!("<{}> has no track", data.tag)))
}

//===----------------------------------------------------------------------===//
// Insert / remove
//===----------------------------------------------------------------------===//

/// Adds a whole track; the serialized copy lets undo/redo recreate it with the same ids
pub struct TrackInsertAction {
    track_id: TrackId,
    track: SerializedData,
}

impl TrackInsertAction {
    pub fn new(track: &Track) -> Self {
        Self {
            track_id: track.id().to_string(),
            track: track.serialize(),
        }
    }

    pub fn deserialize(data: &SerializedData) -> Result<Self, ProjectError> {
        data.expect_tag(tags::TRACK_INSERT)?;
        Ok(Self {
            track_id: read_track_id(data)?,
            track: track_node(data)?.clone(),
        })
    }
}

impl UndoAction for TrackInsertAction {
    fn perform(&mut self, state: &mut ProjectState) -> bool {
        match Track::deserialize(&self.track) {
            Ok(track) => state.add_track(track),
            Err(e) => {
                log::warn!(target: "undo", "Cannot recreate track {}: {}", self.track_id, e);
                false
            }
        }
    }

    fn undo(&mut self, state: &mut ProjectState) -> bool {
        state.remove_track(&self.track_id).is_some()
    }

    fn size_in_units(&self) -> usize {
        self.track.children.len().max(1) * size_of::<SerializedData>()
    }

    fn description(&self) -> String {
        "Add track".to_string()
    }

    fn serialize(&self) -> SerializedData {
        SerializedData::new(tags::TRACK_INSERT)
            .with_attribute(keys::TRACK_ID, &self.track_id)
            .with_child(self.track.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Deletes a track, keeping a serialized copy and its position for undo
pub struct TrackRemoveAction {
    track_id: TrackId,
    removed: Option<(usize, SerializedData)>,
}

impl TrackRemoveAction {
    pub fn new(track_id: impl Into<TrackId>) -> Self {
        Self {
            track_id: track_id.into(),
            removed: None,
        }
    }

    pub fn deserialize(data: &SerializedData) -> Result<Self, ProjectError> {
        data.expect_tag(tags::TRACK_REMOVE)?;
        let removed = match data.child_with_tag(keys::TRACK) {
            Some(track) => Some((data.get_u64(keys::VALUE, 0) as usize, track.clone())),
            None => None,
        };
        Ok(Self {
            track_id: read_track_id(data)?,
            removed,
        })
    }
}

impl UndoAction for TrackRemoveAction {
    fn perform(&mut self, state: &mut ProjectState) -> bool {
        match state.remove_track(&self.track_id) {
            Some((index, track)) => {
                self.removed = Some((index, track.serialize()));
                true
            }
            None => false,
        }
    }

    fn undo(&mut self, state: &mut ProjectState) -> bool {
        let Some((index, data)) = &self.removed else {
            return false;
        };

        match Track::deserialize(data) {
            Ok(track) => state.insert_track(*index, track),
            Err(e) => {
                log::warn!(target: "undo", "Cannot restore track {}: {}", self.track_id, e);
                false
            }
        }
    }

    fn size_in_units(&self) -> usize {
        self.removed
            .as_ref()
            .map_or(1, |(_, data)| data.children.len().max(1))
            * size_of::<SerializedData>()
    }

    fn description(&self) -> String {
        "Remove track".to_string()
    }

    fn serialize(&self) -> SerializedData {
        let mut node =
            SerializedData::new(tags::TRACK_REMOVE).with_attribute(keys::TRACK_ID, &self.track_id);
        if let Some((index, data)) = &self.removed {
            node.set_attribute(keys::VALUE, index);
            node.append_child(data.clone());
        }
        node
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

//===----------------------------------------------------------------------===//
// Properties
//===----------------------------------------------------------------------===//

/// Changes the track path; consecutive renames of one track coalesce
pub struct TrackRenameAction {
    track_id: TrackId,
    name_before: Option<String>,
    name_after: String,
}

impl TrackRenameAction {
    pub fn new(track_id: impl Into<TrackId>, name: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            name_before: None,
            name_after: name.into(),
        }
    }

    pub fn deserialize(data: &SerializedData) -> Result<Self, ProjectError> {
        data.expect_tag(tags::TRACK_RENAME)?;
        Ok(Self {
            track_id: read_track_id(data)?,
            name_before: data.attribute(keys::BEFORE).map(str::to_string),
            name_after: data.get_str(keys::AFTER, "").to_string(),
        })
    }
}

impl UndoAction for TrackRenameAction {
    fn perform(&mut self, state: &mut ProjectState) -> bool {
        let Some(track) = state.track(&self.track_id) else {
            return false;
        };
        if self.name_before.is_none() {
            self.name_before = Some(track.name().to_string());
        }
        state.set_track_name(&self.track_id, &self.name_after)
    }

    fn undo(&mut self, state: &mut ProjectState) -> bool {
        match &self.name_before {
            Some(name) => state.set_track_name(&self.track_id, name),
            None => false,
        }
    }

    fn description(&self) -> String {
        format!("Rename track to {}", self.name_after)
    }

    fn create_coalesced_action(&self, next: &dyn UndoAction) -> Option<Box<dyn UndoAction>> {
        let next = next.as_any().downcast_ref::<TrackRenameAction>()?;
        (self.track_id == next.track_id).then(|| {
            Box::new(TrackRenameAction {
                track_id: self.track_id.clone(),
                name_before: self.name_before.clone(),
                name_after: next.name_after.clone(),
            }) as Box<dyn UndoAction>
        })
    }

    fn serialize(&self) -> SerializedData {
        let mut node = SerializedData::new(tags::TRACK_RENAME)
            .with_attribute(keys::TRACK_ID, &self.track_id)
            .with_attribute(keys::AFTER, &self.name_after);
        if let Some(before) = &self.name_before {
            node.set_attribute(keys::BEFORE, before);
        }
        node
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Changes the track colour; consecutive colour edits of one track coalesce
pub struct TrackColourAction {
    track_id: TrackId,
    colour_before: Option<Colour>,
    colour_after: Colour,
}

impl TrackColourAction {
    pub fn new(track_id: impl Into<TrackId>, colour: Colour) -> Self {
        Self {
            track_id: track_id.into(),
            colour_before: None,
            colour_after: colour,
        }
    }

    pub fn deserialize(data: &SerializedData) -> Result<Self, ProjectError> {
        data.expect_tag(tags::TRACK_COLOUR)?;
        Ok(Self {
            track_id: read_track_id(data)?,
            colour_before: data.attribute(keys::BEFORE).and_then(Colour::from_hex),
            colour_after: Colour::from_hex(data.get_str(keys::AFTER, "")).unwrap_or_default(),
        })
    }
}

impl UndoAction for TrackColourAction {
    fn perform(&mut self, state: &mut ProjectState) -> bool {
        let Some(track) = state.track(&self.track_id) else {
            return false;
        };
        if self.colour_before.is_none() {
            self.colour_before = Some(track.colour());
        }
        state.set_track_colour(&self.track_id, self.colour_after)
    }

    fn undo(&mut self, state: &mut ProjectState) -> bool {
        match self.colour_before {
            Some(colour) => state.set_track_colour(&self.track_id, colour),
            None => false,
        }
    }

    fn description(&self) -> String {
        "Change track colour".to_string()
    }

    fn create_coalesced_action(&self, next: &dyn UndoAction) -> Option<Box<dyn UndoAction>> {
        let next = next.as_any().downcast_ref::<TrackColourAction>()?;
        (self.track_id == next.track_id).then(|| {
            Box::new(TrackColourAction {
                track_id: self.track_id.clone(),
                colour_before: self.colour_before,
                colour_after: next.colour_after,
            }) as Box<dyn UndoAction>
        })
    }

    fn serialize(&self) -> SerializedData {
        let mut node = SerializedData::new(tags::TRACK_COLOUR)
            .with_attribute(keys::TRACK_ID, &self.track_id)
            .with_attribute(keys::AFTER, self.colour_after);
        if let Some(before) = self.colour_before {
            node.set_attribute(keys::BEFORE, before);
        }
        node
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Rebinds the track to another instrument id
pub struct TrackInstrumentAction {
    track_id: TrackId,
    instrument_before: Option<String>,
    instrument_after: String,
}

impl TrackInstrumentAction {
    pub fn new(track_id: impl Into<TrackId>, instrument_id: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            instrument_before: None,
            instrument_after: instrument_id.into(),
        }
    }

    pub fn deserialize(data: &SerializedData) -> Result<Self, ProjectError> {
        data.expect_tag(tags::TRACK_INSTRUMENT)?;
        Ok(Self {
            track_id: read_track_id(data)?,
            instrument_before: data.attribute(keys::BEFORE).map(str::to_string),
            instrument_after: data.get_str(keys::AFTER, "").to_string(),
        })
    }
}

impl UndoAction for TrackInstrumentAction {
    fn perform(&mut self, state: &mut ProjectState) -> bool {
        let Some(track) = state.track(&self.track_id) else {
            return false;
        };
        if self.instrument_before.is_none() {
            self.instrument_before = Some(track.sequence().instrument_id().to_string());
        }
        state.set_track_instrument(&self.track_id, &self.instrument_after)
    }

    fn undo(&mut self, state: &mut ProjectState) -> bool {
        match &self.instrument_before {
            Some(instrument_id) => state.set_track_instrument(&self.track_id, instrument_id),
            None => false,
        }
    }

    fn description(&self) -> String {
        "Change instrument".to_string()
    }

    fn serialize(&self) -> SerializedData {
        let mut node = SerializedData::new(tags::TRACK_INSTRUMENT)
            .with_attribute(keys::TRACK_ID, &self.track_id)
            .with_attribute(keys::AFTER, &self.instrument_after);
        if let Some(before) = &self.instrument_before {
            node.set_attribute(keys::BEFORE, before);
        }
        node
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Sets or clears the track's time signature override
///
/// The stored "before" value is the already clamped override, so undo
/// restores exactly what the track held.
pub struct TrackTimeSignatureAction {
    track_id: TrackId,
    before: Option<Option<Event>>,
    after: Option<Event>,
}

impl TrackTimeSignatureAction {
    pub fn new(track_id: impl Into<TrackId>, time_signature: Option<Event>) -> Self {
        Self {
            track_id: track_id.into(),
            before: None,
            after: time_signature,
        }
    }

    fn read_optional(data: &SerializedData, wrapper: &str) -> Result<Option<Event>, ProjectError> {
        match data.child_with_tag(wrapper).and_then(|w| w.children.first()) {
            Some(event) => Ok(Some(Event::deserialize(event)?)),
            None => Ok(None),
        }
    }

    fn wrap(wrapper: &str, event: Option<&Event>) -> SerializedData {
        SerializedData::new(wrapper).with_children(event.map(Event::serialize))
    }

    pub fn deserialize(data: &SerializedData) -> Result<Self, ProjectError> {
        data.expect_tag(tags::TRACK_TIME_SIGNATURE)?;
        let before = match data.child_with_tag(keys::BEFORE) {
            Some(_) => Some(Self::read_optional(data, keys::BEFORE)?),
            None => None,
        };
        Ok(Self {
            track_id: read_track_id(data)?,
            before,
            after: Self::read_optional(data, keys::AFTER)?,
        })
    }
}

impl UndoAction for TrackTimeSignatureAction {
    fn perform(&mut self, state: &mut ProjectState) -> bool {
        let Some(track) = state.track(&self.track_id) else {
            return false;
        };
        if self.before.is_none() {
            self.before = Some(track.time_signature_override().cloned());
        }
        state.set_track_time_signature(&self.track_id, self.after.clone())
    }

    fn undo(&mut self, state: &mut ProjectState) -> bool {
        match &self.before {
            Some(before) => state.set_track_time_signature(&self.track_id, before.clone()),
            None => false,
        }
    }

    fn size_in_units(&self) -> usize {
        size_of::<Event>() * 2
    }

    fn description(&self) -> String {
        "Change time signature".to_string()
    }

    fn serialize(&self) -> SerializedData {
        let mut node = SerializedData::new(tags::TRACK_TIME_SIGNATURE)
            .with_attribute(keys::TRACK_ID, &self.track_id)
            .with_child(Self::wrap(keys::AFTER, self.after.as_ref()));
        if let Some(before) = &self.before {
            node.append_child(Self::wrap(keys::BEFORE, before.as_ref()));
        }
        node
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
