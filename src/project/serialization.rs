// Serialization utilities for the project model
//
// The model serializes itself into a generic tagged tree (tag + attributes + children).
// Turning that tree into an on-disk or on-wire document is done here with RON or JSON.

use crate::project::error::ProjectError;
use ron::{from_str as ron_from_str, to_string as ron_to_string};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Display;

/// Node and attribute names shared by every serializable part of the model
pub mod keys {
    pub const NOTE: &str = "note";
    pub const ANNOTATION: &str = "annotation";
    pub const AUTOMATION: &str = "automation";
    pub const TIME_SIGNATURE: &str = "timeSignature";
    pub const SEQUENCE: &str = "sequence";
    pub const CLIP: &str = "clip";
    pub const MODIFIER: &str = "modifier";
    pub const PATTERN: &str = "pattern";
    pub const TRACK: &str = "track";
    pub const PROJECT: &str = "project";
    pub const TRANSACTION: &str = "transaction";
    pub const UNDO_STACK: &str = "undoStack";
    pub const DELTA: &str = "delta";

    pub const ID: &str = "id";
    pub const BEAT: &str = "beat";
    pub const KEY: &str = "key";
    pub const LENGTH: &str = "length";
    pub const VELOCITY: &str = "velocity";
    pub const TEXT: &str = "text";
    pub const COLOUR: &str = "colour";
    pub const VALUE: &str = "value";
    pub const CURVE: &str = "curve";
    pub const NUMERATOR: &str = "numerator";
    pub const DENOMINATOR: &str = "denominator";
    pub const MUTE: &str = "mute";
    pub const SOLO: &str = "solo";
    pub const TYPE: &str = "type";
    pub const ENABLED: &str = "enabled";
    pub const NAME: &str = "name";
    pub const CHANNEL: &str = "channel";
    pub const INSTRUMENT: &str = "instrument";
    pub const CONTROLLER: &str = "controller";
    pub const TRACK_ID: &str = "trackId";
    pub const DESCRIPTION: &str = "description";
    pub const COUNT: &str = "count";
    pub const PARAMETER: &str = "parameter";
    pub const BEFORE: &str = "before";
    pub const AFTER: &str = "after";
}

/// A generic tree-of-properties node
///
/// Attribute values are stored as strings and read back through typed accessors
/// that fall back to a default, so older documents missing an attribute still load.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct SerializedData {
    pub tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SerializedData>,
}

impl SerializedData {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, name: &str, value: impl Display) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Builder-style child appender
    pub fn with_child(mut self, child: SerializedData) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = SerializedData>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Display) {
        self.attributes.insert(name.to_string(), value.to_string());
    }

    pub fn append_child(&mut self, child: SerializedData) {
        self.children.push(child);
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tag == tag
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn get_str<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.attribute(name).unwrap_or(default)
    }

    pub fn get_f32(&self, name: &str, default: f32) -> f32 {
        self.attribute(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn get_i32(&self, name: &str, default: i32) -> i32 {
        self.attribute(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    pub fn get_u64(&self, name: &str, default: u64) -> u64 {
        self.attribute(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Accepts "true"/"false" as well as the legacy "yes"/"no" and "1"/"0" spellings
    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        match self.attribute(name).map(str::trim) {
            Some("true") | Some("yes") | Some("1") => true,
            Some("false") | Some("no") | Some("0") => false,
            _ => default,
        }
    }

    /// Attribute that has no sensible default (ids, mostly)
    pub fn require(&self, name: &str) -> Result<&str, ProjectError> {
        self.attribute(name)
            .ok_or_else(|| ProjectError::MissingAttribute {
                tag: self.tag.clone(),
                attribute: name.to_string(),
            })
    }

    /// Fails unless this node carries the given tag
    pub fn expect_tag(&self, tag: &str) -> Result<(), ProjectError> {
        if self.has_tag(tag) {
            Ok(())
        } else {
            Err(ProjectError::UnexpectedTag {
                expected: tag.to_string(),
                found: self.tag.clone(),
            })
        }
    }

    pub fn child_with_tag(&self, tag: &str) -> Option<&SerializedData> {
        self.children.iter().find(|c| c.has_tag(tag))
    }

    pub fn children_with_tag<'a>(
        &'a self,
        tag: &'a str,
    ) -> impl Iterator<Item = &'a SerializedData> + 'a {
        self.children.iter().filter(move |c| c.has_tag(tag))
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.children.is_empty()
    }
}

/// Serialize any model value (a `SerializedData` tree, a config) to RON format
pub fn serialize_to_ron<T: Serialize>(value: &T) -> Result<String, ProjectError> {
    ron_to_string(value).map_err(|e| {
        ProjectError::SerializationError(format!("Failed to serialize to RON: {}", e))
    })
}

/// Deserialize a model value from RON format
pub fn deserialize_from_ron<T: DeserializeOwned>(ron_data: &str) -> Result<T, ProjectError> {
    ron_from_str(ron_data).map_err(|e| {
        ProjectError::SerializationError(format!("Failed to deserialize from RON: {}", e))
    })
}

/// Serialize any model value to pretty-printed JSON
pub fn serialize_to_json<T: Serialize>(value: &T) -> Result<String, ProjectError> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Deserialize a model value from JSON
pub fn deserialize_from_json<T: DeserializeOwned>(json_data: &str) -> Result<T, ProjectError> {
    Ok(serde_json::from_str(json_data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> SerializedData {
        SerializedData::new(keys::PATTERN).with_child(
            SerializedData::new(keys::CLIP)
                .with_attribute(keys::ID, "ab")
                .with_attribute(keys::BEAT, 4.5)
                .with_attribute(keys::MUTE, true),
        )
    }

    #[test]
    fn test_typed_accessors() {
        let tree = sample_tree();
        let clip = tree.child_with_tag(keys::CLIP).unwrap();

        assert_eq!(clip.get_str(keys::ID, ""), "ab");
        assert_eq!(clip.get_f32(keys::BEAT, 0.0), 4.5);
        assert!(clip.get_bool(keys::MUTE, false));
        assert_eq!(clip.get_i32(keys::KEY, -1), -1);
        assert!(clip.require(keys::KEY).is_err());
    }

    #[test]
    fn test_legacy_bool_spelling() {
        let node = SerializedData::new("x").with_attribute(keys::MUTE, "yes");
        assert!(node.get_bool(keys::MUTE, false));
    }

    #[test]
    fn test_ron_document() {
        let tree = sample_tree();
        let ron_data = serialize_to_ron(&tree).unwrap();

        assert!(ron_data.contains("pattern"));
        let restored: SerializedData = deserialize_from_ron(&ron_data).unwrap();
        assert_eq!(restored, tree);
    }

    #[test]
    fn test_json_document() {
        let tree = sample_tree();
        let json = serialize_to_json(&tree).unwrap();
        let restored: SerializedData = deserialize_from_json(&json).unwrap();
        assert_eq!(restored, tree);
    }

    #[test]
    fn test_invalid_ron_is_an_error() {
        let result: Result<SerializedData, _> = deserialize_from_ron("(tag: ");
        assert!(matches!(result, Err(ProjectError::SerializationError(_))));
    }

    #[test]
    fn test_expect_tag() {
        let tree = sample_tree();
        assert!(tree.expect_tag(keys::PATTERN).is_ok());
        assert!(matches!(
            tree.expect_tag(keys::TRACK),
            Err(ProjectError::UnexpectedTag { .. })
        ));
    }
}
