// Clip - A placement of a track's sequence on the timeline
// Clips are values: a pattern stores copies, edits produce new copies with the same id

use crate::project::error::ProjectError;
use crate::project::serialization::{SerializedData, keys};
use crate::sequencer::modifier::Modifier;
use crate::sequencer::timeline::round_beat;
use std::cmp::Ordering;

/// Clip identifier, unique within the owning pattern
pub type ClipId = String;

pub const MIN_CLIP_KEY: i32 = -128;
pub const MAX_CLIP_KEY: i32 = 128;

#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    id: ClipId,
    /// Offset of the placement in beats
    beat: f32,
    /// Transposition applied on playback, in semitones
    key: i32,
    /// Velocity multiplier (0.0..=1.0)
    velocity: f32,
    mute: bool,
    solo: bool,
    modifiers: Vec<Modifier>,
}

impl Clip {
    pub fn new(id: impl Into<ClipId>, beat: f32) -> Self {
        Self {
            id: id.into(),
            beat: round_beat(beat),
            key: 0,
            velocity: 1.0,
            mute: false,
            solo: false,
            modifiers: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn beat(&self) -> f32 {
        self.beat
    }

    pub fn key(&self) -> i32 {
        self.key
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn is_muted(&self) -> bool {
        self.mute
    }

    pub fn is_soloed(&self) -> bool {
        self.solo
    }

    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    /// Only enabled modifiers count: a stack of disabled ones generates nothing
    pub fn has_modifiers(&self) -> bool {
        self.modifiers.iter().any(Modifier::is_enabled)
    }

    /// Sort order inside a pattern: by beat, then by id
    pub fn compare(&self, other: &Clip) -> Ordering {
        self.beat
            .total_cmp(&other.beat)
            .then_with(|| self.id.cmp(&other.id))
    }

    pub fn with_beat(&self, beat: f32) -> Self {
        Self {
            beat: round_beat(beat),
            ..self.clone()
        }
    }

    pub fn with_delta_beat(&self, delta: f32) -> Self {
        self.with_beat(self.beat + delta)
    }

    pub fn with_key(&self, key: i32) -> Self {
        Self {
            key: key.clamp(MIN_CLIP_KEY, MAX_CLIP_KEY),
            ..self.clone()
        }
    }

    pub fn with_delta_key(&self, delta: i32) -> Self {
        self.with_key(self.key + delta)
    }

    pub fn with_velocity(&self, velocity: f32) -> Self {
        Self {
            velocity: velocity.clamp(0.0, 1.0),
            ..self.clone()
        }
    }

    pub fn with_mute(&self, mute: bool) -> Self {
        Self {
            mute,
            ..self.clone()
        }
    }

    pub fn with_solo(&self, solo: bool) -> Self {
        Self {
            solo,
            ..self.clone()
        }
    }

    pub fn with_modifiers(&self, modifiers: Vec<Modifier>) -> Self {
        Self {
            modifiers,
            ..self.clone()
        }
    }

    pub fn with_appended_modifier(&self, modifier: Modifier) -> Self {
        let mut copy = self.clone();
        copy.modifiers.push(modifier);
        copy
    }

    pub fn with_removed_modifier(&self, index: usize) -> Self {
        let mut copy = self.clone();
        if index < copy.modifiers.len() {
            copy.modifiers.remove(index);
        }
        copy
    }

    pub fn with_updated_modifier(&self, index: usize, modifier: Modifier) -> Self {
        let mut copy = self.clone();
        if let Some(slot) = copy.modifiers.get_mut(index) {
            *slot = modifier;
        }
        copy
    }

    pub fn copy_with_new_id(&self, id: impl Into<ClipId>) -> Self {
        Self {
            id: id.into(),
            ..self.clone()
        }
    }

    pub fn serialize(&self) -> SerializedData {
        SerializedData::new(keys::CLIP)
            .with_attribute(keys::ID, &self.id)
            .with_attribute(keys::BEAT, self.beat)
            .with_attribute(keys::KEY, self.key)
            .with_attribute(keys::VELOCITY, self.velocity)
            .with_attribute(keys::MUTE, self.mute)
            .with_attribute(keys::SOLO, self.solo)
            .with_children(self.modifiers.iter().map(Modifier::serialize))
    }

    pub fn deserialize(data: &SerializedData) -> Result<Self, ProjectError> {
        data.expect_tag(keys::CLIP)?;

        let modifiers = data
            .children_with_tag(keys::MODIFIER)
            .map(Modifier::deserialize)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: data.require(keys::ID)?.to_string(),
            beat: round_beat(data.get_f32(keys::BEAT, 0.0)),
            key: data
                .get_i32(keys::KEY, 0)
                .clamp(MIN_CLIP_KEY, MAX_CLIP_KEY),
            velocity: data.get_f32(keys::VELOCITY, 1.0).clamp(0.0, 1.0),
            mute: data.get_bool(keys::MUTE, false),
            solo: data.get_bool(keys::SOLO, false),
            modifiers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::modifier::ModifierKind;

    #[test]
    fn test_clip_defaults() {
        let clip = Clip::new("a", 4.0);

        assert_eq!(clip.id(), "a");
        assert_eq!(clip.beat(), 4.0);
        assert_eq!(clip.key(), 0);
        assert_eq!(clip.velocity(), 1.0);
        assert!(!clip.is_muted());
        assert!(!clip.has_modifiers());
    }

    #[test]
    fn test_with_mutators_keep_identity() {
        let clip = Clip::new("a", 0.0);

        assert_eq!(clip.with_beat(5.0).id(), "a");
        assert_eq!(clip.with_key(500).key(), MAX_CLIP_KEY);
        assert_eq!(clip.with_key(-500).key(), MIN_CLIP_KEY);
        assert_eq!(clip.with_velocity(2.0).velocity(), 1.0);
        assert!(clip.with_mute(true).is_muted());
        assert_eq!(clip.with_delta_beat(2.5).beat(), 2.5);
    }

    #[test]
    fn test_modifier_stack() {
        let clip = Clip::new("a", 0.0)
            .with_appended_modifier(Modifier::new(ModifierKind::Retrograde))
            .with_appended_modifier(Modifier::new(ModifierKind::Transpose(3)));
        assert_eq!(clip.modifiers().len(), 2);
        assert!(clip.has_modifiers());

        let disabled = clip
            .with_updated_modifier(0, Modifier::new(ModifierKind::Retrograde).with_enabled(false))
            .with_removed_modifier(1);
        assert_eq!(disabled.modifiers().len(), 1);
        assert!(!disabled.has_modifiers());
    }

    #[test]
    fn test_ordering() {
        let a = Clip::new("a", 4.0);
        let b = Clip::new("b", 4.0);
        let c = Clip::new("c", 1.0);

        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(c.compare(&a), Ordering::Less);
    }

    #[test]
    fn test_serialization() {
        let clip = Clip::new("zz", 8.0)
            .with_key(-12)
            .with_velocity(0.5)
            .with_solo(true)
            .with_appended_modifier(Modifier::new(ModifierKind::Legato));

        let data = clip.serialize();
        assert_eq!(data.tag, keys::CLIP);
        assert_eq!(data.children.len(), 1);
        assert_eq!(Clip::deserialize(&data).unwrap(), clip);
    }
}
