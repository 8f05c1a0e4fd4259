// Modifier - A parametric transform applied to a copy of a track's notes
// Clips carry an ordered stack of these; the generated-sequence cache runs them

use crate::project::error::ProjectError;
use crate::project::serialization::{SerializedData, keys};
use crate::sequencer::event::Event;
use crate::sequencer::timeline::{BEATS_PER_BAR, round_beat};
use std::collections::BTreeMap;

/// What a modifier does to the notes it is given
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierKind {
    /// Mirror each interval around the first note
    MelodicInversion,
    /// Swap keys from both ends towards the middle
    Retrograde,
    /// Merge overlapping notes of the same key
    CleanupOverlaps,
    /// Stretch every note up to the start of the next one
    Legato,
    /// Cap note lengths at 1/n of a bar (1..=64)
    Staccato(u8),
    /// Snap starts and ends to 1/n of a bar (1..=32)
    Quantization(u8),
    /// Shift every key by a number of semitones
    Transpose(i32),
}

impl ModifierKind {
    fn type_name(&self) -> &'static str {
        match self {
            ModifierKind::MelodicInversion => "melodicInversion",
            ModifierKind::Retrograde => "retrograde",
            ModifierKind::CleanupOverlaps => "cleanupOverlaps",
            ModifierKind::Legato => "legato",
            ModifierKind::Staccato(_) => "staccato",
            ModifierKind::Quantization(_) => "quantization",
            ModifierKind::Transpose(_) => "transpose",
        }
    }

    fn parameter(&self) -> i32 {
        match *self {
            ModifierKind::Staccato(n) | ModifierKind::Quantization(n) => n as i32,
            ModifierKind::Transpose(delta) => delta,
            _ => 0,
        }
    }

    fn from_parts(type_name: &str, parameter: i32) -> Option<Self> {
        Some(match type_name {
            "melodicInversion" => ModifierKind::MelodicInversion,
            "retrograde" => ModifierKind::Retrograde,
            "cleanupOverlaps" => ModifierKind::CleanupOverlaps,
            "legato" => ModifierKind::Legato,
            "staccato" => ModifierKind::Staccato(parameter.clamp(1, 64) as u8),
            "quantization" => ModifierKind::Quantization(parameter.clamp(1, 32) as u8),
            "transpose" => ModifierKind::Transpose(parameter),
            _ => return None,
        })
    }
}

/// One entry of a clip's modifier stack
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Modifier {
    kind: ModifierKind,
    enabled: bool,
}

impl Modifier {
    pub fn new(kind: ModifierKind) -> Self {
        Self {
            kind,
            enabled: true,
        }
    }

    pub fn kind(&self) -> ModifierKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn with_enabled(&self, enabled: bool) -> Self {
        Self { enabled, ..*self }
    }

    /// Transform a beat-sorted event list
    ///
    /// Only notes are touched; everything else passes through as is.
    /// Disabled modifiers return the input unchanged.
    pub fn apply(&self, events: Vec<Event>) -> Vec<Event> {
        if !self.enabled {
            return events;
        }

        let (notes, others): (Vec<Event>, Vec<Event>) =
            events.into_iter().partition(Event::is_note);

        let mut notes = match self.kind {
            ModifierKind::MelodicInversion => melodic_inversion(notes),
            ModifierKind::Retrograde => retrograde(notes),
            ModifierKind::CleanupOverlaps => cleanup_overlaps(notes),
            ModifierKind::Legato => legato(notes),
            ModifierKind::Staccato(n) => staccato(notes, n),
            ModifierKind::Quantization(bar) => quantize(notes, bar),
            ModifierKind::Transpose(delta) => {
                notes.iter().map(|n| n.with_delta_key(delta)).collect()
            }
        };

        notes.extend(others);
        notes.sort_by(Event::compare);
        notes
    }

    pub fn serialize(&self) -> SerializedData {
        SerializedData::new(keys::MODIFIER)
            .with_attribute(keys::TYPE, self.kind.type_name())
            .with_attribute(keys::VALUE, self.kind.parameter())
            .with_attribute(keys::ENABLED, self.enabled)
    }

    pub fn deserialize(data: &SerializedData) -> Result<Self, ProjectError> {
        data.expect_tag(keys::MODIFIER)?;
        let type_name = data.require(keys::TYPE)?;
        let kind = ModifierKind::from_parts(type_name, data.get_i32(keys::VALUE, 1))
            .ok_or_else(|| {
                ProjectError::InvalidStructure(format!("Unknown modifier type: {}", type_name))
            })?;

        Ok(Self {
            kind,
            enabled: data.get_bool(keys::ENABLED, true),
        })
    }
}

fn key_of(note: &Event) -> i32 {
    note.as_note().map_or(0, |n| n.key)
}

fn length_of(note: &Event) -> f32 {
    note.as_note().map_or(0.0, |n| n.length)
}

// Assumes a melodic line; chords come out odd, as they would by hand
fn melodic_inversion(notes: Vec<Event>) -> Vec<Event> {
    if notes.len() < 2 {
        return notes;
    }

    let mut result = Vec::with_capacity(notes.len());
    result.push(notes[0].clone());

    let mut key_offset = 0;
    for pair in notes.windows(2) {
        let delta_key = key_of(&pair[1]) - key_of(&pair[0]);
        key_offset += delta_key * -2;
        result.push(pair[1].with_delta_key(key_offset));
    }

    result
}

fn retrograde(mut notes: Vec<Event>) -> Vec<Event> {
    if notes.len() < 2 {
        return notes;
    }

    let mut start = 0;
    let mut end = notes.len() - 1;
    while start < end {
        let start_key = key_of(&notes[start]);
        let end_key = key_of(&notes[end]);
        notes[start] = notes[start].with_key(end_key);
        notes[end] = notes[end].with_key(start_key);
        start += 1;
        end -= 1;
    }

    notes
}

fn cleanup_overlaps(notes: Vec<Event>) -> Vec<Event> {
    let mut by_key: BTreeMap<i32, Vec<Event>> = BTreeMap::new();
    for note in notes {
        by_key.entry(key_of(&note)).or_default().push(note);
    }

    let mut result = Vec::new();
    for (_, key_notes) in by_key {
        let mut current: Option<Event> = None;
        for note in key_notes {
            current = match current {
                Some(open) if note.beat() < open.end_beat() => {
                    let end = open.end_beat().max(note.end_beat());
                    Some(open.with_length(end - open.beat()))
                }
                Some(open) => {
                    result.push(open);
                    Some(note)
                }
                None => Some(note),
            };
        }
        result.extend(current);
    }

    result
}

fn legato(notes: Vec<Event>) -> Vec<Event> {
    let starts: Vec<f32> = notes.iter().map(Event::beat).collect();
    notes
        .iter()
        .map(|note| {
            match starts.iter().find(|&&beat| beat > note.beat()) {
                Some(next_beat) => note.with_length(next_beat - note.beat()),
                None => note.clone(),
            }
        })
        .collect()
}

fn staccato(notes: Vec<Event>, denominator: u8) -> Vec<Event> {
    let max_length = BEATS_PER_BAR / denominator.max(1) as f32;
    notes
        .iter()
        .map(|note| note.with_length(length_of(note).min(max_length)))
        .collect()
}

fn quantize(notes: Vec<Event>, bar: u8) -> Vec<Event> {
    let bar = bar.max(1) as f32;
    let q = bar / BEATS_PER_BAR;
    let min_length = BEATS_PER_BAR / bar;

    notes
        .iter()
        .map(|note| {
            let start = (note.beat() * q).round() / q;
            let end = (note.end_beat() * q).round() / q;
            note.with_beat(start)
                .with_length(round_beat((end - start).max(min_length)))
        })
        .collect()
}
