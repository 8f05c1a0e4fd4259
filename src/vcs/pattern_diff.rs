// Pattern diff - Clip-level diff and merge between pattern snapshots

use crate::project::error::ProjectError;
use crate::project::serialization::{SerializedData, keys};
use crate::sequencer::clip::Clip;
use crate::vcs::delta::{
    Delta, DeltaFamily, DiffEntity, create_entity_diffs, kinds, merge_added, merge_by_kind,
    merge_changed, merge_removed,
};
use std::cmp::Ordering;

pub const CLIPS: DeltaFamily = DeltaFamily {
    added: kinds::CLIPS_ADDED,
    removed: kinds::CLIPS_REMOVED,
    changed: kinds::CLIPS_CHANGED,
    noun: "clips",
};

impl DiffEntity for Clip {
    fn accepts(tag: &str) -> bool {
        tag == keys::CLIP
    }

    fn from_data(data: &SerializedData) -> Result<Self, ProjectError> {
        Clip::deserialize(data)
    }

    fn to_data(&self) -> SerializedData {
        self.serialize()
    }

    fn entity_id(&self) -> &str {
        self.id()
    }

    // Only placement moves are tracked by history
    fn has_changes(&self, other: &Self) -> bool {
        self.beat() != other.beat()
    }

    fn order(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

pub fn is_pattern_delta(delta: &Delta) -> bool {
    CLIPS.contains(delta.kind())
}

/// Added/removed/changed clip deltas turning `state` into `changes`
pub fn create_clips_diffs(
    state: &SerializedData,
    changes: &SerializedData,
) -> Result<Vec<Delta>, ProjectError> {
    create_entity_diffs::<Clip>(CLIPS, state, changes)
}

pub fn merge_clips_added(
    state: &SerializedData,
    changes: &SerializedData,
) -> Result<SerializedData, ProjectError> {
    merge_added::<Clip>(CLIPS, state, changes)
}

pub fn merge_clips_removed(
    state: &SerializedData,
    changes: &SerializedData,
) -> Result<SerializedData, ProjectError> {
    merge_removed::<Clip>(CLIPS, state, changes)
}

pub fn merge_clips_changed(
    state: &SerializedData,
    changes: &SerializedData,
) -> Result<SerializedData, ProjectError> {
    merge_changed::<Clip>(CLIPS, state, changes)
}

/// Fold one clip delta of any category onto a full clip state
pub fn merge_clips_delta(
    state: &SerializedData,
    delta: &Delta,
) -> Result<SerializedData, ProjectError> {
    merge_by_kind::<Clip>(CLIPS, delta.kind(), state, delta.data())
}

/// Per-category clip deltas of one branch
#[derive(Debug, Clone, Default)]
pub struct BranchChanges {
    pub added: Option<SerializedData>,
    pub removed: Option<SerializedData>,
    pub changed: Option<SerializedData>,
}

impl BranchChanges {
    /// Sort a branch's deltas into categories; deltas of other families are ignored
    pub fn collect(family: DeltaFamily, deltas: &[Delta]) -> Self {
        let mut changes = Self::default();
        for delta in deltas {
            let slot = if delta.has_kind(family.added) {
                &mut changes.added
            } else if delta.has_kind(family.removed) {
                &mut changes.removed
            } else if delta.has_kind(family.changed) {
                &mut changes.changed
            } else {
                continue;
            };
            *slot = Some(delta.data().clone());
        }
        changes
    }
}

/// Union of two optional payloads of the same category
pub(crate) fn union_of<T: DiffEntity>(
    family: DeltaFamily,
    local: Option<&SerializedData>,
    remote: Option<&SerializedData>,
) -> Result<SerializedData, ProjectError> {
    let empty = SerializedData::new(family.added);
    merge_added::<T>(
        family,
        local.unwrap_or(&empty),
        remote.unwrap_or(&empty),
    )
}

/// Reconcile two branches that both started from `base`
///
/// Additions and removals of both sides are unioned by id; for changes,
/// the remote side wins where both branches touched the same id.
pub(crate) fn three_way_merge<T: DiffEntity>(
    family: DeltaFamily,
    base: &SerializedData,
    local: &[Delta],
    remote: &[Delta],
) -> Result<SerializedData, ProjectError> {
    let local = BranchChanges::collect(family, local);
    let remote = BranchChanges::collect(family, remote);
    let empty = SerializedData::new(family.added);

    let added = union_of::<T>(family, local.added.as_ref(), remote.added.as_ref())?;
    let removed = union_of::<T>(family, local.removed.as_ref(), remote.removed.as_ref())?;
    let changed = merge_changed::<T>(
        family,
        &union_of::<T>(family, local.changed.as_ref(), remote.changed.as_ref())?,
        remote.changed.as_ref().unwrap_or(&empty),
    )?;

    log::debug!(
        target: "vcs",
        "three-way merge of {}: +{} -{} ~{}",
        family.noun,
        added.children.len(),
        removed.children.len(),
        changed.children.len()
    );

    let merged = merge_added::<T>(family, base, &added)?;
    let merged = merge_removed::<T>(family, &merged, &removed)?;
    merge_changed::<T>(family, &merged, &changed)
}

pub fn three_way_merge_clips(
    base: &SerializedData,
    local: &[Delta],
    remote: &[Delta],
) -> Result<SerializedData, ProjectError> {
    three_way_merge::<Clip>(CLIPS, base, local, remote)
}
