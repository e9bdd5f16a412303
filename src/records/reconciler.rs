//! State reconciler
//!
//! The single authoritative in-memory record map. Three sources feed it:
//! this client's own write acknowledgments, full listings from the service,
//! and change feed events (any order, possibly duplicated, including echoes).
//!
//! Merge rules:
//! - Creates upsert. Identity fields never change; mutable fields (note,
//!   approval, `updated_at`) take the newer row by `updated_at`. Equal
//!   timestamps fall back to approval, then note text, so every arrival
//!   order picks the same row.
//! - Updates for unknown ids are parked, not materialized. A later create
//!   for the same id merges with the parked row.
//! - Deletes remove and leave a tombstone, so a late or duplicated create
//!   can't resurrect the sticker. Removal reports `Removed` exactly once.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use glam::Vec2;

use super::record::{DeviceId, StickerId, StickerRecord, StoredSticker};
use crate::geometry::CanvasSize;
use crate::persistence::{ChangeEvent, ChangeKind};

/// What a merge did to the record map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New record; `own` when it carries the local device id
    Inserted { own: bool },
    /// Existing record took newer mutable fields
    Refreshed,
    /// Row was older than what is held
    Stale,
    /// Update for an id not seen yet, held until its create arrives
    Parked,
    /// Id was deleted earlier
    Suppressed,
    Removed,
    AlreadyRemoved,
}

/// Ids known before a listing request went out
///
/// Only these may be pruned by the listing's result; anything that arrived
/// while the request was in flight is newer than the listing.
#[derive(Debug, Clone)]
pub struct SnapshotToken {
    known: HashSet<StickerId>,
}

/// Changes caused by applying a full listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotOutcome {
    pub inserted: Vec<StickerId>,
    pub refreshed: Vec<StickerId>,
    pub removed: Vec<StickerId>,
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    canvas: CanvasSize,
    local_device: DeviceId,
    /// Committed records, ordered by id
    records: BTreeMap<StickerId, StickerRecord>,
    parked: HashMap<StickerId, StoredSticker>,
    tombstones: HashSet<StickerId>,
}

impl Reconciler {
    pub fn new(canvas: CanvasSize, local_device: DeviceId) -> Self {
        Self {
            canvas,
            local_device,
            records: BTreeMap::new(),
            parked: HashMap::new(),
            tombstones: HashSet::new(),
        }
    }

    pub fn get(&self, id: StickerId) -> Option<&StickerRecord> {
        self.records.get(&id)
    }

    pub fn records(&self) -> impl Iterator<Item = &StickerRecord> {
        self.records.values()
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec2> + '_ {
        self.records.values().map(StickerRecord::pos)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_deleted(&self, id: StickerId) -> bool {
        self.tombstones.contains(&id)
    }

    /// Direct response to this client's own create or update
    pub fn apply_ack(&mut self, row: StoredSticker) -> MergeOutcome {
        self.upsert(row)
    }

    /// This client's own delete succeeded
    pub fn apply_removed(&mut self, id: StickerId) -> MergeOutcome {
        self.remove(id)
    }

    /// Merge one change feed event
    pub fn apply_event(&mut self, event: ChangeEvent) -> MergeOutcome {
        let outcome = match event.kind {
            ChangeKind::Create => self.upsert(event.record),
            ChangeKind::Update => self.update(event.record),
            ChangeKind::Delete => self.remove(event.record.id),
        };
        log::trace!("Merged {:?} event -> {:?}", event.kind, outcome);
        outcome
    }

    /// Capture the ids a listing may prune; call before sending the request
    pub fn begin_snapshot(&self) -> SnapshotToken {
        SnapshotToken {
            known: self.records.keys().copied().collect(),
        }
    }

    /// Apply a complete listing from the service
    ///
    /// Records known when the listing was requested but absent from it were
    /// deleted remotely and are removed.
    pub fn apply_snapshot(
        &mut self,
        token: SnapshotToken,
        rows: Vec<StoredSticker>,
    ) -> SnapshotOutcome {
        let mut outcome = SnapshotOutcome::default();
        let mut listed = HashSet::with_capacity(rows.len());

        for row in rows {
            let id = row.id;
            listed.insert(id);
            match self.upsert(row) {
                MergeOutcome::Inserted { .. } => outcome.inserted.push(id),
                MergeOutcome::Refreshed => outcome.refreshed.push(id),
                _ => {}
            }
        }

        let mut vanished: Vec<StickerId> = token
            .known
            .into_iter()
            .filter(|id| !listed.contains(id))
            .collect();
        vanished.sort();
        for id in vanished {
            if self.remove(id) == MergeOutcome::Removed {
                outcome.removed.push(id);
            }
        }

        outcome
    }

    fn upsert(&mut self, row: StoredSticker) -> MergeOutcome {
        if self.tombstones.contains(&row.id) {
            return MergeOutcome::Suppressed;
        }

        // An update may have overtaken this row
        let row = match self.parked.remove(&row.id) {
            Some(parked) if row_version(&parked) > row_version(&row) => parked,
            _ => row,
        };

        match self.records.get_mut(&row.id) {
            Some(existing) => Self::refresh(existing, row),
            None => {
                let own = row.owner_device_id.as_ref() == Some(&self.local_device);
                let record = StickerRecord::from_stored(row, self.canvas);
                self.records.insert(record.id, record);
                MergeOutcome::Inserted { own }
            }
        }
    }

    fn update(&mut self, row: StoredSticker) -> MergeOutcome {
        if self.tombstones.contains(&row.id) {
            return MergeOutcome::Suppressed;
        }
        if let Some(existing) = self.records.get_mut(&row.id) {
            return Self::refresh(existing, row);
        }

        let newer = self
            .parked
            .get(&row.id)
            .is_none_or(|held| row_version(&row) > row_version(held));
        if newer {
            log::debug!("Parking update for unknown sticker {}", row.id);
            self.parked.insert(row.id, row);
        }
        MergeOutcome::Parked
    }

    /// Refresh mutable fields only; position and ownership are fixed at commit
    fn refresh(existing: &mut StickerRecord, row: StoredSticker) -> MergeOutcome {
        if row_version(&row) < record_version(existing) {
            return MergeOutcome::Stale;
        }
        existing.note = row.note;
        existing.is_approved = row.is_approved;
        existing.updated_at = row.updated_at;
        MergeOutcome::Refreshed
    }

    fn remove(&mut self, id: StickerId) -> MergeOutcome {
        self.parked.remove(&id);
        self.tombstones.insert(id);
        match self.records.remove(&id) {
            Some(_) => MergeOutcome::Removed,
            None => MergeOutcome::AlreadyRemoved,
        }
    }
}

/// Mutable-field version: `updated_at`, then approval, then note text
fn row_version(row: &StoredSticker) -> (DateTime<Utc>, bool, &str) {
    (row.updated_at, row.is_approved, &row.note)
}

fn record_version(record: &StickerRecord) -> (DateTime<Utc>, bool, &str) {
    (record.updated_at, record.is_approved, &record.note)
}
