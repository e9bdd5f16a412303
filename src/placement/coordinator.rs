//! Placement coordinator
//!
//! Per-draft state machine:
//!
//! ```text
//! Drafting -> Committing -> committed (draft cleared)
//!                        -> Conflict -> Relocating (user resubmits) -> Committing
//!                                    -> Failed (user moves or cancels)
//!                        -> Failed (network/other; draft kept)
//! ```
//!
//! A draft is local only. It is rendered under a `RenderKey::Pending` key and
//! rekeyed to the committed id on success. `Committing` and `Conflict` cannot
//! be cancelled or moved; every other phase can.
//!
//! Automatic placement skips the draft entirely and retries conflicts in an
//! explicit bounded loop. Edits and deletes are gated by the lock policy
//! before any request goes out.

use std::cell::RefCell;
use std::collections::HashSet;

use glam::Vec2;
use serde::Serialize;

use super::search::SpotSearch;
use crate::engine::StickerEngine;
use crate::error::{EngineError, ServiceError, ValidationError};
use crate::persistence::{CreatePlacement, PersistenceService};
use crate::records::{
    LockReason, MergeOutcome, StickerId, StickerRecord, StoredSticker, TempId, validate_note,
};
use crate::renderer::RenderKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementPhase {
    Drafting,
    Committing,
    Conflict,
    /// Moved after a conflict; waiting for the user to resubmit
    Relocating,
    /// Last commit failed; the draft can be moved, resubmitted or cancelled
    Failed,
}

impl PlacementPhase {
    /// A request for this draft is in flight
    #[inline]
    pub fn is_busy(&self) -> bool {
        matches!(self, PlacementPhase::Committing | PlacementPhase::Conflict)
    }
}

/// Local, uncommitted placement
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPlacement {
    pub temp_id: TempId,
    pub pos: Vec2,
    /// Note from the last submit
    pub note: Option<String>,
    pub phase: PlacementPhase,
    /// Commit requests sent so far
    pub attempts: u32,
}

impl PendingPlacement {
    pub fn new(pos: Vec2) -> Self {
        Self {
            temp_id: TempId::generate(),
            pos,
            note: None,
            phase: PlacementPhase::Drafting,
            attempts: 0,
        }
    }

    pub fn info(&self) -> DraftInfo {
        DraftInfo {
            temp_id: self.temp_id,
            pos: self.pos,
            phase: self.phase,
            note: self.note.clone(),
            attempts: self.attempts,
        }
    }
}

/// Read-only view of the current draft
#[derive(Debug, Clone, PartialEq)]
pub struct DraftInfo {
    pub temp_id: TempId,
    pub pos: Vec2,
    pub phase: PlacementPhase,
    pub note: Option<String>,
    pub attempts: u32,
}

/// Successful automatic placement
#[derive(Debug, Clone, PartialEq)]
pub struct Placed {
    pub record: StickerRecord,
    /// Commit attempts it took, conflicts included
    pub attempts: u32,
}

/// Marks a committed sticker busy until dropped
struct InFlightGuard<'a> {
    set: &'a RefCell<HashSet<StickerId>>,
    id: StickerId,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a RefCell<HashSet<StickerId>>, id: StickerId) -> Result<Self, EngineError> {
        if !set.borrow_mut().insert(id) {
            return Err(EngineError::Busy);
        }
        Ok(Self { set, id })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.borrow_mut().remove(&self.id);
    }
}

impl<P: PersistenceService> StickerEngine<P> {
    /// Place a sticker at `point` in one step (draft, then submit)
    ///
    /// The note is checked first so an invalid one never creates a draft.
    pub async fn attempt_placement(
        &self,
        point: Vec2,
        note: &str,
    ) -> Result<StickerRecord, EngineError> {
        validate_note(note, self.settings.note_max_chars)?;
        self.begin_draft(point)?;
        self.submit_draft(note).await
    }

    /// Start a draft at `point`, replacing any idle draft
    ///
    /// A point outside the region is pulled toward the canvas center; a point
    /// too close to another sticker is moved to a free spot nearby.
    pub fn begin_draft(&self, point: Vec2) -> Result<DraftInfo, EngineError> {
        let previous = self.draft.borrow().as_ref().map(|d| (d.temp_id, d.phase));
        if previous.is_some_and(|(_, phase)| phase.is_busy()) {
            return Err(EngineError::Busy);
        }

        let pos = self.resolve_draft_point(point, previous.map(|(temp, _)| temp))?;
        let draft = PendingPlacement::new(pos);
        let info = draft.info();
        {
            let mut renderer = self.renderer.borrow_mut();
            if let Some((old, _)) = previous {
                renderer.remove(RenderKey::Pending(old));
            }
            renderer.create(RenderKey::Pending(draft.temp_id), pos);
        }
        *self.draft.borrow_mut() = Some(draft);

        log::debug!("Draft {} at {pos}", info.temp_id);
        Ok(info)
    }

    /// Move the current draft; same point correction as `begin_draft`
    pub fn move_draft(&self, point: Vec2) -> Result<DraftInfo, EngineError> {
        let temp_id = self.idle_draft_id()?;
        let pos = self.resolve_draft_point(point, Some(temp_id))?;
        self.place_draft(temp_id, pos, PlacementPhase::Drafting)
    }

    /// Discard the draft locally; nothing is sent
    pub fn cancel_draft(&self) -> Result<(), EngineError> {
        let temp_id = self.idle_draft_id()?;
        *self.draft.borrow_mut() = None;
        self.renderer
            .borrow_mut()
            .remove(RenderKey::Pending(temp_id));
        log::debug!("Draft {temp_id} cancelled");
        Ok(())
    }

    /// Commit the draft with `note`
    ///
    /// On a position conflict the draft is relocated near the rejected point
    /// and `EngineError::Conflict { relocated_to: Some(_) }` is returned; the
    /// user reviews the new spot and submits again. If nothing is free nearby
    /// the draft is left `Failed` with `relocated_to: None`.
    pub async fn submit_draft(&self, note: &str) -> Result<StickerRecord, EngineError> {
        let temp_id = self.idle_draft_id()?;
        let note = validate_note(note, self.settings.note_max_chars)?;

        let (pos, attempts) = {
            let mut draft = self.draft.borrow_mut();
            let Some(draft) = draft.as_mut() else {
                return Err(EngineError::NoDraft);
            };
            draft.phase = PlacementPhase::Committing;
            draft.note = Some(note.clone());
            draft.attempts += 1;
            (draft.pos, draft.attempts)
        };

        match self.commit(pos, note).await {
            Ok(row) => Ok(self.finish_commit(temp_id, row)),
            Err(err) if err.is_conflict() => {
                self.set_draft_phase(temp_id, PlacementPhase::Conflict);
                log::info!("Draft {temp_id} lost {pos} to a concurrent placement");
                self.refresh_after_conflict().await;

                let relocated = self
                    .find_spot(Some(pos), Some(temp_id), Some(pos))
                    .map(|spot| self.place_draft(temp_id, spot, PlacementPhase::Relocating));
                match relocated {
                    Some(Ok(info)) => {
                        let spot = info.pos;
                        log::info!("Draft {temp_id} relocated to {spot}; awaiting resubmit");
                        Err(EngineError::Conflict {
                            relocated_to: Some(spot),
                            attempts,
                        })
                    }
                    _ => {
                        self.set_draft_phase(temp_id, PlacementPhase::Failed);
                        log::warn!("No free spot near {pos}; choose a new location");
                        Err(EngineError::Conflict {
                            relocated_to: None,
                            attempts,
                        })
                    }
                }
            }
            Err(err) => {
                self.set_draft_phase(temp_id, PlacementPhase::Failed);
                log::warn!("Commit of draft {temp_id} failed: {err}");
                Err(err.into())
            }
        }
    }

    /// Place a sticker wherever there is room, near `preferred` if given
    ///
    /// Conflicts are retried silently, up to `auto_retry_limit` commit
    /// attempts in total. Nothing is left behind on failure.
    pub async fn auto_place(
        &self,
        note: &str,
        preferred: Option<Vec2>,
    ) -> Result<Placed, EngineError> {
        let note = validate_note(note, self.settings.note_max_chars)?;
        let temp_id = TempId::generate();
        let limit = self.settings.auto_retry_limit.max(1);

        let mut rejected = None;
        for attempt in 1..=limit {
            let Some(pos) = self.find_spot(preferred, Some(temp_id), rejected) else {
                self.discard_batch_entry(temp_id);
                return Err(EngineError::NoFreeSpot);
            };

            let first = self.batch.borrow_mut().insert(temp_id, pos).is_none();
            {
                let mut renderer = self.renderer.borrow_mut();
                let key = RenderKey::Pending(temp_id);
                if first {
                    renderer.create(key, pos);
                } else {
                    renderer.update_position(key, pos);
                }
            }

            match self.commit(pos, note.clone()).await {
                Ok(row) => {
                    self.batch.borrow_mut().remove(&temp_id);
                    let record = self.finish_commit(temp_id, row);
                    return Ok(Placed {
                        record,
                        attempts: attempt,
                    });
                }
                Err(err) if err.is_conflict() => {
                    log::info!("Auto placement conflict at {pos} (attempt {attempt}/{limit})");
                    rejected = Some(pos);
                    self.refresh_after_conflict().await;
                }
                Err(err) => {
                    self.discard_batch_entry(temp_id);
                    log::warn!("Auto placement failed: {err}");
                    return Err(err.into());
                }
            }
        }

        self.discard_batch_entry(temp_id);
        log::warn!("Auto placement gave up after {limit} conflicts");
        Err(EngineError::Conflict {
            relocated_to: None,
            attempts: limit,
        })
    }

    /// Replace a sticker's note
    pub async fn attempt_edit(
        &self,
        id: StickerId,
        note: &str,
    ) -> Result<StickerRecord, EngineError> {
        let note = validate_note(note, self.settings.note_max_chars)?;
        let view = self.get_record(id).ok_or(EngineError::NotFound(id))?;
        if !view.permissions.can_edit {
            log::info!("Edit of {id} denied locally ({})", view.lock);
            return Err(EngineError::Locked(view.lock));
        }
        let _guard = InFlightGuard::acquire(&self.in_flight, id)?;

        let row = self
            .service
            .update_note(id, &note, Some(&self.device_id))
            .await
            .map_err(|err| record_error(id, err))?;

        let outcome = self.state.borrow_mut().apply_ack(row);
        if outcome == MergeOutcome::Refreshed {
            self.renderer
                .borrow_mut()
                .content_changed(RenderKey::Committed(id));
        }
        let record = self.state.borrow().get(id).cloned();
        record.ok_or(EngineError::NotFound(id))
    }

    /// Delete a sticker
    pub async fn attempt_delete(&self, id: StickerId) -> Result<(), EngineError> {
        let view = self.get_record(id).ok_or(EngineError::NotFound(id))?;
        if !view.permissions.can_delete {
            // Approved notes stay deletable until the window closes
            let reason = match view.lock {
                LockReason::Approved => LockReason::Time,
                other => other,
            };
            log::info!("Delete of {id} denied locally ({reason})");
            return Err(EngineError::Locked(reason));
        }
        let _guard = InFlightGuard::acquire(&self.in_flight, id)?;

        let result = self
            .service
            .delete_record(id, Some(&self.device_id))
            .await;
        match result {
            Ok(()) => {
                self.remove_committed(id);
                Ok(())
            }
            Err(ServiceError::NotFound(msg)) => {
                // Gone already; drop the local copy too
                log::debug!("Delete of {id}: {msg}");
                self.remove_committed(id);
                Err(EngineError::NotFound(id))
            }
            Err(err) => Err(err.into()),
        }
    }

    // === Internals ===

    async fn commit(&self, pos: Vec2, note: String) -> Result<StoredSticker, ServiceError> {
        let norm = self.canvas().normalize(pos);
        self.service
            .create_placement(CreatePlacement {
                x_norm: norm.x,
                y_norm: norm.y,
                note,
                owner_device_id: Some(self.device_id.clone()),
            })
            .await
    }

    /// Swap a pending placement for its committed record
    fn finish_commit(&self, temp_id: TempId, row: StoredSticker) -> StickerRecord {
        let id = row.id;
        let fallback = StickerRecord::from_stored(row.clone(), self.canvas());
        let outcome = self.state.borrow_mut().apply_ack(row);

        let pending = RenderKey::Pending(temp_id);
        let committed = RenderKey::Committed(id);
        {
            let mut renderer = self.renderer.borrow_mut();
            match outcome {
                MergeOutcome::Inserted { .. } => {
                    renderer.rekey(pending, committed, fallback.pos());
                    renderer.arrival(committed);
                }
                // The echo got here first and already drew the committed node
                MergeOutcome::Refreshed | MergeOutcome::Stale => {
                    renderer.remove(pending);
                    renderer.arrival(committed);
                }
                _ => renderer.remove(pending),
            }
        }

        {
            let mut draft = self.draft.borrow_mut();
            if draft.as_ref().is_some_and(|d| d.temp_id == temp_id) {
                *draft = None;
            }
        }

        log::info!("Committed {id} at ({:.1}, {:.1})", fallback.x, fallback.y);
        let merged = self.state.borrow().get(id).cloned();
        merged.unwrap_or(fallback)
    }

    fn remove_committed(&self, id: StickerId) {
        let outcome = self.state.borrow_mut().apply_removed(id);
        if outcome == MergeOutcome::Removed {
            self.release(id);
            log::info!("Deleted {id}");
        }
    }

    async fn refresh_after_conflict(&self) {
        if let Err(err) = self.refresh().await {
            log::warn!("Refresh after conflict failed: {err}");
        }
    }

    /// Id of the current draft, if it is not waiting on a request
    fn idle_draft_id(&self) -> Result<TempId, EngineError> {
        match self.draft.borrow().as_ref() {
            None => Err(EngineError::NoDraft),
            Some(draft) if draft.phase.is_busy() => Err(EngineError::Busy),
            Some(draft) => Ok(draft.temp_id),
        }
    }

    fn set_draft_phase(&self, temp_id: TempId, phase: PlacementPhase) {
        if let Some(draft) = self.draft.borrow_mut().as_mut() {
            if draft.temp_id == temp_id {
                draft.phase = phase;
            }
        }
    }

    fn place_draft(
        &self,
        temp_id: TempId,
        pos: Vec2,
        phase: PlacementPhase,
    ) -> Result<DraftInfo, EngineError> {
        let info = {
            let mut draft = self.draft.borrow_mut();
            let draft = draft
                .as_mut()
                .filter(|d| d.temp_id == temp_id)
                .ok_or(EngineError::NoDraft)?;
            draft.pos = pos;
            draft.phase = phase;
            draft.info()
        };
        self.renderer
            .borrow_mut()
            .update_position(RenderKey::Pending(temp_id), pos);
        Ok(info)
    }

    fn resolve_draft_point(&self, point: Vec2, exclude: Option<TempId>) -> Result<Vec2, EngineError> {
        let index = self.obstacles(exclude);
        let search = SpotSearch::new(&self.validator, &index, &self.settings);
        if search.is_available(point) {
            return Ok(point);
        }

        if !self.validator.is_valid_spot(point) {
            let center = self.canvas().center();
            return match search.nearest_valid_spot(point, center) {
                Some(spot) => {
                    log::debug!("Pulled {point} inside to {spot}");
                    Ok(spot)
                }
                None => Err(ValidationError::OutsideRegion(point).into()),
            };
        }

        let mut rng = self.rng.borrow_mut();
        search
            .find_available_spot(Some(point), &mut *rng)
            .ok_or(EngineError::NoFreeSpot)
    }

    fn discard_batch_entry(&self, temp_id: TempId) {
        if self.batch.borrow_mut().remove(&temp_id).is_some() {
            self.renderer
                .borrow_mut()
                .remove(RenderKey::Pending(temp_id));
        }
    }
}

fn record_error(id: StickerId, err: ServiceError) -> EngineError {
    match err {
        ServiceError::NotFound(_) => EngineError::NotFound(id),
        other => other.into(),
    }
}
