//! In-memory persistence service
//!
//! A reference implementation of the server-side contract: separation and
//! region checks happen under one borrow with the insert, so concurrent
//! clients racing for the same spot get exactly one winner and a
//! `ServiceError::Conflict` for everyone else. Every accepted write is
//! broadcast to all subscriptions, the writer's included.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use glam::Vec2;

use super::{ChangeEvent, ChangeFeed, ChangeKind, CreatePlacement, ListQuery, PersistenceService};
use crate::error::ServiceError;
use crate::geometry::{CanvasSize, Region, SpotValidator};
use crate::placement::CollisionIndex;
use crate::records::policy::window_elapsed;
use crate::records::{DeviceId, StickerId, StoredSticker, validate_note};
use crate::settings::EngineSettings;

/// What the server enforces
#[derive(Debug, Clone)]
pub struct ServerRules {
    pub canvas: CanvasSize,
    pub min_separation: f32,
    /// Position validation; None accepts any point on the canvas
    pub validator: Option<SpotValidator>,
    pub lock_window: Duration,
    pub note_max_chars: usize,
    /// New stickers start approved (no moderation queue)
    pub auto_approve: bool,
}

impl ServerRules {
    pub fn new(canvas: CanvasSize, min_separation: f32) -> Self {
        let defaults = EngineSettings::default();
        Self {
            canvas,
            min_separation,
            validator: None,
            lock_window: defaults.lock_window(),
            note_max_chars: defaults.note_max_chars,
            auto_approve: false,
        }
    }

    /// Rules mirroring a client configuration, with region validation
    pub fn from_settings(region: &Region, settings: &EngineSettings) -> Self {
        Self {
            canvas: region.canvas(),
            min_separation: settings.min_separation,
            validator: Some(SpotValidator::new(region.clone(), settings.sticker_radius)),
            lock_window: settings.lock_window(),
            note_max_chars: settings.note_max_chars,
            auto_approve: false,
        }
    }
}

#[derive(Debug, Default)]
struct ServerState {
    next_id: i64,
    rows: BTreeMap<StickerId, StoredSticker>,
    /// One queue per subscription; None once the subscription is dropped
    feeds: Vec<Option<VecDeque<ChangeEvent>>>,
    /// Failures to return from the next calls, in order
    injected: VecDeque<ServiceError>,
}

impl ServerState {
    fn broadcast(&mut self, event: ChangeEvent) {
        for feed in self.feeds.iter_mut().flatten() {
            feed.push_back(event.clone());
        }
    }
}

/// Timestamp strictly after `prev`, so `updated_at` orders every write
fn next_timestamp(prev: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > prev {
        now
    } else {
        prev + Duration::microseconds(1)
    }
}

fn check_owner(row: &StoredSticker, owner: Option<&DeviceId>) -> Result<(), ServiceError> {
    match &row.owner_device_id {
        Some(stored) if owner != Some(stored) => Err(ServiceError::Unauthorized(format!(
            "sticker {} belongs to another device",
            row.id
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug)]
pub struct InMemoryPersistence {
    rules: ServerRules,
    state: RefCell<ServerState>,
}

impl InMemoryPersistence {
    pub fn new(rules: ServerRules) -> Self {
        Self {
            rules,
            state: RefCell::new(ServerState::default()),
        }
    }

    /// Service shared by several engines (and subscriptions)
    pub fn shared(rules: ServerRules) -> Rc<Self> {
        Rc::new(Self::new(rules))
    }

    pub fn rules(&self) -> &ServerRules {
        &self.rules
    }

    /// Open a change feed subscription
    pub fn subscribe(server: &Rc<Self>) -> Subscription {
        let mut state = server.state.borrow_mut();
        state.feeds.push(Some(VecDeque::new()));
        Subscription {
            server: Rc::clone(server),
            slot: state.feeds.len() - 1,
        }
    }

    /// All stored rows, by id
    pub fn rows(&self) -> Vec<StoredSticker> {
        self.state.borrow().rows.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().rows.is_empty()
    }

    /// Import a row as-is (no checks, no broadcast)
    pub fn insert_row(&self, row: StoredSticker) {
        let mut state = self.state.borrow_mut();
        state.next_id = state.next_id.max(row.id.0);
        state.rows.insert(row.id, row);
    }

    /// Moderation: approve a sticker and broadcast the update
    pub fn approve(&self, id: StickerId) -> Result<StoredSticker, ServiceError> {
        let mut state = self.state.borrow_mut();
        let updated = {
            let row = state
                .rows
                .get_mut(&id)
                .ok_or_else(|| ServiceError::NotFound(format!("sticker {id}")))?;
            row.is_approved = true;
            row.updated_at = next_timestamp(row.updated_at);
            row.clone()
        };
        state.broadcast(ChangeEvent::new(ChangeKind::Update, updated.clone()));
        log::info!("Approved sticker {id}");
        Ok(updated)
    }

    /// Make the next write fail with `err` (transport drops, races)
    pub fn fail_next(&self, err: ServiceError) {
        self.state.borrow_mut().injected.push_back(err);
    }

    fn take_injected(&self) -> Result<(), ServiceError> {
        match self.state.borrow_mut().injected.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn row_pos(&self, row: &StoredSticker) -> Vec2 {
        self.rules
            .canvas
            .denormalize(Vec2::new(row.x_norm, row.y_norm))
    }
}

#[async_trait(?Send)]
impl PersistenceService for InMemoryPersistence {
    async fn create_placement(
        &self,
        request: CreatePlacement,
    ) -> Result<StoredSticker, ServiceError> {
        self.take_injected()?;

        let note = validate_note(&request.note, self.rules.note_max_chars)
            .map_err(|e| ServiceError::Invalid(e.to_string()))?;
        let norm = Vec2::new(request.x_norm, request.y_norm);
        if !(0.0..=1.0).contains(&norm.x) || !(0.0..=1.0).contains(&norm.y) {
            return Err(ServiceError::Invalid(format!(
                "normalized position {norm} out of range"
            )));
        }
        let pos = self.rules.canvas.denormalize(norm);
        if let Some(validator) = &self.rules.validator {
            if !validator.is_valid_spot(pos) {
                return Err(ServiceError::Invalid(format!("position {pos} outside region")));
            }
        }

        // Check and insert under one borrow: no other write can interleave
        let mut state = self.state.borrow_mut();
        let index = CollisionIndex::new(
            self.rules.min_separation,
            state.rows.values().map(|row| self.row_pos(row)),
        );
        if index.is_overlapping(pos) {
            log::debug!("Rejected placement at {pos}: too close to another sticker");
            return Err(ServiceError::Conflict(format!(
                "position {pos} is within {} of another sticker",
                self.rules.min_separation
            )));
        }

        state.next_id += 1;
        let now = Utc::now();
        let row = StoredSticker {
            id: StickerId(state.next_id),
            x_norm: norm.x,
            y_norm: norm.y,
            note,
            owner_device_id: request.owner_device_id,
            created_at: now,
            updated_at: now,
            is_approved: self.rules.auto_approve,
        };
        state.rows.insert(row.id, row.clone());
        state.broadcast(ChangeEvent::new(ChangeKind::Create, row.clone()));
        log::debug!("Committed sticker {} at {pos}", row.id);
        Ok(row)
    }

    async fn update_note(
        &self,
        id: StickerId,
        note: &str,
        owner: Option<&DeviceId>,
    ) -> Result<StoredSticker, ServiceError> {
        self.take_injected()?;

        let note = validate_note(note, self.rules.note_max_chars)
            .map_err(|e| ServiceError::Invalid(e.to_string()))?;

        let mut state = self.state.borrow_mut();
        let updated = {
            let row = state
                .rows
                .get_mut(&id)
                .ok_or_else(|| ServiceError::NotFound(format!("sticker {id}")))?;
            check_owner(row, owner)?;
            if row.is_approved {
                return Err(ServiceError::Unauthorized(format!(
                    "sticker {id} is approved and read-only"
                )));
            }
            if window_elapsed(row.created_at, Utc::now(), self.rules.lock_window) {
                return Err(ServiceError::Unauthorized(format!(
                    "edit window for sticker {id} has elapsed"
                )));
            }
            row.note = note;
            row.updated_at = next_timestamp(row.updated_at);
            row.clone()
        };
        state.broadcast(ChangeEvent::new(ChangeKind::Update, updated.clone()));
        Ok(updated)
    }

    async fn delete_record(
        &self,
        id: StickerId,
        owner: Option<&DeviceId>,
    ) -> Result<(), ServiceError> {
        self.take_injected()?;

        let mut state = self.state.borrow_mut();
        let row = state
            .rows
            .get(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("sticker {id}")))?;
        check_owner(row, owner)?;
        if window_elapsed(row.created_at, Utc::now(), self.rules.lock_window) {
            return Err(ServiceError::Unauthorized(format!(
                "delete window for sticker {id} has elapsed"
            )));
        }

        if let Some(removed) = state.rows.remove(&id) {
            state.broadcast(ChangeEvent::new(ChangeKind::Delete, removed));
        }
        Ok(())
    }

    async fn list_records(&self, query: &ListQuery) -> Result<Vec<StoredSticker>, ServiceError> {
        let state = self.state.borrow();
        let mut rows: Vec<StoredSticker> = state
            .rows
            .values()
            .filter(|row| !query.approved_only || row.is_approved)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(query.offset).take(limit).collect())
    }
}

/// Change feed handle from `InMemoryPersistence::subscribe`
#[derive(Debug)]
pub struct Subscription {
    server: Rc<InMemoryPersistence>,
    slot: usize,
}

impl ChangeFeed for Subscription {
    fn poll_changes(&self) -> Vec<ChangeEvent> {
        let mut state = self.server.state.borrow_mut();
        match state.feeds.get_mut(self.slot) {
            Some(Some(queue)) => queue.drain(..).collect(),
            _ => Vec::new(),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(slot) = self.server.state.borrow_mut().feeds.get_mut(self.slot) {
            *slot = None;
        }
    }
}
