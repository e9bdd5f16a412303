//! Persistence service and change feed seams
//!
//! The engine talks to storage only through these traits:
//! - `PersistenceService`: authoritative writes and listing; it, not the
//!   client, enforces minimum separation and ownership
//! - `ChangeFeed`: create/update/delete notifications, unordered and
//!   at-least-once, including echoes of this client's own writes
//!
//! `memory` holds a reference in-memory implementation of both.

pub mod delay;
pub mod memory;

pub use delay::Delayed;
pub use memory::{InMemoryPersistence, ServerRules, Subscription};

use std::rc::Rc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::records::{DeviceId, StickerId, StoredSticker};

/// Create request; coordinates are normalized to [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlacement {
    pub x_norm: f32,
    pub y_norm: f32,
    pub note: String,
    pub owner_device_id: Option<DeviceId>,
}

/// Listing filter and pagination
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Only approved stickers
    pub approved_only: bool,
    pub offset: usize,
    /// None = no limit
    pub limit: Option<usize>,
}

impl ListQuery {
    /// Unfiltered, unpaginated: the full record set
    pub fn all() -> Self {
        Self::default()
    }
}

#[async_trait(?Send)]
pub trait PersistenceService {
    /// Commit a new sticker; must atomically enforce minimum separation
    async fn create_placement(&self, request: CreatePlacement)
    -> Result<StoredSticker, ServiceError>;

    /// Replace a note; must verify `owner` against the stored owner
    async fn update_note(
        &self,
        id: StickerId,
        note: &str,
        owner: Option<&DeviceId>,
    ) -> Result<StoredSticker, ServiceError>;

    /// Delete a sticker; same ownership check as `update_note`
    async fn delete_record(&self, id: StickerId, owner: Option<&DeviceId>)
    -> Result<(), ServiceError>;

    /// Records ordered by creation time
    async fn list_records(&self, query: &ListQuery) -> Result<Vec<StoredSticker>, ServiceError>;
}

#[async_trait(?Send)]
impl<P: PersistenceService + ?Sized> PersistenceService for Rc<P> {
    async fn create_placement(
        &self,
        request: CreatePlacement,
    ) -> Result<StoredSticker, ServiceError> {
        (**self).create_placement(request).await
    }

    async fn update_note(
        &self,
        id: StickerId,
        note: &str,
        owner: Option<&DeviceId>,
    ) -> Result<StoredSticker, ServiceError> {
        (**self).update_note(id, note, owner).await
    }

    async fn delete_record(
        &self,
        id: StickerId,
        owner: Option<&DeviceId>,
    ) -> Result<(), ServiceError> {
        (**self).delete_record(id, owner).await
    }

    async fn list_records(&self, query: &ListQuery) -> Result<Vec<StoredSticker>, ServiceError> {
        (**self).list_records(query).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// One change feed notification; deletes carry the last known row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub record: StoredSticker,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, record: StoredSticker) -> Self {
        Self { kind, record }
    }

    #[inline]
    pub fn id(&self) -> StickerId {
        self.record.id
    }
}

/// Source of change notifications, drained by the host's event loop
pub trait ChangeFeed {
    /// Everything delivered since the last poll
    fn poll_changes(&self) -> Vec<ChangeEvent>;
}
