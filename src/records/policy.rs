//! Ownership / lock / visibility policy
//!
//! Pure functions of a record, the local device and the clock. Nothing here
//! is cached: derived fields are recomputed on every read so they can't go
//! stale when approval, ownership or moderation settings change.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::record::{DeviceId, StickerRecord};
use crate::settings::ModerationPolicy;

/// Why a sticker may not be edited (or deleted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockReason {
    None,
    /// Own note that has been approved: read-only, still deletable
    Approved,
    /// Edit window elapsed
    Time,
    /// Owned by another device
    Device,
}

impl LockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockReason::None => "none",
            LockReason::Approved => "approved",
            LockReason::Time => "time",
            LockReason::Device => "device",
        }
    }
}

impl fmt::Display for LockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True once more than `window` has elapsed since creation
#[inline]
pub fn window_elapsed(created_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    now.signed_duration_since(created_at) > window
}

/// Resolve the lock reason for `record` as seen from `local`
///
/// Order: own+approved, then foreign owner, then the time window. An approved
/// own note therefore reports `Approved` even after the window, and a note
/// owned by another device always reports `Device`.
pub fn resolve_lock_reason(
    record: &StickerRecord,
    local: &DeviceId,
    now: DateTime<Utc>,
    window: Duration,
) -> LockReason {
    if record.is_owned_by(local) && record.is_approved {
        return LockReason::Approved;
    }
    if record
        .owner_device_id
        .as_ref()
        .is_some_and(|owner| owner != local)
    {
        return LockReason::Device;
    }
    if window_elapsed(record.created_at, now, window) {
        return LockReason::Time;
    }
    LockReason::None
}

/// What the local device may do with a sticker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Permissions {
    pub can_edit: bool,
    pub can_delete: bool,
}

pub fn permissions(
    record: &StickerRecord,
    local: &DeviceId,
    now: DateTime<Utc>,
    window: Duration,
) -> Permissions {
    match resolve_lock_reason(record, local, now, window) {
        LockReason::None => Permissions {
            can_edit: true,
            can_delete: true,
        },
        // Approval freezes the text, not the right to withdraw it
        LockReason::Approved => Permissions {
            can_edit: false,
            can_delete: !window_elapsed(record.created_at, now, window),
        },
        LockReason::Time | LockReason::Device => Permissions {
            can_edit: false,
            can_delete: false,
        },
    }
}

/// Whether the note text is readable locally under the moderation policy
///
/// Existence is never hidden; only the text is.
pub fn can_view(record: &StickerRecord, local: &DeviceId, moderation: ModerationPolicy) -> bool {
    record.is_approved || !moderation.require_approval || record.is_owned_by(local)
}

/// A record together with its derived, never-stored fields
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerView {
    pub record: StickerRecord,
    pub can_view: bool,
    pub lock: LockReason,
    pub permissions: Permissions,
}

impl StickerView {
    pub fn derive(
        record: StickerRecord,
        local: &DeviceId,
        moderation: ModerationPolicy,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Self {
        let can_view = can_view(&record, local, moderation);
        let lock = resolve_lock_reason(&record, local, now, window);
        let permissions = permissions(&record, local, now, window);
        Self {
            record,
            can_view,
            lock,
            permissions,
        }
    }

    /// Note text if readable, None if hidden by moderation
    pub fn visible_note(&self) -> Option<&str> {
        self.can_view.then_some(self.record.note.as_str())
    }
}
