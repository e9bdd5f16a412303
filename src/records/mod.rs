//! Sticker records, reconciliation and policy

pub mod policy;
pub mod reconciler;
pub mod record;

pub use policy::{
    LockReason, Permissions, StickerView, can_view, permissions, resolve_lock_reason,
};
pub use reconciler::{MergeOutcome, Reconciler, SnapshotOutcome, SnapshotToken};
pub use record::{DeviceId, StickerId, StickerRecord, StoredSticker, TempId, validate_note};
