//! Sticker records and identifiers

use std::fmt;

use chrono::{DateTime, Utc};
use glam::Vec2;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::geometry::CanvasSize;

/// Server-assigned sticker id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StickerId(pub i64);

impl fmt::Display for StickerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Client-local id for a placement the server hasn't committed yet
///
/// Never persisted; replaced by a `StickerId` on commit or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TempId(Uuid);

impl TempId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tmp-{}", self.0.simple())
    }
}

/// Opaque client device identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identity for a new device
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Row as the persistence service stores and transmits it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSticker {
    pub id: StickerId,
    pub x_norm: f32,
    pub y_norm: f32,
    pub note: String,
    /// None means no owner constraint
    pub owner_device_id: Option<DeviceId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_approved: bool,
}

/// Committed sticker as held in local state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerRecord {
    pub id: StickerId,
    /// Absolute canvas position
    pub x: f32,
    pub y: f32,
    pub x_norm: f32,
    pub y_norm: f32,
    pub note: String,
    pub owner_device_id: Option<DeviceId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_approved: bool,
}

impl StickerRecord {
    pub fn from_stored(row: StoredSticker, canvas: CanvasSize) -> Self {
        let pos = canvas.denormalize(Vec2::new(row.x_norm, row.y_norm));
        Self {
            id: row.id,
            x: pos.x,
            y: pos.y,
            x_norm: row.x_norm,
            y_norm: row.y_norm,
            note: row.note,
            owner_device_id: row.owner_device_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            is_approved: row.is_approved,
        }
    }

    #[inline]
    pub fn pos(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn is_owned_by(&self, device: &DeviceId) -> bool {
        self.owner_device_id.as_ref() == Some(device)
    }
}

/// Trim and bound-check a note; returns the text that will be stored
pub fn validate_note(note: &str, max_chars: usize) -> Result<String, ValidationError> {
    let trimmed = note.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyNote);
    }
    let len = trimmed.chars().count();
    if len > max_chars {
        return Err(ValidationError::NoteTooLong {
            len,
            max: max_chars,
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_note_bounds() {
        assert_eq!(validate_note("   ", 1000), Err(ValidationError::EmptyNote));
        assert_eq!(validate_note("", 1000), Err(ValidationError::EmptyNote));
        assert_eq!(validate_note("  hi \n", 1000).unwrap(), "hi");

        let exact = "a".repeat(1000);
        assert_eq!(validate_note(&exact, 1000).unwrap().len(), 1000);

        let over = "a".repeat(1001);
        assert_eq!(
            validate_note(&over, 1000),
            Err(ValidationError::NoteTooLong {
                len: 1001,
                max: 1000
            })
        );
    }

    #[test]
    fn test_note_length_counts_chars_not_bytes() {
        let eagles = "\u{1f985}".repeat(1000);
        assert!(validate_note(&eagles, 1000).is_ok());
    }

    #[test]
    fn test_stored_row_wire_format() {
        let json = r#"{
            "id": 7, "xNorm": 0.25, "yNorm": 0.5, "note": "hi",
            "ownerDeviceId": null,
            "createdAt": "2026-01-01T00:00:00Z", "updatedAt": "2026-01-01T00:00:00Z",
            "isApproved": false
        }"#;
        let row: StoredSticker = serde_json::from_str(json).unwrap();
        assert_eq!(row.id, StickerId(7));
        assert!(row.owner_device_id.is_none());

        let record = StickerRecord::from_stored(row, CanvasSize::new(400.0, 200.0));
        assert_eq!(record.pos(), Vec2::new(100.0, 100.0));
    }
}
