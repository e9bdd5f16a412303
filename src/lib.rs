//! Sticker Wall - spatial placement and concurrency engine
//!
//! Many visitors place short notes ("stickers") inside an irregular region on a
//! shared canvas. This crate is the part that has to be right under concurrency:
//! - `geometry`: Region paths and the disc-inside-region spot validator
//! - `placement`: Collision index, spot search and the placement coordinator
//! - `records`: Sticker records, the state reconciler and the lock policy
//! - `persistence`: Persistence service / change feed seams and an in-memory service
//! - `renderer`: Renderer adapter seam (no DOM or GPU handles leak out of here)
//! - `engine`: `StickerEngine`, the explicit per-client instance tying it together

pub mod engine;
pub mod error;
pub mod geometry;
pub mod persistence;
pub mod placement;
pub mod records;
pub mod renderer;
pub mod settings;

pub use engine::StickerEngine;
pub use error::{EngineError, ValidationError};
pub use geometry::{CanvasSize, Polygon, Region, SpotValidator};
pub use placement::{CollisionIndex, DraftInfo, PlacementPhase, Placed, SpotSearch};
pub use records::{
    DeviceId, LockReason, Permissions, Reconciler, StickerId, StickerRecord, StickerView,
};
pub use settings::{EngineSettings, ModerationPolicy};

/// Engine configuration defaults
pub mod consts {
    /// Radius of the disc a sticker occupies (canvas units)
    pub const STICKER_RADIUS: f32 = 18.0;
    /// Minimum center-to-center distance between two stickers
    pub const MIN_SEPARATION: f32 = 36.0;

    /// Total candidate budget for a spot search
    pub const SEARCH_ATTEMPTS: u32 = 1800;
    /// Share of the budget spent jittering around the preferred point
    pub const JITTER_FRACTION: f32 = 0.15;
    /// Jitter ring radius on the first attempt
    pub const JITTER_BASE_RADIUS: f32 = 12.0;
    /// Jitter ring growth per attempt
    pub const JITTER_GROWTH: f32 = 1.5;
    /// Jitter ring radius cap
    pub const JITTER_MAX_RADIUS: f32 = 240.0;

    /// Interpolation steps when pulling an invalid click back inside
    pub const NEAREST_STEPS: u32 = 20;
    /// Silent retries for automatic placement after a position conflict
    pub const AUTO_RETRY_LIMIT: u32 = 5;

    /// Hours after creation during which a sticker may be edited or deleted
    pub const LOCK_WINDOW_HOURS: i64 = 24;
    /// Maximum note length, in characters, after trimming
    pub const NOTE_MAX_CHARS: usize = 1000;

    /// Above this many stickers the collision index buckets points into a grid
    pub const GRID_THRESHOLD: usize = 2048;
}
