//! Engine settings
//!
//! Loaded from JSON; every field has a default so partial files work.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::*;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Who may read the note text of an unapproved sticker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationPolicy {
    /// When set, unapproved notes are only readable by their owning device
    pub require_approval: bool,
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self {
            require_approval: true,
        }
    }
}

/// Placement engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    // === Geometry ===
    /// Radius of the disc that must fit inside the region
    pub sticker_radius: f32,
    /// Minimum center-to-center distance between stickers
    pub min_separation: f32,

    // === Spot search ===
    /// Total candidates tried before giving up
    pub search_attempts: u32,
    /// Share of attempts jittered around the preferred point (0.0 - 1.0)
    pub jitter_fraction: f32,
    pub jitter_base_radius: f32,
    pub jitter_growth: f32,
    pub jitter_max_radius: f32,
    /// Interpolation steps for pulling an invalid click back inside
    pub nearest_steps: u32,

    // === Placement ===
    /// Total commit attempts for automatic placement
    pub auto_retry_limit: u32,

    // === Policy ===
    /// Hours after creation during which edit/delete is allowed
    pub lock_window_hours: i64,
    /// Maximum note length in characters, after trimming
    pub note_max_chars: usize,
    pub moderation: ModerationPolicy,

    /// Spot search RNG seed (None = seed from OS entropy)
    pub seed: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sticker_radius: STICKER_RADIUS,
            min_separation: MIN_SEPARATION,

            search_attempts: SEARCH_ATTEMPTS,
            jitter_fraction: JITTER_FRACTION,
            jitter_base_radius: JITTER_BASE_RADIUS,
            jitter_growth: JITTER_GROWTH,
            jitter_max_radius: JITTER_MAX_RADIUS,
            nearest_steps: NEAREST_STEPS,

            auto_retry_limit: AUTO_RETRY_LIMIT,

            lock_window_hours: LOCK_WINDOW_HOURS,
            note_max_chars: NOTE_MAX_CHARS,
            moderation: ModerationPolicy::default(),

            seed: None,
        }
    }
}

impl EngineSettings {
    /// Parse and validate settings from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Load settings, falling back to defaults if the file is missing or bad
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                log::warn!("Using default settings ({e})");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(self.sticker_radius > 0.0) {
            return Err(SettingsError::Invalid("sticker_radius must be positive".into()));
        }
        if !(self.min_separation > 0.0) {
            return Err(SettingsError::Invalid("min_separation must be positive".into()));
        }
        if self.search_attempts == 0 || self.auto_retry_limit == 0 || self.nearest_steps == 0 {
            return Err(SettingsError::Invalid(
                "search_attempts, auto_retry_limit and nearest_steps must be non-zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(SettingsError::Invalid("jitter_fraction must be within 0..=1".into()));
        }
        if self.note_max_chars == 0 {
            return Err(SettingsError::Invalid("note_max_chars must be non-zero".into()));
        }
        Ok(())
    }

    /// Edit/delete window as a duration
    pub fn lock_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.lock_window_hours)
    }

    /// Attempts spent jittering near a preferred point
    pub fn jitter_attempts(&self) -> u32 {
        let n = (self.search_attempts as f32 * self.jitter_fraction).round() as u32;
        n.min(self.search_attempts)
    }
}
