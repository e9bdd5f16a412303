//! Renderer adapter seam
//!
//! The engine never holds DOM or GPU handles. It tells an adapter which
//! sticker nodes exist and where; an SVG-DOM UI and a canvas/WebGL UI each
//! implement `StickerRenderer` and share all placement logic.

pub mod recording;

pub use recording::{RecordingRenderer, RenderCall, RenderLog};

use std::fmt;

use glam::Vec2;

use crate::records::{StickerId, TempId};

/// Identity of a rendered sticker node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderKey {
    /// Local placement not yet committed
    Pending(TempId),
    Committed(StickerId),
}

impl fmt::Display for RenderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderKey::Pending(temp) => write!(f, "{temp}"),
            RenderKey::Committed(id) => write!(f, "{id}"),
        }
    }
}

pub trait StickerRenderer {
    fn create(&mut self, key: RenderKey, pos: Vec2);

    fn update_position(&mut self, key: RenderKey, pos: Vec2);

    /// Release every UI resource tied to the node
    fn remove(&mut self, key: RenderKey);

    fn highlight(&mut self, key: RenderKey, on: bool);

    /// A pending node became a committed one
    fn rekey(&mut self, from: RenderKey, to: RenderKey, pos: Vec2) {
        self.remove(from);
        self.create(to, pos);
    }

    /// Note text or approval changed; re-read it from the engine
    fn content_changed(&mut self, _key: RenderKey) {}

    /// Arrival feedback (sound, burst) for a newly committed sticker
    fn arrival(&mut self, _key: RenderKey) {}
}

/// Renderer that draws nothing (headless engines, servers, tests)
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl StickerRenderer for NullRenderer {
    fn create(&mut self, _key: RenderKey, _pos: Vec2) {}
    fn update_position(&mut self, _key: RenderKey, _pos: Vec2) {}
    fn remove(&mut self, _key: RenderKey) {}
    fn highlight(&mut self, _key: RenderKey, _on: bool) {}
}
