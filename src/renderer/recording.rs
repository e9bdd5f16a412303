//! Renderer that records every call
//!
//! The log handle stays with the caller after the renderer is boxed into an
//! engine, so a host (or a test) can replay what the UI would have drawn.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use glam::Vec2;

use super::{RenderKey, StickerRenderer};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderCall {
    Create(RenderKey, Vec2),
    UpdatePosition(RenderKey, Vec2),
    Remove(RenderKey),
    Highlight(RenderKey, bool),
    Rekey(RenderKey, RenderKey),
    ContentChanged(RenderKey),
    Arrival(RenderKey),
}

/// Shared view of a `RecordingRenderer`'s calls
#[derive(Debug, Clone, Default)]
pub struct RenderLog(Rc<RefCell<Vec<RenderCall>>>);

impl RenderLog {
    pub fn calls(&self) -> Vec<RenderCall> {
        self.0.borrow().clone()
    }

    /// Calls matching a predicate, e.g. every `Remove` of one key
    pub fn count(&self, pred: impl Fn(&RenderCall) -> bool) -> usize {
        self.0.borrow().iter().filter(|c| pred(c)).count()
    }

    /// Nodes alive after replaying the log, with their last position
    pub fn live_nodes(&self) -> BTreeMap<RenderKey, Vec2> {
        let mut nodes = BTreeMap::new();
        for call in self.0.borrow().iter() {
            match *call {
                RenderCall::Create(key, pos) | RenderCall::UpdatePosition(key, pos) => {
                    nodes.insert(key, pos);
                }
                RenderCall::Remove(key) => {
                    nodes.remove(&key);
                }
                RenderCall::Rekey(from, to) => {
                    if let Some(pos) = nodes.remove(&from) {
                        nodes.insert(to, pos);
                    }
                }
                RenderCall::Highlight(..)
                | RenderCall::ContentChanged(_)
                | RenderCall::Arrival(_) => {}
            }
        }
        nodes
    }

    fn push(&self, call: RenderCall) {
        self.0.borrow_mut().push(call);
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    log: RenderLog,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that keeps reading the log after the renderer is moved
    pub fn log(&self) -> RenderLog {
        self.log.clone()
    }
}

impl StickerRenderer for RecordingRenderer {
    fn create(&mut self, key: RenderKey, pos: Vec2) {
        self.log.push(RenderCall::Create(key, pos));
    }

    fn update_position(&mut self, key: RenderKey, pos: Vec2) {
        self.log.push(RenderCall::UpdatePosition(key, pos));
    }

    fn remove(&mut self, key: RenderKey) {
        self.log.push(RenderCall::Remove(key));
    }

    fn highlight(&mut self, key: RenderKey, on: bool) {
        self.log.push(RenderCall::Highlight(key, on));
    }

    fn rekey(&mut self, from: RenderKey, to: RenderKey, _pos: Vec2) {
        self.log.push(RenderCall::Rekey(from, to));
    }

    fn content_changed(&mut self, key: RenderKey) {
        self.log.push(RenderCall::ContentChanged(key));
    }

    fn arrival(&mut self, key: RenderKey) {
        self.log.push(RenderCall::Arrival(key));
    }
}
