//! Sticker engine
//!
//! One explicit instance per client: it owns the record map (through the
//! reconciler), the device id, the region, settings, the search RNG and the
//! renderer adapter. Several engines can share one persistence service, which
//! is how the integration tests simulate concurrent visitors.
//!
//! Every operation takes `&self`. Mutable state sits in `RefCell`s whose
//! borrows never span an `.await`, so change feed events can be merged while
//! a commit is in flight, as on a single-threaded event loop.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::error::EngineError;
use crate::geometry::{CanvasSize, Region, SpotValidator};
use crate::persistence::{ChangeEvent, ChangeFeed, ListQuery, PersistenceService};
use crate::placement::{CollisionIndex, DraftInfo, PendingPlacement, SpotSearch};
use crate::records::{
    DeviceId, LockReason, MergeOutcome, Permissions, Reconciler, StickerId, StickerRecord,
    StickerView, TempId, can_view, permissions, resolve_lock_reason,
};
use crate::renderer::{NullRenderer, RenderKey, StickerRenderer};
use crate::settings::{EngineSettings, ModerationPolicy};

pub struct StickerEngine<P> {
    pub(crate) service: P,
    pub(crate) validator: SpotValidator,
    pub(crate) settings: EngineSettings,
    moderation: Cell<ModerationPolicy>,
    pub(crate) device_id: DeviceId,
    /// Record map; mutated only through the reconciler's merge functions
    pub(crate) state: RefCell<Reconciler>,
    /// The user's draft placement, if any
    pub(crate) draft: RefCell<Option<PendingPlacement>>,
    /// Automatic placements in flight
    pub(crate) batch: RefCell<BTreeMap<TempId, Vec2>>,
    /// Committed stickers with an edit or delete in flight
    pub(crate) in_flight: RefCell<HashSet<StickerId>>,
    pub(crate) rng: RefCell<Pcg32>,
    pub(crate) renderer: RefCell<Box<dyn StickerRenderer>>,
    highlighted: Cell<Option<StickerId>>,
}

impl<P: PersistenceService> StickerEngine<P> {
    /// Headless engine
    pub fn new(service: P, region: Region, device_id: DeviceId, settings: EngineSettings) -> Self {
        Self::with_renderer(service, region, device_id, settings, Box::new(NullRenderer))
    }

    pub fn with_renderer(
        service: P,
        region: Region,
        device_id: DeviceId,
        settings: EngineSettings,
        renderer: Box<dyn StickerRenderer>,
    ) -> Self {
        let rng = match settings.seed {
            Some(seed) => Pcg32::seed_from_u64(seed),
            None => Pcg32::seed_from_u64(rand::rng().random()),
        };
        let canvas = region.canvas();
        log::info!(
            "Engine for device {device_id} on {}x{} canvas ({} path(s))",
            canvas.width,
            canvas.height,
            region.paths().len()
        );

        Self {
            service,
            validator: SpotValidator::new(region, settings.sticker_radius),
            moderation: Cell::new(settings.moderation),
            settings,
            state: RefCell::new(Reconciler::new(canvas, device_id.clone())),
            device_id,
            draft: RefCell::new(None),
            batch: RefCell::new(BTreeMap::new()),
            in_flight: RefCell::new(HashSet::new()),
            rng: RefCell::new(rng),
            renderer: RefCell::new(renderer),
            highlighted: Cell::new(None),
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn region(&self) -> &Region {
        self.validator.region()
    }

    pub fn canvas(&self) -> CanvasSize {
        self.validator.region().canvas()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn service(&self) -> &P {
        &self.service
    }

    pub fn moderation(&self) -> ModerationPolicy {
        self.moderation.get()
    }

    /// Change the moderation policy; visibility is derived on every read
    ///
    /// Stickers whose text becomes visible or hidden get `content_changed`.
    pub fn set_moderation(&self, policy: ModerationPolicy) {
        let previous = self.moderation.replace(policy);
        log::info!("Moderation: require_approval = {}", policy.require_approval);
        if previous == policy {
            return;
        }

        let flipped: Vec<StickerId> = self
            .state
            .borrow()
            .records()
            .filter(|r| {
                can_view(r, &self.device_id, previous) != can_view(r, &self.device_id, policy)
            })
            .map(|r| r.id)
            .collect();
        let mut renderer = self.renderer.borrow_mut();
        for id in flipped {
            renderer.content_changed(RenderKey::Committed(id));
        }
    }

    // === Reads ===

    fn view(&self, record: StickerRecord) -> StickerView {
        StickerView::derive(
            record,
            &self.device_id,
            self.moderation.get(),
            Utc::now(),
            self.settings.lock_window(),
        )
    }

    pub fn get_record(&self, id: StickerId) -> Option<StickerView> {
        let record = self.state.borrow().get(id).cloned()?;
        Some(self.view(record))
    }

    /// Every committed record, ordered by id
    pub fn all_records(&self) -> Vec<StickerView> {
        let records: Vec<StickerRecord> = self.state.borrow().records().cloned().collect();
        records.into_iter().map(|r| self.view(r)).collect()
    }

    pub fn record_count(&self) -> usize {
        self.state.borrow().len()
    }

    pub fn resolve_lock_reason(&self, record: &StickerRecord) -> LockReason {
        resolve_lock_reason(
            record,
            &self.device_id,
            Utc::now(),
            self.settings.lock_window(),
        )
    }

    pub fn permissions(&self, record: &StickerRecord) -> Permissions {
        permissions(
            record,
            &self.device_id,
            Utc::now(),
            self.settings.lock_window(),
        )
    }

    /// Records whose readable note contains `query` (case-insensitive)
    pub fn search(&self, query: &str) -> Vec<StickerView> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.all_records()
            .into_iter()
            .filter(|view| {
                view.visible_note()
                    .is_some_and(|note| note.to_lowercase().contains(&needle))
            })
            .collect()
    }

    /// Move the highlight to `id`, or clear it
    pub fn highlight(&self, id: Option<StickerId>) -> Result<(), EngineError> {
        if let Some(id) = id {
            if self.state.borrow().get(id).is_none() {
                return Err(EngineError::NotFound(id));
            }
        }
        let previous = self.highlighted.replace(id);
        if previous == id {
            return Ok(());
        }
        let mut renderer = self.renderer.borrow_mut();
        if let Some(prev) = previous {
            renderer.highlight(RenderKey::Committed(prev), false);
        }
        if let Some(id) = id {
            renderer.highlight(RenderKey::Committed(id), true);
        }
        Ok(())
    }

    pub fn highlighted(&self) -> Option<StickerId> {
        self.highlighted.get()
    }

    pub fn draft(&self) -> Option<DraftInfo> {
        self.draft.borrow().as_ref().map(PendingPlacement::info)
    }

    // === Change feed ===

    /// Merge one change feed event and update the renderer
    pub fn apply_change(&self, event: ChangeEvent) -> MergeOutcome {
        let id = event.id();
        let outcome = self.state.borrow_mut().apply_event(event);
        match outcome {
            MergeOutcome::Inserted { own } => {
                self.render_inserted(id);
                // Own writes already got their effects when the commit returned
                if !own {
                    self.renderer
                        .borrow_mut()
                        .arrival(RenderKey::Committed(id));
                }
            }
            MergeOutcome::Refreshed => {
                self.renderer
                    .borrow_mut()
                    .content_changed(RenderKey::Committed(id));
            }
            MergeOutcome::Removed => self.release(id),
            MergeOutcome::Stale
            | MergeOutcome::Parked
            | MergeOutcome::Suppressed
            | MergeOutcome::AlreadyRemoved => {}
        }
        outcome
    }

    /// Drain a change feed; returns the number of events merged
    pub fn pump(&self, feed: &impl ChangeFeed) -> usize {
        let events = feed.poll_changes();
        let count = events.len();
        for event in events {
            self.apply_change(event);
        }
        if count > 0 {
            log::debug!("Merged {count} change event(s)");
        }
        count
    }

    /// Reload the full record set and reconcile it as authoritative
    ///
    /// Returns the number of records held afterwards.
    pub async fn refresh(&self) -> Result<usize, EngineError> {
        let token = self.state.borrow().begin_snapshot();
        let rows = self.service.list_records(&ListQuery::all()).await?;
        let outcome = self.state.borrow_mut().apply_snapshot(token, rows);

        for id in &outcome.inserted {
            self.render_inserted(*id);
        }
        for id in &outcome.refreshed {
            self.renderer
                .borrow_mut()
                .content_changed(RenderKey::Committed(*id));
        }
        for id in &outcome.removed {
            self.release(*id);
        }

        let count = self.record_count();
        log::debug!(
            "Refreshed: {count} record(s), {} new, {} removed",
            outcome.inserted.len(),
            outcome.removed.len()
        );
        Ok(count)
    }

    // === Internals shared with the coordinator ===

    pub(crate) fn render_inserted(&self, id: StickerId) {
        let pos = self.state.borrow().get(id).map(StickerRecord::pos);
        if let Some(pos) = pos {
            self.renderer
                .borrow_mut()
                .create(RenderKey::Committed(id), pos);
        }
    }

    /// Drop the node and highlight of a removed sticker
    pub(crate) fn release(&self, id: StickerId) {
        self.renderer.borrow_mut().remove(RenderKey::Committed(id));
        if self.highlighted.get() == Some(id) {
            self.highlighted.set(None);
        }
    }

    /// Everything a new placement must keep clear of: committed records,
    /// automatic placements in flight and the user's draft, minus `exclude`
    pub(crate) fn obstacles(&self, exclude: Option<TempId>) -> CollisionIndex {
        let state = self.state.borrow();
        let batch = self.batch.borrow();
        let in_flight = batch
            .iter()
            .filter(|(temp, _)| Some(**temp) != exclude)
            .map(|(_, pos)| *pos);
        let draft = self
            .draft
            .borrow()
            .as_ref()
            .filter(|d| Some(d.temp_id) != exclude)
            .map(|d| d.pos);
        CollisionIndex::new(self.settings.min_separation, state.positions().chain(in_flight))
            .with_pending(draft)
    }

    /// Free spot near `preferred`; `rejected` is a point the service just
    /// refused, kept as an obstacle since local state may not show the winner
    pub(crate) fn find_spot(
        &self,
        preferred: Option<Vec2>,
        exclude: Option<TempId>,
        rejected: Option<Vec2>,
    ) -> Option<Vec2> {
        let mut index = self.obstacles(exclude);
        if let Some(pos) = rejected {
            index.insert(pos);
        }
        let search = SpotSearch::new(&self.validator, &index, &self.settings);
        let mut rng = self.rng.borrow_mut();
        search.find_available_spot(preferred, &mut *rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{ChangeKind, InMemoryPersistence, ServerRules};
    use crate::records::StoredSticker;
    use crate::renderer::{RecordingRenderer, RenderCall, RenderLog};
    use chrono::{DateTime, Duration};
    use futures::executor::block_on;
    use std::rc::Rc;

    const CANVAS: CanvasSize = CanvasSize {
        width: 1000.0,
        height: 1000.0,
    };

    fn engine() -> (StickerEngine<Rc<InMemoryPersistence>>, RenderLog) {
        let server = InMemoryPersistence::shared(ServerRules::new(CANVAS, 36.0));
        let renderer = RecordingRenderer::new();
        let log = renderer.log();
        let settings = EngineSettings {
            seed: Some(7),
            ..EngineSettings::default()
        };
        let engine = StickerEngine::with_renderer(
            server,
            Region::rect(CANVAS, Vec2::ZERO, Vec2::splat(1000.0)),
            DeviceId::new("me"),
            settings,
            Box::new(renderer),
        );
        (engine, log)
    }

    fn row(id: i64, note: &str, owner: &str, approved: bool) -> StoredSticker {
        let now: DateTime<Utc> = Utc::now();
        StoredSticker {
            id: StickerId(id),
            x_norm: 0.05 * id as f32,
            y_norm: 0.5,
            note: note.into(),
            owner_device_id: Some(DeviceId::new(owner)),
            created_at: now - Duration::minutes(5),
            updated_at: now - Duration::minutes(5),
            is_approved: approved,
        }
    }

    fn event(kind: ChangeKind, r: StoredSticker) -> ChangeEvent {
        ChangeEvent::new(kind, r)
    }

    #[test]
    fn test_remote_create_plays_arrival_own_does_not() {
        let (engine, log) = engine();
        engine.apply_change(event(ChangeKind::Create, row(1, "theirs", "other", true)));
        engine.apply_change(event(ChangeKind::Create, row(2, "mine", "me", false)));

        let first = RenderKey::Committed(StickerId(1));
        let second = RenderKey::Committed(StickerId(2));
        assert_eq!(log.count(|c| *c == RenderCall::Arrival(first)), 1);
        assert_eq!(log.count(|c| *c == RenderCall::Arrival(second)), 0);
        // Both are still drawn
        assert_eq!(log.live_nodes().len(), 2);
        assert_eq!(engine.record_count(), 2);
    }

    #[test]
    fn test_duplicate_delete_releases_once() {
        let (engine, log) = engine();
        let r = row(1, "x", "other", true);
        engine.apply_change(event(ChangeKind::Create, r.clone()));
        engine.highlight(Some(StickerId(1))).unwrap();

        assert_eq!(
            engine.apply_change(event(ChangeKind::Delete, r.clone())),
            MergeOutcome::Removed
        );
        assert_eq!(
            engine.apply_change(event(ChangeKind::Delete, r)),
            MergeOutcome::AlreadyRemoved
        );

        let key = RenderKey::Committed(StickerId(1));
        assert_eq!(log.count(|c| *c == RenderCall::Remove(key)), 1);
        assert_eq!(engine.highlighted(), None);
        assert!(log.live_nodes().is_empty());
    }

    #[test]
    fn test_moderation_hides_text_not_existence() {
        let (engine, _) = engine();
        engine.apply_change(event(ChangeKind::Create, row(1, "secret plan", "other", false)));
        engine.apply_change(event(ChangeKind::Create, row(2, "my plan", "me", false)));

        assert_eq!(engine.all_records().len(), 2);
        let hidden = engine.get_record(StickerId(1)).unwrap();
        assert!(!hidden.can_view);
        assert_eq!(hidden.visible_note(), None);

        let found: Vec<i64> = engine.search("PLAN").iter().map(|v| v.record.id.0).collect();
        assert_eq!(found, vec![2]);

        engine.set_moderation(ModerationPolicy {
            require_approval: false,
        });
        assert!(engine.get_record(StickerId(1)).unwrap().can_view);
        assert_eq!(engine.search("plan").len(), 2);
    }

    #[test]
    fn test_moderation_change_notifies_flipped_stickers() {
        let (engine, log) = engine();
        engine.apply_change(event(ChangeKind::Create, row(1, "pending", "other", false)));
        engine.apply_change(event(ChangeKind::Create, row(2, "mine", "me", false)));
        engine.apply_change(event(ChangeKind::Create, row(3, "approved", "other", true)));

        let changed = |log: &RenderLog| {
            log.calls()
                .into_iter()
                .filter_map(|c| match c {
                    RenderCall::ContentChanged(key) => Some(key),
                    _ => None,
                })
                .collect::<Vec<_>>()
        };

        engine.set_moderation(ModerationPolicy {
            require_approval: false,
        });
        // Only the foreign unapproved note changes visibility
        assert_eq!(changed(&log), vec![RenderKey::Committed(StickerId(1))]);

        // Same policy again is a no-op
        engine.set_moderation(ModerationPolicy {
            require_approval: false,
        });
        assert_eq!(changed(&log).len(), 1);

        engine.set_moderation(ModerationPolicy {
            require_approval: true,
        });
        assert_eq!(changed(&log).len(), 2);
    }

    #[test]
    fn test_approval_update_refreshes_view() {
        let (engine, log) = engine();
        let mut r = row(1, "hello", "other", false);
        engine.apply_change(event(ChangeKind::Create, r.clone()));
        assert!(!engine.get_record(StickerId(1)).unwrap().can_view);

        r.is_approved = true;
        r.updated_at += Duration::seconds(1);
        engine.apply_change(event(ChangeKind::Update, r));
        assert!(engine.get_record(StickerId(1)).unwrap().can_view);
        assert_eq!(
            log.count(|c| *c == RenderCall::ContentChanged(RenderKey::Committed(StickerId(1)))),
            1
        );
    }

    #[test]
    fn test_highlight_unknown_is_not_found() {
        let (engine, _) = engine();
        assert_eq!(
            engine.highlight(Some(StickerId(9))),
            Err(EngineError::NotFound(StickerId(9)))
        );
        assert!(engine.highlight(None).is_ok());
    }

    #[test]
    fn test_refresh_prunes_remote_deletes() {
        let (engine, log) = engine();
        let server = Rc::clone(engine.service());
        server.insert_row(row(1, "a", "other", true));
        server.insert_row(row(2, "b", "other", true));
        assert_eq!(block_on(engine.refresh()).unwrap(), 2);

        // Deleted elsewhere while this client wasn't listening
        block_on(server.delete_record(StickerId(1), Some(&DeviceId::new("other")))).unwrap();
        assert_eq!(block_on(engine.refresh()).unwrap(), 1);
        assert!(engine.get_record(StickerId(1)).is_none());
        assert_eq!(
            log.live_nodes().keys().copied().collect::<Vec<_>>(),
            vec![RenderKey::Committed(StickerId(2))]
        );
    }

    #[test]
    fn test_pump_drains_feed() {
        let (engine, _) = engine();
        let server = Rc::clone(engine.service());
        let feed = InMemoryPersistence::subscribe(&server);

        let other = StickerEngine::new(
            Rc::clone(&server),
            Region::rect(CANVAS, Vec2::ZERO, Vec2::splat(1000.0)),
            DeviceId::new("other"),
            EngineSettings::default(),
        );
        block_on(other.attempt_placement(Vec2::new(300.0, 300.0), "hi")).unwrap();

        assert_eq!(engine.pump(&feed), 1);
        assert_eq!(engine.pump(&feed), 0);
        assert_eq!(engine.record_count(), 1);
    }

    #[test]
    fn test_lock_reason_accessor() {
        let (engine, _) = engine();
        let mut r = row(1, "x", "me", true);
        r.created_at = Utc::now() - Duration::hours(48);
        engine.apply_change(event(ChangeKind::Create, r));
        let view = engine.get_record(StickerId(1)).unwrap();
        assert_eq!(engine.resolve_lock_reason(&view.record), LockReason::Approved);
        assert_eq!(
            engine.permissions(&view.record),
            Permissions {
                can_edit: false,
                can_delete: false
            }
        );
    }
}
