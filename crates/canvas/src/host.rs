//! Engine facade tying the sub-systems to one surface lifecycle.
//!
//! The host is constructed exactly once per surface. It drives a small
//! phase machine (idle, loading, ready, torn down); pointer input and
//! store results are routed only while ready, and teardown unwinds the
//! sub-systems in reverse mount order before the handle goes inert.

use std::time::{Duration, Instant};

use shared::{EntityKind, EntityLocationUpdate, MapFeature, MapLayer, ViewState};

use crate::compositor::LayerCompositor;
use crate::draw::{DrawController, DrawMode, DrawOutcome, DrawPlugin, FeatureDraft};
use crate::entities::{EntityEvent, EntityLayerManager};
use crate::geo;
use crate::input::{InteractionCtx, PointerEvent};
use crate::persist::PersistenceBridge;
use crate::store::{CommandSender, StoreCommand, StoreEvent};
use crate::surface::{CameraPose, ScreenPoint, SurfaceHandle};

/// How long the surface gets to fire its load notification
pub const LOAD_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    Loading,
    Ready,
    TornDown,
}

/// Camera summary for the status bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraReport {
    pub pose: CameraPose,
    pub eye_altitude_ft: Option<f64>,
    pub viewport_height_ft: Option<f64>,
}

/// Engine output drained by the hosting UI once per frame
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasEvent {
    Loaded,
    LoadFailed { error: String },
    DraftOpened(FeatureDraft),
    InspectEntity { at: ScreenPoint, title: String, subtitle: String },
    ViewLoaded(ViewState),
    WriteFailed { message: String },
}

pub struct MapEngineHost<P: DrawPlugin + Default> {
    surface: SurfaceHandle,
    tx: CommandSender,
    phase: EnginePhase,
    editing: bool,
    compositor: LayerCompositor,
    entity_layers: EntityLayerManager,
    draw: DrawController<P>,
    bridge: PersistenceBridge,
    layers: Vec<MapLayer>,
    features: Vec<MapFeature>,
    entities: Vec<shared::EntityPoint>,
    load_deadline: Option<Instant>,
    deadline_extended: bool,
    events: Vec<CanvasEvent>,
}

impl<P: DrawPlugin + Default> MapEngineHost<P> {
    pub fn new(surface: SurfaceHandle, tx: CommandSender) -> Self {
        Self {
            surface,
            tx: tx.clone(),
            phase: EnginePhase::Idle,
            editing: false,
            compositor: LayerCompositor::new(),
            entity_layers: EntityLayerManager::new(),
            draw: DrawController::new(tx.clone()),
            bridge: PersistenceBridge::new(tx),
            layers: Vec::new(),
            features: Vec::new(),
            entities: Vec::new(),
            load_deadline: None,
            deadline_extended: false,
            events: Vec::new(),
        }
    }

    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn draw_mode(&self) -> DrawMode {
        self.draw.mode()
    }

    pub fn layers(&self) -> &[MapLayer] {
        &self.layers
    }

    pub fn entities(&self) -> &[shared::EntityPoint] {
        &self.entities
    }

    pub fn draft(&self) -> Option<&FeatureDraft> {
        self.draw.draft()
    }

    /// True while edits sit in the debounce queue
    pub fn has_unsaved_edits(&self) -> bool {
        self.bridge.has_pending()
    }

    /// Kick off loading. Calling this a second time is a no-op; the engine
    /// binds to one surface for its whole life.
    pub fn construct(&mut self, now: Instant) {
        if self.phase != EnginePhase::Idle {
            tracing::warn!(phase = ?self.phase, "construct called twice, ignoring");
            return;
        }
        self.phase = EnginePhase::Loading;
        self.load_deadline = Some(now + LOAD_DEADLINE);
        for cmd in [
            StoreCommand::LoadLayers,
            StoreCommand::LoadFeatures,
            StoreCommand::LoadEntities,
            StoreCommand::LoadView,
        ] {
            let _ = self.tx.send(cmd);
        }
    }

    /// The surface finished loading its style; mount everything
    pub fn notify_surface_loaded(&mut self, now: Instant) {
        if self.phase != EnginePhase::Loading {
            return;
        }
        self.phase = EnginePhase::Ready;
        self.load_deadline = None;
        self.entity_layers.mount(&self.surface);
        self.apply_entities();
        self.compositor.compose(&self.surface, &self.layers);
        let mut outcomes = Vec::new();
        self.draw.reseed(
            &self.surface,
            self.features.clone(),
            &mut self.bridge,
            now,
            &mut outcomes,
        );
        if self.editing {
            self.draw
                .enable(&self.surface, P::default(), &mut self.bridge, now, &mut outcomes);
        }
        self.collect(outcomes);
        self.events.push(CanvasEvent::Loaded);
    }

    /// Per-frame housekeeping: flush due edits, watch the load deadline
    pub fn tick(&mut self, now: Instant) {
        match self.phase {
            EnginePhase::Ready => self.bridge.tick(now),
            EnginePhase::Loading => {
                let Some(deadline) = self.load_deadline else {
                    return;
                };
                if now < deadline {
                    return;
                }
                // probe the surface before declaring the load dead; a slow
                // style fetch gets exactly one extension
                let responsive =
                    self.surface.camera().is_some() && self.surface.viewport_px().0 > 0.0;
                if responsive && !self.deadline_extended {
                    self.deadline_extended = true;
                    self.load_deadline = Some(now + LOAD_DEADLINE);
                    tracing::warn!("surface load is slow but responsive, extending deadline");
                } else {
                    self.load_deadline = None;
                    tracing::error!("surface never reported loaded");
                    self.events.push(CanvasEvent::LoadFailed {
                        error: "map surface did not finish loading".to_string(),
                    });
                }
            }
            EnginePhase::Idle | EnginePhase::TornDown => {}
        }
    }

    /// Route one backend result into the sub-systems
    pub fn handle_store_event(&mut self, event: StoreEvent, now: Instant) {
        if self.phase == EnginePhase::TornDown {
            return;
        }
        match event {
            StoreEvent::Layers(layers) => {
                self.layers = layers;
                if self.phase == EnginePhase::Ready {
                    self.compositor.compose(&self.surface, &self.layers);
                }
            }
            StoreEvent::Features(features) => {
                self.features = features;
                if self.phase == EnginePhase::Ready {
                    let mut outcomes = Vec::new();
                    self.draw.reseed(
                        &self.surface,
                        self.features.clone(),
                        &mut self.bridge,
                        now,
                        &mut outcomes,
                    );
                    self.collect(outcomes);
                }
            }
            StoreEvent::Entities(entities) => {
                self.entities = entities;
                if self.phase == EnginePhase::Ready {
                    self.apply_entities();
                }
            }
            StoreEvent::View(view) => self.events.push(CanvasEvent::ViewLoaded(view)),
            StoreEvent::FeatureCreated { local_id, id } => {
                self.draw.attach_backend_id(&self.surface, &local_id, id);
            }
            StoreEvent::FeatureCreateFailed { local_id, error } => {
                tracing::warn!(%local_id, %error, "markup create failed");
                self.events.push(CanvasEvent::WriteFailed {
                    message: format!("could not save new markup: {error}"),
                });
            }
            StoreEvent::FeatureWriteFailed { id, error } => {
                tracing::warn!(id, %error, "markup write failed");
                self.events.push(CanvasEvent::WriteFailed {
                    message: format!("could not save markup {id}: {error}"),
                });
            }
            StoreEvent::WriteFailed { what, error } => {
                tracing::warn!(what, %error, "write failed");
                self.events.push(CanvasEvent::WriteFailed {
                    message: format!("{what}: {error}"),
                });
            }
            StoreEvent::LoadFailed { what, error } => {
                tracing::warn!(what, %error, "load failed");
                self.events.push(CanvasEvent::LoadFailed {
                    error: format!("{what}: {error}"),
                });
            }
        }
    }

    /// Route one pointer event: drawing first, then entity interaction.
    /// Returns true when the event was consumed.
    pub fn pointer(&mut self, event: PointerEvent, now: Instant) -> bool {
        if self.phase != EnginePhase::Ready {
            return false;
        }
        if self.editing {
            let mut outcomes = Vec::new();
            let consumed =
                self.draw
                    .pointer(&self.surface, event, &mut self.bridge, now, &mut outcomes);
            self.collect(outcomes);
            if consumed {
                return true;
            }
        }
        let ctx = InteractionCtx {
            editing: self.editing,
            placement_active: matches!(
                self.draw.mode(),
                DrawMode::DrawPoint | DrawMode::DrawLine | DrawMode::DrawPolygon
            ),
            draw_neutral: self.draw.neutral(),
        };
        let mut entity_events = Vec::new();
        let consumed = self
            .entity_layers
            .on_pointer(&self.surface, event, &ctx, &mut entity_events);
        for ev in entity_events {
            match ev {
                EntityEvent::Inspect { at, title, subtitle } => {
                    self.events.push(CanvasEvent::InspectEntity { at, title, subtitle });
                }
                EntityEvent::Relocated { kind, id, lng, lat } => {
                    let update = match kind {
                        EntityKind::Node => EntityLocationUpdate {
                            node_id: Some(id),
                            sensor_id: None,
                            lng,
                            lat,
                        },
                        EntityKind::Sensor => EntityLocationUpdate {
                            node_id: None,
                            sensor_id: Some(id),
                            lng,
                            lat,
                        },
                    };
                    self.bridge.relocate(update);
                }
            }
        }
        consumed
    }

    /// Toggle markup editing. Revoking mid-gesture cancels any entity drag
    /// and flushes queued edits before the plugin is dropped.
    pub fn set_editing(&mut self, enabled: bool, now: Instant) {
        if self.editing == enabled {
            return;
        }
        self.editing = enabled;
        if self.phase != EnginePhase::Ready {
            return;
        }
        if enabled {
            let mut outcomes = Vec::new();
            self.draw
                .enable(&self.surface, P::default(), &mut self.bridge, now, &mut outcomes);
            self.collect(outcomes);
        } else {
            self.entity_layers.cancel_drag(&self.surface);
            self.draw.disable(&self.surface, &mut self.bridge);
        }
    }

    pub fn set_draw_mode(&mut self, mode: DrawMode) {
        self.draw.set_mode(mode);
    }

    pub fn confirm_draft(&mut self, properties: shared::FeatureProperties) {
        self.draw.confirm_draft(&self.surface, properties);
    }

    pub fn cancel_draft(&mut self) {
        self.draw.cancel_draft(&self.surface);
    }

    pub fn update_layer(&mut self, id: shared::BackendId, patch: shared::MapLayerPatch) {
        // optimistic local apply so the imagery reacts this frame
        if let Some(layer) = self.layers.iter_mut().find(|l| l.id == id) {
            if let Some(enabled) = patch.enabled {
                layer.enabled = enabled;
            }
            if let Some(opacity) = patch.opacity {
                layer.opacity = opacity;
            }
            if let Some(z_index) = patch.z_index {
                layer.z_index = z_index;
            }
        }
        if self.phase == EnginePhase::Ready {
            self.compositor.compose(&self.surface, &self.layers);
        }
        let _ = self.tx.send(StoreCommand::UpdateLayer { id, patch });
    }

    pub fn save_view(&self, view: ViewState) {
        let _ = self.tx.send(StoreCommand::SaveView(view));
    }

    pub fn camera_report(&self) -> Option<CameraReport> {
        let pose = self.surface.camera()?;
        let (_, height_px) = self.surface.viewport_px();
        Some(CameraReport {
            pose,
            eye_altitude_ft: geo::eye_altitude_feet(&pose, height_px),
            viewport_height_ft: geo::viewport_height_feet(&self.surface),
        })
    }

    pub fn drain_events(&mut self) -> Vec<CanvasEvent> {
        std::mem::take(&mut self.events)
    }

    /// Unwind in reverse mount order, then render the handle inert so any
    /// callback still in flight hits a dead surface instead of a freed one.
    pub fn teardown(&mut self) {
        if self.phase == EnginePhase::TornDown {
            return;
        }
        tracing::debug!("engine teardown: discarding pending edits");
        self.bridge.discard();
        tracing::debug!("engine teardown: removing markup layers");
        self.draw.teardown(&self.surface);
        tracing::debug!("engine teardown: removing entity layers");
        self.entity_layers.teardown(&self.surface);
        tracing::debug!("engine teardown: clearing imagery stack");
        self.compositor.clear(&self.surface);
        self.surface.unmount();
        self.phase = EnginePhase::TornDown;
    }

    fn apply_entities(&mut self) {
        let nodes = self
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::Node)
            .cloned()
            .collect();
        let sensors = self
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::Sensor)
            .cloned()
            .collect();
        self.entity_layers.set_data(&self.surface, nodes, sensors);
    }

    fn collect(&mut self, outcomes: Vec<DrawOutcome>) {
        for outcome in outcomes {
            match outcome {
                DrawOutcome::DraftOpened(draft) => {
                    self.events.push(CanvasEvent::DraftOpened(draft));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::freehand::FreehandDraw;
    use crate::store::{command_channel, CommandReceiver};
    use crate::surface::RenderSurface;
    use crate::testutil::{recording_surface, RecordingSurface};
    use shared::{EntityPoint, FeatureProperties, Geometry, LayerKind, SourceType};
    use std::sync::{Arc, Mutex};

    struct Fixture {
        host: MapEngineHost<FreehandDraw>,
        surface: Arc<Mutex<RecordingSurface>>,
        rx: CommandReceiver,
    }

    fn fixture() -> Fixture {
        let (surface, handle) = recording_surface();
        let (tx, rx) = command_channel();
        Fixture {
            host: MapEngineHost::new(handle, tx),
            surface,
            rx,
        }
    }

    fn drain(rx: &mut CommandReceiver) -> Vec<StoreCommand> {
        let mut v = Vec::new();
        while let Ok(c) = rx.try_recv() {
            v.push(c);
        }
        v
    }

    fn ready_host() -> (Fixture, Instant) {
        let mut fx = fixture();
        let now = Instant::now();
        fx.host.construct(now);
        fx.host.notify_surface_loaded(now);
        drain(&mut fx.rx);
        fx.host.drain_events();
        (fx, now)
    }

    fn base_layer(id: i64) -> MapLayer {
        MapLayer {
            id,
            system_key: None,
            name: format!("layer {id}"),
            kind: LayerKind::Base,
            source_type: SourceType::Xyz,
            config: serde_json::json!({ "url_template": "https://tiles.test/{z}/{x}/{y}.png" }),
            opacity: 1.0,
            enabled: true,
            z_index: 0,
        }
    }

    fn node(id: &str, lng: f64, lat: f64) -> EntityPoint {
        EntityPoint {
            kind: EntityKind::Node,
            id: id.to_string(),
            name: format!("node {id}"),
            status_line: "online".to_string(),
            lng,
            lat,
        }
    }

    #[test]
    fn test_construct_is_once_only() {
        let mut fx = fixture();
        let now = Instant::now();
        fx.host.construct(now);
        let first = drain(&mut fx.rx);
        assert_eq!(first.len(), 4, "layers, features, entities, view");

        fx.host.construct(now);
        assert!(drain(&mut fx.rx).is_empty(), "second construct is a no-op");
        assert_eq!(fx.host.phase(), EnginePhase::Loading);
    }

    #[test]
    fn test_loaded_event_after_surface_notification() {
        let mut fx = fixture();
        let now = Instant::now();
        fx.host.construct(now);
        assert!(fx.host.drain_events().is_empty());

        fx.host.notify_surface_loaded(now);
        assert_eq!(fx.host.phase(), EnginePhase::Ready);
        assert_eq!(fx.host.drain_events(), vec![CanvasEvent::Loaded]);
        // entity sources are mounted on ready
        assert!(fx.surface.lock().unwrap().has_source(crate::entities::NODE_SOURCE));
    }

    #[test]
    fn test_load_timeout_probes_then_fails() {
        let mut fx = fixture();
        let start = Instant::now();
        fx.host.construct(start);

        // first expiry: surface is responsive, so the deadline extends
        fx.host.tick(start + LOAD_DEADLINE);
        assert!(fx.host.drain_events().is_empty());

        // second expiry: give up
        fx.host.tick(start + LOAD_DEADLINE * 2);
        match fx.host.drain_events().as_slice() {
            [CanvasEvent::LoadFailed { .. }] => {}
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn test_load_timeout_fails_fast_on_dead_surface() {
        let mut fx = fixture();
        let start = Instant::now();
        fx.host.construct(start);
        fx.surface.lock().unwrap().removed = true;

        fx.host.tick(start + LOAD_DEADLINE);
        match fx.host.drain_events().as_slice() {
            [CanvasEvent::LoadFailed { .. }] => {}
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn test_layers_received_while_loading_compose_on_ready() {
        let mut fx = fixture();
        let now = Instant::now();
        fx.host.construct(now);
        fx.host
            .handle_store_event(StoreEvent::Layers(vec![base_layer(1)]), now);
        assert!(!fx.surface.lock().unwrap().has_source("layer-src-1"));

        fx.host.notify_surface_loaded(now);
        assert!(fx.surface.lock().unwrap().has_source("layer-src-1"));
    }

    #[test]
    fn test_teardown_renders_everything_inert() {
        let (mut fx, now) = ready_host();
        fx.host
            .handle_store_event(StoreEvent::Entities(vec![node("n1", 1.0, 1.0)]), now);
        fx.host.teardown();

        {
            let s = fx.surface.lock().unwrap();
            assert!(s.sources.is_empty(), "all engine sources removed");
            assert!(s.layer_order.is_empty(), "all engine layers removed");
        }
        fx.surface.lock().unwrap().clear_ops();

        // late callbacks after teardown must not touch the surface
        fx.host
            .handle_store_event(StoreEvent::Entities(vec![node("n2", 2.0, 2.0)]), now);
        let down = PointerEvent::Down { at: ScreenPoint::new(510.0, 490.0) };
        assert!(!fx.host.pointer(down, now));
        assert!(fx.surface.lock().unwrap().ops.is_empty());
        assert!(fx.host.drain_events().is_empty());

        // teardown is idempotent
        fx.host.teardown();
    }

    #[test]
    fn test_write_failure_is_not_a_load_error() {
        let (mut fx, now) = ready_host();
        fx.host.handle_store_event(
            StoreEvent::WriteFailed { what: "view-save", error: "502 bad gateway".into() },
            now,
        );
        match fx.host.drain_events().as_slice() {
            [CanvasEvent::WriteFailed { message }] => {
                assert!(message.contains("view-save"));
            }
            other => panic!("unexpected events {other:?}"),
        }
        assert_eq!(fx.host.phase(), EnginePhase::Ready);
    }

    #[test]
    fn test_teardown_discards_pending_edits() {
        use crate::persist::PendingUpdate;

        let (mut fx, now) = ready_host();
        fx.host.bridge.queue(
            7,
            PendingUpdate {
                geometry: Geometry::point(9.0, 9.0),
                properties: FeatureProperties::default(),
            },
            now,
        );
        assert!(fx.host.has_unsaved_edits());

        fx.host.teardown();
        assert!(
            !drain(&mut fx.rx)
                .iter()
                .any(|c| matches!(c, StoreCommand::UpdateFeature { .. })),
            "queued edits are dropped, not written"
        );
        assert!(!fx.host.has_unsaved_edits());
    }

    #[test]
    fn test_click_on_node_emits_inspect() {
        let (mut fx, now) = ready_host();
        fx.host
            .handle_store_event(StoreEvent::Entities(vec![node("n1", 1.0, 1.0)]), now);

        let at = fx.surface.lock().unwrap().project(shared::LngLat::new(1.0, 1.0));
        fx.host.pointer(PointerEvent::Down { at }, now);
        fx.host.pointer(PointerEvent::Up { at }, now);

        match fx.host.drain_events().as_slice() {
            [CanvasEvent::InspectEntity { title, .. }] => assert_eq!(title, "node n1"),
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn test_drag_relocate_reaches_store_once() {
        let (mut fx, now) = ready_host();
        fx.host.set_editing(true, now);
        fx.host
            .handle_store_event(StoreEvent::Entities(vec![node("n1", 1.0, 1.0)]), now);
        drain(&mut fx.rx);

        let project = |lng: f64, lat: f64| {
            fx.surface.lock().unwrap().project(shared::LngLat::new(lng, lat))
        };
        let start = project(1.0, 1.0);
        fx.host.pointer(PointerEvent::Down { at: start }, now);
        fx.host.pointer(PointerEvent::Move { at: project(4.0, 1.0) }, now);
        fx.host.pointer(PointerEvent::Move { at: project(6.0, 3.0) }, now);
        fx.host.pointer(PointerEvent::Up { at: project(6.0, 3.0) }, now);

        let relocates: Vec<_> = drain(&mut fx.rx)
            .into_iter()
            .filter(|c| matches!(c, StoreCommand::UpsertLocation(_)))
            .collect();
        match relocates.as_slice() {
            [StoreCommand::UpsertLocation(update)] => {
                assert_eq!(update.node_id.as_deref(), Some("n1"));
                assert_eq!((update.lng, update.lat), (6.0, 3.0));
            }
            other => panic!("unexpected relocates {other:?}"),
        }
    }

    #[test]
    fn test_revoking_editing_cancels_drag_without_relocate() {
        let (mut fx, now) = ready_host();
        fx.host.set_editing(true, now);
        fx.host
            .handle_store_event(StoreEvent::Entities(vec![node("n1", 1.0, 1.0)]), now);
        drain(&mut fx.rx);

        let at = fx.surface.lock().unwrap().project(shared::LngLat::new(1.0, 1.0));
        fx.host.pointer(PointerEvent::Down { at }, now);
        fx.host.set_editing(false, now);
        fx.host.pointer(
            PointerEvent::Up { at: ScreenPoint::new(at.x + 40.0, at.y) },
            now,
        );

        let cmds = drain(&mut fx.rx);
        assert!(
            !cmds.iter().any(|c| matches!(c, StoreCommand::UpsertLocation(_))),
            "revoked drag must not persist: {cmds:?}"
        );
        assert!(fx.surface.lock().unwrap().pan_enabled);
    }

    #[test]
    fn test_draw_then_confirm_creates_feature() {
        let (mut fx, now) = ready_host();
        fx.host.set_editing(true, now);
        fx.host.set_draw_mode(DrawMode::DrawPoint);

        let at = fx.surface.lock().unwrap().project(shared::LngLat::new(2.0, 2.0));
        assert!(fx.host.pointer(PointerEvent::Down { at }, now));

        let draft = match fx.host.drain_events().as_slice() {
            [CanvasEvent::DraftOpened(d)] => d.clone(),
            other => panic!("unexpected events {other:?}"),
        };
        assert_eq!(draft.properties.kind, "hardware");
        assert_eq!(fx.host.draw_mode(), DrawMode::SimpleSelect);

        fx.host.confirm_draft(FeatureProperties {
            name: "pump 4".into(),
            ..draft.properties.clone()
        });
        let creates: Vec<_> = drain(&mut fx.rx)
            .into_iter()
            .filter(|c| matches!(c, StoreCommand::CreateFeature { .. }))
            .collect();
        match creates.as_slice() {
            [StoreCommand::CreateFeature { local_id, geometry, properties }] => {
                assert_eq!(local_id, &draft.local_id);
                assert_eq!(*geometry, Geometry::point(2.0, 2.0));
                assert_eq!(properties.name, "pump 4");
            }
            other => panic!("unexpected creates {other:?}"),
        }

        // backend id comes back and attaches to the drawn feature
        fx.host.handle_store_event(
            StoreEvent::FeatureCreated { local_id: draft.local_id.clone(), id: 99 },
            now,
        );
        fx.host.handle_store_event(
            StoreEvent::Features(vec![MapFeature {
                id: 99,
                geometry: Geometry::point(2.0, 2.0),
                properties: FeatureProperties::default(),
            }]),
            now,
        );
        assert!(drain(&mut fx.rx).is_empty(), "re-seed stays silent");
    }

    #[test]
    fn test_layer_patch_applies_optimistically() {
        let (mut fx, now) = ready_host();
        fx.host
            .handle_store_event(StoreEvent::Layers(vec![base_layer(1)]), now);
        assert!(fx.surface.lock().unwrap().has_layer("layer-1"));

        fx.host.update_layer(
            1,
            shared::MapLayerPatch { enabled: Some(false), ..Default::default() },
        );
        assert!(
            !fx.surface.lock().unwrap().has_layer("layer-1"),
            "disable recomposes immediately"
        );
        match drain(&mut fx.rx).as_slice() {
            [StoreCommand::UpdateLayer { id: 1, patch }] => {
                assert_eq!(patch.enabled, Some(false));
            }
            other => panic!("unexpected commands {other:?}"),
        }
    }

    #[test]
    fn test_camera_report_reads_surface() {
        let (fx, _now) = ready_host();
        fx.surface.lock().unwrap().pose.camera_altitude_m = Some(1000.0);
        let report = fx.host.camera_report().expect("surface mounted");
        let alt = report.eye_altitude_ft.expect("altitude available");
        assert!((alt - 3280.84).abs() < 0.1);
    }
}
