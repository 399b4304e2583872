//! Freehand markup: a controller reducing the drawing plugin's event
//! stream, keeping plugin-local ids in sync with backend ids and guarding
//! against feedback loops when the plugin is re-seeded programmatically.

pub mod freehand;

use std::time::Instant;

use serde_json::Value as JsonValue;
use shared::{BackendId, FeatureProperties, Geometry, MapFeature};
use thiserror::Error;

use crate::input::PointerEvent;
use crate::persist::{PendingUpdate, PersistenceBridge};
use crate::store::{CommandSender, StoreCommand};
use crate::surface::{LayerSpec, ScreenPoint, SourceSpec, SurfaceFeature, SurfaceHandle};

pub const MARKUP_SOURCE: &str = "markup";
pub const MARKUP_STATIC_SOURCE: &str = "markup-static";

/// Lowest style layer of each markup set (`{source}-fill` from
/// [`mount_markup_layers`]); the compositor keeps imagery beneath these.
pub const MARKUP_FILL_LAYER: &str = "markup-fill";
pub const MARKUP_STATIC_FILL_LAYER: &str = "markup-static-fill";

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("draw plugin rejected collection: {0}")]
    Seed(String),
}

/// Plugin tool modes. `SimpleSelect` is the neutral mode every gesture
/// returns to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawMode {
    #[default]
    SimpleSelect,
    DirectSelect,
    DrawPoint,
    DrawLine,
    DrawPolygon,
    Static,
}

impl DrawMode {
    pub fn is_neutral(self) -> bool {
        matches!(self, DrawMode::SimpleSelect)
    }

    /// Geometry updates are only trusted outside of an active draw
    pub fn accepts_updates(self) -> bool {
        matches!(self, DrawMode::SimpleSelect | DrawMode::DirectSelect)
    }
}

/// Tagged event stream from the plugin, consumed by one reducer
#[derive(Debug, Clone, PartialEq)]
pub enum DrawEvent {
    Created { local_id: String, geometry: Geometry },
    Updated { local_id: String, geometry: Geometry },
    Deleted { local_id: String },
    ModeChanged(DrawMode),
    Click { at: ScreenPoint },
}

/// A feature as the plugin tracks it
#[derive(Debug, Clone, PartialEq)]
pub struct PluginFeature {
    pub local_id: String,
    pub backend_id: Option<BackendId>,
    pub geometry: Geometry,
    pub properties: FeatureProperties,
}

/// Pointer routing result from the plugin
#[derive(Debug, Clone, Default)]
pub struct PluginResponse {
    pub events: Vec<DrawEvent>,
    pub consumed: bool,
}

/// The stateful vector-drawing plugin wrapped by [`DrawController`].
///
/// `set_collection` may synchronously emit events (real plugins fire their
/// change callbacks on programmatic edits); the controller routes those
/// through its reentrancy guard so re-seeding never reaches the backend.
pub trait DrawPlugin {
    fn set_collection(&mut self, features: Vec<PluginFeature>) -> Result<Vec<DrawEvent>, PluginError>;
    fn collection(&self) -> Vec<PluginFeature>;
    fn feature(&self, local_id: &str) -> Option<PluginFeature>;
    fn change_mode(&mut self, mode: DrawMode);
    fn mode(&self) -> DrawMode;
    fn remove(&mut self, local_id: &str);
    fn set_backend_id(&mut self, local_id: &str, id: BackendId);
    fn set_properties(&mut self, local_id: &str, properties: &FeatureProperties);

    fn on_pointer(&mut self, _surface: &SurfaceHandle, _event: PointerEvent) -> PluginResponse {
        PluginResponse::default()
    }
}

/// An in-flight editor draft: not backend-durable until confirmed
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDraft {
    pub local_id: String,
    pub backend_id: Option<BackendId>,
    pub geometry: Geometry,
    pub properties: FeatureProperties,
}

/// Outcomes surfaced to the hosting UI
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOutcome {
    DraftOpened(FeatureDraft),
}

pub struct DrawController<P: DrawPlugin> {
    tx: CommandSender,
    plugin: Option<P>,
    /// Suppresses the reducer while the plugin is being re-seeded
    reseeding: bool,
    markup_mounted: bool,
    static_mounted: bool,
    features: Vec<MapFeature>,
    draft: Option<FeatureDraft>,
}

impl<P: DrawPlugin> DrawController<P> {
    pub fn new(tx: CommandSender) -> Self {
        Self {
            tx,
            plugin: None,
            reseeding: false,
            markup_mounted: false,
            static_mounted: false,
            features: Vec::new(),
            draft: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.plugin.is_some()
    }

    /// True when no draw gesture is in progress (gates entity drags)
    pub fn neutral(&self) -> bool {
        self.plugin.as_ref().map_or(true, |p| p.mode().is_neutral())
    }

    pub fn mode(&self) -> DrawMode {
        self.plugin.as_ref().map_or(DrawMode::Static, DrawPlugin::mode)
    }

    pub fn set_mode(&mut self, mode: DrawMode) {
        if let Some(plugin) = &mut self.plugin {
            plugin.change_mode(mode);
        }
    }

    pub fn draft(&self) -> Option<&FeatureDraft> {
        self.draft.as_ref()
    }

    /// Switch into editing: instantiate the plugin and seed it
    pub fn enable(
        &mut self,
        surface: &SurfaceHandle,
        plugin: P,
        bridge: &mut PersistenceBridge,
        now: Instant,
        out: &mut Vec<DrawOutcome>,
    ) {
        self.unmount_static(surface);
        self.mount_markup(surface);
        self.plugin = Some(plugin);
        self.seed_plugin(surface, bridge, now, out);
    }

    /// Leave editing: flush what is queued, drop the plugin, and fall back
    /// to the static read-only rendering.
    pub fn disable(&mut self, surface: &SurfaceHandle, bridge: &mut PersistenceBridge) {
        bridge.flush_now();
        self.plugin = None;
        self.draft = None;
        self.unmount_markup(surface);
        self.render_static(surface);
    }

    /// The backend markup collection changed externally: reset the plugin
    /// (or static rendering) to match. Silent by construction — the
    /// reentrancy flag drops any events the plugin fires back.
    pub fn reseed(
        &mut self,
        surface: &SurfaceHandle,
        features: Vec<MapFeature>,
        bridge: &mut PersistenceBridge,
        now: Instant,
        out: &mut Vec<DrawOutcome>,
    ) {
        self.features = features;
        if self.plugin.is_some() {
            self.seed_plugin(surface, bridge, now, out);
        } else {
            self.render_static(surface);
        }
    }

    fn seed_plugin(
        &mut self,
        surface: &SurfaceHandle,
        bridge: &mut PersistenceBridge,
        now: Instant,
        out: &mut Vec<DrawOutcome>,
    ) {
        let seeded: Vec<PluginFeature> = self.features.iter().map(plugin_feature).collect();
        let Some(plugin) = &mut self.plugin else {
            return;
        };
        self.reseeding = true;
        let result = plugin.set_collection(seeded);
        match result {
            Ok(echoed) => {
                for event in echoed {
                    self.handle(surface, event, bridge, now, out);
                }
                self.reseeding = false;
                self.sync_render(surface);
            }
            Err(err) => {
                self.reseeding = false;
                tracing::error!("draw plugin re-seed failed, falling back to static markup: {err}");
                // queued geometry came from a plugin that just misbehaved
                bridge.discard();
                self.plugin = None;
                self.unmount_markup(surface);
                self.render_static(surface);
            }
        }
    }

    /// Route a pointer event into the plugin and reduce what comes back
    pub fn pointer(
        &mut self,
        surface: &SurfaceHandle,
        event: PointerEvent,
        bridge: &mut PersistenceBridge,
        now: Instant,
        out: &mut Vec<DrawOutcome>,
    ) -> bool {
        let Some(plugin) = &mut self.plugin else {
            return false;
        };
        let response = plugin.on_pointer(surface, event);
        let consumed = response.consumed;
        for ev in response.events {
            self.handle(surface, ev, bridge, now, out);
        }
        consumed
    }

    /// The single reducer over plugin events
    pub fn handle(
        &mut self,
        surface: &SurfaceHandle,
        event: DrawEvent,
        bridge: &mut PersistenceBridge,
        now: Instant,
        out: &mut Vec<DrawOutcome>,
    ) {
        if self.reseeding {
            return;
        }
        match event {
            DrawEvent::Created { local_id, geometry } => {
                let properties = default_properties(&geometry);
                let draft = FeatureDraft {
                    local_id,
                    backend_id: None,
                    geometry,
                    properties,
                };
                // back to neutral right away; the feature stays a draft
                // until the operator confirms it
                if let Some(plugin) = &mut self.plugin {
                    plugin.change_mode(DrawMode::SimpleSelect);
                }
                self.sync_render(surface);
                self.draft = Some(draft.clone());
                out.push(DrawOutcome::DraftOpened(draft));
            }
            DrawEvent::Updated { local_id, geometry } => {
                let Some(plugin) = self.plugin.as_ref() else {
                    return;
                };
                if !plugin.mode().accepts_updates() {
                    return; // mid-draw geometry is not trustworthy
                }
                let Some(backend_id) = plugin.feature(&local_id).and_then(|f| f.backend_id) else {
                    return; // never saved, nothing to update
                };
                let properties = plugin
                    .feature(&local_id)
                    .map(|f| f.properties)
                    .unwrap_or_default();
                if let Some(stored) = self.features.iter_mut().find(|f| f.id == backend_id) {
                    stored.geometry = geometry.clone();
                }
                bridge.queue(backend_id, PendingUpdate { geometry, properties }, now);
                self.sync_render(surface);
            }
            DrawEvent::Deleted { local_id } => {
                let backend_id = self
                    .plugin
                    .as_ref()
                    .and_then(|p| p.feature(&local_id))
                    .and_then(|f| f.backend_id)
                    .or_else(|| {
                        // feature may already be gone from the plugin
                        self.draft
                            .as_ref()
                            .filter(|d| d.local_id == local_id)
                            .and_then(|d| d.backend_id)
                    });
                if let Some(plugin) = &mut self.plugin {
                    plugin.remove(&local_id);
                }
                if self.draft.as_ref().is_some_and(|d| d.local_id == local_id) {
                    self.draft = None;
                }
                if let Some(id) = backend_id {
                    // deletes are forwarded immediately, not batched
                    self.features.retain(|f| f.id != id);
                    let _ = self.tx.send(StoreCommand::DeleteFeature { id });
                }
                self.sync_render(surface);
            }
            DrawEvent::ModeChanged(mode) => {
                if mode.is_neutral() {
                    // tool switch must not lose queued edits
                    bridge.flush_now();
                }
            }
            DrawEvent::Click { at } => {
                self.correlate_click(surface, at, out);
            }
        }
    }

    /// Generic click correlation: find a rendered feature carrying a
    /// backend id under the pointer and open its editor draft.
    fn correlate_click(&mut self, surface: &SurfaceHandle, at: ScreenPoint, out: &mut Vec<DrawOutcome>) {
        for picked in surface.query_point_features(at) {
            let Some(backend_id) = picked.properties.get("backend_id").and_then(JsonValue::as_i64)
            else {
                continue;
            };
            let Some(feature) = self.features.iter().find(|f| f.id == backend_id) else {
                continue;
            };
            let local_id = self
                .plugin
                .as_ref()
                .and_then(|p| {
                    p.collection()
                        .into_iter()
                        .find(|f| f.backend_id == Some(backend_id))
                })
                .map(|f| f.local_id)
                .unwrap_or_else(|| format!("f{backend_id}"));
            let draft = FeatureDraft {
                local_id,
                backend_id: Some(backend_id),
                geometry: feature.geometry.clone(),
                properties: feature.properties.clone(),
            };
            self.draft = Some(draft.clone());
            out.push(DrawOutcome::DraftOpened(draft));
            return;
        }
    }

    /// Operator confirmed the editor draft
    pub fn confirm_draft(&mut self, surface: &SurfaceHandle, properties: FeatureProperties) {
        let Some(draft) = self.draft.take() else {
            return;
        };
        let geometry = self
            .plugin
            .as_ref()
            .and_then(|p| p.feature(&draft.local_id))
            .map(|f| f.geometry)
            .unwrap_or_else(|| draft.geometry.clone());
        if let Some(plugin) = &mut self.plugin {
            plugin.set_properties(&draft.local_id, &properties);
        }
        match draft.backend_id {
            None => {
                let _ = self.tx.send(StoreCommand::CreateFeature {
                    local_id: draft.local_id,
                    geometry,
                    properties,
                });
            }
            Some(id) => {
                if let Some(stored) = self.features.iter_mut().find(|f| f.id == id) {
                    stored.geometry = geometry.clone();
                    stored.properties = properties.clone();
                }
                let _ = self.tx.send(StoreCommand::UpdateFeature { id, geometry, properties });
            }
        }
        self.sync_render(surface);
    }

    /// Operator dismissed the draft; an unsaved feature is discarded
    pub fn cancel_draft(&mut self, surface: &SurfaceHandle) {
        let Some(draft) = self.draft.take() else {
            return;
        };
        if draft.backend_id.is_none() {
            if let Some(plugin) = &mut self.plugin {
                plugin.remove(&draft.local_id);
            }
            self.sync_render(surface);
        }
    }

    /// A create round-trip finished: attach the durable id to the plugin
    /// feature so every later edit keys off it.
    pub fn attach_backend_id(&mut self, surface: &SurfaceHandle, local_id: &str, id: BackendId) {
        let Some(plugin) = &mut self.plugin else {
            return;
        };
        plugin.set_backend_id(local_id, id);
        if let Some(feature) = plugin.feature(local_id) {
            self.features.push(MapFeature {
                id,
                geometry: feature.geometry,
                properties: feature.properties,
            });
        }
        self.sync_render(surface);
    }

    pub fn teardown(&mut self, surface: &SurfaceHandle) {
        self.plugin = None;
        self.draft = None;
        self.unmount_markup(surface);
        self.unmount_static(surface);
    }

    fn sync_render(&self, surface: &SurfaceHandle) {
        if let Some(plugin) = &self.plugin {
            let features = plugin.collection().iter().map(surface_feature).collect();
            surface.set_source_features(MARKUP_SOURCE, features);
        }
    }

    fn render_static(&mut self, surface: &SurfaceHandle) {
        self.mount_static(surface);
        let features = self
            .features
            .iter()
            .map(|f| surface_feature(&plugin_feature(f)))
            .collect();
        surface.set_source_features(MARKUP_STATIC_SOURCE, features);
    }

    fn mount_markup(&mut self, surface: &SurfaceHandle) {
        if !self.markup_mounted {
            mount_markup_layers(surface, MARKUP_SOURCE);
            self.markup_mounted = true;
        }
    }

    fn unmount_markup(&mut self, surface: &SurfaceHandle) {
        if self.markup_mounted {
            remove_markup_layers(surface, MARKUP_SOURCE);
            self.markup_mounted = false;
        }
    }

    fn mount_static(&mut self, surface: &SurfaceHandle) {
        if !self.static_mounted {
            mount_markup_layers(surface, MARKUP_STATIC_SOURCE);
            self.static_mounted = true;
        }
    }

    fn unmount_static(&mut self, surface: &SurfaceHandle) {
        if self.static_mounted {
            remove_markup_layers(surface, MARKUP_STATIC_SOURCE);
            self.static_mounted = false;
        }
    }
}

/// New-feature defaults, classified by geometry type
fn default_properties(geometry: &Geometry) -> FeatureProperties {
    let (kind, color) = match geometry {
        Geometry::Point { .. } => ("hardware", "#f97316"),
        Geometry::LineString { .. } => ("utility", "#0ea5e9"),
        Geometry::Polygon { .. } => ("field", "#22c55e"),
    };
    FeatureProperties {
        kind: kind.to_string(),
        color: color.to_string(),
        ..FeatureProperties::default()
    }
}

fn plugin_feature(feature: &MapFeature) -> PluginFeature {
    PluginFeature {
        local_id: format!("f{}", feature.id),
        backend_id: Some(feature.id),
        geometry: feature.geometry.clone(),
        properties: feature.properties.clone(),
    }
}

fn surface_feature(feature: &PluginFeature) -> SurfaceFeature {
    let mut properties = serde_json::Map::new();
    if let Some(id) = feature.backend_id {
        properties.insert("backend_id".into(), JsonValue::from(id));
    }
    properties.insert("name".into(), JsonValue::String(feature.properties.name.clone()));
    properties.insert("kind".into(), JsonValue::String(feature.properties.kind.clone()));
    properties.insert("color".into(), JsonValue::String(feature.properties.color.clone()));
    SurfaceFeature {
        key: feature.local_id.clone(),
        geometry: feature.geometry.clone(),
        properties,
    }
}

fn mount_markup_layers(surface: &SurfaceHandle, source: &str) {
    surface.add_source(source, SourceSpec::GeoJson { features: vec![] });
    let before = surface
        .has_layer(crate::entities::NODE_LAYER)
        .then_some(crate::entities::NODE_LAYER);
    surface.add_layer(
        LayerSpec::Fill {
            id: format!("{source}-fill"),
            source: source.to_string(),
            color: None,
            opacity: 0.25,
        },
        before,
    );
    surface.add_layer(
        LayerSpec::Line {
            id: format!("{source}-line"),
            source: source.to_string(),
            color: None,
            width: 2.0,
            opacity: 0.9,
        },
        before,
    );
    surface.add_layer(
        LayerSpec::Circle {
            id: format!("{source}-circle"),
            source: source.to_string(),
            color: None,
            radius: 6.0,
            hover_radius: 8.0,
            opacity: 1.0,
        },
        before,
    );
}

fn remove_markup_layers(surface: &SurfaceHandle, source: &str) {
    for suffix in ["circle", "line", "fill"] {
        surface.remove_layer(&format!("{source}-{suffix}"));
    }
    surface.remove_source(source);
}
