//! Node/sensor marker layers: hover emphasis, click-to-inspect and
//! drag-to-relocate, layered manually on top of a surface that has no
//! native drag support for domain features.

use serde_json::Value as JsonValue;
use shared::{EntityKind, EntityPoint, Geometry, LngLat};

use crate::input::{InteractionCtx, PointerEvent};
use crate::surface::{CursorStyle, LayerSpec, ScreenPoint, SourceSpec, SurfaceFeature, SurfaceHandle};

pub const NODE_SOURCE: &str = "entity-nodes";
pub const SENSOR_SOURCE: &str = "entity-sensors";
pub const NODE_LAYER: &str = "entity-nodes-layer";
pub const SENSOR_LAYER: &str = "entity-sensors-layer";

/// At most one active drag; cleared on pointer-up/cancel whether or not the
/// position actually changed.
#[derive(Debug, Clone, PartialEq)]
struct DragState {
    kind: EntityKind,
    id: String,
    moved: bool,
    last: LngLat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityEvent {
    /// Open the inspector popup at the pointer
    Inspect {
        at: ScreenPoint,
        title: String,
        subtitle: String,
    },
    /// Exactly one per completed drag, carrying the final coordinates
    Relocated {
        kind: EntityKind,
        id: String,
        lng: f64,
        lat: f64,
    },
}

#[derive(Default)]
pub struct EntityLayerManager {
    mounted: bool,
    nodes: Vec<EntityPoint>,
    sensors: Vec<EntityPoint>,
    hovered: Option<(EntityKind, String)>,
    drag: Option<DragState>,
}

impl EntityLayerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount the two long-lived point sources. Idempotent; the sources are
    /// created once when the surface becomes ready and only refreshed with
    /// data afterwards.
    pub fn mount(&mut self, surface: &SurfaceHandle) {
        if self.mounted {
            return;
        }
        for (source, layer, color) in [
            (NODE_SOURCE, NODE_LAYER, "#16a34a"),
            (SENSOR_SOURCE, SENSOR_LAYER, "#2563eb"),
        ] {
            surface.add_source(source, SourceSpec::GeoJson { features: vec![] });
            surface.add_layer(
                LayerSpec::Circle {
                    id: layer.to_string(),
                    source: source.to_string(),
                    color: Some(color.to_string()),
                    radius: 7.0,
                    hover_radius: 10.0,
                    opacity: 1.0,
                },
                None,
            );
        }
        self.mounted = true;
    }

    /// Push the latest live domain data into both sources
    pub fn set_data(
        &mut self,
        surface: &SurfaceHandle,
        nodes: Vec<EntityPoint>,
        sensors: Vec<EntityPoint>,
    ) {
        self.nodes = nodes;
        self.sensors = sensors;
        surface.set_source_features(NODE_SOURCE, to_features(&self.nodes));
        surface.set_source_features(SENSOR_SOURCE, to_features(&self.sensors));
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Clear drag state without emitting a relocate (editing revoked
    /// mid-drag, or a global pointer-cancel).
    pub fn cancel_drag(&mut self, surface: &SurfaceHandle) {
        if self.drag.take().is_some() {
            surface.set_pan_enabled(true);
            surface.set_cursor(CursorStyle::Default);
        }
    }

    /// Route one pointer event. Returns true when the event was consumed
    /// (the surface should not pan/zoom on it).
    pub fn on_pointer(
        &mut self,
        surface: &SurfaceHandle,
        event: PointerEvent,
        ctx: &InteractionCtx,
        out: &mut Vec<EntityEvent>,
    ) -> bool {
        match event {
            PointerEvent::Move { at } => self.on_move(surface, at, ctx),
            PointerEvent::Down { at } => self.on_down(surface, at, ctx),
            PointerEvent::Up { at } => self.on_up(surface, at, out),
            PointerEvent::DoubleClick { .. } => false,
            PointerEvent::Cancel => {
                self.cancel_drag(surface);
                false
            }
        }
    }

    fn on_move(&mut self, surface: &SurfaceHandle, at: ScreenPoint, ctx: &InteractionCtx) -> bool {
        if let Some(drag) = &mut self.drag {
            let Some(pos) = surface.screen_to_lnglat(at) else {
                return true;
            };
            drag.last = pos;
            drag.moved = true;
            let (kind, id) = (drag.kind, drag.id.clone());
            // live position update only; persistence waits for drag-end
            self.move_entity(kind, &id, pos);
            let (source, points) = match kind {
                EntityKind::Node => (NODE_SOURCE, &self.nodes),
                EntityKind::Sensor => (SENSOR_SOURCE, &self.sensors),
            };
            surface.set_source_features(source, to_features(points));
            return true;
        }

        // hover tracking via per-feature render state, not data mutation
        let hit = self.hit(surface, at);
        let hit_key = hit.as_ref().map(|e| (e.kind, e.id.clone()));
        if hit_key != self.hovered {
            if let Some((kind, id)) = self.hovered.take() {
                surface.set_feature_hover(source_for(kind), &id, false);
            }
            if let Some((kind, id)) = &hit_key {
                surface.set_feature_hover(source_for(*kind), id, true);
            }
            self.hovered = hit_key;
            let cursor = if self.hovered.is_some() && ctx.can_drag() {
                CursorStyle::Grab
            } else {
                CursorStyle::Default
            };
            surface.set_cursor(cursor);
        }
        false
    }

    fn on_down(&mut self, surface: &SurfaceHandle, at: ScreenPoint, ctx: &InteractionCtx) -> bool {
        if !ctx.can_drag() {
            return false;
        }
        let Some(entity) = self.hit(surface, at) else {
            return false;
        };
        self.drag = Some(DragState {
            kind: entity.kind,
            id: entity.id.clone(),
            moved: false,
            last: LngLat::new(entity.lng, entity.lat),
        });
        surface.set_pan_enabled(false);
        surface.set_cursor(CursorStyle::Grabbing);
        true
    }

    fn on_up(
        &mut self,
        surface: &SurfaceHandle,
        at: ScreenPoint,
        out: &mut Vec<EntityEvent>,
    ) -> bool {
        if let Some(drag) = self.drag.take() {
            surface.set_pan_enabled(true);
            surface.set_cursor(CursorStyle::Grab);
            if drag.moved {
                out.push(EntityEvent::Relocated {
                    kind: drag.kind,
                    id: drag.id,
                    lng: drag.last.lng,
                    lat: drag.last.lat,
                });
            } else if let Some(entity) = self.hit(surface, at) {
                out.push(inspect_event(at, &entity));
            }
            return true;
        }

        // plain click (no drag in progress): inspect regardless of editing
        if let Some(entity) = self.hit(surface, at) {
            out.push(inspect_event(at, &entity));
            return true;
        }
        false
    }

    fn hit(&self, surface: &SurfaceHandle, at: ScreenPoint) -> Option<EntityPoint> {
        for picked in surface.query_point_features(at) {
            let points = match picked.source.as_str() {
                NODE_SOURCE => &self.nodes,
                SENSOR_SOURCE => &self.sensors,
                _ => continue,
            };
            if let Some(entity) = points.iter().find(|p| p.id == picked.key) {
                return Some(entity.clone());
            }
        }
        None
    }

    fn move_entity(&mut self, kind: EntityKind, id: &str, pos: LngLat) {
        let points = match kind {
            EntityKind::Node => &mut self.nodes,
            EntityKind::Sensor => &mut self.sensors,
        };
        if let Some(point) = points.iter_mut().find(|p| p.id == id) {
            point.lng = pos.lng;
            point.lat = pos.lat;
        }
    }

    /// Teardown: drop drag state and remove both marker layers
    pub fn teardown(&mut self, surface: &SurfaceHandle) {
        self.cancel_drag(surface);
        self.hovered = None;
        for layer in [SENSOR_LAYER, NODE_LAYER] {
            surface.remove_layer(layer);
        }
        for source in [SENSOR_SOURCE, NODE_SOURCE] {
            surface.remove_source(source);
        }
        self.mounted = false;
    }
}

fn source_for(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Node => NODE_SOURCE,
        EntityKind::Sensor => SENSOR_SOURCE,
    }
}

fn inspect_event(at: ScreenPoint, entity: &EntityPoint) -> EntityEvent {
    EntityEvent::Inspect {
        at,
        title: entity.name.clone(),
        subtitle: entity.status_line.clone(),
    }
}

fn to_features(points: &[EntityPoint]) -> Vec<SurfaceFeature> {
    points
        .iter()
        .map(|p| {
            let mut properties = serde_json::Map::new();
            properties.insert("entity_id".into(), JsonValue::String(p.id.clone()));
            properties.insert("name".into(), JsonValue::String(p.name.clone()));
            properties.insert("status".into(), JsonValue::String(p.status_line.clone()));
            SurfaceFeature {
                key: p.id.clone(),
                geometry: Geometry::point(p.lng, p.lat),
                properties,
            }
        })
        .collect()
}
