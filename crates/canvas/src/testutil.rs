//! Test support: an in-memory recording surface.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use shared::{Geometry, LngLat};

use crate::surface::{
    CameraPose, CursorStyle, LayerSpec, PickedFeature, RenderSurface, ScreenPoint, SourceSpec,
    SurfaceFeature, SurfaceHandle,
};

/// One recorded mutation against the surface
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    AddSource(String),
    RemoveSource(String),
    AddLayer { id: String, before: Option<String> },
    RemoveLayer(String),
    SetData { source: String, count: usize },
    Hover { source: String, key: String, on: bool },
    Cursor(CursorStyle),
    Pan(bool),
}

/// Recording surface with a simple linear projection:
/// `x = lng * 10 + 500`, `y = 500 - lat * 10`.
pub struct RecordingSurface {
    pub ops: Vec<Op>,
    pub sources: Vec<(String, SourceSpec)>,
    pub layer_order: Vec<LayerSpec>,
    pub hovered: HashSet<(String, String)>,
    pub cursor: CursorStyle,
    pub pan_enabled: bool,
    pub removed: bool,
    pub size: (f32, f32),
    pub pose: CameraPose,
    /// Screen radius within which a point feature is picked
    pub pick_radius: f32,
}

impl Default for RecordingSurface {
    fn default() -> Self {
        Self {
            ops: Vec::new(),
            sources: Vec::new(),
            layer_order: Vec::new(),
            hovered: HashSet::new(),
            cursor: CursorStyle::Default,
            pan_enabled: true,
            removed: false,
            size: (1000.0, 800.0),
            pose: CameraPose {
                center: LngLat::new(0.0, 0.0),
                zoom: 12.0,
                bearing: 0.0,
                pitch: 0.0,
                camera_altitude_m: None,
            },
            pick_radius: 8.0,
        }
    }
}

impl RecordingSurface {
    pub fn project(&self, pos: LngLat) -> ScreenPoint {
        ScreenPoint::new((pos.lng * 10.0 + 500.0) as f32, (500.0 - pos.lat * 10.0) as f32)
    }

    pub fn layer_ids(&self) -> Vec<String> {
        self.layer_order.iter().map(|l| l.id().to_string()).collect()
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    fn source_features(&self, id: &str) -> Option<&[SurfaceFeature]> {
        self.sources.iter().find(|(sid, _)| sid == id).and_then(|(_, spec)| match spec {
            SourceSpec::GeoJson { features } => Some(features.as_slice()),
            _ => None,
        })
    }
}

impl RenderSurface for RecordingSurface {
    fn add_source(&mut self, id: &str, spec: SourceSpec) {
        self.ops.push(Op::AddSource(id.to_string()));
        self.sources.push((id.to_string(), spec));
    }

    fn remove_source(&mut self, id: &str) {
        self.ops.push(Op::RemoveSource(id.to_string()));
        self.sources.retain(|(sid, _)| sid != id);
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.iter().any(|(sid, _)| sid == id)
    }

    fn add_layer(&mut self, spec: LayerSpec, before: Option<&str>) {
        self.ops.push(Op::AddLayer {
            id: spec.id().to_string(),
            before: before.map(str::to_string),
        });
        match before.and_then(|b| self.layer_order.iter().position(|l| l.id() == b)) {
            Some(idx) => self.layer_order.insert(idx, spec),
            None => self.layer_order.push(spec),
        }
    }

    fn remove_layer(&mut self, id: &str) {
        self.ops.push(Op::RemoveLayer(id.to_string()));
        self.layer_order.retain(|l| l.id() != id);
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layer_order.iter().any(|l| l.id() == id)
    }

    fn set_source_features(&mut self, source: &str, features: Vec<SurfaceFeature>) {
        self.ops.push(Op::SetData {
            source: source.to_string(),
            count: features.len(),
        });
        if let Some((_, spec)) = self.sources.iter_mut().find(|(sid, _)| sid == source) {
            *spec = SourceSpec::GeoJson { features };
        }
    }

    fn set_feature_hover(&mut self, source: &str, key: &str, hovered: bool) {
        self.ops.push(Op::Hover {
            source: source.to_string(),
            key: key.to_string(),
            on: hovered,
        });
        let entry = (source.to_string(), key.to_string());
        if hovered {
            self.hovered.insert(entry);
        } else {
            self.hovered.remove(&entry);
        }
    }

    fn set_cursor(&mut self, cursor: CursorStyle) {
        self.ops.push(Op::Cursor(cursor));
        self.cursor = cursor;
    }

    fn set_pan_enabled(&mut self, enabled: bool) {
        self.ops.push(Op::Pan(enabled));
        self.pan_enabled = enabled;
    }

    fn screen_to_lnglat(&self, point: ScreenPoint) -> Option<LngLat> {
        if self.size.0 <= 0.0 || self.size.1 <= 0.0 {
            return None;
        }
        Some(LngLat::new(
            (point.x as f64 - 500.0) / 10.0,
            (500.0 - point.y as f64) / 10.0,
        ))
    }

    fn viewport_px(&self) -> (f32, f32) {
        self.size
    }

    fn camera(&self) -> CameraPose {
        self.pose
    }

    fn query_point_features(&self, point: ScreenPoint) -> Vec<PickedFeature> {
        let mut hits = Vec::new();
        for (sid, _) in &self.sources {
            let Some(features) = self.source_features(sid) else {
                continue;
            };
            let layer = self
                .layer_order
                .iter()
                .find_map(|l| match l {
                    LayerSpec::Circle { id, source, .. } if source == sid => Some(id.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| sid.clone());
            for feat in features {
                let Geometry::Point { coordinates } = &feat.geometry else {
                    continue;
                };
                let at = self.project(LngLat::from(*coordinates));
                let d2 = (at.x - point.x).powi(2) + (at.y - point.y).powi(2);
                if d2 <= self.pick_radius * self.pick_radius {
                    hits.push(PickedFeature {
                        layer: layer.clone(),
                        source: sid.clone(),
                        key: feat.key.clone(),
                        properties: feat.properties.clone(),
                    });
                }
            }
        }
        hits
    }

    fn is_removed(&self) -> bool {
        self.removed
    }
}

/// Build a mock surface plus a handle onto it
pub fn recording_surface() -> (Arc<Mutex<RecordingSurface>>, SurfaceHandle) {
    let surface = Arc::new(Mutex::new(RecordingSurface::default()));
    let handle = SurfaceHandle::new(surface.clone());
    (surface, handle)
}
