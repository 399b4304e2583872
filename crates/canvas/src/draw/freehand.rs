//! The built-in drawing plugin: vertex-by-vertex placement of points,
//! lines and polygons, plus vertex dragging in the select modes.

use shared::{FeatureProperties, Geometry, LngLat};
use uuid::Uuid;

use crate::draw::{DrawEvent, DrawMode, DrawPlugin, PluginError, PluginFeature, PluginResponse};
use crate::input::PointerEvent;
use crate::surface::{ScreenPoint, SurfaceHandle};

/// Screen radius for vertex grabbing
const PICK_PX: f32 = 8.0;

struct VertexDrag {
    local_id: String,
    /// `None` drags the whole (point) feature
    vertex: Option<usize>,
    moved: bool,
}

#[derive(Default)]
pub struct FreehandDraw {
    mode: DrawMode,
    features: Vec<PluginFeature>,
    in_progress: Vec<[f64; 2]>,
    selected: Option<String>,
    drag: Option<VertexDrag>,
}

impl FreehandDraw {
    pub fn new() -> Self {
        Self::default()
    }

    fn finish_draw(&mut self) -> Option<DrawEvent> {
        let geometry = match self.mode {
            DrawMode::DrawLine if self.in_progress.len() >= 2 => Geometry::LineString {
                coordinates: std::mem::take(&mut self.in_progress),
            },
            DrawMode::DrawPolygon if self.in_progress.len() >= 3 => {
                let mut ring = std::mem::take(&mut self.in_progress);
                ring.push(ring[0]);
                Geometry::Polygon { coordinates: vec![ring] }
            }
            _ => {
                self.in_progress.clear();
                return None;
            }
        };
        Some(self.insert(geometry))
    }

    fn insert(&mut self, geometry: Geometry) -> DrawEvent {
        let local_id = Uuid::new_v4().to_string();
        self.features.push(PluginFeature {
            local_id: local_id.clone(),
            backend_id: None,
            geometry: geometry.clone(),
            properties: FeatureProperties::default(),
        });
        self.selected = Some(local_id.clone());
        DrawEvent::Created { local_id, geometry }
    }

    /// Nearest vertex of any feature within the pick tolerance
    fn hit_vertex(&self, at: LngLat, tol: f64) -> Option<(String, usize)> {
        let mut best: Option<(String, usize, f64)> = None;
        for feature in &self.features {
            for (idx, vertex) in vertices(&feature.geometry).enumerate() {
                let d = ((vertex[0] - at.lng).powi(2) + (vertex[1] - at.lat).powi(2)).sqrt();
                if d <= tol && best.as_ref().is_none_or(|(_, _, bd)| d < *bd) {
                    best = Some((feature.local_id.clone(), idx, d));
                }
            }
        }
        best.map(|(id, idx, _)| (id, idx))
    }

    fn feature_mut(&mut self, local_id: &str) -> Option<&mut PluginFeature> {
        self.features.iter_mut().find(|f| f.local_id == local_id)
    }

    fn on_down(&mut self, surface: &SurfaceHandle, at: ScreenPoint) -> PluginResponse {
        let Some(pos) = surface.screen_to_lnglat(at) else {
            return PluginResponse::default();
        };
        match self.mode {
            DrawMode::DrawPoint => PluginResponse {
                events: vec![self.insert(Geometry::point(pos.lng, pos.lat))],
                consumed: true,
            },
            DrawMode::DrawLine | DrawMode::DrawPolygon => {
                self.in_progress.push([pos.lng, pos.lat]);
                PluginResponse { events: vec![], consumed: true }
            }
            DrawMode::SimpleSelect => {
                let Some(tol) = tolerance_deg(surface, at) else {
                    return PluginResponse::default();
                };
                match self.hit_vertex(pos, tol) {
                    Some((local_id, _)) => {
                        let is_point = self
                            .feature_mut(&local_id)
                            .is_some_and(|f| matches!(f.geometry, Geometry::Point { .. }));
                        self.selected = Some(local_id.clone());
                        if is_point {
                            self.drag = Some(VertexDrag { local_id, vertex: None, moved: false });
                        }
                        PluginResponse { events: vec![], consumed: true }
                    }
                    None => {
                        self.selected = None;
                        // unclaimed click, let the host correlate it
                        PluginResponse {
                            events: vec![DrawEvent::Click { at }],
                            consumed: false,
                        }
                    }
                }
            }
            DrawMode::DirectSelect => {
                let Some(tol) = tolerance_deg(surface, at) else {
                    return PluginResponse::default();
                };
                let selected = self.selected.clone();
                match self.hit_vertex(pos, tol) {
                    Some((local_id, vertex)) if Some(&local_id) == selected.as_ref() => {
                        self.drag = Some(VertexDrag {
                            local_id,
                            vertex: Some(vertex),
                            moved: false,
                        });
                        PluginResponse { events: vec![], consumed: true }
                    }
                    _ => {
                        self.mode = DrawMode::SimpleSelect;
                        PluginResponse {
                            events: vec![DrawEvent::ModeChanged(DrawMode::SimpleSelect)],
                            consumed: true,
                        }
                    }
                }
            }
            DrawMode::Static => PluginResponse::default(),
        }
    }

    fn on_move(&mut self, surface: &SurfaceHandle, at: ScreenPoint) -> PluginResponse {
        let Some(drag) = &self.drag else {
            return PluginResponse::default();
        };
        let Some(pos) = surface.screen_to_lnglat(at) else {
            return PluginResponse::default();
        };
        let (local_id, vertex) = (drag.local_id.clone(), drag.vertex);
        if let Some(feature) = self.feature_mut(&local_id) {
            set_vertex(&mut feature.geometry, vertex, [pos.lng, pos.lat]);
        }
        if let Some(drag) = &mut self.drag {
            drag.moved = true;
        }
        PluginResponse { events: vec![], consumed: true }
    }

    fn on_up(&mut self) -> PluginResponse {
        let Some(drag) = self.drag.take() else {
            return PluginResponse::default();
        };
        if !drag.moved {
            return PluginResponse { events: vec![], consumed: true };
        }
        let events = self
            .features
            .iter()
            .find(|f| f.local_id == drag.local_id)
            .map(|f| DrawEvent::Updated {
                local_id: f.local_id.clone(),
                geometry: f.geometry.clone(),
            })
            .into_iter()
            .collect();
        PluginResponse { events, consumed: true }
    }

    fn on_double_click(&mut self, surface: &SurfaceHandle, at: ScreenPoint) -> PluginResponse {
        match self.mode {
            DrawMode::DrawLine | DrawMode::DrawPolygon => PluginResponse {
                events: self.finish_draw().into_iter().collect(),
                consumed: true,
            },
            DrawMode::SimpleSelect => {
                // double-click on a line/polygon vertex enters vertex editing
                let Some(pos) = surface.screen_to_lnglat(at) else {
                    return PluginResponse::default();
                };
                let Some(tol) = tolerance_deg(surface, at) else {
                    return PluginResponse::default();
                };
                match self.hit_vertex(pos, tol) {
                    Some((local_id, _))
                        if !self
                            .feature_mut(&local_id)
                            .is_some_and(|f| matches!(f.geometry, Geometry::Point { .. })) =>
                    {
                        self.selected = Some(local_id);
                        self.mode = DrawMode::DirectSelect;
                        PluginResponse {
                            events: vec![DrawEvent::ModeChanged(DrawMode::DirectSelect)],
                            consumed: true,
                        }
                    }
                    _ => PluginResponse::default(),
                }
            }
            _ => PluginResponse::default(),
        }
    }
}

impl DrawPlugin for FreehandDraw {
    fn set_collection(&mut self, features: Vec<PluginFeature>) -> Result<Vec<DrawEvent>, PluginError> {
        self.features = features;
        self.in_progress.clear();
        self.selected = None;
        self.drag = None;
        self.mode = DrawMode::SimpleSelect;
        Ok(Vec::new())
    }

    fn collection(&self) -> Vec<PluginFeature> {
        self.features.clone()
    }

    fn feature(&self, local_id: &str) -> Option<PluginFeature> {
        self.features.iter().find(|f| f.local_id == local_id).cloned()
    }

    fn change_mode(&mut self, mode: DrawMode) {
        if mode != self.mode {
            self.in_progress.clear();
            self.drag = None;
        }
        self.mode = mode;
    }

    fn mode(&self) -> DrawMode {
        self.mode
    }

    fn remove(&mut self, local_id: &str) {
        self.features.retain(|f| f.local_id != local_id);
        if self.selected.as_deref() == Some(local_id) {
            self.selected = None;
        }
    }

    fn set_backend_id(&mut self, local_id: &str, id: shared::BackendId) {
        if let Some(f) = self.features.iter_mut().find(|f| f.local_id == local_id) {
            f.backend_id = Some(id);
        }
    }

    fn set_properties(&mut self, local_id: &str, properties: &FeatureProperties) {
        if let Some(f) = self.features.iter_mut().find(|f| f.local_id == local_id) {
            f.properties = properties.clone();
        }
    }

    fn on_pointer(&mut self, surface: &SurfaceHandle, event: PointerEvent) -> PluginResponse {
        match event {
            PointerEvent::Down { at } => self.on_down(surface, at),
            PointerEvent::Move { at } => self.on_move(surface, at),
            PointerEvent::Up { .. } => self.on_up(),
            PointerEvent::DoubleClick { at } => self.on_double_click(surface, at),
            PointerEvent::Cancel => {
                self.in_progress.clear();
                self.drag = None;
                PluginResponse::default()
            }
        }
    }
}

/// Iterate a geometry's editable vertices (outer ring only for polygons,
/// without the closing duplicate)
fn vertices(geometry: &Geometry) -> Box<dyn Iterator<Item = [f64; 2]> + '_> {
    match geometry {
        Geometry::Point { coordinates } => Box::new(std::iter::once(*coordinates)),
        Geometry::LineString { coordinates } => Box::new(coordinates.iter().copied()),
        Geometry::Polygon { coordinates } => {
            let ring = coordinates.first().map(Vec::as_slice).unwrap_or(&[]);
            let take = ring.len().saturating_sub(1);
            Box::new(ring.iter().copied().take(take))
        }
    }
}

fn set_vertex(geometry: &mut Geometry, vertex: Option<usize>, pos: [f64; 2]) {
    match (geometry, vertex) {
        (Geometry::Point { coordinates }, _) => *coordinates = pos,
        (Geometry::LineString { coordinates }, Some(idx)) => {
            if let Some(v) = coordinates.get_mut(idx) {
                *v = pos;
            }
        }
        (Geometry::Polygon { coordinates }, Some(idx)) => {
            let Some(ring) = coordinates.first_mut() else {
                return;
            };
            if let Some(v) = ring.get_mut(idx) {
                *v = pos;
            }
            // keep the ring closed when the shared endpoint moves
            if idx == 0 {
                if let Some(last) = ring.last_mut() {
                    *last = pos;
                }
            }
        }
        _ => {}
    }
}

/// Pick tolerance in degrees, derived from the surface's own projection
fn tolerance_deg(surface: &SurfaceHandle, at: ScreenPoint) -> Option<f64> {
    let a = surface.screen_to_lnglat(at)?;
    let b = surface.screen_to_lnglat(ScreenPoint::new(at.x + PICK_PX, at.y))?;
    Some(((b.lng - a.lng).powi(2) + (b.lat - a.lat).powi(2)).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::recording_surface;

    fn at(lng: f64, lat: f64) -> ScreenPoint {
        // the mock projection: x = lng * 10 + 500, y = 500 - lat * 10
        ScreenPoint::new((lng * 10.0 + 500.0) as f32, (500.0 - lat * 10.0) as f32)
    }

    #[test]
    fn test_draw_point_creates_on_click() {
        let (_s, handle) = recording_surface();
        let mut draw = FreehandDraw::new();
        draw.change_mode(DrawMode::DrawPoint);

        let resp = draw.on_pointer(&handle, PointerEvent::Down { at: at(1.0, 2.0) });
        assert!(resp.consumed);
        match resp.events.as_slice() {
            [DrawEvent::Created { geometry, .. }] => {
                assert_eq!(*geometry, Geometry::point(1.0, 2.0));
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn test_draw_line_finishes_on_double_click() {
        let (_s, handle) = recording_surface();
        let mut draw = FreehandDraw::new();
        draw.change_mode(DrawMode::DrawLine);

        assert!(draw.on_pointer(&handle, PointerEvent::Down { at: at(0.0, 0.0) }).events.is_empty());
        assert!(draw.on_pointer(&handle, PointerEvent::Down { at: at(1.0, 0.0) }).events.is_empty());
        let resp = draw.on_pointer(&handle, PointerEvent::DoubleClick { at: at(1.0, 0.0) });
        match resp.events.as_slice() {
            [DrawEvent::Created { geometry, .. }] => {
                assert_eq!(
                    *geometry,
                    Geometry::LineString { coordinates: vec![[0.0, 0.0], [1.0, 0.0]] }
                );
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn test_draw_polygon_closes_ring() {
        let (_s, handle) = recording_surface();
        let mut draw = FreehandDraw::new();
        draw.change_mode(DrawMode::DrawPolygon);

        for p in [at(0.0, 0.0), at(2.0, 0.0), at(2.0, 2.0)] {
            draw.on_pointer(&handle, PointerEvent::Down { at: p });
        }
        let resp = draw.on_pointer(&handle, PointerEvent::DoubleClick { at: at(2.0, 2.0) });
        match resp.events.as_slice() {
            [DrawEvent::Created { geometry: Geometry::Polygon { coordinates }, .. }] => {
                let ring = &coordinates[0];
                assert_eq!(ring.len(), 4);
                assert_eq!(ring.first(), ring.last());
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn test_too_few_vertices_discards_draw() {
        let (_s, handle) = recording_surface();
        let mut draw = FreehandDraw::new();
        draw.change_mode(DrawMode::DrawPolygon);

        draw.on_pointer(&handle, PointerEvent::Down { at: at(0.0, 0.0) });
        draw.on_pointer(&handle, PointerEvent::Down { at: at(1.0, 0.0) });
        let resp = draw.on_pointer(&handle, PointerEvent::DoubleClick { at: at(1.0, 0.0) });
        assert!(resp.events.is_empty());
        assert!(draw.collection().is_empty());
    }

    #[test]
    fn test_point_drag_emits_single_update_with_final_coords() {
        let (_s, handle) = recording_surface();
        let mut draw = FreehandDraw::new();
        draw.set_collection(vec![PluginFeature {
            local_id: "p1".into(),
            backend_id: Some(7),
            geometry: Geometry::point(1.0, 1.0),
            properties: FeatureProperties::default(),
        }])
        .unwrap();

        draw.on_pointer(&handle, PointerEvent::Down { at: at(1.0, 1.0) });
        draw.on_pointer(&handle, PointerEvent::Move { at: at(3.0, 1.0) });
        draw.on_pointer(&handle, PointerEvent::Move { at: at(5.0, 2.0) });
        let resp = draw.on_pointer(&handle, PointerEvent::Up { at: at(5.0, 2.0) });

        match resp.events.as_slice() {
            [DrawEvent::Updated { local_id, geometry }] => {
                assert_eq!(local_id, "p1");
                assert_eq!(*geometry, Geometry::point(5.0, 2.0));
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn test_press_release_without_move_emits_nothing() {
        let (_s, handle) = recording_surface();
        let mut draw = FreehandDraw::new();
        draw.set_collection(vec![PluginFeature {
            local_id: "p1".into(),
            backend_id: Some(7),
            geometry: Geometry::point(1.0, 1.0),
            properties: FeatureProperties::default(),
        }])
        .unwrap();

        draw.on_pointer(&handle, PointerEvent::Down { at: at(1.0, 1.0) });
        let resp = draw.on_pointer(&handle, PointerEvent::Up { at: at(1.0, 1.0) });
        assert!(resp.events.is_empty());
    }

    #[test]
    fn test_miss_click_is_surfaced_for_correlation() {
        let (_s, handle) = recording_surface();
        let mut draw = FreehandDraw::new();
        draw.set_collection(vec![]).unwrap();

        let resp = draw.on_pointer(&handle, PointerEvent::Down { at: at(30.0, 30.0) });
        assert!(!resp.consumed);
        assert!(matches!(resp.events.as_slice(), [DrawEvent::Click { .. }]));
    }

    #[test]
    fn test_direct_select_vertex_drag_keeps_polygon_closed() {
        let (_s, handle) = recording_surface();
        let mut draw = FreehandDraw::new();
        draw.set_collection(vec![PluginFeature {
            local_id: "poly".into(),
            backend_id: Some(3),
            geometry: Geometry::Polygon {
                coordinates: vec![vec![[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 0.0]]],
            },
            properties: FeatureProperties::default(),
        }])
        .unwrap();

        // enter vertex editing via double-click on a vertex
        let resp = draw.on_pointer(&handle, PointerEvent::DoubleClick { at: at(0.0, 0.0) });
        assert!(matches!(
            resp.events.as_slice(),
            [DrawEvent::ModeChanged(DrawMode::DirectSelect)]
        ));

        draw.on_pointer(&handle, PointerEvent::Down { at: at(0.0, 0.0) });
        draw.on_pointer(&handle, PointerEvent::Move { at: at(-1.0, -1.0) });
        let resp = draw.on_pointer(&handle, PointerEvent::Up { at: at(-1.0, -1.0) });

        match resp.events.as_slice() {
            [DrawEvent::Updated { geometry: Geometry::Polygon { coordinates }, .. }] => {
                let ring = &coordinates[0];
                assert_eq!(ring[0], [-1.0, -1.0]);
                assert_eq!(ring.first(), ring.last());
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    #[test]
    fn test_direct_select_outside_click_returns_to_simple_select() {
        let (_s, handle) = recording_surface();
        let mut draw = FreehandDraw::new();
        draw.set_collection(vec![PluginFeature {
            local_id: "line".into(),
            backend_id: Some(2),
            geometry: Geometry::LineString { coordinates: vec![[0.0, 0.0], [1.0, 0.0]] },
            properties: FeatureProperties::default(),
        }])
        .unwrap();
        draw.on_pointer(&handle, PointerEvent::DoubleClick { at: at(0.0, 0.0) });
        assert_eq!(draw.mode(), DrawMode::DirectSelect);

        let resp = draw.on_pointer(&handle, PointerEvent::Down { at: at(30.0, 30.0) });
        assert_eq!(draw.mode(), DrawMode::SimpleSelect);
        assert!(matches!(
            resp.events.as_slice(),
            [DrawEvent::ModeChanged(DrawMode::SimpleSelect)]
        ));
    }
}
