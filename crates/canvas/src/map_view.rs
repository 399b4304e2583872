//! egui rendering backend for the map engine.
//!
//! Web-mercator slippy map drawn with the egui painter: raster tiles from
//! the background fetcher, vector sources as painter shapes. Implements
//! [`RenderSurface`] so the engine drives it through the guarded handle.

use std::collections::{HashMap, HashSet};

use eframe::egui;
use glam::DVec2;
use shared::{Geometry, LngLat};

use opsmap_canvas_lib::input::PointerEvent;
use opsmap_canvas_lib::surface::{
    CameraPose, CursorStyle, LayerSpec, PickedFeature, RenderSurface, ScreenPoint, SourceSpec,
    SurfaceFeature,
};

use crate::tile_fetch::{expand_template, lon_lat_to_tile, TileCoord, TileFetcher, TileKey};

const TILE_SIZE: f64 = 256.0;
const MAX_CACHED_TEXTURES: usize = 512;

/// Raw per-frame input the engine does not consume
#[derive(Default, Clone, Copy)]
pub struct FrameInput {
    pub drag_delta: egui::Vec2,
    pub scroll_delta: f32,
    pub hover_pos: Option<egui::Pos2>,
}

pub struct MapView {
    pub center: LngLat,
    pub zoom: f64,
    viewport: egui::Rect,
    sources: Vec<(String, SourceSpec)>,
    layers: Vec<LayerSpec>,
    hovered: HashSet<(String, String)>,
    cursor: CursorStyle,
    pan_enabled: bool,
    fetcher: TileFetcher,
    textures: HashMap<TileKey, egui::TextureHandle>,
}

impl MapView {
    pub fn new(center: LngLat, zoom: f64) -> Self {
        Self {
            center,
            zoom,
            viewport: egui::Rect::from_min_size(egui::Pos2::ZERO, egui::Vec2::ZERO),
            sources: Vec::new(),
            layers: Vec::new(),
            hovered: HashSet::new(),
            cursor: CursorStyle::Default,
            pan_enabled: true,
            fetcher: TileFetcher::spawn(),
            textures: HashMap::new(),
        }
    }

    pub fn jump_to(&mut self, center: LngLat, zoom: f64) {
        self.center = center;
        self.zoom = zoom.clamp(1.0, 22.0);
    }

    /// Allocate the canvas, paint everything, and report raw input.
    /// Pointer events are returned for the engine to route; unconsumed
    /// panning/zoom is applied afterwards via [`Self::pan`]/[`Self::zoom_by`].
    pub fn frame(&mut self, ui: &mut egui::Ui) -> (Vec<PointerEvent>, FrameInput) {
        let size = ui.available_size();
        let (rect, response) = ui.allocate_exact_size(size, egui::Sense::click_and_drag());
        self.viewport = rect;

        for result in self.fetcher.poll() {
            if self.textures.len() >= MAX_CACHED_TEXTURES {
                // blunt eviction; the fetcher refills what is visible
                self.textures.clear();
            }
            let name = format!(
                "tile-{}-{}-{}-{}",
                result.key.source, result.key.coord.z, result.key.coord.x, result.key.coord.y
            );
            let handle = ui
                .ctx()
                .load_texture(name, result.image, egui::TextureOptions::LINEAR);
            self.textures.insert(result.key, handle);
        }

        self.paint(ui.painter());
        ui.ctx().set_cursor_icon(cursor_icon(self.cursor));

        let events = gather_events(&response);
        let input = FrameInput {
            drag_delta: response.drag_delta(),
            scroll_delta: ui.input(|i| i.smooth_scroll_delta.y),
            hover_pos: response.hover_pos(),
        };
        (events, input)
    }

    pub fn pan_enabled(&self) -> bool {
        self.pan_enabled
    }

    pub fn pan(&mut self, delta: egui::Vec2) {
        if delta == egui::Vec2::ZERO {
            return;
        }
        let world = self.lnglat_to_world(self.center) - DVec2::new(delta.x as f64, delta.y as f64);
        self.center = self.world_to_lnglat(world);
    }

    /// Zoom around an anchor point so the location under the cursor stays put
    pub fn zoom_by(&mut self, scroll: f32, anchor: Option<egui::Pos2>) {
        if scroll == 0.0 {
            return;
        }
        let anchor = anchor.unwrap_or_else(|| self.viewport.center());
        let before = self.unproject(ScreenPoint::new(anchor.x, anchor.y));
        self.zoom = (self.zoom + scroll as f64 * 0.003).clamp(1.0, 22.0);
        if let Some(before) = before {
            let after = self.project(before);
            self.pan(egui::vec2(anchor.x - after.x, anchor.y - after.y));
        }
    }

    fn world_size(&self) -> f64 {
        TILE_SIZE * self.zoom.exp2()
    }

    fn lnglat_to_world(&self, pos: LngLat) -> DVec2 {
        let size = self.world_size();
        let x = (pos.lng + 180.0) / 360.0 * size;
        let siny = pos.lat.to_radians().sin().clamp(-0.9999, 0.9999);
        let y = (0.5 - ((1.0 + siny) / (1.0 - siny)).ln() / (4.0 * std::f64::consts::PI)) * size;
        DVec2::new(x, y)
    }

    fn world_to_lnglat(&self, world: DVec2) -> LngLat {
        let size = self.world_size();
        let lng = world.x / size * 360.0 - 180.0;
        let n = std::f64::consts::PI * (1.0 - 2.0 * world.y / size);
        let lat = n.sinh().atan().to_degrees();
        LngLat::new(lng, lat)
    }

    fn project(&self, pos: LngLat) -> ScreenPoint {
        let center = self.lnglat_to_world(self.center);
        let world = self.lnglat_to_world(pos);
        let c = self.viewport.center();
        ScreenPoint::new(
            c.x + (world.x - center.x) as f32,
            c.y + (world.y - center.y) as f32,
        )
    }

    fn unproject(&self, point: ScreenPoint) -> Option<LngLat> {
        if self.viewport.width() <= 0.0 || self.viewport.height() <= 0.0 {
            return None;
        }
        let c = self.viewport.center();
        let center = self.lnglat_to_world(self.center);
        let world = DVec2::new(
            center.x + (point.x - c.x) as f64,
            center.y + (point.y - c.y) as f64,
        );
        let pos = self.world_to_lnglat(world);
        pos.is_finite().then_some(pos)
    }

    fn paint(&mut self, painter: &egui::Painter) {
        painter.rect_filled(self.viewport, 0.0, egui::Color32::from_rgb(18, 22, 28));
        let layers = self.layers.clone();
        for layer in &layers {
            match layer {
                LayerSpec::Raster { source, opacity, .. } => {
                    self.paint_raster(painter, source, *opacity);
                }
                // DEM shading needs a GPU pass; the painter backend keeps
                // the layer slot but draws nothing for it
                LayerSpec::Hillshade { .. } => {}
                LayerSpec::Fill { source, color, opacity, .. } => {
                    self.paint_fills(painter, source, color.as_deref(), *opacity);
                }
                LayerSpec::Line { source, color, width, opacity, .. } => {
                    self.paint_lines(painter, source, color.as_deref(), *width, *opacity);
                }
                LayerSpec::Circle { source, color, radius, hover_radius, .. } => {
                    self.paint_circles(painter, source, color.as_deref(), *radius, *hover_radius);
                }
            }
        }
    }

    fn paint_raster(&mut self, painter: &egui::Painter, source: &str, opacity: f64) {
        let Some((template, max_zoom)) = self.sources.iter().find_map(|(id, spec)| {
            match spec {
                SourceSpec::RasterTiles { tiles, max_zoom, .. } if id == source => {
                    tiles.first().map(|t| (t.clone(), *max_zoom))
                }
                _ => None,
            }
        }) else {
            return;
        };

        let z = (self.zoom.floor() as i64).clamp(1, max_zoom as i64) as u8;
        let scale = self.zoom.exp2() / f64::from(1u32 << z);
        let px = TILE_SIZE * scale;

        let origin = lon_lat_to_tile(self.center.lng, self.center.lat, z);
        let cols = (self.viewport.width() as f64 / px).ceil() as i64 / 2 + 2;
        let rows = (self.viewport.height() as f64 / px).ceil() as i64 / 2 + 2;
        let n = 1i64 << z;

        let tint = egui::Color32::from_white_alpha((opacity.clamp(0.0, 1.0) * 255.0) as u8);
        for dy in -rows..=rows {
            let y = origin.y as i64 + dy;
            if y < 0 || y >= n {
                continue;
            }
            for dx in -cols..=cols {
                let x = (origin.x as i64 + dx).rem_euclid(n);
                let coord = TileCoord { x: x as u32, y: y as u32, z };
                let key = TileKey { source: source.to_string(), coord };
                let top_left = self.tile_screen_origin(coord, dx, px);
                let rect = egui::Rect::from_min_size(top_left, egui::vec2(px as f32, px as f32));
                if !rect.intersects(self.viewport) {
                    continue;
                }
                match self.textures.get(&key) {
                    Some(texture) => {
                        painter.image(
                            texture.id(),
                            rect,
                            egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                            tint,
                        );
                    }
                    None => {
                        if !self.fetcher.is_pending(&key) {
                            let url = expand_template(&template, coord);
                            self.fetcher.request(key, url);
                        }
                    }
                }
            }
        }
    }

    /// Screen origin of a tile, expressed relative to the tile column the
    /// camera sits in so antimeridian wrap keeps tiles adjacent.
    fn tile_screen_origin(&self, coord: TileCoord, dx_from_center: i64, px: f64) -> egui::Pos2 {
        let center_world = self.lnglat_to_world(self.center);
        let origin = lon_lat_to_tile(self.center.lng, self.center.lat, coord.z);
        let tile_x = (origin.x as i64 + dx_from_center) as f64;
        let tile_y = coord.y as f64;
        let c = self.viewport.center();
        egui::pos2(
            c.x + (tile_x * px - center_world.x) as f32,
            c.y + (tile_y * px - center_world.y) as f32,
        )
    }

    fn features_of(&self, source: &str) -> &[SurfaceFeature] {
        self.sources
            .iter()
            .find_map(|(id, spec)| match spec {
                SourceSpec::GeoJson { features } if id == source => Some(features.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    fn paint_fills(&self, painter: &egui::Painter, source: &str, color: Option<&str>, opacity: f64) {
        for feature in self.features_of(source) {
            let Geometry::Polygon { coordinates } = &feature.geometry else {
                continue;
            };
            let Some(ring) = coordinates.first() else {
                continue;
            };
            let points: Vec<egui::Pos2> = ring
                .iter()
                .map(|c| {
                    let p = self.project(LngLat::from(*c));
                    egui::pos2(p.x, p.y)
                })
                .collect();
            let fill = feature_color(color, &feature.properties, opacity);
            painter.add(egui::Shape::convex_polygon(points, fill, egui::Stroke::NONE));
        }
    }

    fn paint_lines(
        &self,
        painter: &egui::Painter,
        source: &str,
        color: Option<&str>,
        width: f32,
        opacity: f64,
    ) {
        for feature in self.features_of(source) {
            let coords: &[[f64; 2]] = match &feature.geometry {
                Geometry::LineString { coordinates } => coordinates,
                Geometry::Polygon { coordinates } => {
                    coordinates.first().map(Vec::as_slice).unwrap_or(&[])
                }
                Geometry::Point { .. } => continue,
            };
            let points: Vec<egui::Pos2> = coords
                .iter()
                .map(|c| {
                    let p = self.project(LngLat::from(*c));
                    egui::pos2(p.x, p.y)
                })
                .collect();
            let stroke_color = feature_color(color, &feature.properties, opacity);
            painter.add(egui::Shape::line(points, egui::Stroke::new(width, stroke_color)));
        }
    }

    fn paint_circles(
        &self,
        painter: &egui::Painter,
        source: &str,
        color: Option<&str>,
        radius: f32,
        hover_radius: f32,
    ) {
        for feature in self.features_of(source) {
            let Geometry::Point { coordinates } = &feature.geometry else {
                continue;
            };
            let p = self.project(LngLat::from(*coordinates));
            let hovered = self
                .hovered
                .contains(&(source.to_string(), feature.key.clone()));
            let r = if hovered { hover_radius } else { radius };
            let fill = feature_color(color, &feature.properties, 1.0);
            painter.circle(
                egui::pos2(p.x, p.y),
                r,
                fill,
                egui::Stroke::new(1.5, egui::Color32::WHITE),
            );
        }
    }
}

impl RenderSurface for MapView {
    fn add_source(&mut self, id: &str, spec: SourceSpec) {
        if matches!(spec, SourceSpec::RasterTiles { .. } | SourceSpec::RasterDem { .. }) {
            self.fetcher.bump_generation();
        }
        self.sources.retain(|(sid, _)| sid != id);
        self.sources.push((id.to_string(), spec));
    }

    fn remove_source(&mut self, id: &str) {
        self.sources.retain(|(sid, _)| sid != id);
        self.textures.retain(|key, _| key.source != id);
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.iter().any(|(sid, _)| sid == id)
    }

    fn add_layer(&mut self, spec: LayerSpec, before: Option<&str>) {
        match before.and_then(|b| self.layers.iter().position(|l| l.id() == b)) {
            Some(idx) => self.layers.insert(idx, spec),
            None => self.layers.push(spec),
        }
    }

    fn remove_layer(&mut self, id: &str) {
        self.layers.retain(|l| l.id() != id);
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layers.iter().any(|l| l.id() == id)
    }

    fn set_source_features(&mut self, source: &str, features: Vec<SurfaceFeature>) {
        if let Some((_, spec)) = self.sources.iter_mut().find(|(sid, _)| sid == source) {
            *spec = SourceSpec::GeoJson { features };
        }
    }

    fn set_feature_hover(&mut self, source: &str, key: &str, hovered: bool) {
        let entry = (source.to_string(), key.to_string());
        if hovered {
            self.hovered.insert(entry);
        } else {
            self.hovered.remove(&entry);
        }
    }

    fn set_cursor(&mut self, cursor: CursorStyle) {
        self.cursor = cursor;
    }

    fn set_pan_enabled(&mut self, enabled: bool) {
        self.pan_enabled = enabled;
    }

    fn screen_to_lnglat(&self, point: ScreenPoint) -> Option<LngLat> {
        self.unproject(point)
    }

    fn viewport_px(&self) -> (f32, f32) {
        (self.viewport.width(), self.viewport.height())
    }

    fn camera(&self) -> CameraPose {
        CameraPose {
            center: self.center,
            zoom: self.zoom,
            bearing: 0.0,
            pitch: 0.0,
            camera_altitude_m: None,
        }
    }

    fn query_point_features(&self, point: ScreenPoint) -> Vec<PickedFeature> {
        let mut hits = Vec::new();
        for layer in &self.layers {
            let LayerSpec::Circle { id, source, hover_radius, .. } = layer else {
                continue;
            };
            for feature in self.features_of(source) {
                let Geometry::Point { coordinates } = &feature.geometry else {
                    continue;
                };
                let p = self.project(LngLat::from(*coordinates));
                let d2 = (p.x - point.x).powi(2) + (p.y - point.y).powi(2);
                if d2 <= hover_radius * hover_radius {
                    hits.push(PickedFeature {
                        layer: id.clone(),
                        source: source.clone(),
                        key: feature.key.clone(),
                        properties: feature.properties.clone(),
                    });
                }
            }
        }
        hits
    }

    fn is_removed(&self) -> bool {
        false
    }
}

fn gather_events(response: &egui::Response) -> Vec<PointerEvent> {
    let mut events = Vec::new();
    let at = |pos: egui::Pos2| ScreenPoint::new(pos.x, pos.y);

    if response.double_clicked() {
        if let Some(pos) = response.interact_pointer_pos() {
            events.push(PointerEvent::DoubleClick { at: at(pos) });
        }
        return events;
    }
    if response.drag_started() {
        if let Some(pos) = response.interact_pointer_pos() {
            events.push(PointerEvent::Down { at: at(pos) });
        }
    } else if response.clicked() {
        // a click is a press-release pair with no drag in between
        if let Some(pos) = response.interact_pointer_pos() {
            events.push(PointerEvent::Down { at: at(pos) });
            events.push(PointerEvent::Up { at: at(pos) });
        }
    }
    if response.dragged() && !response.drag_started() {
        if let Some(pos) = response.interact_pointer_pos() {
            events.push(PointerEvent::Move { at: at(pos) });
        }
    } else if let Some(pos) = response.hover_pos() {
        events.push(PointerEvent::Move { at: at(pos) });
    }
    if response.drag_stopped() {
        if let Some(pos) = response.interact_pointer_pos() {
            events.push(PointerEvent::Up { at: at(pos) });
        } else {
            events.push(PointerEvent::Cancel);
        }
    }
    events
}

fn cursor_icon(cursor: CursorStyle) -> egui::CursorIcon {
    match cursor {
        CursorStyle::Default => egui::CursorIcon::Default,
        CursorStyle::Grab => egui::CursorIcon::Grab,
        CursorStyle::Grabbing => egui::CursorIcon::Grabbing,
        CursorStyle::Crosshair => egui::CursorIcon::Crosshair,
    }
}

fn feature_color(
    layer_color: Option<&str>,
    properties: &serde_json::Map<String, serde_json::Value>,
    opacity: f64,
) -> egui::Color32 {
    let hex = layer_color.or_else(|| properties.get("color").and_then(|v| v.as_str()));
    let base = hex.and_then(parse_hex).unwrap_or(egui::Color32::LIGHT_BLUE);
    base.gamma_multiply(opacity.clamp(0.0, 1.0) as f32)
}

fn parse_hex(hex: &str) -> Option<egui::Color32> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(egui::Color32::from_rgb(r, g, b))
}
