//! Rendering-surface adapter.
//!
//! The underlying rendering library can schedule callbacks that outlive the
//! component that mounted it, so nothing in the engine holds a raw surface
//! reference. Sub-components get clones of [`SurfaceHandle`], whose every
//! accessor first checks a `mounted` flag and the surface's own `removed`
//! flag and returns an inert default instead of touching freed state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use shared::{Geometry, LngLat};

/// A position in surface pixels, origin at the top-left of the canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

impl ScreenPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Current camera state as reported by the surface.
///
/// `camera_altitude_m` is the surface's true 3D camera height converted to
/// meters via its own unit primitive, when the surface supports one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub center: LngLat,
    pub zoom: f64,
    pub bearing: f64,
    pub pitch: f64,
    pub camera_altitude_m: Option<f64>,
}

/// Elevation encoding of a raster-DEM source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DemEncoding {
    Terrarium,
    Mapbox,
}

/// A render-level vector feature pushed into a geojson source.
///
/// `key` identifies the feature for hover state and hit queries: the entity
/// id for entity markers, the stringified backend id for markup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurfaceFeature {
    pub key: String,
    pub geometry: Geometry,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// Source descriptor handed to the surface
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SourceSpec {
    RasterTiles {
        tiles: Vec<String>,
        tile_size: u32,
        max_zoom: u8,
        attribution: Option<String>,
    },
    RasterDem {
        tiles: Vec<String>,
        tile_size: u32,
        max_zoom: u8,
        encoding: DemEncoding,
    },
    GeoJson {
        features: Vec<SurfaceFeature>,
    },
}

/// Style layer descriptor. `color: None` means "read the feature's own
/// `color` property" (markup layers); a fixed color is used otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LayerSpec {
    Raster {
        id: String,
        source: String,
        opacity: f64,
    },
    Hillshade {
        id: String,
        source: String,
        exaggeration: f64,
    },
    Fill {
        id: String,
        source: String,
        color: Option<String>,
        opacity: f64,
    },
    Line {
        id: String,
        source: String,
        color: Option<String>,
        width: f32,
        opacity: f64,
    },
    Circle {
        id: String,
        source: String,
        color: Option<String>,
        radius: f32,
        hover_radius: f32,
        opacity: f64,
    },
}

impl LayerSpec {
    pub fn id(&self) -> &str {
        match self {
            LayerSpec::Raster { id, .. }
            | LayerSpec::Hillshade { id, .. }
            | LayerSpec::Fill { id, .. }
            | LayerSpec::Line { id, .. }
            | LayerSpec::Circle { id, .. } => id,
        }
    }
}

/// A rendered feature found under the pointer
#[derive(Debug, Clone, PartialEq)]
pub struct PickedFeature {
    pub layer: String,
    pub source: String,
    pub key: String,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// Pointer affordance requested by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorStyle {
    #[default]
    Default,
    Grab,
    Grabbing,
    Crosshair,
}

/// The operations the engine needs from a rendering backend.
///
/// Implementations are not required to be defensive; all lifecycle guarding
/// lives in [`SurfaceHandle`]. `is_removed` reports whether the backend has
/// internally torn itself down (the "removed" flag of spec'd map libraries).
pub trait RenderSurface: Send {
    fn add_source(&mut self, id: &str, spec: SourceSpec);
    fn remove_source(&mut self, id: &str);
    fn has_source(&self, id: &str) -> bool;

    fn add_layer(&mut self, spec: LayerSpec, before: Option<&str>);
    fn remove_layer(&mut self, id: &str);
    fn has_layer(&self, id: &str) -> bool;

    fn set_source_features(&mut self, source: &str, features: Vec<SurfaceFeature>);
    fn set_feature_hover(&mut self, source: &str, key: &str, hovered: bool);

    fn set_cursor(&mut self, cursor: CursorStyle);
    fn set_pan_enabled(&mut self, enabled: bool);

    fn screen_to_lnglat(&self, point: ScreenPoint) -> Option<LngLat>;
    fn viewport_px(&self) -> (f32, f32);
    fn camera(&self) -> CameraPose;
    fn query_point_features(&self, point: ScreenPoint) -> Vec<PickedFeature>;

    fn is_removed(&self) -> bool;
}

/// Cloneable, teardown-safe handle to the rendering surface
#[derive(Clone)]
pub struct SurfaceHandle {
    inner: Arc<Mutex<dyn RenderSurface>>,
    mounted: Arc<AtomicBool>,
}

impl SurfaceHandle {
    pub fn new(surface: Arc<Mutex<dyn RenderSurface>>) -> Self {
        Self {
            inner: surface,
            mounted: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Mark the surface as gone. Every accessor on every clone is inert
    /// from this point on.
    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    fn with<R>(&self, default: R, f: impl FnOnce(&mut dyn RenderSurface) -> R) -> R {
        if !self.mounted.load(Ordering::SeqCst) {
            return default;
        }
        let Ok(mut guard) = self.inner.lock() else {
            return default;
        };
        if guard.is_removed() {
            return default;
        }
        f(&mut *guard)
    }

    pub fn add_source(&self, id: &str, spec: SourceSpec) {
        self.with((), |s| s.add_source(id, spec));
    }

    pub fn remove_source(&self, id: &str) {
        self.with((), |s| s.remove_source(id));
    }

    pub fn has_source(&self, id: &str) -> bool {
        self.with(false, |s| s.has_source(id))
    }

    pub fn add_layer(&self, spec: LayerSpec, before: Option<&str>) {
        self.with((), |s| s.add_layer(spec, before));
    }

    pub fn remove_layer(&self, id: &str) {
        self.with((), |s| s.remove_layer(id));
    }

    pub fn has_layer(&self, id: &str) -> bool {
        self.with(false, |s| s.has_layer(id))
    }

    pub fn set_source_features(&self, source: &str, features: Vec<SurfaceFeature>) {
        self.with((), |s| s.set_source_features(source, features));
    }

    pub fn set_feature_hover(&self, source: &str, key: &str, hovered: bool) {
        self.with((), |s| s.set_feature_hover(source, key, hovered));
    }

    pub fn set_cursor(&self, cursor: CursorStyle) {
        self.with((), |s| s.set_cursor(cursor));
    }

    pub fn set_pan_enabled(&self, enabled: bool) {
        self.with((), |s| s.set_pan_enabled(enabled));
    }

    pub fn screen_to_lnglat(&self, point: ScreenPoint) -> Option<LngLat> {
        self.with(None, |s| s.screen_to_lnglat(point))
    }

    pub fn viewport_px(&self) -> (f32, f32) {
        self.with((0.0, 0.0), |s| s.viewport_px())
    }

    pub fn camera(&self) -> Option<CameraPose> {
        self.with(None, |s| Some(s.camera()))
    }

    pub fn query_point_features(&self, point: ScreenPoint) -> Vec<PickedFeature> {
        self.with(Vec::new(), |s| s.query_point_features(point))
    }
}
