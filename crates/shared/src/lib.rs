//! Wire and domain model shared by the map canvas and the dev server.

mod geometry;

pub use geometry::{Geometry, LngLat};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Backend-assigned identifier for layers and markup features
pub type BackendId = i64;

/// Whether a layer participates as the base map or stacks above it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Base,
    Overlay,
}

/// Provider family of a layer's tile/vector source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Xyz,
    Arcgis,
    Wms,
    Geojson,
    Terrain,
}

/// A persisted map layer definition.
///
/// `config` is provider-specific JSON (URL templates, WMS parameters,
/// embedded geojson data, ...); the canvas reads it defensively and skips
/// layers whose config is incomplete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapLayer {
    pub id: BackendId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_key: Option<String>,
    pub name: String,
    pub kind: LayerKind,
    pub source_type: SourceType,
    pub config: JsonValue,
    pub opacity: f64,
    pub enabled: bool,
    pub z_index: i32,
}

/// Partial update for a layer (enablement / order / opacity)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapLayerPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i32>,
}

/// Flat, string-keyed markup feature properties.
///
/// Unknown keys are preserved round-trip in `extra`; the canvas itself only
/// interprets the four named fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub notes: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

/// A persisted markup feature (free-form point/line/polygon annotation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapFeature {
    pub id: BackendId,
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: FeatureProperties,
}

/// Monitored entity categories rendered as draggable markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Node,
    Sensor,
}

/// Per-render projection of a monitored entity onto the map.
///
/// Derived from live domain state joined with persisted location overrides;
/// the canvas never persists these, it only emits a relocate on drag-end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPoint {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
    /// One-line status/subtitle shown in the inspector popup
    pub status_line: String,
    pub lng: f64,
    pub lat: f64,
}

/// Location override written exactly once per completed drag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityLocationUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<String>,
    pub lng: f64,
    pub lat: f64,
}

/// Persisted camera state of the active map save
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub center_lat: f64,
    pub center_lng: f64,
    pub zoom: f64,
    #[serde(default)]
    pub bearing: f64,
    #[serde(default)]
    pub pitch: f64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            center_lat: 37.09,
            center_lng: -122.26,
            zoom: 12.0,
            bearing: 0.0,
            pitch: 0.0,
        }
    }
}

/// Request body for creating a markup feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureUpsert {
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: FeatureProperties,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_wire_format() {
        let json = r#"{
            "id": 3,
            "system_key": "streets",
            "name": "Streets (OpenStreetMap)",
            "kind": "base",
            "source_type": "xyz",
            "config": {"url_template": "https://tile.openstreetmap.org/{z}/{x}/{y}.png"},
            "opacity": 1.0,
            "enabled": true,
            "z_index": 0
        }"#;
        let layer: MapLayer = serde_json::from_str(json).unwrap();
        assert_eq!(layer.kind, LayerKind::Base);
        assert_eq!(layer.source_type, SourceType::Xyz);
        assert_eq!(layer.system_key.as_deref(), Some("streets"));
    }

    #[test]
    fn test_feature_properties_preserve_unknown_keys() {
        let json = r##"{"name":"Pump house","kind":"hardware","color":"#f97316","notes":"","backend_id":12}"##;
        let props: FeatureProperties = serde_json::from_str(json).unwrap();
        assert_eq!(props.name, "Pump house");
        assert_eq!(props.extra.get("backend_id").and_then(|v| v.as_i64()), Some(12));

        let back = serde_json::to_value(&props).unwrap();
        assert_eq!(back.get("backend_id").and_then(|v| v.as_i64()), Some(12));
    }
}
