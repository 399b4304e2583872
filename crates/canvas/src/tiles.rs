//! Builds concrete tile/source descriptors from persisted layer configs.
//!
//! A layer with an incomplete config (missing URL, base URL or WMS layer
//! list) yields `None` and is silently skipped by the compositor; malformed
//! definitions are never fatal to the composition pass.

use serde_json::Value as JsonValue;
use shared::{Geometry, MapLayer, SourceType};

use crate::surface::{DemEncoding, SourceSpec, SurfaceFeature};

const DEFAULT_TILE_SIZE: u32 = 256;
const DEFAULT_MAX_ZOOM: u8 = 19;
const TERRAIN_MAX_ZOOM: u8 = 13;

/// Zoom ceilings for known tile providers, matched as host substrings
const PROVIDER_MAX_ZOOM: &[(&str, u8)] = &[
    ("openstreetmap.org", 19),
    ("arcgisonline.com", 23),
    ("nationalmap.gov", 16),
    ("opentopomap.org", 17),
];

/// Build the source descriptor for a layer, or `None` if its config is
/// incomplete.
pub fn build_source(layer: &MapLayer) -> Option<SourceSpec> {
    match layer.source_type {
        SourceType::Xyz => build_xyz(layer),
        SourceType::Arcgis => build_arcgis(layer),
        SourceType::Wms => build_wms(layer),
        SourceType::Terrain => build_terrain(layer),
        SourceType::Geojson => build_geojson(layer),
    }
}

fn build_xyz(layer: &MapLayer) -> Option<SourceSpec> {
    let template = cfg_str(&layer.config, "url_template")?;
    Some(SourceSpec::RasterTiles {
        tiles: vec![template.to_string()],
        tile_size: cfg_u32(&layer.config, "tile_size").unwrap_or(DEFAULT_TILE_SIZE),
        max_zoom: max_zoom_for(layer, template),
        attribution: cfg_str(&layer.config, "attribution").map(str::to_string),
    })
}

fn build_arcgis(layer: &MapLayer) -> Option<SourceSpec> {
    let base = cfg_str(&layer.config, "base_url")?.trim_end_matches('/').to_string();
    let tile_size = cfg_u32(&layer.config, "tile_size").unwrap_or(DEFAULT_TILE_SIZE);
    let mode = cfg_str(&layer.config, "mode").unwrap_or("tile");

    let (url, max_zoom) = if mode == "export" {
        let format = cfg_str(&layer.config, "format").unwrap_or("png32");
        let transparent = cfg_bool(&layer.config, "transparent").unwrap_or(true);
        let url = format!(
            "{base}/export?bbox={{bbox-epsg-3857}}&bboxSR=3857&imageSR=3857\
             &size={tile_size},{tile_size}&format={format}&transparent={transparent}&f=image"
        );
        // Export services have no tiling pyramid; only tile mode gets the
        // provider-derived zoom ceiling.
        let max_zoom = cfg_u8(&layer.config, "max_zoom").unwrap_or(DEFAULT_MAX_ZOOM);
        (url, max_zoom)
    } else {
        let url = format!("{base}/tile/{{z}}/{{y}}/{{x}}");
        (url.clone(), max_zoom_for(layer, &url))
    };

    Some(SourceSpec::RasterTiles {
        tiles: vec![url],
        tile_size,
        max_zoom,
        attribution: cfg_str(&layer.config, "attribution").map(str::to_string),
    })
}

fn build_wms(layer: &MapLayer) -> Option<SourceSpec> {
    let base = cfg_str(&layer.config, "base_url")?;
    let layers = cfg_str(&layer.config, "layers")?;
    let version = cfg_str(&layer.config, "version").unwrap_or("1.1.1");
    // WMS 1.3.x renamed the projection parameter
    let crs_param = if version.starts_with("1.3") { "CRS" } else { "SRS" };
    let styles = cfg_str(&layer.config, "styles").unwrap_or("");
    let format = cfg_str(&layer.config, "format").unwrap_or("image/png");
    let transparent = cfg_bool(&layer.config, "transparent").unwrap_or(true);
    let tile_size = cfg_u32(&layer.config, "tile_size").unwrap_or(DEFAULT_TILE_SIZE);

    let join = if base.contains('?') { '&' } else { '?' };
    let url = format!(
        "{base}{join}service=WMS&request=GetMap&version={version}&{crs_param}=EPSG:3857\
         &layers={}&styles={}&format={}&transparent={transparent}\
         &width={tile_size}&height={tile_size}&bbox={{bbox-epsg-3857}}",
        encode_query_value(layers),
        encode_query_value(styles),
        encode_query_value(format),
    );

    Some(SourceSpec::RasterTiles {
        tiles: vec![url],
        tile_size,
        max_zoom: cfg_u8(&layer.config, "max_zoom").unwrap_or(DEFAULT_MAX_ZOOM),
        attribution: cfg_str(&layer.config, "attribution").map(str::to_string),
    })
}

fn build_terrain(layer: &MapLayer) -> Option<SourceSpec> {
    let template = cfg_str(&layer.config, "url_template")?;
    let encoding = match cfg_str(&layer.config, "encoding") {
        Some("mapbox") => DemEncoding::Mapbox,
        _ => DemEncoding::Terrarium,
    };
    Some(SourceSpec::RasterDem {
        tiles: vec![template.to_string()],
        tile_size: cfg_u32(&layer.config, "tile_size").unwrap_or(DEFAULT_TILE_SIZE),
        max_zoom: cfg_u8(&layer.config, "max_zoom").unwrap_or(TERRAIN_MAX_ZOOM),
        encoding,
    })
}

fn build_geojson(layer: &MapLayer) -> Option<SourceSpec> {
    let features = layer.config.get("data")?.get("features")?.as_array()?;
    let mut out = Vec::with_capacity(features.len());
    for (idx, feat) in features.iter().enumerate() {
        let Some(geometry) = feat
            .get("geometry")
            .and_then(|g| serde_json::from_value::<Geometry>(g.clone()).ok())
        else {
            continue; // unsupported geometry types are skipped, not fatal
        };
        let key = feat
            .get("id")
            .map(|id| id.to_string().trim_matches('"').to_string())
            .unwrap_or_else(|| idx.to_string());
        let properties = feat
            .get("properties")
            .and_then(JsonValue::as_object)
            .cloned()
            .unwrap_or_default();
        out.push(SurfaceFeature {
            key,
            geometry,
            properties,
        });
    }
    Some(SourceSpec::GeoJson { features: out })
}

/// Zoom ceiling for a tiled raster layer: explicit config wins, then the
/// `system_key` table, then known provider hosts, then 19.
fn max_zoom_for(layer: &MapLayer, url: &str) -> u8 {
    if let Some(explicit) = cfg_u8(&layer.config, "max_zoom") {
        return explicit;
    }
    if let Some(key) = layer.system_key.as_deref() {
        // offline pack variants reuse the base key as a suffix
        let base = key.rsplit('_').next().unwrap_or(key);
        match base {
            "topo" => return 16,
            "streets" => return 19,
            "satellite" => return 23,
            _ => {}
        }
    }
    for (host, zoom) in PROVIDER_MAX_ZOOM {
        if url.contains(host) {
            return *zoom;
        }
    }
    DEFAULT_MAX_ZOOM
}

fn cfg_str<'a>(config: &'a JsonValue, key: &str) -> Option<&'a str> {
    match config.get(key).and_then(JsonValue::as_str) {
        Some("") | None => None,
        Some(s) => Some(s),
    }
}

fn cfg_u32(config: &JsonValue, key: &str) -> Option<u32> {
    config.get(key).and_then(JsonValue::as_u64).map(|v| v as u32)
}

fn cfg_u8(config: &JsonValue, key: &str) -> Option<u8> {
    config.get(key).and_then(JsonValue::as_u64).map(|v| v.min(24) as u8)
}

fn cfg_bool(config: &JsonValue, key: &str) -> Option<bool> {
    config.get(key).and_then(JsonValue::as_bool)
}

/// Percent-encode a query-string value (RFC 3986 unreserved set kept as-is)
fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::LayerKind;

    fn layer(source_type: SourceType, config: JsonValue) -> MapLayer {
        MapLayer {
            id: 1,
            system_key: None,
            name: "test".into(),
            kind: LayerKind::Base,
            source_type,
            config,
            opacity: 1.0,
            enabled: true,
            z_index: 0,
        }
    }

    fn single_tile_url(spec: &SourceSpec) -> &str {
        match spec {
            SourceSpec::RasterTiles { tiles, .. } | SourceSpec::RasterDem { tiles, .. } => {
                &tiles[0]
            }
            SourceSpec::GeoJson { .. } => panic!("expected raster source"),
        }
    }

    #[test]
    fn test_xyz_passes_template_through() {
        let l = layer(
            SourceType::Xyz,
            json!({"url_template": "https://tile.openstreetmap.org/{z}/{x}/{y}.png"}),
        );
        let spec = build_source(&l).unwrap();
        match &spec {
            SourceSpec::RasterTiles { tiles, tile_size, max_zoom, .. } => {
                assert_eq!(tiles[0], "https://tile.openstreetmap.org/{z}/{x}/{y}.png");
                assert_eq!(*tile_size, 256);
                assert_eq!(*max_zoom, 19);
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[test]
    fn test_xyz_missing_url_skipped() {
        let l = layer(SourceType::Xyz, json!({"tile_size": 512}));
        assert!(build_source(&l).is_none());
        let empty = layer(SourceType::Xyz, json!({"url_template": ""}));
        assert!(build_source(&empty).is_none());
    }

    #[test]
    fn test_system_key_zoom_table() {
        for (key, expected) in [("topo", 16u8), ("streets", 19), ("satellite", 23), ("offline_topo", 16)] {
            let mut l = layer(SourceType::Xyz, json!({"url_template": "https://ex/{z}/{x}/{y}"}));
            l.system_key = Some(key.to_string());
            match build_source(&l).unwrap() {
                SourceSpec::RasterTiles { max_zoom, .. } => assert_eq!(max_zoom, expected, "{key}"),
                other => panic!("unexpected spec {other:?}"),
            }
        }
    }

    #[test]
    fn test_config_max_zoom_wins_over_lookup() {
        let mut l = layer(
            SourceType::Xyz,
            json!({"url_template": "https://tile.openstreetmap.org/{z}/{x}/{y}.png", "max_zoom": 14}),
        );
        l.system_key = Some("streets".into());
        match build_source(&l).unwrap() {
            SourceSpec::RasterTiles { max_zoom, .. } => assert_eq!(max_zoom, 14),
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[test]
    fn test_arcgis_tile_mode_path_and_zoom() {
        let l = layer(
            SourceType::Arcgis,
            json!({"base_url": "https://services.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer"}),
        );
        let spec = build_source(&l).unwrap();
        assert!(single_tile_url(&spec).ends_with("/tile/{z}/{y}/{x}"));
        match spec {
            SourceSpec::RasterTiles { max_zoom, .. } => assert_eq!(max_zoom, 23),
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[test]
    fn test_arcgis_export_defaults() {
        let l = layer(
            SourceType::Arcgis,
            json!({"base_url": "https://ex/MapServer", "mode": "export"}),
        );
        let spec = build_source(&l).unwrap();
        let url = single_tile_url(&spec);
        assert!(url.contains("/export?bbox={bbox-epsg-3857}"), "{url}");
        assert!(url.contains("format=png32"), "{url}");
        assert!(url.contains("transparent=true"), "{url}");
    }

    #[test]
    fn test_wms_1_3_uses_crs_and_encodes_layers() {
        let l = layer(
            SourceType::Wms,
            json!({"base_url": "https://ex/wms", "layers": "a,b", "version": "1.3.0"}),
        );
        let spec = build_source(&l).unwrap();
        let url = single_tile_url(&spec);
        assert!(url.contains("CRS=EPSG:3857"), "{url}");
        assert!(!url.contains("SRS="), "{url}");
        assert!(url.contains("layers=a%2Cb"), "{url}");
        assert!(url.contains("bbox={bbox-epsg-3857}"), "{url}");
    }

    #[test]
    fn test_wms_pre_1_3_uses_srs_and_requires_layers() {
        let l = layer(
            SourceType::Wms,
            json!({"base_url": "https://ex/wms", "layers": "roads"}),
        );
        let url_spec = build_source(&l).unwrap();
        assert!(single_tile_url(&url_spec).contains("SRS=EPSG:3857"));

        let incomplete = layer(SourceType::Wms, json!({"base_url": "https://ex/wms"}));
        assert!(build_source(&incomplete).is_none());
    }

    #[test]
    fn test_terrain_defaults() {
        let l = layer(
            SourceType::Terrain,
            json!({"url_template": "https://ex/terrain/{z}/{x}/{y}.png"}),
        );
        match build_source(&l).unwrap() {
            SourceSpec::RasterDem { encoding, max_zoom, .. } => {
                assert_eq!(encoding, DemEncoding::Terrarium);
                assert_eq!(max_zoom, 13);
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[test]
    fn test_geojson_embedded_data() {
        let l = layer(
            SourceType::Geojson,
            json!({"data": {"type": "FeatureCollection", "features": [
                {"id": 7, "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
                 "properties": {"name": "well"}},
                {"geometry": {"type": "MultiPoint", "coordinates": []}}
            ]}}),
        );
        match build_source(&l).unwrap() {
            SourceSpec::GeoJson { features } => {
                // unsupported geometry skipped
                assert_eq!(features.len(), 1);
                assert_eq!(features[0].key, "7");
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }
}
