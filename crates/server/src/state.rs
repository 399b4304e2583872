//! In-memory store behind the map API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::json;
use shared::{
    BackendId, EntityKind, EntityPoint, LayerKind, MapFeature, MapLayer, SourceType, ViewState,
};

pub struct Store {
    pub layers: Vec<MapLayer>,
    pub features: Vec<MapFeature>,
    pub entities: Vec<EntityPoint>,
    /// Manual location overrides keyed by entity id
    pub locations: HashMap<String, (f64, f64)>,
    pub view: ViewState,
    pub next_id: BackendId,
}

impl Store {
    pub fn alloc_id(&mut self) -> BackendId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<Store>>,
}

impl AppState {
    pub fn seeded() -> Self {
        let layers = vec![
            base_layer(
                1,
                "streets",
                "Streets (OpenStreetMap)",
                json!({
                    "url_template": "https://tile.openstreetmap.org/{z}/{x}/{y}.png",
                    "attribution": "© OpenStreetMap contributors",
                }),
                true,
            ),
            base_layer(
                2,
                "satellite",
                "Satellite (Esri World Imagery)",
                json!({
                    "url_template": "https://services.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}",
                    "attribution": "Esri",
                }),
                false,
            ),
            base_layer(
                3,
                "topo",
                "Topo (USGS)",
                json!({
                    "url_template": "https://basemap.nationalmap.gov/ArcGIS/rest/services/USGSTopo/MapServer/tile/{z}/{y}/{x}",
                    "attribution": "USGS",
                }),
                false,
            ),
            MapLayer {
                id: 4,
                system_key: Some("terrain".to_string()),
                name: "Terrain hillshade".to_string(),
                kind: LayerKind::Overlay,
                source_type: SourceType::Terrain,
                config: json!({
                    "url_template": "https://s3.amazonaws.com/elevation-tiles-prod/terrarium/{z}/{x}/{y}.png",
                    "encoding": "terrarium",
                    "max_zoom": 13,
                }),
                opacity: 0.7,
                enabled: false,
                z_index: 50,
            },
        ];

        let entities = vec![
            entity(EntityKind::Node, "n-101", "Pump house", "online · 12 V", -122.262, 37.091),
            entity(EntityKind::Node, "n-102", "North gate", "online · 12 V", -122.254, 37.097),
            entity(EntityKind::Sensor, "s-201", "Soil probe 1", "34% moisture", -122.259, 37.088),
            entity(EntityKind::Sensor, "s-202", "Tank level", "81% full", -122.250, 37.094),
        ];

        Self {
            store: Arc::new(Mutex::new(Store {
                layers,
                features: Vec::new(),
                entities,
                locations: HashMap::new(),
                view: ViewState::default(),
                next_id: 1000,
            })),
        }
    }
}

fn base_layer(
    id: BackendId,
    system_key: &str,
    name: &str,
    config: serde_json::Value,
    enabled: bool,
) -> MapLayer {
    MapLayer {
        id,
        system_key: Some(system_key.to_string()),
        name: name.to_string(),
        kind: LayerKind::Base,
        source_type: SourceType::Xyz,
        config,
        opacity: 1.0,
        enabled,
        z_index: 0,
    }
}

fn entity(
    kind: EntityKind,
    id: &str,
    name: &str,
    status_line: &str,
    lng: f64,
    lat: f64,
) -> EntityPoint {
    EntityPoint {
        kind,
        id: id.to_string(),
        name: name.to_string(),
        status_line: status_line.to_string(),
        lng,
        lat,
    }
}
