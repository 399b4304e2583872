//! GeoJSON geometry wire types. Coordinates are `[lng, lat]` pairs.

use serde::{Deserialize, Serialize};

/// A geographic position (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    pub fn is_finite(&self) -> bool {
        self.lng.is_finite() && self.lat.is_finite()
    }
}

impl From<[f64; 2]> for LngLat {
    fn from(pair: [f64; 2]) -> Self {
        Self { lng: pair[0], lat: pair[1] }
    }
}

/// GeoJSON geometry, restricted to the three types the markup tool produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: [f64; 2] },
    LineString { coordinates: Vec<[f64; 2]> },
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
}

impl Geometry {
    pub fn point(lng: f64, lat: f64) -> Self {
        Geometry::Point { coordinates: [lng, lat] }
    }

    /// All coordinate pairs, ring/part structure flattened
    pub fn coords(&self) -> Vec<[f64; 2]> {
        match self {
            Geometry::Point { coordinates } => vec![*coordinates],
            Geometry::LineString { coordinates } => coordinates.clone(),
            Geometry::Polygon { coordinates } => {
                coordinates.iter().flatten().copied().collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_tagged_serde() {
        let json = r#"{"type":"LineString","coordinates":[[-122.3,37.1],[-122.2,37.2]]}"#;
        let geom: Geometry = serde_json::from_str(json).unwrap();
        match &geom {
            Geometry::LineString { coordinates } => assert_eq!(coordinates.len(), 2),
            other => panic!("expected LineString, got {other:?}"),
        }
        let back = serde_json::to_string(&geom).unwrap();
        assert!(back.contains(r#""type":"LineString""#));
    }
}
