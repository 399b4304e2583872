//! Pure coordinate geometry: altitude/viewport estimates and geometry
//! bounds. No surface state is touched beyond the passed-in handle.

use shared::{Geometry, LngLat};

use crate::surface::{CameraPose, ScreenPoint, SurfaceHandle};

const EARTH_RADIUS_M: f64 = 6_371_000.0;
const FEET_PER_METER: f64 = 3.28084;

/// Meters-per-pixel constant of the Web-Mercator projection at zoom 0
const MERCATOR_M_PER_PX: f64 = 156_543.033_92;

/// Geographic bounding box, degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lng: f64,
    pub min_lat: f64,
    pub max_lng: f64,
    pub max_lat: f64,
}

impl Bounds {
    fn extend(&mut self, pair: [f64; 2]) {
        self.min_lng = self.min_lng.min(pair[0]);
        self.max_lng = self.max_lng.max(pair[0]);
        self.min_lat = self.min_lat.min(pair[1]);
        self.max_lat = self.max_lat.max(pair[1]);
    }

    pub fn center(&self) -> LngLat {
        LngLat::new(
            (self.min_lng + self.max_lng) * 0.5,
            (self.min_lat + self.max_lat) * 0.5,
        )
    }
}

/// Great-circle distance between two positions (haversine)
pub fn haversine_meters(a: LngLat, b: LngLat) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Estimated camera eye altitude in feet.
///
/// Prefers the surface's true 3D camera height (already in meters); falls
/// back to a zoom/latitude approximation scaled by the viewport pixel
/// height. `None` when the viewport has zero height or the estimate is not
/// finite.
pub fn eye_altitude_feet(pose: &CameraPose, viewport_px_h: f32) -> Option<f64> {
    if viewport_px_h <= 0.0 {
        return None;
    }
    let feet = match pose.camera_altitude_m {
        Some(meters) => meters * FEET_PER_METER,
        None => {
            let m_per_px =
                MERCATOR_M_PER_PX * pose.center.lat.to_radians().cos() / 2f64.powf(pose.zoom);
            m_per_px * viewport_px_h as f64 * FEET_PER_METER
        }
    };
    feet.is_finite().then_some(feet)
}

/// Ground distance covered by the viewport's vertical extent, in feet.
///
/// Unprojects the top-center and bottom-center pixels and measures their
/// great-circle separation. `None` on a zero-size viewport or when the
/// distance comes out non-finite.
pub fn viewport_height_feet(surface: &SurfaceHandle) -> Option<f64> {
    let (w, h) = surface.viewport_px();
    if w <= 0.0 || h <= 0.0 {
        return None;
    }
    let top = surface.screen_to_lnglat(ScreenPoint::new(w / 2.0, 0.0))?;
    let bottom = surface.screen_to_lnglat(ScreenPoint::new(w / 2.0, h))?;
    let feet = haversine_meters(top, bottom) * FEET_PER_METER;
    feet.is_finite().then_some(feet)
}

/// Bounding box over every finite coordinate pair of a geometry.
///
/// Walks ring/part nesting with an explicit work stack, so arbitrarily
/// large polygons cannot overflow the call stack. `None` when the geometry
/// contains no finite pair.
pub fn bounds_from_geometry(geometry: &Geometry) -> Option<Bounds> {
    enum Item<'a> {
        Pair(&'a [f64; 2]),
        Line(&'a [[f64; 2]]),
        Rings(&'a [Vec<[f64; 2]>]),
    }

    let mut stack = vec![match geometry {
        Geometry::Point { coordinates } => Item::Pair(coordinates),
        Geometry::LineString { coordinates } => Item::Line(coordinates),
        Geometry::Polygon { coordinates } => Item::Rings(coordinates),
    }];

    let mut bounds: Option<Bounds> = None;
    while let Some(item) = stack.pop() {
        match item {
            Item::Pair(pair) => {
                if pair[0].is_finite() && pair[1].is_finite() {
                    match &mut bounds {
                        Some(b) => b.extend(*pair),
                        None => {
                            bounds = Some(Bounds {
                                min_lng: pair[0],
                                min_lat: pair[1],
                                max_lng: pair[0],
                                max_lat: pair[1],
                            });
                        }
                    }
                }
            }
            Item::Line(pairs) => stack.extend(pairs.iter().map(Item::Pair)),
            Item::Rings(rings) => {
                stack.extend(rings.iter().map(|ring| Item::Line(ring.as_slice())));
            }
        }
    }
    bounds
}

/// The position of a `Point` geometry with two finite coordinates
pub fn point_from_geometry(geometry: &Geometry) -> Option<LngLat> {
    match geometry {
        Geometry::Point { coordinates } => {
            let pos = LngLat::from(*coordinates);
            pos.is_finite().then_some(pos)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::recording_surface;

    #[test]
    fn test_point_from_geometry_exact_pair() {
        let geom = Geometry::point(-122.26, 37.09);
        let pos = point_from_geometry(&geom).unwrap();
        assert_eq!(pos.lng, -122.26);
        assert_eq!(pos.lat, 37.09);
    }

    #[test]
    fn test_point_from_geometry_rejects_non_point_and_non_finite() {
        let line = Geometry::LineString {
            coordinates: vec![[0.0, 0.0], [1.0, 1.0]],
        };
        assert!(point_from_geometry(&line).is_none());
        let bad = Geometry::Point {
            coordinates: [f64::NAN, 37.0],
        };
        assert!(point_from_geometry(&bad).is_none());
    }

    #[test]
    fn test_bounds_polygon_with_hole_tight() {
        let geom = Geometry::Polygon {
            coordinates: vec![
                vec![[-3.0, -2.0], [4.0, -2.0], [4.0, 5.0], [-3.0, 5.0], [-3.0, -2.0]],
                // hole, strictly inside the outer ring
                vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]],
            ],
        };
        let b = bounds_from_geometry(&geom).unwrap();
        assert_eq!((b.min_lng, b.min_lat, b.max_lng, b.max_lat), (-3.0, -2.0, 4.0, 5.0));
    }

    #[test]
    fn test_bounds_large_ring_does_not_recurse() {
        let ring: Vec<[f64; 2]> = (0..50_000).map(|i| [i as f64 * 1e-4, 1.0]).collect();
        let geom = Geometry::Polygon {
            coordinates: vec![ring],
        };
        let b = bounds_from_geometry(&geom).unwrap();
        assert_eq!(b.min_lng, 0.0);
        assert_eq!(b.min_lat, 1.0);
        assert_eq!(b.max_lat, 1.0);
    }

    #[test]
    fn test_bounds_skips_non_finite_pairs() {
        let geom = Geometry::LineString {
            coordinates: vec![[f64::NAN, 0.0], [2.0, 3.0]],
        };
        let b = bounds_from_geometry(&geom).unwrap();
        assert_eq!((b.min_lng, b.max_lng), (2.0, 2.0));

        let all_bad = Geometry::LineString {
            coordinates: vec![[f64::NAN, f64::INFINITY]],
        };
        assert!(bounds_from_geometry(&all_bad).is_none());
    }

    #[test]
    fn test_haversine_equator_degree() {
        // One degree of longitude at the equator is roughly 111.2 km
        let d = haversine_meters(LngLat::new(0.0, 0.0), LngLat::new(1.0, 0.0));
        assert!((d - 111_195.0).abs() < 200.0, "{d}");
    }

    #[test]
    fn test_viewport_height_zero_size_is_none() {
        let (surface, handle) = recording_surface();
        surface.lock().unwrap().size = (800.0, 0.0);
        assert_eq!(viewport_height_feet(&handle), None);
    }

    #[test]
    fn test_viewport_height_finite() {
        let (_surface, handle) = recording_surface();
        // 800 px tall viewport spans 80 degrees of latitude in the mock
        let feet = viewport_height_feet(&handle).unwrap();
        assert!(feet > 0.0);
        assert!(feet.is_finite());
    }

    #[test]
    fn test_eye_altitude_prefers_camera_height() {
        let pose = CameraPose {
            center: LngLat::new(0.0, 0.0),
            zoom: 10.0,
            bearing: 0.0,
            pitch: 0.0,
            camera_altitude_m: Some(1000.0),
        };
        let feet = eye_altitude_feet(&pose, 600.0).unwrap();
        assert!((feet - 3280.84).abs() < 1e-6);
    }

    #[test]
    fn test_eye_altitude_fallback_and_zero_height() {
        let pose = CameraPose {
            center: LngLat::new(0.0, 45.0),
            zoom: 12.0,
            bearing: 0.0,
            pitch: 0.0,
            camera_altitude_m: None,
        };
        assert_eq!(eye_altitude_feet(&pose, 0.0), None);
        let feet = eye_altitude_feet(&pose, 600.0).unwrap();
        let m_per_px = 156_543.033_92 * 45f64.to_radians().cos() / 2f64.powf(12.0);
        assert!((feet - m_per_px * 600.0 * 3.28084).abs() < 1e-6);
    }
}
