//! Equirectangular projection of WGS84 coordinates into drawing units.

use crate::config::Units;
use crate::ir::Bbox;

/// Metres spanned by one degree of latitude (at the equator).
pub const METERS_PER_DEGREE_LAT: f64 = 111_319.49;
pub const FEET_PER_METER: f64 = 3.280_839_895_013_12;

/// `(x, y)` in drawing units, X east and Y north of the bbox centre.
pub type PlanarPoint = (f64, f64);

/// Local tangent-plane projection centred on a bounding box.
///
/// Only valid for small extents; no curvature correction is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projector {
    center_lat: f64,
    center_lon: f64,
    cos_lat: f64,
    scale: f64,
}

impl Projector {
    pub fn new(bbox: &Bbox, units: Units) -> Self {
        let center_lat = (bbox.south + bbox.north) / 2.0;
        let center_lon = (bbox.west + bbox.east) / 2.0;
        Self {
            center_lat,
            center_lon,
            cos_lat: center_lat.to_radians().cos(),
            scale: match units {
                Units::Feet => FEET_PER_METER,
                Units::Meters => 1.0,
            },
        }
    }

    pub fn project(&self, lat: f64, lon: f64) -> PlanarPoint {
        let x = (lon - self.center_lon) * METERS_PER_DEGREE_LAT * self.cos_lat * self.scale;
        let y = (lat - self.center_lat) * METERS_PER_DEGREE_LAT * self.scale;
        (x, y)
    }

    /// Inverse of [`Projector::project`].
    pub fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        let lat = y / (METERS_PER_DEGREE_LAT * self.scale) + self.center_lat;
        let lon = x / (METERS_PER_DEGREE_LAT * self.cos_lat * self.scale) + self.center_lon;
        (lat, lon)
    }

    pub fn project_all(&self, coords: &[(f64, f64)]) -> Vec<PlanarPoint> {
        coords
            .iter()
            .map(|&(lat, lon)| self.project(lat, lon))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn bbox() -> Bbox {
        Bbox::new(37.80, -122.49, 37.82, -122.47)
    }

    #[test]
    fn center_projects_to_origin() {
        let projector = Projector::new(&bbox(), Units::Feet);
        let (x, y) = projector.project(37.81, -122.48);
        assert_approx_eq!(x, 0.0, 1e-6);
        assert_approx_eq!(y, 0.0, 1e-6);
    }

    #[test]
    fn north_east_corner_matches_hand_computed_offset() {
        let projector = Projector::new(&bbox(), Units::Meters);
        let (x, y) = projector.project(37.82, -122.47);
        let expected_x = 0.01 * METERS_PER_DEGREE_LAT * 37.81f64.to_radians().cos();
        let expected_y = 0.01 * METERS_PER_DEGREE_LAT;
        assert_approx_eq!(x, expected_x, 1e-6);
        assert_approx_eq!(y, expected_y, 1e-6);
    }

    #[test]
    fn feet_are_meters_scaled() {
        let feet = Projector::new(&bbox(), Units::Feet).project(37.815, -122.475);
        let meters = Projector::new(&bbox(), Units::Meters).project(37.815, -122.475);
        assert_approx_eq!(feet.0, meters.0 * FEET_PER_METER, 1e-6);
        assert_approx_eq!(feet.1, meters.1 * FEET_PER_METER, 1e-6);
    }

    #[test]
    fn unproject_inverts_project() {
        let projector = Projector::new(&bbox(), Units::Feet);
        let (x, y) = projector.project(37.8042, -122.4811);
        let (lat, lon) = projector.unproject(x, y);
        assert_approx_eq!(lat, 37.8042, 1e-9);
        assert_approx_eq!(lon, -122.4811, 1e-9);
    }
}
