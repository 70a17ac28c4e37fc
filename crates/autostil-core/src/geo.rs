//! WGS84 positions, great-circle distance and bounding boxes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A position fix in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    /// When the fix was taken. Used to discard stale reconciliation passes.
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

impl Position {
    /// A fix taken now.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            observed_at: Utc::now(),
        }
    }

    pub fn at(lat: f64, lon: f64, observed_at: DateTime<Utc>) -> Self {
        Self {
            lat,
            lon,
            observed_at,
        }
    }

    /// Reject NaN and out-of-range coordinates.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let lat_ok = self.lat.is_finite() && (-90.0..=90.0).contains(&self.lat);
        let lon_ok = self.lon.is_finite() && (-180.0..=180.0).contains(&self.lon);
        if lat_ok && lon_ok {
            Ok(())
        } else {
            Err(ValidationError::InvalidCoordinates {
                lat: self.lat,
                lon: self.lon,
            })
        }
    }

    /// Great-circle distance to a coordinate, in meters.
    pub fn distance_to(&self, lat: f64, lon: f64) -> f64 {
        haversine_m(self.lat, self.lon, lat, lon)
    }

    /// Square window of `half_span_deg` degrees around this position.
    pub fn window(&self, half_span_deg: f64) -> BoundingBox {
        BoundingBox {
            min_lat: self.lat - half_span_deg,
            max_lat: self.lat + half_span_deg,
            min_lon: self.lon - half_span_deg,
            max_lon: self.lon + half_span_deg,
        }
    }
}

/// Haversine distance between two coordinates in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` a hair above 1.0 for antipodal points.
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_M * c
}

/// Axis-aligned lat/lon window used to pre-filter catalog queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_to_self() {
        let p = Position::new(52.3676, 4.9041);
        assert_eq!(p.distance_to(52.3676, 4.9041), 0.0);
    }

    #[test]
    fn amsterdam_to_utrecht_is_about_35km() {
        let d = haversine_m(52.3676, 4.9041, 52.0907, 5.1214);
        assert!((d - 34_200.0).abs() < 1_000.0, "got {d}");
    }

    #[test]
    fn one_millidegree_latitude_is_about_111m() {
        let d = haversine_m(52.0, 5.0, 52.001, 5.0);
        assert!((d - 111.2).abs() < 0.5, "got {d}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = haversine_m(51.5, -0.12, 48.85, 2.35);
        let b = haversine_m(48.85, 2.35, 51.5, -0.12);
        assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn antipodal_points_do_not_nan() {
        let d = haversine_m(0.0, 0.0, 0.0, 180.0);
        assert!(d.is_finite());
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);
    }

    #[test]
    fn window_contains_center_and_excludes_outside() {
        let p = Position::new(52.0, 5.0);
        let bbox = p.window(0.005);
        assert!(bbox.contains(52.0, 5.0));
        assert!(bbox.contains(52.004, 4.996));
        assert!(!bbox.contains(52.006, 5.0));
    }

    #[test]
    fn validate_rejects_out_of_range() {
        assert!(Position::new(91.0, 0.0).validate().is_err());
        assert!(Position::new(0.0, -181.0).validate().is_err());
        assert!(Position::new(f64::NAN, 0.0).validate().is_err());
        assert!(Position::new(52.0, 5.0).validate().is_ok());
    }
}
