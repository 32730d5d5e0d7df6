//! Haversine matrix provider (fallback when the routing engine is down).
//!
//! Great-circle estimates ignore the road network but are always
//! available. The km primitive is also what the region-radius passes use.

use crate::domain::Location;
use crate::matrix::{DistanceMatrix, MatrixError, Metric};
use crate::traits::MatrixProvider;

/// Average driving speed assumption for duration estimation.
const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points in kilometers.
pub fn haversine_km(from: &Location, to: &Location) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let delta_lat = (to.latitude - from.latitude).to_radians();
    let delta_lon = (to.longitude - from.longitude).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Haversine-based matrix provider.
///
/// Distance cells are meters, duration cells are seconds at the assumed
/// speed. Invalid coordinates leave their pairs unreachable, mirroring
/// the remote provider's behavior.
#[derive(Debug, Clone)]
pub struct HaversineMatrix {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
}

impl Default for HaversineMatrix {
    fn default() -> Self {
        Self {
            speed_kmh: DEFAULT_SPEED_KMH,
        }
    }
}

impl HaversineMatrix {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    fn cell(&self, from: &Location, to: &Location, metric: Metric) -> i64 {
        let km = haversine_km(from, to);
        match metric {
            Metric::Distance => (km * 1000.0).round() as i64,
            Metric::Duration => (km / self.speed_kmh * 3600.0).round() as i64,
        }
    }
}

impl MatrixProvider for HaversineMatrix {
    fn compute(
        &self,
        locations: &[Location],
        metric: Metric,
    ) -> Result<DistanceMatrix, MatrixError> {
        let mut matrix = DistanceMatrix::filled(locations.len());
        for (i, from) in locations.iter().enumerate() {
            if !from.is_valid() {
                continue;
            }
            for (j, to) in locations.iter().enumerate() {
                if i != j && to.is_valid() {
                    matrix.set(i, j, self.cell(from, to, metric));
                }
            }
        }
        Ok(matrix)
    }
}
