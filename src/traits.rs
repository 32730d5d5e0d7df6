//! Provider seams of the routing core.
//!
//! Concrete transports (routing engine HTTP client, haversine fallback,
//! geocoder backends) implement these; everything downstream of them is
//! deterministic and testable with in-memory implementations.

use crate::domain::Location;
use crate::matrix::{DistanceMatrix, MatrixError, Metric};

/// Fractional-progress callback, 0.0 to 1.0. Purely informational.
pub type ProgressFn = dyn Fn(f64) + Sync;

/// Computes the full travel-cost matrix over a set of locations.
///
/// Index order of the result matches the input slice. Implementations
/// must return a complete matrix or an error, never a partial fill.
pub trait MatrixProvider {
    fn compute(
        &self,
        locations: &[Location],
        metric: Metric,
    ) -> Result<DistanceMatrix, MatrixError>;
}

/// One geocoding strategy: resolves a free-text query (address, postal
/// code) to a coordinate, or `None` when it has no answer.
///
/// Strategies are tried in order by [`crate::geocode::ResolverChain`];
/// a `None` is "ask the next one", not an error.
pub trait CoordinateResolver: Sync {
    fn name(&self) -> &str;
    fn resolve(&self, query: &str) -> Option<Location>;
}
