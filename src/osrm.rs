//! Routing-engine HTTP adapter for distance matrices.
//!
//! The table API caps the number of coordinates per request, so the full
//! matrix is computed in tiles: locations are split into fixed-size
//! batches and one sources×destinations query is issued per batch pair.
//! Any tile that fails permanently (HTTP 400) or exhausts its retries
//! aborts the whole computation — a partial matrix would read as "truly
//! unreachable" downstream, which is worse than no matrix.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use rayon::prelude::*;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::domain::Location;
use crate::matrix::{DistanceMatrix, INFINITE, MatrixError, Metric};
use crate::retry::{Failure, RetryPolicy, with_retries};
use crate::traits::{MatrixProvider, ProgressFn};

/// Maximum coordinates per batch side, per the engine's request limit.
const MAX_COORDS_PER_BATCH: usize = 15;

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout: Duration,
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://router.project-osrm.org".to_string(),
            profile: "driving".to_string(),
            timeout: Duration::from_secs(180),
            batch_size: MAX_COORDS_PER_BATCH,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

#[derive(Debug, Deserialize)]
struct TableResponse {
    distances: Option<Vec<Vec<Option<f64>>>>,
    durations: Option<Vec<Vec<Option<f64>>>>,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    code: String,
    #[serde(default)]
    routes: Vec<RouteLeg>,
}

#[derive(Debug, Deserialize)]
struct RouteLeg {
    distance: f64,
    duration: f64,
}

/// One completed tile, ready to be written into the final matrix.
struct TileFill {
    sources: Vec<usize>,
    destinations: Vec<usize>,
    values: Vec<Vec<Option<f64>>>,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, MatrixError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| MatrixError::InvalidInput(err.to_string()))?;
        Ok(Self { config, client })
    }

    /// Full matrix computation with optional progress reporting and
    /// cooperative cancellation, both checked per tile.
    pub fn compute_with_progress(
        &self,
        locations: &[Location],
        metric: Metric,
        progress: Option<&ProgressFn>,
        cancel: Option<&AtomicBool>,
    ) -> Result<DistanceMatrix, MatrixError> {
        let n = locations.len();
        if n == 0 {
            info!("no locations, returning empty matrix");
            return Ok(DistanceMatrix::filled(0));
        }
        if n == 1 {
            // A single point cannot be queried; its matrix is trivially zero.
            return Ok(DistanceMatrix::filled(1));
        }

        let batch_size = self.config.batch_size.max(2);
        let batches: Vec<Vec<usize>> = (0..n)
            .collect::<Vec<_>>()
            .chunks(batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        let pairs: Vec<(usize, usize)> = (0..batches.len())
            .flat_map(|r| (0..batches.len()).map(move |c| (r, c)))
            .collect();
        let total = pairs.len();
        info!(
            "computing {}x{} matrix in {} batches ({} tile requests)",
            n,
            n,
            batches.len(),
            total
        );

        let completed = AtomicUsize::new(0);
        let tiles: Vec<Result<Option<TileFill>, MatrixError>> = pairs
            .par_iter()
            .map(|&(r, c)| {
                if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                    return Err(MatrixError::Cancelled);
                }
                let tile = self.compute_tile(locations, &batches[r], &batches[c], metric);
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(report) = progress {
                    report(done as f64 / total as f64);
                }
                tile
            })
            .collect();

        let mut matrix = DistanceMatrix::filled(n);
        for tile in tiles {
            let Some(fill) = tile? else { continue };
            for (i, &source) in fill.sources.iter().enumerate() {
                for (j, &destination) in fill.destinations.iter().enumerate() {
                    let value = fill.values[i][j]
                        .map(|v| v.round() as i64)
                        .unwrap_or(INFINITE);
                    matrix.set(source, destination, value);
                }
            }
        }
        matrix.zero_diagonal();
        info!("matrix of '{}' computed", metric.annotation());
        Ok(matrix)
    }

    /// One sources×destinations tile. Returns `Ok(None)` when the tile is
    /// skipped (too few valid points, or a response of unexpected shape);
    /// skipped cells stay at the unreachable sentinel.
    fn compute_tile(
        &self,
        locations: &[Location],
        row_batch: &[usize],
        col_batch: &[usize],
        metric: Metric,
    ) -> Result<Option<TileFill>, MatrixError> {
        // Combined coordinate set for the request, deduplicated and sorted
        // so both sides index into one list.
        let mut combined: Vec<usize> = row_batch
            .iter()
            .chain(col_batch.iter())
            .copied()
            .collect();
        combined.sort_unstable();
        combined.dedup();

        let mut coords = Vec::new();
        let mut position_of: HashMap<usize, usize> = HashMap::new();
        for &global in &combined {
            let location = &locations[global];
            if location.is_valid() {
                position_of.insert(global, coords.len());
                coords.push(*location);
            } else {
                warn!(
                    "invalid coordinate at node {global}: ({}, {})",
                    location.latitude, location.longitude
                );
            }
        }

        let sources: Vec<usize> = row_batch
            .iter()
            .copied()
            .filter(|g| position_of.contains_key(g))
            .collect();
        let destinations: Vec<usize> = col_batch
            .iter()
            .copied()
            .filter(|g| position_of.contains_key(g))
            .collect();

        // The engine requires at least 2 points per query side.
        if sources.len() < 2 || destinations.len() < 2 {
            warn!(
                "tile skipped: {} sources / {} destinations after validation",
                sources.len(),
                destinations.len()
            );
            return Ok(None);
        }

        let coord_path = coords
            .iter()
            .map(|loc| format!("{},{}", loc.longitude, loc.latitude))
            .collect::<Vec<_>>()
            .join(";");
        let url = format!(
            "{}/table/v1/{}/{}",
            self.config.base_url, self.config.profile, coord_path
        );
        let sources_param = join_indices(&sources, &position_of);
        let destinations_param = join_indices(&destinations, &position_of);

        let values = with_retries(&self.config.retry, |attempt| {
            debug!(
                "table request attempt {attempt} ({} sources x {} destinations)",
                sources.len(),
                destinations.len()
            );
            self.try_table(&url, &sources_param, &destinations_param, metric)
        })?;

        if values.len() != sources.len()
            || values.iter().any(|row| row.len() != destinations.len())
        {
            error!(
                "table response shape {}x{} does not match requested {}x{}, skipping tile",
                values.len(),
                values.first().map_or(0, Vec::len),
                sources.len(),
                destinations.len()
            );
            return Ok(None);
        }

        Ok(Some(TileFill {
            sources,
            destinations,
            values,
        }))
    }

    fn try_table(
        &self,
        url: &str,
        sources: &str,
        destinations: &str,
        metric: Metric,
    ) -> Result<Vec<Vec<Option<f64>>>, Failure<MatrixError>> {
        let response = self
            .client
            .get(url)
            .query(&[
                ("annotations", metric.annotation()),
                ("sources", sources),
                ("destinations", destinations),
            ])
            .send()
            .map_err(|err| Failure::Transient(MatrixError::Transport(err.to_string())))?;

        let status = response.status();
        if status.as_u16() == 400 {
            let body = response.text().unwrap_or_default();
            error!("table request rejected with 400: {body}");
            return Err(Failure::Fatal(MatrixError::BadRequest(body)));
        }
        if !status.is_success() {
            return Err(Failure::Transient(MatrixError::Transport(format!(
                "HTTP {status}"
            ))));
        }

        let body = response
            .text()
            .map_err(|err| Failure::Transient(MatrixError::Transport(err.to_string())))?;
        let table: TableResponse = serde_json::from_str(&body).map_err(|err| {
            Failure::Transient(MatrixError::MalformedResponse(err.to_string()))
        })?;

        let values = match metric {
            Metric::Distance => table.distances,
            Metric::Duration => table.durations,
        };
        // A decoded body without the requested key is a contract problem,
        // not a flaky network: repeating the request cannot fix it.
        values.ok_or_else(|| {
            Failure::Fatal(MatrixError::MalformedResponse(format!(
                "response missing '{}' key",
                metric.response_key()
            )))
        })
    }

    /// Single-pair lookup against the route API. Degrades to the
    /// unreachable sentinel instead of failing: one missing leg is not
    /// fatal the way a broken matrix is.
    pub fn route_between(
        &self,
        from: &Location,
        to: &Location,
        metric: Metric,
    ) -> Result<i64, MatrixError> {
        if !from.is_valid() || !to.is_valid() {
            warn!("route query with invalid coordinates");
            return Ok(INFINITE);
        }
        let url = format!(
            "{}/route/v1/{}/{},{};{},{}",
            self.config.base_url,
            self.config.profile,
            from.longitude,
            from.latitude,
            to.longitude,
            to.latitude
        );

        let outcome = with_retries(&self.config.retry, |attempt| {
            debug!("route request attempt {attempt}");
            let response = self
                .client
                .get(&url)
                .query(&[("overview", "false")])
                .send()
                .map_err(|err| Failure::Transient(MatrixError::Transport(err.to_string())))?;
            let status = response.status();
            if status.as_u16() == 400 {
                return Err(Failure::Fatal(MatrixError::BadRequest(
                    response.text().unwrap_or_default(),
                )));
            }
            if !status.is_success() {
                return Err(Failure::Transient(MatrixError::Transport(format!(
                    "HTTP {status}"
                ))));
            }
            response
                .json::<RouteResponse>()
                .map_err(|err| Failure::Transient(MatrixError::MalformedResponse(err.to_string())))
        });

        match outcome {
            Ok(route) => {
                if route.code != "Ok" || route.routes.is_empty() {
                    warn!("no route between the requested points");
                    return Ok(INFINITE);
                }
                let leg = &route.routes[0];
                let value = match metric {
                    Metric::Distance => leg.distance,
                    Metric::Duration => leg.duration,
                };
                Ok(value.round() as i64)
            }
            Err(err) => {
                error!("route query failed: {err:?}");
                Ok(INFINITE)
            }
        }
    }
}

impl MatrixProvider for OsrmClient {
    fn compute(
        &self,
        locations: &[Location],
        metric: Metric,
    ) -> Result<DistanceMatrix, MatrixError> {
        self.compute_with_progress(locations, metric, None, None)
    }
}

fn join_indices(globals: &[usize], position_of: &HashMap<usize, usize>) -> String {
    globals
        .iter()
        .map(|g| position_of[g].to_string())
        .collect::<Vec<_>>()
        .join(";")
}
