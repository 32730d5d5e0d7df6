//! Distance matrix value type shared by the solver and the passes.

use tracing::error;

/// Sentinel cost for pairs the routing engine could not connect. Kept
/// finite so downstream arithmetic never sees NaN or a missing value.
pub const INFINITE: i64 = 9_999_999;

/// Which table annotation to request from the routing engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Meters.
    Distance,
    /// Seconds.
    Duration,
}

impl Metric {
    pub fn annotation(&self) -> &'static str {
        match self {
            Metric::Distance => "distance",
            Metric::Duration => "duration",
        }
    }

    /// Key under which the table API returns this metric.
    pub fn response_key(&self) -> &'static str {
        match self {
            Metric::Distance => "distances",
            Metric::Duration => "durations",
        }
    }
}

/// Failure modes of a matrix computation. A partially filled matrix is
/// never returned: the caller gets either a complete matrix or an error.
#[derive(Debug)]
pub enum MatrixError {
    /// Network-level failure that survived the retry budget.
    Transport(String),
    /// HTTP 400: the request itself was malformed. Permanent, not retried.
    BadRequest(String),
    /// Response decoded but did not match the wire contract.
    MalformedResponse(String),
    /// Client-side configuration or input problem.
    InvalidInput(String),
    /// Cooperative cancellation observed between tiles.
    Cancelled,
}

/// Square cost matrix over `{depot} ∪ orders`, depot at index 0.
///
/// Immutable once built; the solver and every pass share it read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistanceMatrix {
    cells: Vec<Vec<i64>>,
}

impl DistanceMatrix {
    /// An `n`×`n` matrix with every off-diagonal cell set to [`INFINITE`]
    /// and a zero diagonal. Providers fill it tile by tile.
    pub fn filled(n: usize) -> Self {
        let mut cells = vec![vec![INFINITE; n]; n];
        for (i, row) in cells.iter_mut().enumerate() {
            row[i] = 0;
        }
        Self { cells }
    }

    /// Wraps raw rows, rejecting non-square input.
    pub fn from_cells(cells: Vec<Vec<i64>>) -> Option<Self> {
        let n = cells.len();
        if cells.iter().any(|row| row.len() != n) {
            error!("distance matrix rows are not square ({} rows)", n);
            return None;
        }
        Some(Self { cells })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell lookup with bounds checking.
    pub fn get(&self, from: usize, to: usize) -> Option<i64> {
        self.cells.get(from).and_then(|row| row.get(to)).copied()
    }

    /// Cell lookup that maps out-of-bounds indices to [`INFINITE`].
    pub fn cost(&self, from: usize, to: usize) -> i64 {
        self.get(from, to).unwrap_or(INFINITE)
    }

    pub(crate) fn set(&mut self, from: usize, to: usize, value: i64) {
        if let Some(cell) = self.cells.get_mut(from).and_then(|row| row.get_mut(to)) {
            *cell = value;
        }
    }

    pub(crate) fn zero_diagonal(&mut self) {
        for (i, row) in self.cells.iter_mut().enumerate() {
            row[i] = 0;
        }
    }

    /// Extracts the submatrix over `indices` (in the given order), used
    /// for per-cluster solves. Index 0 of the result is `indices[0]`.
    pub fn submatrix(&self, indices: &[usize]) -> Self {
        let cells = indices
            .iter()
            .map(|&i| indices.iter().map(|&j| self.cost(i, j)).collect())
            .collect();
        Self { cells }
    }
}
