//! Bounded-time CVRP solver.
//!
//! Construction is cheapest insertion: every unrouted order is placed at
//! the capacity-feasible position of minimum extra cost, cheapest first.
//! Improvement is guided local search: 2-opt and inter-route relocation
//! run to a local optimum under penalized arc costs, then the highest
//! "utility" arcs of the incumbent are penalized and the search resumes,
//! until the wall-clock budget or a stale-round cap is hit. The search is
//! deterministic; ties break on the lowest vehicle then position index.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::domain::{Order, RouteStop, RouteTable, Vehicle};
use crate::matrix::DistanceMatrix;

const CAPACITY_EPS: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Wall-clock budget for the improvement phase.
    pub time_limit: Duration,
    /// Percentage applied to every vehicle capacity (100 = nominal);
    /// values above 100 model deliberate overload slack.
    pub capacity_scale_pct: u32,
    /// Stop improving after this many penalization rounds without a new
    /// incumbent, even with time left.
    pub max_stale_rounds: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(30),
            capacity_scale_pct: 100,
            max_stale_rounds: 50,
        }
    }
}

/// Outcome classification. Infeasibility is a value, not an error; the
/// caller is expected to have run [`crate::domain::precheck`] first to
/// turn a deterministic infeasibility into an actionable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Solved,
    /// Nothing to solve (no orders or no vehicles).
    NotSolved,
    /// No capacity-feasible assignment was found.
    Infeasible,
    /// The budget expired before any solution was constructed.
    Timeout,
    /// Matrix mis-sized or order coordinates invalid.
    InvalidModel,
}

#[derive(Debug, Clone)]
pub struct SolveResult {
    pub table: RouteTable,
    pub status: SolveStatus,
    /// Total arc cost of all routes, including depot legs.
    pub total_cost: i64,
}

impl SolveResult {
    fn empty(status: SolveStatus) -> Self {
        Self {
            table: RouteTable::default(),
            status,
            total_cost: 0,
        }
    }
}

/// Solves one CVRP instance. The matrix must cover `{depot} ∪ orders`
/// with the depot at index 0 and order `i` at index `i + 1`.
pub fn solve(
    orders: &[Order],
    vehicles: &[Vehicle],
    matrix: &DistanceMatrix,
    config: &SolverConfig,
) -> SolveResult {
    if orders.is_empty() {
        warn!("no orders to solve");
        return SolveResult::empty(SolveStatus::NotSolved);
    }
    if vehicles.is_empty() {
        warn!("no vehicles to solve with");
        return SolveResult::empty(SolveStatus::NotSolved);
    }
    if matrix.len() != orders.len() + 1 {
        error!(
            "matrix size {} does not match {} orders + depot",
            matrix.len(),
            orders.len()
        );
        return SolveResult::empty(SolveStatus::InvalidModel);
    }
    // Data-quality failures surface before the model is built; an opaque
    // search failure must never stand in for a bad coordinate.
    let invalid = orders
        .iter()
        .filter(|o| o.valid_location().is_none())
        .count();
    if invalid > 0 {
        error!("{invalid} orders have invalid coordinates, refusing to solve");
        return SolveResult::empty(SolveStatus::InvalidModel);
    }

    let missing_demand = orders.iter().filter(|o| o.demand_kg.is_none()).count();
    if missing_demand > 0 {
        warn!("{missing_demand} orders without demand, defaulting to 1 unit each");
    }
    let missing_capacity = vehicles.iter().filter(|v| v.capacity_kg.is_none()).count();
    if missing_capacity > 0 {
        warn!("{missing_capacity} vehicles without capacity, defaulting");
    }

    // demands[0] is the depot.
    let mut demands = vec![0.0];
    demands.extend(orders.iter().map(Order::demand));
    let capacities: Vec<f64> = vehicles
        .iter()
        .map(|v| (v.capacity() * config.capacity_scale_pct as f64 / 100.0).round().max(1.0))
        .collect();

    let deadline = Instant::now() + config.time_limit;

    let Some(mut routes) = construct(&demands, &capacities, matrix) else {
        return SolveResult::empty(SolveStatus::Infeasible);
    };
    if Instant::now() >= deadline {
        warn!("budget expired during construction, returning initial solution");
        return assemble(routes, orders, vehicles, &demands, matrix, SolveStatus::Solved);
    }

    improve(
        &mut routes,
        &demands,
        &capacities,
        matrix,
        deadline,
        config.max_stale_rounds,
    );
    assemble(routes, orders, vehicles, &demands, matrix, SolveStatus::Solved)
}

/// Runs the solver once per cluster against the matching submatrix of
/// the global matrix, concatenating the per-cluster tables with node
/// indices remapped back to global positions.
pub fn solve_per_cluster(
    orders: &[Order],
    vehicles: &[Vehicle],
    matrix: &DistanceMatrix,
    clusters: &[Option<usize>],
    config: &SolverConfig,
) -> SolveResult {
    let mut ids: Vec<usize> = clusters.iter().flatten().copied().collect();
    ids.sort_unstable();
    ids.dedup();

    let skipped = clusters.iter().filter(|c| c.is_none()).count();
    if skipped > 0 {
        warn!("{skipped} orders without a cluster are left unrouted");
    }

    let mut table = RouteTable::default();
    let mut total_cost = 0;
    let mut any_solved = false;

    for cluster in ids {
        let members: Vec<usize> = clusters
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == Some(cluster))
            .map(|(i, _)| i)
            .collect();
        let sub_orders: Vec<Order> = members.iter().map(|&i| orders[i].clone()).collect();
        let mut matrix_indices = vec![0];
        matrix_indices.extend(members.iter().map(|&i| i + 1));
        let sub_matrix = matrix.submatrix(&matrix_indices);

        let result = solve(&sub_orders, vehicles, &sub_matrix, config);
        if result.status != SolveStatus::Solved {
            warn!(
                "cluster {cluster} not solved ({:?}), {} orders unrouted",
                result.status,
                members.len()
            );
            continue;
        }
        for mut stop in result.table.stops {
            // Local node l maps back to the global index of members[l-1].
            stop.node_index = members[stop.node_index - 1] + 1;
            table.stops.push(stop);
        }
        total_cost += result.total_cost;
        any_solved = true;
    }

    // The same fleet is reused across clusters, so sequences must be
    // re-densified per vehicle over the concatenated table.
    table.resequence();
    let status = if any_solved {
        SolveStatus::Solved
    } else {
        SolveStatus::NotSolved
    };
    SolveResult {
        table,
        status,
        total_cost,
    }
}

/// Cheapest insertion. `None` when some order fits no vehicle.
fn construct(
    demands: &[f64],
    capacities: &[f64],
    matrix: &DistanceMatrix,
) -> Option<Vec<Vec<usize>>> {
    let customers = demands.len() - 1;
    let mut routes: Vec<Vec<usize>> = vec![Vec::new(); capacities.len()];
    let mut loads = vec![0.0; capacities.len()];
    let mut unrouted: Vec<usize> = (1..=customers).collect();

    while !unrouted.is_empty() {
        let mut best: Option<(i64, usize, usize, usize)> = None;
        for (slot, &node) in unrouted.iter().enumerate() {
            for (v, route) in routes.iter().enumerate() {
                if loads[v] + demands[node] > capacities[v] + CAPACITY_EPS {
                    continue;
                }
                for pos in 0..=route.len() {
                    let delta = insertion_delta(route, pos, node, |i, j| matrix.cost(i, j));
                    let candidate = (delta, v, pos, slot);
                    if best.is_none_or(|b| (candidate.0, candidate.1, candidate.2) < (b.0, b.1, b.2))
                    {
                        best = Some(candidate);
                    }
                }
            }
        }
        match best {
            Some((_, v, pos, slot)) => {
                let node = unrouted.remove(slot);
                loads[v] += demands[node];
                routes[v].insert(pos, node);
            }
            None => {
                error!(
                    "no capacity-feasible position for {} remaining orders",
                    unrouted.len()
                );
                return None;
            }
        }
    }
    Some(routes)
}

fn insertion_delta(
    route: &[usize],
    pos: usize,
    node: usize,
    cost: impl Fn(usize, usize) -> i64,
) -> i64 {
    let prev = if pos == 0 { 0 } else { route[pos - 1] };
    let next = if pos == route.len() { 0 } else { route[pos] };
    cost(prev, node) + cost(node, next) - cost(prev, next)
}

fn route_cost(route: &[usize], cost: &impl Fn(usize, usize) -> i64) -> i64 {
    let mut prev = 0;
    let mut total = 0;
    for &node in route {
        total += cost(prev, node);
        prev = node;
    }
    if !route.is_empty() {
        total += cost(prev, 0);
    }
    total
}

fn solution_cost(routes: &[Vec<usize>], cost: &impl Fn(usize, usize) -> i64) -> i64 {
    routes.iter().map(|r| route_cost(r, cost)).sum()
}

/// Guided local search: penalize the most "useful" arcs of each local
/// optimum so the next descent explores a different basin.
fn improve(
    routes: &mut Vec<Vec<usize>>,
    demands: &[f64],
    capacities: &[f64],
    matrix: &DistanceMatrix,
    deadline: Instant,
    max_stale_rounds: u32,
) {
    let real = |i: usize, j: usize| matrix.cost(i, j);
    let mut penalties: HashMap<(usize, usize), i64> = HashMap::new();
    let mut best = routes.clone();
    let mut best_cost = solution_cost(routes, &real);
    // Penalty weight scaled to the instance so penalties bite without
    // drowning the real costs.
    let lambda = (best_cost / (10 * demands.len() as i64)).max(1);
    let mut stale = 0;
    let mut rounds = 0u32;

    while Instant::now() < deadline && stale < max_stale_rounds {
        rounds += 1;
        let augmented = |i: usize, j: usize| {
            matrix.cost(i, j) + lambda * penalties.get(&(i, j)).copied().unwrap_or(0)
        };
        descend(routes, demands, capacities, &augmented, deadline);

        let cost = solution_cost(routes, &real);
        if cost < best_cost {
            best_cost = cost;
            best = routes.clone();
            stale = 0;
        } else {
            stale += 1;
        }
        penalize(routes, &mut penalties, matrix);
    }
    debug!("improvement finished after {rounds} rounds, best cost {best_cost}");
    *routes = best;
    info!("solver best total cost: {best_cost}");
}

/// First-improvement descent with 2-opt and inter-route relocation,
/// repeated until a full sweep finds nothing (or the deadline passes).
fn descend(
    routes: &mut [Vec<usize>],
    demands: &[f64],
    capacities: &[f64],
    cost: &impl Fn(usize, usize) -> i64,
    deadline: Instant,
) {
    loop {
        if Instant::now() >= deadline {
            return;
        }
        let mut improved = false;
        for route in routes.iter_mut() {
            if two_opt_once(route, cost) {
                improved = true;
            }
        }
        if relocate_once(routes, demands, capacities, cost) {
            improved = true;
        }
        if !improved {
            return;
        }
    }
}

fn two_opt_once(route: &mut Vec<usize>, cost: &impl Fn(usize, usize) -> i64) -> bool {
    let n = route.len();
    if n < 2 {
        return false;
    }
    // Full re-evaluation per candidate: the matrix is directed, so a
    // reversed segment changes every internal arc, not just the two cut
    // points.
    let current = route_cost(route, cost);
    for i in 0..n - 1 {
        for j in i + 1..n {
            let mut candidate = route.clone();
            candidate[i..=j].reverse();
            if route_cost(&candidate, cost) < current {
                *route = candidate;
                return true;
            }
        }
    }
    false
}

fn relocate_once(
    routes: &mut [Vec<usize>],
    demands: &[f64],
    capacities: &[f64],
    cost: &impl Fn(usize, usize) -> i64,
) -> bool {
    let loads: Vec<f64> = routes
        .iter()
        .map(|r| r.iter().map(|&n| demands[n]).sum())
        .collect();

    for from in 0..routes.len() {
        for idx in 0..routes[from].len() {
            let node = routes[from][idx];
            let prev = if idx == 0 { 0 } else { routes[from][idx - 1] };
            let next = if idx == routes[from].len() - 1 {
                0
            } else {
                routes[from][idx + 1]
            };
            let removal_gain = cost(prev, node) + cost(node, next) - cost(prev, next);

            for to in 0..routes.len() {
                if to == from {
                    continue;
                }
                if loads[to] + demands[node] > capacities[to] + CAPACITY_EPS {
                    continue;
                }
                for pos in 0..=routes[to].len() {
                    let delta = insertion_delta(&routes[to], pos, node, cost);
                    if delta < removal_gain {
                        routes[from].remove(idx);
                        routes[to].insert(pos, node);
                        return true;
                    }
                }
            }
        }
    }
    false
}

/// Increments the penalty of every arc attaining the maximum utility
/// `cost / (1 + penalty)` in the incumbent solution.
fn penalize(
    routes: &[Vec<usize>],
    penalties: &mut HashMap<(usize, usize), i64>,
    matrix: &DistanceMatrix,
) {
    let mut arcs = Vec::new();
    for route in routes {
        let mut prev = 0;
        for &node in route {
            arcs.push((prev, node));
            prev = node;
        }
        if !route.is_empty() {
            arcs.push((prev, 0));
        }
    }
    let utilities: Vec<f64> = arcs
        .iter()
        .map(|arc| {
            let p = penalties.get(arc).copied().unwrap_or(0);
            matrix.cost(arc.0, arc.1) as f64 / (1.0 + p as f64)
        })
        .collect();
    let Some(max_utility) = utilities
        .iter()
        .copied()
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    else {
        return;
    };
    for (arc, utility) in arcs.into_iter().zip(utilities) {
        if (utility - max_utility).abs() < f64::EPSILON {
            *penalties.entry(arc).or_insert(0) += 1;
        }
    }
}

/// Builds the output table. The depot never appears as a row; each stop
/// carries its 1-based sequence and the load accumulated so far.
fn assemble(
    routes: Vec<Vec<usize>>,
    orders: &[Order],
    vehicles: &[Vehicle],
    demands: &[f64],
    matrix: &DistanceMatrix,
    status: SolveStatus,
) -> SolveResult {
    let real = |i: usize, j: usize| matrix.cost(i, j);
    let total_cost = solution_cost(&routes, &real);

    let mut stops = Vec::new();
    for (v, route) in routes.iter().enumerate() {
        let mut cumulative = 0.0;
        for (pos, &node) in route.iter().enumerate() {
            let order = &orders[node - 1];
            cumulative += demands[node];
            stops.push(RouteStop {
                vehicle: Some(vehicles[v].id.clone()),
                sequence: (pos + 1) as u32,
                node_index: node,
                order_id: order.id.clone(),
                demand: demands[node],
                cumulative_load: cumulative,
                region: order.normalized_region(),
                restricted: false,
            });
        }
        if !route.is_empty() {
            info!(
                "vehicle {}: {} stops, load {:.1}",
                vehicles[v].id,
                route.len(),
                cumulative
            );
        }
    }
    info!("{} stops assigned, total cost {total_cost}", stops.len());
    SolveResult {
        table: RouteTable { stops },
        status,
        total_cost,
    }
}
