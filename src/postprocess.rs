//! Business-rule rewrite passes over the solver's raw route table.
//!
//! The CVRP objective knows nothing about region coherence, driver
//! preferences, time windows or load fairness; these are enforced here as
//! an ordered sequence of idempotent passes over one mutable table. Every
//! pass reads and may rewrite the `vehicle` and `restricted` columns,
//! skips rows it cannot validate (with a warning), and reports counts.
//! No pass ever fails the pipeline: residual violations come back as
//! data, not errors.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::domain::{Location, Order, RouteTable, TimeWindow, Vehicle};
use crate::haversine::haversine_km;
use crate::matrix::DistanceMatrix;

const LOAD_EPS: f64 = 1e-9;

/// Radius around a region centroid inside which a stop still counts as
/// serving that region.
pub const DEFAULT_RADIUS_KM: f64 = 20.0;

/// Permitted share of nominal capacity a route may carry.
pub const DEFAULT_OVERSHOOT_LIMIT_PCT: u32 = 120;

/// What "load" means when balancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceCriterion {
    /// Total assigned weight.
    Weight,
    /// Number of stops.
    Stops,
}

/// Shared read-only inputs of every pass.
pub struct PassContext<'a> {
    pub fleet: &'a [Vehicle],
    pub orders: &'a [Order],
    pub matrix: &'a DistanceMatrix,
    pub radius_km: f64,
    pub overshoot_limit_pct: u32,
}

impl<'a> PassContext<'a> {
    fn orders_by_id(&self) -> HashMap<&'a str, &'a Order> {
        self.orders.iter().map(|o| (o.id.as_str(), o)).collect()
    }

    fn vehicle(&self, id: &str) -> Option<&'a Vehicle> {
        self.fleet.iter().find(|v| v.id == id)
    }

    fn overshoot_limit(&self, vehicle: &Vehicle) -> f64 {
        vehicle.capacity() * self.overshoot_limit_pct as f64 / 100.0
    }
}

/// Per-pass counters for the user-visible status feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOutcome {
    pub moved: usize,
    pub flagged: usize,
    pub unresolved: usize,
}

/// Vehicle still above its limit after correction, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct OvershootReport {
    pub vehicle: String,
    pub load: f64,
    pub limit: f64,
}

/// Mean coordinate of all orders carrying `region` (normalized match).
fn region_centroid(orders: &[Order], region: &str) -> Option<Location> {
    let points: Vec<Location> = orders
        .iter()
        .filter(|o| o.normalized_region().as_deref() == Some(region))
        .filter_map(Order::valid_location)
        .collect();
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    Some(Location::new(
        points.iter().map(|p| p.latitude).sum::<f64>() / n,
        points.iter().map(|p| p.longitude).sum::<f64>() / n,
    ))
}

/// The vehicle's most frequent stop regions, at most `k`, ordered by
/// count descending then name for determinism.
fn top_regions(table: &RouteTable, vehicle: &str, k: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for idx in table.stops_of(vehicle) {
        if let Some(region) = &table.stops[idx].region {
            *counts.entry(region.clone()).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(k).map(|(region, _)| region).collect()
}

/// Pass 1 — region-preference enforcement.
///
/// Orders whose region appears in some vehicle's declared preference set
/// are moved onto a preferred vehicle: the least-loaded one with
/// headroom, else the declared-preference vehicle whose preferred-region
/// centroid is nearest. An order no preferred vehicle can take stays put
/// and is flagged; it is never silently assigned outside the set.
pub fn enforce_region_preferences(table: &mut RouteTable, ctx: &PassContext) -> PassOutcome {
    let mut outcome = PassOutcome::default();
    if table.is_empty() {
        return outcome;
    }
    let orders_by_id = ctx.orders_by_id();
    let prefs: Vec<(String, Vec<String>)> = ctx
        .fleet
        .iter()
        .map(|v| (v.id.clone(), v.normalized_preferences()))
        .collect();

    for idx in 0..table.stops.len() {
        let Some(region) = table.stops[idx].region.clone() else {
            continue;
        };
        if table.stops[idx].vehicle.is_none() {
            continue;
        }
        let current = table.stops[idx].vehicle.clone();
        let demand = table.stops[idx].demand;

        let declaring: Vec<&str> = prefs
            .iter()
            .filter(|(_, regions)| regions.contains(&region))
            .map(|(id, _)| id.as_str())
            .collect();
        if declaring.is_empty() {
            continue;
        }
        if declaring.iter().any(|id| Some(*id) == current.as_deref()) {
            continue;
        }

        // Least-loaded declaring vehicle with headroom.
        let mut best: Option<(f64, &str)> = None;
        for &id in &declaring {
            let Some(vehicle) = ctx.vehicle(id) else { continue };
            let load = table.load_of(id);
            if load + demand > vehicle.capacity() + LOAD_EPS {
                continue;
            }
            if best.is_none_or(|(l, _)| load < l) {
                best = Some((load, id));
            }
        }
        if let Some((_, id)) = best {
            table.stops[idx].vehicle = Some(id.to_string());
            outcome.moved += 1;
            continue;
        }

        // No declaring vehicle fits: nearest preference centroid among
        // vehicles that declare any preference and still have headroom.
        let location = orders_by_id
            .get(table.stops[idx].order_id.as_str())
            .and_then(|o| o.valid_location());
        let mut nearest: Option<(f64, &str)> = None;
        if let Some(location) = location {
            for (id, regions) in &prefs {
                if regions.is_empty() {
                    continue;
                }
                let Some(vehicle) = ctx.vehicle(id) else { continue };
                if table.load_of(id) + demand > vehicle.capacity() + LOAD_EPS {
                    continue;
                }
                for preferred in regions {
                    let Some(centroid) = region_centroid(ctx.orders, preferred) else {
                        continue;
                    };
                    let km = haversine_km(&location, &centroid);
                    if nearest.is_none_or(|(d, _)| km < d) {
                        nearest = Some((km, id));
                    }
                }
            }
        }
        if let Some((_, id)) = nearest {
            if Some(id) != current.as_deref() {
                table.stops[idx].vehicle = Some(id.to_string());
                outcome.moved += 1;
            }
            continue;
        }

        warn!(
            "order {} (region '{region}') fits no preferred vehicle, flagging",
            table.stops[idx].order_id
        );
        if !table.stops[idx].restricted {
            table.stops[idx].restricted = true;
            outcome.flagged += 1;
        }
    }
    info!(
        "region preferences: {} moved, {} flagged",
        outcome.moved, outcome.flagged
    );
    outcome
}

/// Pass 2 — region-exclusivity restriction.
///
/// Each vehicle is pinned to its two most frequent regions; any of its
/// stops outside those regions, or beyond the radius from the matching
/// centroid, is flagged restricted. Pure-distance optimization may not
/// scatter a vehicle across unrelated neighborhoods.
pub fn restrict_vehicle_regions(table: &mut RouteTable, ctx: &PassContext) -> PassOutcome {
    let mut outcome = PassOutcome::default();
    let orders_by_id = ctx.orders_by_id();

    for vehicle in table.vehicle_ids() {
        let tops = top_regions(table, &vehicle, 2);
        let centroids: Vec<(String, Location)> = tops
            .iter()
            .filter_map(|region| {
                region_centroid(ctx.orders, region).map(|c| (region.clone(), c))
            })
            .collect();

        for idx in table.stops_of(&vehicle) {
            let location = orders_by_id
                .get(table.stops[idx].order_id.as_str())
                .and_then(|o| o.valid_location());
            let allowed = match (location, &table.stops[idx].region) {
                (Some(location), Some(region)) => centroids.iter().any(|(r, centroid)| {
                    r == region && haversine_km(&location, centroid) <= ctx.radius_km
                }),
                _ => false,
            };
            if !allowed && !table.stops[idx].restricted {
                warn!(
                    "order {} outside vehicle {}'s region set, flagging",
                    table.stops[idx].order_id, vehicle
                );
                table.stops[idx].restricted = true;
                outcome.flagged += 1;
            }
        }
    }
    info!("region exclusivity: {} flagged", outcome.flagged);
    outcome
}

/// Pass 3 — reallocation of restricted orders.
///
/// For each flagged order, searches other vehicles whose top-2 regions
/// include the order's region, whose matching centroid is within the
/// radius, and whose remaining nominal capacity covers the demand. Moves
/// clear the flag; what cannot be placed stays flagged as a reportable
/// violation.
pub fn reallocate_restricted(table: &mut RouteTable, ctx: &PassContext) -> PassOutcome {
    let mut outcome = PassOutcome::default();
    let orders_by_id = ctx.orders_by_id();

    let flagged: Vec<usize> = (0..table.stops.len())
        .filter(|&i| table.stops[i].restricted && table.stops[i].vehicle.is_some())
        .collect();

    for idx in flagged {
        let stop = &table.stops[idx];
        let current = stop.vehicle.clone();
        let demand = stop.demand;
        let (Some(region), Some(location)) = (
            stop.region.clone(),
            orders_by_id
                .get(stop.order_id.as_str())
                .and_then(|o| o.valid_location()),
        ) else {
            warn!(
                "restricted order {} lacks region or coordinates, skipping",
                stop.order_id
            );
            outcome.unresolved += 1;
            continue;
        };

        let mut target: Option<String> = None;
        for vehicle in table.vehicle_ids() {
            if Some(&vehicle) == current.as_ref() {
                continue;
            }
            if !top_regions(table, &vehicle, 2).contains(&region) {
                continue;
            }
            let Some(centroid) = region_centroid(ctx.orders, &region) else {
                continue;
            };
            if haversine_km(&location, &centroid) > ctx.radius_km {
                continue;
            }
            let Some(record) = ctx.vehicle(&vehicle) else {
                continue;
            };
            if table.load_of(&vehicle) + demand <= record.capacity() + LOAD_EPS {
                target = Some(vehicle);
                break;
            }
        }

        match target {
            Some(vehicle) => {
                table.stops[idx].vehicle = Some(vehicle);
                table.stops[idx].restricted = false;
                outcome.moved += 1;
            }
            None => outcome.unresolved += 1,
        }
    }
    info!(
        "reallocation: {} moved, {} still restricted",
        outcome.moved, outcome.unresolved
    );
    outcome
}

/// Pass 4 — time-window compatibility.
///
/// An order window not fully contained in its vehicle's operating window
/// flags the stop restricted; the reallocation pass then repairs it like
/// any other violation. Undeclared windows default to 05:00-18:00 on
/// both sides.
pub fn check_time_windows(table: &mut RouteTable, ctx: &PassContext) -> PassOutcome {
    let mut outcome = PassOutcome::default();
    let orders_by_id = ctx.orders_by_id();

    for stop in &mut table.stops {
        let Some(vehicle_id) = &stop.vehicle else {
            continue;
        };
        let Some(vehicle) = ctx.fleet.iter().find(|v| &v.id == vehicle_id) else {
            warn!("stop assigned to unknown vehicle '{vehicle_id}', skipping");
            continue;
        };
        let vehicle_window = vehicle.operating_window();
        let order_window = orders_by_id
            .get(stop.order_id.as_str())
            .and_then(|o| o.time_window)
            .unwrap_or_else(TimeWindow::default_operating);

        if !vehicle_window.contains(&order_window) && !stop.restricted {
            warn!(
                "order {} window does not fit vehicle {vehicle_id}, flagging",
                stop.order_id
            );
            stop.restricted = true;
            outcome.flagged += 1;
        }
    }
    info!("time windows: {} flagged", outcome.flagged);
    outcome
}

/// Pass 5 — iterative load balancing.
///
/// First guarantees every available vehicle carries at least one stop by
/// taking the largest stop from the current heaviest vehicle (a donor
/// keeps at least one stop). Then repeatedly moves one stop from the
/// most- to the least-loaded vehicle until the gap closes or the
/// iteration bound hits. With `prefer_region`, the moved stop is taken
/// from the donor's dominant region when possible.
pub fn balance_loads(
    table: &mut RouteTable,
    ctx: &PassContext,
    criterion: BalanceCriterion,
    prefer_region: bool,
    max_iter: usize,
) -> PassOutcome {
    let mut outcome = PassOutcome::default();
    if table.is_empty() {
        return outcome;
    }

    for vehicle in ctx.fleet.iter().filter(|v| v.available) {
        if table.stop_count_of(&vehicle.id) > 0 {
            continue;
        }
        let Some(donor) = table
            .vehicle_ids()
            .into_iter()
            .filter(|v| table.stop_count_of(v) >= 2)
            .max_by(|a, b| {
                table
                    .load_of(a)
                    .partial_cmp(&table.load_of(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        else {
            continue;
        };
        let Some(idx) = table
            .stops_of(&donor)
            .into_iter()
            .max_by(|&a, &b| {
                table.stops[a]
                    .demand
                    .partial_cmp(&table.stops[b].demand)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        else {
            continue;
        };
        table.stops[idx].vehicle = Some(vehicle.id.clone());
        outcome.moved += 1;
    }

    let measure = |table: &RouteTable, vehicle: &str| -> f64 {
        match criterion {
            BalanceCriterion::Weight => table.load_of(vehicle),
            BalanceCriterion::Stops => table.stop_count_of(vehicle) as f64,
        }
    };

    for _ in 0..max_iter {
        let vehicles = table.vehicle_ids();
        if vehicles.len() < 2 {
            break;
        }
        let heaviest = vehicles
            .iter()
            .max_by(|a, b| {
                measure(table, a)
                    .partial_cmp(&measure(table, b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned()
            .expect("nonempty vehicle list");
        let lightest = vehicles
            .iter()
            .min_by(|a, b| {
                measure(table, a)
                    .partial_cmp(&measure(table, b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned()
            .expect("nonempty vehicle list");
        if measure(table, &heaviest) - measure(table, &lightest) < 1.0 {
            break;
        }

        let candidates = table.stops_of(&heaviest);
        let mut pick = None;
        if prefer_region {
            if let Some(dominant) = top_regions(table, &heaviest, 1).first() {
                pick = candidates
                    .iter()
                    .find(|&&i| table.stops[i].region.as_deref() == Some(dominant))
                    .copied();
            }
        }
        let Some(idx) = pick.or_else(|| candidates.first().copied()) else {
            break;
        };
        table.stops[idx].vehicle = Some(lightest);
        outcome.moved += 1;
    }
    info!("balancing: {} moved", outcome.moved);
    outcome
}

/// Composite convergence loop: balance by weight, by stop count, by
/// weight with region preference, then nearest-neighbor moves, repeated
/// until assignments stop changing.
pub fn balance_iteratively(
    table: &mut RouteTable,
    ctx: &PassContext,
    max_iter: usize,
) -> PassOutcome {
    let mut total = PassOutcome::default();
    for _ in 0..max_iter {
        let before: Vec<Option<String>> = table.stops.iter().map(|s| s.vehicle.clone()).collect();

        let a = balance_loads(table, ctx, BalanceCriterion::Weight, false, 20);
        let b = balance_loads(table, ctx, BalanceCriterion::Stops, false, 20);
        let c = balance_loads(table, ctx, BalanceCriterion::Weight, true, 20);
        let d = nearest_neighbor_moves(table, ctx, 10);
        total.moved += a.moved + b.moved + c.moved + d.moved;

        let unchanged = table
            .stops
            .iter()
            .zip(&before)
            .all(|(s, prev)| s.vehicle == *prev);
        if unchanged {
            break;
        }
    }
    total
}

/// Pass 6 — nearest-neighbor insertion refinement.
///
/// For each stop, compares the marginal cost of its current position
/// against the cheapest insertion into every other vehicle's route at
/// every position; the move happens only on a strict reduction. Stops
/// early when a full sweep improves nothing.
pub fn nearest_neighbor_moves(
    table: &mut RouteTable,
    ctx: &PassContext,
    max_iter: usize,
) -> PassOutcome {
    let mut outcome = PassOutcome::default();

    for _ in 0..max_iter {
        let mut improved = false;
        for idx in 0..table.stops.len() {
            let Some(current) = table.stops[idx].vehicle.clone() else {
                continue;
            };
            let node = table.stops[idx].node_index;

            // Marginal cost of sitting where it sits now.
            let own_route = table.stops_of(&current);
            let Some(position) = own_route.iter().position(|&i| i == idx) else {
                continue;
            };
            let prev = if position == 0 {
                0
            } else {
                table.stops[own_route[position - 1]].node_index
            };
            let next = if position + 1 == own_route.len() {
                0
            } else {
                table.stops[own_route[position + 1]].node_index
            };
            let current_marginal = ctx.matrix.cost(prev, node) + ctx.matrix.cost(node, next)
                - ctx.matrix.cost(prev, next);

            let mut best: Option<(i64, String)> = None;
            for vehicle in table.vehicle_ids() {
                if vehicle == current {
                    continue;
                }
                let route: Vec<usize> = table
                    .stops_of(&vehicle)
                    .into_iter()
                    .map(|i| table.stops[i].node_index)
                    .collect();
                for slot in 0..=route.len() {
                    let before = if slot == 0 { 0 } else { route[slot - 1] };
                    let after = if slot == route.len() { 0 } else { route[slot] };
                    let delta = ctx.matrix.cost(before, node) + ctx.matrix.cost(node, after)
                        - ctx.matrix.cost(before, after);
                    if best.as_ref().is_none_or(|(d, _)| delta < *d) {
                        best = Some((delta, vehicle.clone()));
                    }
                }
            }
            if let Some((delta, vehicle)) = best {
                if delta < current_marginal {
                    table.stops[idx].vehicle = Some(vehicle);
                    outcome.moved += 1;
                    improved = true;
                }
            }
        }
        if !improved {
            break;
        }
    }
    info!("nearest-neighbor refinement: {} moved", outcome.moved);
    outcome
}

/// Pass 7 — capacity-overshoot correction; always runs last because any
/// earlier pass can introduce overshoot.
///
/// Vehicles above `capacity × limit` lose their heaviest stops until
/// under the limit; stripped stops are re-placed greedy-first-fit over
/// the fleet. The greedy scan is deliberate: it may leave orders
/// unplaced even when a full repacking would fit them, and those orders
/// are surfaced instead of searched for.
pub fn correct_capacity_overshoot(
    table: &mut RouteTable,
    ctx: &PassContext,
) -> (PassOutcome, Vec<OvershootReport>) {
    let mut outcome = PassOutcome::default();

    for vehicle in ctx.fleet {
        let limit = ctx.overshoot_limit(vehicle);
        let mut load = table.load_of(&vehicle.id);
        if load <= limit + LOAD_EPS {
            continue;
        }
        warn!(
            "vehicle {} over limit ({load:.1} > {limit:.1}), stripping heaviest stops",
            vehicle.id
        );
        while load > limit + LOAD_EPS {
            let Some(idx) = table
                .stops_of(&vehicle.id)
                .into_iter()
                .max_by(|&a, &b| {
                    table.stops[a]
                        .demand
                        .partial_cmp(&table.stops[b].demand)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
            else {
                break;
            };
            load -= table.stops[idx].demand;
            table.stops[idx].vehicle = None;
            outcome.flagged += 1;
        }
    }

    // Greedy first-fit re-placement in fleet order.
    for idx in 0..table.stops.len() {
        if table.stops[idx].vehicle.is_some() {
            continue;
        }
        let demand = table.stops[idx].demand;
        for vehicle in ctx.fleet {
            let limit = ctx.overshoot_limit(vehicle);
            if table.load_of(&vehicle.id) + demand <= limit + LOAD_EPS {
                table.stops[idx].vehicle = Some(vehicle.id.clone());
                outcome.moved += 1;
                break;
            }
        }
    }

    let mut reports = Vec::new();
    for vehicle in ctx.fleet {
        let load = table.load_of(&vehicle.id);
        let limit = ctx.overshoot_limit(vehicle);
        if load > limit + LOAD_EPS {
            reports.push(OvershootReport {
                vehicle: vehicle.id.clone(),
                load,
                limit,
            });
        }
    }
    outcome.unresolved = table.unassigned().len();
    info!(
        "overshoot correction: {} stripped, {} re-placed, {} unplaced, {} vehicles still over",
        outcome.flagged,
        outcome.moved,
        outcome.unresolved,
        reports.len()
    );
    (outcome, reports)
}

/// Assigns the stops of the most order-dense regions to the first
/// vehicles of the fleet, reserving dedicated capacity for critical
/// regions before any balancing runs.
pub fn reserve_vehicles_for_regions(
    table: &mut RouteTable,
    ctx: &PassContext,
    reserves: usize,
) -> PassOutcome {
    let mut outcome = PassOutcome::default();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for order in ctx.orders {
        if let Some(region) = order.normalized_region() {
            *counts.entry(region).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let available: Vec<&Vehicle> = ctx.fleet.iter().filter(|v| v.available).collect();
    for (i, (region, _)) in ranked.into_iter().take(reserves).enumerate() {
        let Some(vehicle) = available.get(i) else { break };
        for stop in &mut table.stops {
            if stop.region.as_deref() == Some(region.as_str())
                && stop.vehicle.as_deref() != Some(vehicle.id.as_str())
            {
                stop.vehicle = Some(vehicle.id.clone());
                outcome.moved += 1;
            }
        }
    }
    outcome
}

/// Pass toggles and tuning for [`run_pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub radius_km: f64,
    pub overshoot_limit_pct: u32,
    pub enforce_preferences: bool,
    pub restrict_regions: bool,
    pub check_time_windows: bool,
    pub reallocate_restricted: bool,
    pub balance: bool,
    pub balance_criterion: BalanceCriterion,
    pub balance_prefer_region: bool,
    pub balance_max_iter: usize,
    pub nearest_neighbor: bool,
    pub nn_max_iter: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            radius_km: DEFAULT_RADIUS_KM,
            overshoot_limit_pct: DEFAULT_OVERSHOOT_LIMIT_PCT,
            enforce_preferences: true,
            restrict_regions: true,
            check_time_windows: true,
            reallocate_restricted: true,
            balance: true,
            balance_criterion: BalanceCriterion::Weight,
            balance_prefer_region: false,
            balance_max_iter: 20,
            nearest_neighbor: true,
            nn_max_iter: 10,
        }
    }
}

/// Aggregate result of a pipeline run: per-pass counts plus the residual
/// violations a human has to look at.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub outcomes: Vec<(&'static str, PassOutcome)>,
    pub residual_restricted: usize,
    pub unplaced_orders: Vec<String>,
    pub overshoots: Vec<OvershootReport>,
}

/// Runs the enabled passes in their fixed order. Preference and
/// exclusivity run before balancing so balancing sees a region-sane
/// assignment; overshoot correction always runs last because every prior
/// pass can worsen overshoot.
pub fn run_pipeline(
    table: &mut RouteTable,
    fleet: &[Vehicle],
    orders: &[Order],
    matrix: &DistanceMatrix,
    config: &PipelineConfig,
) -> PipelineReport {
    let ctx = PassContext {
        fleet,
        orders,
        matrix,
        radius_km: config.radius_km,
        overshoot_limit_pct: config.overshoot_limit_pct,
    };
    let mut report = PipelineReport::default();

    if config.enforce_preferences {
        report
            .outcomes
            .push(("region-preference", enforce_region_preferences(table, &ctx)));
    }
    if config.restrict_regions {
        report
            .outcomes
            .push(("region-exclusivity", restrict_vehicle_regions(table, &ctx)));
    }
    if config.check_time_windows {
        report
            .outcomes
            .push(("time-windows", check_time_windows(table, &ctx)));
    }
    if config.reallocate_restricted {
        report
            .outcomes
            .push(("reallocation", reallocate_restricted(table, &ctx)));
    }
    if config.balance {
        report.outcomes.push((
            "balancing",
            balance_loads(
                table,
                &ctx,
                config.balance_criterion,
                config.balance_prefer_region,
                config.balance_max_iter,
            ),
        ));
    }
    if config.nearest_neighbor {
        report.outcomes.push((
            "nearest-neighbor",
            nearest_neighbor_moves(table, &ctx, config.nn_max_iter),
        ));
    }
    let (overshoot, reports) = correct_capacity_overshoot(table, &ctx);
    report.outcomes.push(("capacity-overshoot", overshoot));
    report.overshoots = reports;

    table.resequence();
    report.residual_restricted = table.restricted_count();
    report.unplaced_orders = table
        .unassigned()
        .into_iter()
        .map(|i| table.stops[i].order_id.clone())
        .collect();
    info!(
        "pipeline finished: {} restricted, {} unplaced, {} vehicles over limit",
        report.residual_restricted,
        report.unplaced_orders.len(),
        report.overshoots.len()
    );
    report
}
