//! Core domain records for the routing planner.
//!
//! Orders, vehicles and route rows are explicit typed records; optional
//! business fields (time windows, preferred regions, demand) are `Option`s
//! with documented defaults rather than ad-hoc lookups in each pass.

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Demand assumed for an order that carries no weight information.
pub const DEFAULT_DEMAND_KG: f64 = 1.0;

/// Capacity assumed for a vehicle that carries no capacity information.
pub const DEFAULT_CAPACITY_KG: f64 = 1000.0;

/// Floor applied to vehicle capacities entering the solver. A zero
/// capacity is a modeling error, not a "carries nothing" state.
pub const MIN_CAPACITY_KG: f64 = 1.0;

/// A geographic point. (0, 0) is treated as "missing", never as a real
/// coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Finite, in range, and not the (0, 0) sentinel.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && !(self.latitude == 0.0 && self.longitude == 0.0)
    }
}

/// Time-of-day operating window, parsed from `HH:MM` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Parses a `HH:MM` pair. Returns `None` on malformed input.
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").ok()?;
        Some(Self { start, end })
    }

    /// Default operating window assumed when none is declared (05:00-18:00).
    pub fn default_operating() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(5, 0, 0).expect("valid literal time"),
            end: NaiveTime::from_hms_opt(18, 0, 0).expect("valid literal time"),
        }
    }

    /// Whether `other` is fully contained in this window.
    pub fn contains(&self, other: &TimeWindow) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// A delivery order.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: String,
    /// Delivery point; `None` when geocoding failed or was never attempted.
    pub location: Option<Location>,
    /// Weight in kg; `None` falls back to [`DEFAULT_DEMAND_KG`].
    pub demand_kg: Option<f64>,
    pub time_window: Option<TimeWindow>,
    /// Administrative region label; compared only after normalization.
    pub region: Option<String>,
}

impl Order {
    pub fn demand(&self) -> f64 {
        self.demand_kg.unwrap_or(DEFAULT_DEMAND_KG).max(0.0)
    }

    pub fn valid_location(&self) -> Option<Location> {
        self.location.filter(Location::is_valid)
    }

    pub fn normalized_region(&self) -> Option<String> {
        self.region.as_deref().map(normalize_region)
    }
}

/// A fleet vehicle.
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: String,
    pub plate: Option<String>,
    /// Nominal capacity in kg; `None` falls back to [`DEFAULT_CAPACITY_KG`].
    pub capacity_kg: Option<f64>,
    pub available: bool,
    pub preferred_regions: Vec<String>,
    pub time_window: Option<TimeWindow>,
}

impl Vehicle {
    /// Effective capacity: declared or default, clamped to [`MIN_CAPACITY_KG`].
    pub fn capacity(&self) -> f64 {
        self.capacity_kg
            .unwrap_or(DEFAULT_CAPACITY_KG)
            .max(MIN_CAPACITY_KG)
    }

    pub fn normalized_preferences(&self) -> Vec<String> {
        self.preferred_regions
            .iter()
            .map(|r| normalize_region(r))
            .filter(|r| !r.is_empty())
            .collect()
    }

    pub fn operating_window(&self) -> TimeWindow {
        self.time_window.unwrap_or_else(TimeWindow::default_operating)
    }
}

/// One customer stop in a solved route table.
///
/// `vehicle` is `None` for stops stripped during overshoot correction and
/// not yet re-placed. `restricted` marks a pending business-rule violation.
#[derive(Debug, Clone)]
pub struct RouteStop {
    pub vehicle: Option<String>,
    pub sequence: u32,
    /// Index of this stop in the distance matrix (depot is 0).
    pub node_index: usize,
    pub order_id: String,
    pub demand: f64,
    pub cumulative_load: f64,
    pub region: Option<String>,
    pub restricted: bool,
}

/// The solver's output table: one row per routed order, mutated in place
/// by the post-processing passes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    pub stops: Vec<RouteStop>,
}

impl RouteTable {
    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    /// Distinct assigned vehicle ids, in order of first appearance.
    pub fn vehicle_ids(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for stop in &self.stops {
            if let Some(v) = &stop.vehicle {
                if !seen.iter().any(|s| s == v) {
                    seen.push(v.clone());
                }
            }
        }
        seen
    }

    /// Total assigned demand for one vehicle.
    pub fn load_of(&self, vehicle: &str) -> f64 {
        self.stops
            .iter()
            .filter(|s| s.vehicle.as_deref() == Some(vehicle))
            .map(|s| s.demand)
            .sum()
    }

    pub fn stop_count_of(&self, vehicle: &str) -> usize {
        self.stops
            .iter()
            .filter(|s| s.vehicle.as_deref() == Some(vehicle))
            .count()
    }

    /// Indices into `stops` for one vehicle, in sequence order.
    pub fn stops_of(&self, vehicle: &str) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .stops
            .iter()
            .enumerate()
            .filter(|(_, s)| s.vehicle.as_deref() == Some(vehicle))
            .map(|(i, _)| i)
            .collect();
        indices.sort_by_key(|&i| (self.stops[i].sequence, i));
        indices
    }

    pub fn unassigned(&self) -> Vec<usize> {
        self.stops
            .iter()
            .enumerate()
            .filter(|(_, s)| s.vehicle.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn restricted_count(&self) -> usize {
        self.stops.iter().filter(|s| s.restricted).count()
    }

    /// Restores per-vehicle invariants after passes have moved rows around:
    /// dense 1..k sequence numbers and a monotone cumulative load. Stops
    /// without a vehicle get sequence 0 and their own demand as load.
    pub fn resequence(&mut self) {
        for vehicle in self.vehicle_ids() {
            let indices = self.stops_of(&vehicle);
            let mut running = 0.0;
            for (pos, idx) in indices.into_iter().enumerate() {
                running += self.stops[idx].demand;
                self.stops[idx].sequence = (pos + 1) as u32;
                self.stops[idx].cumulative_load = running;
            }
        }
        for stop in self.stops.iter_mut().filter(|s| s.vehicle.is_none()) {
            stop.sequence = 0;
            stop.cumulative_load = stop.demand;
        }
    }
}

/// Normalizes a region label for comparison: trim, lowercase, fold common
/// Latin diacritics. "São Paulo" and " SAO PAULO " compare equal.
pub fn normalize_region(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(fold_diacritic)
        .collect()
}

fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        _ => c,
    }
}

/// Whether a license plate is banned by the São Paulo weekday rotation.
///
/// Monday bans finals 1-2, Tuesday 3-4, Wednesday 5-6, Thursday 7-8,
/// Friday 9-0; weekends are unrestricted.
pub fn plate_banned_on(plate: &str, weekday: Weekday) -> bool {
    let Some(final_digit) = plate.chars().last().and_then(|c| c.to_digit(10)) else {
        return false;
    };
    let banned: &[u32] = match weekday {
        Weekday::Mon => &[1, 2],
        Weekday::Tue => &[3, 4],
        Weekday::Wed => &[5, 6],
        Weekday::Thu => &[7, 8],
        Weekday::Fri => &[9, 0],
        Weekday::Sat | Weekday::Sun => return false,
    };
    banned.contains(&final_digit)
}

/// Filters the fleet down to vehicles that may actually drive: available,
/// and (when a rotation day is given) not plate-banned on that day.
pub fn active_fleet(vehicles: &[Vehicle], rotation_day: Option<Weekday>) -> Vec<Vehicle> {
    vehicles
        .iter()
        .filter(|v| v.available)
        .filter(|v| match (rotation_day, &v.plate) {
            (Some(day), Some(plate)) => {
                let banned = plate_banned_on(plate, day);
                if banned {
                    warn!("vehicle {} banned by plate rotation on {:?}", v.id, day);
                }
                !banned
            }
            _ => true,
        })
        .cloned()
        .collect()
}

/// Pre-solve feasibility report. Produced before the solver runs so data
/// problems surface as named rows instead of an opaque search failure.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    /// Orders excluded from the solve set for missing/invalid coordinates.
    pub unrouted_orders: Vec<String>,
    /// Orders whose demand exceeds every vehicle's capacity.
    pub oversized_orders: Vec<String>,
    /// Vehicles with declared capacity <= 0.
    pub zero_capacity_vehicles: Vec<String>,
    pub fleet_empty: bool,
    pub total_demand: f64,
    pub total_capacity: f64,
}

impl Diagnostics {
    /// Whether the routable subset of orders stands any chance of a
    /// feasible assignment.
    pub fn is_feasible(&self) -> bool {
        !self.fleet_empty
            && self.oversized_orders.is_empty()
            && self.total_demand <= self.total_capacity
    }
}

/// Runs the deterministic feasibility checks the solver itself cannot
/// explain: invalid coordinates, oversized orders, empty or degenerate
/// fleet, aggregate demand versus aggregate capacity.
pub fn precheck(orders: &[Order], vehicles: &[Vehicle]) -> Diagnostics {
    let mut diag = Diagnostics {
        fleet_empty: vehicles.is_empty(),
        ..Diagnostics::default()
    };

    let max_capacity = vehicles
        .iter()
        .map(Vehicle::capacity)
        .fold(0.0_f64, f64::max);
    diag.total_capacity = vehicles.iter().map(Vehicle::capacity).sum();

    for vehicle in vehicles {
        if vehicle.capacity_kg.is_some_and(|c| c <= 0.0) {
            diag.zero_capacity_vehicles.push(vehicle.id.clone());
        }
    }

    for order in orders {
        if order.valid_location().is_none() {
            diag.unrouted_orders.push(order.id.clone());
            continue;
        }
        diag.total_demand += order.demand();
        if !vehicles.is_empty() && order.demand() > max_capacity {
            diag.oversized_orders.push(order.id.clone());
        }
    }

    if !diag.unrouted_orders.is_empty() {
        warn!(
            "{} orders have no valid coordinates and will not be routed",
            diag.unrouted_orders.len()
        );
    }
    diag
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: &str, lat: f64, lon: f64, demand: f64) -> Order {
        Order {
            id: id.to_string(),
            location: Some(Location::new(lat, lon)),
            demand_kg: Some(demand),
            time_window: None,
            region: None,
        }
    }

    fn vehicle(id: &str, capacity: f64) -> Vehicle {
        Vehicle {
            id: id.to_string(),
            plate: None,
            capacity_kg: Some(capacity),
            available: true,
            preferred_regions: Vec::new(),
            time_window: None,
        }
    }

    #[test]
    fn zero_zero_is_missing_not_valid() {
        assert!(!Location::new(0.0, 0.0).is_valid());
        assert!(Location::new(0.0, 1.0).is_valid());
    }

    #[test]
    fn out_of_range_and_nan_rejected() {
        assert!(!Location::new(91.0, 10.0).is_valid());
        assert!(!Location::new(10.0, 181.0).is_valid());
        assert!(!Location::new(f64::NAN, 10.0).is_valid());
    }

    #[test]
    fn region_normalization_folds_case_and_diacritics() {
        assert_eq!(normalize_region("  São Paulo "), "sao paulo");
        assert_eq!(normalize_region("SAO PAULO"), "sao paulo");
        assert_eq!(normalize_region("Brasília"), "brasilia");
    }

    #[test]
    fn window_parse_and_containment() {
        let vehicle = TimeWindow::parse("05:00", "18:00").unwrap();
        let inside = TimeWindow::parse("08:00", "12:00").unwrap();
        let outside = TimeWindow::parse("04:00", "12:00").unwrap();
        assert!(vehicle.contains(&inside));
        assert!(!vehicle.contains(&outside));
        assert!(TimeWindow::parse("25:00", "12:00").is_none());
    }

    #[test]
    fn plate_rotation_weekdays() {
        assert!(plate_banned_on("ABC1231", Weekday::Mon));
        assert!(plate_banned_on("ABC1230", Weekday::Fri));
        assert!(!plate_banned_on("ABC1231", Weekday::Tue));
        assert!(!plate_banned_on("ABC1231", Weekday::Sat));
        assert!(!plate_banned_on("ABC123X", Weekday::Mon));
    }

    #[test]
    fn active_fleet_filters_banned_and_unavailable() {
        let mut v1 = vehicle("v1", 100.0);
        v1.plate = Some("AAA0001".to_string());
        let mut v2 = vehicle("v2", 100.0);
        v2.plate = Some("AAA0003".to_string());
        let mut v3 = vehicle("v3", 100.0);
        v3.available = false;

        let active = active_fleet(&[v1, v2, v3], Some(Weekday::Mon));
        let ids: Vec<&str> = active.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["v2"]);
    }

    #[test]
    fn precheck_flags_oversized_order() {
        let orders = vec![order("o1", 1.0, 1.0, 500.0)];
        let vehicles = vec![vehicle("v1", 100.0), vehicle("v2", 200.0)];
        let diag = precheck(&orders, &vehicles);
        assert_eq!(diag.oversized_orders, vec!["o1".to_string()]);
        assert!(!diag.is_feasible());
    }

    #[test]
    fn precheck_excludes_invalid_locations_from_demand() {
        let mut bad = order("bad", 0.0, 0.0, 50.0);
        bad.location = Some(Location::new(0.0, 0.0));
        let orders = vec![order("ok", 1.0, 1.0, 10.0), bad];
        let vehicles = vec![vehicle("v1", 100.0)];
        let diag = precheck(&orders, &vehicles);
        assert_eq!(diag.unrouted_orders, vec!["bad".to_string()]);
        assert!((diag.total_demand - 10.0).abs() < 1e-9);
        assert!(diag.is_feasible());
    }

    #[test]
    fn resequence_restores_dense_order_and_loads() {
        let mut table = RouteTable {
            stops: vec![
                RouteStop {
                    vehicle: Some("v1".to_string()),
                    sequence: 3,
                    node_index: 1,
                    order_id: "a".to_string(),
                    demand: 5.0,
                    cumulative_load: 0.0,
                    region: None,
                    restricted: false,
                },
                RouteStop {
                    vehicle: Some("v1".to_string()),
                    sequence: 1,
                    node_index: 2,
                    order_id: "b".to_string(),
                    demand: 7.0,
                    cumulative_load: 0.0,
                    region: None,
                    restricted: false,
                },
            ],
        };
        table.resequence();
        let seqs: Vec<(String, u32, f64)> = table
            .stops_of("v1")
            .into_iter()
            .map(|i| {
                let s = &table.stops[i];
                (s.order_id.clone(), s.sequence, s.cumulative_load)
            })
            .collect();
        assert_eq!(
            seqs,
            vec![("b".to_string(), 1, 7.0), ("a".to_string(), 2, 12.0)]
        );
    }
}
