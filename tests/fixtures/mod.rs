//! Shared builders for scenario tests.
#![allow(dead_code)]

use fleet_planner::domain::{Location, Order, RouteStop, RouteTable, TimeWindow, Vehicle};
use fleet_planner::matrix::DistanceMatrix;

/// Builder for test orders with sensible defaults.
#[derive(Clone, Debug)]
pub struct OrderBuilder {
    order: Order,
}

pub fn order(id: &str) -> OrderBuilder {
    OrderBuilder {
        order: Order {
            id: id.to_string(),
            location: None,
            demand_kg: Some(1.0),
            time_window: None,
            region: None,
        },
    }
}

impl OrderBuilder {
    pub fn at(mut self, latitude: f64, longitude: f64) -> Self {
        self.order.location = Some(Location::new(latitude, longitude));
        self
    }

    pub fn demand(mut self, kg: f64) -> Self {
        self.order.demand_kg = Some(kg);
        self
    }

    pub fn no_demand(mut self) -> Self {
        self.order.demand_kg = None;
        self
    }

    pub fn region(mut self, label: &str) -> Self {
        self.order.region = Some(label.to_string());
        self
    }

    pub fn window(mut self, start: &str, end: &str) -> Self {
        self.order.time_window = TimeWindow::parse(start, end);
        self
    }

    pub fn build(self) -> Order {
        self.order
    }
}

/// Builder for test vehicles with sensible defaults.
#[derive(Clone, Debug)]
pub struct VehicleBuilder {
    vehicle: Vehicle,
}

pub fn vehicle(id: &str) -> VehicleBuilder {
    VehicleBuilder {
        vehicle: Vehicle {
            id: id.to_string(),
            plate: None,
            capacity_kg: Some(100.0),
            available: true,
            preferred_regions: Vec::new(),
            time_window: None,
        },
    }
}

impl VehicleBuilder {
    pub fn capacity(mut self, kg: f64) -> Self {
        self.vehicle.capacity_kg = Some(kg);
        self
    }

    pub fn plate(mut self, plate: &str) -> Self {
        self.vehicle.plate = Some(plate.to_string());
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.vehicle.available = false;
        self
    }

    pub fn prefers(mut self, region: &str) -> Self {
        self.vehicle.preferred_regions.push(region.to_string());
        self
    }

    pub fn window(mut self, start: &str, end: &str) -> Self {
        self.vehicle.time_window = TimeWindow::parse(start, end);
        self
    }

    pub fn build(self) -> Vehicle {
        self.vehicle
    }
}

/// Manhattan-distance matrix over `{depot} ∪ orders`, scaled to whole
/// units. Orders without a valid location stay unreachable.
pub fn matrix_over(depot: Location, orders: &[Order]) -> DistanceMatrix {
    let mut locations = vec![Some(depot)];
    locations.extend(orders.iter().map(|o| o.location.filter(|l| l.is_valid())));

    let n = locations.len();
    let mut cells = vec![vec![fleet_planner::matrix::INFINITE; n]; n];
    for i in 0..n {
        cells[i][i] = 0;
        for j in 0..n {
            if i == j {
                continue;
            }
            if let (Some(a), Some(b)) = (locations[i], locations[j]) {
                let manhattan =
                    (a.latitude - b.latitude).abs() + (a.longitude - b.longitude).abs();
                cells[i][j] = (manhattan * 100.0).round() as i64;
            }
        }
    }
    DistanceMatrix::from_cells(cells).expect("square by construction")
}

/// Builds a route table directly, for pass tests that need a known
/// starting assignment. `assignments` pairs each order id with a vehicle
/// id; node indices follow the order positions in `orders`.
pub fn table_for(assignments: &[(&str, &str)], orders: &[Order]) -> RouteTable {
    let mut stops = Vec::new();
    let mut per_vehicle: std::collections::HashMap<&str, u32> = std::collections::HashMap::new();
    for (order_id, vehicle_id) in assignments {
        let position = orders
            .iter()
            .position(|o| o.id == *order_id)
            .expect("order id present in fixture");
        let order = &orders[position];
        let sequence = per_vehicle.entry(*vehicle_id).or_insert(0);
        *sequence += 1;
        stops.push(RouteStop {
            vehicle: Some(vehicle_id.to_string()),
            sequence: *sequence,
            node_index: position + 1,
            order_id: order.id.clone(),
            demand: order.demand(),
            cumulative_load: 0.0,
            region: order.normalized_region(),
            restricted: false,
        });
    }
    let mut table = RouteTable { stops };
    table.resequence();
    table
}
