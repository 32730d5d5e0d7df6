//! Solver scenario tests: statuses, capacity handling, sequencing, and
//! the per-cluster driver.

mod fixtures;

use std::collections::HashSet;
use std::time::Duration;

use fleet_planner::cluster::assign_clusters;
use fleet_planner::domain::{Location, precheck};
use fleet_planner::matrix::DistanceMatrix;
use fleet_planner::solver::{SolveStatus, SolverConfig, solve, solve_per_cluster};
use fixtures::{matrix_over, order, vehicle};

fn quick_config() -> SolverConfig {
    SolverConfig {
        time_limit: Duration::from_millis(200),
        capacity_scale_pct: 100,
        max_stale_rounds: 5,
    }
}

#[test]
fn empty_orders_give_empty_table() {
    let vehicles = vec![vehicle("v1").build()];
    let matrix = DistanceMatrix::filled(1);
    let result = solve(&[], &vehicles, &matrix, &quick_config());
    assert_eq!(result.status, SolveStatus::NotSolved);
    assert!(result.table.is_empty());
}

#[test]
fn empty_fleet_gives_empty_table() {
    let orders = vec![order("o1").at(10.0, 10.0).build()];
    let matrix = matrix_over(Location::new(9.0, 9.0), &orders);
    let result = solve(&orders, &[], &matrix, &quick_config());
    assert_eq!(result.status, SolveStatus::NotSolved);
    assert!(result.table.is_empty());
}

#[test]
fn mis_sized_matrix_is_invalid_model() {
    let orders = vec![order("o1").at(10.0, 10.0).build()];
    let vehicles = vec![vehicle("v1").build()];
    let matrix = DistanceMatrix::filled(5);
    let result = solve(&orders, &vehicles, &matrix, &quick_config());
    assert_eq!(result.status, SolveStatus::InvalidModel);
}

#[test]
fn invalid_order_coordinates_are_rejected_before_search() {
    let orders = vec![
        order("o1").at(10.0, 10.0).build(),
        order("o2").at(0.0, 0.0).build(),
    ];
    let vehicles = vec![vehicle("v1").build()];
    let matrix = matrix_over(Location::new(9.0, 9.0), &orders);
    let result = solve(&orders, &vehicles, &matrix, &quick_config());
    assert_eq!(result.status, SolveStatus::InvalidModel);
    assert!(result.table.is_empty());
}

#[test]
fn oversized_order_is_caught_by_precheck_and_solver() {
    // One order of demand 500 against capacities 100 and 200: the
    // pre-check names the offending order, and the solver reports
    // infeasibility rather than panicking.
    let orders = vec![order("big").at(10.0, 10.0).demand(500.0).build()];
    let vehicles = vec![
        vehicle("small").capacity(100.0).build(),
        vehicle("medium").capacity(200.0).build(),
    ];

    let diag = precheck(&orders, &vehicles);
    assert_eq!(diag.oversized_orders, vec!["big".to_string()]);
    assert!(!diag.is_feasible());

    let matrix = matrix_over(Location::new(9.0, 9.0), &orders);
    let result = solve(&orders, &vehicles, &matrix, &quick_config());
    assert_eq!(result.status, SolveStatus::Infeasible);
    assert!(result.table.is_empty());
}

#[test]
fn small_feasible_cvrp_routes_every_order() {
    // Four orders forming a square around the depot, two vehicles that
    // can each carry any two of them.
    let depot = Location::new(10.0, 10.0);
    let orders = vec![
        order("n").at(10.1, 10.0).demand(10.0).build(),
        order("e").at(10.0, 10.1).demand(10.0).build(),
        order("s").at(9.9, 10.0).demand(10.0).build(),
        order("w").at(10.0, 9.9).demand(10.0).build(),
    ];
    let vehicles = vec![
        vehicle("v1").capacity(20.0).build(),
        vehicle("v2").capacity(20.0).build(),
    ];
    let matrix = matrix_over(depot, &orders);

    let result = solve(&orders, &vehicles, &matrix, &quick_config());
    assert_eq!(result.status, SolveStatus::Solved);
    assert_eq!(result.table.len(), 4);

    // No order appears twice.
    let ids: HashSet<&str> = result.table.stops.iter().map(|s| s.order_id.as_str()).collect();
    assert_eq!(ids.len(), 4);

    // At most two vehicles, each within capacity, each with dense
    // sequencing and monotone cumulative load.
    let used = result.table.vehicle_ids();
    assert!(used.len() <= 2);
    for vehicle_id in used {
        assert!(result.table.load_of(&vehicle_id) <= 20.0 + 1e-9);
        let indices = result.table.stops_of(&vehicle_id);
        let mut previous_load = 0.0;
        for (pos, idx) in indices.iter().enumerate() {
            let stop = &result.table.stops[*idx];
            assert_eq!(stop.sequence, (pos + 1) as u32);
            assert!(stop.cumulative_load >= previous_load);
            previous_load = stop.cumulative_load;
        }
    }
}

#[test]
fn depot_never_appears_in_output() {
    let depot = Location::new(10.0, 10.0);
    let orders = vec![
        order("a").at(10.1, 10.0).build(),
        order("b").at(10.2, 10.0).build(),
    ];
    let vehicles = vec![vehicle("v1").build()];
    let matrix = matrix_over(depot, &orders);
    let result = solve(&orders, &vehicles, &matrix, &quick_config());
    assert!(result.table.stops.iter().all(|s| s.node_index != 0));
}

#[test]
fn capacity_scale_pct_tightens_and_loosens() {
    let depot = Location::new(10.0, 10.0);
    let orders = vec![
        order("a").at(10.1, 10.0).demand(60.0).build(),
        order("b").at(10.2, 10.0).demand(60.0).build(),
    ];
    let vehicles = vec![vehicle("v1").capacity(100.0).build()];
    let matrix = matrix_over(depot, &orders);

    // At nominal capacity the two orders cannot share the one vehicle.
    let nominal = solve(&orders, &vehicles, &matrix, &quick_config());
    assert_eq!(nominal.status, SolveStatus::Infeasible);

    // At 130% (capacity 130) both fit.
    let mut config = quick_config();
    config.capacity_scale_pct = 130;
    let loose = solve(&orders, &vehicles, &matrix, &config);
    assert_eq!(loose.status, SolveStatus::Solved);
    assert_eq!(loose.table.len(), 2);
}

#[test]
fn missing_demand_defaults_to_one_unit() {
    let depot = Location::new(10.0, 10.0);
    let orders = vec![
        order("a").at(10.1, 10.0).no_demand().build(),
        order("b").at(10.2, 10.0).no_demand().build(),
    ];
    let vehicles = vec![vehicle("v1").capacity(2.0).build()];
    let matrix = matrix_over(depot, &orders);
    let result = solve(&orders, &vehicles, &matrix, &quick_config());
    assert_eq!(result.status, SolveStatus::Solved);
    assert!(result.table.stops.iter().all(|s| (s.demand - 1.0).abs() < 1e-9));
}

#[test]
fn improvement_does_not_worsen_construction() {
    let depot = Location::new(10.0, 10.0);
    let orders: Vec<_> = (0..8)
        .map(|i| {
            order(&format!("o{i}"))
                .at(10.0 + 0.01 * (i + 1) as f64, 10.0 + 0.02 * ((i * 3) % 5) as f64)
                .demand(5.0)
                .build()
        })
        .collect();
    let vehicles = vec![
        vehicle("v1").capacity(25.0).build(),
        vehicle("v2").capacity(25.0).build(),
    ];
    let matrix = matrix_over(depot, &orders);
    let result = solve(&orders, &vehicles, &matrix, &quick_config());
    assert_eq!(result.status, SolveStatus::Solved);
    assert_eq!(result.table.len(), 8);
    assert!(result.total_cost > 0);
}

#[test]
fn per_cluster_solve_remaps_node_indices() {
    let depot = Location::new(10.0, 10.0);
    let orders = vec![
        order("a1").at(10.1, 10.0).region("norte").build(),
        order("b1").at(12.0, 12.0).region("sul").build(),
        order("a2").at(10.2, 10.0).region("norte").build(),
        order("b2").at(12.1, 12.0).region("sul").build(),
    ];
    let vehicles = vec![vehicle("v1").capacity(100.0).build()];
    let matrix = matrix_over(depot, &orders);
    let clusters = assign_clusters(&orders, 4);

    let result = solve_per_cluster(&orders, &vehicles, &matrix, &clusters, &quick_config());
    assert_eq!(result.status, SolveStatus::Solved);
    assert_eq!(result.table.len(), 4);

    // Node indices point back into the global matrix.
    for stop in &result.table.stops {
        let expected = orders
            .iter()
            .position(|o| o.id == stop.order_id)
            .unwrap()
            + 1;
        assert_eq!(stop.node_index, expected);
    }

    // Concatenation re-densified the shared vehicle's sequence.
    let indices = result.table.stops_of("v1");
    for (pos, idx) in indices.iter().enumerate() {
        assert_eq!(result.table.stops[*idx].sequence, (pos + 1) as u32);
    }
}

#[test]
fn solver_is_deterministic() {
    let depot = Location::new(10.0, 10.0);
    let orders: Vec<_> = (0..6)
        .map(|i| {
            order(&format!("o{i}"))
                .at(10.0 + 0.03 * (i + 1) as f64, 10.0 - 0.02 * (i + 1) as f64)
                .demand(10.0)
                .build()
        })
        .collect();
    let vehicles = vec![
        vehicle("v1").capacity(40.0).build(),
        vehicle("v2").capacity(40.0).build(),
    ];
    let matrix = matrix_over(depot, &orders);

    let first = solve(&orders, &vehicles, &matrix, &quick_config());
    let second = solve(&orders, &vehicles, &matrix, &quick_config());
    let assignment = |r: &fleet_planner::solver::SolveResult| -> Vec<(String, Option<String>)> {
        r.table
            .stops
            .iter()
            .map(|s| (s.order_id.clone(), s.vehicle.clone()))
            .collect()
    };
    assert_eq!(assignment(&first), assignment(&second));
}
