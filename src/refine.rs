//! Stateless route-improvement primitives.
//!
//! A route here is a plain sequence of matrix node indices starting and
//! ending at the depot (index 0). These operate standalone or under the
//! post-processing passes.

use tracing::warn;

use crate::matrix::DistanceMatrix;

/// Sum of consecutive arc costs. `None` when any index falls outside the
/// matrix — the guard against corrupted sequences.
pub fn route_distance(route: &[usize], matrix: &DistanceMatrix) -> Option<i64> {
    let mut total = 0i64;
    for pair in route.windows(2) {
        match matrix.get(pair[0], pair[1]) {
            Some(cost) => total += cost,
            None => {
                warn!(
                    "arc ({}, {}) outside {}x{} matrix",
                    pair[0],
                    pair[1],
                    matrix.len(),
                    matrix.len()
                );
                return None;
            }
        }
    }
    Some(total)
}

/// 2-opt with a first-improvement strategy: the first segment reversal
/// that strictly shortens the route is applied and the scan restarts.
/// Depot endpoints are never moved.
pub fn two_opt(route: &[usize], matrix: &DistanceMatrix) -> Vec<usize> {
    let mut best = route.to_vec();
    if best.len() <= 3 {
        return best;
    }
    let Some(mut best_distance) = route_distance(&best, matrix) else {
        warn!("route invalid for 2-opt, returning unchanged");
        return best;
    };

    let mut improved = true;
    while improved {
        improved = false;
        'scan: for i in 1..best.len() - 2 {
            for j in i + 1..best.len() - 1 {
                let mut candidate = best.clone();
                candidate[i..=j].reverse();
                if let Some(distance) = route_distance(&candidate, matrix) {
                    if distance < best_distance {
                        best = candidate;
                        best_distance = distance;
                        improved = true;
                        break 'scan;
                    }
                }
            }
        }
    }
    best
}

/// Partitions one long depot-to-depot route into sub-routes of at most
/// `max_stops` customer visits each, preserving visit order.
pub fn split(route: &[usize], max_stops: usize) -> Vec<Vec<usize>> {
    if route.is_empty() {
        warn!("empty route for split");
        return Vec::new();
    }
    if route.first() != Some(&0) || route.last() != Some(&0) {
        warn!("split expects a depot-bounded route");
        return vec![route.to_vec()];
    }
    if route.len() <= 2 {
        return vec![route.to_vec()];
    }
    if max_stops == 0 {
        warn!("max_stops must be positive");
        return vec![route.to_vec()];
    }

    let mut sub_routes = Vec::new();
    let mut current = vec![0usize];
    for &stop in &route[1..route.len() - 1] {
        current.push(stop);
        if current.len() - 1 >= max_stops {
            current.push(0);
            sub_routes.push(current);
            current = vec![0];
        }
    }
    if current.len() > 1 {
        current.push(0);
        sub_routes.push(current);
    }
    sub_routes
}

/// Iteratively merges the pair of routes whose concatenation (in either
/// order) saves the most distance, subject to an optional combined
/// capacity bound, until no beneficial merge remains.
pub fn merge(
    routes: &[Vec<usize>],
    matrix: &DistanceMatrix,
    capacity: Option<f64>,
    demands: Option<&[f64]>,
) -> Vec<Vec<usize>> {
    let mut merged: Vec<Vec<usize>> = routes
        .iter()
        .filter(|r| r.len() >= 2 && r.first() == Some(&0) && r.last() == Some(&0))
        .cloned()
        .collect();
    if merged.len() <= 1 {
        return merged;
    }

    loop {
        let mut best: Option<(usize, usize, Vec<usize>)> = None;
        let mut best_saving = 0i64;

        for i in 0..merged.len() {
            for j in i + 1..merged.len() {
                for (a, b) in [(i, j), (j, i)] {
                    let mut candidate = merged[a][..merged[a].len() - 1].to_vec();
                    candidate.extend_from_slice(&merged[b][1..]);
                    if !fits_capacity(&candidate, capacity, demands) {
                        continue;
                    }
                    let (Some(dist_a), Some(dist_b), Some(dist_ab)) = (
                        route_distance(&merged[a], matrix),
                        route_distance(&merged[b], matrix),
                        route_distance(&candidate, matrix),
                    ) else {
                        continue;
                    };
                    let saving = dist_a + dist_b - dist_ab;
                    if saving > best_saving {
                        best_saving = saving;
                        best = Some((i, j, candidate));
                    }
                }
            }
        }

        match best {
            Some((i, j, combined)) => {
                merged.remove(j);
                merged.remove(i);
                merged.push(combined);
            }
            None => break,
        }
    }
    merged
}

fn fits_capacity(route: &[usize], capacity: Option<f64>, demands: Option<&[f64]>) -> bool {
    let Some(capacity) = capacity else { return true };
    let Some(demands) = demands else { return true };
    let total: f64 = route
        .iter()
        .filter(|&&node| node != 0)
        .map(|&node| demands.get(node).copied().unwrap_or(0.0))
        .sum();
    total <= capacity
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_matrix() -> DistanceMatrix {
        DistanceMatrix::from_cells(vec![
            vec![0, 10, 15, 20, 25],
            vec![10, 0, 35, 25, 30],
            vec![15, 35, 0, 30, 20],
            vec![20, 25, 30, 0, 10],
            vec![25, 30, 20, 10, 0],
        ])
        .unwrap()
    }

    #[test]
    fn distance_sums_arcs() {
        let matrix = sample_matrix();
        assert_eq!(route_distance(&[0, 1, 2, 0], &matrix), Some(10 + 35 + 15));
    }

    #[test]
    fn distance_guards_corrupt_indices() {
        let matrix = sample_matrix();
        assert_eq!(route_distance(&[0, 9, 0], &matrix), None);
    }

    #[test]
    fn two_opt_never_worsens() {
        let matrix = sample_matrix();
        let initial = vec![0, 1, 3, 2, 4, 0];
        let before = route_distance(&initial, &matrix).unwrap();
        let improved = two_opt(&initial, &matrix);
        let after = route_distance(&improved, &matrix).unwrap();
        assert!(after <= before);
        assert_eq!(improved.first(), Some(&0));
        assert_eq!(improved.last(), Some(&0));
    }

    #[test]
    fn two_opt_finds_obvious_uncrossing() {
        // 4 nodes on a line: visiting 2 before 1 crosses over itself.
        let matrix = DistanceMatrix::from_cells(vec![
            vec![0, 1, 2, 3],
            vec![1, 0, 1, 2],
            vec![2, 1, 0, 1],
            vec![3, 2, 1, 0],
        ])
        .unwrap();
        let improved = two_opt(&[0, 2, 1, 3, 0], &matrix);
        assert_eq!(route_distance(&improved, &matrix), Some(6));
    }

    #[test]
    fn split_respects_max_stops_and_depot_bounds() {
        let route = vec![0, 1, 2, 3, 4, 0];
        let parts = split(&route, 2);
        assert_eq!(parts, vec![vec![0, 1, 2, 0], vec![0, 3, 4, 0]]);
        for part in &parts {
            assert_eq!(part.first(), Some(&0));
            assert_eq!(part.last(), Some(&0));
        }
    }

    #[test]
    fn split_of_short_route_is_identity() {
        assert_eq!(split(&[0, 0], 3), vec![vec![0, 0]]);
        assert_eq!(split(&[0, 1, 0], 3), vec![vec![0, 1, 0]]);
    }

    #[test]
    fn merge_combines_when_beneficial() {
        let matrix = sample_matrix();
        let routes = vec![vec![0, 1, 0], vec![0, 3, 4, 0], vec![0, 2, 0]];
        let demands = [0.0, 5.0, 8.0, 3.0, 6.0];
        let merged = merge(&routes, &matrix, Some(15.0), Some(&demands));
        assert!(merged.len() < routes.len());
        for route in &merged {
            let total: f64 = route
                .iter()
                .filter(|&&n| n != 0)
                .map(|&n| demands[n])
                .sum();
            assert!(total <= 15.0);
        }
    }

    #[test]
    fn merge_respects_capacity_bound() {
        let matrix = sample_matrix();
        let routes = vec![vec![0, 1, 0], vec![0, 2, 0]];
        let demands = [0.0, 10.0, 10.0];
        let merged = merge(&routes, &matrix, Some(15.0), Some(&demands));
        // 20 > 15: no merge possible.
        assert_eq!(merged.len(), 2);
    }
}
