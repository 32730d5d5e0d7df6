//! Spatial/region bucketing of orders.
//!
//! Used both as a pre-solve partitioning aid and as input to the
//! region-affinity rules. Region labels take precedence when present;
//! otherwise orders are grouped geographically. Clustering is fully
//! deterministic (farthest-first seeding) so solves are reproducible.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::domain::Order;

const KMEANS_ITERATIONS: usize = 20;

/// Assigns a cluster id to each order, `None` for orders that cannot be
/// placed (no region label and no valid coordinates).
///
/// - Region labels present, at most `max_clusters` distinct labels: one
///   cluster per label, in order of first appearance. Unlabeled orders
///   share a single leftover bucket.
/// - More labels than clusters: labels are merged by the proximity of
///   their centroids until `max_clusters` groups remain.
/// - No labels at all: plain k-means over the order coordinates.
pub fn assign_clusters(orders: &[Order], max_clusters: usize) -> Vec<Option<usize>> {
    if orders.is_empty() || max_clusters == 0 {
        return vec![None; orders.len()];
    }

    let labels: Vec<Option<String>> = orders.iter().map(Order::normalized_region).collect();
    if labels.iter().any(Option::is_some) {
        assign_by_region(orders, &labels, max_clusters)
    } else {
        assign_by_coordinates(orders, max_clusters)
    }
}

fn assign_by_region(
    orders: &[Order],
    labels: &[Option<String>],
    max_clusters: usize,
) -> Vec<Option<usize>> {
    // Unlabeled orders get a shared bucket rather than falling out of the
    // solve partitioning entirely.
    let effective: Vec<String> = labels
        .iter()
        .map(|l| l.clone().unwrap_or_else(|| "n/a".to_string()))
        .collect();

    let mut distinct: Vec<String> = Vec::new();
    for label in &effective {
        if !distinct.contains(label) {
            distinct.push(label.clone());
        }
    }

    if distinct.len() <= max_clusters {
        let cluster_of: HashMap<&str, usize> = distinct
            .iter()
            .enumerate()
            .map(|(i, label)| (label.as_str(), i))
            .collect();
        info!("{} region buckets used directly as clusters", distinct.len());
        return effective
            .iter()
            .map(|label| Some(cluster_of[label.as_str()]))
            .collect();
    }

    // Too many regions: merge them by centroid proximity.
    let mut centroids = Vec::new();
    let mut centroid_labels = Vec::new();
    for label in &distinct {
        let points: Vec<(f64, f64)> = orders
            .iter()
            .zip(&effective)
            .filter(|(_, l)| *l == label)
            .filter_map(|(order, _)| order.valid_location())
            .map(|loc| (loc.latitude, loc.longitude))
            .collect();
        if points.is_empty() {
            warn!("region '{label}' has no valid coordinates, merging into bucket 0");
            continue;
        }
        let n = points.len() as f64;
        let lat = points.iter().map(|p| p.0).sum::<f64>() / n;
        let lon = points.iter().map(|p| p.1).sum::<f64>() / n;
        centroids.push((lat, lon));
        centroid_labels.push(label.clone());
    }

    if centroids.is_empty() {
        warn!("no region has valid coordinates, collapsing into one bucket");
        return vec![Some(0); orders.len()];
    }

    let groups = kmeans(&centroids, max_clusters);
    let group_of: HashMap<&str, usize> = centroid_labels
        .iter()
        .zip(&groups)
        .map(|(label, &g)| (label.as_str(), g))
        .collect();
    info!(
        "{} regions merged into {} clusters",
        distinct.len(),
        max_clusters
    );
    effective
        .iter()
        .map(|label| Some(group_of.get(label.as_str()).copied().unwrap_or(0)))
        .collect()
}

fn assign_by_coordinates(orders: &[Order], max_clusters: usize) -> Vec<Option<usize>> {
    let mut points = Vec::new();
    let mut point_order: Vec<usize> = Vec::new();
    for (i, order) in orders.iter().enumerate() {
        if let Some(loc) = order.valid_location() {
            points.push((loc.latitude, loc.longitude));
            point_order.push(i);
        }
    }
    if points.is_empty() {
        warn!("no valid coordinates to cluster");
        return vec![None; orders.len()];
    }

    let groups = kmeans(&points, max_clusters);
    let mut result = vec![None; orders.len()];
    for (slot, &order_idx) in point_order.iter().enumerate() {
        result[order_idx] = Some(groups[slot]);
    }
    result
}

/// Lloyd's algorithm with deterministic farthest-first seeding.
fn kmeans(points: &[(f64, f64)], k: usize) -> Vec<usize> {
    let k = k.min(points.len()).max(1);
    let mut centers = vec![points[0]];
    while centers.len() < k {
        let farthest = points
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                let da = min_sq_dist(a, &centers);
                let db = min_sq_dist(b, &centers);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
            .unwrap_or(0);
        centers.push(points[farthest]);
    }

    let mut assignment = vec![0usize; points.len()];
    for _ in 0..KMEANS_ITERATIONS {
        let mut changed = false;
        for (i, point) in points.iter().enumerate() {
            let nearest = nearest_center(point, &centers);
            if assignment[i] != nearest {
                assignment[i] = nearest;
                changed = true;
            }
        }

        let mut sums = vec![(0.0, 0.0, 0usize); centers.len()];
        for (point, &group) in points.iter().zip(&assignment) {
            sums[group].0 += point.0;
            sums[group].1 += point.1;
            sums[group].2 += 1;
        }
        for (center, sum) in centers.iter_mut().zip(&sums) {
            if sum.2 > 0 {
                *center = (sum.0 / sum.2 as f64, sum.1 / sum.2 as f64);
            }
        }
        if !changed {
            break;
        }
    }
    assignment
}

fn sq_dist(a: &(f64, f64), b: &(f64, f64)) -> f64 {
    (a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)
}

fn min_sq_dist(point: &(f64, f64), centers: &[(f64, f64)]) -> f64 {
    centers
        .iter()
        .map(|c| sq_dist(point, c))
        .fold(f64::INFINITY, f64::min)
}

fn nearest_center(point: &(f64, f64), centers: &[(f64, f64)]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, center) in centers.iter().enumerate() {
        let d = sq_dist(point, center);
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}
