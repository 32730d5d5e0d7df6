//! Route table export artifacts.
//!
//! CSV is one flat row per stop; GeoJSON is one `LineString` feature per
//! vehicle with vertices in visiting order, depot-bounded. Geometry
//! encoding for map frontends happens at this boundary, not inside the
//! planner core.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::domain::{Location, Order, RouteTable};

#[derive(Debug)]
pub enum ExportError {
    Io(io::Error),
    Csv(csv::Error),
    Json(serde_json::Error),
}

impl From<io::Error> for ExportError {
    fn from(err: io::Error) -> Self {
        ExportError::Io(err)
    }
}

impl From<csv::Error> for ExportError {
    fn from(err: csv::Error) -> Self {
        ExportError::Csv(err)
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        ExportError::Json(err)
    }
}

/// A route geometry as decoded (latitude, longitude) points in visit
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<(f64, f64)>,
}

impl Polyline {
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    /// Builds one vehicle's depot-to-depot geometry from the table, in
    /// sequence order. Stops whose orders have no valid coordinates are
    /// left out of the line.
    pub fn for_vehicle(
        table: &RouteTable,
        vehicle: &str,
        depot: &Location,
        orders: &[Order],
    ) -> Self {
        let by_id: HashMap<&str, &Order> = orders.iter().map(|o| (o.id.as_str(), o)).collect();
        let mut points = vec![(depot.latitude, depot.longitude)];
        for idx in table.stops_of(vehicle) {
            if let Some(location) = by_id
                .get(table.stops[idx].order_id.as_str())
                .and_then(|o| o.valid_location())
            {
                points.push((location.latitude, location.longitude));
            }
        }
        points.push((depot.latitude, depot.longitude));
        Self { points }
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// GeoJSON vertex order: `[longitude, latitude]`.
    fn geojson_coordinates(&self) -> Vec<[f64; 2]> {
        self.points.iter().map(|(lat, lon)| [*lon, *lat]).collect()
    }
}

/// Writes the table as flat rows, one per stop.
pub fn routes_to_csv(table: &RouteTable, path: &Path) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "vehicle",
        "sequence",
        "order_id",
        "demand",
        "cumulative_load",
        "region",
        "restricted",
    ])?;
    for stop in &table.stops {
        writer.write_record([
            stop.vehicle.clone().unwrap_or_default(),
            stop.sequence.to_string(),
            stop.order_id.clone(),
            format!("{:.3}", stop.demand),
            format!("{:.3}", stop.cumulative_load),
            stop.region.clone().unwrap_or_default(),
            stop.restricted.to_string(),
        ])?;
    }
    writer.flush()?;
    info!("exported {} stops to {}", table.len(), path.display());
    Ok(())
}

/// Writes one `LineString` feature per vehicle route.
pub fn routes_to_geojson(
    table: &RouteTable,
    depot: &Location,
    orders: &[Order],
    path: &Path,
) -> Result<(), ExportError> {
    let features: Vec<serde_json::Value> = table
        .vehicle_ids()
        .into_iter()
        .map(|vehicle| {
            let line = Polyline::for_vehicle(table, &vehicle, depot, orders);
            json!({
                "type": "Feature",
                "geometry": {
                    "type": "LineString",
                    "coordinates": line.geojson_coordinates(),
                },
                "properties": { "vehicle": vehicle },
            })
        })
        .collect();
    let collection = json!({
        "type": "FeatureCollection",
        "features": features,
    });

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &collection)?;
    writer.flush()?;
    info!(
        "exported {} vehicle geometries to {}",
        collection["features"].as_array().map_or(0, Vec::len),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RouteStop;

    fn stop(vehicle: &str, sequence: u32, order_id: &str) -> RouteStop {
        RouteStop {
            vehicle: Some(vehicle.to_string()),
            sequence,
            node_index: sequence as usize,
            order_id: order_id.to_string(),
            demand: 1.0,
            cumulative_load: sequence as f64,
            region: None,
            restricted: false,
        }
    }

    fn order(id: &str, lat: f64, lon: f64) -> Order {
        Order {
            id: id.to_string(),
            location: Some(Location::new(lat, lon)),
            demand_kg: Some(1.0),
            time_window: None,
            region: None,
        }
    }

    #[test]
    fn polyline_follows_sequence_order() {
        let table = RouteTable {
            stops: vec![stop("v1", 2, "b"), stop("v1", 1, "a")],
        };
        let orders = vec![order("a", 1.0, 1.0), order("b", 2.0, 2.0)];
        let depot = Location::new(5.0, 5.0);
        let line = Polyline::for_vehicle(&table, "v1", &depot, &orders);
        assert_eq!(
            line.points(),
            &[(5.0, 5.0), (1.0, 1.0), (2.0, 2.0), (5.0, 5.0)]
        );
    }

    #[test]
    fn geojson_swaps_to_lon_lat() {
        let line = Polyline::new(vec![(-23.5, -46.6)]);
        assert_eq!(line.geojson_coordinates(), vec![[-46.6, -23.5]]);
    }

    #[test]
    fn csv_roundtrip_has_one_row_per_stop() {
        let table = RouteTable {
            stops: vec![stop("v1", 1, "a"), stop("v2", 1, "b")],
        };
        let dir = std::env::temp_dir().join("fleet-planner-test-csv");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("routes.csv");
        routes_to_csv(&table, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("vehicle,sequence,order_id"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn geojson_one_feature_per_vehicle() {
        let table = RouteTable {
            stops: vec![stop("v1", 1, "a"), stop("v2", 1, "b")],
        };
        let orders = vec![order("a", 1.0, 1.0), order("b", 2.0, 2.0)];
        let depot = Location::new(5.0, 5.0);
        let dir = std::env::temp_dir().join("fleet-planner-test-geojson");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("routes.geojson");
        routes_to_geojson(&table, &depot, &orders, &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["features"].as_array().unwrap().len(), 2);
        assert_eq!(value["features"][0]["geometry"]["type"], "LineString");
        std::fs::remove_file(&path).ok();
    }
}
