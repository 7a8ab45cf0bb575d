use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::debug;

use crate::tables::RaceTables;

/// Per-driver statistics at one circuit, before any scoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverAggregate {
    pub driver_id: u32,
    pub surname: String,
    pub avg_position: Option<f64>,
    pub avg_qualifying_position: Option<f64>,
    pub avg_pit_stop_ms: Option<f64>,
    pub current_points: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
struct MeanAcc {
    sum: f64,
    n: usize,
}

impl MeanAcc {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            self.sum += v;
            self.n += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        (self.n > 0).then(|| self.sum / self.n as f64)
    }
}

/// Every driver with a result at any race ever held at `circuit_id`, with
/// left-joined qualifying, pit-stop and standings figures.
///
/// Points come from the latest race in the whole record, not the latest race
/// at this circuit. An unknown circuit or one with no races yields an empty vec.
pub fn aggregate_circuit(tables: &RaceTables, circuit_id: u32) -> Vec<DriverAggregate> {
    let race_ids = tables.race_ids_at(circuit_id);
    if race_ids.is_empty() {
        debug!(circuit_id, "no races held at circuit");
        return Vec::new();
    }

    // BTreeMap keeps the output ordered by driver id.
    let mut finishing: BTreeMap<u32, MeanAcc> = BTreeMap::new();
    for row in tables.results.iter().filter(|r| race_ids.contains(&r.race_id)) {
        finishing
            .entry(row.driver_id)
            .or_default()
            .push(row.position_order.map(f64::from));
    }

    let qualifying = grouped_means(
        tables
            .qualifying
            .iter()
            .filter(|q| race_ids.contains(&q.race_id))
            .map(|q| (q.driver_id, q.position.map(f64::from))),
    );
    let pit_stops = grouped_means(
        tables
            .pit_stops
            .iter()
            .filter(|p| race_ids.contains(&p.race_id))
            .map(|p| (p.driver_id, p.duration_ms)),
    );
    let points: HashMap<u32, f64> = tables
        .latest_standings()
        .into_iter()
        .map(|s| (s.driver_id, s.points))
        .collect();

    let out: Vec<DriverAggregate> = finishing
        .into_iter()
        .map(|(driver_id, acc)| DriverAggregate {
            driver_id,
            surname: tables
                .driver(driver_id)
                .map(|d| d.surname.clone())
                .unwrap_or_else(|| format!("#{driver_id}")),
            avg_position: acc.mean(),
            avg_qualifying_position: qualifying.get(&driver_id).copied().flatten(),
            avg_pit_stop_ms: pit_stops.get(&driver_id).copied().flatten(),
            current_points: points.get(&driver_id).copied(),
        })
        .collect();

    debug!(
        circuit_id,
        races = race_ids.len(),
        drivers = out.len(),
        "aggregated circuit history"
    );
    out
}

/// Races at the circuit, handy for presentation ("12 races since 1950").
pub fn races_held(tables: &RaceTables, circuit_id: u32) -> usize {
    tables.race_ids_at(circuit_id).len()
}

fn grouped_means(rows: impl Iterator<Item = (u32, Option<f64>)>) -> HashMap<u32, Option<f64>> {
    let mut acc: HashMap<u32, MeanAcc> = HashMap::new();
    for (driver_id, value) in rows {
        acc.entry(driver_id).or_default().push(value);
    }
    acc.into_iter().map(|(id, a)| (id, a.mean())).collect()
}
