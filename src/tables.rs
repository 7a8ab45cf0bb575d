use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::loader;

#[derive(Debug, Clone)]
pub struct Race {
    pub race_id: u32,
    pub year: u16,
    pub round: u16,
    pub circuit_id: u32,
    pub name: String,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    pub circuit_id: u32,
    pub circuit_ref: String,
    pub name: String,
    pub location: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub driver_id: u32,
    pub driver_ref: String,
    pub code: Option<String>,
    pub forename: String,
    pub surname: String,
    pub nationality: String,
}

impl Driver {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.forename, self.surname).trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constructor {
    pub constructor_id: u32,
    pub constructor_ref: String,
    pub name: String,
    pub nationality: String,
}

#[derive(Debug, Clone)]
pub struct RaceResult {
    pub race_id: u32,
    pub driver_id: u32,
    pub constructor_id: u32,
    pub grid: Option<u32>,
    // Classified position; absent for non-finishers.
    pub position: Option<u32>,
    // Final running order, set for every starter in well-formed data.
    pub position_order: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct QualifyingResult {
    pub race_id: u32,
    pub driver_id: u32,
    pub constructor_id: u32,
    pub position: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct PitStop {
    pub race_id: u32,
    pub driver_id: u32,
    pub stop: u32,
    pub lap: u32,
    pub duration_ms: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DriverStanding {
    pub race_id: u32,
    pub driver_id: u32,
    pub points: f64,
    pub position: Option<u32>,
}

/// Read-only snapshot of every historical table, loaded once per session and
/// passed by reference into the aggregator, scorer and report builder.
#[derive(Debug, Clone, Default)]
pub struct RaceTables {
    pub races: Vec<Race>,
    pub circuits: Vec<Circuit>,
    pub drivers: Vec<Driver>,
    pub constructors: Vec<Constructor>,
    pub results: Vec<RaceResult>,
    pub qualifying: Vec<QualifyingResult>,
    pub pit_stops: Vec<PitStop>,
    pub driver_standings: Vec<DriverStanding>,
    driver_index: HashMap<u32, usize>,
}

impl RaceTables {
    pub fn load(dir: &Path) -> Result<Self> {
        loader::load_tables(dir)
    }

    pub fn from_parts(
        races: Vec<Race>,
        circuits: Vec<Circuit>,
        drivers: Vec<Driver>,
        constructors: Vec<Constructor>,
        results: Vec<RaceResult>,
        qualifying: Vec<QualifyingResult>,
        pit_stops: Vec<PitStop>,
        driver_standings: Vec<DriverStanding>,
    ) -> Self {
        let driver_index = drivers
            .iter()
            .enumerate()
            .map(|(idx, d)| (d.driver_id, idx))
            .collect();
        Self {
            races,
            circuits,
            drivers,
            constructors,
            results,
            qualifying,
            pit_stops,
            driver_standings,
            driver_index,
        }
    }

    pub fn circuit(&self, circuit_id: u32) -> Option<&Circuit> {
        self.circuits.iter().find(|c| c.circuit_id == circuit_id)
    }

    /// Accepts a numeric id, a `circuitRef` or a circuit name (case-insensitive).
    pub fn resolve_circuit(&self, selector: &str) -> Option<&Circuit> {
        let key = selector.trim();
        if key.is_empty() {
            return None;
        }
        if let Ok(id) = key.parse::<u32>() {
            return self.circuit(id);
        }
        self.circuits.iter().find(|c| {
            c.name.eq_ignore_ascii_case(key) || c.circuit_ref.eq_ignore_ascii_case(key)
        })
    }

    pub fn driver(&self, driver_id: u32) -> Option<&Driver> {
        self.driver_index
            .get(&driver_id)
            .and_then(|idx| self.drivers.get(*idx))
    }

    pub fn constructor_by_name(&self, name: &str) -> Option<&Constructor> {
        let key = name.trim();
        self.constructors
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(key))
    }

    pub fn race_ids_at(&self, circuit_id: u32) -> HashSet<u32> {
        self.races
            .iter()
            .filter(|r| r.circuit_id == circuit_id)
            .map(|r| r.race_id)
            .collect()
    }

    /// Highest race id in the whole record. Standings are read from this race
    /// regardless of the circuit being queried.
    pub fn latest_race_id(&self) -> Option<u32> {
        self.races.iter().map(|r| r.race_id).max()
    }

    pub fn latest_race(&self) -> Option<&Race> {
        let id = self.latest_race_id()?;
        self.races.iter().find(|r| r.race_id == id)
    }

    pub fn latest_standings(&self) -> Vec<&DriverStanding> {
        let Some(latest) = self.latest_race_id() else {
            return Vec::new();
        };
        self.driver_standings
            .iter()
            .filter(|s| s.race_id == latest)
            .collect()
    }

    /// Drivers who took part in the latest race and sit in the top `limit` by
    /// points of its standings. Ordered by driver id, one entry per surname.
    pub fn current_drivers(&self, limit: usize) -> Vec<&Driver> {
        let Some(latest) = self.latest_race_id() else {
            return Vec::new();
        };
        let in_latest: HashSet<u32> = self
            .results
            .iter()
            .filter(|r| r.race_id == latest)
            .map(|r| r.driver_id)
            .collect();

        let mut standings = self.latest_standings();
        standings.sort_by(|a, b| b.points.total_cmp(&a.points));
        let top: HashSet<u32> = standings
            .iter()
            .take(limit)
            .map(|s| s.driver_id)
            .collect();

        let mut drivers: Vec<&Driver> = self
            .drivers
            .iter()
            .filter(|d| in_latest.contains(&d.driver_id) && top.contains(&d.driver_id))
            .collect();
        drivers.sort_by_key(|d| d.driver_id);

        let mut seen = HashSet::new();
        drivers.retain(|d| seen.insert(d.surname.clone()));
        drivers
    }

    pub fn circuit_names(&self) -> Vec<String> {
        unique_in_order(self.circuits.iter().map(|c| c.name.as_str()))
    }

    pub fn constructor_names(&self) -> Vec<String> {
        unique_in_order(self.constructors.iter().map(|c| c.name.as_str()))
    }
}

fn unique_in_order<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .filter(|name| seen.insert(*name))
        .map(|name| name.to_string())
        .collect()
}
