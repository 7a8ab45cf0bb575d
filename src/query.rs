use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::{self, DriverAggregate};
use crate::config::WeatherBounds;
use crate::error::ComputeError;
use crate::tables::{Circuit, Constructor, Driver, RaceTables};
use crate::win_prob::{self, DriverProfile, Weather, WeatherInput};

/// Size of the "current drivers" list: top of the latest standings.
pub const CURRENT_DRIVER_LIMIT: usize = 23;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionQuery {
    /// Circuit id, `circuitRef` or name.
    pub circuit: String,
    #[serde(default)]
    pub weather: WeatherInput,
    /// Informational driver selection (surname).
    #[serde(default)]
    pub driver: Option<String>,
    /// Informational constructor selection (name).
    #[serde(default)]
    pub constructor: Option<String>,
    /// Two surnames to compare.
    #[serde(default)]
    pub head_to_head: Option<(String, String)>,
}

impl PredictionQuery {
    pub fn for_circuit(circuit: impl Into<String>) -> Self {
        Self {
            circuit: circuit.into(),
            weather: WeatherInput::default(),
            driver: None,
            constructor: None,
            head_to_head: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadToHead {
    pub first: String,
    pub second: String,
    /// Rows found in the rankings; one when both names match the same driver.
    pub drivers: Vec<DriverProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointsShare {
    pub driver_id: u32,
    pub surname: String,
    pub points: f64,
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionReport {
    pub circuit: Circuit,
    pub races_held: usize,
    pub weather: Weather,
    pub rankings: Vec<DriverProfile>,
    pub unscored: Vec<DriverAggregate>,
    pub head_to_head: Option<HeadToHead>,
    pub latest_race_id: Option<u32>,
    pub points_distribution: Vec<PointsShare>,
    pub selected_driver: Option<Driver>,
    pub selected_constructor: Option<Constructor>,
}

impl PredictionReport {
    /// True when the circuit has no scored history; callers show a "no data" state.
    pub fn is_empty(&self) -> bool {
        self.rankings.is_empty()
    }

    pub fn favourite(&self) -> Option<&DriverProfile> {
        self.rankings.first()
    }

    pub fn probability_total(&self) -> f64 {
        self.rankings.iter().map(|p| p.win_probability).sum()
    }
}

/// Runs queries against one loaded table snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Predictor<'a> {
    tables: &'a RaceTables,
    bounds: WeatherBounds,
}

impl<'a> Predictor<'a> {
    pub fn new(tables: &'a RaceTables, bounds: WeatherBounds) -> Self {
        Self { tables, bounds }
    }

    pub fn predict(&self, query: &PredictionQuery) -> Result<PredictionReport, ComputeError> {
        let circuit = self
            .tables
            .resolve_circuit(&query.circuit)
            .ok_or_else(|| ComputeError::UnknownCircuit(query.circuit.clone()))?
            .clone();
        let weather = Weather::new(query.weather, &self.bounds)?;

        let aggregates = aggregate::aggregate_circuit(self.tables, circuit.circuit_id);
        let mut rankings = win_prob::score_drivers(&aggregates, &weather)?;
        win_prob::rank_profiles(&mut rankings);
        let unscored = aggregates
            .into_iter()
            .filter(|a| a.avg_position.is_none())
            .collect::<Vec<_>>();

        let head_to_head = query
            .head_to_head
            .as_ref()
            .map(|(first, second)| head_to_head(&rankings, first, second));

        info!(
            circuit = %circuit.name,
            drivers = rankings.len(),
            unscored = unscored.len(),
            "prediction computed"
        );

        Ok(PredictionReport {
            races_held: aggregate::races_held(self.tables, circuit.circuit_id),
            circuit,
            weather,
            rankings,
            unscored,
            head_to_head,
            latest_race_id: self.tables.latest_race_id(),
            points_distribution: points_distribution(self.tables),
            selected_driver: query
                .driver
                .as_deref()
                .and_then(|name| self.current_driver_by_surname(name))
                .cloned(),
            selected_constructor: query
                .constructor
                .as_deref()
                .and_then(|name| self.tables.constructor_by_name(name))
                .cloned(),
        })
    }

    fn current_driver_by_surname(&self, surname: &str) -> Option<&'a Driver> {
        let key = surname.trim();
        self.tables
            .current_drivers(CURRENT_DRIVER_LIMIT)
            .into_iter()
            .find(|d| d.surname.eq_ignore_ascii_case(key))
    }
}

fn head_to_head(rankings: &[DriverProfile], first: &str, second: &str) -> HeadToHead {
    let matches = |p: &DriverProfile| {
        p.surname.eq_ignore_ascii_case(first.trim()) || p.surname.eq_ignore_ascii_case(second.trim())
    };
    HeadToHead {
        first: first.to_string(),
        second: second.to_string(),
        drivers: rankings.iter().filter(|p| matches(p)).cloned().collect(),
    }
}

/// Latest-race standings with each driver's share of the points on offer.
pub fn points_distribution(tables: &RaceTables) -> Vec<PointsShare> {
    let standings = tables.latest_standings();
    let total: f64 = standings.iter().map(|s| s.points.max(0.0)).sum();
    let mut out: Vec<PointsShare> = standings
        .into_iter()
        .map(|s| PointsShare {
            driver_id: s.driver_id,
            surname: tables
                .driver(s.driver_id)
                .map(|d| d.surname.clone())
                .unwrap_or_else(|| format!("#{}", s.driver_id)),
            points: s.points,
            share: if total > 0.0 {
                s.points.max(0.0) / total
            } else {
                0.0
            },
        })
        .collect();
    out.sort_by(|a, b| {
        b.points
            .total_cmp(&a.points)
            .then(a.driver_id.cmp(&b.driver_id))
    });
    out
}
