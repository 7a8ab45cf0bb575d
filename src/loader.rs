use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::tables::{
    Circuit, Constructor, Driver, DriverStanding, PitStop, QualifyingResult, Race, RaceResult,
    RaceTables,
};

pub const RACES_FILE: &str = "races.csv";
pub const CIRCUITS_FILE: &str = "circuits.csv";
pub const DRIVERS_FILE: &str = "drivers.csv";
pub const CONSTRUCTORS_FILE: &str = "constructors.csv";
pub const RESULTS_FILE: &str = "results.csv";
pub const QUALIFYING_FILE: &str = "qualifying.csv";
pub const PIT_STOPS_FILE: &str = "pit_stops.csv";
pub const DRIVER_STANDINGS_FILE: &str = "driver_standings.csv";

// Ergast-style exports mark missing cells with a literal `\N`.
const NULL_MARKER: &str = "\\N";

pub fn load_tables(dir: &Path) -> Result<RaceTables> {
    let races = load_races(&dir.join(RACES_FILE))?;
    let circuits = load_circuits(&dir.join(CIRCUITS_FILE))?;
    let drivers = load_drivers(&dir.join(DRIVERS_FILE))?;
    let constructors = load_constructors(&dir.join(CONSTRUCTORS_FILE))?;
    let results = load_results(&dir.join(RESULTS_FILE))?;
    let qualifying = load_qualifying(&dir.join(QUALIFYING_FILE))?;
    let pit_stops = load_pit_stops(&dir.join(PIT_STOPS_FILE))?;
    let driver_standings = load_driver_standings(&dir.join(DRIVER_STANDINGS_FILE))?;

    info!(
        dir = %dir.display(),
        races = races.len(),
        circuits = circuits.len(),
        drivers = drivers.len(),
        results = results.len(),
        "loaded race tables"
    );

    Ok(RaceTables::from_parts(
        races,
        circuits,
        drivers,
        constructors,
        results,
        qualifying,
        pit_stops,
        driver_standings,
    ))
}

pub fn load_races(path: &Path) -> Result<Vec<Race>> {
    let frame = Frame::read(path)?;
    let ids = frame.ids("raceId")?;
    let years = frame.ints("year")?;
    let rounds = frame.ints("round")?;
    let circuit_ids = frame.ids("circuitId")?;
    let names = frame.strings("name")?;
    let dates = frame.optional_strings("date")?;

    let mut out = Vec::with_capacity(frame.height());
    for idx in 0..frame.height() {
        let (Some(race_id), Some(circuit_id)) = (at(&ids, idx), at(&circuit_ids, idx)) else {
            continue;
        };
        out.push(Race {
            race_id,
            year: at(&years, idx)
                .and_then(|v| u16::try_from(v).ok())
                .unwrap_or_default(),
            round: at(&rounds, idx)
                .and_then(|v| u16::try_from(v).ok())
                .unwrap_or_default(),
            circuit_id,
            name: text_at(&names, idx),
            date: dates
                .get(idx)
                .and_then(|v| v.as_deref())
                .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()),
        });
    }
    frame.finish(out)
}

pub fn load_circuits(path: &Path) -> Result<Vec<Circuit>> {
    let frame = Frame::read(path)?;
    let ids = frame.ids("circuitId")?;
    let refs = frame.optional_strings("circuitRef")?;
    let names = frame.strings("name")?;
    let locations = frame.optional_strings("location")?;
    let countries = frame.optional_strings("country")?;

    let mut out = Vec::with_capacity(frame.height());
    for idx in 0..frame.height() {
        let Some(circuit_id) = at(&ids, idx) else {
            continue;
        };
        out.push(Circuit {
            circuit_id,
            circuit_ref: text_at(&refs, idx),
            name: text_at(&names, idx),
            location: text_at(&locations, idx),
            country: text_at(&countries, idx),
        });
    }
    frame.finish(out)
}

pub fn load_drivers(path: &Path) -> Result<Vec<Driver>> {
    let frame = Frame::read(path)?;
    let ids = frame.ids("driverId")?;
    let refs = frame.optional_strings("driverRef")?;
    let codes = frame.optional_strings("code")?;
    let forenames = frame.optional_strings("forename")?;
    let surnames = frame.strings("surname")?;
    let nationalities = frame.optional_strings("nationality")?;

    let mut out = Vec::with_capacity(frame.height());
    for idx in 0..frame.height() {
        let Some(driver_id) = at(&ids, idx) else {
            continue;
        };
        let code = text_at(&codes, idx);
        out.push(Driver {
            driver_id,
            driver_ref: text_at(&refs, idx),
            code: (!code.is_empty()).then_some(code),
            forename: text_at(&forenames, idx),
            surname: text_at(&surnames, idx),
            nationality: text_at(&nationalities, idx),
        });
    }
    frame.finish(out)
}

pub fn load_constructors(path: &Path) -> Result<Vec<Constructor>> {
    let frame = Frame::read(path)?;
    let ids = frame.ids("constructorId")?;
    let refs = frame.optional_strings("constructorRef")?;
    let names = frame.strings("name")?;
    let nationalities = frame.optional_strings("nationality")?;

    let mut out = Vec::with_capacity(frame.height());
    for idx in 0..frame.height() {
        let Some(constructor_id) = at(&ids, idx) else {
            continue;
        };
        out.push(Constructor {
            constructor_id,
            constructor_ref: text_at(&refs, idx),
            name: text_at(&names, idx),
            nationality: text_at(&nationalities, idx),
        });
    }
    frame.finish(out)
}

pub fn load_results(path: &Path) -> Result<Vec<RaceResult>> {
    let frame = Frame::read(path)?;
    let race_ids = frame.ids("raceId")?;
    let driver_ids = frame.ids("driverId")?;
    let constructor_ids = frame.optional_ids("constructorId")?;
    let grids = frame.optional_ids("grid")?;
    let positions = frame.optional_ids("position")?;
    let orders = frame.ids("positionOrder")?;

    let mut out = Vec::with_capacity(frame.height());
    for idx in 0..frame.height() {
        let (Some(race_id), Some(driver_id)) = (at(&race_ids, idx), at(&driver_ids, idx)) else {
            continue;
        };
        out.push(RaceResult {
            race_id,
            driver_id,
            constructor_id: at(&constructor_ids, idx).unwrap_or_default(),
            grid: at(&grids, idx),
            position: at(&positions, idx),
            position_order: at(&orders, idx),
        });
    }
    frame.finish(out)
}

pub fn load_qualifying(path: &Path) -> Result<Vec<QualifyingResult>> {
    let frame = Frame::read(path)?;
    let race_ids = frame.ids("raceId")?;
    let driver_ids = frame.ids("driverId")?;
    let constructor_ids = frame.optional_ids("constructorId")?;
    let positions = frame.ids("position")?;

    let mut out = Vec::with_capacity(frame.height());
    for idx in 0..frame.height() {
        let (Some(race_id), Some(driver_id)) = (at(&race_ids, idx), at(&driver_ids, idx)) else {
            continue;
        };
        out.push(QualifyingResult {
            race_id,
            driver_id,
            constructor_id: at(&constructor_ids, idx).unwrap_or_default(),
            position: at(&positions, idx),
        });
    }
    frame.finish(out)
}

/// `milliseconds` is coerced: blanks, `\N` and non-numeric text all become `None`.
pub fn load_pit_stops(path: &Path) -> Result<Vec<PitStop>> {
    let frame = Frame::read(path)?;
    let race_ids = frame.ids("raceId")?;
    let driver_ids = frame.ids("driverId")?;
    let stops = frame.optional_ids("stop")?;
    let laps = frame.optional_ids("lap")?;
    let durations = frame.floats("milliseconds")?;

    let mut out = Vec::with_capacity(frame.height());
    let mut coerced = 0usize;
    for idx in 0..frame.height() {
        let (Some(race_id), Some(driver_id)) = (at(&race_ids, idx), at(&driver_ids, idx)) else {
            continue;
        };
        let duration_ms = at(&durations, idx).filter(|v| v.is_finite());
        if duration_ms.is_none() {
            coerced += 1;
        }
        out.push(PitStop {
            race_id,
            driver_id,
            stop: at(&stops, idx).unwrap_or_default(),
            lap: at(&laps, idx).unwrap_or_default(),
            duration_ms,
        });
    }
    if coerced > 0 {
        warn!(
            file = %path.display(),
            coerced,
            "pit stop durations missing or non-numeric, treated as absent"
        );
    }
    frame.finish(out)
}

pub fn load_driver_standings(path: &Path) -> Result<Vec<DriverStanding>> {
    let frame = Frame::read(path)?;
    let race_ids = frame.ids("raceId")?;
    let driver_ids = frame.ids("driverId")?;
    let points = frame.floats("points")?;
    let positions = frame.optional_ids("position")?;

    let mut out = Vec::with_capacity(frame.height());
    for idx in 0..frame.height() {
        let (Some(race_id), Some(driver_id)) = (at(&race_ids, idx), at(&driver_ids, idx)) else {
            continue;
        };
        out.push(DriverStanding {
            race_id,
            driver_id,
            points: at(&points, idx).unwrap_or_default(),
            position: at(&positions, idx),
        });
    }
    frame.finish(out)
}

struct Frame {
    df: DataFrame,
    path: PathBuf,
}

impl Frame {
    fn read(path: &Path) -> Result<Self> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(None)
            .map_parse_options(|opts| {
                opts.with_null_values(Some(NullValues::AllColumnsSingle(NULL_MARKER.into())))
            })
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .with_context(|| format!("open csv {}", path.display()))?
            .finish()
            .with_context(|| format!("parse csv {}", path.display()))?;
        Ok(Self {
            df,
            path: path.to_path_buf(),
        })
    }

    fn height(&self) -> usize {
        self.df.height()
    }

    fn has(&self, name: &str) -> bool {
        self.df.column(name).is_ok()
    }

    fn ints(&self, name: &str) -> Result<Vec<Option<i64>>> {
        let col = self
            .df
            .column(name)
            .with_context(|| format!("{}: missing column `{name}`", self.path.display()))?
            .cast(&DataType::Int64)
            .with_context(|| format!("{}: column `{name}` is not numeric", self.path.display()))?;
        let values = col
            .i64()
            .with_context(|| format!("{}: column `{name}` is not numeric", self.path.display()))?
            .into_iter()
            .collect();
        Ok(values)
    }

    fn ids(&self, name: &str) -> Result<Vec<Option<u32>>> {
        Ok(self
            .ints(name)?
            .into_iter()
            .map(|v| v.and_then(|n| u32::try_from(n).ok()))
            .collect())
    }

    fn optional_ids(&self, name: &str) -> Result<Vec<Option<u32>>> {
        if !self.has(name) {
            return Ok(vec![None; self.height()]);
        }
        self.ids(name)
    }

    fn floats(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let col = self
            .df
            .column(name)
            .with_context(|| format!("{}: missing column `{name}`", self.path.display()))?
            .cast(&DataType::Float64)
            .with_context(|| format!("{}: column `{name}` is not numeric", self.path.display()))?;
        let values = col
            .f64()
            .with_context(|| format!("{}: column `{name}` is not numeric", self.path.display()))?
            .into_iter()
            .collect();
        Ok(values)
    }

    fn strings(&self, name: &str) -> Result<Vec<Option<String>>> {
        let col = self
            .df
            .column(name)
            .with_context(|| format!("{}: missing column `{name}`", self.path.display()))?
            .cast(&DataType::String)
            .with_context(|| format!("{}: column `{name}` is not text", self.path.display()))?;
        let values = col
            .str()
            .with_context(|| format!("{}: column `{name}` is not text", self.path.display()))?
            .into_iter()
            .map(|v| v.map(|s| s.to_string()))
            .collect();
        Ok(values)
    }

    fn optional_strings(&self, name: &str) -> Result<Vec<Option<String>>> {
        if !self.has(name) {
            return Ok(vec![None; self.height()]);
        }
        self.strings(name)
    }

    fn finish<T>(&self, rows: Vec<T>) -> Result<Vec<T>> {
        let skipped = self.height().saturating_sub(rows.len());
        if skipped > 0 {
            warn!(file = %self.path.display(), skipped, "rows without identifiers skipped");
        }
        debug!(file = %self.path.display(), rows = rows.len(), "loaded table");
        Ok(rows)
    }
}

fn at<T: Copy>(values: &[Option<T>], idx: usize) -> Option<T> {
    values.get(idx).copied().flatten()
}

fn text_at(values: &[Option<String>], idx: usize) -> String {
    values
        .get(idx)
        .and_then(|v| v.as_deref())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}
