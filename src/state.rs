use std::collections::VecDeque;

use tracing::{info, warn};

use crate::config::{AppConfig, WeatherBounds};
use crate::query::{CURRENT_DRIVER_LIMIT, PredictionQuery, PredictionReport, Predictor};
use crate::tables::RaceTables;
use crate::win_prob::WeatherInput;

pub const TEMP_STEP: f64 = 1.0;
pub const HUMIDITY_STEP: f64 = 5.0;
const MAX_LOGS: usize = 200;
/// Bars drawn per dashboard chart.
pub const CHART_DRIVERS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Circuit,
    Temperature,
    Humidity,
    Sky,
    Driver,
    Constructor,
    CompareFirst,
    CompareSecond,
}

impl Focus {
    pub const ALL: [Focus; 8] = [
        Focus::Circuit,
        Focus::Temperature,
        Focus::Humidity,
        Focus::Sky,
        Focus::Driver,
        Focus::Constructor,
        Focus::CompareFirst,
        Focus::CompareSecond,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Focus::Circuit => "Circuit",
            Focus::Temperature => "Temperature",
            Focus::Humidity => "Humidity",
            Focus::Sky => "Sky",
            Focus::Driver => "Driver",
            Focus::Constructor => "Constructor",
            Focus::CompareFirst => "Compare A",
            Focus::CompareSecond => "Compare B",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExportState {
    pub path: Option<String>,
    pub message: String,
    pub ok: bool,
}

/// Everything the dashboard renders, minus the table snapshot itself.
#[derive(Debug, Clone)]
pub struct AppState {
    pub focus: Focus,
    pub bounds: WeatherBounds,
    pub weather: WeatherInput,
    pub circuits: Vec<String>,
    pub circuit_idx: usize,
    pub drivers: Vec<String>,
    pub driver_idx: usize,
    pub constructors: Vec<String>,
    pub constructor_idx: usize,
    /// Surnames ranked at the current circuit; `compare` indexes into it.
    pub compare_options: Vec<String>,
    pub compare: (usize, usize),
    pub report: Option<PredictionReport>,
    pub error: Option<String>,
    pub logs: VecDeque<String>,
    pub help_overlay: bool,
    pub export: ExportState,
}

impl AppState {
    pub fn new(tables: &RaceTables, config: &AppConfig) -> Self {
        let drivers: Vec<String> = tables
            .current_drivers(CURRENT_DRIVER_LIMIT)
            .iter()
            .map(|d| d.surname.clone())
            .collect();
        Self {
            focus: Focus::Circuit,
            bounds: config.bounds,
            weather: config.default_weather,
            circuits: tables.circuit_names(),
            circuit_idx: 0,
            drivers,
            driver_idx: 0,
            constructors: tables.constructor_names(),
            constructor_idx: 0,
            compare_options: Vec::new(),
            compare: (0, 0),
            report: None,
            error: None,
            logs: VecDeque::with_capacity(MAX_LOGS),
            help_overlay: false,
            export: ExportState::default(),
        }
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    pub fn selected_circuit(&self) -> Option<&str> {
        self.circuits.get(self.circuit_idx).map(String::as_str)
    }

    pub fn selected_driver(&self) -> Option<&str> {
        self.drivers.get(self.driver_idx).map(String::as_str)
    }

    pub fn selected_constructor(&self) -> Option<&str> {
        self.constructors.get(self.constructor_idx).map(String::as_str)
    }

    pub fn compare_names(&self) -> Option<(&str, &str)> {
        let first = self.compare_options.get(self.compare.0)?;
        let second = self.compare_options.get(self.compare.1)?;
        Some((first.as_str(), second.as_str()))
    }

    /// The query the current filters describe; `None` when there are no circuits.
    pub fn query(&self) -> Option<PredictionQuery> {
        let circuit = self.selected_circuit()?;
        Some(PredictionQuery {
            circuit: circuit.to_string(),
            weather: self.weather,
            driver: self.selected_driver().map(str::to_string),
            constructor: self.selected_constructor().map(str::to_string),
            head_to_head: self
                .compare_names()
                .map(|(a, b)| (a.to_string(), b.to_string())),
        })
    }

    pub fn recompute(&mut self, tables: &RaceTables) {
        let Some(query) = self.query() else {
            self.report = None;
            self.error = Some("no circuits loaded".to_string());
            self.push_log("[WARN] No circuits loaded");
            return;
        };
        let predictor = Predictor::new(tables, self.bounds);
        let mut result = predictor.predict(&query);
        let compare_changed = match &result {
            Ok(report) => self.sync_compare_options(report),
            Err(_) => false,
        };
        if compare_changed {
            if let Some(next) = self.query() {
                result = predictor.predict(&next);
            }
        }
        match result {
            Ok(report) => {
                if report.is_empty() {
                    self.push_log(format!(
                        "[INFO] {}: no race history",
                        report.circuit.name
                    ));
                } else if let Some(fav) = report.favourite() {
                    self.push_log(format!(
                        "[INFO] {} | {} | favourite {} {:.1}%",
                        report.circuit.name,
                        weather_summary(&self.weather),
                        fav.surname,
                        fav.win_probability * 100.0
                    ));
                }
                info!(circuit = %report.circuit.name, "dashboard recomputed");
                self.report = Some(report);
                self.error = None;
            }
            Err(err) => {
                warn!(error = %err, "prediction failed");
                self.push_log(format!("[WARN] {err}"));
                self.report = None;
                self.error = Some(err.to_string());
            }
        }
    }

    pub fn focus_next(&mut self) {
        self.focus = cycle(&Focus::ALL, self.focus, 1);
    }

    pub fn focus_prev(&mut self) {
        self.focus = cycle(&Focus::ALL, self.focus, -1);
    }

    /// Moves the focused control one step; returns true when the query changed.
    pub fn adjust(&mut self, step: i32) -> bool {
        match self.focus {
            Focus::Circuit => shift_index(&mut self.circuit_idx, self.circuits.len(), step),
            Focus::Temperature => {
                let next = self
                    .bounds
                    .clamp_temperature(self.weather.temperature_c + f64::from(step) * TEMP_STEP);
                replace_f64(&mut self.weather.temperature_c, next)
            }
            Focus::Humidity => {
                let next = (self.weather.humidity_pct + f64::from(step) * HUMIDITY_STEP)
                    .clamp(0.0, 100.0);
                replace_f64(&mut self.weather.humidity_pct, next)
            }
            Focus::Sky => {
                self.weather.sky = if step >= 0 {
                    self.weather.sky.next()
                } else {
                    self.weather.sky.prev()
                };
                true
            }
            Focus::Driver => shift_index(&mut self.driver_idx, self.drivers.len(), step),
            Focus::Constructor => {
                shift_index(&mut self.constructor_idx, self.constructors.len(), step)
            }
            Focus::CompareFirst => {
                shift_index(&mut self.compare.0, self.compare_options.len(), step)
            }
            Focus::CompareSecond => {
                shift_index(&mut self.compare.1, self.compare_options.len(), step)
            }
        }
    }

    /// Rebuilds the head-to-head choices from the ranking, keeping picks that
    /// are still ranked. Returns true when the compared names changed.
    fn sync_compare_options(&mut self, report: &PredictionReport) -> bool {
        let before = self
            .compare_names()
            .map(|(a, b)| (a.to_string(), b.to_string()));

        let mut options: Vec<String> = Vec::with_capacity(report.rankings.len());
        for p in &report.rankings {
            if !options.contains(&p.surname) {
                options.push(p.surname.clone());
            }
        }
        let find = |name: &str| options.iter().position(|o| o == name);
        let last = options.len().saturating_sub(1);
        let first = before
            .as_ref()
            .and_then(|(a, _)| find(a))
            .unwrap_or(0);
        let second = before
            .as_ref()
            .and_then(|(_, b)| find(b))
            .unwrap_or(if first == 0 { 1 } else { 0 })
            .min(last);
        self.compare = (first, second);
        self.compare_options = options;

        let after = self
            .compare_names()
            .map(|(a, b)| (a.to_string(), b.to_string()));
        before != after
    }

    pub fn export_file_name(&self) -> String {
        let circuit = self
            .report
            .as_ref()
            .map(|r| r.circuit.circuit_ref.clone())
            .unwrap_or_else(|| "report".to_string());
        format!("f1_win_odds_{circuit}.xlsx")
    }
}

pub fn weather_summary(weather: &WeatherInput) -> String {
    format!(
        "{:.0}°C {:.0}% {}",
        weather.temperature_c, weather.humidity_pct, weather.sky
    )
}

/// Chart title noting when only the top `CHART_DRIVERS` of `total` rows are drawn.
pub fn chart_title(title: &str, total: usize) -> String {
    if total > CHART_DRIVERS {
        format!("{title} (top {CHART_DRIVERS} of {total})")
    } else {
        title.to_string()
    }
}

fn cycle(all: &[Focus], current: Focus, step: isize) -> Focus {
    let len = all.len() as isize;
    let idx = all.iter().position(|f| *f == current).unwrap_or(0) as isize;
    all[(idx + step).rem_euclid(len) as usize]
}

// Wraps at both ends.
fn shift_index(idx: &mut usize, len: usize, step: i32) -> bool {
    if len == 0 {
        return false;
    }
    let next = (*idx as i64 + i64::from(step)).rem_euclid(len as i64) as usize;
    let changed = next != *idx;
    *idx = next;
    changed
}

fn replace_f64(slot: &mut f64, next: f64) -> bool {
    let changed = (*slot - next).abs() > f64::EPSILON;
    *slot = next;
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{Circuit, Constructor};
    use crate::win_prob::SkyCondition;

    fn tables() -> RaceTables {
        RaceTables::from_parts(
            Vec::new(),
            vec![
                Circuit {
                    circuit_id: 1,
                    circuit_ref: "albert_park".to_string(),
                    name: "Albert Park".to_string(),
                    location: String::new(),
                    country: String::new(),
                },
                Circuit {
                    circuit_id: 2,
                    circuit_ref: "sepang".to_string(),
                    name: "Sepang".to_string(),
                    location: String::new(),
                    country: String::new(),
                },
            ],
            Vec::new(),
            vec![Constructor {
                constructor_id: 1,
                constructor_ref: "mclaren".to_string(),
                name: "McLaren".to_string(),
                nationality: String::new(),
            }],
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        )
    }

    #[test]
    fn temperature_is_clamped_to_bounds() {
        let mut state = AppState::new(&tables(), &AppConfig::default());
        state.focus = Focus::Temperature;
        state.weather.temperature_c = 39.5;
        assert!(state.adjust(1));
        assert_eq!(state.weather.temperature_c, 40.0);
        assert!(!state.adjust(1));
        assert_eq!(state.weather.temperature_c, 40.0);
    }

    #[test]
    fn humidity_steps_and_clamps() {
        let mut state = AppState::new(&tables(), &AppConfig::default());
        state.focus = Focus::Humidity;
        state.weather.humidity_pct = 3.0;
        state.adjust(-1);
        assert_eq!(state.weather.humidity_pct, 0.0);
    }

    #[test]
    fn circuit_picker_wraps() {
        let mut state = AppState::new(&tables(), &AppConfig::default());
        assert_eq!(state.selected_circuit(), Some("Albert Park"));
        state.adjust(-1);
        assert_eq!(state.selected_circuit(), Some("Sepang"));
        state.adjust(1);
        assert_eq!(state.selected_circuit(), Some("Albert Park"));
    }

    #[test]
    fn sky_cycles_both_ways() {
        let mut state = AppState::new(&tables(), &AppConfig::default());
        state.focus = Focus::Sky;
        state.adjust(1);
        assert_eq!(state.weather.sky, SkyCondition::Cloudy);
        state.adjust(-1);
        state.adjust(-1);
        assert_eq!(state.weather.sky, SkyCondition::Rainy);
    }

    #[test]
    fn focus_wraps_around() {
        let mut state = AppState::new(&tables(), &AppConfig::default());
        state.focus_prev();
        assert_eq!(state.focus, Focus::CompareSecond);
        state.focus_next();
        assert_eq!(state.focus, Focus::Circuit);
    }

    #[test]
    fn empty_driver_list_disables_pickers() {
        let mut state = AppState::new(&tables(), &AppConfig::default());
        state.focus = Focus::Driver;
        assert!(!state.adjust(1));
        assert!(state.compare_names().is_none());
        let query = state.query().unwrap();
        assert!(query.head_to_head.is_none());
        assert_eq!(query.constructor.as_deref(), Some("McLaren"));
    }

    #[test]
    fn chart_title_notes_truncation() {
        assert_eq!(chart_title("Win probability", 5), "Win probability");
        assert_eq!(chart_title("Win probability", CHART_DRIVERS), "Win probability");
        assert_eq!(
            chart_title("Win probability", 20),
            "Win probability (top 8 of 20)"
        );
    }

    #[test]
    fn recompute_reports_empty_circuit() {
        let t = tables();
        let mut state = AppState::new(&t, &AppConfig::default());
        state.recompute(&t);
        assert!(state.report.as_ref().is_some_and(|r| r.is_empty()));
        assert!(state.error.is_none());
    }

    #[test]
    fn recompute_surfaces_errors() {
        let empty = RaceTables::default();
        let mut state = AppState::new(&empty, &AppConfig::default());
        state.recompute(&empty);
        assert!(state.report.is_none());
        assert!(state.error.is_some());
        assert!(state.logs.back().is_some_and(|l| l.starts_with("[WARN]")));
    }
}
