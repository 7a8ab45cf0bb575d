use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::win_prob::{SkyCondition, WeatherInput};

pub const DEFAULT_DATA_DIR: &str = "csv";
pub const DEFAULT_LOG_FILTER: &str = "f1_win_odds=info";

/// Allowed temperature window for the weather inputs, in °C.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherBounds {
    pub temp_min: f64,
    pub temp_max: f64,
}

impl Default for WeatherBounds {
    fn default() -> Self {
        Self {
            temp_min: -10.0,
            temp_max: 40.0,
        }
    }
}

impl WeatherBounds {
    pub fn clamp_temperature(&self, value: f64) -> f64 {
        value.clamp(self.temp_min, self.temp_max)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub bounds: WeatherBounds,
    pub default_weather: WeatherInput,
    pub log_filter: String,
    pub log_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            bounds: WeatherBounds::default(),
            default_weather: WeatherInput::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_file: None,
        }
    }
}

impl AppConfig {
    /// Loads `.env.local` / `.env` first, then reads `F1_*` variables.
    /// Unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");

        let defaults = Self::default();
        let data_dir = env_string("F1_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let mut bounds = WeatherBounds {
            temp_min: env_f64("F1_TEMP_MIN").unwrap_or(defaults.bounds.temp_min),
            temp_max: env_f64("F1_TEMP_MAX").unwrap_or(defaults.bounds.temp_max),
        };
        if bounds.temp_min > bounds.temp_max {
            bounds = WeatherBounds::default();
        }

        let default_weather = WeatherInput {
            temperature_c: bounds.clamp_temperature(
                env_f64("F1_DEFAULT_TEMP").unwrap_or(defaults.default_weather.temperature_c),
            ),
            humidity_pct: env_f64("F1_DEFAULT_HUMIDITY")
                .unwrap_or(defaults.default_weather.humidity_pct)
                .clamp(0.0, 100.0),
            sky: env_string("F1_DEFAULT_SKY")
                .and_then(|raw| raw.parse::<SkyCondition>().ok())
                .unwrap_or(defaults.default_weather.sky),
        };

        Self {
            data_dir,
            bounds,
            default_weather,
            log_filter: env_string("F1_LOG").unwrap_or(defaults.log_filter),
            log_file: env_string("F1_LOG_FILE").map(PathBuf::from),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

fn env_f64(key: &str) -> Option<f64> {
    env_string(key)
        .and_then(|val| val.parse::<f64>().ok())
        .filter(|val| val.is_finite())
}
