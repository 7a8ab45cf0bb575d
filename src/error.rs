use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Which normalisation pass of the scorer hit a degenerate total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NormalizationStage {
    Raw,
    WeatherAdjusted,
}

impl fmt::Display for NormalizationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizationStage::Raw => f.write_str("raw"),
            NormalizationStage::WeatherAdjusted => f.write_str("weather-adjusted"),
        }
    }
}

/// Failures of a single prediction query. Loading and I/O errors go through `anyhow`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComputeError {
    #[error("unknown circuit `{0}`")]
    UnknownCircuit(String),
    #[error("temperature {value} is outside {min}..={max}")]
    TemperatureOutOfRange { value: f64, min: f64, max: f64 },
    #[error("humidity {value} is outside 0..=100")]
    HumidityOutOfRange { value: f64 },
    #[error("cannot normalise {stage} scores: total is {total}")]
    DegenerateNormalization {
        stage: NormalizationStage,
        total: f64,
    },
}
