use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::DriverAggregate;
use crate::config::WeatherBounds;
use crate::error::{ComputeError, NormalizationStage};

// Reference points at which the weather multiplier is exactly 1.
const REFERENCE_TEMP_C: f64 = 20.0;
const REFERENCE_HUMIDITY_PCT: f64 = 50.0;

const RAINY_TEMP_FACTOR: f64 = 0.90;
const CLOUDY_TEMP_FACTOR: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkyCondition {
    #[default]
    Clear,
    Cloudy,
    Rainy,
}

impl SkyCondition {
    pub const ALL: [SkyCondition; 3] = [SkyCondition::Clear, SkyCondition::Cloudy, SkyCondition::Rainy];

    /// Share of the input temperature that counts towards the multiplier.
    pub fn temperature_factor(self) -> f64 {
        match self {
            SkyCondition::Clear => 1.0,
            SkyCondition::Cloudy => CLOUDY_TEMP_FACTOR,
            SkyCondition::Rainy => RAINY_TEMP_FACTOR,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SkyCondition::Clear => "Clear",
            SkyCondition::Cloudy => "Cloudy",
            SkyCondition::Rainy => "Rainy",
        }
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.position() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.position() + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    fn position(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }
}

impl fmt::Display for SkyCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SkyCondition {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "clear" | "sunny" => Ok(SkyCondition::Clear),
            "cloudy" | "overcast" => Ok(SkyCondition::Cloudy),
            "rainy" | "rain" | "wet" => Ok(SkyCondition::Rainy),
            other => Err(format!(
                "unknown sky condition `{other}` (expected clear, cloudy or rainy)"
            )),
        }
    }
}

/// Unvalidated weather parameters as they arrive from a query or the sliders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherInput {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    #[serde(default)]
    pub sky: SkyCondition,
}

impl Default for WeatherInput {
    fn default() -> Self {
        Self {
            temperature_c: REFERENCE_TEMP_C,
            humidity_pct: REFERENCE_HUMIDITY_PCT,
            sky: SkyCondition::Clear,
        }
    }
}

/// Weather scenario checked against the configured bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Weather {
    temperature_c: f64,
    humidity_pct: f64,
    sky: SkyCondition,
}

impl Weather {
    pub fn new(input: WeatherInput, bounds: &WeatherBounds) -> Result<Self, ComputeError> {
        let temp = input.temperature_c;
        if !temp.is_finite() || temp < bounds.temp_min || temp > bounds.temp_max {
            return Err(ComputeError::TemperatureOutOfRange {
                value: temp,
                min: bounds.temp_min,
                max: bounds.temp_max,
            });
        }
        let hum = input.humidity_pct;
        if !hum.is_finite() || !(0.0..=100.0).contains(&hum) {
            return Err(ComputeError::HumidityOutOfRange { value: hum });
        }
        Ok(Self {
            temperature_c: temp,
            humidity_pct: hum,
            sky: input.sky,
        })
    }

    pub fn temperature_c(&self) -> f64 {
        self.temperature_c
    }

    pub fn humidity_pct(&self) -> f64 {
        self.humidity_pct
    }

    pub fn sky(&self) -> SkyCondition {
        self.sky
    }

    pub fn effective_temperature(&self) -> f64 {
        self.temperature_c * self.sky.temperature_factor()
    }

    /// Same value for every driver; 1.0 at 20°C, 50% humidity, clear sky.
    pub fn multiplier(&self) -> f64 {
        (self.effective_temperature() / REFERENCE_TEMP_C)
            * (self.humidity_pct / REFERENCE_HUMIDITY_PCT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverProfile {
    pub driver_id: u32,
    pub surname: String,
    pub avg_position: f64,
    pub avg_qualifying_position: Option<f64>,
    pub avg_pit_stop_ms: Option<f64>,
    pub current_points: Option<f64>,
    /// `1 / (avg_position + 1)`.
    pub raw_score: f64,
    /// Raw score normalised across the field, before weather.
    pub base_probability: f64,
    /// Base probability times the weather multiplier.
    pub adjusted_score: f64,
    pub win_probability: f64,
}

/// Turns circuit aggregates into a weather-adjusted distribution.
///
/// Drivers without an average finishing position are left out. An empty
/// field yields an empty distribution; a zero or non-finite total in either
/// normalisation pass is reported instead of producing NaN.
pub fn score_drivers(
    aggregates: &[DriverAggregate],
    weather: &Weather,
) -> Result<Vec<DriverProfile>, ComputeError> {
    let mut profiles: Vec<DriverProfile> = aggregates
        .iter()
        .filter_map(|agg| {
            let avg = agg.avg_position.filter(|v| v.is_finite())?;
            Some(DriverProfile {
                driver_id: agg.driver_id,
                surname: agg.surname.clone(),
                avg_position: avg,
                avg_qualifying_position: agg.avg_qualifying_position,
                avg_pit_stop_ms: agg.avg_pit_stop_ms,
                current_points: agg.current_points,
                raw_score: 1.0 / (avg + 1.0),
                base_probability: 0.0,
                adjusted_score: 0.0,
                win_probability: 0.0,
            })
        })
        .collect();

    if profiles.is_empty() {
        return Ok(profiles);
    }

    let raw_total = checked_total(
        profiles.iter().map(|p| p.raw_score),
        NormalizationStage::Raw,
    )?;
    let multiplier = weather.multiplier();
    for p in &mut profiles {
        p.base_probability = p.raw_score / raw_total;
        p.adjusted_score = p.base_probability * multiplier;
    }

    // The multiplier is uniform, so this pass only absorbs rounding.
    let adjusted_total = checked_total(
        profiles.iter().map(|p| p.adjusted_score),
        NormalizationStage::WeatherAdjusted,
    )?;
    for p in &mut profiles {
        p.win_probability = p.adjusted_score / adjusted_total;
    }

    debug!(
        drivers = profiles.len(),
        multiplier,
        sky = %weather.sky(),
        "scored drivers"
    );
    Ok(profiles)
}

/// Orders a distribution the way it is displayed: most likely winner first.
pub fn rank_profiles(profiles: &mut [DriverProfile]) {
    profiles.sort_by(|a, b| {
        b.win_probability
            .total_cmp(&a.win_probability)
            .then(a.driver_id.cmp(&b.driver_id))
    });
}

fn checked_total(
    values: impl Iterator<Item = f64>,
    stage: NormalizationStage,
) -> Result<f64, ComputeError> {
    let total: f64 = values.sum();
    if total == 0.0 || !total.is_finite() {
        return Err(ComputeError::DegenerateNormalization { stage, total });
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agg(id: u32, avg: Option<f64>) -> DriverAggregate {
        DriverAggregate {
            driver_id: id,
            surname: format!("D{id}"),
            avg_position: avg,
            avg_qualifying_position: None,
            avg_pit_stop_ms: None,
            current_points: None,
        }
    }

    fn weather(temp: f64, hum: f64, sky: SkyCondition) -> Weather {
        Weather::new(
            WeatherInput {
                temperature_c: temp,
                humidity_pct: hum,
                sky,
            },
            &WeatherBounds::default(),
        )
        .unwrap()
    }

    fn field() -> Vec<DriverAggregate> {
        vec![agg(1, Some(2.0)), agg(2, Some(5.0)), agg(3, Some(10.0))]
    }

    #[test]
    fn default_weather_is_neutral() {
        let w = weather(20.0, 50.0, SkyCondition::Clear);
        assert!((w.multiplier() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn three_driver_example_matches_closed_form() {
        let out = score_drivers(&field(), &weather(20.0, 50.0, SkyCondition::Clear)).unwrap();
        let total = 1.0 / 3.0 + 1.0 / 6.0 + 1.0 / 11.0;
        let expected = [1.0 / 3.0 / total, 1.0 / 6.0 / total, 1.0 / 11.0 / total];
        for (p, e) in out.iter().zip(expected) {
            assert!((p.win_probability - e).abs() < 1e-12);
        }
        assert!((out[0].win_probability - 0.5641).abs() < 1e-4);
        assert!((out[1].win_probability - 0.2821).abs() < 1e-4);
        assert!((out[2].win_probability - 0.1538).abs() < 1e-4);
        let sum: f64 = out.iter().map(|p| p.win_probability).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sky_factors_are_ordered() {
        let clear = weather(25.0, 50.0, SkyCondition::Clear).effective_temperature();
        let cloudy = weather(25.0, 50.0, SkyCondition::Cloudy).effective_temperature();
        let rainy = weather(25.0, 50.0, SkyCondition::Rainy).effective_temperature();
        assert!(rainy < cloudy);
        assert!(cloudy < clear);
        assert!((rainy - 22.5).abs() < 1e-12);
    }

    #[test]
    fn warmer_weather_scales_adjusted_scores_uniformly() {
        let cold = score_drivers(&field(), &weather(10.0, 50.0, SkyCondition::Clear)).unwrap();
        let neutral = score_drivers(&field(), &weather(20.0, 50.0, SkyCondition::Clear)).unwrap();
        for (c, n) in cold.iter().zip(&neutral) {
            assert!(n.adjusted_score > c.adjusted_score);
            assert!((n.adjusted_score / c.adjusted_score - 2.0).abs() < 1e-9);
            assert!((n.win_probability - c.win_probability).abs() < 1e-12);
        }
    }

    #[test]
    fn drivers_without_average_are_excluded() {
        let mut input = field();
        input.push(agg(4, None));
        input.push(agg(5, Some(f64::NAN)));
        let out = score_drivers(&input, &weather(20.0, 50.0, SkyCondition::Clear)).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|p| p.win_probability.is_finite()));
    }

    #[test]
    fn empty_field_is_not_an_error() {
        let out = score_drivers(&[], &weather(20.0, 50.0, SkyCondition::Clear)).unwrap();
        assert!(out.is_empty());
        let out = score_drivers(&[agg(1, None)], &weather(20.0, 50.0, SkyCondition::Clear))
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn zero_humidity_is_a_degenerate_normalisation() {
        let err = score_drivers(&field(), &weather(20.0, 0.0, SkyCondition::Clear)).unwrap_err();
        assert!(matches!(
            err,
            ComputeError::DegenerateNormalization {
                stage: NormalizationStage::WeatherAdjusted,
                ..
            }
        ));
    }

    #[test]
    fn zero_raw_total_is_reported() {
        // avg -1 makes 1/(avg+1) infinite; the raw pass must refuse it.
        let err = score_drivers(&[agg(1, Some(-1.0))], &weather(20.0, 50.0, SkyCondition::Clear))
            .unwrap_err();
        assert!(matches!(
            err,
            ComputeError::DegenerateNormalization {
                stage: NormalizationStage::Raw,
                ..
            }
        ));
    }

    #[test]
    fn negative_temperature_keeps_a_valid_distribution() {
        let out = score_drivers(&field(), &weather(-5.0, 80.0, SkyCondition::Rainy)).unwrap();
        let sum: f64 = out.iter().map(|p| p.win_probability).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(out.iter().all(|p| p.win_probability > 0.0));
    }

    #[test]
    fn weather_bounds_are_enforced() {
        let bounds = WeatherBounds::default();
        let hot = WeatherInput {
            temperature_c: 41.0,
            ..WeatherInput::default()
        };
        assert!(matches!(
            Weather::new(hot, &bounds),
            Err(ComputeError::TemperatureOutOfRange { .. })
        ));
        let soaked = WeatherInput {
            humidity_pct: 100.5,
            ..WeatherInput::default()
        };
        assert!(matches!(
            Weather::new(soaked, &bounds),
            Err(ComputeError::HumidityOutOfRange { .. })
        ));
    }

    #[test]
    fn sky_parses_aliases() {
        assert_eq!("Sunny".parse::<SkyCondition>().unwrap(), SkyCondition::Clear);
        assert_eq!(" rain ".parse::<SkyCondition>().unwrap(), SkyCondition::Rainy);
        assert!("snow".parse::<SkyCondition>().is_err());
    }

    #[test]
    fn sky_steps_visit_every_condition() {
        let mut sky = SkyCondition::Clear;
        let mut seen = Vec::new();
        for _ in 0..SkyCondition::ALL.len() {
            seen.push(sky);
            sky = sky.next();
        }
        assert_eq!(seen, SkyCondition::ALL.to_vec());
        assert_eq!(sky, SkyCondition::Clear);
        assert_eq!(SkyCondition::Clear.prev(), SkyCondition::Rainy);
    }

    #[test]
    fn ranking_puts_favourite_first() {
        let mut out =
            score_drivers(&field(), &weather(20.0, 50.0, SkyCondition::Clear)).unwrap();
        out.reverse();
        rank_profiles(&mut out);
        let ids: Vec<u32> = out.iter().map(|p| p.driver_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
