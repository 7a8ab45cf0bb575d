use std::collections::{BTreeMap, HashMap};

use anyhow::{Result, ensure};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::forest::{ForestConfig, RandomForest};
use crate::metrics::{RegressionMetrics, evaluate_regression};
use crate::query::CURRENT_DRIVER_LIMIT;
use crate::tables::RaceTables;

/// Stand-in for a missing grid slot or qualifying position.
pub const MISSING_FEATURE: f64 = -1.0;

pub const FEATURE_NAMES: [&str; 5] = [
    "driver_encoded",
    "constructor_encoded",
    "circuit_id",
    "grid",
    "qualifying_position",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverFilter {
    All,
    Ids(Vec<u32>),
    /// Drivers of the latest race who sit in the top `limit` of its standings.
    Current { limit: usize },
}

impl Default for DriverFilter {
    fn default() -> Self {
        DriverFilter::Current {
            limit: CURRENT_DRIVER_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub race_id: u32,
    pub driver_id: u32,
    pub constructor_id: u32,
    pub circuit_id: u32,
    pub grid: Option<u32>,
    pub qualifying_position: Option<u32>,
    pub finishing_position: u32,
}

/// One row per classified result of a filtered driver, joined through its
/// race to the circuit and to the driver's qualifying entry for that race.
pub fn build_feature_table(tables: &RaceTables, filter: &DriverFilter) -> Vec<FeatureRow> {
    let keep: Option<Vec<u32>> = match filter {
        DriverFilter::All => None,
        DriverFilter::Ids(ids) => Some(ids.clone()),
        DriverFilter::Current { limit } => Some(
            tables
                .current_drivers(*limit)
                .iter()
                .map(|d| d.driver_id)
                .collect(),
        ),
    };
    let circuit_of: HashMap<u32, u32> = tables
        .races
        .iter()
        .map(|r| (r.race_id, r.circuit_id))
        .collect();
    let quali: HashMap<(u32, u32), Option<u32>> = tables
        .qualifying
        .iter()
        .map(|q| ((q.race_id, q.driver_id), q.position))
        .collect();

    tables
        .results
        .iter()
        .filter(|r| keep.as_ref().is_none_or(|ids| ids.contains(&r.driver_id)))
        .filter_map(|r| {
            Some(FeatureRow {
                race_id: r.race_id,
                driver_id: r.driver_id,
                constructor_id: r.constructor_id,
                circuit_id: *circuit_of.get(&r.race_id)?,
                grid: r.grid,
                qualifying_position: quali.get(&(r.race_id, r.driver_id)).copied().flatten(),
                finishing_position: r.position?,
            })
        })
        .collect()
}

/// Smoothed mean encoding of an integer category against a numeric target.
///
/// Categories seen `n` times blend their own mean with the global prior
/// using the weight `1 / (1 + exp(-(n - min_samples_leaf) / smoothing))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetEncoder {
    pub prior: f64,
    pub min_samples_leaf: f64,
    pub smoothing: f64,
    pub encodings: BTreeMap<u32, f64>,
}

impl TargetEncoder {
    pub const DEFAULT_MIN_SAMPLES_LEAF: f64 = 20.0;
    pub const DEFAULT_SMOOTHING: f64 = 10.0;

    pub fn fit(keys: &[u32], targets: &[f64], min_samples_leaf: f64, smoothing: f64) -> Self {
        let n = keys.len().min(targets.len());
        let prior = if n == 0 {
            0.0
        } else {
            targets[..n].iter().sum::<f64>() / n as f64
        };

        let mut groups: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
        for (key, y) in keys.iter().zip(targets) {
            let entry = groups.entry(*key).or_default();
            entry.0 += y;
            entry.1 += 1;
        }

        let smoothing = smoothing.max(f64::MIN_POSITIVE);
        let encodings = groups
            .into_iter()
            .map(|(key, (sum, count))| {
                let weight = 1.0 / (1.0 + (-(count as f64 - min_samples_leaf) / smoothing).exp());
                let mean = sum / count as f64;
                (key, prior * (1.0 - weight) + mean * weight)
            })
            .collect();

        Self {
            prior,
            min_samples_leaf,
            smoothing,
            encodings,
        }
    }

    /// Unseen categories fall back to the prior.
    pub fn encode(&self, key: u32) -> f64 {
        self.encodings.get(&key).copied().unwrap_or(self.prior)
    }
}

/// Seeded shuffle of `0..n` into (train, test). Both sides are non-empty
/// whenever `n >= 2`.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut idx: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    idx.shuffle(&mut rng);

    // The epsilon keeps 15 * 0.2 from rounding up to 4.
    let mut n_test = (n as f64 * test_fraction.clamp(0.0, 1.0) - 1e-9).ceil() as usize;
    if n >= 2 {
        n_test = n_test.clamp(1, n - 1);
    } else {
        n_test = 0;
    }
    let train = idx.split_off(n_test);
    (train, idx)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub filter: DriverFilter,
    pub test_fraction: f64,
    pub seed: u64,
    pub encoder_min_samples_leaf: f64,
    pub encoder_smoothing: f64,
    pub forest: ForestConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            filter: DriverFilter::default(),
            test_fraction: 0.2,
            seed: 42,
            encoder_min_samples_leaf: TargetEncoder::DEFAULT_MIN_SAMPLES_LEAF,
            encoder_smoothing: TargetEncoder::DEFAULT_SMOOTHING,
            forest: ForestConfig::default(),
        }
    }
}

/// Everything worth keeping from a baseline run.
#[derive(Debug, Clone, Serialize)]
pub struct BaselineArtifact {
    pub config: TrainingConfig,
    pub feature_names: Vec<String>,
    pub rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub driver_encoder: TargetEncoder,
    pub constructor_encoder: TargetEncoder,
    pub train: RegressionMetrics,
    pub test: RegressionMetrics,
}

pub struct BaselineRun {
    pub artifact: BaselineArtifact,
    pub model: RandomForest,
}

pub fn fit_baseline(tables: &RaceTables, config: &TrainingConfig) -> Result<BaselineRun> {
    let rows = build_feature_table(tables, &config.filter);
    ensure!(
        rows.len() >= 2,
        "need at least two classified results to train, found {}",
        rows.len()
    );

    let (train_idx, test_idx) = train_test_split(rows.len(), config.test_fraction, config.seed);
    let train: Vec<&FeatureRow> = train_idx.iter().map(|&i| &rows[i]).collect();
    let test: Vec<&FeatureRow> = test_idx.iter().map(|&i| &rows[i]).collect();

    let train_y: Vec<f64> = train.iter().map(|r| f64::from(r.finishing_position)).collect();
    let test_y: Vec<f64> = test.iter().map(|r| f64::from(r.finishing_position)).collect();

    let driver_encoder = TargetEncoder::fit(
        &train.iter().map(|r| r.driver_id).collect::<Vec<_>>(),
        &train_y,
        config.encoder_min_samples_leaf,
        config.encoder_smoothing,
    );
    let constructor_encoder = TargetEncoder::fit(
        &train.iter().map(|r| r.constructor_id).collect::<Vec<_>>(),
        &train_y,
        config.encoder_min_samples_leaf,
        config.encoder_smoothing,
    );

    let encode = |r: &FeatureRow| {
        vec![
            driver_encoder.encode(r.driver_id),
            constructor_encoder.encode(r.constructor_id),
            f64::from(r.circuit_id),
            r.grid.map(f64::from).unwrap_or(MISSING_FEATURE),
            r.qualifying_position
                .map(f64::from)
                .unwrap_or(MISSING_FEATURE),
        ]
    };
    let train_x: Vec<Vec<f64>> = train.iter().map(|&r| encode(r)).collect();
    let test_x: Vec<Vec<f64>> = test.iter().map(|&r| encode(r)).collect();

    let model = RandomForest::fit(&train_x, &train_y, &config.forest)?;
    let train_metrics = evaluate_regression(&model.predict_many(&train_x), &train_y);
    let test_metrics = evaluate_regression(&model.predict_many(&test_x), &test_y);

    info!(
        rows = rows.len(),
        train = train.len(),
        test = test.len(),
        test_rmse = test_metrics.rmse,
        test_r2 = test_metrics.r2,
        "baseline fitted"
    );

    Ok(BaselineRun {
        artifact: BaselineArtifact {
            config: config.clone(),
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            rows: rows.len(),
            train_rows: train.len(),
            test_rows: test.len(),
            driver_encoder,
            constructor_encoder,
            train: train_metrics,
            test: test_metrics,
        },
        model,
    })
}
