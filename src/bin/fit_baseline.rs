use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use f1_win_odds::config::AppConfig;
use f1_win_odds::forest::ForestConfig;
use f1_win_odds::logging;
use f1_win_odds::metrics::RegressionMetrics;
use f1_win_odds::query::CURRENT_DRIVER_LIMIT;
use f1_win_odds::tables::RaceTables;
use f1_win_odds::training::{DriverFilter, TrainingConfig, fit_baseline};

/// Fits the offline finishing-position baseline and reports its error.
#[derive(Debug, Parser)]
#[command(name = "fit_baseline", version, about)]
struct Cli {
    /// Directory holding the historical CSV files (defaults to F1_DATA_DIR or ./csv)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Comma-separated driver ids; defaults to the current drivers
    #[arg(long, value_delimiter = ',', conflicts_with = "all_drivers")]
    drivers: Option<Vec<u32>>,

    /// Train on every driver in the record
    #[arg(long)]
    all_drivers: bool,

    #[arg(long, default_value_t = 100)]
    trees: usize,

    #[arg(long, default_value_t = 8)]
    max_depth: usize,

    #[arg(long, default_value_t = 5)]
    min_samples_leaf: usize,

    #[arg(long, default_value_t = 0.2)]
    test_fraction: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Write encodings and metrics as JSON
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let app_config = AppConfig::from_env();
    logging::init_tracing(&app_config.log_filter);

    let data_dir = cli.data_dir.clone().unwrap_or(app_config.data_dir);
    let tables = RaceTables::load(&data_dir)
        .with_context(|| format!("load race tables from {}", data_dir.display()))?;

    let filter = if cli.all_drivers {
        DriverFilter::All
    } else if let Some(ids) = &cli.drivers {
        DriverFilter::Ids(ids.clone())
    } else {
        DriverFilter::Current {
            limit: CURRENT_DRIVER_LIMIT,
        }
    };
    let config = TrainingConfig {
        filter,
        test_fraction: cli.test_fraction,
        seed: cli.seed,
        forest: ForestConfig {
            n_trees: cli.trees,
            max_depth: cli.max_depth,
            min_samples_leaf: cli.min_samples_leaf,
            seed: cli.seed,
            ..ForestConfig::default()
        },
        ..TrainingConfig::default()
    };

    let run = fit_baseline(&tables, &config)?;
    let artifact = &run.artifact;
    println!(
        "rows={} train={} test={} trees={}",
        artifact.rows,
        artifact.train_rows,
        artifact.test_rows,
        run.model.trees().len()
    );
    print_metrics("train", &artifact.train);
    print_metrics("test", &artifact.test);

    if let Some(path) = &cli.out {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }
        let json = serde_json::to_string_pretty(artifact)?;
        fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
        println!("saved {}", path.display());
    }
    Ok(())
}

fn print_metrics(label: &str, m: &RegressionMetrics) {
    println!(
        "{label:<5} n={} rmse={:.3} mae={:.3} r2={:.3}",
        m.samples, m.rmse, m.mae, m.r2
    );
}
