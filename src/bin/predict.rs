use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};

use f1_win_odds::analysis_export::export_report;
use f1_win_odds::config::AppConfig;
use f1_win_odds::logging;
use f1_win_odds::query::{PredictionQuery, PredictionReport, Predictor};
use f1_win_odds::tables::RaceTables;
use f1_win_odds::win_prob::SkyCondition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

/// Headless circuit prediction: ranked win probabilities under a weather scenario.
#[derive(Debug, Parser)]
#[command(name = "predict", version, about)]
struct Cli {
    /// Directory holding the historical CSV files (defaults to F1_DATA_DIR or ./csv)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Circuit id, circuitRef or name
    #[arg(short, long, required_unless_present_any = ["list_circuits", "query"])]
    circuit: Option<String>,

    /// Read the whole query from a JSON file instead of flags
    #[arg(long, conflicts_with = "circuit")]
    query: Option<PathBuf>,

    /// Air temperature in °C
    #[arg(short, long, allow_negative_numbers = true)]
    temperature: Option<f64>,

    /// Relative humidity in percent
    #[arg(long)]
    humidity: Option<f64>,

    /// clear, cloudy or rainy
    #[arg(long)]
    sky: Option<SkyCondition>,

    /// Two surnames to compare
    #[arg(long, num_args = 2, value_names = ["FIRST", "SECOND"])]
    compare: Option<Vec<String>>,

    /// Driver surname to show details for
    #[arg(long)]
    driver: Option<String>,

    /// Constructor name to show details for
    #[arg(long)]
    constructor: Option<String>,

    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Also write the report to an xlsx workbook
    #[arg(long)]
    xlsx: Option<PathBuf>,

    /// Print the known circuits and exit
    #[arg(long)]
    list_circuits: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env();
    logging::init_tracing(&config.log_filter);

    let data_dir = cli.data_dir.clone().unwrap_or_else(|| config.data_dir.clone());
    let tables = RaceTables::load(&data_dir)
        .with_context(|| format!("load race tables from {}", data_dir.display()))?;

    if cli.list_circuits {
        for circuit in &tables.circuits {
            println!(
                "{:>4}  {:<22} {} ({})",
                circuit.circuit_id, circuit.circuit_ref, circuit.name, circuit.country
            );
        }
        return Ok(());
    }

    let query = build_query(&cli, &config)?;
    let report = Predictor::new(&tables, config.bounds).predict(&query)?;

    match cli.format {
        OutputFormat::Table => print_table(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if let Some(path) = &cli.xlsx {
        let summary = export_report(path, &report)?;
        eprintln!(
            "[INFO] wrote {} ({} rankings, {} points rows)",
            path.display(),
            summary.rankings,
            summary.points
        );
    }
    Ok(())
}

fn build_query(cli: &Cli, config: &AppConfig) -> Result<PredictionQuery> {
    if let Some(path) = &cli.query {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read query file {}", path.display()))?;
        return serde_json::from_str(&raw)
            .with_context(|| format!("parse query file {}", path.display()));
    }
    let Some(circuit) = cli.circuit.clone() else {
        bail!("--circuit is required");
    };
    let mut query = PredictionQuery::for_circuit(circuit);
    query.weather = config.default_weather;
    if let Some(t) = cli.temperature {
        query.weather.temperature_c = t;
    }
    if let Some(h) = cli.humidity {
        query.weather.humidity_pct = h;
    }
    if let Some(sky) = cli.sky {
        query.weather.sky = sky;
    }
    query.driver = cli.driver.clone();
    query.constructor = cli.constructor.clone();
    query.head_to_head = match cli.compare.as_deref() {
        Some([first, second]) => Some((first.clone(), second.clone())),
        _ => None,
    };
    Ok(query)
}

fn print_table(report: &PredictionReport) {
    let w = &report.weather;
    println!(
        "{} ({}) | {} races | {:.1}°C {:.0}% {} | multiplier {:.3}",
        report.circuit.name,
        report.circuit.country,
        report.races_held,
        w.temperature_c(),
        w.humidity_pct(),
        w.sky(),
        w.multiplier()
    );
    if report.is_empty() {
        println!("No race data available for this circuit.");
    } else {
        println!(
            "{:>3}  {:<18} {:>7} {:>8} {:>8} {:>10} {:>7}",
            "#", "Driver", "Win%", "AvgFin", "AvgQ", "Pit(ms)", "Pts"
        );
        for (idx, p) in report.rankings.iter().enumerate() {
            println!(
                "{:>3}  {:<18} {:>6.2}% {:>8.2} {:>8} {:>10} {:>7}",
                idx + 1,
                p.surname,
                p.win_probability * 100.0,
                p.avg_position,
                opt(p.avg_qualifying_position, 2),
                opt(p.avg_pit_stop_ms, 0),
                opt(p.current_points, 0)
            );
        }
        if !report.unscored.is_empty() {
            println!("({} driver(s) had no classified result here)", report.unscored.len());
        }
    }

    if let Some(h2h) = &report.head_to_head {
        println!();
        println!("Head to head: {} vs {}", h2h.first, h2h.second);
        if h2h.drivers.is_empty() {
            println!("  neither driver has raced here");
        }
        for p in &h2h.drivers {
            println!(
                "  {:<18} {:>6.2}%  avg finish {:.2}  avg quali {}",
                p.surname,
                p.win_probability * 100.0,
                p.avg_position,
                opt(p.avg_qualifying_position, 2)
            );
        }
    }

    if let Some(driver) = &report.selected_driver {
        println!();
        println!("Driver: {} ({})", driver.full_name(), driver.nationality);
    }
    if let Some(team) = &report.selected_constructor {
        println!("Constructor: {} ({})", team.name, team.nationality);
    }

    if !report.points_distribution.is_empty() {
        println!();
        println!(
            "Points after race {}:",
            report
                .latest_race_id
                .map(|id| id.to_string())
                .unwrap_or_default()
        );
        for p in report.points_distribution.iter().take(10) {
            println!("  {:<18} {:>6.0} ({:.1}%)", p.surname, p.points, p.share * 100.0);
        }
    }
}

fn opt(value: Option<f64>, decimals: usize) -> String {
    value
        .map(|v| format!("{v:.decimals$}"))
        .unwrap_or_else(|| "-".to_string())
}
