use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rust_xlsxwriter::{Workbook, Worksheet};
use tracing::info;

use crate::query::{PointsShare, PredictionReport};
use crate::win_prob::DriverProfile;

pub struct ExportSummary {
    pub rankings: usize,
    pub head_to_head: usize,
    pub points: usize,
}

pub fn export_report(path: &Path, report: &PredictionReport) -> Result<ExportSummary> {
    let mut ranking_rows = vec![profile_header()];
    ranking_rows.extend(
        report
            .rankings
            .iter()
            .enumerate()
            .map(|(idx, p)| profile_row(idx + 1, p)),
    );
    // Drivers who raced here without a classified order; kept for completeness.
    ranking_rows.extend(report.unscored.iter().map(|agg| {
        let mut row = vec![String::new(); profile_header().len()];
        row[1] = agg.driver_id.to_string();
        row[2] = agg.surname.clone();
        row[5] = opt_to_string(agg.avg_qualifying_position.map(fmt2));
        row[6] = opt_to_string(agg.avg_pit_stop_ms.map(fmt2));
        row[7] = opt_to_string(agg.current_points);
        row
    }));

    let mut h2h_rows = vec![profile_header()];
    if let Some(h2h) = &report.head_to_head {
        h2h_rows.extend(
            h2h.drivers
                .iter()
                .map(|p| profile_row(rank_of(report, p.driver_id), p)),
        );
    }

    let mut points_rows = vec![vec![
        "Driver ID".to_string(),
        "Driver".to_string(),
        "Points".to_string(),
        "Share %".to_string(),
    ]];
    points_rows.extend(report.points_distribution.iter().map(points_row));

    let weather = &report.weather;
    let query_rows = vec![
        vec!["Field".to_string(), "Value".to_string()],
        vec!["Circuit".to_string(), report.circuit.name.clone()],
        vec!["Circuit ref".to_string(), report.circuit.circuit_ref.clone()],
        vec!["Country".to_string(), report.circuit.country.clone()],
        vec!["Races held".to_string(), report.races_held.to_string()],
        vec![
            "Temperature (C)".to_string(),
            fmt2(weather.temperature_c()),
        ],
        vec!["Humidity (%)".to_string(), fmt2(weather.humidity_pct())],
        vec!["Sky".to_string(), weather.sky().label().to_string()],
        vec!["Weather multiplier".to_string(), format!("{:.4}", weather.multiplier())],
        vec![
            "Latest race ID".to_string(),
            opt_to_string(report.latest_race_id),
        ],
        vec![
            "Head to head".to_string(),
            report
                .head_to_head
                .as_ref()
                .map(|h| format!("{} vs {}", h.first, h.second))
                .unwrap_or_default(),
        ],
        vec![
            "Selected driver".to_string(),
            report
                .selected_driver
                .as_ref()
                .map(|d| d.full_name())
                .unwrap_or_default(),
        ],
        vec![
            "Selected constructor".to_string(),
            report
                .selected_constructor
                .as_ref()
                .map(|c| c.name.clone())
                .unwrap_or_default(),
        ],
        vec!["Generated at (UTC)".to_string(), Utc::now().to_rfc3339()],
    ];

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Rankings").context("name rankings sheet")?;
    write_rows(sheet, &ranking_rows)?;

    let sheet = workbook.add_worksheet();
    sheet.set_name("Head to Head").context("name head-to-head sheet")?;
    write_rows(sheet, &h2h_rows)?;

    let sheet = workbook.add_worksheet();
    sheet.set_name("Points").context("name points sheet")?;
    write_rows(sheet, &points_rows)?;

    let sheet = workbook.add_worksheet();
    sheet.set_name("Query").context("name query sheet")?;
    write_rows(sheet, &query_rows)?;

    workbook
        .save(path)
        .with_context(|| format!("save workbook {}", path.display()))?;

    let summary = ExportSummary {
        rankings: ranking_rows.len() - 1,
        head_to_head: h2h_rows.len() - 1,
        points: points_rows.len() - 1,
    };
    info!(
        path = %path.display(),
        rankings = summary.rankings,
        "exported prediction workbook"
    );
    Ok(summary)
}

fn profile_header() -> Vec<String> {
    vec![
        "Rank".to_string(),
        "Driver ID".to_string(),
        "Driver".to_string(),
        "Win %".to_string(),
        "Avg Finish".to_string(),
        "Avg Quali".to_string(),
        "Avg Pit (ms)".to_string(),
        "Points".to_string(),
    ]
}

fn profile_row(rank: usize, p: &DriverProfile) -> Vec<String> {
    vec![
        rank.to_string(),
        p.driver_id.to_string(),
        p.surname.clone(),
        format!("{:.2}", p.win_probability * 100.0),
        fmt2(p.avg_position),
        opt_to_string(p.avg_qualifying_position.map(fmt2)),
        opt_to_string(p.avg_pit_stop_ms.map(fmt2)),
        opt_to_string(p.current_points),
    ]
}

fn points_row(p: &PointsShare) -> Vec<String> {
    vec![
        p.driver_id.to_string(),
        p.surname.clone(),
        p.points.to_string(),
        format!("{:.2}", p.share * 100.0),
    ]
}

fn rank_of(report: &PredictionReport, driver_id: u32) -> usize {
    report
        .rankings
        .iter()
        .position(|p| p.driver_id == driver_id)
        .map(|idx| idx + 1)
        .unwrap_or_default()
}

fn fmt2(value: f64) -> String {
    format!("{value:.2}")
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}

fn opt_to_string<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
