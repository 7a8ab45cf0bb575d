use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Bar, BarChart, BarGroup, Block, Borders, Clear, Paragraph, Wrap};

use f1_win_odds::analysis_export::export_report;
use f1_win_odds::config::AppConfig;
use f1_win_odds::logging;
use f1_win_odds::query::PredictionReport;
use f1_win_odds::state::{AppState, CHART_DRIVERS, Focus, chart_title, weather_summary};
use f1_win_odds::tables::RaceTables;

const POLL_TIMEOUT: Duration = Duration::from_millis(250);

struct App {
    tables: RaceTables,
    state: AppState,
    should_quit: bool,
}

impl App {
    fn new(tables: RaceTables, config: &AppConfig) -> Self {
        let mut state = AppState::new(&tables, config);
        state.push_log(format!(
            "[INFO] Loaded {} races, {} circuits, {} drivers from {}",
            tables.races.len(),
            tables.circuits.len(),
            tables.drivers.len(),
            config.data_dir.display()
        ));
        state.recompute(&tables);
        Self {
            tables,
            state,
            should_quit: false,
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Esc if self.state.help_overlay => self.state.help_overlay = false,
            KeyCode::Char('?') => self.state.help_overlay = !self.state.help_overlay,
            KeyCode::Char('j') | KeyCode::Down | KeyCode::Tab => self.state.focus_next(),
            KeyCode::Char('k') | KeyCode::Up | KeyCode::BackTab => self.state.focus_prev(),
            KeyCode::Char('h') | KeyCode::Left => self.adjust(-1),
            KeyCode::Char('l') | KeyCode::Right => self.adjust(1),
            KeyCode::Char('e') | KeyCode::Char('E') => self.export(),
            _ => {}
        }
    }

    fn adjust(&mut self, step: i32) {
        if self.state.adjust(step) {
            self.state.recompute(&self.tables);
        }
    }

    fn export(&mut self) {
        let Some(report) = self.state.report.as_ref() else {
            self.state.push_log("[INFO] Nothing to export");
            return;
        };
        let path = PathBuf::from(self.state.export_file_name());
        match export_report(&path, report) {
            Ok(summary) => {
                self.state.export.path = Some(path.display().to_string());
                self.state.export.message = format!(
                    "Exported {} rankings, {} points rows",
                    summary.rankings, summary.points
                );
                self.state.export.ok = true;
                self.state
                    .push_log(format!("[INFO] Export saved to {}", path.display()));
            }
            Err(err) => {
                self.state.export.path = None;
                self.state.export.message = format!("Export failed: {err:#}");
                self.state.export.ok = false;
                self.state.push_log(format!("[WARN] Export failed: {err:#}"));
            }
        }
    }
}

fn main() -> Result<()> {
    let config = AppConfig::from_env();
    if let Some(path) = &config.log_file {
        logging::init_tracing_to_file(path, &config.log_filter)?;
    }

    // Load before taking over the terminal so errors print normally.
    let tables = RaceTables::load(&config.data_dir)
        .with_context(|| format!("load race tables from {}", config.data_dir.display()))?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let mut app = App::new(tables, &config);
    let res = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if event::poll(POLL_TIMEOUT)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.on_key(key);
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let state = &app.state;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_text(state))
        .block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(34),
            Constraint::Min(40),
            Constraint::Length(44),
        ])
        .split(chunks[1]);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(10),
            Constraint::Min(6),
            Constraint::Length(5),
        ])
        .split(columns[0]);
    render_filters(frame, left[0], state);
    render_selection_info(frame, left[1], app);
    let console = Paragraph::new(console_text(state))
        .block(Block::default().title("Console").borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    frame.render_widget(console, left[2]);

    match state.report.as_ref() {
        Some(report) if !report.is_empty() => render_report(frame, &columns[1..], report),
        Some(report) => {
            let msg = format!(
                "No race data available for {}.\nPick another circuit with ←/→.",
                report.circuit.name
            );
            render_empty(frame, columns[1], "Win odds", &msg);
            render_points(frame, columns[2], report);
        }
        None => {
            let msg = state
                .error
                .clone()
                .unwrap_or_else(|| "Circuit data not available".to_string());
            render_empty(frame, columns[1], "Win odds", &msg);
            render_empty(frame, columns[2], "Points", "No data");
        }
    }

    let footer = Paragraph::new(footer_text(state));
    frame.render_widget(footer, chunks[2]);

    if state.help_overlay {
        render_help_overlay(frame, frame.size());
    }
}

fn header_text(state: &AppState) -> String {
    let circuit = state
        .report
        .as_ref()
        .map(|r| format!("{} ({})", r.circuit.name, r.circuit.country))
        .or_else(|| state.selected_circuit().map(str::to_string))
        .unwrap_or_else(|| "-".to_string());
    let line1 = format!(" F1 WIN ODDS | {circuit}");
    let line2 = format!(" Weather: {}", weather_summary(&state.weather));
    format!("{line1}\n{line2}")
}

fn footer_text(state: &AppState) -> String {
    let export = if state.export.message.is_empty() {
        String::new()
    } else {
        format!(" | {}", state.export.message)
    };
    format!("↑/↓ j/k Focus | ←/→ h/l Adjust | e Export | ? Help | q Quit{export}")
}

fn render_filters(frame: &mut Frame, area: Rect, state: &AppState) {
    let compare = state
        .compare_names()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .unwrap_or_else(|| ("-".to_string(), "-".to_string()));
    let rows = Focus::ALL.iter().map(|focus| {
        let value = match focus {
            Focus::Circuit => state.selected_circuit().unwrap_or("-").to_string(),
            Focus::Temperature => format!(
                "{:.0}°C ({:.0}..{:.0})",
                state.weather.temperature_c, state.bounds.temp_min, state.bounds.temp_max
            ),
            Focus::Humidity => format!("{:.0}%", state.weather.humidity_pct),
            Focus::Sky => state.weather.sky.label().to_string(),
            Focus::Driver => state.selected_driver().unwrap_or("-").to_string(),
            Focus::Constructor => state.selected_constructor().unwrap_or("-").to_string(),
            Focus::CompareFirst => compare.0.clone(),
            Focus::CompareSecond => compare.1.clone(),
        };
        let text = format!("{:<12} {}", focus.label(), value);
        if *focus == state.focus {
            Line::styled(
                format!("> {text}"),
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        } else {
            Line::raw(format!("  {text}"))
        }
    });
    let filters = Paragraph::new(rows.collect::<Vec<_>>())
        .block(Block::default().title("Filters").borders(Borders::ALL));
    frame.render_widget(filters, area);
}

fn render_selection_info(frame: &mut Frame, area: Rect, app: &App) {
    let mut lines = Vec::new();
    let report = app.state.report.as_ref();
    match report.and_then(|r| r.selected_driver.as_ref()) {
        Some(driver) => {
            lines.push(format!("Driver: {}", driver.full_name()));
            if let Some(code) = &driver.code {
                lines.push(format!("  Code: {code}"));
            }
            lines.push(format!("  Nationality: {}", driver.nationality));
            if let Some(p) = report.and_then(|r| {
                r.rankings.iter().find(|p| p.driver_id == driver.driver_id)
            }) {
                lines.push(format!("  Win here: {:.1}%", p.win_probability * 100.0));
            }
        }
        None => lines.push("Driver: -".to_string()),
    }
    match report.and_then(|r| r.selected_constructor.as_ref()) {
        Some(team) => {
            lines.push(format!("Team: {}", team.name));
            lines.push(format!("  Nationality: {}", team.nationality));
        }
        None => lines.push("Team: -".to_string()),
    }
    if let Some(r) = report {
        lines.push(format!("Races here: {}", r.races_held));
    }
    let info = Paragraph::new(lines.join("\n"))
        .block(Block::default().title("Selection").borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    frame.render_widget(info, area);
}

fn render_report(frame: &mut Frame, areas: &[Rect], report: &PredictionReport) {
    let [center, right] = areas else {
        return;
    };
    let center_rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(*center);

    let table = Paragraph::new(rankings_text(report)).block(
        Block::default()
            .title("Ranking (most likely first)")
            .borders(Borders::ALL),
    );
    frame.render_widget(table, center_rows[0]);
    frame.render_widget(win_bar_chart(report), center_rows[1]);

    let right_rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Length(6),
            Constraint::Min(5),
        ])
        .split(*right);
    frame.render_widget(position_chart(report), right_rows[0]);
    let h2h = Paragraph::new(head_to_head_text(report))
        .block(Block::default().title("Head to head").borders(Borders::ALL));
    frame.render_widget(h2h, right_rows[1]);
    render_points(frame, right_rows[2], report);
}

fn rankings_text(report: &PredictionReport) -> String {
    let mut out = vec![format!(
        "{:>3} {:<16} {:>7} {:>7} {:>7} {:>9} {:>6}",
        "#", "Driver", "Win%", "AvgFin", "AvgQ", "Pit(ms)", "Pts"
    )];
    for (idx, p) in report.rankings.iter().enumerate() {
        out.push(format!(
            "{:>3} {:<16} {:>6.1}% {:>7.2} {:>7} {:>9} {:>6}",
            idx + 1,
            truncate(&p.surname, 16),
            p.win_probability * 100.0,
            p.avg_position,
            opt_fmt(p.avg_qualifying_position, 2),
            opt_fmt(p.avg_pit_stop_ms, 0),
            opt_fmt(p.current_points, 0),
        ));
    }
    if !report.unscored.is_empty() {
        out.push(format!(
            "    ({} driver(s) without a classified result)",
            report.unscored.len()
        ));
    }
    out.join("\n")
}

fn win_bar_chart(report: &PredictionReport) -> BarChart<'static> {
    let bars: Vec<Bar<'static>> = report
        .rankings
        .iter()
        .take(CHART_DRIVERS)
        .map(|p| {
            Bar::default()
                .label(Line::from(truncate(&p.surname, 10)))
                .value((p.win_probability * 1000.0).round() as u64)
                .text_value(format!("{:.1}%", p.win_probability * 100.0))
                .style(Style::default().fg(Color::Green))
        })
        .collect();

    BarChart::default()
        .block(
            Block::default()
                .title(chart_title("Win probability", report.rankings.len()))
                .borders(Borders::ALL),
        )
        .data(BarGroup::default().bars(&bars))
        .direction(Direction::Horizontal)
        .bar_width(1)
        .bar_gap(0)
}

fn position_chart(report: &PredictionReport) -> BarChart<'static> {
    let mut chart = BarChart::default()
        .block(
            Block::default()
                .title(chart_title(
                    "Avg finish (green) vs quali (blue)",
                    report.rankings.len(),
                ))
                .borders(Borders::ALL),
        )
        .bar_width(2)
        .bar_gap(0)
        .group_gap(1);
    for p in report.rankings.iter().take(CHART_DRIVERS) {
        let finish = Bar::default()
            .value((p.avg_position * 10.0).round() as u64)
            .text_value(format!("{:.0}", p.avg_position))
            .style(Style::default().fg(Color::Green));
        let quali = Bar::default()
            .value(
                p.avg_qualifying_position
                    .map(|q| (q * 10.0).round() as u64)
                    .unwrap_or(0),
            )
            .text_value(opt_fmt(p.avg_qualifying_position, 0))
            .style(Style::default().fg(Color::Blue));
        chart = chart.data(
            BarGroup::default()
                .label(Line::from(truncate(&p.surname, 5)))
                .bars(&[finish, quali]),
        );
    }
    chart
}

fn head_to_head_text(report: &PredictionReport) -> String {
    let Some(h2h) = &report.head_to_head else {
        return "Pick two drivers under Compare A/B".to_string();
    };
    if h2h.drivers.is_empty() {
        return format!("No history here for {} or {}", h2h.first, h2h.second);
    }
    h2h.drivers
        .iter()
        .map(|p| {
            format!(
                "{:<14} {:>5.1}%  fin {:>5.2}  q {:>5}",
                truncate(&p.surname, 14),
                p.win_probability * 100.0,
                p.avg_position,
                opt_fmt(p.avg_qualifying_position, 2)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_points(frame: &mut Frame, area: Rect, report: &PredictionReport) {
    if report.points_distribution.is_empty() {
        render_empty(frame, area, "Points (latest race)", "No standings data");
        return;
    }
    let bars: Vec<Bar<'static>> = report
        .points_distribution
        .iter()
        .take(CHART_DRIVERS)
        .map(|p| {
            Bar::default()
                .label(Line::from(truncate(&p.surname, 10)))
                .value(p.points.max(0.0).round() as u64)
                .text_value(format!("{:.0} ({:.0}%)", p.points, p.share * 100.0))
                .style(Style::default().fg(Color::Magenta))
        })
        .collect();
    let title = match report.latest_race_id {
        Some(id) => format!("Points after race {id}"),
        None => "Points".to_string(),
    };
    let title = chart_title(&title, report.points_distribution.len());
    let chart = BarChart::default()
        .block(Block::default().title(title).borders(Borders::ALL))
        .data(BarGroup::default().bars(&bars))
        .direction(Direction::Horizontal)
        .bar_width(1)
        .bar_gap(0);
    frame.render_widget(chart, area);
}

fn render_empty(frame: &mut Frame, area: Rect, title: &str, msg: &str) {
    let empty = Paragraph::new(msg.to_string())
        .style(Style::default().fg(Color::DarkGray))
        .block(Block::default().title(title.to_string()).borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    frame.render_widget(empty, area);
}

fn console_text(state: &AppState) -> String {
    if state.logs.is_empty() {
        return "No alerts yet".to_string();
    }
    state
        .logs
        .iter()
        .rev()
        .take(3)
        .cloned()
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<Vec<_>>()
        .join("\n")
}

fn opt_fmt(value: Option<f64>, decimals: usize) -> String {
    value
        .map(|v| format!("{v:.decimals$}"))
        .unwrap_or_else(|| "-".to_string())
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(60, 60, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "F1 Win Odds - Help",
        "",
        "  j/k or ↑/↓   Move between filters",
        "  Tab          Next filter",
        "  h/l or ←/→   Change the focused filter",
        "  e            Export report to xlsx",
        "  ?            Toggle help",
        "  q            Quit",
        "",
        "Win odds come from the average finishing position at the",
        "selected circuit, scaled by the weather inputs.",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}
