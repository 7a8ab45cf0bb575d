use std::path::PathBuf;

use f1_win_odds::aggregate::aggregate_circuit;
use f1_win_odds::config::WeatherBounds;
use f1_win_odds::error::{ComputeError, NormalizationStage};
use f1_win_odds::query::{PredictionQuery, Predictor};
use f1_win_odds::tables::RaceTables;
use f1_win_odds::win_prob::{SkyCondition, WeatherInput};

fn load_fixture() -> RaceTables {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push("f1");
    RaceTables::load(&path).expect("fixture tables should load")
}

fn predictor(tables: &RaceTables) -> Predictor<'_> {
    Predictor::new(tables, WeatherBounds::default())
}

#[test]
fn monza_aggregates_join_every_source() {
    let tables = load_fixture();
    let rows = aggregate_circuit(&tables, 14);
    assert_eq!(rows.len(), 5);

    let ver = rows.iter().find(|r| r.driver_id == 830).expect("verstappen");
    assert_eq!(ver.avg_position, Some(3.5));
    assert_eq!(ver.avg_qualifying_position, Some(4.5));
    // The `n/a` stop at the 2024 race is ignored.
    assert_eq!(ver.avg_pit_stop_ms, Some(23_102.0));
    assert_eq!(ver.current_points, Some(313.0));

    let alo = rows.iter().find(|r| r.driver_id == 4).expect("alonso");
    assert_eq!(alo.avg_position, Some(9.0));
    assert!(alo.avg_pit_stop_ms.is_none());
}

#[test]
fn monza_ranking_follows_average_finish() {
    let tables = load_fixture();
    let report = predictor(&tables)
        .predict(&PredictionQuery::for_circuit("monza"))
        .expect("monza prediction");

    let names: Vec<&str> = report.rankings.iter().map(|p| p.surname.as_str()).collect();
    assert_eq!(names, vec!["Leclerc", "Verstappen", "Hamilton", "Norris", "Alonso"]);

    let raw = [1.0 / 3.5, 1.0 / 4.5, 1.0 / 6.5, 1.0 / 6.5, 1.0 / 10.0];
    let total: f64 = raw.iter().sum();
    for (p, r) in report.rankings.iter().zip(raw) {
        assert!((p.win_probability - r / total).abs() < 1e-9);
    }
    assert!((report.probability_total() - 1.0).abs() < 1e-9);
    assert_eq!(report.races_held, 2);
    assert_eq!(report.circuit.name, "Autodromo Nazionale di Monza");
}

#[test]
fn weather_does_not_reorder_or_reweight() {
    let tables = load_fixture();
    let neutral = predictor(&tables)
        .predict(&PredictionQuery::for_circuit("14"))
        .expect("neutral");

    let mut wet = PredictionQuery::for_circuit("14");
    wet.weather = WeatherInput {
        temperature_c: 31.0,
        humidity_pct: 85.0,
        sky: SkyCondition::Rainy,
    };
    let wet = predictor(&tables).predict(&wet).expect("wet");

    for (a, b) in neutral.rankings.iter().zip(&wet.rankings) {
        assert_eq!(a.driver_id, b.driver_id);
        assert!((a.win_probability - b.win_probability).abs() < 1e-12);
        assert!(b.adjusted_score > a.adjusted_score);
    }
}

#[test]
fn circuit_without_races_has_empty_rankings() {
    let tables = load_fixture();
    let report = predictor(&tables)
        .predict(&PredictionQuery::for_circuit("Las Vegas Strip Street Circuit"))
        .expect("vegas prediction");
    assert!(report.is_empty());
    assert_eq!(report.races_held, 0);
    assert_eq!(report.points_distribution.len(), 5);
    assert_eq!(report.points_distribution[0].surname, "Verstappen");
}

#[test]
fn points_distribution_uses_latest_race() {
    let tables = load_fixture();
    let report = predictor(&tables)
        .predict(&PredictionQuery::for_circuit("albert_park"))
        .expect("albert park");
    assert_eq!(report.latest_race_id, Some(1136));
    let total: f64 = report.points_distribution.iter().map(|p| p.points).sum();
    assert_eq!(total, 983.0);
    let ver = &report.points_distribution[0];
    assert!((ver.share - 313.0 / 983.0).abs() < 1e-12);
}

#[test]
fn albert_park_favours_alonso() {
    let tables = load_fixture();
    let report = predictor(&tables)
        .predict(&PredictionQuery::for_circuit("albert_park"))
        .expect("albert park");
    let ids: Vec<u32> = report.rankings.iter().map(|p| p.driver_id).collect();
    // Three drivers tie on 10.0 and fall back to id order.
    assert_eq!(ids, vec![4, 846, 1, 830, 844]);
}

#[test]
fn head_to_head_and_selections() {
    let tables = load_fixture();
    let mut query = PredictionQuery::for_circuit("monza");
    query.head_to_head = Some(("Alonso".to_string(), "norris".to_string()));
    query.driver = Some("Leclerc".to_string());
    query.constructor = Some("ferrari".to_string());
    let report = predictor(&tables).predict(&query).expect("monza");

    let h2h = report.head_to_head.expect("head to head");
    let names: Vec<&str> = h2h.drivers.iter().map(|p| p.surname.as_str()).collect();
    assert_eq!(names, vec!["Norris", "Alonso"]);
    assert_eq!(report.selected_driver.map(|d| d.driver_id), Some(844));
    assert_eq!(
        report.selected_constructor.map(|c| c.constructor_ref),
        Some("ferrari".to_string())
    );
}

#[test]
fn alonso_is_not_a_current_driver() {
    let tables = load_fixture();
    let mut query = PredictionQuery::for_circuit("monza");
    query.driver = Some("Alonso".to_string());
    let report = predictor(&tables).predict(&query).expect("monza");
    assert!(report.selected_driver.is_none());
}

#[test]
fn invalid_inputs_are_typed_errors() {
    let tables = load_fixture();
    let p = predictor(&tables);

    let err = p.predict(&PredictionQuery::for_circuit("Suzuka")).unwrap_err();
    assert_eq!(err, ComputeError::UnknownCircuit("Suzuka".to_string()));

    let mut hot = PredictionQuery::for_circuit("monza");
    hot.weather.temperature_c = 45.0;
    assert!(matches!(
        p.predict(&hot),
        Err(ComputeError::TemperatureOutOfRange { .. })
    ));

    let mut dry = PredictionQuery::for_circuit("monza");
    dry.weather.humidity_pct = 0.0;
    assert!(matches!(
        p.predict(&dry),
        Err(ComputeError::DegenerateNormalization {
            stage: NormalizationStage::WeatherAdjusted,
            ..
        })
    ));

    // The same zero humidity on a circuit with no history is just empty.
    let mut dry_vegas = PredictionQuery::for_circuit("vegas");
    dry_vegas.weather.humidity_pct = 0.0;
    assert!(p.predict(&dry_vegas).expect("vegas").is_empty());
}

#[test]
fn query_json_uses_defaults() {
    let query: PredictionQuery =
        serde_json::from_str(r#"{"circuit":"monza","weather":{"temperature_c":12,"humidity_pct":70,"sky":"cloudy"}}"#)
            .expect("query json");
    assert_eq!(query.weather.sky, SkyCondition::Cloudy);
    assert!(query.head_to_head.is_none());

    let bare: PredictionQuery = serde_json::from_str(r#"{"circuit":"monza"}"#).expect("bare json");
    assert_eq!(bare.weather, WeatherInput::default());

    let tables = load_fixture();
    let report = predictor(&tables).predict(&query).expect("monza");
    let json = serde_json::to_value(&report).expect("report json");
    assert_eq!(json["rankings"][0]["surname"], "Leclerc");
    assert_eq!(json["weather"]["sky"], "cloudy");
}
