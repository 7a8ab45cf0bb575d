use std::path::PathBuf;

use f1_win_odds::forest::ForestConfig;
use f1_win_odds::tables::RaceTables;
use f1_win_odds::training::{DriverFilter, TrainingConfig, build_feature_table, fit_baseline};

fn load_fixture() -> RaceTables {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push("f1");
    RaceTables::load(&path).expect("fixture tables should load")
}

#[test]
fn feature_table_keeps_classified_results() {
    let tables = load_fixture();
    let rows = build_feature_table(&tables, &DriverFilter::All);
    // 18 results, 3 without a classified position.
    assert_eq!(rows.len(), 15);

    let nor = rows
        .iter()
        .find(|r| r.race_id == 1136 && r.driver_id == 846)
        .expect("norris monza 2024");
    assert_eq!(nor.circuit_id, 14);
    assert_eq!(nor.grid, Some(1));
    assert_eq!(nor.qualifying_position, Some(1));
    assert_eq!(nor.finishing_position, 3);

    let no_quali = rows
        .iter()
        .find(|r| r.race_id == 1098)
        .expect("australia 2023");
    assert!(no_quali.qualifying_position.is_none());
}

#[test]
fn current_filter_drops_retired_entries() {
    let tables = load_fixture();
    let rows = build_feature_table(&tables, &DriverFilter::default());
    assert!(rows.iter().all(|r| r.driver_id != 4));
    assert_eq!(rows.len(), 13);
}

#[test]
fn baseline_is_reproducible() {
    let tables = load_fixture();
    let config = TrainingConfig {
        filter: DriverFilter::All,
        forest: ForestConfig {
            n_trees: 10,
            max_depth: 4,
            min_samples_leaf: 1,
            ..ForestConfig::default()
        },
        ..TrainingConfig::default()
    };
    let a = fit_baseline(&tables, &config).expect("first fit");
    let b = fit_baseline(&tables, &config).expect("second fit");

    assert_eq!(a.artifact.rows, 15);
    assert_eq!(a.artifact.test_rows, 3);
    assert_eq!(a.artifact.train_rows, 12);
    assert_eq!(a.artifact.test, b.artifact.test);
    assert_eq!(a.artifact.driver_encoder, b.artifact.driver_encoder);
    assert!(a.artifact.train.rmse + 1e-12 >= a.artifact.train.mae);

    let json = serde_json::to_value(&a.artifact).expect("artifact json");
    assert_eq!(json["feature_names"][0], "driver_encoded");
    assert!(json["driver_encoder"]["encodings"].is_object());
}
