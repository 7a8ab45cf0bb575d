use std::fs;
use std::path::PathBuf;

use f1_win_odds::loader;
use f1_win_odds::tables::RaceTables;

fn fixture_dir() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push("f1");
    path
}

fn load_fixture() -> RaceTables {
    RaceTables::load(&fixture_dir()).expect("fixture tables should load")
}

#[test]
fn loads_every_table() {
    let tables = load_fixture();
    assert_eq!(tables.races.len(), 4);
    assert_eq!(tables.circuits.len(), 3);
    assert_eq!(tables.drivers.len(), 5);
    assert_eq!(tables.constructors.len(), 5);
    assert_eq!(tables.results.len(), 18);
    assert_eq!(tables.qualifying.len(), 9);
    assert_eq!(tables.pit_stops.len(), 9);
    assert_eq!(tables.driver_standings.len(), 10);
}

#[test]
fn null_markers_become_absent_values() {
    let tables = load_fixture();
    let dnf = tables
        .results
        .iter()
        .find(|r| r.race_id == 1098 && r.driver_id == 844)
        .expect("leclerc 2023 australia");
    assert!(dnf.position.is_none());
    assert!(dnf.grid.is_none());
    assert_eq!(dnf.position_order, Some(18));
}

#[test]
fn non_numeric_pit_durations_are_coerced() {
    let tables = load_fixture();
    let missing: Vec<_> = tables
        .pit_stops
        .iter()
        .filter(|p| p.duration_ms.is_none())
        .map(|p| (p.driver_id, p.stop))
        .collect();
    assert_eq!(missing, vec![(846, 2), (830, 1)]);
    let first = &tables.pit_stops[0];
    assert_eq!(first.duration_ms, Some(23_102.0));
}

#[test]
fn race_metadata_is_parsed() {
    let tables = load_fixture();
    let latest = tables.latest_race().expect("latest race");
    assert_eq!(latest.race_id, 1136);
    assert_eq!(latest.year, 2024);
    assert_eq!(latest.round, 16);
    assert_eq!(latest.date.map(|d| d.to_string()).as_deref(), Some("2024-09-01"));

    let ver = tables.driver(830).expect("verstappen");
    assert_eq!(ver.code.as_deref(), Some("VER"));
    assert_eq!(ver.full_name(), "Max Verstappen");
}

#[test]
fn current_drivers_follow_latest_race() {
    let tables = load_fixture();
    let surnames: Vec<&str> = tables
        .current_drivers(23)
        .iter()
        .map(|d| d.surname.as_str())
        .collect();
    // Alonso is in the standings but did not start the latest race.
    assert_eq!(surnames, vec!["Hamilton", "Verstappen", "Leclerc", "Norris"]);
}

#[test]
fn missing_file_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = RaceTables::load(dir.path()).unwrap_err();
    assert!(format!("{err:#}").contains("races.csv"));
}

#[test]
fn missing_required_column_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("results.csv");
    fs::write(&path, "raceId,driverId,position\n1,1,1\n").expect("write csv");
    let err = loader::load_results(&path).unwrap_err();
    assert!(format!("{err:#}").contains("positionOrder"));
}

#[test]
fn optional_columns_may_be_absent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("drivers.csv");
    fs::write(&path, "driverId,surname\n7,Räikkönen\n").expect("write csv");
    let drivers = loader::load_drivers(&path).expect("drivers should load");
    assert_eq!(drivers.len(), 1);
    assert_eq!(drivers[0].surname, "Räikkönen");
    assert!(drivers[0].code.is_none());
    assert!(drivers[0].forename.is_empty());
}
